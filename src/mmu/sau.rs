//! v8-M 安全属性判定
//!
//! 可编程 SAU 与实现定义的 IDAU 映射组合使用。

use super::{AccessType, FaultKind, MmuIdx, PAGE_SIZE};
use super::pmsa::is_system_region;
use crate::cpu::status::CpuState;

/// SAU_CTRL 位。
pub mod ctrl {
    pub const ENABLE: u32 = 1 << 0;
    pub const ALLNS: u32 = 1 << 1;
}

/// 随 CPU 模型提供的固定 IDAU 映射中的一项。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdauRegion {
    pub base: u32,
    /// 闭区间。
    pub limit: u32,
    pub ns: bool,
    pub nsc: bool,
    /// 完全免于属性检查。
    pub exempt: bool,
    pub number: Option<u8>,
}

impl IdauRegion {
    pub fn contains(&self, address: u32) -> bool {
        self.base <= address && address <= self.limit
    }
}

/// 单个地址的安全属性。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SecurityAttrs {
    pub ns: bool,
    pub nsc: bool,
    /// 属性在地址所在的页内发生变化。
    pub subpage: bool,
    pub sregion: Option<u8>,
    pub iregion: Option<u8>,
}

/// 架构规定免于 SAU/IDAU 检查的地址范围。
fn is_sau_exempt(state: &CpuState, address: u32, access: AccessType) -> bool {
    (access.is_fetch() && is_system_region(state, address))
        || matches!(
            address,
            0xe000_0000..=0xe000_2fff
                | 0xe000_e000..=0xe000_efff
                | 0xe002_e000..=0xe002_efff
                | 0xe004_0000..=0xe004_1fff
                | 0xe00f_f000..=0xe00f_ffff
        )
}

/// 把 `address` 判定为安全、非安全或非安全可调用 (NSC)。
///
/// 被多个已启用 SAU 区域命中的地址视为错误，
/// 而不是随意选择其中一个。
pub fn security_lookup(
    state: &CpuState,
    address: u32,
    access: AccessType,
    idx: MmuIdx,
) -> Result<SecurityAttrs, FaultKind> {
    let mut attrs = SecurityAttrs::default();
    let idau = state.sau.idau.iter().find(|r| r.contains(address));
    let (idau_exempt, idau_ns, idau_nsc) = idau.map_or((false, true, true), |r| (r.exempt, r.ns, r.nsc));

    // 顶部 256MB 的取指始终为安全。
    if access.is_fetch() && address >> 28 == 0xf {
        return Ok(attrs);
    }
    if idau_exempt || is_sau_exempt(state, address, access) {
        attrs.ns = !idx.is_secure();
        return Ok(attrs);
    }
    attrs.iregion = idau.and_then(|r| r.number);

    let page_base = address & !(PAGE_SIZE as u32 - 1);
    let page_limit = page_base + (PAGE_SIZE as u32 - 1);
    match state.sau.ctrl & (ctrl::ENABLE | ctrl::ALLNS) {
        0 => {}
        ctrl::ALLNS => attrs.ns = true,
        _ => {
            for (r, (&rbar, &rlar)) in state.sau.rbar.iter().zip(&state.sau.rlar).enumerate() {
                if rlar & 1 == 0 {
                    continue;
                }
                let base = rbar & !0x1f;
                let limit = rlar | 0x1f;
                if base <= address && address <= limit {
                    if base > page_base || limit < page_limit {
                        attrs.subpage = true;
                    }
                    if attrs.sregion.is_some() {
                        log::debug!("SAU regions overlap at {:#x}", address);
                        return Err(FaultKind::SecurityAmbiguous);
                    }
                    if rlar & 2 != 0 {
                        attrs.nsc = true;
                    } else {
                        attrs.ns = true;
                    }
                    attrs.sregion = Some(r as u8);
                } else if limit >= base
                    && (base as u64) < page_base as u64 + PAGE_SIZE
                    && page_base as u64 <= limit as u64
                {
                    attrs.subpage = true;
                }
            }
        }
    }

    // IDAU 只能提高地址的安全级别。
    if !idau_ns && (attrs.ns || (!idau_nsc && attrs.nsc)) {
        attrs.ns = false;
        attrs.nsc = idau_nsc;
    }
    Ok(attrs)
}
