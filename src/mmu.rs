//! 地址转换引擎
//!
//! 将虚拟地址按当前转换机制 (translation regime) 解析为物理地址，
//! 同时给出访问权限、页大小和缓存属性；失败时返回 `FaultRecord`，
//! 由调用者决定如何转换为异常。
//!
//! 支持的格式：
//! - 关闭转换时的恒等映射
//! - 短描述符 (ARMv5 / ARMv6+) 二级页表
//! - 长描述符 (LPAE / AArch64) 页表，以及两级嵌套转换
//! - PMSAv7 / PMSAv8 区域保护单元
//! - v8-M 安全属性单元 (SAU/IDAU)
//!
//! 本模块没有跨调用的持久状态：TLB 缓存属于外部协作方。

pub mod attrs;
pub mod fault;
mod long_desc;
mod pmsa;
pub mod sau;
mod short_desc;

#[cfg(test)]
mod tests;

use bitflags::bitflags;

use crate::cpu::features::{self, Features, hcr};
use crate::cpu::status::{CpuState, ccr, m_control, sctlr};
use crate::memory::{AccessSize, MemAttrs, Memory};

pub use attrs::CacheAttrs;
pub use fault::{FaultKind, FaultRecord};

pub use long_desc::{s1_prot, s2_prot};

/// 被转换的内存访问类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    Read,
    Write,
    Fetch,
}

impl AccessType {
    pub fn is_fetch(self) -> bool {
        self == AccessType::Fetch
    }

    /// 该访问需要的权限位。
    pub fn required(self) -> Prot {
        match self {
            AccessType::Read => Prot::READ,
            AccessType::Write => Prot::WRITE,
            AccessType::Fetch => Prot::EXEC,
        }
    }
}

bitflags! {
    /// 成功转换的页保护属性。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Prot: u8 {
        const READ  = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC  = 1 << 2;
    }
}

/// 转换上下文；转换器每个缓存地址空间一个。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MmuIdx {
    El10User,
    El10Priv,
    El2,
    El3,
    SecEl10User,
    SecEl10Priv,
    Stage2,
    MUser,
    MPriv,
    MUserNegPri,
    MPrivNegPri,
    MSecUser,
    MSecPriv,
    MSecUserNegPri,
    MSecPrivNegPri,
}

impl MmuIdx {
    pub const ALL: [MmuIdx; 15] = [
        MmuIdx::El10User,
        MmuIdx::El10Priv,
        MmuIdx::El2,
        MmuIdx::El3,
        MmuIdx::SecEl10User,
        MmuIdx::SecEl10Priv,
        MmuIdx::Stage2,
        MmuIdx::MUser,
        MmuIdx::MPriv,
        MmuIdx::MUserNegPri,
        MmuIdx::MPrivNegPri,
        MmuIdx::MSecUser,
        MmuIdx::MSecPriv,
        MmuIdx::MSecUserNegPri,
        MmuIdx::MSecPrivNegPri,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn is_m(self) -> bool {
        self.index() >= MmuIdx::MUser.index()
    }

    pub fn is_user(self) -> bool {
        matches!(
            self,
            MmuIdx::El10User
                | MmuIdx::SecEl10User
                | MmuIdx::MUser
                | MmuIdx::MUserNegPri
                | MmuIdx::MSecUser
                | MmuIdx::MSecUserNegPri
        )
    }

    pub fn is_secure(self) -> bool {
        matches!(
            self,
            MmuIdx::El3
                | MmuIdx::SecEl10User
                | MmuIdx::SecEl10Priv
                | MmuIdx::MSecUser
                | MmuIdx::MSecPriv
                | MmuIdx::MSecUserNegPri
                | MmuIdx::MSecPrivNegPri
        )
    }

    pub fn is_negpri(self) -> bool {
        matches!(
            self,
            MmuIdx::MUserNegPri | MmuIdx::MPrivNegPri | MmuIdx::MSecUserNegPri | MmuIdx::MSecPrivNegPri
        )
    }

    /// 按安全态与特权级得到的 M-profile 索引。
    pub fn m_idx(secure: bool, privileged: bool, negpri: bool) -> MmuIdx {
        match (secure, privileged, negpri) {
            (false, false, false) => MmuIdx::MUser,
            (false, true, false) => MmuIdx::MPriv,
            (false, false, true) => MmuIdx::MUserNegPri,
            (false, true, true) => MmuIdx::MPrivNegPri,
            (true, false, false) => MmuIdx::MSecUser,
            (true, true, false) => MmuIdx::MSecPriv,
            (true, false, true) => MmuIdx::MSecUserNegPri,
            (true, true, true) => MmuIdx::MSecPrivNegPri,
        }
    }
}

bitflags! {
    /// 转换上下文集合，用于挂起的 TLB 刷新。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MmuIdxSet: u32 {
        const EL10_USER = 1 << 0;
        const EL10_PRIV = 1 << 1;
        const EL2 = 1 << 2;
        const EL3 = 1 << 3;
        const SEC_EL10_USER = 1 << 4;
        const SEC_EL10_PRIV = 1 << 5;
        const STAGE2 = 1 << 6;
        const M_ALL = 0xff << 7;
        const EL10 = Self::EL10_USER.bits() | Self::EL10_PRIV.bits();
        const SEC_EL10 = Self::SEC_EL10_USER.bits() | Self::SEC_EL10_PRIV.bits();
    }
}

impl MmuIdxSet {
    pub fn from_idx(idx: MmuIdx) -> MmuIdxSet {
        MmuIdxSet::from_bits_retain(1 << idx.index())
    }

    pub fn contains_idx(self, idx: MmuIdx) -> bool {
        self.contains(MmuIdxSet::from_idx(idx))
    }
}

/// 转换机制使用的页表格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegimeFormat {
    Flat,
    ShortV5,
    ShortV6,
    Long,
    Pmsav7,
    Pmsav8,
}

/// 决定一个转换上下文的寄存器的只读视图。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationRegime {
    pub idx: MmuIdx,
    /// 拥有该机制寄存器的异常级别。
    pub el: u32,
    pub secure: bool,
    pub aa64: bool,
    pub format: RegimeFormat,
    /// 描述符为大端。
    pub big_endian: bool,
    pub disabled: bool,
    /// 该第一阶段之后还有第二阶段转换。
    pub two_stage: bool,
}

impl TranslationRegime {
    pub fn of(state: &CpuState, idx: MmuIdx) -> Self {
        let el = regime_el(state, idx);
        let disabled = translation_disabled(state, idx);
        let format = if idx.is_m() || state.features.contains(Features::PMSA) {
            if state.features.contains(Features::V8) {
                RegimeFormat::Pmsav8
            } else {
                RegimeFormat::Pmsav7
            }
        } else if disabled {
            RegimeFormat::Flat
        } else if uses_lpae(state, idx) {
            RegimeFormat::Long
        } else if state.features.contains(Features::V7)
            || (state.features.contains(Features::V6) && regime_sctlr(state, idx) & SCTLR_XP != 0)
        {
            RegimeFormat::ShortV6
        } else {
            RegimeFormat::ShortV5
        };
        TranslationRegime {
            idx,
            el,
            secure: idx.is_secure(),
            aa64: !idx.is_m() && features::el_is_aa64(state, el),
            format,
            big_endian: !idx.is_m() && regime_sctlr(state, idx) & sctlr::EE != 0,
            disabled,
            two_stage: stage2_active(state, idx),
        }
    }
}

/// ARMv6 SCTLR.XP：禁用子页 AP，使用 v6 描述符格式。
const SCTLR_XP: u64 = 1 << 23;

/// M-profile MPU_CTRL 位。
pub mod mpu_ctrl {
    pub const ENABLE: u32 = 1 << 0;
    pub const HFNMIENA: u32 = 1 << 1;
    pub const PRIVDEFENA: u32 = 1 << 2;
}

/// 成功的转换结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    pub phys: u64,
    pub prot: Prot,
    pub page_size: u64,
    pub attrs: CacheAttrs,
    /// 输出所在的物理地址空间。
    pub secure: bool,
}

pub(crate) const PAGE_SIZE: u64 = 4096;

pub fn regime_el(state: &CpuState, idx: MmuIdx) -> u32 {
    match idx {
        MmuIdx::El2 | MmuIdx::Stage2 => 2,
        MmuIdx::El3 => 3,
        MmuIdx::SecEl10User | MmuIdx::SecEl10Priv => {
            if state.features.contains(Features::EL3) && !features::el_is_aa64(state, 3) {
                3
            } else {
                1
            }
        }
        _ => 1,
    }
}

pub(crate) fn regime_sctlr(state: &CpuState, idx: MmuIdx) -> u64 {
    if idx.is_m() {
        return 0;
    }
    state.cp15.sctlr_el[regime_el(state, idx) as usize]
}

pub(crate) fn regime_tcr(state: &CpuState, idx: MmuIdx) -> u64 {
    if idx == MmuIdx::Stage2 {
        return state.cp15.vtcr_el2;
    }
    state.cp15.tcr_el[regime_el(state, idx) as usize]
}

pub(crate) fn regime_ttbr(state: &CpuState, idx: MmuIdx, n: usize) -> u64 {
    if idx == MmuIdx::Stage2 {
        return state.cp15.vttbr_el2;
    }
    let el = regime_el(state, idx) as usize;
    if n == 0 {
        state.cp15.ttbr0_el[el]
    } else {
        state.cp15.ttbr1_el[el]
    }
}

/// HCR_EL2.VM 置位时，第二阶段作用于非安全 EL1&0 访问。
pub(crate) fn stage2_active(state: &CpuState, idx: MmuIdx) -> bool {
    matches!(idx, MmuIdx::El10User | MmuIdx::El10Priv)
        && features::el2_enabled(state)
        && state.cp15.hcr_el2 & hcr::VM != 0
}

pub fn translation_disabled(state: &CpuState, idx: MmuIdx) -> bool {
    if idx.is_m() {
        let ctrl = state.v7m.mpu_ctrl[idx.is_secure() as usize];
        return match ctrl & (mpu_ctrl::ENABLE | mpu_ctrl::HFNMIENA) {
            mpu_ctrl::ENABLE => idx.is_negpri(),
            x if x == mpu_ctrl::ENABLE | mpu_ctrl::HFNMIENA => false,
            x => {
                if x == mpu_ctrl::HFNMIENA {
                    log::warn!("MPU_CTRL.HFNMIENA without ENABLE; treating MPU as disabled");
                }
                true
            }
        };
    }
    if idx == MmuIdx::Stage2 {
        return state.cp15.hcr_el2 & hcr::VM == 0;
    }
    if matches!(idx, MmuIdx::El10User | MmuIdx::El10Priv)
        && features::hcr_el2_eff(state) & hcr::TGE != 0
    {
        return true;
    }
    regime_sctlr(state, idx) & sctlr::M == 0
}

pub(crate) fn uses_lpae(state: &CpuState, idx: MmuIdx) -> bool {
    if matches!(idx, MmuIdx::El2 | MmuIdx::Stage2) {
        return true;
    }
    if features::el_is_aa64(state, regime_el(state, idx)) {
        return true;
    }
    state.features.contains(Features::LPAE) && regime_tcr(state, idx) & TTBCR_EAE != 0
}

pub(crate) const TTBCR_EAE: u64 = 1 << 31;

/// 当前执行状态的转换上下文。
pub fn current_mmu_idx(state: &CpuState) -> MmuIdx {
    if state.features.contains(Features::M) {
        let secure = state.v7m.secure;
        let privileged = features::is_handler_mode(state)
            || state.v7m.control[secure as usize] & m_control::NPRIV == 0;
        return m_mmu_idx(state, secure, privileged);
    }
    let el = features::current_el(state);
    let secure = features::is_secure(state);
    match el {
        0 if secure => MmuIdx::SecEl10User,
        0 => MmuIdx::El10User,
        1 if secure => MmuIdx::SecEl10Priv,
        1 => MmuIdx::El10Priv,
        2 => MmuIdx::El2,
        _ => {
            if features::el_is_aa64(state, 3) {
                MmuIdx::El3
            } else {
                MmuIdx::SecEl10Priv
            }
        }
    }
}

/// 包含负优先级变体的 M-profile 索引。
pub fn m_mmu_idx(state: &CpuState, secure: bool, privileged: bool) -> MmuIdx {
    let negpri = crate::cpu::exception::mprofile::neg_prio_requested(state, secure);
    MmuIdx::m_idx(secure, privileged, negpri)
}

/// 在转换上下文 `idx` 中为 `access` 解析 `vaddr`。
pub fn translate(
    state: &CpuState,
    mem: &dyn Memory,
    vaddr: u64,
    access: AccessType,
    idx: MmuIdx,
) -> Result<Translation, FaultRecord> {
    let walk = Walk { state, mem, idx, access, vaddr };
    if !stage2_active(state, idx) {
        return walk.single_stage(vaddr);
    }

    let s1 = walk.single_stage(vaddr)?;
    let s2walk = Walk { idx: MmuIdx::Stage2, vaddr: s1.phys, ..walk };
    let s2 = long_desc::walk(&s2walk, s1.phys).map_err(|mut f| {
        f.stage2 = true;
        f.s2addr = s1.phys;
        f.vaddr = vaddr;
        f
    })?;
    log::debug!(
        "two-stage {:#x} -> ipa {:#x} -> pa {:#x} ({:?} & {:?})",
        vaddr,
        s1.phys,
        s2.phys,
        s1.prot,
        s2.prot
    );
    Ok(Translation {
        phys: s2.phys,
        prot: s1.prot & s2.prot,
        page_size: s1.page_size.min(s2.page_size),
        attrs: attrs::combine_cacheattrs(s1.attrs, s2.attrs),
        secure: s2.secure,
    })
}

/// 对 `vaddr` 处大小为 `size` 的访问做对齐检查。
pub fn check_alignment(
    state: &CpuState,
    vaddr: u64,
    size: AccessSize,
    access: AccessType,
    idx: MmuIdx,
) -> Result<(), FaultRecord> {
    if size.is_aligned(vaddr) {
        return Ok(());
    }
    let strict = if idx.is_m() {
        // 未对齐的字访问除非被陷入否则允许；双字从不允许。
        size == AccessSize::Double
            || state.v7m.ccr[state.v7m.secure as usize] & ccr::UNALIGN_TRP != 0
    } else {
        !state.features.contains(Features::V6) || regime_sctlr(state, idx) & sctlr::A != 0
    };
    if strict {
        Err(FaultRecord::new(FaultKind::Alignment, access, vaddr))
    } else {
        Ok(())
    }
}

/// 一次转换尝试共享的状态。
#[derive(Clone, Copy)]
pub(crate) struct Walk<'a> {
    pub state: &'a CpuState,
    pub mem: &'a dyn Memory,
    pub idx: MmuIdx,
    pub access: AccessType,
    /// 故障中报告的地址。
    pub vaddr: u64,
}

impl<'a> Walk<'a> {
    pub fn fault(&self, kind: FaultKind) -> FaultRecord {
        FaultRecord::new(kind, self.access, self.vaddr)
    }

    fn single_stage(&self, address: u64) -> Result<Translation, FaultRecord> {
        let regime = TranslationRegime::of(self.state, self.idx);
        log::trace!("translate {:#x} {:?} via {:?}", address, self.access, regime.format);
        match regime.format {
            RegimeFormat::Pmsav8 => pmsa::get_phys_addr_pmsav8(self, address),
            RegimeFormat::Pmsav7 => pmsa::get_phys_addr_pmsav7(self, address),
            RegimeFormat::Flat => Ok(Translation {
                phys: if regime.aa64 { address } else { address & 0xffff_ffff },
                prot: Prot::all(),
                page_size: PAGE_SIZE,
                attrs: CacheAttrs::DEVICE_NGNRNE,
                secure: regime.secure,
            }),
            RegimeFormat::Long => long_desc::walk(self, address),
            RegimeFormat::ShortV6 => short_desc::walk_v6(self, address as u32),
            RegimeFormat::ShortV5 => short_desc::walk_v5(self, address as u32),
        }
    }

    /// 适用时让第一阶段页表地址经过第二阶段转换。
    fn s1ptw_translate(&self, addr: u64) -> Result<u64, FaultRecord> {
        if !stage2_active(self.state, self.idx) {
            return Ok(addr);
        }
        let s2walk = Walk {
            idx: MmuIdx::Stage2,
            access: AccessType::Read,
            vaddr: addr,
            ..*self
        };
        let tag = |mut f: FaultRecord| {
            f.stage2 = true;
            f.s1ptw = true;
            f.s2addr = addr;
            f.vaddr = self.vaddr;
            f.access = self.access;
            f
        };
        let s2 = long_desc::walk(&s2walk, addr).map_err(tag)?;
        if self.state.cp15.hcr_el2 & HCR_PTW != 0 && s2.attrs.is_device() {
            return Err(tag(self.fault(FaultKind::Permission)));
        }
        Ok(s2.phys)
    }

    fn external_on_walk(&self, addr: u64, err: crate::memory::MemError) -> FaultRecord {
        log::debug!("table walk load at {:#x} failed: {}", addr, err);
        self.fault(FaultKind::SyncExternalOnWalk)
    }

    /// 读取 32 位描述符。
    pub fn ldl(&self, addr: u64, secure: bool, be: bool) -> Result<u32, FaultRecord> {
        let pa = self.s1ptw_translate(addr)?;
        let v = self
            .mem
            .load32(pa, MemAttrs { secure })
            .map_err(|e| self.external_on_walk(pa, e))?;
        Ok(if be { v.swap_bytes() } else { v })
    }

    /// 读取 64 位描述符。
    pub fn ldq(&self, addr: u64, secure: bool, be: bool) -> Result<u64, FaultRecord> {
        let pa = self.s1ptw_translate(addr)?;
        let v = self
            .mem
            .load64(pa, MemAttrs { secure })
            .map_err(|e| self.external_on_walk(pa, e))?;
        Ok(if be { v.swap_bytes() } else { v })
    }
}

const HCR_PTW: u64 = 1 << 2;

/// 设置故障的遍历级别，除非它来自嵌套的第二阶段遍历。
pub(crate) fn at_level(f: FaultRecord, level: i32) -> FaultRecord {
    if f.s1ptw { f } else { f.at_level(level) }
}

/// 简化 AP[2:1] 模型的读写权限。
pub(crate) fn simple_ap_to_rw_prot(ap: u32, is_user: bool) -> Prot {
    match ap & 3 {
        0 if is_user => Prot::empty(),
        0 => Prot::READ | Prot::WRITE,
        1 => Prot::READ | Prot::WRITE,
        2 if is_user => Prot::empty(),
        2 => Prot::READ,
        _ => Prot::READ,
    }
}
