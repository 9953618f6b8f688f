//! 基于区域的保护单元
//!
//! - PMSAv7：基址/大小区域，支持子区域，编号最大的区域优先
//! - PMSAv8：基址/界限区域，重叠视为故障

use super::attrs::{CacheAttrs, short_desc_attrs};
use super::{
    FaultKind, FaultRecord, MmuIdx, PAGE_SIZE, Prot, Translation, Walk, mpu_ctrl, regime_sctlr,
    sau, simple_ap_to_rw_prot, translation_disabled,
};
use crate::cpu::features::Features;
use crate::cpu::status::{CpuState, sctlr};

/// M-profile 私有外设总线，0xe0000000..=0xe00fffff。
fn is_ppb_region(state: &CpuState, address: u32) -> bool {
    state.features.contains(Features::M) && address >> 20 == 0xe00
}

/// M-profile 系统区域，0xe0000000 及以上；永不可执行。
pub(crate) fn is_system_region(state: &CpuState, address: u32) -> bool {
    state.features.contains(Features::M) && address >> 29 == 0x7
}

fn use_background_region(state: &CpuState, idx: MmuIdx) -> bool {
    if idx.is_user() {
        return false;
    }
    if state.features.contains(Features::M) {
        state.v7m.mpu_ctrl[idx.is_secure() as usize] & mpu_ctrl::PRIVDEFENA != 0
    } else {
        regime_sctlr(state, idx) & sctlr::BR != 0
    }
}

/// 架构默认内存映射的权限。
fn default_map(state: &CpuState, idx: MmuIdx, address: u32) -> (Prot, CacheAttrs) {
    let rw = Prot::READ | Prot::WRITE;
    if !state.features.contains(Features::M) {
        let exec = match address {
            0x0000_0000..=0x7fff_ffff => true,
            // 高端向量
            0xf000_0000..=0xffff_ffff => regime_sctlr(state, idx) & sctlr::V != 0,
            _ => false,
        };
        return if exec {
            (rw | Prot::EXEC, CacheAttrs::NORMAL_WB)
        } else {
            (rw, CacheAttrs::DEVICE_NGNRNE)
        };
    }
    match address {
        // 代码、SRAM 以及两个 RAM 区域
        0x0000_0000..=0x3fff_ffff | 0x6000_0000..=0x9fff_ffff => (Prot::all(), CacheAttrs::NORMAL_WB),
        // 外设、设备、系统
        _ => (rw, CacheAttrs::DEVICE_NGNRNE),
    }
}

fn identity(address: u32, prot: Prot, attrs: CacheAttrs, page_size: u64, secure: bool) -> Translation {
    Translation { phys: address as u64, prot, page_size, attrs, secure }
}

/// `[base, base + len)` 是否触及 `address` 所在的页。
fn overlaps_page(base: u32, len: u64, address: u32) -> bool {
    let page = (address as u64) & !(PAGE_SIZE - 1);
    (base as u64) < page + PAGE_SIZE && page < base as u64 + len
}

fn permission_check(w: &Walk, prot: Prot) -> Result<(), FaultRecord> {
    if prot.contains(w.access.required()) {
        Ok(())
    } else {
        Err(w.fault(FaultKind::Permission).at_level(1))
    }
}

/// 按访问特权解码 PMSAv7 DRACR.AP。
fn pmsav7_ap(state: &CpuState, ap: u32, is_user: bool, region: usize) -> Prot {
    let rx = Prot::READ | Prot::EXEC;
    let is_m = state.features.contains(Features::M);
    let prot = if is_user {
        match ap {
            0 | 1 | 5 => Some(Prot::empty()),
            3 => Some(rx | Prot::WRITE),
            2 | 6 => Some(rx),
            7 if is_m => Some(rx),
            _ => None,
        }
    } else {
        match ap {
            0 => Some(Prot::empty()),
            1..=3 => Some(rx | Prot::WRITE),
            5 | 6 => Some(rx),
            7 if is_m => Some(rx),
            _ => None,
        }
    };
    prot.unwrap_or_else(|| {
        log::warn!("DRACR[{}]: bad AP value {:#x}", region, ap);
        Prot::empty()
    })
}

pub(crate) fn get_phys_addr_pmsav7(w: &Walk, address: u64) -> Result<Translation, FaultRecord> {
    let state = w.state;
    let idx = w.idx;
    let address = address as u32;
    let sec = idx.is_secure() as usize;
    let secure = idx.is_secure();

    if translation_disabled(state, idx) {
        return Ok(identity(address, Prot::all(), CacheAttrs::NORMAL_WB, PAGE_SIZE, secure));
    }
    if is_ppb_region(state, address) {
        let (prot, attrs) = default_map(state, idx, address);
        permission_check(w, prot)?;
        return Ok(identity(address, prot, attrs, PAGE_SIZE, secure));
    }

    let mut page_size = PAGE_SIZE;
    let mut hit = None;
    for n in (0..state.pmsa.drbar[sec].len()).rev() {
        let base = state.pmsa.drbar[sec][n];
        let drsr = state.pmsa.drsr[sec][n];
        if drsr & 1 == 0 {
            continue;
        }
        let rsize = (drsr >> 1) & 0x1f;
        if rsize == 0 {
            log::warn!("DRSR[{}]: region size field is 0", n);
            continue;
        }
        let rsize = rsize + 1;
        let len = 1u64 << rsize;
        let rmask = (len - 1) as u32;
        if base & rmask != 0 {
            log::warn!("DRBAR[{}] {:#x} misaligned to region size", n, base);
            continue;
        }
        if address < base || address > base.wrapping_add(rmask) {
            if overlaps_page(base, len, address) {
                page_size = 1;
            }
            continue;
        }

        // 小于 256 字节的区域没有子区域。
        let mut span = rsize;
        if rsize >= 8 {
            span = rsize - 3;
            let snd = ((address - base) >> span) & 7;
            if (drsr >> (snd + 8)) & 1 != 0 {
                page_size = page_size.min(1 << span);
                continue;
            }
        }
        if (1u64 << span) < page_size {
            page_size = 1 << span;
        }
        hit = Some(n);
        break;
    }

    let (prot, attrs) = match hit {
        None => {
            if !use_background_region(state, idx) {
                return Err(w.fault(FaultKind::Background));
            }
            default_map(state, idx, address)
        }
        Some(n) => {
            let dracr = state.pmsa.dracr[sec][n];
            let ap = (dracr >> 8) & 7;
            let xn = dracr & (1 << 12) != 0 || is_system_region(state, address);
            let mut prot = pmsav7_ap(state, ap, idx.is_user(), n);
            if xn {
                prot.remove(Prot::EXEC);
            }
            let attrs = short_desc_attrs(
                (dracr >> 3) & 7,
                dracr & 2 != 0,
                dracr & 1 != 0,
                dracr & 4 != 0,
            );
            (prot, attrs)
        }
    };
    permission_check(w, prot)?;
    Ok(identity(address, prot, attrs, page_size, secure))
}

/// PMSAv8 区域查找；返回命中的区域（如果有）。
pub(crate) fn pmsav8_lookup(
    w: &Walk,
    address: u32,
) -> Result<(Prot, CacheAttrs, Option<usize>, bool), FaultRecord> {
    let state = w.state;
    let idx = w.idx;
    let sec = idx.is_secure() as usize;
    let page_base = address & !(PAGE_SIZE as u32 - 1);
    let page_limit = page_base + (PAGE_SIZE as u32 - 1);
    let mut subpage = false;

    if translation_disabled(state, idx) {
        return Ok((Prot::all(), CacheAttrs::NORMAL_WB, None, false));
    }
    let mut hit = false;
    let mut matched = None;
    if is_ppb_region(state, address) {
        hit = true;
    } else {
        hit |= use_background_region(state, idx);
        for n in (0..state.pmsa.rbar[sec].len()).rev() {
            let rlar = state.pmsa.rlar[sec][n];
            if rlar & 1 == 0 {
                continue;
            }
            let base = state.pmsa.rbar[sec][n] & !0x1f;
            let limit = rlar | 0x1f;
            if address < base || address > limit {
                if limit >= base && overlaps_page(base, (limit - base) as u64 + 1, address) {
                    subpage = true;
                }
                continue;
            }
            if base > page_base || limit < page_limit {
                subpage = true;
            }
            if matched.is_some() {
                // 区域重叠时不选出胜者。
                return Err(w.fault(FaultKind::Permission).at_level(1));
            }
            matched = Some(n);
            hit = true;
        }
    }
    if !hit {
        return Err(w.fault(FaultKind::Background));
    }

    let (prot, attrs) = match matched {
        None => default_map(state, idx, address),
        Some(n) => {
            let rbar = state.pmsa.rbar[sec][n];
            let ap = (rbar >> 1) & 3;
            let xn = rbar & 1 != 0 || is_system_region(state, address);
            let mut prot = simple_ap_to_rw_prot(ap, idx.is_user());
            if !prot.is_empty() && !xn {
                prot |= Prot::EXEC;
            }
            let attrindx = (state.pmsa.rlar[sec][n] >> 1) & 7;
            let mair = state.v7m.mair0[sec] as u64 | (state.v7m.mair1[sec] as u64) << 32;
            let memattr = (mair >> (attrindx * 8)) as u8;
            let shareability = ((rbar >> 3) & 3) as u8;
            (prot, CacheAttrs { attrs: memattr, shareability })
        }
    };
    Ok((prot, attrs, matched, subpage))
}

pub(crate) fn get_phys_addr_pmsav8(w: &Walk, address: u64) -> Result<Translation, FaultRecord> {
    let state = w.state;
    let address = address as u32;
    let mut secure = w.idx.is_secure();
    let mut subpage = false;

    if state.features.contains(Features::M_SECURITY) {
        let sattrs = sau::security_lookup(state, address, w.access, w.idx)
            .map_err(|kind| w.fault(kind))?;
        subpage = sattrs.subpage;
        if w.access.is_fetch() {
            // 取指的安全属性取决于地址，而不是 CPU 状态。
            if sattrs.ns == secure {
                let kind = if sattrs.nsc { FaultKind::NsCallableFetch } else { FaultKind::SecurityViolation };
                return Err(w.fault(kind));
            }
        } else if sattrs.ns {
            secure = false;
        } else if !secure {
            return Err(w.fault(FaultKind::SecurityViolation));
        }
    }

    let (prot, attrs, _, mpu_subpage) = pmsav8_lookup(w, address)?;
    permission_check(w, prot)?;
    let page_size = if subpage || mpu_subpage { 1 } else { PAGE_SIZE };
    Ok(identity(address, prot, attrs, page_size, secure))
}
