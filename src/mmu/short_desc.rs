//! 短描述符 (VMSAv5 / VMSAv6+) 二级页表遍历

use super::attrs::{CacheAttrs, short_desc_attrs};
use super::long_desc::s1_prot;
use super::{
    AccessType, FaultKind, FaultRecord, Prot, Translation, Walk, at_level, regime_el,
    regime_sctlr, regime_tcr, regime_ttbr,
};
use crate::cpu::features::{self, Features, scr};
use crate::cpu::status::sctlr;

/// 短描述符格式使用的 TTBCR 字段。
mod ttbcr {
    pub const N: u64 = 7;
    pub const PD0: u64 = 1 << 4;
    pub const PD1: u64 = 1 << 5;
}

/// `address` 的一级描述符地址；经由所选 TTBR 的表遍历被禁用时
/// 返回 `None`。
fn level1_table_address(w: &Walk, address: u32) -> Option<u64> {
    let tcr = regime_tcr(w.state, w.idx);
    let n = (tcr & ttbcr::N) as u32;
    let mask = if n == 0 { 0 } else { !(u32::MAX >> n) };
    let table = if address & mask != 0 {
        if tcr & ttbcr::PD1 != 0 {
            return None;
        }
        regime_ttbr(w.state, w.idx, 1) as u32 & 0xffff_c000
    } else {
        if tcr & ttbcr::PD0 != 0 {
            return None;
        }
        regime_ttbr(w.state, w.idx, 0) as u32 & !(0x3fff >> n)
    };
    Some((table | (address >> 18) & 0x3ffc) as u64)
}

/// 由完整 AP[2:0] 编码与域访问字段得到的权限。
fn ap_to_rw_prot(w: &Walk, ap: u32, domain_prot: u32, is_user: bool) -> Prot {
    let features = w.state.features;
    if domain_prot == 3 {
        return Prot::READ | Prot::WRITE;
    }
    match ap {
        0 => {
            if features.contains(Features::V7) {
                return Prot::empty();
            }
            let sr = regime_sctlr(w.state, w.idx) & (sctlr::S | sctlr::R);
            if sr == sctlr::S {
                if is_user { Prot::empty() } else { Prot::READ }
            } else if sr == sctlr::R {
                Prot::READ
            } else {
                Prot::empty()
            }
        }
        1 if is_user => Prot::empty(),
        1 => Prot::READ | Prot::WRITE,
        2 if is_user => Prot::READ,
        2 => Prot::READ | Prot::WRITE,
        3 => Prot::READ | Prot::WRITE,
        5 if is_user => Prot::empty(),
        5 => Prot::READ,
        6 => Prot::READ,
        7 if features.contains(Features::V6K) => Prot::READ,
        // 4 保留
        _ => Prot::empty(),
    }
}

/// 对完整 AP 叶子应用 SCR.SIF、SCTLR.WXN 与 SCTLR.UWXN。
fn write_implies_xn(w: &Walk, ns: bool, prot_rw: Prot, user_rw: Prot) -> bool {
    let state = w.state;
    if ns && features::is_secure(state) && state.cp15.scr_el3 & scr::SIF != 0 {
        return true;
    }
    if !state.features.contains(Features::LPAE) {
        return false;
    }
    let sctlr_val = regime_sctlr(state, w.idx);
    (sctlr_val & sctlr::WXN != 0 && prot_rw.contains(Prot::WRITE))
        || (!w.idx.is_user() && sctlr_val & sctlr::UWXN != 0 && user_rw.contains(Prot::WRITE))
}

fn domain_prot(w: &Walk, domain: u32) -> u32 {
    let dacr = w.state.cp15.dacr[regime_el(w.state, w.idx) as usize];
    ((dacr >> (domain * 2)) & 3) as u32
}

/// ARMv5 格式：段、粗粒度与细粒度二级页表。
pub(crate) fn walk_v5(w: &Walk, address: u32) -> Result<Translation, FaultRecord> {
    let secure = w.idx.is_secure();
    let be = regime_sctlr(w.state, w.idx) & sctlr::EE != 0;
    let mut level = 1;
    let mut domain = 0;
    let fail = |kind, level, domain| w.fault(kind).at_level(level).with_domain(domain);

    let table = level1_table_address(w, address)
        .ok_or_else(|| fail(FaultKind::Translation, level, domain))?;
    let desc = w.ldl(table, secure, be).map_err(|f| at_level(f, level))?;
    let ty = desc & 3;
    domain = (desc >> 5) & 0xf;
    let dprot = domain_prot(w, domain);
    if ty == 0 {
        return Err(fail(FaultKind::Translation, level, domain));
    }
    if ty != 2 {
        level = 2;
    }
    if dprot == 0 || dprot == 2 {
        return Err(fail(FaultKind::Domain, level, domain));
    }

    let (phys, ap, page_size, attrs) = if ty == 2 {
        let attrs = short_desc_attrs(0, desc & 8 != 0, desc & 4 != 0, false);
        ((desc & 0xfff0_0000) | (address & 0x000f_ffff), (desc >> 10) & 3, 0x10_0000, attrs)
    } else {
        let table = if ty == 1 {
            (desc & 0xffff_fc00) | ((address >> 10) & 0x3fc)
        } else {
            (desc & 0xffff_f000) | ((address >> 8) & 0xffc)
        };
        let desc = w.ldl(table as u64, secure, be).map_err(|f| at_level(f, level))?;
        let attrs = short_desc_attrs(0, desc & 8 != 0, desc & 4 != 0, false);
        match desc & 3 {
            0 => return Err(fail(FaultKind::Translation, level, domain)),
            1 => (
                (desc & 0xffff_0000) | (address & 0xffff),
                (desc >> (4 + ((address >> 13) & 6))) & 3,
                0x1_0000,
                attrs,
            ),
            2 => (
                (desc & 0xffff_f000) | (address & 0xfff),
                (desc >> (4 + ((address >> 9) & 6))) & 3,
                0x1000,
                attrs,
            ),
            _ if ty == 1 => {
                // 粗粒度表中的扩展小页。
                if !w.state.features.intersects(Features::XSCALE | Features::V6) {
                    return Err(fail(FaultKind::Translation, level, domain));
                }
                ((desc & 0xffff_f000) | (address & 0xfff), (desc >> 4) & 3, 0x1000, attrs)
            }
            _ => ((desc & 0xffff_fc00) | (address & 0x3ff), (desc >> 4) & 3, 0x400, attrs),
        }
    };

    let mut prot = ap_to_rw_prot(w, ap, dprot, w.idx.is_user());
    if !prot.is_empty() {
        prot |= Prot::EXEC;
    }
    if !prot.contains(w.access.required()) {
        return Err(fail(FaultKind::Permission, level, domain));
    }
    Ok(Translation { phys: phys as u64, prot, page_size, attrs, secure })
}

/// ARMv6+ 格式：超级段、段、大页和小页，带 XN/PXN。
pub(crate) fn walk_v6(w: &Walk, address: u32) -> Result<Translation, FaultRecord> {
    let state = w.state;
    let secure = w.idx.is_secure();
    let be = regime_sctlr(state, w.idx) & sctlr::EE != 0;
    let mut level = 1;
    let mut domain = 0;
    let fail = |kind, level, domain| w.fault(kind).at_level(level).with_domain(domain);

    let table = level1_table_address(w, address)
        .ok_or_else(|| fail(FaultKind::Translation, level, domain))?;
    let desc = w.ldl(table, secure, be).map_err(|f| at_level(f, level))?;
    let ty = desc & 3;
    if ty == 0 || (ty == 3 && !state.features.contains(Features::PXN)) {
        return Err(fail(FaultKind::Translation, level, domain));
    }
    let supersection = ty != 1 && desc & (1 << 18) != 0;
    if !supersection {
        domain = (desc >> 5) & 0xf;
    }
    if ty == 1 {
        level = 2;
    }
    let dprot = domain_prot(w, domain);
    if dprot == 0 || dprot == 2 {
        return Err(fail(FaultKind::Domain, level, domain));
    }

    let phys: u64;
    let page_size: u64;
    let ap: u32;
    let xn: bool;
    let mut pxn = false;
    let ns: bool;
    let attrs: CacheAttrs;
    if ty != 1 {
        if supersection {
            phys = (desc & 0xff00_0000 | address & 0x00ff_ffff) as u64
                | (((desc >> 20) & 0xf) as u64) << 32
                | (((desc >> 5) & 0xf) as u64) << 36;
            page_size = 0x100_0000;
        } else {
            phys = (desc & 0xfff0_0000 | address & 0x000f_ffff) as u64;
            page_size = 0x10_0000;
        }
        ap = ((desc >> 10) & 3) | ((desc >> 13) & 4);
        xn = desc & (1 << 4) != 0;
        pxn = desc & 1 != 0;
        ns = desc & (1 << 19) != 0;
        attrs = short_desc_attrs((desc >> 12) & 7, desc & 8 != 0, desc & 4 != 0, desc & (1 << 16) != 0);
    } else {
        if state.features.contains(Features::PXN) {
            pxn = (desc >> 2) & 1 != 0;
        }
        ns = desc & (1 << 3) != 0;
        let table = (desc & 0xffff_fc00) | ((address >> 10) & 0x3fc);
        let desc = w.ldl(table as u64, secure, be).map_err(|f| at_level(f, level))?;
        ap = ((desc >> 4) & 3) | ((desc >> 7) & 4);
        let shareable = desc & (1 << 10) != 0;
        match desc & 3 {
            0 => return Err(fail(FaultKind::Translation, level, domain)),
            1 => {
                phys = (desc & 0xffff_0000 | address & 0xffff) as u64;
                xn = desc & (1 << 15) != 0;
                page_size = 0x1_0000;
                attrs = short_desc_attrs((desc >> 12) & 7, desc & 8 != 0, desc & 4 != 0, shareable);
            }
            _ => {
                phys = (desc & 0xffff_f000 | address & 0xfff) as u64;
                xn = desc & 1 != 0;
                page_size = 0x1000;
                attrs = short_desc_attrs((desc >> 6) & 7, desc & 8 != 0, desc & 4 != 0, shareable);
            }
        }
    }

    let prot = if dprot == 3 {
        Prot::all()
    } else {
        let xn = xn || (pxn && !w.idx.is_user());
        if xn && w.access == AccessType::Fetch {
            return Err(fail(FaultKind::Permission, level, domain));
        }
        let prot = if state.features.contains(Features::V6K)
            && regime_sctlr(state, w.idx) & sctlr::AFE != 0
        {
            // 简化模型中 AP[0] 是访问标志。
            if ap & 1 == 0 {
                return Err(fail(FaultKind::AccessFlag, level, domain));
            }
            s1_prot(state, w.idx, false, ap >> 1, ns, xn, pxn)
        } else {
            let mut prot = ap_to_rw_prot(w, ap, dprot, w.idx.is_user());
            let user_rw = ap_to_rw_prot(w, ap, dprot, true);
            if !prot.is_empty() && !xn && !write_implies_xn(w, ns, prot, user_rw) {
                prot |= Prot::EXEC;
            }
            prot
        };
        if !prot.contains(w.access.required()) {
            return Err(fail(FaultKind::Permission, level, domain));
        }
        prot
    };

    Ok(Translation { phys, prot, page_size, attrs, secure: secure && !ns })
}
