//! 长描述符 (LPAE / AArch64 VMSA) 页表遍历
//!
//! 覆盖第一阶段和第二阶段，以及作用于叶子描述符属性的权限规则。

use super::{
    FaultKind, FaultRecord, MmuIdx, Prot, Translation, Walk, at_level, regime_el,
    regime_sctlr, regime_tcr, regime_ttbr, simple_ap_to_rw_prot,
};
use super::attrs::{CacheAttrs, convert_stage2_attrs};
use crate::cpu::features::{self, Features, scr};
use crate::cpu::status::{CpuState, sctlr};

/// 输入地址所在那一半地址空间的几何参数。
#[derive(Debug, Clone, Copy)]
struct TableParams {
    /// TTBR0 为 0，TTBR1 为 1。
    select: usize,
    inputsize: u32,
    /// 转换粒度的 log2。
    grainsize: u32,
    /// 经由该 TTBR 的表遍历被禁用。
    epd: bool,
}

/// 从块/页描述符提取的叶子属性位：
/// desc[11:2] 放在 9:0 位，desc[63:52] 放在 21:10 位。
mod leaf {
    pub const NS: u64 = 1 << 3;
    pub const AP_USER: u64 = 1 << 4;
    pub const AP_RO: u64 = 1 << 5;
    pub const AF: u64 = 1 << 8;
    pub const PXN: u64 = 1 << 11;
    pub const XN: u64 = 1 << 12;
}

/// 表描述符属性位，desc[63:59]。
mod table {
    pub const PXN: u64 = 1 << 0;
    pub const XN: u64 = 1 << 1;
    pub const AP_NO_USER: u64 = 1 << 2;
    pub const AP_RO: u64 = 1 << 3;
    pub const NS: u64 = 1 << 4;
}

fn aa64_params(
    w: &Walk,
    tcr: u64,
    el: u32,
    stage2: bool,
    address: u64,
) -> Result<(TableParams, u64), FaultRecord> {
    let two_ranges = el == 1 && !stage2;
    let select = if two_ranges { ((address >> 55) & 1) as usize } else { 0 };
    let tbi = if stage2 {
        false
    } else if two_ranges {
        (tcr >> (37 + select)) & 1 != 0
    } else {
        (tcr >> 20) & 1 != 0
    };

    let mut address = address;
    // 顶字节忽略只作用于数据访问。
    if tbi && !w.access.is_fetch() {
        address = if select == 1 {
            address | 0xff << 56
        } else {
            address & !(0xff << 56)
        };
    }

    let (tsz, tg) = if select == 0 {
        (tcr & 0x3f, (tcr >> 14) & 3)
    } else {
        ((tcr >> 16) & 0x3f, (tcr >> 30) & 3)
    };
    let grainsize = match (select, tg) {
        (0, 1) => 16,
        (0, 2) => 14,
        (1, 1) => 14,
        (1, 3) => 16,
        _ => 12,
    };
    let tsz = (tsz as u32).clamp(16, 39);
    let inputsize = 64 - tsz;
    let epd_bit = if select == 0 { 7 } else { 23 };
    let epd = two_ranges && (tcr >> epd_bit) & 1 != 0;

    let expect = if select == 1 { u64::MAX >> inputsize } else { 0 };
    if address >> inputsize != expect {
        return Err(w.fault(FaultKind::Translation).at_level(0));
    }
    Ok((TableParams { select, inputsize, grainsize, epd }, address))
}

fn aa32_params(
    w: &Walk,
    tcr: u64,
    el: u32,
    stage2: bool,
    address: u64,
) -> Result<(TableParams, u64), FaultRecord> {
    let out_of_range = || w.fault(FaultKind::Translation).at_level(1);
    if stage2 {
        // VTCR.T0SZ 是 4 位有符号字段；IPA 可以超过 32 位。
        let t0sz = (((tcr & 0xf) as i32) << 28) >> 28;
        let inputsize = (32 - t0sz) as u32;
        if address >> inputsize != 0 {
            return Err(out_of_range());
        }
        return Ok((TableParams { select: 0, inputsize, grainsize: 12, epd: false }, address));
    }

    let t0sz = (tcr & 7) as u32;
    let t1sz = if el == 2 { 0 } else { ((tcr >> 16) & 7) as u32 };
    let top_clear = |sz: u32, v: u64| sz != 0 && (v & 0xffff_ffff) >> (32 - sz) == 0;
    let select = if el == 2 {
        if t0sz != 0 && !top_clear(t0sz, address) {
            return Err(out_of_range());
        }
        0
    } else if top_clear(t0sz, address) {
        0
    } else if top_clear(t1sz, !address) {
        1
    } else if t0sz == 0 {
        0
    } else if t1sz == 0 {
        1
    } else {
        return Err(out_of_range());
    };

    let tsz = if select == 0 { t0sz } else { t1sz };
    let epd_bit = if select == 0 { 7 } else { 23 };
    let epd = el != 2 && (tcr >> epd_bit) & 1 != 0;
    Ok((TableParams { select, inputsize: 32 - tsz, grainsize: 12, epd }, address))
}

/// 输出地址大小，取自 TCR_EL1.IPS 或 EL2/EL3 与第二阶段
/// 控制寄存器的 PS 字段。
fn output_size(tcr: u64, el: u32, stage2: bool) -> u32 {
    let ps = if el == 1 && !stage2 { (tcr >> 32) & 7 } else { (tcr >> 16) & 7 };
    match ps {
        0 => 32,
        1 => 36,
        2 => 40,
        3 => 42,
        4 => 44,
        _ => 48,
    }
}

/// 根据 IPA 大小校验 VTCR 的起始级别。
fn s2_start_level_ok(aa64: bool, start: i32, inputsize: u32, grainsize: u32) -> bool {
    let min = if aa64 && grainsize == 12 { 0 } else { 1 };
    if start < min || start > 3 {
        return false;
    }
    let stride = (grainsize - 3) as i32;
    let check = inputsize as i32 - ((3 - start) * stride + grainsize as i32);
    (1..=stride + 4).contains(&check)
}

/// 为 `address` 遍历 `w.idx` 的长描述符页表。
pub(crate) fn walk(w: &Walk, address: u64) -> Result<Translation, FaultRecord> {
    let state = w.state;
    let idx = w.idx;
    let stage2 = idx == MmuIdx::Stage2;
    let el = regime_el(state, idx);
    let aa64 = features::el_is_aa64(state, el);
    let tcr = regime_tcr(state, idx);
    let be = regime_sctlr(state, idx) & sctlr::EE != 0;

    let (params, address) = if aa64 {
        aa64_params(w, tcr, el, stage2, address)?
    } else {
        aa32_params(w, tcr, el, stage2, address)?
    };
    if params.epd {
        return Err(w.fault(FaultKind::Translation).at_level(if aa64 { 0 } else { 1 }));
    }

    let TableParams { select, inputsize, grainsize, .. } = params;
    let stride = grainsize - 3;
    let mut level: i32 = if stage2 {
        let sl0 = ((tcr >> 6) & 3) as i32;
        let start = if !aa64 || grainsize == 12 { 2 - sl0 } else { 3 - sl0 };
        if !s2_start_level_ok(aa64, start, inputsize, grainsize) {
            log::debug!("bad VTCR start level: sl0={} inputsize={}", sl0, inputsize);
            return Err(w.fault(FaultKind::Translation).at_level(1));
        }
        start
    } else {
        4 - ((inputsize - 4) / stride) as i32
    };

    let pa_bits = if aa64 { output_size(tcr, el, stage2) } else { 40 };
    let ttbr = regime_ttbr(state, idx, select);
    let grain_mask: u64 = (1 << grainsize) - 1;
    let desc_mask: u64 = ((1 << pa_bits) - 1) & !grain_mask;
    let mut indexmask: u64 = (1 << (inputsize - stride * (4 - level) as u32)) - 1;
    let mut descaddr = ttbr & ((1 << 48) - 1) & !indexmask;
    let mut tableattrs: u64 = if idx.is_secure() { 0 } else { table::NS };

    let (outaddr, page_size, attrs) = loop {
        descaddr |= (address >> (stride * (4 - level) as u32)) & indexmask;
        descaddr &= !7;
        let nstable = tableattrs & table::NS != 0;
        let desc = w.ldq(descaddr, !nstable, be).map_err(|f| at_level(f, level))?;

        if desc & 1 == 0 || (desc & 2 == 0 && level == 3) {
            return Err(w.fault(FaultKind::Translation).at_level(level));
        }
        if (desc & 0x0000_ffff_ffff_f000) >> pa_bits != 0 {
            return Err(w.fault(FaultKind::AddressSize).at_level(level));
        }
        descaddr = desc & desc_mask;

        if desc & 2 != 0 && level < 3 {
            tableattrs |= (desc >> 59) & 0x1f;
            level += 1;
            indexmask = grain_mask;
            continue;
        }
        // 0 级不允许块描述符，大粒度下的 1 级也不允许。
        if level == 0 || (level == 1 && grainsize != 12) {
            return Err(w.fault(FaultKind::Translation).at_level(level));
        }
        let page_size: u64 = 1 << (stride * (4 - level) as u32 + 3);
        let attrs = ((desc >> 2) & 0x3ff) | ((desc >> 52) << 10);
        break (descaddr | (address & (page_size - 1)), page_size, attrs);
    };

    let mut attrs = attrs;
    if !stage2 {
        if tableattrs & table::NS != 0 {
            attrs |= leaf::NS;
        }
        if tableattrs & table::AP_NO_USER != 0 {
            attrs &= !leaf::AP_USER;
        }
        attrs |= (tableattrs & (table::PXN | table::XN)) << 11;
        if tableattrs & table::AP_RO != 0 {
            attrs |= leaf::AP_RO;
        }
    }

    if attrs & leaf::AF == 0 {
        return Err(w.fault(FaultKind::AccessFlag).at_level(level));
    }
    let ap = ((attrs >> 4) & 3) as u32;
    let xn = attrs & leaf::XN != 0;
    let (prot, ns) = if stage2 {
        (s2_prot(state, ap, xn), true)
    } else {
        let ns = attrs & leaf::NS != 0;
        let pxn = attrs & leaf::PXN != 0;
        (s1_prot(state, idx, aa64, ap, ns, xn, pxn), ns)
    };
    if !prot.contains(w.access.required()) {
        return Err(w.fault(FaultKind::Permission).at_level(level));
    }

    let memattr = if stage2 {
        convert_stage2_attrs((attrs & 0xf) as u8)
    } else {
        let attrindx = attrs & 7;
        (state.cp15.mair_el[el as usize] >> (attrindx * 8)) as u8
    };
    Ok(Translation {
        phys: outaddr,
        prot,
        page_size,
        attrs: CacheAttrs { attrs: memattr, shareability: ((attrs >> 6) & 3) as u8 },
        secure: idx.is_secure() && !ns,
    })
}

/// 长描述符叶子的第一阶段权限。
///
/// `ap` 为 AP[2:1]；`xn` 为 XN（AArch64 EL1&0 下为 UXN）。
pub fn s1_prot(
    state: &CpuState,
    idx: MmuIdx,
    aa64: bool,
    ap: u32,
    ns: bool,
    xn: bool,
    pxn: bool,
) -> Prot {
    let is_user = idx.is_user();
    let user_rw = simple_ap_to_rw_prot(ap, true);
    let prot_rw = if is_user { user_rw } else { simple_ap_to_rw_prot(ap, false) };

    // SCR.SIF：安全态从不执行非安全内存中的代码。
    if ns && features::is_secure(state) && state.cp15.scr_el3 & scr::SIF != 0 {
        return prot_rw;
    }

    let have_wxn = state.features.contains(Features::LPAE);
    let sctlr_val = regime_sctlr(state, idx);
    let mut wxn = have_wxn && sctlr_val & sctlr::WXN != 0;
    let mut xn = xn;

    if aa64 {
        if regime_el(state, idx) == 1 && !is_user {
            xn = pxn || user_rw.contains(Prot::WRITE);
        }
    } else if state.features.contains(Features::V7) {
        if regime_el(state, idx) != 2 {
            if is_user {
                xn = xn || !user_rw.contains(Prot::READ);
            } else {
                let uwxn = have_wxn && sctlr_val & sctlr::UWXN != 0;
                xn = xn
                    || !prot_rw.contains(Prot::READ)
                    || pxn
                    || (uwxn && user_rw.contains(Prot::WRITE));
            }
        }
    } else {
        xn = false;
        wxn = false;
    }

    if xn || (wxn && prot_rw.contains(Prot::WRITE)) {
        prot_rw
    } else {
        prot_rw | Prot::EXEC
    }
}

/// 由 S2AP 与 XN 得到的第二阶段权限。
pub fn s2_prot(state: &CpuState, s2ap: u32, xn: bool) -> Prot {
    let mut prot = Prot::empty();
    if s2ap & 1 != 0 {
        prot |= Prot::READ;
    }
    if s2ap & 2 != 0 {
        prot |= Prot::WRITE;
    }
    if !xn && (features::el_is_aa64(state, 2) || prot.contains(Prot::READ)) {
        prot |= Prot::EXEC;
    }
    prot
}
