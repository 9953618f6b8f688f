//! 模式与特性模型
//!
//! 定义 CPU 的类型化特性集合，以及其他组件都会查询的纯谓词：
//! 当前异常级别、安全状态、各级别的寄存器宽度。

use bitflags::bitflags;

use super::status::{CpuMode, CpuState, pstate};

bitflags! {
    /// 定义 CPU 模型时确定的架构特性。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Features: u64 {
        const V4T        = 1 << 0;
        const V5         = 1 << 1;
        const V6         = 1 << 2;
        const V6K        = 1 << 3;
        const V7         = 1 << 4;
        const V7MP       = 1 << 5;
        const V7VE       = 1 << 6;
        const V8         = 1 << 7;
        const THUMB2     = 1 << 8;
        /// 微控制器 profile
        const M          = 1 << 9;
        /// v8-M 安全扩展
        const M_SECURITY = 1 << 10;
        /// 使用基于区域的保护单元而不是 MMU
        const PMSA       = 1 << 11;
        const VFP        = 1 << 12;
        const NEON       = 1 << 13;
        const LPAE       = 1 << 14;
        const PXN        = 1 << 15;
        const EL2        = 1 << 16;
        const EL3        = 1 << 17;
        const AARCH64    = 1 << 18;
        /// ARMv5 粗粒度页表中的扩展小页格式
        const XSCALE     = 1 << 19;
    }
}

/// 一条蕴含规则：具有 `when` 则必须具有 `then`。
struct Implication {
    when: Features,
    then: Features,
}

const IMPLICATIONS: &[Implication] = &[
    Implication { when: Features::AARCH64, then: Features::V8 },
    Implication { when: Features::V8, then: Features::V7VE.union(Features::V7MP) },
    Implication { when: Features::V7VE, then: Features::V7.union(Features::LPAE) },
    Implication { when: Features::V7, then: Features::V6K.union(Features::THUMB2) },
    Implication { when: Features::V6K, then: Features::V6 },
    Implication { when: Features::V6, then: Features::V5 },
    Implication { when: Features::V5, then: Features::V4T },
    Implication { when: Features::LPAE, then: Features::V7MP.union(Features::PXN) },
    Implication { when: Features::M_SECURITY, then: Features::M.union(Features::V8) },
    Implication { when: Features::M, then: Features::PMSA.union(Features::THUMB2) },
    Implication { when: Features::NEON, then: Features::VFP },
];

/// [`Features::parse_token`] 接受的特性名称。
const NAMES: &[(&str, Features)] = &[
    ("v4t", Features::V4T),
    ("v5", Features::V5),
    ("v6", Features::V6),
    ("v6k", Features::V6K),
    ("v7", Features::V7),
    ("v7mp", Features::V7MP),
    ("v7ve", Features::V7VE),
    ("v8", Features::V8),
    ("thumb2", Features::THUMB2),
    ("m", Features::M),
    ("m-security", Features::M_SECURITY),
    ("pmsa", Features::PMSA),
    ("vfp", Features::VFP),
    ("neon", Features::NEON),
    ("lpae", Features::LPAE),
    ("pxn", Features::PXN),
    ("el2", Features::EL2),
    ("el3", Features::EL3),
    ("aarch64", Features::AARCH64),
    ("xscale", Features::XSCALE),
];

impl Features {
    /// 反复应用所有蕴含规则，直到不再变化。
    ///
    /// 在构造模型时计算一次；访客代码从不修改结果。
    pub fn closure(self) -> Features {
        let mut set = self;
        loop {
            let mut next = set;
            for rule in IMPLICATIONS {
                if next.contains(rule.when) {
                    next |= rule.then;
                }
            }
            // 仅 AArch32 的 EL2 在 Hyp 机制下使用长描述符。
            if next.contains(Features::EL2) && !next.contains(Features::M) {
                next |= Features::LPAE;
            }
            if next == set {
                return set;
            }
            set = next;
        }
    }

    pub fn parse_token(name: &str) -> Option<Features> {
        let name = name.trim().to_ascii_lowercase();
        NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, f)| *f)
    }

    /// 已实现的最高异常级别；只取决于特性。
    pub fn highest_el(self) -> u32 {
        if self.contains(Features::EL3) {
            3
        } else if self.contains(Features::EL2) {
            2
        } else {
            1
        }
    }
}

#[inline]
pub fn has_feature(state: &CpuState, feature: Features) -> bool {
    state.features.contains(feature)
}

/// 由 SCR.NS 选择的 EL3 以下各级别的安全态。
pub fn is_secure_below_el3(state: &CpuState) -> bool {
    if has_feature(state, Features::M) {
        return state.v7m.secure;
    }
    has_feature(state, Features::EL3) && state.cp15.scr_el3 & scr::NS == 0
}

pub fn is_secure(state: &CpuState) -> bool {
    if has_feature(state, Features::M) {
        return state.v7m.secure;
    }
    if has_feature(state, Features::EL3) {
        if state.aarch64 && (state.pstate & pstate::EL_MASK) >> 2 == 3 {
            return true;
        }
        if !state.aarch64 && state.cpu_mode() == Some(CpuMode::Mon) {
            return true;
        }
    }
    is_secure_below_el3(state)
}

/// 异常级别 `el` 是否使用 AArch64。
pub fn el_is_aa64(state: &CpuState, el: u32) -> bool {
    if !has_feature(state, Features::AARCH64) {
        return false;
    }
    let mut aa64 = true;
    if el == 3 {
        return aa64;
    }
    if has_feature(state, Features::EL3) && state.cp15.scr_el3 & scr::RW == 0 {
        aa64 = false;
    }
    if el == 2 {
        return aa64;
    }
    if has_feature(state, Features::EL2) && !is_secure_below_el3(state) {
        aa64 = aa64 && state.cp15.hcr_el2 & hcr::RW != 0;
    }
    if el == 1 {
        return aa64;
    }
    if current_el(state) == 0 {
        state.aarch64
    } else {
        aa64
    }
}

/// EL2 是否已实现且在当前安全态下可用。
pub fn el2_enabled(state: &CpuState) -> bool {
    has_feature(state, Features::EL2) && !is_secure_below_el3(state)
}

/// 作用于当前状态的 HCR_EL2：EL2 未使用时为零。
pub fn hcr_el2_eff(state: &CpuState) -> u64 {
    if el2_enabled(state) {
        state.cp15.hcr_el2
    } else {
        0
    }
}

/// M-profile：正在执行异常处理程序。
pub fn is_handler_mode(state: &CpuState) -> bool {
    state.v7m.exception != 0
}

pub fn current_el(state: &CpuState) -> u32 {
    if has_feature(state, Features::M) {
        let sec = state.v7m.secure as usize;
        let npriv = state.v7m.control[sec] & super::status::m_control::NPRIV != 0;
        return if !is_handler_mode(state) && npriv { 0 } else { 1 };
    }
    if state.aarch64 {
        return (state.pstate & pstate::EL_MASK) >> 2;
    }
    match state.cpu_mode() {
        Some(CpuMode::Usr) => 0,
        Some(CpuMode::Hyp) => 2,
        Some(CpuMode::Mon) => 3,
        _ => {
            if is_secure(state) && has_feature(state, Features::EL3) && !el_is_aa64(state, 3) {
                3
            } else {
                1
            }
        }
    }
}

/// 从当前状态产生的同步异常被路由到的级别。
pub fn exception_target_el(state: &CpuState) -> u32 {
    let cur = current_el(state);
    let mut target = cur.max(1);
    if cur == 0 && hcr_el2_eff(state) & hcr::TGE != 0 {
        target = 2;
    }
    if target == 1
        && is_secure(state)
        && has_feature(state, Features::EL3)
        && !el_is_aa64(state, 3)
    {
        target = 3;
    }
    target
}

/// SCR_EL3 位。
pub mod scr {
    pub const NS: u64 = 1 << 0;
    pub const IRQ: u64 = 1 << 1;
    pub const FIQ: u64 = 1 << 2;
    pub const EA: u64 = 1 << 3;
    pub const FW: u64 = 1 << 4;
    pub const AW: u64 = 1 << 5;
    pub const SMD: u64 = 1 << 7;
    pub const HCE: u64 = 1 << 8;
    pub const SIF: u64 = 1 << 9;
    pub const RW: u64 = 1 << 10;
    pub const VALID_MASK: u64 = 0x3fff;
}

/// HCR_EL2 位。
pub mod hcr {
    pub const VM: u64 = 1 << 0;
    pub const FMO: u64 = 1 << 3;
    pub const IMO: u64 = 1 << 4;
    pub const AMO: u64 = 1 << 5;
    pub const TSC: u64 = 1 << 19;
    pub const TVM: u64 = 1 << 26;
    pub const TGE: u64 = 1 << 27;
    pub const TRVM: u64 = 1 << 30;
    pub const RW: u64 = 1 << 31;
    pub const VALID_MASK: u64 = (1 << 34) - 1;
}
