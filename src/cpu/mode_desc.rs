//! 模式描述符
//!
//! 把影响代码生成的执行状态压缩成一个 32 位值，供翻译器选择缓存的
//! 代码路径。描述符必须在每次翻译前重新计算，不能跨指令缓存。
//!
//! 位布局：
//!
//! | 位      | 字段                     |
//! |---------|--------------------------|
//! | [3:0]   | MMU 索引                  |
//! | [5:4]   | 当前异常级别              |
//! | [7:6]   | 浮点陷入目标级别          |
//! | 8       | 安全状态                  |
//! | 9       | AArch64                   |
//! | 10      | 数据访问大端序            |
//! | 11      | 单步调试激活              |
//! | 12      | PSTATE.SS                 |
//! | 13      | Thumb                     |
//! | 14      | M-profile Handler 模式    |
//! | 15      | 对齐检查                  |
//! | [17:16] | TBI0 / TBI1               |
//! | [31:24] | IT 块状态 (AArch32)       |

use super::exception::mprofile::aircr;
use super::features::{self, Features, hcr};
use super::status::{CpuState, ccr, pstate, psr, sctlr};
use crate::mmu::{self, MmuIdx};

pub mod bits {
    pub const MMU_IDX_SHIFT: u32 = 0;
    pub const MMU_IDX_MASK: u32 = 0xf;
    pub const EL_SHIFT: u32 = 4;
    pub const FPEXC_EL_SHIFT: u32 = 6;
    pub const SECURE: u32 = 1 << 8;
    pub const AARCH64: u32 = 1 << 9;
    pub const BE_DATA: u32 = 1 << 10;
    pub const SS_ACTIVE: u32 = 1 << 11;
    pub const PSTATE_SS: u32 = 1 << 12;
    pub const THUMB: u32 = 1 << 13;
    pub const HANDLER: u32 = 1 << 14;
    pub const ALIGN: u32 = 1 << 15;
    pub const TBI_SHIFT: u32 = 16;
    pub const CONDEXEC_SHIFT: u32 = 24;
}

/// CPACR.FPEN
const CPACR_FPEN_SHIFT: u32 = 20;
/// CPTR_EL2/CPTR_EL3/HCPTR.TFP
const CPTR_TFP: u64 = 1 << 10;
/// NSACR.CP10
const NSACR_CP10: u64 = 1 << 10;
/// MDSCR_EL1.SS / MDSCR_EL1.KDE
const MDSCR_SS: u64 = 1 << 0;
const MDSCR_KDE: u64 = 1 << 13;
/// MDCR_EL2.TDE
const MDCR_TDE: u64 = 1 << 8;
/// MDCR_EL3.SDD
const MDCR_SDD: u64 = 1 << 16;

/// 打包的执行模式摘要。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModeDescriptor(u32);

/// [`ModeDescriptor`] 的解码视图。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeFields {
    pub mmu_idx: MmuIdx,
    pub el: u32,
    /// FP/SIMD 访问陷入的级别；允许访问时为 0。
    pub fp_exception_el: u32,
    pub secure: bool,
    pub aarch64: bool,
    pub be_data: bool,
    pub ss_active: bool,
    pub pstate_ss: bool,
    pub thumb: bool,
    pub handler: bool,
    pub align: bool,
    /// TBI0 在第 0 位，TBI1 在第 1 位。
    pub tbi: u32,
    pub condexec: u32,
}

impl ModeDescriptor {
    /// 汇总当前执行状态。
    pub fn pack(state: &CpuState) -> Self {
        let idx = mmu::current_mmu_idx(state);
        let el = features::current_el(state);
        let m = state.features.contains(Features::M);

        let mut v = (idx.index() & bits::MMU_IDX_MASK) << bits::MMU_IDX_SHIFT;
        v |= el << bits::EL_SHIFT;
        v |= fp_exception_el(state, el) << bits::FPEXC_EL_SHIFT;
        if features::is_secure(state) {
            v |= bits::SECURE;
        }
        if state.aarch64 {
            v |= bits::AARCH64;
            v |= tbi(state, idx) << bits::TBI_SHIFT;
        } else {
            v |= (state.condexec_bits & 0xff) << bits::CONDEXEC_SHIFT;
            if state.thumb {
                v |= bits::THUMB;
            }
        }
        if be_data(state, idx, el) {
            v |= bits::BE_DATA;
        }
        if singlestep_active(state, el) {
            v |= bits::SS_ACTIVE;
            if state.pstate & pstate::SS != 0 {
                v |= bits::PSTATE_SS;
            }
        }
        if m && features::is_handler_mode(state) {
            v |= bits::HANDLER;
        }
        if align_check(state, idx) {
            v |= bits::ALIGN;
        }
        Self(v)
    }

    pub fn from_bits(v: u32) -> Self {
        Self(v)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn mmu_idx(self) -> Option<MmuIdx> {
        let i = (self.0 >> bits::MMU_IDX_SHIFT) & bits::MMU_IDX_MASK;
        MmuIdx::ALL.get(i as usize).copied()
    }

    /// 解码所有字段。MMU 索引越界时为 `None`。
    pub fn fields(self) -> Option<ModeFields> {
        let v = self.0;
        Some(ModeFields {
            mmu_idx: self.mmu_idx()?,
            el: (v >> bits::EL_SHIFT) & 3,
            fp_exception_el: (v >> bits::FPEXC_EL_SHIFT) & 3,
            secure: v & bits::SECURE != 0,
            aarch64: v & bits::AARCH64 != 0,
            be_data: v & bits::BE_DATA != 0,
            ss_active: v & bits::SS_ACTIVE != 0,
            pstate_ss: v & bits::PSTATE_SS != 0,
            thumb: v & bits::THUMB != 0,
            handler: v & bits::HANDLER != 0,
            align: v & bits::ALIGN != 0,
            tbi: (v >> bits::TBI_SHIFT) & 3,
            condexec: (v >> bits::CONDEXEC_SHIFT) & 0xff,
        })
    }
}

/// 从 `cur_el` 执行 FP/SIMD 指令时陷入的级别，可执行时为 0。
pub fn fp_exception_el(state: &CpuState, cur_el: u32) -> u32 {
    let f = state.features;
    // v6 之前没有 CPACR；未建模 M-profile 的 FP 访问控制。
    if !f.contains(Features::VFP) || !f.contains(Features::V6) || f.contains(Features::M) {
        return 0;
    }
    let fpen = (state.cp15.cpacr_el1 >> CPACR_FPEN_SHIFT) & 3;
    let trapped_pl1 = match fpen {
        3 => false,
        1 => cur_el == 0,
        _ => cur_el <= 1,
    };
    if trapped_pl1 {
        if features::is_secure(state) && !features::el_is_aa64(state, 3) {
            return 3;
        }
        return 1;
    }
    if fpen != 3 && cur_el == 3 && !state.aarch64 {
        // 运行在 EL3 的安全 PL1。
        return 3;
    }

    let secure_below = features::is_secure_below_el3(state);
    if f.contains(Features::EL3)
        && !features::el_is_aa64(state, 3)
        && cur_el <= 2
        && !secure_below
        && state.cp15.nsacr & NSACR_CP10 == 0
    {
        return if cur_el == 2 { 2 } else { 1 };
    }
    if cur_el <= 2 && features::el2_enabled(state) && state.cp15.cptr_el[2] & CPTR_TFP != 0 {
        return 2;
    }
    if f.contains(Features::EL3) && state.cp15.cptr_el[3] & CPTR_TFP != 0 {
        return 3;
    }
    0
}

fn debug_target_el(state: &CpuState) -> u32 {
    let route_to_el2 = features::el2_enabled(state)
        && (state.cp15.hcr_el2 & hcr::TGE != 0 || state.cp15.mdcr_el2 & MDCR_TDE != 0);
    if route_to_el2 {
        2
    } else if state.features.contains(Features::EL3)
        && !features::el_is_aa64(state, 3)
        && features::is_secure(state)
    {
        3
    } else {
        1
    }
}

fn generate_debug_exceptions(state: &CpuState, cur_el: u32) -> bool {
    let aa64_rules = state.aarch64 || (cur_el == 0 && features::el_is_aa64(state, 1));
    if !aa64_rules {
        return cur_el != 2;
    }
    if cur_el == 3 {
        return false;
    }
    if features::is_secure_below_el3(state)
        && state.features.contains(Features::EL3)
        && state.cp15.mdcr_el3 & MDCR_SDD != 0
    {
        return false;
    }
    let target = debug_target_el(state);
    if cur_el == target {
        state.cp15.mdscr_el1 & MDSCR_KDE != 0 && state.daif & pstate::D == 0
    } else {
        target > cur_el
    }
}

/// 软件单步已启用，且当前会产生调试异常。
pub fn singlestep_active(state: &CpuState, cur_el: u32) -> bool {
    !state.features.contains(Features::M)
        && state.cp15.mdscr_el1 & MDSCR_SS != 0
        && features::el_is_aa64(state, debug_target_el(state))
        && generate_debug_exceptions(state, cur_el)
}

fn be_data(state: &CpuState, idx: MmuIdx, el: u32) -> bool {
    if state.features.contains(Features::M) {
        return state.v7m.aircr & aircr::ENDIANNESS != 0;
    }
    if !state.aarch64 {
        return state.uncached_cpsr & psr::E != 0;
    }
    let sctlr = mmu::regime_sctlr(state, idx);
    let bit = if el == 0 { sctlr::E0E } else { sctlr::EE };
    sctlr & bit != 0
}

fn align_check(state: &CpuState, idx: MmuIdx) -> bool {
    if idx.is_m() {
        return state.v7m.ccr[state.v7m.secure as usize] & ccr::UNALIGN_TRP != 0;
    }
    !state.features.contains(Features::V6) || mmu::regime_sctlr(state, idx) & sctlr::A != 0
}

fn tbi(state: &CpuState, idx: MmuIdx) -> u32 {
    let tcr = mmu::regime_tcr(state, idx);
    if mmu::regime_el(state, idx) == 1 {
        ((tcr >> 37) & 3) as u32
    } else {
        ((tcr >> 20) & 1) as u32
    }
}

/// 打包 `state` 的模式描述符；见 [`ModeDescriptor`]。
pub fn pack_mode_descriptor(state: &CpuState) -> ModeDescriptor {
    let desc = ModeDescriptor::pack(state);
    log::trace!("mode descriptor {:#010x}", desc.bits());
    desc
}
