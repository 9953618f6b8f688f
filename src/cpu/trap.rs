//! 异常类型与路由
//!
//! 本模块定义 ARM 架构中可被处理器核心接收的异常事件、
//! 异常综合征 (syndrome) 编码，以及中断目标异常级别和屏蔽规则。
//!
//! # 事件类别
//!
//! - **同步异常**: 未定义指令、SVC/HVC/SMC、预取/数据中止
//! - **异步异常**: IRQ/FIQ、虚拟 IRQ/FIQ、SError、M-profile 外部中断
//!
//! 路由是纯函数：只读取 `CpuState`，不修改任何状态。

use bitflags::bitflags;

use super::features::{self, Features, hcr, scr};
use super::status::{CpuState, pstate};
use crate::mmu::fault::FaultRecord;

/// 投递给核心的抽象异常类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    /// 未定义指令
    Undef,
    /// Supervisor 调用
    Svc,
    PrefetchAbort,
    DataAbort,
    Irq,
    Fiq,
    /// 断点指令
    Bkpt,
    Hvc,
    Smc,
    /// 被 hypervisor 控制位陷入 EL2 的访问
    HypTrap,
    Virq,
    Vfiq,
    SError,
    /// M-profile 不可屏蔽中断
    Nmi,
    /// M-profile 非法执行状态（例如 Thumb 位清零）
    InvState,
    /// M-profile 在禁用时访问协处理器
    NoCp,
    /// M-profile 按向量号指定的异常（PendSV、SysTick、外部中断）
    MVector(u32),
}

impl ExceptionKind {
    /// 异步事件受屏蔽控制，可能保持挂起。
    pub fn is_async(self) -> bool {
        matches!(
            self,
            ExceptionKind::Irq
                | ExceptionKind::Fiq
                | ExceptionKind::Virq
                | ExceptionKind::Vfiq
                | ExceptionKind::SError
                | ExceptionKind::Nmi
                | ExceptionKind::MVector(_)
        )
    }

    pub fn is_abort(self) -> bool {
        matches!(self, ExceptionKind::PrefetchAbort | ExceptionKind::DataAbort)
    }
}

/// `take_exception` 看到的一次异常请求。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionEvent {
    pub kind: ExceptionKind,
    /// ESR 格式的综合征；中止从 `fault` 推导。
    pub syndrome: u32,
    pub vaddress: u64,
    pub fault: Option<FaultRecord>,
    /// 由调用者强制指定的级别（例如寄存器访问陷入）；否则按路由规则。
    pub target_el: Option<u32>,
}

impl ExceptionEvent {
    pub fn new(kind: ExceptionKind) -> Self {
        Self {
            kind,
            syndrome: syn::uncategorized(),
            vaddress: 0,
            fault: None,
            target_el: None,
        }
    }

    pub fn with_syndrome(mut self, syndrome: u32) -> Self {
        self.syndrome = syndrome;
        self
    }

    pub fn with_target_el(mut self, el: u32) -> Self {
        self.target_el = Some(el);
        self
    }

    /// 转换失败对应的中止事件。
    pub fn from_fault(fault: FaultRecord) -> Self {
        let kind = if fault.access.is_fetch() {
            ExceptionKind::PrefetchAbort
        } else {
            ExceptionKind::DataAbort
        };
        Self {
            kind,
            syndrome: 0,
            vaddress: fault.vaddr,
            fault: Some(fault),
            target_el: None,
        }
    }
}

bitflags! {
    /// 外层系统断言的异步异常线。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IrqLines: u32 {
        const IRQ    = 1 << 0;
        const FIQ    = 1 << 1;
        const VIRQ   = 1 << 2;
        const VFIQ   = 1 << 3;
        const SERROR = 1 << 4;
    }
}

impl IrqLines {
    pub fn from_kind(kind: ExceptionKind) -> IrqLines {
        match kind {
            ExceptionKind::Irq => IrqLines::IRQ,
            ExceptionKind::Fiq => IrqLines::FIQ,
            ExceptionKind::Virq => IrqLines::VIRQ,
            ExceptionKind::Vfiq => IrqLines::VFIQ,
            ExceptionKind::SError => IrqLines::SERROR,
            _ => IrqLines::empty(),
        }
    }
}

/// 异常状态机的阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExcPhase {
    #[default]
    None,
    /// 已识别但被屏蔽，或优先级不高于当前执行
    Pending,
    Taking,
    /// 处理程序运行中
    Active,
    Returning,
}

/// `take_exception` 的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeOutcome {
    /// 已在 `vector` 处进入处理程序。
    Taken { vector: u64, target_el: u32 },
    /// 被屏蔽；保持挂起直到解除屏蔽。
    Pending,
    /// 处理器停止发射指令。
    Lockup,
}

/// `return_from_exception` 的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnOutcome {
    Resumed,
    /// 非法返回：置位 PSTATE.IL，级别与状态不变。
    Illegal,
    /// 返回未通过一致性检查；改为进入故障。
    Faulted { vector: u64 },
    /// 挂起异常抢占了返回并被直接进入。
    TailChained { vector: u64 },
    Lockup,
}

// ========== 异常综合征 ==========

/// ESR 综合征构造。
pub mod syn {
    pub const EC_SHIFT: u32 = 26;
    pub const IL: u32 = 1 << 25;
    pub const ISV: u32 = 1 << 24;

    pub const EC_UNCATEGORIZED: u32 = 0x00;
    pub const EC_CP15RTTRAP: u32 = 0x03;
    pub const EC_CP15RRTTRAP: u32 = 0x04;
    pub const EC_ADVSIMDFPACCESSTRAP: u32 = 0x07;
    pub const EC_ILLEGALSTATE: u32 = 0x0e;
    pub const EC_AA32_SVC: u32 = 0x11;
    pub const EC_AA32_HVC: u32 = 0x12;
    pub const EC_AA32_SMC: u32 = 0x13;
    pub const EC_AA64_SVC: u32 = 0x15;
    pub const EC_AA64_HVC: u32 = 0x16;
    pub const EC_AA64_SMC: u32 = 0x17;
    pub const EC_SYSTEMREGISTERTRAP: u32 = 0x18;
    pub const EC_INSNABORT: u32 = 0x20;
    pub const EC_INSNABORT_SAME_EL: u32 = 0x21;
    pub const EC_DATAABORT: u32 = 0x24;
    pub const EC_DATAABORT_SAME_EL: u32 = 0x25;
    pub const EC_SERROR: u32 = 0x2f;
    pub const EC_AA32_BKPT: u32 = 0x38;
    pub const EC_AA64_BKPT: u32 = 0x3c;

    #[inline]
    pub fn get_ec(syndrome: u32) -> u32 {
        syndrome >> EC_SHIFT
    }

    pub fn uncategorized() -> u32 {
        (EC_UNCATEGORIZED << EC_SHIFT) | IL
    }

    pub fn illegal_state() -> u32 {
        (EC_ILLEGALSTATE << EC_SHIFT) | IL
    }

    pub fn aa64_svc(imm16: u32) -> u32 {
        (EC_AA64_SVC << EC_SHIFT) | IL | (imm16 & 0xffff)
    }

    pub fn aa64_hvc(imm16: u32) -> u32 {
        (EC_AA64_HVC << EC_SHIFT) | IL | (imm16 & 0xffff)
    }

    pub fn aa64_smc(imm16: u32) -> u32 {
        (EC_AA64_SMC << EC_SHIFT) | IL | (imm16 & 0xffff)
    }

    pub fn aa32_svc(imm16: u32, is_16bit: bool) -> u32 {
        (EC_AA32_SVC << EC_SHIFT) | (imm16 & 0xffff) | if is_16bit { 0 } else { IL }
    }

    pub fn aa32_hvc(imm16: u32) -> u32 {
        (EC_AA32_HVC << EC_SHIFT) | IL | (imm16 & 0xffff)
    }

    pub fn aa32_smc() -> u32 {
        (EC_AA32_SMC << EC_SHIFT) | IL
    }

    pub fn aa64_bkpt(imm16: u32) -> u32 {
        (EC_AA64_BKPT << EC_SHIFT) | IL | (imm16 & 0xffff)
    }

    pub fn aa32_bkpt(imm16: u32, is_16bit: bool) -> u32 {
        (EC_AA32_BKPT << EC_SHIFT) | (imm16 & 0xffff) | if is_16bit { 0 } else { IL }
    }

    pub fn aa64_sysregtrap(op0: u32, op1: u32, op2: u32, crn: u32, crm: u32, rt: u32, isread: bool) -> u32 {
        (EC_SYSTEMREGISTERTRAP << EC_SHIFT)
            | IL
            | (op0 << 20)
            | (op2 << 17)
            | (op1 << 14)
            | (crn << 10)
            | (rt << 5)
            | (crm << 1)
            | isread as u32
    }

    #[allow(clippy::too_many_arguments)]
    pub fn cp15_rt_trap(cv: u32, cond: u32, opc1: u32, opc2: u32, crn: u32, crm: u32, rt: u32, isread: bool) -> u32 {
        (EC_CP15RTTRAP << EC_SHIFT)
            | IL
            | (cv << 24)
            | (cond << 20)
            | (opc2 << 17)
            | (opc1 << 14)
            | (crn << 10)
            | (rt << 5)
            | (crm << 1)
            | isread as u32
    }

    pub fn cp15_rrt_trap(cv: u32, cond: u32, opc1: u32, crm: u32, rt: u32, rt2: u32, isread: bool) -> u32 {
        (EC_CP15RRTTRAP << EC_SHIFT)
            | IL
            | (cv << 24)
            | (cond << 20)
            | (opc1 << 16)
            | (rt2 << 10)
            | (rt << 5)
            | (crm << 1)
            | isread as u32
    }

    pub fn insn_abort(same_el: bool, ea: bool, s1ptw: bool, fsc: u32) -> u32 {
        ((EC_INSNABORT + same_el as u32) << EC_SHIFT)
            | IL
            | (ea as u32) << 9
            | (s1ptw as u32) << 7
            | fsc
    }

    pub fn data_abort(same_el: bool, ea: bool, s1ptw: bool, wnr: bool, fsc: u32) -> u32 {
        ((EC_DATAABORT + same_el as u32) << EC_SHIFT)
            | IL
            | (ea as u32) << 9
            | (s1ptw as u32) << 7
            | (wnr as u32) << 6
            | fsc
    }

    pub fn serror(extra: u32) -> u32 {
        (EC_SERROR << EC_SHIFT) | IL | (extra & 0x1ff_ffff)
    }
}

// ========== 中断路由 ==========

/// 物理 IRQ/FIQ/SError 的目标 EL，索引为
/// `[EL3 为 AArch64][SCR 路由][RW][HCR 路由][安全态][当前 EL]`。
/// -1 表示不可能出现的组合。
const TARGET_EL_TABLE: [[[[[[i8; 4]; 2]; 2]; 2]; 2]; 2] = [
    [
        [
            [[[1, 1, 2, -1], [3, -1, -1, 3]], [[2, 2, 2, -1], [3, -1, -1, 3]]],
            [[[1, 1, 2, -1], [3, -1, -1, 3]], [[2, 2, 2, -1], [3, -1, -1, 3]]],
        ],
        [
            [[[3, 3, 3, -1], [3, -1, -1, 3]], [[3, 3, 3, -1], [3, -1, -1, 3]]],
            [[[3, 3, 3, -1], [3, -1, -1, 3]], [[3, 3, 3, -1], [3, -1, -1, 3]]],
        ],
    ],
    [
        [
            [[[1, 1, 2, -1], [1, 1, -1, 1]], [[2, 2, 2, -1], [2, 2, -1, 1]]],
            [[[1, 1, 1, -1], [1, 1, 1, 1]], [[2, 2, 2, -1], [2, 2, 2, 1]]],
        ],
        [
            [[[3, 3, 3, -1], [3, 3, -1, 3]], [[3, 3, 3, -1], [3, 3, -1, 3]]],
            [[[3, 3, 3, -1], [3, 3, 3, 3]], [[3, 3, 3, -1], [3, 3, 3, 3]]],
        ],
    ],
];

/// HCR 路由位，TGE 强制所有物理中断进入 EL2。
fn hcr_routing(state: &CpuState) -> u64 {
    let mut hcr_el2 = features::hcr_el2_eff(state);
    if hcr_el2 & hcr::TGE != 0 {
        hcr_el2 |= hcr::IMO | hcr::FMO | hcr::AMO;
    }
    hcr_el2
}

/// 物理异步异常的目标级别。
pub fn phys_excp_target_el(state: &CpuState, kind: ExceptionKind, cur_el: u32, secure: bool) -> u32 {
    let is64 = state.features.contains(Features::AARCH64);
    let rw = if state.features.contains(Features::EL3) {
        state.cp15.scr_el3 & scr::RW != 0
    } else {
        is64
    };
    let hcr_el2 = hcr_routing(state);
    let (scr_route, hcr_route) = match kind {
        ExceptionKind::Irq => (state.cp15.scr_el3 & scr::IRQ != 0, hcr_el2 & hcr::IMO != 0),
        ExceptionKind::Fiq => (state.cp15.scr_el3 & scr::FIQ != 0, hcr_el2 & hcr::FMO != 0),
        _ => (state.cp15.scr_el3 & scr::EA != 0, hcr_el2 & hcr::AMO != 0),
    };
    let t = TARGET_EL_TABLE[is64 as usize][scr_route as usize][rw as usize][hcr_route as usize]
        [secure as usize][cur_el as usize & 3];
    if t < 0 {
        log::warn!(
            "no interrupt route for {:?} from EL{} (secure={}), using EL1",
            kind,
            cur_el,
            secure
        );
        return 1;
    }
    t as u32
}

/// 发往 `target_el` 的异步异常现在能否进入。
pub fn excp_unmasked(state: &CpuState, kind: ExceptionKind, target_el: u32, cur_el: u32, secure: bool) -> bool {
    if cur_el > target_el {
        return false;
    }
    let hcr_el2 = features::hcr_el2_eff(state);
    let daif = state.daif;
    let pstate_unmasked = match kind {
        ExceptionKind::Fiq => daif & pstate::F == 0,
        ExceptionKind::Irq => daif & pstate::I == 0,
        ExceptionKind::SError => daif & pstate::A == 0,
        ExceptionKind::Vfiq => {
            if secure || hcr_el2 & hcr::FMO == 0 || hcr_el2 & hcr::TGE != 0 {
                return false;
            }
            return daif & pstate::F == 0;
        }
        ExceptionKind::Virq => {
            if secure || hcr_el2 & hcr::IMO == 0 || hcr_el2 & hcr::TGE != 0 {
                return false;
            }
            return daif & pstate::I == 0;
        }
        _ => return true,
    };

    let mut unmasked = false;
    if target_el > cur_el && target_el != 1 {
        if state.features.contains(Features::AARCH64) {
            // EL3 从不被屏蔽；EL2 只在安全态下被屏蔽。
            if target_el == 3 || !secure {
                unmasked = true;
            }
        } else {
            let (hcr_route, scr_route) = match kind {
                ExceptionKind::Fiq => {
                    let hcr_route = hcr_el2 & hcr::FMO != 0;
                    let scr_route = state.cp15.scr_el3 & scr::FIQ != 0
                        && !(state.cp15.scr_el3 & scr::FW != 0 && !hcr_route);
                    (hcr_route, scr_route)
                }
                ExceptionKind::Irq => (hcr_el2 & hcr::IMO != 0, false),
                _ => {
                    let hcr_route = hcr_el2 & hcr::AMO != 0;
                    let scr_route = state.cp15.scr_el3 & scr::EA != 0
                        && !(state.cp15.scr_el3 & scr::AW != 0 && !hcr_route);
                    (hcr_route, scr_route)
                }
            };
            if (scr_route || hcr_route) && !secure {
                unmasked = true;
            }
        }
    }
    unmasked || pstate_unmasked
}

/// 虚拟中断总是发往 EL1。
pub fn async_target_el(state: &CpuState, kind: ExceptionKind) -> u32 {
    match kind {
        ExceptionKind::Virq | ExceptionKind::Vfiq => 1,
        _ => phys_excp_target_el(state, kind, features::current_el(state), features::is_secure(state)),
    }
}

/// M-profile 异常号。
pub mod mexc {
    pub const RESET: u32 = 1;
    pub const NMI: u32 = 2;
    pub const HARD: u32 = 3;
    pub const MEM: u32 = 4;
    pub const BUS: u32 = 5;
    pub const USAGE: u32 = 6;
    pub const SECURE: u32 = 7;
    pub const SVC: u32 = 11;
    pub const DEBUG: u32 = 12;
    pub const PENDSV: u32 = 14;
    pub const SYSTICK: u32 = 15;
    pub const FIRST_IRQ: u32 = 16;

    /// 每个安全态各有一个实例的异常。
    pub fn is_banked(exc: u32) -> bool {
        matches!(exc, HARD | MEM | USAGE | SVC | PENDSV | SYSTICK)
    }

    /// 无法进入时会升级为 HardFault 的同步故障。
    pub fn is_sync_fault(exc: u32) -> bool {
        (HARD..PENDSV).contains(&exc)
    }
}
