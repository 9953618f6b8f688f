//! 异常状态机
//!
//! 本模块负责：
//! - 接收异常事件，按 A-profile 或 M-profile 规则进入处理程序
//! - 异常返回时恢复保存的状态并做一致性检查
//! - 把寄存器访问错误转换成可投递的异常事件
//!
//! A-profile 的保存状态位于目标级别的 SPSR/ELR 中；M-profile 在栈上
//! 构造异常栈帧，压栈失败会派生新的故障而不是丢弃原异常。

use thiserror::Error;

use super::cpreg::{CpAccessError, CpRegKey};
use super::features::Features;
use super::status::CpuState;
use super::trap::{ExcPhase, ExceptionEvent, ExceptionKind, ReturnOutcome, TakeOutcome, syn};
use crate::memory::Memory;

pub mod aarch;
pub mod mprofile;
#[cfg(test)]
mod tests;

/// 在没有可返回状态的情况下请求异常返回。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReturnError {
    /// User/System 模式或 EL0：没有可恢复的 SPSR。
    #[error("no saved program status in the current mode")]
    NoSavedState,
    /// M-profile Thread 模式。
    #[error("exception return outside handler mode")]
    NotInHandler,
    /// PC 中不是 EXC_RETURN 值。
    #[error("{0:#010x} is not an EXC_RETURN value")]
    BadExcReturn(u32),
}

/// 立即进入 `event`；若被屏蔽则保持挂起。
pub fn take_exception(state: &mut CpuState, mem: &mut dyn Memory, event: &ExceptionEvent) -> TakeOutcome {
    state.exception.phase = ExcPhase::Taking;
    let outcome = if state.features.contains(Features::M) {
        mprofile::take(state, mem, event)
    } else {
        aarch::take(state, event)
    };
    log::debug!("take {:?} -> {:?}", event.kind, outcome);
    outcome
}

/// 若之前被屏蔽的异常现在可以进入，则投递它。
pub fn deliver_pending(state: &mut CpuState, mem: &mut dyn Memory) -> Option<TakeOutcome> {
    if state.features.contains(Features::M) {
        return mprofile::deliver(state, mem);
    }
    let event = state.exception.pending.take()?;
    state.exception.lines.remove(super::trap::IrqLines::from_kind(event.kind));
    match aarch::take(state, &event) {
        TakeOutcome::Pending => {
            // 仍被屏蔽；`take` 已把它放回。
            None
        }
        outcome => Some(outcome),
    }
}

/// 从当前处理程序返回。
///
/// M-profile 下 EXC_RETURN 值是留在 PC 中的跳转目标。
pub fn return_from_exception(
    state: &mut CpuState,
    mem: &mut dyn Memory,
) -> Result<ReturnOutcome, ReturnError> {
    state.exception.phase = ExcPhase::Returning;
    let result = if state.features.contains(Features::M) {
        let excret = state.regs[15];
        mprofile::exception_return(state, mem, excret)
    } else {
        aarch::exception_return(state)
    };
    state.exception.phase = match result {
        Ok(ReturnOutcome::Faulted { .. } | ReturnOutcome::TailChained { .. }) => ExcPhase::Active,
        Ok(ReturnOutcome::Resumed) if state.features.contains(Features::M) && state.v7m.exception != 0 => {
            ExcPhase::Active
        }
        Ok(_) => ExcPhase::None,
        Err(_) => ExcPhase::Active,
    };
    log::debug!("exception return -> {:?}", result);
    result
}

/// 为失败的系统寄存器访问构造未定义指令事件。
pub fn register_access_event(key: &CpRegKey, err: &CpAccessError, isread: bool, rt: u32) -> ExceptionEvent {
    match *err {
        CpAccessError::Trap { target_el, .. } => {
            let syndrome = if key.aa64 {
                syn::aa64_sysregtrap(
                    key.op0 as u32,
                    key.opc1 as u32,
                    key.opc2 as u32,
                    key.crn as u32,
                    key.crm as u32,
                    rt,
                    isread,
                )
            } else if key.is64 {
                syn::cp15_rrt_trap(1, 0xe, key.opc1 as u32, key.crm as u32, rt, rt + 1, isread)
            } else {
                syn::cp15_rt_trap(
                    1,
                    0xe,
                    key.opc1 as u32,
                    key.opc2 as u32,
                    key.crn as u32,
                    key.crm as u32,
                    rt,
                    isread,
                )
            };
            ExceptionEvent::new(ExceptionKind::Undef)
                .with_syndrome(syndrome)
                .with_target_el(target_el)
        }
        CpAccessError::Undefined { target_el, .. } => {
            ExceptionEvent::new(ExceptionKind::Undef).with_target_el(target_el)
        }
        CpAccessError::Unknown(_) => ExceptionEvent::new(ExceptionKind::Undef),
    }
}
