//! A-profile 异常进入与返回
//!
//! 同时支持 AArch64 与 AArch32 目标级别。
//!
//! 调用者在调用 [`take`] 之前把首选返回地址放在 PC 中：中止和未定义
//! 指令为出错指令本身，SVC/HVC/SMC 与中断为下一条指令。

use super::ReturnError;
use crate::cpu::features::{self, Features, scr};
use crate::cpu::status::{CpsrWriteType, CpuMode, CpuState, bank, psr, pstate, sctlr};
use crate::cpu::trap::{self, ExcPhase, ExceptionEvent, ExceptionKind, IrqLines, ReturnOutcome, TakeOutcome, syn};
use crate::mmu::{AccessType, TTBCR_EAE};

/// 相对 VBAR_ELx 的向量偏移。
mod vec64 {
    pub const CUR_SP0: u64 = 0x000;
    pub const CUR_SPX: u64 = 0x200;
    pub const LOWER_AA64: u64 = 0x400;
    pub const LOWER_AA32: u64 = 0x600;
    pub const IRQ: u64 = 0x80;
    pub const FIQ: u64 = 0x100;
    pub const SERROR: u64 = 0x180;
}

/// BKPT 作为预取中止进入时的调试事件故障状态。
const FSR_DEBUG_SHORT: u32 = 0x2;
const FSR_DEBUG_LONG: u32 = (1 << 9) | 0x22;

/// 把本架构没有的异常类型映射到已有的类型。
fn normalize(state: &CpuState, event: &ExceptionEvent) -> ExceptionEvent {
    let mut ev = event.clone();
    let kind = match ev.kind {
        ExceptionKind::Nmi | ExceptionKind::MVector(_) => {
            log::warn!("{:?} has no A-profile equivalent, taking as IRQ", ev.kind);
            ExceptionKind::Irq
        }
        ExceptionKind::InvState | ExceptionKind::NoCp => ExceptionKind::Undef,
        ExceptionKind::Hvc if !state.features.contains(Features::EL2) => ExceptionKind::Undef,
        ExceptionKind::Smc if !state.features.contains(Features::EL3) => ExceptionKind::Undef,
        k => k,
    };
    if kind == ExceptionKind::Undef && ev.kind != ExceptionKind::Undef {
        ev.syndrome = syn::uncategorized();
    }
    ev.kind = kind;
    ev
}

/// 同步异常的目标级别。
pub fn sync_target_el(state: &CpuState, event: &ExceptionEvent) -> u32 {
    if let Some(el) = event.target_el {
        return el;
    }
    let has_el3 = state.features.contains(Features::EL3);
    match event.kind {
        ExceptionKind::Hvc | ExceptionKind::HypTrap => return 2,
        ExceptionKind::Smc if has_el3 => return 3,
        _ => {}
    }
    if let Some(fault) = &event.fault {
        if fault.stage2 {
            return 2;
        }
        if fault.ea && has_el3 && state.cp15.scr_el3 & scr::EA != 0 {
            return 3;
        }
    }
    features::exception_target_el(state)
}

/// 当前安全态对应的 AArch32 分组寄存器槽位。
fn aa32_bank(state: &CpuState) -> usize {
    if state.cpu_mode() == Some(CpuMode::Hyp) {
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

/// 识别 `event` 并进入其处理程序，或将其记为挂起。
pub fn take(state: &mut CpuState, event: &ExceptionEvent) -> TakeOutcome {
    let mut event = normalize(state, event);
    let kind = event.kind;
    let cur_el = features::current_el(state);

    let target_el = if kind.is_async() {
        let target = event
            .target_el
            .unwrap_or_else(|| trap::async_target_el(state, kind));
        let secure = features::is_secure(state);
        if !trap::excp_unmasked(state, kind, target, cur_el, secure) {
            state.exception.lines |= IrqLines::from_kind(kind);
            state.exception.pending = Some(event);
            state.exception.phase = ExcPhase::Pending;
            return TakeOutcome::Pending;
        }
        state.exception.lines.remove(IrqLines::from_kind(kind));
        target
    } else {
        sync_target_el(state, &event)
    };

    if let Some(fault) = event.fault {
        let same_el = cur_el == target_el;
        let fsc = fault.long_fsc();
        event.syndrome = match kind {
            ExceptionKind::PrefetchAbort => syn::insn_abort(same_el, fault.ea, fault.s1ptw, fsc),
            _ => syn::data_abort(
                same_el,
                fault.ea,
                fault.s1ptw,
                fault.access == AccessType::Write,
                fsc,
            ),
        };
        if fault.stage2 && target_el == 2 {
            state.cp15.hpfar_el2 = (fault.s2addr >> 8) & !0xf;
        }
    }

    state.exception.syndrome = event.syndrome;
    state.exception.vaddress = event.vaddress;
    state.exception.target_el = target_el;

    let outcome = if features::el_is_aa64(state, target_el) {
        take_aarch64(state, &event, target_el)
    } else if target_el == 2 {
        take_hyp(state, &event)
    } else {
        take_aarch32(state, &event)
    };
    state.exception.phase = ExcPhase::Active;
    outcome
}

fn take_aarch64(state: &mut CpuState, event: &ExceptionEvent, target_el: u32) -> TakeOutcome {
    let cur_el = features::current_el(state);
    let t = target_el as usize;
    let kind = event.kind;

    let mut addr = state.cp15.vbar_el[t];
    if cur_el < target_el {
        let lower_aa64 = match target_el {
            3 => state.cp15.scr_el3 & scr::RW != 0,
            2 => state.cp15.hcr_el2 & features::hcr::RW != 0,
            _ => state.aarch64,
        };
        addr = addr.wrapping_add(if lower_aa64 { vec64::LOWER_AA64 } else { vec64::LOWER_AA32 });
    } else if state.pstate & pstate::SP != 0 {
        addr = addr.wrapping_add(vec64::CUR_SPX);
    } else {
        addr = addr.wrapping_add(vec64::CUR_SP0);
    }
    addr = addr.wrapping_add(match kind {
        ExceptionKind::Irq | ExceptionKind::Virq => vec64::IRQ,
        ExceptionKind::Fiq | ExceptionKind::Vfiq => vec64::FIQ,
        ExceptionKind::SError => vec64::SERROR,
        _ => 0,
    });

    if !matches!(
        kind,
        ExceptionKind::Irq | ExceptionKind::Fiq | ExceptionKind::Virq | ExceptionKind::Vfiq
    ) {
        state.cp15.esr_el[t] = event.syndrome as u64;
    }
    if kind.is_abort() {
        state.cp15.far_el[t] = event.vaddress;
    }

    let old_pstate = if state.aarch64 {
        state.save_sp(cur_el);
        state.pstate_read()
    } else {
        let cpsr = state.cpsr_read();
        state.sync_32_to_64();
        cpsr
    };
    state.banked_spsr[bank::aarch64_spsr(target_el)] = old_pstate as u64;
    state.elr_el[t] = state.pc;

    state.aarch64 = true;
    state.pstate = pstate::mode_elh(target_el);
    state.daif = pstate::DAIF;
    state.restore_sp(target_el);
    state.clear_exclusive();
    state.pc = addr;

    log::debug!(
        "{:?} to AArch64 EL{} from EL{}: vector {:#x}, ELR {:#x}",
        kind,
        target_el,
        cur_el,
        addr,
        state.elr_el[t]
    );
    TakeOutcome::Taken { vector: addr, target_el }
}

/// AArch32 异常的模式、向量偏移、额外 CPSR 掩码与 LR 偏移。
fn aarch32_entry(state: &CpuState, kind: ExceptionKind) -> (CpuMode, u32, u32, u32) {
    match kind {
        ExceptionKind::Undef => (CpuMode::Und, 0x04, psr::I, if state.thumb { 2 } else { 4 }),
        ExceptionKind::Svc => (CpuMode::Svc, 0x08, psr::I, 0),
        ExceptionKind::Smc => (CpuMode::Mon, 0x08, psr::AIF, 0),
        ExceptionKind::PrefetchAbort | ExceptionKind::Bkpt => (CpuMode::Abt, 0x0c, psr::A | psr::I, 4),
        ExceptionKind::DataAbort | ExceptionKind::SError => (CpuMode::Abt, 0x10, psr::A | psr::I, 8),
        ExceptionKind::Fiq | ExceptionKind::Vfiq => (CpuMode::Fiq, 0x1c, psr::AIF, 4),
        _ => (CpuMode::Irq, 0x18, psr::A | psr::I, 4),
    }
}

fn take_aarch32(state: &mut CpuState, event: &ExceptionEvent) -> TakeOutcome {
    let kind = event.kind;
    let (mut mode, offset, mut mask, lr_offset) = aarch32_entry(state, kind);

    if state.features.contains(Features::EL3) {
        let scr_el3 = state.cp15.scr_el3;
        let ea = event.fault.is_some_and(|f| f.ea);
        let to_mon = match kind {
            ExceptionKind::Irq => scr_el3 & scr::IRQ != 0,
            ExceptionKind::Fiq => scr_el3 & scr::FIQ != 0,
            ExceptionKind::PrefetchAbort | ExceptionKind::DataAbort => ea && scr_el3 & scr::EA != 0,
            ExceptionKind::SError => scr_el3 & scr::EA != 0,
            _ => false,
        };
        if to_mon {
            mode = CpuMode::Mon;
            mask |= psr::F;
        }
    }

    let b = aa32_bank(state);
    if kind.is_abort() || kind == ExceptionKind::Bkpt {
        let long = state.features.contains(Features::LPAE) && state.cp15.tcr_el[b] & TTBCR_EAE != 0;
        let fsr = match &event.fault {
            Some(f) => f.fsr(long),
            None if kind == ExceptionKind::Bkpt => {
                if long {
                    FSR_DEBUG_LONG
                } else {
                    FSR_DEBUG_SHORT
                }
            }
            None => 0,
        };
        state.exception.fsr = fsr;
        let far = &mut state.cp15.far_el[b];
        if kind == ExceptionKind::DataAbort {
            state.cp15.esr_el[b] = (state.cp15.esr_el[b] & !0xffff_ffff) | fsr as u64;
            *far = (*far & !0xffff_ffff) | (event.vaddress & 0xffff_ffff);
        } else {
            state.cp15.ifsr[b] = fsr as u64;
            *far = (*far & 0xffff_ffff) | (event.vaddress << 32);
        }
    }

    let base = if mode == CpuMode::Mon {
        state.cp15.mvbar
    } else if state.cp15.sctlr_el[b] & sctlr::V != 0 {
        0xffff_0000
    } else if state.features.contains(Features::V7) || state.features.contains(Features::EL3) {
        state.cp15.vbar_el[b]
    } else {
        0
    };
    if state.cpu_mode() == Some(CpuMode::Mon) {
        state.cp15.scr_el3 &= !scr::NS;
    }
    let vector = (base as u32).wrapping_add(offset);
    enter_aarch32(state, mode, mask, lr_offset, vector);

    let target_el = features::current_el(state);
    log::debug!("{:?} to {:?} (EL{}): vector {:#x}", kind, mode, target_el, vector);
    TakeOutcome::Taken { vector: vector as u64, target_el }
}

/// AArch32 进入 Hyp 模式。
fn take_hyp(state: &mut CpuState, event: &ExceptionEvent) -> TakeOutcome {
    let kind = event.kind;
    let mut offset: u32 = match kind {
        ExceptionKind::Undef => 0x04,
        ExceptionKind::Svc | ExceptionKind::Hvc => 0x08,
        ExceptionKind::PrefetchAbort | ExceptionKind::Bkpt => {
            state.cp15.far_el[2] = (state.cp15.far_el[2] & 0xffff_ffff) | (event.vaddress << 32);
            0x0c
        }
        ExceptionKind::DataAbort => {
            state.cp15.far_el[2] =
                (state.cp15.far_el[2] & !0xffff_ffff) | (event.vaddress & 0xffff_ffff);
            0x10
        }
        ExceptionKind::Irq | ExceptionKind::Virq => 0x18,
        ExceptionKind::Fiq | ExceptionKind::Vfiq => 0x1c,
        _ => 0x14,
    };
    if !matches!(
        kind,
        ExceptionKind::Irq | ExceptionKind::Fiq | ExceptionKind::Virq | ExceptionKind::Vfiq
    ) {
        state.cp15.esr_el[2] = event.syndrome as u64;
    }
    if features::current_el(state) != 2 && offset < 0x14 {
        offset = 0x14;
    }

    let scr_el3 = state.cp15.scr_el3;
    let mut mask = 0;
    if scr_el3 & scr::EA == 0 {
        mask |= psr::A;
    }
    if scr_el3 & scr::IRQ == 0 {
        mask |= psr::I;
    }
    if scr_el3 & scr::FIQ == 0 {
        mask |= psr::F;
    }
    let vector = (state.cp15.vbar_el[2] as u32).wrapping_add(offset);
    enter_aarch32(state, CpuMode::Hyp, mask, 0, vector);

    log::debug!("{:?} to Hyp: vector {:#x}, ELR_hyp {:#x}", kind, vector, state.elr_el[2]);
    TakeOutcome::Taken { vector: vector as u64, target_el: 2 }
}

/// 切换到 `mode`，保存旧 CPSR 与返回地址，然后跳转。
fn enter_aarch32(state: &mut CpuState, mode: CpuMode, mask: u32, lr_offset: u32, vector: u32) {
    let old_cpsr = state.cpsr_read() & !psr::SS;
    let return_pc = state.regs[15];
    state.switch_mode(mode);
    state.spsr = old_cpsr;
    state.condexec_bits = 0;

    let b = aa32_bank(state);
    let sctlr_val = state.cp15.sctlr_el[b];
    state.uncached_cpsr &= !(psr::E | psr::IL | psr::J);
    if sctlr_val & sctlr::EE != 0 {
        state.uncached_cpsr |= psr::E;
    }
    state.daif |= mask;
    state.thumb = sctlr_val & sctlr::TE != 0;
    if mode == CpuMode::Hyp {
        state.elr_el[2] = return_pc as u64;
    } else {
        state.regs[14] = return_pc.wrapping_add(lr_offset);
    }
    state.regs[15] = vector;
    state.clear_exclusive();
}

/// SPSR 中编码的异常级别；编码非法时为 `None`。
fn el_from_spsr(spsr: u32) -> Option<u32> {
    if spsr & pstate::NRW != 0 {
        return match CpuMode::from_bits(spsr)? {
            CpuMode::Usr => Some(0),
            CpuMode::Hyp => Some(2),
            CpuMode::Mon => None,
            _ => Some(1),
        };
    }
    if spsr & 0x2 != 0 || spsr & 0xf == 1 {
        return None;
    }
    Some((spsr >> 2) & 3)
}

/// 从当前模式执行 ERET / 异常返回。
pub fn exception_return(state: &mut CpuState) -> Result<ReturnOutcome, ReturnError> {
    if state.aarch64 {
        eret_aarch64(state)
    } else {
        eret_aarch32(state)
    }
}

fn eret_aarch64(state: &mut CpuState) -> Result<ReturnOutcome, ReturnError> {
    let cur_el = features::current_el(state);
    if cur_el == 0 {
        return Err(ReturnError::NoSavedState);
    }
    let spsr = state.banked_spsr[bank::aarch64_spsr(cur_el)] as u32;
    let new_pc = state.elr_el[cur_el as usize];
    let return_to_aa64 = spsr & pstate::NRW == 0;

    state.save_sp(cur_el);
    state.clear_exclusive();

    let legal = match el_from_spsr(spsr) {
        None => None,
        Some(el) if el > cur_el => None,
        Some(2) if !features::el2_enabled(state) => None,
        Some(el) if el != 0 && features::el_is_aa64(state, el) != return_to_aa64 => None,
        Some(1) if features::hcr_el2_eff(state) & features::hcr::TGE != 0 => None,
        Some(el) => Some(el),
    };
    let Some(new_el) = legal else {
        log::warn!("illegal exception return from EL{} (SPSR {:#x})", cur_el, spsr);
        let keep = state.pstate_read() & !(pstate::NZCV | pstate::DAIF);
        state.pstate_write((spsr & (pstate::NZCV | pstate::DAIF)) | keep | pstate::IL);
        state.pc = new_pc;
        return Ok(ReturnOutcome::Illegal);
    };

    if return_to_aa64 {
        let valid = pstate::NZCV | pstate::DAIF | pstate::IL | pstate::SS | pstate::EL_MASK | pstate::SP;
        state.pstate_write(spsr & valid);
        state.restore_sp(new_el);
        state.pc = new_pc;
    } else {
        state.aarch64 = false;
        if let Some(mode) = CpuMode::from_bits(spsr) {
            state.set_mode_raw(mode);
            state.spsr = state.banked_spsr[mode.bank()] as u32;
        }
        state.cpsr_write(spsr, !psr::M, CpsrWriteType::Raw);
        state.sync_64_to_32();
        let mask = if spsr & psr::T != 0 { !1 } else { !3 };
        state.regs[15] = (new_pc as u32) & mask;
    }
    log::debug!(
        "ERET EL{} -> EL{} ({}), PC {:#x}",
        cur_el,
        new_el,
        if return_to_aa64 { "AArch64" } else { "AArch32" },
        state.pc()
    );
    Ok(ReturnOutcome::Resumed)
}

fn eret_aarch32(state: &mut CpuState) -> Result<ReturnOutcome, ReturnError> {
    let mode = state.cpu_mode();
    let new_pc = match mode {
        None | Some(CpuMode::Usr) | Some(CpuMode::Sys) => return Err(ReturnError::NoSavedState),
        Some(CpuMode::Hyp) => state.elr_el[2] as u32,
        Some(_) => state.regs[14],
    };
    let spsr = state.spsr;
    state.clear_exclusive();
    let accepted = state.cpsr_write(spsr, !0, CpsrWriteType::ExceptionReturn);
    let mask = if state.thumb { !1 } else { !3 };
    state.regs[15] = new_pc & mask;
    if !accepted {
        log::warn!("illegal AArch32 exception return (SPSR {:#x})", spsr);
        return Ok(ReturnOutcome::Illegal);
    }
    log::debug!("exception return to {:?}, PC {:#x}", state.cpu_mode(), state.regs[15]);
    Ok(ReturnOutcome::Resumed)
}
