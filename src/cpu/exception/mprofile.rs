//! M-profile 异常处理
//!
//! 包括挂起/活动异常表、栈帧压栈与出栈、EXC_RETURN 以及 v8-M 安全扩展。
//!
//! 压栈期间产生的故障作为派生异常挂起，随后改为进入优先级最高的挂起异常。
//! 进入派生异常时再次失败不会继续派生；无法升级为 HardFault 时进入锁定 (lockup)。

use super::ReturnError;
use crate::cpu::features::{self, Features};
use crate::cpu::status::{CpuState, VecInfo, ccr, m_control, psr, xpsr};
use crate::cpu::trap::{ExcPhase, ExceptionEvent, ExceptionKind, ReturnOutcome, TakeOutcome, mexc};
use crate::memory::{MemAttrs, Memory};
use crate::mmu::{self, AccessType, FaultKind, MmuIdx, sau};

/// EXC_RETURN 位。
pub mod excret {
    pub const ES: u32 = 1 << 0;
    pub const RES0: u32 = 1 << 1;
    pub const SPSEL: u32 = 1 << 2;
    pub const MODE: u32 = 1 << 3;
    pub const FTYPE: u32 = 1 << 4;
    pub const DCRS: u32 = 1 << 5;
    pub const S: u32 = 1 << 6;
    pub const RES1: u32 = 0xffff_ff80;
    pub const PREFIX: u32 = 0xff00_0000;
}

/// CFSR 位：MMFSR 在 7:0，BFSR 在 15:8，UFSR 在 31:16。
pub mod cfsr {
    pub const IACCVIOL: u32 = 1 << 0;
    pub const DACCVIOL: u32 = 1 << 1;
    pub const MUNSTKERR: u32 = 1 << 3;
    pub const MSTKERR: u32 = 1 << 4;
    pub const MMARVALID: u32 = 1 << 7;
    pub const IBUSERR: u32 = 1 << 8;
    pub const PRECISERR: u32 = 1 << 9;
    pub const IMPRECISERR: u32 = 1 << 10;
    pub const UNSTKERR: u32 = 1 << 11;
    pub const STKERR: u32 = 1 << 12;
    pub const BFARVALID: u32 = 1 << 15;
    pub const UNDEFINSTR: u32 = 1 << 16;
    pub const INVSTATE: u32 = 1 << 17;
    pub const INVPC: u32 = 1 << 18;
    pub const NOCP: u32 = 1 << 19;
    pub const STKOF: u32 = 1 << 20;
    pub const UNALIGNED: u32 = 1 << 24;
}

pub mod hfsr {
    pub const VECTTBL: u32 = 1 << 1;
    pub const FORCED: u32 = 1 << 30;
}

pub mod sfsr {
    pub const INVEP: u32 = 1 << 0;
    pub const INVIS: u32 = 1 << 1;
    pub const INVER: u32 = 1 << 2;
    pub const AUVIOL: u32 = 1 << 3;
    pub const INVTRAN: u32 = 1 << 4;
    pub const SFARVALID: u32 = 1 << 6;
}

pub mod aircr {
    pub const BFHFNMINS: u32 = 1 << 13;
    pub const PRIS: u32 = 1 << 14;
    pub const ENDIANNESS: u32 = 1 << 15;
}

/// 被调用者保存帧底部的签名字（无浮点上下文）。
pub const INTEGRITY_SIG: u32 = 0xfefa_125b;

/// 没有活动异常时的执行优先级。
pub const NOEXC_PRIO: i32 = 0x100;

/// AIRCR.PRIS 置位时非安全 PRIMASK/FAULTMASK 的优先级上限。
const NS_PRIO_LIMIT: i32 = 0x80;

const BASIC_FRAME: u32 = 0x20;
const CALLEE_FRAME: u32 = 0x28;

fn has_security(state: &CpuState) -> bool {
    state.features.contains(Features::M_SECURITY)
}

fn vec_slot(exc: u32, secure: bool) -> (bool, usize) {
    (secure && mexc::is_banked(exc), exc as usize)
}

fn vec_info(state: &CpuState, exc: u32, secure: bool) -> Option<&VecInfo> {
    let (sec, i) = vec_slot(exc, secure);
    let table = if sec { &state.v7m.excs.sec_vectors } else { &state.v7m.excs.vectors };
    table.get(i)
}

fn vec_info_mut(state: &mut CpuState, exc: u32, secure: bool) -> Option<&mut VecInfo> {
    let (sec, i) = vec_slot(exc, secure);
    let table = if sec {
        &mut state.v7m.excs.sec_vectors
    } else {
        &mut state.v7m.excs.vectors
    };
    table.get_mut(i)
}

/// 非分组异常进入的安全态。
pub fn targets_secure(state: &CpuState, exc: u32) -> bool {
    if !has_security(state) {
        return false;
    }
    match exc {
        mexc::NMI | mexc::BUS => state.v7m.aircr & aircr::BFHFNMINS == 0,
        mexc::DEBUG => false,
        // 外部中断：未建模 ITNS，因此全部保持安全。
        _ => true,
    }
}

/// 经 AIRCR.PRIS 提升安全异常后的优先级。
fn group_prio(state: &CpuState, prio: i32, secure: bool) -> i32 {
    if !secure && prio >= 0 && state.v7m.aircr & aircr::PRIS != 0 {
        (prio >> 1) + NS_PRIO_LIMIT
    } else {
        prio
    }
}

/// 异常表中的每一项，附带异常号与安全态。
fn entries(state: &CpuState) -> impl Iterator<Item = (u32, bool, &VecInfo)> {
    let excs = &state.v7m.excs;
    (1..excs.vectors.len() as u32).flat_map(move |exc| {
        let secure_copy = mexc::is_banked(exc)
            .then(|| excs.sec_vectors.get(exc as usize))
            .flatten()
            .map(|v| (exc, true, v));
        let plain = excs.vectors.get(exc as usize).map(|v| {
            let secure = if mexc::is_banked(exc) { false } else { targets_secure(state, exc) };
            (exc, secure, v)
        });
        secure_copy.into_iter().chain(plain)
    })
}

/// 最高优先级活动异常的优先级。
pub fn raw_exec_priority(state: &CpuState) -> i32 {
    entries(state)
        .filter(|(_, _, v)| v.active)
        .map(|(_, secure, v)| group_prio(state, v.prio as i32, secure))
        .min()
        .unwrap_or(NOEXC_PRIO)
}

/// 当前执行优先级，包括 PRIMASK/FAULTMASK/BASEPRI 的提升。
pub fn exec_priority(state: &CpuState) -> i32 {
    let m = &state.v7m;
    let mut running = NOEXC_PRIO;
    if m.basepri[0] > 0 {
        running = group_prio(state, m.basepri[0] as i32, false);
    }
    if m.basepri[1] > 0 {
        running = running.min(group_prio(state, m.basepri[1] as i32, true));
    }
    let pris = m.aircr & aircr::PRIS != 0;
    if m.primask[0] != 0 {
        running = if pris { running.min(NS_PRIO_LIMIT) } else { 0 };
    }
    if m.primask[1] != 0 {
        running = 0;
    }
    if m.faultmask[0] != 0 {
        if m.aircr & aircr::BFHFNMINS != 0 {
            running = -1;
        } else if pris {
            running = running.min(NS_PRIO_LIMIT);
        } else {
            running = 0;
        }
    }
    if m.faultmask[1] != 0 {
        running = if m.aircr & aircr::BFHFNMINS != 0 { -3 } else { -1 };
    }
    running.min(raw_exec_priority(state))
}

/// 给定安全态是否运行在负优先级：其 FAULTMASK 置位，
/// 或其 HardFault 或 NMI 处于活动状态。
pub fn neg_prio_requested(state: &CpuState, secure: bool) -> bool {
    if state.v7m.faultmask[secure as usize] != 0 {
        return true;
    }
    if vec_info(state, mexc::HARD, secure).is_some_and(|v| v.active) {
        return true;
    }
    vec_info(state, mexc::NMI, false).is_some_and(|v| v.active) && targets_secure(state, mexc::NMI) == secure
}

/// 已启用且挂起的最高优先级异常：`(number, secure, priority)`。
/// 优先级相同时取异常号较小者，安全实例优先。
pub fn highest_pending(state: &CpuState) -> Option<(u32, bool, i32)> {
    let mut best: Option<(u32, bool, i32)> = None;
    for (exc, secure, v) in entries(state) {
        if !(v.enabled && v.pending) {
            continue;
        }
        let prio = group_prio(state, v.prio as i32, secure);
        if best.is_none_or(|(_, _, p)| prio < p) {
            best = Some((exc, secure, prio));
        }
    }
    best
}

/// 最高优先级的挂起异常是否抢占当前执行。
pub fn can_take_pending(state: &CpuState) -> bool {
    highest_pending(state).is_some_and(|(_, _, prio)| prio < exec_priority(state))
}

/// 挂起异常 `exc`。`secure` 选择分组异常的实例；
/// 其他异常进入其配置的安全态。
///
/// 被禁用或无法抢占 `derived`（或当前执行优先级）的同步故障
/// 升级为 HardFault。HardFault 也无法抢占时返回 false
/// 并进入锁定。
pub fn set_pending(state: &mut CpuState, exc: u32, secure: bool, derived: Option<i32>) -> bool {
    let mut exc = exc;
    let secure = secure && has_security(state);
    let mut target = if mexc::is_banked(exc) { secure } else { targets_secure(state, exc) };
    let Some(&info) = vec_info(state, exc, target) else {
        log::warn!("pending nonexistent exception {}", exc);
        return true;
    };

    if mexc::is_sync_fault(exc) {
        let running = derived.unwrap_or_else(|| exec_priority(state));
        if !info.enabled || group_prio(state, info.prio as i32, target) >= running {
            let hf_secure = has_security(state) && (target || state.v7m.aircr & aircr::BFHFNMINS == 0);
            let hf_prio = vec_info(state, mexc::HARD, hf_secure).map_or(-1, |v| v.prio as i32);
            if running <= hf_prio {
                log::warn!(
                    "lockup: cannot escalate exception {} to HardFault at priority {}",
                    exc,
                    running
                );
                state.v7m.lockup = true;
                return false;
            }
            log::debug!("escalating exception {} to HardFault", exc);
            exc = mexc::HARD;
            target = hf_secure;
            state.v7m.hfsr |= hfsr::FORCED;
        }
    }
    if let Some(v) = vec_info_mut(state, exc, target) {
        v.pending = true;
    }
    true
}

/// 配置可编程异常的优先级。固定优先级的异常返回 false。
pub fn set_exception_priority(state: &mut CpuState, exc: u32, secure: bool, prio: u8) -> bool {
    if exc < mexc::MEM {
        return false;
    }
    match vec_info_mut(state, exc, secure) {
        Some(v) => {
            v.prio = prio as i16;
            true
        }
        None => false,
    }
}

/// 启用或禁用可配置异常。
pub fn set_exception_enabled(state: &mut CpuState, exc: u32, secure: bool, enabled: bool) -> bool {
    if exc < mexc::MEM {
        return false;
    }
    match vec_info_mut(state, exc, secure) {
        Some(v) => {
            v.enabled = enabled;
            true
        }
        None => false,
    }
}

fn acknowledge(state: &mut CpuState, exc: u32, secure: bool) {
    if let Some(v) = vec_info_mut(state, exc, secure) {
        v.pending = false;
        v.active = true;
    }
    state.m_set_exception(exc);
}

/// 使 `exc` 失活。未处于活动状态时返回 `None`，否则返回
/// 是否已没有其他活动异常。
fn complete_irq(state: &mut CpuState, exc: u32, secure: bool) -> Option<bool> {
    let mut slot = (exc, secure);
    // v8-M 使持有负优先级的那个异常失活。
    if state.features.contains(Features::V8) {
        match raw_exec_priority(state) {
            -1 => slot = (mexc::HARD, state.v7m.aircr & aircr::BFHFNMINS == 0),
            -2 => slot = (mexc::NMI, false),
            -3 => slot = (mexc::HARD, true),
            _ => {}
        }
    }
    if !vec_info(state, slot.0, slot.1).is_some_and(|v| v.active) {
        return None;
    }
    let ret = if !mexc::is_banked(exc) && targets_secure(state, exc) != secure {
        None
    } else {
        Some(rettobase(state))
    };
    if let Some(v) = vec_info_mut(state, slot.0, slot.1) {
        v.active = false;
    }
    ret
}

fn rettobase(state: &CpuState) -> bool {
    let excs = &state.v7m.excs;
    let active = (1..excs.vectors.len())
        .filter(|&i| {
            excs.vectors[i].active
                || (has_security(state) && excs.sec_vectors.get(i).is_some_and(|v| v.active))
        })
        .count();
    active <= 1
}

/// 为 `event` 记录故障状态，并给出它对应的异常。
fn classify(state: &mut CpuState, event: &ExceptionEvent) -> Option<(u32, bool)> {
    let cur = state.v7m.secure;
    let sec = cur as usize;
    let m = &mut state.v7m;
    let result = match event.kind {
        ExceptionKind::Undef | ExceptionKind::Hvc | ExceptionKind::Smc | ExceptionKind::HypTrap => {
            m.cfsr[sec] |= cfsr::UNDEFINSTR;
            (mexc::USAGE, cur)
        }
        ExceptionKind::NoCp => {
            let target = if event.target_el == Some(3) { true } else { cur };
            m.cfsr[target as usize] |= cfsr::NOCP;
            (mexc::USAGE, target)
        }
        ExceptionKind::InvState => {
            m.cfsr[sec] |= cfsr::INVSTATE;
            (mexc::USAGE, cur)
        }
        ExceptionKind::Svc => (mexc::SVC, cur),
        ExceptionKind::Bkpt => (mexc::DEBUG, false),
        ExceptionKind::Nmi => (mexc::NMI, false),
        ExceptionKind::MVector(n) => (n, cur),
        ExceptionKind::Irq | ExceptionKind::Fiq | ExceptionKind::Virq | ExceptionKind::Vfiq => {
            (mexc::FIRST_IRQ, cur)
        }
        ExceptionKind::SError => {
            m.cfsr[0] |= cfsr::IMPRECISERR;
            (mexc::BUS, false)
        }
        ExceptionKind::PrefetchAbort | ExceptionKind::DataAbort => {
            let fetch = event.kind == ExceptionKind::PrefetchAbort;
            let addr = event.vaddress as u32;
            let kind = event.fault.map(|f| f.kind);
            let ea = event.fault.is_some_and(|f| f.ea);
            match kind {
                // SG 的模拟由解码器负责；到达这里的都是 INVEP。
                Some(FaultKind::NsCallableFetch) => {
                    m.sfsr |= sfsr::INVEP;
                    (mexc::SECURE, false)
                }
                Some(FaultKind::SecurityViolation | FaultKind::SecurityAmbiguous) => {
                    m.sfsr |= if !fetch {
                        sfsr::AUVIOL
                    } else if cur {
                        sfsr::INVTRAN
                    } else {
                        sfsr::INVEP
                    };
                    (mexc::SECURE, false)
                }
                Some(FaultKind::Alignment) => {
                    m.cfsr[sec] |= cfsr::UNALIGNED;
                    (mexc::USAGE, cur)
                }
                _ if ea => {
                    if fetch {
                        m.cfsr[0] |= cfsr::IBUSERR;
                    } else {
                        m.cfsr[0] |= cfsr::PRECISERR | cfsr::BFARVALID;
                        m.bfar = addr;
                    }
                    (mexc::BUS, false)
                }
                _ => {
                    if fetch {
                        m.cfsr[sec] |= cfsr::IACCVIOL;
                    } else {
                        m.cfsr[sec] |= cfsr::DACCVIOL | cfsr::MMARVALID;
                        m.mmfar[sec] = addr;
                    }
                    (mexc::MEM, cur)
                }
            }
        }
    };
    let (exc, _) = result;
    if exc == 0 || exc as usize >= state.v7m.excs.vectors.len() {
        log::warn!("{:?} names no exception vector", event.kind);
        return None;
    }
    Some(result)
}

/// 挂起 `event`，若最高优先级的挂起异常抢占当前执行则进入它。
pub fn take(state: &mut CpuState, mem: &mut dyn Memory, event: &ExceptionEvent) -> TakeOutcome {
    if state.v7m.lockup {
        log::warn!("{:?} ignored: processor is in lockup", event.kind);
        return TakeOutcome::Lockup;
    }
    state.exception.syndrome = event.syndrome;
    state.exception.vaddress = event.vaddress;
    let Some((exc, secure)) = classify(state, event) else {
        return TakeOutcome::Pending;
    };
    if !set_pending(state, exc, secure, None) {
        return TakeOutcome::Lockup;
    }
    deliver(state, mem).unwrap_or_else(|| {
        state.exception.phase = ExcPhase::Pending;
        TakeOutcome::Pending
    })
}

/// 若最高优先级的挂起异常抢占当前执行则进入它：
/// 在当前栈上压入栈帧并进入处理程序。
pub fn deliver(state: &mut CpuState, mem: &mut dyn Memory) -> Option<TakeOutcome> {
    if state.v7m.lockup {
        return Some(TakeOutcome::Lockup);
    }
    if !can_take_pending(state) {
        return None;
    }
    let lr = entry_excret(state);
    let failed = push_stack(state, mem);
    Some(exception_taken(state, mem, lr, false, failed))
}

/// 从当前状态进入异常时的 EXC_RETURN，尚未填入
/// 取决于目标的位。
fn entry_excret(state: &CpuState) -> u32 {
    let mut lr = if state.features.contains(Features::V8) {
        let mut lr = excret::RES1 | excret::DCRS;
        if state.v7m.secure {
            lr |= excret::S;
        }
        lr
    } else {
        let mut lr = excret::RES1 | excret::S | excret::DCRS | excret::ES;
        if state.v7m.control[0] & m_control::SPSEL != 0 {
            lr |= excret::SPSEL;
        }
        lr
    };
    if state.v7m.control[1] & m_control::FPCA == 0 {
        lr |= excret::FTYPE;
    }
    if !features::is_handler_mode(state) {
        lr |= excret::MODE;
    }
    lr
}

fn sp_limit(state: &CpuState) -> u32 {
    let sec = state.v7m.secure as usize;
    if state.m_using_psp() {
        state.v7m.psplim[sec]
    } else {
        state.v7m.msplim[sec]
    }
}

/// 栈访问失败时的故障处理方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stacking {
    /// 挂起派生异常，按该优先级判断是否升级。
    Derived(i32),
    /// 只记录故障状态。
    IgnoreFaults,
}

fn stack_write(
    state: &mut CpuState,
    mem: &mut dyn Memory,
    addr: u32,
    value: u32,
    idx: MmuIdx,
    mode: Stacking,
) -> bool {
    let secure = idx.is_secure();
    let (exc, exc_secure) = match mmu::translate(state, &*mem, addr as u64, AccessType::Write, idx) {
        Ok(t) => match mem.store32(t.phys, value, MemAttrs { secure: t.secure }) {
            Ok(()) => return true,
            Err(e) => {
                log::debug!("BusFault with BFSR.STKERR: {}", e);
                state.v7m.cfsr[0] |= cfsr::STKERR;
                (mexc::BUS, false)
            }
        },
        Err(f) if matches!(f.kind, FaultKind::SecurityViolation | FaultKind::SecurityAmbiguous) => {
            log::debug!("SecureFault with SFSR.AUVIOL during stacking at {:#x}", addr);
            state.v7m.sfsr |= sfsr::AUVIOL | sfsr::SFARVALID;
            state.v7m.sfar = addr;
            (mexc::SECURE, false)
        }
        Err(f) => {
            log::debug!("MemManage with MMFSR.MSTKERR ({:?}) at {:#x}", f.kind, addr);
            state.v7m.cfsr[secure as usize] |= cfsr::MSTKERR;
            (mexc::MEM, secure)
        }
    };
    if let Stacking::Derived(prio) = mode {
        set_pending(state, exc, exc_secure, Some(prio));
    }
    false
}

fn stack_read(state: &mut CpuState, mem: &dyn Memory, addr: u32, idx: MmuIdx) -> Option<u32> {
    let secure = idx.is_secure();
    let (exc, exc_secure) = match mmu::translate(state, mem, addr as u64, AccessType::Read, idx) {
        Ok(t) => match mem.load32(t.phys, MemAttrs { secure: t.secure }) {
            Ok(v) => return Some(v),
            Err(e) => {
                log::debug!("BusFault with BFSR.UNSTKERR: {}", e);
                state.v7m.cfsr[0] |= cfsr::UNSTKERR;
                (mexc::BUS, false)
            }
        },
        Err(f) if matches!(f.kind, FaultKind::SecurityViolation | FaultKind::SecurityAmbiguous) => {
            log::debug!("SecureFault with SFSR.AUVIOL during unstacking at {:#x}", addr);
            state.v7m.sfsr |= sfsr::AUVIOL | sfsr::SFARVALID;
            state.v7m.sfar = addr;
            (mexc::SECURE, false)
        }
        Err(f) => {
            log::debug!("MemManage with MMFSR.MUNSTKERR ({:?}) at {:#x}", f.kind, addr);
            state.v7m.cfsr[secure as usize] |= cfsr::MUNSTKERR;
            (mexc::MEM, secure)
        }
    };
    set_pending(state, exc, exc_secure, None);
    None
}

fn pending_prio(state: &CpuState) -> i32 {
    highest_pending(state).map_or(NOEXC_PRIO, |(_, _, prio)| prio)
}

/// 在当前栈上压入 8 字基本帧。派生异常被挂起时返回 true，
/// 之后的压栈故障将被忽略。
fn push_stack(state: &mut CpuState, mem: &mut dyn Memory) -> bool {
    let derived = pending_prio(state);
    let sec = state.v7m.secure;
    let mut frame_xpsr = state.xpsr_read();
    let mut frameptr = state.regs[13];

    if frameptr & 4 != 0 && state.v7m.ccr[sec as usize] & ccr::STKALIGN != 0 {
        frameptr = frameptr.wrapping_sub(4);
        frame_xpsr |= xpsr::SPREALIGN;
    }
    frame_xpsr &= !xpsr::SFPA;
    if sec && state.v7m.control[1] & m_control::SFPA != 0 {
        frame_xpsr |= xpsr::SFPA;
    }
    frameptr = frameptr.wrapping_sub(BASIC_FRAME);

    if state.features.contains(Features::V8) {
        let limit = sp_limit(state);
        if frameptr < limit {
            log::debug!("STKOF during stacking: {:#x} below limit {:#x}", frameptr, limit);
            state.v7m.cfsr[sec as usize] |= cfsr::STKOF;
            set_pending(state, mexc::USAGE, sec, Some(derived));
            state.regs[13] = limit;
            return true;
        }
    }

    let idx = mmu::current_mmu_idx(state);
    let r = state.regs;
    let words = [r[0], r[1], r[2], r[3], r[12], r[14], r[15], frame_xpsr];
    let stacked_ok = words.iter().enumerate().all(|(i, &value)| {
        let addr = frameptr.wrapping_add(4 * i as u32);
        stack_write(state, mem, addr, value, idx, Stacking::Derived(derived))
    });
    state.regs[13] = frameptr;
    !stacked_ok
}

/// 进入非安全处理程序前，压入安全后台代码的被调用者保存帧。
/// 失败时返回 true。
fn push_callee_stack(
    state: &mut CpuState,
    mem: &mut dyn Memory,
    lr: u32,
    dotailchain: bool,
    ignore_faults: bool,
) -> bool {
    let mode = if ignore_faults {
        Stacking::IgnoreFaults
    } else {
        Stacking::Derived(pending_prio(state))
    };
    let (idx, want_psp, limit) = if dotailchain {
        let thread = lr & excret::MODE != 0;
        let privileged = !thread || state.v7m.control[1] & m_control::NPRIV == 0;
        let want_psp = thread && lr & excret::SPSEL != 0;
        let limit = if want_psp { state.v7m.psplim[1] } else { state.v7m.msplim[1] };
        (mmu::m_mmu_idx(state, true, privileged), want_psp, limit)
    } else {
        (mmu::current_mmu_idx(state), state.m_using_psp(), sp_limit(state))
    };

    let frameptr = state.m_sp(true, want_psp).wrapping_sub(CALLEE_FRAME);
    if frameptr < limit {
        log::debug!("STKOF during callee-saved stacking");
        let sec = state.v7m.secure;
        state.v7m.cfsr[sec as usize] |= cfsr::STKOF;
        set_pending(state, mexc::USAGE, sec, None);
        state.set_m_sp(true, want_psp, limit);
        return true;
    }

    let r = state.regs;
    let mut words = vec![(frameptr, INTEGRITY_SIG)];
    words.extend((4..12).map(|n| (frameptr.wrapping_add(8 + 4 * (n as u32 - 4)), r[n])));
    let stacked_ok = words
        .into_iter()
        .all(|(addr, value)| stack_write(state, mem, addr, value, idx, mode));
    state.set_m_sp(true, want_psp, frameptr);
    !stacked_ok
}

/// 读取 `exc` 的处理程序地址。读取失败时挂起 HardFault
/// 并置位 HFSR.VECTTBL。
fn load_vector(state: &mut CpuState, mem: &dyn Memory, exc: u32, targets_secure: bool, prio: i32) -> Option<u32> {
    let addr = state.v7m.vecbase[targets_secure as usize].wrapping_add(exc * 4);
    let bfhfnmins = state.v7m.aircr & aircr::BFHFNMINS != 0;
    let mut attrs = MemAttrs { secure: targets_secure };

    let mut failed = false;
    if has_security(state) {
        let idx = mmu::m_mmu_idx(state, targets_secure, true);
        let ns = sau::security_lookup(state, addr, AccessType::Read, idx).is_ok_and(|s| s.ns);
        if ns {
            attrs.secure = false;
        } else if !targets_secure {
            log::debug!("non-secure vector fetch from secure memory at {:#x}", addr);
            failed = true;
        }
    }
    if !failed {
        match mem.load32(addr as u64, attrs) {
            Ok(entry) => {
                log::debug!("vector {} at {:#x}: {:#x}", exc, addr, entry);
                return Some(entry);
            }
            Err(e) => {
                log::debug!("vector table load failed: {}", e);
            }
        }
    }

    // SecureFault 始终为安全；BusFault 除非 BFHFNMINS 否则为安全。
    let exc_secure = has_security(state) && (targets_secure || !bfhfnmins);
    state.v7m.hfsr |= hfsr::VECTTBL | hfsr::FORCED;
    set_pending(state, mexc::HARD, exc_secure, Some(prio));
    None
}

/// 进入最高优先级的挂起异常。基本帧已经压入，
/// 或属于尾链前的那个异常。
pub fn exception_taken(
    state: &mut CpuState,
    mem: &mut dyn Memory,
    lr: u32,
    dotailchain: bool,
    ignore_stackfaults: bool,
) -> TakeOutcome {
    if state.v7m.lockup {
        return TakeOutcome::Lockup;
    }
    let Some((exc, targets_secure, prio)) = highest_pending(state) else {
        log::warn!("lockup: no pending exception to take");
        state.v7m.lockup = true;
        return TakeOutcome::Lockup;
    };
    let mut lr = lr;
    let mut push_failed = false;

    if dotailchain {
        lr |= excret::FTYPE | excret::PREFIX;
    }

    if state.features.contains(Features::V8) {
        if has_security(state) && lr & excret::S != 0 {
            if targets_secure {
                if dotailchain && lr & excret::ES == 0 {
                    lr &= !excret::DCRS;
                }
            } else {
                if lr & excret::DCRS != 0 && !(dotailchain && lr & excret::ES == 0) {
                    push_failed = push_callee_stack(state, mem, lr, dotailchain, ignore_stackfaults);
                }
                lr |= excret::DCRS;
            }
        }

        lr &= !(excret::ES | excret::SPSEL);
        if targets_secure {
            lr |= excret::ES;
        }
        if state.v7m.control[targets_secure as usize] & m_control::SPSEL != 0 {
            lr |= excret::SPSEL;
        }

        if has_security(state) && !targets_secure {
            let zero_callee = lr & excret::S != 0;
            for (i, reg) in state.regs[..13].iter_mut().enumerate() {
                if i < 4 || i > 11 || zero_callee {
                    *reg = 0;
                }
            }
            state.xpsr_write(0, psr::NZCV | psr::Q | psr::GE | psr::IT_0_1 | psr::IT_2_7);
        }
    }

    if push_failed && !ignore_stackfaults {
        log::debug!("derived exception on callee-saved stacking");
        return exception_taken(state, mem, lr, true, true);
    }

    let Some(addr) = load_vector(state, &*mem, exc, targets_secure, prio) else {
        if state.v7m.lockup {
            return TakeOutcome::Lockup;
        }
        log::debug!("derived exception on vector table load");
        return exception_taken(state, mem, lr, true, true);
    };

    acknowledge(state, exc, targets_secure);
    state.m_switch_security(targets_secure);
    state.m_write_spsel(false);
    state.clear_exclusive();
    state.v7m.control[1] &= !(m_control::FPCA | m_control::SFPA);
    state.condexec_bits = 0;
    state.regs[14] = lr;
    state.regs[15] = addr & !1;
    state.thumb = addr & 1 != 0;
    state.exception.phase = ExcPhase::Active;

    log::debug!(
        "taking {} exception {} (priority {}): PC {:#x}, EXC_RETURN {:#x}",
        if targets_secure { "secure" } else { "non-secure" },
        exc,
        prio,
        addr & !1,
        lr
    );
    TakeOutcome::Taken { vector: (addr & !1) as u64, target_el: 1 }
}

/// 不返回，而是在现有栈帧上进入挂起的异常。
fn tail_chain(state: &mut CpuState, mem: &mut dyn Memory, excret: u32, faulted: bool) -> ReturnOutcome {
    match exception_taken(state, mem, excret, true, false) {
        TakeOutcome::Taken { vector, .. } if faulted => ReturnOutcome::Faulted { vector },
        TakeOutcome::Taken { vector, .. } => ReturnOutcome::TailChained { vector },
        TakeOutcome::Pending | TakeOutcome::Lockup => ReturnOutcome::Lockup,
    }
}

/// 通过 EXC_RETURN 值 `excret` 执行异常返回。
pub fn exception_return(
    state: &mut CpuState,
    mem: &mut dyn Memory,
    excret: u32,
) -> Result<ReturnOutcome, ReturnError> {
    if !features::is_handler_mode(state) {
        return Err(ReturnError::NotInHandler);
    }
    if excret & excret::PREFIX != excret::PREFIX {
        return Err(ReturnError::BadExcReturn(excret));
    }
    if state.v7m.lockup {
        return Ok(ReturnOutcome::Lockup);
    }
    let has_sec = has_security(state);
    let v8 = state.features.contains(Features::V8);
    let mut excret = excret;
    let mut sfault = false;
    let mut ufault = false;
    let mut exc_secure = false;

    if has_sec {
        if !state.v7m.secure && (excret & excret::ES != 0 || excret & excret::DCRS == 0) {
            sfault = true;
            excret &= !excret::ES;
        }
        exc_secure = excret & excret::ES != 0;
    }

    let exc = state.v7m.exception;
    if exc != mexc::NMI {
        if has_sec {
            if raw_exec_priority(state) >= 0 {
                state.v7m.faultmask[exc_secure as usize] = 0;
            }
        } else {
            state.v7m.faultmask[0] = 0;
        }
    }

    let rettobase = match complete_irq(state, exc, exc_secure) {
        Some(r) => r,
        None => {
            ufault = true;
            false
        }
    };

    let return_to_handler = excret & excret::MODE == 0;
    let return_to_psp = excret & excret::SPSEL != 0;
    let return_to_secure = has_sec && excret & excret::S != 0;

    if v8 {
        if !has_sec && (excret & (excret::S | excret::ES) != 0 || excret & excret::DCRS == 0) {
            ufault = true;
        }
        if excret & excret::RES0 != 0 {
            ufault = true;
        }
    } else {
        match excret & 0xf {
            0x1 => {}
            0x9 | 0xd => {
                let sec = state.v7m.secure as usize;
                if !rettobase && state.v7m.ccr[sec] & ccr::NONBASETHRDENA == 0 {
                    ufault = true;
                }
            }
            _ => ufault = true,
        }
    }

    state.m_write_spsel_for(exc_secure, return_to_psp);

    if sfault {
        state.v7m.sfsr |= sfsr::INVER;
        set_pending(state, mexc::SECURE, false, None);
        log::debug!("SecureFault on existing frame: EXC_RETURN.ES check failed");
        return Ok(tail_chain(state, mem, excret, true));
    }
    if ufault {
        let sec = state.v7m.secure;
        state.v7m.cfsr[sec as usize] |= cfsr::INVPC;
        set_pending(state, mexc::USAGE, sec, None);
        log::debug!("UsageFault INVPC on existing frame (EXC_RETURN {:#x})", excret);
        return Ok(tail_chain(state, mem, excret, true));
    }
    if can_take_pending(state) {
        log::debug!("tail-chaining to pending exception");
        return Ok(tail_chain(state, mem, excret, false));
    }

    state.m_switch_security(return_to_secure);

    let want_psp = !return_to_handler && return_to_psp;
    let mut frameptr = state.m_sp(return_to_secure, want_psp);
    let return_to_priv =
        return_to_handler || state.v7m.control[return_to_secure as usize] & m_control::NPRIV == 0;
    let idx = mmu::m_mmu_idx(state, return_to_secure, return_to_priv);
    if frameptr & 7 != 0 && v8 {
        log::warn!("exception return with non-8-aligned SP {:#x}", frameptr);
    }

    let mut callee = None;
    if return_to_secure && (excret & excret::ES == 0 || excret & excret::DCRS == 0) {
        let Some(sig) = stack_read(state, &*mem, frameptr, idx) else {
            return Ok(tail_chain(state, mem, excret, true));
        };
        if sig != INTEGRITY_SIG {
            state.v7m.sfsr |= sfsr::INVIS;
            set_pending(state, mexc::SECURE, false, None);
            log::debug!("SecureFault on existing frame: integrity signature {:#x}", sig);
            return Ok(tail_chain(state, mem, excret, true));
        }
        let mut saved = [0u32; 8];
        for (i, slot) in saved.iter_mut().enumerate() {
            match stack_read(state, &*mem, frameptr.wrapping_add(8 + 4 * i as u32), idx) {
                Some(v) => *slot = v,
                None => return Ok(tail_chain(state, mem, excret, true)),
            }
        }
        callee = Some(saved);
        frameptr = frameptr.wrapping_add(CALLEE_FRAME);
    }

    let mut frame = [0u32; 8];
    for (i, slot) in frame.iter_mut().enumerate() {
        match stack_read(state, &*mem, frameptr.wrapping_add(4 * i as u32), idx) {
            Some(v) => *slot = v,
            None => {
                log::debug!("derived exception on unstacking");
                return Ok(tail_chain(state, mem, excret, true));
            }
        }
    }
    let mut pc = frame[6];
    let frame_xpsr = frame[7];
    if pc & 1 != 0 {
        if !v8 {
            log::warn!("exception return to odd PC {:#x}", pc);
        }
        pc &= !1;
    }

    if v8 && return_to_handler != (frame_xpsr & xpsr::EXCP != 0) {
        let sec = state.v7m.secure;
        set_pending(state, mexc::USAGE, sec, None);
        state.v7m.cfsr[sec as usize] |= cfsr::INVPC;
        log::debug!("UsageFault INVPC: frame xPSR disagrees with EXC_RETURN.Mode");
        return Ok(tail_chain(state, mem, excret, true));
    }

    state.regs[..4].copy_from_slice(&frame[..4]);
    state.regs[12] = frame[4];
    state.regs[14] = frame[5];
    state.regs[15] = pc;
    if let Some(saved) = callee {
        state.regs[4..12].copy_from_slice(&saved);
    }

    frameptr = frameptr.wrapping_add(BASIC_FRAME);
    if frame_xpsr & xpsr::SPREALIGN != 0 {
        frameptr |= 4;
    }
    state.set_m_sp(return_to_secure, want_psp, frameptr);
    state.xpsr_write(frame_xpsr, !(xpsr::SPREALIGN | xpsr::SFPA));
    if state.v7m.secure {
        if frame_xpsr & xpsr::SFPA != 0 {
            state.v7m.control[1] |= m_control::SFPA;
        } else {
            state.v7m.control[1] &= !m_control::SFPA;
        }
    }

    if return_to_handler != features::is_handler_mode(state) {
        set_pending(state, mexc::USAGE, false, None);
        let sec = state.v7m.secure as usize;
        state.v7m.cfsr[sec] |= cfsr::INVPC;
        log::debug!("UsageFault INVPC on new frame: xPSR disagrees with EXC_RETURN.Mode");
        let ignore = push_stack(state, mem);
        return Ok(match exception_taken(state, mem, excret, false, ignore) {
            TakeOutcome::Taken { vector, .. } => ReturnOutcome::Faulted { vector },
            TakeOutcome::Pending | TakeOutcome::Lockup => ReturnOutcome::Lockup,
        });
    }

    state.clear_exclusive();
    log::debug!(
        "exception return to {} {} mode, PC {:#x}",
        if return_to_secure { "secure" } else { "non-secure" },
        if return_to_handler { "handler" } else { "thread" },
        pc
    );
    Ok(ReturnOutcome::Resumed)
}
