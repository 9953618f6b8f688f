//! 异常进入与返回测试

use std::collections::HashMap;

use super::mprofile::{self, aircr, cfsr, excret, hfsr, sfsr};
use super::*;
use crate::cpu::cpreg::CpRegKey;
use crate::cpu::features::{self, scr};
use crate::cpu::status::{CpuMode, bank, ccr, psr, pstate, xpsr};
use crate::cpu::trap::mexc;
use crate::memory::{FlatMemory, MemAttrs, MemResult, Memory};
use crate::mmu::{AccessType, FaultKind, FaultRecord, mpu_ctrl, sau};

// ========== A-profile ==========

fn a53_el1() -> CpuState {
    let mut s = CpuState::new((Features::AARCH64 | Features::EL2 | Features::EL3).closure());
    s.reset(0);
    s.cp15.scr_el3 = scr::RW | scr::NS;
    s.cp15.hcr_el2 = features::hcr::RW;
    s.pstate = pstate::mode_elh(1);
    s.daif = 0;
    s.cp15.vbar_el[1] = 0x8_0000;
    s
}

fn a_mem() -> FlatMemory {
    FlatMemory::new(0x1000, 0)
}

#[test]
fn test_aarch64_svc_from_el0_round_trip() {
    let mut s = a53_el1();
    let mut mem = a_mem();
    s.pstate = 0;
    s.xregs[31] = 0x7000;
    s.sp_el[1] = 0x9000;
    s.pc = 0x1004;
    s.set_nzcv(1 << 30);

    let ev = ExceptionEvent::new(ExceptionKind::Svc).with_syndrome(syn::aa64_svc(7));
    let out = take_exception(&mut s, &mut mem, &ev);
    assert_eq!(out, TakeOutcome::Taken { vector: 0x8_0400, target_el: 1 });
    assert_eq!(features::current_el(&s), 1);
    assert_eq!(s.elr_el[1], 0x1004);
    assert_eq!(s.cp15.esr_el[1], syn::aa64_svc(7) as u64);
    assert_eq!(s.banked_spsr[bank::aarch64_spsr(1)] as u32, 1 << 30);
    assert_eq!(s.daif, pstate::DAIF);
    assert_eq!(s.xregs[31], 0x9000);
    assert_eq!(s.sp_el[0], 0x7000);
    assert_eq!(s.exception.phase, ExcPhase::Active);

    let ret = return_from_exception(&mut s, &mut mem).unwrap();
    assert_eq!(ret, ReturnOutcome::Resumed);
    assert_eq!(features::current_el(&s), 0);
    assert_eq!(s.pc, 0x1004);
    assert_eq!(s.xregs[31], 0x7000);
    assert_eq!(s.daif, 0);
    assert_eq!(s.nzcv(), 1 << 30);
    assert_eq!(s.exception.phase, ExcPhase::None);
}

#[test]
fn test_aarch64_same_el_uses_spx_vectors() {
    let mut s = a53_el1();
    let mut mem = a_mem();
    s.pc = 0x2000;
    let f = FaultRecord::new(FaultKind::Permission, AccessType::Write, 0xdead_0000).at_level(3);
    let out = take_exception(&mut s, &mut mem, &ExceptionEvent::from_fault(f));
    assert_eq!(out, TakeOutcome::Taken { vector: 0x8_0200, target_el: 1 });
    let esr = s.cp15.esr_el[1] as u32;
    assert_eq!(syn::get_ec(esr), syn::EC_DATAABORT_SAME_EL);
    assert_eq!(esr & 0x3f, 0xf);
    assert_ne!(esr & (1 << 6), 0);
    assert_eq!(s.cp15.far_el[1], 0xdead_0000);
}

#[test]
fn test_aarch64_illegal_return_sets_il() {
    let mut s = a53_el1();
    let mut mem = a_mem();
    // SPSR 指向 EL2，高于当前级别。
    s.banked_spsr[bank::aarch64_spsr(1)] = (pstate::mode_elh(2) | pstate::NZCV) as u64;
    s.elr_el[1] = 0x4000;
    let ret = return_from_exception(&mut s, &mut mem).unwrap();
    assert_eq!(ret, ReturnOutcome::Illegal);
    assert_eq!(features::current_el(&s), 1);
    assert_ne!(s.pstate & pstate::IL, 0);
    assert_eq!(s.pc, 0x4000);
    assert_eq!(s.nzcv(), pstate::NZCV);
}

#[test]
fn test_masked_irq_stays_pending() {
    let mut s = a53_el1();
    let mut mem = a_mem();
    s.daif = pstate::I;
    s.pc = 0x3000;
    let out = take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Irq));
    assert_eq!(out, TakeOutcome::Pending);
    assert_eq!(s.exception.phase, ExcPhase::Pending);
    assert!(s.exception.lines.contains(crate::cpu::trap::IrqLines::IRQ));
    assert_eq!(deliver_pending(&mut s, &mut mem), None);

    s.daif = 0;
    let out = deliver_pending(&mut s, &mut mem);
    assert_eq!(out, Some(TakeOutcome::Taken { vector: 0x8_0280, target_el: 1 }));
    assert!(s.exception.lines.is_empty());
    assert!(s.exception.pending.is_none());
    assert_eq!(s.elr_el[1], 0x3000);
}

#[test]
fn test_irq_routed_to_el3() {
    let mut s = a53_el1();
    let mut mem = a_mem();
    s.cp15.scr_el3 |= scr::IRQ;
    s.cp15.vbar_el[3] = 0xc_0000;
    s.daif = pstate::I;
    let out = take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Irq));
    assert_eq!(out, TakeOutcome::Taken { vector: 0xc_0480, target_el: 3 });
    assert!(features::is_secure(&s));
}

fn v7_usr() -> CpuState {
    let mut s = CpuState::new(Features::V7.closure());
    s.reset(0);
    s.daif = 0;
    s.switch_mode(CpuMode::Usr);
    s
}

#[test]
fn test_aarch32_svc_round_trip() {
    let mut s = v7_usr();
    let mut mem = a_mem();
    s.regs[13] = 0x7000;
    s.regs[15] = 0x8004;
    let out = take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Svc));
    assert_eq!(out, TakeOutcome::Taken { vector: 0x08, target_el: 1 });
    assert_eq!(s.cpu_mode(), Some(CpuMode::Svc));
    assert_eq!(s.regs[14], 0x8004);
    assert_eq!(s.spsr & psr::M, CpuMode::Usr.bits());
    assert_ne!(s.daif & psr::I, 0);
    assert_eq!(s.daif & psr::F, 0);

    s.regs[13] = 0x5000;
    let ret = return_from_exception(&mut s, &mut mem).unwrap();
    assert_eq!(ret, ReturnOutcome::Resumed);
    assert_eq!(s.cpu_mode(), Some(CpuMode::Usr));
    assert_eq!(s.regs[15], 0x8004);
    assert_eq!(s.regs[13], 0x7000);
    assert_eq!(s.daif, 0);
}

#[test]
fn test_aarch32_return_from_user_mode_fails() {
    let mut s = v7_usr();
    let mut mem = a_mem();
    assert_eq!(return_from_exception(&mut s, &mut mem), Err(ReturnError::NoSavedState));
}

#[test]
fn test_aarch32_abort_records_fsr_and_far() {
    let mut s = v7_usr();
    let mut mem = a_mem();
    s.cp15.vbar_el[1] = 0x1_0000;
    s.regs[15] = 0x8000;
    let f = FaultRecord::new(FaultKind::Translation, AccessType::Read, 0x1234).at_level(2);
    let out = take_exception(&mut s, &mut mem, &ExceptionEvent::from_fault(f));
    assert_eq!(out, TakeOutcome::Taken { vector: 0x1_0010, target_el: 1 });
    assert_eq!(s.cpu_mode(), Some(CpuMode::Abt));
    assert_eq!(s.cp15.esr_el[1] as u32, 0x7);
    assert_eq!(s.cp15.far_el[1] as u32, 0x1234);
    assert_eq!(s.regs[14], 0x8008);

    // BKPT：调试事件 IFSR，高端向量。
    let mut s = v7_usr();
    s.cp15.sctlr_el[1] |= crate::cpu::status::sctlr::V;
    s.regs[15] = 0x8000;
    let out = take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Bkpt));
    assert_eq!(out, TakeOutcome::Taken { vector: 0xffff_000c, target_el: 1 });
    assert_eq!(s.cp15.ifsr[1], 0x2);
}

#[test]
fn test_hyp_entry_and_return() {
    let mut s = CpuState::new((Features::V7VE | Features::EL2 | Features::EL3).closure());
    s.reset(0);
    s.cp15.scr_el3 = scr::NS;
    s.cp15.vbar_el[2] = 0x4000;
    s.daif = 0;
    s.regs[15] = 0x8004;
    assert_eq!(s.cpu_mode(), Some(CpuMode::Svc));

    let ev = ExceptionEvent::new(ExceptionKind::Hvc).with_syndrome(syn::aa32_hvc(1));
    let out = take_exception(&mut s, &mut a_mem(), &ev);
    // 从 Hyp 之外进入时始终使用 Hyp trap 向量。
    assert_eq!(out, TakeOutcome::Taken { vector: 0x4014, target_el: 2 });
    assert_eq!(s.cpu_mode(), Some(CpuMode::Hyp));
    assert_eq!(s.elr_el[2], 0x8004);
    assert_eq!(s.cp15.esr_el[2] as u32, syn::aa32_hvc(1));
    assert_eq!(s.daif & psr::AIF, psr::AIF);

    let ret = return_from_exception(&mut s, &mut a_mem()).unwrap();
    assert_eq!(ret, ReturnOutcome::Resumed);
    assert_eq!(s.cpu_mode(), Some(CpuMode::Svc));
    assert_eq!(s.regs[15], 0x8004);
}

#[test]
fn test_aarch32_irq_routed_to_monitor() {
    let mut s = CpuState::new((Features::V7 | Features::EL3).closure());
    s.reset(0);
    s.cp15.scr_el3 = scr::NS | scr::IRQ;
    s.cp15.mvbar = 0x9000;
    s.daif = 0;
    s.regs[15] = 0x100;
    let out = take_exception(&mut s, &mut a_mem(), &ExceptionEvent::new(ExceptionKind::Irq));
    assert_eq!(out, TakeOutcome::Taken { vector: 0x9018, target_el: 3 });
    assert_eq!(s.cpu_mode(), Some(CpuMode::Mon));
    assert_ne!(s.daif & psr::F, 0);
    assert_eq!(s.regs[14], 0x104);
}

#[test]
fn test_hvc_without_el2_is_undefined() {
    let mut s = v7_usr();
    let out = take_exception(&mut s, &mut a_mem(), &ExceptionEvent::new(ExceptionKind::Hvc));
    assert_eq!(out, TakeOutcome::Taken { vector: 0x04, target_el: 1 });
    assert_eq!(s.cpu_mode(), Some(CpuMode::Und));
}

#[test]
fn test_register_access_event() {
    let key = CpRegKey::aa64(3, 0, 1, 0, 0);
    let err = CpAccessError::Trap { name: "SCTLR_EL1", target_el: 2 };
    let ev = register_access_event(&key, &err, true, 5);
    assert_eq!(ev.kind, ExceptionKind::Undef);
    assert_eq!(ev.target_el, Some(2));
    assert_eq!(syn::get_ec(ev.syndrome), syn::EC_SYSTEMREGISTERTRAP);
    assert_eq!((ev.syndrome >> 5) & 0x1f, 5);
    assert_eq!(ev.syndrome & 1, 1);

    let key = CpRegKey::aa32(15, 1, 0, 0, 0, false);
    let err = CpAccessError::Undefined { name: "SCTLR", target_el: 1 };
    let ev = register_access_event(&key, &err, false, 0);
    assert_eq!(ev.syndrome, syn::uncategorized());
    assert_eq!(ev.target_el, Some(1));
}

// ========== M-profile ==========

const RAM: u32 = 0x2000_0000;
const STACK_TOP: u32 = RAM + 0x8000;
const NS_RAM: u32 = RAM + 0x1_0000;

fn handler(base: u32, exc: u32) -> u32 {
    base + 0x1000 + exc * 0x10
}

fn write_vectors(mem: &mut FlatMemory, base: u32) {
    for exc in 1..48 {
        mem.write_u32((base + exc * 4) as u64, handler(base, exc) | 1).unwrap();
    }
}

fn word(mem: &FlatMemory, addr: u32) -> u32 {
    mem.load32(addr as u64, MemAttrs::SECURE).unwrap()
}

fn m3() -> (CpuState, FlatMemory) {
    let mut s = CpuState::new((Features::M | Features::V7).closure()).with_tables(8, 0, 32);
    s.reset(RAM);
    let mut mem = FlatMemory::new(0x1_0000, RAM as u64);
    write_vectors(&mut mem, RAM);
    s.regs[13] = STACK_TOP;
    (s, mem)
}

fn m33() -> (CpuState, FlatMemory) {
    let mut s = CpuState::new(Features::M_SECURITY.closure()).with_tables(16, 8, 32);
    s.reset(RAM);
    let mut mem = FlatMemory::new(0x2_0000, RAM as u64);
    write_vectors(&mut mem, RAM);
    write_vectors(&mut mem, NS_RAM);
    s.v7m.vecbase[0] = NS_RAM;
    s.sau.ctrl = sau::ctrl::ENABLE;
    s.sau.rbar[0] = NS_RAM;
    s.sau.rlar[0] = (NS_RAM + 0xffe0) | 1;
    s.regs[13] = STACK_TOP;
    s.v7m.sp_bank[0][0] = NS_RAM + 0x8000;
    (s, mem)
}

#[test]
fn test_m_svc_entry_frame() {
    let (mut s, mut mem) = m3();
    s.regs[..4].copy_from_slice(&[0x10, 0x11, 0x12, 0x13]);
    s.regs[12] = 0x1c;
    s.regs[14] = 0x2000_0481;
    s.regs[15] = 0x2000_0400;

    let out = take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Svc));
    assert_eq!(out, TakeOutcome::Taken { vector: handler(RAM, mexc::SVC) as u64, target_el: 1 });
    assert_eq!(s.regs[14], 0xffff_fff9);
    assert_eq!(s.regs[15], handler(RAM, mexc::SVC));
    assert_eq!(s.regs[13], STACK_TOP - 0x20);
    assert_eq!(s.v7m.exception, mexc::SVC);
    assert!(s.thumb);

    let frame: Vec<u32> = (0..8).map(|i| word(&mem, STACK_TOP - 0x20 + 4 * i)).collect();
    assert_eq!(frame, [0x10, 0x11, 0x12, 0x13, 0x1c, 0x2000_0481, 0x2000_0400, xpsr::T]);
}

#[test]
fn test_m_exception_return_round_trip() {
    let (mut s, mut mem) = m3();
    s.regs[0] = 0xaa;
    s.regs[15] = 0x2000_0400;
    take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Svc));
    s.regs[0] = 0;
    s.regs[15] = s.regs[14];

    let ret = return_from_exception(&mut s, &mut mem).unwrap();
    assert_eq!(ret, ReturnOutcome::Resumed);
    assert_eq!(s.regs[0], 0xaa);
    assert_eq!(s.regs[15], 0x2000_0400);
    assert_eq!(s.regs[13], STACK_TOP);
    assert_eq!(s.v7m.exception, 0);
    assert_eq!(s.exception.phase, ExcPhase::None);
    assert!(!s.v7m.excs.vectors[mexc::SVC as usize].active);
}

#[test]
fn test_m_return_outside_handler() {
    let (mut s, mut mem) = m3();
    s.regs[15] = 0xffff_fff9;
    assert_eq!(return_from_exception(&mut s, &mut mem), Err(ReturnError::NotInHandler));
}

#[test]
fn test_m_thread_psp_excret() {
    let (mut s, mut mem) = m3();
    s.v7m.sp_bank[0][1] = RAM + 0x6000;
    s.m_write_spsel(true);
    assert_eq!(s.regs[13], RAM + 0x6000);
    take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Svc));
    assert_eq!(s.regs[14], 0xffff_fffd);
    // 处理程序运行在 MSP 上；栈帧压入了 PSP。
    assert_eq!(s.regs[13], STACK_TOP);
    assert_eq!(s.v7m.sp_bank[0][1], RAM + 0x6000 - 0x20);

    s.regs[15] = s.regs[14];
    assert_eq!(return_from_exception(&mut s, &mut mem), Ok(ReturnOutcome::Resumed));
    assert!(s.m_using_psp());
    assert_eq!(s.regs[13], RAM + 0x6000);
}

#[test]
fn test_m_stack_realign() {
    let (mut s, mut mem) = m3();
    assert_ne!(s.v7m.ccr[0] & ccr::STKALIGN, 0);
    s.regs[13] = STACK_TOP - 4;
    take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Svc));
    assert_eq!(s.regs[13], STACK_TOP - 8 - 0x20);
    assert_ne!(word(&mem, s.regs[13] + 0x1c) & xpsr::SPREALIGN, 0);

    s.regs[15] = s.regs[14];
    return_from_exception(&mut s, &mut mem).unwrap();
    assert_eq!(s.regs[13], STACK_TOP - 4);
}

#[test]
fn test_m_tail_chain_to_pending() {
    let (mut s, mut mem) = m3();
    take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Svc));
    // 与正在运行的 SVC 优先级相同：无法抢占。
    let out = take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::MVector(mexc::PENDSV)));
    assert_eq!(out, TakeOutcome::Pending);
    assert!(s.v7m.excs.vectors[mexc::PENDSV as usize].pending);

    s.regs[15] = s.regs[14];
    let ret = return_from_exception(&mut s, &mut mem).unwrap();
    assert_eq!(ret, ReturnOutcome::TailChained { vector: handler(RAM, mexc::PENDSV) as u64 });
    assert_eq!(s.v7m.exception, mexc::PENDSV);
    assert_eq!(s.exception.phase, ExcPhase::Active);
    // 复用原来的栈帧。
    assert_eq!(s.regs[13], STACK_TOP - 0x20);

    s.regs[15] = s.regs[14];
    assert_eq!(return_from_exception(&mut s, &mut mem), Ok(ReturnOutcome::Resumed));
    assert_eq!(s.regs[13], STACK_TOP);
}

#[test]
fn test_m_priority_preemption() {
    let (mut s, mut mem) = m3();
    let irq = mexc::FIRST_IRQ + 3;
    assert!(mprofile::set_exception_enabled(&mut s, irq, false, true));
    assert!(mprofile::set_exception_priority(&mut s, irq, false, 0x40));
    assert!(mprofile::set_exception_priority(&mut s, mexc::SVC, false, 0x80));
    assert!(!mprofile::set_exception_priority(&mut s, mexc::HARD, false, 0x10));

    take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Svc));
    assert_eq!(mprofile::exec_priority(&s), 0x80);
    let out = take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::MVector(irq)));
    assert_eq!(out, TakeOutcome::Taken { vector: handler(RAM, irq) as u64, target_el: 1 });
    // 从 Handler 模式嵌套进入。
    assert_eq!(s.regs[14], 0xffff_fff1);
    assert_eq!(s.regs[13], STACK_TOP - 0x40);

    // PRIMASK 屏蔽所有可配置异常。
    s.v7m.primask[0] = 1;
    assert_eq!(mprofile::exec_priority(&s), 0);
}

#[test]
fn test_m_data_abort_records_mmfar() {
    let (mut s, mut mem) = m3();
    mprofile::set_exception_enabled(&mut s, mexc::MEM, false, true);
    let f = FaultRecord::new(FaultKind::Background, AccessType::Read, 0x3000_0010);
    let out = take_exception(&mut s, &mut mem, &ExceptionEvent::from_fault(f));
    assert_eq!(out, TakeOutcome::Taken { vector: handler(RAM, mexc::MEM) as u64, target_el: 1 });
    assert_eq!(s.v7m.cfsr[0], cfsr::DACCVIOL | cfsr::MMARVALID);
    assert_eq!(s.v7m.mmfar[0], 0x3000_0010);
}

#[test]
fn test_m_disabled_fault_escalates() {
    let (mut s, mut mem) = m3();
    let out = take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Undef));
    assert_eq!(out, TakeOutcome::Taken { vector: handler(RAM, mexc::HARD) as u64, target_el: 1 });
    assert_eq!(s.v7m.cfsr[0], cfsr::UNDEFINSTR);
    assert_ne!(s.v7m.hfsr & hfsr::FORCED, 0);
    assert_eq!(s.v7m.exception, mexc::HARD);
}

#[test]
fn test_m_stacking_fault_takes_derived_memmanage() {
    let (mut s, mut mem) = m3();
    // MPU 开启但没有区域也没有默认映射：每次访问都故障。
    s.v7m.mpu_ctrl[0] = mpu_ctrl::ENABLE;
    mprofile::set_exception_enabled(&mut s, mexc::MEM, false, true);
    mprofile::set_exception_priority(&mut s, mexc::SVC, false, 0x80);

    let out = take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Svc));
    assert_eq!(out, TakeOutcome::Taken { vector: handler(RAM, mexc::MEM) as u64, target_el: 1 });
    assert_ne!(s.v7m.cfsr[0] & cfsr::MSTKERR, 0);
    assert_eq!(s.v7m.exception, mexc::MEM);
    assert!(s.v7m.excs.vectors[mexc::SVC as usize].pending);
    assert!(!s.v7m.lockup);
    // 无法写入的栈帧仍然移动了 SP。
    assert_eq!(s.regs[13], STACK_TOP - 0x20);
}

/// RAM 加上覆盖其他所有地址的稀疏存储；访问永不失败。
struct SparseBus {
    ram: FlatMemory,
    other: HashMap<u64, u32>,
}

impl SparseBus {
    fn new(ram: FlatMemory) -> Self {
        Self { ram, other: HashMap::new() }
    }
}

impl Memory for SparseBus {
    fn load32(&self, addr: u64, attrs: MemAttrs) -> MemResult<u32> {
        match self.ram.load32(addr, attrs) {
            Ok(v) => Ok(v),
            Err(_) => Ok(self.other.get(&addr).copied().unwrap_or(0)),
        }
    }

    fn load64(&self, addr: u64, attrs: MemAttrs) -> MemResult<u64> {
        let lo = self.load32(addr, attrs)? as u64;
        let hi = self.load32(addr + 4, attrs)? as u64;
        Ok(hi << 32 | lo)
    }

    fn store32(&mut self, addr: u64, value: u32, attrs: MemAttrs) -> MemResult<()> {
        if self.ram.store32(addr, value, attrs).is_err() {
            self.other.insert(addr, value);
        }
        Ok(())
    }
}

#[test]
fn test_m_frames_wrap_around_address_space() {
    let (mut s, mem) = m3();
    let mut bus = SparseBus::new(mem);

    // MSP 刚好高于 0：栈帧回绕到内存顶部。
    s.regs[13] = 0x10;
    s.regs[0] = 0xa0;
    s.regs[12] = 0xc0;
    s.regs[15] = 0x2000_0400;
    let out = take_exception(&mut s, &mut bus, &ExceptionEvent::new(ExceptionKind::Svc));
    assert_eq!(out, TakeOutcome::Taken { vector: handler(RAM, mexc::SVC) as u64, target_el: 1 });
    assert_eq!(s.regs[13], 0xffff_fff0);
    assert_eq!(bus.other.get(&0xffff_fff0), Some(&0xa0));
    assert_eq!(bus.other.get(&0x0), Some(&0xc0));

    s.regs[0] = 0;
    s.regs[15] = s.regs[14];
    assert_eq!(return_from_exception(&mut s, &mut bus), Ok(ReturnOutcome::Resumed));
    assert_eq!(s.regs[13], 0x10);
    assert_eq!(s.regs[0], 0xa0);
    assert_eq!(s.regs[15], 0x2000_0400);

    // PSP 接近顶部：出栈回绕到 0。
    let (mut s, mem) = m3();
    let mut bus = SparseBus::new(mem);
    take_exception(&mut s, &mut bus, &ExceptionEvent::new(ExceptionKind::Svc));
    s.v7m.sp_bank[0][1] = 0xffff_fff0;
    s.regs[15] = 0xffff_fffd;
    assert_eq!(return_from_exception(&mut s, &mut bus), Ok(ReturnOutcome::Resumed));
    assert!(s.m_using_psp());
    assert_eq!(s.regs[13], 0x10);
}

#[test]
fn test_m_fault_in_hardfault_locks_up() {
    let (mut s, mut mem) = m3();
    s.v7m.excs.vectors[mexc::HARD as usize].active = true;
    s.m_set_exception(mexc::HARD);
    let out = take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Undef));
    assert_eq!(out, TakeOutcome::Lockup);
    assert!(s.v7m.lockup);
    let out = take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Svc));
    assert_eq!(out, TakeOutcome::Lockup);
}

#[test]
fn test_m_bad_vector_table_locks_up() {
    let (mut s, mut mem) = m3();
    s.v7m.vecbase[0] = 0x4000_0000;
    let out = take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Svc));
    assert_eq!(out, TakeOutcome::Lockup);
    assert_eq!(s.v7m.hfsr & (hfsr::VECTTBL | hfsr::FORCED), hfsr::VECTTBL | hfsr::FORCED);
    assert!(s.v7m.lockup);
}

#[test]
fn test_m_invalid_excret_is_invpc() {
    let (mut s, mut mem) = m3();
    take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Svc));
    s.regs[15] = 0xffff_fff5;
    let ret = return_from_exception(&mut s, &mut mem).unwrap();
    assert_eq!(ret, ReturnOutcome::Faulted { vector: handler(RAM, mexc::HARD) as u64 });
    assert_ne!(s.v7m.cfsr[0] & cfsr::INVPC, 0);
    assert_ne!(s.v7m.hfsr & hfsr::FORCED, 0);
    assert_eq!(s.v7m.exception, mexc::HARD);
    assert_eq!(s.exception.phase, ExcPhase::Active);

    let (mut s, mut mem) = m3();
    take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Svc));
    s.regs[15] = 0x0800_0000;
    assert_eq!(
        return_from_exception(&mut s, &mut mem),
        Err(ReturnError::BadExcReturn(0x0800_0000))
    );
}

#[test]
fn test_m_secure_to_nonsecure_handler() {
    let (mut s, mut mem) = m33();
    s.v7m.aircr |= aircr::BFHFNMINS;
    for (i, r) in s.regs[..13].iter_mut().enumerate() {
        *r = 0x100 + i as u32;
    }
    s.regs[15] = 0x2000_0400;

    let out = take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Nmi));
    assert_eq!(out, TakeOutcome::Taken { vector: handler(NS_RAM, mexc::NMI) as u64, target_el: 1 });
    assert!(!s.v7m.secure);
    let lr = s.regs[14];
    assert_eq!(lr, 0xffff_fff8);
    assert_eq!(lr & excret::ES, 0);
    assert!(s.regs[..13].iter().all(|&r| r == 0));
    assert_eq!(s.regs[13], NS_RAM + 0x8000);
    // 安全 MSP：基本帧加上其下方的被调用者保存帧。
    let sec_sp = s.v7m.sp_bank[1][0];
    assert_eq!(sec_sp, STACK_TOP - 0x20 - 0x28);
    assert_eq!(word(&mem, sec_sp), mprofile::INTEGRITY_SIG);
    assert_eq!(word(&mem, sec_sp + 8), 0x104);
    assert_eq!(word(&mem, sec_sp + 0x24), 0x10b);

    s.regs[15] = lr;
    let ret = return_from_exception(&mut s, &mut mem).unwrap();
    assert_eq!(ret, ReturnOutcome::Resumed);
    assert!(s.v7m.secure);
    for (i, &r) in s.regs[..13].iter().enumerate() {
        assert_eq!(r, 0x100 + i as u32);
    }
    assert_eq!(s.regs[13], STACK_TOP);
    assert_eq!(s.regs[15], 0x2000_0400);
}

#[test]
fn test_m_callee_frame_fault_locks_up_above_hardfault() {
    let (mut s, mut mem) = m33();
    s.v7m.aircr |= aircr::BFHFNMINS;
    // 只够放下基本帧：被调用者保存帧落在 RAM 之下。
    s.regs[13] = RAM + 0x20;
    s.v7m.vecbase[1] = RAM + 0x400;
    write_vectors(&mut mem, RAM + 0x400);
    s.regs[15] = 0x2000_0400;

    let out = take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Nmi));
    assert_eq!(out, TakeOutcome::Lockup);
    assert!(s.v7m.lockup);
    assert_ne!(s.v7m.cfsr[0] & cfsr::STKERR, 0);
    assert_eq!(s.v7m.hfsr & hfsr::FORCED, 0);
    assert!(s.v7m.secure);
    assert_eq!(s.regs[13], RAM - 0x28);
    assert!(s.v7m.excs.vectors[mexc::NMI as usize].pending);
    assert!(!s.v7m.excs.vectors[mexc::NMI as usize].active);
    assert_eq!(word(&mem, RAM + 0x18), 0x2000_0400);
}

#[test]
fn test_m_callee_frame_fault_taken_once() {
    let (mut s, mut mem) = m33();
    s.regs[13] = RAM + 0x20;
    s.v7m.vecbase[1] = RAM + 0x400;
    write_vectors(&mut mem, RAM + 0x400);
    s.regs[15] = 0x2000_0400;

    assert!(mprofile::set_pending(&mut s, mexc::PENDSV, false, None));
    let out = deliver_pending(&mut s, &mut mem);
    assert_eq!(
        out,
        Some(TakeOutcome::Taken { vector: handler(RAM + 0x400, mexc::HARD) as u64, target_el: 1 })
    );
    assert!(!s.v7m.lockup);
    assert_ne!(s.v7m.cfsr[0] & cfsr::STKERR, 0);
    assert_ne!(s.v7m.hfsr & hfsr::FORCED, 0);
    // HardFault 在已经构造好的栈帧上进入，处于安全态。
    assert!(s.v7m.secure);
    assert_eq!(s.v7m.exception, mexc::HARD);
    assert_eq!(s.regs[13], RAM - 0x28);
    let lr = s.regs[14];
    assert_ne!(lr & excret::ES, 0);
    assert_eq!(lr & excret::DCRS, 0);
    assert!(s.v7m.excs.sec_vectors[mexc::HARD as usize].active);
    assert!(!s.v7m.excs.sec_vectors[mexc::HARD as usize].pending);
    assert!(s.v7m.excs.vectors[mexc::PENDSV as usize].pending);
    assert!(!s.v7m.excs.vectors[mexc::PENDSV as usize].active);
}

#[test]
fn test_m_nonsecure_return_with_es_is_securefault() {
    let (mut s, mut mem) = m33();
    s.v7m.aircr |= aircr::BFHFNMINS;
    take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Nmi));
    assert!(!s.v7m.secure);

    s.regs[15] = s.regs[14] | excret::ES;
    let ret = return_from_exception(&mut s, &mut mem).unwrap();
    assert_eq!(ret, ReturnOutcome::Faulted { vector: handler(RAM, mexc::HARD) as u64 });
    assert_ne!(s.v7m.sfsr & sfsr::INVER, 0);
    assert_ne!(s.v7m.hfsr & hfsr::FORCED, 0);
    assert!(s.v7m.secure);
    assert_eq!(s.v7m.exception, mexc::HARD);
}

#[test]
fn test_m_secure_svc_keeps_secure_state() {
    let (mut s, mut mem) = m33();
    s.regs[4] = 0x44;
    take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Svc));
    assert!(s.v7m.secure);
    assert_eq!(s.regs[14], 0xffff_fff9 | excret::S | excret::DCRS);
    assert_eq!(s.regs[4], 0x44);
    assert_eq!(s.regs[13], STACK_TOP - 0x20);
    assert!(s.v7m.excs.sec_vectors[mexc::SVC as usize].active);

    s.regs[15] = s.regs[14];
    assert_eq!(return_from_exception(&mut s, &mut mem), Ok(ReturnOutcome::Resumed));
    assert_eq!(s.regs[13], STACK_TOP);
}

#[test]
fn test_m_stack_limit_overflow() {
    let (mut s, mut mem) = m33();
    s.v7m.msplim[1] = STACK_TOP - 0x10;
    mprofile::set_exception_enabled(&mut s, mexc::USAGE, true, true);
    mprofile::set_exception_priority(&mut s, mexc::SVC, true, 0x80);
    let out = take_exception(&mut s, &mut mem, &ExceptionEvent::new(ExceptionKind::Svc));
    assert_eq!(out, TakeOutcome::Taken { vector: handler(RAM, mexc::USAGE) as u64, target_el: 1 });
    assert_ne!(s.v7m.cfsr[1] & cfsr::STKOF, 0);
    assert_eq!(s.regs[13], STACK_TOP - 0x10);
}

#[test]
fn test_neg_prio_requested() {
    let (mut s, _) = m33();
    assert!(!mprofile::neg_prio_requested(&s, true));
    s.v7m.faultmask[1] = 1;
    assert!(mprofile::neg_prio_requested(&s, true));
    assert!(!mprofile::neg_prio_requested(&s, false));
    s.v7m.faultmask[1] = 0;
    s.v7m.excs.sec_vectors[mexc::HARD as usize].active = true;
    assert!(mprofile::neg_prio_requested(&s, true));
}
