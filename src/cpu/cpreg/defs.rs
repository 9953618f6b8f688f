//! 系统寄存器定义表
//!
//! 按引入该寄存器的架构特性分组。
//!
//! 设计原则：
//! - 每组寄存器是一张静态表，按特性注册
//! - 依赖 CPU 模型参数（ID 值、区域数、断点数）的表由函数生成
//! - 存储位置用 `Field` 命名，安全态分组用 `Storage::Banked`
//! - 副作用（TLB 刷新、掩码）只出现在 write 回调中

use super::{
    ANY, Access, CpAccess, CpRegDef, CpRegInfo, CpRegistry, DefineError, Field, OtherBank, RegState,
    RegType, SecState, Slot, Storage,
};
use crate::config::CpuConfig;
use crate::cpu::features::{self, Features, hcr, scr};
use crate::cpu::status::{CpuState, bank, pstate, sctlr};
use crate::cpu::trap::IrqLines;
use crate::mmu::MmuIdxSet;

const D: CpRegDef = CpRegDef::DEFAULT;

/// CPTR_EL2/CPTR_EL3.TCPAC
const CPTR_TCPAC: u64 = 1 << 31;
/// MDCR_EL2/MDCR_EL3.TDA
const MDCR_TDA: u64 = 1 << 9;
/// SCTLR_EL1.UCI
const SCTLR_UCI: u64 = 1 << 26;

const fn slot(f: Field) -> Storage {
    Storage::Slot(Slot::full(f))
}

const fn slot_lo(f: Field) -> Storage {
    Storage::Slot(Slot::lo(f))
}

const fn slot_hi(f: Field) -> Storage {
    Storage::Slot(Slot::hi(f))
}

const fn banked(s: Field, ns: Field) -> Storage {
    Storage::Banked { s: Slot::full(s), ns: Slot::full(ns) }
}

const fn banked_lo(s: Field, ns: Field) -> Storage {
    Storage::Banked { s: Slot::lo(s), ns: Slot::lo(ns) }
}

const fn banked_hi(s: Field, ns: Field) -> Storage {
    Storage::Banked { s: Slot::hi(s), ns: Slot::hi(ns) }
}

// ========== 访问检查 ==========

fn access_tvm_trvm(state: &CpuState, _ri: &CpRegInfo, isread: bool) -> CpAccess {
    if features::current_el(state) == 1 {
        let trap = if isread { hcr::TRVM } else { hcr::TVM };
        if features::hcr_el2_eff(state) & trap != 0 {
            return CpAccess::TrapEl(2);
        }
    }
    CpAccess::Ok
}

fn access_cpacr(state: &CpuState, _ri: &CpRegInfo, _isread: bool) -> CpAccess {
    if state.features.contains(Features::V8) {
        let el = features::current_el(state);
        if el == 1 && features::el2_enabled(state) && state.cp15.cptr_el[2] & CPTR_TCPAC != 0 {
            return CpAccess::TrapEl(2);
        }
        if el < 3 && state.features.contains(Features::EL3) && state.cp15.cptr_el[3] & CPTR_TCPAC != 0 {
            return CpAccess::TrapEl(3);
        }
    }
    CpAccess::Ok
}

fn access_tda(state: &CpuState, _ri: &CpRegInfo, _isread: bool) -> CpAccess {
    let el = features::current_el(state);
    if el < 2 && features::el2_enabled(state) && state.cp15.mdcr_el2 & MDCR_TDA != 0 {
        return CpAccess::TrapEl(2);
    }
    if el < 3 && state.features.contains(Features::EL3) && state.cp15.mdcr_el3 & MDCR_TDA != 0 {
        return CpAccess::TrapEl(3);
    }
    CpAccess::Ok
}

fn access_daif(state: &CpuState, _ri: &CpRegInfo, _isread: bool) -> CpAccess {
    if features::current_el(state) == 0 && state.cp15.sctlr_el[1] & sctlr::UMA == 0 {
        return CpAccess::Trap;
    }
    CpAccess::Ok
}

fn access_ctr(state: &CpuState, _ri: &CpRegInfo, _isread: bool) -> CpAccess {
    if features::current_el(state) == 0 && state.cp15.sctlr_el[1] & sctlr::UCT == 0 {
        return CpAccess::Trap;
    }
    CpAccess::Ok
}

fn access_cacheop(state: &CpuState, _ri: &CpRegInfo, _isread: bool) -> CpAccess {
    if features::current_el(state) == 0 && state.cp15.sctlr_el[1] & SCTLR_UCI == 0 {
        return CpAccess::Trap;
    }
    CpAccess::Ok
}

/// 只有当 SPSel 选择 SP_ELx 时，SP_EL0 才能作为系统寄存器访问。
fn access_sp_el0(state: &CpuState, _ri: &CpRegInfo, _isread: bool) -> CpAccess {
    if state.pstate & pstate::SP == 0 {
        return CpAccess::TrapUncategorized;
    }
    CpAccess::Ok
}

fn access_el3(state: &CpuState, _ri: &CpRegInfo, _isread: bool) -> CpAccess {
    if features::current_el(state) == 3 {
        CpAccess::Ok
    } else {
        CpAccess::TrapUncategorized
    }
}

/// NSACR：EL3 之外只读。
fn access_nsacr(state: &CpuState, _ri: &CpRegInfo, isread: bool) -> CpAccess {
    if isread || features::current_el(state) == 3 {
        CpAccess::Ok
    } else {
        CpAccess::TrapUncategorized
    }
}

// ========== 读写回调 ==========

fn regime_set(el: usize) -> MmuIdxSet {
    match el {
        1 => MmuIdxSet::EL10 | MmuIdxSet::SEC_EL10,
        2 => MmuIdxSet::EL2,
        3 => MmuIdxSet::SEC_EL10 | MmuIdxSet::EL3,
        _ => MmuIdxSet::all(),
    }
}

/// 缓存项依赖于 `ri` 存储的转换机制。
fn flush_set(ri: &CpRegInfo) -> MmuIdxSet {
    let Some(slot) = ri.slot else {
        return MmuIdxSet::all();
    };
    match slot.field {
        Field::Sctlr(el)
        | Field::Ttbr0(el)
        | Field::Ttbr1(el)
        | Field::Tcr(el)
        | Field::Mair(el)
        | Field::Dacr(el)
        | Field::ContextIdr(el) => regime_set(el),
        Field::Vttbr | Field::Vtcr | Field::Hcr => MmuIdxSet::EL10 | MmuIdxSet::STAGE2,
        _ => MmuIdxSet::all(),
    }
}

fn tlb_flush_write(state: &mut CpuState, ri: &CpRegInfo, value: u64) {
    if let Some(slot) = ri.slot {
        slot.set(state, value);
    }
    state.flush_tlb_local(flush_set(ri));
}

fn sctlr_reset(state: &mut CpuState, ri: &CpRegInfo) {
    let f = state.features;
    let value = if f.contains(Features::AARCH64) {
        0x00c5_0838
    } else if f.contains(Features::V7) {
        0x00c5_0078
    } else if f.contains(Features::V6) {
        0x0005_0078
    } else {
        0x0009_0078
    };
    if let Some(slot) = ri.slot {
        slot.set(state, value);
    }
}

fn vbar_write(state: &mut CpuState, ri: &CpRegInfo, value: u64) {
    if let Some(slot) = ri.slot {
        slot.set(state, value & !0x1f);
    }
}

fn scr_write(state: &mut CpuState, ri: &CpRegInfo, value: u64) {
    let mut value = value & scr::VALID_MASK;
    if !state.features.contains(Features::EL2) {
        value &= !scr::HCE;
    }
    if !state.features.contains(Features::AARCH64) {
        value &= !scr::RW;
    }
    if let Some(slot) = ri.slot {
        slot.set(state, value);
    }
    // SCR.NS 与 SCR.RW 会改变每个索引对应的转换机制。
    state.flush_tlb_local(MmuIdxSet::all());
}

fn hcr_write(state: &mut CpuState, ri: &CpRegInfo, value: u64) {
    if let Some(slot) = ri.slot {
        slot.set(state, value);
    }
    state.cp15.hcr_el2 &= hcr::VALID_MASK;
    state.flush_tlb_local(MmuIdxSet::EL10 | MmuIdxSet::STAGE2);
}

fn nsacr_read(state: &CpuState, ri: &CpRegInfo) -> u64 {
    if features::el_is_aa64(state, 3) {
        // 为非安全态启用 cp10/cp11 访问
        return 0xc00;
    }
    ri.slot.map_or(0, |s| s.get(state))
}

fn mpidr_read(state: &CpuState, _ri: &CpRegInfo) -> u64 {
    state.mpidr
}

fn current_el_read(state: &CpuState, _ri: &CpRegInfo) -> u64 {
    (features::current_el(state) << 2) as u64
}

fn daif_read(state: &CpuState, _ri: &CpRegInfo) -> u64 {
    (state.daif & pstate::DAIF) as u64
}

fn daif_write(state: &mut CpuState, _ri: &CpRegInfo, value: u64) {
    state.daif = value as u32 & pstate::DAIF;
}

fn nzcv_read(state: &CpuState, _ri: &CpRegInfo) -> u64 {
    state.nzcv() as u64
}

fn nzcv_write(state: &mut CpuState, _ri: &CpRegInfo, value: u64) {
    state.set_nzcv(value as u32 & pstate::NZCV);
}

fn spsel_read(state: &CpuState, _ri: &CpRegInfo) -> u64 {
    (state.pstate & pstate::SP) as u64
}

fn spsel_write(state: &mut CpuState, _ri: &CpRegInfo, value: u64) {
    let el = features::current_el(state);
    state.save_sp(el);
    state.pstate = (state.pstate & !pstate::SP) | (value as u32 & pstate::SP);
    state.restore_sp(el);
}

fn fpcr_read(state: &CpuState, _ri: &CpRegInfo) -> u64 {
    state.vfp.fpcr_read() as u64
}

fn fpcr_write(state: &mut CpuState, _ri: &CpRegInfo, value: u64) {
    state.vfp.fpcr_write(value as u32);
}

fn fpsr_read(state: &CpuState, _ri: &CpRegInfo) -> u64 {
    state.vfp.fpsr_read() as u64
}

fn fpsr_write(state: &mut CpuState, _ri: &CpRegInfo, value: u64) {
    state.vfp.fpsr_write(value as u32);
}

/// ISR_EL1：已断言的 A/I/F 线，物理或虚拟。
fn isr_read(state: &CpuState, _ri: &CpRegInfo) -> u64 {
    let lines = state.exception.lines;
    let mut v = 0;
    if lines.intersects(IrqLines::IRQ | IrqLines::VIRQ) {
        v |= pstate::I;
    }
    if lines.intersects(IrqLines::FIQ | IrqLines::VFIQ) {
        v |= pstate::F;
    }
    if lines.contains(IrqLines::SERROR) {
        v |= pstate::A;
    }
    v as u64
}

fn dbgbvr_write(state: &mut CpuState, ri: &CpRegInfo, value: u64) {
    // [63:49] 位是第 48 位的符号扩展。
    let value = ((((value << 15) as i64) >> 15) as u64) & !3;
    if let Some(slot) = ri.slot {
        slot.set(state, value);
    }
}

fn dbgbcr_write(state: &mut CpuState, ri: &CpRegInfo, value: u64) {
    // BAS[1] 镜像 BAS[0]，BAS[3] 镜像 BAS[2]。
    let mut value = value & !((1 << 6) | (1 << 8));
    value |= ((value >> 5) & 1) << 6;
    value |= ((value >> 7) & 1) << 8;
    if let Some(slot) = ri.slot {
        slot.set(state, value);
    }
}

fn rgnr_write(state: &mut CpuState, ri: &CpRegInfo, value: u64) {
    let n = state.pmsa.num_regions();
    if value as usize >= n {
        log::warn!("RGNR {} out of range ({} regions), ignored", value, n);
        return;
    }
    if let Some(slot) = ri.slot {
        slot.set(state, value);
    }
}

/// RGNR 所选区域的 DRBAR、DRSR 与 DRACR。
fn pmsav7_region(state: &mut CpuState, opc2: u8) -> Option<&mut u32> {
    let n = state.cp15.rgnr as usize;
    let table = match opc2 {
        0 => &mut state.pmsa.drbar[0],
        2 => &mut state.pmsa.drsr[0],
        _ => &mut state.pmsa.dracr[0],
    };
    table.get_mut(n)
}

fn pmsav7_read(state: &CpuState, ri: &CpRegInfo) -> u64 {
    let n = state.cp15.rgnr as usize;
    let table = match ri.key.opc2 {
        0 => &state.pmsa.drbar[0],
        2 => &state.pmsa.drsr[0],
        _ => &state.pmsa.dracr[0],
    };
    table.get(n).copied().unwrap_or(0) as u64
}

fn pmsav7_write(state: &mut CpuState, ri: &CpRegInfo, value: u64) {
    if let Some(reg) = pmsav7_region(state, ri.key.opc2) {
        *reg = value as u32;
        state.flush_tlb_local(MmuIdxSet::all());
    }
}

// TLB 维护。所有刷新都只作用于本 CPU，内部共享形式也不例外；
// 广播由外层系统负责。

fn tlbi_el10(state: &mut CpuState, ri: &CpRegInfo, value: u64) {
    let set = if features::is_secure_below_el3(state) {
        MmuIdxSet::SEC_EL10
    } else {
        MmuIdxSet::EL10
    };
    log::debug!("{} {:#x}", ri.name, value);
    state.flush_tlb_local(set);
}

fn tlbi_el2(state: &mut CpuState, ri: &CpRegInfo, value: u64) {
    log::debug!("{} {:#x}", ri.name, value);
    state.flush_tlb_local(MmuIdxSet::EL2);
}

fn tlbi_el3(state: &mut CpuState, ri: &CpRegInfo, value: u64) {
    log::debug!("{} {:#x}", ri.name, value);
    state.flush_tlb_local(MmuIdxSet::EL3);
}

fn tlbi_s12(state: &mut CpuState, ri: &CpRegInfo, value: u64) {
    log::debug!("{} {:#x}", ri.name, value);
    state.flush_tlb_local(MmuIdxSet::EL10 | MmuIdxSet::STAGE2);
}

// ========== 寄存器表 ==========

/// 所有 A/R-profile 核心都有的寄存器。
pub const COMMON_REGS: &[CpRegDef] = &[
    CpRegDef {
        name: "SCTLR",
        state: RegState::Both,
        op0: 3,
        crn: 1,
        access: Access::PL1_RW,
        storage: banked(Field::Sctlr(3), Field::Sctlr(1)),
        access_fn: Some(access_tvm_trvm),
        write_fn: Some(tlb_flush_write),
        reset_fn: Some(sctlr_reset),
        ..D
    },
    CpRegDef {
        name: "ACTLR",
        state: RegState::Both,
        op0: 3,
        crn: 1,
        opc2: 1,
        access: Access::PL1_RW,
        ty: RegType::CONST,
        ..D
    },
    CpRegDef {
        name: "DFSR",
        crn: 5,
        access: Access::PL1_RW,
        storage: banked_lo(Field::Esr(3), Field::Esr(1)),
        access_fn: Some(access_tvm_trvm),
        ..D
    },
    CpRegDef {
        name: "DFAR",
        crn: 6,
        access: Access::PL1_RW,
        storage: banked_lo(Field::Far(3), Field::Far(1)),
        access_fn: Some(access_tvm_trvm),
        ..D
    },
    // 缓存维护与屏障；具体的 c7 操作会覆盖它。
    CpRegDef {
        name: "CACHEMAINT",
        crn: 7,
        crm: ANY,
        opc2: ANY,
        access: Access::PL1_W,
        ty: RegType::NOP.union(RegType::OVERRIDE),
        ..D
    },
];

pub const V6_REGS: &[CpRegDef] = &[
    CpRegDef {
        name: "CPACR",
        state: RegState::Both,
        op0: 3,
        crn: 1,
        opc2: 2,
        access: Access::PL1_RW,
        storage: slot(Field::Cpacr),
        access_fn: Some(access_cpacr),
        ..D
    },
    CpRegDef {
        name: "IFSR",
        crn: 5,
        opc2: 1,
        access: Access::PL1_RW,
        storage: banked_lo(Field::Ifsr(3), Field::Ifsr(1)),
        access_fn: Some(access_tvm_trvm),
        ..D
    },
    CpRegDef {
        name: "IFAR",
        crn: 6,
        opc2: 2,
        access: Access::PL1_RW,
        storage: banked_hi(Field::Far(3), Field::Far(1)),
        access_fn: Some(access_tvm_trvm),
        ..D
    },
];

pub const THREAD_ID_REGS: &[CpRegDef] = &[
    CpRegDef {
        name: "TPIDRURW",
        crn: 13,
        opc2: 2,
        access: Access::PL0_RW,
        storage: Storage::Banked { s: Slot::full(Field::TpidrS(0)), ns: Slot::lo(Field::Tpidr(0)) },
        ..D
    },
    CpRegDef {
        name: "TPIDRURO",
        crn: 13,
        opc2: 3,
        access: Access::PL0_R.union(Access::PL1_W),
        storage: Storage::Banked { s: Slot::full(Field::TpidrS(1)), ns: Slot::lo(Field::TpidrRo) },
        ..D
    },
    CpRegDef {
        name: "TPIDRPRW",
        crn: 13,
        opc2: 4,
        access: Access::PL1_RW,
        storage: Storage::Banked { s: Slot::full(Field::TpidrS(2)), ns: Slot::lo(Field::Tpidr(1)) },
        ..D
    },
];

/// 短描述符 MMU 控制。
pub const VMSA_REGS: &[CpRegDef] = &[
    CpRegDef {
        name: "TTBR0",
        crn: 2,
        access: Access::PL1_RW,
        storage: banked_lo(Field::Ttbr0(3), Field::Ttbr0(1)),
        access_fn: Some(access_tvm_trvm),
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "TTBR1",
        crn: 2,
        opc2: 1,
        access: Access::PL1_RW,
        storage: banked_lo(Field::Ttbr1(3), Field::Ttbr1(1)),
        access_fn: Some(access_tvm_trvm),
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "TTBCR",
        crn: 2,
        opc2: 2,
        access: Access::PL1_RW,
        storage: banked_lo(Field::Tcr(3), Field::Tcr(1)),
        access_fn: Some(access_tvm_trvm),
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "DACR",
        crn: 3,
        access: Access::PL1_RW,
        storage: banked_lo(Field::Dacr(3), Field::Dacr(1)),
        access_fn: Some(access_tvm_trvm),
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "TLBIALL",
        crn: 8,
        crm: 7,
        access: Access::PL1_W,
        ty: RegType::NO_RAW,
        write_fn: Some(tlbi_el10),
        ..D
    },
    CpRegDef {
        name: "TLBIMVA",
        crn: 8,
        crm: 7,
        opc2: 1,
        access: Access::PL1_W,
        ty: RegType::NO_RAW,
        write_fn: Some(tlbi_el10),
        ..D
    },
    CpRegDef {
        name: "TLBIASID",
        crn: 8,
        crm: 7,
        opc2: 2,
        access: Access::PL1_W,
        ty: RegType::NO_RAW,
        write_fn: Some(tlbi_el10),
        ..D
    },
    CpRegDef {
        name: "ITLBIALL",
        crn: 8,
        crm: 5,
        access: Access::PL1_W,
        ty: RegType::NO_RAW,
        write_fn: Some(tlbi_el10),
        ..D
    },
    CpRegDef {
        name: "DTLBIALL",
        crn: 8,
        crm: 6,
        access: Access::PL1_W,
        ty: RegType::NO_RAW,
        write_fn: Some(tlbi_el10),
        ..D
    },
];

/// ARMv7 VMSA 新增寄存器。
pub const V7_VMSA_REGS: &[CpRegDef] = &[
    CpRegDef {
        name: "VBAR",
        state: RegState::Both,
        op0: 3,
        crn: 12,
        access: Access::PL1_RW,
        storage: banked(Field::Vbar(3), Field::Vbar(1)),
        write_fn: Some(vbar_write),
        ..D
    },
    CpRegDef {
        name: "CONTEXTIDR",
        state: RegState::Both,
        op0: 3,
        crn: 13,
        opc2: 1,
        access: Access::PL1_RW,
        storage: banked(Field::ContextIdr(3), Field::ContextIdr(1)),
        access_fn: Some(access_tvm_trvm),
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "PAR",
        crn: 7,
        crm: 4,
        access: Access::PL1_RW,
        storage: banked_lo(Field::Par(3), Field::Par(1)),
        ..D
    },
    CpRegDef {
        name: "PRRR",
        crn: 10,
        crm: 2,
        access: Access::PL1_RW,
        storage: banked_lo(Field::Mair(3), Field::Mair(1)),
        access_fn: Some(access_tvm_trvm),
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "NMRR",
        crn: 10,
        crm: 2,
        opc2: 1,
        access: Access::PL1_RW,
        storage: banked_hi(Field::Mair(3), Field::Mair(1)),
        access_fn: Some(access_tvm_trvm),
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "AFSR0",
        state: RegState::Both,
        op0: 3,
        crn: 5,
        crm: 1,
        access: Access::PL1_RW,
        ty: RegType::CONST,
        ..D
    },
    CpRegDef {
        name: "AFSR1",
        state: RegState::Both,
        op0: 3,
        crn: 5,
        crm: 1,
        opc2: 1,
        access: Access::PL1_RW,
        ty: RegType::CONST,
        ..D
    },
    CpRegDef {
        name: "TLBIALLIS",
        crn: 8,
        crm: 3,
        access: Access::PL1_W,
        ty: RegType::NO_RAW,
        write_fn: Some(tlbi_el10),
        ..D
    },
    CpRegDef {
        name: "TLBIMVAA",
        crn: 8,
        crm: 7,
        opc2: 3,
        access: Access::PL1_W,
        ty: RegType::NO_RAW,
        write_fn: Some(tlbi_el10),
        ..D
    },
];

/// 长描述符寄存器的 64 位 (MCRR/MRRC) 视图。
pub const LPAE_REGS: &[CpRegDef] = &[
    CpRegDef {
        name: "TTBR0_64",
        is64: true,
        crm: 2,
        access: Access::PL1_RW,
        storage: banked(Field::Ttbr0(3), Field::Ttbr0(1)),
        access_fn: Some(access_tvm_trvm),
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "TTBR1_64",
        is64: true,
        crm: 2,
        opc1: 1,
        access: Access::PL1_RW,
        storage: banked(Field::Ttbr1(3), Field::Ttbr1(1)),
        access_fn: Some(access_tvm_trvm),
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "PAR_64",
        is64: true,
        crm: 7,
        access: Access::PL1_RW,
        storage: banked(Field::Par(3), Field::Par(1)),
        ..D
    },
];

/// AArch64 EL0/EL1 状态与特殊用途寄存器。
pub const AA64_REGS: &[CpRegDef] = &[
    CpRegDef {
        name: "SP_EL0",
        state: RegState::Aa64,
        op0: 3,
        crn: 4,
        crm: 1,
        access: Access::PL1_RW,
        storage: slot(Field::SpEl(0)),
        access_fn: Some(access_sp_el0),
        ..D
    },
    CpRegDef {
        name: "ELR_EL1",
        state: RegState::Aa64,
        op0: 3,
        crn: 4,
        opc2: 1,
        access: Access::PL1_RW,
        storage: slot(Field::ElrEl(1)),
        ..D
    },
    CpRegDef {
        name: "SPSR_EL1",
        state: RegState::Aa64,
        op0: 3,
        crn: 4,
        access: Access::PL1_RW,
        storage: slot(Field::Spsr(bank::SVC)),
        ..D
    },
    CpRegDef {
        name: "CurrentEL",
        state: RegState::Aa64,
        op0: 3,
        crn: 4,
        crm: 2,
        opc2: 2,
        access: Access::PL1_R,
        ty: RegType::SPECIAL.union(RegType::NO_RAW),
        read_fn: Some(current_el_read),
        ..D
    },
    CpRegDef {
        name: "DAIF",
        state: RegState::Aa64,
        op0: 3,
        opc1: 3,
        crn: 4,
        crm: 2,
        opc2: 1,
        access: Access::PL0_RW,
        ty: RegType::SPECIAL.union(RegType::NO_RAW),
        access_fn: Some(access_daif),
        read_fn: Some(daif_read),
        write_fn: Some(daif_write),
        ..D
    },
    CpRegDef {
        name: "NZCV",
        state: RegState::Aa64,
        op0: 3,
        opc1: 3,
        crn: 4,
        crm: 2,
        access: Access::PL0_RW,
        ty: RegType::SPECIAL.union(RegType::NO_RAW),
        read_fn: Some(nzcv_read),
        write_fn: Some(nzcv_write),
        ..D
    },
    CpRegDef {
        name: "SPSel",
        state: RegState::Aa64,
        op0: 3,
        crn: 4,
        crm: 2,
        access: Access::PL1_RW,
        ty: RegType::SPECIAL.union(RegType::NO_RAW),
        read_fn: Some(spsel_read),
        write_fn: Some(spsel_write),
        ..D
    },
    CpRegDef {
        name: "FPCR",
        state: RegState::Aa64,
        op0: 3,
        opc1: 3,
        crn: 4,
        crm: 4,
        access: Access::PL0_RW,
        ty: RegType::NO_RAW,
        read_fn: Some(fpcr_read),
        write_fn: Some(fpcr_write),
        ..D
    },
    CpRegDef {
        name: "FPSR",
        state: RegState::Aa64,
        op0: 3,
        opc1: 3,
        crn: 4,
        crm: 4,
        opc2: 1,
        access: Access::PL0_RW,
        ty: RegType::NO_RAW,
        read_fn: Some(fpsr_read),
        write_fn: Some(fpsr_write),
        ..D
    },
    CpRegDef {
        name: "ISR_EL1",
        state: RegState::Aa64,
        op0: 3,
        crn: 12,
        crm: 1,
        access: Access::PL1_R,
        ty: RegType::IO.union(RegType::NO_RAW),
        read_fn: Some(isr_read),
        ..D
    },
    CpRegDef {
        name: "TTBR0_EL1",
        state: RegState::Aa64,
        op0: 3,
        crn: 2,
        access: Access::PL1_RW,
        storage: slot(Field::Ttbr0(1)),
        access_fn: Some(access_tvm_trvm),
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "TTBR1_EL1",
        state: RegState::Aa64,
        op0: 3,
        crn: 2,
        opc2: 1,
        access: Access::PL1_RW,
        storage: slot(Field::Ttbr1(1)),
        access_fn: Some(access_tvm_trvm),
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "TCR_EL1",
        state: RegState::Aa64,
        op0: 3,
        crn: 2,
        opc2: 2,
        access: Access::PL1_RW,
        storage: slot(Field::Tcr(1)),
        access_fn: Some(access_tvm_trvm),
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "MAIR_EL1",
        state: RegState::Aa64,
        op0: 3,
        crn: 10,
        crm: 2,
        access: Access::PL1_RW,
        storage: slot(Field::Mair(1)),
        access_fn: Some(access_tvm_trvm),
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "ESR_EL1",
        state: RegState::Aa64,
        op0: 3,
        crn: 5,
        crm: 2,
        access: Access::PL1_RW,
        storage: slot(Field::Esr(1)),
        access_fn: Some(access_tvm_trvm),
        ..D
    },
    CpRegDef {
        name: "FAR_EL1",
        state: RegState::Aa64,
        op0: 3,
        crn: 6,
        access: Access::PL1_RW,
        storage: slot(Field::Far(1)),
        access_fn: Some(access_tvm_trvm),
        ..D
    },
    CpRegDef {
        name: "PAR_EL1",
        state: RegState::Aa64,
        op0: 3,
        crn: 7,
        crm: 4,
        access: Access::PL1_RW,
        storage: slot(Field::Par(1)),
        ..D
    },
    CpRegDef {
        name: "TPIDR_EL0",
        state: RegState::Aa64,
        op0: 3,
        opc1: 3,
        crn: 13,
        opc2: 2,
        access: Access::PL0_RW,
        storage: slot(Field::Tpidr(0)),
        ..D
    },
    CpRegDef {
        name: "TPIDRRO_EL0",
        state: RegState::Aa64,
        op0: 3,
        opc1: 3,
        crn: 13,
        opc2: 3,
        access: Access::PL0_R.union(Access::PL1_W),
        storage: slot(Field::TpidrRo),
        ..D
    },
    CpRegDef {
        name: "TPIDR_EL1",
        state: RegState::Aa64,
        op0: 3,
        crn: 13,
        opc2: 4,
        access: Access::PL1_RW,
        storage: slot(Field::Tpidr(1)),
        ..D
    },
    CpRegDef {
        name: "IC_IALLU",
        state: RegState::Aa64,
        op0: 1,
        crn: 7,
        crm: 5,
        access: Access::PL1_W,
        ty: RegType::NOP,
        ..D
    },
    CpRegDef {
        name: "IC_IALLUIS",
        state: RegState::Aa64,
        op0: 1,
        crn: 7,
        crm: 1,
        access: Access::PL1_W,
        ty: RegType::NOP,
        ..D
    },
    CpRegDef {
        name: "DC_CIVAC",
        state: RegState::Aa64,
        op0: 1,
        opc1: 3,
        crn: 7,
        crm: 14,
        opc2: 1,
        access: Access::PL0_W,
        ty: RegType::NOP,
        access_fn: Some(access_cacheop),
        ..D
    },
    CpRegDef {
        name: "TLBI_VMALLE1",
        state: RegState::Aa64,
        op0: 1,
        crn: 8,
        crm: 7,
        access: Access::PL1_W,
        ty: RegType::NO_RAW,
        write_fn: Some(tlbi_el10),
        ..D
    },
    CpRegDef {
        name: "TLBI_VMALLE1IS",
        state: RegState::Aa64,
        op0: 1,
        crn: 8,
        crm: 3,
        access: Access::PL1_W,
        ty: RegType::NO_RAW,
        write_fn: Some(tlbi_el10),
        ..D
    },
    CpRegDef {
        name: "TLBI_VAE1",
        state: RegState::Aa64,
        op0: 1,
        crn: 8,
        crm: 7,
        opc2: 1,
        access: Access::PL1_W,
        ty: RegType::NO_RAW,
        write_fn: Some(tlbi_el10),
        ..D
    },
    CpRegDef {
        name: "TLBI_ASIDE1",
        state: RegState::Aa64,
        op0: 1,
        crn: 8,
        crm: 7,
        opc2: 2,
        access: Access::PL1_W,
        ty: RegType::NO_RAW,
        write_fn: Some(tlbi_el10),
        ..D
    },
];

/// Hypervisor 寄存器。
pub const EL2_REGS: &[CpRegDef] = &[
    CpRegDef {
        name: "HCR",
        secure: SecState::NonSecure,
        opc1: 4,
        crn: 1,
        crm: 1,
        access: Access::PL2_RW,
        storage: slot_lo(Field::Hcr),
        other_bank: OtherBank::Trap,
        write_fn: Some(hcr_write),
        ..D
    },
    CpRegDef {
        name: "HCR2",
        secure: SecState::NonSecure,
        opc1: 4,
        crn: 1,
        crm: 1,
        opc2: 4,
        access: Access::PL2_RW,
        storage: slot_hi(Field::Hcr),
        other_bank: OtherBank::Trap,
        write_fn: Some(hcr_write),
        ..D
    },
    CpRegDef {
        name: "HCR_EL2",
        state: RegState::Aa64,
        op0: 3,
        opc1: 4,
        crn: 1,
        crm: 1,
        access: Access::PL2_RW,
        storage: slot(Field::Hcr),
        write_fn: Some(hcr_write),
        ..D
    },
    CpRegDef {
        name: "HSCTLR",
        state: RegState::Both,
        secure: SecState::NonSecure,
        op0: 3,
        opc1: 4,
        crn: 1,
        access: Access::PL2_RW,
        storage: slot(Field::Sctlr(2)),
        other_bank: OtherBank::Trap,
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "HDCR",
        state: RegState::Both,
        secure: SecState::NonSecure,
        op0: 3,
        opc1: 4,
        crn: 1,
        crm: 1,
        opc2: 1,
        access: Access::PL2_RW,
        storage: slot(Field::Mdcr(2)),
        other_bank: OtherBank::Trap,
        ..D
    },
    CpRegDef {
        name: "HCPTR",
        state: RegState::Both,
        secure: SecState::NonSecure,
        op0: 3,
        opc1: 4,
        crn: 1,
        crm: 1,
        opc2: 2,
        access: Access::PL2_RW,
        storage: slot(Field::Cptr(2)),
        other_bank: OtherBank::Trap,
        ..D
    },
    CpRegDef {
        name: "HTCR",
        state: RegState::Both,
        secure: SecState::NonSecure,
        op0: 3,
        opc1: 4,
        crn: 2,
        opc2: 2,
        access: Access::PL2_RW,
        storage: slot(Field::Tcr(2)),
        other_bank: OtherBank::Trap,
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "VTCR",
        state: RegState::Both,
        secure: SecState::NonSecure,
        op0: 3,
        opc1: 4,
        crn: 2,
        crm: 1,
        opc2: 2,
        access: Access::PL2_RW,
        storage: slot(Field::Vtcr),
        other_bank: OtherBank::Trap,
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "HTTBR",
        secure: SecState::NonSecure,
        is64: true,
        opc1: 4,
        crm: 2,
        access: Access::PL2_RW,
        storage: slot(Field::Ttbr0(2)),
        other_bank: OtherBank::Trap,
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "TTBR0_EL2",
        state: RegState::Aa64,
        op0: 3,
        opc1: 4,
        crn: 2,
        access: Access::PL2_RW,
        storage: slot(Field::Ttbr0(2)),
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "VTTBR",
        secure: SecState::NonSecure,
        is64: true,
        opc1: 6,
        crm: 2,
        access: Access::PL2_RW,
        storage: slot(Field::Vttbr),
        other_bank: OtherBank::Trap,
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "VTTBR_EL2",
        state: RegState::Aa64,
        op0: 3,
        opc1: 4,
        crn: 2,
        crm: 1,
        access: Access::PL2_RW,
        storage: slot(Field::Vttbr),
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "HMAIR0",
        secure: SecState::NonSecure,
        opc1: 4,
        crn: 10,
        crm: 2,
        access: Access::PL2_RW,
        storage: slot_lo(Field::Mair(2)),
        other_bank: OtherBank::Trap,
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "HMAIR1",
        secure: SecState::NonSecure,
        opc1: 4,
        crn: 10,
        crm: 2,
        opc2: 1,
        access: Access::PL2_RW,
        storage: slot_hi(Field::Mair(2)),
        other_bank: OtherBank::Trap,
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "MAIR_EL2",
        state: RegState::Aa64,
        op0: 3,
        opc1: 4,
        crn: 10,
        crm: 2,
        access: Access::PL2_RW,
        storage: slot(Field::Mair(2)),
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "HVBAR",
        state: RegState::Both,
        secure: SecState::NonSecure,
        op0: 3,
        opc1: 4,
        crn: 12,
        access: Access::PL2_RW,
        storage: slot(Field::Vbar(2)),
        other_bank: OtherBank::Trap,
        write_fn: Some(vbar_write),
        ..D
    },
    CpRegDef {
        name: "HSR",
        state: RegState::Both,
        secure: SecState::NonSecure,
        op0: 3,
        opc1: 4,
        crn: 5,
        crm: 2,
        access: Access::PL2_RW,
        storage: slot(Field::Esr(2)),
        other_bank: OtherBank::Trap,
        ..D
    },
    CpRegDef {
        name: "HDFAR",
        secure: SecState::NonSecure,
        opc1: 4,
        crn: 6,
        access: Access::PL2_RW,
        storage: slot_lo(Field::Far(2)),
        other_bank: OtherBank::Trap,
        ..D
    },
    CpRegDef {
        name: "HIFAR",
        secure: SecState::NonSecure,
        opc1: 4,
        crn: 6,
        opc2: 2,
        access: Access::PL2_RW,
        storage: slot_hi(Field::Far(2)),
        other_bank: OtherBank::Trap,
        ..D
    },
    CpRegDef {
        name: "FAR_EL2",
        state: RegState::Aa64,
        op0: 3,
        opc1: 4,
        crn: 6,
        access: Access::PL2_RW,
        storage: slot(Field::Far(2)),
        ..D
    },
    CpRegDef {
        name: "HPFAR",
        state: RegState::Both,
        secure: SecState::NonSecure,
        op0: 3,
        opc1: 4,
        crn: 6,
        opc2: 4,
        access: Access::PL2_RW,
        storage: slot(Field::Hpfar),
        other_bank: OtherBank::Trap,
        ..D
    },
    CpRegDef {
        name: "HTPIDR",
        state: RegState::Both,
        secure: SecState::NonSecure,
        op0: 3,
        opc1: 4,
        crn: 13,
        opc2: 2,
        access: Access::PL2_RW,
        storage: slot(Field::Tpidr(2)),
        other_bank: OtherBank::Trap,
        ..D
    },
    CpRegDef {
        name: "ELR_EL2",
        state: RegState::Aa64,
        op0: 3,
        opc1: 4,
        crn: 4,
        opc2: 1,
        access: Access::PL2_RW,
        storage: slot(Field::ElrEl(2)),
        ..D
    },
    CpRegDef {
        name: "SPSR_EL2",
        state: RegState::Aa64,
        op0: 3,
        opc1: 4,
        crn: 4,
        access: Access::PL2_RW,
        storage: slot(Field::Spsr(bank::HYP)),
        ..D
    },
    CpRegDef {
        name: "SP_EL1",
        state: RegState::Aa64,
        op0: 3,
        opc1: 4,
        crn: 4,
        crm: 1,
        access: Access::PL2_RW,
        storage: slot(Field::SpEl(1)),
        ..D
    },
    CpRegDef {
        name: "TLBIALLH",
        secure: SecState::NonSecure,
        opc1: 4,
        crn: 8,
        crm: 7,
        access: Access::PL2_W,
        ty: RegType::NO_RAW,
        other_bank: OtherBank::Trap,
        write_fn: Some(tlbi_el2),
        ..D
    },
    CpRegDef {
        name: "TLBIALLNSNH",
        secure: SecState::NonSecure,
        opc1: 4,
        crn: 8,
        crm: 7,
        opc2: 4,
        access: Access::PL2_W,
        ty: RegType::NO_RAW,
        other_bank: OtherBank::Trap,
        write_fn: Some(tlbi_s12),
        ..D
    },
    CpRegDef {
        name: "TLBI_ALLE2",
        state: RegState::Aa64,
        op0: 1,
        opc1: 4,
        crn: 8,
        crm: 7,
        access: Access::PL2_W,
        ty: RegType::NO_RAW,
        write_fn: Some(tlbi_el2),
        ..D
    },
    CpRegDef {
        name: "TLBI_ALLE2IS",
        state: RegState::Aa64,
        op0: 1,
        opc1: 4,
        crn: 8,
        crm: 3,
        access: Access::PL2_W,
        ty: RegType::NO_RAW,
        write_fn: Some(tlbi_el2),
        ..D
    },
    CpRegDef {
        name: "TLBI_VMALLS12E1",
        state: RegState::Aa64,
        op0: 1,
        opc1: 4,
        crn: 8,
        crm: 7,
        opc2: 6,
        access: Access::PL2_W,
        ty: RegType::NO_RAW,
        write_fn: Some(tlbi_s12),
        ..D
    },
];

/// 有 EL3 而无 EL2 时，hypervisor 控制寄存器读为零。
pub const EL3_NO_EL2_REGS: &[CpRegDef] = &[
    CpRegDef {
        name: "HCR",
        state: RegState::Both,
        secure: SecState::NonSecure,
        op0: 3,
        opc1: 4,
        crn: 1,
        crm: 1,
        access: Access::PL2_RW,
        ty: RegType::CONST,
        other_bank: OtherBank::Const(0),
        ..D
    },
    CpRegDef {
        name: "HCPTR",
        state: RegState::Both,
        secure: SecState::NonSecure,
        op0: 3,
        opc1: 4,
        crn: 1,
        crm: 1,
        opc2: 2,
        access: Access::PL2_RW,
        ty: RegType::CONST,
        other_bank: OtherBank::Const(0),
        ..D
    },
    CpRegDef {
        name: "HDCR",
        state: RegState::Both,
        secure: SecState::NonSecure,
        op0: 3,
        opc1: 4,
        crn: 1,
        crm: 1,
        opc2: 1,
        access: Access::PL2_RW,
        ty: RegType::CONST,
        other_bank: OtherBank::Const(0),
        ..D
    },
    CpRegDef {
        name: "HVBAR",
        state: RegState::Both,
        secure: SecState::NonSecure,
        op0: 3,
        opc1: 4,
        crn: 12,
        access: Access::PL2_RW,
        ty: RegType::CONST,
        other_bank: OtherBank::Const(0),
        ..D
    },
];

/// 安全监视器寄存器。
pub const EL3_REGS: &[CpRegDef] = &[
    CpRegDef {
        name: "SCR",
        access: Access::PL1_RW,
        crn: 1,
        crm: 1,
        storage: slot_lo(Field::Scr),
        access_fn: Some(access_el3),
        write_fn: Some(scr_write),
        ..D
    },
    CpRegDef {
        name: "SDER",
        secure: SecState::Secure,
        crn: 1,
        crm: 1,
        opc2: 1,
        access: Access::PL1_RW,
        ty: RegType::CONST,
        other_bank: OtherBank::Trap,
        ..D
    },
    CpRegDef {
        name: "NSACR",
        crn: 1,
        crm: 1,
        opc2: 2,
        access: Access::PL1_RW,
        storage: slot_lo(Field::Nsacr),
        access_fn: Some(access_nsacr),
        read_fn: Some(nsacr_read),
        ..D
    },
    CpRegDef {
        name: "MVBAR",
        secure: SecState::Secure,
        crn: 12,
        opc2: 1,
        access: Access::PL1_RW,
        storage: slot_lo(Field::Mvbar),
        other_bank: OtherBank::Trap,
        write_fn: Some(vbar_write),
        ..D
    },
    CpRegDef {
        name: "SDCR",
        crn: 1,
        crm: 3,
        opc2: 1,
        access: Access::PL1_RW,
        storage: slot_lo(Field::Mdcr(3)),
        access_fn: Some(access_el3),
        ..D
    },
    CpRegDef {
        name: "SCR_EL3",
        state: RegState::Aa64,
        op0: 3,
        opc1: 6,
        crn: 1,
        crm: 1,
        access: Access::PL3_RW,
        storage: slot(Field::Scr),
        write_fn: Some(scr_write),
        ..D
    },
    CpRegDef {
        name: "SCTLR_EL3",
        state: RegState::Aa64,
        op0: 3,
        opc1: 6,
        crn: 1,
        access: Access::PL3_RW,
        reset: 0x00c5_0838,
        storage: slot(Field::Sctlr(3)),
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "CPTR_EL3",
        state: RegState::Aa64,
        op0: 3,
        opc1: 6,
        crn: 1,
        crm: 1,
        opc2: 2,
        access: Access::PL3_RW,
        storage: slot(Field::Cptr(3)),
        ..D
    },
    CpRegDef {
        name: "MDCR_EL3",
        state: RegState::Aa64,
        op0: 3,
        opc1: 6,
        crn: 1,
        crm: 3,
        opc2: 1,
        access: Access::PL3_RW,
        storage: slot(Field::Mdcr(3)),
        ..D
    },
    CpRegDef {
        name: "TTBR0_EL3",
        state: RegState::Aa64,
        op0: 3,
        opc1: 6,
        crn: 2,
        access: Access::PL3_RW,
        storage: slot(Field::Ttbr0(3)),
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "TCR_EL3",
        state: RegState::Aa64,
        op0: 3,
        opc1: 6,
        crn: 2,
        opc2: 2,
        access: Access::PL3_RW,
        storage: slot(Field::Tcr(3)),
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "MAIR_EL3",
        state: RegState::Aa64,
        op0: 3,
        opc1: 6,
        crn: 10,
        crm: 2,
        access: Access::PL3_RW,
        storage: slot(Field::Mair(3)),
        write_fn: Some(tlb_flush_write),
        ..D
    },
    CpRegDef {
        name: "VBAR_EL3",
        state: RegState::Aa64,
        op0: 3,
        opc1: 6,
        crn: 12,
        access: Access::PL3_RW,
        storage: slot(Field::Vbar(3)),
        write_fn: Some(vbar_write),
        ..D
    },
    CpRegDef {
        name: "ESR_EL3",
        state: RegState::Aa64,
        op0: 3,
        opc1: 6,
        crn: 5,
        crm: 2,
        access: Access::PL3_RW,
        storage: slot(Field::Esr(3)),
        ..D
    },
    CpRegDef {
        name: "FAR_EL3",
        state: RegState::Aa64,
        op0: 3,
        opc1: 6,
        crn: 6,
        access: Access::PL3_RW,
        storage: slot(Field::Far(3)),
        ..D
    },
    CpRegDef {
        name: "ELR_EL3",
        state: RegState::Aa64,
        op0: 3,
        opc1: 6,
        crn: 4,
        opc2: 1,
        access: Access::PL3_RW,
        storage: slot(Field::ElrEl(3)),
        ..D
    },
    CpRegDef {
        name: "SPSR_EL3",
        state: RegState::Aa64,
        op0: 3,
        opc1: 6,
        crn: 4,
        access: Access::PL3_RW,
        storage: slot(Field::Spsr(bank::MON)),
        ..D
    },
    CpRegDef {
        name: "SP_EL2",
        state: RegState::Aa64,
        op0: 3,
        opc1: 6,
        crn: 4,
        crm: 1,
        access: Access::PL3_RW,
        storage: slot(Field::SpEl(2)),
        ..D
    },
    CpRegDef {
        name: "TPIDR_EL3",
        state: RegState::Aa64,
        op0: 3,
        opc1: 6,
        crn: 13,
        opc2: 2,
        access: Access::PL3_RW,
        storage: slot(Field::Tpidr(3)),
        ..D
    },
    CpRegDef {
        name: "TLBI_ALLE3",
        state: RegState::Aa64,
        op0: 1,
        opc1: 6,
        crn: 8,
        crm: 7,
        access: Access::PL3_W,
        ty: RegType::NO_RAW,
        write_fn: Some(tlbi_el3),
        ..D
    },
    CpRegDef {
        name: "TLBI_ALLE3IS",
        state: RegState::Aa64,
        op0: 1,
        opc1: 6,
        crn: 8,
        crm: 3,
        access: Access::PL3_W,
        ty: RegType::NO_RAW,
        write_fn: Some(tlbi_el3),
        ..D
    },
];

/// 物理地址宽度对应的 PARange 编码。
fn pa_range(bits: u32) -> u64 {
    match bits {
        32 => 0,
        36 => 1,
        40 => 2,
        42 => 3,
        44 => 4,
        _ => 5,
    }
}

/// 标识寄存器；取值来自 CPU 模型。
pub fn id_regs(config: &CpuConfig) -> Vec<CpRegDef> {
    let f = config.resolved_features();
    let ctr = if f.contains(Features::V8) {
        0x8444_c004
    } else if f.contains(Features::V7) {
        0x8204_8004
    } else {
        0x1d15_2152
    };
    let vmsa = if f.contains(Features::PMSA) {
        0
    } else if f.contains(Features::LPAE) {
        5
    } else if f.contains(Features::V7) {
        3
    } else {
        2
    };
    let pmsa = if f.contains(Features::PMSA) { 3 } else { 0 };
    let pfr1 = 1
        | (f.contains(Features::EL3) as u64) << 4
        | (f.contains(Features::EL2) as u64) << 12;

    let mut regs = vec![
        // 未实现的 c0,c0 编码读为 MIDR。
        CpRegDef {
            name: "MIDR",
            opc2: ANY,
            access: Access::PL1_R,
            ty: RegType::CONST.union(RegType::OVERRIDE),
            reset: config.midr as u64,
            ..D
        },
        CpRegDef {
            name: "CTR",
            opc2: 1,
            access: Access::PL1_R,
            ty: RegType::CONST,
            reset: ctr,
            ..D
        },
    ];
    if f.contains(Features::V7) {
        regs.extend([
            CpRegDef {
                name: "MPIDR",
                opc2: 5,
                access: Access::PL1_R,
                ty: RegType::NO_RAW,
                read_fn: Some(mpidr_read),
                ..D
            },
            CpRegDef {
                name: "REVIDR",
                state: RegState::Both,
                op0: 3,
                opc2: 6,
                access: Access::PL1_R,
                ty: RegType::CONST,
                ..D
            },
            CpRegDef {
                name: "CLIDR",
                state: RegState::Both,
                op0: 3,
                opc1: 1,
                opc2: 1,
                access: Access::PL1_R,
                ty: RegType::CONST,
                reset: 0x0a20_0023,
                ..D
            },
            CpRegDef {
                name: "ID_PFR1",
                state: RegState::Both,
                op0: 3,
                crm: 1,
                opc2: 1,
                access: Access::PL1_R,
                ty: RegType::CONST,
                reset: pfr1,
                ..D
            },
            CpRegDef {
                name: "ID_MMFR0",
                state: RegState::Both,
                op0: 3,
                crm: 1,
                opc2: 4,
                access: Access::PL1_R,
                ty: RegType::CONST,
                reset: vmsa | pmsa << 4,
                ..D
            },
        ]);
    }
    if f.contains(Features::PMSA) {
        regs.push(CpRegDef {
            name: "MPUIR",
            opc2: 4,
            access: Access::PL1_R,
            ty: RegType::CONST,
            reset: (config.pmsa_regions as u64) << 8,
            ..D
        });
    }
    if f.contains(Features::AARCH64) {
        let el_field = |present: bool| if present { 2 } else { 0 };
        let pfr0 = 2
            | 2 << 4
            | el_field(f.contains(Features::EL2)) << 8
            | el_field(f.contains(Features::EL3)) << 12
            | if f.contains(Features::VFP) { 0 } else { 0xf << 16 }
            | if f.contains(Features::NEON) { 0 } else { 0xf << 20 };
        regs.extend([
            CpRegDef {
                name: "MIDR_EL1",
                state: RegState::Aa64,
                op0: 3,
                access: Access::PL1_R,
                ty: RegType::CONST,
                reset: config.midr as u64,
                ..D
            },
            CpRegDef {
                name: "MPIDR_EL1",
                state: RegState::Aa64,
                op0: 3,
                opc2: 5,
                access: Access::PL1_R,
                ty: RegType::NO_RAW,
                read_fn: Some(mpidr_read),
                ..D
            },
            CpRegDef {
                name: "CTR_EL0",
                state: RegState::Aa64,
                op0: 3,
                opc1: 3,
                opc2: 1,
                access: Access::PL0_R,
                ty: RegType::CONST,
                reset: ctr,
                access_fn: Some(access_ctr),
                ..D
            },
            CpRegDef {
                name: "ID_AA64PFR0_EL1",
                state: RegState::Aa64,
                op0: 3,
                crm: 4,
                access: Access::PL1_R,
                ty: RegType::CONST,
                reset: pfr0,
                ..D
            },
            CpRegDef {
                name: "ID_AA64MMFR0_EL1",
                state: RegState::Aa64,
                op0: 3,
                crm: 7,
                access: Access::PL1_R,
                ty: RegType::CONST,
                // ASIDBits=16，BigEnd，SNSMem
                reset: pa_range(config.pa_bits) | 0x1120,
                ..D
            },
        ]);
    }
    regs
}

/// PMSAv7 区域寄存器，经由 RGNR 间接访问。
pub const PMSAV7_REGS: &[CpRegDef] = &[
    CpRegDef {
        name: "RGNR",
        crn: 6,
        crm: 2,
        access: Access::PL1_RW,
        storage: slot_lo(Field::Rgnr),
        write_fn: Some(rgnr_write),
        raw_write_fn: Some(rgnr_write),
        ..D
    },
    CpRegDef {
        name: "DRBAR",
        crn: 6,
        crm: 1,
        access: Access::PL1_RW,
        ty: RegType::NO_RAW,
        read_fn: Some(pmsav7_read),
        write_fn: Some(pmsav7_write),
        ..D
    },
    CpRegDef {
        name: "DRSR",
        crn: 6,
        crm: 1,
        opc2: 2,
        access: Access::PL1_RW,
        ty: RegType::NO_RAW,
        read_fn: Some(pmsav7_read),
        write_fn: Some(pmsav7_write),
        ..D
    },
    CpRegDef {
        name: "DRACR",
        crn: 6,
        crm: 1,
        opc2: 4,
        access: Access::PL1_RW,
        ty: RegType::NO_RAW,
        read_fn: Some(pmsav7_read),
        write_fn: Some(pmsav7_write),
        ..D
    },
];

const BVR_NAMES: [&str; 16] = [
    "DBGBVR0", "DBGBVR1", "DBGBVR2", "DBGBVR3", "DBGBVR4", "DBGBVR5", "DBGBVR6", "DBGBVR7",
    "DBGBVR8", "DBGBVR9", "DBGBVR10", "DBGBVR11", "DBGBVR12", "DBGBVR13", "DBGBVR14", "DBGBVR15",
];
const BCR_NAMES: [&str; 16] = [
    "DBGBCR0", "DBGBCR1", "DBGBCR2", "DBGBCR3", "DBGBCR4", "DBGBCR5", "DBGBCR6", "DBGBCR7",
    "DBGBCR8", "DBGBCR9", "DBGBCR10", "DBGBCR11", "DBGBCR12", "DBGBCR13", "DBGBCR14", "DBGBCR15",
];

/// 调试控制，以及每个硬件断点的一对值/控制寄存器。
pub fn debug_regs(config: &CpuConfig) -> Vec<CpRegDef> {
    let mut regs = vec![CpRegDef {
        name: "MDSCR",
        state: RegState::Both,
        cp: 14,
        op0: 2,
        crm: 2,
        opc2: 2,
        access: Access::PL1_RW,
        storage: slot(Field::Mdscr),
        access_fn: Some(access_tda),
        ..D
    }];
    for i in 0..config.num_brps.min(16) {
        let common = CpRegDef {
            state: RegState::Both,
            cp: 14,
            op0: 2,
            crm: i as u8,
            access: Access::PL1_RW,
            access_fn: Some(access_tda),
            ..D
        };
        regs.push(CpRegDef {
            name: BVR_NAMES[i],
            opc2: 4,
            storage: slot(Field::Dbgbvr(i)),
            write_fn: Some(dbgbvr_write),
            ..common
        });
        regs.push(CpRegDef {
            name: BCR_NAMES[i],
            opc2: 5,
            storage: slot(Field::Dbgbcr(i)),
            write_fn: Some(dbgbcr_write),
            ..common
        });
    }
    regs
}

/// 按模型特性定义所需的全部寄存器组。
pub fn register_all(registry: &mut CpRegistry, config: &CpuConfig) -> Result<(), DefineError> {
    let f = config.resolved_features();
    if f.contains(Features::M) {
        // 微控制器系统寄存器是内存映射的，不是协处理器寄存器。
        return Ok(());
    }
    registry.define_all(&id_regs(config))?;
    registry.define_all(COMMON_REGS)?;
    if f.contains(Features::V6) {
        registry.define_all(V6_REGS)?;
    }
    if f.contains(Features::V6K) {
        registry.define_all(THREAD_ID_REGS)?;
    }
    if f.contains(Features::PMSA) {
        registry.define_all(PMSAV7_REGS)?;
    } else {
        registry.define_all(VMSA_REGS)?;
        if f.contains(Features::V7) {
            registry.define_all(V7_VMSA_REGS)?;
        }
        if f.contains(Features::LPAE) {
            registry.define_all(LPAE_REGS)?;
        }
    }
    if f.contains(Features::V7) {
        registry.define_all(&debug_regs(config))?;
    }
    if f.contains(Features::AARCH64) {
        registry.define_all(AA64_REGS)?;
    }
    if f.contains(Features::EL2) {
        registry.define_all(EL2_REGS)?;
    } else if f.contains(Features::EL3) {
        registry.define_all(EL3_NO_EL2_REGS)?;
    }
    if f.contains(Features::EL3) {
        registry.define_all(EL3_REGS)?;
    }
    log::debug!("{}: {} system register entries", config.name, registry.len());
    Ok(())
}
