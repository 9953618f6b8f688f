//! 系统寄存器测试

use super::defs::register_all;
use super::*;
use crate::config::CpuConfig;
use crate::cpu::features::{Features, hcr, scr};
use crate::cpu::status::{CpuMode, CpuState, pstate, sctlr};
use crate::mmu::MmuIdxSet;

fn setup(config: &CpuConfig) -> (CpRegistry, CpuState) {
    let f = config.resolved_features();
    let mut reg = CpRegistry::new(f);
    register_all(&mut reg, config).unwrap();
    let mut s = CpuState::new(f).with_tables(config.pmsa_regions, config.sau_regions, config.num_irq);
    s.mpidr = config.mpidr;
    s.reset(0);
    reg.reset_all(&mut s);
    s.take_pending_tlb_flush();
    (reg, s)
}

const TPIDR_TEST: CpRegDef = CpRegDef {
    name: "TEST",
    crn: 13,
    opc2: 4,
    access: Access::PL1_RW,
    storage: Storage::Slot(Slot::full(Field::Tpidr(1))),
    ..CpRegDef::DEFAULT
};

#[test]
fn test_duplicate_definition() {
    let mut reg = CpRegistry::new(Features::V7);
    reg.define(&TPIDR_TEST).unwrap();
    let err = reg.define(&CpRegDef { name: "AGAIN", ..TPIDR_TEST }).unwrap_err();
    assert!(matches!(err, DefineError::Duplicate { name: "AGAIN", existing: "TEST", .. }));
}

#[test]
fn test_wildcard_and_override() {
    let mut reg = CpRegistry::new(Features::V7);
    reg.define(&CpRegDef {
        name: "CACHEMAINT",
        crn: 7,
        crm: ANY,
        opc2: ANY,
        access: Access::PL1_W,
        ty: RegType::NOP | RegType::OVERRIDE,
        ..CpRegDef::DEFAULT
    })
    .unwrap();
    // 16 个 crm x 8 个 opc2，两个安全分组
    assert_eq!(reg.len(), 256);

    reg.define(&CpRegDef {
        name: "PAR",
        crn: 7,
        crm: 4,
        access: Access::PL1_RW,
        storage: Storage::Slot(Slot::lo(Field::Par(1))),
        ..CpRegDef::DEFAULT
    })
    .unwrap();
    assert_eq!(reg.len(), 256);
    let par = reg.lookup(&CpRegKey::aa32(15, 7, 4, 0, 0, false)).unwrap();
    assert_eq!(par.name, "PAR");
    let other = reg.lookup(&CpRegKey::aa32(15, 7, 5, 0, 0, false)).unwrap();
    assert_eq!(other.name, "CACHEMAINT");
}

#[test]
fn test_bad_definitions() {
    let mut reg = CpRegistry::new(Features::V7);
    let err = reg
        .define(&CpRegDef { name: "NOBACK", storage: Storage::None, ..TPIDR_TEST })
        .unwrap_err();
    assert_eq!(err, DefineError::MissingAccessor { name: "NOBACK", what: "read" });
    let err = reg.define(&CpRegDef { name: "WILD", crn: ANY, ..TPIDR_TEST }).unwrap_err();
    assert_eq!(err, DefineError::BadWildcard { name: "WILD", field: "crn" });
    assert!(reg.is_empty());
}

fn count_write(state: &mut CpuState, _ri: &CpRegInfo, value: u64) {
    state.cp15.tpidr_el[1] += 1;
    state.cp15.tpidr_el[0] = value;
}

fn count_raw_write(state: &mut CpuState, _ri: &CpRegInfo, value: u64) {
    state.cp15.tpidr_el[0] = value;
}

fn tpidr0_read(state: &CpuState, _ri: &CpRegInfo) -> u64 {
    state.cp15.tpidr_el[0]
}

#[test]
fn test_raw_write_skips_write_hook() {
    let hooked = CpRegDef {
        name: "HOOKED",
        storage: Storage::None,
        read_fn: Some(tpidr0_read),
        write_fn: Some(count_write),
        ..TPIDR_TEST
    };
    let mut reg = CpRegistry::new(Features::V7);
    assert_eq!(reg.define(&hooked).unwrap_err(), DefineError::NoRawWrite { name: "HOOKED" });
    assert!(reg.is_empty());

    reg.define(&CpRegDef { raw_write_fn: Some(count_raw_write), ..hooked }).unwrap();
    let mut s = CpuState::new(Features::V7);
    let key = CpRegKey::aa32(15, 13, 0, 0, 4, false);
    reg.import_state(&mut s, &[(key, 0x77)]).unwrap();
    assert_eq!(s.cp15.tpidr_el[0], 0x77);
    assert_eq!(s.cp15.tpidr_el[1], 0);

    // 没有原始写入路径时，寄存器不纳入快照。
    let mut reg = CpRegistry::new(Features::V7);
    reg.define(&CpRegDef { ty: RegType::NO_RAW, ..hooked }).unwrap();
    assert!(reg.export_state(&s).is_empty());
    let failures = reg.import_state(&mut s, &[(key, 0x99)]).unwrap_err();
    assert_eq!(failures[0].kind, ImportFailureKind::NotRaw);
    assert_eq!(s.cp15.tpidr_el[0], 0x77);
    assert_eq!(s.cp15.tpidr_el[1], 0);
}

#[test]
fn test_aa64_view_and_alias() {
    let (reg, _) = setup(&CpuConfig::cortex_a53());
    let el1 = reg.lookup(&CpRegKey::aa64(3, 0, 1, 0, 0)).unwrap();
    assert_eq!(el1.name, "SCTLR");
    assert!(!el1.ty.contains(RegType::ALIAS));
    let aa32 = reg.lookup(&CpRegKey::aa32(15, 1, 0, 0, 0, false)).unwrap();
    assert!(aa32.ty.contains(RegType::ALIAS));
    assert_eq!(reg.by_name("SCTLR").unwrap().key, el1.key);

    // 仅 AArch32 的 CPU 没有任何 AArch64 条目。
    let (reg, _) = setup(&CpuConfig::cortex_a15());
    assert!(reg.iter().all(|ri| !ri.key.aa64));
}

#[test]
fn test_banked_sctlr() {
    let (reg, mut s) = setup(&CpuConfig::cortex_a8());
    let key = CpRegKey::aa32(15, 1, 0, 0, 0, false);
    assert_eq!(s.cp15.sctlr_el[3], 0x00c5_0078);
    assert_eq!(s.cp15.sctlr_el[1], 0x00c5_0078);

    // 复位后处于安全 SVC
    reg.write(&mut s, &key, 0x00c5_0079).unwrap();
    assert_eq!(s.cp15.sctlr_el[3], 0x00c5_0079);
    assert_eq!(s.cp15.sctlr_el[1], 0x00c5_0078);
    assert!(s.take_pending_tlb_flush().contains(MmuIdxSet::SEC_EL10));

    s.cp15.scr_el3 |= scr::NS;
    assert_eq!(reg.read(&s, &key).unwrap(), 0x00c5_0078);
    reg.write(&mut s, &key, 0x00c5_007d).unwrap();
    assert_eq!(s.cp15.sctlr_el[1], 0x00c5_007d);
    assert_eq!(s.cp15.sctlr_el[3], 0x00c5_0079);
}

#[test]
fn test_other_bank_trap() {
    let (reg, mut s) = setup(&CpuConfig::cortex_a15());
    let hcr_key = CpRegKey::aa32(15, 1, 1, 4, 0, false);

    // 安全 SVC 选择安全分组，该组只会陷入。
    let err = reg.read(&s, &hcr_key).unwrap_err();
    assert_eq!(err, CpAccessError::Undefined { name: "HCR", target_el: 3 });

    s.switch_mode(CpuMode::Mon);
    s.cp15.scr_el3 |= scr::NS;
    reg.write(&mut s, &hcr_key, hcr::VM).unwrap();
    assert_eq!(s.cp15.hcr_el2, hcr::VM);
    assert!(s.take_pending_tlb_flush().contains(MmuIdxSet::STAGE2));
    assert_eq!(reg.read(&s, &hcr_key).unwrap(), hcr::VM);
}

#[test]
fn test_other_bank_const() {
    let (reg, mut s) = setup(&CpuConfig::cortex_a8());
    let hvbar = CpRegKey::aa32(15, 12, 0, 4, 0, false);
    assert_eq!(reg.read(&s, &hvbar).unwrap(), 0);
    reg.write(&mut s, &hvbar, 0x8000).unwrap();
    assert_eq!(reg.read(&s, &hvbar).unwrap(), 0);
    let secure = reg.lookup(&CpRegKey { secure: true, ..hvbar }).unwrap();
    assert!(secure.ty.contains(RegType::CONST));
}

#[test]
fn test_access_mask_and_traps() {
    let (reg, mut s) = setup(&CpuConfig::cortex_a53());
    let daif = CpRegKey::aa64(3, 3, 4, 2, 1);
    let sctlr_el1 = CpRegKey::aa64(3, 0, 1, 0, 0);

    s.cp15.scr_el3 |= scr::NS | scr::RW;
    s.cp15.hcr_el2 = hcr::RW;
    s.pstate = 0;
    assert_eq!(
        reg.read(&s, &sctlr_el1).unwrap_err(),
        CpAccessError::Undefined { name: "SCTLR", target_el: 1 }
    );
    assert_eq!(reg.read(&s, &daif).unwrap_err(), CpAccessError::Trap { name: "DAIF", target_el: 1 });
    s.cp15.sctlr_el[1] |= sctlr::UMA;
    reg.write(&mut s, &daif, pstate::I as u64).unwrap();
    assert_eq!(s.daif, pstate::I);

    s.pstate = pstate::mode_elh(1);
    s.cp15.hcr_el2 |= hcr::TVM;
    assert_eq!(
        reg.write(&mut s, &sctlr_el1, 0).unwrap_err(),
        CpAccessError::Trap { name: "SCTLR", target_el: 2 }
    );
    assert!(reg.read(&s, &sctlr_el1).is_ok());
    s.cp15.hcr_el2 |= hcr::TRVM;
    assert_eq!(
        reg.read(&s, &sctlr_el1).unwrap_err(),
        CpAccessError::Trap { name: "SCTLR", target_el: 2 }
    );
}

#[test]
fn test_unknown_register() {
    let (reg, s) = setup(&CpuConfig::cortex_a15());
    let key = CpRegKey::aa32(15, 15, 15, 7, 7, false);
    assert_eq!(reg.read(&s, &key).unwrap_err(), CpAccessError::Unknown(key));
}

#[test]
fn test_reset_idempotent_for_presets() {
    for name in ["arm926", "cortex-a8", "cortex-a15", "cortex-a53", "cortex-r5"] {
        let config = CpuConfig::preset(name).unwrap();
        let (reg, mut s) = setup(&config);
        assert!(!reg.is_empty(), "{}", name);
        reg.check_reset(&mut s).unwrap();
    }
    let (reg, _) = setup(&CpuConfig::cortex_m3());
    assert!(reg.is_empty());
}

fn bump_reset(state: &mut CpuState, ri: &CpRegInfo) {
    let slot = ri.slot.unwrap();
    let v = slot.get(state);
    slot.set(state, v + 1);
}

#[test]
fn test_reset_not_idempotent() {
    let mut reg = CpRegistry::new(Features::V7);
    reg.define(&CpRegDef { reset_fn: Some(bump_reset), ..TPIDR_TEST }).unwrap();
    let mut s = CpuState::new(Features::V7);
    s.reset(0);
    reg.reset_all(&mut s);
    let err = reg.check_reset(&mut s).unwrap_err();
    assert!(matches!(err, DefineError::ResetNotIdempotent { name: "TEST", .. }));
}

#[test]
fn test_export_import_round_trip() {
    let config = CpuConfig::cortex_a15();
    let (reg, mut s) = setup(&config);
    s.cp15.ttbr0_el[1] = 0x1_2345_6000;
    s.cp15.mair_el[3] = 0xdead_beef_0044_ff00;
    s.cp15.vbar_el[2] = 0x8000_0000;
    s.cp15.hcr_el2 = hcr::VM | hcr::IMO;
    let snapshot = reg.export_state(&s);
    assert!(snapshot.iter().all(|(k, _)| reg.lookup(k).unwrap().is_migratable()));

    let (reg2, mut s2) = setup(&config);
    reg2.import_state(&mut s2, &snapshot).unwrap();
    assert_eq!(s2.cp15.ttbr0_el[1], 0x1_2345_6000);
    assert_eq!(s2.cp15.mair_el[3], 0xdead_beef_0044_ff00);
    assert_eq!(s2.cp15.hcr_el2, hcr::VM | hcr::IMO);
    assert_eq!(reg2.export_state(&s2), snapshot);
}

#[test]
fn test_import_collects_failures() {
    let (reg, mut s) = setup(&CpuConfig::cortex_r5());
    let unknown = CpRegKey::aa32(15, 15, 15, 7, 7, false);
    let drbar = CpRegKey::aa32(15, 6, 1, 0, 0, false);
    let rgnr = CpRegKey::aa32(15, 6, 2, 0, 0, false);
    let tpidr = CpRegKey::aa32(15, 13, 0, 0, 4, false);
    let entries = [(unknown, 1), (drbar, 0x1000), (rgnr, 99), (tpidr, 0x55)];

    let failures = reg.import_state(&mut s, &entries).unwrap_err();
    let kinds: Vec<_> = failures.iter().map(|f| (f.key, f.kind)).collect();
    assert_eq!(
        kinds,
        vec![
            (unknown, ImportFailureKind::UnknownKey),
            (drbar, ImportFailureKind::NotRaw),
            (rgnr, ImportFailureKind::Mismatch { expected: 99, actual: 0 }),
        ]
    );
    // 合法的条目仍会生效。
    assert_eq!(s.cp15.tpidr_el[1], 0x55);
}

#[test]
fn test_pmsav7_region_indirection() {
    let (reg, mut s) = setup(&CpuConfig::cortex_r5());
    let rgnr = CpRegKey::aa32(15, 6, 2, 0, 0, false);
    let drbar = CpRegKey::aa32(15, 6, 1, 0, 0, false);
    let dracr = CpRegKey::aa32(15, 6, 1, 0, 4, false);
    reg.write(&mut s, &rgnr, 3).unwrap();
    reg.write(&mut s, &drbar, 0x2000_0000).unwrap();
    reg.write(&mut s, &dracr, 0x0300).unwrap();
    assert_eq!(s.pmsa.drbar[0][3], 0x2000_0000);
    assert_eq!(s.pmsa.dracr[0][3], 0x0300);
    assert_eq!(s.take_pending_tlb_flush(), MmuIdxSet::all());

    reg.write(&mut s, &rgnr, 16).unwrap();
    assert_eq!(reg.read(&s, &rgnr).unwrap(), 3);
    assert_eq!(reg.read(&s, &drbar).unwrap(), 0x2000_0000);
    let mpuir = CpRegKey::aa32(15, 0, 0, 0, 4, false);
    assert_eq!(reg.read(&s, &mpuir).unwrap(), 16 << 8);
}

#[test]
fn test_tlbi_records_local_flush() {
    let (reg, mut s) = setup(&CpuConfig::cortex_a15());
    let tlbiall = CpRegKey::aa32(15, 8, 7, 0, 0, false);
    reg.write(&mut s, &tlbiall, 0).unwrap();
    assert_eq!(s.take_pending_tlb_flush(), MmuIdxSet::SEC_EL10);

    s.cp15.scr_el3 |= scr::NS;
    reg.write(&mut s, &tlbiall, 0).unwrap();
    assert_eq!(s.take_pending_tlb_flush(), MmuIdxSet::EL10);
    assert_eq!(s.take_pending_tlb_flush(), MmuIdxSet::empty());
    // 维护操作只写。
    assert!(reg.read(&s, &tlbiall).is_err());
}

#[test]
fn test_id_registers() {
    let config = CpuConfig::cortex_a53().with_mpidr(0x8000_0102);
    let (reg, s) = setup(&config);
    let mmfr0 = reg.read(&s, &CpRegKey::aa64(3, 0, 0, 7, 0)).unwrap();
    assert_eq!(mmfr0 & 0xf, 2);
    assert_eq!(reg.read(&s, &CpRegKey::aa64(3, 0, 0, 0, 5)).unwrap(), 0x8000_0102);
    assert_eq!(reg.read(&s, &CpRegKey::aa64(3, 0, 0, 0, 0)).unwrap(), 0x410f_d034);
    let pfr0 = reg.read(&s, &CpRegKey::aa64(3, 0, 0, 4, 0)).unwrap();
    assert_eq!((pfr0 >> 8) & 0xf, 2);
    assert_eq!((pfr0 >> 12) & 0xf, 2);

    // 未分配的 c0,c0 编码读为 MIDR。
    let (reg, s) = setup(&CpuConfig::cortex_a8());
    assert_eq!(reg.read(&s, &CpRegKey::aa32(15, 0, 0, 0, 7, true)).unwrap(), 0x410f_c080);
    assert_eq!(reg.read(&s, &CpRegKey::aa32(15, 0, 0, 0, 1, true)).unwrap(), 0x8204_8004);
}

#[test]
fn test_breakpoint_registers() {
    let (reg, mut s) = setup(&CpuConfig::cortex_a53());
    let bvr0 = CpRegKey::aa64(2, 0, 0, 0, 4);
    let bcr0 = CpRegKey::aa64(2, 0, 0, 0, 5);
    reg.write(&mut s, &bvr0, 0x0001_0000_0000_0007).unwrap();
    assert_eq!(s.cp15.dbgbvr[0], 0xffff_0000_0000_0004);
    reg.write(&mut s, &bcr0, 1 << 5 | 1).unwrap();
    assert_eq!(s.cp15.dbgbcr[0], 1 << 6 | 1 << 5 | 1);
    assert!(reg.lookup(&CpRegKey::aa64(2, 0, 0, 6, 4)).is_none());

    s.cp15.mdcr_el3 |= 1 << 9;
    s.cp15.scr_el3 |= scr::NS | scr::RW;
    s.pstate = pstate::mode_elh(1);
    assert_eq!(
        reg.read(&s, &bvr0).unwrap_err(),
        CpAccessError::Trap { name: "DBGBVR0", target_el: 3 }
    );
}

#[test]
fn test_spsel_and_sp_el0() {
    let (reg, mut s) = setup(&CpuConfig::cortex_a53());
    let spsel = CpRegKey::aa64(3, 0, 4, 2, 0);
    let sp_el0 = CpRegKey::aa64(3, 0, 4, 1, 0);
    s.xregs[31] = 0x3000;
    s.sp_el[0] = 0x1000;

    reg.write(&mut s, &spsel, 0).unwrap();
    assert_eq!(s.sp_el[3], 0x3000);
    assert_eq!(s.xregs[31], 0x1000);
    assert_eq!(
        reg.read(&s, &sp_el0).unwrap_err(),
        CpAccessError::Undefined { name: "SP_EL0", target_el: 3 }
    );
    reg.write(&mut s, &spsel, 1).unwrap();
    assert_eq!(s.xregs[31], 0x3000);
    assert_eq!(reg.read(&s, &sp_el0).unwrap(), 0x1000);
    assert_eq!(reg.read(&s, &CpRegKey::aa64(3, 0, 4, 2, 2)).unwrap(), 3 << 2);
}
