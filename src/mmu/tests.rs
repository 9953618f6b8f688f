//! 地址转换测试

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;
use crate::cpu::features::{Features, hcr};
use crate::cpu::status::{CpuState, pstate, sctlr};
use crate::memory::{AccessSize, FlatMemory};

fn v7_state() -> CpuState {
    let mut s = CpuState::new(Features::V7.closure());
    s.reset(0);
    s
}

/// 带 EL2 的 AArch64 CPU，运行在非安全 EL1。
fn aa64_el1_state() -> CpuState {
    let mut s = CpuState::new((Features::AARCH64 | Features::EL2).closure());
    s.reset(0);
    s.pstate = pstate::mode_elh(1);
    s.cp15.hcr_el2 = hcr::RW;
    s
}

fn m_state(features: Features) -> CpuState {
    let mut s = CpuState::new(features.closure()).with_tables(8, 4, 16);
    s.reset(0);
    s
}

#[test]
fn test_disabled_translation_is_identity() {
    let mem = FlatMemory::new(0x1000, 0);
    let mut rng = StdRng::seed_from_u64(0x5eed);

    let v7 = v7_state();
    let a64 = aa64_el1_state();
    let mut lpae = v7_state();
    lpae.features |= Features::LPAE;
    lpae.cp15.tcr_el[1] = TTBCR_EAE;
    let m = m_state(Features::M | Features::V8);

    let cases = [
        (&v7, MmuIdx::El10Priv),
        (&lpae, MmuIdx::El10User),
        (&a64, MmuIdx::El10Priv),
        (&m, MmuIdx::MPriv),
        (&m, MmuIdx::MUser),
    ];
    for _ in 0..64 {
        let addr = rng.gen_range(0..=u32::MAX) as u64;
        for (state, idx) in cases {
            assert!(translation_disabled(state, idx));
            for access in [AccessType::Read, AccessType::Write, AccessType::Fetch] {
                let t = translate(state, &mem, addr, access, idx).unwrap();
                assert_eq!(t.phys, addr);
                assert_eq!(t.prot, Prot::all());
            }
        }
    }
}

/// 短描述符状态：一级页表位于 0x4000，域 0 为 client。
fn short_desc_setup() -> (CpuState, FlatMemory) {
    let mut s = v7_state();
    s.cp15.sctlr_el[1] |= sctlr::M;
    s.cp15.ttbr0_el[1] = 0x4000;
    s.cp15.dacr[1] = 0x1;
    (s, FlatMemory::new(0x10000, 0))
}

#[test]
fn test_short_desc_section() {
    let (s, mut mem) = short_desc_setup();
    // VA 0x001xxxxx -> PA 0x002xxxxx，AP=3 完全访问
    mem.write_u32(0x4000 + 4, 0x0020_0000 | 3 << 10 | 2).unwrap();
    let t = translate(&s, &mem, 0x0010_0abc, AccessType::Write, MmuIdx::El10User).unwrap();
    assert_eq!(t.phys, 0x0020_0abc);
    assert_eq!(t.page_size, 0x10_0000);
    assert_eq!(t.prot, Prot::all());
}

#[test]
fn test_short_desc_small_page_xn() {
    let (s, mut mem) = short_desc_setup();
    // VA 0x0000_0000 的一级表项，指向 0x5000 的二级页表
    mem.write_u32(0x4000, 0x5000 | 1).unwrap();
    // 索引 2 处的小页 0x3000，AP=3，XN
    mem.write_u32(0x5000 + 2 * 4, 0x0000_3000 | 3 << 4 | 2 | 1).unwrap();
    let t = translate(&s, &mem, 0x2010, AccessType::Read, MmuIdx::El10Priv).unwrap();
    assert_eq!(t.phys, 0x3010);
    assert!(!t.prot.contains(Prot::EXEC));
    let f = translate(&s, &mem, 0x2010, AccessType::Fetch, MmuIdx::El10Priv).unwrap_err();
    assert_eq!((f.kind, f.level), (FaultKind::Permission, 2));
}

#[test]
fn test_short_desc_translation_faults() {
    let (s, mut mem) = short_desc_setup();
    let f = translate(&s, &mem, 0x0030_0000, AccessType::Read, MmuIdx::El10Priv).unwrap_err();
    assert_eq!((f.kind, f.level), (FaultKind::Translation, 1));
    assert_eq!(f.short_fsr(), 0x5);

    mem.write_u32(0x4000, 0x5000 | 1).unwrap();
    let f = translate(&s, &mem, 0x1000, AccessType::Read, MmuIdx::El10Priv).unwrap_err();
    assert_eq!((f.kind, f.level), (FaultKind::Translation, 2));
    assert_eq!(f.short_fsr(), 0x7);
}

#[test]
fn test_short_desc_domain_fault() {
    let (mut s, mut mem) = short_desc_setup();
    // 域 5，无访问权限
    mem.write_u32(0x4000 + 4, 0x0020_0000 | 5 << 5 | 3 << 10 | 2).unwrap();
    s.cp15.dacr[1] = 0x1;
    let f = translate(&s, &mem, 0x0010_0000, AccessType::Read, MmuIdx::El10Priv).unwrap_err();
    assert_eq!(f.kind, FaultKind::Domain);
    assert_eq!(f.domain, 5);

    // manager 域忽略 AP
    s.cp15.dacr[1] = 3 << 10;
    mem.write_u32(0x4000 + 4, 0x0020_0000 | 5 << 5 | 2).unwrap();
    let t = translate(&s, &mem, 0x0010_0000, AccessType::Write, MmuIdx::El10User).unwrap();
    assert_eq!(t.prot, Prot::all());
}

#[test]
fn test_short_desc_v5_coarse_page() {
    let mut s = CpuState::new(Features::V5.closure());
    s.reset(0);
    s.cp15.sctlr_el[1] |= sctlr::M | sctlr::S;
    s.cp15.ttbr0_el[1] = 0x4000;
    s.cp15.dacr[1] = 0x1;
    let mut mem = FlatMemory::new(0x10000, 0);
    mem.write_u32(0x4000, 0x5000 | 1).unwrap();
    // 4K 页，四个子页均为 AP=0
    mem.write_u32(0x5000 + 4, 0x0000_8000 | 2).unwrap();
    // SCTLR.S：AP=0 为特权只读
    let t = translate(&s, &mem, 0x1004, AccessType::Read, MmuIdx::El10Priv).unwrap();
    assert_eq!(t.phys, 0x8004);
    assert_eq!(t.prot, Prot::READ | Prot::EXEC);
    assert!(translate(&s, &mem, 0x1004, AccessType::Read, MmuIdx::El10User).is_err());
}

#[test]
fn test_short_desc_supersection() {
    let (s, mut mem) = short_desc_setup();
    // 16MB 超级段：基址 0x05，PA[35:32]=0xa，PA[39:36]=0x3
    let desc = 0x0500_0000 | 0xa << 20 | 1 << 18 | 3 << 10 | 0x3 << 5 | 2;
    mem.write_u32(0x4000 + 0x12 * 4, desc).unwrap();
    let t = translate(&s, &mem, 0x0123_4567, AccessType::Write, MmuIdx::El10Priv).unwrap();
    assert_eq!(t.phys, 0x3a_0523_4567);
    assert_eq!(t.page_size, 0x100_0000);
    // [8:5] 位在这里是 PA 位而不是域：仍使用域 0。
    assert_eq!(t.prot, Prot::all());
}

#[test]
fn test_short_desc_large_page() {
    let (s, mut mem) = short_desc_setup();
    mem.write_u32(0x4000, 0x5000 | 1).unwrap();
    // PA 0x0007_0000 处的 64K 大页，AP=3，XN 清零
    mem.write_u32(0x5000 + 3 * 4, 0x0007_0000 | 3 << 4 | 1).unwrap();
    let t = translate(&s, &mem, 0x3456, AccessType::Fetch, MmuIdx::El10User).unwrap();
    assert_eq!(t.phys, 0x0007_3456);
    assert_eq!(t.page_size, 0x1_0000);
    assert_eq!(t.prot, Prot::all());
}

#[test]
fn test_short_desc_v5_tiny_page() {
    let mut s = CpuState::new(Features::V5.closure());
    s.reset(0);
    s.cp15.sctlr_el[1] |= sctlr::M;
    s.cp15.ttbr0_el[1] = 0x4000;
    s.cp15.dacr[1] = 0x1;
    let mut mem = FlatMemory::new(0x10000, 0);
    // 细粒度页表位于 0x6000
    mem.write_u32(0x4000, 0x6000 | 3).unwrap();
    // VA 0x1000..0x1400 的 1K 微页 -> PA 0x9c00，AP=3
    mem.write_u32(0x6000 + 0x10, 0x0000_9c00 | 3 << 4 | 3).unwrap();
    let t = translate(&s, &mem, 0x1234, AccessType::Write, MmuIdx::El10User).unwrap();
    assert_eq!(t.phys, 0x9e34);
    assert_eq!(t.page_size, 0x400);
    assert_eq!(t.prot, Prot::all());
}

#[test]
fn test_short_desc_write_implies_no_execute() {
    let (mut s, mut mem) = short_desc_setup();
    s.features = (Features::V7 | Features::LPAE).closure();
    // 可写段，XN 清零
    mem.write_u32(0x4000 + 4, 0x0020_0000 | 3 << 10 | 2).unwrap();
    let va = 0x0010_0040;
    let t = translate(&s, &mem, va, AccessType::Fetch, MmuIdx::El10Priv).unwrap();
    assert!(t.prot.contains(Prot::EXEC));

    s.cp15.sctlr_el[1] |= sctlr::WXN;
    let f = translate(&s, &mem, va, AccessType::Fetch, MmuIdx::El10Priv).unwrap_err();
    assert_eq!((f.kind, f.level), (FaultKind::Permission, 1));
    let t = translate(&s, &mem, va, AccessType::Write, MmuIdx::El10Priv).unwrap();
    assert_eq!(t.prot, Prot::READ | Prot::WRITE);

    // UWXN：用户可写内存永不允许特权执行。
    s.cp15.sctlr_el[1] &= !sctlr::WXN;
    s.cp15.sctlr_el[1] |= sctlr::UWXN;
    assert!(translate(&s, &mem, va, AccessType::Fetch, MmuIdx::El10Priv).is_err());
    assert!(translate(&s, &mem, va, AccessType::Fetch, MmuIdx::El10User).is_ok());

    // 简化访问权限模型下规则相同。
    s.cp15.sctlr_el[1] |= sctlr::WXN | sctlr::AFE;
    mem.write_u32(0x4000 + 4, 0x0020_0000 | 1 << 10 | 2).unwrap();
    let t = translate(&s, &mem, va, AccessType::Read, MmuIdx::El10Priv).unwrap();
    assert_eq!(t.prot, Prot::READ | Prot::WRITE);
}

/// LPAE AArch32 状态，一级页表位于 0x1000。
fn lpae_setup() -> (CpuState, FlatMemory) {
    let mut s = v7_state();
    s.features |= Features::LPAE.closure();
    s.cp15.sctlr_el[1] |= sctlr::M;
    s.cp15.tcr_el[1] = TTBCR_EAE;
    s.cp15.ttbr0_el[1] = 0x1000;
    s.cp15.mair_el[1] = 0xff;
    (s, FlatMemory::new(0x10000, 0))
}

#[test]
fn test_lpae_level1_block() {
    let (s, mut mem) = lpae_setup();
    // VA 0x4000_0000 的 1GB 块 -> PA 0x8000_0000，AF 置位
    mem.write_u64(0x1008, 0x8000_0000 | 1 << 10 | 1).unwrap();
    let t = translate(&s, &mem, 0x4000_1234, AccessType::Write, MmuIdx::El10Priv).unwrap();
    assert_eq!(t.phys, 0x8000_1234);
    assert_eq!(t.page_size, 1 << 30);
    assert_eq!(t.prot, Prot::all());
    assert_eq!(t.attrs.attrs, 0xff);
    // AP=0 拒绝 EL0
    let f = translate(&s, &mem, 0x4000_1234, AccessType::Read, MmuIdx::El10User).unwrap_err();
    assert_eq!((f.kind, f.level), (FaultKind::Permission, 1));
}

#[test]
fn test_lpae_access_flag_and_table_ap() {
    let (s, mut mem) = lpae_setup();
    mem.write_u64(0x1000, 0x8000_0000 | 1).unwrap();
    let f = translate(&s, &mem, 0x10, AccessType::Read, MmuIdx::El10Priv).unwrap_err();
    assert_eq!((f.kind, f.level), (FaultKind::AccessFlag, 1));
    assert_eq!(f.fsr(true), 0x9 | 1 << 9);

    // 带 APTable[1]（只读）的一级表，二级 2MB 块 AP=1
    mem.write_u64(0x1008, 0x2000 | 1 << 62 | 3).unwrap();
    mem.write_u64(0x2000, 0x0060_0000 | 1 << 10 | 1 << 6 | 1).unwrap();
    let t = translate(&s, &mem, 0x4000_0010, AccessType::Read, MmuIdx::El10User).unwrap();
    assert_eq!(t.phys, 0x0060_0010);
    assert_eq!(t.page_size, 2 << 20);
    let f = translate(&s, &mem, 0x4000_0010, AccessType::Write, MmuIdx::El10User).unwrap_err();
    assert_eq!((f.kind, f.level), (FaultKind::Permission, 2));
}

/// 第一阶段页表位于 IPA 0x1000，第二阶段位于 0x2000；IPA 第 0 个 GB 为恒等读写映射。
fn two_stage_setup() -> (CpuState, FlatMemory) {
    let mut s = aa64_el1_state();
    s.cp15.hcr_el2 |= hcr::VM;
    s.cp15.vtcr_el2 = 25 | 1 << 6;
    s.cp15.vttbr_el2 = 0x2000;
    s.cp15.sctlr_el[1] = sctlr::M;
    s.cp15.tcr_el[1] = 25;
    s.cp15.ttbr0_el[1] = 0x1000;
    let mut mem = FlatMemory::new(0x10000, 0);
    mem.write_u64(0x2000, 1 << 10 | 3 << 6 | 0xf << 2 | 1).unwrap();
    (s, mem)
}

#[test]
fn test_two_stage_permissions_are_intersection() {
    let (s, mut mem) = two_stage_setup();
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..200 {
        let ap = rng.gen_range(0..4u32);
        let uxn = rng.gen_bool(0.5);
        let pxn = rng.gen_bool(0.5);
        let s2ap = rng.gen_range(0..4u32);
        let s2xn = rng.gen_bool(0.5);
        let user = rng.gen_bool(0.5);
        let idx = if user { MmuIdx::El10User } else { MmuIdx::El10Priv };

        let s1 = 0x4000_0000u64 | 1 << 10 | (ap as u64) << 6 | (pxn as u64) << 53 | (uxn as u64) << 54 | 1;
        let s2 = 0x4000_0000u64 | 1 << 10 | (s2ap as u64) << 6 | 0xf << 2 | (s2xn as u64) << 54 | 1;
        mem.write_u64(0x1008, s1).unwrap();
        mem.write_u64(0x2008, s2).unwrap();

        let p1 = s1_prot(&s, idx, true, ap, true, uxn, pxn);
        let p2 = s2_prot(&s, s2ap, s2xn);
        for access in [AccessType::Read, AccessType::Write, AccessType::Fetch] {
            match translate(&s, &mem, 0x4000_0040, access, idx) {
                Ok(t) => {
                    assert_eq!(t.prot, p1 & p2);
                    assert_eq!(t.phys, 0x4000_0040);
                }
                Err(f) => {
                    assert_eq!(f.kind, FaultKind::Permission);
                    if p1.contains(access.required()) {
                        assert!(f.stage2);
                        assert_eq!(f.s2addr, 0x4000_0040);
                        assert!(!p2.contains(access.required()));
                    } else {
                        assert!(!f.stage2);
                    }
                }
            }
        }
    }
}

#[test]
fn test_stage2_fault_on_table_walk() {
    let (mut s, mem) = two_stage_setup();
    // 第一阶段页表位于第二阶段未映射的 IPA
    s.cp15.ttbr0_el[1] = 0x8000_0000;
    let f = translate(&s, &mem, 0x4000_0000, AccessType::Read, MmuIdx::El10Priv).unwrap_err();
    assert_eq!(f.kind, FaultKind::Translation);
    assert!(f.stage2 && f.s1ptw);
    assert_eq!(f.s2addr, 0x8000_0000 | (0x4000_0000 >> 30) * 8);
    assert_eq!(f.vaddr, 0x4000_0000);
}

#[test]
fn test_aa64_input_range_fault() {
    let (s, mem) = two_stage_setup();
    // 39 位输入大小：第 40 位置位超出 TTBR0 的范围
    let f = translate(&s, &mem, 1 << 40, AccessType::Read, MmuIdx::El10Priv).unwrap_err();
    assert_eq!((f.kind, f.level, f.stage2), (FaultKind::Translation, 0, false));
}

fn pmsav7_setup() -> (CpuState, FlatMemory) {
    let mut s = CpuState::new((Features::V7 | Features::PMSA).closure()).with_tables(8, 0, 0);
    s.reset(0);
    s.cp15.sctlr_el[1] |= sctlr::M;
    // 区域 0：0 地址起 1MB，完全访问
    s.pmsa.drbar[0][0] = 0;
    s.pmsa.drsr[0][0] = 19 << 1 | 1;
    s.pmsa.dracr[0][0] = 3 << 8;
    (s, FlatMemory::new(0x1000, 0))
}

#[test]
fn test_pmsav7_region_and_background() {
    let (mut s, mem) = pmsav7_setup();
    let t = translate(&s, &mem, 0x8_0000, AccessType::Write, MmuIdx::El10User).unwrap();
    assert_eq!(t.prot, Prot::all());

    let f = translate(&s, &mem, 0x20_0000, AccessType::Read, MmuIdx::El10Priv).unwrap_err();
    assert_eq!(f.kind, FaultKind::Background);

    s.cp15.sctlr_el[1] |= sctlr::BR;
    assert!(translate(&s, &mem, 0x20_0000, AccessType::Read, MmuIdx::El10Priv).is_ok());
    // 非特权访问永远不能使用背景映射
    assert!(translate(&s, &mem, 0x20_0000, AccessType::Read, MmuIdx::El10User).is_err());
}

#[test]
fn test_pmsav7_subregion_disable_and_priority() {
    let (mut s, mem) = pmsav7_setup();
    // 禁用区域 0 的子区域 1（128K..256K）
    s.pmsa.drsr[0][0] |= 1 << 9;
    let f = translate(&s, &mem, 0x2_0000, AccessType::Read, MmuIdx::El10Priv).unwrap_err();
    assert_eq!(f.kind, FaultKind::Background);

    // 编号大的区域优先：区域 3 在 0x1000 处 4K 只读
    s.pmsa.drbar[0][3] = 0x1000;
    s.pmsa.drsr[0][3] = 11 << 1 | 1;
    s.pmsa.dracr[0][3] = 6 << 8 | 1 << 12;
    let t = translate(&s, &mem, 0x1000, AccessType::Read, MmuIdx::El10Priv).unwrap();
    assert_eq!(t.prot, Prot::READ);
    let f = translate(&s, &mem, 0x1000, AccessType::Write, MmuIdx::El10Priv).unwrap_err();
    assert_eq!((f.kind, f.level), (FaultKind::Permission, 1));
}

#[test]
fn test_pmsav8_overlap_is_fault() {
    let mut s = m_state(Features::M | Features::V8);
    s.v7m.mpu_ctrl[0] = mpu_ctrl::ENABLE;
    let mem = FlatMemory::new(0x1000, 0);
    s.pmsa.rbar[0][0] = 0x2000_0000 | 1 << 1;
    s.pmsa.rlar[0][0] = 0x2000_ffe0 | 1;
    let t = translate(&s, &mem, 0x2000_0100, AccessType::Read, MmuIdx::MUser).unwrap();
    assert_eq!(t.prot, Prot::all());

    s.pmsa.rbar[0][1] = 0x2000_0000;
    s.pmsa.rlar[0][1] = 0x2000_01e0 | 1;
    let f = translate(&s, &mem, 0x2000_0100, AccessType::Read, MmuIdx::MUser).unwrap_err();
    assert_eq!((f.kind, f.level), (FaultKind::Permission, 1));
    // 两个区域之外，且无 PRIVDEFENA
    let f = translate(&s, &mem, 0x3000_0000, AccessType::Read, MmuIdx::MPriv).unwrap_err();
    assert_eq!(f.kind, FaultKind::Background);
}

#[test]
fn test_m_system_region_never_executes() {
    let mut s = m_state(Features::M | Features::V7);
    s.v7m.mpu_ctrl[0] = mpu_ctrl::ENABLE | mpu_ctrl::PRIVDEFENA;
    let mem = FlatMemory::new(0x1000, 0);
    let t = translate(&s, &mem, 0xe000_ed00, AccessType::Read, MmuIdx::MPriv).unwrap();
    assert!(!t.prot.contains(Prot::EXEC));
    let f = translate(&s, &mem, 0xf000_0000, AccessType::Fetch, MmuIdx::MPriv).unwrap_err();
    assert_eq!(f.kind, FaultKind::Permission);
}

#[test]
fn test_sau_attribution() {
    let mut s = m_state(Features::M_SECURITY);
    let mem = FlatMemory::new(0x1000, 0);
    s.sau.ctrl = sau::ctrl::ENABLE;
    s.sau.rbar[0] = 0x2000_0000;
    s.sau.rlar[0] = 0x2000_ffe0 | 1;
    s.sau.rbar[1] = 0x1000_0000;
    s.sau.rlar[1] = 0x1000_ffe0 | 2 | 1;

    // 安全数据访问 NS 内存时降级
    let t = translate(&s, &mem, 0x2000_0000, AccessType::Read, MmuIdx::MSecPriv).unwrap();
    assert!(!t.secure);
    // NS 数据访问安全内存
    let f = translate(&s, &mem, 0x3000_0000, AccessType::Read, MmuIdx::MPriv).unwrap_err();
    assert_eq!(f.kind, FaultKind::SecurityViolation);
    // NS 取指访问 NSC 内存
    let f = translate(&s, &mem, 0x1000_0000, AccessType::Fetch, MmuIdx::MPriv).unwrap_err();
    assert_eq!(f.kind, FaultKind::NsCallableFetch);
    // 系统控制空间免检
    assert!(translate(&s, &mem, 0xe000_ed04, AccessType::Read, MmuIdx::MPriv).is_ok());

    s.sau.rbar[2] = 0x2000_8000;
    s.sau.rlar[2] = 0x2000_8fe0 | 1;
    let f = translate(&s, &mem, 0x2000_8000, AccessType::Read, MmuIdx::MPriv).unwrap_err();
    assert_eq!(f.kind, FaultKind::SecurityAmbiguous);
}

#[test]
fn test_idau_only_raises_security() {
    let mut s = m_state(Features::M_SECURITY);
    s.sau.ctrl = sau::ctrl::ALLNS;
    s.sau.idau.push(sau::IdauRegion {
        base: 0x1000_0000,
        limit: 0x1fff_ffff,
        ns: false,
        nsc: false,
        exempt: false,
        number: Some(1),
    });
    let a = sau::security_lookup(&s, 0x1000_0000, AccessType::Read, MmuIdx::MPriv).unwrap();
    assert!(!a.ns && !a.nsc);
    assert_eq!(a.iregion, Some(1));
    let a = sau::security_lookup(&s, 0x2000_0000, AccessType::Read, MmuIdx::MPriv).unwrap();
    assert!(a.ns);
}

#[test]
fn test_alignment_check() {
    let mut s = v7_state();
    assert!(check_alignment(&s, 0x1002, AccessSize::Word, AccessType::Read, MmuIdx::El10Priv).is_ok());
    s.cp15.sctlr_el[1] |= sctlr::A;
    let f = check_alignment(&s, 0x1002, AccessSize::Word, AccessType::Write, MmuIdx::El10Priv)
        .unwrap_err();
    assert_eq!(f.kind, FaultKind::Alignment);
    assert_eq!(f.fsr(false), 0x1 | 1 << 11);

    let m = m_state(Features::M | Features::V7);
    assert!(check_alignment(&m, 0x2, AccessSize::Double, AccessType::Read, MmuIdx::MPriv).is_err());
}

#[test]
fn test_current_mmu_idx_a_profile() {
    let mut s = v7_state();
    assert_eq!(current_mmu_idx(&s), MmuIdx::El10Priv);
    s.switch_mode(crate::cpu::status::CpuMode::Usr);
    assert_eq!(current_mmu_idx(&s), MmuIdx::El10User);

    let mut s = CpuState::new((Features::V7 | Features::EL3).closure());
    s.reset(0);
    assert_eq!(current_mmu_idx(&s), MmuIdx::SecEl10Priv);
    assert_eq!(regime_el(&s, MmuIdx::SecEl10Priv), 3);
}
