//! arm_core_sim CLI 示例入口
//!
//! 演示如何使用 arm_core_sim 库：构建 CPU 模型、解析地址、进入和退出异常。
//! 日志通过 `RUST_LOG` 控制，例如 `RUST_LOG=debug`。

use std::env;
use std::error::Error;

use arm_core_sim::config::CpuConfig;
use arm_core_sim::cpu::{ArmCpu, CpRegKey, CpuBuilder, ExceptionEvent, ExceptionKind};
use arm_core_sim::memory::FlatMemory;
use arm_core_sim::mmu::AccessType;

const M_RAM: u32 = 0x2000_0000;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if let Some(name) = args.get(1) {
        let cpu = CpuBuilder::preset(name)?.build()?;
        println!("{}: {:?}", cpu.config().name, cpu.features());
        println!("系统寄存器数量: {}", cpu.registry().len());
        println!("模式描述符: {:#010x}", cpu.pack_mode_descriptor().bits());
        cpu.dump_regs();
        return Ok(());
    }

    println!("=== arm_core_sim: ARM 处理器状态与地址转换核心 ===\n");
    demo_short_descriptor()?;
    println!();
    demo_m_profile_exception()?;
    Ok(())
}

/// ARMv5 段映射：0x8000_0000 -> 0x0010_0000
fn demo_short_descriptor() -> Result<(), Box<dyn Error>> {
    println!("=== 演示 1：短描述符页表 (arm926) ===\n");
    let mut cpu = ArmCpu::new(CpuConfig::arm926())?;
    let mut mem = FlatMemory::new(0x8000, 0);

    let ttbr = 0x4000u64;
    let vaddr = 0x8000_1234u64;
    // 段描述符: AP=3, domain 0
    let section = 0x0010_0000 | 3 << 10 | 1 << 4 | 0b10;
    mem.write_u32(ttbr + (vaddr >> 20) * 4, section)?;

    cpu.reg_write(&CpRegKey::aa32(15, 2, 0, 0, 0, false), ttbr)?;
    cpu.reg_write(&CpRegKey::aa32(15, 3, 0, 0, 0, false), 1)?;
    let sctlr = CpRegKey::aa32(15, 1, 0, 0, 0, false);
    let value = cpu.reg_read(&sctlr)?;
    cpu.reg_write(&sctlr, value | 1)?;

    let t = cpu.resolve(&mem, vaddr, AccessType::Read)?;
    println!("{:#010x} -> {:#010x}  prot={:?}", vaddr, t.phys, t.prot);
    match cpu.resolve(&mem, 0x9000_0000, AccessType::Write) {
        Ok(t) => println!("0x90000000 -> {:#010x}", t.phys),
        Err(f) => println!("0x90000000: {:?} fault, level {}, FSR={:#x}", f.kind, f.level, f.fsr(false)),
    }
    println!("待刷新 TLB: {:?}", cpu.take_pending_tlb_flush());
    Ok(())
}

/// Cortex-M3：SVC 进入与 EXC_RETURN 退出
fn demo_m_profile_exception() -> Result<(), Box<dyn Error>> {
    println!("=== 演示 2：M-profile 异常进入与返回 (cortex-m3) ===\n");
    let mut cpu = ArmCpu::new(CpuConfig::cortex_m3().with_m_vecbase(M_RAM))?;
    let mut mem = FlatMemory::new(0x1_0000, M_RAM as u64);

    mem.write_u32(M_RAM as u64, M_RAM + 0x8000)?;
    for exc in 1..16 {
        mem.write_u32((M_RAM + exc * 4) as u64, M_RAM + 0x1000 + exc * 0x10 + 1)?;
    }
    cpu.load_reset_vector(&mem)?;
    println!("复位: sp={:#010x} pc={:#010x}", cpu.state().regs[13], cpu.pc());

    let outcome = cpu.take_exception(&mut mem, &ExceptionEvent::new(ExceptionKind::Svc));
    println!("SVC -> {:?}", outcome);
    println!(
        "handler: pc={:#010x} lr={:#010x} sp={:#010x}",
        cpu.pc(),
        cpu.state().regs[14],
        cpu.state().regs[13]
    );

    let excret = cpu.state().regs[14];
    cpu.state_mut().regs[15] = excret;
    let ret = cpu.return_from_exception(&mut mem)?;
    println!("返回 -> {:?}, pc={:#010x} sp={:#010x}", ret, cpu.pc(), cpu.state().regs[13]);
    cpu.dump_regs();
    Ok(())
}
