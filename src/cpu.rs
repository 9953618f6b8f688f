//! CPU 核心
//!
//! 本模块定义单个虚拟 ARM CPU 的外观 `ArmCpu`，把架构状态、系统寄存器表、
//! 地址转换与异常状态机组合在一起，向翻译器/解释器和快照前端暴露边界操作。
//!
//! 设计约定：
//! - 每个 `ArmCpu` 独占自己的 `CpuState` 与 `CpRegistry`，多个实例之间只共享
//!   不可变的模型定义与外部物理内存
//! - 所有操作都是同步的纯状态转换，不做阻塞 I/O
//! - TLB 失效只记录在本 CPU 的待刷新集合中，跨 CPU 广播由嵌入系统负责

use crate::config::CpuConfig;
use crate::memory::{AccessSize, MemAttrs, MemResult, Memory};
use crate::mmu::{self, AccessType, FaultRecord, MmuIdx, MmuIdxSet, Translation};

mod builder;
pub mod cpreg;
pub mod exception;
pub mod features;
pub mod mode_desc;
pub mod status;
pub mod trap;

pub use builder::{BuildError, CpuBuilder};
pub use cpreg::{CpAccessError, CpRegInfo, CpRegKey, CpRegistry, ImportFailure};
pub use exception::ReturnError;
pub use features::Features;
pub use mode_desc::{ModeDescriptor, ModeFields};
pub use status::{CpuMode, CpuState};
pub use trap::{ExceptionEvent, ExceptionKind, ReturnOutcome, TakeOutcome};

/// 单个虚拟 ARM CPU
pub struct ArmCpu {
    config: CpuConfig,
    /// 架构状态（寄存器组、系统寄存器存储、异常表）
    state: CpuState,
    /// 系统寄存器描述表
    registry: CpRegistry,
}

impl ArmCpu {
    /// 按配置构建 CPU，等价于 `CpuBuilder::new(config).build()`
    ///
    /// # 示例
    ///
    /// ```
    /// use arm_core_sim::config::CpuConfig;
    /// use arm_core_sim::cpu::ArmCpu;
    ///
    /// let cpu = ArmCpu::new(CpuConfig::cortex_a53()).unwrap();
    /// assert_eq!(cpu.current_el(), 3);
    /// ```
    pub fn new(config: CpuConfig) -> Result<Self, BuildError> {
        CpuBuilder::new(config).build()
    }

    pub(crate) fn with_parts(config: CpuConfig, state: CpuState, registry: CpRegistry) -> Self {
        Self { config, state, registry }
    }

    pub fn config(&self) -> &CpuConfig {
        &self.config
    }

    pub fn state(&self) -> &CpuState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut CpuState {
        &mut self.state
    }

    pub fn registry(&self) -> &CpRegistry {
        &self.registry
    }

    pub fn features(&self) -> Features {
        self.state.features
    }

    pub fn pc(&self) -> u64 {
        self.state.pc()
    }

    pub fn set_pc(&mut self, pc: u64) {
        self.state.set_pc(pc);
    }

    pub fn current_el(&self) -> u32 {
        features::current_el(&self.state)
    }

    /// 当前执行状态对应的转换上下文
    pub fn mmu_idx(&self) -> MmuIdx {
        mmu::current_mmu_idx(&self.state)
    }

    /// 架构复位：核心寄存器与全部系统寄存器回到复位值
    pub fn reset(&mut self) {
        self.state.reset(self.config.m_vecbase);
        self.registry.reset_all(&mut self.state);
        log::info!("{}: reset", self.config.name);
    }

    /// M-profile 复位后从向量表取初始 SP 与 PC
    pub fn load_reset_vector(&mut self, mem: &dyn Memory) -> MemResult<()> {
        if !self.state.features.contains(Features::M) {
            return Ok(());
        }
        let secure = self.state.v7m.secure;
        let base = self.state.v7m.vecbase[secure as usize] as u64;
        let attrs = MemAttrs { secure };
        let sp = mem.load32(base, attrs)?;
        let pc = mem.load32(base + 4, attrs)?;
        self.state.regs[13] = sp & !3;
        self.state.regs[15] = pc & !1;
        self.state.thumb = pc & 1 != 0;
        log::debug!("reset vector: sp={:#x} pc={:#x}", sp, pc);
        Ok(())
    }

    // ========== 地址转换 ==========

    /// 在当前转换上下文中解析 `vaddr`
    pub fn resolve(&self, mem: &dyn Memory, vaddr: u64, access: AccessType) -> Result<Translation, FaultRecord> {
        mmu::translate(&self.state, mem, vaddr, access, self.mmu_idx())
    }

    /// 带对齐检查的解析，供实际的加载/存储使用
    pub fn resolve_sized(
        &self,
        mem: &dyn Memory,
        vaddr: u64,
        size: AccessSize,
        access: AccessType,
    ) -> Result<Translation, FaultRecord> {
        let idx = self.mmu_idx();
        mmu::check_alignment(&self.state, vaddr, size, access, idx)?;
        mmu::translate(&self.state, mem, vaddr, access, idx)
    }

    /// 取走待执行的本地 TLB 刷新集合
    ///
    /// 只覆盖本 CPU；需要广播的失效操作由调用方转发给其它 CPU。
    pub fn take_pending_tlb_flush(&mut self) -> MmuIdxSet {
        self.state.take_pending_tlb_flush()
    }

    /// 失效本 CPU 的全部转换缓存
    pub fn flush_tlb(&mut self) {
        self.state.flush_tlb_local(MmuIdxSet::all());
    }

    // ========== 异常 ==========

    pub fn take_exception(&mut self, mem: &mut dyn Memory, event: &ExceptionEvent) -> TakeOutcome {
        exception::take_exception(&mut self.state, mem, event)
    }

    /// 把转换失败交给异常状态机
    pub fn take_fault(&mut self, mem: &mut dyn Memory, fault: FaultRecord) -> TakeOutcome {
        self.take_exception(mem, &ExceptionEvent::from_fault(fault))
    }

    pub fn return_from_exception(&mut self, mem: &mut dyn Memory) -> Result<ReturnOutcome, ReturnError> {
        exception::return_from_exception(&mut self.state, mem)
    }

    pub fn deliver_pending(&mut self, mem: &mut dyn Memory) -> Option<TakeOutcome> {
        exception::deliver_pending(&mut self.state, mem)
    }

    // ========== 系统寄存器 ==========

    /// 按当前安全状态查找寄存器
    pub fn reg_lookup(&self, key: &CpRegKey) -> Option<&CpRegInfo> {
        self.registry.lookup_current(&self.state, key)
    }

    pub fn reg_read(&self, key: &CpRegKey) -> Result<u64, CpAccessError> {
        self.registry.read(&self.state, key)
    }

    pub fn reg_write(&mut self, key: &CpRegKey, value: u64) -> Result<(), CpAccessError> {
        self.registry.write(&mut self.state, key, value)
    }

    /// 把单个寄存器恢复为复位值
    pub fn reg_reset(&mut self, key: &CpRegKey) -> Result<(), CpAccessError> {
        let ri = *self
            .registry
            .lookup_current(&self.state, key)
            .ok_or(CpAccessError::Unknown(*key))?;
        self.registry.reset_one(&mut self.state, &ri);
        Ok(())
    }

    /// 访问失败时应投递的异常
    pub fn reg_access_event(&self, key: &CpRegKey, err: &CpAccessError, isread: bool, rt: u32) -> ExceptionEvent {
        exception::register_access_event(key, err, isread, rt)
    }

    // ========== 模式描述符与快照 ==========

    pub fn pack_mode_descriptor(&self) -> ModeDescriptor {
        mode_desc::pack_mode_descriptor(&self.state)
    }

    pub fn export_state(&self) -> Vec<(CpRegKey, u64)> {
        self.registry.export_state(&self.state)
    }

    /// 恢复快照；每一项都会尝试，失败项全部返回
    pub fn import_state(&mut self, entries: &[(CpRegKey, u64)]) -> Result<(), Vec<ImportFailure>> {
        self.registry.import_state(&mut self.state, entries)
    }

    /// 通过日志输出寄存器状态
    pub fn dump_regs(&self) {
        let s = &self.state;
        log::info!("=== {} register dump ===", self.config.name);
        if s.aarch64 {
            log::info!(
                "PC: {:#018x}  EL{}  PSTATE: {:#010x}",
                s.pc,
                self.current_el(),
                s.pstate_read()
            );
            for (i, regs) in s.xregs.chunks(4).enumerate() {
                let line: Vec<String> = regs
                    .iter()
                    .enumerate()
                    .map(|(j, v)| format!("x{:02}: {:#018x}", i * 4 + j, v))
                    .collect();
                log::info!("  {}", line.join("  "));
            }
            return;
        }
        if s.features.contains(Features::M) {
            log::info!(
                "PC: {:#010x}  xPSR: {:#010x}  {}  {}",
                s.regs[15],
                s.xpsr_read(),
                if s.v7m.secure { "Secure" } else { "Non-secure" },
                if features::is_handler_mode(s) { "Handler" } else { "Thread" }
            );
        } else {
            log::info!(
                "PC: {:#010x}  CPSR: {:#010x}  mode: {:?}",
                s.regs[15],
                s.cpsr_read(),
                s.cpu_mode()
            );
        }
        for (i, regs) in s.regs.chunks(4).enumerate() {
            let line: Vec<String> = regs
                .iter()
                .enumerate()
                .map(|(j, v)| format!("r{:02}: {:#010x}", i * 4 + j, v))
                .collect();
            log::info!("  {}", line.join("  "));
        }
    }
}
