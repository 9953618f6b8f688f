//! CPU 构建器
//!
//! 根据 `CpuConfig` 统一配置：
//! - 特性集合（求闭包）
//! - 架构状态：区域表、异常表、IDAU 映射
//! - 系统寄存器表：按特性注册、复位并检查复位幂等性
//!
//! 模型定义错误在这里被拒绝，出错的 CPU 模型不会被实例化。
//!
//! # 示例
//!
//! ```
//! use arm_core_sim::config::CpuConfig;
//! use arm_core_sim::cpu::CpuBuilder;
//!
//! let cpu = CpuBuilder::new(CpuConfig::cortex_a15())
//!     .build()
//!     .expect("配置无冲突");
//! assert!(cpu.registry().by_name("SCTLR").is_some());
//! ```

use thiserror::Error;

use super::ArmCpu;
use super::cpreg::{CpRegistry, DefineError, defs};
use super::status::CpuState;
use crate::config::{ConfigError, CpuConfig};

/// CPU 构建失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("register definition: {0}")]
    Define(#[from] DefineError),
}

/// CPU 构建器
pub struct CpuBuilder {
    config: CpuConfig,
    check_reset: bool,
}

impl CpuBuilder {
    pub fn new(config: CpuConfig) -> Self {
        Self {
            config,
            check_reset: true,
        }
    }

    /// 按预设模型名创建
    pub fn preset(name: &str) -> Result<Self, BuildError> {
        Ok(Self::new(CpuConfig::preset(name)?))
    }

    /// 跳过复位幂等性检查（仅用于大量构建的测试场景）
    pub fn without_reset_check(mut self) -> Self {
        self.check_reset = false;
        self
    }

    pub fn config(&self) -> &CpuConfig {
        &self.config
    }

    /// 构建 CPU 核心
    ///
    /// 返回 `Err` 如果配置不一致或寄存器定义有误
    pub fn build(self) -> Result<ArmCpu, BuildError> {
        // 1. 配置检查与特性闭包
        self.config.validate()?;
        let features = self.config.resolved_features();

        // 2. 架构状态
        let mut state = CpuState::new(features).with_tables(
            self.config.pmsa_regions,
            self.config.sau_regions,
            self.config.num_irq,
        );
        state.mpidr = self.config.mpidr;
        state.sau.idau = self.config.idau.clone();

        // 3. 系统寄存器
        let mut registry = CpRegistry::new(features);
        defs::register_all(&mut registry, &self.config)?;

        // 4. 复位
        state.reset(self.config.m_vecbase);
        registry.reset_all(&mut state);
        if self.check_reset {
            registry.check_reset(&mut state)?;
        }

        log::info!(
            "built {} ({:?}), {} system registers",
            self.config.name,
            features,
            registry.len()
        );
        Ok(ArmCpu::with_parts(self.config, state, registry))
    }
}

impl Default for CpuBuilder {
    fn default() -> Self {
        Self::new(CpuConfig::default())
    }
}
