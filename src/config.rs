//! CPU 模型配置
//!
//! 本模块负责：
//! - 描述一个 CPU 模型的静态参数（特性集合、ID 寄存器、区域数量等）
//! - 提供常见架构族的预设配置
//! - 从字符串解析特性列表
//!
//! 配置在构建 CPU 时一次性消费；特性的蕴含关系在此处求闭包，
//! 之后不再被客户代码修改。
//!
//! # 示例
//!
//! ```
//! use arm_core_sim::config::CpuConfig;
//!
//! let config = CpuConfig::preset("cortex-a15")
//!     .unwrap()
//!     .with_pa_bits(40);
//! assert_eq!(config.midr, 0x412f_c0f1);
//! ```

use thiserror::Error;

use crate::cpu::features::Features;
use crate::mmu::sau::IdauRegion;

/// 配置错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// 特性列表中出现未知名称
    #[error("unknown feature `{0}`")]
    UnknownFeature(String),
    /// 未知的预设模型
    #[error("unknown CPU model `{0}`")]
    UnknownModel(String),
    /// 特性组合冲突
    #[error("conflicting features: {0}")]
    Conflict(&'static str),
    /// 不支持的物理地址宽度
    #[error("unsupported physical address width {0}")]
    PaBits(u32),
    /// 区域数量超出范围
    #[error("{what} count {count} exceeds {max}")]
    TooManyRegions {
        what: &'static str,
        count: usize,
        max: usize,
    },
}

/// 支持的物理地址宽度（TCR.IPS 编码）
const PA_WIDTHS: [u32; 6] = [32, 36, 40, 42, 44, 48];

/// 从逗号或加号分隔的字符串解析特性列表
///
/// 格式示例: "v7,lpae,el2", "m+v8"
pub fn parse_features(s: &str) -> Result<Features, ConfigError> {
    let mut features = Features::empty();
    for token in s.split([',', '+']).map(str::trim).filter(|t| !t.is_empty()) {
        let f = Features::parse_token(token)
            .ok_or_else(|| ConfigError::UnknownFeature(token.to_string()))?;
        features |= f;
    }
    Ok(features)
}

/// CPU 模型配置
#[derive(Debug, Clone)]
pub struct CpuConfig {
    /// 模型名称（用于日志）
    pub name: String,
    /// 特性集合（构建时求闭包）
    pub features: Features,
    pub midr: u32,
    pub mpidr: u64,
    /// 物理地址宽度
    pub pa_bits: u32,
    /// PMSA 区域数量
    pub pmsa_regions: usize,
    /// SAU 区域数量
    pub sau_regions: usize,
    /// 固定的 IDAU 属性映射
    pub idau: Vec<IdauRegion>,
    /// 硬件断点数量
    pub num_brps: usize,
    /// M-profile 外部中断数量
    pub num_irq: usize,
    /// M-profile 复位时的向量表基址
    pub m_vecbase: u32,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            name: "generic".to_string(),
            features: Features::V7,
            midr: 0,
            mpidr: 0x8000_0000,
            pa_bits: 40,
            pmsa_regions: 0,
            sau_regions: 0,
            idau: Vec::new(),
            num_brps: 2,
            num_irq: 32,
            m_vecbase: 0,
        }
    }
}

impl CpuConfig {
    /// 创建新配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 按名称选择预设模型
    pub fn preset(name: &str) -> Result<Self, ConfigError> {
        let config = match name.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "arm926" => Self::arm926(),
            "cortex-a8" => Self::cortex_a8(),
            "cortex-a15" => Self::cortex_a15(),
            "cortex-a53" => Self::cortex_a53(),
            "cortex-r5" => Self::cortex_r5(),
            "cortex-m3" => Self::cortex_m3(),
            "cortex-m33" => Self::cortex_m33(),
            _ => return Err(ConfigError::UnknownModel(name.to_string())),
        };
        Ok(config)
    }

    /// ARMv5TE，短描述符 MMU
    pub fn arm926() -> Self {
        Self {
            name: "arm926".to_string(),
            features: Features::V5 | Features::VFP,
            midr: 0x4106_9265,
            pa_bits: 32,
            ..Default::default()
        }
    }

    /// ARMv7-A，带 Security Extensions
    pub fn cortex_a8() -> Self {
        Self {
            name: "cortex-a8".to_string(),
            features: Features::V7 | Features::NEON | Features::EL3,
            midr: 0x410f_c080,
            pa_bits: 32,
            ..Default::default()
        }
    }

    /// ARMv7VE，带 LPAE 与虚拟化
    pub fn cortex_a15() -> Self {
        Self {
            name: "cortex-a15".to_string(),
            features: Features::V7VE | Features::NEON | Features::EL2 | Features::EL3,
            midr: 0x412f_c0f1,
            ..Default::default()
        }
    }

    /// ARMv8-A，EL0-EL3 全部支持 AArch64
    pub fn cortex_a53() -> Self {
        Self {
            name: "cortex-a53".to_string(),
            features: Features::AARCH64 | Features::NEON | Features::EL2 | Features::EL3,
            midr: 0x410f_d034,
            pa_bits: 40,
            num_brps: 6,
            ..Default::default()
        }
    }

    /// ARMv7-R，PMSAv7
    pub fn cortex_r5() -> Self {
        Self {
            name: "cortex-r5".to_string(),
            features: Features::V7 | Features::PMSA | Features::VFP,
            midr: 0x4115_1c23,
            pa_bits: 32,
            pmsa_regions: 16,
            ..Default::default()
        }
    }

    /// ARMv7-M
    pub fn cortex_m3() -> Self {
        Self {
            name: "cortex-m3".to_string(),
            features: Features::M | Features::V7,
            midr: 0x410f_c231,
            pa_bits: 32,
            pmsa_regions: 8,
            ..Default::default()
        }
    }

    /// ARMv8-M Mainline，带 Security Extension
    pub fn cortex_m33() -> Self {
        Self {
            name: "cortex-m33".to_string(),
            features: Features::M_SECURITY | Features::VFP,
            midr: 0x410f_d213,
            pa_bits: 32,
            pmsa_regions: 16,
            sau_regions: 8,
            ..Default::default()
        }
    }

    /// 设置模型名称
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 设置特性集合
    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    /// 追加特性（字符串形式）
    pub fn with_feature_list(mut self, list: &str) -> Result<Self, ConfigError> {
        self.features |= parse_features(list)?;
        Ok(self)
    }

    pub fn with_midr(mut self, midr: u32) -> Self {
        self.midr = midr;
        self
    }

    pub fn with_mpidr(mut self, mpidr: u64) -> Self {
        self.mpidr = mpidr;
        self
    }

    /// 设置物理地址宽度
    pub fn with_pa_bits(mut self, bits: u32) -> Self {
        self.pa_bits = bits;
        self
    }

    /// 设置 PMSA 区域数量
    pub fn with_pmsa_regions(mut self, n: usize) -> Self {
        self.pmsa_regions = n;
        self
    }

    /// 设置 SAU 区域数量
    pub fn with_sau_regions(mut self, n: usize) -> Self {
        self.sau_regions = n;
        self
    }

    /// 添加 IDAU 区域
    pub fn with_idau_region(mut self, region: IdauRegion) -> Self {
        self.idau.push(region);
        self
    }

    pub fn with_num_irq(mut self, n: usize) -> Self {
        self.num_irq = n;
        self
    }

    /// 设置 M-profile 复位向量表基址
    pub fn with_m_vecbase(mut self, base: u32) -> Self {
        self.m_vecbase = base;
        self
    }

    /// 求闭包后的特性集合
    pub fn resolved_features(&self) -> Features {
        self.features.closure()
    }

    /// 检查配置的一致性
    pub fn validate(&self) -> Result<(), ConfigError> {
        let f = self.resolved_features();
        if f.contains(Features::M) && f.intersects(Features::AARCH64 | Features::EL2 | Features::EL3) {
            return Err(ConfigError::Conflict("M-profile has no EL2/EL3 or AArch64"));
        }
        if f.contains(Features::PMSA) && f.contains(Features::AARCH64) {
            return Err(ConfigError::Conflict("AArch64 requires a VMSA"));
        }
        if !PA_WIDTHS.contains(&self.pa_bits) {
            return Err(ConfigError::PaBits(self.pa_bits));
        }
        let limits = [
            ("PMSA region", self.pmsa_regions, 255),
            ("SAU region", self.sau_regions, 255),
            ("breakpoint", self.num_brps, 16),
            ("interrupt", self.num_irq, 480),
        ];
        for (what, count, max) in limits {
            if count > max {
                return Err(ConfigError::TooManyRegions { what, count, max });
            }
        }
        if !f.contains(Features::M_SECURITY) && (self.sau_regions != 0 || !self.idau.is_empty()) {
            return Err(ConfigError::Conflict("SAU/IDAU without the M security extension"));
        }
        Ok(())
    }
}
