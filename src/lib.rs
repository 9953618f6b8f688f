//! arm_core_sim: ARM 处理器状态与地址转换核心
//!
//! 本库实现单个虚拟 ARM CPU 的架构状态、系统寄存器表、地址转换引擎
//! 与异常状态机，覆盖 A/R-profile (AArch32/AArch64) 与 M-profile。
//! 指令解码与执行、设备模型和 TLB 缓存属于嵌入系统。
//!
//! # 模块结构
//!
//! - `cpu`: CPU 外观、寄存器组、系统寄存器表、异常状态机、模式描述符
//! - `mmu`: 地址转换（短/长描述符、PMSA、SAU）
//! - `memory`: 物理内存抽象层
//! - `config`: CPU 模型配置与预设

pub mod config;
pub mod cpu;
pub mod memory;
pub mod mmu;
