//! 转换故障记录及其架构状态编码

use thiserror::Error;

use super::AccessType;

/// 从转换引擎传递到异常入口的故障分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Alignment,
    /// PMSA：没有命中任何区域，且背景映射不可用
    Background,
    Translation,
    AccessFlag,
    Domain,
    Permission,
    AddressSize,
    SyncExternal,
    SyncExternalOnWalk,
    SyncParity,
    SyncParityOnWalk,
    AsyncParity,
    AsyncExternal,
    Debug,
    /// 多个 SAU 区域对同一地址的判定不一致
    SecurityAmbiguous,
    /// 非安全取指访问了安全的 NSC 内存
    NsCallableFetch,
    /// 安全属性违规，以 SecureFault 报告
    SecurityViolation,
}

/// 转换失败的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind:?} fault on {access:?} at {vaddr:#x} (level {level})")]
pub struct FaultRecord {
    pub kind: FaultKind,
    /// 查表级别；表遍历之外的故障为 0。
    pub level: i32,
    /// 短描述符域。
    pub domain: u32,
    /// 在第二阶段产生，包括第一阶段页表读取时的第二阶段故障。
    pub stage2: bool,
    /// 在转换第一阶段页表地址时产生。
    pub s1ptw: bool,
    /// 第二阶段故障的中间物理地址。
    pub s2addr: u64,
    /// 外部中止（区别于转换检测到的故障）。
    pub ea: bool,
    pub access: AccessType,
    pub vaddr: u64,
}

impl FaultRecord {
    pub fn new(kind: FaultKind, access: AccessType, vaddr: u64) -> Self {
        Self {
            kind,
            level: 0,
            domain: 0,
            stage2: false,
            s1ptw: false,
            s2addr: 0,
            ea: matches!(
                kind,
                FaultKind::SyncExternal | FaultKind::SyncExternalOnWalk | FaultKind::AsyncExternal
            ),
            access,
            vaddr,
        }
    }

    pub fn at_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn with_domain(mut self, domain: u32) -> Self {
        self.domain = domain;
        self
    }

    /// 标记为地址 `ipa` 上的第二阶段故障。
    pub fn in_stage2(mut self, ipa: u64) -> Self {
        self.stage2 = true;
        self.s2addr = ipa;
        self
    }

    pub fn on_s1_walk(mut self) -> Self {
        self.s1ptw = true;
        self
    }

    /// 长描述符故障状态码（同时也是 AArch64 的 DFSC/IFSC）。
    pub fn long_fsc(&self) -> u32 {
        let lvl = (self.level.clamp(0, 3)) as u32;
        match self.kind {
            FaultKind::AddressSize => lvl,
            FaultKind::Translation => 0x4 | lvl,
            FaultKind::AccessFlag => 0x8 | lvl,
            FaultKind::Permission => 0xc | lvl,
            FaultKind::SyncExternal => 0x10,
            FaultKind::SyncExternalOnWalk => 0x14 | lvl,
            FaultKind::SyncParity => 0x18,
            FaultKind::SyncParityOnWalk => 0x1c | lvl,
            FaultKind::AsyncParity => 0x19,
            FaultKind::AsyncExternal => 0x11,
            FaultKind::Alignment => 0x21,
            FaultKind::Debug => 0x22,
            // MMU 机制下不会出现；按 0 级转换故障报告。
            FaultKind::Background
            | FaultKind::Domain
            | FaultKind::SecurityAmbiguous
            | FaultKind::NsCallableFetch
            | FaultKind::SecurityViolation => 0x4,
        }
    }

    /// 短描述符 FSR 值（FS[4] 在第 10 位，FS[3:0] 在 3:0 位）。
    pub fn short_fsr(&self) -> u32 {
        let fs = match self.kind {
            FaultKind::Alignment => 0x1,
            FaultKind::Debug => 0x2,
            FaultKind::AccessFlag => {
                if self.level == 1 {
                    0x3
                } else {
                    0x6
                }
            }
            FaultKind::Translation => {
                if self.level == 1 {
                    0x5
                } else {
                    0x7
                }
            }
            FaultKind::Domain => {
                if self.level == 1 {
                    0x9
                } else {
                    0xb
                }
            }
            FaultKind::Permission => {
                if self.level == 1 {
                    0xd
                } else {
                    0xf
                }
            }
            FaultKind::SyncExternal => 0x8,
            FaultKind::SyncExternalOnWalk => {
                if self.level == 1 {
                    0xc
                } else {
                    0xe
                }
            }
            FaultKind::SyncParity => 0x409,
            FaultKind::SyncParityOnWalk => {
                if self.level == 1 {
                    0x40c
                } else {
                    0x40e
                }
            }
            FaultKind::AsyncParity => 0x408,
            FaultKind::AsyncExternal => 0x406,
            FaultKind::Background => 0x0,
            FaultKind::AddressSize
            | FaultKind::SecurityAmbiguous
            | FaultKind::NsCallableFetch
            | FaultKind::SecurityViolation => {
                log::warn!("{:?} has no short-descriptor encoding", self.kind);
                0x0
            }
        };
        fs | (self.domain & 0xf) << 4
    }

    /// 按 `long_format` 选择格式的 AArch32 DFSR/IFSR 值。
    pub fn fsr(&self, long_format: bool) -> u32 {
        let mut fsr = if long_format {
            self.long_fsc() | 1 << 9
        } else {
            self.short_fsr()
        };
        if self.ea {
            fsr |= 1 << 12;
        }
        if self.access == AccessType::Write && !long_format {
            fsr |= 1 << 11;
        }
        fsr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_fsc_levels() {
        let f = FaultRecord::new(FaultKind::Translation, AccessType::Read, 0).at_level(3);
        assert_eq!(f.long_fsc(), 0x7);
        let f = FaultRecord::new(FaultKind::Permission, AccessType::Read, 0).at_level(2);
        assert_eq!(f.long_fsc(), 0xe);
        let f = FaultRecord::new(FaultKind::AccessFlag, AccessType::Read, 0).at_level(1);
        assert_eq!(f.long_fsc(), 0x9);
        let f = FaultRecord::new(FaultKind::SyncExternalOnWalk, AccessType::Read, 0).at_level(1);
        assert_eq!(f.long_fsc(), 0x15);
        assert!(f.ea);
    }

    #[test]
    fn test_short_fsr_encodings() {
        let f = FaultRecord::new(FaultKind::Translation, AccessType::Read, 0).at_level(1);
        assert_eq!(f.short_fsr(), 0x5);
        let f = FaultRecord::new(FaultKind::Domain, AccessType::Write, 0)
            .at_level(2)
            .with_domain(3);
        assert_eq!(f.fsr(false), 0xb | 3 << 4 | 1 << 11);
        let f = FaultRecord::new(FaultKind::Background, AccessType::Read, 0);
        assert_eq!(f.short_fsr(), 0);
    }

    #[test]
    fn test_lpae_fsr_sets_format_bit() {
        let f = FaultRecord::new(FaultKind::Alignment, AccessType::Write, 0);
        assert_eq!(f.fsr(true), 0x21 | 1 << 9);
    }
}
