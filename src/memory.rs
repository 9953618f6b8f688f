//! 物理内存抽象层
//!
//! 本模块定义页表遍历、异常栈帧压栈所使用的物理内存接口 `Memory`，
//! 以及用于功能验证的简单线性内存实现 `FlatMemory`。
//!
//! 后备存储本身不属于处理器核心：核心只通过该 trait 读取描述符、
//! 读写 M-profile 栈帧，总线错误以 `MemError` 返回，再由调用者
//! 折叠成 external abort 类故障。

use thiserror::Error;

/// 访存粒度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessSize {
    Byte,
    Half,
    Word,
    Double,
}

impl AccessSize {
    pub fn bytes(self) -> u64 {
        match self {
            AccessSize::Byte => 1,
            AccessSize::Half => 2,
            AccessSize::Word => 4,
            AccessSize::Double => 8,
        }
    }

    /// 地址是否按本粒度自然对齐
    pub fn is_aligned(self, addr: u64) -> bool {
        addr & (self.bytes() - 1) == 0
    }
}

/// 物理访问属性：总线上携带的安全状态标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemAttrs {
    /// true 表示 Secure 物理地址空间
    pub secure: bool,
}

impl MemAttrs {
    pub const SECURE: MemAttrs = MemAttrs { secure: true };
    pub const NONSECURE: MemAttrs = MemAttrs { secure: false };
}

/// 内存访问错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemError {
    /// 地址未按访问粒度对齐
    #[error("unaligned {access:?} access at {addr:#010x}")]
    Unaligned { addr: u64, access: AccessSize },
    /// 地址越界（未映射到当前内存区域）
    #[error("out-of-range {access:?} access at {addr:#010x} (region={base:#010x}+{size:#x})")]
    OutOfRange {
        addr: u64,
        access: AccessSize,
        base: u64,
        size: usize,
    },
    /// Non-secure 访问落在仅 Secure 可见的窗口内
    #[error("non-secure {access:?} access to secure-only address {addr:#010x}")]
    SecureOnly { addr: u64, access: AccessSize },
}

pub type MemResult<T> = Result<T, MemError>;

/// 物理内存的统一接口
///
/// 所有多字节访问均为小端序；大端页表遍历由调用者自行换序。
pub trait Memory {
    /// 读取 32 位数据
    fn load32(&self, addr: u64, attrs: MemAttrs) -> MemResult<u32>;

    /// 读取 64 位数据（长描述符格式页表项）
    fn load64(&self, addr: u64, attrs: MemAttrs) -> MemResult<u64>;

    /// 写入 32 位数据（M-profile 异常栈帧）
    fn store32(&mut self, addr: u64, value: u32, attrs: MemAttrs) -> MemResult<()>;
}

/// 简单线性内存实现
///
/// 使用 `Vec<u8>` 存储一段物理地址空间，支持基地址偏移。
/// 可选的 secure 窗口用于模拟仅 Secure 可访问的存储区：
/// 带 Non-secure 属性的访问落入窗口会返回 `MemError::SecureOnly`。
pub struct FlatMemory {
    /// 内存数据存储
    data: Vec<u8>,
    /// 内存映射起始地址
    base_addr: u64,
    /// 仅 Secure 可访问的地址窗口 [start, end)
    secure_window: Option<(u64, u64)>,
}

impl FlatMemory {
    /// 创建一个指定大小的内存区域
    ///
    /// ```
    /// use arm_core_sim::memory::FlatMemory;
    ///
    /// // 创建 64KB 的内存，起始地址为 0
    /// let mem = FlatMemory::new(64 * 1024, 0);
    /// assert_eq!(mem.size(), 64 * 1024);
    /// ```
    pub fn new(size: usize, base_addr: u64) -> Self {
        FlatMemory {
            data: vec![0; size],
            base_addr,
            secure_window: None,
        }
    }

    /// 将 [start, start + len) 标记为仅 Secure 可访问
    pub fn with_secure_window(mut self, start: u64, len: u64) -> Self {
        self.secure_window = Some((start, start.saturating_add(len)));
        self
    }

    pub fn base_addr(&self) -> u64 {
        self.base_addr
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn ensure_aligned(addr: u64, access: AccessSize) -> MemResult<()> {
        if access.is_aligned(addr) {
            Ok(())
        } else {
            Err(MemError::Unaligned { addr, access })
        }
    }

    fn ensure_visible(&self, addr: u64, access: AccessSize, attrs: MemAttrs) -> MemResult<()> {
        match self.secure_window {
            Some((start, end)) if !attrs.secure && addr >= start && addr < end => {
                Err(MemError::SecureOnly { addr, access })
            }
            _ => Ok(()),
        }
    }

    fn bounds_check(&self, addr: u64, len: usize, access: AccessSize) -> MemResult<usize> {
        let out_of_range = MemError::OutOfRange {
            addr,
            access,
            base: self.base_addr,
            size: self.data.len(),
        };
        let relative = addr.checked_sub(self.base_addr).ok_or(out_of_range)?;
        let relative = usize::try_from(relative).map_err(|_| out_of_range)?;
        let end = relative.checked_add(len).ok_or(out_of_range)?;
        if end > self.data.len() {
            return Err(out_of_range);
        }
        Ok(relative)
    }

    /// 批量写入数据到内存（不做安全属性检查，用于搭建测试场景）
    pub fn write_bytes(&mut self, addr: u64, data: &[u8]) -> MemResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let start = self.bounds_check(addr, data.len(), AccessSize::Byte)?;
        let end = start + data.len();
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    /// 批量读取数据
    pub fn read_bytes(&self, addr: u64, len: usize) -> MemResult<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let start = self.bounds_check(addr, len, AccessSize::Byte)?;
        Ok(self.data[start..start + len].to_vec())
    }

    /// 写入一个 32 位页表项（小端序）
    pub fn write_u32(&mut self, addr: u64, value: u32) -> MemResult<()> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    /// 写入一个 64 位页表项（小端序）
    pub fn write_u64(&mut self, addr: u64, value: u64) -> MemResult<()> {
        self.write_bytes(addr, &value.to_le_bytes())
    }
}

impl Memory for FlatMemory {
    fn load32(&self, addr: u64, attrs: MemAttrs) -> MemResult<u32> {
        Self::ensure_aligned(addr, AccessSize::Word)?;
        self.ensure_visible(addr, AccessSize::Word, attrs)?;
        let idx = self.bounds_check(addr, 4, AccessSize::Word)?;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.data[idx..idx + 4]);
        Ok(u32::from_le_bytes(bytes))
    }

    fn load64(&self, addr: u64, attrs: MemAttrs) -> MemResult<u64> {
        Self::ensure_aligned(addr, AccessSize::Double)?;
        self.ensure_visible(addr, AccessSize::Double, attrs)?;
        let idx = self.bounds_check(addr, 8, AccessSize::Double)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.data[idx..idx + 8]);
        Ok(u64::from_le_bytes(bytes))
    }

    fn store32(&mut self, addr: u64, value: u32, attrs: MemAttrs) -> MemResult<()> {
        Self::ensure_aligned(addr, AccessSize::Word)?;
        self.ensure_visible(addr, AccessSize::Word, attrs)?;
        let idx = self.bounds_check(addr, 4, AccessSize::Word)?;
        self.data[idx..idx + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }
}
