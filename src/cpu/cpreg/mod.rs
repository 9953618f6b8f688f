//! 协处理器 / 系统寄存器描述符
//!
//! [`CpRegDef`] 是一个模板，可以同时覆盖两种执行状态、两个安全分组以及
//! 通配的编码字段。[`CpRegistry::define`] 把它展开为以 [`CpRegKey`]
//! 为键的具体 [`CpRegInfo`] 条目。
//!
//! 存储位置由 [`Field`] 命名，而不是状态结构体内的偏移；分组寄存器
//! 为每个安全态各指定一个字段。

use std::fmt;

use bitflags::bitflags;
use thiserror::Error;

use super::status::CpuState;

pub mod defs;
mod registry;
#[cfg(test)]
mod tests;

pub use registry::{CpRegistry, ImportFailure, ImportFailureKind};

/// 定义中 crm/opc1/opc2 的通配值。
pub const ANY: u8 = 0xff;

/// AArch64 系统寄存器位于独立的协处理器空间。
pub const CP_AA64_SYSREG: u8 = 0x13;

/// 具体的寄存器坐标。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CpRegKey {
    pub aa64: bool,
    /// 仅 AArch32：该条目服务于安全分组。
    pub secure: bool,
    pub cp: u8,
    /// AArch32 MCRR/MRRC（64 位）访问。
    pub is64: bool,
    pub op0: u8,
    pub opc1: u8,
    pub crn: u8,
    pub crm: u8,
    pub opc2: u8,
}

impl CpRegKey {
    pub fn aa32(cp: u8, crn: u8, crm: u8, opc1: u8, opc2: u8, secure: bool) -> Self {
        Self { aa64: false, secure, cp, is64: false, op0: 0, opc1, crn, crm, opc2 }
    }

    pub fn aa32_64(cp: u8, crm: u8, opc1: u8, secure: bool) -> Self {
        Self { aa64: false, secure, cp, is64: true, op0: 0, opc1, crn: 0, crm, opc2: 0 }
    }

    pub fn aa64(op0: u8, op1: u8, crn: u8, crm: u8, op2: u8) -> Self {
        Self {
            aa64: true,
            secure: false,
            cp: CP_AA64_SYSREG,
            is64: false,
            op0,
            opc1: op1,
            crn,
            crm,
            opc2: op2,
        }
    }
}

impl fmt::Display for CpRegKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.aa64 {
            write!(
                f,
                "S{}_{}_C{}_C{}_{}",
                self.op0, self.opc1, self.crn, self.crm, self.opc2
            )
        } else {
            let bank = if self.secure { "s" } else { "ns" };
            if self.is64 {
                write!(f, "p{} {} c{} ({})", self.cp, self.opc1, self.crm, bank)
            } else {
                write!(
                    f,
                    "p{} {} c{} c{} {} ({})",
                    self.cp, self.opc1, self.crn, self.crm, self.opc2, bank
                )
            }
        }
    }
}

bitflags! {
    /// 寄存器行为标志。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RegType: u32 {
        /// 读返回复位值；写被忽略。
        const CONST    = 1 << 0;
        /// 存储归另一个条目所有：复位与快照时跳过。
        const ALIAS    = 1 << 1;
        /// 读结果不可复现（计数器、中断状态）。
        const IO       = 1 << 2;
        /// 无原始访问；不纳入快照。
        const NO_RAW   = 1 << 3;
        /// 可以替换同一键的其他定义，或被其替换。
        const OVERRIDE = 1 << 4;
        /// 读为零，写被忽略（缓存维护等）。
        const NOP      = 1 << 5;
        /// 值由实时状态合成；从不复位。
        const SPECIAL  = 1 << 6;
    }
}

bitflags! {
    /// 访问权限。每一位同时意味着更高级别拥有相同的访问权限，
    /// 因此 `PL1_RW` 也授予 EL2 与 EL3。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Access: u8 {
        const PL3_R = 0x80;
        const PL3_W = 0x40;
        const PL2_R = 0x20 | Self::PL3_R.bits();
        const PL2_W = 0x10 | Self::PL3_W.bits();
        const PL1_R = 0x08 | Self::PL2_R.bits();
        const PL1_W = 0x04 | Self::PL2_W.bits();
        const PL0_R = 0x02 | Self::PL1_R.bits();
        const PL0_W = 0x01 | Self::PL1_W.bits();

        const PL3_RW = Self::PL3_R.bits() | Self::PL3_W.bits();
        const PL2_RW = Self::PL2_R.bits() | Self::PL2_W.bits();
        const PL1_RW = Self::PL1_R.bits() | Self::PL1_W.bits();
        const PL0_RW = Self::PL0_R.bits() | Self::PL0_W.bits();
    }
}

impl Access {
    pub fn can_read(self, el: u32) -> bool {
        self.bits() & (0x02 << (2 * el.min(3))) != 0
    }

    pub fn can_write(self, el: u32) -> bool {
        self.bits() & (0x01 << (2 * el.min(3))) != 0
    }

    pub fn any_read(self) -> bool {
        self.bits() & 0xaa != 0
    }

    pub fn any_write(self) -> bool {
        self.bits() & 0x55 != 0
    }
}

/// 定义覆盖的执行状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegState {
    Aa32,
    Aa64,
    /// 一个模板同时用于两种编码。
    Both,
}

/// AArch32 定义覆盖的安全分组。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecState {
    Secure,
    NonSecure,
    Both,
}

/// 单分组寄存器缺失的那一组的行为。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtherBank {
    /// 无条目：访问未定义。
    Absent,
    /// 从另一组访问时，在通常的目标级别上为 UNDEFINED。
    Trap,
    /// 读为给定值，写被忽略。
    Const(u64),
}

/// 寄存器值的命名存储位置。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Sctlr(usize),
    Cpacr,
    Cptr(usize),
    Ttbr0(usize),
    Ttbr1(usize),
    Tcr(usize),
    Mair(usize),
    Vbar(usize),
    Esr(usize),
    Far(usize),
    Par(usize),
    Dacr(usize),
    Ifsr(usize),
    ContextIdr(usize),
    Tpidr(usize),
    TpidrRo,
    /// 安全态的 TPIDRURW/TPIDRURO/TPIDRPRW。
    TpidrS(usize),
    Scr,
    Nsacr,
    Mvbar,
    Hcr,
    Vttbr,
    Vtcr,
    Hpfar,
    Mdcr(usize),
    Mdscr,
    Dbgbvr(usize),
    Dbgbcr(usize),
    Rgnr,
    SpEl(usize),
    ElrEl(usize),
    /// 分组 SPSR 槽位。
    Spsr(usize),
}

/// 视图覆盖的字段部分。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Half {
    Full,
    Lo,
    Hi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub field: Field,
    pub half: Half,
}

impl Slot {
    pub const fn full(field: Field) -> Self {
        Self { field, half: Half::Full }
    }

    pub const fn lo(field: Field) -> Self {
        Self { field, half: Half::Lo }
    }

    pub const fn hi(field: Field) -> Self {
        Self { field, half: Half::Hi }
    }

    pub fn get(self, state: &CpuState) -> u64 {
        let v = *field_ref(state, self.field);
        match self.half {
            Half::Full => v,
            Half::Lo => v & 0xffff_ffff,
            Half::Hi => v >> 32,
        }
    }

    pub fn set(self, state: &mut CpuState, value: u64) {
        let f = field_mut(state, self.field);
        *f = match self.half {
            Half::Full => value,
            Half::Lo => (*f & !0xffff_ffff) | (value & 0xffff_ffff),
            Half::Hi => (*f & 0xffff_ffff) | (value << 32),
        };
    }
}

/// 定义保存其值的位置。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    None,
    Slot(Slot),
    /// 安全与非安全各一份。
    Banked { s: Slot, ns: Slot },
}

fn field_ref(state: &CpuState, field: Field) -> &u64 {
    let c = &state.cp15;
    match field {
        Field::Sctlr(el) => &c.sctlr_el[el],
        Field::Cpacr => &c.cpacr_el1,
        Field::Cptr(el) => &c.cptr_el[el],
        Field::Ttbr0(el) => &c.ttbr0_el[el],
        Field::Ttbr1(el) => &c.ttbr1_el[el],
        Field::Tcr(el) => &c.tcr_el[el],
        Field::Mair(el) => &c.mair_el[el],
        Field::Vbar(el) => &c.vbar_el[el],
        Field::Esr(el) => &c.esr_el[el],
        Field::Far(el) => &c.far_el[el],
        Field::Par(el) => &c.par_el[el],
        Field::Dacr(el) => &c.dacr[el],
        Field::Ifsr(el) => &c.ifsr[el],
        Field::ContextIdr(el) => &c.contextidr_el[el],
        Field::Tpidr(el) => &c.tpidr_el[el],
        Field::TpidrRo => &c.tpidrro_el0,
        Field::TpidrS(i) => &c.tpidr_s[i],
        Field::Scr => &c.scr_el3,
        Field::Nsacr => &c.nsacr,
        Field::Mvbar => &c.mvbar,
        Field::Hcr => &c.hcr_el2,
        Field::Vttbr => &c.vttbr_el2,
        Field::Vtcr => &c.vtcr_el2,
        Field::Hpfar => &c.hpfar_el2,
        Field::Mdcr(3) => &c.mdcr_el3,
        Field::Mdcr(_) => &c.mdcr_el2,
        Field::Mdscr => &c.mdscr_el1,
        Field::Dbgbvr(i) => &c.dbgbvr[i],
        Field::Dbgbcr(i) => &c.dbgbcr[i],
        Field::Rgnr => &c.rgnr,
        Field::SpEl(el) => &state.sp_el[el],
        Field::ElrEl(el) => &state.elr_el[el],
        Field::Spsr(bank) => &state.banked_spsr[bank],
    }
}

fn field_mut(state: &mut CpuState, field: Field) -> &mut u64 {
    let c = &mut state.cp15;
    match field {
        Field::Sctlr(el) => &mut c.sctlr_el[el],
        Field::Cpacr => &mut c.cpacr_el1,
        Field::Cptr(el) => &mut c.cptr_el[el],
        Field::Ttbr0(el) => &mut c.ttbr0_el[el],
        Field::Ttbr1(el) => &mut c.ttbr1_el[el],
        Field::Tcr(el) => &mut c.tcr_el[el],
        Field::Mair(el) => &mut c.mair_el[el],
        Field::Vbar(el) => &mut c.vbar_el[el],
        Field::Esr(el) => &mut c.esr_el[el],
        Field::Far(el) => &mut c.far_el[el],
        Field::Par(el) => &mut c.par_el[el],
        Field::Dacr(el) => &mut c.dacr[el],
        Field::Ifsr(el) => &mut c.ifsr[el],
        Field::ContextIdr(el) => &mut c.contextidr_el[el],
        Field::Tpidr(el) => &mut c.tpidr_el[el],
        Field::TpidrRo => &mut c.tpidrro_el0,
        Field::TpidrS(i) => &mut c.tpidr_s[i],
        Field::Scr => &mut c.scr_el3,
        Field::Nsacr => &mut c.nsacr,
        Field::Mvbar => &mut c.mvbar,
        Field::Hcr => &mut c.hcr_el2,
        Field::Vttbr => &mut c.vttbr_el2,
        Field::Vtcr => &mut c.vtcr_el2,
        Field::Hpfar => &mut c.hpfar_el2,
        Field::Mdcr(3) => &mut c.mdcr_el3,
        Field::Mdcr(_) => &mut c.mdcr_el2,
        Field::Mdscr => &mut c.mdscr_el1,
        Field::Dbgbvr(i) => &mut c.dbgbvr[i],
        Field::Dbgbcr(i) => &mut c.dbgbcr[i],
        Field::Rgnr => &mut c.rgnr,
        Field::SpEl(el) => &mut state.sp_el[el],
        Field::ElrEl(el) => &mut state.elr_el[el],
        Field::Spsr(bank) => &mut state.banked_spsr[bank],
    }
}

/// 寄存器自身访问检查的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpAccess {
    Ok,
    /// 以寄存器访问综合征陷入通常的目标级别。
    Trap,
    /// 在通常的目标级别上为 UNDEFINED。
    TrapUncategorized,
    /// 以寄存器访问综合征陷入指定级别。
    TrapEl(u32),
    TrapUncategorizedEl(u32),
}

pub type AccessFn = fn(&CpuState, &CpRegInfo, bool) -> CpAccess;
pub type ReadFn = fn(&CpuState, &CpRegInfo) -> u64;
pub type WriteFn = fn(&mut CpuState, &CpRegInfo, u64);
pub type ResetFn = fn(&mut CpuState, &CpRegInfo);

/// 寄存器模板。
#[derive(Clone, Copy)]
pub struct CpRegDef {
    pub name: &'static str,
    pub state: RegState,
    pub secure: SecState,
    pub cp: u8,
    pub op0: u8,
    pub opc1: u8,
    pub crn: u8,
    pub crm: u8,
    pub opc2: u8,
    /// AArch32 MCRR/MRRC 编码。
    pub is64: bool,
    pub ty: RegType,
    pub access: Access,
    pub reset: u64,
    pub storage: Storage,
    pub other_bank: OtherBank,
    pub access_fn: Option<AccessFn>,
    pub read_fn: Option<ReadFn>,
    pub write_fn: Option<WriteFn>,
    pub raw_write_fn: Option<WriteFn>,
    pub reset_fn: Option<ResetFn>,
}

impl CpRegDef {
    pub const DEFAULT: CpRegDef = CpRegDef {
        name: "",
        state: RegState::Aa32,
        secure: SecState::Both,
        cp: 15,
        op0: 0,
        opc1: 0,
        crn: 0,
        crm: 0,
        opc2: 0,
        is64: false,
        ty: RegType::empty(),
        access: Access::empty(),
        reset: 0,
        storage: Storage::None,
        other_bank: OtherBank::Absent,
        access_fn: None,
        read_fn: None,
        write_fn: None,
        raw_write_fn: None,
        reset_fn: None,
    };
}

impl fmt::Debug for CpRegDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpRegDef")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("ty", &self.ty)
            .finish_non_exhaustive()
    }
}

/// 一个具体的寄存器条目。
#[derive(Clone, Copy)]
pub struct CpRegInfo {
    pub name: &'static str,
    pub key: CpRegKey,
    pub ty: RegType,
    pub access: Access,
    pub reset: u64,
    pub slot: Option<Slot>,
    pub access_fn: Option<AccessFn>,
    pub read_fn: Option<ReadFn>,
    pub write_fn: Option<WriteFn>,
    pub raw_write_fn: Option<WriteFn>,
    pub reset_fn: Option<ResetFn>,
}

impl CpRegInfo {
    /// 32 位 AArch32 视图会截断其存储。
    pub fn is_32bit(&self) -> bool {
        !self.key.aa64 && !self.key.is64
    }

    /// 是否纳入快照。
    pub fn is_migratable(&self) -> bool {
        !self.ty.intersects(RegType::ALIAS | RegType::NO_RAW | RegType::NOP | RegType::SPECIAL)
    }
}

impl fmt::Debug for CpRegInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpRegInfo")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("ty", &self.ty)
            .field("access", &self.access)
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

/// 模型定义错误；出现任何一个都不会构建 CPU。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefineError {
    #[error("{name}: {key} already defined by {existing}")]
    Duplicate {
        name: &'static str,
        existing: &'static str,
        key: CpRegKey,
    },
    #[error("{name}: access mask grants {what} but nothing backs it")]
    MissingAccessor { name: &'static str, what: &'static str },
    #[error("{name}: write hook without storage needs a raw write or NO_RAW")]
    NoRawWrite { name: &'static str },
    #[error("{name}: wildcard not allowed in {field}")]
    BadWildcard { name: &'static str, field: &'static str },
    #[error("{name}: reset is not idempotent ({first:#x} then {second:#x})")]
    ResetNotIdempotent {
        name: &'static str,
        first: u64,
        second: u64,
    },
}

/// 无法完成的访客寄存器访问。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CpAccessError {
    #[error("no register at {0}")]
    Unknown(CpRegKey),
    /// 访问被拒绝；在 `target_el` 上为 UNDEFINED（未分类综合征）。
    #[error("{name} access is undefined (to EL{target_el})")]
    Undefined { name: &'static str, target_el: u32 },
    /// 以寄存器访问综合征陷入。
    #[error("{name} access traps to EL{target_el}")]
    Trap { name: &'static str, target_el: u32 },
}
