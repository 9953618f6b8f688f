//! 寄存器注册表
//!
//! 负责定义时展开、带权限检查的访问分发、复位，以及快照用的原始读写。
//! 原始写入只走存储或 `raw_write_fn`，不会触发访客写回调。

use std::collections::BTreeMap;

use thiserror::Error;

use super::{
    ANY, CpAccess, CpAccessError, CpRegDef, CpRegInfo, CpRegKey, DefineError,
    OtherBank, RegState, RegType, SecState, Slot, Storage,
};
use crate::cpu::features::{self, Features};
use crate::cpu::status::CpuState;

/// `import_state` 无法恢复的一项。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{key}: {kind}")]
pub struct ImportFailure {
    pub key: CpRegKey,
    pub kind: ImportFailureKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ImportFailureKind {
    #[error("no such register")]
    UnknownKey,
    #[error("not restorable")]
    NotRaw,
    #[error("read back {actual:#x}, expected {expected:#x}")]
    Mismatch { expected: u64, actual: u64 },
}

/// 每个 CPU 的寄存器目录，以具体坐标为键。
#[derive(Debug, Default)]
pub struct CpRegistry {
    regs: BTreeMap<CpRegKey, CpRegInfo>,
    aa64: bool,
}

/// 展开一个通配字段。
fn span(v: u8, max: u8) -> std::ops::RangeInclusive<u8> {
    if v == ANY { 0..=max } else { v..=v }
}

fn undefined_access(_state: &CpuState, _ri: &CpRegInfo, _isread: bool) -> CpAccess {
    CpAccess::TrapUncategorized
}

/// AArch32 访问是否选择安全分组。
pub(crate) fn access_secure_reg(state: &CpuState) -> bool {
    state.features.contains(Features::EL3)
        && !features::el_is_aa64(state, 3)
        && features::is_secure_below_el3(state)
}

impl CpRegistry {
    pub fn new(features: Features) -> Self {
        Self {
            regs: BTreeMap::new(),
            aa64: features.contains(Features::AARCH64),
        }
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CpRegInfo> {
        self.regs.values()
    }

    pub fn define_all(&mut self, defs: &[CpRegDef]) -> Result<(), DefineError> {
        defs.iter().try_for_each(|d| self.define(d))
    }

    /// 把 `def` 按执行状态、安全分组与通配字段展开。
    pub fn define(&mut self, def: &CpRegDef) -> Result<(), DefineError> {
        check_def(def)?;
        if matches!(def.state, RegState::Aa64 | RegState::Both) && self.aa64 {
            let slot = match def.storage {
                Storage::None => None,
                Storage::Slot(s) => Some(s),
                Storage::Banked { ns, .. } => Some(ns),
            };
            self.add(def, true, false, slot, def.ty)?;
        }
        if def.state == RegState::Aa64 {
            return Ok(());
        }

        let mut ty = def.ty;
        if def.state == RegState::Both && self.aa64 {
            ty |= RegType::ALIAS;
        }
        match def.secure {
            SecState::Both => match def.storage {
                Storage::Banked { s, ns } => {
                    self.add(def, false, true, Some(s), ty)?;
                    self.add(def, false, false, Some(ns), ty)?;
                }
                Storage::Slot(slot) => {
                    self.add(def, false, true, Some(slot), ty | RegType::ALIAS)?;
                    self.add(def, false, false, Some(slot), ty)?;
                }
                Storage::None => {
                    self.add(def, false, true, None, ty | RegType::ALIAS)?;
                    self.add(def, false, false, None, ty)?;
                }
            },
            SecState::Secure | SecState::NonSecure => {
                let secure = def.secure == SecState::Secure;
                let slot = match def.storage {
                    Storage::None => None,
                    Storage::Slot(s) => Some(s),
                    Storage::Banked { s, ns } => Some(if secure { s } else { ns }),
                };
                self.add(def, false, secure, slot, ty)?;
                self.add_other_bank(def, !secure)?;
            }
        }
        Ok(())
    }

    fn add_other_bank(&mut self, def: &CpRegDef, secure: bool) -> Result<(), DefineError> {
        let other = match def.other_bank {
            OtherBank::Absent => return Ok(()),
            OtherBank::Trap => CpRegDef {
                ty: RegType::NO_RAW,
                storage: Storage::None,
                access_fn: Some(undefined_access),
                read_fn: None,
                write_fn: None,
                raw_write_fn: None,
                reset_fn: None,
                ..*def
            },
            OtherBank::Const(v) => CpRegDef {
                ty: RegType::CONST,
                reset: v,
                storage: Storage::None,
                access_fn: None,
                read_fn: None,
                write_fn: None,
                raw_write_fn: None,
                reset_fn: None,
                ..*def
            },
        };
        self.add(&other, false, secure, None, other.ty)
    }

    fn add(
        &mut self,
        def: &CpRegDef,
        aa64: bool,
        secure: bool,
        slot: Option<Slot>,
        ty: RegType,
    ) -> Result<(), DefineError> {
        for crm in span(def.crm, 15) {
            for opc1 in span(def.opc1, 7) {
                for opc2 in span(def.opc2, 7) {
                    let key = if aa64 {
                        CpRegKey::aa64(def.op0, opc1, def.crn, crm, opc2)
                    } else if def.is64 {
                        CpRegKey::aa32_64(def.cp, crm, opc1, secure)
                    } else {
                        CpRegKey::aa32(def.cp, def.crn, crm, opc1, opc2, secure)
                    };
                    let info = CpRegInfo {
                        name: def.name,
                        key,
                        ty,
                        access: def.access,
                        reset: def.reset,
                        slot,
                        access_fn: def.access_fn,
                        read_fn: def.read_fn,
                        write_fn: def.write_fn,
                        raw_write_fn: def.raw_write_fn,
                        reset_fn: def.reset_fn,
                    };
                    self.insert(info)?;
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, info: CpRegInfo) -> Result<(), DefineError> {
        if let Some(old) = self.regs.get(&info.key) {
            if !old.ty.contains(RegType::OVERRIDE) && !info.ty.contains(RegType::OVERRIDE) {
                return Err(DefineError::Duplicate {
                    name: info.name,
                    existing: old.name,
                    key: info.key,
                });
            }
            log::debug!("{} replaces {} at {}", info.name, old.name, info.key);
        }
        self.regs.insert(info.key, info);
        Ok(())
    }

    /// 精确查找。
    pub fn lookup(&self, key: &CpRegKey) -> Option<&CpRegInfo> {
        self.regs.get(key)
    }

    /// 查找，AArch32 安全分组取自当前状态。
    pub fn lookup_current(&self, state: &CpuState, key: &CpRegKey) -> Option<&CpRegInfo> {
        let mut key = *key;
        if !key.aa64 {
            key.secure = access_secure_reg(state);
        }
        self.regs.get(&key)
    }

    /// 给定名称的第一个主条目。
    pub fn by_name(&self, name: &str) -> Option<&CpRegInfo> {
        self.regs
            .values()
            .filter(|r| r.name == name)
            .min_by_key(|r| r.ty.contains(RegType::ALIAS))
    }

    /// 先检查权限掩码，再执行寄存器自身的访问检查。
    pub fn check_access(&self, state: &CpuState, ri: &CpRegInfo, isread: bool) -> Result<(), CpAccessError> {
        let el = features::current_el(state);
        let allowed = if isread {
            ri.access.can_read(el)
        } else {
            ri.access.can_write(el)
        };
        let usual = features::exception_target_el(state);
        if !allowed {
            return Err(CpAccessError::Undefined { name: ri.name, target_el: usual });
        }
        let Some(check) = ri.access_fn else {
            return Ok(());
        };
        match check(state, ri, isread) {
            CpAccess::Ok => Ok(()),
            CpAccess::Trap => Err(CpAccessError::Trap { name: ri.name, target_el: usual }),
            CpAccess::TrapUncategorized => Err(CpAccessError::Undefined { name: ri.name, target_el: usual }),
            CpAccess::TrapEl(el) => Err(CpAccessError::Trap { name: ri.name, target_el: el }),
            CpAccess::TrapUncategorizedEl(el) => Err(CpAccessError::Undefined { name: ri.name, target_el: el }),
        }
    }

    /// 从当前执行状态在 `key` 处进行访客读。
    pub fn read(&self, state: &CpuState, key: &CpRegKey) -> Result<u64, CpAccessError> {
        let ri = self.lookup_current(state, key).ok_or(CpAccessError::Unknown(*key))?;
        self.check_access(state, ri, true)?;
        Ok(read_value(state, ri))
    }

    /// 在 `key` 处进行访客写。副作用属于寄存器的写回调。
    pub fn write(&self, state: &mut CpuState, key: &CpRegKey, value: u64) -> Result<(), CpAccessError> {
        let ri = *self.lookup_current(state, key).ok_or(CpAccessError::Unknown(*key))?;
        self.check_access(state, &ri, false)?;
        log::debug!("write {} <- {:#x}", ri.name, value);
        write_value(state, &ri, value);
        Ok(())
    }

    /// 无副作用的读；常量读回其值。
    pub fn raw_read(&self, state: &CpuState, ri: &CpRegInfo) -> u64 {
        read_value(state, ri)
    }

    /// 无副作用的写；对常量的写被丢弃。
    pub fn raw_write(&self, state: &mut CpuState, ri: &CpRegInfo, value: u64) {
        if ri.ty.intersects(RegType::CONST | RegType::NOP) {
            return;
        }
        let value = if ri.is_32bit() { value & 0xffff_ffff } else { value };
        if let Some(f) = ri.raw_write_fn {
            f(state, ri, value);
        } else if let Some(slot) = ri.slot {
            slot.set(state, value);
        } else {
            log::debug!("raw write to {} dropped: no storage", ri.name);
        }
    }

    /// 为每个自有寄存器写入复位值。
    pub fn reset_all(&self, state: &mut CpuState) {
        for ri in self.regs.values() {
            self.reset_one(state, ri);
        }
    }

    /// 复位单个寄存器。别名与常量无需复位。
    pub fn reset_one(&self, state: &mut CpuState, ri: &CpRegInfo) {
        if ri.ty.intersects(RegType::ALIAS | RegType::SPECIAL | RegType::NOP | RegType::CONST) {
            return;
        }
        if let Some(f) = ri.reset_fn {
            f(state, ri);
        } else if let Some(slot) = ri.slot {
            slot.set(state, ri.reset);
        }
    }

    /// 再次复位并与当前值比较。必须在复位后
    /// 立即调用。
    pub fn check_reset(&self, state: &mut CpuState) -> Result<(), DefineError> {
        let checked = |ri: &&CpRegInfo| {
            !ri.ty.intersects(RegType::ALIAS | RegType::IO | RegType::NO_RAW | RegType::SPECIAL)
        };
        let first: Vec<(CpRegKey, u64)> = self
            .regs
            .values()
            .filter(checked)
            .map(|ri| (ri.key, self.raw_read(state, ri)))
            .collect();
        self.reset_all(state);
        for (key, v1) in first {
            let Some(ri) = self.regs.get(&key) else { continue };
            let v2 = self.raw_read(state, ri);
            if v1 != v2 {
                return Err(DefineError::ResetNotIdempotent { name: ri.name, first: v1, second: v2 });
            }
        }
        Ok(())
    }

    /// 所有可快照寄存器的原始值，按键排序。
    pub fn export_state(&self, state: &CpuState) -> Vec<(CpRegKey, u64)> {
        self.regs
            .values()
            .filter(|ri| ri.is_migratable())
            .map(|ri| (ri.key, self.raw_read(state, ri)))
            .collect()
    }

    /// 恢复 `entries`，逐项尝试并报告所有失败。
    pub fn import_state(&self, state: &mut CpuState, entries: &[(CpRegKey, u64)]) -> Result<(), Vec<ImportFailure>> {
        let mut failures = Vec::new();
        for &(key, value) in entries {
            let kind = match self.regs.get(&key) {
                None => Some(ImportFailureKind::UnknownKey),
                Some(ri) if !ri.is_migratable() => Some(ImportFailureKind::NotRaw),
                Some(ri) => {
                    self.raw_write(state, ri, value);
                    let actual = self.raw_read(state, ri);
                    (actual != value).then_some(ImportFailureKind::Mismatch { expected: value, actual })
                }
            };
            if let Some(kind) = kind {
                log::warn!("import {}: {}", key, kind);
                failures.push(ImportFailure { key, kind });
            }
        }
        if failures.is_empty() { Ok(()) } else { Err(failures) }
    }
}

fn check_def(def: &CpRegDef) -> Result<(), DefineError> {
    if def.crn == ANY {
        return Err(DefineError::BadWildcard { name: def.name, field: "crn" });
    }
    if def.op0 == ANY {
        return Err(DefineError::BadWildcard { name: def.name, field: "op0" });
    }
    if def.ty.intersects(RegType::CONST | RegType::NOP) {
        return Ok(());
    }
    let backed = def.storage != Storage::None;
    if def.access.any_read() && !backed && def.read_fn.is_none() {
        return Err(DefineError::MissingAccessor { name: def.name, what: "read" });
    }
    if def.access.any_write() && !backed && def.write_fn.is_none() {
        return Err(DefineError::MissingAccessor { name: def.name, what: "write" });
    }
    // 快照恢复从不执行访客写回调。
    let restorable = !def.ty.intersects(RegType::ALIAS | RegType::NO_RAW | RegType::SPECIAL);
    if restorable && !backed && def.write_fn.is_some() && def.raw_write_fn.is_none() {
        return Err(DefineError::NoRawWrite { name: def.name });
    }
    Ok(())
}

fn read_value(state: &CpuState, ri: &CpRegInfo) -> u64 {
    let v = if ri.ty.contains(RegType::CONST) {
        ri.reset
    } else if ri.ty.contains(RegType::NOP) {
        0
    } else if let Some(f) = ri.read_fn {
        f(state, ri)
    } else if let Some(slot) = ri.slot {
        slot.get(state)
    } else {
        0
    };
    if ri.is_32bit() { v & 0xffff_ffff } else { v }
}

fn write_value(state: &mut CpuState, ri: &CpRegInfo, value: u64) {
    if ri.ty.intersects(RegType::CONST | RegType::NOP) {
        return;
    }
    let value = if ri.is_32bit() { value & 0xffff_ffff } else { value };
    if let Some(f) = ri.write_fn {
        f(state, ri, value);
    } else if let Some(slot) = ri.slot {
        slot.set(state, value);
    }
}
