//! CPU 架构状态
//!
//! 包括按模式分组的通用寄存器、缓存的状态标志、AArch64 栈指针、
//! 向量/浮点寄存器堆、系统寄存器块以及 M-profile 状态。
//!
//! 任意时刻只有一组寄存器位于 `regs`/`xregs` 中；所有模式或安全态切换
//! 都经过这里的辅助函数完成换组。

use simple_soft_float::{RoundingMode, StatusFlags};

use super::features::{self, Features};
use super::trap::{ExcPhase, ExceptionEvent, IrqLines, mexc};
use crate::mmu::MmuIdxSet;
use crate::mmu::sau::IdauRegion;

/// 数量与元素类型可配置的通用寄存器堆。
#[derive(Clone, Debug)]
pub struct GenericRegFile<const N: usize, T: Copy + Default> {
    regs: [T; N],
}

impl<const N: usize, T: Copy + Default> GenericRegFile<N, T> {
    pub fn new() -> Self {
        Self { regs: [T::default(); N] }
    }

    #[inline]
    pub fn read(&self, reg: usize) -> T {
        self.regs[reg]
    }

    #[inline]
    pub fn write(&mut self, reg: usize, value: T) {
        self.regs[reg] = value;
    }

    pub fn clear(&mut self) {
        self.regs = [T::default(); N];
    }

    pub fn snapshot(&self) -> &[T; N] {
        &self.regs
    }
}

impl<const N: usize, T: Copy + Default> Default for GenericRegFile<N, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Q0..Q31，每个以两个 64 位半部（低、高）保存。
pub type VecRegFile = GenericRegFile<32, [u64; 2]>;

/// AArch32 处理器模式 (CPSR.M)。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CpuMode {
    Usr = 0x10,
    Fiq = 0x11,
    Irq = 0x12,
    Svc = 0x13,
    Mon = 0x16,
    Abt = 0x17,
    Hyp = 0x1a,
    Und = 0x1b,
    Sys = 0x1f,
}

impl CpuMode {
    pub fn from_bits(bits: u32) -> Option<Self> {
        Some(match bits & psr::M {
            0x10 => CpuMode::Usr,
            0x11 => CpuMode::Fiq,
            0x12 => CpuMode::Irq,
            0x13 => CpuMode::Svc,
            0x16 => CpuMode::Mon,
            0x17 => CpuMode::Abt,
            0x1a => CpuMode::Hyp,
            0x1b => CpuMode::Und,
            0x1f => CpuMode::Sys,
            _ => return None,
        })
    }

    pub fn bits(self) -> u32 {
        self as u32
    }

    /// 分组 r13/SPSR 数组的索引。
    pub fn bank(self) -> usize {
        match self {
            CpuMode::Usr | CpuMode::Sys => bank::USRSYS,
            CpuMode::Svc => bank::SVC,
            CpuMode::Abt => bank::ABT,
            CpuMode::Und => bank::UND,
            CpuMode::Irq => bank::IRQ,
            CpuMode::Fiq => bank::FIQ,
            CpuMode::Hyp => bank::HYP,
            CpuMode::Mon => bank::MON,
        }
    }

    /// Hyp 与 User/System 共用 LR。
    pub fn r14_bank(self) -> usize {
        match self {
            CpuMode::Hyp => bank::USRSYS,
            other => other.bank(),
        }
    }
}

pub mod bank {
    pub const USRSYS: usize = 0;
    pub const SVC: usize = 1;
    pub const ABT: usize = 2;
    pub const UND: usize = 3;
    pub const IRQ: usize = 4;
    pub const FIQ: usize = 5;
    pub const HYP: usize = 6;
    pub const MON: usize = 7;

    /// AArch64 异常级别对应的 SPSR_ELx 分组。
    pub fn aarch64_spsr(el: u32) -> usize {
        match el {
            2 => HYP,
            3 => MON,
            _ => SVC,
        }
    }
}

/// CPSR / SPSR 位布局。
pub mod psr {
    pub const M: u32 = 0x1f;
    pub const T: u32 = 1 << 5;
    pub const F: u32 = 1 << 6;
    pub const I: u32 = 1 << 7;
    pub const A: u32 = 1 << 8;
    pub const E: u32 = 1 << 9;
    pub const IT_2_7: u32 = 0xfc00;
    pub const GE: u32 = 0xf << 16;
    pub const IL: u32 = 1 << 20;
    pub const SS: u32 = 1 << 21;
    pub const J: u32 = 1 << 24;
    pub const IT_0_1: u32 = 3 << 25;
    pub const Q: u32 = 1 << 27;
    pub const NZCV: u32 = 0xf << 28;
    pub const AIF: u32 = A | I | F;
    /// 原样保存在 `uncached_cpsr` 中的位。
    pub const UNCACHED: u32 = M | E | IL | J;
}

/// AArch64 PSTATE 位布局。
pub mod pstate {
    pub const SP: u32 = 1 << 0;
    pub const EL_MASK: u32 = 3 << 2;
    pub const NRW: u32 = 1 << 4;
    pub const F: u32 = 1 << 6;
    pub const I: u32 = 1 << 7;
    pub const A: u32 = 1 << 8;
    pub const D: u32 = 1 << 9;
    pub const IL: u32 = 1 << 20;
    pub const SS: u32 = 1 << 21;
    pub const NZCV: u32 = 0xf << 28;
    pub const DAIF: u32 = D | A | I | F;

    pub const fn mode_elh(el: u32) -> u32 {
        (el << 2) | SP
    }
}

/// M-profile CONTROL 位。
pub mod m_control {
    pub const NPRIV: u32 = 1 << 0;
    pub const SPSEL: u32 = 1 << 1;
    pub const FPCA: u32 = 1 << 2;
    pub const SFPA: u32 = 1 << 3;
}

/// M-profile xPSR 中不与 CPSR 布局共用的位。
pub mod xpsr {
    pub const EXCP: u32 = 0x1ff;
    pub const SPREALIGN: u32 = 1 << 9;
    pub const SFPA: u32 = 1 << 20;
    pub const T: u32 = 1 << 24;
}

/// 与 AArch64 FPSR/FPCR 共用的 FPSCR 布局。
pub mod fpscr {
    pub const IOC: u32 = 1 << 0;
    pub const DZC: u32 = 1 << 1;
    pub const OFC: u32 = 1 << 2;
    pub const UFC: u32 = 1 << 3;
    pub const IXC: u32 = 1 << 4;
    pub const IDC: u32 = 1 << 7;
    pub const CUMULATIVE: u32 = IOC | DZC | OFC | UFC | IXC;
    pub const RMODE_SHIFT: u32 = 22;
    pub const RMODE_MASK: u32 = 3 << RMODE_SHIFT;
    pub const QC: u32 = 1 << 27;
    pub const FPSR_MASK: u32 = 0xf800_009f;
    pub const FPCR_MASK: u32 = 0x07ff_9f00;
}

/// 浮点/向量寄存器堆及其控制寄存器。
#[derive(Clone, Debug)]
pub struct VfpState {
    pub qregs: VecRegFile,
    /// 去掉累积异常标志后的 FPSCR。
    fpscr: u32,
    /// 累积的 IEEE 异常标志。
    cumulative: StatusFlags,
    pub fpexc: u32,
}

impl Default for VfpState {
    fn default() -> Self {
        Self {
            qregs: VecRegFile::new(),
            fpscr: 0,
            cumulative: StatusFlags::empty(),
            fpexc: 0,
        }
    }
}

impl VfpState {
    pub fn dreg(&self, n: usize) -> u64 {
        self.qregs.read(n / 2)[n % 2]
    }

    pub fn set_dreg(&mut self, n: usize, value: u64) {
        let mut q = self.qregs.read(n / 2);
        q[n % 2] = value;
        self.qregs.write(n / 2, q);
    }

    pub fn fpscr_read(&self) -> u32 {
        let mut bits = self.fpscr & !fpscr::CUMULATIVE;
        let flags = self.cumulative;
        if flags.contains(StatusFlags::INVALID_OPERATION) {
            bits |= fpscr::IOC;
        }
        if flags.contains(StatusFlags::DIVISION_BY_ZERO) {
            bits |= fpscr::DZC;
        }
        if flags.contains(StatusFlags::OVERFLOW) {
            bits |= fpscr::OFC;
        }
        if flags.contains(StatusFlags::UNDERFLOW) {
            bits |= fpscr::UFC;
        }
        if flags.contains(StatusFlags::INEXACT) {
            bits |= fpscr::IXC;
        }
        bits
    }

    pub fn fpscr_write(&mut self, value: u32) {
        let mut flags = StatusFlags::empty();
        if value & fpscr::IOC != 0 {
            flags |= StatusFlags::INVALID_OPERATION;
        }
        if value & fpscr::DZC != 0 {
            flags |= StatusFlags::DIVISION_BY_ZERO;
        }
        if value & fpscr::OFC != 0 {
            flags |= StatusFlags::OVERFLOW;
        }
        if value & fpscr::UFC != 0 {
            flags |= StatusFlags::UNDERFLOW;
        }
        if value & fpscr::IXC != 0 {
            flags |= StatusFlags::INEXACT;
        }
        self.cumulative = flags;
        self.fpscr = value & !fpscr::CUMULATIVE;
    }

    pub fn fpsr_read(&self) -> u32 {
        self.fpscr_read() & fpscr::FPSR_MASK
    }

    pub fn fpsr_write(&mut self, value: u32) {
        let merged = (self.fpscr_read() & !fpscr::FPSR_MASK) | (value & fpscr::FPSR_MASK);
        self.fpscr_write(merged);
    }

    pub fn fpcr_read(&self) -> u32 {
        self.fpscr_read() & fpscr::FPCR_MASK
    }

    pub fn fpcr_write(&mut self, value: u32) {
        let merged = (self.fpscr_read() & !fpscr::FPCR_MASK) | (value & fpscr::FPCR_MASK);
        self.fpscr_write(merged);
    }

    /// FPSCR.RMode 选择的舍入模式，供浮点辅助函数使用。
    pub fn rounding_mode(&self) -> RoundingMode {
        match (self.fpscr & fpscr::RMODE_MASK) >> fpscr::RMODE_SHIFT {
            0 => RoundingMode::TiesToEven,
            1 => RoundingMode::TowardPositive,
            2 => RoundingMode::TowardNegative,
            _ => RoundingMode::TowardZero,
        }
    }

    /// 把浮点辅助函数产生的标志合并到累积位中。
    pub fn accumulate(&mut self, raised: StatusFlags) {
        self.cumulative |= raised;
    }

    pub fn cumulative(&self) -> StatusFlags {
        self.cumulative
    }
}

/// 系统/控制寄存器存储。EL1 寄存器的 AArch32 安全分组位于 EL3 槽位，
/// 非安全分组位于 EL1 槽位。
#[derive(Clone, Debug, Default)]
pub struct SysRegs {
    pub sctlr_el: [u64; 4],
    pub cpacr_el1: u64,
    pub cptr_el: [u64; 4],
    pub ttbr0_el: [u64; 4],
    pub ttbr1_el: [u64; 4],
    pub tcr_el: [u64; 4],
    pub mair_el: [u64; 4],
    pub vbar_el: [u64; 4],
    pub esr_el: [u64; 4],
    pub far_el: [u64; 4],
    pub par_el: [u64; 4],
    pub dacr: [u64; 4],
    pub ifsr: [u64; 4],
    pub contextidr_el: [u64; 4],
    pub tpidr_el: [u64; 4],
    pub tpidrro_el0: u64,
    /// 安全态的 TPIDRURW、TPIDRURO、TPIDRPRW。
    pub tpidr_s: [u64; 3],
    pub scr_el3: u64,
    pub nsacr: u64,
    pub mvbar: u64,
    pub hcr_el2: u64,
    pub vttbr_el2: u64,
    pub vtcr_el2: u64,
    pub hpfar_el2: u64,
    pub mdcr_el2: u64,
    pub mdcr_el3: u64,
    pub mdscr_el1: u64,
    pub dbgbvr: [u64; 16],
    pub dbgbcr: [u64; 16],
    /// PMSAv7 区域号寄存器。
    pub rgnr: u64,
}

/// 核心会查询的 SCTLR 位。
pub mod sctlr {
    pub const M: u64 = 1 << 0;
    pub const A: u64 = 1 << 1;
    pub const C: u64 = 1 << 2;
    pub const S: u64 = 1 << 8;
    pub const R: u64 = 1 << 9;
    pub const UMA: u64 = 1 << 9;
    pub const I: u64 = 1 << 12;
    pub const V: u64 = 1 << 13;
    pub const UCT: u64 = 1 << 15;
    pub const BR: u64 = 1 << 17;
    pub const WXN: u64 = 1 << 19;
    pub const UWXN: u64 = 1 << 20;
    pub const E0E: u64 = 1 << 24;
    pub const EE: u64 = 1 << 25;
    pub const AFE: u64 = 1 << 29;
    pub const TE: u64 = 1 << 30;
}

/// M-profile 异常表中每个向量的簿记信息。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VecInfo {
    pub enabled: bool,
    pub pending: bool,
    pub active: bool,
    pub prio: i16,
}

/// M-profile 异常的挂起/活动/优先级状态。分组异常的安全实例
/// 使用 `sec_vectors`。
#[derive(Clone, Debug, Default)]
pub struct MExcTable {
    pub vectors: Vec<VecInfo>,
    pub sec_vectors: Vec<VecInfo>,
}

impl MExcTable {
    pub fn with_vectors(count: usize) -> Self {
        let mut t = Self {
            vectors: vec![VecInfo::default(); count],
            sec_vectors: vec![VecInfo::default(); count],
        };
        t.reset();
        t
    }

    /// 原地清空所有状态，不重新分配。
    pub fn reset(&mut self) {
        for v in self.vectors.iter_mut().chain(self.sec_vectors.iter_mut()) {
            *v = VecInfo::default();
        }
        for table in [&mut self.vectors, &mut self.sec_vectors] {
            if table.len() > mexc::SYSTICK as usize {
                table[mexc::RESET as usize].prio = -3;
                table[mexc::NMI as usize].prio = -2;
                table[mexc::HARD as usize].prio = -1;
                for always_on in [mexc::NMI, mexc::HARD, mexc::SVC, mexc::PENDSV, mexc::SYSTICK] {
                    table[always_on as usize].enabled = true;
                }
            }
        }
    }
}

/// M-profile 特殊用途与故障状态。`[x; 2]` 数组
/// 按安全态索引（0 = 非安全，1 = 安全）。
#[derive(Clone, Debug, Default)]
pub struct MState {
    pub secure: bool,
    /// 当前异常号 (IPSR)；Thread 模式下为 0。
    pub exception: u32,
    pub control: [u32; 2],
    pub primask: [u32; 2],
    pub faultmask: [u32; 2],
    pub basepri: [u32; 2],
    pub vecbase: [u32; 2],
    /// 非活动的栈指针：`[安全态][0 = MSP, 1 = PSP]`。正在使用的栈
    /// 对应的槽位已过期，其值在 `regs[13]` 中。
    pub sp_bank: [[u32; 2]; 2],
    pub msplim: [u32; 2],
    pub psplim: [u32; 2],
    pub ccr: [u32; 2],
    pub cfsr: [u32; 2],
    pub hfsr: u32,
    pub sfsr: u32,
    pub sfar: u32,
    pub mmfar: [u32; 2],
    pub bfar: u32,
    pub aircr: u32,
    pub mpu_ctrl: [u32; 2],
    pub mair0: [u32; 2],
    pub mair1: [u32; 2],
    pub lockup: bool,
    pub excs: MExcTable,
}

/// CCR 位。
pub mod ccr {
    pub const NONBASETHRDENA: u32 = 1 << 0;
    pub const UNALIGN_TRP: u32 = 1 << 3;
    pub const STKALIGN: u32 = 1 << 9;
}

/// 保护单元的区域描述符。缓冲区在构造时一次性确定大小，
/// 之后只会原地清空。
#[derive(Clone, Debug, Default)]
pub struct PmsaState {
    /// PMSAv7 基址/大小/访问权限，索引为 `[安全态][区域]`。
    pub drbar: [Vec<u32>; 2],
    pub drsr: [Vec<u32>; 2],
    pub dracr: [Vec<u32>; 2],
    /// PMSAv8 基址/界限，索引为 `[安全态][区域]`。
    pub rbar: [Vec<u32>; 2],
    pub rlar: [Vec<u32>; 2],
}

impl PmsaState {
    pub fn with_regions(n: usize) -> Self {
        let v = || [vec![0u32; n], vec![0u32; n]];
        Self {
            drbar: v(),
            drsr: v(),
            dracr: v(),
            rbar: v(),
            rlar: v(),
        }
    }

    pub fn num_regions(&self) -> usize {
        self.drbar[0].len()
    }

    pub fn clear(&mut self) {
        for bankset in [
            &mut self.drbar,
            &mut self.drsr,
            &mut self.dracr,
            &mut self.rbar,
            &mut self.rlar,
        ] {
            for regions in bankset.iter_mut() {
                regions.fill(0);
            }
        }
    }
}

/// 安全属性单元，以及模型固定的 IDAU 映射。
#[derive(Clone, Debug, Default)]
pub struct SauState {
    pub ctrl: u32,
    pub rbar: Vec<u32>,
    pub rlar: Vec<u32>,
    /// 实现定义的安全属性；不受复位影响。
    pub idau: Vec<IdauRegion>,
}

impl SauState {
    pub fn with_regions(n: usize) -> Self {
        Self {
            ctrl: 0,
            rbar: vec![0; n],
            rlar: vec![0; n],
            idau: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.ctrl = 0;
        self.rbar.fill(0);
        self.rlar.fill(0);
    }
}

/// 异常簿记：最近一次异常的综合征/地址，
/// 以及状态机阶段。
#[derive(Clone, Debug, Default)]
pub struct ExceptionInfo {
    pub syndrome: u32,
    pub fsr: u32,
    pub vaddress: u64,
    pub target_el: u32,
    pub phase: ExcPhase,
    pub pending: Option<ExceptionEvent>,
    /// 已断言但当前被屏蔽的异步中断。
    pub lines: IrqLines,
}

/// 一个虚拟 CPU 的完整架构状态。
#[derive(Clone, Debug, Default)]
pub struct CpuState {
    // 复位后保持不变。
    pub features: Features,
    pub mpidr: u64,
    pub pmsa: PmsaState,
    pub sau: SauState,

    // AArch32 视图。
    pub regs: [u32; 16],
    /// CPSR 的 Mode、E、IL 与 J 位。
    pub uncached_cpsr: u32,
    /// N 为 `nf` 的第 31 位，`zf == 0` 时 Z 置位，C 为 `cf`，V 为 `vf` 的第 31 位。
    pub nf: u32,
    pub zf: u32,
    pub cf: u32,
    pub vf: u32,
    pub qf: u32,
    pub ge: u32,
    pub thumb: bool,
    pub condexec_bits: u32,
    /// 按 PSTATE 位位置排列的 D、A、I、F。
    pub daif: u32,
    /// 当前 AArch32 模式的 SPSR。
    pub spsr: u32,
    pub banked_spsr: [u64; 8],
    pub banked_r13: [u32; 8],
    pub banked_r14: [u32; 8],
    pub usr_regs: [u32; 5],
    pub fiq_regs: [u32; 5],

    // AArch64 视图。
    pub aarch64: bool,
    pub xregs: [u64; 32],
    pub pc: u64,
    /// 除 NZCV 与 DAIF 以外的 PSTATE 位。
    pub pstate: u32,
    pub sp_el: [u64; 4],
    pub elr_el: [u64; 4],

    pub exclusive_addr: u64,
    pub vfp: VfpState,
    pub cp15: SysRegs,
    pub v7m: MState,
    pub exception: ExceptionInfo,
    tlb_pending: MmuIdxSet,
}

impl CpuState {
    pub fn new(features: Features) -> Self {
        Self {
            features,
            exclusive_addr: u64::MAX,
            ..Default::default()
        }
    }

    /// 分配区域表与 M-profile 异常表。
    pub fn with_tables(mut self, pmsa_regions: usize, sau_regions: usize, num_irq: usize) -> Self {
        self.pmsa = PmsaState::with_regions(pmsa_regions);
        self.sau = SauState::with_regions(sau_regions);
        if self.features.contains(Features::M) {
            self.v7m.excs = MExcTable::with_vectors(16 + num_irq);
        }
        self
    }

    /// 核心寄存器的架构复位。特性与区域缓冲区保留，
    /// 其内容原地清空。
    pub fn reset(&mut self, m_vecbase: u32) {
        let mut pmsa = std::mem::take(&mut self.pmsa);
        let mut sau = std::mem::take(&mut self.sau);
        let mut excs = std::mem::take(&mut self.v7m.excs);
        pmsa.clear();
        sau.clear();
        excs.reset();
        let features = self.features;
        let mpidr = self.mpidr;
        *self = CpuState {
            features,
            mpidr,
            pmsa,
            sau,
            exclusive_addr: u64::MAX,
            ..Default::default()
        };
        self.v7m.excs = excs;
        self.zf = 1;

        if features.contains(Features::M) {
            self.v7m.secure = features.contains(Features::M_SECURITY);
            self.v7m.vecbase = [m_vecbase; 2];
            self.v7m.ccr = [ccr::STKALIGN; 2];
            self.thumb = true;
        } else if features.contains(Features::AARCH64) {
            let el = features.highest_el();
            self.aarch64 = true;
            self.pstate = pstate::mode_elh(el);
            self.daif = pstate::DAIF;
        } else {
            self.uncached_cpsr = CpuMode::Svc.bits();
            self.daif = psr::AIF;
        }
        log::debug!("cpu state reset (features={:?})", features);
    }

    pub fn cpu_mode(&self) -> Option<CpuMode> {
        CpuMode::from_bits(self.uncached_cpsr)
    }

    /// 覆盖 CPSR.M 而不切换寄存器组。
    pub(crate) fn set_mode_raw(&mut self, mode: CpuMode) {
        self.uncached_cpsr = (self.uncached_cpsr & !psr::M) | mode.bits();
    }

    pub fn pc(&self) -> u64 {
        if self.aarch64 {
            self.pc
        } else {
            self.regs[15] as u64
        }
    }

    pub fn set_pc(&mut self, pc: u64) {
        if self.aarch64 {
            self.pc = pc;
        } else {
            self.regs[15] = pc as u32;
        }
    }

    // ---- 标志 ----

    pub fn nzcv(&self) -> u32 {
        let mut v = self.nf & (1 << 31);
        if self.zf == 0 {
            v |= 1 << 30;
        }
        if self.cf != 0 {
            v |= 1 << 29;
        }
        v | ((self.vf >> 3) & (1 << 28))
    }

    pub fn set_nzcv(&mut self, val: u32) {
        self.nf = val;
        self.zf = (!val >> 30) & 1;
        self.cf = (val >> 29) & 1;
        self.vf = (val << 3) & 0x8000_0000;
    }

    // ---- AArch32 CPSR ----

    pub fn cpsr_read(&self) -> u32 {
        let it = ((self.condexec_bits & 3) << 25) | ((self.condexec_bits & 0xfc) << 8);
        self.nzcv()
            | ((self.qf != 0) as u32) << 27
            | (self.ge << 16)
            | it
            | (self.daif & psr::AIF)
            | ((self.thumb as u32) << 5)
            | (self.uncached_cpsr & psr::UNCACHED)
    }

    /// 按 `mask` 写 CPSR。请求的模式切换被拒绝时
    /// 返回 false。
    pub fn cpsr_write(&mut self, val: u32, mask: u32, write_type: CpsrWriteType) -> bool {
        if mask & psr::NZCV != 0 {
            let merged = (self.nzcv() & !mask) | (val & mask & psr::NZCV);
            self.set_nzcv(merged);
        }
        if mask & psr::Q != 0 {
            self.qf = (val & psr::Q != 0) as u32;
        }
        if mask & psr::GE != 0 {
            self.ge = (val >> 16) & 0xf;
        }
        if mask & psr::T != 0 {
            self.thumb = val & psr::T != 0;
        }
        if mask & (psr::IT_0_1 | psr::IT_2_7) != 0 {
            self.condexec_bits = ((val >> 25) & 3) | ((val >> 8) & 0xfc);
        }
        self.daif = (self.daif & !(mask & psr::AIF)) | (val & mask & psr::AIF);

        let mut accepted = true;
        let cur_mode = self.uncached_cpsr & psr::M;
        if mask & psr::M != 0 && val & psr::M != cur_mode {
            match CpuMode::from_bits(val) {
                Some(new_mode) if !self.bad_mode_switch(new_mode, write_type) => {
                    self.switch_mode(new_mode);
                }
                _ => {
                    accepted = false;
                    if write_type == CpsrWriteType::ExceptionReturn
                        && self.features.contains(Features::V8)
                    {
                        log::warn!("illegal AArch32 exception return to mode {:#x}", val & psr::M);
                        self.uncached_cpsr |= psr::IL;
                    }
                }
            }
        }
        let keep = psr::E | psr::J | psr::IL;
        let mut m = mask & keep;
        if !accepted {
            m &= !psr::IL;
        }
        self.uncached_cpsr = (self.uncached_cpsr & !m) | (val & m);
        accepted
    }

    /// 当前状态不允许切换到 `mode` 时为 true。
    pub fn bad_mode_switch(&self, mode: CpuMode, write_type: CpsrWriteType) -> bool {
        let cur = self.cpu_mode();
        if write_type == CpsrWriteType::ByInstr
            && (cur == Some(CpuMode::Hyp) || mode == CpuMode::Hyp)
        {
            return true;
        }
        match mode {
            CpuMode::Usr => false,
            CpuMode::Sys | CpuMode::Svc | CpuMode::Abt | CpuMode::Und | CpuMode::Irq | CpuMode::Fiq => {
                write_type == CpsrWriteType::ByInstr
                    && self.cp15.hcr_el2 & features::hcr::TGE != 0
                    && cur == Some(CpuMode::Mon)
                    && !features::is_secure_below_el3(self)
            }
            CpuMode::Hyp => !features::el2_enabled(self) || features::current_el(self) < 2,
            CpuMode::Mon => features::current_el(self) < 3,
        }
    }

    /// 把活动的 r13/r14/SPSR（FIQ 还包括 r8-r12）换成 `new_mode` 的分组。
    pub fn switch_mode(&mut self, new_mode: CpuMode) {
        let Some(old_mode) = self.cpu_mode() else {
            self.set_mode_raw(new_mode);
            self.regs[13] = self.banked_r13[new_mode.bank()];
            self.regs[14] = self.banked_r14[new_mode.r14_bank()];
            self.spsr = self.banked_spsr[new_mode.bank()] as u32;
            return;
        };
        if old_mode == new_mode {
            return;
        }
        if old_mode == CpuMode::Fiq {
            self.fiq_regs.copy_from_slice(&self.regs[8..13]);
            self.regs[8..13].copy_from_slice(&self.usr_regs);
        } else if new_mode == CpuMode::Fiq {
            self.usr_regs.copy_from_slice(&self.regs[8..13]);
            self.regs[8..13].copy_from_slice(&self.fiq_regs);
        }

        let i = old_mode.bank();
        self.banked_r13[i] = self.regs[13];
        self.banked_spsr[i] = self.spsr as u64;
        self.banked_r14[old_mode.r14_bank()] = self.regs[14];

        let i = new_mode.bank();
        self.regs[13] = self.banked_r13[i];
        self.spsr = self.banked_spsr[i] as u32;
        self.regs[14] = self.banked_r14[new_mode.r14_bank()];
        self.set_mode_raw(new_mode);
    }

    // ---- AArch64 PSTATE ----

    pub fn pstate_read(&self) -> u32 {
        self.nzcv() | self.daif | self.pstate
    }

    pub fn pstate_write(&mut self, val: u32) {
        self.set_nzcv(val);
        self.daif = val & pstate::DAIF;
        self.pstate = val & !(pstate::NZCV | pstate::DAIF);
    }

    /// 把活动 SP 存入 PSTATE.SP 选择的 SP_ELx 槽位。
    pub fn save_sp(&mut self, el: u32) {
        let slot = if self.pstate & pstate::SP != 0 { el as usize } else { 0 };
        self.sp_el[slot] = self.xregs[31];
    }

    pub fn restore_sp(&mut self, el: u32) {
        let slot = if self.pstate & pstate::SP != 0 { el as usize } else { 0 };
        self.xregs[31] = self.sp_el[slot];
    }

    /// SP_ELn 的值，包括 `xregs[31]` 中的活动副本。
    pub fn sp_el_live(&self, n: usize) -> u64 {
        if self.aarch64 {
            let el = ((self.pstate & pstate::EL_MASK) >> 2) as usize;
            let live = if self.pstate & pstate::SP != 0 { el } else { 0 };
            if live == n {
                return self.xregs[31];
            }
        }
        self.sp_el[n]
    }

    pub fn set_sp_el_live(&mut self, n: usize, value: u64) {
        self.sp_el[n] = value;
        if self.aarch64 {
            let el = ((self.pstate & pstate::EL_MASK) >> 2) as usize;
            let live = if self.pstate & pstate::SP != 0 { el } else { 0 };
            if live == n {
                self.xregs[31] = value;
            }
        }
    }

    /// 把 AArch32 分组寄存器复制到对应的架构 X 寄存器。
    pub fn sync_32_to_64(&mut self) {
        let mode = self.cpu_mode();
        for i in 0..8 {
            self.xregs[i] = self.regs[i] as u64;
        }
        let r8_12 = if mode == Some(CpuMode::Fiq) { self.usr_regs } else { self.r8_12() };
        for i in 0..5 {
            self.xregs[8 + i] = r8_12[i] as u64;
        }
        let live_or = |m: CpuMode, banked_sp: u32, banked_lr: u32, regs: &[u32; 16]| {
            if mode == Some(m) {
                (regs[13] as u64, regs[14] as u64)
            } else {
                (banked_sp as u64, banked_lr as u64)
            }
        };
        if matches!(mode, Some(CpuMode::Usr) | Some(CpuMode::Sys)) {
            self.xregs[13] = self.regs[13] as u64;
            self.xregs[14] = self.regs[14] as u64;
        } else {
            self.xregs[13] = self.banked_r13[bank::USRSYS] as u64;
            self.xregs[14] = if mode == Some(CpuMode::Hyp) {
                self.regs[14] as u64
            } else {
                self.banked_r14[bank::USRSYS] as u64
            };
        }
        self.xregs[15] = if mode == Some(CpuMode::Hyp) {
            self.regs[13] as u64
        } else {
            self.banked_r13[bank::HYP] as u64
        };
        let pairs = [
            (CpuMode::Irq, bank::IRQ, 16),
            (CpuMode::Svc, bank::SVC, 18),
            (CpuMode::Abt, bank::ABT, 20),
            (CpuMode::Und, bank::UND, 22),
        ];
        for (m, b, x) in pairs {
            let (sp, lr) = live_or(m, self.banked_r13[b], self.banked_r14[b], &self.regs);
            self.xregs[x] = lr;
            self.xregs[x + 1] = sp;
        }
        let fiq = if mode == Some(CpuMode::Fiq) { self.r8_12() } else { self.fiq_regs };
        for i in 0..5 {
            self.xregs[24 + i] = fiq[i] as u64;
        }
        let (sp, lr) = live_or(
            CpuMode::Fiq,
            self.banked_r13[bank::FIQ],
            self.banked_r14[bank::FIQ],
            &self.regs,
        );
        self.xregs[29] = sp;
        self.xregs[30] = lr;
        self.pc = self.regs[15] as u64;
    }

    /// [`sync_32_to_64`](Self::sync_32_to_64) 的逆操作；高半部被丢弃。
    pub fn sync_64_to_32(&mut self) {
        let mode = self.cpu_mode();
        let x = |i: usize, xr: &[u64; 32]| xr[i] as u32;
        for i in 0..8 {
            self.regs[i] = x(i, &self.xregs);
        }
        if mode == Some(CpuMode::Fiq) {
            for i in 0..5 {
                self.usr_regs[i] = x(8 + i, &self.xregs);
                self.regs[8 + i] = x(24 + i, &self.xregs);
            }
        } else {
            for i in 0..5 {
                self.regs[8 + i] = x(8 + i, &self.xregs);
                self.fiq_regs[i] = x(24 + i, &self.xregs);
            }
        }
        if matches!(mode, Some(CpuMode::Usr) | Some(CpuMode::Sys)) {
            self.regs[13] = x(13, &self.xregs);
            self.regs[14] = x(14, &self.xregs);
        } else {
            self.banked_r13[bank::USRSYS] = x(13, &self.xregs);
            if mode == Some(CpuMode::Hyp) {
                self.regs[14] = x(14, &self.xregs);
            } else {
                self.banked_r14[bank::USRSYS] = x(14, &self.xregs);
            }
        }
        if mode == Some(CpuMode::Hyp) {
            self.regs[13] = x(15, &self.xregs);
        } else {
            self.banked_r13[bank::HYP] = x(15, &self.xregs);
        }
        let pairs = [
            (CpuMode::Irq, bank::IRQ, 16),
            (CpuMode::Svc, bank::SVC, 18),
            (CpuMode::Abt, bank::ABT, 20),
            (CpuMode::Und, bank::UND, 22),
            (CpuMode::Fiq, bank::FIQ, 29),
        ];
        for (m, b, xi) in pairs {
            // FIQ 把 SP 放在 x29、LR 放在 x30；其他模式 LR 在前。
            let (sp, lr) = if m == CpuMode::Fiq {
                (x(29, &self.xregs), x(30, &self.xregs))
            } else {
                (x(xi + 1, &self.xregs), x(xi, &self.xregs))
            };
            if mode == Some(m) {
                self.regs[13] = sp;
                self.regs[14] = lr;
            } else {
                self.banked_r13[b] = sp;
                self.banked_r14[b] = lr;
            }
        }
        self.regs[15] = self.pc as u32;
    }

    fn r8_12(&self) -> [u32; 5] {
        let mut r = [0u32; 5];
        r.copy_from_slice(&self.regs[8..13]);
        r
    }

    pub fn clear_exclusive(&mut self) {
        self.exclusive_addr = u64::MAX;
    }

    // ---- M-profile ----

    pub fn xpsr_read(&self) -> u32 {
        let it = ((self.condexec_bits & 3) << 25) | ((self.condexec_bits & 0xfc) << 8);
        self.nzcv()
            | ((self.qf != 0) as u32) << 27
            | (self.ge << 16)
            | it
            | ((self.thumb as u32) << 24)
            | self.v7m.exception
    }

    /// 写入 `mask` 选中的 xPSR 字段。
    pub fn xpsr_write(&mut self, val: u32, mask: u32) {
        if mask & psr::NZCV != 0 {
            let merged = (self.nzcv() & !mask) | (val & mask & psr::NZCV);
            self.set_nzcv(merged);
        }
        if mask & psr::Q != 0 {
            self.qf = (val & psr::Q != 0) as u32;
        }
        if mask & psr::GE != 0 {
            self.ge = (val >> 16) & 0xf;
        }
        if mask & xpsr::T != 0 {
            self.thumb = val & xpsr::T != 0;
        }
        if mask & (psr::IT_0_1 | psr::IT_2_7) != 0 {
            self.condexec_bits = ((val >> 25) & 3) | ((val >> 8) & 0xfc);
        }
        if mask & xpsr::EXCP != 0 {
            self.m_set_exception(val & xpsr::EXCP);
        }
    }

    /// 修改 IPSR；Thread/Handler 模式切换改变所用栈时移动活动 SP。
    pub fn m_set_exception(&mut self, exc: u32) {
        let sec = self.v7m.secure as usize;
        let old = self.m_using_psp();
        self.v7m.sp_bank[sec][old as usize] = self.regs[13];
        self.v7m.exception = exc;
        let new = self.m_using_psp();
        self.regs[13] = self.v7m.sp_bank[sec][new as usize];
    }

    pub fn m_using_psp(&self) -> bool {
        !features::is_handler_mode(self)
            && self.v7m.control[self.v7m.secure as usize] & m_control::SPSEL != 0
    }

    /// 给定分组的栈指针；活动的那个读取 `regs[13]`。
    pub fn m_sp(&self, secure: bool, psp: bool) -> u32 {
        if secure == self.v7m.secure && psp == self.m_using_psp() {
            self.regs[13]
        } else {
            self.v7m.sp_bank[secure as usize][psp as usize]
        }
    }

    pub fn set_m_sp(&mut self, secure: bool, psp: bool, value: u32) {
        if secure == self.v7m.secure && psp == self.m_using_psp() {
            self.regs[13] = value;
        } else {
            self.v7m.sp_bank[secure as usize][psp as usize] = value;
        }
    }

    /// 修改当前安全态的 CONTROL.SPSEL，并切换栈。
    pub fn m_write_spsel(&mut self, psp: bool) {
        self.m_write_spsel_for(self.v7m.secure, psp);
    }

    /// 修改任一安全态的 CONTROL.SPSEL。只有当前安全态的写入
    /// 会移动活动 SP。
    pub fn m_write_spsel_for(&mut self, secure: bool, psp: bool) {
        if secure != self.v7m.secure {
            let control = &mut self.v7m.control[secure as usize];
            if psp {
                *control |= m_control::SPSEL;
            } else {
                *control &= !m_control::SPSEL;
            }
            return;
        }
        let sec = secure as usize;
        let old = self.m_using_psp();
        self.v7m.sp_bank[sec][old as usize] = self.regs[13];
        if psp {
            self.v7m.control[sec] |= m_control::SPSEL;
        } else {
            self.v7m.control[sec] &= !m_control::SPSEL;
        }
        let new = self.m_using_psp();
        self.regs[13] = self.v7m.sp_bank[sec][new as usize];
    }

    /// 切换当前安全态，换入该安全态的栈。
    pub fn m_switch_security(&mut self, secure: bool) {
        if self.v7m.secure == secure {
            return;
        }
        let old_psp = self.m_using_psp();
        self.v7m.sp_bank[self.v7m.secure as usize][old_psp as usize] = self.regs[13];
        self.v7m.secure = secure;
        let new_psp = self.m_using_psp();
        self.regs[13] = self.v7m.sp_bank[secure as usize][new_psp as usize];
    }

    // ---- TLB 维护 ----

    /// 记录对本 CPU 缓存转换的刷新。从不广播到其他 CPU；
    /// 跨 CPU 失效由外层系统负责。
    pub fn flush_tlb_local(&mut self, idxs: MmuIdxSet) {
        log::debug!("local TLB flush {:?}", idxs);
        self.tlb_pending |= idxs;
    }

    /// 取出缓存项已过期的转换机制集合。
    pub fn take_pending_tlb_flush(&mut self) -> MmuIdxSet {
        std::mem::take(&mut self.tlb_pending)
    }
}

/// CPSR 写入的来源，决定哪些模式切换合法。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpsrWriteType {
    /// MSR / CPS
    ByInstr,
    ExceptionReturn,
    /// 调试器或状态恢复；除模式合法性外不做检查。
    Raw,
}
