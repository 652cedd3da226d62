//! Virtual-register function compiler.
//!
//! Callers emit against an unbounded supply of virtual XMM registers;
//! `finalize` computes live intervals, maps them onto the physical
//! register file and rewrites the recorded program into real machine
//! code, spilling to stack slots when the file is exhausted. The
//! compiled function takes no parameters and returns a double in
//! `xmm0` per the System-V AMD64 convention.

use tracing::trace;

use crate::common::Register as _;

use super::builder::Assembler;
use super::code::{CodeError, CodeHolder, CodeResult, Label};
use super::instruction::{reg, Xmm};

/// A virtual XMM register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VXmm(u32);

impl VXmm {
    pub fn id(self) -> u32 {
        self.0
    }
}

/// Scalar-double arithmetic selector for recorded instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy)]
enum VirtInst {
    /// movq dst, [rip + label]
    Load { dst: VXmm, label: Label },
    /// movsd dst, src
    Move { dst: VXmm, src: VXmm },
    /// xorpd dst, src (dst == src zeroes the register)
    Xor { dst: VXmm, src: VXmm },
    /// addsd/subsd/mulsd/divsd dst, src
    Arith { op: FpOp, dst: VXmm, src: VXmm },
}

/// Where a virtual register lives after allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Loc {
    Reg(Xmm),
    Slot(u32),
}

#[derive(Debug, Clone, Copy, Default)]
struct Interval {
    def: Option<usize>,
    end: usize,
}

/// Physical registers handed out by the allocator. The two highest
/// registers are reserved for staging slot-resident operands.
const POOL: [Xmm; 14] = [
    reg::XMM0,
    reg::XMM1,
    reg::XMM2,
    reg::XMM3,
    reg::XMM4,
    reg::XMM5,
    reg::XMM6,
    reg::XMM7,
    reg::XMM8,
    reg::XMM9,
    reg::XMM10,
    reg::XMM11,
    reg::XMM12,
    reg::XMM13,
];
const SCRATCH_DST: Xmm = reg::XMM14;
const SCRATCH_SRC: Xmm = reg::XMM15;

/// Records a zero-argument, double-returning function against virtual
/// registers, then lowers it into a [`CodeHolder`].
pub struct FuncCompiler {
    insts: Vec<VirtInst>,
    vreg_count: u32,
    ret: Option<VXmm>,
}

impl FuncCompiler {
    pub fn new() -> Self {
        Self {
            insts: Vec::new(),
            vreg_count: 0,
            ret: None,
        }
    }

    /// Allocate a fresh virtual XMM register
    pub fn new_xmm(&mut self) -> VXmm {
        let v = VXmm(self.vreg_count);
        self.vreg_count += 1;
        v
    }

    /// movq dst, [rip + label]
    pub fn movq_load(&mut self, dst: VXmm, label: Label) -> &mut Self {
        self.insts.push(VirtInst::Load { dst, label });
        self
    }

    /// movsd dst, src
    pub fn movsd(&mut self, dst: VXmm, src: VXmm) -> &mut Self {
        self.insts.push(VirtInst::Move { dst, src });
        self
    }

    /// xorpd dst, src
    pub fn xorpd(&mut self, dst: VXmm, src: VXmm) -> &mut Self {
        self.insts.push(VirtInst::Xor { dst, src });
        self
    }

    /// addsd dst, src
    pub fn addsd(&mut self, dst: VXmm, src: VXmm) -> &mut Self {
        self.insts.push(VirtInst::Arith {
            op: FpOp::Add,
            dst,
            src,
        });
        self
    }

    /// subsd dst, src
    pub fn subsd(&mut self, dst: VXmm, src: VXmm) -> &mut Self {
        self.insts.push(VirtInst::Arith {
            op: FpOp::Sub,
            dst,
            src,
        });
        self
    }

    /// mulsd dst, src
    pub fn mulsd(&mut self, dst: VXmm, src: VXmm) -> &mut Self {
        self.insts.push(VirtInst::Arith {
            op: FpOp::Mul,
            dst,
            src,
        });
        self
    }

    /// divsd dst, src
    pub fn divsd(&mut self, dst: VXmm, src: VXmm) -> &mut Self {
        self.insts.push(VirtInst::Arith {
            op: FpOp::Div,
            dst,
            src,
        });
        self
    }

    /// Mark the virtual register holding the function's return value
    pub fn set_return(&mut self, value: VXmm) {
        self.ret = Some(value);
    }

    fn reads(inst: &VirtInst) -> Vec<VXmm> {
        match *inst {
            VirtInst::Load { .. } => vec![],
            VirtInst::Move { src, .. } => vec![src],
            // xorpd r, r defines r without reading it
            VirtInst::Xor { dst, src } if dst == src => vec![],
            VirtInst::Xor { dst, src } => vec![dst, src],
            VirtInst::Arith { dst, src, .. } => vec![dst, src],
        }
    }

    fn writes(inst: &VirtInst) -> VXmm {
        match *inst {
            VirtInst::Load { dst, .. }
            | VirtInst::Move { dst, .. }
            | VirtInst::Xor { dst, .. }
            | VirtInst::Arith { dst, .. } => dst,
        }
    }

    /// Live interval per virtual register: first definition to last use
    fn intervals(&self) -> CodeResult<Vec<Interval>> {
        let mut intervals = vec![Interval::default(); self.vreg_count as usize];
        for (i, inst) in self.insts.iter().enumerate() {
            for r in Self::reads(inst) {
                let iv = &mut intervals[r.0 as usize];
                if iv.def.is_none() {
                    return Err(CodeError::UndefinedVirtualRegister { id: r.0 });
                }
                iv.end = i;
            }
            let w = Self::writes(inst);
            let iv = &mut intervals[w.0 as usize];
            if iv.def.is_none() {
                iv.def = Some(i);
            }
            iv.end = i;
        }
        Ok(intervals)
    }

    /// Assign each live interval a physical register, or a stack slot
    /// when none is free at its definition point. Returns the location
    /// table and the number of slots used.
    fn allocate(&self, intervals: &[Interval]) -> (Vec<Option<Loc>>, u32) {
        // the pool must never hand out a register the function would
        // have to preserve
        debug_assert!(POOL.iter().all(|r| r.is_caller_saved()));

        let mut free: Vec<Xmm> = POOL.iter().rev().copied().collect();
        let mut active: Vec<(usize, VXmm)> = Vec::new();
        let mut locations: Vec<Option<Loc>> = vec![None; intervals.len()];
        let mut slots = 0u32;

        for i in 0..self.insts.len() {
            active.retain(|&(end, v)| {
                if end < i {
                    if let Some(Loc::Reg(r)) = locations[v.0 as usize] {
                        free.push(r);
                    }
                    false
                } else {
                    true
                }
            });

            let dst = Self::writes(&self.insts[i]);
            let iv = intervals[dst.0 as usize];
            if iv.def == Some(i) {
                if let Some(r) = free.pop() {
                    locations[dst.0 as usize] = Some(Loc::Reg(r));
                    active.push((iv.end, dst));
                } else {
                    locations[dst.0 as usize] = Some(Loc::Slot(slots));
                    slots += 1;
                    trace!("spill v{} to slot {}", dst.0, slots - 1);
                }
            }
        }

        (locations, slots)
    }

    /// Lower the recorded program into the holder's `.text` section,
    /// including prologue, epilogue and the final `ret`.
    pub fn finalize(self, code: &mut CodeHolder) -> CodeResult<()> {
        let ret = self.ret.ok_or(CodeError::MissingReturn)?;
        let intervals = self.intervals()?;
        if intervals[ret.0 as usize].def.is_none() {
            return Err(CodeError::UndefinedVirtualRegister { id: ret.0 });
        }

        // keep the return value live through the entire body
        let mut intervals = intervals;
        intervals[ret.0 as usize].end = self.insts.len();

        let (locations, slots) = self.allocate(&intervals);
        let frame = slots * 8;
        let slot_off = |slot: u32| slot * 8;
        let loc = |v: VXmm| locations[v.0 as usize].expect("allocated location");

        let mut asm = Assembler::new(code);
        if frame > 0 {
            asm.sub_rsp(frame);
        }

        for inst in &self.insts {
            match *inst {
                VirtInst::Load { dst, label } => match loc(dst) {
                    Loc::Reg(d) => {
                        asm.movq_load(d, label);
                    }
                    Loc::Slot(s) => {
                        asm.movq_load(SCRATCH_DST, label)
                            .movsd_store(slot_off(s), SCRATCH_DST);
                    }
                },
                VirtInst::Move { dst, src } => {
                    let s = Self::stage_src(&mut asm, loc(src), slot_off);
                    match loc(dst) {
                        Loc::Reg(d) => {
                            asm.movsd(d, s);
                        }
                        Loc::Slot(slot) => {
                            asm.movsd_store(slot_off(slot), s);
                        }
                    }
                }
                VirtInst::Xor { dst, src } if dst == src => match loc(dst) {
                    Loc::Reg(d) => {
                        asm.xorpd(d, d);
                    }
                    Loc::Slot(s) => {
                        asm.xorpd(SCRATCH_DST, SCRATCH_DST)
                            .movsd_store(slot_off(s), SCRATCH_DST);
                    }
                },
                VirtInst::Xor { dst, src } => {
                    let s = Self::stage_src(&mut asm, loc(src), slot_off);
                    let (d, writeback) = Self::stage_dst(&mut asm, loc(dst), slot_off);
                    asm.xorpd(d, s);
                    if let Some(slot) = writeback {
                        asm.movsd_store(slot_off(slot), d);
                    }
                }
                VirtInst::Arith { op, dst, src } => {
                    let s = Self::stage_src(&mut asm, loc(src), slot_off);
                    let (d, writeback) = Self::stage_dst(&mut asm, loc(dst), slot_off);
                    match op {
                        FpOp::Add => asm.addsd(d, s),
                        FpOp::Sub => asm.subsd(d, s),
                        FpOp::Mul => asm.mulsd(d, s),
                        FpOp::Div => asm.divsd(d, s),
                    };
                    if let Some(slot) = writeback {
                        asm.movsd_store(slot_off(slot), d);
                    }
                }
            }
        }

        match loc(ret) {
            Loc::Reg(r) if r == reg::XMM0 => {}
            Loc::Reg(r) => {
                asm.movsd(reg::XMM0, r);
            }
            Loc::Slot(s) => {
                asm.movsd_load(reg::XMM0, slot_off(s));
            }
        }
        if frame > 0 {
            asm.add_rsp(frame);
        }
        asm.ret();
        Ok(())
    }

    /// Bring a source operand into a readable register, staging
    /// slot-resident values through the source scratch register.
    fn stage_src(asm: &mut Assembler<'_>, loc: Loc, slot_off: impl Fn(u32) -> u32) -> Xmm {
        match loc {
            Loc::Reg(r) => r,
            Loc::Slot(s) => {
                asm.movsd_load(SCRATCH_SRC, slot_off(s));
                SCRATCH_SRC
            }
        }
    }

    /// Bring a read-write destination operand into a register, returning
    /// the slot to write back to when it was spilled.
    fn stage_dst(
        asm: &mut Assembler<'_>,
        loc: Loc,
        slot_off: impl Fn(u32) -> u32,
    ) -> (Xmm, Option<u32>) {
        match loc {
            Loc::Reg(r) => (r, None),
            Loc::Slot(s) => {
                asm.movsd_load(SCRATCH_DST, slot_off(s));
                (SCRATCH_DST, Some(s))
            }
        }
    }
}

impl Default for FuncCompiler {
    fn default() -> Self {
        Self::new()
    }
}
