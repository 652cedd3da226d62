/// x86-64 instruction formats and encoding
use core::fmt;

use crate::common::{AbiClass, Instruction as InstructionTrait, Register as RegisterTrait};

use super::code::Label;

/// x86-64 general-purpose register (RAX..R15)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Gpr(pub u8);

impl Gpr {
    pub const fn new(reg: u8) -> Self {
        Self(reg)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl RegisterTrait for Gpr {
    fn id(&self) -> u32 {
        self.0 as u32
    }

    fn abi_class(&self) -> AbiClass {
        // System-V AMD64 calling convention
        match self.0 {
            0..=2 => AbiClass::CallerSaved,  // RAX, RCX, RDX
            3 => AbiClass::CalleeSaved,      // RBX
            4 => AbiClass::Special,          // RSP
            5 => AbiClass::CalleeSaved,      // RBP
            6..=11 => AbiClass::CallerSaved, // RSI, RDI, R8-R11
            12..=15 => AbiClass::CalleeSaved, // R12-R15
            _ => AbiClass::Special,
        }
    }
}

/// x86-64 SSE register (XMM0..XMM15), used here in its low 64 bits only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Xmm(pub u8);

impl Xmm {
    pub const fn new(reg: u8) -> Self {
        Self(reg)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl RegisterTrait for Xmm {
    fn id(&self) -> u32 {
        self.0 as u32
    }

    fn abi_class(&self) -> AbiClass {
        // All XMM registers are volatile under System-V AMD64
        AbiClass::CallerSaved
    }
}

/// Architectural upper bound on x86-64 instruction length
pub const MAX_INSTRUCTION_LEN: usize = 15;

/// A single encoded x86-64 instruction.
///
/// Instructions are variable-length; the bytes are stored inline. An
/// instruction that references memory RIP-relatively carries a [`Fixup`]
/// naming the label whose final address must be patched into its 32-bit
/// displacement field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    bytes: [u8; MAX_INSTRUCTION_LEN],
    len: u8,
    fixup: Option<Fixup>,
}

/// A pending 32-bit displacement patch inside an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixup {
    /// Byte offset of the disp32 field within the instruction
    pub offset: u8,
    /// Label whose resolved address the displacement must reach
    pub label: Label,
}

impl Instruction {
    fn from_bytes(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() <= MAX_INSTRUCTION_LEN);
        let mut buf = [0u8; MAX_INSTRUCTION_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Self {
            bytes: buf,
            len: bytes.len() as u8,
            fixup: None,
        }
    }

    fn with_fixup(mut self, label: Label) -> Self {
        // disp32 is always the trailing field in the forms emitted here
        self.fixup = Some(Fixup {
            offset: self.len - 4,
            label,
        });
        self
    }

    /// The encoded bytes of this instruction
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// The pending displacement patch, if any
    pub fn fixup(&self) -> Option<Fixup> {
        self.fixup
    }
}

impl InstructionTrait for Instruction {
    fn bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn size(&self) -> usize {
        self.len as usize
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.as_bytes().iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

fn modrm(md: u8, reg: u8, rm: u8) -> u8 {
    (md << 6) | ((reg & 0b111) << 3) | (rm & 0b111)
}

/// REX prefix extending the ModRM reg and rm fields, omitted when both
/// registers are in the low bank
fn rex_rb(reg: u8, rm: u8) -> Option<u8> {
    let rex = 0x40 | ((reg >> 3) << 2) | (rm >> 3);
    (rex != 0x40).then_some(rex)
}

/// REX.W prefix for 64-bit operand size, with reg/rm extension bits
fn rex_w_rb(reg: u8, rm: u8) -> u8 {
    0x48 | ((reg >> 3) << 2) | (rm >> 3)
}

/// Encode a two-operand SSE instruction in register-register form.
///
/// `prefix` is the mandatory prefix (66/F2/F3), `opcode` the byte after
/// the 0F escape. The destination goes in ModRM.reg, the source in
/// ModRM.rm, matching the `op xmm1, xmm2` reading of the manuals.
pub fn encode_sse_rr(prefix: u8, opcode: u8, dst: Xmm, src: Xmm) -> Instruction {
    let mut bytes = [0u8; 5];
    let mut n = 0;
    bytes[n] = prefix;
    n += 1;
    if let Some(rex) = rex_rb(dst.value(), src.value()) {
        bytes[n] = rex;
        n += 1;
    }
    bytes[n] = 0x0F;
    bytes[n + 1] = opcode;
    bytes[n + 2] = modrm(0b11, dst.value(), src.value());
    Instruction::from_bytes(&bytes[..n + 3])
}

/// MOVQ xmm, xmm (F3 0F 7E /r, register form)
pub fn encode_movq_xmm_xmm(dst: Xmm, src: Xmm) -> Instruction {
    encode_sse_rr(0xF3, 0x7E, dst, src)
}

/// MOVQ xmm, [rip + label] (F3 0F 7E /r, RIP-relative form)
///
/// The 32-bit displacement is emitted as zero and patched at layout time
/// through the attached fixup.
pub fn encode_movq_load(dst: Xmm, label: Label) -> Instruction {
    let mut bytes = [0u8; 9];
    let mut n = 0;
    bytes[n] = 0xF3;
    n += 1;
    if let Some(rex) = rex_rb(dst.value(), 0) {
        bytes[n] = rex;
        n += 1;
    }
    bytes[n] = 0x0F;
    bytes[n + 1] = 0x7E;
    bytes[n + 2] = modrm(0b00, dst.value(), 0b101);
    n += 3;
    // four zero displacement bytes
    Instruction::from_bytes(&bytes[..n + 4]).with_fixup(label)
}

/// MOVQ r64, xmm (66 REX.W 0F 7E /r)
pub fn encode_movq_gpr_xmm(dst: Gpr, src: Xmm) -> Instruction {
    Instruction::from_bytes(&[
        0x66,
        rex_w_rb(src.value(), dst.value()),
        0x0F,
        0x7E,
        modrm(0b11, src.value(), dst.value()),
    ])
}

/// MOVQ xmm, r64 (66 REX.W 0F 6E /r)
pub fn encode_movq_xmm_gpr(dst: Xmm, src: Gpr) -> Instruction {
    Instruction::from_bytes(&[
        0x66,
        rex_w_rb(dst.value(), src.value()),
        0x0F,
        0x6E,
        modrm(0b11, dst.value(), src.value()),
    ])
}

/// ADDSD xmm, xmm (F2 0F 58 /r)
pub fn encode_addsd(dst: Xmm, src: Xmm) -> Instruction {
    encode_sse_rr(0xF2, 0x58, dst, src)
}

/// SUBSD xmm, xmm (F2 0F 5C /r)
pub fn encode_subsd(dst: Xmm, src: Xmm) -> Instruction {
    encode_sse_rr(0xF2, 0x5C, dst, src)
}

/// MULSD xmm, xmm (F2 0F 59 /r)
pub fn encode_mulsd(dst: Xmm, src: Xmm) -> Instruction {
    encode_sse_rr(0xF2, 0x59, dst, src)
}

/// DIVSD xmm, xmm (F2 0F 5E /r)
pub fn encode_divsd(dst: Xmm, src: Xmm) -> Instruction {
    encode_sse_rr(0xF2, 0x5E, dst, src)
}

/// MOVSD xmm, xmm (F2 0F 10 /r, register form)
pub fn encode_movsd_xmm_xmm(dst: Xmm, src: Xmm) -> Instruction {
    encode_sse_rr(0xF2, 0x10, dst, src)
}

/// XORPD xmm, xmm (66 0F 57 /r)
pub fn encode_xorpd(dst: Xmm, src: Xmm) -> Instruction {
    encode_sse_rr(0x66, 0x57, dst, src)
}

/// Encode an RSP-relative memory operand: ModRM + SIB + displacement
fn rsp_mem_operand(bytes: &mut [u8], n: usize, reg: u8, disp: u32) -> usize {
    const SIB_RSP: u8 = 0x24; // scale=1, no index, base=RSP
    if disp <= i8::MAX as u32 {
        bytes[n] = modrm(0b01, reg, 0b100);
        bytes[n + 1] = SIB_RSP;
        bytes[n + 2] = disp as u8;
        n + 3
    } else {
        bytes[n] = modrm(0b10, reg, 0b100);
        bytes[n + 1] = SIB_RSP;
        bytes[n + 2..n + 6].copy_from_slice(&disp.to_le_bytes());
        n + 6
    }
}

/// MOVSD xmm, [rsp + disp] (F2 0F 10 /r)
pub fn encode_movsd_load_rsp(dst: Xmm, disp: u32) -> Instruction {
    let mut bytes = [0u8; 10];
    let mut n = 0;
    bytes[n] = 0xF2;
    n += 1;
    if let Some(rex) = rex_rb(dst.value(), 0) {
        bytes[n] = rex;
        n += 1;
    }
    bytes[n] = 0x0F;
    bytes[n + 1] = 0x10;
    n += 2;
    let end = rsp_mem_operand(&mut bytes, n, dst.value(), disp);
    Instruction::from_bytes(&bytes[..end])
}

/// MOVSD [rsp + disp], xmm (F2 0F 11 /r)
pub fn encode_movsd_store_rsp(disp: u32, src: Xmm) -> Instruction {
    let mut bytes = [0u8; 10];
    let mut n = 0;
    bytes[n] = 0xF2;
    n += 1;
    if let Some(rex) = rex_rb(src.value(), 0) {
        bytes[n] = rex;
        n += 1;
    }
    bytes[n] = 0x0F;
    bytes[n + 1] = 0x11;
    n += 2;
    let end = rsp_mem_operand(&mut bytes, n, src.value(), disp);
    Instruction::from_bytes(&bytes[..end])
}

/// PUSH r64 (50 +rd)
pub fn encode_push(reg: Gpr) -> Instruction {
    if reg.value() >= 8 {
        Instruction::from_bytes(&[0x41, 0x50 | (reg.value() & 0b111)])
    } else {
        Instruction::from_bytes(&[0x50 | reg.value()])
    }
}

/// POP r64 (58 +rd)
pub fn encode_pop(reg: Gpr) -> Instruction {
    if reg.value() >= 8 {
        Instruction::from_bytes(&[0x41, 0x58 | (reg.value() & 0b111)])
    } else {
        Instruction::from_bytes(&[0x58 | reg.value()])
    }
}

/// SUB rsp, imm (REX.W 83 /5 ib or REX.W 81 /5 id)
pub fn encode_sub_rsp(imm: u32) -> Instruction {
    if imm <= i8::MAX as u32 {
        Instruction::from_bytes(&[0x48, 0x83, 0xEC, imm as u8])
    } else {
        let mut bytes = [0x48, 0x81, 0xEC, 0, 0, 0, 0];
        bytes[3..].copy_from_slice(&imm.to_le_bytes());
        Instruction::from_bytes(&bytes)
    }
}

/// ADD rsp, imm (REX.W 83 /0 ib or REX.W 81 /0 id)
pub fn encode_add_rsp(imm: u32) -> Instruction {
    if imm <= i8::MAX as u32 {
        Instruction::from_bytes(&[0x48, 0x83, 0xC4, imm as u8])
    } else {
        let mut bytes = [0x48, 0x81, 0xC4, 0, 0, 0, 0];
        bytes[3..].copy_from_slice(&imm.to_le_bytes());
        Instruction::from_bytes(&bytes)
    }
}

/// RET (C3)
pub fn encode_ret() -> Instruction {
    Instruction::from_bytes(&[0xC3])
}

/// Common registers
pub mod reg {
    use super::{Gpr, Xmm};

    pub const RAX: Gpr = Gpr::new(0);
    pub const RCX: Gpr = Gpr::new(1);
    pub const RDX: Gpr = Gpr::new(2);
    pub const RBX: Gpr = Gpr::new(3);
    pub const RSP: Gpr = Gpr::new(4);
    pub const RBP: Gpr = Gpr::new(5);
    pub const RSI: Gpr = Gpr::new(6);
    pub const RDI: Gpr = Gpr::new(7);
    pub const R8: Gpr = Gpr::new(8);
    pub const R9: Gpr = Gpr::new(9);
    pub const R10: Gpr = Gpr::new(10);
    pub const R11: Gpr = Gpr::new(11);
    pub const R12: Gpr = Gpr::new(12);
    pub const R13: Gpr = Gpr::new(13);
    pub const R14: Gpr = Gpr::new(14);
    pub const R15: Gpr = Gpr::new(15);

    pub const XMM0: Xmm = Xmm::new(0);
    pub const XMM1: Xmm = Xmm::new(1);
    pub const XMM2: Xmm = Xmm::new(2);
    pub const XMM3: Xmm = Xmm::new(3);
    pub const XMM4: Xmm = Xmm::new(4);
    pub const XMM5: Xmm = Xmm::new(5);
    pub const XMM6: Xmm = Xmm::new(6);
    pub const XMM7: Xmm = Xmm::new(7);
    pub const XMM8: Xmm = Xmm::new(8);
    pub const XMM9: Xmm = Xmm::new(9);
    pub const XMM10: Xmm = Xmm::new(10);
    pub const XMM11: Xmm = Xmm::new(11);
    pub const XMM12: Xmm = Xmm::new(12);
    pub const XMM13: Xmm = Xmm::new(13);
    pub const XMM14: Xmm = Xmm::new(14);
    pub const XMM15: Xmm = Xmm::new(15);
}
