/// Assembler interface for x86-64 scalar-double code generation
use super::code::{CodeHolder, Label, SectionKind};
use super::instruction::*;

/// Mnemonic-level assembler writing into a [`CodeHolder`]'s `.text`
/// section.
///
/// Operands are physical registers; there is no allocation or
/// verification beyond instruction encoding. Methods chain.
pub struct Assembler<'a> {
    code: &'a mut CodeHolder,
}

impl<'a> Assembler<'a> {
    /// Attach an assembler to a code holder, selecting `.text`
    pub fn new(code: &'a mut CodeHolder) -> Self {
        code.select(SectionKind::Text);
        Self { code }
    }

    /// Access the underlying code holder (label creation, data embedding)
    pub fn code(&mut self) -> &mut CodeHolder {
        self.code
    }

    /// MOVQ xmm, xmm
    pub fn movq(&mut self, dst: Xmm, src: Xmm) -> &mut Self {
        self.code.emit(encode_movq_xmm_xmm(dst, src));
        self
    }

    /// MOVQ xmm, [rip + label]
    pub fn movq_load(&mut self, dst: Xmm, label: Label) -> &mut Self {
        self.code.emit(encode_movq_load(dst, label));
        self
    }

    /// MOVQ r64, xmm
    pub fn movq_gpr_xmm(&mut self, dst: Gpr, src: Xmm) -> &mut Self {
        self.code.emit(encode_movq_gpr_xmm(dst, src));
        self
    }

    /// MOVQ xmm, r64
    pub fn movq_xmm_gpr(&mut self, dst: Xmm, src: Gpr) -> &mut Self {
        self.code.emit(encode_movq_xmm_gpr(dst, src));
        self
    }

    /// ADDSD xmm, xmm
    pub fn addsd(&mut self, dst: Xmm, src: Xmm) -> &mut Self {
        self.code.emit(encode_addsd(dst, src));
        self
    }

    /// SUBSD xmm, xmm
    pub fn subsd(&mut self, dst: Xmm, src: Xmm) -> &mut Self {
        self.code.emit(encode_subsd(dst, src));
        self
    }

    /// MULSD xmm, xmm
    pub fn mulsd(&mut self, dst: Xmm, src: Xmm) -> &mut Self {
        self.code.emit(encode_mulsd(dst, src));
        self
    }

    /// DIVSD xmm, xmm
    pub fn divsd(&mut self, dst: Xmm, src: Xmm) -> &mut Self {
        self.code.emit(encode_divsd(dst, src));
        self
    }

    /// MOVSD xmm, xmm
    pub fn movsd(&mut self, dst: Xmm, src: Xmm) -> &mut Self {
        self.code.emit(encode_movsd_xmm_xmm(dst, src));
        self
    }

    /// MOVSD xmm, [rsp + disp]
    pub fn movsd_load(&mut self, dst: Xmm, disp: u32) -> &mut Self {
        self.code.emit(encode_movsd_load_rsp(dst, disp));
        self
    }

    /// MOVSD [rsp + disp], xmm
    pub fn movsd_store(&mut self, disp: u32, src: Xmm) -> &mut Self {
        self.code.emit(encode_movsd_store_rsp(disp, src));
        self
    }

    /// XORPD xmm, xmm
    pub fn xorpd(&mut self, dst: Xmm, src: Xmm) -> &mut Self {
        self.code.emit(encode_xorpd(dst, src));
        self
    }

    /// PUSH r64
    pub fn push(&mut self, reg: Gpr) -> &mut Self {
        self.code.emit(encode_push(reg));
        self
    }

    /// POP r64
    pub fn pop(&mut self, reg: Gpr) -> &mut Self {
        self.code.emit(encode_pop(reg));
        self
    }

    /// SUB rsp, imm
    pub fn sub_rsp(&mut self, imm: u32) -> &mut Self {
        self.code.emit(encode_sub_rsp(imm));
        self
    }

    /// ADD rsp, imm
    pub fn add_rsp(&mut self, imm: u32) -> &mut Self {
        self.code.emit(encode_add_rsp(imm));
        self
    }

    /// RET
    pub fn ret(&mut self) -> &mut Self {
        self.code.emit(encode_ret());
        self
    }
}
