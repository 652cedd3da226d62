//! Assembler backend: one-pass linear lowering onto physical registers.
//!
//! Uses only `xmm0`, `xmm1` and `rax`. Every node leaves its value in
//! `xmm0`; binary nodes park the left operand on the machine stack while
//! the right side evaluates. No register allocation, guaranteed-correct
//! spill discipline.

use crate::x86_64::{reg, Assembler};

use super::ast::{BinaryOp, Expr, SymbolTable, UnaryOp};
use super::data::DataTable;

/// Emit code leaving the value of `node` in `xmm0`.
pub fn emit(node: &Expr, asm: &mut Assembler<'_>, symbols: &SymbolTable, data: &mut DataTable) {
    match node {
        Expr::Number(value) => {
            let label = data.constant(asm.code(), *value);
            asm.movq_load(reg::XMM0, label);
        }
        Expr::Identifier(name) => {
            // unbound names read the shared 0.0 constant slot
            let label = if symbols.contains_key(name) {
                data.symbol(asm.code(), name)
            } else {
                data.constant(asm.code(), 0.0)
            };
            asm.movq_load(reg::XMM0, label);
        }
        Expr::Unary(UnaryOp::Plus, operand) => {
            emit(operand, asm, symbols, data);
        }
        Expr::Unary(UnaryOp::Minus, operand) => {
            emit(operand, asm, symbols, data);
            asm.xorpd(reg::XMM1, reg::XMM1) // xmm1 = 0.0
                .subsd(reg::XMM1, reg::XMM0) // xmm1 = 0.0 - xmm0
                .movsd(reg::XMM0, reg::XMM1);
        }
        Expr::Binary(left, op, right) => {
            emit(left, asm, symbols, data);
            asm.movq_gpr_xmm(reg::RAX, reg::XMM0) // save left operand
                .push(reg::RAX);
            emit(right, asm, symbols, data);
            asm.movq(reg::XMM1, reg::XMM0) // right operand to xmm1
                .pop(reg::RAX)
                .movq_xmm_gpr(reg::XMM0, reg::RAX); // left operand back to xmm0
            match op {
                BinaryOp::Add => asm.addsd(reg::XMM0, reg::XMM1),
                BinaryOp::Sub => asm.subsd(reg::XMM0, reg::XMM1),
                BinaryOp::Mul => asm.mulsd(reg::XMM0, reg::XMM1),
                BinaryOp::Div => asm.divsd(reg::XMM0, reg::XMM1),
            };
        }
    }
}
