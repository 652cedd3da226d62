//! Compiler backend: lowering onto virtual registers.
//!
//! Semantically identical to the assembler backend, but every node
//! writes into a virtual XMM register chosen by its parent and the
//! [`FuncCompiler`] maps the unbounded virtual file onto physical
//! registers afterwards.

use crate::x86_64::{CodeHolder, FuncCompiler, VXmm};

use super::ast::{BinaryOp, Expr, SymbolTable, UnaryOp};
use super::data::DataTable;

/// Record code leaving the value of `node` in the virtual register
/// `result`.
pub fn emit(
    node: &Expr,
    cc: &mut FuncCompiler,
    code: &mut CodeHolder,
    symbols: &SymbolTable,
    data: &mut DataTable,
    result: VXmm,
) {
    match node {
        Expr::Number(value) => {
            let label = data.constant(code, *value);
            cc.movq_load(result, label);
        }
        Expr::Identifier(name) => {
            let label = if symbols.contains_key(name) {
                data.symbol(code, name)
            } else {
                data.constant(code, 0.0)
            };
            cc.movq_load(result, label);
        }
        Expr::Unary(UnaryOp::Plus, operand) => {
            emit(operand, cc, code, symbols, data, result);
        }
        Expr::Unary(UnaryOp::Minus, operand) => {
            let value = cc.new_xmm();
            emit(operand, cc, code, symbols, data, value);
            let tmp = cc.new_xmm();
            cc.xorpd(tmp, tmp) // tmp = 0.0
                .subsd(tmp, value) // tmp = 0.0 - value
                .movsd(result, tmp);
        }
        Expr::Binary(left, op, right) => {
            emit(left, cc, code, symbols, data, result);
            let rhs = cc.new_xmm();
            emit(right, cc, code, symbols, data, rhs);
            match op {
                BinaryOp::Add => cc.addsd(result, rhs),
                BinaryOp::Sub => cc.subsd(result, rhs),
                BinaryOp::Mul => cc.mulsd(result, rhs),
                BinaryOp::Div => cc.divsd(result, rhs),
            };
        }
    }
}
