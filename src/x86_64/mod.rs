//! x86-64 code generation support.
//!
//! This module provides x86-64 instruction encoding for the scalar
//! double-precision subset (SSE2) together with the machinery needed to
//! turn emitted instructions into a callable flat image:
//!
//! - **Instruction encoding**: MOVQ/MOVSD/ADDSD/SUBSD/MULSD/DIVSD/XORPD,
//!   stack PUSH/POP and RSP adjustment, RET
//! - **Code holder**: `.text` and `.data` sections with late-bound labels
//!   and RIP-relative displacement resolution
//! - **Assembler**: mnemonic-level builder over physical registers
//! - **Function compiler**: virtual XMM registers with live-interval
//!   register allocation and stack-slot spilling
//!
//! ## Register conventions (System-V AMD64)
//!
//! - **RAX, RCX, RDX, RSI, RDI, R8-R11**: caller-saved
//! - **RBX, RBP, R12-R15**: callee-saved
//! - **RSP**: stack pointer
//! - **XMM0-XMM15**: caller-saved; XMM0 returns doubles
//!
//! Generated functions are leaves (no calls), so only `rsp` discipline
//! and the return register matter.

pub mod builder;
pub mod code;
pub mod compiler;
pub mod instruction;


// Re-export commonly used items
pub use builder::Assembler;
pub use code::{CodeError, CodeHolder, CodeResult, Label, SectionKind};
pub use compiler::{FpOp, FuncCompiler, VXmm};
pub use instruction::{reg, Gpr, Instruction, Xmm};
