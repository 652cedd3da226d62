//! # Formula JIT
//!
//! Parse arithmetic formulas over real-valued variables and evaluate
//! them three ways: tree-walking interpretation, native x86-64 code from
//! a raw assembler, or native code from a register-allocating compiler.
//!
//! ## Features
//!
//! - **Operator-precedence grammar**: `+ - * /`, unary prefix signs,
//!   parentheses, scientific number literals
//! - **Rebindable variables**: `e` and `pi` predefined, anything else
//!   settable with [`Formula::set_value`]
//! - **Two emission strategies**: a linear assembler over physical
//!   registers with a machine-stack spill discipline, and a virtual
//!   register compiler with live-interval allocation
//! - **Self-contained images**: numeric literals and symbol snapshots
//!   live in a `.data` section reached by RIP-relative loads
//!
//! ## Usage
//!
//! ```rust
//! let mut formula = formula_jit::parse("a*a + b*b").expect("valid formula");
//! formula.set_value("a", 2.0);
//! formula.set_value("b", 3.0);
//! assert_eq!(formula.evaluate(), 13.0);
//!
//! // On x86-64 hosts the same formula can be run natively:
//! // formula.assemble();   // or formula.compile();
//! // assert_eq!(formula.evaluate(), 13.0);
//! ```
//!
//! Native emission targets the System-V AMD64 convention; the generated
//! function takes no parameters and returns its double in `xmm0`.
//! Symbol values are snapshotted into the code image at emission time,
//! so rebinding after `assemble`/`compile` requires emitting again.

// Common types and traits shared by the emission layer
pub mod common;

// x86-64 encoding, code holder, assembler and compiler
pub mod x86_64;

// Parsing, evaluation and the formula façade
pub mod formula;

// Re-export the public entry points
pub use formula::{parse, Formula};
