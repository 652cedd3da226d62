//! Formula parsing, evaluation and native compilation.
//!
//! [`parse`] turns a textual arithmetic formula into a [`Formula`] that
//! can be evaluated three ways: by walking the tree, or natively after
//! [`Formula::assemble`] (raw assembler, physical registers) or
//! [`Formula::compile`] (virtual registers with allocation). Both
//! backends produce numerically identical results; they differ only in
//! the machine code they emit.
//!
//! Variables can be rebound between evaluations with
//! [`Formula::set_value`]; `e` and `pi` are predefined. Native code
//! snapshots symbol values at emission time, so bindings changed after
//! `assemble`/`compile` are only picked up by emitting again.

mod assemble;
pub mod ast;
mod compile;
mod data;
pub mod parser;

use snafu::{ResultExt, Snafu};
use tracing::error;

use crate::common::jit::{CallableJitFunction, JitError};
use crate::x86_64::{Assembler, CodeError, CodeHolder, FuncCompiler};

pub use ast::{BinaryOp, Expr, SymbolTable, UnaryOp};
pub use data::DataTable;

type NativeFn = CallableJitFunction<fn() -> f64>;

#[derive(Debug, Snafu)]
enum EmitError {
    #[snafu(display("{source}"))]
    Layout { source: CodeError },

    #[snafu(display("{source}"))]
    Runtime { source: JitError },
}

/// Parse a formula, returning `None` (after logging one diagnostic) when
/// the text does not match the grammar or leaves a non-whitespace tail.
pub fn parse(text: &str) -> Option<Formula> {
    match parser::parse(text) {
        Ok(ast) => Some(Formula::new(ast)),
        Err(err) => {
            error!("Parse error: {err}");
            None
        }
    }
}

/// A parsed formula with its symbol table and, once emitted, a native
/// evaluation function.
///
/// Executable pages are owned per formula and released when it is
/// dropped or when a later emission replaces them.
pub struct Formula {
    ast: Expr,
    symbols: SymbolTable,
    function: Option<NativeFn>,
}

impl Formula {
    fn new(ast: Expr) -> Self {
        let mut symbols = SymbolTable::new();
        symbols.insert("e".to_owned(), 1.0f64.exp());
        symbols.insert("pi".to_owned(), 0.0f64.atan2(-1.0));
        Self {
            ast,
            symbols,
            function: None,
        }
    }

    /// Create or overwrite a variable binding
    pub fn set_value(&mut self, name: &str, value: f64) {
        self.symbols.insert(name.to_owned(), value);
    }

    /// Evaluate the formula: through the native function when one has
    /// been emitted, otherwise by walking the tree.
    pub fn evaluate(&self) -> f64 {
        match &self.function {
            Some(function) => function.call(),
            None => self.ast.evaluate(&self.symbols),
        }
    }

    /// Emit native code with the raw assembler backend and cache the
    /// resulting function. Returns `false` (after logging one
    /// diagnostic) if emission fails; the previously cached function, if
    /// any, is left in place in that case.
    pub fn assemble(&mut self) -> bool {
        match self.assemble_impl() {
            Ok(function) => {
                self.function = Some(function);
                true
            }
            Err(err) => {
                error!("Failed to assemble formula: {err}");
                false
            }
        }
    }

    /// Emit native code with the register-allocating compiler backend
    /// and cache the resulting function. Failure behaves as in
    /// [`Formula::assemble`].
    pub fn compile(&mut self) -> bool {
        match self.compile_impl() {
            Ok(function) => {
                self.function = Some(function);
                true
            }
            Err(err) => {
                error!("Failed to compile formula: {err}");
                false
            }
        }
    }

    fn assemble_impl(&self) -> Result<NativeFn, EmitError> {
        let mut code = CodeHolder::new();
        let mut data = DataTable::new();
        let mut asm = Assembler::new(&mut code);
        assemble::emit(&self.ast, &mut asm, &self.symbols, &mut data);
        asm.ret();
        data.drain(&mut code, &self.symbols).context(LayoutSnafu)?;
        let image = code.finalize().context(LayoutSnafu)?;
        CallableJitFunction::new(&image).context(RuntimeSnafu)
    }

    fn compile_impl(&self) -> Result<NativeFn, EmitError> {
        let mut code = CodeHolder::new();
        let mut data = DataTable::new();
        let mut cc = FuncCompiler::new();
        let result = cc.new_xmm();
        compile::emit(
            &self.ast,
            &mut cc,
            &mut code,
            &self.symbols,
            &mut data,
            result,
        );
        cc.set_return(result);
        cc.finalize(&mut code).context(LayoutSnafu)?;
        data.drain(&mut code, &self.symbols).context(LayoutSnafu)?;
        let image = code.finalize().context(LayoutSnafu)?;
        CallableJitFunction::new(&image).context(RuntimeSnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_grammar() {
        for text in [
            "1", "z2", "(z)", "1+2", "1-2", "1*2", "1/2", "1*2+4", "1*(2+4)", "-(1)", "+(1)",
            "--1", "1+1+1", "6.02e23/2", "a*a + b*b",
        ] {
            assert!(parse(text).is_some(), "{text:?} should parse");
        }
    }

    #[test]
    fn rejects_invalid_input() {
        for text in ["1a", "_a", "1+", "(1", "1 2"] {
            assert!(parse(text).is_none(), "{text:?} should be rejected");
        }
    }

    #[test]
    fn evaluates_constants() {
        assert_eq!(parse("1").unwrap().evaluate(), 1.0);
        assert_eq!(parse("2").unwrap().evaluate(), 2.0);
    }

    #[test]
    fn evaluates_double_negation() {
        assert_eq!(parse("--1").unwrap().evaluate(), 1.0);
    }

    #[test]
    fn evaluates_with_precedence() {
        assert_eq!(parse("1+3*2").unwrap().evaluate(), 7.0);
        assert_eq!(parse("3*2+1").unwrap().evaluate(), 7.0);
    }

    #[test]
    fn evaluates_chains() {
        assert_eq!(parse("1+1+1").unwrap().evaluate(), 3.0);
        assert_eq!(parse("2*2*2").unwrap().evaluate(), 8.0);
    }

    #[test]
    fn predefined_constants() {
        let formula = parse("2*pi").unwrap();
        assert!((formula.evaluate() - 6.28318).abs() < 1e-5);
        let formula = parse("e").unwrap();
        assert!((formula.evaluate() - 1.0f64.exp()).abs() < 1e-12);
    }

    #[test]
    fn unbound_identifier_defaults_to_zero() {
        assert_eq!(parse("q+1").unwrap().evaluate(), 1.0);
    }

    #[test]
    fn set_value_before_evaluate() {
        let mut formula = parse("a*a + b*b").unwrap();
        formula.set_value("a", 2.0);
        formula.set_value("b", 3.0);
        assert_eq!(formula.evaluate(), 13.0);
    }

    #[test]
    fn predefined_constants_can_be_rebound() {
        let mut formula = parse("pi").unwrap();
        formula.set_value("pi", 3.0);
        assert_eq!(formula.evaluate(), 3.0);
    }

    #[test]
    fn assemble_reports_success() {
        let mut formula = parse("1+2*3").unwrap();
        assert!(formula.assemble());
    }

    #[test]
    fn compile_reports_success() {
        let mut formula = parse("1+2*3").unwrap();
        assert!(formula.compile());
    }

    /// Right-nested sum `1+(2+(3+...))` deep enough to exhaust the
    /// physical register file in the compiler backend.
    fn deeply_nested_sum(depth: u32) -> (String, f64) {
        let mut text = String::new();
        for i in 1..depth {
            text.push_str(&format!("{i}+("));
        }
        text.push_str(&depth.to_string());
        text.push_str(&")".repeat(depth as usize - 1));
        let expected = (1..=depth).sum::<u32>() as f64;
        (text, expected)
    }

    #[test]
    fn compile_succeeds_past_register_file_capacity() {
        let (text, _) = deeply_nested_sum(24);
        let mut formula = parse(&text).unwrap();
        assert!(formula.compile());
    }

    #[cfg(target_arch = "x86_64")]
    mod native {
        use super::*;

        #[test]
        fn assembled_constant_matches_interpreter() {
            for text in ["1", "2", "--1", "1+3*2", "1.1+2.2*3.3+4.4"] {
                let interpreted = parse(text).unwrap().evaluate();
                let mut formula = parse(text).unwrap();
                assert!(formula.assemble(), "assemble {text:?}");
                assert_eq!(
                    formula.evaluate().to_bits(),
                    interpreted.to_bits(),
                    "assembled {text:?}"
                );
            }
        }

        #[test]
        fn compiled_constant_matches_interpreter() {
            for text in ["1", "2", "--1", "1+3*2", "1.1+2.2*3.3+4.4"] {
                let interpreted = parse(text).unwrap().evaluate();
                let mut formula = parse(text).unwrap();
                assert!(formula.compile(), "compile {text:?}");
                assert_eq!(
                    formula.evaluate().to_bits(),
                    interpreted.to_bits(),
                    "compiled {text:?}"
                );
            }
        }

        #[test]
        fn assembled_scientific_division() {
            let mut formula = parse("6.02e23/2").unwrap();
            assert!(formula.assemble());
            let value = formula.evaluate();
            assert!((value - 3.01e23).abs() / 3.01e23 < 1e-6);
        }

        #[test]
        fn compiled_mixed_precedence() {
            let mut formula = parse("1.1+2.2*3.3+4.4").unwrap();
            assert!(formula.compile());
            assert!((formula.evaluate() - 12.76).abs() < 1e-6);
        }

        #[test]
        fn assembled_identifier_snapshot() {
            let mut formula = parse("e").unwrap();
            assert!(formula.assemble());
            assert!((formula.evaluate() - 1.0f64.exp()).abs() < 1e-6);
        }

        #[test]
        fn assembled_division_by_zero_is_infinite() {
            let mut formula = parse("1/0").unwrap();
            assert!(formula.assemble());
            assert_eq!(formula.evaluate(), f64::INFINITY);
        }

        #[test]
        fn unbound_symbol_stays_zero_after_assemble() {
            let mut formula = parse("q").unwrap();
            assert!(formula.assemble());
            assert_eq!(formula.evaluate(), 0.0);
        }

        #[test]
        fn rebind_after_assemble_is_stale_until_reassembled() {
            let mut formula = parse("x+1").unwrap();
            formula.set_value("x", 2.0);
            assert!(formula.assemble());
            assert_eq!(formula.evaluate(), 3.0);

            // emitted code snapshotted x=2
            formula.set_value("x", 10.0);
            assert_eq!(formula.evaluate(), 3.0);

            // re-emitting picks up the new binding
            assert!(formula.assemble());
            assert_eq!(formula.evaluate(), 11.0);
        }

        #[test]
        fn rebind_after_compile_is_stale_until_recompiled() {
            let mut formula = parse("x+1").unwrap();
            formula.set_value("x", 2.0);
            assert!(formula.compile());
            assert_eq!(formula.evaluate(), 3.0);

            formula.set_value("x", 10.0);
            assert_eq!(formula.evaluate(), 3.0);

            assert!(formula.compile());
            assert_eq!(formula.evaluate(), 11.0);
        }

        #[test]
        fn division_by_computed_zero_agrees() {
            let mut formula = parse("1/(0-0.0)").unwrap();
            let interpreted = formula.evaluate();
            assert!(formula.assemble());
            assert_eq!(formula.evaluate().to_bits(), interpreted.to_bits());
        }

        #[test]
        fn backends_agree_on_a_formula_mix() {
            let cases = [
                "2*pi",
                "e*e",
                "-(1+2)*3",
                "10/4",
                "1/3 + 1/3 + 1/3",
                "2e3 - .5",
                "-+-1",
            ];
            for text in cases {
                let interpreted = parse(text).unwrap().evaluate();
                let mut assembled = parse(text).unwrap();
                assert!(assembled.assemble(), "assemble {text:?}");
                let mut compiled = parse(text).unwrap();
                assert!(compiled.compile(), "compile {text:?}");
                assert_eq!(
                    assembled.evaluate().to_bits(),
                    interpreted.to_bits(),
                    "assembler vs interpreter on {text:?}"
                );
                assert_eq!(
                    compiled.evaluate().to_bits(),
                    interpreted.to_bits(),
                    "compiler vs interpreter on {text:?}"
                );
            }
        }

        #[test]
        fn compiled_spill_heavy_formula_is_correct() {
            let (text, expected) = deeply_nested_sum(24);
            let mut formula = parse(&text).unwrap();
            assert!(formula.compile());
            assert_eq!(formula.evaluate(), expected);
        }

        #[test]
        fn assembled_spill_heavy_formula_is_correct() {
            let (text, expected) = deeply_nested_sum(24);
            let mut formula = parse(&text).unwrap();
            assert!(formula.assemble());
            assert_eq!(formula.evaluate(), expected);
        }
    }
}
