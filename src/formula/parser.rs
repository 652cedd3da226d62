//! Formula grammar.
//!
//! Recursive-descent combinators with three precedence levels:
//!
//! ```text
//! expr   = term   (('+'|'-') term)*
//! term   = factor (('*'|'/') factor)*
//! factor = NUMBER | IDENT | '(' expr ')' | ('+'|'-') factor
//! ```
//!
//! Operator chains fold to the left, so `1+2+3` builds `(1+2)+3`; the
//! unary prefix is right-recursive. Numbers carry no sign of their own,
//! a leading `-` or `+` is always the grammatical prefix operator.
//!
//! Each token parser consumes trailing whitespace, leaving the input at
//! the start of the next token.

use winnow::ascii;
use winnow::combinator;
use winnow::error::{ContextError, ErrMode, ParseError};
use winnow::token;
use winnow::Parser;

use super::ast::{BinaryOp, Expr, UnaryOp};

fn ws<'a>(input: &mut &'a str) -> Result<&'a str, ErrMode<ContextError>> {
    token::take_while(0.., (' ', '\t', '\n', '\r')).parse_next(input)
}

fn lexeme<'a, F, O>(inner: F) -> impl Parser<&'a str, O, ErrMode<ContextError>>
where
    F: Parser<&'a str, O, ErrMode<ContextError>>,
{
    combinator::terminated(inner, ws)
}

/// An unsigned double in the usual scientific form, maximal munch
fn number<'a>(input: &mut &'a str) -> Result<f64, ErrMode<ContextError>> {
    lexeme(
        Parser::take((
            combinator::alt((
                (ascii::digit1, combinator::opt(('.', ascii::digit0))).void(),
                ('.', ascii::digit1).void(),
            )),
            combinator::opt((
                token::one_of(('e', 'E')),
                combinator::opt(token::one_of(('+', '-'))),
                ascii::digit1,
            )),
        ))
        .try_map(str::parse),
    )
    .parse_next(input)
}

/// An ASCII letter followed by letters, digits and underscores
fn identifier<'a>(input: &mut &'a str) -> Result<String, ErrMode<ContextError>> {
    lexeme(
        Parser::take((
            token::one_of(('a'..='z', 'A'..='Z')),
            token::take_while(0.., ('a'..='z', 'A'..='Z', '0'..='9', '_')),
        ))
        .map(str::to_owned),
    )
    .parse_next(input)
}

fn unary_op(op: char) -> UnaryOp {
    match op {
        '+' => UnaryOp::Plus,
        '-' => UnaryOp::Minus,
        _ => unreachable!("prefix operator '{op}' outside the grammar"),
    }
}

fn binary_op(op: char) -> BinaryOp {
    match op {
        '+' => BinaryOp::Add,
        '-' => BinaryOp::Sub,
        '*' => BinaryOp::Mul,
        '/' => BinaryOp::Div,
        _ => unreachable!("infix operator '{op}' outside the grammar"),
    }
}

fn fold_binary(first: Expr, rest: Vec<(char, Expr)>) -> Expr {
    rest.into_iter().fold(first, |left, (op, right)| {
        Expr::Binary(Box::new(left), binary_op(op), Box::new(right))
    })
}

fn unary<'a>(input: &mut &'a str) -> Result<Expr, ErrMode<ContextError>> {
    (lexeme(combinator::alt(('+', '-'))), factor)
        .map(|(op, operand)| Expr::Unary(unary_op(op), Box::new(operand)))
        .parse_next(input)
}

fn factor<'a>(input: &mut &'a str) -> Result<Expr, ErrMode<ContextError>> {
    combinator::alt((
        number.map(Expr::Number),
        identifier.map(Expr::Identifier),
        combinator::delimited(lexeme('('), expr, lexeme(')')),
        unary,
    ))
    .parse_next(input)
}

fn term<'a>(input: &mut &'a str) -> Result<Expr, ErrMode<ContextError>> {
    (
        factor,
        combinator::repeat(0.., (lexeme(combinator::alt(('*', '/'))), factor)),
    )
        .map(|(first, rest)| fold_binary(first, rest))
        .parse_next(input)
}

fn expr<'a>(input: &mut &'a str) -> Result<Expr, ErrMode<ContextError>> {
    (
        term,
        combinator::repeat(0.., (lexeme(combinator::alt(('+', '-'))), term)),
    )
        .map(|(first, rest)| fold_binary(first, rest))
        .parse_next(input)
}

/// Parse a complete formula, leading and trailing whitespace allowed.
///
/// Fails if any non-whitespace input remains after the expression.
pub fn parse(text: &str) -> Result<Expr, ParseError<&str, ContextError>> {
    combinator::preceded(ws, expr).parse(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: f64) -> Expr {
        Expr::Number(v)
    }

    fn ident(name: &str) -> Expr {
        Expr::Identifier(name.to_owned())
    }

    fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
        Expr::Binary(Box::new(left), op, Box::new(right))
    }

    fn unary(op: UnaryOp, operand: Expr) -> Expr {
        Expr::Unary(op, Box::new(operand))
    }

    #[test]
    fn parses_integer_literal() {
        assert_eq!(parse("1").unwrap(), num(1.0));
    }

    #[test]
    fn parses_decimal_and_scientific_literals() {
        assert_eq!(parse("2.5").unwrap(), num(2.5));
        assert_eq!(parse(".5").unwrap(), num(0.5));
        assert_eq!(parse("1.").unwrap(), num(1.0));
        assert_eq!(parse("6.02e23").unwrap(), num(6.02e23));
        assert_eq!(parse("1E-2").unwrap(), num(0.01));
        assert_eq!(parse("3e+4").unwrap(), num(3e4));
    }

    #[test]
    fn parses_identifiers() {
        assert_eq!(parse("pi").unwrap(), ident("pi"));
        assert_eq!(parse("z2").unwrap(), ident("z2"));
        assert_eq!(parse("Var_1").unwrap(), ident("Var_1"));
    }

    #[test]
    fn parses_parenthesized_expression() {
        assert_eq!(parse("(z)").unwrap(), ident("z"));
        assert_eq!(
            parse("1*(2+4)").unwrap(),
            binary(
                num(1.0),
                BinaryOp::Mul,
                binary(num(2.0), BinaryOp::Add, num(4.0))
            )
        );
    }

    #[test]
    fn addition_folds_left() {
        assert_eq!(
            parse("1+2+3").unwrap(),
            binary(
                binary(num(1.0), BinaryOp::Add, num(2.0)),
                BinaryOp::Add,
                num(3.0)
            )
        );
    }

    #[test]
    fn every_binary_operator_folds_left() {
        for (text, op) in [
            ("1+2+3", BinaryOp::Add),
            ("1-2-3", BinaryOp::Sub),
            ("1*2*3", BinaryOp::Mul),
            ("1/2/3", BinaryOp::Div),
        ] {
            assert_eq!(
                parse(text).unwrap(),
                binary(binary(num(1.0), op, num(2.0)), op, num(3.0)),
                "shape of {text}"
            );
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(
            parse("1+3*2").unwrap(),
            binary(
                num(1.0),
                BinaryOp::Add,
                binary(num(3.0), BinaryOp::Mul, num(2.0))
            )
        );
        assert_eq!(
            parse("3*2+1").unwrap(),
            binary(
                binary(num(3.0), BinaryOp::Mul, num(2.0)),
                BinaryOp::Add,
                num(1.0)
            )
        );
    }

    #[test]
    fn unary_prefix_is_right_recursive() {
        assert_eq!(
            parse("--1").unwrap(),
            unary(UnaryOp::Minus, unary(UnaryOp::Minus, num(1.0)))
        );
        assert_eq!(parse("+(1)").unwrap(), unary(UnaryOp::Plus, num(1.0)));
        assert_eq!(parse("-x").unwrap(), unary(UnaryOp::Minus, ident("x")));
    }

    #[test]
    fn sign_is_grammatical_not_lexical() {
        // `1-2` must be subtraction, not the literal 1 followed by -2
        assert_eq!(
            parse("1-2").unwrap(),
            binary(num(1.0), BinaryOp::Sub, num(2.0))
        );
    }

    #[test]
    fn whitespace_is_skipped_between_tokens() {
        assert_eq!(
            parse("  1 +\t2 \n").unwrap(),
            binary(num(1.0), BinaryOp::Add, num(2.0))
        );
    }

    #[test]
    fn rejects_malformed_input() {
        for text in ["1a", "_a", "1+", "(1", "1 2", "", "*3", "1..2"] {
            assert!(parse(text).is_err(), "{text:?} should be rejected");
        }
    }

    #[test]
    fn rejects_whitespace_inside_tokens() {
        assert!(parse("6.02 e23").is_err());
    }
}
