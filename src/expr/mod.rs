//! Restricted expression language for gates and routing.
//!
//! Expressions are evaluated against [`Memory`](crate::memory::Memory) in
//! two phases: `${path}` interpolation first, then lexing, parsing, and
//! evaluation of the resolved text. The grammar is deliberately small:
//! integer and string literals, `true`/`false`/`null`, identifiers,
//! parentheses, `!`, and the binary operators `== != < <= > >= && ||` with
//! C-family precedence.
//!
//! Unknown bare identifiers evaluate to their own text, which lets unquoted
//! step names (`next: step_two`) pass through [`evaluate_string`] unchanged.
//!
//! # Examples
//!
//! ```rust
//! use skein::expr::{evaluate_bool, evaluate_string};
//! use skein::memory::Memory;
//! use serde_json::json;
//!
//! let mem = Memory::new();
//! mem.set("x", json!(5)).unwrap();
//!
//! assert!(evaluate_bool("${x} > 0 && ${x} != 3", &mem).unwrap());
//! assert_eq!(evaluate_string("step_two", &mem).unwrap(), "step_two");
//! ```

mod eval;
mod parser;
mod token;

use miette::Diagnostic;
use thiserror::Error;

use crate::memory::Memory;
use eval::{eval, ExprValue};
use parser::parse;
use token::tokenize;

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Error, Diagnostic)]
pub enum ExprError {
    /// The resolved text is not a valid expression.
    #[error("failed to parse expression '{expr}': {message}")]
    #[diagnostic(code(skein::expr::parse))]
    Parse { expr: String, message: String },

    /// A binary operator was applied to incompatible operand types.
    #[error("invalid operand types for '{op}': {left} and {right}")]
    #[diagnostic(code(skein::expr::operands))]
    Operands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    /// `!` was applied to a non-boolean value.
    #[error("invalid operand type for '!': {got}")]
    #[diagnostic(code(skein::expr::unary_operand))]
    UnaryOperand { got: &'static str },

    /// The expression evaluated to something other than a boolean.
    #[error("expression '{expr}' did not evaluate to a boolean, got {got}")]
    #[diagnostic(
        code(skein::expr::not_boolean),
        help("Gate and map-routing conditions must yield true or false.")
    )]
    NotBoolean { expr: String, got: &'static str },
}

/// Evaluate a boolean gate or routing condition.
///
/// Interpolation is applied before parsing, so `${x} > 0` becomes `5 > 0`
/// when memory holds `x = 5`. A non-boolean result is an error.
pub fn evaluate_bool(expr: &str, mem: &Memory) -> Result<bool, ExprError> {
    let resolved = mem.resolve_interpolation(expr);
    let tokens = tokenize(&resolved).map_err(|message| ExprError::Parse {
        expr: resolved.clone(),
        message,
    })?;
    let ast = parse(&tokens).map_err(|message| ExprError::Parse {
        expr: resolved.clone(),
        message,
    })?;
    match eval(&ast)? {
        ExprValue::Bool(b) => Ok(b),
        other => Err(ExprError::NotBoolean {
            expr: resolved,
            got: other.type_name(),
        }),
    }
}

/// Evaluate an expression expected to produce a string (dynamic routing).
///
/// If the resolved text fails to parse it is returned verbatim, so raw
/// identifiers and arbitrary step names pass through. Evaluation errors on a
/// successfully parsed expression still propagate.
pub fn evaluate_string(expr: &str, mem: &Memory) -> Result<String, ExprError> {
    let resolved = mem.resolve_interpolation(expr);
    let ast = match tokenize(&resolved).and_then(|tokens| parse(&tokens)) {
        Ok(ast) => ast,
        Err(_) => return Ok(resolved),
    };
    Ok(eval(&ast)?.render())
}
