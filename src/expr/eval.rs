//! Evaluation of the expression AST.

use super::parser::{BinaryOp, Expr};
use super::ExprError;

/// Runtime value produced by expression evaluation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ExprValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl ExprValue {
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            ExprValue::Null => "null",
            ExprValue::Bool(_) => "bool",
            ExprValue::Int(_) => "int",
            ExprValue::Str(_) => "string",
        }
    }

    /// Render with the same conventions as memory interpolation: strings
    /// bare, everything else in its literal form.
    pub(crate) fn render(&self) -> String {
        match self {
            ExprValue::Null => "null".to_string(),
            ExprValue::Bool(b) => b.to_string(),
            ExprValue::Int(n) => n.to_string(),
            ExprValue::Str(s) => s.clone(),
        }
    }
}

pub(crate) fn eval(expr: &Expr) -> Result<ExprValue, ExprError> {
    match expr {
        Expr::Int(n) => Ok(ExprValue::Int(*n)),
        Expr::Str(s) => Ok(ExprValue::Str(s.clone())),
        Expr::Bool(b) => Ok(ExprValue::Bool(*b)),
        Expr::Null => Ok(ExprValue::Null),
        // Unknown identifiers are their own text. This keeps unquoted step
        // names usable as routing targets.
        Expr::Ident(name) => Ok(ExprValue::Str(name.clone())),
        Expr::Not(inner) => match eval(inner)? {
            ExprValue::Bool(b) => Ok(ExprValue::Bool(!b)),
            other => Err(ExprError::UnaryOperand {
                got: other.type_name(),
            }),
        },
        Expr::Binary { op, left, right } => {
            let left = eval(left)?;
            let right = eval(right)?;
            eval_binary(*op, left, right)
        }
    }
}

fn eval_binary(op: BinaryOp, left: ExprValue, right: ExprValue) -> Result<ExprValue, ExprError> {
    match op {
        // Equality never errors: mismatched types simply compare unequal.
        BinaryOp::Eq => Ok(ExprValue::Bool(values_equal(&left, &right))),
        BinaryOp::Ne => Ok(ExprValue::Bool(!values_equal(&left, &right))),
        BinaryOp::And | BinaryOp::Or => match (&left, &right) {
            (ExprValue::Bool(l), ExprValue::Bool(r)) => Ok(ExprValue::Bool(match op {
                BinaryOp::And => *l && *r,
                _ => *l || *r,
            })),
            _ => Err(ExprError::Operands {
                op: op.symbol(),
                left: left.type_name(),
                right: right.type_name(),
            }),
        },
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, left, right),
    }
}

fn values_equal(left: &ExprValue, right: &ExprValue) -> bool {
    match (left, right) {
        (ExprValue::Null, ExprValue::Null) => true,
        (ExprValue::Bool(l), ExprValue::Bool(r)) => l == r,
        (ExprValue::Int(l), ExprValue::Int(r)) => l == r,
        (ExprValue::Str(l), ExprValue::Str(r)) => l == r,
        _ => false,
    }
}

fn compare(op: BinaryOp, left: ExprValue, right: ExprValue) -> Result<ExprValue, ExprError> {
    let ordering = match (&left, &right) {
        (ExprValue::Int(l), ExprValue::Int(r)) => l.cmp(r),
        (ExprValue::Str(l), ExprValue::Str(r)) => l.cmp(r),
        _ => {
            return Err(ExprError::Operands {
                op: op.symbol(),
                left: left.type_name(),
                right: right.type_name(),
            })
        }
    };
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Ge => ordering.is_ge(),
        _ => unreachable!("compare only receives ordering operators"),
    };
    Ok(ExprValue::Bool(result))
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::super::token::tokenize;
    use super::*;

    fn eval_str(input: &str) -> Result<ExprValue, ExprError> {
        let tokens = tokenize(input).expect("lex");
        let ast = parse(&tokens).expect("parse");
        eval(&ast)
    }

    #[test]
    fn identifiers_evaluate_to_their_text() {
        assert_eq!(
            eval_str("branch_b").unwrap(),
            ExprValue::Str("branch_b".to_string())
        );
    }

    #[test]
    fn mixed_type_equality_is_false() {
        assert_eq!(eval_str("5 == 'five'").unwrap(), ExprValue::Bool(false));
        assert_eq!(eval_str("5 != 'five'").unwrap(), ExprValue::Bool(true));
        assert_eq!(eval_str("null == false").unwrap(), ExprValue::Bool(false));
    }

    #[test]
    fn int_and_string_ordering() {
        assert_eq!(eval_str("2 >= 2").unwrap(), ExprValue::Bool(true));
        assert_eq!(eval_str("'a' < 'b'").unwrap(), ExprValue::Bool(true));
        assert!(eval_str("'a' < 1").is_err());
    }

    #[test]
    fn render_forms() {
        assert_eq!(ExprValue::Str("x".to_string()).render(), "x");
        assert_eq!(ExprValue::Int(-3).render(), "-3");
        assert_eq!(ExprValue::Bool(false).render(), "false");
        assert_eq!(ExprValue::Null.render(), "null");
    }
}
