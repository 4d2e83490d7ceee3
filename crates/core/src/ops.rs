//! Scalar operator semantics shared by the server evaluator and the
//! client-side partial evaluator.

use crate::expr::{BinaryOp, UnaryOp};
use crate::types::TypeSig;
use crate::value::Value;

/// Apply a binary operator to two values. Logical operators here are
/// strict; callers wanting short-circuit evaluate the left side first.
pub fn apply_binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, String> {
    use BinaryOp::*;
    // Integer arithmetic is checked: queries arrive from remote
    // callers, so overflow is an evaluation error, never a panic.
    let overflow = || "integer overflow".to_string();
    Ok(match (op, l, r) {
        (Add, Value::Int(a), Value::Int(b)) => Value::Int(a.checked_add(*b).ok_or_else(overflow)?),
        (Sub, Value::Int(a), Value::Int(b)) => Value::Int(a.checked_sub(*b).ok_or_else(overflow)?),
        (Mul, Value::Int(a), Value::Int(b)) => Value::Int(a.checked_mul(*b).ok_or_else(overflow)?),
        (Div, Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                return Err("division by zero".to_string());
            }
            Value::Int(a.checked_div(*b).ok_or_else(overflow)?)
        }
        (Rem, Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                return Err("division by zero".to_string());
            }
            Value::Int(a.checked_rem(*b).ok_or_else(overflow)?)
        }
        (Add, Value::Float(a), Value::Float(b)) => Value::Float(a + b),
        (Sub, Value::Float(a), Value::Float(b)) => Value::Float(a - b),
        (Mul, Value::Float(a), Value::Float(b)) => Value::Float(a * b),
        (Div, Value::Float(a), Value::Float(b)) => Value::Float(a / b),
        (Add, Value::Str(a), Value::Str(b)) => Value::Str(format!("{}{}", a, b)),
        (And, Value::Bool(a), Value::Bool(b)) => Value::Bool(*a && *b),
        (Or, Value::Bool(a), Value::Bool(b)) => Value::Bool(*a || *b),
        (Eq, a, b) => Value::Bool(a == b),
        (Ne, a, b) => Value::Bool(a != b),
        (Lt, Value::Int(a), Value::Int(b)) => Value::Bool(a < b),
        (Le, Value::Int(a), Value::Int(b)) => Value::Bool(a <= b),
        (Gt, Value::Int(a), Value::Int(b)) => Value::Bool(a > b),
        (Ge, Value::Int(a), Value::Int(b)) => Value::Bool(a >= b),
        (Lt, Value::Float(a), Value::Float(b)) => Value::Bool(a < b),
        (Le, Value::Float(a), Value::Float(b)) => Value::Bool(a <= b),
        (Gt, Value::Float(a), Value::Float(b)) => Value::Bool(a > b),
        (Ge, Value::Float(a), Value::Float(b)) => Value::Bool(a >= b),
        (Lt, Value::Str(a), Value::Str(b)) => Value::Bool(a < b),
        (Le, Value::Str(a), Value::Str(b)) => Value::Bool(a <= b),
        (Gt, Value::Str(a), Value::Str(b)) => Value::Bool(a > b),
        (Ge, Value::Str(a), Value::Str(b)) => Value::Bool(a >= b),
        _ => {
            return Err(format!(
                "operator {:?} not defined for {} and {}",
                op, l, r
            ))
        }
    })
}

pub fn apply_unary(op: UnaryOp, v: &Value) -> Result<Value, String> {
    match (op, v) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| "integer overflow".to_string()),
        (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        _ => Err(format!("operator {:?} not defined for {}", op, v)),
    }
}

/// Runtime conversion. Erasure and same-type conversion are identities;
/// only the numeric widenings change representation.
pub fn convert(value: Value, ty: &TypeSig) -> Value {
    match (value, ty) {
        (Value::Int(i), TypeSig::Float) => Value::Float(i as f64),
        (Value::Float(x), TypeSig::Int) => Value::Int(x as i64),
        (v, _) => v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic() {
        assert_eq!(
            apply_binary(BinaryOp::Add, &Value::Int(2), &Value::Int(40)).unwrap(),
            Value::Int(42)
        );
        assert!(apply_binary(BinaryOp::Div, &Value::Int(1), &Value::Int(0)).is_err());
    }

    #[test]
    fn overflow_is_an_error_not_a_panic() {
        assert_eq!(
            apply_binary(BinaryOp::Add, &Value::Int(i64::MAX), &Value::Int(1)),
            Err("integer overflow".to_string())
        );
        assert_eq!(
            apply_binary(BinaryOp::Sub, &Value::Int(i64::MIN), &Value::Int(1)),
            Err("integer overflow".to_string())
        );
        assert_eq!(
            apply_binary(BinaryOp::Mul, &Value::Int(i64::MAX), &Value::Int(2)),
            Err("integer overflow".to_string())
        );
        assert_eq!(
            apply_binary(BinaryOp::Div, &Value::Int(i64::MIN), &Value::Int(-1)),
            Err("integer overflow".to_string())
        );
        assert_eq!(
            apply_unary(UnaryOp::Neg, &Value::Int(i64::MIN)),
            Err("integer overflow".to_string())
        );
    }

    #[test]
    fn equality_is_polymorphic() {
        assert_eq!(
            apply_binary(
                BinaryOp::Eq,
                &Value::Str("a".to_string()),
                &Value::Str("a".to_string())
            )
            .unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn erasure_is_identity() {
        assert_eq!(
            convert(Value::Int(7), &TypeSig::Erased),
            Value::Int(7)
        );
        assert_eq!(convert(Value::Int(7), &TypeSig::Float), Value::Float(7.0));
    }
}
