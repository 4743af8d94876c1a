//! Operator semantics for the tree-walking evaluator
//!
//! Dispatch is on the runtime type pair of the operands. Pairings with no
//! rule evaluate to Null rather than raising.

use super::error::Exception;
use super::value::{Matrix, Value};
use crate::ast::{BinOp, UnOp};
use std::rc::Rc;

pub type OpResult = Result<Value, Rc<Exception>>;

/// Largest string (in bytes) or array (in elements) an operator or builtin
/// will build in one step
pub const MAX_SEQUENCE_LEN: usize = 1 << 24;

/// Apply a binary operator
pub fn binary(op: BinOp, left: &Value, right: &Value) -> OpResult {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => numeric(op, *a, *b),
        (Value::Str(a), Value::Str(b)) => Ok(match op {
            BinOp::Add => Value::Str(format!("{a}{b}")),
            BinOp::Eq => Value::from_bool(a == b),
            BinOp::Ne => Value::from_bool(a != b),
            _ => Value::Null,
        }),
        (Value::Str(s), Value::Number(n)) | (Value::Number(n), Value::Str(s)) if op == BinOp::Mul => {
            repeat(s, *n).map(Value::Str).ok_or_else(|| {
                Exception::memory_error(format!("string repetition too large: {} bytes * {n}", s.len()))
            })
        }
        (Value::Bool(a), Value::Bool(b)) => Ok(match op {
            BinOp::Eq => Value::from_bool(a == b),
            BinOp::Ne => Value::from_bool(a != b),
            _ => Value::Null,
        }),
        (Value::Array(a), Value::Array(b)) if a.len() == b.len() => Ok(elementwise(op, a, b)),
        (Value::Matrix(a), Value::Matrix(b)) => matrix(op, a, b),
        (Value::Matrix(m), Value::Number(k)) | (Value::Number(k), Value::Matrix(m)) if op == BinOp::Mul => {
            Ok(Value::Matrix(m.scale(*k)))
        }
        _ => Ok(Value::Null),
    }
}

fn numeric(op: BinOp, a: f64, b: f64) -> OpResult {
    let value = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(Exception::zero_division("division by zero"));
            }
            a / b
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(Exception::zero_division("modulo by zero"));
            }
            // Rust's % on f64 is C fmod: the result takes the dividend's sign
            a % b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(Exception::zero_division("floor division by zero"));
            }
            (a / b).floor()
        }
        BinOp::MatMul => return Ok(Value::Null),
        BinOp::Eq => return Ok(Value::from_bool(a == b)),
        BinOp::Ne => return Ok(Value::from_bool(a != b)),
        BinOp::Lt => return Ok(Value::from_bool(a < b)),
        BinOp::Gt => return Ok(Value::from_bool(a > b)),
        BinOp::Le => return Ok(Value::from_bool(a <= b)),
        BinOp::Ge => return Ok(Value::from_bool(a >= b)),
    };
    Ok(Value::Number(value))
}

/// `s * n` with negative counts clamped to zero and fractions truncated.
/// None when the result would exceed [`MAX_SEQUENCE_LEN`] bytes.
pub fn repeat(s: &str, n: f64) -> Option<String> {
    if n.is_nan() || n <= 0.0 || s.is_empty() {
        return Some(String::new());
    }
    // Saturates for huge or infinite counts
    let count = n as usize;
    match s.len().checked_mul(count) {
        Some(len) if len <= MAX_SEQUENCE_LEN => Some(s.repeat(count)),
        _ => None,
    }
}

fn elementwise(op: BinOp, a: &[Value], b: &[Value]) -> Value {
    let pairs = a.iter().zip(b).map(|(x, y)| (x.as_number(), y.as_number()));
    let combine = |f: fn(f64, f64) -> f64| {
        Value::Array(
            pairs
                .clone()
                .map(|pair| match pair {
                    (Some(x), Some(y)) => Value::Number(f(x, y)),
                    _ => Value::Null,
                })
                .collect(),
        )
    };
    match op {
        BinOp::Add => combine(|x, y| x + y),
        BinOp::Sub => combine(|x, y| x - y),
        BinOp::Mul => combine(|x, y| x * y),
        BinOp::MatMul => Value::Number(
            pairs
                .clone()
                .map(|pair| match pair {
                    (Some(x), Some(y)) => x * y,
                    _ => 0.0,
                })
                .sum(),
        ),
        _ => Value::Null,
    }
}

fn matrix(op: BinOp, a: &Matrix, b: &Matrix) -> OpResult {
    let mismatch = |sep: &str| format!("{} {sep} {}", a.shape(), b.shape());
    match op {
        BinOp::Add => a
            .zip_with(b, |x, y| x + y)
            .map(Value::Matrix)
            .ok_or_else(|| Exception::value_error(format!("matrix dimension mismatch: {}", mismatch("+")))),
        BinOp::Sub => a
            .zip_with(b, |x, y| x - y)
            .map(Value::Matrix)
            .ok_or_else(|| Exception::value_error(format!("matrix dimension mismatch: {}", mismatch("-")))),
        BinOp::MatMul => a.matmul(b).map(Value::Matrix).ok_or_else(|| {
            Exception::value_error(format!(
                "matrix dimension mismatch for multiplication: {}",
                mismatch("@")
            ))
        }),
        _ => Ok(Value::Null),
    }
}

/// Apply a unary operator; anything but a number yields Null
pub fn unary(op: UnOp, operand: &Value) -> Value {
    match (op, operand) {
        (UnOp::Neg, Value::Number(n)) => Value::Number(-n),
        (UnOp::Not, Value::Number(n)) => Value::from_bool(*n == 0.0),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::error::{MEMORY_ERROR, VALUE_ERROR, ZERO_DIVISION_ERROR};

    fn n(x: f64) -> Value {
        Value::Number(x)
    }

    fn nums(xs: &[f64]) -> Value {
        Value::Array(xs.iter().map(|x| n(*x)).collect())
    }

    fn mat(rows: usize, cols: usize, data: &[f64]) -> Value {
        Value::Matrix(Matrix::new(rows, cols, data.to_vec()).unwrap())
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(binary(BinOp::Add, &n(3.0), &n(4.0)).unwrap(), n(7.0));
        assert_eq!(binary(BinOp::Div, &n(7.0), &n(2.0)).unwrap(), n(3.5));
        assert_eq!(binary(BinOp::Mod, &n(7.5), &n(2.0)).unwrap(), n(1.5));
        assert_eq!(binary(BinOp::Mod, &n(-7.0), &n(3.0)).unwrap(), n(-1.0));
        assert_eq!(binary(BinOp::FloorDiv, &n(7.0), &n(2.0)).unwrap(), n(3.0));
        assert_eq!(binary(BinOp::FloorDiv, &n(-7.0), &n(2.0)).unwrap(), n(-4.0));
    }

    #[test]
    fn test_division_family_by_zero() {
        for (op, msg) in [
            (BinOp::Div, "division by zero"),
            (BinOp::Mod, "modulo by zero"),
            (BinOp::FloorDiv, "floor division by zero"),
        ] {
            let err = binary(op, &n(1.0), &n(0.0)).unwrap_err();
            assert_eq!(err.kind, ZERO_DIVISION_ERROR);
            assert_eq!(err.message, msg);
        }
    }

    #[test]
    fn test_comparisons_yield_numbers() {
        assert_eq!(binary(BinOp::Lt, &n(1.0), &n(2.0)).unwrap(), n(1.0));
        assert_eq!(binary(BinOp::Ge, &n(1.0), &n(2.0)).unwrap(), n(0.0));
        assert_eq!(binary(BinOp::Eq, &Value::Str("a".into()), &Value::Str("a".into())).unwrap(), n(1.0));
    }

    #[test]
    fn test_string_ops() {
        let hi = Value::Str("hi".into());
        assert_eq!(binary(BinOp::Add, &hi, &Value::Str("!".into())).unwrap(), Value::Str("hi!".into()));
        assert_eq!(binary(BinOp::Mul, &hi, &n(3.0)).unwrap(), Value::Str("hihihi".into()));
        assert_eq!(binary(BinOp::Mul, &n(2.0), &hi).unwrap(), Value::Str("hihi".into()));
        assert_eq!(binary(BinOp::Mul, &hi, &n(-2.0)).unwrap(), Value::Str(String::new()));
        assert_eq!(binary(BinOp::Sub, &hi, &hi).unwrap(), Value::Null);
    }

    #[test]
    fn test_string_repeat_too_large() {
        let ab = Value::Str("ab".into());
        let err = binary(BinOp::Mul, &ab, &n(1e19)).unwrap_err();
        assert_eq!(err.kind, MEMORY_ERROR);
        assert!(binary(BinOp::Mul, &n(f64::INFINITY), &ab).is_err());
        assert!(binary(BinOp::Mul, &ab, &n((MAX_SEQUENCE_LEN / 2 + 1) as f64)).is_err());
        assert_eq!(repeat("", 1e19), Some(String::new()));
        assert_eq!(repeat("ab", (MAX_SEQUENCE_LEN / 2) as f64).map(|s| s.len()), Some(MAX_SEQUENCE_LEN));
    }

    #[test]
    fn test_mismatched_pairs_are_null() {
        assert_eq!(binary(BinOp::Add, &n(1.0), &Value::Str("a".into())).unwrap(), Value::Null);
        assert_eq!(binary(BinOp::Add, &nums(&[1.0]), &nums(&[1.0, 2.0])).unwrap(), Value::Null);
        assert_eq!(binary(BinOp::Eq, &Value::Null, &Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_array_elementwise_and_dot() {
        let a = nums(&[1.0, 2.0, 3.0]);
        let b = nums(&[4.0, 5.0, 6.0]);
        assert_eq!(binary(BinOp::Add, &a, &b).unwrap(), nums(&[5.0, 7.0, 9.0]));
        assert_eq!(binary(BinOp::Mul, &a, &b).unwrap(), nums(&[4.0, 10.0, 18.0]));
        assert_eq!(binary(BinOp::MatMul, &a, &b).unwrap(), n(32.0));
    }

    #[test]
    fn test_matrix_ops() {
        let a = mat(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let b = mat(2, 2, &[5.0, 6.0, 7.0, 8.0]);
        assert_eq!(binary(BinOp::MatMul, &a, &b).unwrap(), mat(2, 2, &[19.0, 22.0, 43.0, 50.0]));
        assert_eq!(binary(BinOp::Sub, &b, &a).unwrap(), mat(2, 2, &[4.0, 4.0, 4.0, 4.0]));
        assert_eq!(binary(BinOp::Mul, &a, &n(2.0)).unwrap(), mat(2, 2, &[2.0, 4.0, 6.0, 8.0]));
        assert_eq!(binary(BinOp::Mul, &n(0.5), &a).unwrap(), mat(2, 2, &[0.5, 1.0, 1.5, 2.0]));
    }

    #[test]
    fn test_matrix_dimension_errors() {
        let a = mat(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let c = mat(3, 1, &[1.0, 2.0, 3.0]);
        let err = binary(BinOp::Add, &a, &c).unwrap_err();
        assert_eq!(err.kind, VALUE_ERROR);
        assert_eq!(err.message, "matrix dimension mismatch: (2x2) + (3x1)");
        let err = binary(BinOp::MatMul, &a, &c).unwrap_err();
        assert_eq!(err.message, "matrix dimension mismatch for multiplication: (2x2) @ (3x1)");
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary(UnOp::Neg, &n(2.0)), n(-2.0));
        assert_eq!(unary(UnOp::Not, &n(0.0)), n(1.0));
        assert_eq!(unary(UnOp::Not, &n(0.5)), n(0.0));
        assert_eq!(unary(UnOp::Not, &Value::Bool(true)), Value::Null);
        assert_eq!(unary(UnOp::Neg, &Value::Str("x".into())), Value::Null);
    }
}
