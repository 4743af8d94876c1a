//! Fatal VM errors

use thiserror::Error;

/// A condition that stops the VM. There is no recovery inside the program.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("stack overflow (capacity {capacity})")]
    StackOverflow { capacity: usize },

    #[error("stack underflow in {op}")]
    StackUnderflow { op: &'static str },

    #[error("type error in {op}: {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("type error in {op}: {operand}")]
    BadOperand {
        op: &'static str,
        operand: &'static str,
    },

    #[error("{0}")]
    ZeroDivision(&'static str),

    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("index out of bounds: {index} (length {len})")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("cannot index {0}")]
    NotIndexable(&'static str),

    #[error("result of {op} too large (limit {limit})")]
    TooLarge { op: &'static str, limit: usize },

    #[error("bad constant index: {0}")]
    BadConstant(i64),

    #[error("variable name must be a string (constant {0})")]
    BadVariableName(i64),

    #[error("too many instructions executed ({limit}); possible infinite loop")]
    InstructionLimit { limit: usize },

    #[error("instruction pointer out of bounds: {ip} (chunk has {len} instructions)")]
    IpOutOfBounds { ip: i64, len: usize },

    #[error("cannot write output: {0}")]
    Io(#[from] std::io::Error),
}
