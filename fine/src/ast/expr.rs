//! Expression AST nodes

use super::Spanned;
use serde::{Deserialize, Serialize};

/// Expression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    /// Number literal (all numbers are f64)
    Number(f64),
    /// String literal, escapes already resolved
    Str(String),
    /// Boolean literal
    Bool(bool),

    /// Variable reference
    Ident(String),
    /// The receiver inside a method or constructor
    This,

    /// Array literal: [a, b, c]
    Array(Vec<Spanned<Expr>>),
    /// Dict literal: { key: value, ... }
    Dict(Vec<(String, Spanned<Expr>)>),
    /// Nested array literal with equal-length rows: [[1, 2], [3, 4]].
    /// Cells are row-major; a cell that is not a number evaluates to 0.
    Matrix {
        rows: usize,
        cols: usize,
        cells: Vec<Spanned<Expr>>,
    },

    /// Binary operation
    Binary {
        left: Box<Spanned<Expr>>,
        op: BinOp,
        right: Box<Spanned<Expr>>,
    },

    /// Unary operation
    Unary {
        op: UnOp,
        expr: Box<Spanned<Expr>>,
    },

    /// Call of a named function or built-in: f(a, b)
    Call {
        func: String,
        args: Vec<Spanned<Expr>>,
    },

    /// Indexing: target[index]
    Index {
        target: Box<Spanned<Expr>>,
        index: Box<Spanned<Expr>>,
    },

    /// Field or export access: expr.name
    Field {
        target: Box<Spanned<Expr>>,
        name: String,
    },

    /// Method call: expr.name(args) or expr->name(args)
    MethodCall {
        receiver: Box<Spanned<Expr>>,
        method: String,
        args: Vec<Spanned<Expr>>,
    },

    /// Instantiation: new Class(args)
    New {
        class: String,
        args: Vec<Spanned<Expr>>,
    },

    /// Parent method call: super.method(args)
    SuperCall {
        method: String,
        args: Vec<Spanned<Expr>>,
    },
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    FloorDiv,
    /// Dot product / matrix multiplication
    MatMul,

    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge
        )
    }
}

impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinOp::Add => write!(f, "+"),
            BinOp::Sub => write!(f, "-"),
            BinOp::Mul => write!(f, "*"),
            BinOp::Div => write!(f, "/"),
            BinOp::Mod => write!(f, "%"),
            BinOp::FloorDiv => write!(f, "//"),
            BinOp::MatMul => write!(f, "@"),
            BinOp::Eq => write!(f, "=="),
            BinOp::Ne => write!(f, "!="),
            BinOp::Lt => write!(f, "<"),
            BinOp::Gt => write!(f, ">"),
            BinOp::Le => write!(f, "<="),
            BinOp::Ge => write!(f, ">="),
        }
    }
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    /// Negation (-)
    Neg,
    /// Logical not (!)
    Not,
}

impl std::fmt::Display for UnOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnOp::Neg => write!(f, "-"),
            UnOp::Not => write!(f, "!"),
        }
    }
}
