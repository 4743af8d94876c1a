//! Abstract Syntax Tree definitions

mod expr;
mod span;
mod stmt;

pub use expr::*;
pub use span::*;
pub use stmt::*;

use serde::{Deserialize, Serialize};

/// A program is the top-level statement list of one source file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub stmts: Block,
}
