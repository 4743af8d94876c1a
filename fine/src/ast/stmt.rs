//! Statement AST nodes

use super::{Expr, Spanned};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// A sequence of statements executed in order
pub type Block = Vec<Spanned<Stmt>>;

/// Statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    /// Expression evaluated for its effect
    Expr(Spanned<Expr>),

    /// let name = value
    Let { name: String, value: Spanned<Expr> },

    /// name = value
    Assign { name: String, value: Spanned<Expr> },

    /// target.field = value
    FieldAssign {
        target: Spanned<Expr>,
        field: String,
        value: Spanned<Expr>,
    },

    /// fn name(params) { body }
    FnDef(Rc<FnDef>),

    /// class Name [extends Parent] { let field ... fn method() {} ... }
    ClassDef(Rc<ClassDef>),

    If {
        cond: Spanned<Expr>,
        then_branch: Block,
        else_branch: Option<Block>,
    },

    /// [parallel] for var in iterable { body }
    For {
        var: String,
        iterable: Spanned<Expr>,
        body: Block,
        parallel: bool,
    },

    While { cond: Spanned<Expr>, body: Block },

    Return(Option<Spanned<Expr>>),

    Try {
        body: Block,
        catch: Option<CatchClause>,
        finally: Option<Block>,
    },

    Throw(Spanned<Expr>),

    /// assert cond[, message]
    Assert {
        cond: Spanned<Expr>,
        message: Option<Spanned<Expr>>,
    },

    /// import module [as alias]
    Import { module: String, alias: Option<String> },

    /// from module import a, b
    FromImport { module: String, names: Vec<String> },

    /// export fn/let/class
    Export(Box<Spanned<Stmt>>),
}

/// Function or method definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FnDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
    pub line: usize,
}

/// Class definition as written; inheritance is flattened when it is evaluated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    pub parent: Option<String>,
    pub fields: Vec<String>,
    pub methods: Vec<Rc<FnDef>>,
}

/// catch [Type as] [var] { body }
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatchClause {
    pub kind: Option<String>,
    pub var: Option<String>,
    pub body: Block,
}
