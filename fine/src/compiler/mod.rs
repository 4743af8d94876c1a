//! AST to bytecode compiler
//!
//! Lowers the imperative subset of the language (literals, globals,
//! arithmetic and comparison, arrays and indexing, `print`, `if`, `while`,
//! `for`) into a [`Chunk`]. Anything else is rejected with
//! [`CompileError::Unsupported`] naming the construct and its line.

use crate::ast::{BinOp, Block, Expr, Program, Spanned, Stmt, UnOp};
use crate::bytecode::{Chunk, OpCode};
use crate::error::{CompileError, Result};
use crate::interp::Value;
use crate::{STACK_GROW_SIZE, STACK_RED_ZONE};

/// Hidden globals used by the `for` desugaring
const FOR_ARRAY: &str = "__tmp_array__";
const FOR_INDEX: &str = "__tmp_idx__";

/// Compile a whole program, ending with HALT
#[tracing::instrument(level = "debug", skip_all)]
pub fn compile(program: &Program) -> Result<Chunk> {
    let mut compiler = Compiler::new();
    compiler.block(&program.stmts)?;
    compiler.chunk.emit(OpCode::Halt);
    tracing::debug!(
        instructions = compiler.chunk.len(),
        constants = compiler.chunk.constants.len(),
        "compiled"
    );
    Ok(compiler.chunk)
}

struct Compiler {
    chunk: Chunk,
    /// Nesting depth of `for` loops, so inner loops get their own hidden globals
    for_depth: usize,
}

impl Compiler {
    fn new() -> Self {
        Self {
            chunk: Chunk::new(),
            for_depth: 0,
        }
    }

    fn constant(&mut self, value: Value) -> i64 {
        self.chunk.add_constant(value) as i64
    }

    fn name(&mut self, name: &str) -> i64 {
        self.constant(Value::Str(name.to_string()))
    }

    fn here(&self) -> i64 {
        self.chunk.len() as i64
    }

    /// Store the top of stack into a global and drop it
    fn store(&mut self, name: &str) {
        let k = self.name(name);
        self.chunk.emit_with(OpCode::StoreVar, k);
        self.chunk.emit(OpCode::Pop);
    }

    fn load(&mut self, name: &str) {
        let k = self.name(name);
        self.chunk.emit_with(OpCode::LoadVar, k);
    }

    fn block(&mut self, block: &Block) -> Result<()> {
        for stmt in block {
            self.stmt(stmt)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &Spanned<Stmt>) -> Result<()> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.stmt_inner(stmt))
    }

    fn stmt_inner(&mut self, stmt: &Spanned<Stmt>) -> Result<()> {
        match &stmt.node {
            Stmt::Expr(expr) => {
                self.expr(expr)?;
                self.chunk.emit(OpCode::Pop);
            }

            Stmt::Let { name, value } | Stmt::Assign { name, value } => {
                self.expr(value)?;
                self.store(name);
            }

            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.expr(cond)?;
                // JUMP_IF_FALSE consumes the condition, so neither branch starts with a POP
                let to_else = self.chunk.emit_with(OpCode::JumpIfFalse, 0);
                self.block(then_branch)?;
                let to_end = self.chunk.emit_with(OpCode::Jump, 0);
                self.chunk.patch(to_else, self.here());
                if let Some(else_branch) = else_branch {
                    self.block(else_branch)?;
                }
                self.chunk.patch(to_end, self.here());
            }

            Stmt::While { cond, body } => {
                let start = self.here();
                self.expr(cond)?;
                let to_end = self.chunk.emit_with(OpCode::JumpIfFalse, 0);
                self.block(body)?;
                self.chunk.emit_with(OpCode::Jump, start);
                self.chunk.patch(to_end, self.here());
            }

            Stmt::For {
                var,
                iterable,
                body,
                ..
            } => self.for_loop(var, iterable, body)?,

            other => return Err(CompileError::unsupported(stmt_construct(other), stmt.line)),
        }
        Ok(())
    }

    /// `for v in xs { body }` becomes an index-counter loop:
    ///
    /// ```text
    /// arr = xs; idx = 0
    /// while idx < len(arr) { v = arr[idx]; body; idx = idx + 1 }
    /// ```
    fn for_loop(&mut self, var: &str, iterable: &Spanned<Expr>, body: &Block) -> Result<()> {
        let (array, index) = match self.for_depth {
            0 => (FOR_ARRAY.to_string(), FOR_INDEX.to_string()),
            depth => (format!("__tmp_array_{depth}__"), format!("__tmp_idx_{depth}__")),
        };

        self.expr(iterable)?;
        self.store(&array);
        let zero = self.constant(Value::Number(0.0));
        self.chunk.emit_with(OpCode::LoadConst, zero);
        self.store(&index);

        let start = self.here();
        self.load(&index);
        self.load(&array);
        self.chunk.emit(OpCode::ArrayLength);
        self.chunk.emit(OpCode::Less);
        let to_end = self.chunk.emit_with(OpCode::JumpIfFalse, 0);

        self.load(&array);
        self.load(&index);
        self.chunk.emit(OpCode::Index);
        self.store(var);

        self.for_depth += 1;
        let result = self.block(body);
        self.for_depth -= 1;
        result?;

        self.load(&index);
        let one = self.constant(Value::Number(1.0));
        self.chunk.emit_with(OpCode::LoadConst, one);
        self.chunk.emit(OpCode::Add);
        self.store(&index);

        self.chunk.emit_with(OpCode::Jump, start);
        self.chunk.patch(to_end, self.here());
        Ok(())
    }

    fn expr(&mut self, expr: &Spanned<Expr>) -> Result<()> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.expr_inner(expr))
    }

    fn expr_inner(&mut self, expr: &Spanned<Expr>) -> Result<()> {
        match &expr.node {
            Expr::Number(n) => {
                let k = self.constant(Value::Number(*n));
                self.chunk.emit_with(OpCode::LoadConst, k);
            }
            Expr::Str(s) => {
                let k = self.constant(Value::Str(s.clone()));
                self.chunk.emit_with(OpCode::LoadConst, k);
            }
            Expr::Bool(true) => {
                self.chunk.emit(OpCode::LoadTrue);
            }
            Expr::Bool(false) => {
                self.chunk.emit(OpCode::LoadFalse);
            }
            Expr::Ident(name) => self.load(name),

            Expr::Binary { left, op, right } => {
                let Some(opcode) = binary_opcode(*op) else {
                    return Err(CompileError::unsupported("matrix multiplication", expr.line));
                };
                self.expr(left)?;
                self.expr(right)?;
                self.chunk.emit(opcode);
            }

            Expr::Unary { op, expr: operand } => {
                self.expr(operand)?;
                self.chunk.emit(match op {
                    UnOp::Neg => OpCode::Negate,
                    UnOp::Not => OpCode::Not,
                });
            }

            // print is an expression that leaves Null behind
            Expr::Call { func, args } if func == "print" => {
                for arg in args {
                    self.expr(arg)?;
                }
                self.chunk.emit_with(OpCode::Print, args.len() as i64);
                self.chunk.emit(OpCode::LoadNull);
            }

            Expr::Array(elements) => {
                for element in elements {
                    self.expr(element)?;
                }
                self.chunk.emit_with(OpCode::BuildArray, elements.len() as i64);
            }

            Expr::Index { target, index } => {
                self.expr(target)?;
                self.expr(index)?;
                self.chunk.emit(OpCode::Index);
            }

            other => return Err(CompileError::unsupported(expr_construct(other), expr.line)),
        }
        Ok(())
    }
}

fn binary_opcode(op: BinOp) -> Option<OpCode> {
    Some(match op {
        BinOp::Add => OpCode::Add,
        BinOp::Sub => OpCode::Subtract,
        BinOp::Mul => OpCode::Multiply,
        BinOp::Div => OpCode::Divide,
        BinOp::Mod => OpCode::Modulo,
        BinOp::FloorDiv => OpCode::FloorDiv,
        BinOp::Eq => OpCode::Equal,
        BinOp::Ne => OpCode::NotEqual,
        BinOp::Lt => OpCode::Less,
        BinOp::Le => OpCode::LessEqual,
        BinOp::Gt => OpCode::Greater,
        BinOp::Ge => OpCode::GreaterEqual,
        BinOp::MatMul => return None,
    })
}

fn stmt_construct(stmt: &Stmt) -> String {
    match stmt {
        Stmt::FnDef(_) => "function definition",
        Stmt::ClassDef(_) => "class definition",
        Stmt::FieldAssign { .. } => "field assignment",
        Stmt::Return(_) => "return",
        Stmt::Try { .. } => "try statement",
        Stmt::Throw(_) => "throw",
        Stmt::Assert { .. } => "assert",
        Stmt::Import { .. } | Stmt::FromImport { .. } => "import",
        Stmt::Export(_) => "export",
        Stmt::Expr(_)
        | Stmt::Let { .. }
        | Stmt::Assign { .. }
        | Stmt::If { .. }
        | Stmt::For { .. }
        | Stmt::While { .. } => "statement",
    }
    .to_string()
}

fn expr_construct(expr: &Expr) -> String {
    match expr {
        Expr::Call { func, .. } => format!("call to '{func}'"),
        Expr::Dict(_) => "dict literal".to_string(),
        Expr::Matrix { .. } => "matrix literal".to_string(),
        Expr::This => "'this'".to_string(),
        Expr::Field { .. } => "field access".to_string(),
        Expr::MethodCall { method, .. } => format!("method call '{method}'"),
        Expr::New { class, .. } => format!("'new {class}'"),
        Expr::SuperCall { .. } => "super call".to_string(),
        _ => "expression".to_string(),
    }
}
