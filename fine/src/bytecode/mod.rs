//! Bytecode chunks for the stack VM
//!
//! A [`Chunk`] is a flat instruction list plus a constant pool. Operands are
//! plain integers: a constant index, a jump target, or an element count.

use crate::interp::Value;
use std::fmt::{self, Write};

/// VM instruction set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    // Constants
    LoadConst,
    LoadTrue,
    LoadFalse,
    LoadNull,

    // Globals, named by a string constant
    LoadVar,
    StoreVar,

    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    FloorDiv,
    Negate,

    // Comparison
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    Not,

    // Arrays
    BuildArray,
    Index,
    ArrayLength,

    // Control flow
    Jump,
    JumpIfFalse,

    Print,
    Pop,
    Dup,
    Halt,
}

impl OpCode {
    /// Mnemonic used in listings
    pub fn name(self) -> &'static str {
        match self {
            OpCode::LoadConst => "LOAD_CONST",
            OpCode::LoadTrue => "LOAD_TRUE",
            OpCode::LoadFalse => "LOAD_FALSE",
            OpCode::LoadNull => "LOAD_NULL",
            OpCode::LoadVar => "LOAD_VAR",
            OpCode::StoreVar => "STORE_VAR",
            OpCode::Add => "ADD",
            OpCode::Subtract => "SUBTRACT",
            OpCode::Multiply => "MULTIPLY",
            OpCode::Divide => "DIVIDE",
            OpCode::Modulo => "MODULO",
            OpCode::FloorDiv => "FLOOR_DIV",
            OpCode::Negate => "NEGATE",
            OpCode::Equal => "EQUAL",
            OpCode::NotEqual => "NOT_EQUAL",
            OpCode::Less => "LESS",
            OpCode::LessEqual => "LESS_EQUAL",
            OpCode::Greater => "GREATER",
            OpCode::GreaterEqual => "GREATER_EQUAL",
            OpCode::Not => "NOT",
            OpCode::BuildArray => "BUILD_ARRAY",
            OpCode::Index => "INDEX",
            OpCode::ArrayLength => "ARRAY_LENGTH",
            OpCode::Jump => "JUMP",
            OpCode::JumpIfFalse => "JUMP_IF_FALSE",
            OpCode::Print => "PRINT",
            OpCode::Pop => "POP",
            OpCode::Dup => "DUP",
            OpCode::Halt => "HALT",
        }
    }

    /// Whether the operand is meaningful for this opcode
    pub fn has_operand(self) -> bool {
        matches!(
            self,
            OpCode::LoadConst
                | OpCode::LoadVar
                | OpCode::StoreVar
                | OpCode::BuildArray
                | OpCode::Jump
                | OpCode::JumpIfFalse
                | OpCode::Print
        )
    }

    /// Whether the operand indexes the constant pool
    pub fn uses_constant(self) -> bool {
        matches!(self, OpCode::LoadConst | OpCode::LoadVar | OpCode::StoreVar)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One instruction; `operand` is 0 when the opcode takes none
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: OpCode,
    pub operand: i64,
}

/// Instructions plus constant pool
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub code: Vec<Instruction>,
    pub constants: Vec<Value>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a constant and return its index. No deduplication.
    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Emit an instruction without an operand; returns its offset
    pub fn emit(&mut self, op: OpCode) -> usize {
        self.emit_with(op, 0)
    }

    pub fn emit_with(&mut self, op: OpCode, operand: i64) -> usize {
        self.code.push(Instruction { op, operand });
        self.code.len() - 1
    }

    /// Back-patch the operand of the instruction at `at`
    pub fn patch(&mut self, at: usize, operand: i64) {
        if let Some(instr) = self.code.get_mut(at) {
            instr.operand = operand;
        }
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Human-readable listing: `== name ==`, one line per instruction, then a
    /// blank line. Constant operands are followed by the constant's value.
    pub fn disassemble(&self, name: &str) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = self.write_listing(&mut out, name);
        out
    }

    fn write_listing(&self, out: &mut String, name: &str) -> fmt::Result {
        writeln!(out, "== {name} ==")?;
        for (offset, instr) in self.code.iter().enumerate() {
            let mut line = format!("{offset:04}  {:<20}", instr.op.name());
            if instr.op.has_operand() {
                write!(line, " {}", instr.operand)?;
                if instr.op.uses_constant() {
                    if let Some(value) = self.constant(instr.operand) {
                        write!(line, " ({value})")?;
                    }
                }
            }
            writeln!(out, "{}", line.trim_end())?;
        }
        writeln!(out)
    }

    /// Constant at a (possibly invalid) operand index
    pub fn constant(&self, index: i64) -> Option<&Value> {
        usize::try_from(index).ok().and_then(|i| self.constants.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_constant_appends() {
        let mut chunk = Chunk::new();
        assert_eq!(chunk.add_constant(Value::Number(1.0)), 0);
        assert_eq!(chunk.add_constant(Value::Number(1.0)), 1);
        assert_eq!(chunk.constants.len(), 2);
    }

    #[test]
    fn test_emit_and_patch() {
        let mut chunk = Chunk::new();
        let jump = chunk.emit_with(OpCode::JumpIfFalse, 0);
        chunk.emit(OpCode::Pop);
        chunk.patch(jump, chunk.len() as i64);
        assert_eq!(chunk.code[jump].operand, 2);
        assert_eq!(chunk.code[1], Instruction { op: OpCode::Pop, operand: 0 });
    }

    #[test]
    fn test_constant_lookup_rejects_bad_index() {
        let mut chunk = Chunk::new();
        chunk.add_constant(Value::Str("x".into()));
        assert!(chunk.constant(0).is_some());
        assert!(chunk.constant(1).is_none());
        assert!(chunk.constant(-1).is_none());
    }

    #[test]
    fn test_disassemble_listing() {
        let mut chunk = Chunk::new();
        let k = chunk.add_constant(Value::Number(42.0)) as i64;
        chunk.emit_with(OpCode::LoadConst, k);
        let name = chunk.add_constant(Value::Str("x".into())) as i64;
        chunk.emit_with(OpCode::StoreVar, name);
        chunk.emit(OpCode::Pop);
        chunk.emit_with(OpCode::Print, 1);
        chunk.emit(OpCode::Halt);

        insta::assert_snapshot!(chunk.disassemble("script"), @r"
        == script ==
        0000  LOAD_CONST           0 (42)
        0001  STORE_VAR            1 (x)
        0002  POP
        0003  PRINT                1
        0004  HALT
        ");
    }
}
