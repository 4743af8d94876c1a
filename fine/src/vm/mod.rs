//! Stack virtual machine
//!
//! Executes a [`Chunk`] against a bounded operand stack and one flat scope of
//! globals. Every fault is fatal and surfaces as a [`VmError`].

mod error;

pub use error::VmError;

use crate::bytecode::{Chunk, OpCode};
use crate::config::RuntimeConfig;
use crate::interp::{repeat, Environment, Value, MAX_SEQUENCE_LEN};
use std::io::{self, Write};

pub struct Vm<W: Write = io::Stdout> {
    stack: Vec<Value>,
    capacity: usize,
    max_instructions: usize,
    /// Instructions executed by the last `run`
    executed: usize,
    globals: Environment,
    out: W,
}

impl Vm<io::Stdout> {
    pub fn new() -> Self {
        Self::with_config(&RuntimeConfig::default())
    }

    pub fn with_config(config: &RuntimeConfig) -> Self {
        Self::with_output(config, io::stdout())
    }
}

impl Default for Vm<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> Vm<W> {
    pub fn with_output(config: &RuntimeConfig, out: W) -> Self {
        Self {
            stack: Vec::with_capacity(config.vm_stack_capacity),
            capacity: config.vm_stack_capacity,
            max_instructions: config.vm_max_instructions,
            executed: 0,
            globals: Environment::new(),
            out,
        }
    }

    pub fn globals(&self) -> &Environment {
        &self.globals
    }

    pub fn executed(&self) -> usize {
        self.executed
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Run a chunk until HALT or the first fault
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn run(&mut self, chunk: &Chunk) -> Result<(), VmError> {
        self.stack.clear();
        self.executed = 0;
        tracing::debug!(instructions = chunk.len(), constants = chunk.constants.len(), "vm start");

        let result = self.execute(chunk);
        let flushed = self.out.flush();

        tracing::debug!(executed = self.executed, ok = result.is_ok(), "vm halt");
        result?;
        flushed?;
        Ok(())
    }

    fn execute(&mut self, chunk: &Chunk) -> Result<(), VmError> {
        let mut ip = 0usize;
        loop {
            if self.executed >= self.max_instructions {
                return Err(VmError::InstructionLimit {
                    limit: self.max_instructions,
                });
            }
            let Some(instr) = chunk.code.get(ip).copied() else {
                return Err(VmError::IpOutOfBounds {
                    ip: ip as i64,
                    len: chunk.len(),
                });
            };
            tracing::trace!(ip, op = %instr.op, operand = instr.operand, depth = self.stack.len(), "dispatch");
            self.executed += 1;
            ip += 1;

            match instr.op {
                OpCode::LoadConst => {
                    let value = chunk
                        .constant(instr.operand)
                        .cloned()
                        .ok_or(VmError::BadConstant(instr.operand))?;
                    self.push(value)?;
                }
                OpCode::LoadTrue => self.push(Value::Bool(true))?,
                OpCode::LoadFalse => self.push(Value::Bool(false))?,
                OpCode::LoadNull => self.push(Value::Null)?,

                OpCode::LoadVar => {
                    let name = var_name(chunk, instr.operand)?;
                    let value = self
                        .globals
                        .get(name)
                        .ok_or_else(|| VmError::UndefinedVariable(name.to_string()))?;
                    self.push(value)?;
                }
                OpCode::StoreVar => {
                    let name = var_name(chunk, instr.operand)?;
                    let value = self.peek("STORE_VAR")?.clone();
                    self.globals.set(name, value);
                }

                OpCode::Add => {
                    let (left, right) = self.pop_pair("ADD")?;
                    let value = match (&left, &right) {
                        (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
                        (Value::Str(a), Value::Str(b)) => Value::Str(format!("{a}{b}")),
                        _ => return Err(mismatch("ADD", &left, &right)),
                    };
                    self.push(value)?;
                }
                OpCode::Subtract => self.arithmetic("SUBTRACT", |a, b| Ok(a - b))?,
                OpCode::Multiply => {
                    let (left, right) = self.pop_pair("MULTIPLY")?;
                    let value = match (&left, &right) {
                        (Value::Number(a), Value::Number(b)) => Value::Number(a * b),
                        (Value::Str(s), Value::Number(n)) | (Value::Number(n), Value::Str(s)) => {
                            Value::Str(repeat(s, *n).ok_or(VmError::TooLarge {
                                op: "MULTIPLY",
                                limit: MAX_SEQUENCE_LEN,
                            })?)
                        }
                        _ => return Err(mismatch("MULTIPLY", &left, &right)),
                    };
                    self.push(value)?;
                }
                OpCode::Divide => self.arithmetic("DIVIDE", |a, b| {
                    nonzero(b, "division by zero")?;
                    Ok(a / b)
                })?,
                OpCode::Modulo => self.arithmetic("MODULO", |a, b| {
                    nonzero(b, "modulo by zero")?;
                    Ok(a % b)
                })?,
                OpCode::FloorDiv => self.arithmetic("FLOOR_DIV", |a, b| {
                    nonzero(b, "floor division by zero")?;
                    Ok((a / b).floor())
                })?,
                OpCode::Negate => match self.pop("NEGATE")? {
                    Value::Number(n) => self.push(Value::Number(-n))?,
                    other => {
                        return Err(VmError::BadOperand {
                            op: "NEGATE",
                            operand: other.type_name(),
                        });
                    }
                },

                OpCode::Equal => {
                    let (left, right) = self.pop_pair("EQUAL")?;
                    self.push(Value::from_bool(primitive_eq(&left, &right)))?;
                }
                OpCode::NotEqual => {
                    let (left, right) = self.pop_pair("NOT_EQUAL")?;
                    self.push(Value::from_bool(!primitive_eq(&left, &right)))?;
                }
                OpCode::Less => self.compare("LESS", |a, b| a < b)?,
                OpCode::LessEqual => self.compare("LESS_EQUAL", |a, b| a <= b)?,
                OpCode::Greater => self.compare("GREATER", |a, b| a > b)?,
                OpCode::GreaterEqual => self.compare("GREATER_EQUAL", |a, b| a >= b)?,

                OpCode::Not => {
                    let result = match self.pop("NOT")? {
                        Value::Bool(b) => !b,
                        Value::Number(n) => n == 0.0,
                        _ => false,
                    };
                    self.push(Value::from_bool(result))?;
                }

                OpCode::BuildArray => {
                    let items = self.pop_n("BUILD_ARRAY", instr.operand)?;
                    self.push(Value::Array(items))?;
                }
                OpCode::Index => {
                    let index = self.pop("INDEX")?;
                    let target = self.pop("INDEX")?;
                    let value = index_value(&target, &index)?;
                    self.push(value)?;
                }
                OpCode::ArrayLength => {
                    let len = match self.pop("ARRAY_LENGTH")? {
                        Value::Array(items) => items.len(),
                        Value::Str(s) => s.chars().count(),
                        other => {
                            return Err(VmError::BadOperand {
                                op: "ARRAY_LENGTH",
                                operand: other.type_name(),
                            });
                        }
                    };
                    self.push(Value::Number(len as f64))?;
                }

                OpCode::Jump => ip = jump_target(chunk, instr.operand)?,
                OpCode::JumpIfFalse => {
                    if !self.pop("JUMP_IF_FALSE")?.is_truthy() {
                        ip = jump_target(chunk, instr.operand)?;
                    }
                }

                OpCode::Print => {
                    let values = self.pop_n("PRINT", instr.operand)?;
                    let line = values.iter().map(Value::to_string).collect::<Vec<_>>().join(" ");
                    writeln!(self.out, "{line}")?;
                }
                OpCode::Pop => {
                    self.pop("POP")?;
                }
                OpCode::Dup => {
                    let top = self.peek("DUP")?.clone();
                    self.push(top)?;
                }
                OpCode::Halt => return Ok(()),
            }
        }
    }

    fn push(&mut self, value: Value) -> Result<(), VmError> {
        if self.stack.len() >= self.capacity {
            return Err(VmError::StackOverflow {
                capacity: self.capacity,
            });
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self, op: &'static str) -> Result<Value, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow { op })
    }

    /// Pop right then left operand
    fn pop_pair(&mut self, op: &'static str) -> Result<(Value, Value), VmError> {
        let right = self.pop(op)?;
        let left = self.pop(op)?;
        Ok((left, right))
    }

    /// Pop `count` values, oldest first
    fn pop_n(&mut self, op: &'static str, count: i64) -> Result<Vec<Value>, VmError> {
        let count = usize::try_from(count).map_err(|_| VmError::StackUnderflow { op })?;
        if count > self.stack.len() {
            return Err(VmError::StackUnderflow { op });
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    fn peek(&self, op: &'static str) -> Result<&Value, VmError> {
        self.stack.last().ok_or(VmError::StackUnderflow { op })
    }

    fn arithmetic(
        &mut self,
        op: &'static str,
        f: impl Fn(f64, f64) -> Result<f64, VmError>,
    ) -> Result<(), VmError> {
        let (left, right) = self.pop_pair(op)?;
        match (&left, &right) {
            (Value::Number(a), Value::Number(b)) => self.push(Value::Number(f(*a, *b)?)),
            _ => Err(mismatch(op, &left, &right)),
        }
    }

    fn compare(&mut self, op: &'static str, f: impl Fn(f64, f64) -> bool) -> Result<(), VmError> {
        let (left, right) = self.pop_pair(op)?;
        match (&left, &right) {
            (Value::Number(a), Value::Number(b)) => self.push(Value::from_bool(f(*a, *b))),
            _ => Err(mismatch(op, &left, &right)),
        }
    }
}

fn mismatch(op: &'static str, left: &Value, right: &Value) -> VmError {
    VmError::TypeMismatch {
        op,
        left: left.type_name(),
        right: right.type_name(),
    }
}

fn nonzero(divisor: f64, message: &'static str) -> Result<(), VmError> {
    if divisor == 0.0 {
        Err(VmError::ZeroDivision(message))
    } else {
        Ok(())
    }
}

/// Equality on numbers, bools and strings; other pairs are unequal
fn primitive_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        _ => false,
    }
}

fn var_name(chunk: &Chunk, operand: i64) -> Result<&str, VmError> {
    match chunk.constant(operand) {
        Some(Value::Str(name)) => Ok(name),
        Some(_) => Err(VmError::BadVariableName(operand)),
        None => Err(VmError::BadConstant(operand)),
    }
}

fn jump_target(chunk: &Chunk, operand: i64) -> Result<usize, VmError> {
    usize::try_from(operand)
        .ok()
        .filter(|t| *t < chunk.len())
        .ok_or(VmError::IpOutOfBounds {
            ip: operand,
            len: chunk.len(),
        })
}

fn index_value(target: &Value, index: &Value) -> Result<Value, VmError> {
    let Value::Number(n) = index else {
        return Err(VmError::BadOperand {
            op: "INDEX",
            operand: index.type_name(),
        });
    };
    let i = n.trunc() as i64;
    let out_of_bounds = |len| VmError::IndexOutOfBounds { index: i, len };
    match target {
        Value::Array(items) => usize::try_from(i)
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .ok_or_else(|| out_of_bounds(items.len())),
        Value::Str(s) => usize::try_from(i)
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::Str(c.to_string()))
            .ok_or_else(|| out_of_bounds(s.chars().count())),
        other => Err(VmError::NotIndexable(other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Instruction;
    use crate::compiler::compile;
    use crate::parser::parse_source;

    fn run_with(config: &RuntimeConfig, source: &str) -> (Result<(), VmError>, String) {
        let chunk = compile(&parse_source(source).expect("parse")).expect("compile");
        let mut vm = Vm::with_output(config, Vec::new());
        let result = vm.run(&chunk);
        (result, String::from_utf8(vm.into_output()).expect("utf8"))
    }

    fn output(source: &str) -> String {
        let (result, out) = run_with(&RuntimeConfig::default(), source);
        if let Err(e) = result {
            panic!("vm error: {e}");
        }
        out
    }

    fn fails(source: &str) -> VmError {
        run_with(&RuntimeConfig::default(), source).0.unwrap_err()
    }

    #[test]
    fn test_while_loop() {
        assert_eq!(output("let i = 0 while i < 3 { print(i) i = i + 1 }"), "0\n1\n2\n");
    }

    #[test]
    fn test_arithmetic_matches_evaluator() {
        assert_eq!(output("let x = 3 + 4 * 2; print(x)"), "11\n");
        assert_eq!(output("print(7 / 2, 7 % 3, -7 // 2, -(2))"), "3.5 1 -4 -2\n");
        assert_eq!(output("print(\"ab\" + \"c\", \"ab\" * 2, 2 * \"x\")"), "abc abab xx\n");
    }

    #[test]
    fn test_huge_string_repeat_is_fatal() {
        let err = fails("let s = \"ab\" * 10000000000000000000");
        assert!(matches!(err, VmError::TooLarge { op: "MULTIPLY", .. }));
        assert_eq!(output("print(\"ab\" * 0, \"\" * 10000000000000000000)"), " \n");
    }

    #[test]
    fn test_comparisons_push_numbers() {
        assert_eq!(output("print(1 < 2, 2 <= 1, \"a\" == \"a\", true != false, 1 == \"1\")"), "1 0 1 1 0\n");
        assert_eq!(output("print(!0, !3, !true)"), "1 0 0\n");
    }

    #[test]
    fn test_if_else() {
        assert_eq!(output("let x = 5 if x > 3 { print(\"big\") } else { print(\"small\") }"), "big\n");
        assert_eq!(output("if false { print(1) } else if 0 { print(2) } else { print(3) }"), "3\n");
    }

    #[test]
    fn test_for_loop_over_array_and_string() {
        assert_eq!(output("for x in [10, 20] { print(x) }"), "10\n20\n");
        assert_eq!(output("for c in \"hi\" { print(c) }"), "h\ni\n");
        assert_eq!(output("for a in [1, 2] { for b in [3, 4] { print(a * b) } }"), "3\n4\n6\n8\n");
    }

    #[test]
    fn test_stack_is_balanced_after_statements() {
        let chunk = compile(&parse_source("let a = [1, 2]\nprint(a[1])\na = 3").unwrap()).unwrap();
        let mut vm = Vm::with_output(&RuntimeConfig::default(), Vec::new());
        vm.run(&chunk).unwrap();
        assert_eq!(vm.stack_depth(), 0);
        assert_eq!(vm.globals().get("a"), Some(Value::Number(3.0)));
    }

    #[test]
    fn test_fatal_errors() {
        assert!(matches!(fails("print(y)"), VmError::UndefinedVariable(name) if name == "y"));
        assert!(matches!(fails("print(1 / 0)"), VmError::ZeroDivision("division by zero")));
        assert!(matches!(fails("print(1 % 0)"), VmError::ZeroDivision("modulo by zero")));
        assert!(matches!(fails("print(1 + \"a\")"), VmError::TypeMismatch { op: "ADD", .. }));
        assert!(matches!(fails("print(\"a\" < \"b\")"), VmError::TypeMismatch { op: "LESS", .. }));
        assert!(matches!(fails("print([1][2])"), VmError::IndexOutOfBounds { index: 2, len: 1 }));
        assert!(matches!(fails("print(5[0])"), VmError::NotIndexable("number")));
        assert!(matches!(fails("print(-\"a\")"), VmError::BadOperand { op: "NEGATE", .. }));
    }

    #[test]
    fn test_instruction_limit() {
        let config = RuntimeConfig::default().with_vm_max_instructions(100);
        let (result, _) = run_with(&config, "while true { }");
        assert!(matches!(result, Err(VmError::InstructionLimit { limit: 100 })));
    }

    #[test]
    fn test_stack_overflow() {
        let config = RuntimeConfig::default().with_vm_stack_capacity(2);
        let (result, _) = run_with(&config, "print(1, 2, 3)");
        assert!(matches!(result, Err(VmError::StackOverflow { capacity: 2 })));
    }

    #[test]
    fn test_hand_built_chunk_faults() {
        let mut vm = Vm::with_output(&RuntimeConfig::default(), Vec::new());

        let mut chunk = Chunk::new();
        chunk.emit(OpCode::Pop);
        assert!(matches!(vm.run(&chunk), Err(VmError::StackUnderflow { op: "POP" })));

        let mut chunk = Chunk::new();
        chunk.emit_with(OpCode::LoadConst, 7);
        assert!(matches!(vm.run(&chunk), Err(VmError::BadConstant(7))));

        let mut chunk = Chunk::new();
        chunk.emit_with(OpCode::Jump, 99);
        assert!(matches!(vm.run(&chunk), Err(VmError::IpOutOfBounds { ip: 99, .. })));

        // Falling off the end without HALT
        let mut chunk = Chunk::new();
        chunk.emit(OpCode::LoadNull);
        assert!(matches!(vm.run(&chunk), Err(VmError::IpOutOfBounds { ip: 1, len: 1 })));
    }

    #[test]
    fn test_dup_and_print_order() {
        let mut chunk = Chunk::new();
        let a = chunk.add_constant(Value::Str("a".into())) as i64;
        let b = chunk.add_constant(Value::Str("b".into())) as i64;
        chunk.code.extend([
            Instruction { op: OpCode::LoadConst, operand: a },
            Instruction { op: OpCode::LoadConst, operand: b },
            Instruction { op: OpCode::Dup, operand: 0 },
            Instruction { op: OpCode::Print, operand: 3 },
            Instruction { op: OpCode::Halt, operand: 0 },
        ]);
        let mut vm = Vm::with_output(&RuntimeConfig::default(), Vec::new());
        vm.run(&chunk).unwrap();
        assert_eq!(vm.executed(), 5);
        assert_eq!(String::from_utf8(vm.into_output()).unwrap(), "a b b\n");
    }
}
