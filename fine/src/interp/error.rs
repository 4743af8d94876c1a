//! Guest exceptions, the call stack, and evaluation control flow
//!
//! Exceptions raised by FineLang programs are ordinary values with an open
//! string kind tag. They travel through evaluation as [`Unwind::Throw`] in a
//! [`Flow`] result, alongside [`Unwind::Return`] for early function exit.

use super::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub const INDEX_ERROR: &str = "IndexError";
pub const KEY_ERROR: &str = "KeyError";
pub const ZERO_DIVISION_ERROR: &str = "ZeroDivisionError";
pub const VALUE_ERROR: &str = "ValueError";
pub const RUNTIME_ERROR: &str = "RuntimeError";
pub const ASSERTION_ERROR: &str = "AssertionError";
pub const RECURSION_ERROR: &str = "RecursionError";
pub const IMPORT_ERROR: &str = "ImportError";
pub const MEMORY_ERROR: &str = "MemoryError";

/// One entry of the call stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub function: String,
    pub file: String,
    pub line: usize,
}

/// A raised exception: kind tag, message, and the stack at the raise point
#[derive(Debug)]
pub struct Exception {
    pub kind: String,
    pub message: String,
    /// Newest frame first
    trace: RefCell<Vec<Frame>>,
}

impl Exception {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Rc<Self> {
        Rc::new(Exception {
            kind: kind.into(),
            message: message.into(),
            trace: RefCell::new(Vec::new()),
        })
    }

    pub fn index_error(message: impl Into<String>) -> Rc<Self> {
        Self::new(INDEX_ERROR, message)
    }

    pub fn key_error(key: &str) -> Rc<Self> {
        Self::new(KEY_ERROR, format!("key not found: '{key}'"))
    }

    pub fn zero_division(message: &str) -> Rc<Self> {
        Self::new(ZERO_DIVISION_ERROR, message)
    }

    pub fn value_error(message: impl Into<String>) -> Rc<Self> {
        Self::new(VALUE_ERROR, message)
    }

    pub fn runtime_error(message: impl Into<String>) -> Rc<Self> {
        Self::new(RUNTIME_ERROR, message)
    }

    pub fn assertion_error(message: impl Into<String>) -> Rc<Self> {
        Self::new(ASSERTION_ERROR, message)
    }

    pub fn recursion_error() -> Rc<Self> {
        Self::new(RECURSION_ERROR, "maximum recursion depth exceeded")
    }

    pub fn import_error(message: impl Into<String>) -> Rc<Self> {
        Self::new(IMPORT_ERROR, message)
    }

    pub fn memory_error(message: impl Into<String>) -> Rc<Self> {
        Self::new(MEMORY_ERROR, message)
    }

    pub fn trace(&self) -> Vec<Frame> {
        self.trace.borrow().clone()
    }

    pub fn set_trace(&self, frames: Vec<Frame>) {
        *self.trace.borrow_mut() = frames;
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let trace = self.trace.borrow();
        if !trace.is_empty() {
            writeln!(f)?;
            writeln!(f, "Traceback (most recent call last):")?;
            for frame in trace.iter() {
                writeln!(
                    f,
                    "  File \"{}\", line {}, in {}",
                    frame.file, frame.line, frame.function
                )?;
            }
        }
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Exception {}

/// Stack of active user-function calls, bounded by `max_depth`
#[derive(Debug, Clone)]
pub struct CallStack {
    /// Oldest frame first
    frames: Vec<Frame>,
    max_depth: usize,
}

impl CallStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            frames: Vec::new(),
            max_depth,
        }
    }

    /// Enter a call. At the depth limit the stack is left unchanged and a
    /// RecursionError carrying the current trace is returned instead.
    pub fn push(&mut self, function: &str, file: &str, line: usize) -> Result<(), Rc<Exception>> {
        if self.frames.len() >= self.max_depth {
            let err = Exception::recursion_error();
            self.attach_trace(&err);
            return Err(err);
        }
        tracing::trace!(function, depth = self.frames.len() + 1, "call");
        self.frames.push(Frame {
            function: function.to_string(),
            file: file.to_string(),
            line,
        });
        Ok(())
    }

    /// Leave the innermost call; no-op when empty
    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Copy of the stack, newest frame first
    pub fn snapshot(&self) -> Vec<Frame> {
        self.frames.iter().rev().cloned().collect()
    }

    /// Replace the exception's trace with the stack as it is right now
    pub fn attach_trace(&self, exception: &Exception) {
        exception.set_trace(self.snapshot());
    }
}

/// Non-local exit from evaluation
#[derive(Debug, Clone)]
pub enum Unwind {
    /// `return` unwinding to the nearest function boundary
    Return(Value),
    /// An exception unwinding to the nearest matching `catch`
    Throw(Rc<Exception>),
}

impl From<Rc<Exception>> for Unwind {
    fn from(exception: Rc<Exception>) -> Self {
        Unwind::Throw(exception)
    }
}

/// Result type for evaluation
pub type Flow<T> = Result<T, Unwind>;
