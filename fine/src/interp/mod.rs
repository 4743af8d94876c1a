//! Tree-walking interpreter
//!
//! The full language: values, scopes, exceptions with tracebacks, classes,
//! modules and matrices.

mod builtins;
mod env;
mod error;
mod eval;
mod module;
mod ops;
mod value;

pub use builtins::{value_method, Builtin};
pub use env::{child_env, EnvRef, Environment};
pub use error::{
    CallStack, Exception, Flow, Frame, Unwind, ASSERTION_ERROR, IMPORT_ERROR, INDEX_ERROR,
    KEY_ERROR, MEMORY_ERROR, RECURSION_ERROR, RUNTIME_ERROR, VALUE_ERROR, ZERO_DIVISION_ERROR,
};
pub use eval::Interpreter;
pub use module::{binding_name, ModuleError, ModuleLoader, ModuleSource, MODULE_EXTENSION};
pub use ops::{binary, repeat, unary, OpResult, MAX_SEQUENCE_LEN};
pub use value::{format_number, Class, Dict, Function, Instance, Matrix, Module, Value};
