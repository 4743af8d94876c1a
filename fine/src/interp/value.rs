//! Runtime values shared by the interpreter and the VM
//!
//! Number, String, Bool, Null, Array, Dict and Matrix own their data, so
//! `clone()` is a deep copy and every read through a binding is independent.
//! Function, Class, Instance, Module and Exception are `Rc` handles: cloning
//! aliases the same object, which is what makes `this.x = ...` visible to
//! every holder of an instance.

use super::env::EnvRef;
use super::error::Exception;
use crate::ast::FnDef;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Runtime value
#[derive(Debug, Clone)]
pub enum Value {
    /// 64-bit floating point; the only numeric type
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Array(Vec<Value>),
    Dict(Dict),
    Matrix(Matrix),
    Function(Rc<Function>),
    Class(Rc<Class>),
    Instance(Rc<RefCell<Instance>>),
    Exception(Rc<Exception>),
    Module(Rc<Module>),
}

/// Insertion-ordered map with unique string keys
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dict {
    entries: Vec<(String, Value)>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Replace the value for an existing key, or append a new entry
    pub fn insert(&mut self, key: String, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for Dict {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut dict = Dict::new();
        for (k, v) in iter {
            dict.insert(k, v);
        }
        dict
    }
}

/// Dense row-major matrix of numbers
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Build a matrix; `data.len()` must equal `rows * cols`
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Option<Self> {
        (data.len() == rows * cols).then_some(Self { rows, cols, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    pub fn row(&self, row: usize) -> Option<&[f64]> {
        (row < self.rows).then(|| &self.data[row * self.cols..(row + 1) * self.cols])
    }

    /// Dimensions as written in error messages: `(RxC)`
    pub fn shape(&self) -> String {
        format!("({}x{})", self.rows, self.cols)
    }

    pub fn zip_with(&self, other: &Matrix, f: impl Fn(f64, f64) -> f64) -> Option<Matrix> {
        if self.rows != other.rows || self.cols != other.cols {
            return None;
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| f(*a, *b))
            .collect();
        Some(Matrix { data, ..*self })
    }

    pub fn matmul(&self, other: &Matrix) -> Option<Matrix> {
        if self.cols != other.rows {
            return None;
        }
        let mut out = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for j in 0..other.cols {
                let sum = (0..self.cols).map(|k| self.get(i, k) * other.get(k, j)).sum();
                out.set(i, j, sum);
            }
        }
        Some(out)
    }

    pub fn scale(&self, factor: f64) -> Matrix {
        Matrix {
            data: self.data.iter().map(|x| x * factor).collect(),
            ..*self
        }
    }
}

/// A user function together with the scope it was defined in
pub struct Function {
    pub def: Rc<FnDef>,
    pub closure: EnvRef,
}

// The closure usually contains the function itself.
impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.def.name)
            .field("params", &self.def.params)
            .finish_non_exhaustive()
    }
}

/// Class with inheritance already flattened into its own field and method lists
#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub parent: Option<String>,
    pub fields: Vec<String>,
    pub methods: Vec<Rc<FnDef>>,
}

impl Class {
    pub fn method(&self, name: &str) -> Option<&Rc<FnDef>> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// Instance with parallel field-name / field-value arrays
#[derive(Debug)]
pub struct Instance {
    pub class_name: String,
    pub parent: Option<String>,
    pub fields: Vec<String>,
    pub values: Vec<Value>,
}

impl Instance {
    /// Every declared field starts as Null
    pub fn new(class: &Class) -> Self {
        Self {
            class_name: class.name.clone(),
            parent: class.parent.clone(),
            fields: class.fields.clone(),
            values: vec![Value::Null; class.fields.len()],
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .position(|f| f == field)
            .map(|i| &self.values[i])
    }

    /// Update an existing field; returns false if the class has no such field
    pub fn set(&mut self, field: &str, value: Value) -> bool {
        match self.fields.iter().position(|f| f == field) {
            Some(i) => {
                self.values[i] = value;
                true
            }
            None => false,
        }
    }
}

/// A loaded module and the scope holding its top-level bindings
#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub exports: EnvRef,
}

impl Value {
    /// Truthiness shared by both engines: nonzero numbers and `true`
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::Bool(b) => *b,
            _ => false,
        }
    }

    /// Type name as reported by `typeof`
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::Null => "null",
            Value::Array(_) => "array",
            Value::Dict(_) => "dict",
            Value::Matrix(_) => "matrix",
            Value::Function(_) => "function",
            Value::Class(_) => "class",
            Value::Instance(_) => "instance",
            Value::Exception(_) => "exception",
            Value::Module(_) => "module",
        }
    }

    pub fn from_bool(b: bool) -> Value {
        Value::Number(if b { 1.0 } else { 0.0 })
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Format a number the way programs print it: integral values that fit in
/// an `i32` without a fraction, everything else like C's `%g`.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && (f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&n) {
        return format!("{}", n as i32);
    }
    format_g(n)
}

fn format_g(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    const PRECISION: i32 = 6;
    let sci = format!("{:.*e}", (PRECISION - 1) as usize, n);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    if exp < -4 || exp >= PRECISION {
        let mantissa = trim_fraction(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    } else {
        let decimals = (PRECISION - 1 - exp).max(0) as usize;
        trim_fraction(&format!("{n:.decimals$}")).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

fn write_seq<'a>(f: &mut fmt::Formatter<'_>, items: impl Iterator<Item = &'a Value>) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "null"),
            Value::Array(items) => {
                write!(f, "[")?;
                write_seq(f, items.iter())?;
                write!(f, "]")
            }
            Value::Dict(dict) => {
                write!(f, "{{")?;
                for (i, (k, v)) in dict.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Matrix(m) => {
                writeln!(f, "Matrix({}x{})[", m.rows, m.cols)?;
                for r in 0..m.rows {
                    write!(f, "  [")?;
                    for c in 0..m.cols {
                        if c > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", format_g(m.get(r, c)))?;
                    }
                    write!(f, "]")?;
                    if r + 1 < m.rows {
                        write!(f, ",")?;
                    }
                    writeln!(f)?;
                }
                write!(f, "]")
            }
            Value::Function(_) => write!(f, "<function>"),
            Value::Class(class) => write!(f, "<class {}>", class.name),
            Value::Instance(inst) => write!(f, "<{} instance>", inst.borrow().class_name),
            Value::Exception(exc) => write!(f, "{exc}"),
            Value::Module(module) => write!(f, "<module '{}'>", module.name),
        }
    }
}

impl PartialEq for Value {
    /// Structural for value types, identity for reference types
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Matrix(a), Value::Matrix(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}
