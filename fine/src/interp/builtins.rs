//! Built-in functions and collection methods
//!
//! Free functions are resolved by name before any user binding is consulted,
//! so a user `fn len(x)` can never shadow `len`. The higher-order builtins
//! (`map`, `filter`, `reduce`) and `print` need the interpreter and are
//! dispatched from `eval`; the rest are pure functions of their arguments.

use super::error::Exception;
use super::ops::{OpResult, MAX_SEQUENCE_LEN};
use super::value::{format_number, Dict, Value};

/// Built-in free function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Range,
    Len,
    Sum,
    Keys,
    Values,
    Map,
    Filter,
    Reduce,
    IsNull,
    IsNumber,
    IsString,
    IsBool,
    IsArray,
    IsDict,
    IsMatrix,
    TypeOf,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "print" => Builtin::Print,
            "range" => Builtin::Range,
            "len" => Builtin::Len,
            "sum" => Builtin::Sum,
            "keys" => Builtin::Keys,
            "values" => Builtin::Values,
            "map" => Builtin::Map,
            "filter" => Builtin::Filter,
            "reduce" => Builtin::Reduce,
            "is_null" => Builtin::IsNull,
            "is_number" => Builtin::IsNumber,
            "is_string" => Builtin::IsString,
            "is_bool" => Builtin::IsBool,
            "is_array" => Builtin::IsArray,
            "is_dict" => Builtin::IsDict,
            "is_matrix" => Builtin::IsMatrix,
            "typeof" => Builtin::TypeOf,
            _ => return None,
        })
    }

    /// Evaluate a builtin that needs no interpreter access.
    /// Returns None for `print` and the higher-order builtins.
    pub fn call_pure(self, args: &[Value]) -> Option<OpResult> {
        let first = args.first();
        let value = match self {
            Builtin::Print | Builtin::Map | Builtin::Filter | Builtin::Reduce => return None,
            Builtin::Range => match args {
                [start, end, ..] => return Some(range(start, end)),
                _ => Value::Null,
            },
            Builtin::Len => first.map_or(Value::Null, len),
            Builtin::Sum => match first {
                Some(Value::Array(items)) => {
                    Value::Number(items.iter().filter_map(Value::as_number).sum())
                }
                _ => Value::Null,
            },
            Builtin::Keys => match first {
                Some(Value::Dict(dict)) => dict_keys(dict),
                _ => Value::Null,
            },
            Builtin::Values => match first {
                Some(Value::Dict(dict)) => Value::Array(dict.values().cloned().collect()),
                _ => Value::Null,
            },
            Builtin::IsNull => predicate(first, Value::is_null),
            Builtin::IsNumber => predicate(first, |v| matches!(v, Value::Number(_))),
            Builtin::IsString => predicate(first, |v| matches!(v, Value::Str(_))),
            Builtin::IsBool => predicate(first, |v| match v {
                Value::Bool(_) => true,
                Value::Number(n) => *n == 0.0 || *n == 1.0,
                _ => false,
            }),
            Builtin::IsArray => predicate(first, |v| matches!(v, Value::Array(_))),
            Builtin::IsDict => predicate(first, |v| matches!(v, Value::Dict(_))),
            Builtin::IsMatrix => predicate(first, |v| matches!(v, Value::Matrix(_))),
            Builtin::TypeOf => Value::Str(first.map_or("undefined", Value::type_name).to_string()),
        };
        Some(Ok(value))
    }
}

fn predicate(arg: Option<&Value>, test: impl Fn(&Value) -> bool) -> Value {
    Value::from_bool(arg.is_some_and(test))
}

/// `range(s, e)`: integers from `s` up to but excluding `e`
fn range(start: &Value, end: &Value) -> OpResult {
    let start = start.as_number().unwrap_or(0.0).trunc();
    let end = end.as_number().unwrap_or(0.0).trunc();
    // A NaN bound fails the comparison and casts to an empty range
    if end - start > MAX_SEQUENCE_LEN as f64 {
        return Err(Exception::memory_error(format!(
            "range too large: {} elements",
            format_number(end - start)
        )));
    }
    let (start, end) = (start as i64, end as i64);
    Ok(Value::Array((start..end).map(|i| Value::Number(i as f64)).collect()))
}

fn len(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Number(items.len() as f64),
        Value::Dict(dict) => Value::Number(dict.len() as f64),
        Value::Str(s) => Value::Number(s.len() as f64),
        _ => Value::Null,
    }
}

fn dict_keys(dict: &Dict) -> Value {
    Value::Array(dict.keys().map(|k| Value::Str(k.to_string())).collect())
}

fn index_number(index: Option<usize>) -> Value {
    Value::Number(index.map_or(-1.0, |i| i as f64))
}

/// Method on a value-type receiver. Unknown methods yield Null.
pub fn value_method(receiver: &Value, method: &str, args: &[Value]) -> Value {
    match receiver {
        Value::Array(items) => array_method(items, method, args),
        Value::Str(s) => string_method(s, method, args),
        Value::Dict(dict) => dict_method(dict, method, args),
        _ => Value::Null,
    }
}

fn array_method(items: &[Value], method: &str, args: &[Value]) -> Value {
    match (method, args.first()) {
        ("append", Some(value)) => {
            let mut out = items.to_vec();
            out.push(value.clone());
            Value::Array(out)
        }
        ("reverse", _) => Value::Array(items.iter().rev().cloned().collect()),
        ("contains", Some(needle)) => Value::from_bool(items.contains(needle)),
        ("index_of", Some(needle)) => index_number(items.iter().position(|v| v == needle)),
        ("min", _) => items
            .iter()
            .filter_map(Value::as_number)
            .reduce(f64::min)
            .map_or(Value::Null, Value::Number),
        ("max", _) => items
            .iter()
            .filter_map(Value::as_number)
            .reduce(f64::max)
            .map_or(Value::Null, Value::Number),
        ("len", _) => Value::Number(items.len() as f64),
        _ => Value::Null,
    }
}

fn string_method(s: &str, method: &str, args: &[Value]) -> Value {
    match (method, args.first()) {
        ("contains", Some(needle)) => Value::from_bool(needle.as_str().is_some_and(|n| s.contains(n))),
        ("index_of", Some(needle)) => index_number(needle.as_str().and_then(|n| s.find(n))),
        ("upper", _) => Value::Str(s.to_uppercase()),
        ("lower", _) => Value::Str(s.to_lowercase()),
        ("len", _) => Value::Number(s.len() as f64),
        _ => Value::Null,
    }
}

fn dict_method(dict: &Dict, method: &str, args: &[Value]) -> Value {
    match (method, args.first()) {
        ("keys", _) => dict_keys(dict),
        ("values", _) => Value::Array(dict.values().cloned().collect()),
        ("has", Some(key)) => Value::from_bool(key.as_str().is_some_and(|k| dict.contains_key(k))),
        ("len", _) => Value::Number(dict.len() as f64),
        _ => Value::Null,
    }
}
