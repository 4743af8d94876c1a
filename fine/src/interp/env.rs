//! Environment for variable bindings
//!
//! Assignment is local-only: [`Environment::set`] never walks the parent
//! chain, so `x = ...` inside a function creates a new local `x` rather than
//! rebinding an outer one. Blocks of `if`/`while`/`for` do not open a scope.

use super::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared reference to an environment
pub type EnvRef = Rc<RefCell<Environment>>;

/// Environment holding variable bindings
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// Bindings in definition order
    bindings: Vec<(String, Value)>,
    /// Enclosing scope used for lookup only
    parent: Option<EnvRef>,
}

impl Environment {
    /// Create a new global environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new environment with a parent
    pub fn with_parent(parent: EnvRef) -> Self {
        Environment {
            bindings: Vec::new(),
            parent: Some(parent),
        }
    }

    /// Wrap in Rc<RefCell<>>
    pub fn into_ref(self) -> EnvRef {
        Rc::new(RefCell::new(self))
    }

    /// Look up a variable in the scope chain, innermost first.
    /// Returns a copy: value types are independent of the binding.
    pub fn get(&self, name: &str) -> Option<Value> {
        match self.get_local(name) {
            Some(value) => Some(value.clone()),
            None => self.parent.as_ref().and_then(|p| p.borrow().get(name)),
        }
    }

    /// Look up a variable in this scope only
    pub fn get_local(&self, name: &str) -> Option<&Value> {
        self.bindings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Bind `name` in this scope, replacing an existing local binding.
    /// Outer scopes are never touched.
    pub fn set(&mut self, name: &str, value: Value) {
        match self.bindings.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.bindings.push((name.to_string(), value)),
        }
    }

    /// Check if a variable exists in the scope chain
    pub fn contains(&self, name: &str) -> bool {
        self.get_local(name).is_some()
            || self
                .parent
                .as_ref()
                .is_some_and(|p| p.borrow().contains(name))
    }

    /// Own bindings in definition order
    pub fn bindings(&self) -> &[(String, Value)] {
        &self.bindings
    }

    pub fn parent(&self) -> Option<&EnvRef> {
        self.parent.as_ref()
    }
}

/// Create a child environment from a parent reference
pub fn child_env(parent: &EnvRef) -> EnvRef {
    Environment::with_parent(Rc::clone(parent)).into_ref()
}
