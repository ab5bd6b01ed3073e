//! Lexical scopes.
//!
//! Environments are shared (`Rc<RefCell<_>>`) because closures keep their
//! defining scope alive after the call that created it has returned, and
//! several closures may capture the same scope. A closure stored in the scope
//! it captures forms a cycle; [`crate::heap`] is what eventually breaks it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::error::{Result, RillError};
use crate::heap::{Heap, HeapRef};
use crate::value::Value;

/// Shared handle to one scope.
pub type EnvRef = Rc<RefCell<Environment>>;

#[derive(Debug)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<EnvRef>,
    heap: HeapRef,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// A root (global) scope. It owns a fresh [`Heap`] that every scope
    /// descending from it registers with.
    pub fn new() -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: None,
            heap: Rc::new(RefCell::new(Heap::new())),
        }
    }

    /// Wraps a fresh child of `enclosing` in a shared handle and registers it
    /// with the root's heap.
    pub fn child_of(enclosing: &EnvRef) -> EnvRef {
        let heap: HeapRef = Rc::clone(&enclosing.borrow().heap);

        let scope: EnvRef = Rc::new(RefCell::new(Environment {
            values: HashMap::new(),
            enclosing: Some(Rc::clone(enclosing)),
            heap: Rc::clone(&heap),
        }));

        heap.borrow_mut().track_scope(&scope);
        scope
    }

    pub fn heap(&self) -> HeapRef {
        Rc::clone(&self.heap)
    }

    pub(crate) fn enclosing(&self) -> Option<&EnvRef> {
        self.enclosing.as_ref()
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.values()
    }

    /// Removes every binding and hands them back, so the caller can drop them
    /// once this scope is no longer borrowed.
    pub(crate) fn take_values(&mut self) -> HashMap<String, Value> {
        std::mem::take(&mut self.values)
    }

    /// Introduces or overwrites a binding in this scope only.
    pub fn define(&mut self, name: &str, value: Value) {
        debug!("Defining '{}'", name);
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str, line: usize) -> Result<Value> {
        if let Some(value) = self.values.get(name) {
            Ok(value.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name, line)
        } else {
            Err(undefined(name, line))
        }
    }

    /// Mutates the nearest existing binding; never creates one.
    pub fn assign(&mut self, name: &str, value: Value, line: usize) -> Result<()> {
        if let Some(slot) = self.values.get_mut(name) {
            *slot = value;
            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value, line)
        } else {
            Err(undefined(name, line))
        }
    }

    /// Looks `name` up exactly `distance` scopes above `env`.
    pub fn get_at(env: &EnvRef, distance: usize, name: &str, line: usize) -> Result<Value> {
        let scope: EnvRef = Self::ancestor(env, distance, name, line)?;
        let found: Option<Value> = scope.borrow().values.get(name).cloned();

        found.ok_or_else(|| undefined(name, line))
    }

    /// Assigns `name` exactly `distance` scopes above `env`.
    pub fn assign_at(
        env: &EnvRef,
        distance: usize,
        name: &str,
        value: Value,
        line: usize,
    ) -> Result<()> {
        let scope: EnvRef = Self::ancestor(env, distance, name, line)?;
        let mut scope = scope.borrow_mut();

        match scope.values.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(undefined(name, line)),
        }
    }

    fn ancestor(env: &EnvRef, distance: usize, name: &str, line: usize) -> Result<EnvRef> {
        let mut scope: EnvRef = Rc::clone(env);

        for _ in 0..distance {
            let parent: Option<EnvRef> = scope.borrow().enclosing.clone();

            scope = parent.ok_or_else(|| undefined(name, line))?;
        }

        Ok(scope)
    }
}

fn undefined(name: &str, line: usize) -> RillError {
    RillError::runtime(line, format!("Undefined variable '{}'.", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_scope_delegates_and_shadows() {
        let global: EnvRef = Rc::new(RefCell::new(Environment::new()));
        global.borrow_mut().define("x", Value::Number(1.0));

        let inner: EnvRef = Environment::child_of(&global);
        assert_eq!(inner.borrow().get("x", 1).unwrap(), Value::Number(1.0));

        inner.borrow_mut().define("x", Value::Number(2.0));
        assert_eq!(inner.borrow().get("x", 1).unwrap(), Value::Number(2.0));
        assert_eq!(global.borrow().get("x", 1).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn assign_never_creates_a_binding() {
        let global: EnvRef = Rc::new(RefCell::new(Environment::new()));
        let inner: EnvRef = Environment::child_of(&global);

        let err = inner.borrow_mut().assign("y", Value::Nil, 7).unwrap_err();
        assert_eq!(err.message(), "Undefined variable 'y'.");
        assert_eq!(err.line(), Some(7));
        assert!(global.borrow().get("y", 7).is_err());
    }

    #[test]
    fn distance_lookup_walks_exact_hops() {
        let global: EnvRef = Rc::new(RefCell::new(Environment::new()));
        global.borrow_mut().define("a", Value::Bool(true));
        let middle: EnvRef = Environment::child_of(&global);
        middle.borrow_mut().define("a", Value::Bool(false));
        let inner: EnvRef = Environment::child_of(&middle);

        assert_eq!(
            Environment::get_at(&inner, 2, "a", 1).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            Environment::get_at(&inner, 1, "a", 1).unwrap(),
            Value::Bool(false)
        );

        Environment::assign_at(&inner, 2, "a", Value::Nil, 1).unwrap();
        assert_eq!(global.borrow().get("a", 1).unwrap(), Value::Nil);
        assert!(Environment::get_at(&inner, 0, "a", 1).is_err());
        assert!(Environment::get_at(&inner, 5, "a", 1).is_err());
    }
}
