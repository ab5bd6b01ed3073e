//! Cycle collection for scopes and instances.
//!
//! A function declared in a scope captures that scope, and the scope binds the
//! function, so reference counting alone never frees either. The same goes for
//! an instance that stores one of its own bound methods. Every scope created
//! below a global scope, and every instance, is therefore registered here
//! through a `Weak` handle.
//!
//! [`collect`] marks everything reachable from a root scope and empties the
//! bindings of every other registered scope and the fields of every other
//! instance. Emptying them drops the `Rc`s that formed the cycles. The
//! interpreter only calls it where no value lives outside the scope chain,
//! which is between statements that run outside any function call.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use log::{debug, info};

use crate::environment::{EnvRef, Environment};
use crate::value::{Callable, Class, Instance, Value};

/// Registrations tolerated before the first collection.
const FIRST_COLLECTION: usize = 1024;

pub type HeapRef = Rc<RefCell<Heap>>;

#[derive(Debug)]
pub struct Heap {
    scopes: Vec<Weak<RefCell<Environment>>>,
    instances: Vec<Weak<Instance>>,
    next_collection: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Self {
            scopes: Vec::new(),
            instances: Vec::new(),
            next_collection: FIRST_COLLECTION,
        }
    }

    pub fn track_scope(&mut self, scope: &EnvRef) {
        self.scopes.push(Rc::downgrade(scope));
    }

    pub fn track_instance(&mut self, instance: &Rc<Instance>) {
        self.instances.push(Rc::downgrade(instance));
    }

    /// `true` once enough registrations piled up since the last collection.
    pub fn should_collect(&self) -> bool {
        self.scopes.len() + self.instances.len() >= self.next_collection
    }

    /// Registered scopes that are still allocated.
    pub fn live_scopes(&self) -> usize {
        self.scopes.iter().filter(|s| s.strong_count() > 0).count()
    }

    /// Registered instances that are still allocated.
    pub fn live_instances(&self) -> usize {
        self.instances.iter().filter(|i| i.strong_count() > 0).count()
    }

    fn take(&mut self) -> (Vec<Weak<RefCell<Environment>>>, Vec<Weak<Instance>>) {
        (
            std::mem::take(&mut self.scopes),
            std::mem::take(&mut self.instances),
        )
    }
}

/// Frees every registered scope and instance not reachable from `root`.
pub fn collect(heap: &HeapRef, root: &EnvRef) {
    let marks: Marks = Marks::trace(root);

    // Nothing may borrow the heap while objects are being dropped.
    let (scopes, instances) = heap.borrow_mut().take();
    let before: usize = scopes.len() + instances.len();

    let mut kept_scopes: Vec<Weak<RefCell<Environment>>> = Vec::new();
    for weak in scopes {
        let Some(scope) = weak.upgrade() else {
            continue;
        };

        if marks.scopes.contains(&address(&scope)) {
            kept_scopes.push(weak);
        } else {
            release_scope(&scope);
        }
    }

    let mut kept_instances: Vec<Weak<Instance>> = Vec::new();
    for weak in instances {
        let Some(instance) = weak.upgrade() else {
            continue;
        };

        if marks.instances.contains(&address(&instance)) {
            kept_instances.push(weak);
        } else {
            instance.clear_fields();
        }
    }

    let mut heap = heap.borrow_mut();
    kept_scopes.append(&mut heap.scopes);
    kept_instances.append(&mut heap.instances);
    heap.scopes = kept_scopes;
    heap.instances = kept_instances;

    let survivors: usize = heap.scopes.len() + heap.instances.len();
    heap.next_collection = FIRST_COLLECTION.max(survivors * 2);

    debug!(
        "Collected {} of {} tracked objects, next collection at {}",
        before.saturating_sub(survivors),
        before,
        heap.next_collection
    );
}

/// Empties every registered scope and instance plus `root` itself. Used when
/// the owning interpreter goes away.
pub fn release_all(heap: &HeapRef, root: &EnvRef) {
    let (scopes, instances) = heap.borrow_mut().take();

    info!(
        "Releasing {} scopes and {} instances",
        scopes.len(),
        instances.len()
    );

    for scope in scopes.iter().filter_map(Weak::upgrade) {
        release_scope(&scope);
    }

    for instance in instances.iter().filter_map(Weak::upgrade) {
        instance.clear_fields();
    }

    release_scope(root);
}

fn release_scope(scope: &EnvRef) {
    let values: HashMap<String, Value> = scope.borrow_mut().take_values();
    drop(values);
}

fn address<T>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}

/// Addresses of everything reachable from a root scope.
#[derive(Default)]
struct Marks {
    scopes: HashSet<usize>,
    instances: HashSet<usize>,
    classes: HashSet<usize>,
}

impl Marks {
    /// Iterative so long instance chains cannot exhaust the native stack.
    fn trace(root: &EnvRef) -> Self {
        let mut marks = Marks::default();
        let mut scopes: Vec<EnvRef> = vec![Rc::clone(root)];
        let mut values: Vec<Value> = Vec::new();

        loop {
            if let Some(scope) = scopes.pop() {
                if !marks.scopes.insert(address(&scope)) {
                    continue;
                }

                let guard = scope.borrow();
                values.extend(guard.values().cloned());
                if let Some(parent) = guard.enclosing() {
                    scopes.push(Rc::clone(parent));
                }
            } else if let Some(value) = values.pop() {
                marks.visit(value, &mut scopes, &mut values);
            } else {
                break;
            }
        }

        marks
    }

    fn visit(&mut self, value: Value, scopes: &mut Vec<EnvRef>, values: &mut Vec<Value>) {
        match value {
            Value::Callable(Callable::Function(function)) => {
                scopes.push(Rc::clone(&function.closure));
            }

            Value::Callable(Callable::BoundMethod(bound)) => {
                scopes.push(Rc::clone(&bound.method.closure));
            }

            Value::Callable(Callable::Class(class)) => self.visit_class(&class, scopes),

            Value::Instance(instance) => {
                if self.instances.insert(address(&instance)) {
                    self.visit_class(&instance.class, scopes);
                    values.extend(instance.field_values());
                }
            }

            Value::Nil
            | Value::Bool(_)
            | Value::Number(_)
            | Value::String(_)
            | Value::Callable(Callable::Native(_)) => {}
        }
    }

    fn visit_class(&mut self, class: &Rc<Class>, scopes: &mut Vec<EnvRef>) {
        let mut next: Option<Rc<Class>> = Some(Rc::clone(class));

        while let Some(class) = next {
            if !self.classes.insert(address(&class)) {
                break;
            }

            scopes.extend(class.methods.values().map(|m| Rc::clone(&m.closure)));
            next = class.superclass.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stmt::FunctionDecl;
    use crate::token::{Token, TokenType};

    fn function_in(scope: &EnvRef) -> Value {
        let declaration = Rc::new(FunctionDecl {
            name: Token::synthetic(TokenType::IDENTIFIER, "f", 1),
            params: Vec::new(),
            body: Vec::new(),
        });

        Value::Callable(Callable::Function(Rc::new(crate::value::Function::new(
            declaration,
            Rc::clone(scope),
            false,
        ))))
    }

    #[test]
    fn unreachable_cycle_is_freed() {
        let global: EnvRef = Rc::new(RefCell::new(Environment::new()));
        let heap: HeapRef = global.borrow().heap();

        let local: EnvRef = Environment::child_of(&global);
        let closure = function_in(&local);
        local.borrow_mut().define("f", closure);

        let weak = Rc::downgrade(&local);
        drop(local);
        assert!(weak.upgrade().is_some());

        collect(&heap, &global);
        assert!(weak.upgrade().is_none());
        assert_eq!(heap.borrow().live_scopes(), 0);
    }

    #[test]
    fn reachable_cycle_survives() {
        let global: EnvRef = Rc::new(RefCell::new(Environment::new()));
        let heap: HeapRef = global.borrow().heap();

        let local: EnvRef = Environment::child_of(&global);
        let closure = function_in(&local);
        local.borrow_mut().define("f", closure.clone());
        global.borrow_mut().define("g", closure);

        let weak = Rc::downgrade(&local);
        drop(local);

        collect(&heap, &global);
        let local = weak.upgrade().expect("scope is reachable through g");
        assert!(local.borrow().get("f", 1).is_ok());
        assert_eq!(heap.borrow().live_scopes(), 1);
    }

    #[test]
    fn release_all_breaks_everything() {
        let global: EnvRef = Rc::new(RefCell::new(Environment::new()));
        let heap: HeapRef = global.borrow().heap();

        let local: EnvRef = Environment::child_of(&global);
        let closure = function_in(&local);
        local.borrow_mut().define("f", closure.clone());
        global.borrow_mut().define("g", closure);

        let weak = Rc::downgrade(&local);
        drop(local);

        release_all(&heap, &global);
        assert!(weak.upgrade().is_none());
    }
}
