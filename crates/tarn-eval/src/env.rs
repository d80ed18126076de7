//! Scoped variable environment for the Tarn evaluator.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{EvalError, EvalResult};
use crate::value::{Function, Value};

/// A single scope level.
struct Scope {
    bindings: BTreeMap<String, Value>,
    enclosing: Option<Environment>,
}

/// Scopes are torn down with an explicit work list. A long chain of
/// closures, each holding the scope of the previous one, would otherwise be
/// freed by one nested drop per link and overflow the stack.
impl Drop for Scope {
    fn drop(&mut self) {
        let mut values: Vec<Value> = std::mem::take(&mut self.bindings).into_values().collect();
        let mut scopes: Vec<Rc<RefCell<Scope>>> =
            self.enclosing.take().map(|env| env.scope).into_iter().collect();
        loop {
            if let Some(value) = values.pop() {
                match value {
                    Value::List(list) => {
                        if let Ok(list) = Rc::try_unwrap(list) {
                            values.extend(list.into_items());
                        }
                    }
                    Value::Function(function) => {
                        if let Ok(Function::Closure(closure)) = Rc::try_unwrap(function) {
                            scopes.push(closure.env.scope);
                        }
                    }
                    _ => {}
                }
            } else if let Some(scope) = scopes.pop() {
                if let Ok(cell) = Rc::try_unwrap(scope) {
                    let mut scope = cell.into_inner();
                    values.extend(std::mem::take(&mut scope.bindings).into_values());
                    scopes.extend(scope.enclosing.take().map(|env| env.scope));
                }
            } else {
                break;
            }
        }
    }
}

/// Handle to one scope in a chain of scopes.
///
/// Variables are looked up from this scope outward through the enclosing
/// links. `define` always creates in this scope; `assign` updates the
/// nearest scope where the variable exists. Cloning the handle shares the
/// scope, which is how closures keep their defining scope alive.
#[derive(Clone)]
pub struct Environment {
    scope: Rc<RefCell<Scope>>,
}

/// A non-owning handle, used to release captured scopes after a run.
#[derive(Clone)]
pub struct WeakEnvironment {
    scope: Weak<RefCell<Scope>>,
}

impl Environment {
    /// Create a root environment with no enclosing scope.
    pub fn new() -> Self {
        Self::with_enclosing(None)
    }

    fn with_enclosing(enclosing: Option<Environment>) -> Self {
        Self {
            scope: Rc::new(RefCell::new(Scope {
                bindings: BTreeMap::new(),
                enclosing,
            })),
        }
    }

    /// Create a new scope linked to this one.
    pub fn child_scope(&self) -> Self {
        Self::with_enclosing(Some(self.clone()))
    }

    /// Define a variable in this scope, shadowing any outer binding.
    pub fn define(&self, name: &str, value: Value) {
        self.scope
            .borrow_mut()
            .bindings
            .insert(name.to_string(), value);
    }

    /// Look up a variable, searching from this scope outward.
    pub fn get(&self, name: &str) -> EvalResult<Value> {
        let mut current = self.clone();
        loop {
            let next = {
                let scope = current.scope.borrow();
                if let Some(value) = scope.bindings.get(name) {
                    return Ok(value.clone());
                }
                scope.enclosing.clone()
            };
            match next {
                Some(env) => current = env,
                None => return Err(EvalError::UndefinedVariable(name.to_string())),
            }
        }
    }

    /// Update a variable in the nearest scope where it exists.
    pub fn assign(&self, name: &str, value: Value) -> EvalResult<()> {
        let mut current = self.clone();
        loop {
            let next = {
                let mut scope = current.scope.borrow_mut();
                if let Some(slot) = scope.bindings.get_mut(name) {
                    *slot = value;
                    return Ok(());
                }
                scope.enclosing.clone()
            };
            match next {
                Some(env) => current = env,
                None => return Err(EvalError::UndefinedVariable(name.to_string())),
            }
        }
    }

    /// Returns `true` if this scope itself binds `name`.
    pub fn defines_locally(&self, name: &str) -> bool {
        self.scope.borrow().bindings.contains_key(name)
    }

    pub fn downgrade(&self) -> WeakEnvironment {
        WeakEnvironment {
            scope: Rc::downgrade(&self.scope),
        }
    }

    /// Drop every binding and the enclosing link.
    ///
    /// A closure stored in the scope it captured forms a reference cycle;
    /// clearing breaks it so the scopes can be freed.
    pub fn clear(&self) {
        let (bindings, enclosing) = {
            let mut scope = self.scope.borrow_mut();
            (
                std::mem::take(&mut scope.bindings),
                scope.enclosing.take(),
            )
        };
        // Dropped outside the borrow: values may own closures over this scope
        drop(bindings);
        drop(enclosing);
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Names only: values may hold closures that point back here
        match self.scope.try_borrow() {
            Ok(scope) => f
                .debug_struct("Environment")
                .field("names", &scope.bindings.keys().collect::<Vec<_>>())
                .field("has_enclosing", &scope.enclosing.is_some())
                .finish(),
            Err(_) => f.write_str("Environment(<borrowed>)"),
        }
    }
}

impl WeakEnvironment {
    /// Returns `true` if the scope has already been freed.
    pub fn is_dead(&self) -> bool {
        self.scope.strong_count() == 0
    }

    /// Clear the scope if it is still alive.
    pub fn clear(&self) {
        if let Some(scope) = self.scope.upgrade() {
            Environment { scope }.clear();
        }
    }
}
