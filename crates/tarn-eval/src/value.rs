//! Runtime values of Tarn script.

use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use tarn_types::ast::Block;

use crate::builtins::Builtin;
use crate::env::Environment;
use crate::error::{EvalError, EvalResult};

/// Maximum nesting of lists inside lists.
pub const MAX_LIST_DEPTH: usize = 64;

/// A runtime value.
///
/// Lists are immutable and shared; `push` builds a new list.
#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    String(String),
    Bool(bool),
    Nil,
    List(Rc<List>),
    Function(Rc<Function>),
}

/// The contents of a list value, with its nesting depth.
///
/// A list of scalars has depth 1; `[[1]]` has depth 2.
#[derive(Debug)]
pub struct List {
    items: Vec<Value>,
    depth: usize,
}

impl List {
    /// Fails if the result would nest deeper than [`MAX_LIST_DEPTH`].
    pub fn new(items: Vec<Value>) -> EvalResult<Self> {
        let depth = 1 + items.iter().map(Value::list_depth).max().unwrap_or(0);
        if depth > MAX_LIST_DEPTH {
            return Err(EvalError::NestingTooDeep(MAX_LIST_DEPTH));
        }
        Ok(Self { items, depth })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn into_items(self) -> Vec<Value> {
        self.items
    }
}

impl Deref for List {
    type Target = [Value];

    fn deref(&self) -> &[Value] {
        &self.items
    }
}

/// Something that can be called.
pub enum Function {
    /// A user function together with the scope it was defined in.
    Closure(Closure),
    /// A function provided by the runtime.
    Builtin(Builtin),
}

/// A user-defined function value.
pub struct Closure {
    /// `None` for lambdas.
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Rc<Block>,
    /// The defining scope; kept alive as long as the closure is.
    pub env: Environment,
}

impl Closure {
    /// Name used in error messages.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<lambda>")
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Closure(c) => write!(f, "<fn {}>", c.display_name()),
            Function::Builtin(b) => write!(f, "<builtin {}>", b.name()),
        }
    }
}

impl Value {
    /// Build a list value.
    pub fn list(items: Vec<Value>) -> EvalResult<Self> {
        Ok(Value::List(Rc::new(List::new(items)?)))
    }

    /// How many lists deep this value is; 0 for anything but a list.
    pub fn list_depth(&self) -> usize {
        match self {
            Value::List(list) => list.depth(),
            _ => 0,
        }
    }

    /// The type name reported by `type_of` and in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::Nil => "nil",
            Value::List(_) => "list",
            Value::Function(_) => "function",
        }
    }

    /// `nil` and `false` are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Deep structural equality. Functions are equal only to themselves.
    pub fn structural_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(x), Value::Number(y)) => x == y,
            (Value::String(x), Value::String(y)) => x == y,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Nil, Value::Nil) => true,
            (Value::List(x), Value::List(y)) => {
                x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| a.structural_eq(b))
            }
            (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.structural_eq(other)
    }
}

/// The text rendering used by `print`, `str` and interpolation.
///
/// Integral numbers print without a fractional part.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::String(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Nil => f.write_str("nil"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Function(func) => write!(f, "{func:?}"),
        }
    }
}
