//! Functions preloaded into every run's root scope.

use crate::error::{EvalError, EvalResult};
use crate::evaluator::Interpreter;
use crate::value::Value;

/// Largest list `range` will build.
pub const MAX_RANGE_LEN: usize = 1_000_000;

/// A runtime-provided function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// `print(values...)` — joined by spaces, ends the line.
    Print,
    /// `write(values...)` — like `print` without the newline.
    Write,
    /// `input([prompt])` — waits for a line from the peer.
    Input,
    Len,
    Str,
    Num,
    TypeOf,
    Range,
    Push,
    ReadFile,
    WriteFile,
    AppendFile,
}

impl Builtin {
    pub const ALL: &'static [Builtin] = &[
        Builtin::Print,
        Builtin::Write,
        Builtin::Input,
        Builtin::Len,
        Builtin::Str,
        Builtin::Num,
        Builtin::TypeOf,
        Builtin::Range,
        Builtin::Push,
        Builtin::ReadFile,
        Builtin::WriteFile,
        Builtin::AppendFile,
    ];

    /// The global name the builtin is bound to.
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Write => "write",
            Builtin::Input => "input",
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::Num => "num",
            Builtin::TypeOf => "type_of",
            Builtin::Range => "range",
            Builtin::Push => "push",
            Builtin::ReadFile => "read_file",
            Builtin::WriteFile => "write_file",
            Builtin::AppendFile => "append_file",
        }
    }

    /// Accepted argument counts, `None` for variadic.
    fn arity(self) -> Option<(usize, usize)> {
        match self {
            Builtin::Print | Builtin::Write => None,
            Builtin::Input => Some((0, 1)),
            Builtin::Len | Builtin::Str | Builtin::Num | Builtin::TypeOf | Builtin::ReadFile => {
                Some((1, 1))
            }
            Builtin::Range => Some((1, 2)),
            Builtin::Push | Builtin::WriteFile | Builtin::AppendFile => Some((2, 2)),
        }
    }

    fn check_arity(self, got: usize) -> EvalResult<()> {
        let Some((min, max)) = self.arity() else {
            return Ok(());
        };
        if (min..=max).contains(&got) {
            return Ok(());
        }
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{min} or {max}")
        };
        Err(EvalError::ArityMismatch {
            name: self.name().to_string(),
            expected,
            got,
        })
    }
}

/// Render values the way `print` does: displayed and joined by one space.
fn join_values(args: &[Value]) -> String {
    args.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn expect_string<'v>(builtin: Builtin, value: &'v Value) -> EvalResult<&'v str> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(EvalError::TypeMismatch(format!(
            "{}() expects a string, got {}",
            builtin.name(),
            other.type_name()
        ))),
    }
}

fn expect_whole_number(builtin: Builtin, value: &Value) -> EvalResult<f64> {
    match value {
        Value::Number(n) if n.fract() == 0.0 => Ok(*n),
        other => Err(EvalError::TypeMismatch(format!(
            "{}() expects a whole number, got {other}",
            builtin.name()
        ))),
    }
}

impl Interpreter<'_> {
    /// Dispatch a builtin call.
    pub(crate) fn call_builtin(&mut self, builtin: Builtin, args: Vec<Value>) -> EvalResult<Value> {
        builtin.check_arity(args.len())?;
        match builtin {
            Builtin::Print => {
                self.io.emit(&join_values(&args), "\n");
                Ok(Value::Nil)
            }
            Builtin::Write => {
                self.io.emit(&join_values(&args), "");
                Ok(Value::Nil)
            }
            Builtin::Input => {
                if let Some(prompt) = args.first() {
                    self.io.emit(&prompt.to_string(), "");
                }
                self.tick()?;
                let text = self.io.request_input()?;
                self.tick()?;
                Ok(Value::String(text))
            }
            Builtin::Len => match &args[0] {
                Value::List(items) => Ok(Value::Number(items.len() as f64)),
                Value::String(s) => Ok(Value::Number(s.chars().count() as f64)),
                other => Err(EvalError::TypeMismatch(format!(
                    "len() expects a list or string, got {}",
                    other.type_name()
                ))),
            },
            Builtin::Str => Ok(Value::String(args[0].to_string())),
            Builtin::Num => match &args[0] {
                Value::Number(n) => Ok(Value::Number(*n)),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .map(Value::Number)
                    .ok_or_else(|| EvalError::Builtin(format!("cannot convert '{s}' to a number"))),
                Value::Bool(b) => Ok(Value::Number(if *b { 1.0 } else { 0.0 })),
                other => Err(EvalError::TypeMismatch(format!(
                    "num() cannot convert {}",
                    other.type_name()
                ))),
            },
            Builtin::TypeOf => Ok(Value::String(args[0].type_name().to_string())),
            Builtin::Range => {
                let (start, end) = match args.as_slice() {
                    [end] => (0.0, expect_whole_number(builtin, end)?),
                    [start, end] => (
                        expect_whole_number(builtin, start)?,
                        expect_whole_number(builtin, end)?,
                    ),
                    _ => (0.0, 0.0),
                };
                let len = (end - start).max(0.0);
                if len > MAX_RANGE_LEN as f64 {
                    return Err(EvalError::Builtin(format!(
                        "range() of {len} items exceeds the limit of {MAX_RANGE_LEN}"
                    )));
                }
                let items = (0..len as usize)
                    .map(|i| Value::Number(start + i as f64))
                    .collect();
                Value::list(items)
            }
            Builtin::Push => match &args[0] {
                Value::List(items) => {
                    let mut items = items.to_vec();
                    items.push(args[1].clone());
                    Value::list(items)
                }
                other => Err(EvalError::TypeMismatch(format!(
                    "push() expects a list, got {}",
                    other.type_name()
                ))),
            },
            Builtin::ReadFile => {
                let name = expect_string(builtin, &args[0])?;
                self.files
                    .read(name)
                    .map(Value::String)
                    .ok_or_else(|| EvalError::File(format!("no file named '{name}'")))
            }
            Builtin::WriteFile => {
                let name = expect_string(builtin, &args[0])?;
                self.files
                    .write(name, &args[1].to_string())
                    .map_err(EvalError::File)?;
                Ok(Value::Nil)
            }
            Builtin::AppendFile => {
                let name = expect_string(builtin, &args[0])?;
                self.files
                    .append(name, &args[1].to_string())
                    .map_err(EvalError::File)?;
                Ok(Value::Nil)
            }
        }
    }
}
