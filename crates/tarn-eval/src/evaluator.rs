//! Core expression and statement evaluator.

use std::rc::Rc;

use tarn_types::ast::*;
use tarn_types::ScriptError;

use crate::builtins::Builtin;
use crate::env::{Environment, WeakEnvironment};
use crate::error::{EvalError, EvalResult};
use crate::io::{FileStore, Interrupt, Io};
use crate::value::{Closure, Function, List, Value};
use crate::Completion;

/// Maximum nesting of user function calls.
pub const MAX_CALL_DEPTH: u32 = 256;

/// The tree-walking interpreter for one run.
pub struct Interpreter<'a> {
    /// Root scope, preloaded with the builtins.
    globals: Environment,
    pub(crate) io: &'a mut dyn Io,
    pub(crate) files: &'a mut dyn FileStore,
    interrupt: Interrupt,
    /// Current user-function nesting.
    call_depth: u32,
    /// Line of the statement being executed, for error attribution.
    line: u32,
    /// Scopes captured by closures, released when the run ends.
    captured: Vec<WeakEnvironment>,
}

impl<'a> Interpreter<'a> {
    /// Create an interpreter bound to one job's capabilities.
    pub fn new(io: &'a mut dyn Io, files: &'a mut dyn FileStore, interrupt: Interrupt) -> Self {
        let globals = Environment::new();
        for builtin in Builtin::ALL {
            globals.define(
                builtin.name(),
                Value::Function(Rc::new(Function::Builtin(*builtin))),
            );
        }
        Self {
            globals,
            io,
            files,
            interrupt,
            call_depth: 0,
            line: 1,
            captured: Vec::new(),
        }
    }

    /// Execute a whole program.
    ///
    /// An interrupt is not an error: the run reports
    /// [`Completion::Interrupted`]. Any other failure becomes a located
    /// runtime error; output already emitted stays emitted.
    pub fn run(&mut self, program: &Program) -> Result<Completion, ScriptError> {
        let globals = self.globals.clone();
        let result = self.exec_stmts(&program.stmts, &globals);
        self.release_scopes();
        match result {
            Ok(()) => Ok(Completion::Finished),
            Err(EvalError::Interrupted) => Ok(Completion::Interrupted),
            Err(e) => Err(ScriptError::runtime(Some(self.line), e.to_string())),
        }
    }

    /// Check the interrupt flag. Called at every statement and expression.
    pub(crate) fn tick(&self) -> EvalResult<()> {
        if self.interrupt.is_raised() {
            Err(EvalError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Clear every scope a closure captured, breaking closure cycles.
    fn release_scopes(&mut self) {
        for scope in self.captured.drain(..) {
            scope.clear();
        }
        self.globals.clear();
    }

    fn capture(&mut self, env: &Environment) {
        // Forget freed scopes once in a while so long loops stay bounded
        if self.captured.len() >= 1024 && self.captured.len().is_power_of_two() {
            self.captured.retain(|scope| !scope.is_dead());
        }
        self.captured.push(env.downgrade());
    }

    // ══════════════════════════════════════════════════════════════════════
    // Block & Statement execution
    // ══════════════════════════════════════════════════════════════════════

    fn exec_stmts(&mut self, stmts: &[Stmt], env: &Environment) -> EvalResult<()> {
        for stmt in stmts {
            self.exec_stmt(stmt, env)?;
        }
        Ok(())
    }

    /// Execute a block in a fresh child scope of `env`.
    fn exec_block(&mut self, block: &Block, env: &Environment) -> EvalResult<()> {
        self.exec_stmts(&block.stmts, &env.child_scope())
    }

    /// Execute a single statement.
    fn exec_stmt(&mut self, stmt: &Stmt, env: &Environment) -> EvalResult<()> {
        self.tick()?;
        self.line = stmt.span().line;
        match stmt {
            Stmt::Let(binding) => {
                let value = self.eval_expr(&binding.value, env)?;
                env.define(&binding.name.name, value);
                Ok(())
            }
            Stmt::Set(set) => {
                let value = self.eval_expr(&set.value, env)?;
                env.assign(&set.target.name, value)
            }
            Stmt::Block(block) => self.exec_block(block, env),
            Stmt::If(if_stmt) => self.exec_if(if_stmt, env),
            Stmt::While(while_stmt) => self.exec_while(while_stmt, env),
            Stmt::For(for_stmt) => self.exec_for(for_stmt, env),
            Stmt::Function(decl) => {
                let closure = self.make_closure(
                    Some(decl.name.name.as_str()),
                    &decl.params,
                    &decl.body,
                    env,
                );
                env.define(&decl.name.name, closure);
                Ok(())
            }
            Stmt::Return(ret) => {
                let value = match &ret.value {
                    Some(expr) => self.eval_expr(expr, env)?,
                    None => Value::Nil,
                };
                Err(EvalError::Return(value))
            }
            Stmt::Expr(expr_stmt) => {
                self.eval_expr(&expr_stmt.expr, env)?;
                Ok(())
            }
        }
    }

    fn exec_if(&mut self, if_stmt: &IfStmt, env: &Environment) -> EvalResult<()> {
        if self.eval_expr(&if_stmt.condition, env)?.is_truthy() {
            return self.exec_block(&if_stmt.then_block, env);
        }
        match &if_stmt.else_branch {
            Some(ElseBranch::ElseIf(else_if)) => {
                self.line = else_if.span.line;
                self.exec_if(else_if, env)
            }
            Some(ElseBranch::Block(block)) => self.exec_block(block, env),
            None => Ok(()),
        }
    }

    fn exec_while(&mut self, while_stmt: &WhileStmt, env: &Environment) -> EvalResult<()> {
        loop {
            self.line = while_stmt.span.line;
            if !self.eval_expr(&while_stmt.condition, env)?.is_truthy() {
                return Ok(());
            }
            self.exec_block(&while_stmt.body, env)?;
        }
    }

    /// `for item in list` binds each element; `for ch in text` each character.
    fn exec_for(&mut self, for_stmt: &ForStmt, env: &Environment) -> EvalResult<()> {
        let iterable = self.eval_expr(&for_stmt.iterable, env)?;
        let items: Rc<List> = match iterable {
            Value::List(items) => items,
            Value::String(s) => Rc::new(List::new(
                s.chars().map(|c| Value::String(c.to_string())).collect(),
            )?),
            other => {
                return Err(EvalError::TypeMismatch(format!(
                    "cannot iterate over {}",
                    other.type_name()
                )))
            }
        };
        for item in items.iter() {
            self.tick()?;
            let scope = env.child_scope();
            scope.define(&for_stmt.item.name, item.clone());
            self.exec_stmts(&for_stmt.body.stmts, &scope)?;
        }
        Ok(())
    }

    fn make_closure(
        &mut self,
        name: Option<&str>,
        params: &[Ident],
        body: &Rc<Block>,
        env: &Environment,
    ) -> Value {
        self.capture(env);
        Value::Function(Rc::new(Function::Closure(Closure {
            name: name.map(str::to_string),
            params: params.iter().map(|p| p.name.clone()).collect(),
            body: Rc::clone(body),
            env: env.clone(),
        })))
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expression evaluation
    // ══════════════════════════════════════════════════════════════════════

    /// Evaluate an expression to a Value.
    pub fn eval_expr(&mut self, expr: &Expr, env: &Environment) -> EvalResult<Value> {
        self.tick()?;
        match &expr.kind {
            ExprKind::NumberLit(n) => Ok(Value::Number(*n)),
            ExprKind::StringLit(s) => Ok(Value::String(s.clone())),
            ExprKind::BoolLit(b) => Ok(Value::Bool(*b)),
            ExprKind::NilLit => Ok(Value::Nil),

            ExprKind::StringInterpolation(parts) => self.eval_string_interpolation(parts, env),
            ExprKind::ListLit(elems) => {
                let mut values = Vec::with_capacity(elems.len());
                for elem in elems {
                    values.push(self.eval_expr(elem, env)?);
                }
                Value::list(values)
            }

            ExprKind::Identifier(name) => env.get(name),
            ExprKind::Call { callee, args } => {
                let callee = self.eval_expr(callee, env)?;
                let mut arg_vals = Vec::with_capacity(args.len());
                for arg in args {
                    arg_vals.push(self.eval_expr(arg, env)?);
                }
                self.call_value(&callee, arg_vals)
            }
            ExprKind::Index { object, index } => {
                let object = self.eval_expr(object, env)?;
                let index = self.eval_expr(index, env)?;
                eval_index(&object, &index)
            }

            ExprKind::Binary { left, op, right } => self.eval_binary(left, *op, right, env),
            ExprKind::Unary { op, operand } => {
                let val = self.eval_expr(operand, env)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!val.is_truthy())),
                    UnaryOp::Neg => match val {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        other => Err(EvalError::TypeMismatch(format!(
                            "cannot negate {}",
                            other.type_name()
                        ))),
                    },
                }
            }
            ExprKind::Lambda(lambda) => Ok(self.make_closure(None, &lambda.params, &lambda.body, env)),
            ExprKind::Paren(inner) => self.eval_expr(inner, env),
        }
    }

    fn eval_string_interpolation(&mut self, parts: &[StringPart], env: &Environment) -> EvalResult<Value> {
        let mut result = String::new();
        for part in parts {
            match part {
                StringPart::Literal(s) => result.push_str(s),
                StringPart::Expr(expr) => {
                    let val = self.eval_expr(expr, env)?;
                    result.push_str(&val.to_string());
                }
            }
        }
        Ok(Value::String(result))
    }

    // ── Calls ────────────────────────────────────────────────────────────

    /// Call a function value with already-evaluated arguments.
    pub fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> EvalResult<Value> {
        let Value::Function(func) = callee else {
            return Err(EvalError::NotCallable(callee.type_name()));
        };
        match func.as_ref() {
            Function::Builtin(builtin) => self.call_builtin(*builtin, args),
            Function::Closure(closure) => self.call_closure(closure, args),
        }
    }

    fn call_closure(&mut self, closure: &Closure, args: Vec<Value>) -> EvalResult<Value> {
        if args.len() != closure.params.len() {
            return Err(EvalError::ArityMismatch {
                name: closure.display_name().to_string(),
                expected: closure.params.len().to_string(),
                got: args.len(),
            });
        }
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(EvalError::CallDepthExceeded(MAX_CALL_DEPTH));
        }

        let scope = closure.env.child_scope();
        for (param, arg) in closure.params.iter().zip(args) {
            scope.define(param, arg);
        }

        let caller_line = self.line;
        self.call_depth += 1;
        let result = self.exec_stmts(&closure.body.stmts, &scope);
        self.call_depth -= 1;

        let value = match result {
            Ok(()) => Value::Nil,
            Err(EvalError::Return(value)) => value,
            // Keep the failing line inside the callee
            Err(e) => return Err(e),
        };
        self.line = caller_line;
        Ok(value)
    }

    // ── Operators ────────────────────────────────────────────────────────

    fn eval_binary(&mut self, left: &Expr, op: BinOp, right: &Expr, env: &Environment) -> EvalResult<Value> {
        // Short-circuit for logical operators
        if op == BinOp::And {
            let lv = self.eval_expr(left, env)?;
            return if !lv.is_truthy() {
                Ok(Value::Bool(false))
            } else {
                let rv = self.eval_expr(right, env)?;
                Ok(Value::Bool(rv.is_truthy()))
            };
        }
        if op == BinOp::Or {
            let lv = self.eval_expr(left, env)?;
            return if lv.is_truthy() {
                Ok(Value::Bool(true))
            } else {
                let rv = self.eval_expr(right, env)?;
                Ok(Value::Bool(rv.is_truthy()))
            };
        }

        let lv = self.eval_expr(left, env)?;
        let rv = self.eval_expr(right, env)?;
        binary_op(op, &lv, &rv)
    }
}

/// Apply a non-short-circuit binary operator.
pub(crate) fn binary_op(op: BinOp, lv: &Value, rv: &Value) -> EvalResult<Value> {
    match op {
        BinOp::Add => eval_add(lv, rv),
        BinOp::Sub => eval_arith(lv, rv, |a, b| a - b, "-"),
        BinOp::Mul => eval_arith(lv, rv, |a, b| a * b, "*"),
        BinOp::Div => {
            if matches!(rv, Value::Number(b) if *b == 0.0) && matches!(lv, Value::Number(_)) {
                return Err(EvalError::ArithmeticTrap("division by zero".into()));
            }
            eval_arith(lv, rv, |a, b| a / b, "/")
        }
        BinOp::Mod => {
            if matches!(rv, Value::Number(b) if *b == 0.0) && matches!(lv, Value::Number(_)) {
                return Err(EvalError::ArithmeticTrap("modulo by zero".into()));
            }
            eval_arith(lv, rv, |a, b| a % b, "%")
        }
        BinOp::Eq => Ok(Value::Bool(lv.structural_eq(rv))),
        BinOp::NotEq => Ok(Value::Bool(!lv.structural_eq(rv))),
        BinOp::Less => eval_comparison(lv, rv, |o| o.is_lt(), op),
        BinOp::Greater => eval_comparison(lv, rv, |o| o.is_gt(), op),
        BinOp::LessEq => eval_comparison(lv, rv, |o| o.is_le(), op),
        BinOp::GreaterEq => eval_comparison(lv, rv, |o| o.is_ge(), op),
        BinOp::And => Ok(Value::Bool(lv.is_truthy() && rv.is_truthy())),
        BinOp::Or => Ok(Value::Bool(lv.is_truthy() || rv.is_truthy())),
    }
}

/// `+` adds numbers, joins lists, and concatenates when either side is text.
fn eval_add(lv: &Value, rv: &Value) -> EvalResult<Value> {
    match (lv, rv) {
        (Value::Number(_), Value::Number(_)) => eval_arith(lv, rv, |a, b| a + b, "+"),
        (Value::String(_), _) | (_, Value::String(_)) => Ok(Value::String(format!("{lv}{rv}"))),
        (Value::List(a), Value::List(b)) => {
            let mut items = Vec::with_capacity(a.len() + b.len());
            items.extend(a.iter().cloned());
            items.extend(b.iter().cloned());
            Value::list(items)
        }
        _ => Err(EvalError::TypeMismatch(format!(
            "cannot add {} and {}",
            lv.type_name(),
            rv.type_name()
        ))),
    }
}

fn eval_arith(lv: &Value, rv: &Value, op: fn(f64, f64) -> f64, symbol: &str) -> EvalResult<Value> {
    if let (Value::Number(a), Value::Number(b)) = (lv, rv) {
        let result = op(*a, *b);
        if result.is_finite() {
            Ok(Value::Number(result))
        } else {
            Err(EvalError::ArithmeticTrap(format!(
                "'{symbol}' produced a non-finite number"
            )))
        }
    } else {
        Err(EvalError::TypeMismatch(format!(
            "cannot apply '{symbol}' to {} and {}",
            lv.type_name(),
            rv.type_name()
        )))
    }
}

/// Numbers compare numerically, text lexicographically.
fn eval_comparison(
    lv: &Value,
    rv: &Value,
    test: fn(std::cmp::Ordering) -> bool,
    op: BinOp,
) -> EvalResult<Value> {
    let ordering = match (lv, rv) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => {
            return Err(EvalError::TypeMismatch(format!(
                "cannot compare {} and {} with '{}'",
                lv.type_name(),
                rv.type_name(),
                op.as_str()
            )))
        }
    };
    Ok(Value::Bool(ordering.is_some_and(test)))
}

/// `list[i]` and `text[i]` with a whole, in-range index.
fn eval_index(object: &Value, index: &Value) -> EvalResult<Value> {
    let Value::Number(n) = index else {
        return Err(EvalError::TypeMismatch(format!(
            "index must be a number, got {}",
            index.type_name()
        )));
    };
    let len = match object {
        Value::List(items) => items.len(),
        Value::String(s) => s.chars().count(),
        other => {
            return Err(EvalError::TypeMismatch(format!(
                "cannot index into {}",
                other.type_name()
            )))
        }
    };
    if n.fract() != 0.0 || *n < 0.0 || *n >= len as f64 {
        return Err(EvalError::IndexOutOfRange {
            index: index.to_string(),
            len,
        });
    }
    let i = *n as usize;
    Ok(match object {
        Value::List(items) => items[i].clone(),
        Value::String(s) => Value::String(s.chars().nth(i).map(String::from).unwrap_or_default()),
        _ => Value::Nil,
    })
}
