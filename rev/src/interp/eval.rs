//! Tree-walking evaluator
//!
//! Evaluation returns a [`Flow`] rather than unwinding: `return`, `break`,
//! `continue` and `try` propagation travel up as ordinary values until the
//! construct that consumes them.

use super::env::{AssignError, FrameArena, FrameId};
use super::error::{InterpResult, RuntimeError};
use super::value::{Closure, Value};
use crate::analyzer::Analysis;
use crate::ast::*;
use crate::scope::Binding;
use crate::types::{self, Type, TypeTable};
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

/// Stack growth parameters for deep recursion
const STACK_RED_ZONE: usize = 128 * 1024; // 128KB remaining triggers growth
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024; // Grow by 4MB each time

/// Interpreter limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterConfig {
    /// Nested calls allowed before a stack overflow fault
    pub max_call_depth: usize,
    /// Live frame count that triggers a collection between top-level statements
    pub gc_threshold: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 10_000,
            gc_threshold: 1024,
        }
    }
}

/// Interpreter lifecycle. REPL inputs go back to `Ready` after each run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Ready,
    Running,
    Completed,
    Faulted,
}

/// Control outcome of evaluating an expression or executing a statement
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Value(Value),
    /// Leave the current function with this value (or propagated tag)
    Return(Value),
    Break,
    Continue,
}

/// Unwrap a normal value, handing any other outcome to the caller
macro_rules! value {
    ($flow:expr) => {
        match $flow {
            Flow::Value(v) => v,
            other => return Ok(other),
        }
    };
}

/// In-memory output sink shared between an interpreter and its owner
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// The interpreter
pub struct Interpreter {
    config: InterpreterConfig,
    arena: FrameArena,
    /// Top-level frame; lives as long as the interpreter
    global: FrameId,
    /// Closure environments held by a pending REPL rollback
    pinned: Vec<FrameId>,
    /// Annotations of every input run so far
    types: TypeTable,
    /// Declared return types of the active calls, innermost last
    returns: Vec<Type>,
    depth: usize,
    gc_watermark: usize,
    state: RunState,
    out: Box<dyn Write>,
}

impl Interpreter {
    /// Create an interpreter printing to stdout
    pub fn new(config: InterpreterConfig) -> Self {
        Self::with_output(config, Box::new(std::io::stdout()))
    }

    /// Create an interpreter printing to `out`
    pub fn with_output(config: InterpreterConfig, out: Box<dyn Write>) -> Self {
        let mut arena = FrameArena::new();
        let global = arena.alloc(None);
        Interpreter {
            config,
            arena,
            global,
            pinned: Vec::new(),
            types: TypeTable::new(),
            returns: Vec::new(),
            depth: 0,
            gc_watermark: config.gc_threshold,
            state: RunState::Ready,
            out,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run a whole program that passed analysis. Yields the value of a
    /// trailing expression statement, or `void`.
    ///
    /// Annotations accumulate across runs, so node ids must be unique
    /// across everything one interpreter executes.
    pub fn run(&mut self, program: &Program, analysis: &Analysis) -> InterpResult<Value> {
        let result = self.execute(program, analysis);
        self.state = if result.is_ok() {
            RunState::Completed
        } else {
            RunState::Faulted
        };
        result
    }

    /// Run one REPL input against the persistent top-level frame. A
    /// faulted input leaves the top-level bindings as they were.
    pub fn run_input(&mut self, program: &Program, analysis: &Analysis) -> InterpResult<Value> {
        let saved = self.arena.snapshot(self.global);
        self.pinned = saved
            .values()
            .filter_map(|b| match &b.value {
                Value::Function(closure) => Some(closure.env),
                _ => None,
            })
            .collect();
        let result = self.execute(program, analysis);
        self.pinned.clear();
        if result.is_err() {
            self.arena.restore(self.global, saved);
        }
        self.state = RunState::Ready;
        result
    }

    /// Top-level bindings and their current values, sorted by name
    pub fn globals(&self) -> Vec<(String, Type, Value)> {
        self.arena
            .bindings(self.global)
            .into_iter()
            .map(|(name, b)| (name.to_string(), b.ty.clone(), b.value.clone()))
            .collect()
    }

    /// Frames currently held by the arena
    pub fn live_frames(&self) -> usize {
        self.arena.live()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(stmts = program.stmts.len()))]
    fn execute(&mut self, program: &Program, analysis: &Analysis) -> InterpResult<Value> {
        self.state = RunState::Running;
        self.types.extend(analysis.types.clone());
        self.returns.clear();
        self.depth = 0;

        let global = self.global;
        self.hoist(&program.stmts, global)?;
        let mut last = Value::Void;
        for stmt in &program.stmts {
            last = match self.exec_stmt(stmt, global)? {
                Flow::Value(v) if matches!(stmt.node, Stmt::Expr(_)) => v,
                Flow::Value(_) => Value::Void,
                Flow::Return(Value::ErrorTag { set, tag }) => {
                    return Err(RuntimeError::uncaught_error(&set, &tag).at(stmt.span));
                }
                Flow::Return(_) | Flow::Break | Flow::Continue => {
                    return Err(RuntimeError::internal("control flow escaped to the top level").at(stmt.span));
                }
            };
            self.maybe_collect();
        }
        self.out
            .flush()
            .map_err(|e| RuntimeError::internal(format!("failed to flush output: {e}")))?;
        Ok(last)
    }

    fn maybe_collect(&mut self) {
        if self.arena.live() <= self.gc_watermark {
            return;
        }
        let mut roots = Vec::with_capacity(self.pinned.len() + 1);
        roots.push(self.global);
        roots.extend_from_slice(&self.pinned);
        let freed = self.arena.collect(&roots);
        self.gc_watermark = self.config.gc_threshold.max(self.arena.live() * 2);
        tracing::debug!(freed, live = self.arena.live(), "collected frames");
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn type_of(&self, expr: &Expr) -> InterpResult<Type> {
        self.types
            .get(expr.id)
            .cloned()
            .ok_or_else(|| RuntimeError::internal(format!("expression {} has no type", expr.id)).at(expr.span))
    }

    fn coerce(&self, value: Value, from: &Type, to: &Type, span: Span) -> InterpResult<Value> {
        types::coerce(value, from, to).map_err(|e| RuntimeError::internal(e.to_string()).at(span))
    }

    fn annotation(&self, ty: &TypeExpr) -> InterpResult<Type> {
        types::lower(ty, &|_| true).map_err(|e| RuntimeError::internal(e.to_string()))
    }

    fn make_closure(
        &mut self,
        name: Option<String>,
        params: &[Param],
        ret_ty: &TypeExpr,
        body: &Rc<Block>,
        env: FrameId,
    ) -> InterpResult<Rc<Closure>> {
        let params = params
            .iter()
            .map(|p| Ok((p.name.node.clone(), self.annotation(&p.ty.node)?)))
            .collect::<InterpResult<Vec<_>>>()?;
        let ret = self.annotation(ret_ty)?;
        self.arena.mark_captured(env);
        Ok(Rc::new(Closure {
            name,
            params,
            ret,
            body: Rc::clone(body),
            env,
        }))
    }

    /// Bind a statement list's function declarations before running it
    fn hoist(&mut self, stmts: &[Spanned<Stmt>], frame: FrameId) -> InterpResult<()> {
        for stmt in stmts {
            if let Stmt::FnDecl(decl) = &stmt.node {
                let closure = self.make_closure(
                    Some(decl.name.node.clone()),
                    &decl.params,
                    &decl.ret_ty.node,
                    &decl.body,
                    frame,
                )?;
                let ty = Type::Function {
                    params: closure.params.iter().map(|(_, ty)| ty.clone()).collect(),
                    ret: Box::new(closure.ret.clone()),
                };
                self.arena.define(
                    frame,
                    decl.name.node.clone(),
                    Binding::new(ty, Value::Function(closure), false),
                );
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Run statements in `frame`. The outcome carries the value of a
    /// trailing expression statement.
    fn exec_stmts(&mut self, stmts: &[Spanned<Stmt>], frame: FrameId) -> InterpResult<Flow> {
        self.hoist(stmts, frame)?;
        let mut last = Value::Void;
        for stmt in stmts {
            last = match self.exec_stmt(stmt, frame)? {
                Flow::Value(v) => v,
                other => return Ok(other),
            };
        }
        Ok(Flow::Value(last))
    }

    /// Run a block in a fresh child frame of `parent`
    fn exec_block(&mut self, block: &Block, parent: FrameId) -> InterpResult<Flow> {
        let frame = self.arena.alloc(Some(parent));
        let result = self.exec_stmts(&block.stmts, frame);
        self.arena.release(frame);
        result
    }

    fn exec_stmt(&mut self, stmt: &Spanned<Stmt>, frame: FrameId) -> InterpResult<Flow> {
        match &stmt.node {
            Stmt::VarDecl {
                name,
                mutable,
                ty,
                init,
            } => {
                let value = value!(self.eval(init, frame)?);
                let from = self.type_of(init)?;
                let declared = match ty {
                    Some(annotation) => self.annotation(&annotation.node)?,
                    None => from.clone(),
                };
                let value = self.coerce(value, &from, &declared, init.span)?;
                self.arena
                    .define(frame, name.node.clone(), Binding::new(declared, value, *mutable));
                Ok(Flow::Value(Value::Void))
            }

            Stmt::Assign { target, value } => {
                let new_value = value!(self.eval(value, frame)?);
                let declared = match self.arena.lookup(frame, &target.node) {
                    Some(binding) => binding.ty.clone(),
                    None => {
                        return Err(RuntimeError::internal(format!("unbound variable `{}`", target.node)).at(target.span));
                    }
                };
                let from = self.type_of(value)?;
                let new_value = self.coerce(new_value, &from, &declared, value.span)?;
                match self.arena.assign(frame, &target.node, new_value) {
                    Ok(()) => Ok(Flow::Value(Value::Void)),
                    Err(AssignError::Immutable) => {
                        Err(RuntimeError::immutable_assignment(&target.node).at(target.span))
                    }
                    Err(AssignError::Undefined) => {
                        Err(RuntimeError::internal(format!("unbound variable `{}`", target.node)).at(target.span))
                    }
                }
            }

            Stmt::Expr(expr) => self.eval(expr, frame),

            Stmt::If {
                cond,
                then_block,
                else_branch,
            } => {
                let cond_value = value!(self.eval(cond, frame)?);
                let flow = if self.truth(&cond_value, cond.span)? {
                    self.exec_block(then_block, frame)?
                } else if let Some(else_branch) = else_branch {
                    self.exec_stmt(else_branch, frame)?
                } else {
                    Flow::Value(Value::Void)
                };
                Ok(match flow {
                    Flow::Value(_) => Flow::Value(Value::Void),
                    other => other,
                })
            }

            Stmt::While { cond, body } => {
                loop {
                    let cond_value = value!(self.eval(cond, frame)?);
                    if !self.truth(&cond_value, cond.span)? {
                        break;
                    }
                    match self.exec_block(body, frame)? {
                        Flow::Break => break,
                        Flow::Value(_) | Flow::Continue => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Value(Value::Void))
            }

            Stmt::For {
                var,
                start,
                end,
                body,
            } => {
                let start_value = value!(self.eval(start, frame)?);
                let end_value = value!(self.eval(end, frame)?);
                let (Some(from), Some(to)) = (start_value.as_int(), end_value.as_int()) else {
                    return Err(RuntimeError::internal("range bounds must be int").at(start.span.merge(end.span)));
                };
                for i in from..to {
                    let iteration = self.arena.alloc(Some(frame));
                    self.arena
                        .define(iteration, var.node.clone(), Binding::new(Type::Int, Value::Int(i), false));
                    let flow = self.exec_block(body, iteration);
                    self.arena.release(iteration);
                    match flow? {
                        Flow::Break => break,
                        Flow::Value(_) | Flow::Continue => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Value(Value::Void))
            }

            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),

            Stmt::Return(value) => {
                let Some(expected) = self.returns.last().cloned() else {
                    return Err(RuntimeError::internal("`return` outside of a function").at(stmt.span));
                };
                let result = match value {
                    Some(expr) => {
                        let v = value!(self.eval(expr, frame)?);
                        let from = self.type_of(expr)?;
                        self.coerce(v, &from, &expected, expr.span)?
                    }
                    None => Value::Void,
                };
                Ok(Flow::Return(result))
            }

            // Bound by hoisting when the enclosing block was entered
            Stmt::FnDecl(_) | Stmt::ErrorDecl(_) => Ok(Flow::Value(Value::Void)),

            Stmt::Block(block) => {
                let flow = self.exec_block(block, frame)?;
                Ok(match flow {
                    Flow::Value(_) => Flow::Value(Value::Void),
                    other => other,
                })
            }
        }
    }

    fn truth(&self, value: &Value, span: Span) -> InterpResult<bool> {
        value.as_bool().ok_or_else(|| {
            RuntimeError::internal(format!("condition evaluated to {}", value.type_name())).at(span)
        })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Evaluate an expression with automatic stack growth
    fn eval(&mut self, expr: &Expr, frame: FrameId) -> InterpResult<Flow> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.eval_inner(expr, frame))
    }

    fn eval_inner(&mut self, expr: &Expr, frame: FrameId) -> InterpResult<Flow> {
        let value = match &expr.kind {
            ExprKind::IntLit(n) => Value::Int(*n),
            ExprKind::FloatLit(x) => Value::Float(*x),
            ExprKind::BoolLit(b) => Value::Bool(*b),
            ExprKind::StringLit(s) => Value::string(s),
            ExprKind::Null => Value::Null,

            ExprKind::Var(name) => match self.arena.lookup(frame, name) {
                Some(binding) => binding.value.clone(),
                None => {
                    return Err(RuntimeError::internal(format!("unbound variable `{name}`")).at(expr.span));
                }
            },

            ExprKind::Binary {
                left,
                op: op @ (BinOp::And | BinOp::Or),
                right,
            } => {
                let lhs = value!(self.eval(left, frame)?);
                let lhs = self.truth(&lhs, left.span)?;
                // Short-circuit: the right operand runs only if it decides the result
                if (*op == BinOp::And) != lhs {
                    Value::Bool(lhs)
                } else {
                    let rhs = value!(self.eval(right, frame)?);
                    Value::Bool(self.truth(&rhs, right.span)?)
                }
            }

            ExprKind::Binary { left, op, right } => {
                let lhs = value!(self.eval(left, frame)?);
                let rhs = value!(self.eval(right, frame)?);
                binary_op(*op, lhs, rhs).map_err(|e| e.at(expr.span))?
            }

            ExprKind::Unary { op, expr: inner } => {
                let operand = value!(self.eval(inner, frame)?);
                match (op, operand) {
                    (UnOp::Neg, Value::Int(n)) => Value::Int(
                        n.checked_neg()
                            .ok_or_else(|| RuntimeError::integer_overflow("-").at(expr.span))?,
                    ),
                    (UnOp::Neg, Value::Float(x)) => Value::Float(-x),
                    (UnOp::Not, Value::Bool(b)) => Value::Bool(!b),
                    (op, other) => {
                        return Err(RuntimeError::internal(format!(
                            "operator `{op}` applied to {}",
                            other.type_name()
                        ))
                        .at(expr.span));
                    }
                }
            }

            ExprKind::Call { callee, args } => return self.eval_call(expr, callee, args, frame),

            ExprKind::If {
                cond,
                then_block,
                else_block,
            } => {
                let cond_value = value!(self.eval(cond, frame)?);
                let branch = if self.truth(&cond_value, cond.span)? {
                    then_block
                } else {
                    else_block
                };
                let result = value!(self.exec_block(branch, frame)?);
                let from = match branch.tail_expr() {
                    Some(tail) => self.type_of(tail)?,
                    None => Type::Void,
                };
                self.coerce(result, &from, &self.type_of(expr)?, expr.span)?
            }

            ExprKind::ErrorTag { set, tag } => Value::ErrorTag {
                set: set.clone(),
                tag: tag.clone(),
            },

            ExprKind::Try(inner) => match value!(self.eval(inner, frame)?) {
                tag @ Value::ErrorTag { .. } => return Ok(Flow::Return(tag)),
                other => other,
            },

            ExprKind::Catch {
                expr: inner,
                binding,
                handler,
            } => {
                let subject = value!(self.eval(inner, frame)?);
                let result_ty = self.type_of(expr)?;
                match subject {
                    tag @ Value::ErrorTag { .. } => {
                        let scope = self.arena.alloc(Some(frame));
                        if let Some(binding) = binding {
                            let ty = Type::ErrorSet(tag.type_name().to_string());
                            self.arena
                                .define(scope, binding.node.clone(), Binding::new(ty, tag, false));
                        }
                        let handled = self.eval(handler, scope);
                        self.arena.release(scope);
                        let handled = value!(handled?);
                        self.coerce(handled, &self.type_of(handler)?, &result_ty, handler.span)?
                    }
                    ok_value => {
                        let from = match self.type_of(inner)? {
                            Type::ErrorUnion { ok, .. } => *ok,
                            other => other,
                        };
                        self.coerce(ok_value, &from, &result_ty, inner.span)?
                    }
                }
            }

            ExprKind::Is { expr: inner, ty } => {
                let subject = value!(self.eval(inner, frame)?);
                Value::Bool(self.annotation(&ty.node)?.admits(&subject))
            }

            ExprKind::Convert { target, expr: inner } => {
                let operand = value!(self.eval(inner, frame)?);
                convert(target, operand).map_err(|e| e.at(expr.span))?
            }

            ExprKind::Lambda { params, ret_ty, body } => {
                Value::Function(self.make_closure(None, params, &ret_ty.node, body, frame)?)
            }
        };
        Ok(Flow::Value(value))
    }

    fn eval_call(&mut self, expr: &Expr, callee: &Expr, args: &[Expr], frame: FrameId) -> InterpResult<Flow> {
        if callee.as_var() == Some("print") && self.arena.lookup(frame, "print").is_none() {
            let mut parts = Vec::with_capacity(args.len());
            for arg in args {
                parts.push(value!(self.eval(arg, frame)?).to_string());
            }
            writeln!(self.out, "{}", parts.join(" "))
                .map_err(|e| RuntimeError::internal(format!("failed to write output: {e}")).at(expr.span))?;
            return Ok(Flow::Value(Value::Void));
        }

        let callee_value = value!(self.eval(callee, frame)?);
        let Value::Function(closure) = callee_value else {
            return Err(RuntimeError::internal(format!("{} is not callable", callee_value.type_name())).at(callee.span));
        };
        if closure.params.len() != args.len() {
            return Err(RuntimeError::internal(format!(
                "expected {} argument(s), found {}",
                closure.params.len(),
                args.len()
            ))
            .at(expr.span));
        }
        let mut values = Vec::with_capacity(args.len());
        for (arg, (_, param_ty)) in args.iter().zip(&closure.params) {
            let v = value!(self.eval(arg, frame)?);
            values.push(self.coerce(v, &self.type_of(arg)?, param_ty, arg.span)?);
        }
        self.call(&closure, values, expr.span).map(Flow::Value)
    }

    /// Call a closure with automatic stack growth
    fn call(&mut self, closure: &Rc<Closure>, args: Vec<Value>, span: Span) -> InterpResult<Value> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.call_inner(closure, args, span))
    }

    fn call_inner(&mut self, closure: &Rc<Closure>, args: Vec<Value>, span: Span) -> InterpResult<Value> {
        if self.depth >= self.config.max_call_depth {
            return Err(RuntimeError::stack_overflow(self.config.max_call_depth).at(span));
        }
        tracing::trace!(name = closure.name.as_deref().unwrap_or("<anonymous>"), depth = self.depth, "call");

        // Parameters live in a fresh frame parented at the defining scope
        let frame = self.arena.alloc(Some(closure.env));
        for ((name, ty), value) in closure.params.iter().zip(args) {
            self.arena
                .define(frame, name.clone(), Binding::new(ty.clone(), value, false));
        }

        self.depth += 1;
        self.returns.push(closure.ret.clone());
        let result = self.exec_stmts(&closure.body.stmts, frame);
        self.returns.pop();
        self.depth -= 1;
        self.arena.release(frame);

        match result? {
            Flow::Return(v) => Ok(v),
            Flow::Value(_) => Ok(Value::Void),
            Flow::Break | Flow::Continue => {
                Err(RuntimeError::internal("`break` or `continue` escaped a function").at(span))
            }
        }
    }
}

/// Apply a non-short-circuit binary operator
fn binary_op(op: BinOp, lhs: Value, rhs: Value) -> InterpResult<Value> {
    use Value::{Float, Int, Str};
    let result = match (op, &lhs, &rhs) {
        (BinOp::Eq, _, _) => Value::Bool(lhs.loose_eq(&rhs)),
        (BinOp::Ne, _, _) => Value::Bool(!lhs.loose_eq(&rhs)),

        (BinOp::Add, Str(a), Str(b)) => Value::string(format!("{a}{b}")),

        (_, Int(a), Int(b)) if op.is_arithmetic() => {
            let (a, b) = (*a, *b);
            if matches!(op, BinOp::Div | BinOp::Mod) && b == 0 {
                return Err(RuntimeError::division_by_zero());
            }
            let checked = match op {
                BinOp::Add => a.checked_add(b),
                BinOp::Sub => a.checked_sub(b),
                BinOp::Mul => a.checked_mul(b),
                BinOp::Div => a.checked_div(b),
                _ => a.checked_rem(b),
            };
            Int(checked.ok_or_else(|| RuntimeError::integer_overflow(&op.to_string()))?)
        }

        (_, Int(_) | Float(_), Int(_) | Float(_)) if op.is_arithmetic() => {
            let (Some(a), Some(b)) = (lhs.as_float(), rhs.as_float()) else {
                return Err(RuntimeError::internal("numeric operand expected"));
            };
            if matches!(op, BinOp::Div | BinOp::Mod) && b == 0.0 {
                return Err(RuntimeError::division_by_zero());
            }
            Float(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a / b,
                _ => a % b,
            })
        }

        (_, Int(a), Int(b)) if op.is_ordering() => Value::Bool(compare(op, a, b)),
        (_, Int(_) | Float(_), Int(_) | Float(_)) if op.is_ordering() => {
            let (Some(a), Some(b)) = (lhs.as_float(), rhs.as_float()) else {
                return Err(RuntimeError::internal("numeric operand expected"));
            };
            Value::Bool(compare(op, &a, &b))
        }
        (_, Str(a), Str(b)) if op.is_ordering() => Value::Bool(compare(op, a, b)),

        _ => {
            return Err(RuntimeError::internal(format!(
                "operator `{op}` cannot be applied to {} and {}",
                lhs.type_name(),
                rhs.type_name()
            )));
        }
    };
    Ok(result)
}

fn compare<T: PartialOrd + ?Sized>(op: BinOp, a: &T, b: &T) -> bool {
    match op {
        BinOp::Lt => a < b,
        BinOp::Gt => a > b,
        BinOp::Le => a <= b,
        _ => a >= b,
    }
}

/// Explicit `int(...)`, `float(...)` and `string(...)` conversions
fn convert(target: &TypeExpr, value: Value) -> InterpResult<Value> {
    match (target, value) {
        (TypeExpr::Int, Value::Int(n)) => Ok(Value::Int(n)),
        (TypeExpr::Int, Value::Float(x)) => {
            // Truncates toward zero; out-of-range values are a fault, not a clamp
            if x.is_finite() && x >= i64::MIN as f64 && x < i64::MAX as f64 {
                Ok(Value::Int(x.trunc() as i64))
            } else {
                Err(RuntimeError::integer_overflow("int(...)"))
            }
        }
        (TypeExpr::Float, Value::Int(n)) => Ok(Value::Float(n as f64)),
        (TypeExpr::Float, Value::Float(x)) => Ok(Value::Float(x)),
        (TypeExpr::String, v @ Value::Str(_)) => Ok(v),
        (TypeExpr::String, v) => Ok(Value::string(v.to_string())),
        (target, v) => Err(RuntimeError::internal(format!(
            "cannot convert {} to {target}",
            v.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::ErrorKind;

    #[test]
    fn test_int_arithmetic_checked() {
        assert_eq!(binary_op(BinOp::Add, Value::Int(2), Value::Int(3)), Ok(Value::Int(5)));
        let err = binary_op(BinOp::Add, Value::Int(i64::MAX), Value::Int(1)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IntegerOverflow);
    }

    #[test]
    fn test_division_by_zero_int_and_float() {
        let err = binary_op(BinOp::Div, Value::Int(1), Value::Int(0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
        let err = binary_op(BinOp::Div, Value::Float(1.0), Value::Float(0.0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
        let err = binary_op(BinOp::Mod, Value::Int(1), Value::Int(0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
    }

    #[test]
    fn test_mixed_arithmetic_widens() {
        assert_eq!(binary_op(BinOp::Mul, Value::Int(2), Value::Float(1.5)), Ok(Value::Float(3.0)));
    }

    #[test]
    fn test_int_division_truncates() {
        assert_eq!(binary_op(BinOp::Div, Value::Int(7), Value::Int(2)), Ok(Value::Int(3)));
        assert_eq!(binary_op(BinOp::Mod, Value::Int(-7), Value::Int(2)), Ok(Value::Int(-1)));
    }

    #[test]
    fn test_min_div_minus_one_overflows() {
        let err = binary_op(BinOp::Div, Value::Int(i64::MIN), Value::Int(-1)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IntegerOverflow);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(binary_op(BinOp::Lt, Value::Int(1), Value::Float(1.5)), Ok(Value::Bool(true)));
        assert_eq!(
            binary_op(BinOp::Ge, Value::string("b"), Value::string("a")),
            Ok(Value::Bool(true))
        );
        assert_eq!(binary_op(BinOp::Eq, Value::Int(2), Value::Float(2.0)), Ok(Value::Bool(true)));
        assert_eq!(binary_op(BinOp::Ne, Value::Null, Value::Int(0)), Ok(Value::Bool(true)));
    }

    #[test]
    fn test_string_concat() {
        assert_eq!(
            binary_op(BinOp::Add, Value::string("ab"), Value::string("cd")),
            Ok(Value::string("abcd"))
        );
    }

    #[test]
    fn test_narrowing_violation_is_internal_fault() {
        let err = binary_op(BinOp::Add, Value::Null, Value::Int(1)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert_eq!(err.exit_code(), 70);
    }

    #[test]
    fn test_convert() {
        assert_eq!(convert(&TypeExpr::Int, Value::Float(2.9)), Ok(Value::Int(2)));
        assert_eq!(convert(&TypeExpr::Int, Value::Float(-2.9)), Ok(Value::Int(-2)));
        assert_eq!(convert(&TypeExpr::Float, Value::Int(3)), Ok(Value::Float(3.0)));
        assert_eq!(convert(&TypeExpr::String, Value::Float(3.0)), Ok(Value::string("3.0")));
        assert_eq!(
            convert(&TypeExpr::Int, Value::Float(f64::NAN)).map_err(|e| e.kind),
            Err(ErrorKind::IntegerOverflow)
        );
    }

    #[test]
    fn test_shared_buffer_collects_output() {
        let buffer = SharedBuffer::new();
        let mut writer = buffer.clone();
        writeln!(writer, "hello").unwrap();
        assert_eq!(buffer.contents(), "hello\n");
        buffer.clear();
        assert_eq!(buffer.contents(), "");
    }
}
