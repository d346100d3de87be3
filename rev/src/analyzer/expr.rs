//! Expression typing and flow-sensitive narrowing

use super::effects::Effects;
use super::{Analyzer, block_diverges};
use crate::ast::*;
use crate::error::DiagnosticKind;
use crate::scope::{Binding, FrameKind};
use crate::types::{Type, is_assignable, unify};
use crate::util::{format_suggestion_hint, suggest_name};

/// Narrowed types that hold when a condition is true or false
#[derive(Debug, Clone, Default)]
pub(super) struct Facts {
    pub when_true: Vec<(String, Type)>,
    pub when_false: Vec<(String, Type)>,
}

impl Facts {
    fn negate(self) -> Facts {
        Facts {
            when_true: self.when_false,
            when_false: self.when_true,
        }
    }
}

impl Analyzer {
    /// Infer and record the type of `expr`
    pub(super) fn check_expr(&mut self, expr: &Expr) -> Type {
        self.analyze_expr(expr).0
    }

    /// Check a `bool` condition and return what it proves
    pub(super) fn check_condition(&mut self, cond: &Expr) -> Facts {
        let (ty, facts) = self.analyze_expr(cond);
        self.require(&ty, cond.span, |t| *t == Type::Bool, |t| format!("condition must be bool, found {t}"));
        facts
    }

    fn analyze_expr(&mut self, expr: &Expr) -> (Type, Facts) {
        let (ty, facts) = match &expr.kind {
            ExprKind::Binary { left, op, right } if op.is_logical() => {
                (Type::Bool, self.check_logical(left, *op, right))
            }
            ExprKind::Binary { left, op, right } if op.is_equality() => {
                (Type::Bool, self.check_equality(left, *op, right))
            }
            ExprKind::Unary { op: UnOp::Not, expr: inner } => {
                let (ty, facts) = self.analyze_expr(inner);
                self.require(&ty, inner.span, |t| *t == Type::Bool, |t| format!("operator `!` expects bool, found {t}"));
                (Type::Bool, facts.negate())
            }
            ExprKind::Is { expr: inner, ty } => (Type::Bool, self.check_is(inner, ty)),
            _ => (self.infer(expr), Facts::default()),
        };
        self.types.record(expr.id, ty.clone());
        (ty, facts)
    }

    fn infer(&mut self, expr: &Expr) -> Type {
        match &expr.kind {
            ExprKind::IntLit(_) => Type::Int,
            ExprKind::FloatLit(_) => Type::Float,
            ExprKind::BoolLit(_) => Type::Bool,
            ExprKind::StringLit(_) => Type::String,
            ExprKind::Null => Type::Null,

            ExprKind::Var(name) => match self.scopes.current_type(name) {
                Some(ty) => ty,
                None => {
                    self.undefined(name, expr.span);
                    Type::Error
                }
            },

            ExprKind::Binary { left, op, right } => self.check_binary(left, *op, right),

            ExprKind::Unary { op, expr: inner } => {
                let ty = self.check_expr(inner);
                let ok = self.require(&ty, inner.span, Type::is_numeric, |t| {
                    format!("operator `{op}` expects a numeric operand, found {t}")
                });
                if ok { ty } else { Type::Error }
            }

            ExprKind::Call { callee, args } => self.check_call(callee, args),

            ExprKind::If {
                cond,
                then_block,
                else_block,
            } => {
                let facts = self.check_condition(cond);
                let then_ty = self.check_value_block(then_block, &facts.when_true);
                let else_ty = self.check_value_block(else_block, &facts.when_false);
                match (then_ty, else_ty) {
                    (None, None) => Type::Void,
                    (Some(ty), None) | (None, Some(ty)) => ty,
                    (Some(a), Some(b)) => match unify(&a, &b) {
                        Some(ty) => ty,
                        None => {
                            self.error(
                                DiagnosticKind::TypeMismatch,
                                format!("`if` branches have incompatible types {a} and {b}"),
                                expr.span,
                            );
                            Type::Error
                        }
                    },
                }
            }

            ExprKind::ErrorTag { set, tag } => self.check_error_tag(set, tag, expr.span),

            ExprKind::Try(inner) => {
                let ty = self.check_expr(inner);
                match ty {
                    Type::ErrorUnion { set, ok } => {
                        match self.returns.last() {
                            None | Some(Type::Error) => {}
                            Some(Type::ErrorUnion { set: ret_set, .. }) if *ret_set == set => {}
                            Some(ret) => {
                                let message = format!(
                                    "unhandled error union {set}!{ok}: `try` needs the enclosing function to return `{set}!_`, but it returns {ret}"
                                );
                                self.error(DiagnosticKind::UnhandledErrorUnion, message, expr.span);
                            }
                        }
                        *ok
                    }
                    Type::Error => Type::Error,
                    other => {
                        self.error(
                            DiagnosticKind::TypeMismatch,
                            format!("`try` expects an error union, found {other}"),
                            inner.span,
                        );
                        other
                    }
                }
            }

            ExprKind::Catch {
                expr: inner,
                binding,
                handler,
            } => {
                let ty = self.check_expr(inner);
                let (set, ok) = match &ty {
                    Type::ErrorUnion { set, ok } => (Some(set.clone()), (**ok).clone()),
                    Type::Error => (None, Type::Error),
                    other => {
                        self.error(
                            DiagnosticKind::TypeMismatch,
                            format!("`catch` expects an error union, found {other}"),
                            inner.span,
                        );
                        (None, Type::Error)
                    }
                };
                self.scopes.push(FrameKind::Block);
                if let Some(binding) = binding {
                    let tag_ty = set.map_or(Type::Error, Type::ErrorSet);
                    self.scopes
                        .define(binding.node.clone(), Binding::new(tag_ty, (), false));
                }
                let handler_ty = self.check_expr(handler);
                self.scopes.pop();
                match unify(&ok, &handler_ty) {
                    Some(ty) => ty,
                    None => {
                        self.error(
                            DiagnosticKind::TypeMismatch,
                            format!("`catch` handler produces {handler_ty}, expected {ok}"),
                            handler.span,
                        );
                        Type::Error
                    }
                }
            }

            ExprKind::Convert { target, expr: inner } => {
                let ty = self.check_expr(inner);
                let (target_ty, accept): (Type, fn(&Type) -> bool) = match target {
                    TypeExpr::Int => (Type::Int, Type::is_numeric),
                    TypeExpr::Float => (Type::Float, Type::is_numeric),
                    _ => (Type::String, |t| {
                        matches!(t, Type::Int | Type::Float | Type::Bool | Type::String)
                    }),
                };
                self.require(&ty, inner.span, accept, |t| format!("cannot convert {t} to {target_ty}"));
                target_ty
            }

            ExprKind::Lambda { params, ret_ty, body } => {
                let ty = self.signature(params, ret_ty);
                if let Type::Function { params: param_types, ret } = &ty {
                    self.check_function(params, param_types, ret, body, expr.span, None);
                }
                ty
            }

            // Handled in analyze_expr
            ExprKind::Is { .. } => Type::Bool,
        }
    }

    /// Require an operand of a particular shape. Nullable, union and
    /// error-union operands get the specific guard diagnostic.
    pub(super) fn require(
        &mut self,
        ty: &Type,
        span: Span,
        accept: impl Fn(&Type) -> bool,
        describe: impl FnOnce(&Type) -> String,
    ) -> bool {
        if ty.is_error() || accept(ty) {
            return true;
        }
        let (kind, message) = match ty {
            Type::ErrorUnion { .. } => (
                DiagnosticKind::UnhandledErrorUnion,
                format!("unhandled error union {ty}: use `try` to propagate or `catch` to handle it"),
            ),
            Type::Nullable(inner) if accept(&**inner) || matches!(**inner, Type::Union(_)) => (
                DiagnosticKind::NullableUnguarded,
                format!("nullable {ty} used without null check"),
            ),
            Type::Union(members) if members.iter().any(&accept) => (
                DiagnosticKind::UnionUnguarded,
                format!("union {ty} used without narrowing"),
            ),
            _ => (DiagnosticKind::TypeMismatch, describe(ty)),
        };
        self.error(kind, message, span);
        false
    }

    fn check_binary(&mut self, left: &Expr, op: BinOp, right: &Expr) -> Type {
        let lt = self.check_expr(left);
        let rt = self.check_expr(right);

        let is_string = |t: &Type| *t == Type::String;
        if (op == BinOp::Add || op.is_ordering()) && (is_string(&lt) || is_string(&rt)) {
            let describe = |t: &Type| format!("operator `{op}` cannot combine string with {t}");
            let ok_l = self.require(&lt, left.span, is_string, describe);
            let ok_r = self.require(&rt, right.span, is_string, describe);
            return match (ok_l && ok_r, op) {
                (false, _) => Type::Error,
                (true, BinOp::Add) => Type::String,
                (true, _) => Type::Bool,
            };
        }

        let describe = |t: &Type| format!("operator `{op}` expects numeric operands, found {t}");
        let ok_l = self.require(&lt, left.span, Type::is_numeric, describe);
        let ok_r = self.require(&rt, right.span, Type::is_numeric, describe);
        if !(ok_l && ok_r) || lt.is_error() || rt.is_error() {
            return Type::Error;
        }
        if op.is_ordering() {
            Type::Bool
        } else if lt == Type::Int && rt == Type::Int {
            Type::Int
        } else {
            Type::Float
        }
    }

    fn check_logical(&mut self, left: &Expr, op: BinOp, right: &Expr) -> Facts {
        let describe = |t: &Type| format!("operator `{op}` expects bool operands, found {t}");
        let (lt, left_facts) = self.analyze_expr(left);
        self.require(&lt, left.span, |t| *t == Type::Bool, describe);

        // The right operand only runs when the left did not decide the result
        self.scopes.push(FrameKind::Block);
        let seen = if op == BinOp::And {
            &left_facts.when_true
        } else {
            &left_facts.when_false
        };
        self.apply_facts(seen);
        let (rt, right_facts) = self.analyze_expr(right);
        self.scopes.pop();
        self.require(&rt, right.span, |t| *t == Type::Bool, describe);

        // A call on the right may reassign what the left proved
        let mut left_facts = left_facts;
        if Effects::of_expr(right).calls {
            let reassigned = &self.reassigned_by_calls;
            left_facts.when_true.retain(|(name, _)| !reassigned.contains(name));
            left_facts.when_false.retain(|(name, _)| !reassigned.contains(name));
        }

        let join = |a: Vec<(String, Type)>, b: Vec<(String, Type)>| -> Vec<(String, Type)> {
            a.into_iter().chain(b).collect()
        };
        if op == BinOp::And {
            Facts {
                when_true: join(left_facts.when_true, right_facts.when_true),
                when_false: Vec::new(),
            }
        } else {
            Facts {
                when_true: Vec::new(),
                when_false: join(left_facts.when_false, right_facts.when_false),
            }
        }
    }

    fn check_equality(&mut self, left: &Expr, op: BinOp, right: &Expr) -> Facts {
        let lt = self.check_expr(left);
        let rt = self.check_expr(right);

        for (ty, span) in [(&lt, left.span), (&rt, right.span)] {
            if ty.is_error_union() {
                self.require_handled(ty, span);
                return Facts::default();
            }
            if *ty == Type::Void {
                self.error(DiagnosticKind::TypeMismatch, "cannot compare a void value", span);
                return Facts::default();
            }
        }
        if unify(&lt, &rt).is_none() {
            self.error(
                DiagnosticKind::TypeMismatch,
                format!("cannot compare {lt} with {rt}"),
                left.span.merge(right.span),
            );
            return Facts::default();
        }

        // `x != null` / `null == x`
        let guarded = match (&left.kind, &right.kind) {
            (ExprKind::Var(name), ExprKind::Null) => Some((name, &lt)),
            (ExprKind::Null, ExprKind::Var(name)) => Some((name, &rt)),
            _ => None,
        };
        let Some((name, Type::Nullable(inner))) = guarded else {
            return Facts::default();
        };
        let fact = vec![(name.clone(), (**inner).clone())];
        match op {
            BinOp::Ne => Facts {
                when_true: fact,
                when_false: Vec::new(),
            },
            _ => Facts {
                when_true: Vec::new(),
                when_false: fact,
            },
        }
    }

    fn check_is(&mut self, subject: &Expr, target: &Spanned<TypeExpr>) -> Facts {
        let subject_ty = self.check_expr(subject);
        let target_ty = self.resolve_type(target);
        if subject_ty.is_error() || target_ty.is_error() {
            return Facts::default();
        }
        if subject_ty.is_error_union() {
            self.require_handled(&subject_ty, subject.span);
            return Facts::default();
        }
        let Some((when_true, when_false)) = split_by_type(&subject_ty, &target_ty) else {
            self.error(
                DiagnosticKind::TypeMismatch,
                format!("a value of type {subject_ty} can never be {target_ty}"),
                subject.span.merge(target.span),
            );
            return Facts::default();
        };
        let Some(name) = subject.as_var() else {
            return Facts::default();
        };
        Facts {
            when_true: vec![(name.to_string(), when_true)],
            when_false: when_false
                .map(|ty| vec![(name.to_string(), ty)])
                .unwrap_or_default(),
        }
    }

    fn check_call(&mut self, callee: &Expr, args: &[Expr]) -> Type {
        if callee.as_var() == Some("print") && self.scopes.lookup("print").is_none() {
            if args.len() != 1 {
                self.error(
                    DiagnosticKind::ArityMismatch,
                    format!("`print` expects 1 argument, found {}", args.len()),
                    callee.span,
                );
            }
            for arg in args {
                let ty = self.check_expr(arg);
                if ty == Type::Void {
                    self.error(DiagnosticKind::TypeMismatch, "cannot print a void value", arg.span);
                }
                self.require_handled(&ty, arg.span);
            }
            return Type::Void;
        }

        let callee_ty = self.check_expr(callee);
        let arg_types: Vec<Type> = args.iter().map(|a| self.check_expr(a)).collect();
        self.after_call();
        match callee_ty {
            Type::Function { params, ret } => {
                if params.len() != args.len() {
                    let what = match callee.as_var() {
                        Some(name) => format!("function `{name}`"),
                        None => "function".to_string(),
                    };
                    self.error(
                        DiagnosticKind::ArityMismatch,
                        format!("{what} expects {} argument(s), found {}", params.len(), args.len()),
                        callee.span,
                    );
                } else {
                    for ((arg, ty), param) in args.iter().zip(&arg_types).zip(&params) {
                        self.check_assignable(ty, param, arg.span);
                    }
                }
                *ret
            }
            Type::Error => Type::Error,
            other => {
                self.error(
                    DiagnosticKind::NotCallable,
                    format!("a value of type {other} is not callable"),
                    callee.span,
                );
                Type::Error
            }
        }
    }

    fn check_error_tag(&mut self, set: &str, tag: &str, span: Span) -> Type {
        let Some(tags) = self.error_sets.get(set) else {
            let mut names: Vec<&str> = self.error_sets.keys().map(String::as_str).collect();
            names.sort_unstable();
            let hint = format_suggestion_hint(suggest_name(set, &names));
            self.error(
                DiagnosticKind::UndefinedIdentifier,
                format!("unknown error set `{set}`{hint}"),
                span,
            );
            return Type::Error;
        };
        if !tags.iter().any(|t| t == tag) {
            let names: Vec<&str> = tags.iter().map(String::as_str).collect();
            let hint = format_suggestion_hint(suggest_name(tag, &names));
            self.error(
                DiagnosticKind::UndefinedIdentifier,
                format!("error set `{set}` has no tag `{tag}`{hint}"),
                span,
            );
            return Type::Error;
        }
        Type::ErrorSet(set.to_string())
    }

    /// Type of a block used as a value: its trailing expression, `void`
    /// without one, or `None` when every path leaves the block
    fn check_value_block(&mut self, block: &Block, facts: &[(String, Type)]) -> Option<Type> {
        self.scopes.push(FrameKind::Block);
        self.apply_facts(facts);
        self.hoist(&block.stmts, false);
        let result = match block.stmts.split_last() {
            Some((last, rest)) if matches!(last.node, Stmt::Expr(_)) => {
                self.check_stmts(rest);
                match &last.node {
                    Stmt::Expr(tail) if !block_diverges(rest) => Some(self.check_expr(tail)),
                    Stmt::Expr(tail) => {
                        self.check_expr(tail);
                        None
                    }
                    _ => None,
                }
            }
            _ => {
                self.check_stmts(&block.stmts);
                if block_diverges(&block.stmts) {
                    None
                } else {
                    Some(Type::Void)
                }
            }
        };
        self.scopes.pop();
        result
    }
}

/// Split `subject` by a type test against `target`: the type when the test
/// succeeds, and when it fails (`None` if failure is impossible).
/// Returns `None` when the test can never succeed.
fn split_by_type(subject: &Type, target: &Type) -> Option<(Type, Option<Type>)> {
    if subject == target {
        return Some((target.clone(), None));
    }
    match subject {
        Type::Union(members) => {
            let tested: Vec<&Type> = match target {
                Type::Union(ts) => ts.iter().collect(),
                t => vec![t],
            };
            if !tested.iter().all(|t| members.contains(t)) {
                return None;
            }
            let rest: Vec<Type> = members
                .iter()
                .filter(|m| !tested.contains(m))
                .cloned()
                .collect();
            let rest = match rest.len() {
                0 => None,
                1 => rest.into_iter().next(),
                _ => Some(Type::Union(rest)),
            };
            Some((target.clone(), rest))
        }
        Type::Nullable(inner) => {
            let (when_true, rest) = split_by_type(inner, target)?;
            let when_false = match rest {
                Some(rest) => Type::Nullable(Box::new(rest)),
                None => Type::Null,
            };
            Some((when_true, Some(when_false)))
        }
        _ if is_assignable(subject, target) && !matches!(target, Type::Float) => {
            Some((subject.clone(), None))
        }
        _ => None,
    }
}
