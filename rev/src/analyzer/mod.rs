//! Static analysis
//!
//! One pre-order walk over the program that infers a type for every
//! expression, checks coercions, guards nullable and union uses, and makes
//! sure every error-union value is propagated or caught. All findings are
//! collected; an expression that fails to check gets [`Type::Error`] so it
//! does not produce follow-on diagnostics.

mod effects;
mod expr;

use crate::ast::*;
use crate::error::{Diagnostic, DiagnosticKind};
use crate::scope::{Binding, FrameKind, ScopeStack, TopSnapshot};
use crate::types::{Type, TypeFormError, TypeTable, is_assignable, lower};
use crate::util::{format_suggestion_hint, suggest_name};
use effects::Effects;
use std::collections::{HashMap, HashSet};

/// Outcome of analyzing a program or one REPL input
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub diagnostics: Vec<Diagnostic>,
    pub types: TypeTable,
}

impl Analysis {
    /// Whether any diagnostic is an error (warnings do not block a run)
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error())
    }
}

/// Analyze a whole program with a fresh analyzer
pub fn analyze(program: &Program) -> Analysis {
    Analyzer::new().analyze_input(program)
}

/// Saved top-level analyzer state
#[derive(Debug, Clone)]
pub struct Checkpoint {
    scope: TopSnapshot<()>,
    error_sets: HashMap<String, Vec<String>>,
    reassigned_by_calls: HashSet<String>,
}

/// Static analyzer. Keeps its top-level scope between inputs, so one
/// instance can check successive REPL inputs.
#[derive(Debug, Default)]
pub struct Analyzer {
    scopes: ScopeStack<()>,
    /// Declared error sets and their tags, in declaration order
    error_sets: HashMap<String, Vec<String>>,
    /// Bindings some function body may reassign; a call drops their facts
    reassigned_by_calls: HashSet<String>,
    /// Function types computed while hoisting, keyed by declaration span
    signatures: HashMap<Span, Type>,
    /// Declared return types of the enclosing functions, innermost last
    returns: Vec<Type>,
    loop_depth: usize,
    diagnostics: Vec<Diagnostic>,
    types: TypeTable,
}

impl Analyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze one program or REPL input against the current top-level
    /// scope. An input with errors leaves the top level untouched.
    #[tracing::instrument(level = "debug", skip_all, fields(stmts = program.stmts.len()))]
    pub fn analyze_input(&mut self, program: &Program) -> Analysis {
        let checkpoint = self.checkpoint();
        self.signatures.clear();
        self.reassigned_by_calls
            .extend(Effects::of_stmts(&program.stmts).assigned_by_functions);

        self.hoist(&program.stmts, true);
        self.check_stmts(&program.stmts);

        let analysis = Analysis {
            diagnostics: std::mem::take(&mut self.diagnostics),
            types: std::mem::take(&mut self.types),
        };
        if analysis.has_errors() {
            self.restore(checkpoint);
        }
        tracing::debug!(
            errors = analysis.errors().count(),
            warnings = analysis.warnings().count(),
            annotated = analysis.types.len(),
            "analysis finished"
        );
        analysis
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            scope: self.scopes.snapshot_top(),
            error_sets: self.error_sets.clone(),
            reassigned_by_calls: self.reassigned_by_calls.clone(),
        }
    }

    pub fn restore(&mut self, checkpoint: Checkpoint) {
        self.scopes.restore_top(checkpoint.scope);
        self.error_sets = checkpoint.error_sets;
        self.reassigned_by_calls = checkpoint.reassigned_by_calls;
        self.returns.clear();
        self.loop_depth = 0;
    }

    /// Top-level bindings and their declared types, sorted by name
    pub fn globals(&self) -> Vec<(String, Type)> {
        self.scopes
            .top_level()
            .into_iter()
            .map(|(name, binding)| (name.to_string(), binding.ty.clone()))
            .collect()
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    fn error(&mut self, kind: DiagnosticKind, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic::error(kind, message, span));
    }

    fn warn(&mut self, kind: DiagnosticKind, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic::warning(kind, message, span));
    }

    fn undefined(&mut self, name: &str, span: Span) {
        let mut candidates = self.scopes.visible_names();
        candidates.push("print");
        let hint = format_suggestion_hint(suggest_name(name, &candidates));
        self.error(
            DiagnosticKind::UndefinedIdentifier,
            format!("undefined identifier `{name}`{hint}"),
            span,
        );
    }

    /// Report why `from` cannot flow into `to`, most specific cause first
    fn check_assignable(&mut self, from: &Type, to: &Type, span: Span) -> bool {
        if is_assignable(from, to) {
            return true;
        }
        let (kind, message) = match from {
            Type::ErrorUnion { .. } => (
                DiagnosticKind::UnhandledErrorUnion,
                format!("unhandled error union {from}: use `try` to propagate or `catch` to handle it"),
            ),
            Type::Nullable(inner) if is_assignable(inner, to) || matches!(**inner, Type::Union(_)) => (
                DiagnosticKind::NullableUnguarded,
                format!("nullable {from} used without null check"),
            ),
            Type::Null => (
                DiagnosticKind::TypeMismatch,
                format!("cannot use null where non-nullable {to} is expected"),
            ),
            Type::Union(members) if members.iter().any(|m| is_assignable(m, to)) => (
                DiagnosticKind::UnionUnguarded,
                format!("union {from} used as {to} without narrowing"),
            ),
            Type::Float if expects_int(to) => (
                DiagnosticKind::InvalidCoercion,
                "cannot implicitly convert float to int; use int(...)".to_string(),
            ),
            _ => (
                DiagnosticKind::TypeMismatch,
                format!("type mismatch: expected {to}, found {from}"),
            ),
        };
        self.error(kind, message, span);
        false
    }

    /// An expression statement may not drop an error union on the floor
    fn require_handled(&mut self, ty: &Type, span: Span) {
        if ty.is_error_union() {
            self.error(
                DiagnosticKind::UnhandledErrorUnion,
                format!("unhandled error union {ty}: use `try` to propagate or `catch` to handle it"),
                span,
            );
        }
    }

    /// Lower an annotation, reporting malformed types
    fn resolve_type(&mut self, annotation: &Spanned<TypeExpr>) -> Type {
        let lowered = {
            let sets = &self.error_sets;
            lower(&annotation.node, &|name| sets.contains_key(name))
        };
        match lowered {
            Ok(ty) => ty,
            Err(err) => {
                let kind = match err {
                    TypeFormError::UnknownErrorSet(_) => DiagnosticKind::UndefinedIdentifier,
                    _ => DiagnosticKind::InvalidType,
                };
                self.error(kind, err.to_string(), annotation.span);
                Type::Error
            }
        }
    }

    fn signature(&mut self, params: &[Param], ret: &Spanned<TypeExpr>) -> Type {
        let params = params.iter().map(|p| self.resolve_type(&p.ty)).collect();
        let ret = Box::new(self.resolve_type(ret));
        Type::Function { params, ret }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    /// Bring a statement list's error sets (top level only) and function
    /// signatures into scope before checking it
    fn hoist(&mut self, stmts: &[Spanned<Stmt>], top_level: bool) {
        if top_level {
            for stmt in stmts {
                if let Stmt::ErrorDecl(decl) = &stmt.node {
                    self.declare_error_set(decl);
                }
            }
        }
        for stmt in stmts {
            if let Stmt::FnDecl(decl) = &stmt.node {
                let ty = self.signature(&decl.params, &decl.ret_ty);
                self.signatures.insert(decl.span, ty.clone());
                self.scopes
                    .define(decl.name.node.clone(), Binding::new(ty, (), false));
            }
        }
    }

    fn declare_error_set(&mut self, decl: &ErrorDecl) {
        if self.error_sets.contains_key(&decl.name.node) {
            self.error(
                DiagnosticKind::DuplicateDeclaration,
                format!("error set `{}` is already declared", decl.name.node),
                decl.name.span,
            );
            return;
        }
        let mut tags: Vec<String> = Vec::with_capacity(decl.tags.len());
        for tag in &decl.tags {
            if tags.contains(&tag.node) {
                self.error(
                    DiagnosticKind::DuplicateDeclaration,
                    format!("tag `{}` appears twice in error set `{}`", tag.node, decl.name.node),
                    tag.span,
                );
                continue;
            }
            tags.push(tag.node.clone());
        }
        if tags.is_empty() {
            self.error(
                DiagnosticKind::InvalidType,
                format!("error set `{}` declares no tags", decl.name.node),
                decl.name.span,
            );
        }
        self.error_sets.insert(decl.name.node.clone(), tags);
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn check_stmts(&mut self, stmts: &[Spanned<Stmt>]) {
        let mut diverged = false;
        let mut warned = false;
        for stmt in stmts {
            if diverged && !warned && !matches!(stmt.node, Stmt::FnDecl(_)) {
                self.warn(DiagnosticKind::UnreachableCode, "unreachable statement", stmt.span);
                warned = true;
            }
            self.check_stmt(stmt);
            diverged |= stmt_diverges(&stmt.node);
        }
    }

    /// Check a block in a fresh frame seeded with narrowing facts
    fn check_block(&mut self, block: &Block, facts: &[(String, Type)]) {
        self.scopes.push(FrameKind::Block);
        self.apply_facts(facts);
        self.hoist(&block.stmts, false);
        self.check_stmts(&block.stmts);
        self.scopes.pop();
    }

    fn apply_facts(&mut self, facts: &[(String, Type)]) {
        for (name, ty) in facts {
            self.scopes.narrow(name.clone(), ty.clone());
        }
    }

    fn check_stmt(&mut self, stmt: &Spanned<Stmt>) {
        match &stmt.node {
            Stmt::VarDecl {
                name,
                mutable,
                ty,
                init,
            } => self.check_var_decl(name, *mutable, ty.as_ref(), init),

            Stmt::Assign { target, value } => self.check_assign(target, value),

            Stmt::Expr(expr) => {
                let ty = self.check_expr(expr);
                self.require_handled(&ty, expr.span);
            }

            Stmt::If {
                cond,
                then_block,
                else_branch,
            } => {
                let facts = self.check_condition(cond);
                self.check_block(then_block, &facts.when_true);
                if let Some(else_branch) = else_branch {
                    self.scopes.push(FrameKind::Block);
                    self.apply_facts(&facts.when_false);
                    self.check_stmt(else_branch);
                    self.scopes.pop();
                }
            }

            Stmt::While { cond, body } => {
                let mut effects = Effects::of_stmts(&body.stmts);
                effects.calls |= Effects::of_expr(cond).calls;
                self.enter_loop(&effects);
                let facts = self.check_condition(cond);
                self.loop_depth += 1;
                self.check_block(body, &facts.when_true);
                self.loop_depth -= 1;
            }

            Stmt::For {
                var,
                start,
                end,
                body,
            } => {
                for bound in [start, end] {
                    let ty = self.check_expr(bound);
                    self.check_assignable(&ty, &Type::Int, bound.span);
                }
                self.enter_loop(&Effects::of_stmts(&body.stmts));
                self.scopes.push(FrameKind::Block);
                self.scopes
                    .define(var.node.clone(), Binding::new(Type::Int, (), false));
                self.loop_depth += 1;
                self.check_block(body, &[]);
                self.loop_depth -= 1;
                self.scopes.pop();
            }

            Stmt::Break | Stmt::Continue => {
                if self.loop_depth == 0 {
                    let keyword = if matches!(stmt.node, Stmt::Break) { "break" } else { "continue" };
                    self.error(
                        DiagnosticKind::InvalidStatement,
                        format!("`{keyword}` outside of a loop"),
                        stmt.span,
                    );
                }
            }

            Stmt::Return(value) => self.check_return(value.as_ref(), stmt.span),

            Stmt::FnDecl(decl) => {
                let ty = match self.signatures.get(&decl.span) {
                    Some(ty) => ty.clone(),
                    None => self.signature(&decl.params, &decl.ret_ty),
                };
                if let Type::Function { params, ret } = ty {
                    self.check_function(&decl.params, &params, &ret, &decl.body, decl.name.span, Some(&decl.name.node));
                }
            }

            Stmt::ErrorDecl(decl) => {
                if !self.scopes.at_top_level() {
                    self.error(
                        DiagnosticKind::InvalidStatement,
                        format!("error set `{}` must be declared at the top level", decl.name.node),
                        stmt.span,
                    );
                }
            }

            Stmt::Block(block) => self.check_block(block, &[]),
        }
    }

    /// A loop body may run again after its own assignments and calls, so
    /// facts about what it can reassign do not hold inside it
    fn enter_loop(&mut self, effects: &Effects) {
        self.scopes.invalidate_all(&effects.assigned);
        if effects.calls {
            self.scopes.invalidate_all(&self.reassigned_by_calls);
        }
    }

    /// Facts about bindings a call may reassign end at the call
    pub(super) fn after_call(&mut self) {
        self.scopes.invalidate_all(&self.reassigned_by_calls);
    }

    fn check_var_decl(&mut self, name: &Spanned<String>, mutable: bool, annotation: Option<&Spanned<TypeExpr>>, init: &Expr) {
        let init_ty = self.check_expr(init);
        let ty = match annotation {
            Some(annotation) => {
                let declared = self.resolve_type(annotation);
                if declared == Type::Void {
                    self.error(
                        DiagnosticKind::InvalidType,
                        format!("variable `{}` cannot have type void", name.node),
                        annotation.span,
                    );
                    Type::Error
                } else {
                    self.check_assignable(&init_ty, &declared, init.span);
                    declared
                }
            }
            None => match &init_ty {
                Type::Null => {
                    self.error(
                        DiagnosticKind::TypeMismatch,
                        format!(
                            "cannot infer a type for `{}` from null; add an annotation such as `int?`",
                            name.node
                        ),
                        init.span,
                    );
                    Type::Error
                }
                Type::Void => {
                    self.error(
                        DiagnosticKind::TypeMismatch,
                        format!("`{}` cannot hold a void value", name.node),
                        init.span,
                    );
                    Type::Error
                }
                Type::ErrorUnion { ok, .. } => {
                    self.require_handled(&init_ty, init.span);
                    (**ok).clone()
                }
                other => other.clone(),
            },
        };
        self.scopes
            .define(name.node.clone(), Binding::new(ty, (), mutable));
    }

    fn check_assign(&mut self, target: &Spanned<String>, value: &Expr) {
        let value_ty = self.check_expr(value);
        let Some(binding) = self.scopes.lookup(&target.node).cloned() else {
            self.undefined(&target.node, target.span);
            return;
        };
        if !binding.mutable {
            self.error(
                DiagnosticKind::ImmutableAssignment,
                format!("cannot assign to immutable binding `{}`", target.node),
                target.span,
            );
        }
        self.check_assignable(&value_ty, &binding.ty, value.span);
        self.scopes.invalidate(&target.node);
    }

    fn check_return(&mut self, value: Option<&Expr>, span: Span) {
        let Some(expected) = self.returns.last().cloned() else {
            if let Some(value) = value {
                self.check_expr(value);
            }
            self.error(DiagnosticKind::InvalidStatement, "`return` outside of a function", span);
            return;
        };
        match value {
            None => {
                if !returns_nothing(&expected) {
                    self.error(
                        DiagnosticKind::TypeMismatch,
                        format!("missing return value: function returns {expected}"),
                        span,
                    );
                }
            }
            Some(value) => {
                let ty = self.check_expr(value);
                if expected == Type::Void {
                    self.error(
                        DiagnosticKind::TypeMismatch,
                        format!("function returning void cannot return a value of type {ty}"),
                        value.span,
                    );
                } else {
                    self.check_assignable(&ty, &expected, value.span);
                }
            }
        }
    }

    /// Check a function body with its parameters bound. Shared by named
    /// declarations and anonymous functions.
    fn check_function(
        &mut self,
        params: &[Param],
        param_types: &[Type],
        ret: &Type,
        body: &Block,
        name_span: Span,
        name: Option<&str>,
    ) {
        self.scopes.push(FrameKind::Function);
        let mut seen: Vec<&str> = Vec::with_capacity(params.len());
        for (param, ty) in params.iter().zip(param_types) {
            if seen.contains(&param.name.node.as_str()) {
                self.error(
                    DiagnosticKind::DuplicateDeclaration,
                    format!("parameter `{}` is declared twice", param.name.node),
                    param.name.span,
                );
            }
            seen.push(&param.name.node);
            self.scopes
                .define(param.name.node.clone(), Binding::new(ty.clone(), (), false));
        }

        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.returns.push(ret.clone());
        self.hoist(&body.stmts, false);
        self.check_stmts(&body.stmts);
        self.returns.pop();
        self.loop_depth = saved_loops;
        self.scopes.pop();

        if !returns_nothing(ret) && !always_returns(&body.stmts) {
            let what = match name {
                Some(name) => format!("function `{name}`"),
                None => "anonymous function".to_string(),
            };
            self.error(
                DiagnosticKind::NonExhaustiveReturn,
                format!("{what} may reach the end of its body without returning {ret}"),
                name_span,
            );
        }
    }
}

/// Whether `to` places an `int` where a float could be mistaken for it
fn expects_int(to: &Type) -> bool {
    match to {
        Type::Int => true,
        Type::Nullable(inner) | Type::ErrorUnion { ok: inner, .. } => expects_int(inner),
        Type::Union(members) => members.contains(&Type::Int),
        _ => false,
    }
}

/// Return types that allow falling off the end of the body
fn returns_nothing(ty: &Type) -> bool {
    match ty {
        Type::Void | Type::Error => true,
        Type::ErrorUnion { ok, .. } => **ok == Type::Void,
        _ => false,
    }
}

/// Every path through `stmts` executes a `return`
pub(crate) fn always_returns(stmts: &[Spanned<Stmt>]) -> bool {
    stmts.iter().any(|s| stmt_returns(&s.node))
}

fn stmt_returns(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return(_) => true,
        Stmt::If {
            then_block,
            else_branch: Some(else_branch),
            ..
        } => always_returns(&then_block.stmts) && stmt_returns(&else_branch.node),
        Stmt::Block(block) => always_returns(&block.stmts),
        Stmt::While { cond, body } => is_literal_true(cond) && !breaks_loop(&body.stmts),
        _ => false,
    }
}

/// Control never reaches the statement after this one
fn stmt_diverges(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Break | Stmt::Continue => true,
        Stmt::If {
            then_block,
            else_branch: Some(else_branch),
            ..
        } => block_diverges(&then_block.stmts) && stmt_diverges(&else_branch.node),
        Stmt::Block(block) => block_diverges(&block.stmts),
        other => stmt_returns(other),
    }
}

pub(crate) fn block_diverges(stmts: &[Spanned<Stmt>]) -> bool {
    stmts.iter().any(|s| stmt_diverges(&s.node))
}

fn is_literal_true(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::BoolLit(true))
}

/// A `break` that targets the loop owning `stmts`
fn breaks_loop(stmts: &[Spanned<Stmt>]) -> bool {
    stmts.iter().any(|s| match &s.node {
        Stmt::Break => true,
        Stmt::If {
            then_block,
            else_branch,
            ..
        } => {
            breaks_loop(&then_block.stmts)
                || else_branch
                    .as_ref()
                    .is_some_and(|e| breaks_loop(std::slice::from_ref(&**e)))
        }
        Stmt::Block(block) => breaks_loop(&block.stmts),
        _ => false,
    })
}
