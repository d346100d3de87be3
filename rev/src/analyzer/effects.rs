//! Which bindings a piece of code may reassign
//!
//! Narrowing facts must not survive a reassignment. Straight-line
//! assignments drop them as they are checked; these summaries cover the
//! two paths that are not straight-line: a loop body running again after
//! its own assignments, and a call running a function body that assigns a
//! binding it captured.

use crate::ast::*;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub(super) struct Effects {
    /// Targets of assignments outside any function body
    pub assigned: HashSet<String>,
    /// Bindings a function body assigns without declaring them itself
    pub assigned_by_functions: HashSet<String>,
    /// Whether anything is called
    pub calls: bool,
    /// Names declared per lexical frame, innermost last
    frames: Vec<HashSet<String>>,
    /// Index into `frames` where each enclosing function body starts
    function_bases: Vec<usize>,
}

impl Effects {
    pub fn of_stmts(stmts: &[Spanned<Stmt>]) -> Self {
        let mut effects = Self::default();
        effects.frames.push(HashSet::new());
        effects.stmts(stmts);
        effects
    }

    pub fn of_expr(expr: &Expr) -> Self {
        let mut effects = Self::default();
        effects.frames.push(HashSet::new());
        effects.expr(expr);
        effects
    }

    fn declare(&mut self, name: &str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string());
        }
    }

    fn assign(&mut self, name: &str) {
        let Some(&base) = self.function_bases.last() else {
            self.assigned.insert(name.to_string());
            return;
        };
        let local = self.frames[base..].iter().any(|f| f.contains(name));
        if !local {
            self.assigned_by_functions.insert(name.to_string());
        }
    }

    fn scoped(&mut self, declared: &[&str], walk: impl FnOnce(&mut Self)) {
        self.frames.push(declared.iter().map(|n| n.to_string()).collect());
        walk(self);
        self.frames.pop();
    }

    fn block(&mut self, block: &Block) {
        self.scoped(&[], |e| e.stmts(&block.stmts));
    }

    fn function(&mut self, params: &[Param], body: &Block) {
        let params: Vec<&str> = params.iter().map(|p| p.name.node.as_str()).collect();
        self.function_bases.push(self.frames.len());
        self.scoped(&params, |e| e.stmts(&body.stmts));
        self.function_bases.pop();
    }

    fn stmts(&mut self, stmts: &[Spanned<Stmt>]) {
        for stmt in stmts {
            if let Stmt::FnDecl(decl) = &stmt.node {
                self.declare(&decl.name.node);
            }
        }
        for stmt in stmts {
            self.stmt(&stmt.node);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::VarDecl { name, init, .. } => {
                self.expr(init);
                self.declare(&name.node);
            }
            Stmt::Assign { target, value } => {
                self.expr(value);
                self.assign(&target.node);
            }
            Stmt::Expr(expr) | Stmt::Return(Some(expr)) => self.expr(expr),
            Stmt::If {
                cond,
                then_block,
                else_branch,
            } => {
                self.expr(cond);
                self.block(then_block);
                if let Some(else_branch) = else_branch {
                    self.scoped(&[], |e| e.stmt(&else_branch.node));
                }
            }
            Stmt::While { cond, body } => {
                self.expr(cond);
                self.block(body);
            }
            Stmt::For {
                var,
                start,
                end,
                body,
            } => {
                self.expr(start);
                self.expr(end);
                self.scoped(&[var.node.as_str()], |e| e.block(body));
            }
            Stmt::FnDecl(decl) => self.function(&decl.params, &decl.body),
            Stmt::Block(block) => self.block(block),
            Stmt::Return(None) | Stmt::Break | Stmt::Continue | Stmt::ErrorDecl(_) => {}
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::IntLit(_)
            | ExprKind::FloatLit(_)
            | ExprKind::BoolLit(_)
            | ExprKind::StringLit(_)
            | ExprKind::Null
            | ExprKind::Var(_)
            | ExprKind::ErrorTag { .. } => {}
            ExprKind::Binary { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            ExprKind::Unary { expr: inner, .. }
            | ExprKind::Try(inner)
            | ExprKind::Is { expr: inner, .. }
            | ExprKind::Convert { expr: inner, .. } => self.expr(inner),
            ExprKind::Call { callee, args } => {
                self.calls = true;
                self.expr(callee);
                for arg in args {
                    self.expr(arg);
                }
            }
            ExprKind::If {
                cond,
                then_block,
                else_block,
            } => {
                self.expr(cond);
                self.block(then_block);
                self.block(else_block);
            }
            ExprKind::Catch {
                expr: inner,
                binding,
                handler,
            } => {
                self.expr(inner);
                let declared: Vec<&str> = binding.iter().map(|b| b.node.as_str()).collect();
                self.scoped(&declared, |e| e.expr(handler));
            }
            ExprKind::Lambda { params, body, .. } => self.function(params, body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_source;

    fn effects(source: &str) -> Effects {
        let program = parse_source(source).expect("parse");
        Effects::of_stmts(&program.stmts)
    }

    fn sorted(names: &HashSet<String>) -> Vec<&str> {
        let mut names: Vec<&str> = names.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[test]
    fn test_top_level_assignments() {
        let e = effects("var a = 1\nwhile a < 3 {\n    a = a + 1\n}\nvar b = 2\nb = 3");
        assert_eq!(sorted(&e.assigned), vec!["a", "b"]);
        assert!(e.assigned_by_functions.is_empty());
        assert!(!e.calls);
    }

    #[test]
    fn test_function_assigning_captured_binding() {
        let e = effects("var a: int? = 1\nfn reset(): void {\n    a = null\n}\nreset()");
        assert!(e.assigned.is_empty());
        assert_eq!(sorted(&e.assigned_by_functions), vec!["a"]);
        assert!(e.calls);
    }

    #[test]
    fn test_function_locals_are_not_captured() {
        let e = effects(
            "fn f(n: int): int {\n    var t = n\n    t = t + 1\n    for i in 0..n {\n        t = t + i\n    }\n    return t\n}",
        );
        assert!(e.assigned_by_functions.is_empty());
    }

    #[test]
    fn test_block_local_does_not_hide_outer_binding() {
        let e = effects("fn f(): void {\n    if true {\n        var a = 1\n    }\n    a = 2\n}");
        assert_eq!(sorted(&e.assigned_by_functions), vec!["a"]);
    }

    #[test]
    fn test_nested_lambda_assigning_enclosing_local() {
        let e = effects(
            "fn counter(): fn(): int {\n    var n = 0\n    return fn(): int {\n        n = n + 1\n        return n\n    }\n}",
        );
        assert_eq!(sorted(&e.assigned_by_functions), vec!["n"]);
    }
}
