//! Abstract Syntax Tree definitions
//!
//! The tree is produced by the parser and is read-only afterwards: the
//! analyzer records types in a side table keyed by [`NodeId`].

mod expr;
mod span;
mod types;

pub use expr::*;
pub use span::*;
pub use types::*;

use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// A program (or a single REPL input) is a sequence of top-level statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub stmts: Vec<Spanned<Stmt>>,
}

/// Brace-delimited statement list. When the last statement is an
/// expression statement, the block yields its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Spanned<Stmt>>,
    pub span: Span,
}

impl Block {
    /// Trailing expression whose value the block yields
    pub fn tail_expr(&self) -> Option<&Expr> {
        match self.stmts.last().map(|s| &s.node) {
            Some(Stmt::Expr(expr)) => Some(expr),
            _ => None,
        }
    }
}

/// Statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// `var x: T = e` / `const x = e`
    VarDecl {
        name: Spanned<String>,
        mutable: bool,
        ty: Option<Spanned<TypeExpr>>,
        init: Expr,
    },

    /// `x = e`
    Assign { target: Spanned<String>, value: Expr },

    /// Expression evaluated for its effects (or as a block's value)
    Expr(Expr),

    /// `if` statement; `else if` chains nest in `else_branch`
    If {
        cond: Expr,
        then_block: Block,
        else_branch: Option<Box<Spanned<Stmt>>>,
    },

    /// `while cond { ... }`
    While { cond: Expr, body: Block },

    /// `for i in start..end { ... }`
    For {
        var: Spanned<String>,
        start: Expr,
        end: Expr,
        body: Block,
    },

    Break,
    Continue,

    /// `return` / `return e`
    Return(Option<Expr>),

    /// Named function declaration
    FnDecl(FnDecl),

    /// `error Name { A, B }`
    ErrorDecl(ErrorDecl),

    /// Nested block
    Block(Block),
}

/// Function declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FnDecl {
    pub name: Spanned<String>,
    pub params: Vec<Param>,
    pub ret_ty: Spanned<TypeExpr>,
    pub body: Rc<Block>,
    pub span: Span,
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: Spanned<String>,
    pub ty: Spanned<TypeExpr>,
}

/// Error set declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDecl {
    pub name: Spanned<String>,
    pub tags: Vec<Spanned<String>>,
}
