//! Expression AST nodes

use super::{Block, NodeId, Param, Span, Spanned, TypeExpr};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Expression node. Every expression carries a [`NodeId`] so the analyzer
/// can annotate it without mutating the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(id: NodeId, kind: ExprKind, span: Span) -> Self {
        Self { id, kind, span }
    }

    /// Name of the variable this expression reads, if it is a plain variable
    pub fn as_var(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Var(name) => Some(name),
            _ => None,
        }
    }
}

/// Expression kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// Integer literal
    IntLit(i64),
    /// Float literal
    FloatLit(f64),
    /// Boolean literal
    BoolLit(bool),
    /// String literal
    StringLit(String),
    /// The null marker
    Null,

    /// Variable reference
    Var(String),

    /// Binary operation
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },

    /// Unary operation
    Unary { op: UnOp, expr: Box<Expr> },

    /// Function call
    Call { callee: Box<Expr>, args: Vec<Expr> },

    /// `if c { a } else { b }` used for its value
    If {
        cond: Box<Expr>,
        then_block: Block,
        else_block: Block,
    },

    /// Error tag: `DivError.ZeroDiv`
    ErrorTag { set: String, tag: String },

    /// Propagation marker: `try expr`
    Try(Box<Expr>),

    /// `expr catch handler` / `expr catch |e| handler`
    Catch {
        expr: Box<Expr>,
        binding: Option<Spanned<String>>,
        handler: Box<Expr>,
    },

    /// Type test: `expr is T`
    Is {
        expr: Box<Expr>,
        ty: Spanned<TypeExpr>,
    },

    /// Explicit conversion: `int(x)`, `float(x)`, `string(x)`
    Convert { target: TypeExpr, expr: Box<Expr> },

    /// Anonymous function
    Lambda {
        params: Vec<Param>,
        ret_ty: Spanned<TypeExpr>,
        body: Rc<Block>,
    },
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    // Logical
    And,
    Or,
}

impl BinOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod)
    }

    pub fn is_ordering(self) -> bool {
        matches!(self, BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Ne)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinOp::Add => write!(f, "+"),
            BinOp::Sub => write!(f, "-"),
            BinOp::Mul => write!(f, "*"),
            BinOp::Div => write!(f, "/"),
            BinOp::Mod => write!(f, "%"),
            BinOp::Eq => write!(f, "=="),
            BinOp::Ne => write!(f, "!="),
            BinOp::Lt => write!(f, "<"),
            BinOp::Gt => write!(f, ">"),
            BinOp::Le => write!(f, "<="),
            BinOp::Ge => write!(f, ">="),
            BinOp::And => write!(f, "and"),
            BinOp::Or => write!(f, "or"),
        }
    }
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    /// Negation (-)
    Neg,
    /// Logical not (!)
    Not,
}

impl std::fmt::Display for UnOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnOp::Neg => write!(f, "-"),
            UnOp::Not => write!(f, "!"),
        }
    }
}
