//! Syntactic type annotations
//!
//! These are what the programmer wrote. `crate::types::lower` turns them
//! into semantic [`crate::types::Type`]s and validates their invariants.

use serde::{Deserialize, Serialize};

/// Type annotation as written in source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeExpr {
    Int,
    Float,
    Bool,
    String,
    Void,
    /// Error set name used as a type (`DivError`)
    Named(String),
    /// `T?`
    Nullable(Box<TypeExpr>),
    /// `A|B|...`
    Union(Vec<TypeExpr>),
    /// `E!T`
    ErrorUnion { set: String, ok: Box<TypeExpr> },
    /// `fn(A, B): R`
    Function {
        params: Vec<TypeExpr>,
        ret: Box<TypeExpr>,
    },
}

impl std::fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeExpr::Int => write!(f, "int"),
            TypeExpr::Float => write!(f, "float"),
            TypeExpr::Bool => write!(f, "bool"),
            TypeExpr::String => write!(f, "string"),
            TypeExpr::Void => write!(f, "void"),
            TypeExpr::Named(name) => write!(f, "{name}"),
            TypeExpr::Nullable(inner) => write!(f, "({inner})?"),
            TypeExpr::Union(members) => {
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, "|")?;
                    }
                    write!(f, "{m}")?;
                }
                Ok(())
            }
            TypeExpr::ErrorUnion { set, ok } => write!(f, "{set}!({ok})"),
            TypeExpr::Function { params, ret } => {
                write!(f, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, "): {ret}")
            }
        }
    }
}
