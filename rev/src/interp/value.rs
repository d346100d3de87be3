//! Runtime values for the interpreter

use super::env::FrameId;
use crate::ast::Block;
use crate::types::Type;
use std::fmt;
use std::rc::Rc;

/// Runtime value. Nullable, union and error-union typed expressions
/// produce whichever concrete variant is active; there is no wrapper.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(Rc<str>),
    /// The null marker
    Null,
    /// Error tag such as `DivError.ZeroDiv`
    ErrorTag { set: String, tag: String },
    Function(Rc<Closure>),
    /// Result of statements and `void` functions
    Void,
}

/// A function value: code plus the frame it was defined in
#[derive(Debug)]
pub struct Closure {
    /// `None` for anonymous functions
    pub name: Option<String>,
    pub params: Vec<(String, Type)>,
    pub ret: Type,
    pub body: Rc<Block>,
    pub env: FrameId,
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    /// Get type name for error messages
    pub fn type_name(&self) -> &str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Null => "null",
            Value::ErrorTag { set, .. } => set,
            Value::Function(_) => "function",
            Value::Void => "void",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric value as f64; ints widen
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Language-level `==`: ints and floats compare numerically
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
            _ => self == other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x:.1}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Null => write!(f, "null"),
            Value::ErrorTag { set, tag } => write!(f, "{set}.{tag}"),
            Value::Function(closure) => match &closure.name {
                Some(name) => write!(f, "<fn {name}>"),
                None => write!(f, "<fn>"),
            },
            Value::Void => write!(f, "void"),
        }
    }
}

/// Structural equality; functions compare by identity
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Null, Value::Null) | (Value::Void, Value::Void) => true,
            (Value::ErrorTag { set: s1, tag: t1 }, Value::ErrorTag { set: s2, tag: t2 }) => {
                s1 == s2 && t1 == t2
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}
