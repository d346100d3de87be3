//! Type model
//!
//! Semantic types shared by the analyzer and the interpreter, plus the
//! rules for comparing and combining them. Everything here is pure.

mod table;

pub use table::TypeTable;

use crate::ast::TypeExpr;
use crate::interp::Value;
use std::fmt;
use thiserror::Error;

/// Semantic type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Float,
    Bool,
    String,
    Void,
    /// Type of the `null` literal; only assignable to nullables
    Null,
    /// Type of a tag value such as `DivError.ZeroDiv`
    ErrorSet(String),
    /// `T?`. Never wraps another nullable.
    Nullable(Box<Type>),
    /// `A|B|...`, at least two distinct members in declaration order
    Union(Vec<Type>),
    /// `E!T`
    ErrorUnion { set: String, ok: Box<Type> },
    Function { params: Vec<Type>, ret: Box<Type> },
    /// Type of an expression that already failed to check. Compatible with
    /// everything so one mistake produces one diagnostic.
    Error,
}

/// Violation of a type formation rule
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeFormError {
    #[error("`void` cannot be nullable")]
    NullableVoid,
    #[error("error union `{0}` cannot be nullable")]
    NullableErrorUnion(Type),
    #[error("error union `{0}` cannot be the success type of another error union")]
    NestedErrorUnion(Type),
    #[error("a union needs at least two member types")]
    UnionTooSmall,
    #[error("type `{0}` appears more than once in union")]
    DuplicateUnionMember(Type),
    #[error("type `{0}` cannot be a union member")]
    InvalidUnionMember(Type),
    #[error("unknown error set `{0}`")]
    UnknownErrorSet(String),
}

impl Type {
    /// `T?`, collapsing `T??` into `T?`
    pub fn nullable(inner: Type) -> Result<Type, TypeFormError> {
        match inner {
            Type::Nullable(_) | Type::Error => Ok(inner),
            Type::Void | Type::Null => Err(TypeFormError::NullableVoid),
            Type::ErrorUnion { .. } => Err(TypeFormError::NullableErrorUnion(inner)),
            other => Ok(Type::Nullable(Box::new(other))),
        }
    }

    /// Union of `members`; nested unions are flattened into the outer one
    pub fn union(members: Vec<Type>) -> Result<Type, TypeFormError> {
        let mut flat: Vec<Type> = Vec::with_capacity(members.len());
        for member in members {
            let parts = match member {
                Type::Union(inner) => inner,
                other => vec![other],
            };
            for part in parts {
                match part {
                    Type::Error => return Ok(Type::Error),
                    Type::Void | Type::Null | Type::Nullable(_) | Type::ErrorUnion { .. } => {
                        return Err(TypeFormError::InvalidUnionMember(part));
                    }
                    _ if flat.contains(&part) => return Err(TypeFormError::DuplicateUnionMember(part)),
                    _ => flat.push(part),
                }
            }
        }
        if flat.len() < 2 {
            return Err(TypeFormError::UnionTooSmall);
        }
        Ok(Type::Union(flat))
    }

    /// `set!ok`
    pub fn error_union(set: impl Into<String>, ok: Type) -> Result<Type, TypeFormError> {
        match ok {
            Type::ErrorUnion { .. } => Err(TypeFormError::NestedErrorUnion(ok)),
            Type::Error => Ok(Type::Error),
            ok => Ok(Type::ErrorUnion {
                set: set.into(),
                ok: Box::new(ok),
            }),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    pub fn is_error_union(&self) -> bool {
        matches!(self, Type::ErrorUnion { .. })
    }

    /// Whether a runtime value inhabits this type exactly (no coercion)
    pub fn admits(&self, value: &Value) -> bool {
        match (self, value) {
            (Type::Error, _) => true,
            (Type::Int, Value::Int(_))
            | (Type::Float, Value::Float(_))
            | (Type::Bool, Value::Bool(_))
            | (Type::String, Value::Str(_))
            | (Type::Void, Value::Void)
            | (Type::Null, Value::Null) => true,
            (Type::ErrorSet(name), Value::ErrorTag { set, .. }) => name == set,
            (Type::Nullable(inner), v) => matches!(v, Value::Null) || inner.admits(v),
            (Type::Union(members), v) => members.iter().any(|m| m.admits(v)),
            (Type::ErrorUnion { set, ok }, v) => match v {
                Value::ErrorTag { set: tag_set, .. } => tag_set == set,
                v => ok.admits(v),
            },
            (Type::Function { .. }, Value::Function(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Bool => write!(f, "bool"),
            Type::String => write!(f, "string"),
            Type::Void => write!(f, "void"),
            Type::Null => write!(f, "null"),
            Type::ErrorSet(name) => write!(f, "{name}"),
            Type::Nullable(inner) => match inner.as_ref() {
                Type::Union(_) | Type::Function { .. } => write!(f, "({inner})?"),
                _ => write!(f, "{inner}?"),
            },
            Type::Union(members) => {
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, "|")?;
                    }
                    match m {
                        Type::Function { .. } => write!(f, "({m})")?,
                        _ => write!(f, "{m}")?,
                    }
                }
                Ok(())
            }
            Type::ErrorUnion { set, ok } => match ok.as_ref() {
                Type::Union(_) | Type::Function { .. } => write!(f, "{set}!({ok})"),
                _ => write!(f, "{set}!{ok}"),
            },
            Type::Function { params, ret } => {
                write!(f, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, "): {ret}")
            }
            Type::Error => write!(f, "<error>"),
        }
    }
}

/// Turn a written annotation into a validated type.
/// `is_error_set` answers whether a name refers to a declared error set.
pub fn lower(expr: &TypeExpr, is_error_set: &dyn Fn(&str) -> bool) -> Result<Type, TypeFormError> {
    let check_set = |name: &str| {
        if is_error_set(name) {
            Ok(())
        } else {
            Err(TypeFormError::UnknownErrorSet(name.to_string()))
        }
    };
    match expr {
        TypeExpr::Int => Ok(Type::Int),
        TypeExpr::Float => Ok(Type::Float),
        TypeExpr::Bool => Ok(Type::Bool),
        TypeExpr::String => Ok(Type::String),
        TypeExpr::Void => Ok(Type::Void),
        TypeExpr::Named(name) => {
            check_set(name)?;
            Ok(Type::ErrorSet(name.clone()))
        }
        TypeExpr::Nullable(inner) => Type::nullable(lower(inner, is_error_set)?),
        TypeExpr::Union(members) => {
            let members = members
                .iter()
                .map(|m| lower(m, is_error_set))
                .collect::<Result<Vec<_>, _>>()?;
            Type::union(members)
        }
        TypeExpr::ErrorUnion { set, ok } => {
            check_set(set)?;
            Type::error_union(set.clone(), lower(ok, is_error_set)?)
        }
        TypeExpr::Function { params, ret } => Ok(Type::Function {
            params: params
                .iter()
                .map(|p| lower(p, is_error_set))
                .collect::<Result<Vec<_>, _>>()?,
            ret: Box::new(lower(ret, is_error_set)?),
        }),
    }
}

/// Whether a value of type `from` may be used where `to` is expected.
///
/// Union membership is exact: `int` flows into `int|string` but not into
/// `float|string`. Function types must match exactly.
pub fn is_assignable(from: &Type, to: &Type) -> bool {
    if from == to {
        return true;
    }
    match (from, to) {
        (Type::Error, _) | (_, Type::Error) => true,
        (Type::Int, Type::Float) => true,
        (Type::Null, Type::Nullable(_)) => true,
        (Type::ErrorSet(tag_set), Type::ErrorUnion { set, .. }) => tag_set == set,
        (Type::Nullable(a), Type::Nullable(b)) => is_assignable(a, b),
        (Type::ErrorUnion { set: s1, ok: a }, Type::ErrorUnion { set: s2, ok: b }) => {
            s1 == s2 && is_assignable(a, b)
        }
        (Type::Union(a), Type::Union(b)) => a.iter().all(|m| b.contains(m)),
        (_, Type::Union(members)) => members.contains(from),
        (_, Type::Nullable(inner)) => is_assignable(from, inner),
        (_, Type::ErrorUnion { ok, .. }) => is_assignable(from, ok),
        _ => false,
    }
}

/// Result type of two branches that must agree: the wider of the two.
/// `None` when neither side is assignable to the other.
pub fn unify(t1: &Type, t2: &Type) -> Option<Type> {
    match (t1, t2) {
        (Type::Error, other) | (other, Type::Error) => Some(other.clone()),
        _ if is_assignable(t2, t1) => Some(t1.clone()),
        _ if is_assignable(t1, t2) => Some(t2.clone()),
        _ => None,
    }
}

/// Called with a pair that [`is_assignable`] rejects
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot coerce {from} to {to}")]
pub struct CoerceError {
    pub from: Type,
    pub to: Type,
}

/// Perform the runtime conversion implied by [`is_assignable`].
/// The only representation change is `int` widening to `float`, wherever
/// the target places a `float`.
pub fn coerce(value: Value, from: &Type, to: &Type) -> Result<Value, CoerceError> {
    if !is_assignable(from, to) {
        return Err(CoerceError {
            from: from.clone(),
            to: to.clone(),
        });
    }
    Ok(widen(value, to))
}

fn widen(value: Value, to: &Type) -> Value {
    match (value, to) {
        (Value::Int(n), Type::Float) => Value::Float(n as f64),
        (Value::Null, _) => Value::Null,
        (tag @ Value::ErrorTag { .. }, _) => tag,
        (value, Type::Nullable(inner)) => widen(value, inner),
        (value, Type::ErrorUnion { ok, .. }) => widen(value, ok),
        (value, _) => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nullable(t: Type) -> Type {
        Type::nullable(t).unwrap()
    }

    fn union(ts: Vec<Type>) -> Type {
        Type::union(ts).unwrap()
    }

    fn eu(set: &str, ok: Type) -> Type {
        Type::error_union(set, ok).unwrap()
    }

    fn known(name: &str) -> bool {
        name == "DivError"
    }

    // ============================================
    // Formation rules
    // ============================================

    #[test]
    fn test_nullable_collapses() {
        assert_eq!(Type::nullable(nullable(Type::Int)), Ok(nullable(Type::Int)));
    }

    #[test]
    fn test_nullable_void_rejected() {
        assert_eq!(Type::nullable(Type::Void), Err(TypeFormError::NullableVoid));
    }

    #[test]
    fn test_nullable_error_union_rejected() {
        assert!(matches!(
            Type::nullable(eu("E", Type::Int)),
            Err(TypeFormError::NullableErrorUnion(_))
        ));
    }

    #[test]
    fn test_union_requires_two_distinct_members() {
        assert_eq!(Type::union(vec![Type::Int]), Err(TypeFormError::UnionTooSmall));
        assert_eq!(
            Type::union(vec![Type::Int, Type::Int]),
            Err(TypeFormError::DuplicateUnionMember(Type::Int))
        );
    }

    #[test]
    fn test_union_flattens() {
        let inner = union(vec![Type::Int, Type::String]);
        assert_eq!(
            Type::union(vec![inner, Type::Bool]),
            Ok(Type::Union(vec![Type::Int, Type::String, Type::Bool]))
        );
    }

    #[test]
    fn test_union_rejects_nullable_and_void_members() {
        assert!(Type::union(vec![Type::Int, nullable(Type::String)]).is_err());
        assert!(Type::union(vec![Type::Int, Type::Void]).is_err());
    }

    #[test]
    fn test_error_union_may_wrap_nullable_and_union() {
        assert!(Type::error_union("E", nullable(Type::Int)).is_ok());
        assert!(Type::error_union("E", union(vec![Type::Int, Type::String])).is_ok());
    }

    #[test]
    fn test_nested_error_union_rejected() {
        assert!(matches!(
            Type::error_union("E", eu("F", Type::Int)),
            Err(TypeFormError::NestedErrorUnion(_))
        ));
    }

    // ============================================
    // Lowering
    // ============================================

    #[test]
    fn test_lower_error_union() {
        let expr = TypeExpr::ErrorUnion {
            set: "DivError".to_string(),
            ok: Box::new(TypeExpr::Int),
        };
        assert_eq!(lower(&expr, &known), Ok(eu("DivError", Type::Int)));
    }

    #[test]
    fn test_lower_unknown_error_set() {
        let expr = TypeExpr::Named("Missing".to_string());
        assert_eq!(
            lower(&expr, &known),
            Err(TypeFormError::UnknownErrorSet("Missing".to_string()))
        );
    }

    #[test]
    fn test_lower_nullable_union() {
        let expr = TypeExpr::Nullable(Box::new(TypeExpr::Union(vec![
            TypeExpr::Int,
            TypeExpr::String,
        ])));
        assert_eq!(
            lower(&expr, &known),
            Ok(nullable(union(vec![Type::Int, Type::String])))
        );
    }

    #[test]
    fn test_lower_double_nullable_collapses() {
        let expr = TypeExpr::Nullable(Box::new(TypeExpr::Nullable(Box::new(TypeExpr::Int))));
        assert_eq!(lower(&expr, &known), Ok(nullable(Type::Int)));
    }

    // ============================================
    // Assignability
    // ============================================

    #[test]
    fn test_assignable_identity_and_widening() {
        assert!(is_assignable(&Type::Int, &Type::Int));
        assert!(is_assignable(&Type::Int, &Type::Float));
        assert!(!is_assignable(&Type::Float, &Type::Int));
        assert!(!is_assignable(&Type::Bool, &Type::Int));
    }

    #[test]
    fn test_assignable_into_nullable() {
        assert!(is_assignable(&Type::Int, &nullable(Type::Int)));
        assert!(is_assignable(&Type::Null, &nullable(Type::Int)));
        assert!(is_assignable(&Type::Int, &nullable(Type::Float)));
        assert!(!is_assignable(&nullable(Type::Int), &Type::Int));
        assert!(!is_assignable(&Type::Null, &Type::Int));
    }

    #[test]
    fn test_assignable_union_membership_is_exact() {
        let int_or_string = union(vec![Type::Int, Type::String]);
        let float_or_string = union(vec![Type::Float, Type::String]);
        assert!(is_assignable(&Type::Int, &int_or_string));
        assert!(is_assignable(&Type::String, &int_or_string));
        assert!(!is_assignable(&Type::Int, &float_or_string));
        assert!(!is_assignable(&int_or_string, &Type::Int));
    }

    #[test]
    fn test_assignable_union_subset() {
        let small = union(vec![Type::String, Type::Int]);
        let big = union(vec![Type::Int, Type::Bool, Type::String]);
        assert!(is_assignable(&small, &big));
        assert!(!is_assignable(&big, &small));
    }

    #[test]
    fn test_assignable_error_union() {
        let div = eu("DivError", Type::Int);
        assert!(is_assignable(&Type::Int, &div));
        assert!(is_assignable(&Type::ErrorSet("DivError".to_string()), &div));
        assert!(!is_assignable(&Type::ErrorSet("IoError".to_string()), &div));
        assert!(!is_assignable(&div, &Type::Int));
        assert!(is_assignable(&div, &eu("DivError", Type::Float)));
        assert!(!is_assignable(&div, &eu("IoError", Type::Int)));
    }

    #[test]
    fn test_assignable_function_is_exact() {
        let f = Type::Function {
            params: vec![Type::Int],
            ret: Box::new(Type::Int),
        };
        let g = Type::Function {
            params: vec![Type::Int],
            ret: Box::new(Type::Float),
        };
        assert!(is_assignable(&f, &f.clone()));
        assert!(!is_assignable(&f, &g));
    }

    #[test]
    fn test_error_type_is_compatible_both_ways() {
        assert!(is_assignable(&Type::Error, &Type::Int));
        assert!(is_assignable(&Type::String, &Type::Error));
    }

    // ============================================
    // Unification
    // ============================================

    #[test]
    fn test_unify_adopts_wider_type() {
        assert_eq!(unify(&Type::Int, &Type::Float), Some(Type::Float));
        assert_eq!(unify(&Type::Float, &Type::Int), Some(Type::Float));
        assert_eq!(unify(&Type::Null, &nullable(Type::Int)), Some(nullable(Type::Int)));
    }

    #[test]
    fn test_unify_incompatible() {
        assert_eq!(unify(&Type::Int, &Type::String), None);
        assert_eq!(unify(&Type::Int, &Type::Null), None);
    }

    #[test]
    fn test_unify_error_passthrough() {
        assert_eq!(unify(&Type::Error, &Type::Bool), Some(Type::Bool));
    }

    // ============================================
    // Coercion
    // ============================================

    #[test]
    fn test_coerce_int_to_float() {
        assert_eq!(coerce(Value::Int(3), &Type::Int, &Type::Float), Ok(Value::Float(3.0)));
    }

    #[test]
    fn test_coerce_through_nullable_and_error_union() {
        assert_eq!(
            coerce(Value::Int(2), &Type::Int, &nullable(Type::Float)),
            Ok(Value::Float(2.0))
        );
        assert_eq!(
            coerce(Value::Null, &Type::Null, &nullable(Type::Float)),
            Ok(Value::Null)
        );
        assert_eq!(
            coerce(Value::Int(1), &Type::Int, &eu("E", Type::Float)),
            Ok(Value::Float(1.0))
        );
    }

    #[test]
    fn test_coerce_union_keeps_member() {
        let target = union(vec![Type::Int, Type::Float]);
        assert_eq!(coerce(Value::Int(5), &Type::Int, &target), Ok(Value::Int(5)));
    }

    #[test]
    fn test_coerce_rejects_unassignable_pair() {
        assert!(coerce(Value::Float(1.5), &Type::Float, &Type::Int).is_err());
    }

    #[test]
    fn test_admits() {
        let t = nullable(union(vec![Type::Int, Type::String]));
        assert!(t.admits(&Value::Null));
        assert!(t.admits(&Value::Int(1)));
        assert!(!t.admits(&Value::Bool(true)));
    }

    // ============================================
    // Display
    // ============================================

    #[test]
    fn test_type_display() {
        let rendered = [
            nullable(Type::Int),
            union(vec![Type::Int, Type::String]),
            nullable(union(vec![Type::Int, Type::String])),
            eu("DivError", Type::Int),
            eu("DivError", union(vec![Type::Int, Type::String])),
            Type::Function {
                params: vec![Type::Int, Type::Float],
                ret: Box::new(Type::Int),
            },
            Type::Null,
            Type::Error,
        ]
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join("\n");
        insta::assert_snapshot!(rendered, @r"
        int?
        int|string
        (int|string)?
        DivError!int
        DivError!(int|string)
        fn(int, float): int
        null
        <error>
        ");
    }
}
