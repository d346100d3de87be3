//! Runtime errors for the interpreter

use crate::ast::Span;
use std::fmt;

/// Result type for evaluation
pub type InterpResult<T> = Result<T, RuntimeError>;

/// Fault that aborts the current run
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Option<Span>,
}

/// Kinds of runtime faults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DivisionByZero,
    ImmutableAssignment,
    /// Call depth limit exceeded
    StackOverflow,
    IntegerOverflow,
    /// An error tag propagated out of the program
    UncaughtError,
    /// Broken interpreter invariant; analysis should have prevented it
    Internal,
}

impl RuntimeError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        RuntimeError {
            kind,
            message: message.into(),
            span: None,
        }
    }

    pub fn division_by_zero() -> Self {
        Self::new(ErrorKind::DivisionByZero, "division by zero")
    }

    pub fn immutable_assignment(name: &str) -> Self {
        Self::new(
            ErrorKind::ImmutableAssignment,
            format!("cannot assign to immutable binding `{name}`"),
        )
    }

    pub fn stack_overflow(limit: usize) -> Self {
        Self::new(
            ErrorKind::StackOverflow,
            format!("stack overflow: call depth exceeded {limit}"),
        )
    }

    pub fn integer_overflow(op: &str) -> Self {
        Self::new(ErrorKind::IntegerOverflow, format!("integer overflow in `{op}`"))
    }

    pub fn uncaught_error(set: &str, tag: &str) -> Self {
        Self::new(ErrorKind::UncaughtError, format!("uncaught error {set}.{tag}"))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, format!("internal error: {}", message.into()))
    }

    /// Attach a position unless one is already set
    pub fn at(mut self, span: Span) -> Self {
        self.span.get_or_insert(span);
        self
    }

    /// Process exit status for a run that ended with this fault
    pub fn exit_code(&self) -> i32 {
        match self.kind {
            ErrorKind::Internal => 70,
            _ => 1,
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Runtime error: {}", self.message)
    }
}

impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_division_by_zero() {
        let err = RuntimeError::division_by_zero();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
        assert_eq!(err.to_string(), "Runtime error: division by zero");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_uncaught_error_message() {
        let err = RuntimeError::uncaught_error("DivError", "ZeroDiv");
        assert_eq!(err.message, "uncaught error DivError.ZeroDiv");
    }

    #[test]
    fn test_internal_exit_code() {
        assert_eq!(RuntimeError::internal("bad frame").exit_code(), 70);
    }

    #[test]
    fn test_at_keeps_innermost_span() {
        let err = RuntimeError::stack_overflow(10)
            .at(Span::new(1, 2))
            .at(Span::new(0, 9));
        assert_eq!(err.span, Some(Span::new(1, 2)));
    }
}
