//! Error types and reporting

use crate::ast::Span;
use crate::interp::RuntimeError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, CompileError>;

/// Failure before static analysis can start (lexing or parsing)
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Lexer error at {span}: {message}")]
    Lexer { message: String, span: Span },

    #[error("Parser error at {span}: {message}")]
    Parser { message: String, span: Span },

    #[error("IO error: {message}")]
    Io { message: String },

    /// Several parse errors, in source order
    #[error("{}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n"))]
    Multiple(Vec<CompileError>),
}

impl CompileError {
    pub fn lexer(message: impl Into<String>, span: Span) -> Self {
        Self::Lexer {
            message: message.into(),
            span,
        }
    }

    pub fn parser(message: impl Into<String>, span: Span) -> Self {
        Self::Parser {
            message: message.into(),
            span,
        }
    }

    pub fn io_error(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Lexer { span, .. } | Self::Parser { span, .. } => Some(*span),
            Self::Io { .. } => None,
            Self::Multiple(errors) => errors.first().and_then(Self::span),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Lexer { message, .. } => message,
            Self::Parser { message, .. } => message,
            Self::Io { message } => message,
            Self::Multiple(errors) => errors.first().map_or("", Self::message),
        }
    }

    /// The individual errors this one stands for
    pub fn errors(&self) -> Vec<&CompileError> {
        match self {
            Self::Multiple(errors) => errors.iter().collect(),
            single => vec![single],
        }
    }
}

impl From<std::io::Error> for CompileError {
    fn from(err: std::io::Error) -> Self {
        Self::io_error(err.to_string())
    }
}

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Classification of static diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    TypeMismatch,
    UndefinedIdentifier,
    InvalidCoercion,
    NullableUnguarded,
    UnionUnguarded,
    UnhandledErrorUnion,
    NonExhaustiveReturn,
    InvalidType,
    ImmutableAssignment,
    InvalidStatement,
    ArityMismatch,
    NotCallable,
    DuplicateDeclaration,
    UnreachableCode,
}

impl DiagnosticKind {
    /// Stable short name, used in reports and tests
    pub fn code(self) -> &'static str {
        match self {
            DiagnosticKind::TypeMismatch => "type-mismatch",
            DiagnosticKind::UndefinedIdentifier => "undefined-identifier",
            DiagnosticKind::InvalidCoercion => "invalid-coercion",
            DiagnosticKind::NullableUnguarded => "nullable-used-unguarded",
            DiagnosticKind::UnionUnguarded => "union-member-used-unguarded",
            DiagnosticKind::UnhandledErrorUnion => "unhandled-error-union",
            DiagnosticKind::NonExhaustiveReturn => "non-exhaustive-return",
            DiagnosticKind::InvalidType => "invalid-type",
            DiagnosticKind::ImmutableAssignment => "immutable-assignment",
            DiagnosticKind::InvalidStatement => "invalid-statement",
            DiagnosticKind::ArityMismatch => "arity-mismatch",
            DiagnosticKind::NotCallable => "not-callable",
            DiagnosticKind::DuplicateDeclaration => "duplicate-declaration",
            DiagnosticKind::UnreachableCode => "unreachable-code",
        }
    }
}

/// A single finding of the static analyzer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
            span,
        }
    }

    pub fn warning(kind: DiagnosticKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            message: message.into(),
            span,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[{}] at {}: {}",
            self.severity,
            self.kind.code(),
            self.span,
            self.message
        )
    }
}

/// Report a lexer/parser error with ariadne
pub fn report_error(filename: &str, source: &str, error: &CompileError) -> std::io::Result<()> {
    use ariadne::{Color, Label, Report, ReportKind, Source};

    let kind = match error {
        CompileError::Lexer { .. } => "Lexer",
        CompileError::Parser { .. } => "Parser",
        CompileError::Io { .. } => "IO",
        CompileError::Multiple(errors) => {
            return errors.iter().try_for_each(|e| report_error(filename, source, e));
        }
    };

    if let Some(span) = error.span() {
        Report::build(ReportKind::Error, (filename, span.start..span.end))
            .with_message(format!("{kind} error"))
            .with_label(
                Label::new((filename, span.start..span.end))
                    .with_message(error.message())
                    .with_color(Color::Red),
            )
            .finish()
            .eprint((filename, Source::from(source)))
    } else {
        Report::build(ReportKind::Error, (filename, 0..0))
            .with_message(format!("{kind} error: {}", error.message()))
            .finish()
            .eprint((filename, Source::from(source)))
    }
}

/// Report a static diagnostic with ariadne
pub fn report_diagnostic(filename: &str, source: &str, diag: &Diagnostic) -> std::io::Result<()> {
    use ariadne::{Color, Label, Report, ReportKind, Source};

    let (kind, color) = match diag.severity {
        Severity::Error => (ReportKind::Error, Color::Red),
        Severity::Warning => (ReportKind::Warning, Color::Yellow),
    };
    let range = diag.span.start..diag.span.end;

    Report::build(kind, (filename, range.clone()))
        .with_code(diag.kind.code())
        .with_message(&diag.message)
        .with_label(
            Label::new((filename, range))
                .with_message(&diag.message)
                .with_color(color),
        )
        .finish()
        .eprint((filename, Source::from(source)))
}

/// Report a runtime fault with ariadne, falling back to a plain line when
/// the fault carries no position
pub fn report_fault(filename: &str, source: &str, fault: &RuntimeError) -> std::io::Result<()> {
    use ariadne::{Color, Label, Report, ReportKind, Source};

    match fault.span {
        Some(span) => Report::build(ReportKind::Error, (filename, span.start..span.end))
            .with_message(fault.to_string())
            .with_label(
                Label::new((filename, span.start..span.end))
                    .with_message(&fault.message)
                    .with_color(Color::Red),
            )
            .finish()
            .eprint((filename, Source::from(source))),
        None => {
            eprintln!("{fault}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_span_and_message() {
        let err = CompileError::parser("expected `}`", Span::new(4, 5));
        assert_eq!(err.span(), Some(Span::new(4, 5)));
        assert_eq!(err.message(), "expected `}`");
        assert_eq!(err.to_string(), "Parser error at 4..5: expected `}`");
    }

    #[test]
    fn test_io_error_has_no_span() {
        let err = CompileError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
        assert!(err.span().is_none());
        assert!(err.message().contains("missing"));
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::error(
            DiagnosticKind::NullableUnguarded,
            "nullable int? used without null check",
            Span::new(10, 11),
        );
        insta::assert_snapshot!(
            diag.to_string(),
            @"error[nullable-used-unguarded] at 10..11: nullable int? used without null check"
        );
    }

    #[test]
    fn test_warning_is_not_error() {
        let diag = Diagnostic::warning(DiagnosticKind::UnreachableCode, "unreachable", Span::new(0, 1));
        assert!(!diag.is_error());
        assert!(Severity::Warning < Severity::Error);
    }
}
