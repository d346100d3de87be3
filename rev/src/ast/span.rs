//! Source locations and node identities

use serde::{Deserialize, Serialize};

/// Byte range in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl From<Span> for std::ops::Range<usize> {
    fn from(span: Span) -> Self {
        span.start..span.end
    }
}

impl From<std::ops::Range<usize>> for Span {
    fn from(range: std::ops::Range<usize>) -> Self {
        Span::new(range.start, range.end)
    }
}

/// A value with source location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Spanned<U> {
        Spanned {
            node: f(self.node),
            span: self.span,
        }
    }
}

/// Identity of an expression node.
///
/// Assigned by the parser, unique within a session. The analyzer keys its
/// type annotations by this id so the AST itself stays read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge_disjoint() {
        let merged = Span::new(10, 12).merge(Span::new(0, 3));
        assert_eq!(merged, Span::new(0, 12));
    }

    #[test]
    fn test_span_merge_nested() {
        let merged = Span::new(0, 100).merge(Span::new(20, 30));
        assert_eq!(merged, Span::new(0, 100));
    }

    #[test]
    fn test_span_len_and_empty() {
        assert_eq!(Span::new(4, 9).len(), 5);
        assert!(Span::new(7, 7).is_empty());
        assert!(!Span::new(7, 8).is_empty());
    }

    #[test]
    fn test_span_range_conversion() {
        let range: std::ops::Range<usize> = Span::new(3, 8).into();
        assert_eq!(range, 3..8);
        assert_eq!(Span::from(1..2), Span::new(1, 2));
    }

    #[test]
    fn test_spanned_map_keeps_span() {
        let s = Spanned::new(21, Span::new(1, 3)).map(|n| n * 2);
        assert_eq!(s.node, 42);
        assert_eq!(s.span, Span::new(1, 3));
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId(17).to_string(), "#17");
    }
}
