//! Diagnostic collection.
//!
//! Errors are reported in place and compilation continues, to maximize the
//! diagnostic yield of a single run. Passes that depend on the soundness of an
//! earlier pass (flow analysis on type checking) consult the accumulated count
//! and short-circuit when it is non-zero. Nothing is printed here; rendering
//! is left to the embedding driver via the `Display` impls.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::Span;

/// The error taxonomy.
///
/// Each kind has a distinct code so downstream tooling can classify
/// diagnostics without parsing messages. The `No*`/`Bad*` syntactic recovery
/// kinds at the end belong to the upstream parser's domain; they are part of
/// the public taxonomy but never produced by the semantic passes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString, strum::IntoStaticStr,
)]
pub enum ErrorKind {
    /// Invalid assignment target.
    BadLval,
    /// Operation requires an lval (e.g. borrowing a temporary).
    NotLval,
    /// Type mismatch, invalid coercion or invalid method receiver.
    InvType,
    /// A type was expected but a value was found.
    NotTyped,
    /// Write attempted without write permission.
    NoMut,
    /// Borrow attempted at a permission the place does not grant.
    BadPerm,
    /// Use of a moved value, or a move where an alias is required.
    Move,
    /// Callee is not a function.
    NotFn,
    /// Method not defined by the receiver's type.
    NoMeth,
    /// Too many call arguments.
    ManyArgs,
    /// Too few call arguments and no defaults to fill them.
    FewArgs,
    /// Malformed array literal.
    BadArray,
    /// Malformed term or tuple decomposition.
    BadTerm,
    /// A return value is expected but the tail statement cannot give one.
    NoRet,
    /// Function body is missing where one is required.
    NoImpl,
    /// Function body appears where it is not allowed.
    BadImpl,
    /// Name is not defined in any visible scope.
    UnkName,
    /// Name is declared more than once in the same scope.
    DupName,

    // Syntactic recovery markers, reported by the upstream parser.
    NoSemi,
    NoRCurly,
    NoLCurly,
    NoName,
    BadTok,
    BadGloStmt,
    NoEof,

    /// Compiler invariant violation; aborts the compilation.
    Internal,
}

/// One reported problem, anchored to a source span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub span: Span,
    pub msg: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error[{}] at {}..{}: {}", self.kind, self.span.start, self.span.end, self.msg)
    }
}

/// Accumulates diagnostics for one compilation.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ErrorSink {
    diags: Vec<Diagnostic>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error against a source span.
    pub fn error(&mut self, span: Span, kind: ErrorKind, msg: impl Into<String>) {
        self.diags.push(Diagnostic { kind, span, msg: msg.into() });
    }

    /// Number of errors reported so far.
    pub fn count(&self) -> usize {
        self.diags.len()
    }

    pub fn has_errors(&self) -> bool {
        !self.diags.is_empty()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diags
    }

    /// True if any recorded diagnostic is an internal invariant violation.
    pub fn has_internal(&self) -> bool {
        self.diags.iter().any(|d| d.kind == ErrorKind::Internal)
    }
}

/// Terminal outcome of a failed compilation: every diagnostic, in report order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileFailure {
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for CompileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diag in &self.diagnostics {
            writeln!(f, "{diag}")?;
        }
        write!(f, "{} error(s)", self.diagnostics.len())
    }
}

impl std::error::Error for CompileFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_round_trip_through_strings() {
        let kind = ErrorKind::NoMut;
        assert_eq!(kind.to_string().parse::<ErrorKind>().unwrap(), kind);
    }

    #[test]
    fn sink_counts_in_order() {
        let mut sink = ErrorSink::new();
        assert!(!sink.has_errors());
        sink.error(Span::NONE, ErrorKind::InvType, "first");
        sink.error(Span::new(3, 7), ErrorKind::Move, "second");
        assert_eq!(sink.count(), 2);
        assert_eq!(sink.diagnostics()[0].msg, "first");
        assert_eq!(sink.diagnostics()[1].kind, ErrorKind::Move);
    }
}
