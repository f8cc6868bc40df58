//! Error and warning reporting.
//!
//! No `thiserror`/`anyhow` here: a single hand-rolled enum with a manual
//! `Display` plus `std::error::Error` is all the pipeline needs, and it's
//! the same shape the compiler's own code generator uses for its errors.

use std::fmt;
use std::rc::Rc;

/// A location in a source file, `seq` is the 0-based byte offset used to
/// disambiguate two positions that map to the same line/column (e.g. after
/// a line splice has collapsed several physical lines into one logical one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePosition {
    pub file: Rc<str>,
    pub line: usize,
    pub column: usize,
    pub seq: usize,
}

impl SourcePosition {
    pub fn new(file: Rc<str>, line: usize, column: usize, seq: usize) -> Self {
        SourcePosition {
            file,
            line,
            column,
            seq,
        }
    }

    /// Placeholder position for diagnostics raised before any file is pushed
    /// (e.g. CLI argument errors) or for synthesized nodes.
    pub fn unknown() -> Self {
        SourcePosition {
            file: Rc::from("<unknown>"),
            line: 0,
            column: 0,
            seq: 0,
        }
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A fatal compilation error. Each variant corresponds to the pipeline stage
/// that raised it, which lets callers decide e.g. whether to keep lexing
/// after a parse error (we don't: one fatal error aborts the whole run).
#[derive(Debug, Clone)]
pub enum Diagnostic {
    Lex(SourcePosition, String),
    Parse(SourcePosition, String),
    Type(SourcePosition, String),
    Internal(String),
}

impl Diagnostic {
    pub fn lex(pos: SourcePosition, msg: impl Into<String>) -> Self {
        Diagnostic::Lex(pos, msg.into())
    }

    pub fn parse(pos: SourcePosition, msg: impl Into<String>) -> Self {
        Diagnostic::Parse(pos, msg.into())
    }

    pub fn ty(pos: SourcePosition, msg: impl Into<String>) -> Self {
        Diagnostic::Type(pos, msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Diagnostic::Internal(msg.into())
    }

    pub fn position(&self) -> Option<&SourcePosition> {
        match self {
            Diagnostic::Lex(p, _) | Diagnostic::Parse(p, _) | Diagnostic::Type(p, _) => Some(p),
            Diagnostic::Internal(_) => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Lex(pos, msg) => write!(f, "{pos}: error: {msg}"),
            Diagnostic::Parse(pos, msg) => write!(f, "{pos}: error: {msg}"),
            Diagnostic::Type(pos, msg) => write!(f, "{pos}: error: {msg}"),
            Diagnostic::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for Diagnostic {}

/// Lets codegen use `?` on `write!`/`writeln!` into its output buffer without
/// a separate error type, matching the teacher's `CodeGenError: From<std::fmt::Error>`.
impl From<std::fmt::Error> for Diagnostic {
    fn from(e: std::fmt::Error) -> Self {
        Diagnostic::Internal(format!("code generation write error: {e}"))
    }
}

/// A non-fatal diagnostic. Collected during compilation and surfaced to the
/// caller alongside the emitted assembly; under `-W` they're promoted to a
/// single fatal `Diagnostic::Internal` by the CLI driver, not by the library.
#[derive(Debug, Clone)]
pub struct Warning {
    pub pos: SourcePosition,
    pub message: String,
}

impl Warning {
    pub fn new(pos: SourcePosition, message: impl Into<String>) -> Self {
        Warning {
            pos,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: warning: {}", self.pos, self.message)
    }
}

pub type CResult<T> = Result<T, Diagnostic>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_display_includes_position() {
        let pos = SourcePosition::new(Rc::from("a.c"), 3, 5, 42);
        let d = Diagnostic::parse(pos, "unexpected token");
        assert_eq!(d.to_string(), "a.c:3:5: error: unexpected token");
    }

    #[test]
    fn internal_error_has_no_position() {
        let d = Diagnostic::internal("unreachable codegen state");
        assert!(d.position().is_none());
        assert_eq!(d.to_string(), "internal error: unreachable codegen state");
    }

    #[test]
    fn warning_display_format() {
        let pos = SourcePosition::new(Rc::from("a.c"), 1, 1, 0);
        let w = Warning::new(pos, "backslash-newline separated by space");
        assert_eq!(
            w.to_string(),
            "a.c:1:1: warning: backslash-newline separated by space"
        );
    }
}
