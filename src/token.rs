//! Token data model.
//!
//! `TokenKind` is a tagged enum rather than a kind-int plus shared-fields
//! struct, so every variant only carries the payload it actually needs.

use std::collections::HashSet;
use std::rc::Rc;

use crate::diagnostics::SourcePosition;

/// String/char literal encoding prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    None,
    Char16,
    Char32,
    WChar,
    Utf8,
}

/// Keywords and multi-character punctuators. Single-character punctuators
/// (`+`, `(`, `;`, ...) are carried as `Punct(char)` rather than one variant
/// apiece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Auto,
    Break,
    Case,
    Char,
    Const,
    Continue,
    Default,
    Do,
    Double,
    Else,
    Enum,
    Extern,
    Float,
    For,
    Goto,
    If,
    Inline,
    Int,
    Long,
    Register,
    Restrict,
    Return,
    Short,
    Signed,
    Sizeof,
    Static,
    Struct,
    Switch,
    Typedef,
    Union,
    Unsigned,
    Void,
    Volatile,
    While,
    Bool,
    Generic,
    Noreturn,
    StaticAssert,
    ThreadLocal,
    Alignas,
    Alignof,

    Punct(char),
    Inc,
    Dec,
    Arrow,
    Shl,
    Shr,
    Le,
    Ge,
    Eq,
    Ne,
    LogAnd,
    LogOr,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    ShlAssign,
    ShrAssign,
    Ellipsis,
    HashHash,
}

impl Keyword {
    pub fn from_ident(s: &str) -> Option<Keyword> {
        use Keyword::*;
        Some(match s {
            "auto" => Auto,
            "break" => Break,
            "case" => Case,
            "char" => Char,
            "const" => Const,
            "continue" => Continue,
            "default" => Default,
            "do" => Do,
            "double" => Double,
            "else" => Else,
            "enum" => Enum,
            "extern" => Extern,
            "float" => Float,
            "for" => For,
            "goto" => Goto,
            "if" => If,
            "inline" => Inline,
            "int" => Int,
            "long" => Long,
            "register" => Register,
            "restrict" => Restrict,
            "return" => Return,
            "short" => Short,
            "signed" => Signed,
            "sizeof" => Sizeof,
            "static" => Static,
            "struct" => Struct,
            "switch" => Switch,
            "typedef" => Typedef,
            "union" => Union,
            "unsigned" => Unsigned,
            "void" => Void,
            "volatile" => Volatile,
            "while" => While,
            "_Bool" => Bool,
            "_Generic" => Generic,
            "_Noreturn" => Noreturn,
            "_Static_assert" => StaticAssert,
            "_Thread_local" => ThreadLocal,
            "_Alignas" => Alignas,
            "_Alignof" => Alignof,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Keyword(Keyword),
    Number(String),
    Char { value: i64, encoding: Encoding },
    Str { value: String, encoding: Encoding },
    Newline,
    Space,
    /// Reserved for a macro-expansion front end; the preprocessor is out of
    /// scope, so this variant is never produced, only carried in the type.
    MacroParam(usize),
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: SourcePosition,
    /// True if this token is the first on its (logical) line.
    pub bol: bool,
    /// True if at least one whitespace byte preceded this token.
    pub space: bool,
    pub hideset: Rc<HashSet<String>>,
}

impl Token {
    pub fn new(kind: TokenKind, pos: SourcePosition, bol: bool, space: bool) -> Self {
        Token {
            kind,
            pos,
            bol,
            space,
            hideset: Rc::new(HashSet::new()),
        }
    }

    pub fn is_keyword(&self, kw: Keyword) -> bool {
        matches!(&self.kind, TokenKind::Keyword(k) if *k == kw)
    }

    pub fn is_punct(&self, c: char) -> bool {
        matches!(&self.kind, TokenKind::Keyword(Keyword::Punct(p)) if *p == c)
    }

    pub fn is_ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    /// Short human-readable description used in diagnostics.
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Ident(s) => format!("identifier '{s}'"),
            TokenKind::Keyword(Keyword::Punct(c)) => format!("'{c}'"),
            TokenKind::Keyword(k) => format!("{k:?}"),
            TokenKind::Number(s) => format!("number '{s}'"),
            TokenKind::Char { .. } => "character constant".to_string(),
            TokenKind::Str { value, .. } => format!("string \"{value}\""),
            TokenKind::Newline => "newline".to_string(),
            TokenKind::Space => "whitespace".to_string(),
            TokenKind::MacroParam(_) => "macro parameter".to_string(),
            TokenKind::Eof => "end of file".to_string(),
        }
    }
}
