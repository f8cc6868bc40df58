//! Tokenizer. Ported concept-for-concept from `original_source/lex.c`:
//! the escape-sequence table, digraph handling, and `skip_cond_incl`'s
//! literal-aware `#if` skip all follow that file's logic, re-expressed as
//! methods on a `Lexer` struct instead of a pile of `static` C functions.

use crate::diagnostics::{CResult, Diagnostic, SourcePosition};
use crate::file::FileStack;
use crate::token::{Encoding, Keyword, Token, TokenKind};

/// A universal character name is invalid if it names a UTF-16 surrogate, or
/// a C0-control/low-ASCII code point other than the three basic-character-set
/// punctuators C11 explicitly allows to be spelled this way.
fn is_valid_ucn(v: i64) -> bool {
    if (0xD800..=0xDFFF).contains(&v) {
        return false;
    }
    if v < 0xA0 && v != 0x24 && v != 0x40 && v != 0x60 {
        return false;
    }
    true
}

pub struct Lexer {
    files: FileStack,
    /// Unlimited lookahead pushback for raw bytes, used for multi-character
    /// punctuators and literal-prefix disambiguation (`L`, `u`, `u8`, `U`).
    byte_buf: Vec<u8>,
    /// Token-level pushback; `unget_token` pushes, `next_token` pops.
    buffer: Vec<Token>,
    /// A secondary token buffer a future preprocessor front end could swap
    /// in via `set_input_buffer` to sub-lex a macro replacement list. Never
    /// populated by this crate today, but kept live so the lexer's contract
    /// doesn't change shape if one is added.
    altbuffer: Option<Vec<Token>>,
    at_bol: bool,
}

impl Lexer {
    pub fn new(files: FileStack) -> Self {
        Lexer {
            files,
            byte_buf: Vec::new(),
            buffer: Vec::new(),
            altbuffer: None,
            at_bol: true,
        }
    }

    pub fn set_input_buffer(&mut self, tokens: Vec<Token>) -> Option<Vec<Token>> {
        self.altbuffer.replace(tokens)
    }

    pub fn get_input_buffer(&mut self) -> Option<Vec<Token>> {
        self.altbuffer.take()
    }

    pub fn unget_token(&mut self, t: Token) {
        if let Some(alt) = self.altbuffer.as_mut() {
            alt.push(t);
        } else {
            self.buffer.push(t);
        }
    }

    pub fn next_token(&mut self) -> CResult<Token> {
        if let Some(alt) = self.altbuffer.as_mut() {
            if let Some(t) = alt.pop() {
                return Ok(t);
            }
            return self.do_read_token();
        }
        if let Some(t) = self.buffer.pop() {
            return Ok(t);
        }
        self.do_read_token()
    }

    /// Fast-skips the body of a false `#if`/`#ifdef`/`#ifndef` branch,
    /// stopping before the matching `#else`/`#elif`/`#endif` at depth 0 so
    /// the caller can re-dispatch on it. String/char literals are skipped
    /// whole so a stray `#` inside one is never mistaken for a directive.
    pub fn skip_cond_incl(&mut self) -> CResult<()> {
        let mut depth = 0i32;
        loop {
            let t = self.next_token()?;
            if t.is_eof() {
                return Ok(());
            }
            if !(t.bol && t.is_punct('#')) {
                continue;
            }
            let dir = self.next_token()?;
            let name = match dir.is_ident() {
                Some(n) => n.to_string(),
                None => continue,
            };
            match name.as_str() {
                "if" | "ifdef" | "ifndef" => depth += 1,
                "endif" => {
                    if depth == 0 {
                        self.unget_token(dir);
                        let hash = Token::new(
                            TokenKind::Keyword(Keyword::Punct('#')),
                            t.pos,
                            true,
                            t.space,
                        );
                        self.unget_token(hash);
                        return Ok(());
                    }
                    depth -= 1;
                }
                "else" | "elif" if depth == 0 => {
                    self.unget_token(dir);
                    let hash =
                        Token::new(TokenKind::Keyword(Keyword::Punct('#')), t.pos, true, t.space);
                    self.unget_token(hash);
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    // ---- byte-level plumbing -------------------------------------------------

    fn get(&mut self) -> Option<u8> {
        if let Some(c) = self.byte_buf.pop() {
            return Some(c);
        }
        self.files.readc()
    }

    fn unget_byte(&mut self, c: u8) {
        self.byte_buf.push(c);
    }

    fn peek_byte(&mut self) -> Option<u8> {
        let c = self.get();
        if let Some(c) = c {
            self.unget_byte(c);
        }
        c
    }

    fn pos(&self) -> SourcePosition {
        self.files.position()
    }

    /// Drains line-splice and other file-stack-level warnings accumulated
    /// since the last drain, for the parser to fold into its own warning list.
    pub fn drain_warnings(&mut self) -> Vec<crate::diagnostics::Warning> {
        self.files.drain_warnings()
    }

    fn skip_space_and_comments(&mut self) -> CResult<bool> {
        let mut skipped = false;
        loop {
            match self.get() {
                None => return Ok(skipped),
                Some(b' ') | Some(b'\t') | Some(0x0c) | Some(0x0b) | Some(b'\r') => {
                    skipped = true;
                }
                Some(b'\n') => {
                    skipped = true;
                    self.at_bol = true;
                }
                Some(b'/') => match self.get() {
                    Some(b'/') => {
                        while let Some(c) = self.get() {
                            if c == b'\n' {
                                self.unget_byte(c);
                                break;
                            }
                        }
                        skipped = true;
                    }
                    Some(b'*') => {
                        let start = self.pos();
                        loop {
                            match self.get() {
                                None => {
                                    return Err(Diagnostic::lex(start, "unterminated comment"))
                                }
                                Some(b'*') => {
                                    if self.get() == Some(b'/') {
                                        break;
                                    }
                                }
                                _ => {}
                            }
                        }
                        skipped = true;
                    }
                    Some(c) => {
                        self.unget_byte(c);
                        self.unget_byte(b'/');
                        return Ok(skipped);
                    }
                    None => {
                        self.unget_byte(b'/');
                        return Ok(skipped);
                    }
                },
                Some(c) => {
                    self.unget_byte(c);
                    return Ok(skipped);
                }
            }
        }
    }

    // ---- literal payload readers ---------------------------------------------

    fn read_universal_char(&mut self, len: usize) -> CResult<i64> {
        let start = self.pos();
        let mut v: i64 = 0;
        for _ in 0..len {
            let d = self
                .get()
                .ok_or_else(|| Diagnostic::lex(start.clone(), "incomplete universal character name"))?;
            match (d as char).to_digit(16) {
                Some(digit) => v = v * 16 + digit as i64,
                None => return Err(Diagnostic::lex(start, "invalid universal character name")),
            }
        }
        if !is_valid_ucn(v) {
            return Err(Diagnostic::lex(start, "invalid universal character name"));
        }
        Ok(v)
    }

    fn read_escaped_char(&mut self) -> CResult<i64> {
        let start = self.pos();
        let c = self
            .get()
            .ok_or_else(|| Diagnostic::lex(start.clone(), "unterminated escape sequence"))?;
        Ok(match c {
            b'\'' => '\'' as i64,
            b'"' => '"' as i64,
            b'?' => '?' as i64,
            b'\\' => '\\' as i64,
            b'a' => 7,
            b'b' => 8,
            b'f' => 12,
            b'n' => 10,
            b'r' => 13,
            b't' => 9,
            b'v' => 11,
            b'e' => 27,
            b'0'..=b'7' => {
                let mut v = (c - b'0') as i64;
                for _ in 0..2 {
                    match self.peek_byte() {
                        Some(d) if (b'0'..=b'7').contains(&d) => {
                            self.get();
                            v = v * 8 + (d - b'0') as i64;
                        }
                        _ => break,
                    }
                }
                v
            }
            b'x' => {
                let mut v: i64 = 0;
                let mut any = false;
                while let Some(d) = self.peek_byte() {
                    if d.is_ascii_hexdigit() {
                        self.get();
                        v = v * 16 + (d as char).to_digit(16).unwrap() as i64;
                        any = true;
                    } else {
                        break;
                    }
                }
                if !any {
                    return Err(Diagnostic::lex(start, "\\x used with no following hex digits"));
                }
                v
            }
            b'u' => self.read_universal_char(4)?,
            b'U' => self.read_universal_char(8)?,
            other => other as i64,
        })
    }

    fn read_char(&mut self, encoding: Encoding) -> CResult<TokenKind> {
        let start = self.pos();
        let c = self
            .get()
            .ok_or_else(|| Diagnostic::lex(start.clone(), "unterminated character constant"))?;
        let value = if c == b'\\' {
            self.read_escaped_char()?
        } else {
            c as i64
        };
        match self.get() {
            Some(b'\'') => {}
            _ => return Err(Diagnostic::lex(start, "unterminated character constant")),
        }
        Ok(TokenKind::Char { value, encoding })
    }

    fn read_string(&mut self, encoding: Encoding) -> CResult<TokenKind> {
        let start = self.pos();
        let mut s = String::new();
        loop {
            match self.get() {
                None => return Err(Diagnostic::lex(start, "unterminated string literal")),
                Some(b'"') => break,
                Some(b'\n') => return Err(Diagnostic::lex(start, "unterminated string literal")),
                Some(b'\\') => {
                    let v = self.read_escaped_char()?;
                    if let Some(ch) = char::from_u32(v as u32) {
                        s.push(ch);
                    }
                }
                Some(c) => s.push(c as char),
            }
        }
        Ok(TokenKind::Str { value: s, encoding })
    }

    fn read_number(&mut self, first: u8) -> CResult<String> {
        let mut s = String::new();
        s.push(first as char);
        loop {
            let c = match self.peek_byte() {
                Some(c) => c,
                None => break,
            };
            let last = s.as_bytes().last().copied().unwrap_or(0);
            let is_exp_sign = matches!(c, b'+' | b'-')
                && matches!(last, b'e' | b'E' | b'p' | b'P');
            if is_exp_sign || c.is_ascii_alphanumeric() || c == b'.' {
                self.get();
                s.push(c as char);
            } else {
                break;
            }
        }
        Ok(s)
    }

    fn read_ident(&mut self, first: u8) -> CResult<String> {
        let mut s = String::new();
        s.push(first as char);
        loop {
            match self.peek_byte() {
                Some(c) if c.is_ascii_alphanumeric() || c == b'_' || c == b'$' => {
                    self.get();
                    s.push(c as char);
                }
                Some(b'\\') => {
                    self.get();
                    match self.peek_byte() {
                        Some(b'u') => {
                            self.get();
                            let v = self.read_universal_char(4)?;
                            if let Some(ch) = char::from_u32(v as u32) {
                                s.push(ch);
                            }
                        }
                        Some(b'U') => {
                            self.get();
                            let v = self.read_universal_char(8)?;
                            if let Some(ch) = char::from_u32(v as u32) {
                                s.push(ch);
                            }
                        }
                        _ => {
                            self.unget_byte(b'\\');
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(s)
    }

    /// Disambiguates `L`/`u`/`U`/`u8` identifiers from the matching string
    /// and character literal prefixes. Returns `None` (having restored every
    /// byte it peeked) when the bytes in question are just an identifier.
    fn try_prefixed_literal(&mut self, c1: u8) -> CResult<Option<TokenKind>> {
        if c1 == b'L' || c1 == b'U' {
            if let Some(q) = self.get() {
                if q == b'\'' {
                    let enc = if c1 == b'L' { Encoding::WChar } else { Encoding::Char32 };
                    return Ok(Some(self.read_char(enc)?));
                }
                if q == b'"' {
                    let enc = if c1 == b'L' { Encoding::WChar } else { Encoding::Char32 };
                    return Ok(Some(self.read_string(enc)?));
                }
                self.unget_byte(q);
            }
            return Ok(None);
        }
        if c1 == b'u' {
            if let Some(q) = self.get() {
                if q == b'\'' {
                    return Ok(Some(self.read_char(Encoding::Char16)?));
                }
                if q == b'"' {
                    return Ok(Some(self.read_string(Encoding::Char16)?));
                }
                if q == b'8' {
                    if let Some(q2) = self.get() {
                        if q2 == b'"' {
                            return Ok(Some(self.read_string(Encoding::Utf8)?));
                        }
                        self.unget_byte(q2);
                    }
                    self.unget_byte(q);
                    return Ok(None);
                }
                self.unget_byte(q);
            }
            return Ok(None);
        }
        Ok(None)
    }

    fn read_punct(&mut self, c: u8) -> CResult<TokenKind> {
        use Keyword::*;
        let kw = match c {
            b'+' => match self.peek_byte() {
                Some(b'+') => {
                    self.get();
                    Inc
                }
                Some(b'=') => {
                    self.get();
                    AddAssign
                }
                _ => Punct('+'),
            },
            b'-' => match self.peek_byte() {
                Some(b'-') => {
                    self.get();
                    Dec
                }
                Some(b'=') => {
                    self.get();
                    SubAssign
                }
                Some(b'>') => {
                    self.get();
                    Arrow
                }
                _ => Punct('-'),
            },
            b'*' => {
                if self.peek_byte() == Some(b'=') {
                    self.get();
                    MulAssign
                } else {
                    Punct('*')
                }
            }
            b'/' => {
                if self.peek_byte() == Some(b'=') {
                    self.get();
                    DivAssign
                } else {
                    Punct('/')
                }
            }
            b'%' => match self.peek_byte() {
                Some(b'=') => {
                    self.get();
                    ModAssign
                }
                Some(b'>') => {
                    self.get();
                    Punct('}')
                }
                Some(b':') => {
                    self.get();
                    if self.peek_byte() == Some(b'%') {
                        self.get();
                        if self.peek_byte() == Some(b':') {
                            self.get();
                            HashHash
                        } else {
                            self.unget_byte(b'%');
                            Punct('#')
                        }
                    } else {
                        Punct('#')
                    }
                }
                _ => Punct('%'),
            },
            b'=' => {
                if self.peek_byte() == Some(b'=') {
                    self.get();
                    Eq
                } else {
                    Punct('=')
                }
            }
            b'!' => {
                if self.peek_byte() == Some(b'=') {
                    self.get();
                    Ne
                } else {
                    Punct('!')
                }
            }
            b'<' => match self.peek_byte() {
                Some(b'<') => {
                    self.get();
                    if self.peek_byte() == Some(b'=') {
                        self.get();
                        ShlAssign
                    } else {
                        Shl
                    }
                }
                Some(b'=') => {
                    self.get();
                    Le
                }
                Some(b':') => {
                    self.get();
                    Punct('[')
                }
                Some(b'%') => {
                    self.get();
                    Punct('{')
                }
                _ => Punct('<'),
            },
            b'>' => match self.peek_byte() {
                Some(b'>') => {
                    self.get();
                    if self.peek_byte() == Some(b'=') {
                        self.get();
                        ShrAssign
                    } else {
                        Shr
                    }
                }
                Some(b'=') => {
                    self.get();
                    Ge
                }
                _ => Punct('>'),
            },
            b'&' => match self.peek_byte() {
                Some(b'&') => {
                    self.get();
                    LogAnd
                }
                Some(b'=') => {
                    self.get();
                    AndAssign
                }
                _ => Punct('&'),
            },
            b'|' => match self.peek_byte() {
                Some(b'|') => {
                    self.get();
                    LogOr
                }
                Some(b'=') => {
                    self.get();
                    OrAssign
                }
                _ => Punct('|'),
            },
            b'^' => {
                if self.peek_byte() == Some(b'=') {
                    self.get();
                    XorAssign
                } else {
                    Punct('^')
                }
            }
            b'#' => {
                if self.peek_byte() == Some(b'#') {
                    self.get();
                    HashHash
                } else {
                    Punct('#')
                }
            }
            b'.' => {
                if self.peek_byte() == Some(b'.') {
                    self.get();
                    if self.peek_byte() == Some(b'.') {
                        self.get();
                        Ellipsis
                    } else {
                        self.unget_byte(b'.');
                        Punct('.')
                    }
                } else {
                    Punct('.')
                }
            }
            b':' => {
                if self.peek_byte() == Some(b'>') {
                    self.get();
                    Punct(']')
                } else {
                    Punct(':')
                }
            }
            b'(' | b')' | b'{' | b'}' | b'[' | b']' | b',' | b';' | b'?' | b'~' => {
                Punct(c as char)
            }
            other => {
                return Err(Diagnostic::lex(
                    self.pos(),
                    format!("stray byte 0x{other:02x} in program"),
                ))
            }
        };
        Ok(TokenKind::Keyword(kw))
    }

    fn do_read_token(&mut self) -> CResult<Token> {
        let space = self.skip_space_and_comments()?;
        let bol = self.at_bol;
        self.at_bol = false;
        let pos = self.pos();

        let c = match self.get() {
            None => return Ok(Token::new(TokenKind::Eof, pos, bol, space)),
            Some(c) => c,
        };

        if c == b'L' || c == b'u' || c == b'U' {
            if let Some(kind) = self.try_prefixed_literal(c)? {
                return Ok(Token::new(kind, pos, bol, space));
            }
            // try_prefixed_literal restored every byte it peeked past `c`
            // itself, so fall through to generic identifier scanning.
        }

        if c.is_ascii_digit() || (c == b'.' && matches!(self.peek_byte(), Some(d) if d.is_ascii_digit()))
        {
            let text = self.read_number(c)?;
            return Ok(Token::new(TokenKind::Number(text), pos, bol, space));
        }
        if c.is_ascii_alphabetic() || c == b'_' || c == b'$' {
            let ident = self.read_ident(c)?;
            let kind = match Keyword::from_ident(&ident) {
                Some(k) => TokenKind::Keyword(k),
                None => TokenKind::Ident(ident),
            };
            return Ok(Token::new(kind, pos, bol, space));
        }
        if c == b'\'' {
            return Ok(Token::new(self.read_char(Encoding::None)?, pos, bol, space));
        }
        if c == b'"' {
            return Ok(Token::new(self.read_string(Encoding::None)?, pos, bol, space));
        }
        Ok(Token::new(self.read_punct(c)?, pos, bol, space))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexer_for(src: &str) -> Lexer {
        let mut files = FileStack::new();
        files.push_string(src, "t.c");
        Lexer::new(files)
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut lx = lexer_for(src);
        let mut out = Vec::new();
        loop {
            let t = lx.next_token().unwrap();
            if t.is_eof() {
                break;
            }
            out.push(t.kind);
        }
        out
    }

    #[test]
    fn lexes_keyword_and_ident_and_number() {
        let ks = kinds("int x = 42;");
        assert_eq!(
            ks,
            vec![
                TokenKind::Keyword(Keyword::Int),
                TokenKind::Ident("x".to_string()),
                TokenKind::Keyword(Keyword::Punct('=')),
                TokenKind::Number("42".to_string()),
                TokenKind::Keyword(Keyword::Punct(';')),
            ]
        );
    }

    #[test]
    fn multichar_operators_are_maximal_munch() {
        let ks = kinds("a <<= b >> c");
        assert_eq!(
            ks,
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::Keyword(Keyword::ShlAssign),
                TokenKind::Ident("b".to_string()),
                TokenKind::Keyword(Keyword::Shr),
                TokenKind::Ident("c".to_string()),
            ]
        );
    }

    #[test]
    fn line_comment_and_block_comment_are_skipped() {
        let ks = kinds("a // comment\n/* block\nspans lines */ b");
        assert_eq!(
            ks,
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::Ident("b".to_string()),
            ]
        );
    }

    #[test]
    fn unterminated_block_comment_is_an_error() {
        let mut lx = lexer_for("/* never closes");
        assert!(lx.next_token().is_err());
    }

    #[test]
    fn char_literal_with_octal_escape() {
        let ks = kinds("'\\101'");
        assert_eq!(ks, vec![TokenKind::Char { value: 65, encoding: Encoding::None }]);
    }

    #[test]
    fn string_literal_with_escapes() {
        let ks = kinds("\"a\\nb\"");
        assert_eq!(
            ks,
            vec![TokenKind::Str {
                value: "a\nb".to_string(),
                encoding: Encoding::None
            }]
        );
    }

    #[test]
    fn wide_string_prefix_is_recognized() {
        let ks = kinds("L\"hi\"");
        assert_eq!(
            ks,
            vec![TokenKind::Str {
                value: "hi".to_string(),
                encoding: Encoding::WChar
            }]
        );
    }

    #[test]
    fn identifier_starting_with_l_is_not_mistaken_for_prefix() {
        let ks = kinds("Local");
        assert_eq!(ks, vec![TokenKind::Ident("Local".to_string())]);
    }

    #[test]
    fn u8_string_prefix() {
        let ks = kinds("u8\"x\"");
        assert_eq!(
            ks,
            vec![TokenKind::Str {
                value: "x".to_string(),
                encoding: Encoding::Utf8
            }]
        );
    }

    #[test]
    fn digraphs_map_to_canonical_punctuators() {
        let ks = kinds("<: :>");
        assert_eq!(
            ks,
            vec![
                TokenKind::Keyword(Keyword::Punct('[')),
                TokenKind::Keyword(Keyword::Punct(']')),
            ]
        );
    }

    #[test]
    fn unget_token_is_replayed_before_reading_more() {
        let mut lx = lexer_for("a b");
        let ta = lx.next_token().unwrap();
        let tb = lx.next_token().unwrap();
        lx.unget_token(tb);
        lx.unget_token(ta);
        let first = lx.next_token().unwrap();
        assert_eq!(first.kind, TokenKind::Ident("a".to_string()));
    }

    #[test]
    fn input_buffer_swap_is_consumed_before_character_source() {
        let mut lx = lexer_for("from_source");
        let synthetic = vec![Token::new(
            TokenKind::Ident("from_buffer".to_string()),
            SourcePosition::unknown(),
            true,
            false,
        )];
        let prev = lx.set_input_buffer(synthetic);
        assert!(prev.is_none());
        let t = lx.next_token().unwrap();
        assert_eq!(t.kind, TokenKind::Ident("from_buffer".to_string()));
        assert!(lx.get_input_buffer().unwrap().is_empty());
        let t2 = lx.next_token().unwrap();
        assert_eq!(t2.kind, TokenKind::Ident("from_source".to_string()));
    }

    #[test]
    fn bol_is_true_only_for_first_token_on_a_line() {
        let mut lx = lexer_for("a b\nc");
        let a = lx.next_token().unwrap();
        let b = lx.next_token().unwrap();
        let c = lx.next_token().unwrap();
        assert!(a.bol);
        assert!(!b.bol);
        assert!(c.bol);
    }

    #[test]
    fn skip_cond_incl_stops_before_matching_endif() {
        let mut lx = lexer_for("junk tokens here\n#endif\nafter");
        lx.skip_cond_incl().unwrap();
        let t = lx.next_token().unwrap();
        assert!(t.is_punct('#'));
        let dir = lx.next_token().unwrap();
        assert_eq!(dir.is_ident(), Some("endif"));
    }
}
