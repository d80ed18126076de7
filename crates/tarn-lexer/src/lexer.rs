//! Core Tarn lexer — converts source text to a token stream.
//!
//! Features:
//! - Keywords, identifiers, number/string/bool/nil literals, operators, punctuation
//! - String interpolation with `${expr}` via a mode stack
//! - Single-line comments stripped (`//`)
//! - Newline-separated statements (no semicolons)
//! - Fail-fast: the first malformed lexeme aborts with a located syntax error

use tarn_types::{Result, ScriptError, SourceFile, Span};

use crate::token::{Token, TokenKind};

/// Lexer mode — tracks whether we're scanning code or the inside of a
/// string that contains interpolations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Normal code scanning.
    Normal,
    /// Inside a string literal — scanning text until `"` or `${`.
    String,
    /// Inside a `${...}` interpolation. `brace_depth` counts nested `{`
    /// so we know which `}` closes the interpolation.
    Interpolation { brace_depth: u32 },
}

/// The Tarn lexer.
pub struct Lexer<'src> {
    /// The full source text as bytes.
    source: &'src [u8],
    /// Current byte offset into `source`.
    pos: usize,
    /// Current line number (1-based).
    line: u32,
    /// Current column number (1-based, counted in characters).
    col: u32,
    /// Mode stack for string interpolation.
    mode_stack: Vec<Mode>,
    /// Tokens to emit before the next scan (used for interpolation).
    pending: Vec<Token>,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source file.
    pub fn new(source_file: &'src SourceFile) -> Self {
        Self {
            source: source_file.source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
            mode_stack: vec![Mode::Normal],
            pending: Vec::new(),
        }
    }

    /// Lex the entire source into a token stream ending with [`TokenKind::Eof`].
    pub fn lex(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            // Drain pending tokens first (InterpolationStart after StringStart)
            if let Some(pending) = self.pending.pop() {
                tokens.push(pending);
                continue;
            }

            let token = match self.current_mode() {
                Mode::String => self.scan_string_continuation()?,
                Mode::Normal | Mode::Interpolation { .. } => self.scan_normal()?,
            };

            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);

            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    // ─────────────────────────────────────────────────────────────
    // Mode stack helpers
    // ─────────────────────────────────────────────────────────────

    fn current_mode(&self) -> Mode {
        *self.mode_stack.last().unwrap_or(&Mode::Normal)
    }

    fn push_mode(&mut self, mode: Mode) {
        self.mode_stack.push(mode);
    }

    fn pop_mode(&mut self) {
        if self.mode_stack.len() > 1 {
            self.mode_stack.pop();
        }
    }

    fn in_interpolation(&self) -> bool {
        self.mode_stack
            .iter()
            .any(|m| matches!(m, Mode::Interpolation { .. }))
    }

    // ─────────────────────────────────────────────────────────────
    // Character-level helpers
    // ─────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else if ch & 0xC0 != 0x80 {
            // UTF-8 continuation bytes do not start a new column
            self.col += 1;
        }
        Some(ch)
    }

    fn current_span(&self) -> Span {
        Span::new(self.line, self.col)
    }

    /// Build a token whose lexeme is the source text from `start` to here.
    fn token(&self, kind: TokenKind, start: usize, span: Span) -> Token {
        let lexeme = String::from_utf8_lossy(&self.source[start..self.pos]);
        Token::new(kind, lexeme, span)
    }

    // ─────────────────────────────────────────────────────────────
    // Whitespace & comments
    // ─────────────────────────────────────────────────────────────

    /// Skip spaces and tabs (NOT newlines — those are tokens).
    fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\t' | b'\r') = self.peek() {
            self.advance();
        }
    }

    /// Skip a single-line comment (`// ...`), leaving the newline.
    /// Returns `true` if a comment was consumed.
    fn skip_comment(&mut self) -> bool {
        if self.peek() == Some(b'/') && self.peek_at(1) == Some(b'/') {
            while let Some(ch) = self.peek() {
                if ch == b'\n' {
                    break;
                }
                self.advance();
            }
            true
        } else {
            false
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Normal-mode scanning
    // ─────────────────────────────────────────────────────────────

    /// Scan one token in normal (non-string) mode.
    fn scan_normal(&mut self) -> Result<Token> {
        loop {
            self.skip_whitespace();
            if !self.skip_comment() {
                break;
            }
        }

        let start = self.pos;
        let span = self.current_span();
        let Some(ch) = self.advance() else {
            if self.in_interpolation() {
                return Err(ScriptError::syntax(span, "unterminated string interpolation"));
            }
            return Ok(Token::new(TokenKind::Eof, "", span));
        };

        let kind = match ch {
            // ── Newline ──
            b'\n' => {
                if self.in_interpolation() {
                    return Err(ScriptError::syntax(span, "unterminated string interpolation"));
                }
                TokenKind::Newline
            }

            // ── String literal ──
            b'"' => return self.scan_string(start, span),

            // ── Number literal ──
            b'0'..=b'9' => return self.scan_number(start, span),

            // ── Identifiers & keywords ──
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => return Ok(self.scan_identifier(start, span)),

            // ── Operators ──
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'%' => TokenKind::Percent,

            b'=' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    TokenKind::EqEq
                } else {
                    TokenKind::Eq
                }
            }

            b'!' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    TokenKind::BangEq
                } else {
                    return Err(ScriptError::syntax(
                        span,
                        "unexpected character '!'; use 'not' for negation",
                    ));
                }
            }

            b'<' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    TokenKind::LessEq
                } else {
                    TokenKind::Less
                }
            }

            b'>' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    TokenKind::GreaterEq
                } else {
                    TokenKind::Greater
                }
            }

            // ── Punctuation ──
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b',' => TokenKind::Comma,

            b'{' => {
                if let Some(Mode::Interpolation { brace_depth }) = self.mode_stack.last_mut() {
                    *brace_depth += 1;
                }
                TokenKind::LBrace
            }

            b'}' => match self.mode_stack.last_mut() {
                Some(Mode::Interpolation { brace_depth: 0 }) => {
                    // This `}` ends the interpolation — back to string mode
                    self.pop_mode();
                    self.push_mode(Mode::String);
                    TokenKind::InterpolationEnd
                }
                Some(Mode::Interpolation { brace_depth }) => {
                    *brace_depth -= 1;
                    TokenKind::RBrace
                }
                _ => TokenKind::RBrace,
            },

            _ => {
                let shown = self.char_at(start);
                return Err(ScriptError::syntax(
                    span,
                    format!("unexpected character '{shown}'"),
                ));
            }
        };

        Ok(self.token(kind, start, span))
    }

    /// Decode the (possibly multi-byte) character starting at `start`,
    /// consuming its continuation bytes.
    fn char_at(&mut self, start: usize) -> char {
        while let Some(b) = self.peek() {
            if b & 0xC0 != 0x80 {
                break;
            }
            self.advance();
        }
        std::str::from_utf8(&self.source[start..self.pos])
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or(char::REPLACEMENT_CHARACTER)
    }

    // ─────────────────────────────────────────────────────────────
    // Number literals
    // ─────────────────────────────────────────────────────────────

    fn scan_number(&mut self, start: usize, span: Span) -> Result<Token> {
        // The first digit is already consumed
        while let Some(b'0'..=b'9') = self.peek() {
            self.advance();
        }

        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            self.advance(); // consume '.'
            while let Some(b'0'..=b'9') = self.peek() {
                self.advance();
            }
        }

        let text = String::from_utf8_lossy(&self.source[start..self.pos]).into_owned();
        let value: f64 = text
            .parse()
            .map_err(|_| ScriptError::syntax(span, format!("invalid number '{text}'")))?;

        Ok(Token::new(TokenKind::NumberLit(value), text, span))
    }

    // ─────────────────────────────────────────────────────────────
    // Identifiers & keywords
    // ─────────────────────────────────────────────────────────────

    fn scan_identifier(&mut self, start: usize, span: Span) -> Token {
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == b'_' {
                self.advance();
            } else {
                break;
            }
        }

        let text = String::from_utf8_lossy(&self.source[start..self.pos]).into_owned();
        let kind = TokenKind::from_keyword(&text)
            .unwrap_or_else(|| TokenKind::Identifier(text.clone()));

        Token::new(kind, text, span)
    }

    // ─────────────────────────────────────────────────────────────
    // String literals & interpolation
    // ─────────────────────────────────────────────────────────────

    /// Scan a string literal starting after the opening `"`.
    ///
    /// Produces a `StringLiteral` for plain strings, or a `StringStart`
    /// followed (via `pending`) by `InterpolationStart` when a `${` is found.
    fn scan_string(&mut self, start: usize, span: Span) -> Result<Token> {
        let (text, terminator) = self.scan_string_text(span)?;
        match terminator {
            Terminator::Quote => Ok(self.token(TokenKind::StringLiteral(text), start, span)),
            Terminator::Interpolation(interp_span) => {
                self.push_mode(Mode::Interpolation { brace_depth: 0 });
                self.pending
                    .push(Token::new(TokenKind::InterpolationStart, "${", interp_span));
                Ok(self.token(TokenKind::StringStart(text), start, span))
            }
        }
    }

    /// Continue scanning string content after an interpolation ends.
    fn scan_string_continuation(&mut self) -> Result<Token> {
        let start = self.pos;
        let span = self.current_span();
        let (text, terminator) = self.scan_string_text(span)?;
        // Leave string mode either way; a new interpolation pushes its own mode
        self.pop_mode();
        match terminator {
            Terminator::Quote => Ok(self.token(TokenKind::StringEnd(text), start, span)),
            Terminator::Interpolation(interp_span) => {
                self.push_mode(Mode::Interpolation { brace_depth: 0 });
                self.pending
                    .push(Token::new(TokenKind::InterpolationStart, "${", interp_span));
                Ok(self.token(TokenKind::StringPart(text), start, span))
            }
        }
    }

    /// Read string text up to a closing `"` or an opening `${`, consuming it.
    fn scan_string_text(&mut self, span: Span) -> Result<(String, Terminator)> {
        let mut buf: Vec<u8> = Vec::new();

        let terminator = loop {
            match self.peek() {
                None | Some(b'\n') => {
                    return Err(ScriptError::syntax(span, "unterminated string literal"));
                }
                Some(b'"') => {
                    self.advance();
                    break Terminator::Quote;
                }
                Some(b'\\') => buf.push(self.scan_escape_sequence()?),
                Some(b'$') if self.peek_at(1) == Some(b'{') => {
                    let interp_span = self.current_span();
                    self.advance(); // consume '$'
                    self.advance(); // consume '{'
                    break Terminator::Interpolation(interp_span);
                }
                Some(ch) => {
                    self.advance();
                    buf.push(ch);
                }
            }
        };

        // Only split at ASCII boundaries, so the bytes are still valid UTF-8
        let text = String::from_utf8(buf)
            .map_err(|_| ScriptError::syntax(span, "string literal is not valid UTF-8"))?;
        Ok((text, terminator))
    }

    /// Scan an escape sequence starting at the `\`.
    fn scan_escape_sequence(&mut self) -> Result<u8> {
        let span = self.current_span();
        self.advance(); // consume the '\'

        match self.advance() {
            Some(b'"') => Ok(b'"'),
            Some(b'\\') => Ok(b'\\'),
            Some(b'n') => Ok(b'\n'),
            Some(b't') => Ok(b'\t'),
            Some(b'r') => Ok(b'\r'),
            Some(b'$') => Ok(b'$'),
            Some(b'\n') | None => Err(ScriptError::syntax(span, "unterminated string literal")),
            Some(ch) => Err(ScriptError::syntax(
                span,
                format!("invalid escape sequence '\\{}'", ch as char),
            )),
        }
    }
}

/// How a run of string text ended.
enum Terminator {
    /// The closing `"`.
    Quote,
    /// An opening `${`, located at the `$`.
    Interpolation(Span),
}
