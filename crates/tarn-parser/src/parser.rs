//! Core parser infrastructure: token cursor, error construction, helpers.

use tarn_lexer::token::{Token, TokenKind};
use tarn_types::ast::{Ident, Program};
use tarn_types::{Result, ScriptError, Span};

/// Maximum combined nesting of expressions and blocks.
pub const MAX_NESTING_DEPTH: u32 = 64;

/// The Tarn parser.
///
/// Consumes a token stream produced by the lexer and builds an AST.
/// Stops at the first malformed construct.
pub struct Parser {
    /// The token stream.
    tokens: Vec<Token>,
    /// Current index into `tokens`.
    pos: usize,
    /// Current expression/block nesting depth.
    pub(crate) depth: u32,
    /// Number of enclosing function bodies (named or lambda).
    pub(crate) fn_depth: u32,
}

impl Parser {
    /// Create a new parser from a token stream ending in `Eof`.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            fn_depth: 0,
        }
    }

    // ── Token Cursor ──────────────────────────────────────────────────────────

    /// Returns the kind of the current token.
    pub(crate) fn peek_kind(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    /// Advance the cursor by one and return the consumed token's span.
    pub(crate) fn advance(&mut self) -> Span {
        let span = self.current_span();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        span
    }

    /// Returns the span of the current token.
    /// The current token as error messages show it: its quoted source
    /// text, or its kind when it has no visible text.
    pub(crate) fn found(&self) -> String {
        match self.tokens.get(self.pos).or_else(|| self.tokens.last()) {
            Some(token)
                if !token.lexeme.is_empty()
                    && !matches!(token.kind, TokenKind::Newline | TokenKind::Eof) =>
            {
                format!("'{}'", token.lexeme)
            }
            Some(token) => token.kind.to_string(),
            None => TokenKind::Eof.to_string(),
        }
    }

    pub(crate) fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.span)
            .unwrap_or_default()
    }

    /// Returns `true` if the current token is `Eof`.
    pub(crate) fn at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    /// Check if the current token matches the given kind exactly.
    pub(crate) fn check_exact(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// If the current token matches, advance and return `true`.
    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check_exact(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Look ahead by `n` tokens from current position.
    pub(crate) fn look_ahead(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    // ── Newline Handling ──────────────────────────────────────────────────────

    /// Skip all consecutive newline tokens.
    pub(crate) fn skip_newlines(&mut self) {
        while self.check_exact(&TokenKind::Newline) {
            self.advance();
        }
    }

    /// Expect the end of a statement: a newline, `}` or end of file.
    pub(crate) fn expect_newline_or_eof(&mut self) -> Result<()> {
        if self.at_end() || self.check_exact(&TokenKind::RBrace) {
            // The closing brace ends the block; it is consumed by the block
            return Ok(());
        }
        if self.check_exact(&TokenKind::Newline) {
            self.advance();
            self.skip_newlines();
            return Ok(());
        }
        Err(self.error_at_current(format!(
            "expected newline after statement, got {}",
            self.found()
        )))
    }

    // ── Expect Helpers ────────────────────────────────────────────────────────

    /// Expect a specific token kind and return its span.
    pub(crate) fn expect(&mut self, expected: &TokenKind) -> Result<Span> {
        if self.check_exact(expected) {
            Ok(self.advance())
        } else {
            Err(self.error_at_current(format!(
                "expected '{}', got {}",
                expected,
                self.found()
            )))
        }
    }

    /// Expect an identifier token.
    pub(crate) fn expect_identifier(&mut self) -> Result<Ident> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                let span = self.advance();
                Ok(Ident::new(name, span))
            }
            _ => Err(self.error_at_current(format!("expected identifier, got {}", self.found()))),
        }
    }

    // ── Nesting ───────────────────────────────────────────────────────────────

    /// Run `f` one nesting level deeper, failing past [`MAX_NESTING_DEPTH`].
    pub(crate) fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error_at_current(format!(
                "maximum expression nesting depth is {MAX_NESTING_DEPTH}"
            )));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    // ── Error Reporting ───────────────────────────────────────────────────────

    /// Build a syntax error at the current token position.
    pub(crate) fn error_at_current(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::syntax(self.current_span(), message)
    }

    // ── Public API ────────────────────────────────────────────────────────────

    /// Parse the token stream into a `Program` AST.
    pub fn parse(mut self) -> Result<Program> {
        self.skip_newlines();
        let mut stmts = Vec::new();
        while !self.at_end() {
            if self.check_exact(&TokenKind::RBrace) {
                return Err(self.error_at_current("unexpected '}' with no open block"));
            }
            stmts.push(self.parse_statement()?);
            self.skip_newlines();
        }
        Ok(Program { stmts })
    }
}
