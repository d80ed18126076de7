//! Statement parsing.

use std::rc::Rc;

use crate::parser::Parser;
use tarn_lexer::token::TokenKind;
use tarn_types::ast::*;
use tarn_types::{Result, ScriptError};

impl Parser {
    /// Parse a block of statements: `{ stmts... }`
    ///
    /// A block still open at end of file is reported at its opening brace.
    pub(crate) fn parse_block(&mut self) -> Result<Block> {
        let span = self.expect(&TokenKind::LBrace)?;
        self.nested(|p| {
            p.skip_newlines();
            let mut stmts = Vec::new();
            while !p.check_exact(&TokenKind::RBrace) {
                if p.at_end() {
                    return Err(ScriptError::syntax(span, "unclosed block: expected '}'"));
                }
                stmts.push(p.parse_statement()?);
                p.skip_newlines();
            }
            p.advance(); // eat `}`
            Ok(Block { stmts, span })
        })
    }

    /// Parse a single statement.
    pub(crate) fn parse_statement(&mut self) -> Result<Stmt> {
        match self.peek_kind() {
            TokenKind::Let => self.parse_let_binding(),
            TokenKind::Set => self.parse_set_stmt(),
            TokenKind::LBrace => {
                let block = self.parse_block()?;
                self.expect_newline_or_eof()?;
                Ok(Stmt::Block(block))
            }
            TokenKind::If => {
                let stmt = self.parse_if_stmt()?;
                self.expect_newline_or_eof()?;
                Ok(Stmt::If(stmt))
            }
            TokenKind::While => self.parse_while_stmt(),
            TokenKind::For => self.parse_for_stmt(),
            // `fn name(...)` declares; `fn(...)` starts a lambda expression
            TokenKind::Fn if matches!(self.look_ahead(1), TokenKind::Identifier(_)) => {
                self.parse_fn_decl()
            }
            TokenKind::Return => self.parse_return_stmt(),
            _ => {
                let expr = self.parse_expression()?;
                let span = expr.span;
                self.expect_newline_or_eof()?;
                Ok(Stmt::Expr(ExprStmt { expr, span }))
            }
        }
    }

    /// `let name = value`
    fn parse_let_binding(&mut self) -> Result<Stmt> {
        let span = self.advance(); // eat `let`
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Eq)?;
        let value = self.parse_expression()?;
        self.expect_newline_or_eof()?;
        Ok(Stmt::Let(LetBinding { name, value, span }))
    }

    /// `set name = value`
    fn parse_set_stmt(&mut self) -> Result<Stmt> {
        let span = self.advance(); // eat `set`
        let target = self.expect_identifier()?;
        self.expect(&TokenKind::Eq)?;
        let value = self.parse_expression()?;
        self.expect_newline_or_eof()?;
        Ok(Stmt::Set(SetStmt {
            target,
            value,
            span,
        }))
    }

    /// Parse `if cond { ... } [else { ... } | else if ...]`
    ///
    /// `else` may start the line following the closing brace.
    fn parse_if_stmt(&mut self) -> Result<IfStmt> {
        let span = self.advance(); // eat `if`
        let condition = self.parse_expression()?;
        let then_block = self.parse_block()?;

        let mut offset = 0;
        while *self.look_ahead(offset) == TokenKind::Newline {
            offset += 1;
        }
        let else_branch = if *self.look_ahead(offset) == TokenKind::Else {
            self.skip_newlines();
            self.advance(); // eat `else`
            if self.check_exact(&TokenKind::If) {
                let else_if = self.nested(|p| p.parse_if_stmt())?;
                Some(ElseBranch::ElseIf(Box::new(else_if)))
            } else {
                Some(ElseBranch::Block(self.parse_block()?))
            }
        } else {
            None
        };

        Ok(IfStmt {
            condition,
            then_block,
            else_branch,
            span,
        })
    }

    /// `while cond { ... }`
    fn parse_while_stmt(&mut self) -> Result<Stmt> {
        let span = self.advance(); // eat `while`
        let condition = self.parse_expression()?;
        let body = self.parse_block()?;
        self.expect_newline_or_eof()?;
        Ok(Stmt::While(WhileStmt {
            condition,
            body,
            span,
        }))
    }

    /// `for item in iterable { ... }`
    fn parse_for_stmt(&mut self) -> Result<Stmt> {
        let span = self.advance(); // eat `for`
        let item = self.expect_identifier()?;
        self.expect(&TokenKind::In)?;
        let iterable = self.parse_expression()?;
        let body = self.parse_block()?;
        self.expect_newline_or_eof()?;
        Ok(Stmt::For(ForStmt {
            item,
            iterable,
            body,
            span,
        }))
    }

    /// `fn name(params) { body }`
    fn parse_fn_decl(&mut self) -> Result<Stmt> {
        let span = self.advance(); // eat `fn`
        let name = self.expect_identifier()?;
        let (params, body) = self.parse_function_rest()?;
        self.expect_newline_or_eof()?;
        Ok(Stmt::Function(FnDecl {
            name,
            params,
            body,
            span,
        }))
    }

    /// Parse `(params) { body }`, shared by declarations and lambdas.
    pub(crate) fn parse_function_rest(&mut self) -> Result<(Vec<Ident>, Rc<Block>)> {
        self.expect(&TokenKind::LParen)?;
        let mut params: Vec<Ident> = Vec::new();
        if !self.check_exact(&TokenKind::RParen) {
            loop {
                let param = self.expect_identifier()?;
                if params.iter().any(|p| p.name == param.name) {
                    return Err(ScriptError::syntax(
                        param.span,
                        format!("duplicate parameter '{}'", param.name),
                    ));
                }
                params.push(param);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;

        if !self.check_exact(&TokenKind::LBrace) {
            return Err(self.error_at_current(format!(
                "expected '{{' before function body, got {}",
                self.found()
            )));
        }

        self.fn_depth += 1;
        let body = self.parse_block();
        self.fn_depth -= 1;
        Ok((params, Rc::new(body?)))
    }

    /// `return` or `return expr`
    fn parse_return_stmt(&mut self) -> Result<Stmt> {
        let span = self.current_span();
        if self.fn_depth == 0 {
            return Err(self.error_at_current("'return' outside of a function"));
        }
        self.advance(); // eat `return`
        let value = match self.peek_kind() {
            TokenKind::Newline | TokenKind::RBrace | TokenKind::Eof => None,
            _ => Some(self.parse_expression()?),
        };
        self.expect_newline_or_eof()?;
        Ok(Stmt::Return(ReturnStmt { value, span }))
    }
}
