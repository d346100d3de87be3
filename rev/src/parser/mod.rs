//! Recursive-descent parser
//!
//! Statements end at a newline or `;`. Inside parentheses newlines are
//! insignificant, so argument lists and grouped expressions may span lines.

use crate::ast::*;
use crate::error::{CompileError, Result};
use crate::lexer::Token;
use std::rc::Rc;

#[cfg(test)]
mod tests;

/// Parse a token stream into a program, numbering expression nodes from zero
pub fn parse(source: &str, tokens: Vec<(Token, Span)>) -> Result<Program> {
    Parser::new(source, &tokens).parse_program()
}

pub struct Parser<'a> {
    tokens: &'a [(Token, Span)],
    pos: usize,
    /// Parenthesis depth; newlines are skipped while positive
    nesting: usize,
    next_id: u32,
    eof_span: Span,
}

impl<'a> Parser<'a> {
    pub fn new(source: &str, tokens: &'a [(Token, Span)]) -> Self {
        Parser {
            tokens,
            pos: 0,
            nesting: 0,
            next_id: 0,
            eof_span: Span::new(source.len(), source.len()),
        }
    }

    /// Start node numbering at `first` (REPL inputs share one id space)
    pub fn with_first_id(mut self, first: u32) -> Self {
        self.next_id = first;
        self
    }

    /// Next unused node id
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// Parse every top-level statement. A statement that fails to parse is
    /// skipped so later ones are still checked; all failures are returned.
    pub fn parse_program(&mut self) -> Result<Program> {
        let mut stmts = Vec::new();
        let mut errors = Vec::new();
        self.skip_separators();
        while !self.at_eof() {
            let start = self.pos;
            match self.parse_top_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(err) => {
                    errors.push(err);
                    self.synchronize(start);
                }
            }
            self.skip_separators();
        }
        match errors.len() {
            0 => Ok(Program { stmts }),
            1 => Err(errors.remove(0)),
            _ => Err(CompileError::Multiple(errors)),
        }
    }

    fn parse_top_stmt(&mut self) -> Result<Spanned<Stmt>> {
        let stmt = self.parse_stmt()?;
        self.expect_terminator()?;
        Ok(stmt)
    }

    /// Resume after a failed statement: skip from `start` past the first
    /// separator that is not inside brackets opened since `start`
    fn synchronize(&mut self, start: usize) {
        self.nesting = 0;
        let mut depth: isize = 0;
        let mut i = start;
        while let Some((tok, _)) = self.tokens.get(i) {
            i += 1;
            match tok {
                Token::LBrace | Token::LParen => depth += 1,
                Token::RBrace | Token::RParen => depth -= 1,
                Token::Newline | Token::Semi if depth <= 0 => break,
                _ => {}
            }
        }
        self.pos = i;
    }

    // ------------------------------------------------------------------
    // Token cursor
    // ------------------------------------------------------------------

    fn peek_index(&self) -> usize {
        let mut i = self.pos;
        if self.nesting > 0 {
            while matches!(self.tokens.get(i), Some((Token::Newline, _))) {
                i += 1;
            }
        }
        i
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.peek_index()).map(|(t, _)| t)
    }

    fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.peek_index() + n).map(|(t, _)| t)
    }

    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.peek_index())
            .map(|(_, s)| *s)
            .unwrap_or(self.eof_span)
    }

    fn prev_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|(_, s)| *s)
            .unwrap_or(self.eof_span)
    }

    fn at_eof(&self) -> bool {
        self.peek().is_none()
    }

    fn check(&self, tok: &Token) -> bool {
        self.peek() == Some(tok)
    }

    fn advance(&mut self) -> Option<(Token, Span)> {
        let i = self.peek_index();
        let tok = self.tokens.get(i).cloned();
        if tok.is_some() {
            self.pos = i + 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.check(tok) {
            self.pos = self.peek_index() + 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Token) -> Result<Span> {
        if self.eat(tok) {
            Ok(self.prev_span())
        } else {
            Err(self.unexpected(&format!("`{tok}`")))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<Spanned<String>> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.advance();
                Ok(Spanned::new(name, self.prev_span()))
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        let found = match self.peek() {
            Some(tok) => format!("`{tok}`"),
            None => "end of input".to_string(),
        };
        CompileError::parser(format!("expected {expected}, found {found}"), self.peek_span())
    }

    fn skip_separators(&mut self) {
        while matches!(self.tokens.get(self.pos), Some((Token::Newline | Token::Semi, _))) {
            self.pos += 1;
        }
    }

    /// A statement must be followed by a newline, `;`, `}` or end of input.
    /// Statements that end in a block need no separator.
    fn expect_terminator(&mut self) -> Result<()> {
        match self.tokens.get(self.pos).map(|(t, _)| t) {
            Some(Token::Newline | Token::Semi) => {
                self.pos += 1;
                Ok(())
            }
            Some(Token::RBrace) | None => Ok(()),
            Some(_) if self.pos > 0 && matches!(self.tokens[self.pos - 1].0, Token::RBrace) => Ok(()),
            Some(_) => Err(self.unexpected("newline or `;` after statement")),
        }
    }

    fn with_nesting<T>(&mut self, nesting: usize, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = self.nesting;
        self.nesting = nesting;
        let result = f(self);
        self.nesting = saved;
        result
    }

    fn mk(&mut self, kind: ExprKind, span: Span) -> Expr {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        Expr::new(id, kind, span)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_stmt(&mut self) -> Result<Spanned<Stmt>> {
        let start = self.peek_span();
        let stmt = match self.peek() {
            Some(Token::Var) | Some(Token::Const) => self.parse_var_decl()?,
            Some(Token::Fn) if matches!(self.peek_nth(1), Some(Token::Ident(_))) => {
                Stmt::FnDecl(self.parse_fn_decl()?)
            }
            Some(Token::ErrorKw) => Stmt::ErrorDecl(self.parse_error_decl()?),
            Some(Token::If) => return self.parse_if_stmt(),
            Some(Token::While) => {
                self.advance();
                let cond = self.parse_expr()?;
                let body = self.parse_block()?;
                Stmt::While { cond, body }
            }
            Some(Token::For) => self.parse_for()?,
            Some(Token::Break) => {
                self.advance();
                Stmt::Break
            }
            Some(Token::Continue) => {
                self.advance();
                Stmt::Continue
            }
            Some(Token::Return) => {
                self.advance();
                let ends_here = matches!(
                    self.tokens.get(self.pos).map(|(t, _)| t),
                    None | Some(Token::Newline | Token::Semi | Token::RBrace)
                );
                if ends_here {
                    Stmt::Return(None)
                } else {
                    Stmt::Return(Some(self.parse_expr()?))
                }
            }
            Some(Token::LBrace) => Stmt::Block(self.parse_block()?),
            Some(Token::Ident(_)) if self.peek_nth(1) == Some(&Token::Eq) => {
                let target = self.expect_ident("identifier")?;
                self.expect(&Token::Eq)?;
                let value = self.parse_expr()?;
                Stmt::Assign { target, value }
            }
            _ => Stmt::Expr(self.parse_expr()?),
        };
        Ok(Spanned::new(stmt, start.merge(self.prev_span())))
    }

    fn parse_var_decl(&mut self) -> Result<Stmt> {
        let mutable = matches!(self.advance(), Some((Token::Var, _)));
        let name = self.expect_ident("variable name")?;
        let ty = if self.eat(&Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(&Token::Eq)?;
        let init = self.parse_expr()?;
        Ok(Stmt::VarDecl {
            name,
            mutable,
            ty,
            init,
        })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>> {
        self.expect(&Token::LParen)?;
        self.with_nesting(self.nesting + 1, |p| {
            let mut params = Vec::new();
            while !p.check(&Token::RParen) {
                let name = p.expect_ident("parameter name")?;
                p.expect(&Token::Colon)?;
                let ty = p.parse_type()?;
                params.push(Param { name, ty });
                if !p.eat(&Token::Comma) {
                    break;
                }
            }
            p.expect(&Token::RParen)?;
            Ok(params)
        })
    }

    fn parse_return_type(&mut self) -> Result<Spanned<TypeExpr>> {
        if !self.eat(&Token::Colon) {
            return Err(self.unexpected("`:` and a return type"));
        }
        self.parse_type()
    }

    fn parse_fn_decl(&mut self) -> Result<FnDecl> {
        let start = self.expect(&Token::Fn)?;
        let name = self.expect_ident("function name")?;
        let params = self.parse_params()?;
        let ret_ty = self.parse_return_type()?;
        let body = self.parse_block()?;
        Ok(FnDecl {
            name,
            params,
            ret_ty,
            span: start.merge(body.span),
            body: Rc::new(body),
        })
    }

    fn parse_error_decl(&mut self) -> Result<ErrorDecl> {
        self.expect(&Token::ErrorKw)?;
        let name = self.expect_ident("error set name")?;
        self.expect(&Token::LBrace)?;
        let tags = self.with_nesting(1, |p| {
            let mut tags = Vec::new();
            while !p.check(&Token::RBrace) {
                tags.push(p.expect_ident("error tag")?);
                if !p.eat(&Token::Comma) {
                    break;
                }
            }
            p.expect(&Token::RBrace)?;
            Ok(tags)
        })?;
        Ok(ErrorDecl { name, tags })
    }

    fn parse_if_stmt(&mut self) -> Result<Spanned<Stmt>> {
        let start = self.expect(&Token::If)?;
        let cond = self.parse_expr()?;
        let then_block = self.parse_block()?;
        let else_branch = if self.eat_else() {
            if self.check(&Token::If) {
                Some(Box::new(self.parse_if_stmt()?))
            } else {
                let block = self.parse_block()?;
                let span = block.span;
                Some(Box::new(Spanned::new(Stmt::Block(block), span)))
            }
        } else {
            None
        };
        let stmt = Stmt::If {
            cond,
            then_block,
            else_branch,
        };
        Ok(Spanned::new(stmt, start.merge(self.prev_span())))
    }

    /// `else` may follow the closing brace on a later line
    fn eat_else(&mut self) -> bool {
        let mut i = self.pos;
        while matches!(self.tokens.get(i), Some((Token::Newline, _))) {
            i += 1;
        }
        if matches!(self.tokens.get(i), Some((Token::Else, _))) {
            self.pos = i + 1;
            true
        } else {
            false
        }
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        self.expect(&Token::For)?;
        let var = self.expect_ident("loop variable")?;
        self.expect(&Token::In)?;
        let start = self.parse_additive()?;
        self.expect(&Token::DotDot)?;
        let end = self.parse_additive()?;
        let body = self.parse_block()?;
        Ok(Stmt::For {
            var,
            start,
            end,
            body,
        })
    }

    fn parse_block(&mut self) -> Result<Block> {
        let start = self.expect(&Token::LBrace)?;
        self.with_nesting(0, |p| {
            let mut stmts = Vec::new();
            p.skip_separators();
            while !p.check(&Token::RBrace) {
                if p.at_eof() {
                    return Err(p.unexpected("`}`"));
                }
                stmts.push(p.parse_stmt()?);
                p.expect_terminator()?;
                p.skip_separators();
            }
            let end = p.expect(&Token::RBrace)?;
            Ok(Block {
                stmts,
                span: start.merge(end),
            })
        })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn parse_expr(&mut self) -> Result<Expr> {
        let mut expr = self.parse_or()?;
        while self.eat(&Token::Catch) {
            let binding = if self.eat(&Token::Pipe) {
                let name = self.expect_ident("error binding")?;
                self.expect(&Token::Pipe)?;
                Some(name)
            } else {
                None
            };
            let handler = self.parse_or()?;
            let span = expr.span.merge(handler.span);
            expr = self.mk(
                ExprKind::Catch {
                    expr: Box::new(expr),
                    binding,
                    handler: Box::new(handler),
                },
                span,
            );
        }
        Ok(expr)
    }

    fn binary(&mut self, left: Expr, op: BinOp, right: Expr) -> Expr {
        let span = left.span.merge(right.span);
        self.mk(
            ExprKind::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            span,
        )
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut expr = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            expr = self.binary(expr, BinOp::Or, right);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut expr = self.parse_equality()?;
        while self.eat(&Token::And) {
            let right = self.parse_equality()?;
            expr = self.binary(expr, BinOp::And, right);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut expr = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinOp::Eq,
                Some(Token::NotEq) => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            expr = self.binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut expr = self.parse_type_test()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinOp::Lt,
                Some(Token::Gt) => BinOp::Gt,
                Some(Token::LtEq) => BinOp::Le,
                Some(Token::GtEq) => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_type_test()?;
            expr = self.binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_type_test(&mut self) -> Result<Expr> {
        let expr = self.parse_additive()?;
        if self.eat(&Token::Is) {
            let ty = self.parse_type()?;
            let span = expr.span.merge(ty.span);
            return Ok(self.mk(
                ExprKind::Is {
                    expr: Box::new(expr),
                    ty,
                },
                span,
            ));
        }
        Ok(expr)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            expr = self.binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            expr = self.binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let start = self.peek_span();
        let op = match self.peek() {
            Some(Token::Minus) => Some(UnOp::Neg),
            Some(Token::Bang) => Some(UnOp::Not),
            Some(Token::Try) => None,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        let span = start.merge(operand.span);
        let kind = match op {
            Some(op) => ExprKind::Unary {
                op,
                expr: Box::new(operand),
            },
            None => ExprKind::Try(Box::new(operand)),
        };
        Ok(self.mk(kind, span))
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        while self.check(&Token::LParen) {
            let args = self.parse_args()?;
            let span = expr.span.merge(self.prev_span());
            expr = self.mk(
                ExprKind::Call {
                    callee: Box::new(expr),
                    args,
                },
                span,
            );
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        self.expect(&Token::LParen)?;
        self.with_nesting(self.nesting + 1, |p| {
            let mut args = Vec::new();
            while !p.check(&Token::RParen) {
                args.push(p.parse_expr()?);
                if !p.eat(&Token::Comma) {
                    break;
                }
            }
            p.expect(&Token::RParen)?;
            Ok(args)
        })
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let span = self.peek_span();
        let kind = match self.peek().cloned() {
            Some(Token::IntLit(n)) => ExprKind::IntLit(n),
            Some(Token::FloatLit(x)) => ExprKind::FloatLit(x),
            Some(Token::StringLit(s)) => ExprKind::StringLit(s),
            Some(Token::True) => ExprKind::BoolLit(true),
            Some(Token::False) => ExprKind::BoolLit(false),
            Some(Token::Null) => ExprKind::Null,
            Some(Token::Ident(name)) => {
                if self.peek_nth(1) == Some(&Token::Dot) {
                    self.advance();
                    self.advance();
                    let tag = self.expect_ident("error tag after `.`")?;
                    let kind = ExprKind::ErrorTag { set: name, tag: tag.node };
                    return Ok(self.mk(kind, span.merge(tag.span)));
                }
                ExprKind::Var(name)
            }
            Some(Token::LParen) => {
                self.advance();
                let inner = self.with_nesting(self.nesting + 1, |p| {
                    let inner = p.parse_expr()?;
                    p.expect(&Token::RParen)?;
                    Ok(inner)
                })?;
                return Ok(inner);
            }
            Some(Token::If) => return self.parse_if_expr(),
            Some(Token::Fn) => return self.parse_lambda(),
            Some(tok @ (Token::TyInt | Token::TyFloat | Token::TyString)) => {
                if self.peek_nth(1) != Some(&Token::LParen) {
                    return Err(self.unexpected("expression"));
                }
                let target = match tok {
                    Token::TyInt => TypeExpr::Int,
                    Token::TyFloat => TypeExpr::Float,
                    _ => TypeExpr::String,
                };
                self.advance();
                let mut args = self.parse_args()?;
                let end = self.prev_span();
                if args.len() != 1 {
                    return Err(CompileError::parser(
                        format!("conversion to {target} takes exactly one argument"),
                        span.merge(end),
                    ));
                }
                let expr = Box::new(args.remove(0));
                return Ok(self.mk(ExprKind::Convert { target, expr }, span.merge(end)));
            }
            _ => return Err(self.unexpected("expression")),
        };
        self.advance();
        Ok(self.mk(kind, span))
    }

    fn parse_if_expr(&mut self) -> Result<Expr> {
        let start = self.expect(&Token::If)?;
        let cond = self.parse_expr()?;
        let then_block = self.parse_block()?;
        if !self.eat_else() {
            return Err(self.unexpected("`else` (an `if` used as a value needs both branches)"));
        }
        let else_block = if self.check(&Token::If) {
            let nested = self.parse_if_expr()?;
            let span = nested.span;
            Block {
                stmts: vec![Spanned::new(Stmt::Expr(nested), span)],
                span,
            }
        } else {
            self.parse_block()?
        };
        let span = start.merge(else_block.span);
        Ok(self.mk(
            ExprKind::If {
                cond: Box::new(cond),
                then_block,
                else_block,
            },
            span,
        ))
    }

    fn parse_lambda(&mut self) -> Result<Expr> {
        let start = self.expect(&Token::Fn)?;
        let params = self.parse_params()?;
        let ret_ty = self.parse_return_type()?;
        let body = self.parse_block()?;
        let span = start.merge(body.span);
        Ok(self.mk(
            ExprKind::Lambda {
                params,
                ret_ty,
                body: Rc::new(body),
            },
            span,
        ))
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    pub fn parse_type(&mut self) -> Result<Spanned<TypeExpr>> {
        let first = self.parse_postfix_type()?;
        if !self.check(&Token::Pipe) {
            return Ok(first);
        }
        let mut span = first.span;
        let mut members = vec![first.node];
        while self.eat(&Token::Pipe) {
            let next = self.parse_postfix_type()?;
            span = span.merge(next.span);
            members.push(next.node);
        }
        Ok(Spanned::new(TypeExpr::Union(members), span))
    }

    fn parse_postfix_type(&mut self) -> Result<Spanned<TypeExpr>> {
        let mut ty = self.parse_atom_type()?;
        while self.eat(&Token::Question) {
            let span = ty.span.merge(self.prev_span());
            ty = Spanned::new(TypeExpr::Nullable(Box::new(ty.node)), span);
        }
        Ok(ty)
    }

    fn parse_atom_type(&mut self) -> Result<Spanned<TypeExpr>> {
        let span = self.peek_span();
        let ty = match self.peek().cloned() {
            Some(Token::TyInt) => TypeExpr::Int,
            Some(Token::TyFloat) => TypeExpr::Float,
            Some(Token::TyBool) => TypeExpr::Bool,
            Some(Token::TyString) => TypeExpr::String,
            Some(Token::TyVoid) => TypeExpr::Void,
            Some(Token::LParen) => {
                self.advance();
                let inner = self.with_nesting(self.nesting + 1, |p| {
                    let inner = p.parse_type()?;
                    p.expect(&Token::RParen)?;
                    Ok(inner)
                })?;
                return Ok(Spanned::new(inner.node, span.merge(self.prev_span())));
            }
            Some(Token::Fn) => {
                self.advance();
                self.expect(&Token::LParen)?;
                let params = self.with_nesting(self.nesting + 1, |p| {
                    let mut params = Vec::new();
                    while !p.check(&Token::RParen) {
                        params.push(p.parse_type()?.node);
                        if !p.eat(&Token::Comma) {
                            break;
                        }
                    }
                    p.expect(&Token::RParen)?;
                    Ok(params)
                })?;
                let ret = self.parse_return_type()?;
                let span = span.merge(ret.span);
                return Ok(Spanned::new(
                    TypeExpr::Function {
                        params,
                        ret: Box::new(ret.node),
                    },
                    span,
                ));
            }
            Some(Token::Ident(name)) => {
                self.advance();
                if self.eat(&Token::Bang) {
                    let ok = self.parse_postfix_type()?;
                    let span = span.merge(ok.span);
                    return Ok(Spanned::new(
                        TypeExpr::ErrorUnion {
                            set: name,
                            ok: Box::new(ok.node),
                        },
                        span,
                    ));
                }
                return Ok(Spanned::new(TypeExpr::Named(name), span));
            }
            _ => return Err(self.unexpected("type")),
        };
        self.advance();
        Ok(Spanned::new(ty, span))
    }
}
