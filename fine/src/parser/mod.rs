//! Recursive-descent parser producing [`Program`]
//!
//! Statements need no separator; an optional `;` is accepted between them.
//! Binary operators are left-associative with four precedence levels:
//! comparison < additive (`+ - @`) < multiplicative (`* / % //`) < unary.

#[cfg(test)]
mod tests;

use crate::ast::*;
use crate::error::{CompileError, Result};
use crate::lexer::{tokenize, Token};
use crate::{STACK_GROW_SIZE, STACK_RED_ZONE};
use std::rc::Rc;

/// Tokenize and parse a complete source file
pub fn parse_source(source: &str) -> Result<Program> {
    let tokens = tokenize(source)?;
    parse(source, tokens)
}

/// Parse a token stream produced by [`tokenize`]
pub fn parse(source: &str, tokens: Vec<(Token, Span)>) -> Result<Program> {
    let mut parser = Parser::new(source, tokens);
    let mut stmts = Vec::new();
    parser.skip_semis();
    while !parser.at_end() {
        stmts.push(parser.statement()?);
        parser.skip_semis();
    }
    Ok(Program { stmts })
}

struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    lines: LineIndex,
    eof: Span,
}

impl Parser {
    fn new(source: &str, tokens: Vec<(Token, Span)>) -> Self {
        Self {
            tokens,
            pos: 0,
            lines: LineIndex::new(source),
            eof: Span::new(source.len(), source.len()),
        }
    }

    // ------------------------------------------------------------------
    // Token cursor
    // ------------------------------------------------------------------

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn span(&self) -> Span {
        self.tokens.get(self.pos).map_or(self.eof, |(_, s)| *s)
    }

    fn prev_span(&self) -> Span {
        match self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)) {
            Some((_, s)) => *s,
            None => self.eof,
        }
    }

    fn line(&self) -> usize {
        self.lines.line(self.span().start)
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn skip_semis(&mut self) {
        while self.eat(&Token::Semi) {}
    }

    fn error_here(&self, expected: &str) -> CompileError {
        let found = match self.peek() {
            Some(t) => format!("'{t}'"),
            None => "end of input".to_string(),
        };
        CompileError::parser(format!("expected {expected}, found {found}"), self.span())
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.error_here(&format!("'{token}'")))
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error_here("identifier")),
        }
    }

    fn spanned<T>(&self, node: T, start: Span, line: usize) -> Spanned<T> {
        Spanned::new(node, start.merge(self.prev_span()), line)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn statement(&mut self) -> Result<Spanned<Stmt>> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.statement_inner())
    }

    fn statement_inner(&mut self) -> Result<Spanned<Stmt>> {
        let start = self.span();
        let line = self.line();
        let stmt = match self.peek() {
            Some(Token::Import) => self.import_stmt()?,
            Some(Token::From) => self.from_import_stmt()?,
            Some(Token::Export) => {
                self.pos += 1;
                if !matches!(self.peek(), Some(Token::Fn | Token::Let | Token::Class)) {
                    return Err(self.error_here("'fn', 'let' or 'class' after 'export'"));
                }
                Stmt::Export(Box::new(self.statement()?))
            }
            Some(Token::Let) => {
                self.pos += 1;
                let name = self.ident()?;
                self.expect(Token::Eq)?;
                let value = self.expr()?;
                Stmt::Let { name, value }
            }
            Some(Token::Fn) => Stmt::FnDef(Rc::new(self.fn_def()?)),
            Some(Token::Class) => Stmt::ClassDef(Rc::new(self.class_def()?)),
            Some(Token::If) => self.if_stmt()?,
            Some(Token::For | Token::Parallel) => self.for_stmt()?,
            Some(Token::While) => {
                self.pos += 1;
                let cond = self.expr()?;
                let body = self.block()?;
                Stmt::While { cond, body }
            }
            Some(Token::Return) => {
                self.pos += 1;
                let value = if matches!(self.peek(), None | Some(Token::RBrace | Token::Semi)) {
                    None
                } else {
                    Some(self.expr()?)
                };
                Stmt::Return(value)
            }
            Some(Token::Try) => self.try_stmt()?,
            Some(Token::Struct) => {
                return Err(CompileError::parser("'struct' is reserved; use 'class'", start));
            }
            Some(Token::Throw) => {
                self.pos += 1;
                Stmt::Throw(self.expr()?)
            }
            Some(Token::Assert) => {
                self.pos += 1;
                let cond = self.expr()?;
                let message = if self.eat(&Token::Comma) {
                    Some(self.expr()?)
                } else {
                    None
                };
                Stmt::Assert { cond, message }
            }
            _ => self.expr_stmt()?,
        };
        Ok(self.spanned(stmt, start, line))
    }

    fn expr_stmt(&mut self) -> Result<Stmt> {
        let target = self.expr()?;
        if !self.check(&Token::Eq) {
            return Ok(Stmt::Expr(target));
        }
        let eq_span = self.span();
        self.pos += 1;
        let value = self.expr()?;
        match target.node {
            Expr::Ident(name) => Ok(Stmt::Assign { name, value }),
            Expr::Field { target, name } => Ok(Stmt::FieldAssign {
                target: *target,
                field: name,
                value,
            }),
            _ => Err(CompileError::parser("invalid assignment target", eq_span)),
        }
    }

    fn block(&mut self) -> Result<Block> {
        self.expect(Token::LBrace)?;
        let mut stmts = Vec::new();
        self.skip_semis();
        while !self.check(&Token::RBrace) {
            if self.at_end() {
                return Err(self.error_here("'}'"));
            }
            stmts.push(self.statement()?);
            self.skip_semis();
        }
        self.pos += 1;
        Ok(stmts)
    }

    fn params(&mut self) -> Result<Vec<String>> {
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                params.push(self.ident()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;
        Ok(params)
    }

    fn fn_def(&mut self) -> Result<FnDef> {
        let line = self.line();
        self.expect(Token::Fn)?;
        let name = self.ident()?;
        let params = self.params()?;
        let body = self.block()?;
        Ok(FnDef {
            name,
            params,
            body,
            line,
        })
    }

    fn class_def(&mut self) -> Result<ClassDef> {
        self.expect(Token::Class)?;
        let name = self.ident()?;
        let parent = if self.eat(&Token::Extends) {
            Some(self.ident()?)
        } else {
            None
        };
        self.expect(Token::LBrace)?;
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        loop {
            self.skip_semis();
            match self.peek() {
                Some(Token::RBrace) => {
                    self.pos += 1;
                    break;
                }
                Some(Token::Let) => {
                    self.pos += 1;
                    fields.push(self.ident()?);
                }
                Some(Token::Fn) => methods.push(Rc::new(self.fn_def()?)),
                _ => return Err(self.error_here("'let', 'fn' or '}' in class body")),
            }
        }
        Ok(ClassDef {
            name,
            parent,
            fields,
            methods,
        })
    }

    fn if_stmt(&mut self) -> Result<Stmt> {
        self.expect(Token::If)?;
        let cond = self.expr()?;
        let then_branch = self.block()?;
        let else_branch = if self.eat(&Token::Else) {
            if self.check(&Token::If) {
                Some(vec![self.statement()?])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn for_stmt(&mut self) -> Result<Stmt> {
        let parallel = self.eat(&Token::Parallel);
        self.expect(Token::For)?;
        let parens = self.eat(&Token::LParen);
        let var = self.ident()?;
        self.expect(Token::In)?;
        let iterable = self.expr()?;
        if parens {
            self.expect(Token::RParen)?;
        }
        let body = self.block()?;
        Ok(Stmt::For {
            var,
            iterable,
            body,
            parallel,
        })
    }

    fn try_stmt(&mut self) -> Result<Stmt> {
        self.expect(Token::Try)?;
        let body = self.block()?;
        let catch = if self.eat(&Token::Catch) {
            let (kind, var) = match self.peek() {
                Some(Token::Ident(_)) => {
                    let first = self.ident()?;
                    if self.eat(&Token::As) {
                        (Some(first), Some(self.ident()?))
                    } else {
                        (None, Some(first))
                    }
                }
                _ => (None, None),
            };
            let body = self.block()?;
            Some(CatchClause { kind, var, body })
        } else {
            None
        };
        let finally = if self.eat(&Token::Finally) {
            Some(self.block()?)
        } else {
            None
        };
        if catch.is_none() && finally.is_none() {
            return Err(self.error_here("'catch' or 'finally' after try block"));
        }
        Ok(Stmt::Try {
            body,
            catch,
            finally,
        })
    }

    /// Module names are identifiers or quoted paths (`"./lib/util"`)
    fn module_name(&mut self) -> Result<String> {
        match self.peek() {
            Some(Token::Str(path)) => {
                let path = path.clone();
                self.pos += 1;
                Ok(path)
            }
            _ => self.ident(),
        }
    }

    fn import_stmt(&mut self) -> Result<Stmt> {
        self.expect(Token::Import)?;
        let module = self.module_name()?;
        let alias = if self.eat(&Token::As) {
            Some(self.ident()?)
        } else {
            None
        };
        Ok(Stmt::Import { module, alias })
    }

    fn from_import_stmt(&mut self) -> Result<Stmt> {
        self.expect(Token::From)?;
        let module = self.module_name()?;
        self.expect(Token::Import)?;
        let mut names = vec![self.ident()?];
        while self.eat(&Token::Comma) {
            names.push(self.ident()?);
        }
        Ok(Stmt::FromImport { module, names })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expr(&mut self) -> Result<Spanned<Expr>> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.comparison())
    }

    fn binary(&self, left: Spanned<Expr>, op: BinOp, right: Spanned<Expr>) -> Spanned<Expr> {
        let span = left.span.merge(right.span);
        let line = left.line;
        Spanned::new(
            Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            span,
            line,
        )
    }

    fn comparison(&mut self) -> Result<Spanned<Expr>> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinOp::Eq,
                Some(Token::NotEq) => BinOp::Ne,
                Some(Token::Lt) => BinOp::Lt,
                Some(Token::LtEq) => BinOp::Le,
                Some(Token::Gt) => BinOp::Gt,
                Some(Token::GtEq) => BinOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = self.binary(left, op, right);
        }
    }

    fn term(&mut self) -> Result<Spanned<Expr>> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                Some(Token::At) => BinOp::MatMul,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.factor()?;
            left = self.binary(left, op, right);
        }
    }

    fn factor(&mut self) -> Result<Spanned<Expr>> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Mod,
                Some(Token::SlashSlash) => BinOp::FloorDiv,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = self.binary(left, op, right);
        }
    }

    fn unary(&mut self) -> Result<Spanned<Expr>> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.unary_inner())
    }

    fn unary_inner(&mut self) -> Result<Spanned<Expr>> {
        let op = match self.peek() {
            Some(Token::Minus) => UnOp::Neg,
            Some(Token::Bang) => UnOp::Not,
            _ => return self.postfix(),
        };
        let start = self.span();
        let line = self.line();
        self.pos += 1;
        let operand = self.unary()?;
        Ok(self.spanned(
            Expr::Unary {
                op,
                expr: Box::new(operand),
            },
            start,
            line,
        ))
    }

    fn postfix(&mut self) -> Result<Spanned<Expr>> {
        let start = self.span();
        let mut expr = self.primary()?;
        loop {
            let line = self.line();
            match self.peek() {
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.expr()?;
                    self.expect(Token::RBracket)?;
                    expr = self.spanned(
                        Expr::Index {
                            target: Box::new(expr),
                            index: Box::new(index),
                        },
                        start,
                        line,
                    );
                }
                Some(Token::Dot) => {
                    self.pos += 1;
                    let name = self.ident()?;
                    expr = if self.check(&Token::LParen) {
                        let args = self.args()?;
                        self.spanned(
                            Expr::MethodCall {
                                receiver: Box::new(expr),
                                method: name,
                                args,
                            },
                            start,
                            line,
                        )
                    } else {
                        self.spanned(
                            Expr::Field {
                                target: Box::new(expr),
                                name,
                            },
                            start,
                            line,
                        )
                    };
                }
                Some(Token::Arrow) => {
                    self.pos += 1;
                    let method = self.ident()?;
                    let args = self.args()?;
                    expr = self.spanned(
                        Expr::MethodCall {
                            receiver: Box::new(expr),
                            method,
                            args,
                        },
                        start,
                        line,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn args(&mut self) -> Result<Vec<Spanned<Expr>>> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                args.push(self.expr()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;
        Ok(args)
    }

    fn primary(&mut self) -> Result<Spanned<Expr>> {
        let start = self.span();
        let line = self.line();
        let expr = match self.advance() {
            Some(Token::Number(n)) => Expr::Number(n),
            Some(Token::Str(s)) => Expr::Str(s),
            Some(Token::True) => Expr::Bool(true),
            Some(Token::False) => Expr::Bool(false),
            Some(Token::This) => Expr::This,
            Some(Token::Ident(name)) => {
                if self.check(&Token::LParen) {
                    let args = self.args()?;
                    Expr::Call { func: name, args }
                } else {
                    Expr::Ident(name)
                }
            }
            Some(Token::New) => {
                let class = self.ident()?;
                let args = self.args()?;
                Expr::New { class, args }
            }
            Some(Token::Super) => {
                self.expect(Token::Dot)?;
                let method = self.ident()?;
                let args = self.args()?;
                Expr::SuperCall { method, args }
            }
            Some(Token::LBracket) => self.array_literal()?,
            Some(Token::LBrace) => self.dict_literal()?,
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                return Ok(Spanned::new(inner.node, start.merge(self.prev_span()), line));
            }
            other => {
                if other.is_some() {
                    self.pos -= 1;
                }
                return Err(self.error_here("expression"));
            }
        };
        Ok(self.spanned(expr, start, line))
    }

    /// `[` already consumed
    fn array_literal(&mut self) -> Result<Expr> {
        let mut elements = Vec::new();
        if !self.check(&Token::RBracket) {
            loop {
                elements.push(self.expr()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RBracket)?;
        Ok(matrix_literal(&elements).unwrap_or(Expr::Array(elements)))
    }

    /// `{` already consumed
    fn dict_literal(&mut self) -> Result<Expr> {
        let mut entries = Vec::new();
        if !self.check(&Token::RBrace) {
            loop {
                let key = match self.advance() {
                    Some(Token::Ident(k) | Token::Str(k)) => k,
                    other => {
                        if other.is_some() {
                            self.pos -= 1;
                        }
                        return Err(self.error_here("dict key"));
                    }
                };
                self.expect(Token::Colon)?;
                let value = self.expr()?;
                entries.push((key, value));
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RBrace)?;
        Ok(Expr::Dict(entries))
    }
}

/// A nested array literal whose rows are all array literals of the same
/// non-zero length becomes a matrix.
fn matrix_literal(elements: &[Spanned<Expr>]) -> Option<Expr> {
    let mut cols = None;
    for element in elements {
        match &element.node {
            Expr::Array(row) if !row.is_empty() => match cols {
                None => cols = Some(row.len()),
                Some(c) if c == row.len() => {}
                Some(_) => return None,
            },
            _ => return None,
        }
    }
    let cols = cols?;
    let cells = elements
        .iter()
        .flat_map(|e| match &e.node {
            Expr::Array(row) => row.as_slice(),
            _ => &[][..],
        })
        .cloned()
        .collect();
    Some(Expr::Matrix {
        rows: elements.len(),
        cols,
        cells,
    })
}
