//! Recursive-descent parser for function files.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! unit    := item*
//! item    := doc* 'fn' IDENT '(' params? ')' ('->' type)? block
//! block   := '{' ('let' IDENT '=' expr ';')* expr '}'
//! expr    := 'if' expr block 'else' (if | block) | or
//! or      := and ('||' and)*
//! and     := cmp ('&&' cmp)*
//! cmp     := sum (('=='|'!='|'<'|'<='|'>'|'>=') sum)?
//! sum     := term (('+'|'-') term)*
//! term    := unary (('*'|'/'|'%') unary)*
//! unary   := ('-'|'!') unary | power
//! power   := postfix ('**' unary)?
//! postfix := primary ('[' expr ']' | '.' IDENT)*
//! ```

use std::collections::HashSet;

use crate::ast::{BinaryOp, Block, Expr, FunctionDef, Param, UnaryOp};
use crate::error::ParseError;
use crate::lexer::{tokenize, Token, TokenKind};
use crate::value::{ParamType, Value};

/// Maximum expression nesting, counting operator chains as well as brackets.
pub const MAX_NESTING: usize = 128;

/// Parses every `fn` item in `source`.
pub fn parse_unit(source: &str) -> Result<Vec<FunctionDef>, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let mut items = Vec::new();
    loop {
        let doc = parser.doc_comments();
        if parser.peek() == &TokenKind::Eof {
            break;
        }
        items.push(parser.function(doc)?);
    }
    Ok(items)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn line(&self) -> usize {
        self.tokens[self.pos].line
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if kind != TokenKind::Eof {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.unexpected(&kind.to_string()))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::Expected {
            line: self.line(),
            expected: expected.to_string(),
            found: self.peek().to_string(),
        }
    }

    fn descend(&mut self) -> Result<(), ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError::TooDeep {
                line: self.line(),
                limit: MAX_NESTING,
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn ascend(&mut self, levels: usize) {
        self.depth -= levels;
    }

    fn ident(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// Collects doc comments; stray ones inside bodies are skipped here too.
    fn doc_comments(&mut self) -> Option<String> {
        let mut lines = Vec::new();
        while let TokenKind::DocComment(text) = self.peek().clone() {
            lines.push(text);
            self.advance();
        }
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }

    fn skip_docs(&mut self) {
        while matches!(self.peek(), TokenKind::DocComment(_)) {
            self.advance();
        }
    }

    fn function(&mut self, doc: Option<String>) -> Result<FunctionDef, ParseError> {
        let line = self.line();
        self.expect(TokenKind::Fn)?;
        let name = self.ident()?;
        self.expect(TokenKind::LParen)?;

        let mut params = Vec::new();
        let mut seen = HashSet::new();
        if !self.eat(&TokenKind::RParen) {
            loop {
                let param_line = self.line();
                let param_name = self.ident()?;
                if !seen.insert(param_name.clone()) {
                    return Err(ParseError::DuplicateParam {
                        line: param_line,
                        name: param_name,
                    });
                }
                let ty = if self.eat(&TokenKind::Colon) {
                    self.type_name()?
                } else {
                    ParamType::Any
                };
                params.push(Param {
                    name: param_name,
                    ty,
                });
                if self.eat(&TokenKind::RParen) {
                    break;
                }
                self.expect(TokenKind::Comma)?;
                // trailing comma
                if self.eat(&TokenKind::RParen) {
                    break;
                }
            }
        }

        let return_type = if self.eat(&TokenKind::Arrow) {
            self.type_name()?
        } else {
            ParamType::Any
        };
        let body = self.block()?;

        Ok(FunctionDef {
            name,
            params,
            return_type,
            body,
            doc,
            line,
        })
    }

    fn type_name(&mut self) -> Result<ParamType, ParseError> {
        let line = self.line();
        let name = self.ident()?;
        ParamType::from_name(&name).ok_or(ParseError::UnknownType { line, name })
    }

    fn block(&mut self) -> Result<Block, ParseError> {
        self.skip_docs();
        self.expect(TokenKind::LBrace)?;
        let mut bindings = Vec::new();
        loop {
            self.skip_docs();
            if !self.eat(&TokenKind::Let) {
                break;
            }
            let name = self.ident()?;
            self.expect(TokenKind::Assign)?;
            let value = self.expr()?;
            self.expect(TokenKind::Semicolon)?;
            bindings.push((name, value));
        }
        let result = self.expr()?;
        self.skip_docs();
        self.expect(TokenKind::RBrace)?;
        Ok(Block {
            bindings,
            result: Box::new(result),
        })
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.descend()?;
        let expr = if self.eat(&TokenKind::If) {
            self.if_tail()?
        } else {
            self.or()?
        };
        self.ascend(1);
        Ok(expr)
    }

    /// Parses the remainder of an `if` after the keyword.
    fn if_tail(&mut self) -> Result<Expr, ParseError> {
        self.descend()?;
        let cond = self.or()?;
        let then_block = self.block()?;
        self.expect(TokenKind::Else)?;
        let else_block = if self.eat(&TokenKind::If) {
            Block {
                bindings: Vec::new(),
                result: Box::new(self.if_tail()?),
            }
        } else {
            self.block()?
        };
        self.ascend(1);
        Ok(Expr::If {
            cond: Box::new(cond),
            then_block,
            else_block,
        })
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.and()?;
        let mut chain = 0;
        while self.eat(&TokenKind::OrOr) {
            self.descend()?;
            chain += 1;
            let rhs = self.and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        self.ascend(chain);
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.comparison()?;
        let mut chain = 0;
        while self.eat(&TokenKind::AndAnd) {
            self.descend()?;
            chain += 1;
            let rhs = self.comparison()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        self.ascend(chain);
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.sum()?;
        let op = match self.peek() {
            TokenKind::EqEq => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::Ne,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        self.descend()?;
        let rhs = self.sum()?;
        self.ascend(1);
        Ok(binary(op, lhs, rhs))
    }

    fn sum(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.term()?;
        let mut chain = 0;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.descend()?;
            chain += 1;
            let rhs = self.term()?;
            lhs = binary(op, lhs, rhs);
        }
        self.ascend(chain);
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        let mut chain = 0;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            self.descend()?;
            chain += 1;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
        self.ascend(chain);
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.power(),
        };
        self.advance();
        self.descend()?;
        let expr = self.unary()?;
        self.ascend(1);
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.postfix()?;
        if self.eat(&TokenKind::StarStar) {
            // right-associative
            self.descend()?;
            let exponent = self.unary()?;
            self.ascend(1);
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        let mut chain = 0;
        loop {
            if self.eat(&TokenKind::LBracket) {
                self.descend()?;
                chain += 1;
                let index = self.expr()?;
                self.expect(TokenKind::RBracket)?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat(&TokenKind::Dot) {
                self.descend()?;
                chain += 1;
                let name = self.ident()?;
                expr = Expr::Field {
                    target: Box::new(expr),
                    name,
                };
            } else {
                self.ascend(chain);
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            TokenKind::Int(i) => {
                self.advance();
                Ok(Expr::Literal(Value::Int(i)))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Expr::Literal(Value::Float(f)))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Value::Str(s)))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(true)))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(false)))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Literal(Value::Null))
            }
            TokenKind::If => {
                self.advance();
                self.if_tail()
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.eat(&TokenKind::LParen) {
                    let args = self.list(TokenKind::RParen)?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Var(name))
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                Ok(Expr::Array(self.list(TokenKind::RBracket)?))
            }
            TokenKind::LBrace => {
                self.advance();
                self.object()
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    /// Comma-separated expressions up to and including `close`.
    fn list(&mut self, close: TokenKind) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        if self.eat(&close) {
            return Ok(items);
        }
        loop {
            items.push(self.expr()?);
            if self.eat(&close) {
                return Ok(items);
            }
            self.expect(TokenKind::Comma)?;
            if self.eat(&close) {
                return Ok(items);
            }
        }
    }

    /// Object literal body after `{`. Keys are identifiers or strings.
    fn object(&mut self) -> Result<Expr, ParseError> {
        let mut fields = Vec::new();
        if self.eat(&TokenKind::RBrace) {
            return Ok(Expr::Object(fields));
        }
        loop {
            let key = match self.peek().clone() {
                TokenKind::Ident(name) => name,
                TokenKind::Str(s) => s,
                _ => return Err(self.unexpected("object key")),
            };
            self.advance();
            self.expect(TokenKind::Colon)?;
            fields.push((key, self.expr()?));
            if self.eat(&TokenKind::RBrace) {
                return Ok(Expr::Object(fields));
            }
            self.expect(TokenKind::Comma)?;
            if self.eat(&TokenKind::RBrace) {
                return Ok(Expr::Object(fields));
            }
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}
