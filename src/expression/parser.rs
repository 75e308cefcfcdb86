// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Recursive-descent parser for `if` edge expressions.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or         := and ("or" and)*
//! and        := not ("and" not)*
//! not        := "not" not | comparison
//! comparison := unary (("==" | "!=" | "<" | "<=" | ">" | ">=" | "in" | "not in") unary)?
//! unary      := "-" unary | primary
//! primary    := literal | path | call | "(" or ")"
//! path       := ("value" | "backpack") ("." ident | "[" (int | string) "]")*
//! call       := ident "(" or ")"
//! ```

use super::lexer::{tokenize, SpannedToken, Token};
use crate::errors::ExpressionError;
use serde_json::Value;

/// Names an expression may start a path from.
pub const ROOTS: [&str; 2] = ["value", "backpack"];

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Field(String),
    Index(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

/// Built-in functions. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Len,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path { root: String, segments: Vec<Segment> },
    Call { function: Function, argument: Box<Expr> },
    Negate(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

pub fn parse(source: &str) -> Result<Expr, ExpressionError> {
    let mut parser = Parser {
        tokens: tokenize(source)?,
        pos: 0,
    };
    let expr = parser.parse_or()?;
    if !parser.check(&Token::Eof) {
        return Err(parser.error(format!("unexpected {}", parser.peek())));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Token {
        self.tokens
            .get(self.pos)
            .map(|t| t.token.clone())
            .unwrap_or(Token::Eof)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.offset)
            .unwrap_or(0)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        std::mem::discriminant(&self.peek()) == std::mem::discriminant(token)
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExpressionError> {
        if self.check(expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {}, found {}", expected, self.peek())))
        }
    }

    fn error(&self, message: String) -> ExpressionError {
        ExpressionError::Parse {
            offset: self.offset(),
            message,
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.check(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_not()?;
        while self.check(&Token::And) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExpressionError> {
        if self.check(&Token::Not) {
            self.advance();
            let operand = self.parse_not()?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.parse_unary()?;

        let op = match self.peek() {
            Token::EqEq => CompareOp::Eq,
            Token::NotEq => CompareOp::Ne,
            Token::Lt => CompareOp::Lt,
            Token::Le => CompareOp::Le,
            Token::Gt => CompareOp::Gt,
            Token::Ge => CompareOp::Ge,
            Token::In => CompareOp::In,
            Token::Not => {
                self.advance();
                if !self.check(&Token::In) {
                    return Err(self.error("expected 'in' after 'not'".to_string()));
                }
                CompareOp::NotIn
            }
            _ => return Ok(left),
        };
        self.advance();

        let right = self.parse_unary()?;
        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.check(&Token::Minus) {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(operand)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.advance() {
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::Int(n) => Ok(Expr::Literal(Value::from(n))),
            Token::Float(n) => Ok(Expr::Literal(Value::from(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::LParen => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) if self.check(&Token::LParen) => self.parse_call(name),
            Token::Ident(name) if ROOTS.contains(&name.as_str()) => self.parse_path(name),
            Token::Ident(name) => {
                self.pos -= 1;
                Err(self.error(format!(
                    "unknown name '{}', expected one of: {}",
                    name,
                    ROOTS.join(", ")
                )))
            }
            other => {
                self.pos -= 1;
                Err(self.error(format!("unexpected {}", other)))
            }
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Expr, ExpressionError> {
        let function = match name.as_str() {
            "len" => Function::Len,
            _ => return Err(self.error(format!("unknown function '{}'", name))),
        };
        self.expect(&Token::LParen)?;
        let argument = self.parse_or()?;
        self.expect(&Token::RParen)?;
        Ok(Expr::Call {
            function,
            argument: Box::new(argument),
        })
    }

    fn parse_path(&mut self, root: String) -> Result<Expr, ExpressionError> {
        let mut segments = Vec::new();
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    match self.advance() {
                        Token::Ident(field) => segments.push(Segment::Field(field)),
                        other => {
                            self.pos -= 1;
                            return Err(self.error(format!("expected field name, found {}", other)));
                        }
                    }
                }
                Token::LBracket => {
                    self.advance();
                    let segment = match self.advance() {
                        Token::Int(index) => Segment::Index(index),
                        Token::Minus => match self.advance() {
                            Token::Int(index) => Segment::Index(-index),
                            other => {
                                self.pos -= 1;
                                return Err(self.error(format!("expected index, found {}", other)));
                            }
                        },
                        Token::Str(field) => Segment::Field(field),
                        other => {
                            self.pos -= 1;
                            return Err(self.error(format!("expected index or key, found {}", other)));
                        }
                    };
                    self.expect(&Token::RBracket)?;
                    segments.push(segment);
                }
                _ => break,
            }
        }
        Ok(Expr::Path { root, segments })
    }
}
