//! Rule DSL parser. Recursive descent over the token stream.
//!
//! A source holds zero or more blocks of the form
//!
//! ```text
//! rule CheckValues "Check the default values" salience 10 {
//!     when
//!         MF.IntAttribute == 123 && MF.StringAttribute == "Some string value"
//!     then
//!         MF.WhatToSay = MF.GetWhatToSay("Hello");
//!         Retract("CheckValues");
//! }
//! ```
//!
//! The description and the `salience` clause are optional (salience
//! defaults to 0).

use std::collections::HashSet;

use serde_json::Value;

use crate::error::ParseError;

use super::ast::{AssignOp, BinaryOp, Builtin, Expr, Rule, Statement, UnaryOp};
use super::lexer::{tokenize, Token, TokenKind};


/// Parse every rule block in `source`.
///
/// Rule names must be unique within the source.
pub fn parse_rules(source: &str) -> Result<Vec<Rule>, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(source, tokens);
    let mut rules = Vec::new();
    let mut seen = HashSet::new();

    while !parser.at_eof() {
        let name_tok = parser.peek_at(1).clone();
        let rule = parser.rule()?;
        if !seen.insert(rule.name.clone()) {
            return Err(parser.error_at(
                &name_tok,
                format!("duplicate rule name '{}'", rule.name),
            ));
        }
        rules.push(rule);
    }
    Ok(rules)
}

/// Parse a standalone expression such as `User.Age >= 18 && !User.Banned`.
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(source, tokens);
    let expr = parser.expr()?;
    if !parser.at_eof() {
        let tok = parser.peek().clone();
        return Err(parser.unexpected(&tok, "end of expression"));
    }
    Ok(expr)
}


// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

const BINARY_LEVELS: usize = 6;

/// Deepest expression tree the parser accepts. Parsing, printing and
/// evaluation all recurse over the tree.
pub const MAX_EXPR_DEPTH: usize = 128;

fn binary_op(level: usize, kind: &TokenKind) -> Option<BinaryOp> {
    let op = match (level, kind) {
        (0, TokenKind::OrOr) => BinaryOp::Or,
        (1, TokenKind::AndAnd) => BinaryOp::And,
        (2, TokenKind::EqEq) => BinaryOp::Eq,
        (2, TokenKind::NotEq) => BinaryOp::NotEq,
        (3, TokenKind::Lt) => BinaryOp::Lt,
        (3, TokenKind::LtEq) => BinaryOp::LtEq,
        (3, TokenKind::Gt) => BinaryOp::Gt,
        (3, TokenKind::GtEq) => BinaryOp::GtEq,
        (4, TokenKind::Plus) => BinaryOp::Add,
        (4, TokenKind::Minus) => BinaryOp::Sub,
        (5, TokenKind::Star) => BinaryOp::Mul,
        (5, TokenKind::Slash) => BinaryOp::Div,
        (5, TokenKind::Percent) => BinaryOp::Rem,
        _ => return None,
    };
    Some(op)
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str, tokens: Vec<Token>) -> Self {
        Parser {
            source,
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    // --- token helpers ---

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    /// Look ahead; past the end this keeps returning the `Eof` token.
    fn peek_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + offset).min(last)]
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if tok.kind != TokenKind::Eof {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn check_keyword(&self, kw: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(s) if s == kw)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            let tok = self.peek().clone();
            Err(self.unexpected(&tok, what))
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<Token, ParseError> {
        if self.check_keyword(kw) {
            Ok(self.advance())
        } else {
            let tok = self.peek().clone();
            Err(self.unexpected(&tok, &format!("'{}'", kw)))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek().kind.clone() {
            TokenKind::Ident(s) => {
                self.advance();
                Ok(s)
            }
            _ => {
                let tok = self.peek().clone();
                Err(self.unexpected(&tok, what))
            }
        }
    }

    fn error_at(&self, tok: &Token, message: impl Into<String>) -> ParseError {
        ParseError::new(tok.line, tok.column, message)
    }

    fn unexpected(&self, tok: &Token, expected: &str) -> ParseError {
        self.error_at(
            tok,
            format!("expected {}, found {}", expected, tok.kind.describe()),
        )
    }

    // --- rule blocks ---

    fn rule(&mut self) -> Result<Rule, ParseError> {
        let start = self.expect_keyword("rule")?.start;
        let name = self.expect_ident("rule name")?;

        let description = match self.peek().kind.clone() {
            TokenKind::Str(s) => {
                self.advance();
                s
            }
            _ => String::new(),
        };

        let salience = if self.check_keyword("salience") {
            self.advance();
            self.signed_int("salience value")?
        } else {
            0
        };

        self.expect(TokenKind::LBrace, "'{'")?;
        self.expect_keyword("when")?;
        let when = self.expr()?;
        self.expect_keyword("then")?;

        let mut then = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.at_eof() {
                let tok = self.peek().clone();
                return Err(self.unexpected(&tok, "'}' closing the rule"));
            }
            then.push(self.statement()?);
            if !self.eat(&TokenKind::Semi) && !self.check(&TokenKind::RBrace) {
                let tok = self.peek().clone();
                return Err(self.unexpected(&tok, "';'"));
            }
        }
        let end = self.advance().end;

        Ok(Rule {
            name,
            description,
            salience,
            when,
            then,
            source: self.source[start..end].to_string(),
        })
    }

    fn signed_int(&mut self, what: &str) -> Result<i64, ParseError> {
        let negative = self.eat(&TokenKind::Minus);
        match self.peek().kind {
            TokenKind::Int(i) => {
                self.advance();
                Ok(if negative { -i } else { i })
            }
            _ => {
                let tok = self.peek().clone();
                Err(self.unexpected(&tok, what))
            }
        }
    }

    // --- statements ---

    fn statement(&mut self) -> Result<Statement, ParseError> {
        let head_tok = self.peek().clone();
        let head = self.expect_ident("statement")?;

        if self.check(&TokenKind::LParen) {
            return self.function_statement(&head_tok, &head);
        }

        self.expect(TokenKind::Dot, "'.' or '(' after identifier")?;
        let member = self.expect_ident("field or method name")?;

        if self.check(&TokenKind::LParen) {
            let args = self.call_args()?;
            return Ok(Statement::Call(Expr::MethodCall {
                fact: head,
                method: member,
                args,
            }));
        }

        let op_tok = self.advance();
        let op = match op_tok.kind {
            TokenKind::Assign => AssignOp::Set,
            TokenKind::PlusAssign => AssignOp::Add,
            TokenKind::MinusAssign => AssignOp::Sub,
            TokenKind::StarAssign => AssignOp::Mul,
            TokenKind::SlashAssign => AssignOp::Div,
            _ => return Err(self.unexpected(&op_tok, "assignment operator")),
        };
        let value = self.expr()?;
        Ok(Statement::Assign {
            fact: head,
            field: member,
            op,
            value,
        })
    }

    fn function_statement(&mut self, head_tok: &Token, head: &str) -> Result<Statement, ParseError> {
        match head {
            "Retract" => {
                self.expect(TokenKind::LParen, "'('")?;
                let name = match self.peek().kind.clone() {
                    TokenKind::Str(s) => {
                        self.advance();
                        s
                    }
                    _ => {
                        let tok = self.peek().clone();
                        return Err(self.unexpected(&tok, "rule name string in Retract"));
                    }
                };
                self.expect(TokenKind::RParen, "')'")?;
                Ok(Statement::Retract(name))
            }
            "Complete" => {
                self.expect(TokenKind::LParen, "'('")?;
                self.expect(TokenKind::RParen, "')' (Complete takes no arguments)")?;
                Ok(Statement::Complete)
            }
            _ => Ok(Statement::Call(self.builtin_call(head_tok, head)?)),
        }
    }

    // --- expressions ---

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(0)
    }

    /// Enter `levels` more levels of expression nesting.
    fn descend(&mut self, levels: usize) -> Result<(), ParseError> {
        self.depth += levels;
        if self.depth > MAX_EXPR_DEPTH {
            let tok = self.peek().clone();
            return Err(self.error_at(
                &tok,
                format!("expression nested deeper than {} levels", MAX_EXPR_DEPTH),
            ));
        }
        Ok(())
    }

    fn ascend(&mut self, levels: usize) {
        self.depth -= levels;
    }

    /// Precedence climbing: level 0 is `||`, the last level is `* / %`.
    fn binary_level(&mut self, level: usize) -> Result<Expr, ParseError> {
        if level == BINARY_LEVELS {
            return self.unary();
        }

        let mut lhs = self.binary_level(level + 1)?;
        // Each operator in a chain adds one level to the left spine.
        let mut chain = 0;
        while let Some(op) = binary_op(level, &self.peek().kind) {
            self.advance();
            self.descend(1)?;
            chain += 1;
            let rhs = self.binary_level(level + 1)?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        self.ascend(chain);
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&TokenKind::Bang) {
            self.descend(1)?;
            let inner = self.unary()?;
            self.ascend(1);
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(inner),
            });
        }
        if self.eat(&TokenKind::Minus) {
            // Fold negative number literals.
            match self.peek().kind {
                TokenKind::Int(i) => {
                    self.advance();
                    return Ok(Expr::Literal(Value::from(-i)));
                }
                TokenKind::Float(f) => {
                    self.advance();
                    return Ok(Expr::Literal(Value::from(-f)));
                }
                _ => {}
            }
            self.descend(1)?;
            let inner = self.unary()?;
            self.ascend(1);
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(inner),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.advance();
        match tok.kind.clone() {
            TokenKind::Int(i) => Ok(Expr::Literal(Value::from(i))),
            TokenKind::Float(f) => Ok(Expr::Literal(Value::from(f))),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::LParen => {
                self.descend(1)?;
                let inner = self.expr()?;
                self.ascend(1);
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "nil" => Ok(Expr::Literal(Value::Null)),
                _ if self.check(&TokenKind::LParen) => self.builtin_call(&tok, &name),
                _ => {
                    self.expect(TokenKind::Dot, "'.' after fact name")?;
                    let member = self.expect_ident("field or method name")?;
                    if self.check(&TokenKind::LParen) {
                        let args = self.call_args()?;
                        Ok(Expr::MethodCall {
                            fact: name,
                            method: member,
                            args,
                        })
                    } else {
                        Ok(Expr::Field {
                            fact: name,
                            field: member,
                        })
                    }
                }
            },
            _ => Err(self.unexpected(&tok, "expression")),
        }
    }

    fn builtin_call(&mut self, name_tok: &Token, name: &str) -> Result<Expr, ParseError> {
        let func = match Builtin::lookup(name) {
            Some(f) => f,
            None if name == "Retract" || name == "Complete" => {
                return Err(self.error_at(
                    name_tok,
                    format!("{} is only allowed as a statement", name),
                ))
            }
            None => {
                return Err(self.error_at(name_tok, format!("unknown function '{}'", name)))
            }
        };
        let args = self.call_args()?;
        if args.len() != func.arity() {
            return Err(self.error_at(
                name_tok,
                format!(
                    "{} expects {} argument(s), got {}",
                    func.name(),
                    func.arity(),
                    args.len()
                ),
            ));
        }
        Ok(Expr::Builtin { func, args })
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            self.descend(1)?;
            args.push(self.expr()?);
            self.ascend(1);
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect(TokenKind::RParen, "',' or ')'")?;
            return Ok(args);
        }
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
