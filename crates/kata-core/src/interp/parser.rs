//! Recursive-descent parser for the snippet language.
//!
//! Produces a [`Program`] or a [`ParseError`]; all parse failures surface to
//! users as syntax errors. Statement-level analysis (duplicate definitions,
//! nested functions) happens afterwards in the evaluator's check pass.

use crate::interp::ast::{BinOp, Block, Expr, FnDef, Program, Stmt, UnaryOp};
use crate::interp::lexer::{tokenize, LexError, Spanned, Token};
use crate::interp::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError {
            message: err.message,
            line: err.line,
        }
    }
}

/// Cap on expression nesting. Parsing recurses once per level, so without a
/// cap a long run of `(` or `not` overflows the stack and takes the process
/// down instead of returning a syntax error.
const MAX_NESTING_DEPTH: usize = 256;

pub fn parse(source: &str) -> Result<Program, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    parser.parse_program()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    fn line(&self) -> u32 {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, context: &str) -> Result<(), ParseError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error_here(&format!(
                "expected `{}` {}, found {}",
                expected,
                context,
                self.describe_current()
            )))
        }
    }

    fn describe_current(&self) -> String {
        match self.peek() {
            Some(token) => format!("`{}`", token),
            None => "end of input".to_string(),
        }
    }

    fn error_here(&self, message: &str) -> ParseError {
        ParseError {
            message: message.to_string(),
            line: self.line(),
        }
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Token::Newline) {}
    }

    /// Enter one level of expression nesting. Callers that recurse must pair
    /// this with a decrement on their success path; a failed parse aborts
    /// outright, so unwinding the counter there is unnecessary.
    fn descend(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            Err(self.error_here("expression nesting is too deep"))
        } else {
            Ok(())
        }
    }

    fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut stmts = Vec::new();
        self.skip_newlines();
        while self.peek().is_some() {
            stmts.push(self.parse_stmt()?);
            match self.peek() {
                Some(Token::Newline) => self.skip_newlines(),
                None => break,
                _ => {
                    return Err(self.error_here(&format!(
                        "unexpected {} after statement",
                        self.describe_current()
                    )))
                }
            }
        }
        Ok(Program { stmts })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek() {
            Some(Token::Let) => {
                self.advance();
                let name = self.parse_ident("after `let`")?;
                self.expect(&Token::Assign, "in `let` binding")?;
                let expr = self.parse_expr()?;
                Ok(Stmt::Let { name, expr })
            }
            Some(Token::Fn) => {
                let line = self.line();
                self.advance();
                let name = self.parse_ident("after `fn`")?;
                self.expect(&Token::LParen, "after function name")?;
                let mut params = Vec::new();
                self.skip_newlines();
                if !self.eat(&Token::RParen) {
                    loop {
                        params.push(self.parse_ident("in parameter list")?);
                        self.skip_newlines();
                        if self.eat(&Token::Comma) {
                            self.skip_newlines();
                            continue;
                        }
                        self.expect(&Token::RParen, "to close parameter list")?;
                        break;
                    }
                }
                let body = self.parse_block("function body")?;
                Ok(Stmt::FnDef(FnDef {
                    name,
                    params,
                    body,
                    line,
                }))
            }
            Some(Token::Ident(_)) if self.peek_at(1) == Some(&Token::Assign) => {
                let name = self.parse_ident("in assignment")?;
                self.advance(); // `=`
                let expr = self.parse_expr()?;
                Ok(Stmt::Assign { name, expr })
            }
            _ => Ok(Stmt::Expr(self.parse_expr()?)),
        }
    }

    fn parse_ident(&mut self, context: &str) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error_here(&format!(
                "expected a name {}, found {}",
                context,
                self.describe_current()
            ))),
        }
    }

    fn parse_block(&mut self, context: &str) -> Result<Block, ParseError> {
        self.skip_newlines();
        self.expect(&Token::LBrace, &format!("to open {}", context))?;
        let mut stmts = Vec::new();
        self.skip_newlines();
        while self.peek().is_some() && self.peek() != Some(&Token::RBrace) {
            stmts.push(self.parse_stmt()?);
            match self.peek() {
                Some(Token::Newline) => self.skip_newlines(),
                Some(Token::RBrace) | None => break,
                _ => {
                    return Err(self.error_here(&format!(
                        "unexpected {} after statement",
                        self.describe_current()
                    )))
                }
            }
        }
        self.expect(&Token::RBrace, &format!("to close {}", context))?;
        Ok(Block(stmts))
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.descend()?;
        let expr = self.parse_or()?;
        self.depth -= 1;
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_not()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_not()?;
            lhs = Expr::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Not) {
            self.descend()?;
            let expr = self.parse_not()?;
            self.depth -= 1;
            Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            })
        } else {
            self.parse_equality()
        }
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinOp::Eq,
                Some(Token::NotEq) => BinOp::NotEq,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinOp::Lt,
                Some(Token::Le) => BinOp::Le,
                Some(Token::Gt) => BinOp::Gt,
                Some(Token::Ge) => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Rem,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Minus) {
            self.descend()?;
            let expr = self.parse_unary()?;
            self.depth -= 1;
            Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(expr),
            })
        } else {
            self.parse_primary()
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek().cloned() {
            Some(Token::Int(n)) => {
                self.advance();
                Ok(Expr::Literal(Value::Int(n)))
            }
            Some(Token::Float(x)) => {
                self.advance();
                Ok(Expr::Literal(Value::Float(x)))
            }
            Some(Token::Str(s)) => {
                self.advance();
                Ok(Expr::Literal(Value::Text(s)))
            }
            Some(Token::True) => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(true)))
            }
            Some(Token::False) => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(false)))
            }
            Some(Token::Nil) => {
                self.advance();
                Ok(Expr::Literal(Value::Nil))
            }
            Some(Token::Ident(name)) => {
                self.advance();
                if self.peek() == Some(&Token::LParen) {
                    self.advance();
                    let args = self.parse_call_args()?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some(Token::If) => self.parse_if(),
            Some(Token::While) => {
                self.advance();
                let cond = self.parse_expr()?;
                let body = self.parse_block("`while` body")?;
                Ok(Expr::While {
                    cond: Box::new(cond),
                    body,
                })
            }
            Some(Token::LParen) => {
                self.advance();
                self.skip_newlines();
                let first = self.parse_expr()?;
                self.skip_newlines();
                if self.eat(&Token::Comma) {
                    let mut items = vec![first];
                    self.skip_newlines();
                    while self.peek() != Some(&Token::RParen) {
                        items.push(self.parse_expr()?);
                        self.skip_newlines();
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                        self.skip_newlines();
                    }
                    self.expect(&Token::RParen, "to close tuple")?;
                    Ok(Expr::TupleLit(items))
                } else {
                    self.expect(&Token::RParen, "to close parenthesized expression")?;
                    Ok(first)
                }
            }
            Some(Token::LBracket) => {
                self.advance();
                self.skip_newlines();
                let mut items = Vec::new();
                while self.peek() != Some(&Token::RBracket) {
                    items.push(self.parse_expr()?);
                    self.skip_newlines();
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                    self.skip_newlines();
                }
                self.expect(&Token::RBracket, "to close list")?;
                Ok(Expr::ListLit(items))
            }
            Some(Token::LBrace) => {
                self.advance();
                self.skip_newlines();
                let mut entries = Vec::new();
                while self.peek() != Some(&Token::RBrace) {
                    let key = match self.peek().cloned() {
                        Some(Token::Str(key)) => {
                            self.advance();
                            key
                        }
                        _ => {
                            return Err(self.error_here(&format!(
                                "map keys must be string literals, found {}",
                                self.describe_current()
                            )))
                        }
                    };
                    self.expect(&Token::Colon, "after map key")?;
                    let value = self.parse_expr()?;
                    entries.push((key, value));
                    self.skip_newlines();
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                    self.skip_newlines();
                }
                self.expect(&Token::RBrace, "to close map")?;
                Ok(Expr::MapLit(entries))
            }
            _ => Err(self.error_here(&format!(
                "expected an expression, found {}",
                self.describe_current()
            ))),
        }
    }

    fn parse_if(&mut self) -> Result<Expr, ParseError> {
        self.expect(&Token::If, "at start of conditional")?;
        let cond = self.parse_expr()?;
        let then_block = self.parse_block("`if` body")?;
        let else_block = if self.eat(&Token::Else) {
            if self.peek() == Some(&Token::If) {
                // `else if` chains desugar into a nested conditional block.
                self.descend()?;
                let nested = self.parse_if()?;
                self.depth -= 1;
                Some(Block(vec![Stmt::Expr(nested)]))
            } else {
                Some(self.parse_block("`else` body")?)
            }
        } else {
            None
        };
        Ok(Expr::If {
            cond: Box::new(cond),
            then_block,
            else_block,
        })
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        self.skip_newlines();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            self.skip_newlines();
            if self.eat(&Token::Comma) {
                self.skip_newlines();
                continue;
            }
            self.expect(&Token::RParen, "to close call arguments")?;
            break;
        }
        Ok(args)
    }
}
