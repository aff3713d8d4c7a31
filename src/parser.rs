// File: src/parser.rs
//
// Pratt (precedence-climbing) recursive-descent parser turning the token
// stream into the `ast::Program` the compiler consumes. This module sits
// outside the compile-and-execute core: grounded in the reference
// implementation's parser but otherwise an ordinary hand-rolled parser,
// not a component the compile-and-execute core describes operation-by-operation.

use crate::ast::{Block, Expr, Program, Statement};
use crate::token::Token;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
    Index,
}

fn precedence_of(tok: &Token) -> Precedence {
    match tok {
        Token::Eq | Token::NotEq => Precedence::Equals,
        Token::Lt | Token::Gt => Precedence::LessGreater,
        Token::Plus | Token::Minus => Precedence::Sum,
        Token::Slash | Token::Asterisk => Precedence::Product,
        Token::Lparen => Precedence::Call,
        Token::Lbracket => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn cur(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        if self.cur() == expected {
            self.advance();
            Ok(())
        } else {
            Err(ParseError(format!("expected {expected:?}, got {:?}", self.cur())))
        }
    }

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut statements = Vec::new();
        while *self.cur() != Token::Eof {
            statements.push(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.expect(&Token::Lbrace)?;
        let mut statements = Vec::new();
        while *self.cur() != Token::Rbrace && *self.cur() != Token::Eof {
            statements.push(self.parse_statement()?);
        }
        self.expect(&Token::Rbrace)?;
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        match self.cur() {
            Token::Let => self.parse_let_statement(),
            Token::Return => self.parse_return_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_let_statement(&mut self) -> Result<Statement, ParseError> {
        self.advance(); // `let`
        let name = match self.advance() {
            Token::Ident(name) => name,
            other => return Err(ParseError(format!("expected identifier after let, got {other:?}"))),
        };
        self.expect(&Token::Assign)?;
        let value = self.parse_expression(Precedence::Lowest)?;
        if *self.cur() == Token::Semicolon {
            self.advance();
        }
        Ok(Statement::Let { name, value })
    }

    fn parse_return_statement(&mut self) -> Result<Statement, ParseError> {
        self.advance(); // `return`
        if *self.cur() == Token::Semicolon {
            self.advance();
            return Ok(Statement::Return(None));
        }
        let value = self.parse_expression(Precedence::Lowest)?;
        if *self.cur() == Token::Semicolon {
            self.advance();
        }
        Ok(Statement::Return(Some(value)))
    }

    fn parse_expression_statement(&mut self) -> Result<Statement, ParseError> {
        let expr = self.parse_expression(Precedence::Lowest)?;
        if *self.cur() == Token::Semicolon {
            self.advance();
        }
        Ok(Statement::Expr(expr))
    }

    fn parse_expression(&mut self, precedence: Precedence) -> Result<Expr, ParseError> {
        let mut left = self.parse_prefix()?;

        while *self.cur() != Token::Semicolon && precedence < precedence_of(self.cur()) {
            left = self.parse_infix(left)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        match self.cur().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(Expr::Ident(name))
            }
            Token::Int(value) => {
                self.advance();
                Ok(Expr::IntegerLiteral(value))
            }
            Token::Str(value) => {
                self.advance();
                Ok(Expr::StringLiteral(value))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Boolean(true))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Boolean(false))
            }
            Token::Bang => {
                self.advance();
                let right = self.parse_expression(Precedence::Prefix)?;
                Ok(Expr::Prefix { op: "!".to_string(), right: Box::new(right) })
            }
            Token::Minus => {
                self.advance();
                let right = self.parse_expression(Precedence::Prefix)?;
                Ok(Expr::Prefix { op: "-".to_string(), right: Box::new(right) })
            }
            Token::Lparen => {
                self.advance();
                let expr = self.parse_expression(Precedence::Lowest)?;
                self.expect(&Token::Rparen)?;
                Ok(expr)
            }
            Token::If => self.parse_if_expression(),
            Token::Function => self.parse_function_literal(),
            Token::Lbracket => {
                self.advance();
                let elements = self.parse_expression_list(&Token::Rbracket)?;
                Ok(Expr::ArrayLiteral(elements))
            }
            Token::Lbrace => self.parse_hash_literal(),
            other => Err(ParseError(format!("no prefix parse function for {other:?}"))),
        }
    }

    fn parse_infix(&mut self, left: Expr) -> Result<Expr, ParseError> {
        match self.cur().clone() {
            Token::Plus | Token::Minus | Token::Slash | Token::Asterisk | Token::Eq | Token::NotEq | Token::Lt
            | Token::Gt => {
                let op = match self.advance() {
                    Token::Plus => "+",
                    Token::Minus => "-",
                    Token::Slash => "/",
                    Token::Asterisk => "*",
                    Token::Eq => "==",
                    Token::NotEq => "!=",
                    Token::Lt => "<",
                    Token::Gt => ">",
                    _ => unreachable!(),
                }
                .to_string();
                let precedence = precedence_of(&self.tokens[self.pos - 1]);
                let right = self.parse_expression(precedence)?;
                Ok(Expr::Infix { op, left: Box::new(left), right: Box::new(right) })
            }
            Token::Lparen => {
                self.advance();
                let args = self.parse_expression_list(&Token::Rparen)?;
                Ok(Expr::Call { func: Box::new(left), args })
            }
            Token::Lbracket => {
                self.advance();
                let index = self.parse_expression(Precedence::Lowest)?;
                self.expect(&Token::Rbracket)?;
                Ok(Expr::Index { left: Box::new(left), index: Box::new(index) })
            }
            other => Err(ParseError(format!("no infix parse function for {other:?}"))),
        }
    }

    fn parse_if_expression(&mut self) -> Result<Expr, ParseError> {
        self.advance(); // `if`
        self.expect(&Token::Lparen)?;
        let cond = self.parse_expression(Precedence::Lowest)?;
        self.expect(&Token::Rparen)?;
        let cons = self.parse_block()?;

        let alt = if *self.cur() == Token::Else {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(Expr::If { cond: Box::new(cond), cons, alt })
    }

    fn parse_function_literal(&mut self) -> Result<Expr, ParseError> {
        self.advance(); // `fn`
        self.expect(&Token::Lparen)?;
        let params = self.parse_function_params()?;
        let body = self.parse_block()?;
        Ok(Expr::FunctionLiteral { params, body })
    }

    fn parse_function_params(&mut self) -> Result<Vec<String>, ParseError> {
        let mut params = Vec::new();
        if *self.cur() == Token::Rparen {
            self.advance();
            return Ok(params);
        }

        match self.advance() {
            Token::Ident(name) => params.push(name),
            other => return Err(ParseError(format!("expected parameter name, got {other:?}"))),
        }

        while *self.cur() == Token::Comma {
            self.advance();
            match self.advance() {
                Token::Ident(name) => params.push(name),
                other => return Err(ParseError(format!("expected parameter name, got {other:?}"))),
            }
        }

        self.expect(&Token::Rparen)?;
        Ok(params)
    }

    fn parse_expression_list(&mut self, end: &Token) -> Result<Vec<Expr>, ParseError> {
        let mut list = Vec::new();
        if self.cur() == end {
            self.advance();
            return Ok(list);
        }

        list.push(self.parse_expression(Precedence::Lowest)?);
        while *self.cur() == Token::Comma {
            self.advance();
            list.push(self.parse_expression(Precedence::Lowest)?);
        }

        self.expect(end)?;
        Ok(list)
    }

    fn parse_hash_literal(&mut self) -> Result<Expr, ParseError> {
        self.advance(); // `{`
        let mut pairs = Vec::new();

        while *self.cur() != Token::Rbrace {
            let key = self.parse_expression(Precedence::Lowest)?;
            self.expect(&Token::Colon)?;
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));

            if *self.cur() != Token::Rbrace {
                self.expect(&Token::Comma)?;
            }
        }

        self.expect(&Token::Rbrace)?;
        Ok(Expr::HashLiteral(pairs))
    }
}
