//! Safe arithmetic formula evaluation
//!
//! Tariff components carry their cost calculation as a small arithmetic
//! expression over named variables. This module parses those expressions
//! into an AST restricted to arithmetic operators and a fixed function
//! whitelist, and evaluates them against a variable context. Anything
//! outside the whitelist is rejected at parse time.

use crate::error::{ObolError, Result};
use std::collections::{BTreeSet, HashMap};

/// Binary arithmetic operators permitted in formulas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Whitelisted formula functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Min,
    Max,
    Round,
    Floor,
    Ceil,
    Abs,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "min" => Some(Function::Min),
            "max" => Some(Function::Max),
            "round" => Some(Function::Round),
            "floor" => Some(Function::Floor),
            "ceil" => Some(Function::Ceil),
            "abs" => Some(Function::Abs),
            _ => None,
        }
    }

    /// Function name as written in formulas
    pub fn name(self) -> &'static str {
        match self {
            Function::Min => "min",
            Function::Max => "max",
            Function::Round => "round",
            Function::Floor => "floor",
            Function::Ceil => "ceil",
            Function::Abs => "abs",
        }
    }

    fn check_arity(self, arg_count: usize) -> Result<()> {
        match self {
            Function::Min | Function::Max => {
                if arg_count < 2 {
                    return Err(ObolError::formula(format!(
                        "function '{}' requires at least two arguments",
                        self.name()
                    )));
                }
            }
            Function::Round | Function::Floor | Function::Ceil | Function::Abs => {
                if arg_count != 1 {
                    return Err(ObolError::formula(format!(
                        "function '{}' takes exactly one argument",
                        self.name()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Parsed formula expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal
    Number(f64),
    /// Named variable resolved at evaluation time
    Variable(String),
    /// Unary negation
    Neg(Box<Expr>),
    /// Binary arithmetic operation
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Whitelisted function call
    Call { function: Function, args: Vec<Expr> },
}

impl Expr {
    /// Parse a formula string into an expression tree
    ///
    /// Rejects any construct outside the permitted grammar: the four
    /// arithmetic operators, unary minus, parentheses, numeric literals,
    /// identifiers, and calls to the whitelisted functions.
    pub fn parse(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_expression()?;
        if parser.pos < parser.tokens.len() {
            return Err(ObolError::formula(format!(
                "unexpected trailing input after position {}",
                parser.pos
            )));
        }
        Ok(expr)
    }

    /// Evaluate the expression against a variable context
    pub fn evaluate(&self, context: &VariableContext) -> Result<f64> {
        match self {
            Expr::Number(value) => Ok(*value),
            Expr::Variable(name) => context.get(name).ok_or_else(|| {
                ObolError::formula(format!("undefined variable '{}'", name))
            }),
            Expr::Neg(inner) => Ok(-inner.evaluate(context)?),
            Expr::Binary { op, left, right } => {
                let lhs = left.evaluate(context)?;
                let rhs = right.evaluate(context)?;
                match op {
                    BinaryOp::Add => Ok(lhs + rhs),
                    BinaryOp::Sub => Ok(lhs - rhs),
                    BinaryOp::Mul => Ok(lhs * rhs),
                    BinaryOp::Div => {
                        if rhs == 0.0 {
                            return Err(ObolError::formula("division by zero"));
                        }
                        Ok(lhs / rhs)
                    }
                }
            }
            Expr::Call { function, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.evaluate(context)?);
                }
                Ok(apply_function(*function, &values))
            }
        }
    }

    /// Collect every variable name referenced by the expression
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Number(_) => {}
            Expr::Variable(name) => {
                names.insert(name.as_str());
            }
            Expr::Neg(inner) => inner.collect_variables(names),
            Expr::Binary { left, right, .. } => {
                left.collect_variables(names);
                right.collect_variables(names);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_variables(names);
                }
            }
        }
    }
}

fn apply_function(function: Function, values: &[f64]) -> f64 {
    match function {
        // Arity is enforced at parse time, so the folds always see input
        Function::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Function::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Function::Round => values[0].round(),
        Function::Floor => values[0].floor(),
        Function::Ceil => values[0].ceil(),
        Function::Abs => values[0].abs(),
    }
}

/// Named variable bindings for formula evaluation
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    values: HashMap<String, f64>,
}

impl VariableContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a variable to a value, replacing any previous binding
    pub fn set<S: Into<String>>(&mut self, name: S, value: f64) {
        self.values.insert(name.into(), value);
    }

    /// Look up a variable by name
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        literal.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = literal.parse::<f64>().map_err(|_| {
                    ObolError::formula(format!("invalid numeric literal '{}'", literal))
                })?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(ObolError::formula(format!(
                    "unsupported character '{}' in formula",
                    other
                )));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token, description: &str) -> Result<()> {
        match self.advance() {
            Some(ref token) if token == expected => Ok(()),
            _ => Err(ObolError::formula(format!("expected {}", description))),
        }
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        let mut expr = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                self.expect(&Token::RParen, "closing ')'")?;
                Ok(expr)
            }
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.advance();
                    let function = Function::from_name(&name).ok_or_else(|| {
                        ObolError::formula(format!("function '{}' is not allowed", name))
                    })?;
                    let args = self.parse_arguments()?;
                    function.check_arity(args.len())?;
                    Ok(Expr::Call { function, args })
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(_) => Err(ObolError::formula("unexpected token in formula")),
            None => Err(ObolError::formula("unexpected end of formula")),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                _ => {
                    return Err(ObolError::formula(
                        "expected ',' or ')' in function arguments",
                    ));
                }
            }
        }
        Ok(args)
    }
}
