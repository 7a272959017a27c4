//! Lexer and recursive-descent parser for expression strings.
//!
//! Turns the `ConditionExpression`, `KeyConditionExpression`,
//! `FilterExpression`, `UpdateExpression` and `ProjectionExpression`
//! parameters of a wire request back into typed trees, substituting
//! `#name` and `:value` placeholders on the way. Only top-level attribute
//! paths are supported. Keywords and function names are matched
//! case-insensitively.

use std::collections::HashMap;
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use dynamock_model::AttributeValue;

use super::{Expression, Operator};
use crate::update::{UpdateDirective, Updates};

/// Errors produced while parsing an expression string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    /// An unexpected token was encountered.
    #[error("Unexpected token: expected {expected}, found {found}")]
    UnexpectedToken {
        /// What was expected.
        expected: String,
        /// What was found.
        found: String,
    },
    /// An expression attribute name placeholder could not be resolved.
    #[error("Unresolved expression attribute name: #{name}")]
    UnresolvedName {
        /// The unresolved name reference.
        name: String,
    },
    /// An expression attribute value placeholder could not be resolved.
    #[error("Unresolved expression attribute value: :{name}")]
    UnresolvedValue {
        /// The unresolved value reference.
        name: String,
    },
    /// The expression uses syntax the engine does not evaluate.
    #[error("Unsupported expression syntax: {feature}")]
    Unsupported {
        /// The unsupported construct.
        feature: String,
    },
    /// An update expression touches the same attribute twice.
    #[error("Two document paths overlap with each other: {path}")]
    OverlappingPaths {
        /// The attribute named twice.
        path: String,
    },
    /// The expression string was empty.
    #[error("Invalid {kind}: The expression can not be empty")]
    Empty {
        /// Which parameter was empty.
        kind: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Identifier(String),
    NameRef(String),
    ValueRef(String),
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Comma,
    LParen,
    RParen,
    Dot,
    LBracket,
    Plus,
    Minus,
    And,
    Or,
    Not,
    Between,
    In,
    Set,
    Remove,
    Add,
    Delete,
    AttributeExists,
    AttributeNotExists,
    BeginsWith,
    Contains,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(s) => write!(f, "identifier '{s}'"),
            Self::NameRef(s) => write!(f, "#{s}"),
            Self::ValueRef(s) => write!(f, ":{s}"),
            Self::Eq => write!(f, "'='"),
            Self::Ne => write!(f, "'<>'"),
            Self::Lt => write!(f, "'<'"),
            Self::Le => write!(f, "'<='"),
            Self::Gt => write!(f, "'>'"),
            Self::Ge => write!(f, "'>='"),
            Self::Comma => write!(f, "','"),
            Self::LParen => write!(f, "'('"),
            Self::RParen => write!(f, "')'"),
            Self::Dot => write!(f, "'.'"),
            Self::LBracket => write!(f, "'['"),
            Self::Plus => write!(f, "'+'"),
            Self::Minus => write!(f, "'-'"),
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
            Self::Not => write!(f, "NOT"),
            Self::Between => write!(f, "BETWEEN"),
            Self::In => write!(f, "IN"),
            Self::Set => write!(f, "SET"),
            Self::Remove => write!(f, "REMOVE"),
            Self::Add => write!(f, "ADD"),
            Self::Delete => write!(f, "DELETE"),
            Self::AttributeExists => write!(f, "attribute_exists"),
            Self::AttributeNotExists => write!(f, "attribute_not_exists"),
            Self::BeginsWith => write!(f, "begins_with"),
            Self::Contains => write!(f, "contains"),
            Self::Eof => write!(f, "EOF"),
        }
    }
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, ExpressionError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok == Token::Eof;
            tokens.push(tok);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn single(&mut self, tok: Token) -> Token {
        self.chars.next();
        tok
    }

    fn next_token(&mut self) -> Result<Token, ExpressionError> {
        while self.chars.peek().is_some_and(char::is_ascii_whitespace) {
            self.chars.next();
        }
        let Some(&ch) = self.chars.peek() else {
            return Ok(Token::Eof);
        };

        Ok(match ch {
            '#' => {
                self.chars.next();
                Token::NameRef(self.read_placeholder("#")?)
            }
            ':' => {
                self.chars.next();
                Token::ValueRef(self.read_placeholder(":")?)
            }
            '=' => self.single(Token::Eq),
            '<' => {
                self.chars.next();
                match self.chars.peek() {
                    Some('=') => self.single(Token::Le),
                    Some('>') => self.single(Token::Ne),
                    _ => Token::Lt,
                }
            }
            '>' => {
                self.chars.next();
                if self.chars.peek() == Some(&'=') {
                    self.single(Token::Ge)
                } else {
                    Token::Gt
                }
            }
            ',' => self.single(Token::Comma),
            '(' => self.single(Token::LParen),
            ')' => self.single(Token::RParen),
            '.' => self.single(Token::Dot),
            '[' => self.single(Token::LBracket),
            '+' => self.single(Token::Plus),
            '-' => self.single(Token::Minus),
            c if c.is_ascii_alphabetic() || c == '_' => self.read_word(),
            other => {
                return Err(ExpressionError::UnexpectedToken {
                    expected: "valid token".to_owned(),
                    found: format!("'{other}'"),
                });
            }
        })
    }

    fn read_ident_chars(&mut self) -> String {
        let mut s = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                s.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        s
    }

    fn read_placeholder(&mut self, sigil: &str) -> Result<String, ExpressionError> {
        let name = self.read_ident_chars();
        if name.is_empty() {
            return Err(ExpressionError::UnexpectedToken {
                expected: format!("name after '{sigil}'"),
                found: "empty".to_owned(),
            });
        }
        Ok(name)
    }

    fn read_word(&mut self) -> Token {
        let word = self.read_ident_chars();
        match word.to_ascii_lowercase().as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "between" => Token::Between,
            "in" => Token::In,
            "set" => Token::Set,
            "remove" => Token::Remove,
            "add" => Token::Add,
            "delete" => Token::Delete,
            "attribute_exists" => Token::AttributeExists,
            "attribute_not_exists" => Token::AttributeNotExists,
            "begins_with" => Token::BeginsWith,
            "contains" => Token::Contains,
            _ => Token::Identifier(word),
        }
    }
}

/// An operand before placeholder kinds are checked against their position.
enum Operand {
    Path(String),
    Value(AttributeValue),
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    names: &'a HashMap<String, String>,
    values: &'a HashMap<String, AttributeValue>,
}

impl<'a> Parser<'a> {
    fn new(
        input: &str,
        names: &'a HashMap<String, String>,
        values: &'a HashMap<String, AttributeValue>,
    ) -> Result<Self, ExpressionError> {
        Ok(Self {
            tokens: Lexer::new(input).tokenize()?,
            pos: 0,
            names,
            values,
        })
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExpressionError> {
        let tok = self.advance();
        if &tok == expected {
            Ok(())
        } else {
            Err(unexpected(&expected.to_string(), &tok))
        }
    }

    fn expect_end(&mut self) -> Result<(), ExpressionError> {
        match self.peek() {
            Token::Eof => Ok(()),
            other => Err(unexpected("end of expression", other)),
        }
    }
}

fn unexpected(expected: &str, found: &Token) -> ExpressionError {
    ExpressionError::UnexpectedToken {
        expected: expected.to_owned(),
        found: found.to_string(),
    }
}

fn unsupported(feature: &str) -> ExpressionError {
    ExpressionError::Unsupported {
        feature: feature.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

impl Parser<'_> {
    fn parse_or(&mut self) -> Result<Expression, ExpressionError> {
        let mut children = vec![self.parse_and()?];
        while matches!(self.peek(), Token::Or) {
            self.advance();
            children.push(self.parse_and()?);
        }
        Ok(flatten(Operator::Or, children))
    }

    fn parse_and(&mut self) -> Result<Expression, ExpressionError> {
        let mut children = vec![self.parse_not()?];
        while matches!(self.peek(), Token::And) {
            self.advance();
            children.push(self.parse_not()?);
        }
        Ok(flatten(Operator::And, children))
    }

    fn parse_not(&mut self) -> Result<Expression, ExpressionError> {
        if matches!(self.peek(), Token::Not) {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Expression::negate(inner));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression, ExpressionError> {
        match self.peek() {
            Token::LParen => {
                self.advance();
                let expr = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Token::AttributeExists => {
                let name = self.parse_unary_function()?;
                Ok(Expression::not_null(name))
            }
            Token::AttributeNotExists => {
                let name = self.parse_unary_function()?;
                Ok(Expression::null(name))
            }
            Token::BeginsWith => {
                let (name, value) = self.parse_binary_function()?;
                Ok(Expression::begins_with(name, value))
            }
            Token::Contains => {
                let (name, value) = self.parse_binary_function()?;
                Ok(Expression::contains(name, value))
            }
            _ => {
                let left = self.parse_operand()?;
                self.parse_postfix(left)
            }
        }
    }

    fn parse_unary_function(&mut self) -> Result<String, ExpressionError> {
        self.advance();
        self.expect(&Token::LParen)?;
        let name = self.parse_path()?;
        self.expect(&Token::RParen)?;
        Ok(name)
    }

    fn parse_binary_function(&mut self) -> Result<(String, AttributeValue), ExpressionError> {
        self.advance();
        self.expect(&Token::LParen)?;
        let name = self.parse_path()?;
        self.expect(&Token::Comma)?;
        let value = self.parse_value()?;
        self.expect(&Token::RParen)?;
        Ok((name, value))
    }

    fn parse_postfix(&mut self, left: Operand) -> Result<Expression, ExpressionError> {
        let op = match self.peek() {
            Token::Eq => Operator::Eq,
            Token::Ne => Operator::Ne,
            Token::Lt => Operator::Lt,
            Token::Le => Operator::Le,
            Token::Gt => Operator::Gt,
            Token::Ge => Operator::Ge,
            Token::Between => {
                self.advance();
                let name = into_path(left)?;
                let low = self.parse_value()?;
                self.expect(&Token::And)?;
                let high = self.parse_value()?;
                return Ok(Expression::between(name, low, high));
            }
            Token::In => {
                self.advance();
                let name = into_path(left)?;
                self.expect(&Token::LParen)?;
                let mut list = vec![self.parse_value()?];
                while matches!(self.peek(), Token::Comma) {
                    self.advance();
                    list.push(self.parse_value()?);
                }
                self.expect(&Token::RParen)?;
                return Ok(Expression::is_in(name, list));
            }
            other => return Err(unexpected("comparison operator, BETWEEN, or IN", other)),
        };
        self.advance();
        let right = self.parse_operand()?;

        let (op, name, value) = match (left, right) {
            (Operand::Path(name), Operand::Value(value)) => (op, name, value),
            (Operand::Value(value), Operand::Path(name)) => (mirror(op), name, value),
            _ => return Err(unsupported("comparisons must pair one attribute with one value")),
        };
        Ok(Expression::Operator {
            op,
            children: vec![Expression::Attribute(name), Expression::Literal(value)],
        })
    }

    fn parse_operand(&mut self) -> Result<Operand, ExpressionError> {
        if matches!(self.peek(), Token::ValueRef(_)) {
            return self.parse_value().map(Operand::Value);
        }
        self.parse_path().map(Operand::Path)
    }

    fn parse_value(&mut self) -> Result<AttributeValue, ExpressionError> {
        match self.advance() {
            Token::ValueRef(name) => self
                .values
                .get(&format!(":{name}"))
                .cloned()
                .ok_or(ExpressionError::UnresolvedValue { name }),
            other => Err(unexpected("expression attribute value", &other)),
        }
    }

    fn parse_path(&mut self) -> Result<String, ExpressionError> {
        let name = match self.advance() {
            Token::Identifier(name) => name,
            Token::NameRef(name) => self
                .names
                .get(&format!("#{name}"))
                .cloned()
                .ok_or(ExpressionError::UnresolvedName { name })?,
            other => return Err(unexpected("attribute name or #name", &other)),
        };
        match self.peek() {
            Token::Dot | Token::LBracket => Err(unsupported("nested attribute paths")),
            Token::LParen => Err(unsupported(&format!("function {name}"))),
            _ => Ok(name),
        }
    }
}

fn into_path(operand: Operand) -> Result<String, ExpressionError> {
    match operand {
        Operand::Path(name) => Ok(name),
        Operand::Value(_) => Err(unsupported("a value on the left of BETWEEN or IN")),
    }
}

fn mirror(op: Operator) -> Operator {
    match op {
        Operator::Lt => Operator::Gt,
        Operator::Le => Operator::Ge,
        Operator::Gt => Operator::Lt,
        Operator::Ge => Operator::Le,
        other => other,
    }
}

fn flatten(op: Operator, mut children: Vec<Expression>) -> Expression {
    if children.len() == 1 {
        return children.swap_remove(0);
    }
    Expression::Operator { op, children }
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

impl Parser<'_> {
    fn parse_update(&mut self) -> Result<Updates, ExpressionError> {
        let mut updates = Updates::new();
        while !matches!(self.peek(), Token::Eof) {
            let action = self.advance();
            loop {
                let (name, directive) = match action {
                    Token::Set => self.parse_set_action()?,
                    Token::Add => {
                        let name = self.parse_path()?;
                        (name, UpdateDirective::Increment(self.parse_value()?))
                    }
                    Token::Delete => {
                        let name = self.parse_path()?;
                        (name, UpdateDirective::Delete(Some(self.parse_value()?)))
                    }
                    Token::Remove => (self.parse_path()?, UpdateDirective::Delete(None)),
                    ref other => return Err(unexpected("SET, REMOVE, ADD, or DELETE", other)),
                };
                if updates.contains(&name) {
                    return Err(ExpressionError::OverlappingPaths { path: name });
                }
                updates.set(name, directive);

                if matches!(self.peek(), Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        Ok(updates)
    }

    fn parse_set_action(&mut self) -> Result<(String, UpdateDirective), ExpressionError> {
        let name = self.parse_path()?;
        self.expect(&Token::Eq)?;
        match self.peek() {
            Token::ValueRef(_) => {}
            Token::Identifier(ident) => {
                return Err(unsupported(&format!("SET right-hand side {ident}")));
            }
            other => return Err(unexpected("expression attribute value", other)),
        }
        let value = self.parse_value()?;
        if matches!(self.peek(), Token::Plus | Token::Minus) {
            return Err(unsupported("arithmetic in SET"));
        }
        Ok((name, UpdateDirective::Put(value)))
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Parses a condition, filter or key condition expression.
///
/// # Errors
///
/// Returns an `ExpressionError` on a syntax error, an unresolved placeholder
/// or unsupported syntax.
pub fn parse_condition(
    input: &str,
    names: &HashMap<String, String>,
    values: &HashMap<String, AttributeValue>,
) -> Result<Expression, ExpressionError> {
    if input.trim().is_empty() {
        return Err(ExpressionError::Empty {
            kind: "ConditionExpression",
        });
    }
    let mut parser = Parser::new(input, names, values)?;
    let expr = parser.parse_or()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parses an update expression into ordered update directives.
///
/// # Errors
///
/// Returns an `ExpressionError` on a syntax error, an unresolved placeholder,
/// a path named twice or unsupported syntax.
pub fn parse_update(
    input: &str,
    names: &HashMap<String, String>,
    values: &HashMap<String, AttributeValue>,
) -> Result<Updates, ExpressionError> {
    if input.trim().is_empty() {
        return Err(ExpressionError::Empty {
            kind: "UpdateExpression",
        });
    }
    Parser::new(input, names, values)?.parse_update()
}

/// Parses a projection expression into attribute names.
///
/// # Errors
///
/// Returns an `ExpressionError` on a syntax error or an unresolved name.
pub fn parse_projection(
    input: &str,
    names: &HashMap<String, String>,
) -> Result<Vec<String>, ExpressionError> {
    if input.trim().is_empty() {
        return Err(ExpressionError::Empty {
            kind: "ProjectionExpression",
        });
    }
    let values = HashMap::new();
    let mut parser = Parser::new(input, names, &values)?;
    let mut out = vec![parser.parse_path()?];
    while matches!(parser.peek(), Token::Comma) {
        parser.advance();
        out.push(parser.parse_path()?);
    }
    parser.expect_end()?;
    Ok(out)
}
