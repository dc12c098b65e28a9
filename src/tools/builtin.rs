//! Built-in tools.
//!
//! [`Calculator`] evaluates arithmetic with its own parser; model input is
//! never handed to an evaluator.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{ColloquyError, Result};
use crate::tools::arguments::ToolArguments;
use crate::tools::tool::{Tool, ToolContext};
use crate::tools::types::ToolParameters;

const NAME: &str = "calculator";
const MAX_DEPTH: usize = 64;

/// Arithmetic over `+ - * / % ^`, parentheses and unary minus.
#[derive(Debug, Clone)]
pub struct Calculator {
    parameters: ToolParameters,
}

impl Calculator {
    pub fn new() -> Self {
        Self {
            parameters: ToolParameters::object()
                .string("expression", "Arithmetic expression, e.g. (2 + 3) * 4", true)
                .build(),
        }
    }
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for Calculator {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression and return the numeric result"
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn execute(&self, args: &ToolArguments, _ctx: &ToolContext) -> Result<Value> {
        let value = evaluate(args.get_str("expression")?)?;
        Ok(json!(format_number(value)))
    }
}

/// Evaluate an expression.
pub fn evaluate(input: &str) -> Result<f64> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    let value = parser.expression()?;
    if let Some(token) = parser.peek() {
        return Err(fail(format!("unexpected {token:?} at position {}", parser.pos)));
    }
    if !value.is_finite() {
        return Err(fail("result is not a finite number"));
    }
    Ok(value)
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn fail(message: impl Into<String>) -> ColloquyError {
    ColloquyError::tool_execution(NAME, message)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Op(char),
    Open,
    Close,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let literal = &input[start..end];
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| fail(format!("invalid number '{literal}'")))?;
                tokens.push(Token::Num(value));
            }
            '+' | '-' | '*' | '/' | '%' | '^' => {
                tokens.push(Token::Op(c));
                chars.next();
            }
            '(' => {
                tokens.push(Token::Open);
                chars.next();
            }
            ')' => {
                tokens.push(Token::Close);
                chars.next();
            }
            other => return Err(fail(format!("unexpected character '{other}'"))),
        }
    }
    if tokens.is_empty() {
        return Err(fail("empty expression"));
    }
    Ok(tokens)
}

// expression := term (('+' | '-') term)*
// term       := unary (('*' | '/' | '%') unary)*
// unary      := '-' unary | power
// power      := atom ('^' unary)?
// atom       := number | '(' expression ')'
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn expression(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = match op {
                '*' => value * rhs,
                _ if rhs == 0.0 => return Err(fail("division by zero")),
                '/' => value / rhs,
                _ => value % rhs,
            };
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(fail("expression is nested too deeply"));
        }
        let value = if let Some(Token::Op('-')) = self.peek() {
            self.pos += 1;
            self.unary().map(|v| -v)
        } else {
            self.power()
        };
        self.depth -= 1;
        value
    }

    fn power(&mut self) -> Result<f64> {
        let base = self.atom()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            // Right-associative: 2^3^2 = 2^9.
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64> {
        match self.next() {
            Some(Token::Num(value)) => Ok(value),
            Some(Token::Open) => {
                let value = self.expression()?;
                match self.next() {
                    Some(Token::Close) => Ok(value),
                    _ => Err(fail("missing closing parenthesis")),
                }
            }
            Some(token) => Err(fail(format!("unexpected {token:?}"))),
            None => Err(fail("unexpected end of expression")),
        }
    }
}
