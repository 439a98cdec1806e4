//! Safe calculator tool: a recursive-descent expression evaluator.
//!
//! Only binary `+ - * / % **`, unary `+ -`, numeric literals and parentheses
//! are accepted. There is no name lookup, no call syntax, no attribute
//! access; anything else is a parse error. `**` binds tighter than unary
//! minus and associates right, so `-2**2 == -4`.

use async_trait::async_trait;
use serde_json::json;

use super::{Tool, ToolSourceError, ToolSpec};

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "calculator".to_string(),
            description: Some(
                "Perform mathematical calculations. Use for taxes, fees, currency conversions, \
                 or any numerical computation."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "expression": {
                        "type": "string",
                        "description": "Math expression (e.g. '1000 * 0.22' or '15000000 / 15500')"
                    }
                },
                "required": ["expression"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value) -> Result<String, ToolSourceError> {
        let expression = args
            .get("expression")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolSourceError::InvalidArguments("expression is required".into()))?;

        match evaluate(expression) {
            Ok(value) => Ok(format!("Result: {}", format_number(value))),
            Err(e) => Ok(format!("Calculation error: {e}")),
        }
    }
}

/// Evaluates a whitelisted arithmetic expression.
pub fn evaluate(expression: &str) -> Result<f64, String> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("unexpected token at position {}", parser.pos));
    }
    Ok(value)
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        let int = value as i64;
        let mut digits = int.abs().to_string();
        let mut grouped = String::new();
        while digits.len() > 3 {
            let split = digits.len() - 3;
            grouped = format!(",{}{}", &digits[split..], grouped);
            digits.truncate(split);
        }
        let sign = if int < 0 { "-" } else { "" };
        format!("{sign}{digits}{grouped}")
    } else {
        format!("{:.2}", value)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    DoubleStar,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::DoubleStar);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.' || chars[i] == '_')
                {
                    i += 1;
                }
                let raw: String = chars[start..i].iter().filter(|c| **c != '_').collect();
                let value = raw
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number: {raw}"))?;
                tokens.push(Token::Number(value));
            }
            other => return Err(format!("character not allowed: {other}")),
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
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut left = self.term()?;
        while let Some(op) = self.peek().cloned() {
            match op {
                Token::Plus => {
                    self.advance();
                    left += self.term()?;
                }
                Token::Minus => {
                    self.advance();
                    left -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut left = self.unary()?;
        while let Some(op) = self.peek().cloned() {
            match op {
                Token::Star => {
                    self.advance();
                    left *= self.unary()?;
                }
                Token::Slash => {
                    self.advance();
                    let rhs = self.unary()?;
                    if rhs == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    left /= rhs;
                }
                Token::Percent => {
                    self.advance();
                    let rhs = self.unary()?;
                    if rhs == 0.0 {
                        return Err("modulo by zero".to_string());
                    }
                    left %= rhs;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.advance();
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, String> {
        let base = self.primary()?;
        if self.peek() == Some(&Token::DoubleStar) {
            self.advance();
            // Right-associative; exponent may carry its own unary sign.
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, String> {
        match self.advance() {
            Some(Token::Number(v)) => Ok(v),
            Some(Token::LParen) => {
                let v = self.expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(v),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            Some(t) => Err(format!("unexpected token: {t:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}
