// SPDX-License-Identifier: MIT

//! A small, sandboxed boolean expression grammar for step conditions.
//!
//! Grammar (loosest to tightest binding):
//! ```text
//! expr       := or_expr
//! or_expr    := and_expr ( "||" and_expr )*
//! and_expr   := unary ( "&&" unary )*
//! unary      := "!" unary | comparison
//! comparison := primary ( ("==" | "!=" | "<=" | ">=" | "<" | ">") primary )?
//! primary    := "true" | "false" | "null" | number | string | path | "(" expr ")"
//! path       := ident ( "." ident | "[" number "]" )*
//! ```
//!
//! No host evaluator is ever invoked: unknown syntax is a parse error, and
//! path lookups that miss resolve to `null` rather than panicking.

use serde_json::Value;
use thiserror::Error;

use crate::template::resolve_path;

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("condition parse error at byte {0}: {1}")]
    Parse(usize, String),
    #[error("unexpected trailing input: {0:?}")]
    TrailingInput(String),
}

/// Evaluate a condition expression against a context map.
///
/// An absent (empty) condition is always truthy, matching the spec's
/// "absent condition admits the step" rule — callers should check for an
/// empty/missing condition before calling this.
pub fn evaluate(expression: &str, context: &Value) -> Result<bool, ConditionError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens: &tokens, pos: 0 };
    let value = parser.parse_or(context)?;
    if parser.pos != parser.tokens.len() {
        return Err(ConditionError::TrailingInput(format!("{:?}", &parser.tokens[parser.pos..])));
    }
    Ok(is_truthy(&value))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    Op(&'static str),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConditionError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' | '\'' => {
                let quote = c;
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && bytes[j] as char != quote {
                    j += 1;
                }
                if j >= bytes.len() {
                    return Err(ConditionError::Parse(i, "unterminated string literal".into()));
                }
                tokens.push(Token::Str(input[start..j].to_string()));
                i = j + 1;
            }
            '&' if bytes.get(i + 1) == Some(&b'&') => {
                tokens.push(Token::Op("&&"));
                i += 2;
            }
            '|' if bytes.get(i + 1) == Some(&b'|') => {
                tokens.push(Token::Op("||"));
                i += 2;
            }
            '=' if bytes.get(i + 1) == Some(&b'=') => {
                tokens.push(Token::Op("=="));
                i += 2;
            }
            '!' if bytes.get(i + 1) == Some(&b'=') => {
                tokens.push(Token::Op("!="));
                i += 2;
            }
            '<' if bytes.get(i + 1) == Some(&b'=') => {
                tokens.push(Token::Op("<="));
                i += 2;
            }
            '>' if bytes.get(i + 1) == Some(&b'=') => {
                tokens.push(Token::Op(">="));
                i += 2;
            }
            '<' => {
                tokens.push(Token::Op("<"));
                i += 1;
            }
            '>' => {
                tokens.push(Token::Op(">"));
                i += 1;
            }
            '!' => {
                tokens.push(Token::Op("!"));
                i += 1;
            }
            _ if c.is_ascii_digit() || (c == '-' && bytes.get(i + 1).is_some_and(|b| (*b as char).is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < bytes.len() && (bytes[i] as char).is_ascii_digit() || bytes.get(i) == Some(&b'.') {
                    i += 1;
                }
                let text = &input[start..i];
                let number = text
                    .parse::<f64>()
                    .map_err(|e| ConditionError::Parse(start, format!("invalid number {text:?}: {e}")))?;
                tokens.push(Token::Number(number));
            }
            _ if c.is_alphanumeric() || c == '_' || c == '.' || c == '[' || c == ']' => {
                let start = i;
                while i < bytes.len() {
                    let c = bytes[i] as char;
                    if c.is_alphanumeric() || c == '_' || c == '.' || c == '[' || c == ']' {
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(input[start..i].to_string()));
            }
            other => return Err(ConditionError::Parse(i, format!("unexpected character {other:?}"))),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn parse_or(&mut self, ctx: &Value) -> Result<Value, ConditionError> {
        let mut left = self.parse_and(ctx)?;
        while matches!(self.peek(), Some(Token::Op("||"))) {
            self.advance();
            let right = self.parse_and(ctx)?;
            left = Value::Bool(is_truthy(&left) || is_truthy(&right));
        }
        Ok(left)
    }

    fn parse_and(&mut self, ctx: &Value) -> Result<Value, ConditionError> {
        let mut left = self.parse_unary(ctx)?;
        while matches!(self.peek(), Some(Token::Op("&&"))) {
            self.advance();
            let right = self.parse_unary(ctx)?;
            left = Value::Bool(is_truthy(&left) && is_truthy(&right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self, ctx: &Value) -> Result<Value, ConditionError> {
        if matches!(self.peek(), Some(Token::Op("!"))) {
            self.advance();
            let inner = self.parse_unary(ctx)?;
            return Ok(Value::Bool(!is_truthy(&inner)));
        }
        self.parse_comparison(ctx)
    }

    fn parse_comparison(&mut self, ctx: &Value) -> Result<Value, ConditionError> {
        let left = self.parse_primary(ctx)?;
        let op = match self.peek() {
            Some(Token::Op(op @ ("==" | "!=" | "<=" | ">=" | "<" | ">"))) => *op,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_primary(ctx)?;
        Ok(Value::Bool(compare(op, &left, &right)))
    }

    fn parse_primary(&mut self, ctx: &Value) -> Result<Value, ConditionError> {
        match self.advance().cloned() {
            Some(Token::Number(n)) => Ok(serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Ident(ident)) => Ok(match ident.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                "null" => Value::Null,
                _ => resolve_path(ctx, &ident).cloned().unwrap_or(Value::Null),
            }),
            Some(Token::LParen) => {
                let value = self.parse_or(ctx)?;
                match self.advance() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(ConditionError::Parse(self.pos, "expected closing ')'".into())),
                }
            }
            other => Err(ConditionError::Parse(self.pos, format!("expected a value, found {other:?}"))),
        }
    }
}

fn compare(op: &str, left: &Value, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        return match op {
            "==" => a == b,
            "!=" => a != b,
            "<" => a < b,
            "<=" => a <= b,
            ">" => a > b,
            ">=" => a >= b,
            _ => false,
        };
    }
    match op {
        "==" => left == right,
        "!=" => left != right,
        "<" => left.as_str().zip(right.as_str()).is_some_and(|(a, b)| a < b),
        "<=" => left.as_str().zip(right.as_str()).is_some_and(|(a, b)| a <= b),
        ">" => left.as_str().zip(right.as_str()).is_some_and(|(a, b)| a > b),
        ">=" => left.as_str().zip(right.as_str()).is_some_and(|(a, b)| a >= b),
        _ => false,
    }
}

#[cfg(test)]
#[path = "condition_tests.rs"]
mod tests;
