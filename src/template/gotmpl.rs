//! Minimal Go-style text template evaluator.
//!
//! Supports exactly the directive surface stack scripts rely on: field chains
//! rooted at the data dot (`{{ .stack }}`, `{{ .settings.domain_name }}`),
//! parenthesised sub-expressions, function calls with space-separated
//! arguments (`{{ (state "dev" "db").url }}`), string and number literals,
//! `{{- -}}` whitespace trimming and `{{/* comments */}}`. Unresolvable
//! values render as `<no value>`.

use std::collections::HashMap;

use serde_json::{Number, Value};

use crate::error::AppError;

pub type TemplateFn<'a> = Box<dyn Fn(&[Value]) -> Value + 'a>;

#[derive(Default)]
pub struct Engine<'a> {
    funcs: HashMap<&'static str, TemplateFn<'a>>,
}

impl<'a> Engine<'a> {
    pub fn new() -> Self {
        Engine { funcs: HashMap::new() }
    }

    pub fn add_func(&mut self, name: &'static str, func: TemplateFn<'a>) {
        self.funcs.insert(name, func);
    }

    /// Substitute every `{{ … }}` directive in `text` against `data`.
    pub fn render(&self, text: &str, data: &Value) -> Result<String, AppError> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("{{") {
            let mut before = &rest[..start];
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| AppError::template("unclosed '{{' directive"))?;
            let mut body = &after[..end];
            rest = &after[end + 2..];

            if let Some(stripped) = body.strip_prefix('-') {
                body = stripped;
                before = before.trim_end();
            }
            if let Some(stripped) = body.strip_suffix('-') {
                body = stripped;
                rest = rest.trim_start();
            }

            out.push_str(before);

            let body = body.trim();
            if body.starts_with("/*") {
                continue;
            }

            let value = self.eval(body, data)?;
            out.push_str(&render_value(&value));
        }

        out.push_str(rest);
        Ok(out)
    }

    fn eval(&self, expr: &str, data: &Value) -> Result<Value, AppError> {
        let tokens = lex(expr)?;
        let mut eval = Eval { tokens, pos: 0, funcs: &self.funcs, data };
        let value = eval.expr()?;
        if eval.pos != eval.tokens_len() {
            return Err(AppError::template(format!("unexpected tokens after expression: {expr}")));
        }
        Ok(value)
    }
}

/// Render a value the way Go's `text/template` prints it.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "<no value>".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", parts.join(" "))
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let parts: Vec<String> =
                entries.iter().map(|(k, v)| format!("{k}:{}", render_value(v))).collect();
            format!("map[{}]", parts.join(" "))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Dot,
    LParen,
    RParen,
    Ident(String),
    Str(String),
    Number(f64),
}

fn lex(src: &str) -> Result<Vec<Token>, AppError> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '"' => {
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => literal.push('\n'),
                            Some('t') => literal.push('\t'),
                            Some(other) => literal.push(other),
                            None => return Err(AppError::template("unterminated string literal")),
                        },
                        Some(other) => literal.push(other),
                        None => return Err(AppError::template("unterminated string literal")),
                    }
                }
                tokens.push(Token::Str(literal));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut number = String::new();
                number.push(c);
                chars.next();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        number.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let parsed: f64 = number
                    .parse()
                    .map_err(|_| AppError::template(format!("invalid number: {number}")))?;
                tokens.push(Token::Number(parsed));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(AppError::template(format!("unexpected character '{other}' in directive")));
            }
        }
    }

    Ok(tokens)
}

struct Eval<'e, 'a> {
    tokens: Vec<Token>,
    pos: usize,
    funcs: &'e HashMap<&'static str, TemplateFn<'a>>,
    data: &'e Value,
}

impl Eval<'_, '_> {
    fn tokens_len(&self) -> usize {
        self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_ident(&mut self) -> Result<String, AppError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            other => Err(AppError::template(format!("expected field name, found {other:?}"))),
        }
    }

    /// An operand followed by any number of `.field` selectors.
    fn expr(&mut self) -> Result<Value, AppError> {
        let mut value = self.operand()?;
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            let field = self.expect_ident()?;
            value = field_of(&value, &field);
        }
        Ok(value)
    }

    fn operand(&mut self) -> Result<Value, AppError> {
        match self.next() {
            Some(Token::Dot) => {
                if let Some(Token::Ident(_)) = self.peek() {
                    let field = self.expect_ident()?;
                    Ok(field_of(self.data, &field))
                } else {
                    Ok(self.data.clone())
                }
            }
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(AppError::template("missing closing ')'")),
                }
            }
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Number(n)) => Ok(number_value(n)),
            Some(Token::Ident(name)) => {
                let func = self
                    .funcs
                    .get(name.as_str())
                    .ok_or_else(|| AppError::template(format!("function \"{name}\" not defined")))?;
                let mut args = Vec::new();
                while !matches!(self.peek(), None | Some(Token::RParen)) {
                    args.push(self.expr()?);
                }
                Ok(func(&args))
            }
            Some(Token::RParen) => Err(AppError::template("unexpected ')'")),
            None => Err(AppError::template("empty directive")),
        }
    }
}

fn field_of(value: &Value, field: &str) -> Value {
    match value {
        Value::Object(map) => map.get(field).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}
