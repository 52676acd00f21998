//! 计算器工具
//!
//! 递归下降求值：+ - * / % ** 与括号、一元正负号、函数 sqrt sin cos tan log log10、常量 pi e。
//! ** 右结合且优先级高于一元负号（-2 ** 2 == -4）。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::{schema_of, tool_args, Tool};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CalculatorInput {
    /// 数学表达式，如 "2 + 2"、"10 * 5"、"sqrt(16)"
    pub expression: String,
}

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Perform basic mathematical calculations. Supports: +, -, *, /, %, **, sqrt, sin, cos, tan, log, log10, pi, e. Input: the expression"
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<CalculatorInput>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let input: CalculatorInput = tool_args(args, "expression")?;
        let expression = input.expression.trim();
        Ok(match evaluate(expression) {
            Ok(result) => format!("The result of {expression} is {}", format_number(result)),
            Err(e) => format!("Error calculating {expression}: {e}"),
        })
    }
}

/// 整数结果不带小数部分
fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

pub fn evaluate(expression: &str) -> Result<f64, String> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if let Some(tok) = parser.peek() {
        return Err(format!("unexpected token {tok:?}"));
    }
    if value.is_nan() {
        return Err("math domain error".to_string());
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Pow,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // 科学计数法 1e3 / 2.5e-2
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number {text:?}"))?;
                tokens.push(Token::Num(n));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
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
                    tokens.push(Token::Pow);
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
            other => return Err(format!("invalid character {other:?}")),
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

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => Err(format!("expected {expected:?}, found {tok:?}")),
            None => Err(format!("expected {expected:?}, found end of input")),
        }
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    // term := unary (('*' | '/' | '%') unary)*
    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    if rhs == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    value /= rhs;
                }
                Some(Token::Percent) => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    if rhs == 0.0 {
                        return Err("modulo by zero".to_string());
                    }
                    // 结果符号跟随除数
                    value = value - rhs * (value / rhs).floor();
                }
                _ => return Ok(value),
            }
        }
    }

    // unary := ('+' | '-') unary | power
    fn unary(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    // power := atom ('**' unary)?
    fn power(&mut self) -> Result<f64, String> {
        let base = self.atom()?;
        if self.peek() == Some(&Token::Pow) {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let arg = self.expr()?;
                    self.expect(Token::RParen)?;
                    apply_function(&name, arg)
                } else {
                    constant(&name)
                }
            }
            Some(tok) => Err(format!("unexpected token {tok:?}")),
            None => Err("unexpected end of input".to_string()),
        }
    }
}

fn constant(name: &str) -> Result<f64, String> {
    match name {
        "pi" => Ok(std::f64::consts::PI),
        "e" => Ok(std::f64::consts::E),
        other => Err(format!("name '{other}' is not defined")),
    }
}

fn apply_function(name: &str, arg: f64) -> Result<f64, String> {
    let value = match name {
        "sqrt" => {
            if arg < 0.0 {
                return Err("math domain error".to_string());
            }
            arg.sqrt()
        }
        "sin" => arg.sin(),
        "cos" => arg.cos(),
        "tan" => arg.tan(),
        "log" | "log10" => {
            if arg <= 0.0 {
                return Err("math domain error".to_string());
            }
            if name == "log" {
                arg.ln()
            } else {
                arg.log10()
            }
        }
        other => return Err(format!("name '{other}' is not defined")),
    };
    Ok(value)
}
