//! Arithmetic expression tool
//!
//! Evaluates plain arithmetic with a small recursive-descent parser.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::core::{CarelineError, Result};
use crate::tools::registry::Tool;

#[derive(Debug, Deserialize)]
struct EvaluateArgs {
    expr: String,
}

/// Tool for evaluating maths expressions
#[derive(Debug, Clone, Default)]
pub struct EvaluateExpressionTool;

impl EvaluateExpressionTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for EvaluateExpressionTool {
    fn name(&self) -> &str {
        "evaluate_expression"
    }

    fn description(&self) -> &str {
        "Evaluates any maths expression"
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "expr": {
                    "type": "string",
                    "description": "The expression to evaluate, e.g. (2+3)*sqrt(16)"
                }
            },
            "required": ["expr"]
        })
    }

    async fn invoke(&self, args: serde_json::Value) -> Result<String> {
        let args: EvaluateArgs = serde_json::from_value(args)
            .map_err(|e| CarelineError::tool(format!("Invalid arguments: {}", e)))?;
        let value = evaluate(&args.expr)
            .map_err(|e| CarelineError::tool(format!("Invalid expression: {}", e)))?;
        Ok(format_number(value))
    }
}

/// Evaluate an arithmetic expression
pub fn evaluate(expr: &str) -> std::result::Result<f64, String> {
    let mut parser = Parser {
        chars: expr.chars().filter(|c| !c.is_whitespace()).collect(),
        pos: 0,
        depth: 0,
    };

    if parser.chars.is_empty() {
        return Err("empty expression".to_string());
    }

    let value = parser.expression()?;
    if let Some(c) = parser.peek() {
        return Err(format!("unexpected '{}' at position {}", c, parser.pos));
    }
    if !value.is_finite() {
        return Err("result is not a finite number".to_string());
    }
    Ok(value)
}

/// Integers print without a decimal point, everything else with 6 significant digits
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }

    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (5 - magnitude).max(0) as usize;
    let text = format!("{:.*}", decimals, value);
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

/// Nesting limit for parentheses, calls and sign chains
const MAX_DEPTH: usize = 256;

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expression(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.term()?;
        loop {
            if self.eat('+') {
                value += self.term()?;
            } else if self.eat('-') {
                value -= self.term()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn term(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.unary()?;
        loop {
            if self.peek() == Some('*') && self.chars.get(self.pos + 1) != Some(&'*') {
                self.pos += 1;
                value *= self.unary()?;
            } else if self.eat('/') {
                let divisor = self.unary()?;
                if divisor == 0.0 {
                    return Err("division by zero".to_string());
                }
                value /= divisor;
            } else {
                return Ok(value);
            }
        }
    }

    // Every recursive path passes through here
    fn unary(&mut self) -> std::result::Result<f64, String> {
        if self.depth >= MAX_DEPTH {
            return Err("expression nested too deeply".to_string());
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> std::result::Result<f64, String> {
        if self.eat('-') {
            return Ok(-self.unary()?);
        }
        if self.eat('+') {
            return self.unary();
        }
        self.power()
    }

    // Right-associative; `^` and `**` are equivalent
    fn power(&mut self) -> std::result::Result<f64, String> {
        let base = self.primary()?;
        let is_pow = if self.eat('^') {
            true
        } else if self.peek() == Some('*') && self.chars.get(self.pos + 1) == Some(&'*') {
            self.pos += 2;
            true
        } else {
            false
        };

        if is_pow {
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> std::result::Result<f64, String> {
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let value = self.expression()?;
                if !self.eat(')') {
                    return Err("missing closing parenthesis".to_string());
                }
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.identifier(),
            Some(c) => Err(format!("unexpected '{}' at position {}", c, self.pos)),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn number(&mut self) -> std::result::Result<f64, String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<f64>()
            .map_err(|_| format!("invalid number '{}'", text))
    }

    fn identifier(&mut self) -> std::result::Result<f64, String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric()) {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();

        match name.as_str() {
            "pi" => return Ok(std::f64::consts::PI),
            "e" => return Ok(std::f64::consts::E),
            _ => {}
        }

        if !self.eat('(') {
            return Err(format!("unknown name '{}'", name));
        }
        let arg = self.expression()?;
        if !self.eat(')') {
            return Err("missing closing parenthesis".to_string());
        }

        match name.as_str() {
            "sqrt" if arg < 0.0 => Err("square root of a negative number".to_string()),
            "sqrt" => Ok(arg.sqrt()),
            "sin" => Ok(arg.sin()),
            "cos" => Ok(arg.cos()),
            "tan" => Ok(arg.tan()),
            "ln" => Ok(arg.ln()),
            "log" => Ok(arg.log10()),
            "abs" => Ok(arg.abs()),
            _ => Err(format!("unknown function '{}'", name)),
        }
    }
}
