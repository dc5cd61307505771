//! Condition evaluation
//!
//! Conditions reach the runtime as opaque text interleaved with the values of
//! their compiled `{$…}` references. A [`ConditionEvaluator`] turns that back into
//! a boolean. [`DefaultConditions`] understands a small expression language:
//!
//! - literals: integers, floats, `'single'` or `"double"` quoted strings, `true`,
//!   `false`, `null`
//! - comparisons: `==` (`===`), `!=` (`!==`, `<>`), `<`, `<=`, `>`, `>=`
//! - logic: `!`/`not`, `&&`/`and`, `||`/`or`, parentheses
//!
//! A bare reference is tested for truthiness.

use talus_tpl_parser::MAX_DEPTH;

use crate::value::Value;

/// One piece of a condition
#[derive(Debug, Clone, PartialEq)]
pub enum Operand<'a> {
    /// Condition text as written in the template
    Text(&'a str),
    /// Resolved value of a reference
    Value(Value),
}

pub trait ConditionEvaluator: Send + Sync {
    /// Evaluates a condition, or describes why it cannot be evaluated
    fn evaluate(&self, operands: &[Operand<'_>]) -> Result<bool, String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConditions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Symbol {
    Compare(Comparison),
    Not,
    And,
    Or,
    Open,
    Close,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Value(Value),
    Symbol(Symbol),
}

/// Longest spellings first
const SYMBOLS: &[(&str, Symbol)] = &[
    ("===", Symbol::Compare(Comparison::Eq)),
    ("!==", Symbol::Compare(Comparison::Ne)),
    ("==", Symbol::Compare(Comparison::Eq)),
    ("!=", Symbol::Compare(Comparison::Ne)),
    ("<>", Symbol::Compare(Comparison::Ne)),
    ("<=", Symbol::Compare(Comparison::Le)),
    (">=", Symbol::Compare(Comparison::Ge)),
    ("&&", Symbol::And),
    ("||", Symbol::Or),
    ("<", Symbol::Compare(Comparison::Lt)),
    (">", Symbol::Compare(Comparison::Gt)),
    ("!", Symbol::Not),
    ("(", Symbol::Open),
    (")", Symbol::Close),
];

fn quoted(rest: &str, quote: char) -> Result<(Token, usize), String> {
    let mut value = String::new();
    let mut chars = rest.char_indices().skip(1);
    while let Some((at, c)) = chars.next() {
        match c {
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    value.push(escaped);
                }
            }
            c if c == quote => return Ok((Token::Value(Value::String(value)), at + 1)),
            c => value.push(c),
        }
    }
    Err(format!("unterminated string {}", rest))
}

fn number(rest: &str) -> Result<(Token, usize), String> {
    let len = rest
        .char_indices()
        .skip(1)
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map_or(rest.len(), |(at, _)| at);
    let literal = &rest[..len];
    let value = match literal.parse::<i64>() {
        Ok(int) => Value::Int(int),
        Err(_) => literal
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| format!("invalid number \"{}\"", literal))?,
    };
    Ok((Token::Value(value), len))
}

fn word(rest: &str) -> Result<(Token, usize), String> {
    let len = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    let token = match rest[..len].to_ascii_lowercase().as_str() {
        "and" => Token::Symbol(Symbol::And),
        "or" => Token::Symbol(Symbol::Or),
        "not" => Token::Symbol(Symbol::Not),
        "true" => Token::Value(Value::Bool(true)),
        "false" => Token::Value(Value::Bool(false)),
        "null" => Token::Value(Value::Null),
        "" => return Err(format!("unexpected \"{}\"", rest.chars().next().unwrap_or(' '))),
        other => return Err(format!("unexpected \"{}\"", other)),
    };
    Ok((token, len))
}

fn lex(text: &str, tokens: &mut Vec<Token>) -> Result<(), String> {
    let mut rest = text.trim_start();
    while let Some(first) = rest.chars().next() {
        let signed = matches!(first, '-' | '+') && rest[1..].starts_with(|c: char| c.is_ascii_digit());
        let (token, len) = if let Some((symbol, kind)) = SYMBOLS.iter().find(|(symbol, _)| rest.starts_with(symbol)) {
            (Token::Symbol(*kind), symbol.len())
        } else if first == '\'' || first == '"' {
            quoted(rest, first)?
        } else if first.is_ascii_digit() || signed {
            number(rest)?
        } else {
            word(rest)?
        };
        tokens.push(token);
        rest = rest[len..].trim_start();
    }
    Ok(())
}

struct Evaluation {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Evaluation {
    fn descend(&mut self) -> Result<(), String> {
        self.depth += 1;
        match self.depth > MAX_DEPTH {
            true => Err("condition nested too deeply".to_string()),
            false => Ok(()),
        }
    }

    fn eat(&mut self, symbol: Symbol) -> bool {
        let found = self.tokens.get(self.pos) == Some(&Token::Symbol(symbol));
        if found {
            self.pos += 1;
        }
        found
    }

    fn or(&mut self) -> Result<Value, String> {
        let mut left = self.and()?;
        while self.eat(Symbol::Or) {
            let right = self.and()?;
            left = Value::Bool(left.is_truthy() || right.is_truthy());
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Value, String> {
        let mut left = self.not()?;
        while self.eat(Symbol::And) {
            let right = self.not()?;
            left = Value::Bool(left.is_truthy() && right.is_truthy());
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Value, String> {
        if self.eat(Symbol::Not) {
            self.descend()?;
            let value = !self.not()?.is_truthy();
            self.depth -= 1;
            return Ok(Value::Bool(value));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Value, String> {
        let left = self.primary()?;
        let comparison = match self.tokens.get(self.pos) {
            Some(Token::Symbol(Symbol::Compare(comparison))) => *comparison,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.primary()?;
        let ordering = left.compare(&right);
        Ok(Value::Bool(match comparison {
            Comparison::Eq => left.loose_eq(&right),
            Comparison::Ne => !left.loose_eq(&right),
            Comparison::Lt => ordering.is_some_and(|o| o.is_lt()),
            Comparison::Le => ordering.is_some_and(|o| o.is_le()),
            Comparison::Gt => ordering.is_some_and(|o| o.is_gt()),
            Comparison::Ge => ordering.is_some_and(|o| o.is_ge()),
        }))
    }

    fn primary(&mut self) -> Result<Value, String> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        match token {
            Some(Token::Value(value)) => Ok(value),
            Some(Token::Symbol(Symbol::Open)) => {
                self.descend()?;
                let value = self.or()?;
                self.depth -= 1;
                match self.eat(Symbol::Close) {
                    true => Ok(value),
                    false => Err("missing \")\"".to_string()),
                }
            }
            Some(Token::Symbol(symbol)) => Err(format!("unexpected {:?}", symbol)),
            None => Err("unexpected end of condition".to_string()),
        }
    }
}

impl ConditionEvaluator for DefaultConditions {
    fn evaluate(&self, operands: &[Operand<'_>]) -> Result<bool, String> {
        let mut tokens = Vec::new();
        for operand in operands {
            match operand {
                Operand::Text(text) => lex(text, &mut tokens)?,
                Operand::Value(value) => tokens.push(Token::Value(value.clone())),
            }
        }
        if tokens.is_empty() {
            return Err("empty condition".to_string());
        }
        let mut evaluation = Evaluation {
            tokens,
            pos: 0,
            depth: 0,
        };
        let value = evaluation.or()?;
        if evaluation.pos < evaluation.tokens.len() {
            return Err(format!("unexpected {:?}", evaluation.tokens[evaluation.pos]));
        }
        Ok(value.is_truthy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(text: &str) -> Result<bool, String> {
        DefaultConditions.evaluate(&[Operand::Text(text)])
    }

    #[test]
    fn literals() {
        assert_eq!(eval("true"), Ok(true));
        assert_eq!(eval("null"), Ok(false));
        assert_eq!(eval("0"), Ok(false));
        assert_eq!(eval("'0'"), Ok(false));
        assert_eq!(eval("-1.5"), Ok(true));
        assert_eq!(eval("\"it\\\"s\" == 'it\"s'"), Ok(true));
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval("1 < 2"), Ok(true));
        assert_eq!(eval("2 <= 1.5"), Ok(false));
        assert_eq!(eval("'10' == 10"), Ok(true));
        assert_eq!(eval("'b' > 'a'"), Ok(true));
        assert_eq!(eval("1 <> 1"), Ok(false));
        assert_eq!(eval("'a' < 1"), Ok(false));
    }

    #[test]
    fn logic_and_precedence() {
        assert_eq!(eval("true || false && false"), Ok(true));
        assert_eq!(eval("(true || false) && false"), Ok(false));
        assert_eq!(eval("not true or !false"), Ok(true));
        assert_eq!(eval("TRUE AND 1 == 1"), Ok(true));
    }

    #[test]
    fn resolved_values() {
        let operands = [
            Operand::Value(Value::Int(5)),
            Operand::Text(" > 3 && "),
            Operand::Value(Value::from("x")),
            Operand::Text(" == 'x'"),
        ];
        assert_eq!(DefaultConditions.evaluate(&operands), Ok(true));
        assert_eq!(DefaultConditions.evaluate(&[Operand::Value(Value::Null)]), Ok(false));
        assert_eq!(
            DefaultConditions.evaluate(&[Operand::Text("!"), Operand::Value(Value::from(vec![1]))]),
            Ok(false)
        );
    }

    #[test]
    fn malformed() {
        assert!(eval("").is_err());
        assert!(eval("(1").is_err());
        assert!(eval("1 ~ 2").is_err());
        assert!(eval("1 2").is_err());
        assert!(eval("'open").is_err());
        assert!(eval("user").is_err());
    }

    #[test]
    fn nesting_is_bounded() {
        let nested = |depth: usize| format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(eval(&nested(MAX_DEPTH)), Ok(true));
        assert_eq!(eval(&nested(2000)), Err("condition nested too deeply".to_string()));
        assert_eq!(eval(&format!("{}true", "!".repeat(MAX_DEPTH))), Ok(true));
        assert!(eval(&format!("{}true", "not ".repeat(5000))).is_err());
        assert_eq!(eval("(1) && (((2)))"), Ok(true));
    }
}
