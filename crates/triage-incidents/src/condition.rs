//! Guard conditions for category actions.
//!
//! Conditions use a small comparison grammar evaluated against a fixed set of
//! incident variables. Nothing is ever executed.
//!
//! ```text
//! expr       := and ( "||" and )*
//! and        := primary ( "&&" primary )*
//! primary    := comparison | "(" expr ")"
//! comparison := ident op literal
//! op         := ">" | ">=" | "<" | "<=" | "==" | "!="
//! literal    := number | "quoted string" | severity-word
//! ```
//!
//! Identifiers are `frequency`, `affectedUsers` (or `affected_users`) and
//! `severity`. Severity compares by rank, so `severity >= high` is valid.

use std::fmt;

use serde::{Deserialize, Serialize};
use triage_alerts::Severity;

use crate::error::{IncidentError, Result};

/// Values a condition can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionVars {
    /// Incident frequency.
    pub frequency: u64,
    /// Number of distinct affected users.
    pub affected_users: usize,
    /// Current severity.
    pub severity: Severity,
}

/// A guard condition, parsed once when it is created or deserialized.
///
/// The source text is kept for display and serialization. A condition that
/// fails to parse keeps its error: [`Condition::validate`] reports it and
/// [`Condition::evaluate`] treats it as not met.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Condition {
    source: String,
    parsed: ParseResult<Expr>,
}

impl Condition {
    /// Parses condition source text.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let parsed = parse(&source);
        Self { source, parsed }
    }

    /// Returns the source text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns true when the condition parsed.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.parsed.is_ok()
    }

    /// Reports the parse error, if any.
    ///
    /// # Errors
    ///
    /// Returns `IncidentError::InvalidCondition` with the parse error.
    pub fn validate(&self) -> Result<()> {
        match &self.parsed {
            Ok(_) => Ok(()),
            Err(reason) => Err(IncidentError::InvalidCondition {
                condition: self.source.clone(),
                reason: reason.clone(),
            }),
        }
    }

    /// Evaluates the condition. A condition that did not parse is never met.
    #[must_use]
    pub fn evaluate(&self, vars: &ConditionVars) -> bool {
        self.parsed.as_ref().is_ok_and(|expr| expr.eval(vars))
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Condition {}

impl From<String> for Condition {
    fn from(source: String) -> Self {
        Self::new(source)
    }
}

impl From<Condition> for String {
    fn from(condition: Condition) -> Self {
        condition.source
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl CmpOp {
    fn apply<T: PartialOrd>(self, left: &T, right: &T) -> bool {
        match self {
            Self::Gt => left > right,
            Self::Ge => left >= right,
            Self::Lt => left < right,
            Self::Le => left <= right,
            Self::Eq => left == right,
            Self::Ne => left != right,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    Op(CmpOp),
    And,
    Or,
    LParen,
    RParen,
}

/// Parsed condition. Comparisons are type-checked while parsing.
#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Frequency(CmpOp, f64),
    AffectedUsers(CmpOp, f64),
    Severity(CmpOp, Severity),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

type ParseResult<T> = std::result::Result<T, String>;

impl Expr {
    #[allow(clippy::cast_precision_loss)]
    fn eval(&self, vars: &ConditionVars) -> bool {
        match self {
            Self::And(l, r) => l.eval(vars) && r.eval(vars),
            Self::Or(l, r) => l.eval(vars) || r.eval(vars),
            Self::Frequency(op, n) => op.apply(&(vars.frequency as f64), n),
            Self::AffectedUsers(op, n) => op.apply(&(vars.affected_users as f64), n),
            Self::Severity(op, rhs) => op.apply(&vars.severity, rhs),
        }
    }
}

fn tokenize(input: &str) -> ParseResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' | '|' => {
                if chars.get(i + 1) != Some(&c) {
                    return Err(format!("expected '{c}{c}' at position {i}"));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
                i += 2;
            }
            '>' | '<' | '=' | '!' => {
                let followed_by_eq = chars.get(i + 1) == Some(&'=');
                let op = match (c, followed_by_eq) {
                    ('>', true) => CmpOp::Ge,
                    ('>', false) => CmpOp::Gt,
                    ('<', true) => CmpOp::Le,
                    ('<', false) => CmpOp::Lt,
                    ('=', true) => CmpOp::Eq,
                    ('!', true) => CmpOp::Ne,
                    _ => return Err(format!("unexpected '{c}' at position {i}")),
                };
                tokens.push(Token::Op(op));
                i += if followed_by_eq { 2 } else { 1 };
            }
            '"' | '\'' => {
                let quote = c;
                let start = i + 1;
                let Some(len) = chars[start..].iter().position(|&ch| ch == quote) else {
                    return Err(format!("unterminated string at position {i}"));
                };
                tokens.push(Token::Str(chars[start..start + len].iter().collect()));
                i = start + len + 1;
            }
            c if c.is_ascii_digit() || c == '.' || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{text}'"))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{other}' at position {i}")),
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
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> ParseResult<Expr> {
        let mut left = self.primary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.primary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("expected ')'".to_string()),
                }
            }
            Some(Token::Ident(name)) => {
                let op = match self.next() {
                    Some(Token::Op(op)) => op,
                    _ => return Err(format!("expected comparison operator after '{name}'")),
                };
                let literal = self.next();
                match (name.as_str(), literal) {
                    ("frequency", Some(Token::Number(n))) => Ok(Expr::Frequency(op, n)),
                    ("affectedUsers" | "affected_users", Some(Token::Number(n))) => {
                        Ok(Expr::AffectedUsers(op, n))
                    }
                    ("severity", Some(Token::Str(word) | Token::Ident(word))) => {
                        let rhs = Severity::parse(&word)
                            .ok_or_else(|| format!("unknown severity '{word}'"))?;
                        Ok(Expr::Severity(op, rhs))
                    }
                    ("severity", Some(Token::Number(_))) => {
                        Err("severity must be compared with a severity name".to_string())
                    }
                    (
                        "frequency" | "affectedUsers" | "affected_users",
                        Some(Token::Str(_) | Token::Ident(_)),
                    ) => Err(format!("'{name}' must be compared with a number")),
                    ("frequency" | "affectedUsers" | "affected_users" | "severity", _) => {
                        Err(format!("expected literal after '{name}'"))
                    }
                    (other, _) => Err(format!("unknown variable '{other}'")),
                }
            }
            Some(other) => Err(format!("unexpected token {other:?}")),
            None => Err("unexpected end of condition".to_string()),
        }
    }
}

fn parse(input: &str) -> ParseResult<Expr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err("empty condition".to_string());
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(format!("trailing input at token {}", parser.pos));
    }
    Ok(expr)
}
