//! Tokenization of arithmetic expressions.
//!
//! Numbers are maximal runs of the form `digits[.digits]`; the five binary
//! operators and both parentheses are single-character tokens. Whitespace
//! separates tokens and is otherwise ignored. Anything else is rejected.

use std::fmt;

use crate::error::{EvalError, EvalResult, Reason};

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl Operator {
    /// Parses an operator from its symbol.
    pub fn from_char(ch: char) -> Option<Self> {
        match ch {
            '+' => Some(Self::Add),
            '-' => Some(Self::Sub),
            '*' => Some(Self::Mul),
            '/' => Some(Self::Div),
            '%' => Some(Self::Rem),
            _ => None,
        }
    }

    /// Returns the operator symbol.
    pub fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
            Self::Rem => '%',
        }
    }

    /// Binding strength: `+ -` bind at 1, `* / %` at 2.
    ///
    /// All operators are left-associative.
    pub fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div | Self::Rem => 2,
        }
    }

    /// Applies the operator with `f64` semantics (`%` is the floating remainder).
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
            Self::Mul => lhs * rhs,
            Self::Div => lhs / rhs,
            Self::Rem => lhs % rhs,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A single lexical token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token {
    Number(f64),
    Op(Operator),
    LParen,
    RParen,
}

/// Splits an expression into tokens.
///
/// # Errors
///
/// Returns `InvalidExpression` for any character outside digits, `.`,
/// whitespace, `+ - * / %` and parentheses, and for numbers with a
/// dangling decimal point (`3.`) or a second one (`1.2.3`).
pub fn tokenize(expr: &str) -> EvalResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();

    while let Some((position, ch)) = chars.next() {
        if ch.is_whitespace() {
            continue;
        }

        if ch.is_ascii_digit() {
            let mut literal = String::from(ch);
            while let Some(&(_, next)) = chars.peek() {
                if !(next.is_ascii_digit() || next == '.') {
                    break;
                }
                literal.push(next);
                chars.next();
            }

            if literal.matches('.').count() > 1 || literal.ends_with('.') {
                return Err(EvalError::invalid(Reason::MalformedNumber { literal }));
            }

            let value = literal
                .parse::<f64>()
                .map_err(|_| EvalError::invalid(Reason::MalformedNumber { literal }))?;
            tokens.push(Token::Number(value));
            continue;
        }

        let token = match ch {
            '(' => Token::LParen,
            ')' => Token::RParen,
            other => match Operator::from_char(other) {
                Some(op) => Token::Op(op),
                None => {
                    return Err(EvalError::invalid(Reason::UnexpectedCharacter {
                        ch: other,
                        position,
                    }))
                }
            },
        };
        tokens.push(token);
    }

    Ok(tokens)
}
