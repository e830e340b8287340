//! Infix to postfix conversion (shunting-yard).

use crate::error::{EvalError, EvalResult, Reason};
use crate::token::{Operator, Token};

/// Item on the operator stack while converting.
#[derive(Debug, Clone, Copy)]
enum Pending {
    Op(Operator),
    Open,
}

/// Reorders infix tokens into postfix order.
///
/// Operators of equal or higher precedence already on the stack are
/// emitted before an incoming operator is pushed, which makes every
/// operator left-associative. Parentheses never appear in the output.
///
/// # Errors
///
/// - `Reason::UnmatchedClose` for a `)` with no open `(` on the stack
/// - `Reason::UnclosedParen` for a `(` still open after the last token
pub fn to_postfix(tokens: &[Token]) -> EvalResult<Vec<Token>> {
    let mut output = Vec::with_capacity(tokens.len());
    let mut stack: Vec<Pending> = Vec::new();

    for token in tokens {
        match *token {
            Token::Number(_) => output.push(*token),
            Token::Op(incoming) => {
                while let Some(&Pending::Op(top)) = stack.last() {
                    if top.precedence() < incoming.precedence() {
                        break;
                    }
                    output.push(Token::Op(top));
                    stack.pop();
                }
                stack.push(Pending::Op(incoming));
            }
            Token::LParen => stack.push(Pending::Open),
            Token::RParen => loop {
                match stack.pop() {
                    Some(Pending::Op(op)) => output.push(Token::Op(op)),
                    Some(Pending::Open) => break,
                    None => return Err(EvalError::invalid(Reason::UnmatchedClose)),
                }
            },
        }
    }

    while let Some(pending) = stack.pop() {
        match pending {
            Pending::Op(op) => output.push(Token::Op(op)),
            Pending::Open => return Err(EvalError::invalid(Reason::UnclosedParen)),
        }
    }

    Ok(output)
}
