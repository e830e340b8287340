//! Postfix evaluation and the full `evaluate` pipeline.

use crate::error::{EvalError, EvalResult, Reason};
use crate::rpn::to_postfix;
use crate::token::{tokenize, Token};

/// Evaluates an infix arithmetic expression.
///
/// Pure and stateless: tokenize, convert to postfix, then evaluate.
///
/// # Errors
///
/// Returns `EvalError::InvalidExpression` for any tokenization, parse or
/// evaluation failure. There is no partial result.
///
/// # Example
///
/// ```
/// use mathq_core::evaluate;
///
/// assert_eq!(evaluate("3+4*2"), Ok(11.0));
/// assert!(evaluate("(1+2").is_err());
/// ```
pub fn evaluate(expr: &str) -> EvalResult<f64> {
    let tokens = tokenize(expr)?;
    let postfix = to_postfix(&tokens)?;
    evaluate_postfix(&postfix)
}

/// Evaluates a postfix token sequence on a value stack.
///
/// Each operator pops its right operand first, then its left one.
///
/// # Errors
///
/// - `Reason::MissingOperand` when an operator finds fewer than two values
/// - `Reason::Empty` when nothing is left to return
/// - `Reason::LeftoverOperands` when more than one value remains
pub fn evaluate_postfix(postfix: &[Token]) -> EvalResult<f64> {
    let mut values: Vec<f64> = Vec::with_capacity(postfix.len());

    for token in postfix {
        match *token {
            Token::Number(n) => values.push(n),
            Token::Op(op) => {
                let (Some(rhs), Some(lhs)) = (values.pop(), values.pop()) else {
                    return Err(EvalError::invalid(Reason::MissingOperand {
                        op: op.symbol(),
                    }));
                };
                values.push(op.apply(lhs, rhs));
            }
            // to_postfix never emits parentheses
            Token::LParen | Token::RParen => {
                return Err(EvalError::invalid(Reason::UnclosedParen));
            }
        }
    }

    match values.as_slice() {
        [value] => Ok(*value),
        [] => Err(EvalError::invalid(Reason::Empty)),
        rest => Err(EvalError::invalid(Reason::LeftoverOperands {
            count: rest.len(),
        })),
    }
}
