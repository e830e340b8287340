//! Evaluation error types following panic-free policy.

use thiserror::Error;

/// Wire text sent to clients for every evaluation failure.
pub const INVALID_EXPRESSION: &str = "Invalid Expression Format";

/// Errors that can occur while evaluating an expression.
///
/// Every failure collapses to a single kind; the [`Reason`] is kept for
/// logging and tests but is not part of the client-facing message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// The expression could not be tokenized, parsed or evaluated.
    #[error("Invalid Expression Format: {reason}")]
    InvalidExpression { reason: Reason },
}

impl EvalError {
    /// Creates an `InvalidExpression` error with the given reason.
    pub fn invalid(reason: Reason) -> Self {
        Self::InvalidExpression { reason }
    }

    /// Returns the underlying reason.
    pub fn reason(&self) -> &Reason {
        match self {
            Self::InvalidExpression { reason } => reason,
        }
    }

    /// Returns the message sent to the client in an `ERR` response.
    pub fn client_message(&self) -> &'static str {
        INVALID_EXPRESSION
    }
}

/// Why an expression was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedCharacter { ch: char, position: usize },

    #[error("malformed number '{literal}'")]
    MalformedNumber { literal: String },

    #[error("closing parenthesis without matching '('")]
    UnmatchedClose,

    #[error("'(' is never closed")]
    UnclosedParen,

    #[error("operator '{op}' is missing an operand")]
    MissingOperand { op: char },

    #[error("expression is empty")]
    Empty,

    #[error("{count} values left after evaluation (expected 1)")]
    LeftoverOperands { count: usize },
}

/// Result type for evaluation operations.
pub type EvalResult<T> = Result<T, EvalError>;
