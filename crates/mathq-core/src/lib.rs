//! mathq Core - Arithmetic expression evaluation
//!
//! This crate provides the pure, stateless evaluator used by the mathq
//! server. An expression goes through three stages:
//!
//! - `token` - splits the text into numbers, operators and parentheses
//! - `rpn` - reorders the infix tokens into postfix (shunting-yard)
//! - `eval` - runs the postfix sequence on a value stack
//!
//! `format` renders the resulting `f64` the way the wire protocol expects.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod eval;
pub mod format;
pub mod rpn;
pub mod token;

// Re-exports for convenience
pub use error::{EvalError, EvalResult, Reason};
pub use eval::{evaluate, evaluate_postfix};
pub use format::format_result;
pub use rpn::to_postfix;
pub use token::{tokenize, Operator, Token};
