//! Client commands, parsed once at the protocol boundary.

use std::fmt;

use thiserror::Error;

use crate::SEPARATOR;

/// A command line received from a client.
///
/// Parsing never fails: anything that is not a well-formed `JOIN`, `CALC`
/// or `LEAVE` becomes `Command::Malformed` carrying the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `JOIN:<name>` - register the session under `name`
    Join { name: String },

    /// `CALC:<name>:<expression>` - queue an expression for evaluation
    Calc { name: String, expression: String },

    /// `LEAVE:<name>` - graceful disconnect
    Leave { name: String },

    /// Anything else
    Malformed(Malformed),
}

/// Why a line could not be understood.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Malformed {
    #[error("Malformed command")]
    MissingSeparator,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("CALC missing expression")]
    MissingExpression,

    #[error("JOIN missing client name")]
    EmptyName,
}

impl Command {
    /// Parses a single protocol line.
    ///
    /// A trailing `\n` or `\r\n` is ignored. The line is split at the first
    /// `:` into keyword and payload; a `CALC` payload is split again at its
    /// first `:`, so a name can never contain `:`.
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\n', '\r']);

        let Some((keyword, payload)) = line.split_once(SEPARATOR) else {
            return Self::Malformed(Malformed::MissingSeparator);
        };

        match keyword {
            "JOIN" if payload.is_empty() => Self::Malformed(Malformed::EmptyName),
            "JOIN" => Self::Join {
                name: payload.to_string(),
            },
            "CALC" => match payload.split_once(SEPARATOR) {
                Some((name, expression)) => Self::Calc {
                    name: name.to_string(),
                    expression: expression.to_string(),
                },
                None => Self::Malformed(Malformed::MissingExpression),
            },
            "LEAVE" => Self::Leave {
                name: payload.to_string(),
            },
            other => Self::Malformed(Malformed::UnknownCommand(other.to_string())),
        }
    }

    /// Creates a join command.
    pub fn join(name: impl Into<String>) -> Self {
        Self::Join { name: name.into() }
    }

    /// Creates a calc command.
    pub fn calc(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::Calc {
            name: name.into(),
            expression: expression.into(),
        }
    }

    /// Creates a leave command.
    pub fn leave(name: impl Into<String>) -> Self {
        Self::Leave { name: name.into() }
    }

    /// Returns the command keyword, or `None` for malformed lines.
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            Self::Join { .. } => Some("JOIN"),
            Self::Calc { .. } => Some("CALC"),
            Self::Leave { .. } => Some("LEAVE"),
            Self::Malformed(_) => None,
        }
    }
}

/// Renders the command as a wire line (without the trailing newline).
///
/// Malformed commands have no wire form and render as an empty string.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Join { name } => write!(f, "JOIN{SEPARATOR}{name}"),
            Self::Calc { name, expression } => {
                write!(f, "CALC{SEPARATOR}{name}{SEPARATOR}{expression}")
            }
            Self::Leave { name } => write!(f, "LEAVE{SEPARATOR}{name}"),
            Self::Malformed(_) => Ok(()),
        }
    }
}
