//! Server responses.

use std::fmt;

use crate::SEPARATOR;

/// Error text for malformed lines, commands out of order, and evaluation failures.
pub const INVALID_FORMAT: &str = "Invalid Expression Format";

/// Error text when the session pool or the work queue is full.
pub const SERVER_BUSY: &str = "Server busy";

/// Error text when a JOIN names a client that is already connected.
pub const NAME_TAKEN: &str = "Client name already in use";

/// A line sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `ACK:<name>:Welcome`
    Welcome { name: String },

    /// `ACK:<name>:Goodbye`
    Goodbye { name: String },

    /// `RES:<name>:<result>`
    Result { name: String, value: String },

    /// `ERR:<message>`
    Error { message: String },
}

impl Response {
    /// Creates a welcome acknowledgement.
    pub fn welcome(name: impl Into<String>) -> Self {
        Self::Welcome { name: name.into() }
    }

    /// Creates a goodbye acknowledgement.
    pub fn goodbye(name: impl Into<String>) -> Self {
        Self::Goodbye { name: name.into() }
    }

    /// Creates a computed result.
    pub fn result(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Result {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Creates an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// `ERR:Invalid Expression Format`
    pub fn invalid_format() -> Self {
        Self::error(INVALID_FORMAT)
    }

    /// `ERR:Server busy`
    pub fn busy() -> Self {
        Self::error(SERVER_BUSY)
    }

    /// `ERR:Client name already in use`
    pub fn name_taken() -> Self {
        Self::error(NAME_TAKEN)
    }

    /// Parses a response line (used by clients).
    ///
    /// Returns `None` if the line is not a recognized response.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\n', '\r']);
        let (kind, rest) = line.split_once(SEPARATOR)?;

        match kind {
            "ERR" => Some(Self::error(rest)),
            "ACK" => match rest.rsplit_once(SEPARATOR)? {
                (name, "Welcome") => Some(Self::welcome(name)),
                (name, "Goodbye") => Some(Self::goodbye(name)),
                _ => None,
            },
            "RES" => {
                let (name, value) = rest.split_once(SEPARATOR)?;
                Some(Self::result(name, value))
            }
            _ => None,
        }
    }

    /// Returns `true` for `ERR` responses.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Renders the response as a wire line (without the trailing newline).
impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Welcome { name } => write!(f, "ACK{SEPARATOR}{name}{SEPARATOR}Welcome"),
            Self::Goodbye { name } => write!(f, "ACK{SEPARATOR}{name}{SEPARATOR}Goodbye"),
            Self::Result { name, value } => write!(f, "RES{SEPARATOR}{name}{SEPARATOR}{value}"),
            Self::Error { message } => write!(f, "ERR{SEPARATOR}{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        assert_eq!(Response::welcome("alice").to_string(), "ACK:alice:Welcome");
        assert_eq!(Response::goodbye("alice").to_string(), "ACK:alice:Goodbye");
        assert_eq!(Response::result("alice", "11").to_string(), "RES:alice:11");
        assert_eq!(
            Response::invalid_format().to_string(),
            "ERR:Invalid Expression Format"
        );
        assert_eq!(Response::busy().to_string(), "ERR:Server busy");
    }

    #[test]
    fn test_parse_responses() {
        assert_eq!(
            Response::parse("ACK:bob:Welcome\n"),
            Some(Response::welcome("bob"))
        );
        assert_eq!(
            Response::parse("ACK:bob:Goodbye"),
            Some(Response::goodbye("bob"))
        );
        assert_eq!(
            Response::parse("RES:bob:-2.5"),
            Some(Response::result("bob", "-2.5"))
        );
        assert_eq!(
            Response::parse("ERR:Client name already in use"),
            Some(Response::name_taken())
        );
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!(Response::parse("HELLO:world"), None);
        assert_eq!(Response::parse("ACK:bob:Maybe"), None);
        assert_eq!(Response::parse("RES:bob"), None);
        assert_eq!(Response::parse("nothing"), None);
    }

    #[test]
    fn test_is_error() {
        assert!(Response::busy().is_error());
        assert!(!Response::welcome("x").is_error());
    }
}
