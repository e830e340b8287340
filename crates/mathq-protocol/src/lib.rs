//! mathq Protocol - Line-oriented wire protocol
//!
//! Every message is one UTF-8 line of colon-delimited fields.
//!
//! Client to server:
//!
//! ```text
//! JOIN:<name>
//! CALC:<name>:<expression>
//! LEAVE:<name>
//! ```
//!
//! Server to client:
//!
//! ```text
//! ACK:<name>:Welcome
//! ACK:<name>:Goodbye
//! RES:<name>:<result>
//! ERR:<message>
//! ```

pub mod command;
pub mod response;

pub use command::{Command, Malformed};
pub use response::{Response, INVALID_FORMAT, NAME_TAKEN, SERVER_BUSY};

/// Field separator used by every message.
pub const SEPARATOR: char = ':';
