//! Wire protocol: line framing and command/response translation.

pub mod codec;
pub mod framer;

pub use codec::{Command, Response, MAX_COMMAND_LENGTH};
pub use framer::{LineFramer, LINE_TERMINATOR};
