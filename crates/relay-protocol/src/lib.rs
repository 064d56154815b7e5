//! Relay Protocol - Line-oriented text protocol for the chat relay
//!
//! This crate provides the bounded line decoder for client input, the
//! command parser for those lines, and the formatting of every line the
//! relay sends back.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod codec;
pub mod command;
pub mod reply;

pub use codec::{Frame, LineCodec};
pub use command::{Command, ProtocolError, DIRECT_PREFIX, RENAME_PREFIX, WHO};
pub use reply::{BroadcastMessage, Rejection, Reply, TIMEOUT_NOTICE};

/// Maximum accepted length of a single inbound line, in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;
