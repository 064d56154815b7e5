//! Parsing of inbound client lines.
//!
//! Every line a client sends is one of four commands. Matching is
//! case-sensitive and the separator is `|`:
//!
//! ```text
//! who                         list online users
//! rename|<new name>           change display name
//! to|<target>|<content>       private message
//! <anything else>             broadcast to everyone
//! ```

use thiserror::Error;

/// Exact text of the online listing command.
pub const WHO: &str = "who";

/// Prefix of the rename command.
pub const RENAME_PREFIX: &str = "rename|";

/// Prefix of the direct message command.
pub const DIRECT_PREFIX: &str = "to|";

const SEPARATOR: char = '|';

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List every online session.
    Who,

    /// Change the sender's display name.
    Rename {
        /// Requested display name
        new_name: String,
    },

    /// Deliver a message to a single session.
    ///
    /// `content` may be empty here; the interpreter rejects it only after
    /// the target lookup so the client learns about a missing user first.
    Direct {
        /// Display name of the recipient
        target: String,
        /// Message body (may itself contain `|`)
        content: String,
    },

    /// Relay the line verbatim to every online session.
    Broadcast(String),
}

impl Command {
    /// Parses one line of client input (without its line terminator).
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidName` for `rename|` with an empty name or a
    ///   name containing `|`
    /// - `ProtocolError::MissingTarget` for `to|` without a recipient
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        if line == WHO {
            return Ok(Self::Who);
        }

        if let Some(rest) = line.strip_prefix(RENAME_PREFIX) {
            let new_name = rest.trim();
            if new_name.is_empty() || new_name.contains(SEPARATOR) {
                return Err(ProtocolError::InvalidName(rest.to_string()));
            }
            return Ok(Self::Rename {
                new_name: new_name.to_string(),
            });
        }

        if let Some(rest) = line.strip_prefix(DIRECT_PREFIX) {
            let mut parts = rest.splitn(2, SEPARATOR);
            let target = parts.next().unwrap_or_default();
            if target.is_empty() {
                return Err(ProtocolError::MissingTarget);
            }
            let content = parts.next().unwrap_or_default();
            return Ok(Self::Direct {
                target: target.to_string(),
                content: content.to_string(),
            });
        }

        Ok(Self::Broadcast(line.to_string()))
    }

    /// Short label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Who => "who",
            Self::Rename { .. } => "rename",
            Self::Direct { .. } => "direct",
            Self::Broadcast(_) => "broadcast",
        }
    }
}

/// Errors produced while parsing a command line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid display name: {0:?}")]
    InvalidName(String),

    #[error("Direct message is missing a recipient")]
    MissingTarget,
}
