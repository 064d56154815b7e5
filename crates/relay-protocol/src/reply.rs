//! Lines sent from the relay to clients.

use std::fmt;

use crate::command::ProtocolError;

/// Notice sent to a session right before it is disconnected for inactivity.
pub const TIMEOUT_NOTICE: &str = "you are overtime, Forced offline";

/// A chat line addressed to every online session.
///
/// Rendered once when the broadcast is requested; the formatted string is
/// what the router fans out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastMessage {
    pub sender_addr: String,
    pub sender_name: String,
    pub text: String,
}

impl BroadcastMessage {
    pub fn new(
        sender_addr: impl Into<String>,
        sender_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            sender_addr: sender_addr.into(),
            sender_name: sender_name.into(),
            text: text.into(),
        }
    }
}

impl fmt::Display for BroadcastMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]{}:{}", self.sender_addr, self.sender_name, self.text)
    }
}

/// Lines the relay writes back to a single client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// One entry of a `who` listing
    OnlineEntry { addr: String, name: String },

    /// Private message from another session
    Direct { from: String, content: String },

    /// Rename succeeded
    Renamed { name: String },

    /// Forced disconnect after the idle window elapsed
    TimedOut,

    /// The relay is at capacity and refuses the connection
    ServerFull,

    /// A command was refused without changing any state
    Rejected(Rejection),
}

impl Reply {
    pub fn online_entry(addr: impl Into<String>, name: impl Into<String>) -> Self {
        Self::OnlineEntry {
            addr: addr.into(),
            name: name.into(),
        }
    }

    pub fn direct(from: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Direct {
            from: from.into(),
            content: content.into(),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnlineEntry { addr, name } => write!(f, "[{addr}]{name}:online..."),
            Self::Direct { from, content } => write!(f, "{from} say: {content}"),
            Self::Renamed { name } => write!(f, "your new name: {name}"),
            Self::TimedOut => f.write_str(TIMEOUT_NOTICE),
            Self::ServerFull => f.write_str("server is full, try again later"),
            Self::Rejected(rejection) => fmt::Display::fmt(rejection, f),
        }
    }
}

impl From<Rejection> for Reply {
    fn from(rejection: Rejection) -> Self {
        Self::Rejected(rejection)
    }
}

/// Protocol-level refusals reported back to the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NameTaken { name: String },
    UserNotFound { name: String },
    EmptyMessage,
    MalformedRename,
    MalformedDirect,
    LineTooLong { max: usize },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameTaken { name } => write!(f, "this name is already registered: {name}"),
            Self::UserNotFound { name } => write!(f, "user {name} is not online"),
            Self::EmptyMessage => f.write_str("this msg is empty, please repeat send!"),
            Self::MalformedRename => {
                f.write_str("the rename format is not valid, please use: rename|name")
            }
            Self::MalformedDirect => {
                f.write_str("the msg format is not valid, please use: to|name|content...")
            }
            Self::LineTooLong { max } => write!(f, "message too long (max {max} bytes)"),
        }
    }
}

impl From<ProtocolError> for Rejection {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidName(_) => Self::MalformedRename,
            ProtocolError::MissingTarget => Self::MalformedDirect,
        }
    }
}
