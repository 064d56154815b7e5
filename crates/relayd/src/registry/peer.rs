//! Shared handle to one connected session.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

/// Process-unique identifier for a connection.
///
/// Assigned from the server's connection counter. Display names can change
/// and be reused; the id never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sender half of a session's outbound queue.
pub type OutboundSender = mpsc::UnboundedSender<String>;

/// Receiver half of a session's outbound queue, drained by the writer task.
pub type OutboundReceiver = mpsc::UnboundedReceiver<String>;

/// Cheap-to-clone handle the registry keeps for each online session.
///
/// Holds the remote address and the sending side of the session's outbound
/// queue. Pushing never blocks, so a slow client cannot stall whoever is
/// delivering to it.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    id: SessionId,
    addr: Arc<str>,
    outbound: OutboundSender,
}

impl PeerHandle {
    pub fn new(id: SessionId, addr: impl Into<Arc<str>>, outbound: OutboundSender) -> Self {
        Self {
            id,
            addr: addr.into(),
            outbound,
        }
    }

    /// Creates a handle together with a fresh outbound queue.
    pub fn with_queue(id: SessionId, addr: impl Into<Arc<str>>) -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(id, addr, tx), rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Transport-level remote address of the session.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Queues one line for delivery.
    ///
    /// Returns `false` if the session's writer has already gone away; the
    /// line is dropped in that case.
    pub fn deliver(&self, line: impl Into<String>) -> bool {
        match self.outbound.send(line.into()) {
            Ok(()) => true,
            Err(_) => {
                debug!(session_id = %self.id, "Outbound queue closed, dropping line");
                false
            }
        }
    }

    /// Returns true once the writer side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}
