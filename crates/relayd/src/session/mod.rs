//! Per-connection chat sessions.
//!
//! Each accepted connection runs as three cooperating tasks:
//!
//! ```text
//!                 ┌───────────────┐ pulse  ┌─────────────┐
//!  socket read ──▶│  reader path  │───────▶│ IdleMonitor │
//!                 │ (interpreter) │        └──────┬──────┘
//!                 └───────┬───────┘               │ cancel + notice
//!                         │ registry / router     ▼
//!                         ▼               ┌───────────────┐
//!                 outbound queue ────────▶│ deliver_loop  │──▶ socket write
//!                                         └───────────────┘
//! ```
//!
//! The session token (a child of the server shutdown token) is the only
//! cancellation primitive. Whoever ends the session first (EOF, read error,
//! idle timeout, failed write, shutdown) just cancels it; the reader path is
//! the single place that takes the session offline, so teardown runs once.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Transport errors end the offending session only

pub mod idle;
pub mod interpreter;
pub mod writer;

pub use idle::{liveness_channel, IdleMonitor, IdleState, LivenessSignal};

use std::time::Duration;

use futures::StreamExt;
use relay_protocol::{
    BroadcastMessage, Frame, LineCodec, Rejection, Reply, DEFAULT_MAX_LINE_LENGTH,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::registry::{PeerHandle, Registry, RegistryError, SessionId};
use crate::router::RouterHandle;

/// Default inactivity window before a session is forced offline.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Default per-line write timeout.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-session tunables, derived from the relay configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub idle_timeout: Duration,
    pub write_timeout: Duration,
    pub max_line_length: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

/// Shared server context handed to every session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub registry: Registry,
    pub router: RouterHandle,
    pub settings: SessionSettings,
}

impl SessionContext {
    pub fn new(registry: Registry, router: RouterHandle, settings: SessionSettings) -> Self {
        Self {
            registry,
            router,
            settings,
        }
    }
}

/// One client's identity and presence.
///
/// Owned by the session's reader path. The display name starts out as the
/// remote address and is only ever changed together with its registry key.
pub struct Session {
    id: SessionId,
    addr: String,
    name: String,
    peer: PeerHandle,
    ctx: SessionContext,
    online: bool,
}

impl Session {
    pub fn new(addr: impl Into<String>, peer: PeerHandle, ctx: SessionContext) -> Self {
        let addr = addr.into();
        Self {
            id: peer.id(),
            name: addr.clone(),
            addr,
            peer,
            ctx,
            online: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Current display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn peer(&self) -> &PeerHandle {
        &self.peer
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Registers the session and announces it to everyone.
    ///
    /// If the initial name is already held (someone renamed themselves to
    /// this address), a `<addr>#<id>` fallback is used instead of evicting
    /// the other session.
    pub async fn online(&mut self) {
        if self.online {
            return;
        }

        let mut attempt = 0u32;
        while let Err(RegistryError::NameTaken { name }) = self
            .ctx
            .registry
            .try_put(&self.name, self.peer.clone())
            .await
        {
            attempt += 1;
            debug!(session_id = %self.id, name = %name, "Initial name taken, using fallback");
            self.name = fallback_name(&self.addr, self.id, attempt);
        }

        self.online = true;
        info!(session_id = %self.id, addr = %self.addr, name = %self.name, "Session online");
        self.broadcast("online");
    }

    /// Unregisters the session and announces its departure.
    ///
    /// Returns false if the session was not online; repeated calls are no-ops.
    pub async fn offline(&mut self) -> bool {
        if !self.online {
            return false;
        }
        self.online = false;

        self.ctx.registry.remove_session(&self.name, self.id).await;
        info!(session_id = %self.id, name = %self.name, "Session offline");
        self.broadcast("offline");
        true
    }

    /// Queues a reply for this session's client. Best-effort.
    pub fn send(&self, reply: Reply) {
        self.peer.deliver(reply.to_string());
    }

    /// Hands `text` to the router as `[addr]name:text`.
    pub fn broadcast(&self, text: &str) {
        self.ctx
            .router
            .broadcast(BroadcastMessage::new(self.addr.as_str(), self.name.as_str(), text));
    }
}

fn fallback_name(addr: &str, id: SessionId, attempt: u32) -> String {
    if attempt <= 1 {
        format!("{addr}#{id}")
    } else {
        format!("{addr}#{id}.{attempt}")
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Client closed the connection (EOF)
    Closed,
    /// Reading from the connection failed
    ReadFailed,
    /// No activity within the idle window
    TimedOut,
    /// Server shutdown or a failed write
    Cancelled,
}

/// Runs one client session to completion.
///
/// Spawns the writer and idle monitor tasks, brings the session online,
/// feeds every inbound line to the interpreter, and tears everything down
/// when the connection ends. Returns once the connection has been flushed
/// and closed.
pub async fn run_session<R, W>(
    reader: R,
    writer: W,
    id: SessionId,
    addr: String,
    ctx: SessionContext,
    shutdown: &CancellationToken,
) -> DisconnectReason
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let settings = ctx.settings;
    let cancel_token = shutdown.child_token();
    let (peer, outbound) = PeerHandle::with_queue(id, addr.as_str());

    let writer_task = tokio::spawn(writer::deliver_loop(
        writer,
        outbound,
        cancel_token.clone(),
        settings.write_timeout,
        id,
    ));

    let (liveness, liveness_rx) = liveness_channel();
    let monitor = IdleMonitor::new(
        settings.idle_timeout,
        liveness_rx,
        peer.clone(),
        cancel_token.clone(),
    );
    let monitor_task = tokio::spawn(monitor.run());

    let mut session = Session::new(addr, peer, ctx);
    session.online().await;

    let mut frames = FramedRead::new(reader, LineCodec::new(settings.max_line_length));
    let mut reason = read_lines(&mut frames, &mut session, &liveness, &cancel_token).await;

    session.offline().await;
    cancel_token.cancel();
    drop(liveness);
    drop(session);

    if let Ok(IdleState::TimedOut) = monitor_task.await {
        reason = DisconnectReason::TimedOut;
    }
    if let Err(e) = writer_task.await {
        debug!(session_id = %id, error = %e, "Writer task failed");
    }

    info!(session_id = %id, reason = ?reason, "Session closed");
    reason
}

async fn read_lines<R>(
    frames: &mut FramedRead<R, LineCodec>,
    session: &mut Session,
    liveness: &LivenessSignal,
    cancel_token: &CancellationToken,
) -> DisconnectReason
where
    R: AsyncRead + Unpin,
{
    loop {
        let next = tokio::select! {
            _ = cancel_token.cancelled() => return DisconnectReason::Cancelled,
            next = frames.next() => next,
        };

        match next {
            Some(Ok(Frame::Line(text))) => {
                interpreter::execute(session, &text).await;
            }
            Some(Ok(Frame::TooLong)) => {
                let max = frames.decoder().max_length();
                debug!(session_id = %session.id(), max, "Dropping oversized line");
                session.send(Reply::from(Rejection::LineTooLong { max }));
            }
            Some(Err(e)) => {
                debug!(session_id = %session.id(), error = %e, "Read failed");
                return DisconnectReason::ReadFailed;
            }
            None => {
                debug!(session_id = %session.id(), "Client sent EOF");
                return DisconnectReason::Closed;
            }
        }

        liveness.pulse();
    }
}

/// Errors that can occur while writing to a session's connection.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Write timeout")]
    WriteTimeout,
}
