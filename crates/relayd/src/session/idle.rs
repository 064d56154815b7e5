//! Idle monitor: forced disconnect after an inactivity window.
//!
//! The reader path pulses a [`LivenessSignal`] for every line it handles.
//! The monitor runs as its own task and races that signal against the
//! window:
//!
//! ```text
//!            pulse (window restarts)
//!            ┌────┐
//!            ▼    │
//!        ┌────────┴┐  window elapsed   ┌──────────┐
//!  ────▶ │ Active  │ ─────────────────▶│ TimedOut │
//!        └─────────┘                   └──────────┘
//! ```
//!
//! Entering `TimedOut` queues the timeout notice for the client and cancels
//! the session token; the reader and writer tasks take it from there.

use std::time::Duration;

use relay_protocol::Reply;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::registry::PeerHandle;

/// Monitor state. `TimedOut` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
    Active,
    TimedOut,
}

/// Reader-side half of the liveness channel.
#[derive(Debug, Clone)]
pub struct LivenessSignal {
    sender: mpsc::Sender<()>,
}

impl LivenessSignal {
    /// Records activity. Never blocks the reader.
    pub fn pulse(&self) {
        match self.sender.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => {
                debug!("Idle monitor gone, dropping pulse");
            }
        }
    }
}

/// Creates a liveness channel for one session.
pub fn liveness_channel() -> (LivenessSignal, mpsc::Receiver<()>) {
    let (sender, receiver) = mpsc::channel(1);
    (LivenessSignal { sender }, receiver)
}

pub struct IdleMonitor {
    window: Duration,
    liveness: mpsc::Receiver<()>,
    peer: PeerHandle,
    cancel_token: CancellationToken,
    state: IdleState,
}

impl IdleMonitor {
    pub fn new(
        window: Duration,
        liveness: mpsc::Receiver<()>,
        peer: PeerHandle,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            window,
            liveness,
            peer,
            cancel_token,
            state: IdleState::Active,
        }
    }

    pub fn state(&self) -> IdleState {
        self.state
    }

    /// Runs until the session ends or the window elapses without a pulse.
    ///
    /// Returns the final state.
    pub async fn run(mut self) -> IdleState {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    return self.state;
                }

                signal = timeout(self.window, self.liveness.recv()) => {
                    match signal {
                        Ok(Some(())) => continue,
                        // Reader dropped its signal: session is ending anyway.
                        Ok(None) => return self.state,
                        Err(_) => {
                            self.time_out();
                            return self.state;
                        }
                    }
                }
            }
        }
    }

    fn time_out(&mut self) {
        self.state = IdleState::TimedOut;
        info!(
            session_id = %self.peer.id(),
            addr = %self.peer.addr(),
            window_secs = self.window.as_secs(),
            "Session idle, forcing offline"
        );
        self.peer.deliver(Reply::TimedOut.to_string());
        self.cancel_token.cancel();
    }
}
