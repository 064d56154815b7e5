//! Broadcast router: single-consumer fan-out queue.
//!
//! ```text
//! ┌──────────┐  broadcast()   ┌──────────────────┐   deliver()   ┌──────────────┐
//! │ Sessions │───────────────▶│  BroadcastRouter │──────────────▶│ every online │
//! │ (many)   │  mpsc (FIFO)   │  (one drain task)│ registry lock │ outbound q.  │
//! └──────────┘                └──────────────────┘               └──────────────┘
//! ```
//!
//! Producers format the message once and enqueue it without waiting for
//! delivery. The drain task takes one message at a time and pushes it to
//! every registered session while holding the registry lock, so all sessions
//! see router messages in the same order.

use relay_protocol::BroadcastMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::registry::Registry;

/// Producer handle for the broadcast router.
///
/// Cheap to clone; every session keeps one.
#[derive(Debug, Clone)]
pub struct RouterHandle {
    sender: mpsc::UnboundedSender<String>,
}

impl RouterHandle {
    /// Formats `message` and enqueues it for fan-out.
    ///
    /// Never waits on delivery. If the router has already stopped the
    /// message is dropped.
    pub fn broadcast(&self, message: BroadcastMessage) {
        self.publish(message.to_string());
    }

    /// Enqueues an already formatted line.
    pub fn publish(&self, line: String) {
        if self.sender.send(line).is_err() {
            debug!("Router stopped, dropping broadcast");
        }
    }
}

/// Owner of the router queue and its drain loop.
pub struct BroadcastRouter {
    receiver: mpsc::UnboundedReceiver<String>,
    registry: Registry,
    cancel_token: CancellationToken,
}

impl BroadcastRouter {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<String>,
        registry: Registry,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            registry,
            cancel_token,
        }
    }

    /// Drains the queue until every producer is gone or shutdown is requested.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!("Broadcast router shutting down");
                    break;
                }

                next = self.receiver.recv() => {
                    match next {
                        Some(line) => {
                            fan_out(&self.registry, &line).await;
                        }
                        None => {
                            debug!("Broadcast queue closed");
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Pushes `line` onto every registered session's outbound queue.
///
/// Returns the number of sessions the line was queued for.
pub async fn fan_out(registry: &Registry, line: &str) -> usize {
    let mut delivered = 0;
    let mut dropped = 0;

    registry
        .for_each(|_, peer| {
            if peer.deliver(line) {
                delivered += 1;
            } else {
                dropped += 1;
            }
        })
        .await;

    debug!(delivered, dropped, "Broadcast fanned out");
    delivered
}

/// Spawns the router drain task and returns a producer handle.
pub fn spawn_router(registry: Registry, cancel_token: CancellationToken) -> RouterHandle {
    let (sender, receiver) = mpsc::unbounded_channel();
    let router = BroadcastRouter::new(receiver, registry, cancel_token);
    tokio::spawn(router.run());
    RouterHandle { sender }
}
