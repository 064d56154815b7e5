//! TCP server for the chat relay.
//!
//! The server:
//! - Listens on a TCP socket for chat clients
//! - Runs a session for each connection, up to `max_sessions`
//! - Owns the registry and the broadcast router for its whole lifetime
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   RelayServer   │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │  run_session    │────▶│    Registry     │
//! │  (per client)   │     │                 │
//! └───────┬─────────┘     └────────▲────────┘
//!         │ broadcast              │ fan-out
//!         ▼                        │
//! ┌─────────────────┐              │
//! │ BroadcastRouter │──────────────┘
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept errors are logged and the server keeps running

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use relay_protocol::Reply;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::registry::{Registry, SessionId};
use crate::router::spawn_router;
use crate::session::{run_session, SessionContext};

/// TCP chat relay server.
pub struct RelayServer {
    listener: TcpListener,

    local_addr: SocketAddr,

    /// Shared context cloned into every session
    context: SessionContext,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for generating session IDs
    connection_counter: AtomicU64,

    /// One permit per concurrent session
    capacity: Arc<Semaphore>,
}

impl RelayServer {
    /// Binds the listener and starts the broadcast router.
    ///
    /// # Errors
    ///
    /// - `ServerError::Bind` if the address cannot be bound
    pub async fn bind(
        config: &RelayConfig,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind.as_str())
            .await
            .map_err(|e| ServerError::Bind {
                addr: config.bind.clone(),
                error: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| ServerError::Bind {
            addr: config.bind.clone(),
            error: e.to_string(),
        })?;

        let registry = Registry::new();
        let router = spawn_router(registry.clone(), cancel_token.clone());
        let context = SessionContext::new(registry, router, config.session_settings());

        Ok(Self {
            listener,
            local_addr,
            context,
            cancel_token,
            connection_counter: AtomicU64::new(0),
            capacity: Arc::new(Semaphore::new(config.max_sessions)),
        })
    }

    /// Address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The server's online registry.
    pub fn registry(&self) -> &Registry {
        &self.context.registry
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered, then
    /// waits for every session to go offline and close its connection.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(addr = %self.local_addr, "Relay server listening");

        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(&mut sessions, stream, addr, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        let remaining = sessions.len();
        while sessions.join_next().await.is_some() {}
        info!(sessions = remaining, "Server cleanup complete");
        Ok(())
    }

    /// Starts a session for a new connection, or turns it away when full.
    fn handle_connection(
        &self,
        sessions: &mut JoinSet<()>,
        stream: TcpStream,
        addr: SocketAddr,
        connection_number: u64,
    ) {
        let Ok(permit) = Arc::clone(&self.capacity).try_acquire_owned() else {
            warn!(addr = %addr, "Session limit reached, refusing connection");
            sessions.spawn(refuse(stream));
            return;
        };

        let id = SessionId::new(connection_number);
        let context = self.context.clone();
        let shutdown = self.cancel_token.clone();
        debug!(session_id = %id, addr = %addr, "Client connected");

        sessions.spawn(async move {
            let (reader, writer) = stream.into_split();
            run_session(reader, writer, id, addr.to_string(), context, &shutdown).await;
            drop(permit);
        });
    }
}

async fn refuse(mut stream: TcpStream) {
    let line = format!("{}\n", Reply::ServerFull);
    if let Err(e) = stream.write_all(line.as_bytes()).await {
        debug!(error = %e, "Failed to notify refused client");
    }
    if let Err(e) = stream.shutdown().await {
        debug!(error = %e, "Failed to close refused connection");
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: String, error: String },
}
