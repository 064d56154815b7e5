//! Shared harness for relay integration tests.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.
//! We test the panic-free behavior of production code through assertions.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use relayd::config::RelayConfig;
use relayd::registry::Registry;
use relayd::server::{RelayServer, ServerError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for an expected line
pub const RECV_TIMEOUT: Duration = Duration::from_secs(3);

/// How long a client must stay quiet to count as "received nothing"
pub const SILENCE_WINDOW: Duration = Duration::from_millis(150);

/// Interval between registry polls
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Test Server
// ============================================================================

/// Test server context that manages server lifecycle.
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Registry,
    cancel_token: CancellationToken,
    task: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    /// Config bound to an ephemeral localhost port.
    pub fn config() -> RelayConfig {
        RelayConfig {
            bind: "127.0.0.1:0".to_string(),
            ..RelayConfig::default()
        }
    }

    pub async fn spawn() -> Self {
        Self::spawn_with(Self::config()).await
    }

    pub async fn spawn_with(config: RelayConfig) -> Self {
        let cancel_token = CancellationToken::new();
        let server = RelayServer::bind(&config, cancel_token.clone())
            .await
            .expect("bind test server");
        let addr = server.local_addr();
        let registry = server.registry().clone();

        let task = tokio::spawn(server.run());

        TestServer {
            addr,
            registry,
            cancel_token,
            task,
        }
    }

    /// Opens a raw connection without consuming anything.
    pub async fn connect_raw(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr).await.expect("connect to server");
        TestClient::new(stream)
    }

    /// Connects and consumes the client's own online announcement.
    pub async fn connect(&self) -> TestClient {
        let mut client = self.connect_raw().await;
        let expected = format!("[{0}]{0}:online", client.addr);
        assert_eq!(client.recv().await, expected);
        client
    }

    /// Connects `n` clients, draining every online announcement so each
    /// client starts with an empty inbox.
    pub async fn connect_many(&self, n: usize) -> Vec<TestClient> {
        let mut clients: Vec<TestClient> = Vec::with_capacity(n);
        for _ in 0..n {
            let client = self.connect().await;
            let expected = format!("[{0}]{0}:online", client.addr);
            for existing in clients.iter_mut() {
                assert_eq!(existing.recv().await, expected);
            }
            clients.push(client);
        }
        clients
    }

    /// Polls the registry until it holds `expected` sessions.
    pub async fn wait_for_sessions(&self, expected: usize) {
        let result = timeout(RECV_TIMEOUT, async {
            while self.registry.len().await != expected {
                sleep(POLL_INTERVAL).await;
            }
        })
        .await;
        assert!(
            result.is_ok(),
            "registry never reached {expected} sessions (has {})",
            self.registry.len().await
        );
    }

    /// Cancels the server and waits for it to finish.
    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        let result = timeout(RECV_TIMEOUT, self.task)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked");
        assert!(result.is_ok());
    }
}

// ============================================================================
// Test Client
// ============================================================================

/// Line-oriented TCP client.
pub struct TestClient {
    /// Our address as the server sees it
    pub addr: String,
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    fn new(stream: TcpStream) -> Self {
        let addr = stream.local_addr().expect("local addr").to_string();
        let (reader, writer) = stream.into_split();
        Self {
            addr,
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.send_raw(line.as_bytes()).await;
        self.send_raw(b"\n").await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write to server");
        self.writer.flush().await.expect("flush");
    }

    /// Receives one line, failing on timeout or EOF.
    pub async fn recv(&mut self) -> String {
        timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for line")
            .expect("read from server")
            .expect("server closed the connection")
    }

    /// Receives `n` lines and returns them sorted.
    pub async fn recv_sorted(&mut self, n: usize) -> Vec<String> {
        let mut lines = Vec::with_capacity(n);
        for _ in 0..n {
            lines.push(self.recv().await);
        }
        lines.sort();
        lines
    }

    /// Asserts the server closes the connection (possibly after a reset).
    pub async fn expect_closed(&mut self) {
        let next = timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for close");
        match next {
            Ok(None) | Err(_) => {}
            Ok(Some(line)) => panic!("expected close, got line {line:?}"),
        }
    }

    /// Asserts nothing arrives within the silence window.
    pub async fn expect_silence(&mut self) {
        if let Ok(next) = timeout(SILENCE_WINDOW, self.lines.next_line()).await {
            panic!("expected silence, got {next:?}");
        }
    }
}
