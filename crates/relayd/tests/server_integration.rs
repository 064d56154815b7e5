//! Integration tests for the TCP relay server.
//!
//! These tests verify the RelayServer works correctly as a complete system:
//! presence announcements, broadcast fan-out, the command set, idle timeout
//! and graceful shutdown, all over real TCP connections.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

mod common;

use std::time::Duration;

use common::TestServer;
use relayd::config::RelayConfig;
use tokio::time::sleep;

// ============================================================================
// Presence Tests
// ============================================================================

#[tokio::test]
async fn test_server_announces_new_client() {
    let server = TestServer::spawn().await;

    let client = server.connect().await;

    assert!(server.registry.contains(&client.addr).await);
    server.shutdown().await;
}

#[tokio::test]
async fn test_existing_clients_see_arrival_and_departure() {
    let server = TestServer::spawn().await;
    let mut clients = server.connect_many(2).await;
    let leaving = clients.pop().unwrap();
    let leaving_addr = leaving.addr.clone();
    let mut stayer = clients.pop().unwrap();

    drop(leaving);

    assert_eq!(
        stayer.recv().await,
        format!("[{leaving_addr}]{leaving_addr}:offline")
    );
    server.wait_for_sessions(1).await;
    assert!(!server.registry.contains(&leaving_addr).await);

    server.shutdown().await;
}

// ============================================================================
// Broadcast Tests
// ============================================================================

#[tokio::test]
async fn test_broadcast_reaches_everyone_including_sender() {
    let server = TestServer::spawn().await;
    let mut clients = server.connect_many(3).await;
    let sender_addr = clients[0].addr.clone();

    clients[0].send("hello everyone").await;

    let expected = format!("[{sender_addr}]{sender_addr}:hello everyone");
    for client in clients.iter_mut() {
        assert_eq!(client.recv().await, expected);
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_broadcasts_arrive_in_order() {
    let server = TestServer::spawn().await;
    let mut clients = server.connect_many(2).await;
    let sender_addr = clients[0].addr.clone();

    for i in 0..20 {
        clients[0].send(&format!("line {i}")).await;
    }

    for client in clients.iter_mut() {
        for i in 0..20 {
            assert_eq!(
                client.recv().await,
                format!("[{sender_addr}]{sender_addr}:line {i}")
            );
        }
    }

    server.shutdown().await;
}

// ============================================================================
// Command Tests
// ============================================================================

#[tokio::test]
async fn test_who_lists_online_sessions_to_requester_only() {
    let server = TestServer::spawn().await;
    let mut clients = server.connect_many(3).await;

    clients[0].send("who").await;

    let mut expected: Vec<String> = clients
        .iter()
        .map(|c| format!("[{0}]{0}:online...", c.addr))
        .collect();
    expected.sort();
    assert_eq!(clients[0].recv_sorted(3).await, expected);

    clients[1].expect_silence().await;
    clients[2].expect_silence().await;
    assert_eq!(server.registry.len().await, 3);

    server.shutdown().await;
}

#[tokio::test]
async fn test_rename_changes_broadcast_name() {
    let server = TestServer::spawn().await;
    let mut clients = server.connect_many(2).await;
    let addr = clients[0].addr.clone();

    clients[0].send("rename|Bob").await;
    assert_eq!(clients[0].recv().await, "your new name: Bob");

    clients[0].send("hi").await;
    assert_eq!(clients[0].recv().await, format!("[{addr}]Bob:hi"));
    assert_eq!(clients[1].recv().await, format!("[{addr}]Bob:hi"));

    assert!(server.registry.contains("Bob").await);
    assert!(!server.registry.contains(&addr).await);

    server.shutdown().await;
}

#[tokio::test]
async fn test_rename_to_taken_name_is_rejected() {
    let server = TestServer::spawn().await;
    let mut clients = server.connect_many(2).await;
    clients[1].send("rename|Bob").await;
    assert_eq!(clients[1].recv().await, "your new name: Bob");
    let before = server.registry.names().await;

    clients[0].send("rename|Bob").await;

    assert_eq!(
        clients[0].recv().await,
        "this name is already registered: Bob"
    );
    assert_eq!(server.registry.names().await, before);

    let addr = clients[0].addr.clone();
    clients[0].send("still me").await;
    assert_eq!(
        clients[0].recv().await,
        format!("[{addr}]{addr}:still me")
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_direct_message_reaches_only_target() {
    let server = TestServer::spawn().await;
    let mut clients = server.connect_many(3).await;
    clients[1].send("rename|Carol").await;
    assert_eq!(clients[1].recv().await, "your new name: Carol");
    clients[0].send("rename|Alice").await;
    assert_eq!(clients[0].recv().await, "your new name: Alice");

    clients[0].send("to|Carol|hello").await;

    assert_eq!(clients[1].recv().await, "Alice say: hello");
    clients[0].expect_silence().await;
    clients[2].expect_silence().await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_direct_message_to_unknown_user() {
    let server = TestServer::spawn().await;
    let mut clients = server.connect_many(2).await;

    clients[0].send("to|Carol|hello").await;

    assert_eq!(clients[0].recv().await, "user Carol is not online");
    clients[1].expect_silence().await;

    server.shutdown().await;
}

// ============================================================================
// Idle Timeout Tests
// ============================================================================

fn short_timeout_config() -> RelayConfig {
    RelayConfig {
        idle_timeout_secs: 1,
        ..TestServer::config()
    }
}

#[tokio::test]
async fn test_idle_client_is_forced_offline() {
    let server = TestServer::spawn_with(short_timeout_config()).await;
    let mut clients = server.connect_many(2).await;
    let idle_addr = clients[0].addr.clone();

    // Keep the second client alive while the first idles out.
    let mut saw_offline = false;
    for _ in 0..4 {
        sleep(Duration::from_millis(400)).await;
        clients[1].send("ping").await;
        loop {
            let line = clients[1].recv().await;
            if line == format!("[{idle_addr}]{idle_addr}:offline") {
                saw_offline = true;
            } else {
                assert!(line.ends_with(":ping"), "unexpected line {line:?}");
                break;
            }
        }
    }

    let mut idle = clients.remove(0);
    let mut received = Vec::new();
    loop {
        let line = idle.recv().await;
        let done = line == "you are overtime, Forced offline";
        received.push(line);
        if done {
            break;
        }
    }
    idle.expect_closed().await;

    assert!(saw_offline, "peer never saw the offline announcement");
    assert!(!server.registry.contains(&idle_addr).await);
    assert_eq!(server.registry.len().await, 1);

    server.shutdown().await;
}

// ============================================================================
// Shutdown Tests
// ============================================================================

#[tokio::test]
async fn test_graceful_shutdown_closes_clients() {
    let server = TestServer::spawn().await;
    let mut clients = server.connect_many(2).await;
    let registry = server.registry.clone();

    server.shutdown().await;

    for client in clients.iter_mut() {
        client.expect_closed().await;
    }
    assert!(registry.is_empty().await);
}
