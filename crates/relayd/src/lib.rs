//! Relay Daemon - Session registry and broadcast engine
//!
//! This crate provides the core of the chat relay:
//! - `registry` - Lock-protected map of online sessions by display name
//! - `router` - Single-consumer broadcast queue and fan-out task
//! - `session` - Per-connection lifecycle, command interpreter, idle monitor
//! - `server` - TCP listener and accept loop
//! - `config` - TOML / environment configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        relayd                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   RelayServer   │────▶│         Registry            │   │
//! │  │  (TcpListener)  │     │  (name → PeerHandle, lock)  │   │
//! │  └────────┬────────┘     └──────────────▲──────────────┘   │
//! │           │                             │                   │
//! │           │ connections                 │ fan-out           │
//! │           ▼                             │                   │
//! │  ┌─────────────────┐     ┌──────────────┴──────────────┐   │
//! │  │     Session     │────▶│      BroadcastRouter        │   │
//! │  │ reader / writer │     │   (single drain task)       │   │
//! │  │  idle monitor   │     └─────────────────────────────┘   │
//! │  └─────────────────┘                                       │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
