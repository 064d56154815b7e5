//! Online registry: display name → session handle.
//!
//! One registry instance lives for the lifetime of the server and is shared
//! by every session, the router and the server itself.
//!
//! # Locking
//!
//! Every operation takes the single `RwLock` for exactly its own duration.
//! Multi-step sequences (`rename`, `try_put`, `for_each`) hold the lock for
//! the whole sequence, so no other task can observe a half-applied change.
//! Callbacks passed to `for_each` run under the lock and must not await;
//! pushing onto an outbound queue is the only thing they are expected to do.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Failed mutations leave the map untouched

mod peer;

pub use peer::{OutboundReceiver, OutboundSender, PeerHandle, SessionId};

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

type NameMap = HashMap<String, PeerHandle>;

/// Shared, lock-protected map of online sessions keyed by display name.
///
/// Cloning is cheap; all clones refer to the same map.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<NameMap>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `peer` under `name`, replacing whatever was there.
    ///
    /// Returns the displaced handle, if any. Sessions use [`Registry::try_put`]
    /// to come online; this is the unchecked primitive.
    pub async fn put(&self, name: impl Into<String>, peer: PeerHandle) -> Option<PeerHandle> {
        self.inner.write().await.insert(name.into(), peer)
    }

    /// Inserts `peer` under `name` only if the name is free.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NameTaken` if another entry already uses `name`
    pub async fn try_put(&self, name: &str, peer: PeerHandle) -> Result<(), RegistryError> {
        let mut map = self.inner.write().await;
        if map.contains_key(name) {
            return Err(RegistryError::NameTaken {
                name: name.to_string(),
            });
        }
        map.insert(name.to_string(), peer);
        Ok(())
    }

    /// Removes the entry under `name`, whoever owns it.
    pub async fn remove(&self, name: &str) -> Option<PeerHandle> {
        self.inner.write().await.remove(name)
    }

    /// Removes the entry under `name` only if it belongs to session `id`.
    ///
    /// Returns true if an entry was removed.
    pub async fn remove_session(&self, name: &str, id: SessionId) -> bool {
        let mut map = self.inner.write().await;
        match map.get(name) {
            Some(peer) if peer.id() == id => {
                map.remove(name);
                true
            }
            Some(peer) => {
                debug!(
                    name = %name,
                    owner = %peer.id(),
                    requested_by = %id,
                    "Name owned by another session, not removing"
                );
                false
            }
            None => false,
        }
    }

    pub async fn get(&self, name: &str) -> Option<PeerHandle> {
        self.inner.read().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.inner.read().await.contains_key(name)
    }

    /// Number of online sessions.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Sorted snapshot of every registered name.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Calls `f` for every entry while holding the lock.
    pub async fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &PeerHandle),
    {
        let map = self.inner.read().await;
        for (name, peer) in map.iter() {
            f(name, peer);
        }
    }

    /// Re-keys `peer` from `old_name` to `new_name` in one critical section.
    ///
    /// The old entry is only dropped if it belongs to `peer`, so a stale
    /// name can never evict another session.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NameTaken` if `new_name` is already registered;
    ///   the map is left exactly as it was
    pub async fn rename(
        &self,
        old_name: &str,
        new_name: &str,
        peer: &PeerHandle,
    ) -> Result<(), RegistryError> {
        let mut map = self.inner.write().await;

        if map.contains_key(new_name) {
            return Err(RegistryError::NameTaken {
                name: new_name.to_string(),
            });
        }

        if map.get(old_name).is_some_and(|p| p.id() == peer.id()) {
            map.remove(old_name);
        }
        map.insert(new_name.to_string(), peer.clone());

        Ok(())
    }
}

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Name already taken: {name}")]
    NameTaken { name: String },
}
