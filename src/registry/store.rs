//! Client registry implementation
//!
//! The set of live connections for one broker. Every connection adds itself
//! on accept and removes itself when it ends; the dispatcher takes snapshots
//! to find fan-out targets.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::entry::{ClientId, ConnectionHandle};

/// Registry of connections, keyed by client id
///
/// Thread-safe via `RwLock`. Publishes only need the read lock, and only for
/// as long as it takes to clone the entry list.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, Arc<ConnectionHandle>>>,

    /// Entries ever added
    added: AtomicUsize,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection, replacing any entry with the same id
    pub async fn add(&self, handle: Arc<ConnectionHandle>) {
        let mut clients = self.clients.write().await;
        let id = handle.id().clone();

        if clients.insert(id.clone(), handle).is_some() {
            tracing::warn!(client_id = %id, "Replaced registry entry with the same id");
        }
        let total = self.added.fetch_add(1, Ordering::Relaxed) + 1;

        tracing::debug!(
            client_id = %id,
            live = clients.len(),
            total = total,
            "Client registered"
        );
    }

    /// Remove a connection
    ///
    /// Only removes the entry if it is this very connection, so a finished
    /// connection cannot evict a newer one that reused its id.
    pub async fn remove(&self, handle: &Arc<ConnectionHandle>) -> bool {
        let mut clients = self.clients.write().await;

        match clients.get(handle.id()) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                clients.remove(handle.id());
                tracing::debug!(
                    client_id = %handle.id(),
                    live = clients.len(),
                    "Client unregistered"
                );
                true
            }
            _ => false,
        }
    }

    /// Number of entries ever added
    pub fn size(&self) -> usize {
        self.added.load(Ordering::Relaxed)
    }

    /// Number of entries currently registered
    pub async fn live_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Look up a connection by id
    pub async fn get(&self, id: &str) -> Option<Arc<ConnectionHandle>> {
        self.clients.read().await.get(id).cloned()
    }

    /// Point-in-time copy of all entries
    ///
    /// The lock is released before this returns, so callers may await on the
    /// entries without blocking `add` or `remove`.
    pub async fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        self.clients.read().await.values().cloned().collect()
    }
}
