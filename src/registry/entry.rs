//! Registry entry for one live connection
//!
//! A [`ConnectionHandle`] is the part of a connection that other tasks may
//! touch: its identity, its topic set (read by the dispatcher), its outbound
//! queue (fed by the dispatcher) and its closed flag. The topic set is only
//! ever changed by the connection's own session task.

use std::collections::HashSet;
use std::net::SocketAddr;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, RwLock};

use crate::error::{Error, Result};
use crate::protocol::Message;
use crate::stats::ConnectionStats;

/// Connection identity, the string form of the peer address
pub type ClientId = String;

/// Shared view of a connection
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ClientId,
    peer_addr: SocketAddr,

    /// Subscribed topics, exact names, no duplicates
    subscriptions: RwLock<HashSet<String>>,

    /// Sender side of the outbound queue drained by the frame writer
    outbound: mpsc::Sender<Message>,

    /// Set once, never cleared
    closed: watch::Sender<bool>,

    stats: ConnectionStats,
}

impl ConnectionHandle {
    /// Create a handle for a connection from `peer_addr`
    pub fn new(peer_addr: SocketAddr, outbound: mpsc::Sender<Message>) -> Self {
        let (closed, _) = watch::channel(false);

        Self {
            id: peer_addr.to_string(),
            peer_addr,
            subscriptions: RwLock::new(HashSet::new()),
            outbound,
            closed,
            stats: ConnectionStats::new(),
        }
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Check the closed flag
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Mark the connection closed
    ///
    /// Returns `true` for the call that actually closed it. Every task of the
    /// connection waiting in [`closed`](Self::closed) wakes up.
    pub fn close(&self) -> bool {
        self.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    /// Wait until the connection is closed
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives in `self`, so this only returns once the flag is set
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Check whether `topic` is in the topic set (exact match)
    pub async fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.read().await.contains(topic)
    }

    /// Current topic set, sorted
    pub async fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.subscriptions.read().await.iter().cloned().collect();
        topics.sort();
        topics
    }

    /// Add topics not already present; returns how many were new
    pub(crate) async fn subscribe<'a, I>(&self, topics: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut subscriptions = self.subscriptions.write().await;
        topics
            .into_iter()
            .filter(|topic| subscriptions.insert((*topic).to_string()))
            .count()
    }

    /// Remove topics that are present; returns how many were removed
    pub(crate) async fn unsubscribe<'a, I>(&self, topics: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut subscriptions = self.subscriptions.write().await;
        topics
            .into_iter()
            .filter(|topic| subscriptions.remove(*topic))
            .count()
    }

    /// Queue a message for the writer, waiting for room
    pub async fn send(&self, message: Message) -> Result<()> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Queue a message for the writer without waiting
    pub fn try_send(&self, message: Message) -> std::result::Result<(), TrySendError<Message>> {
        self.outbound.try_send(message)
    }
}
