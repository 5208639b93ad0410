//! Publish fan-out
//!
//! A PUBLISH received on one connection is offered to every live connection
//! whose topic set contains the exact topic, including the publisher itself.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;

use super::entry::ClientId;
use super::store::ClientRegistry;
use crate::protocol::{Message, Publish};

/// What to do when a subscriber's outbound queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Discard the copy for that subscriber and keep going
    #[default]
    Drop,
    /// Wait for room, stalling the publisher's session
    Block,
}

/// Routes a received PUBLISH to subscribers
///
/// The session calls this before it acknowledges the publish, so every copy
/// is queued (or dropped) before the PUBACK is queued.
pub trait Dispatcher: Send + Sync + 'static {
    /// Offer `publish` to every subscriber; returns how many copies were queued
    fn deliver(
        &self,
        publisher: &ClientId,
        publish: &Publish,
    ) -> impl Future<Output = usize> + Send;
}

/// Dispatcher backed by a [`ClientRegistry`]
#[derive(Debug, Clone)]
pub struct FanOutDispatcher {
    registry: Arc<ClientRegistry>,
    policy: DeliveryPolicy,
}

impl FanOutDispatcher {
    pub fn new(registry: Arc<ClientRegistry>, policy: DeliveryPolicy) -> Self {
        Self { registry, policy }
    }
}

impl Dispatcher for FanOutDispatcher {
    async fn deliver(&self, publisher: &ClientId, publish: &Publish) -> usize {
        let mut delivered = 0;

        for target in self.registry.snapshot().await {
            if target.is_closed() || !target.is_subscribed(&publish.topic).await {
                continue;
            }

            let message = Message::Publish(publish.clone());
            let queued = match self.policy {
                DeliveryPolicy::Drop => match target.try_send(message) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        target.stats().record_dropped();
                        tracing::warn!(
                            client_id = %target.id(),
                            topic = %publish.topic,
                            "Outbound queue full, dropping message"
                        );
                        false
                    }
                    Err(TrySendError::Closed(_)) => false,
                },
                DeliveryPolicy::Block => target.send(message).await.is_ok(),
            };

            if queued {
                target.stats().record_delivery();
                delivered += 1;
            }
        }

        tracing::debug!(
            publisher = %publisher,
            topic = %publish.topic,
            payload_len = publish.payload.len(),
            delivered = delivered,
            "Publish dispatched"
        );

        delivered
    }
}
