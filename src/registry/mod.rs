//! Client registry for pub/sub routing
//!
//! The registry holds one [`ConnectionHandle`] per live connection and the
//! [`FanOutDispatcher`] uses it to route a PUBLISH to every connection that
//! subscribed to its topic.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<ClientRegistry>
//!                   ┌───────────────────────────┐
//!                   │ clients: HashMap<ClientId,│
//!                   │   ConnectionHandle {      │
//!                   │     subscriptions,        │
//!                   │     outbound: mpsc::Tx,   │
//!                   │   }                       │
//!                   │ >                         │
//!                   └─────────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Publisher]            [Subscriber]            [Subscriber]
//!    session loop           writer.recv()           writer.recv()
//!         │                       │                       │
//!         └──► dispatcher.deliver()──► outbound queue ──► TCP
//! ```
//!
//! Payloads are `bytes::Bytes`, so each copy of a PUBLISH shares the same
//! allocation.

pub mod dispatch;
pub mod entry;
pub mod store;

pub use dispatch::{DeliveryPolicy, Dispatcher, FanOutDispatcher};
pub use entry::{ClientId, ConnectionHandle};
pub use store::ClientRegistry;
