//! Minimal MQTT publish/subscribe broker
//!
//! Clients connect over TCP, subscribe to exact topic names and publish
//! messages; every publish is fanned out to the connections subscribed to its
//! topic. QoS is always 0: publishes are acknowledged but never retried,
//! retained or persisted.
//!
//! # Example
//!
//! ```no_run
//! use relaymq::{Broker, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> relaymq::Result<()> {
//!     let config = ServerConfig::from_uri("tcp://0.0.0.0:1883").await?;
//!     let broker = Broker::new(config);
//!
//!     broker
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```

pub mod connection;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod stats;

pub use error::{Error, Result};
pub use protocol::{Message, PacketType, Publish, QoS};
pub use registry::{
    ClientId, ClientRegistry, ConnectionHandle, DeliveryPolicy, Dispatcher, FanOutDispatcher,
};
pub use server::{Broker, ListenUri, ServerConfig};
pub use stats::StatsSnapshot;
