//! TCP broker server

pub mod config;
pub mod connection;
pub mod listener;

pub use config::{ListenUri, Scheme, ServerConfig};
pub use connection::Connection;
pub use listener::Broker;
