//! Connection statistics

pub mod metrics;

pub use metrics::{ConnectionStats, StatsSnapshot};
