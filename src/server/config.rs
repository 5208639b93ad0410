//! Broker configuration

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::protocol::constants::*;
use crate::registry::DeliveryPolicy;

/// Broker configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Capacity of each connection's reader-to-session queue
    pub inbound_capacity: usize,

    /// Capacity of each connection's outbound queue
    pub outbound_capacity: usize,

    /// How far a PINGREQ moves the read deadline
    pub keep_alive_extension: Duration,

    /// Read deadline applied at accept (None = no deadline until the first PINGREQ)
    pub idle_timeout: Option<Duration>,

    /// Largest inbound frame accepted, header included
    pub max_packet_size: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Application-level read buffer size
    pub read_buffer_size: usize,

    /// Application-level write buffer size
    pub write_buffer_size: usize,

    /// What fan-out does when a subscriber's queue is full
    pub delivery_policy: DeliveryPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            inbound_capacity: DEFAULT_QUEUE_CAPACITY,
            outbound_capacity: DEFAULT_QUEUE_CAPACITY,
            keep_alive_extension: DEFAULT_KEEP_ALIVE_EXTENSION,
            idle_timeout: None,
            max_packet_size: MAX_FRAME_SIZE,
            tcp_nodelay: true,
            read_buffer_size: 8 * 1024, // 8KB
            write_buffer_size: 8 * 1024,
            delivery_policy: DeliveryPolicy::Drop,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Create a config bound to the address a listen URI resolves to
    pub async fn from_uri(uri: &str) -> Result<Self> {
        let addr = ListenUri::parse(uri)?.resolve().await?;
        Ok(Self::with_addr(addr))
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set both queue capacities (minimum 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity.max(1);
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Set the outbound queue capacity (minimum 1)
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Set the keep-alive extension
    pub fn keep_alive_extension(mut self, extension: Duration) -> Self {
        self.keep_alive_extension = extension;
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Set the largest accepted frame, capped at the protocol maximum
    pub fn max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size.min(MAX_FRAME_SIZE);
        self
    }

    /// Set the full-queue delivery policy
    pub fn delivery_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.delivery_policy = policy;
        self
    }
}

/// Address family restriction of a listen URI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Any family
    Tcp,
    /// IPv4 only
    Tcp4,
    /// IPv6 only
    Tcp6,
}

impl Scheme {
    fn from_name(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "tcp" | "mqtt" => Some(Scheme::Tcp),
            "tcp4" => Some(Scheme::Tcp4),
            "tcp6" => Some(Scheme::Tcp6),
            _ => None,
        }
    }

    fn accepts(self, addr: &SocketAddr) -> bool {
        match self {
            Scheme::Tcp => true,
            Scheme::Tcp4 => addr.is_ipv4(),
            Scheme::Tcp6 => addr.is_ipv6(),
        }
    }
}

/// Parsed listen URI such as `tcp://127.0.0.1:1883`
///
/// The port defaults to 1883 and an empty host means every interface of the
/// scheme's family. IPv6 literals go in brackets: `tcp6://[::1]:1883`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenUri {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl ListenUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = || ConfigError::InvalidUri(uri.to_string());

        let (scheme, rest) = uri.split_once("://").ok_or_else(invalid)?;
        let scheme = Scheme::from_name(scheme)
            .ok_or_else(|| ConfigError::UnsupportedScheme(scheme.to_string()))?;

        let authority = rest.split('/').next().unwrap_or_default();

        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            let (host, after) = bracketed.split_once(']').ok_or_else(invalid)?;
            let port = match after {
                "" => None,
                _ => Some(after.strip_prefix(':').ok_or_else(invalid)?),
            };
            (host, port)
        } else {
            match authority.split_once(':') {
                Some((host, port)) => {
                    if port.contains(':') {
                        return Err(invalid().into());
                    }
                    (host, Some(port))
                }
                None => (authority, None),
            }
        };

        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|_| invalid())?,
            None => DEFAULT_PORT,
        };

        let host = if host.is_empty() {
            match scheme {
                Scheme::Tcp6 => "::",
                Scheme::Tcp | Scheme::Tcp4 => "0.0.0.0",
            }
        } else {
            host
        };

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
        })
    }

    /// Resolve to a bind address of the scheme's family
    pub async fn resolve(&self) -> Result<SocketAddr> {
        let unresolvable = || ConfigError::UnresolvableHost(self.host.clone());

        let addrs = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|_| unresolvable())?;

        for addr in addrs {
            if self.scheme.accepts(&addr) {
                return Ok(addr);
            }
        }
        Err(unresolvable().into())
    }
}

impl fmt::Display for ListenUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            Scheme::Tcp => "tcp",
            Scheme::Tcp4 => "tcp4",
            Scheme::Tcp6 => "tcp6",
        };
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", scheme, self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", scheme, self.host, self.port)
        }
    }
}
