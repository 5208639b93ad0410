//! Broker listener
//!
//! Handles the TCP accept loop and spawns a task per connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};

use crate::error::Result;
use crate::registry::{ClientRegistry, Dispatcher, FanOutDispatcher};
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::stats::StatsSnapshot;

/// Publish/subscribe broker
pub struct Broker<D: Dispatcher = FanOutDispatcher> {
    config: ServerConfig,
    registry: Arc<ClientRegistry>,
    dispatcher: Arc<D>,
    connection_semaphore: Option<Arc<Semaphore>>,
    stop: watch::Sender<bool>,
}

impl Broker<FanOutDispatcher> {
    /// Create a broker that fans publishes out through its own registry
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ClientRegistry::new());
        let dispatcher = FanOutDispatcher::new(Arc::clone(&registry), config.delivery_policy);
        Self::with_dispatcher(config, registry, dispatcher)
    }
}

impl<D: Dispatcher> Broker<D> {
    /// Create a broker with a custom dispatcher
    ///
    /// Connections register in `registry`; the dispatcher decides where a
    /// publish goes.
    pub fn with_dispatcher(
        config: ServerConfig,
        registry: Arc<ClientRegistry>,
        dispatcher: D,
    ) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };
        let (stop, _) = watch::channel(false);

        Self {
            config,
            registry,
            dispatcher: Arc::new(dispatcher),
            connection_semaphore,
            stop,
        }
    }

    /// Get a reference to the client registry
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Totals across live connections
    pub async fn stats(&self) -> StatsSnapshot {
        self.registry
            .snapshot()
            .await
            .iter()
            .map(|handle| handle.stats().snapshot())
            .sum()
    }

    /// Run the broker
    ///
    /// Binds the configured address and accepts until [`stop`](Self::stop).
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run the broker with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.serve(listener) => result,
        }
    }

    /// Accept on an already bound listener until [`stop`](Self::stop)
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Broker listening");

        let mut stop = self.stop.subscribe();
        tokio::select! {
            _ = stop.wait_for(|stopped| *stopped) => {
                tracing::info!(addr = %addr, "Broker stopped");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    /// Stop accepting
    ///
    /// The listener closes; connections already accepted keep running.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        tracing::debug!(peer = %peer_addr, "New connection");

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        let connection = Connection::new(
            socket,
            peer_addr,
            self.config.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.dispatcher),
        );

        tokio::spawn(async move {
            // Held until the connection ends
            let _permit = permit;

            if let Err(e) = connection.run().await {
                tracing::debug!(peer = %peer_addr, error = %e, "Connection error");
            }
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}
