//! Connection lifecycle
//!
//! Wires one accepted socket into the registry and the three per-connection
//! tasks, then tears everything down once any of them ends.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::connection::{read_deadline, FrameReader, FrameWriter, Session};
use crate::error::Result;
use crate::protocol::Message;
use crate::registry::{ClientRegistry, ConnectionHandle, Dispatcher};
use crate::server::config::ServerConfig;

/// One accepted client connection
pub struct Connection<D: Dispatcher> {
    socket: TcpStream,
    handle: Arc<ConnectionHandle>,
    outbound_rx: mpsc::Receiver<Message>,
    config: ServerConfig,
    registry: Arc<ClientRegistry>,
    dispatcher: Arc<D>,
}

impl<D: Dispatcher> Connection<D> {
    pub fn new(
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: ServerConfig,
        registry: Arc<ClientRegistry>,
        dispatcher: Arc<D>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity);
        let handle = Arc::new(ConnectionHandle::new(peer_addr, outbound_tx));

        Self {
            socket,
            handle,
            outbound_rx,
            config,
            registry,
            dispatcher,
        }
    }

    /// Serve the connection until it closes
    ///
    /// The connection is registered for the whole call and removed from the
    /// registry before this returns, whatever the outcome.
    pub async fn run(self) -> Result<()> {
        let Connection {
            socket,
            handle,
            outbound_rx,
            config,
            registry,
            dispatcher,
        } = self;

        registry.add(Arc::clone(&handle)).await;
        tracing::info!(
            client_id = %handle.id(),
            peer = %handle.peer_addr(),
            "Client accepted"
        );

        let (read_half, write_half) = socket.into_split();
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity);
        let (deadline, deadline_watch) =
            read_deadline(config.idle_timeout.map(|timeout| Instant::now() + timeout));

        let reader = FrameReader::new(read_half, config.read_buffer_size, config.max_packet_size);
        // A clean EOF ends the reader without closing, so the session drains
        // the inbound queue before the connection closes
        let reader_task = spawn_closing(&handle, {
            let handle = Arc::clone(&handle);
            async move { reader.run(handle, inbound_tx, deadline_watch).await }
        });

        let writer = FrameWriter::new(write_half, config.write_buffer_size);
        let writer_task = spawn_closing(&handle, {
            let handle = Arc::clone(&handle);
            async move { writer.run(handle, outbound_rx).await }
        });

        let session = Session::new(
            Arc::clone(&handle),
            dispatcher,
            deadline,
            config.keep_alive_extension,
        );
        let session_result = session.run(inbound_rx).await;
        handle.close();

        let reader_result = join(&handle, "reader", reader_task).await;
        let writer_result = join(&handle, "writer", writer_task).await;

        registry.remove(&handle).await;

        let stats = handle.stats().snapshot();
        let duration_ms = u64::try_from(handle.stats().duration().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            client_id = %handle.id(),
            duration_ms = duration_ms,
            received = stats.messages_received,
            sent = stats.messages_sent,
            dropped = stats.dropped_deliveries,
            "Client closed"
        );

        session_result.and(reader_result).and(writer_result)
    }
}

/// Spawn a connection task that closes the connection if it fails
fn spawn_closing<F>(handle: &Arc<ConnectionHandle>, task: F) -> JoinHandle<Result<()>>
where
    F: std::future::Future<Output = Result<()>> + Send + 'static,
{
    let handle = Arc::clone(handle);
    tokio::spawn(async move {
        let result = task.await;
        if result.is_err() {
            handle.close();
        }
        result
    })
}

async fn join(
    handle: &ConnectionHandle,
    task: &'static str,
    join_handle: JoinHandle<Result<()>>,
) -> Result<()> {
    match join_handle.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::debug!(
                client_id = %handle.id(),
                task = task,
                error = %e,
                "Task ended with error"
            );
            Err(e)
        }
        Err(e) => {
            tracing::error!(
                client_id = %handle.id(),
                task = task,
                error = %e,
                "Task panicked"
            );
            Ok(())
        }
    }
}
