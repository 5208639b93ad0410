//! Outbound framing
//!
//! Drains the connection's outbound queue, encoding each message into a
//! buffer sized by the codec and flushing it to the peer.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;

use crate::error::{CodecError, Error, Result};
use crate::protocol::constants::CLOSE_DRAIN_TIMEOUT;
use crate::protocol::{codec, Message};
use crate::registry::ConnectionHandle;

/// Result of writing one message
#[derive(Debug)]
pub enum WriteOutcome {
    /// Frame of this many bytes written and flushed
    Written(usize),
    /// Message could not be encoded and was skipped
    Skipped(CodecError),
}

/// Frame writer over the write half of a connection
pub struct FrameWriter<W> {
    inner: BufWriter<W>,
    buf: BytesMut,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W, buffer_size: usize) -> Self {
        Self {
            inner: BufWriter::with_capacity(buffer_size, inner),
            buf: BytesMut::with_capacity(buffer_size),
        }
    }

    /// Encode and flush one message
    ///
    /// An encode failure skips the message. An encoder that writes a
    /// different number of bytes than it declared, or a failed write or
    /// flush, is an error.
    pub async fn write_message(&mut self, message: &Message) -> Result<WriteOutcome> {
        let declared = match codec::encoded_len(message) {
            Ok(len) => len,
            Err(e) => return Ok(WriteOutcome::Skipped(e)),
        };

        self.buf.clear();
        self.buf.reserve(declared);

        let written = match codec::encode(message, &mut self.buf) {
            Ok(len) => len,
            Err(e) => return Ok(WriteOutcome::Skipped(e)),
        };
        if written != declared {
            return Err(CodecError::LengthMismatch {
                declared,
                actual: written,
            }
            .into());
        }

        self.inner.write_all(&self.buf).await?;
        self.inner.flush().await?;

        Ok(WriteOutcome::Written(written))
    }

    /// Writer task body
    ///
    /// Runs until the queue closes, a write fails or the connection is
    /// closed, then shuts down the write half. Messages already queued when
    /// the connection closes are still written, within
    /// [`CLOSE_DRAIN_TIMEOUT`]. A write cut short by the close is abandoned.
    pub async fn run(
        mut self,
        handle: Arc<ConnectionHandle>,
        mut outbound: mpsc::Receiver<Message>,
    ) -> Result<()> {
        let result = loop {
            if handle.is_closed() {
                break self.drain(&handle, &mut outbound).await;
            }

            let message = tokio::select! {
                _ = handle.closed() => break self.drain(&handle, &mut outbound).await,
                message = outbound.recv() => match message {
                    Some(message) => message,
                    None => break Ok(()),
                },
            };

            let outcome = tokio::select! {
                biased;
                outcome = self.write_message(&message) => outcome,
                _ = handle.closed() => break Ok(()),
            };

            if let Err(e) = record(&handle, &message, outcome) {
                break Err(e);
            }
        };

        if let Err(e) = self.inner.shutdown().await {
            tracing::debug!(client_id = %handle.id(), error = %e, "Shutdown of write half failed");
        }

        result
    }

    /// Write whatever is still queued once the connection has closed
    async fn drain(
        &mut self,
        handle: &ConnectionHandle,
        outbound: &mut mpsc::Receiver<Message>,
    ) -> Result<()> {
        let flush = async {
            while let Ok(message) = outbound.try_recv() {
                let outcome = self.write_message(&message).await;
                record(handle, &message, outcome)?;
            }
            Ok::<(), Error>(())
        };

        match tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, flush).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(
                    client_id = %handle.id(),
                    pending = outbound.len(),
                    "Gave up writing queued messages"
                );
                Ok(())
            }
        }
    }
}

fn record(
    handle: &ConnectionHandle,
    message: &Message,
    outcome: Result<WriteOutcome>,
) -> Result<()> {
    match outcome? {
        WriteOutcome::Written(len) => {
            handle.stats().record_sent(len);
            tracing::trace!(
                client_id = %handle.id(),
                packet_type = %message.packet_type(),
                len = len,
                "Frame sent"
            );
        }
        WriteOutcome::Skipped(e) => {
            handle.stats().record_encode_failure();
            tracing::warn!(
                client_id = %handle.id(),
                packet_type = %message.packet_type(),
                error = %e,
                "Dropping message that failed to encode"
            );
        }
    }
    Ok(())
}
