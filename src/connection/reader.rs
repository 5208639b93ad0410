//! Inbound framing
//!
//! Reads one MQTT frame at a time from the byte stream: the type byte, the
//! remaining-length varint (one byte at a time, at most four), then exactly
//! the declared body. Bytes past the frame stay buffered for the next call.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

use super::deadline::DeadlineWatch;
use crate::error::{ProtocolError, Result};
use crate::protocol::constants::MAX_REMAINING_LENGTH_BYTES;
use crate::protocol::{codec, varint, Message, PacketType};
use crate::registry::ConnectionHandle;

/// Frame reader over the read half of a connection
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    max_packet_size: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, buffer_size: usize, max_packet_size: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(buffer_size),
            max_packet_size,
        }
    }

    /// Read and decode the next frame
    ///
    /// Returns `Ok(None)` when the peer closed the stream cleanly between
    /// frames. A stream that ends inside a frame is an error.
    pub async fn next_message(&mut self) -> Result<Option<Message>> {
        if !self.fill(1).await? {
            return Ok(None);
        }

        let header = self.buf[0];
        let packet_type =
            PacketType::from_header(header).ok_or(ProtocolError::UnknownPacketType(header >> 4))?;

        // Grow the peek one byte at a time until the length field terminates
        let mut peek = 2;
        let (remaining, length_bytes) = loop {
            self.require(peek).await?;
            match varint::decode(&self.buf[1..peek])? {
                Some(field) => break field,
                None => peek += 1,
            }
        };
        debug_assert!(length_bytes <= MAX_REMAINING_LENGTH_BYTES);

        let frame_len = 1 + length_bytes + remaining;
        if frame_len > self.max_packet_size {
            return Err(ProtocolError::FrameTooLarge {
                size: frame_len,
                limit: self.max_packet_size,
            }
            .into());
        }

        self.require(frame_len).await?;
        let frame = self.buf.split_to(frame_len).freeze();

        tracing::trace!(
            packet_type = %packet_type,
            frame_len = frame_len,
            "Frame received"
        );

        Ok(Some(codec::decode(packet_type, frame)?))
    }

    /// Buffer at least `n` bytes; `false` if the stream ended first
    async fn fill(&mut self, n: usize) -> Result<bool> {
        while self.buf.len() < n {
            self.buf.reserve(n - self.buf.len());
            if self.inner.read_buf(&mut self.buf).await? == 0 {
                if self.buf.is_empty() {
                    return Ok(false);
                }
                return Err(ProtocolError::UnexpectedEof {
                    expected: n,
                    available: self.buf.len(),
                }
                .into());
            }
        }
        Ok(true)
    }

    /// Like `fill`, but the stream ending at all is an error
    async fn require(&mut self, n: usize) -> Result<()> {
        if self.fill(n).await? {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedEof {
                expected: n,
                available: 0,
            }
            .into())
        }
    }

    /// Reader task body
    ///
    /// Forwards decoded messages to the session until the peer disconnects,
    /// a frame fails, the deadline passes or the connection is closed. A
    /// clean EOF only drops the inbound sender, so the session still handles
    /// everything read before it.
    pub async fn run(
        mut self,
        handle: Arc<ConnectionHandle>,
        inbound: mpsc::Sender<Message>,
        mut deadline: DeadlineWatch,
    ) -> Result<()> {
        loop {
            if handle.is_closed() {
                return Ok(());
            }

            let next = tokio::select! {
                _ = handle.closed() => return Ok(()),
                next = deadline.run(self.next_message()) => next,
            };

            let message = match next {
                None => return Err(ProtocolError::ReadTimeout.into()),
                Some(result) => match result? {
                    Some(message) => message,
                    None => {
                        tracing::debug!(client_id = %handle.id(), "Peer closed the stream");
                        return Ok(());
                    }
                },
            };

            handle.stats().record_received();

            tokio::select! {
                _ = handle.closed() => return Ok(()),
                sent = inbound.send(message) => {
                    if sent.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::io::AsyncWriteExt;
    use tokio::time::Instant;
    use tokio_test::io::Builder;

    use super::*;
    use crate::connection::deadline::read_deadline;
    use crate::error::{CodecError, Error};
    use crate::protocol::constants::MAX_FRAME_SIZE;
    use crate::protocol::Publish;

    fn reader<R: AsyncRead + Unpin>(inner: R) -> FrameReader<R> {
        FrameReader::new(inner, 64, MAX_FRAME_SIZE)
    }

    #[tokio::test]
    async fn test_single_frame() {
        let mock = Builder::new().read(&[0xC0, 0x00]).build();
        let mut reader = reader(mock);

        assert_eq!(reader.next_message().await.unwrap(), Some(Message::PingReq));
        assert_eq!(reader.next_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_frame_split_across_reads() {
        // PUBLISH "a" / "hi" delivered one byte at a time
        let frame = [0x30, 0x05, 0x00, 0x01, b'a', b'h', b'i'];
        let mut builder = Builder::new();
        for byte in frame.iter() {
            builder.read(std::slice::from_ref(byte));
        }
        let mut reader = reader(builder.build());

        let expected = Message::Publish(Publish::new("a", Bytes::from_static(b"hi")));
        assert_eq!(reader.next_message().await.unwrap(), Some(expected));
    }

    #[tokio::test]
    async fn test_two_frames_in_one_read() {
        let mock = Builder::new()
            .read(&[0xC0, 0x00, 0xE0, 0x00, 0x40, 0x02, 0x00, 0x07])
            .build();
        let mut reader = reader(mock);

        assert_eq!(reader.next_message().await.unwrap(), Some(Message::PingReq));
        assert_eq!(reader.next_message().await.unwrap(), Some(Message::Disconnect));
        assert_eq!(reader.next_message().await.unwrap(), Some(Message::PubAck(7)));
        assert_eq!(reader.next_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_multi_byte_length() {
        // 200-byte payload needs a two-byte length field
        let mut frame = vec![0x30, 0xCB, 0x01, 0x00, 0x01, b't'];
        frame.extend(std::iter::repeat(0xAB).take(200));
        let mock = Builder::new().read(&frame).build();
        let mut reader = reader(mock);

        match reader.next_message().await.unwrap() {
            Some(Message::Publish(p)) => {
                assert_eq!(p.topic, "t");
                assert_eq!(p.payload.len(), 200);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_short_frame_is_error() {
        // Declares 5 bytes, delivers 2, then EOF
        let mock = Builder::new().read(&[0x30, 0x05, 0x00, 0x01]).build();
        let mut reader = reader(mock);

        match reader.next_message().await {
            Err(Error::Protocol(ProtocolError::UnexpectedEof {
                expected,
                available,
            })) => {
                assert_eq!(expected, 7);
                assert_eq!(available, 4);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_eof_inside_length_field() {
        let mock = Builder::new().read(&[0x30, 0x80]).build();
        let mut reader = reader(mock);

        assert!(matches!(
            reader.next_message().await,
            Err(Error::Protocol(ProtocolError::UnexpectedEof { .. }))
        ));
    }

    #[tokio::test]
    async fn test_overlong_length_field() {
        let mock = Builder::new()
            .read(&[0x30, 0xFF, 0xFF, 0xFF, 0xFF, 0x01])
            .build();
        let mut reader = reader(mock);

        assert!(matches!(
            reader.next_message().await,
            Err(Error::Protocol(ProtocolError::MalformedRemainingLength))
        ));
    }

    #[tokio::test]
    async fn test_unknown_packet_type() {
        let mock = Builder::new().read(&[0xF0, 0x00]).build();
        let mut reader = reader(mock);

        assert!(matches!(
            reader.next_message().await,
            Err(Error::Protocol(ProtocolError::UnknownPacketType(15)))
        ));
    }

    #[tokio::test]
    async fn test_frame_too_large() {
        let mock = Builder::new().read(&[0x30, 0x7F]).build();
        let mut reader = FrameReader::new(mock, 64, 64);

        assert!(matches!(
            reader.next_message().await,
            Err(Error::Protocol(ProtocolError::FrameTooLarge {
                size: 129,
                limit: 64
            }))
        ));
    }

    #[tokio::test]
    async fn test_undecodable_body() {
        // PUBACK with a 3-byte body
        let mock = Builder::new().read(&[0x40, 0x03, 0x00, 0x01, 0x02]).build();
        let mut reader = reader(mock);

        assert!(matches!(
            reader.next_message().await,
            Err(Error::Codec(CodecError::TrailingBytes(1)))
        ));
    }

    fn handle() -> (Arc<ConnectionHandle>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(8);
        let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        (Arc::new(ConnectionHandle::new(addr, tx)), rx)
    }

    #[tokio::test]
    async fn test_run_forwards_until_eof() {
        let mock = Builder::new().read(&[0xC0, 0x00, 0xE0, 0x00]).build();
        let (handle, _outbound) = handle();
        let (inbound_tx, mut inbound_rx) = mpsc::channel(8);
        let (_setter, watch) = read_deadline(None);

        reader(mock)
            .run(handle.clone(), inbound_tx, watch)
            .await
            .unwrap();

        assert_eq!(inbound_rx.recv().await, Some(Message::PingReq));
        assert_eq!(inbound_rx.recv().await, Some(Message::Disconnect));
        assert_eq!(inbound_rx.recv().await, None);
        assert_eq!(handle.stats().snapshot().messages_received, 2);
        assert!(!handle.is_closed());
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let (_client, server) = tokio::io::duplex(64);
        let (handle, _outbound) = handle();
        let (inbound_tx, _inbound_rx) = mpsc::channel(8);
        let (_setter, watch) = read_deadline(Some(Instant::now() + Duration::from_millis(30)));

        let result = reader(server).run(handle, inbound_tx, watch).await;
        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::ReadTimeout))
        ));
    }

    #[tokio::test]
    async fn test_run_stops_on_close() {
        let (mut client, server) = tokio::io::duplex(64);
        let (handle, _outbound) = handle();
        let (inbound_tx, mut inbound_rx) = mpsc::channel(8);
        let (_setter, watch) = read_deadline(None);

        let task = tokio::spawn(reader(server).run(handle.clone(), inbound_tx, watch));

        client.write_all(&[0xC0, 0x00]).await.unwrap();
        assert_eq!(inbound_rx.recv().await, Some(Message::PingReq));

        handle.close();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
