//! Per-connection protocol state machine
//!
//! Consumes decoded messages from the reader in arrival order and reacts to
//! each one. Replies are queued on the connection's own outbound queue;
//! publishes go through the [`Dispatcher`] first.
//!
//! | Received      | Effect                                   | Reply              |
//! |---------------|------------------------------------------|--------------------|
//! | CONNECT       | none                                     | CONNACK accepted   |
//! | SUBSCRIBE     | add topics                               | SUBACK, QoS 0 each |
//! | UNSUBSCRIBE   | remove topics                            | UNSUBACK           |
//! | PUBLISH       | fan out to subscribers                   | PUBACK             |
//! | PUBACK        | none                                     | none               |
//! | PINGREQ       | read deadline moves forward              | PINGRESP           |
//! | DISCONNECT    | connection closed                        | none               |
//! | anything else | logged                                   | none               |

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::deadline::DeadlineSetter;
use crate::error::Result;
use crate::protocol::{
    ConnAck, Connect, Message, Publish, QoS, SubAck, SubAckReturnCode, Subscribe, Unsubscribe,
};
use crate::registry::{ConnectionHandle, Dispatcher};

/// Connection state machine
pub struct Session<D: Dispatcher> {
    handle: Arc<ConnectionHandle>,
    dispatcher: Arc<D>,
    deadline: DeadlineSetter,
    keep_alive_extension: Duration,
}

impl<D: Dispatcher> Session<D> {
    pub fn new(
        handle: Arc<ConnectionHandle>,
        dispatcher: Arc<D>,
        deadline: DeadlineSetter,
        keep_alive_extension: Duration,
    ) -> Self {
        Self {
            handle,
            dispatcher,
            deadline,
            keep_alive_extension,
        }
    }

    /// Session task body
    ///
    /// Returns once the connection is closed or the reader has gone away and
    /// every message it queued has been handled. A reply that cannot be
    /// queued ends the session with an error.
    pub async fn run(self, mut inbound: mpsc::Receiver<Message>) -> Result<()> {
        loop {
            if self.handle.is_closed() {
                return Ok(());
            }

            let message = tokio::select! {
                _ = self.handle.closed() => return Ok(()),
                message = inbound.recv() => match message {
                    Some(message) => message,
                    None => return Ok(()),
                },
            };

            self.handle_message(message).await?;
        }
    }

    /// React to one inbound message
    pub async fn handle_message(&self, message: Message) -> Result<()> {
        match message {
            Message::Connect(connect) => self.on_connect(connect).await,
            Message::Subscribe(subscribe) => self.on_subscribe(subscribe).await,
            Message::Unsubscribe(unsubscribe) => self.on_unsubscribe(unsubscribe).await,
            Message::Publish(publish) => self.on_publish(publish).await,
            Message::PubAck(packet_id) => {
                tracing::debug!(
                    client_id = %self.handle.id(),
                    packet_id = packet_id,
                    "PUBACK received"
                );
                Ok(())
            }
            Message::PingReq => {
                self.deadline.extend(self.keep_alive_extension);
                self.reply(Message::PingResp).await
            }
            Message::Disconnect => {
                tracing::info!(client_id = %self.handle.id(), "Client disconnected");
                self.handle.close();
                Ok(())
            }
            other => {
                tracing::warn!(
                    client_id = %self.handle.id(),
                    packet_type = %other.packet_type(),
                    "Ignoring unsupported message"
                );
                Ok(())
            }
        }
    }

    async fn on_connect(&self, connect: Connect) -> Result<()> {
        tracing::info!(
            client_id = %self.handle.id(),
            mqtt_client_id = %connect.client_id,
            protocol = %connect.protocol_name,
            protocol_level = connect.protocol_level,
            keep_alive = connect.keep_alive,
            "Client connected"
        );

        self.reply(Message::ConnAck(ConnAck::accepted())).await
    }

    async fn on_subscribe(&self, subscribe: Subscribe) -> Result<()> {
        let added = self
            .handle
            .subscribe(subscribe.topics.iter().map(|t| t.topic.as_str()))
            .await;

        tracing::debug!(
            client_id = %self.handle.id(),
            packet_id = subscribe.packet_id,
            requested = subscribe.topics.len(),
            added = added,
            "Subscribed"
        );

        let return_codes =
            vec![SubAckReturnCode::Granted(QoS::AtMostOnce); subscribe.topics.len()];
        self.reply(Message::SubAck(SubAck {
            packet_id: subscribe.packet_id,
            return_codes,
        }))
        .await
    }

    async fn on_unsubscribe(&self, unsubscribe: Unsubscribe) -> Result<()> {
        let removed = self
            .handle
            .unsubscribe(unsubscribe.topics.iter().map(String::as_str))
            .await;

        tracing::debug!(
            client_id = %self.handle.id(),
            packet_id = unsubscribe.packet_id,
            removed = removed,
            "Unsubscribed"
        );

        self.reply(Message::UnsubAck(unsubscribe.packet_id)).await
    }

    async fn on_publish(&self, publish: Publish) -> Result<()> {
        self.handle.stats().record_publish();

        // Copies are queued before the acknowledgement
        self.dispatcher.deliver(self.handle.id(), &publish).await;

        self.reply(Message::PubAck(publish.packet_id.unwrap_or(0)))
            .await
    }

    async fn reply(&self, message: Message) -> Result<()> {
        self.handle.send(message).await
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Mutex;

    use bytes::Bytes;

    use super::*;
    use crate::connection::deadline::read_deadline;
    use crate::error::Error;
    use crate::registry::{ClientId, ClientRegistry, DeliveryPolicy, FanOutDispatcher};

    /// Records every publish it is asked to deliver
    #[derive(Default)]
    struct RecordingDispatcher {
        seen: Mutex<Vec<(ClientId, Publish)>>,
    }

    impl Dispatcher for RecordingDispatcher {
        async fn deliver(&self, publisher: &ClientId, publish: &Publish) -> usize {
            self.seen
                .lock()
                .unwrap()
                .push((publisher.clone(), publish.clone()));
            0
        }
    }

    fn session<D: Dispatcher>(
        dispatcher: Arc<D>,
    ) -> (Session<D>, Arc<ConnectionHandle>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(16);
        let addr: SocketAddr = "127.0.0.1:45000".parse().unwrap();
        let handle = Arc::new(ConnectionHandle::new(addr, tx));
        let (setter, _watch) = read_deadline(None);
        let session = Session::new(handle.clone(), dispatcher, setter, Duration::from_secs(10));
        (session, handle, rx)
    }

    #[tokio::test]
    async fn test_connect_accepted() {
        let (session, _handle, mut out) = session(Arc::new(RecordingDispatcher::default()));

        session
            .handle_message(Message::Connect(Connect::new("c1")))
            .await
            .unwrap();

        assert_eq!(
            out.try_recv().unwrap(),
            Message::ConnAck(ConnAck::accepted())
        );
    }

    #[tokio::test]
    async fn test_subscribe_acks_each_topic() {
        let (session, handle, mut out) = session(Arc::new(RecordingDispatcher::default()));

        session
            .handle_message(Message::Subscribe(Subscribe::new(1, ["room1", "room2"])))
            .await
            .unwrap();

        assert_eq!(
            out.try_recv().unwrap(),
            Message::SubAck(SubAck {
                packet_id: 1,
                return_codes: vec![SubAckReturnCode::Granted(QoS::AtMostOnce); 2],
            })
        );
        assert_eq!(handle.subscriptions().await, vec!["room1", "room2"]);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let (session, handle, mut out) = session(Arc::new(RecordingDispatcher::default()));

        session
            .handle_message(Message::Subscribe(Subscribe::new(1, ["a", "b"])))
            .await
            .unwrap();
        session
            .handle_message(Message::Unsubscribe(Unsubscribe::new(2, ["a", "missing"])))
            .await
            .unwrap();

        let _suback = out.try_recv().unwrap();
        assert_eq!(out.try_recv().unwrap(), Message::UnsubAck(2));
        assert_eq!(handle.subscriptions().await, vec!["b"]);
    }

    #[tokio::test]
    async fn test_publish_dispatched_then_acked() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let (session, handle, mut out) = session(dispatcher.clone());

        let publish = Publish::new("room1", Bytes::from_static(b"hi")).with_qos(QoS::AtLeastOnce, 9);
        session
            .handle_message(Message::Publish(publish.clone()))
            .await
            .unwrap();

        let seen = dispatcher.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(&seen[0].0, handle.id());
        assert_eq!(seen[0].1, publish);
        assert_eq!(out.try_recv().unwrap(), Message::PubAck(9));
        assert_eq!(handle.stats().snapshot().publishes_received, 1);
    }

    #[tokio::test]
    async fn test_qos0_publish_acked_with_zero() {
        let (session, _handle, mut out) = session(Arc::new(RecordingDispatcher::default()));

        session
            .handle_message(Message::Publish(Publish::new("t", Bytes::new())))
            .await
            .unwrap();

        assert_eq!(out.try_recv().unwrap(), Message::PubAck(0));
    }

    #[tokio::test]
    async fn test_self_subscribed_publish_precedes_puback() {
        let registry = Arc::new(ClientRegistry::new());
        let dispatcher = Arc::new(FanOutDispatcher::new(registry.clone(), DeliveryPolicy::Drop));
        let (session, handle, mut out) = session(dispatcher);
        registry.add(handle.clone()).await;

        session
            .handle_message(Message::Subscribe(Subscribe::new(1, ["room1"])))
            .await
            .unwrap();
        let publish = Publish::new("room1", Bytes::from_static(b"echo"));
        session
            .handle_message(Message::Publish(publish.clone()))
            .await
            .unwrap();

        assert!(matches!(out.try_recv().unwrap(), Message::SubAck(_)));
        assert_eq!(out.try_recv().unwrap(), Message::Publish(publish));
        assert_eq!(out.try_recv().unwrap(), Message::PubAck(0));
    }

    #[tokio::test]
    async fn test_pingreq_extends_deadline() {
        let (tx, mut out) = mpsc::channel(4);
        let addr: SocketAddr = "127.0.0.1:45001".parse().unwrap();
        let handle = Arc::new(ConnectionHandle::new(addr, tx));
        let (setter, _watch) = read_deadline(None);
        let session = Session::new(
            handle,
            Arc::new(RecordingDispatcher::default()),
            setter,
            Duration::from_secs(10),
        );

        let before = tokio::time::Instant::now();
        session.handle_message(Message::PingReq).await.unwrap();

        assert_eq!(out.try_recv().unwrap(), Message::PingResp);
        let deadline = session.deadline.current().unwrap();
        assert!(deadline >= before + Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_disconnect_closes() {
        let (session, handle, mut out) = session(Arc::new(RecordingDispatcher::default()));

        session.handle_message(Message::Disconnect).await.unwrap();

        assert!(handle.is_closed());
        assert!(out.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsupported_messages_ignored() {
        let (session, handle, mut out) = session(Arc::new(RecordingDispatcher::default()));

        for message in [
            Message::PubRec(1),
            Message::PubRel(1),
            Message::PubComp(1),
            Message::PingResp,
            Message::UnsubAck(1),
            Message::PubAck(3),
        ] {
            session.handle_message(message).await.unwrap();
        }

        assert!(out.try_recv().is_err());
        assert!(!handle.is_closed());
    }

    #[tokio::test]
    async fn test_run_stops_after_disconnect() {
        let (session, handle, mut out) = session(Arc::new(RecordingDispatcher::default()));
        let (tx, rx) = mpsc::channel(8);

        tx.send(Message::PingReq).await.unwrap();
        tx.send(Message::Disconnect).await.unwrap();
        // Never handled: the loop ends once the connection is closed
        tx.send(Message::PingReq).await.unwrap();

        session.run(rx).await.unwrap();

        assert!(handle.is_closed());
        assert_eq!(out.try_recv().unwrap(), Message::PingResp);
        assert!(out.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_handles_queue_after_reader_ends() {
        let (session, handle, mut out) = session(Arc::new(RecordingDispatcher::default()));
        let (tx, rx) = mpsc::channel(8);

        tx.send(Message::Connect(Connect::new("c1"))).await.unwrap();
        tx.send(Message::PingReq).await.unwrap();
        drop(tx);

        session.run(rx).await.unwrap();

        assert_eq!(
            out.try_recv().unwrap(),
            Message::ConnAck(ConnAck::accepted())
        );
        assert_eq!(out.try_recv().unwrap(), Message::PingResp);
        assert!(!handle.is_closed());
    }

    #[tokio::test]
    async fn test_reply_after_writer_gone() {
        let (session, _handle, out) = session(Arc::new(RecordingDispatcher::default()));
        drop(out);

        assert!(matches!(
            session.handle_message(Message::PingReq).await,
            Err(Error::ConnectionClosed)
        ));
    }
}
