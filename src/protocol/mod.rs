//! MQTT wire protocol
//!
//! Packet types, the remaining-length varint, typed messages and the codec
//! that converts between them and bytes. This layer knows nothing about
//! connections or topics; it only turns frames into [`Message`] values and
//! back.

pub mod codec;
pub mod constants;
pub mod message;
pub mod packet_type;
pub mod varint;

pub use message::{
    ConnAck, Connect, ConnectReturnCode, LastWill, Message, Publish, QoS, SubAck,
    SubAckReturnCode, Subscribe, SubscribeTopic, Unsubscribe,
};
pub use packet_type::PacketType;
