//! Typed MQTT control packets
//!
//! A frame is decoded once, at the connection boundary, into a [`Message`].
//! Everything past the frame reader matches on the enum instead of inspecting
//! raw bytes.

use bytes::Bytes;

use crate::error::CodecError;
use crate::protocol::constants::{PROTOCOL_LEVEL_V311, PROTOCOL_NAME_V311, SUBACK_FAILURE};
use crate::protocol::packet_type::PacketType;

/// Delivery guarantee requested for a message
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QoS {
    /// Fire and forget
    #[default]
    AtMostOnce = 0,
    /// Acknowledged delivery
    AtLeastOnce = 1,
    /// Assured delivery
    ExactlyOnce = 2,
}

impl QoS {
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(CodecError::InvalidQos(other)),
        }
    }
}

/// Will message registered by CONNECT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub message: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

/// CONNECT packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    /// "MQTT" for 3.1.1, "MQIsdp" for 3.1
    pub protocol_name: String,
    pub protocol_level: u8,
    pub clean_session: bool,
    /// Keep-alive interval requested by the client, in seconds
    pub keep_alive: u16,
    pub client_id: String,
    pub will: Option<LastWill>,
    pub username: Option<String>,
    pub password: Option<Bytes>,
}

impl Connect {
    /// MQTT 3.1.1 CONNECT with a clean session and no credentials
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            protocol_name: PROTOCOL_NAME_V311.to_string(),
            protocol_level: PROTOCOL_LEVEL_V311,
            clean_session: true,
            keep_alive: 60,
            client_id: client_id.into(),
            will: None,
            username: None,
            password: None,
        }
    }
}

/// CONNACK return code
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    Accepted = 0,
    UnacceptableProtocolVersion = 1,
    IdentifierRejected = 2,
    ServerUnavailable = 3,
    BadUsernameOrPassword = 4,
    NotAuthorized = 5,
}

impl ConnectReturnCode {
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(ConnectReturnCode::Accepted),
            1 => Ok(ConnectReturnCode::UnacceptableProtocolVersion),
            2 => Ok(ConnectReturnCode::IdentifierRejected),
            3 => Ok(ConnectReturnCode::ServerUnavailable),
            4 => Ok(ConnectReturnCode::BadUsernameOrPassword),
            5 => Ok(ConnectReturnCode::NotAuthorized),
            other => Err(CodecError::InvalidReturnCode(other)),
        }
    }
}

/// CONNACK packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    pub session_present: bool,
    pub return_code: ConnectReturnCode,
}

impl ConnAck {
    /// Accepting CONNACK without a stored session
    pub fn accepted() -> Self {
        Self {
            session_present: false,
            return_code: ConnectReturnCode::Accepted,
        }
    }
}

/// PUBLISH packet
///
/// The payload is reference counted, so fanning one publish out to many
/// subscribers shares a single allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: String,
    /// Present exactly when `qos` is above `AtMostOnce`
    pub packet_id: Option<u16>,
    pub payload: Bytes,
}

impl Publish {
    /// QoS 0 publish with no flags set
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            dup: false,
            qos: QoS::AtMostOnce,
            retain: false,
            topic: topic.into(),
            packet_id: None,
            payload: payload.into(),
        }
    }

    /// Publish at the given QoS and packet id
    pub fn with_qos(mut self, qos: QoS, packet_id: u16) -> Self {
        self.qos = qos;
        self.packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            Some(packet_id)
        };
        self
    }
}

/// One topic filter in a SUBSCRIBE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeTopic {
    pub topic: String,
    pub qos: QoS,
}

/// SUBSCRIBE packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub packet_id: u16,
    pub topics: Vec<SubscribeTopic>,
}

impl Subscribe {
    /// Subscribe to `topics` at QoS 0
    pub fn new<I, S>(packet_id: u16, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            packet_id,
            topics: topics
                .into_iter()
                .map(|t| SubscribeTopic {
                    topic: t.into(),
                    qos: QoS::AtMostOnce,
                })
                .collect(),
        }
    }
}

/// Per-topic result in a SUBACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubAckReturnCode {
    /// Subscription accepted at the granted QoS
    Granted(QoS),
    Failure,
}

impl SubAckReturnCode {
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            SUBACK_FAILURE => Ok(SubAckReturnCode::Failure),
            0..=2 => Ok(SubAckReturnCode::Granted(QoS::from_u8(value)?)),
            other => Err(CodecError::InvalidReturnCode(other)),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            SubAckReturnCode::Granted(qos) => qos as u8,
            SubAckReturnCode::Failure => SUBACK_FAILURE,
        }
    }
}

/// SUBACK packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    pub packet_id: u16,
    pub return_codes: Vec<SubAckReturnCode>,
}

/// UNSUBSCRIBE packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    pub packet_id: u16,
    pub topics: Vec<String>,
}

impl Unsubscribe {
    pub fn new<I, S>(packet_id: u16, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            packet_id,
            topics: topics.into_iter().map(Into::into).collect(),
        }
    }
}

/// A decoded MQTT control packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Connect(Connect),
    ConnAck(ConnAck),
    Publish(Publish),
    PubAck(u16),
    PubRec(u16),
    PubRel(u16),
    PubComp(u16),
    Subscribe(Subscribe),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe),
    UnsubAck(u16),
    PingReq,
    PingResp,
    Disconnect,
}

impl Message {
    /// Wire type of this message
    pub fn packet_type(&self) -> PacketType {
        match self {
            Message::Connect(_) => PacketType::Connect,
            Message::ConnAck(_) => PacketType::ConnAck,
            Message::Publish(_) => PacketType::Publish,
            Message::PubAck(_) => PacketType::PubAck,
            Message::PubRec(_) => PacketType::PubRec,
            Message::PubRel(_) => PacketType::PubRel,
            Message::PubComp(_) => PacketType::PubComp,
            Message::Subscribe(_) => PacketType::Subscribe,
            Message::SubAck(_) => PacketType::SubAck,
            Message::Unsubscribe(_) => PacketType::Unsubscribe,
            Message::UnsubAck(_) => PacketType::UnsubAck,
            Message::PingReq => PacketType::PingReq,
            Message::PingResp => PacketType::PingResp,
            Message::Disconnect => PacketType::Disconnect,
        }
    }

    /// Correlation id, for packets that carry one
    pub fn packet_id(&self) -> Option<u16> {
        match self {
            Message::Publish(p) => p.packet_id,
            Message::PubAck(id)
            | Message::PubRec(id)
            | Message::PubRel(id)
            | Message::PubComp(id)
            | Message::UnsubAck(id) => Some(*id),
            Message::Subscribe(s) => Some(s.packet_id),
            Message::SubAck(s) => Some(s.packet_id),
            Message::Unsubscribe(u) => Some(u.packet_id),
            Message::Connect(_)
            | Message::ConnAck(_)
            | Message::PingReq
            | Message::PingResp
            | Message::Disconnect => None,
        }
    }
}

impl From<Publish> for Message {
    fn from(publish: Publish) -> Self {
        Message::Publish(publish)
    }
}
