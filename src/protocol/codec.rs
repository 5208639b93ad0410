//! MQTT 3.1.1 packet encoder and decoder
//!
//! Frame layout:
//! ```text
//! +--------+--------+-----------------+------------------------+
//! | type   | flags  | remaining length| body                   |
//! | 4 bits | 4 bits | 1-4 bytes varint| remaining length bytes |
//! +--------+--------+-----------------+------------------------+
//! ```
//!
//! Strings and binary fields inside the body carry a 16-bit big-endian length
//! prefix. Packet ids are 16-bit big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::CodecError;
use crate::protocol::constants::{
    MAX_REMAINING_LENGTH, PROTOCOL_LEVEL_V31, PROTOCOL_LEVEL_V311, PROTOCOL_NAME_V31,
    PROTOCOL_NAME_V311,
};
use crate::protocol::message::{
    ConnAck, Connect, ConnectReturnCode, LastWill, Message, Publish, QoS, SubAck,
    SubAckReturnCode, Subscribe, SubscribeTopic, Unsubscribe,
};
use crate::protocol::packet_type::PacketType;
use crate::protocol::varint;

// CONNECT flag bits
const CONNECT_RESERVED: u8 = 0x01;
const CONNECT_CLEAN_SESSION: u8 = 0x02;
const CONNECT_WILL: u8 = 0x04;
const CONNECT_WILL_QOS_SHIFT: u8 = 3;
const CONNECT_WILL_RETAIN: u8 = 0x20;
const CONNECT_PASSWORD: u8 = 0x40;
const CONNECT_USERNAME: u8 = 0x80;

// PUBLISH flag bits
const PUBLISH_RETAIN: u8 = 0x01;
const PUBLISH_QOS_SHIFT: u8 = 1;
const PUBLISH_DUP: u8 = 0x08;

/// Total frame size of `msg` once encoded
pub fn encoded_len(msg: &Message) -> Result<usize, CodecError> {
    let body = checked_body_len(msg)?;
    Ok(1 + varint::encoded_len(body) + body)
}

/// Append the encoded frame for `msg` to `buf`
///
/// Returns the number of bytes written. Nothing is written on error.
pub fn encode(msg: &Message, buf: &mut BytesMut) -> Result<usize, CodecError> {
    let body = checked_body_len(msg)?;
    let start = buf.len();

    buf.reserve(1 + varint::encoded_len(body) + body);
    buf.put_u8(msg.packet_type().header_byte(header_flags(msg)));
    varint::encode(body, buf);
    encode_body(msg, buf);

    Ok(buf.len() - start)
}

/// Decode a complete frame of a known packet type
///
/// `frame` must hold exactly one frame: header byte, remaining length and
/// body. Any leftover or missing byte is an error.
pub fn decode(packet_type: PacketType, mut frame: Bytes) -> Result<Message, CodecError> {
    let header = *frame.first().ok_or(CodecError::MalformedHeader)?;
    if header >> 4 != packet_type as u8 {
        return Err(CodecError::PacketTypeMismatch {
            expected: packet_type as u8,
            actual: header >> 4,
        });
    }

    let (remaining, used) = match varint::decode(&frame[1..]) {
        Ok(Some(field)) => field,
        Ok(None) | Err(_) => return Err(CodecError::MalformedHeader),
    };
    frame.advance(1 + used);
    if frame.len() != remaining {
        return Err(CodecError::RemainingLengthMismatch {
            declared: remaining,
            actual: frame.len(),
        });
    }

    let flags = header & 0x0F;
    if packet_type != PacketType::Publish && flags != packet_type.fixed_flags() {
        return Err(CodecError::InvalidFlags {
            packet_type: packet_type as u8,
            flags,
        });
    }

    let buf = &mut frame;
    let msg = match packet_type {
        PacketType::Connect => Message::Connect(decode_connect(buf)?),
        PacketType::ConnAck => Message::ConnAck(decode_connack(buf)?),
        PacketType::Publish => Message::Publish(decode_publish(buf, flags)?),
        PacketType::PubAck => Message::PubAck(get_u16(buf)?),
        PacketType::PubRec => Message::PubRec(get_u16(buf)?),
        PacketType::PubRel => Message::PubRel(get_u16(buf)?),
        PacketType::PubComp => Message::PubComp(get_u16(buf)?),
        PacketType::Subscribe => Message::Subscribe(decode_subscribe(buf)?),
        PacketType::SubAck => Message::SubAck(decode_suback(buf)?),
        PacketType::Unsubscribe => Message::Unsubscribe(decode_unsubscribe(buf)?),
        PacketType::UnsubAck => Message::UnsubAck(get_u16(buf)?),
        PacketType::PingReq => Message::PingReq,
        PacketType::PingResp => Message::PingResp,
        PacketType::Disconnect => Message::Disconnect,
    };

    if buf.has_remaining() {
        return Err(CodecError::TrailingBytes(buf.remaining()));
    }
    Ok(msg)
}

/// Decode a complete frame, taking the packet type from its header
pub fn decode_frame(frame: Bytes) -> Result<Message, CodecError> {
    let header = *frame.first().ok_or(CodecError::MalformedHeader)?;
    let packet_type =
        PacketType::from_header(header).ok_or(CodecError::UnknownPacketType(header >> 4))?;
    decode(packet_type, frame)
}

fn checked_body_len(msg: &Message) -> Result<usize, CodecError> {
    let body = body_len(msg)?;
    if body > MAX_REMAINING_LENGTH {
        return Err(CodecError::MessageTooLarge(body));
    }
    Ok(body)
}

fn header_flags(msg: &Message) -> u8 {
    match msg {
        Message::Publish(p) => {
            let mut flags = (p.qos as u8) << PUBLISH_QOS_SHIFT;
            if p.dup {
                flags |= PUBLISH_DUP;
            }
            if p.retain {
                flags |= PUBLISH_RETAIN;
            }
            flags
        }
        other => other.packet_type().fixed_flags(),
    }
}

/// Body size, validating every field the encoder will write
fn body_len(msg: &Message) -> Result<usize, CodecError> {
    let len = match msg {
        Message::Connect(c) => {
            let mut len = field_len(c.protocol_name.len())? + 1 + 1 + 2;
            len += field_len(c.client_id.len())?;
            if let Some(ref will) = c.will {
                len += field_len(will.topic.len())? + field_len(will.message.len())?;
            }
            if let Some(ref username) = c.username {
                len += field_len(username.len())?;
            }
            if let Some(ref password) = c.password {
                len += field_len(password.len())?;
            }
            len
        }
        Message::ConnAck(_) => 2,
        Message::Publish(p) => {
            if p.topic.is_empty() {
                return Err(CodecError::EmptyTopic);
            }
            let id_len = match (p.qos, p.packet_id) {
                (QoS::AtMostOnce, None) => 0,
                (QoS::AtMostOnce, Some(_)) => return Err(CodecError::UnexpectedPacketId),
                (_, None) | (_, Some(0)) => return Err(CodecError::MissingPacketId),
                (_, Some(_)) => 2,
            };
            field_len(p.topic.len())? + id_len + p.payload.len()
        }
        Message::PubAck(_)
        | Message::PubRec(_)
        | Message::PubRel(_)
        | Message::PubComp(_)
        | Message::UnsubAck(_) => 2,
        Message::Subscribe(s) => {
            if s.topics.is_empty() {
                return Err(CodecError::EmptyTopicList);
            }
            let mut len = 2;
            for t in &s.topics {
                len += field_len(t.topic.len())? + 1;
            }
            len
        }
        Message::SubAck(s) => 2 + s.return_codes.len(),
        Message::Unsubscribe(u) => {
            if u.topics.is_empty() {
                return Err(CodecError::EmptyTopicList);
            }
            let mut len = 2;
            for t in &u.topics {
                len += field_len(t.len())?;
            }
            len
        }
        Message::PingReq | Message::PingResp | Message::Disconnect => 0,
    };
    Ok(len)
}

fn field_len(len: usize) -> Result<usize, CodecError> {
    if len > u16::MAX as usize {
        return Err(CodecError::FieldTooLong(len));
    }
    Ok(2 + len)
}

fn encode_body(msg: &Message, buf: &mut BytesMut) {
    match msg {
        Message::Connect(c) => {
            put_binary(buf, c.protocol_name.as_bytes());
            buf.put_u8(c.protocol_level);

            let mut flags = 0u8;
            if c.clean_session {
                flags |= CONNECT_CLEAN_SESSION;
            }
            if let Some(ref will) = c.will {
                flags |= CONNECT_WILL | (will.qos as u8) << CONNECT_WILL_QOS_SHIFT;
                if will.retain {
                    flags |= CONNECT_WILL_RETAIN;
                }
            }
            if c.username.is_some() {
                flags |= CONNECT_USERNAME;
            }
            if c.password.is_some() {
                flags |= CONNECT_PASSWORD;
            }
            buf.put_u8(flags);
            buf.put_u16(c.keep_alive);

            put_binary(buf, c.client_id.as_bytes());
            if let Some(ref will) = c.will {
                put_binary(buf, will.topic.as_bytes());
                put_binary(buf, &will.message);
            }
            if let Some(ref username) = c.username {
                put_binary(buf, username.as_bytes());
            }
            if let Some(ref password) = c.password {
                put_binary(buf, password);
            }
        }
        Message::ConnAck(ack) => {
            buf.put_u8(ack.session_present as u8);
            buf.put_u8(ack.return_code as u8);
        }
        Message::Publish(p) => {
            put_binary(buf, p.topic.as_bytes());
            if let Some(id) = p.packet_id {
                buf.put_u16(id);
            }
            buf.put_slice(&p.payload);
        }
        Message::PubAck(id)
        | Message::PubRec(id)
        | Message::PubRel(id)
        | Message::PubComp(id)
        | Message::UnsubAck(id) => buf.put_u16(*id),
        Message::Subscribe(s) => {
            buf.put_u16(s.packet_id);
            for t in &s.topics {
                put_binary(buf, t.topic.as_bytes());
                buf.put_u8(t.qos as u8);
            }
        }
        Message::SubAck(s) => {
            buf.put_u16(s.packet_id);
            for code in &s.return_codes {
                buf.put_u8(code.as_u8());
            }
        }
        Message::Unsubscribe(u) => {
            buf.put_u16(u.packet_id);
            for t in &u.topics {
                put_binary(buf, t.as_bytes());
            }
        }
        Message::PingReq | Message::PingResp | Message::Disconnect => {}
    }
}

fn decode_connect(buf: &mut Bytes) -> Result<Connect, CodecError> {
    let protocol_name = get_string(buf)?;
    let protocol_level = get_u8(buf)?;
    match (protocol_name.as_str(), protocol_level) {
        (PROTOCOL_NAME_V311, PROTOCOL_LEVEL_V311) | (PROTOCOL_NAME_V31, PROTOCOL_LEVEL_V31) => {}
        (PROTOCOL_NAME_V311, level) | (PROTOCOL_NAME_V31, level) => {
            return Err(CodecError::UnsupportedProtocolLevel(level));
        }
        _ => return Err(CodecError::InvalidProtocolName(protocol_name.clone())),
    }

    let flags = get_u8(buf)?;
    let will_qos = (flags >> CONNECT_WILL_QOS_SHIFT) & 0x03;
    let has_will = flags & CONNECT_WILL != 0;
    let invalid_will = !has_will && (will_qos != 0 || flags & CONNECT_WILL_RETAIN != 0);
    if flags & CONNECT_RESERVED != 0 || invalid_will {
        return Err(CodecError::InvalidFlags {
            packet_type: PacketType::Connect as u8,
            flags,
        });
    }

    let keep_alive = get_u16(buf)?;
    let client_id = get_string(buf)?;

    let will = if has_will {
        Some(LastWill {
            topic: get_string(buf)?,
            message: get_binary(buf)?,
            qos: QoS::from_u8(will_qos)?,
            retain: flags & CONNECT_WILL_RETAIN != 0,
        })
    } else {
        None
    };
    let username = if flags & CONNECT_USERNAME != 0 {
        Some(get_string(buf)?)
    } else {
        None
    };
    let password = if flags & CONNECT_PASSWORD != 0 {
        Some(get_binary(buf)?)
    } else {
        None
    };

    Ok(Connect {
        protocol_name,
        protocol_level,
        clean_session: flags & CONNECT_CLEAN_SESSION != 0,
        keep_alive,
        client_id,
        will,
        username,
        password,
    })
}

fn decode_connack(buf: &mut Bytes) -> Result<ConnAck, CodecError> {
    let ack_flags = get_u8(buf)?;
    if ack_flags & 0xFE != 0 {
        return Err(CodecError::InvalidFlags {
            packet_type: PacketType::ConnAck as u8,
            flags: ack_flags,
        });
    }
    Ok(ConnAck {
        session_present: ack_flags & 0x01 != 0,
        return_code: ConnectReturnCode::from_u8(get_u8(buf)?)?,
    })
}

fn decode_publish(buf: &mut Bytes, flags: u8) -> Result<Publish, CodecError> {
    let qos = QoS::from_u8((flags >> PUBLISH_QOS_SHIFT) & 0x03)?;
    let topic = get_string(buf)?;
    if topic.is_empty() {
        return Err(CodecError::EmptyTopic);
    }

    let packet_id = if qos == QoS::AtMostOnce {
        None
    } else {
        match get_u16(buf)? {
            0 => return Err(CodecError::MissingPacketId),
            id => Some(id),
        }
    };

    Ok(Publish {
        dup: flags & PUBLISH_DUP != 0,
        qos,
        retain: flags & PUBLISH_RETAIN != 0,
        topic,
        packet_id,
        payload: buf.split_to(buf.remaining()),
    })
}

fn decode_subscribe(buf: &mut Bytes) -> Result<Subscribe, CodecError> {
    let packet_id = get_u16(buf)?;
    let mut topics = Vec::new();

    while buf.has_remaining() {
        let topic = get_string(buf)?;
        let options = get_u8(buf)?;
        if options & 0xFC != 0 {
            return Err(CodecError::InvalidQos(options));
        }
        topics.push(SubscribeTopic {
            topic,
            qos: QoS::from_u8(options)?,
        });
    }

    if topics.is_empty() {
        return Err(CodecError::EmptyTopicList);
    }
    Ok(Subscribe { packet_id, topics })
}

fn decode_suback(buf: &mut Bytes) -> Result<SubAck, CodecError> {
    let packet_id = get_u16(buf)?;
    let mut return_codes = Vec::with_capacity(buf.remaining());
    while buf.has_remaining() {
        return_codes.push(SubAckReturnCode::from_u8(buf.get_u8())?);
    }
    Ok(SubAck {
        packet_id,
        return_codes,
    })
}

fn decode_unsubscribe(buf: &mut Bytes) -> Result<Unsubscribe, CodecError> {
    let packet_id = get_u16(buf)?;
    let mut topics = Vec::new();
    while buf.has_remaining() {
        topics.push(get_string(buf)?);
    }
    if topics.is_empty() {
        return Err(CodecError::EmptyTopicList);
    }
    Ok(Unsubscribe { packet_id, topics })
}

fn get_u8(buf: &mut Bytes) -> Result<u8, CodecError> {
    if buf.remaining() < 1 {
        return Err(CodecError::UnexpectedEof);
    }
    Ok(buf.get_u8())
}

fn get_u16(buf: &mut Bytes) -> Result<u16, CodecError> {
    if buf.remaining() < 2 {
        return Err(CodecError::UnexpectedEof);
    }
    Ok(buf.get_u16())
}

fn get_binary(buf: &mut Bytes) -> Result<Bytes, CodecError> {
    let len = get_u16(buf)? as usize;
    if buf.remaining() < len {
        return Err(CodecError::UnexpectedEof);
    }
    Ok(buf.split_to(len))
}

fn get_string(buf: &mut Bytes) -> Result<String, CodecError> {
    let raw = get_binary(buf)?;
    std::str::from_utf8(&raw)
        .map(str::to_owned)
        .map_err(|_| CodecError::InvalidUtf8)
}

fn put_binary(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u16(data.len() as u16);
    buf.put_slice(data);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_to_bytes(msg: &Message) -> Bytes {
        let mut buf = BytesMut::new();
        encode(msg, &mut buf).unwrap();
        buf.freeze()
    }

    #[test]
    fn test_decode_connect_from_wire() {
        let frame = Bytes::from_static(&[
            0x10, 0x0F, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x02, 0x00, 0x3C, 0x00, 0x03,
            b'a', b'b', b'c',
        ]);

        let msg = decode(PacketType::Connect, frame).unwrap();
        let Message::Connect(connect) = msg else {
            panic!("Expected CONNECT");
        };
        assert_eq!(connect.protocol_name, "MQTT");
        assert_eq!(connect.protocol_level, 4);
        assert!(connect.clean_session);
        assert_eq!(connect.keep_alive, 60);
        assert_eq!(connect.client_id, "abc");
        assert!(connect.will.is_none());
        assert!(connect.username.is_none());
    }

    #[test]
    fn test_decode_mqtt31_connect() {
        let mut connect = Connect::new("legacy");
        connect.protocol_name = PROTOCOL_NAME_V31.to_string();
        connect.protocol_level = PROTOCOL_LEVEL_V31;

        let frame = encode_to_bytes(&Message::Connect(connect.clone()));
        assert_eq!(decode_frame(frame).unwrap(), Message::Connect(connect));
    }

    #[test]
    fn test_encode_known_frames() {
        assert_eq!(
            &encode_to_bytes(&Message::ConnAck(ConnAck::accepted()))[..],
            &[0x20, 0x02, 0x00, 0x00]
        );
        assert_eq!(&encode_to_bytes(&Message::PingResp)[..], &[0xD0, 0x00]);
        assert_eq!(
            &encode_to_bytes(&Message::PubAck(0x1234))[..],
            &[0x40, 0x02, 0x12, 0x34]
        );
        assert_eq!(&encode_to_bytes(&Message::UnsubAck(5))[..], &[0xB0, 0x02, 0x00, 0x05]);

        let suback = SubAck {
            packet_id: 1,
            return_codes: vec![SubAckReturnCode::Granted(QoS::AtMostOnce); 2],
        };
        assert_eq!(
            &encode_to_bytes(&Message::SubAck(suback))[..],
            &[0x90, 0x04, 0x00, 0x01, 0x00, 0x00]
        );
    }

    #[test]
    fn test_encode_publish_qos0() {
        let publish = Publish::new("room1", "hi");
        let frame = encode_to_bytes(&Message::Publish(publish));
        assert_eq!(
            &frame[..],
            &[0x30, 0x09, 0x00, 0x05, b'r', b'o', b'o', b'm', b'1', b'h', b'i']
        );
    }

    #[test]
    fn test_round_trip_every_message_type() {
        let mut full_connect = Connect::new("client-1");
        full_connect.clean_session = false;
        full_connect.keep_alive = 30;
        full_connect.will = Some(LastWill {
            topic: "status".into(),
            message: Bytes::from_static(b"offline"),
            qos: QoS::AtLeastOnce,
            retain: true,
        });
        full_connect.username = Some("user".into());
        full_connect.password = Some(Bytes::from_static(b"secret"));

        let mut flagged_publish = Publish::new("room1", vec![0u8; 300]).with_qos(QoS::ExactlyOnce, 42);
        flagged_publish.dup = true;
        flagged_publish.retain = true;

        let messages = vec![
            Message::Connect(Connect::new("")),
            Message::Connect(full_connect),
            Message::ConnAck(ConnAck {
                session_present: true,
                return_code: ConnectReturnCode::NotAuthorized,
            }),
            Message::Publish(Publish::new("room1", "hi")),
            Message::Publish(flagged_publish),
            Message::PubAck(1),
            Message::PubRec(2),
            Message::PubRel(3),
            Message::PubComp(4),
            Message::Subscribe(Subscribe {
                packet_id: 10,
                topics: vec![
                    SubscribeTopic {
                        topic: "a".into(),
                        qos: QoS::AtMostOnce,
                    },
                    SubscribeTopic {
                        topic: "b/c".into(),
                        qos: QoS::ExactlyOnce,
                    },
                ],
            }),
            Message::SubAck(SubAck {
                packet_id: 10,
                return_codes: vec![
                    SubAckReturnCode::Granted(QoS::AtMostOnce),
                    SubAckReturnCode::Failure,
                ],
            }),
            Message::Unsubscribe(Unsubscribe::new(11, ["a", "b/c"])),
            Message::UnsubAck(11),
            Message::PingReq,
            Message::PingResp,
            Message::Disconnect,
        ];

        for msg in messages {
            let declared = encoded_len(&msg).unwrap();
            let frame = encode_to_bytes(&msg);
            assert_eq!(frame.len(), declared, "length of {}", msg.packet_type());

            let decoded = decode(msg.packet_type(), frame).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn test_decode_type_mismatch() {
        let frame = Bytes::from_static(&[0xC0, 0x00]);
        assert_eq!(
            decode(PacketType::Disconnect, frame),
            Err(CodecError::PacketTypeMismatch {
                expected: 14,
                actual: 12
            })
        );
    }

    #[test]
    fn test_decode_reserved_type() {
        assert_eq!(
            decode_frame(Bytes::from_static(&[0xF0, 0x00])),
            Err(CodecError::UnknownPacketType(15))
        );
    }

    #[test]
    fn test_decode_remaining_length_mismatch() {
        let frame = Bytes::from_static(&[0x40, 0x03, 0x00, 0x01]);
        assert_eq!(
            decode(PacketType::PubAck, frame),
            Err(CodecError::RemainingLengthMismatch {
                declared: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let frame = Bytes::from_static(&[0x40, 0x03, 0x00, 0x01, 0xFF]);
        assert_eq!(
            decode(PacketType::PubAck, frame),
            Err(CodecError::TrailingBytes(1))
        );
    }

    #[test]
    fn test_decode_subscribe_requires_flags() {
        let frame = Bytes::from_static(&[0x80, 0x06, 0x00, 0x01, 0x00, 0x01, b'a', 0x00]);
        assert_eq!(
            decode(PacketType::Subscribe, frame),
            Err(CodecError::InvalidFlags {
                packet_type: 8,
                flags: 0
            })
        );
    }

    #[test]
    fn test_decode_subscribe_invalid_qos() {
        let frame = Bytes::from_static(&[0x82, 0x06, 0x00, 0x01, 0x00, 0x01, b'a', 0x03]);
        assert_eq!(
            decode(PacketType::Subscribe, frame),
            Err(CodecError::InvalidQos(3))
        );
    }

    #[test]
    fn test_decode_subscribe_empty() {
        let frame = Bytes::from_static(&[0x82, 0x02, 0x00, 0x01]);
        assert_eq!(
            decode(PacketType::Subscribe, frame),
            Err(CodecError::EmptyTopicList)
        );
    }

    #[test]
    fn test_decode_publish_qos3_rejected() {
        let frame = Bytes::from_static(&[0x36, 0x03, 0x00, 0x01, b't']);
        assert_eq!(
            decode(PacketType::Publish, frame),
            Err(CodecError::InvalidQos(3))
        );
    }

    #[test]
    fn test_decode_publish_zero_packet_id() {
        let frame = Bytes::from_static(&[0x32, 0x05, 0x00, 0x01, b't', 0x00, 0x00]);
        assert_eq!(
            decode(PacketType::Publish, frame),
            Err(CodecError::MissingPacketId)
        );
    }

    #[test]
    fn test_decode_truncated_string() {
        let frame = Bytes::from_static(&[0x30, 0x03, 0x00, 0x05, b'r']);
        assert_eq!(
            decode(PacketType::Publish, frame),
            Err(CodecError::UnexpectedEof)
        );
    }

    #[test]
    fn test_decode_invalid_utf8_topic() {
        let frame = Bytes::from_static(&[0x30, 0x04, 0x00, 0x02, 0xC3, 0x28]);
        assert_eq!(
            decode(PacketType::Publish, frame),
            Err(CodecError::InvalidUtf8)
        );
    }

    #[test]
    fn test_decode_connect_bad_protocol() {
        let mut connect = Connect::new("x");
        connect.protocol_name = "HTTP".into();
        let frame = encode_to_bytes(&Message::Connect(connect));
        assert_eq!(
            decode(PacketType::Connect, frame),
            Err(CodecError::InvalidProtocolName("HTTP".into()))
        );

        let mut connect = Connect::new("x");
        connect.protocol_level = 5;
        let frame = encode_to_bytes(&Message::Connect(connect));
        assert_eq!(
            decode(PacketType::Connect, frame),
            Err(CodecError::UnsupportedProtocolLevel(5))
        );
    }

    #[test]
    fn test_decode_connect_reserved_flag() {
        let frame = Bytes::from_static(&[
            0x10, 0x0C, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x03, 0x00, 0x3C, 0x00, 0x00,
        ]);
        assert_eq!(
            decode(PacketType::Connect, frame),
            Err(CodecError::InvalidFlags {
                packet_type: 1,
                flags: 0x03
            })
        );
    }

    #[test]
    fn test_encode_rejects_invalid_publish() {
        let mut buf = BytesMut::new();

        let publish = Publish::new("", "x");
        assert_eq!(
            encode(&Message::Publish(publish), &mut buf),
            Err(CodecError::EmptyTopic)
        );

        let mut publish = Publish::new("t", "x");
        publish.qos = QoS::AtLeastOnce;
        assert_eq!(
            encode(&Message::Publish(publish), &mut buf),
            Err(CodecError::MissingPacketId)
        );

        let mut publish = Publish::new("t", "x");
        publish.packet_id = Some(9);
        assert_eq!(
            encode(&Message::Publish(publish), &mut buf),
            Err(CodecError::UnexpectedPacketId)
        );

        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_rejects_long_topic() {
        let topic = "x".repeat(70_000);
        let msg = Message::Unsubscribe(Unsubscribe::new(1, [topic]));
        assert_eq!(encoded_len(&msg), Err(CodecError::FieldTooLong(70_000)));
    }

    #[test]
    fn test_encode_appends() {
        let mut buf = BytesMut::from(&b"xy"[..]);
        let written = encode(&Message::PingReq, &mut buf).unwrap();
        assert_eq!(written, 2);
        assert_eq!(&buf[..], &[b'x', b'y', 0xC0, 0x00]);
    }
}
