//! Control packet types
//!
//! The high nibble of the first fixed-header byte selects the packet type.
//! Values 0 and 15 are reserved and never valid on the wire.

use std::fmt;

/// MQTT control packet type
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Client request to connect (client to server)
    Connect = 1,
    /// Connect acknowledgment (server to client)
    ConnAck = 2,
    /// Publish message (both directions)
    Publish = 3,
    /// Publish acknowledgment (both directions)
    PubAck = 4,
    /// Publish received, QoS 2 part 1
    PubRec = 5,
    /// Publish release, QoS 2 part 2
    PubRel = 6,
    /// Publish complete, QoS 2 part 3
    PubComp = 7,
    /// Subscribe request (client to server)
    Subscribe = 8,
    /// Subscribe acknowledgment (server to client)
    SubAck = 9,
    /// Unsubscribe request (client to server)
    Unsubscribe = 10,
    /// Unsubscribe acknowledgment (server to client)
    UnsubAck = 11,
    /// Ping request (client to server)
    PingReq = 12,
    /// Ping response (server to client)
    PingResp = 13,
    /// Disconnect notification (client to server)
    Disconnect = 14,
}

impl PacketType {
    /// Identify the packet type from the first fixed-header byte
    pub const fn from_header(byte: u8) -> Option<Self> {
        match byte >> 4 {
            1 => Some(PacketType::Connect),
            2 => Some(PacketType::ConnAck),
            3 => Some(PacketType::Publish),
            4 => Some(PacketType::PubAck),
            5 => Some(PacketType::PubRec),
            6 => Some(PacketType::PubRel),
            7 => Some(PacketType::PubComp),
            8 => Some(PacketType::Subscribe),
            9 => Some(PacketType::SubAck),
            10 => Some(PacketType::Unsubscribe),
            11 => Some(PacketType::UnsubAck),
            12 => Some(PacketType::PingReq),
            13 => Some(PacketType::PingResp),
            14 => Some(PacketType::Disconnect),
            _ => None,
        }
    }

    /// Flags nibble required for every packet type except PUBLISH
    pub const fn fixed_flags(self) -> u8 {
        match self {
            PacketType::PubRel | PacketType::Subscribe | PacketType::Unsubscribe => 0b0010,
            _ => 0,
        }
    }

    /// First header byte for a packet of this type with the given flags
    pub const fn header_byte(self, flags: u8) -> u8 {
        (self as u8) << 4 | (flags & 0x0F)
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketType::Connect => "CONNECT",
            PacketType::ConnAck => "CONNACK",
            PacketType::Publish => "PUBLISH",
            PacketType::PubAck => "PUBACK",
            PacketType::PubRec => "PUBREC",
            PacketType::PubRel => "PUBREL",
            PacketType::PubComp => "PUBCOMP",
            PacketType::Subscribe => "SUBSCRIBE",
            PacketType::SubAck => "SUBACK",
            PacketType::Unsubscribe => "UNSUBSCRIBE",
            PacketType::UnsubAck => "UNSUBACK",
            PacketType::PingReq => "PINGREQ",
            PacketType::PingResp => "PINGRESP",
            PacketType::Disconnect => "DISCONNECT",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_header_uses_high_nibble() {
        assert_eq!(PacketType::from_header(0x10), Some(PacketType::Connect));
        assert_eq!(PacketType::from_header(0x3B), Some(PacketType::Publish));
        assert_eq!(PacketType::from_header(0x82), Some(PacketType::Subscribe));
        assert_eq!(PacketType::from_header(0xE0), Some(PacketType::Disconnect));
    }

    #[test]
    fn test_reserved_types_rejected() {
        assert_eq!(PacketType::from_header(0x00), None);
        assert_eq!(PacketType::from_header(0xF0), None);
    }

    #[test]
    fn test_header_byte() {
        assert_eq!(PacketType::Subscribe.header_byte(0b0010), 0x82);
        assert_eq!(PacketType::PingResp.header_byte(0), 0xD0);
        assert_eq!(
            PacketType::PubRel.header_byte(PacketType::PubRel.fixed_flags()),
            0x62
        );
    }
}
