//! Protocol constants

use std::time::Duration;

/// Default MQTT port
pub const DEFAULT_PORT: u16 = 1883;

/// Largest value the remaining-length field can encode (4 bytes of 7 bits)
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Maximum number of bytes in the remaining-length field
pub const MAX_REMAINING_LENGTH_BYTES: usize = 4;

/// Fixed header: type byte plus the longest remaining-length field
pub const MAX_FIXED_HEADER_SIZE: usize = 1 + MAX_REMAINING_LENGTH_BYTES;

/// Largest complete frame on the wire
pub const MAX_FRAME_SIZE: usize = MAX_FIXED_HEADER_SIZE + MAX_REMAINING_LENGTH;

/// Continuation bit of a remaining-length byte
pub const CONTINUATION_BIT: u8 = 0x80;

/// MQTT 3.1.1 protocol name
pub const PROTOCOL_NAME_V311: &str = "MQTT";

/// MQTT 3.1.1 protocol level
pub const PROTOCOL_LEVEL_V311: u8 = 4;

/// MQTT 3.1 protocol name
pub const PROTOCOL_NAME_V31: &str = "MQIsdp";

/// MQTT 3.1 protocol level
pub const PROTOCOL_LEVEL_V31: u8 = 3;

/// Default bound of the per-connection inbound and outbound queues
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// How far a PINGREQ pushes the read deadline
pub const DEFAULT_KEEP_ALIVE_EXTENSION: Duration = Duration::from_secs(10);

/// Failure marker in a SUBACK return code list
pub const SUBACK_FAILURE: u8 = 0x80;

/// How long a closing connection may spend writing what is still queued
pub const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
