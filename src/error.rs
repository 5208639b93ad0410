//! Error types
//!
//! Every fallible operation in the crate returns [`Result`]. The nested kinds
//! separate framing problems (always fatal to a connection) from codec problems
//! (fatal inbound, usually recoverable outbound) and transport failures.

use std::fmt;
use std::io;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Transport failure (read, write, flush, accept, bind)
    Io(io::Error),
    /// Framing error on the inbound byte stream
    Protocol(ProtocolError),
    /// Message could not be encoded or decoded
    Codec(CodecError),
    /// Invalid broker configuration
    Config(ConfigError),
    /// The connection has already been closed
    ConnectionClosed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Codec(e) => write!(f, "Codec error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Protocol(e) => Some(e),
            Error::Codec(e) => Some(e),
            Error::Config(e) => Some(e),
            Error::ConnectionClosed => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Error::Codec(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

/// Framing errors detected by the frame reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// High nibble of the first header byte is not a known packet type
    UnknownPacketType(u8),
    /// Remaining-length field longer than four bytes
    MalformedRemainingLength,
    /// Declared frame exceeds the configured maximum
    FrameTooLarge { size: usize, limit: usize },
    /// Stream ended before the declared frame was complete
    UnexpectedEof { expected: usize, available: usize },
    /// Read deadline passed with no complete frame
    ReadTimeout,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnknownPacketType(t) => write!(f, "Unknown packet type: {}", t),
            ProtocolError::MalformedRemainingLength => write!(f, "Malformed remaining length"),
            ProtocolError::FrameTooLarge { size, limit } => {
                write!(f, "Frame of {} bytes exceeds limit of {}", size, limit)
            }
            ProtocolError::UnexpectedEof {
                expected,
                available,
            } => write!(
                f,
                "Unexpected EOF: frame needs {} bytes, got {}",
                expected, available
            ),
            ProtocolError::ReadTimeout => write!(f, "Read deadline exceeded"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Message encode/decode errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// First header byte names a reserved packet type
    UnknownPacketType(u8),
    /// Fixed header is truncated or its remaining-length field is invalid
    MalformedHeader,
    /// Body ended before a field could be read
    UnexpectedEof,
    /// Bytes left over after the last field
    TrailingBytes(usize),
    /// Frame is not of the packet type the codec was asked to decode
    PacketTypeMismatch { expected: u8, actual: u8 },
    /// Fixed-header flags not allowed for this packet type
    InvalidFlags { packet_type: u8, flags: u8 },
    /// Remaining length in the frame disagrees with the frame size
    RemainingLengthMismatch { declared: usize, actual: usize },
    /// CONNECT protocol name is not "MQTT" or "MQIsdp"
    InvalidProtocolName(String),
    /// CONNECT protocol level not supported
    UnsupportedProtocolLevel(u8),
    /// QoS value 3 or a QoS on a field that cannot carry one
    InvalidQos(u8),
    /// String field is not valid UTF-8
    InvalidUtf8,
    /// String or binary field longer than 65535 bytes
    FieldTooLong(usize),
    /// Encoded message would exceed the protocol's maximum remaining length
    MessageTooLarge(usize),
    /// QoS > 0 PUBLISH without a non-zero packet id
    MissingPacketId,
    /// Packet id present on a QoS 0 PUBLISH
    UnexpectedPacketId,
    /// SUBSCRIBE or UNSUBSCRIBE without any topic
    EmptyTopicList,
    /// PUBLISH with an empty topic name
    EmptyTopic,
    /// CONNACK or SUBACK return code outside the defined range
    InvalidReturnCode(u8),
    /// Encoder produced a different number of bytes than it declared
    LengthMismatch { declared: usize, actual: usize },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::UnknownPacketType(t) => write!(f, "Unknown packet type: {}", t),
            CodecError::MalformedHeader => write!(f, "Malformed fixed header"),
            CodecError::UnexpectedEof => write!(f, "Unexpected end of message body"),
            CodecError::TrailingBytes(n) => write!(f, "{} trailing bytes after message", n),
            CodecError::PacketTypeMismatch { expected, actual } => write!(
                f,
                "Packet type mismatch: expected {}, got {}",
                expected, actual
            ),
            CodecError::InvalidFlags { packet_type, flags } => write!(
                f,
                "Invalid flags 0x{:x} for packet type {}",
                flags, packet_type
            ),
            CodecError::RemainingLengthMismatch { declared, actual } => write!(
                f,
                "Remaining length {} does not match body of {} bytes",
                declared, actual
            ),
            CodecError::InvalidProtocolName(name) => write!(f, "Invalid protocol name: {}", name),
            CodecError::UnsupportedProtocolLevel(level) => {
                write!(f, "Unsupported protocol level: {}", level)
            }
            CodecError::InvalidQos(q) => write!(f, "Invalid QoS: {}", q),
            CodecError::InvalidUtf8 => write!(f, "String is not valid UTF-8"),
            CodecError::FieldTooLong(n) => write!(f, "Field of {} bytes exceeds 65535", n),
            CodecError::MessageTooLarge(n) => {
                write!(f, "Message body of {} bytes exceeds protocol maximum", n)
            }
            CodecError::MissingPacketId => write!(f, "Missing packet id"),
            CodecError::UnexpectedPacketId => write!(f, "Packet id on QoS 0 publish"),
            CodecError::EmptyTopicList => write!(f, "Empty topic list"),
            CodecError::EmptyTopic => write!(f, "Empty topic name"),
            CodecError::InvalidReturnCode(c) => write!(f, "Invalid return code: {}", c),
            CodecError::LengthMismatch { declared, actual } => write!(
                f,
                "Encoded length mismatch: declared {}, wrote {}",
                declared, actual
            ),
        }
    }
}

impl std::error::Error for CodecError {}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// URI could not be parsed
    InvalidUri(String),
    /// URI scheme is not a supported stream transport
    UnsupportedScheme(String),
    /// Host name did not resolve to a usable address
    UnresolvableHost(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidUri(uri) => write!(f, "Invalid URI: {}", uri),
            ConfigError::UnsupportedScheme(s) => write!(f, "Unsupported scheme: {}", s),
            ConfigError::UnresolvableHost(h) => write!(f, "Cannot resolve host: {}", h),
        }
    }
}

impl std::error::Error for ConfigError {}
