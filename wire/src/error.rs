//! Error types for wire framing operations.

use std::fmt;

/// Result type for wire read operations.
pub type WireResult<T> = Result<T, ReadError>;

/// Errors that can occur while reading from a byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    /// Not enough bytes remain for the requested read.
    EndOfBuffer { requested: usize, available: usize },
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfBuffer {
                requested,
                available,
            } => {
                write!(
                    f,
                    "end of buffer: requested {requested} bytes, {available} available"
                )
            }
        }
    }
}

impl std::error::Error for ReadError {}

/// Errors that can occur while routing a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    /// First byte does not match the protocol header byte.
    BadHeaderByte { found: u8 },

    /// Unknown packet kind byte.
    UnknownKind { kind: u8 },

    /// Datagram truncated before the routing bytes.
    Truncated { len: usize },
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadHeaderByte { found } => {
                write!(f, "bad header byte: 0x{found:02X}")
            }
            Self::UnknownKind { kind } => {
                write!(f, "unknown packet kind: {kind}")
            }
            Self::Truncated { len } => {
                write!(f, "datagram truncated: {len} bytes")
            }
        }
    }
}

impl std::error::Error for PacketError {}
