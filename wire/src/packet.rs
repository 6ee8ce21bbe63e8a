//! Datagram routing and the input packet header.

use crate::error::{PacketError, WireResult};
use crate::reader::ByteReader;
use crate::writer::ByteWriter;

/// First byte of every ticksync datagram.
///
/// A datagram whose first byte differs is not ours and is ignored.
pub const HEADER_BYTE: u8 = 0xA6;

/// Packet kind, carried in the second byte of every datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Compressed full-world snapshot. Replaces all client state.
    BaselineSync = 1,

    /// Non-final fragment of a delta snapshot.
    DiffSync = 2,

    /// Final fragment of a delta snapshot; completes reassembly.
    DiffSyncLast = 3,

    /// Client-to-server batch of input commands.
    ClientSync = 4,
}

impl PacketKind {
    /// Parses a raw kind byte.
    pub fn parse(raw: u8) -> Result<Self, PacketError> {
        match raw {
            1 => Ok(Self::BaselineSync),
            2 => Ok(Self::DiffSync),
            3 => Ok(Self::DiffSyncLast),
            4 => Ok(Self::ClientSync),
            kind => Err(PacketError::UnknownKind { kind }),
        }
    }

    /// Returns the raw kind byte.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self as u8
    }

    /// Returns `true` for either diff fragment kind.
    #[must_use]
    pub const fn is_diff(self) -> bool {
        matches!(self, Self::DiffSync | Self::DiffSyncLast)
    }
}

/// Routes a raw datagram: validates the header byte and parses the kind.
///
/// Returns the kind and a reader positioned at the packet body.
pub fn route(bytes: &[u8]) -> Result<(PacketKind, ByteReader<'_>), PacketError> {
    if bytes.len() < 2 {
        return Err(PacketError::Truncated { len: bytes.len() });
    }
    if bytes[0] != HEADER_BYTE {
        return Err(PacketError::BadHeaderByte { found: bytes[0] });
    }
    let kind = PacketKind::parse(bytes[1])?;
    Ok((kind, ByteReader::new(&bytes[2..])))
}

/// Fixed header prepended to every input command payload.
///
/// Tells the server which interpolation window the client was rendering
/// when the input was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputHeader {
    /// Tick of the interpolation base snapshot.
    pub state_a_tick: u16,
    /// Tick of the interpolation target snapshot (equals `state_a_tick`
    /// when no target is loaded).
    pub state_b_tick: u16,
    /// Milliseconds elapsed into the current interpolation window.
    pub lerp_msec: u16,
}

impl InputHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 6;

    /// Writes the header.
    pub fn encode(&self, writer: &mut ByteWriter) {
        writer.write_u16(self.state_a_tick);
        writer.write_u16(self.state_b_tick);
        writer.write_u16(self.lerp_msec);
    }

    /// Reads a header.
    pub fn decode(reader: &mut ByteReader<'_>) -> WireResult<Self> {
        Ok(Self {
            state_a_tick: reader.read_u16()?,
            state_b_tick: reader.read_u16()?,
            lerp_msec: reader.read_u16()?,
        })
    }
}
