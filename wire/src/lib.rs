//! Byte-level wire framing for the ticksync protocol.
//!
//! This crate provides the pieces every packet passes through:
//! - Bounds-checked byte reading ([`ByteReader`]) and growable byte
//!   writing ([`ByteWriter`])
//! - Datagram routing: the protocol header byte and packet kinds
//! - The fixed input packet header prepended to every input command
//!
//! # Design Principles
//!
//! - **Never panics on malformed input** - every read is bounds-checked
//!   and returns an error.
//! - **Byte-aligned** - the protocol carries raw field images; there is no
//!   sub-byte packing.
//! - **Zero dependencies** - framing has no business pulling in a stack.

mod error;
mod packet;
mod reader;
mod writer;

pub use error::{PacketError, ReadError, WireResult};
pub use packet::{route, InputHeader, PacketKind, HEADER_BYTE};
pub use reader::ByteReader;
pub use writer::ByteWriter;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_exports() {
        let _ = ByteReader::new(&[]);
        let _ = ByteWriter::new();
        let _ = PacketKind::parse(1);
        let _: WireResult<()> = Ok(());
        assert_ne!(HEADER_BYTE, 0);
    }

    #[test]
    fn reader_writer_roundtrip() {
        let mut writer = ByteWriter::new();
        writer.write_u8(0xAB);
        writer.write_u16(0x1234);
        writer.write_u32(0xDEAD_BEEF);

        let bytes = writer.finish();
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(reader.read_u8().unwrap(), 0xAB);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u32().unwrap(), 0xDEAD_BEEF);
        assert!(reader.is_empty());
    }
}
