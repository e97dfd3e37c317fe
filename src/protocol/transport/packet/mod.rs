//! Fragmented packets: carry payloads of any size over 250-byte frames.
//!
//! Every fragment is a self-describing frame:
//!
//! ```text
//! offset width field
//!   0     1    type        = PACKET (0x05)
//!   1     1    subtype
//!   2     4    seq         shared by all fragments of one payload
//!   6     2    frag_index  0-based
//!   8     2    frag_total  >= 1
//!  10     2    payload_len <= 230
//!  12     2    checksum    byte sum of the payload, mod 2^16
//!  14   230    payload
//! ```
//!
//! The transport is best effort. Reassembly belongs to the subscriber of a
//! subtype; [`assembler::PacketAssembler`] is the stock implementation.
use crate::error::PacketError;
use crate::infra::codec::{ByteReader, ByteWriter};
use crate::protocol::transport::frame::{MessageType, Subtype};

pub mod assembler;
pub mod builder;

/// Size of the fragment header.
pub const PACKET_HEADER_LEN: usize = 14;
/// Payload capacity of one fragment.
pub const MAX_PACKET_PAYLOAD: usize = 230;
/// Largest fragment count the 16-bit counters can express.
pub const MAX_FRAGMENTS: usize = u16::MAX as usize;
/// Largest payload that can be fragmented.
pub const MAX_PACKET_MESSAGE: usize = MAX_PACKET_PAYLOAD * MAX_FRAGMENTS;

/// Unsigned 16-bit wrap-around sum of `bytes`.
#[inline]
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |acc, &byte| acc.wrapping_add(byte as u16))
}

/// Number of fragments needed for a payload of `len` bytes (at least one).
#[inline]
pub fn fragment_count(len: usize) -> usize {
    len.div_ceil(MAX_PACKET_PAYLOAD).max(1)
}

//==================================================================================HEADER
/// Decoded fragment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PacketHeader {
    pub subtype: Subtype,
    pub seq: u32,
    pub frag_index: u16,
    pub frag_total: u16,
    pub payload_len: u16,
    pub checksum: u16,
}

impl PacketHeader {
    /// Serialize the header (type byte included) into the first 14 bytes of `out`.
    pub fn write(&self, out: &mut [u8]) -> Result<(), PacketError> {
        let mut writer = ByteWriter::new(out);
        writer.write_u8(MessageType::Packet.tag())?;
        writer.write_u8(self.subtype.to_byte())?;
        writer.write_u32(self.seq)?;
        writer.write_u16(self.frag_index)?;
        writer.write_u16(self.frag_total)?;
        writer.write_u16(self.payload_len)?;
        writer.write_u16(self.checksum)?;
        Ok(())
    }

    /// Parse the header fields without semantic validation.
    pub fn read(frame: &[u8]) -> Result<Self, PacketError> {
        if frame.len() < PACKET_HEADER_LEN {
            return Err(PacketError::TooShort { len: frame.len() });
        }
        let mut reader = ByteReader::new(frame);
        let tag = reader.read_u8()?;
        if tag != MessageType::Packet.tag() {
            return Err(PacketError::WrongType(tag));
        }
        Ok(Self {
            subtype: Subtype::from_byte(reader.read_u8()?),
            seq: reader.read_u32()?,
            frag_index: reader.read_u16()?,
            frag_total: reader.read_u16()?,
            payload_len: reader.read_u16()?,
            checksum: reader.read_u16()?,
        })
    }

    /// The payload fits in one fragment. A zero total with index zero is
    /// accepted as single for peers that leave the counter unset.
    #[inline]
    pub fn is_single_fragment(&self) -> bool {
        self.frag_total == 1 || (self.frag_index == 0 && self.frag_total == 0)
    }

    /// First fragment of a multi-fragment payload.
    #[inline]
    pub fn is_first_fragment(&self) -> bool {
        self.frag_index == 0 && self.frag_total > 1
    }

    /// Last fragment of a multi-fragment payload.
    #[inline]
    pub fn is_last_fragment(&self) -> bool {
        self.frag_total > 1 && self.frag_index == self.frag_total - 1
    }
}

//==================================================================================PACKET_INFO
/// A validated fragment borrowed from a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketInfo<'a> {
    pub header: PacketHeader,
    /// Exactly `payload_len` bytes.
    pub payload: &'a [u8],
}

impl<'a> PacketInfo<'a> {
    /// Decode and validate one fragment.
    ///
    /// Rejected: wrong type byte, frame shorter than the header,
    /// `payload_len > 230`, payload running past the frame, `frag_total == 0`
    /// or `frag_index >= frag_total`, and checksum mismatch.
    pub fn decode(frame: &'a [u8]) -> Result<Self, PacketError> {
        let header = PacketHeader::read(frame)?;

        let declared = header.payload_len as usize;
        if declared > MAX_PACKET_PAYLOAD {
            return Err(PacketError::PayloadTooLong { len: declared });
        }
        let available = frame.len() - PACKET_HEADER_LEN;
        if declared > available {
            return Err(PacketError::Truncated {
                declared,
                available,
            });
        }
        if header.frag_total == 0 || header.frag_index >= header.frag_total {
            return Err(PacketError::BadFragmentIndex {
                index: header.frag_index,
                total: header.frag_total,
            });
        }

        let payload = &frame[PACKET_HEADER_LEN..PACKET_HEADER_LEN + declared];
        let computed = checksum(payload);
        if computed != header.checksum {
            return Err(PacketError::ChecksumMismatch {
                expected: header.checksum,
                computed,
            });
        }

        Ok(Self { header, payload })
    }

    #[inline]
    pub fn seq(&self) -> u32 {
        self.header.seq
    }

    #[inline]
    pub fn subtype(&self) -> Subtype {
        self.header.subtype
    }
}
