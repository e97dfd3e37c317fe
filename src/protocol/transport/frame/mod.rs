//! Frame-level representation of the link traffic: the raw frame handed over
//! by the radio receive callback, the message type tags, and the short control
//! frames that never need fragmentation.
//!
//! ```text
//! PROBE        [0x00][seq:u32]                          broadcast
//! ACK          [0x01][seq:u32][channel:u8]              directed
//! DATA         [0x02][soc:u8][power:i16][checksum:u16]  directed
//! REQUEST_DATA [0x03][subtype:u8]
//! ABORT_DATA   [0x04][subtype:u8]
//! PACKET       [0x05]...                                see `packet`
//! REBOOT       [0x06]
//! OTA_START    [0x07][size:u32]
//! FLASH_LED    [0x08][color:u8]
//! ```
use crate::core::{FrameBytes, MacAddress};
use crate::error::FrameError;
use crate::infra::codec::{ByteReader, ByteWriter};

//==================================================================================MESSAGE_TYPE
/// Leading type byte of every frame on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MessageType {
    Probe = 0x00,
    Ack = 0x01,
    Data = 0x02,
    RequestData = 0x03,
    AbortData = 0x04,
    Packet = 0x05,
    Reboot = 0x06,
    OtaStart = 0x07,
    FlashLed = 0x08,
}

impl MessageType {
    #[inline]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    pub const fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0x00 => Self::Probe,
            0x01 => Self::Ack,
            0x02 => Self::Data,
            0x03 => Self::RequestData,
            0x04 => Self::AbortData,
            0x05 => Self::Packet,
            0x06 => Self::Reboot,
            0x07 => Self::OtaStart,
            0x08 => Self::FlashLed,
            _ => return None,
        })
    }
}

//==================================================================================SUBTYPE
/// Semantic class of a PACKET payload. Unknown values are carried verbatim so
/// they can still reach a wildcard route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Subtype {
    None,
    Settings,
    SystemInfo,
    Events,
    Logs,
    CellInfo,
    PowerProfile,
    Unknown(u8),
}

impl Subtype {
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::None,
            1 => Self::Settings,
            2 => Self::SystemInfo,
            3 => Self::Events,
            4 => Self::Logs,
            5 => Self::CellInfo,
            6 => Self::PowerProfile,
            other => Self::Unknown(other),
        }
    }

    pub const fn to_byte(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Settings => 1,
            Self::SystemInfo => 2,
            Self::Events => 3,
            Self::Logs => 4,
            Self::CellInfo => 5,
            Self::PowerProfile => 6,
            Self::Unknown(other) => other,
        }
    }
}

impl From<u8> for Subtype {
    fn from(byte: u8) -> Self {
        Self::from_byte(byte)
    }
}

impl From<Subtype> for u8 {
    fn from(subtype: Subtype) -> Self {
        subtype.to_byte()
    }
}

/// Colour requested by a FLASH_LED frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum LedColor {
    Red = 0,
    Green = 1,
    Orange = 2,
}

impl LedColor {
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Red),
            1 => Some(Self::Green),
            2 => Some(Self::Orange),
            _ => None,
        }
    }
}

//==================================================================================CONTROL_FRAMES
/// Short, single-frame messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlFrame {
    /// Discovery broadcast.
    Probe { seq: u32 },
    /// Directed reply to a probe, carrying the responder's channel.
    Ack { seq: u32, channel: u8 },
    /// Legacy small telemetry payload.
    Data { soc: u8, power: i16 },
    RequestData { subtype: Subtype },
    AbortData { subtype: Subtype },
    Reboot,
    OtaStart { size: u32 },
    FlashLed { color: LedColor },
}

/// Checksum of a legacy DATA frame: `soc + power` as unsigned 16-bit.
#[inline]
pub fn data_checksum(soc: u8, power: i16) -> u16 {
    (soc as u16).wrapping_add(power as u16)
}

impl ControlFrame {
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Probe { .. } => MessageType::Probe,
            Self::Ack { .. } => MessageType::Ack,
            Self::Data { .. } => MessageType::Data,
            Self::RequestData { .. } => MessageType::RequestData,
            Self::AbortData { .. } => MessageType::AbortData,
            Self::Reboot => MessageType::Reboot,
            Self::OtaStart { .. } => MessageType::OtaStart,
            Self::FlashLed { .. } => MessageType::FlashLed,
        }
    }

    /// Exact on-wire length of the frame.
    pub const fn wire_len(&self) -> usize {
        match self {
            Self::Probe { .. } => 5,
            Self::Ack { .. } => 6,
            Self::Data { .. } => 6,
            Self::RequestData { .. } | Self::AbortData { .. } => 2,
            Self::Reboot => 1,
            Self::OtaStart { .. } => 5,
            Self::FlashLed { .. } => 2,
        }
    }

    /// Serialize into a frame buffer.
    pub fn encode(&self) -> FrameBytes {
        let mut frame = FrameBytes::new();
        frame.len = self.wire_len();
        // Every layout fits well inside the 250-byte buffer.
        let _ = self.write(frame.as_mut_slice());
        frame
    }

    fn write(&self, out: &mut [u8]) -> Result<(), crate::error::WriterError> {
        let mut writer = ByteWriter::new(out);
        writer.write_u8(self.message_type().tag())?;
        match *self {
            Self::Probe { seq } => writer.write_u32(seq),
            Self::Ack { seq, channel } => {
                writer.write_u32(seq)?;
                writer.write_u8(channel)
            }
            Self::Data { soc, power } => {
                writer.write_u8(soc)?;
                writer.write_i16(power)?;
                writer.write_u16(data_checksum(soc, power))
            }
            Self::RequestData { subtype } | Self::AbortData { subtype } => {
                writer.write_u8(subtype.to_byte())
            }
            Self::Reboot => Ok(()),
            Self::OtaStart { size } => writer.write_u32(size),
            Self::FlashLed { color } => writer.write_u8(color as u8),
        }
    }

    /// Parse a control frame. Trailing bytes beyond the fixed layout are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let tag = *bytes.first().ok_or(FrameError::Empty)?;
        let message_type = MessageType::from_tag(tag).ok_or(FrameError::UnknownType(tag))?;

        let expected = match message_type {
            MessageType::Probe | MessageType::OtaStart => 5,
            MessageType::Ack | MessageType::Data => 6,
            MessageType::RequestData | MessageType::AbortData | MessageType::FlashLed => 2,
            MessageType::Reboot => 1,
            MessageType::Packet => return Err(FrameError::NotControl),
        };
        if bytes.len() < expected {
            return Err(FrameError::TooShort {
                expected,
                actual: bytes.len(),
            });
        }

        let mut reader = ByteReader::new(&bytes[1..]);
        let frame = match message_type {
            MessageType::Probe => Self::Probe {
                seq: reader.read_u32()?,
            },
            MessageType::Ack => Self::Ack {
                seq: reader.read_u32()?,
                channel: reader.read_u8()?,
            },
            MessageType::Data => {
                let soc = reader.read_u8()?;
                let power = reader.read_i16()?;
                let expected = reader.read_u16()?;
                let computed = data_checksum(soc, power);
                if expected != computed {
                    return Err(FrameError::ChecksumMismatch { expected, computed });
                }
                Self::Data { soc, power }
            }
            MessageType::RequestData => Self::RequestData {
                subtype: Subtype::from_byte(reader.read_u8()?),
            },
            MessageType::AbortData => Self::AbortData {
                subtype: Subtype::from_byte(reader.read_u8()?),
            },
            MessageType::Reboot => Self::Reboot,
            MessageType::OtaStart => Self::OtaStart {
                size: reader.read_u32()?,
            },
            MessageType::FlashLed => {
                let byte = reader.read_u8()?;
                Self::FlashLed {
                    color: LedColor::from_byte(byte).ok_or(FrameError::InvalidValue(byte))?,
                }
            }
            MessageType::Packet => return Err(FrameError::NotControl),
        };
        Ok(frame)
    }
}

//==================================================================================RAW_FRAME
/// A frame as delivered by the radio receive callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame {
    /// Sender address.
    pub mac: MacAddress,
    pub bytes: FrameBytes,
    /// Monotonic reception time (ms).
    pub timestamp_ms: u64,
}

impl RawFrame {
    /// Wrap received bytes; `None` when they exceed the radio MTU.
    pub fn new(mac: MacAddress, data: &[u8], timestamp_ms: u64) -> Option<Self> {
        Some(Self {
            mac,
            bytes: FrameBytes::from_slice(data)?,
            timestamp_ms,
        })
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decoded leading type byte, if known.
    pub fn message_type(&self) -> Option<MessageType> {
        self.as_slice().first().copied().and_then(MessageType::from_tag)
    }
}
