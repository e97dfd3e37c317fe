//! Error definitions shared across library modules.
//! Each type models one failure family (channel arbitration, wire codecs,
//! route table, event queue, discovery handshake).
use thiserror_no_std::Error;

//==================================================================================CHANNEL_ERROR
#[derive(Error, Debug, PartialEq, Eq)]
/// Failures reported by the channel manager.
pub enum ChannelError<E: core::fmt::Debug> {
    /// Requested channel is outside 1..=13.
    #[error("Invalid channel: {channel}")]
    Invalid { channel: u8 },
    /// The channel gate could not be acquired before the deadline.
    #[error("Channel gate busy")]
    Busy,
    /// The channel is locked by an established connection.
    #[error("Channel change rejected: channel is locked")]
    Rejected,
    /// The radio refused the switch; the current channel is unchanged.
    #[error("Radio error: {0:?}")]
    Radio(E),
}

//==================================================================================CODEC_ERROR
#[derive(Error, Debug, PartialEq, Eq)]
/// Errors raised while reading a byte buffer.
pub enum ReaderError {
    /// Attempted to read past the end of the buffer.
    #[error("Attempted to read out of bounds -> asked: {asked}, available: {available}")]
    OutOfBounds { asked: usize, available: usize },
}

#[derive(Error, Debug, PartialEq, Eq)]
/// Errors raised while writing into a byte buffer.
pub enum WriterError {
    /// Attempted to write beyond the provided capacity.
    #[error("Attempted to write out of bounds -> asked: {asked}, available: {available}")]
    OutOfBounds { asked: usize, available: usize },
}

//==================================================================================FRAME_ERROR
#[derive(Error, Debug, PartialEq, Eq)]
/// Failures while decoding a short control frame.
pub enum FrameError {
    /// Zero-length frame.
    #[error("Empty frame")]
    Empty,
    /// Leading type byte is not a known message type.
    #[error("Unknown message type: {0}")]
    UnknownType(u8),
    /// The frame is a PACKET; use the packet codec instead.
    #[error("Frame is a fragmented packet")]
    NotControl,
    /// Frame shorter than its fixed layout.
    #[error("Frame too short -> expected: {expected}, actual: {actual}")]
    TooShort { expected: usize, actual: usize },
    /// Legacy DATA frame whose checksum does not match.
    #[error("Checksum mismatch -> expected: {expected}, computed: {computed}")]
    ChecksumMismatch { expected: u16, computed: u16 },
    /// Field value outside its enumeration.
    #[error("Invalid field value: {0}")]
    InvalidValue(u8),
    /// Byte-level read failure.
    #[error("Reader error: {0}")]
    Reader(#[from] ReaderError),
}

//==================================================================================PACKET_ERROR
#[derive(Error, Debug, PartialEq, Eq)]
/// Failures while encoding or decoding a fragmented PACKET.
pub enum PacketError {
    /// Leading type byte is not PACKET.
    #[error("Not a packet frame: type {0}")]
    WrongType(u8),
    /// Frame shorter than the packet header.
    #[error("Packet too short: {len} bytes")]
    TooShort { len: usize },
    /// Declared payload length exceeds the fragment capacity.
    #[error("Fragment payload too long: {len} bytes")]
    PayloadTooLong { len: usize },
    /// Declared payload length runs past the end of the frame.
    #[error("Truncated fragment -> declared: {declared}, available: {available}")]
    Truncated { declared: usize, available: usize },
    /// `frag_index` is not below `frag_total`.
    #[error("Bad fragment index {index} of {total}")]
    BadFragmentIndex { index: u16, total: u16 },
    /// Payload byte sum does not match the header checksum.
    #[error("Checksum mismatch -> expected: {expected}, computed: {computed}")]
    ChecksumMismatch { expected: u16, computed: u16 },
    /// Payload needs more fragments than the 16-bit counter can express.
    #[error("Payload too large to fragment: {len} bytes")]
    TooLarge { len: usize },
    /// Header serialization failure.
    #[error("Writer error: {0}")]
    Writer(#[from] WriterError),
    /// Header deserialization failure.
    #[error("Reader error: {0}")]
    Reader(#[from] ReaderError),
}

//==================================================================================SEND_ERROR
#[derive(Error, Debug, PartialEq, Eq)]
/// Errors encountered when sending a fragmented payload (build + governed submit).
pub enum SendPacketError {
    /// Fragment construction failed.
    #[error("Fragment build failed: {0}")]
    Build(#[from] PacketError),
    /// The send governor refused or the radio rejected fragment `index`.
    #[error("Fragment {index} was not submitted")]
    Refused { index: u16 },
}

//==================================================================================ROUTER_ERROR
#[derive(Error, Debug, PartialEq, Eq)]
/// Route table errors.
pub enum RouterError {
    /// All route slots are taken; the registration was dropped.
    #[error("Route table full")]
    TableFull,
}

//==================================================================================CONNECTION_ERROR
#[derive(Error, Debug, PartialEq, Eq)]
/// Connection state machine errors.
pub enum ConnectionError {
    /// The event queue stayed full past the posting deadline; the event was dropped.
    #[error("Event queue full")]
    QueueFull,
    /// No free observer slot.
    #[error("Observer table full")]
    ObserverTableFull,
}

//==================================================================================DISCOVERY_ERROR
#[derive(Error, Debug)]
/// Failures of a discovery scan step or handshake completion.
pub enum DiscoveryError<E: core::fmt::Debug> {
    /// Channel manager refused the switch or lock.
    #[error("Channel error: {0:?}")]
    Channel(ChannelError<E>),
    /// The radio refused the probe broadcast.
    #[error("Probe not submitted")]
    ProbeNotSent,
    /// The radio could not register the peer.
    #[error("Peer registration failed: {0:?}")]
    PeerRegistration(E),
    /// A handshake event was dropped on a full queue; the channel lock was released.
    #[error("Handshake event dropped")]
    EventDropped,
}
