//! Plain data types shared by every layer of the link: peer addresses,
//! fixed-size frame buffers and the radio channel range.

use core::fmt;

/// Largest frame the radio accepts, header included.
pub const MAX_FRAME_LEN: usize = 250;

/// Lowest usable radio channel.
pub const MIN_CHANNEL: u8 = 1;
/// Highest usable radio channel.
pub const MAX_CHANNEL: u8 = 13;

/// Returns `true` when `channel` lies in `MIN_CHANNEL..=MAX_CHANNEL`.
#[inline]
pub const fn is_valid_channel(channel: u8) -> bool {
    channel >= MIN_CHANNEL && channel <= MAX_CHANNEL
}

/// 6-byte hardware address of a radio node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// All-zero address, meaning "no peer".
    pub const ZERO: Self = Self([0; 6]);
    /// Broadcast address, used only for discovery probes.
    pub const BROADCAST: Self = Self([0xFF; 6]);

    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Build an address from the first six bytes of `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 6] = bytes.get(..6)?.try_into().ok()?;
        Some(Self(raw))
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }

    #[inline]
    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xFF; 6]
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Fixed-capacity buffer holding one radio frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBytes {
    pub len: usize,
    pub data: [u8; MAX_FRAME_LEN],
}

impl Default for FrameBytes {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBytes {
    /// Create an empty buffer.
    pub const fn new() -> Self {
        Self {
            len: 0,
            data: [0; MAX_FRAME_LEN],
        }
    }

    /// Build a buffer from `slice`, or `None` when it exceeds the radio MTU.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() > MAX_FRAME_LEN {
            return None;
        }
        let mut bytes = Self::new();
        bytes.copy_from_slice(slice);
        Some(bytes)
    }

    /// Number of valid bytes stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Checks whether the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reset the buffer.
    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Copy bytes into the buffer and update `len`. Input beyond the MTU is cut.
    #[inline]
    pub fn copy_from_slice(&mut self, slice: &[u8]) {
        let clamped = slice.len().min(MAX_FRAME_LEN);
        self.data[..clamped].copy_from_slice(&slice[..clamped]);
        self.len = clamped;
    }

    /// Immutable view over the populated bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Mutable view over the populated bytes.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[..self.len]
    }
}
