//! Fragment generator: splits an application payload into the sequence of
//! PACKET frames sharing one `seq`.
use crate::core::FrameBytes;
use crate::error::PacketError;
use crate::protocol::transport::frame::Subtype;
use crate::protocol::transport::packet::{
    checksum, fragment_count, PacketHeader, MAX_PACKET_MESSAGE, MAX_PACKET_PAYLOAD,
    PACKET_HEADER_LEN,
};
#[cfg(target_has_atomic = "32")]
use core::sync::atomic::{AtomicU32, Ordering};

#[cfg(target_has_atomic = "32")]
static GLOBAL_PACKET_SEQ: AtomicU32 = AtomicU32::new(0);

// Targets without 32-bit compare-and-swap serialise the counter in a critical section.
#[cfg(not(target_has_atomic = "32"))]
static GLOBAL_PACKET_SEQ: embassy_sync::blocking_mutex::Mutex<
    embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex,
    core::cell::Cell<u32>,
> = embassy_sync::blocking_mutex::Mutex::new(core::cell::Cell::new(0));

/// Allocate the next per-sender packet sequence. Wraps at `u32::MAX`.
fn next_packet_seq() -> u32 {
    #[cfg(target_has_atomic = "32")]
    {
        GLOBAL_PACKET_SEQ.fetch_add(1, Ordering::Relaxed)
    }

    #[cfg(not(target_has_atomic = "32"))]
    {
        GLOBAL_PACKET_SEQ.lock(|seq| {
            let current = seq.get();
            seq.set(current.wrapping_add(1));
            current
        })
    }
}

#[derive(Debug)]
/// Shared parameters for all fragments of one payload.
pub struct PacketBuilder<'a> {
    subtype: Subtype,
    payload: &'a [u8],
    seq: u32,
}

/// Lazy iterator returning fragments one by one as they are encoded.
pub struct FragmentIterator<'a> {
    builder: PacketBuilder<'a>,
    frag_index: usize,
    frag_total: usize,
    failed: bool,
}

impl<'a> Iterator for FragmentIterator<'a> {
    type Item = Result<FrameBytes, PacketError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.frag_index >= self.frag_total {
            return None;
        }

        let total_len = self.builder.payload.len();
        if total_len > MAX_PACKET_MESSAGE {
            self.failed = true;
            return Some(Err(PacketError::TooLarge { len: total_len }));
        }

        let start = self.frag_index * MAX_PACKET_PAYLOAD;
        let end = (start + MAX_PACKET_PAYLOAD).min(total_len);
        let slice = &self.builder.payload[start..end];

        let header = PacketHeader {
            subtype: self.builder.subtype,
            seq: self.builder.seq,
            frag_index: self.frag_index as u16,
            frag_total: self.frag_total as u16,
            payload_len: slice.len() as u16,
            checksum: checksum(slice),
        };

        let mut frame = FrameBytes::new();
        frame.len = PACKET_HEADER_LEN + slice.len();
        if let Err(e) = header.write(&mut frame.data[..PACKET_HEADER_LEN]) {
            self.failed = true;
            return Some(Err(e));
        }
        frame.data[PACKET_HEADER_LEN..frame.len].copy_from_slice(slice);

        self.frag_index += 1;
        Some(Ok(frame))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = if self.failed {
            0
        } else {
            self.frag_total - self.frag_index
        };
        (left, Some(left))
    }
}

impl<'a> PacketBuilder<'a> {
    /// Prepare the fragmentation of `payload`, allocating a fresh `seq`.
    pub fn new(subtype: Subtype, payload: &'a [u8]) -> Self {
        Self {
            subtype,
            payload,
            seq: next_packet_seq(),
        }
    }

    /// Override the sequence identifier.
    ///
    /// # Recommended usage
    /// Testing, replaying captured traffic, or controlled playback scenarios.
    /// In production let `PacketBuilder::new` allocate it.
    pub fn with_sequence(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// `max(1, ceil(len / 230))`.
    pub fn fragment_count(&self) -> usize {
        fragment_count(self.payload.len())
    }

    /// Start the iteration; each call to `next` yields the next fragment.
    pub fn build(self) -> FragmentIterator<'a> {
        let frag_total = self.fragment_count();
        FragmentIterator {
            builder: self,
            frag_index: 0,
            frag_total,
            failed: false,
        }
    }
}
