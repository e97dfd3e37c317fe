//! Packet reassembler: rebuilds application payloads from validated
//! fragments, on the subscriber side of a subtype.
//!
//! Sessions are keyed by `(subtype, seq)`. Fragments may arrive in any order;
//! fragment `i` lands at offset `i * 230`. Duplicates are ignored, and a
//! fragment whose `frag_total` disagrees with the session it belongs to is
//! discarded. Idle sessions are dropped after the policy timeout.
//!
//! Received fragments are tracked in `WORDS` 32-bit words per session. The
//! default covers 64 fragments; larger capacities size it with
//! [`bitmap_words`]:
//!
//! ```
//! use espnow_link::protocol::transport::packet::assembler::{bitmap_words, PacketAssembler};
//!
//! const CAP: usize = 32 * 1024;
//! let assembler: PacketAssembler<CAP, 1, { bitmap_words(CAP) }> = PacketAssembler::default();
//! assert_eq!(assembler.pending(), 0);
//! ```
use super::{PacketInfo, MAX_PACKET_PAYLOAD};
use crate::protocol::transport::frame::Subtype;

//==================================================================================Constants

/// Lower bound of the idle timeout.
pub const MIN_IDLE_TIMEOUT_MS: u32 = 2000;

/// Bitmap words needed to track every fragment of a `cap`-byte payload.
pub const fn bitmap_words(cap: usize) -> usize {
    let fragments = cap.div_ceil(MAX_PACKET_PAYLOAD);
    if fragments == 0 {
        1
    } else {
        fragments.div_ceil(32)
    }
}

//==================================================================================Enums and Structs

/// When to give up on a partial payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyPolicy {
    pub idle_timeout_ms: u32,
}

impl ReassemblyPolicy {
    /// `max(5 * max_fragment_spacing_ms, 2000)`.
    pub fn recommended(max_fragment_spacing_ms: u32) -> Self {
        Self {
            idle_timeout_ms: max_fragment_spacing_ms
                .saturating_mul(5)
                .max(MIN_IDLE_TIMEOUT_MS),
        }
    }
}

impl Default for ReassemblyPolicy {
    fn default() -> Self {
        Self::recommended(0)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum AssembleResult<const CAP: usize> {
    /// Fragment discarded (duplicate, `frag_total` mismatch, too large for
    /// `CAP`, session pool exhausted).
    Ignored,
    /// Fragment stored; more are missing.
    FragmentConsumed,
    /// All fragments were received; the complete payload is available.
    MessageComplete(CompletedMessage<CAP>),
}

/// Owned copy of a reassembled payload.
#[derive(Debug, PartialEq, Eq)]
pub struct CompletedMessage<const CAP: usize> {
    pub subtype: Subtype,
    pub seq: u32,
    pub payload: [u8; CAP],
    /// Number of valid bytes in `payload`.
    pub len: usize,
}

impl<const CAP: usize> CompletedMessage<CAP> {
    pub fn as_slice(&self) -> &[u8] {
        &self.payload[..self.len]
    }
}

#[derive(Debug, Clone, Copy)]
struct Session<const CAP: usize, const WORDS: usize> {
    active: bool,
    subtype: Subtype,
    seq: u32,
    frag_total: u16,
    received: [u32; WORDS],
    received_count: u16,
    len: usize,
    last_activity_ms: u64,
    buffer: [u8; CAP],
}

impl<const CAP: usize, const WORDS: usize> Session<CAP, WORDS> {
    const fn new() -> Self {
        Self {
            active: false,
            subtype: Subtype::None,
            seq: 0,
            frag_total: 0,
            received: [0; WORDS],
            received_count: 0,
            len: 0,
            last_activity_ms: 0,
            buffer: [0; CAP],
        }
    }

    fn reset(&mut self) {
        self.active = false;
        self.received = [0; WORDS];
        self.received_count = 0;
        self.len = 0;
        // The buffer is overwritten by the next session.
    }

    fn is_stale(&self, now_ms: u64, policy: &ReassemblyPolicy) -> bool {
        self.active && now_ms.saturating_sub(self.last_activity_ms) > policy.idle_timeout_ms as u64
    }
}

/// Reassembler with `SESSIONS` concurrent payloads of up to `CAP` bytes,
/// each tracking up to `WORDS * 32` fragments.
#[derive(Debug)]
pub struct PacketAssembler<const CAP: usize, const SESSIONS: usize = 2, const WORDS: usize = 2> {
    sessions: [Session<CAP, WORDS>; SESSIONS],
    policy: ReassemblyPolicy,
}

impl<const CAP: usize, const SESSIONS: usize, const WORDS: usize> Default
    for PacketAssembler<CAP, SESSIONS, WORDS>
{
    fn default() -> Self {
        Self::new(ReassemblyPolicy::default())
    }
}

impl<const CAP: usize, const SESSIONS: usize, const WORDS: usize>
    PacketAssembler<CAP, SESSIONS, WORDS>
{
    /// Fails to build when the bitmap cannot cover a full `CAP` payload.
    const BITMAP_FITS: () = assert!(
        WORDS >= bitmap_words(CAP),
        "WORDS too small for CAP, use bitmap_words(CAP)"
    );

    /// Largest fragment count a session can track.
    pub const MAX_FRAGMENTS: usize = WORDS * 32;

    pub const fn new(policy: ReassemblyPolicy) -> Self {
        let () = Self::BITMAP_FITS;
        Self {
            sessions: [Session::new(); SESSIONS],
            policy,
        }
    }

    pub fn policy(&self) -> ReassemblyPolicy {
        self.policy
    }

    /// Number of partial payloads currently held.
    pub fn pending(&self) -> usize {
        self.sessions.iter().filter(|s| s.active).count()
    }

    /// Drop sessions idle for longer than the policy allows. Returns how many.
    pub fn expire_stale(&mut self, now_ms: u64) -> usize {
        let policy = self.policy;
        let mut expired = 0;
        for session in self.sessions.iter_mut().filter(|s| s.is_stale(now_ms, &policy)) {
            #[cfg(feature = "defmt")]
            defmt::debug!(
                "reassembly of seq {} timed out ({}/{} fragments)",
                session.seq,
                session.received_count,
                session.frag_total
            );
            session.reset();
            expired += 1;
        }
        expired
    }

    //==================================================================================Process Functions
    /// Feed one validated fragment received at `now_ms`.
    pub fn process_fragment(&mut self, fragment: &PacketInfo<'_>, now_ms: u64) -> AssembleResult<CAP> {
        let header = &fragment.header;
        let index = header.frag_index as usize;
        let total = header.frag_total as usize;
        let offset = index * MAX_PACKET_PAYLOAD;
        let end = offset + fragment.payload.len();

        if total > Self::MAX_FRAGMENTS || index >= Self::MAX_FRAGMENTS || end > CAP {
            return AssembleResult::Ignored;
        }

        // Single-fragment payloads never need a session.
        if total == 1 {
            let mut payload = [0u8; CAP];
            payload[..end].copy_from_slice(fragment.payload);
            return AssembleResult::MessageComplete(CompletedMessage {
                subtype: header.subtype,
                seq: header.seq,
                payload,
                len: end,
            });
        }

        self.expire_stale(now_ms);

        let existing = self
            .sessions
            .iter()
            .position(|s| s.active && s.seq == header.seq && s.subtype == header.subtype);

        let slot = match existing {
            Some(slot) => {
                if self.sessions[slot].frag_total != header.frag_total {
                    #[cfg(feature = "defmt")]
                    defmt::warn!(
                        "seq {}: frag_total {} disagrees with {}, fragment dropped",
                        header.seq,
                        header.frag_total,
                        self.sessions[slot].frag_total
                    );
                    return AssembleResult::Ignored;
                }
                slot
            }
            None => match self.sessions.iter().position(|s| !s.active) {
                Some(slot) => {
                    let session = &mut self.sessions[slot];
                    session.reset();
                    session.active = true;
                    session.subtype = header.subtype;
                    session.seq = header.seq;
                    session.frag_total = header.frag_total;
                    slot
                }
                None => return AssembleResult::Ignored,
            },
        };

        let session = &mut self.sessions[slot];
        let (word, bit) = (index / 32, 1u32 << (index % 32));
        if session.received[word] & bit != 0 {
            return AssembleResult::Ignored;
        }

        session.buffer[offset..end].copy_from_slice(fragment.payload);
        session.received[word] |= bit;
        session.received_count += 1;
        session.len = session.len.max(end);
        session.last_activity_ms = now_ms;

        if session.received_count < session.frag_total {
            return AssembleResult::FragmentConsumed;
        }

        // Copy the complete payload into a dedicated return structure.
        let mut payload = [0u8; CAP];
        payload[..session.len].copy_from_slice(&session.buffer[..session.len]);
        let completed = CompletedMessage {
            subtype: session.subtype,
            seq: session.seq,
            payload,
            len: session.len,
        };

        // Release the session for future payloads.
        session.reset();

        AssembleResult::MessageComplete(completed)
    }
}
