//! Observability counters.
//!
//! Each component owns the counters for what it does; the event pump gathers
//! them into a [`LinkMetrics`] snapshot on demand.
use core::cell::Cell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};

use crate::protocol::link::connection::ConnectionState;

/// Saturating event counter, safe to bump from any context.
pub struct Counter(Mutex<CriticalSectionRawMutex, Cell<u32>>);

impl Counter {
    pub const fn new() -> Self {
        Self(Mutex::new(Cell::new(0)))
    }

    #[inline]
    pub fn incr(&self) {
        self.0.lock(|count| count.set(count.get().saturating_add(1)));
    }

    #[inline]
    pub fn get(&self) -> u32 {
        self.0.lock(Cell::get)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Counter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Counter").field(&self.get()).finish()
    }
}

/// Point-in-time view of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkMetrics {
    /// Frames handed to the radio submit primitive.
    pub send_submissions: u32,
    /// Submissions the radio refused.
    pub submit_failures: u32,
    /// Sends skipped because the governor was paused.
    pub sends_skipped: u32,
    /// Back-off pauses entered.
    pub pauses: u32,
    /// Connection events dropped on a full queue.
    pub events_dropped: u32,
    /// Committed state transitions.
    pub transitions: u32,
    /// Raw frames accepted from the radio callback.
    pub frames_received: u32,
    /// Raw frames dropped (lane full or oversized).
    pub frames_dropped: u32,
    /// Frames delivered to a handler.
    pub frames_routed: u32,
    /// Frames no route matched.
    pub frames_unrouted: u32,
    pub current_channel: u8,
    pub channel_locked: bool,
    pub state: ConnectionState,
}
