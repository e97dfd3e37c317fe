use core::cell::Cell;
use core::sync::atomic::{AtomicU8, Ordering};

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use embassy_sync::channel::Channel;

use super::{ConnectionEvent, ConnectionState, EventKind, EVENT_QUEUE_CAPACITY};
use crate::core::MacAddress;
use crate::error::ConnectionError;
use crate::protocol::link::metrics::Counter;
use crate::protocol::transport::traits::clock::{with_deadline, Clock};
use crate::protocol::transport::EVENT_POST_TIMEOUT_MS;

/// Shared half of the connection: published status plus the event queue.
pub struct ConnectionLink<'a, C: Clock> {
    clock: &'a C,
    state: AtomicU8,
    peer: Mutex<CriticalSectionRawMutex, Cell<MacAddress>>,
    queue: Channel<CriticalSectionRawMutex, ConnectionEvent, EVENT_QUEUE_CAPACITY>,
    dropped: Counter,
    transitions: Counter,
}

impl<'a, C: Clock> ConnectionLink<'a, C> {
    pub const fn new(clock: &'a C) -> Self {
        Self {
            clock,
            state: AtomicU8::new(ConnectionState::Idle as u8),
            peer: Mutex::new(Cell::new(MacAddress::ZERO)),
            queue: Channel::new(),
            dropped: Counter::new(),
            transitions: Counter::new(),
        }
    }

    fn event(&self, kind: EventKind, mac: MacAddress) -> ConnectionEvent {
        ConnectionEvent {
            kind,
            peer_mac: mac,
            timestamp_ms: self.clock.now_ms(),
        }
    }

    /// Enqueue an event, waiting up to 100 ms for room. On timeout the event
    /// is dropped and counted.
    pub async fn post_event(&self, kind: EventKind, mac: MacAddress) -> Result<(), ConnectionError> {
        let event = self.event(kind, mac);
        match with_deadline(self.clock, EVENT_POST_TIMEOUT_MS, self.queue.send(event)).await {
            Some(()) => Ok(()),
            None => Err(self.drop_event(kind)),
        }
    }

    /// Non-blocking variant for interrupt context and the event pump itself.
    pub fn post_event_from_isr(&self, kind: EventKind, mac: MacAddress) -> Result<(), ConnectionError> {
        let event = self.event(kind, mac);
        self.queue
            .try_send(event)
            .map_err(|_| self.drop_event(kind))
    }

    #[cfg_attr(not(feature = "defmt"), allow(unused_variables))]
    fn drop_event(&self, kind: EventKind) -> ConnectionError {
        self.dropped.incr();
        #[cfg(feature = "defmt")]
        defmt::warn!("event queue full, dropped {}", kind.name());
        ConnectionError::QueueFull
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_idle(&self) -> bool {
        self.state() == ConnectionState::Idle
    }

    pub fn is_connecting(&self) -> bool {
        self.state() == ConnectionState::Connecting
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Copy of the current peer MAC, zero while IDLE.
    pub fn peer_mac(&self) -> MacAddress {
        self.peer.lock(Cell::get)
    }

    /// Events waiting for the pump.
    pub fn queued_events(&self) -> usize {
        self.queue.len()
    }

    pub fn events_dropped(&self) -> u32 {
        self.dropped.get()
    }

    pub fn transitions(&self) -> u32 {
        self.transitions.get()
    }

    /// Take the oldest queued event. The event pump is the only consumer.
    pub fn try_next_event(&self) -> Option<ConnectionEvent> {
        self.queue.try_receive().ok()
    }

    /// Publish the peer MAC without a state change.
    pub(crate) fn publish_peer(&self, peer: MacAddress) {
        self.peer.lock(|cell| cell.set(peer));
    }

    /// Publish a committed transition.
    pub(crate) fn commit(&self, state: ConnectionState, peer: MacAddress) {
        self.publish_peer(peer);
        self.state.store(state as u8, Ordering::Release);
        self.transitions.incr();
    }
}
