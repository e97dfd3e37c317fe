//! Connection state machine: IDLE → CONNECTING → CONNECTED.
//!
//! The state lives in two halves:
//! * [`ConnectionLink`] is shared by every task. It publishes the current state
//!   and peer MAC for lock-free readers and owns the bounded event queue that
//!   producers (discovery, application tasks, the radio callback) post into.
//! * [`ConnectionMachine`] is owned by the event pump, the only agent allowed to
//!   execute transitions. It keeps timers, configuration and observers.
use crate::core::MacAddress;

mod link;
mod machine;

pub use link::ConnectionLink;
pub use machine::{ConnectionMachine, StateObserver};

/// Bound of the connection event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 10;

/// Maximum number of registered state observers.
pub const MAX_OBSERVERS: usize = 8;

//==================================================================================STATE
/// Logical link state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    #[default]
    Idle = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnectionState {
    pub const fn name(self) -> &'static str {
        match self {
            ConnectionState::Idle => "IDLE",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
        }
    }

    /// Inverse of `as u8`; unknown values read as `Idle`.
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Idle,
        }
    }
}

//==================================================================================EVENTS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventKind {
    /// Start looking for a peer.
    ConnectionStart,
    /// A peer answered; carries its MAC.
    PeerFound,
    /// The peer is in the radio peer table; carries its MAC.
    PeerRegistered,
    /// Traffic from the peer (liveness heartbeat).
    DataReceived,
    ConnectionLost,
    ResetConnection,
}

impl EventKind {
    pub const fn name(self) -> &'static str {
        match self {
            EventKind::ConnectionStart => "CONNECTION_START",
            EventKind::PeerFound => "PEER_FOUND",
            EventKind::PeerRegistered => "PEER_REGISTERED",
            EventKind::DataReceived => "DATA_RECEIVED",
            EventKind::ConnectionLost => "CONNECTION_LOST",
            EventKind::ResetConnection => "RESET_CONNECTION",
        }
    }
}

/// One entry of the event queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionEvent {
    pub kind: EventKind,
    /// Peer concerned by the event, [`MacAddress::ZERO`] when not applicable.
    pub peer_mac: MacAddress,
    pub timestamp_ms: u64,
}

/// Record of one committed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    /// Time spent in `from`.
    pub duration_ms: u64,
}

/// Machine options. Both features are off by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionConfig {
    /// Post `ConnectionStart` right after a CONNECTED → IDLE transition.
    pub auto_reconnect: bool,
    /// Maximum time in CONNECTING, 0 disables the check.
    pub connecting_timeout_ms: u32,
}
