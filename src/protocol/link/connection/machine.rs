use heapless::Vec;

use super::{
    ConnectionConfig, ConnectionEvent, ConnectionLink, ConnectionState, EventKind, Transition,
    MAX_OBSERVERS,
};
use crate::core::MacAddress;
use crate::error::ConnectionError;
use crate::protocol::link::send_governor::SendGovernor;
use crate::protocol::transport::traits::clock::Clock;

/// Callback run after every committed transition, inside the event pump.
///
/// Observers must not block on the event queue.
pub trait StateObserver {
    fn on_transition(&self, from: ConnectionState, to: ConnectionState);
}

impl<F: Fn(ConnectionState, ConnectionState)> StateObserver for F {
    fn on_transition(&self, from: ConnectionState, to: ConnectionState) {
        self(from, to)
    }
}

/// Pump-owned half of the connection.
pub struct ConnectionMachine<'a, C: Clock> {
    link: &'a ConnectionLink<'a, C>,
    governor: &'a SendGovernor<'a, C>,
    config: ConnectionConfig,
    observers: Vec<&'a dyn StateObserver, MAX_OBSERVERS>,
    state: ConnectionState,
    peer_mac: MacAddress,
    state_enter_ms: u64,
    last_heartbeat_ms: u64,
}

impl<'a, C: Clock> ConnectionMachine<'a, C> {
    /// Start in IDLE at `now_ms`.
    pub fn new(
        link: &'a ConnectionLink<'a, C>,
        governor: &'a SendGovernor<'a, C>,
        config: ConnectionConfig,
        now_ms: u64,
    ) -> Self {
        Self {
            link,
            governor,
            config,
            observers: Vec::new(),
            state: ConnectionState::Idle,
            peer_mac: MacAddress::ZERO,
            state_enter_ms: now_ms,
            last_heartbeat_ms: now_ms,
        }
    }

    pub fn link(&self) -> &'a ConnectionLink<'a, C> {
        self.link
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn peer_mac(&self) -> MacAddress {
        self.peer_mac
    }

    pub fn config(&self) -> ConnectionConfig {
        self.config
    }

    pub fn set_auto_reconnect(&mut self, enabled: bool) {
        self.config.auto_reconnect = enabled;
    }

    pub fn set_connecting_timeout_ms(&mut self, timeout_ms: u32) {
        self.config.connecting_timeout_ms = timeout_ms;
    }

    /// Append an observer; called in registration order.
    pub fn register_observer(&mut self, observer: &'a dyn StateObserver) -> Result<(), ConnectionError> {
        self.observers
            .push(observer)
            .map_err(|_| ConnectionError::ObserverTableFull)
    }

    /// Time spent in the current state.
    pub fn state_time_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.state_enter_ms)
    }

    /// Time since CONNECTED was entered, 0 when not connected.
    pub fn connected_time_ms(&self, now_ms: u64) -> u64 {
        if self.state == ConnectionState::Connected {
            self.state_time_ms(now_ms)
        } else {
            0
        }
    }

    /// Timestamp of the last `DataReceived` (or of entering CONNECTED).
    pub fn last_heartbeat_ms(&self) -> u64 {
        self.last_heartbeat_ms
    }

    fn latch_peer(&mut self, mac: MacAddress) {
        if mac.is_zero() {
            return;
        }
        self.peer_mac = mac;
        if self.state != ConnectionState::Idle {
            self.link.publish_peer(mac);
        }
    }

    /// Apply one event following the transition table.
    pub fn dispatch(&mut self, event: &ConnectionEvent, now_ms: u64) -> Option<Transition> {
        use ConnectionState::*;
        use EventKind::*;

        match (self.state, event.kind) {
            (Idle, ConnectionStart) => self.transition_to(Connecting, now_ms),
            (Idle, PeerFound) => {
                self.latch_peer(event.peer_mac);
                self.transition_to(Connecting, now_ms)
            }
            (Idle, ConnectionLost | ResetConnection) => None,

            (Connecting, PeerFound) => {
                self.latch_peer(event.peer_mac);
                None
            }
            (Connecting, PeerRegistered) => {
                self.latch_peer(event.peer_mac);
                self.transition_to(Connected, now_ms)
            }
            (Connecting, ConnectionLost | ResetConnection) => self.transition_to(Idle, now_ms),

            (Connected, DataReceived) => {
                self.last_heartbeat_ms = now_ms;
                None
            }
            (Connected, ConnectionLost | ResetConnection) => self.transition_to(Idle, now_ms),
            (Connected, ConnectionStart | PeerFound) => {
                #[cfg(feature = "defmt")]
                defmt::debug!("{} ignored while connected", event.kind.name());
                None
            }

            (_state, _kind) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("unexpected {} in {}", _kind.name(), _state.name());
                None
            }
        }
    }

    /// Commit a state change, publish it, then notify observers.
    pub fn transition_to(&mut self, new_state: ConnectionState, now_ms: u64) -> Option<Transition> {
        if new_state == self.state {
            return None;
        }

        let from = self.state;
        let duration_ms = self.state_time_ms(now_ms);
        self.state = new_state;
        self.state_enter_ms = now_ms;

        if new_state == ConnectionState::Idle {
            self.peer_mac = MacAddress::ZERO;
        }
        self.link.commit(new_state, self.peer_mac);

        #[cfg(feature = "defmt")]
        defmt::info!(
            "connection {} -> {} after {} ms",
            from.name(),
            new_state.name(),
            duration_ms
        );

        match new_state {
            ConnectionState::Idle if from == ConnectionState::Connected && self.config.auto_reconnect => {
                // Drop already counted and logged by the link.
                let _ = self
                    .link
                    .post_event_from_isr(EventKind::ConnectionStart, MacAddress::ZERO);
            }
            ConnectionState::Connected => {
                self.governor.reset_failure_counter();
                self.last_heartbeat_ms = now_ms;
            }
            _ => {}
        }

        for observer in self.observers.iter() {
            observer.on_transition(from, new_state);
        }

        Some(Transition {
            from,
            to: new_state,
            duration_ms,
        })
    }

    /// Force IDLE once CONNECTING has lasted `connecting_timeout_ms`.
    pub fn check_connecting_timeout(&mut self, now_ms: u64) -> Option<Transition> {
        let timeout = self.config.connecting_timeout_ms;
        if self.state != ConnectionState::Connecting || timeout == 0 {
            return None;
        }
        if self.state_time_ms(now_ms) < timeout as u64 {
            return None;
        }

        #[cfg(feature = "defmt")]
        defmt::warn!("connecting timed out after {} ms", self.state_time_ms(now_ms));
        self.transition_to(ConnectionState::Idle, now_ms)
    }

    /// CONNECTED with no heartbeat for more than `peer_timeout_ms` (0 disables).
    pub fn liveness_expired(&self, now_ms: u64, peer_timeout_ms: u32) -> bool {
        self.state == ConnectionState::Connected
            && peer_timeout_ms > 0
            && now_ms.saturating_sub(self.last_heartbeat_ms) > peer_timeout_ms as u64
    }
}
