//! The event pump: the single loop that executes connection transitions.
//!
//! Every iteration it routes the frames queued by the radio receive callback,
//! drains the connection event queue into the state machine, enforces the
//! CONNECTING timeout and the optional liveness watchdog, then services the
//! send governor's resume deadline. Channel locking follows the connection:
//! entering CONNECTED locks the current channel, returning to IDLE releases it.
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::core::MacAddress;
use crate::protocol::link::channel_manager::ChannelManager;
use crate::protocol::link::connection::{
    ConnectionMachine, ConnectionState, EventKind, Transition, EVENT_QUEUE_CAPACITY,
};
use crate::protocol::link::metrics::{Counter, LinkMetrics};
use crate::protocol::link::router::Router;
use crate::protocol::link::send_governor::SendGovernor;
use crate::protocol::transport::frame::RawFrame;
use crate::protocol::transport::traits::channel_store::ChannelStore;
use crate::protocol::transport::traits::clock::Clock;
use crate::protocol::transport::traits::link_timer::LinkTimer;
use crate::protocol::transport::traits::radio_driver::RadioDriver;
use crate::protocol::transport::PUMP_INTERVAL_MS;

/// Capacity of the inbound frame lane.
pub const RX_QUEUE_CAPACITY: usize = 16;

//==================================================================================RX_LANE
/// Frames handed over by the radio receive callback, drained by the pump.
pub struct RxLane<const N: usize = RX_QUEUE_CAPACITY> {
    queue: Channel<CriticalSectionRawMutex, RawFrame, N>,
    received: Counter,
    dropped: Counter,
}

impl<const N: usize> Default for RxLane<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RxLane<N> {
    pub const fn new() -> Self {
        Self {
            queue: Channel::new(),
            received: Counter::new(),
            dropped: Counter::new(),
        }
    }

    /// Queue a received frame without blocking. Returns `false` when the frame
    /// was dropped (lane full or longer than the radio MTU).
    pub fn push_from_isr(&self, mac: MacAddress, data: &[u8], timestamp_ms: u64) -> bool {
        let queued = RawFrame::new(mac, data, timestamp_ms)
            .is_some_and(|frame| self.queue.try_send(frame).is_ok());
        if queued {
            self.received.incr();
        } else {
            self.dropped.incr();
        }
        queued
    }

    pub fn try_next(&self) -> Option<RawFrame> {
        self.queue.try_receive().ok()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn frames_received(&self) -> u32 {
        self.received.get()
    }

    pub fn frames_dropped(&self) -> u32 {
        self.dropped.get()
    }
}

//==================================================================================PUMP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpConfig {
    /// Pause between two iterations.
    pub interval_ms: u32,
    /// Liveness deadline while CONNECTED, 0 disables the watchdog.
    pub peer_timeout_ms: u32,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            interval_ms: PUMP_INTERVAL_MS,
            peer_timeout_ms: 0,
        }
    }
}

/// What one iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PumpReport {
    pub frames: usize,
    pub events: usize,
    pub transitions: usize,
}

pub struct EventPump<'a, R: RadioDriver, S: ChannelStore, C: Clock> {
    clock: &'a C,
    channels: &'a ChannelManager<'a, R, S, C>,
    governor: &'a SendGovernor<'a, C>,
    machine: ConnectionMachine<'a, C>,
    router: &'a Router<'a>,
    rx: &'a RxLane,
    config: PumpConfig,
}

impl<'a, R: RadioDriver, S: ChannelStore, C: Clock> EventPump<'a, R, S, C> {
    pub fn new(
        clock: &'a C,
        channels: &'a ChannelManager<'a, R, S, C>,
        governor: &'a SendGovernor<'a, C>,
        machine: ConnectionMachine<'a, C>,
        router: &'a Router<'a>,
        rx: &'a RxLane,
        config: PumpConfig,
    ) -> Self {
        Self {
            clock,
            channels,
            governor,
            machine,
            router,
            rx,
            config,
        }
    }

    pub fn machine(&self) -> &ConnectionMachine<'a, C> {
        &self.machine
    }

    /// Observers and timeouts are configured through the machine.
    pub fn machine_mut(&mut self) -> &mut ConnectionMachine<'a, C> {
        &mut self.machine
    }

    pub fn config(&self) -> PumpConfig {
        self.config
    }

    /// One pump iteration.
    pub async fn pump_once(&mut self) -> PumpReport {
        let now = self.clock.now_ms();
        let mut report = PumpReport::default();

        // Bounded so a flooding sender cannot starve the state machine.
        while report.frames < RX_QUEUE_CAPACITY {
            let Some(frame) = self.rx.try_next() else {
                break;
            };
            self.router.route_message(&frame);
            report.frames += 1;
        }

        let link = self.machine.link();
        while report.events < EVENT_QUEUE_CAPACITY {
            let Some(event) = link.try_next_event() else {
                break;
            };
            report.events += 1;
            if let Some(transition) = self.machine.dispatch(&event, now) {
                report.transitions += 1;
                self.coordinate_channel(transition).await;
            }
        }

        if let Some(transition) = self.machine.check_connecting_timeout(now) {
            report.transitions += 1;
            self.coordinate_channel(transition).await;
        }

        if self.machine.liveness_expired(now, self.config.peer_timeout_ms) {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "no traffic from {} for {} ms",
                self.machine.peer_mac(),
                now.saturating_sub(self.machine.last_heartbeat_ms())
            );
            let _ = link.post_event_from_isr(EventKind::ConnectionLost, self.machine.peer_mac());
        }

        self.governor.poll_resume(now);
        self.governor.handle_deferred_logging();

        report
    }

    /// Keep the channel lock in step with the connection.
    async fn coordinate_channel(&self, transition: Transition) {
        match transition.to {
            ConnectionState::Connected => {
                let channel = self.channels.get_channel();
                // The handshake may already hold (and have persisted) this channel.
                if self.channels.is_locked() && self.channels.saved_channel() == channel {
                    return;
                }
                if let Err(_e) = self.channels.lock_channel(channel, "connected").await {
                    #[cfg(feature = "defmt")]
                    defmt::warn!(
                        "channel {} not locked on connect: {}",
                        channel,
                        defmt::Debug2Format(&_e)
                    );
                }
            }
            ConnectionState::Idle if self.channels.is_locked() => {
                if let Err(_e) = self.channels.unlock_channel("disconnected").await {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("channel not unlocked: {}", defmt::Debug2Format(&_e));
                }
            }
            _ => {}
        }
    }

    /// Run forever at the configured cadence.
    pub async fn run<T: LinkTimer>(&mut self, timer: &mut T) -> ! {
        #[cfg(feature = "defmt")]
        defmt::info!("event pump started, interval {} ms", self.config.interval_ms);

        loop {
            self.pump_once().await;
            timer.delay_ms(self.config.interval_ms).await;
        }
    }

    /// Snapshot of every link counter.
    pub fn metrics(&self) -> LinkMetrics {
        let link = self.machine.link();
        let channel = self.channels.snapshot();
        LinkMetrics {
            send_submissions: self.governor.submissions(),
            submit_failures: self.governor.submit_failures(),
            sends_skipped: self.governor.sends_skipped(),
            pauses: self.governor.pauses(),
            events_dropped: link.events_dropped(),
            transitions: link.transitions(),
            frames_received: self.rx.frames_received(),
            frames_dropped: self.rx.frames_dropped(),
            frames_routed: self.router.frames_routed(),
            frames_unrouted: self.router.frames_unrouted(),
            current_channel: channel.current,
            channel_locked: channel.locked,
            state: link.state(),
        }
    }
}
