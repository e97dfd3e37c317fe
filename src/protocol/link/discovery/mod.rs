//! Channel convergence between two peers that do not know each other's channel.
//!
//! The initiator sweeps channels 1..=13, broadcasting a PROBE with a fresh
//! random `seq` on each one and listening for an ACK. The responder answers
//! every PROBE with a directed ACK carrying its current channel. When an ACK
//! matches a recent probe, the initiator locks that channel, then reports the
//! peer to the connection state machine and registers it with the radio.
//!
//! Discovery never changes the connection state itself; it only posts events.
use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use embassy_sync::signal::Signal;
use futures_util::future::{select, Either};
use futures_util::pin_mut;
use heapless::HistoryBuffer;
use rand_core::{RngCore, SeedableRng};
use rand_wyrand::WyRand;

use crate::core::{is_valid_channel, MacAddress, MAX_CHANNEL, MIN_CHANNEL};
use crate::error::{DiscoveryError, RouterError};
use crate::protocol::link::channel_manager::ChannelManager;
use crate::protocol::link::connection::{ConnectionLink, EventKind};
use crate::protocol::link::metrics::Counter;
use crate::protocol::link::router::{MessageHandler, Router};
use crate::protocol::link::send_governor::SendGovernor;
use crate::protocol::transport::frame::{ControlFrame, MessageType, RawFrame};
use crate::protocol::transport::traits::channel_store::ChannelStore;
use crate::protocol::transport::traits::clock::Clock;
use crate::protocol::transport::traits::link_timer::LinkTimer;
use crate::protocol::transport::traits::radio_driver::RadioDriver;
use crate::protocol::transport::{ACK_WAIT_TIMEOUT_MS, PROBE_INTERVAL_MS};

/// Probe sequences an ACK may still answer.
pub const RECENT_PROBES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Idle period while connected or locked, and retry delay after a failed step.
    pub probe_interval_ms: u32,
    /// Listening window after each probe.
    pub ack_wait_ms: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: PROBE_INTERVAL_MS,
            ack_wait_ms: ACK_WAIT_TIMEOUT_MS,
        }
    }
}

/// ACK accepted by the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerAck {
    pub mac: MacAddress,
    pub channel: u8,
    pub seq: u32,
}

/// Round-robin successor of `channel` in 1..=13.
#[inline]
pub const fn next_channel(channel: u8) -> u8 {
    if channel >= MAX_CHANNEL || channel < MIN_CHANNEL {
        MIN_CHANNEL
    } else {
        channel + 1
    }
}

pub struct Discovery<'a, R: RadioDriver, S: ChannelStore, C: Clock> {
    radio: &'a R,
    channels: &'a ChannelManager<'a, R, S, C>,
    governor: &'a SendGovernor<'a, C>,
    link: &'a ConnectionLink<'a, C>,
    config: DiscoveryConfig,
    recent: Mutex<CriticalSectionRawMutex, RefCell<HistoryBuffer<u32, RECENT_PROBES>>>,
    ack: Signal<CriticalSectionRawMutex, PeerAck>,
    probes_sent: Counter,
    acks_sent: Counter,
    acks_matched: Counter,
    acks_ignored: Counter,
}

impl<'a, R: RadioDriver, S: ChannelStore, C: Clock> Discovery<'a, R, S, C> {
    pub const fn new(
        radio: &'a R,
        channels: &'a ChannelManager<'a, R, S, C>,
        governor: &'a SendGovernor<'a, C>,
        link: &'a ConnectionLink<'a, C>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            radio,
            channels,
            governor,
            link,
            config,
            recent: Mutex::new(RefCell::new(HistoryBuffer::new())),
            ack: Signal::new(),
            probes_sent: Counter::new(),
            acks_sent: Counter::new(),
            acks_matched: Counter::new(),
            acks_ignored: Counter::new(),
        }
    }

    pub fn config(&self) -> DiscoveryConfig {
        self.config
    }

    /// Register this instance as the PROBE and ACK handler.
    pub fn register_routes<'h, const N: usize>(
        &'h self,
        router: &mut Router<'h, N>,
    ) -> Result<(), RouterError>
    where
        Self: 'h,
    {
        router.register_route(MessageType::Probe, self)?;
        router.register_route(MessageType::Ack, self)
    }

    fn remember_probe(&self, seq: u32) {
        self.recent.lock(|recent| recent.borrow_mut().write(seq));
    }

    fn is_recent_probe(&self, seq: u32) -> bool {
        self.recent
            .lock(|recent| recent.borrow().as_slice().contains(&seq))
    }

    //==================================================================================Initiator
    /// Tune to `channel`, broadcast a PROBE and listen for a matching ACK.
    ///
    /// Returns `Ok(None)` when the listening window closes without one.
    pub async fn scan_channel<T: LinkTimer>(
        &self,
        timer: &mut T,
        channel: u8,
        seq: u32,
    ) -> Result<Option<PeerAck>, DiscoveryError<R::Error>> {
        self.channels
            .set_channel(channel, "discovery")
            .await
            .map_err(DiscoveryError::Channel)?;

        self.ack.reset();
        self.remember_probe(seq);

        let probe = ControlFrame::Probe { seq }.encode();
        self.radio
            .submit(&MacAddress::BROADCAST, probe.as_slice())
            .map_err(|_e| {
                #[cfg(feature = "defmt")]
                defmt::warn!(
                    "probe on channel {} not sent: {}",
                    channel,
                    defmt::Debug2Format(&_e)
                );
                DiscoveryError::ProbeNotSent
            })?;
        self.probes_sent.incr();

        #[cfg(feature = "defmt")]
        defmt::debug!("probe {} sent on channel {}", seq, channel);

        let ack = self.ack.wait();
        let window = timer.delay_ms(self.config.ack_wait_ms);
        pin_mut!(ack);
        pin_mut!(window);

        match select(ack, window).await {
            Either::Left((ack, _)) => Ok(Some(ack)),
            Either::Right(_) => Ok(None),
        }
    }

    /// Lock the acknowledged channel and report the peer.
    ///
    /// The peer is registered with the radio before `PeerRegistered` is
    /// posted. A failed registration or a dropped event releases the lock and
    /// resets the connection.
    pub async fn complete_handshake(&self, ack: PeerAck) -> Result<(), DiscoveryError<R::Error>> {
        self.channels
            .lock_channel(ack.channel, "handshake")
            .await
            .map_err(DiscoveryError::Channel)?;

        if self.link.post_event(EventKind::PeerFound, ack.mac).await.is_err() {
            self.abort_handshake(&ack).await;
            return Err(DiscoveryError::EventDropped);
        }

        if let Err(e) = self.radio.add_peer(&ack.mac, ack.channel) {
            #[cfg(feature = "defmt")]
            defmt::error!(
                "peer {} not registered: {}",
                ack.mac,
                defmt::Debug2Format(&e)
            );
            self.abort_handshake(&ack).await;
            return Err(DiscoveryError::PeerRegistration(e));
        }

        if self
            .link
            .post_event(EventKind::PeerRegistered, ack.mac)
            .await
            .is_err()
        {
            self.abort_handshake(&ack).await;
            return Err(DiscoveryError::EventDropped);
        }

        #[cfg(feature = "defmt")]
        defmt::info!("handshake with {} on channel {}", ack.mac, ack.channel);
        Ok(())
    }

    /// Release the handshake lock and ask the machine to leave CONNECTING.
    ///
    /// The reset is best effort: if it is dropped too, the next handshake
    /// still converges since the lock is free and discovery resumes.
    async fn abort_handshake(&self, ack: &PeerAck) {
        let _ = self.channels.unlock_channel("handshake").await;
        let _ = self
            .link
            .post_event(EventKind::ResetConnection, ack.mac)
            .await;
    }

    /// One probe on `channel`; completes the handshake when acknowledged.
    ///
    /// Returns whether a handshake completed.
    pub async fn scan_step<T: LinkTimer>(
        &self,
        timer: &mut T,
        channel: u8,
        seq: u32,
    ) -> Result<bool, DiscoveryError<R::Error>> {
        match self.scan_channel(timer, channel, seq).await? {
            Some(ack) => {
                self.complete_handshake(ack).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Discovery loop. Scans while the link is neither connected nor locked.
    pub async fn run<T: LinkTimer>(&self, timer: &mut T, rng_seed: u64) -> ! {
        let mut rng = WyRand::seed_from_u64(rng_seed);
        let mut channel = self.channels.get_channel();

        loop {
            if self.link.is_connected() || self.channels.is_locked() {
                timer.delay_ms(self.config.probe_interval_ms).await;
                continue;
            }

            match self.scan_step(timer, channel, rng.next_u32()).await {
                Ok(true) => {}
                Ok(false) => channel = next_channel(channel),
                Err(_e) => {
                    #[cfg(feature = "defmt")]
                    defmt::debug!(
                        "scan step on channel {} failed: {}",
                        channel,
                        defmt::Debug2Format(&_e)
                    );
                    channel = next_channel(channel);
                    timer.delay_ms(self.config.probe_interval_ms).await;
                }
            }
        }
    }

    //==================================================================================Handlers
    /// Answer a PROBE with a directed ACK on the current channel.
    ///
    /// A responder that is not connected reports the prober as found and
    /// registered.
    pub fn handle_probe(&self, frame: &RawFrame) {
        let Ok(ControlFrame::Probe { seq }) = ControlFrame::decode(frame.as_slice()) else {
            return;
        };
        let channel = self.channels.get_channel();

        if let Err(_e) = self.radio.add_peer(&frame.mac, channel) {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "probe from {}: peer not registered: {}",
                frame.mac,
                defmt::Debug2Format(&_e)
            );
            return;
        }

        let ack = ControlFrame::Ack { seq, channel }.encode();
        if self
            .governor
            .send_with_retry(self.radio, &frame.mac, ack.as_slice(), "ack")
        {
            self.acks_sent.incr();
        }

        if !self.link.is_connected() {
            #[cfg(feature = "defmt")]
            defmt::info!("probe {} from {} on channel {}", seq, frame.mac, channel);
            let _ = self
                .link
                .post_event_from_isr(EventKind::PeerFound, frame.mac);
            let _ = self
                .link
                .post_event_from_isr(EventKind::PeerRegistered, frame.mac);
        }
    }

    /// Wake the scan when an ACK answers one of the recent probes.
    pub fn handle_ack(&self, frame: &RawFrame) {
        let Ok(ControlFrame::Ack { seq, channel }) = ControlFrame::decode(frame.as_slice()) else {
            return;
        };

        if self.link.is_connected() {
            self.acks_ignored.incr();
            #[cfg(feature = "defmt")]
            defmt::debug!("stale ack {} from {} ignored", seq, frame.mac);
            return;
        }

        if !self.is_recent_probe(seq) || !is_valid_channel(channel) {
            self.acks_ignored.incr();
            #[cfg(feature = "defmt")]
            defmt::warn!("ack {} (channel {}) matches no probe", seq, channel);
            return;
        }

        self.acks_matched.incr();
        self.ack.signal(PeerAck {
            mac: frame.mac,
            channel,
            seq,
        });
    }

    pub fn probes_sent(&self) -> u32 {
        self.probes_sent.get()
    }

    pub fn acks_sent(&self) -> u32 {
        self.acks_sent.get()
    }

    pub fn acks_matched(&self) -> u32 {
        self.acks_matched.get()
    }

    pub fn acks_ignored(&self) -> u32 {
        self.acks_ignored.get()
    }
}

impl<'a, R: RadioDriver, S: ChannelStore, C: Clock> MessageHandler for Discovery<'a, R, S, C> {
    fn handle(&self, frame: &RawFrame) {
        match frame.message_type() {
            Some(MessageType::Probe) => self.handle_probe(frame),
            Some(MessageType::Ack) => self.handle_ack(frame),
            _ => {}
        }
    }
}
