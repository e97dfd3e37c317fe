//! Owner of the radio channel.
//!
//! Every mutation goes through one gate (an async mutex acquired with a
//! 100 ms deadline). While a connection holds the channel `locked`, plain
//! `set_channel` requests are rejected without touching the radio, so
//! discovery can never retune a connected link. Readers use lock-free
//! snapshots that may be slightly stale.
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};

use crate::core::{is_valid_channel, MIN_CHANNEL};
use crate::error::ChannelError;
use crate::protocol::transport::traits::channel_store::ChannelStore;
use crate::protocol::transport::traits::clock::{with_deadline, Clock};
use crate::protocol::transport::traits::radio_driver::RadioDriver;
use crate::protocol::transport::CHANNEL_LOCK_TIMEOUT_MS;

/// Channel state as seen at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelSnapshot {
    pub current: u8,
    pub locked: bool,
    /// Last channel persisted by a lock, 0 when unknown.
    pub saved: u8,
}

pub struct ChannelManager<'a, R: RadioDriver, S: ChannelStore, C: Clock> {
    radio: &'a R,
    store: &'a S,
    clock: &'a C,
    gate: Mutex<CriticalSectionRawMutex, ()>,
    current: AtomicU8,
    locked: AtomicBool,
    saved: AtomicU8,
}

impl<'a, R: RadioDriver, S: ChannelStore, C: Clock> ChannelManager<'a, R, S, C> {
    pub const fn new(radio: &'a R, store: &'a S, clock: &'a C) -> Self {
        Self {
            radio,
            store,
            clock,
            gate: Mutex::new(()),
            current: AtomicU8::new(MIN_CHANNEL),
            locked: AtomicBool::new(false),
            saved: AtomicU8::new(0),
        }
    }

    async fn acquire(
        &self,
    ) -> Result<MutexGuard<'_, CriticalSectionRawMutex, ()>, ChannelError<R::Error>> {
        with_deadline(self.clock, CHANNEL_LOCK_TIMEOUT_MS, self.gate.lock())
            .await
            .ok_or(ChannelError::Busy)
    }

    /// Restore the persisted channel and align the radio on it.
    ///
    /// A missing or out-of-range record is "unknown": the radio keeps its
    /// channel. A failing store is logged and treated the same way.
    pub async fn init(&self) -> Result<ChannelSnapshot, ChannelError<R::Error>> {
        let _gate = self.acquire().await?;

        let saved = match self.store.load_channel() {
            Ok(Some(channel)) if is_valid_channel(channel) => channel,
            Ok(_) => 0,
            Err(_e) => {
                #[cfg(feature = "defmt")]
                defmt::warn!(
                    "channel store unavailable: {}",
                    defmt::Debug2Format(&_e)
                );
                0
            }
        };
        self.saved.store(saved, Ordering::Release);

        let reported = self.radio.channel();
        let mut current = if is_valid_channel(reported) {
            reported
        } else {
            MIN_CHANNEL
        };

        if saved != 0 && saved != current {
            self.radio.set_channel(saved).map_err(ChannelError::Radio)?;
            current = saved;
        }
        self.current.store(current, Ordering::Release);

        #[cfg(feature = "defmt")]
        defmt::info!("channel manager ready: channel {}, saved {}", current, saved);

        Ok(self.snapshot())
    }

    /// Switch the radio to `channel` unless a connection holds it.
    ///
    /// Same-channel requests succeed without touching the radio.
    #[cfg_attr(not(feature = "defmt"), allow(unused_variables))]
    pub async fn set_channel(&self, channel: u8, source: &str) -> Result<(), ChannelError<R::Error>> {
        if !is_valid_channel(channel) {
            #[cfg(feature = "defmt")]
            defmt::warn!("[{}] invalid channel {}", source, channel);
            return Err(ChannelError::Invalid { channel });
        }

        let _gate = self.acquire().await?;

        if self.locked.load(Ordering::Acquire) {
            #[cfg(feature = "defmt")]
            defmt::debug!("[{}] channel {} rejected: locked", source, channel);
            return Err(ChannelError::Rejected);
        }

        if self.current.load(Ordering::Acquire) == channel {
            return Ok(());
        }

        self.radio.set_channel(channel).map_err(ChannelError::Radio)?;
        self.current.store(channel, Ordering::Release);

        #[cfg(feature = "defmt")]
        defmt::debug!("[{}] channel -> {}", source, channel);
        Ok(())
    }

    /// Switch to `channel`, lock it, and persist it as the saved channel.
    ///
    /// Persistence failures are logged; the lock still holds in RAM.
    #[cfg_attr(not(feature = "defmt"), allow(unused_variables))]
    pub async fn lock_channel(&self, channel: u8, source: &str) -> Result<(), ChannelError<R::Error>> {
        if !is_valid_channel(channel) {
            #[cfg(feature = "defmt")]
            defmt::warn!("[{}] cannot lock invalid channel {}", source, channel);
            return Err(ChannelError::Invalid { channel });
        }

        let _gate = self.acquire().await?;

        if self.current.load(Ordering::Acquire) != channel {
            self.radio.set_channel(channel).map_err(ChannelError::Radio)?;
            self.current.store(channel, Ordering::Release);
        }
        self.locked.store(true, Ordering::Release);
        self.saved.store(channel, Ordering::Release);

        if let Err(_e) = self.store.save_channel(channel) {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "[{}] channel {} locked but not persisted: {}",
                source,
                channel,
                defmt::Debug2Format(&_e)
            );
        }

        #[cfg(feature = "defmt")]
        defmt::info!("[{}] channel {} locked", source, channel);
        Ok(())
    }

    /// Release the lock taken by [`lock_channel`](Self::lock_channel).
    #[cfg_attr(not(feature = "defmt"), allow(unused_variables))]
    pub async fn unlock_channel(&self, source: &str) -> Result<(), ChannelError<R::Error>> {
        let _gate = self.acquire().await?;
        self.locked.store(false, Ordering::Release);

        #[cfg(feature = "defmt")]
        defmt::info!("[{}] channel unlocked", source);
        Ok(())
    }

    #[inline]
    pub fn get_channel(&self) -> u8 {
        self.current.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    #[inline]
    pub fn saved_channel(&self) -> u8 {
        self.saved.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            current: self.get_channel(),
            locked: self.is_locked(),
            saved: self.saved_channel(),
        }
    }
}
