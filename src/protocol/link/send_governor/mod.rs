//! Send governor: wraps every directed send and backs off under repeated
//! submit failures.
//!
//! The radio submit queue fails noisily once the peer disappears. After
//! `max_failures` consecutive refusals the governor pauses all sends for
//! `min(30 s, base * 2^(failures / max - 1))`; while paused, sends return
//! `false` without touching the radio. A successful submit does not clear the
//! counter: only [`SendGovernor::reset_failure_counter`] (called when the
//! link enters CONNECTED) or the end of a pause does.
//!
//! The one-shot resume timer is a deadline serviced lazily: by every send, every
//! pause-state read and the event pump on each iteration. Its expiry only raises a flag; the
//! pump emits the corresponding log line.
use core::cell::Cell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};

use crate::core::MacAddress;
use crate::error::SendPacketError;
use crate::protocol::link::metrics::Counter;
use crate::protocol::transport::frame::Subtype;
use crate::protocol::transport::packet::builder::PacketBuilder;
use crate::protocol::transport::traits::clock::Clock;
use crate::protocol::transport::traits::link_timer::LinkTimer;
use crate::protocol::transport::traits::radio_driver::RadioDriver;
use crate::protocol::transport::PACKET_INTER_FRAGMENT_DELAY_MS;

/// Upper bound of a back-off pause (ms).
pub const MAX_BACKOFF_MS: u32 = 30_000;

/// Failures are logged on the first one and then every `FAILURE_LOG_EVERY`.
const FAILURE_LOG_EVERY: u8 = 5;

/// Back-off parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernorConfig {
    /// Consecutive failures that trigger a pause.
    pub max_failures: u8,
    /// First pause length (ms); doubles on each further multiple of `max_failures`.
    pub base_backoff_ms: u32,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_failures: 10,
            base_backoff_ms: 10_000,
        }
    }
}

/// Pause length after `failures` consecutive failures:
/// `min(30_000, base * 2^(failures / max - 1))`.
///
/// Only meaningful once `failures >= max_failures`; below that the exponent
/// saturates at zero and the base is returned.
pub fn backoff_pause_ms(failures: u8, max_failures: u8, base_backoff_ms: u32) -> u32 {
    let max = max_failures.max(1);
    let exponent = (failures / max).saturating_sub(1) as u32;
    let pause = (base_backoff_ms as u64) << exponent.min(32);
    pause.min(MAX_BACKOFF_MS as u64) as u32
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct GovernorState {
    consecutive_failures: u8,
    paused: bool,
    resume_at_ms: u64,
    deferred_log_pending: bool,
}

pub struct SendGovernor<'a, C: Clock> {
    clock: &'a C,
    config: GovernorConfig,
    state: Mutex<CriticalSectionRawMutex, Cell<GovernorState>>,
    submissions: Counter,
    failures: Counter,
    skipped: Counter,
    pauses: Counter,
}

impl<'a, C: Clock> SendGovernor<'a, C> {
    pub const fn new(clock: &'a C, config: GovernorConfig) -> Self {
        Self {
            clock,
            config,
            state: Mutex::new(Cell::new(GovernorState {
                consecutive_failures: 0,
                paused: false,
                resume_at_ms: 0,
                deferred_log_pending: false,
            })),
            submissions: Counter::new(),
            failures: Counter::new(),
            skipped: Counter::new(),
            pauses: Counter::new(),
        }
    }

    pub fn config(&self) -> GovernorConfig {
        self.config
    }

    fn update<T>(&self, f: impl FnOnce(&mut GovernorState) -> T) -> T {
        self.state.lock(|cell| {
            let mut state = cell.get();
            let out = f(&mut state);
            cell.set(state);
            out
        })
    }

    /// Send with the configured back-off parameters.
    pub fn send_with_retry<R: RadioDriver>(
        &self,
        radio: &R,
        mac: &MacAddress,
        bytes: &[u8],
        name: &str,
    ) -> bool {
        self.send_with_retry_using(
            radio,
            mac,
            bytes,
            name,
            self.config.max_failures,
            self.config.base_backoff_ms,
        )
    }

    /// Submit `bytes` to `mac` unless paused. `true` means "queued by the radio".
    #[cfg_attr(not(feature = "defmt"), allow(unused_variables))]
    pub fn send_with_retry_using<R: RadioDriver>(
        &self,
        radio: &R,
        mac: &MacAddress,
        bytes: &[u8],
        name: &str,
        max_failures: u8,
        base_backoff_ms: u32,
    ) -> bool {
        let now = self.clock.now_ms();
        if self.is_paused() {
            self.skipped.incr();
            return false;
        }

        self.submissions.incr();
        let _error = match radio.submit(mac, bytes) {
            Ok(()) => return true,
            Err(e) => e,
        };
        self.failures.incr();

        let max = max_failures.max(1);
        let (failures, pause) = self.update(|state| {
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            let failures = state.consecutive_failures;
            if failures < max {
                return (failures, None);
            }
            let pause = backoff_pause_ms(failures, max, base_backoff_ms);
            state.paused = true;
            state.resume_at_ms = now + pause as u64;
            (failures, Some(pause))
        });

        if failures == 1 || failures % FAILURE_LOG_EVERY == 0 {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "{} send to {} failed ({} consecutive): {}",
                name,
                mac,
                failures,
                defmt::Debug2Format(&_error)
            );
        }

        if let Some(_pause) = pause {
            self.pauses.incr();
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "{} consecutive send failures, pausing sends for {} ms",
                failures,
                _pause
            );
        }
        false
    }

    /// Service the resume deadline. Returns `true` when a pause just ended.
    pub fn poll_resume(&self, now_ms: u64) -> bool {
        self.update(|state| {
            if state.paused && now_ms >= state.resume_at_ms {
                state.paused = false;
                state.consecutive_failures = 0;
                state.deferred_log_pending = true;
                true
            } else {
                false
            }
        })
    }

    /// Zero the failure counter and cancel any pause.
    pub fn reset_failure_counter(&self) {
        self.update(|state| {
            state.consecutive_failures = 0;
            state.paused = false;
            state.resume_at_ms = 0;
        });
    }

    /// Clear and return the "pause ended" flag.
    pub fn take_deferred_log(&self) -> bool {
        self.update(|state| core::mem::take(&mut state.deferred_log_pending))
    }

    /// Emit the log line owed by an ended pause. Returns whether one was owed.
    pub fn handle_deferred_logging(&self) -> bool {
        let pending = self.take_deferred_log();
        if pending {
            #[cfg(feature = "defmt")]
            defmt::info!("send back-off ended, sends resumed");
        }
        pending
    }

    pub fn consecutive_failures(&self) -> u8 {
        self.state.lock(|cell| cell.get().consecutive_failures)
    }

    /// Whether sends are held back. An expired pause ends here.
    pub fn is_paused(&self) -> bool {
        self.poll_resume(self.clock.now_ms());
        self.state.lock(|cell| cell.get().paused)
    }

    pub fn is_deferred_log_pending(&self) -> bool {
        self.state.lock(|cell| cell.get().deferred_log_pending)
    }

    /// Time at which the current pause ends, if paused.
    pub fn resume_deadline_ms(&self) -> Option<u64> {
        self.poll_resume(self.clock.now_ms());
        let state = self.state.lock(Cell::get);
        state.paused.then_some(state.resume_at_ms)
    }

    pub fn submissions(&self) -> u32 {
        self.submissions.get()
    }

    pub fn submit_failures(&self) -> u32 {
        self.failures.get()
    }

    pub fn sends_skipped(&self) -> u32 {
        self.skipped.get()
    }

    pub fn pauses(&self) -> u32 {
        self.pauses.get()
    }

    /// Fragment `payload` and submit every fragment to `mac`, spacing them by
    /// the inter-fragment delay. Stops at the first fragment not submitted.
    ///
    /// Returns the number of fragments sent.
    pub async fn send_packet<R: RadioDriver, T: LinkTimer>(
        &self,
        radio: &R,
        timer: &mut T,
        mac: &MacAddress,
        subtype: Subtype,
        payload: &[u8],
    ) -> Result<u16, SendPacketError> {
        let mut sent: u16 = 0;

        for fragment in PacketBuilder::new(subtype, payload).build() {
            let fragment = fragment?;

            // No delay before the first fragment.
            if sent > 0 {
                timer.delay_ms(PACKET_INTER_FRAGMENT_DELAY_MS).await;
            }

            if !self.send_with_retry(radio, mac, fragment.as_slice(), "packet") {
                return Err(SendPacketError::Refused { index: sent });
            }
            sent = sent.wrapping_add(1);
        }

        Ok(sent)
    }
}
