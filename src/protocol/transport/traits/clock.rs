//! Monotonic time source shared by the link components.
//!
//! Besides reading the current time, the clock provides the bounded waits used
//! by the channel gate and the event queue, so the whole link can run on a
//! virtual clock in tests.
use core::future::Future;

use futures_util::future::{select, Either};
use futures_util::pin_mut;

/// Monotonic millisecond clock.
pub trait Clock {
    /// Milliseconds since an arbitrary, fixed origin.
    fn now_ms(&self) -> u64;

    /// Future resolving once `millis` milliseconds have elapsed.
    fn sleep_ms(&self, millis: u32) -> impl Future<Output = ()> + '_;
}

/// [`Clock`] backed by the embassy time driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u64 {
        embassy_time::Instant::now().as_millis()
    }

    fn sleep_ms(&self, millis: u32) -> impl Future<Output = ()> + '_ {
        embassy_time::Timer::after_millis(millis as u64)
    }
}

/// Run `fut` with a deadline of `millis`; `None` when the deadline wins.
pub async fn with_deadline<C: Clock, F: Future>(clock: &C, millis: u32, fut: F) -> Option<F::Output> {
    let deadline = clock.sleep_ms(millis);
    pin_mut!(deadline);
    pin_mut!(fut);

    match select(fut, deadline).await {
        Either::Left((output, _)) => Some(output),
        Either::Right(_) => None,
    }
}
