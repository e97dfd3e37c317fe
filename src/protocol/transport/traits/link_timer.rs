//! Asynchronous timer abstraction driving the long-lived loops (event pump,
//! discovery scan) and the inter-fragment spacing.

/// Timer trait abstraction; must remain thread-safe when applicable.
pub trait LinkTimer {
    /// Asynchronously wait for `millis` milliseconds.
    fn delay_ms<'a>(&'a mut self, millis: u32) -> impl core::future::Future<Output = ()> + 'a;
}

/// [`LinkTimer`] backed by the embassy time driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbassyTimer;

impl LinkTimer for EmbassyTimer {
    fn delay_ms<'a>(&'a mut self, millis: u32) -> impl core::future::Future<Output = ()> + 'a {
        embassy_time::Timer::after_millis(millis as u64)
    }
}
