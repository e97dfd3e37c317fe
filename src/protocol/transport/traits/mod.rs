//! Abstraction traits used by the link layer (radio driver, channel store,
//! clock and timer). Firmware implements them on top of its HAL; tests
//! implement them in memory.
pub mod channel_store;
pub mod clock;
pub mod link_timer;
pub mod radio_driver;
