//! Minimal abstraction over a connection-less radio with 250-byte frames.
//! Allows the library to plug into various drivers (vendor SDK, simulator…).
use crate::core::MacAddress;

/// Contract the link layer needs from the radio.
///
/// Methods take `&self`: the driver is shared by the channel manager, the send
/// governor and the discovery handlers. Implementations keep whatever
/// interior state they need behind their own synchronisation.
pub trait RadioDriver {
    type Error: core::fmt::Debug;

    /// Queue `frame` for transmission to `mac`. Returns immediately; `Ok`
    /// means "queued", not "delivered".
    fn submit(&self, mac: &MacAddress, frame: &[u8]) -> Result<(), Self::Error>;

    /// Retune the radio to `channel` (1..=13).
    fn set_channel(&self, channel: u8) -> Result<(), Self::Error>;

    /// Channel the radio is currently tuned to.
    fn channel(&self) -> u8;

    /// Register `mac` in the driver's peer table so directed frames reach it.
    fn add_peer(&self, mac: &MacAddress, channel: u8) -> Result<(), Self::Error>;
}
