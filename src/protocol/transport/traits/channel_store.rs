//! Persistent storage for the last channel a connection was locked on.

/// Key-value namespace holding the channel record.
pub const CHANNEL_STORE_NAMESPACE: &str = "espnow";
/// Key of the single `u8` channel record.
pub const CHANNEL_STORE_KEY: &str = "channel";

/// Non-volatile store for the locked channel.
///
/// A missing record, or a value outside 1..=13, is treated as "unknown" by the
/// channel manager; neither is an error.
pub trait ChannelStore {
    type Error: core::fmt::Debug;

    /// Read the stored channel, `None` when no record exists.
    fn load_channel(&self) -> Result<Option<u8>, Self::Error>;

    /// Write-through the channel a connection just locked on.
    fn save_channel(&self, channel: u8) -> Result<(), Self::Error>;
}

/// Store for targets without non-volatile memory: nothing is ever remembered.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoChannelStore;

impl ChannelStore for NoChannelStore {
    type Error = core::convert::Infallible;

    fn load_channel(&self) -> Result<Option<u8>, Self::Error> {
        Ok(None)
    }

    fn save_channel(&self, _channel: u8) -> Result<(), Self::Error> {
        Ok(())
    }
}
