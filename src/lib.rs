//! `espnow-link` library: a peer-to-peer link layer for connection-less radios
//! carrying frames of at most 250 bytes on channels 1..=13, in a `no_std`
//! environment. The crate exposes the infrastructure modules (byte codec,
//! wrapping sequence counters), the transport (frames, fragmented packets,
//! driver traits) and the link machinery (channel ownership, send back-off,
//! connection state machine, routing, discovery).
#![no_std]
//==================================================================================
/// Core data types: MAC addresses, frame buffers, channel bounds.
pub mod core;
/// Domain and low-level errors (channel arbitration, frame and packet codecs,
/// routing, event queue, discovery).
pub mod error;
/// Byte-level codec helpers and wrapping version counters.
pub mod infra;
/// Transport (frames, packets, driver traits) and link protocol.
pub mod protocol;
//==================================================================================
