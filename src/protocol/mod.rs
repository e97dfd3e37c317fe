//! Link-layer protocol: the radio transport (frames, fragmented packets,
//! driver traits) and the connection machinery built on top of it.
pub mod link;
pub mod transport;
