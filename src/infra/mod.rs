//! Infrastructure shared by the protocol layers: byte-level codecs and
//! wrap-around counters.
pub mod codec;
pub mod sequence;
