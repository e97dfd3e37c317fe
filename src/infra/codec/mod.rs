//! Little-endian byte cursors used by the frame and packet codecs.
pub mod cursor;

pub use cursor::{ByteReader, ByteWriter};
