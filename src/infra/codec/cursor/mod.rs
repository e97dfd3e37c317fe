//! Byte-aligned reader/writer over borrowed buffers. All multi-byte fields on
//! the link are little-endian, so the cursors expose only that order.
use crate::error::{ReaderError, WriterError};

/// Sequential reader over a `&[u8]`, without extra allocation or copies.
pub struct ByteReader<'a> {
    buffer: &'a [u8],
    cursor: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader positioned at the start of the provided buffer.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, cursor: 0 }
    }

    /// Number of bytes not consumed yet.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// Current offset from the start of the buffer.
    #[inline]
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Borrow the next `len` bytes and advance past them.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], ReaderError> {
        if len > self.remaining() {
            return Err(ReaderError::OutOfBounds {
                asked: len,
                available: self.remaining(),
            });
        }
        let slice = &self.buffer[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ReaderError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, ReaderError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ReaderError> {
        self.take_array().map(u16::from_le_bytes)
    }

    pub fn read_i16(&mut self) -> Result<i16, ReaderError> {
        self.take_array().map(i16::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, ReaderError> {
        self.take_array().map(u32::from_le_bytes)
    }
}

/// Sequential writer into a `&mut [u8]`.
pub struct ByteWriter<'a> {
    buffer: &'a mut [u8],
    cursor: usize,
}

impl<'a> ByteWriter<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, cursor: 0 }
    }

    /// Bytes written so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Copy `bytes` at the cursor and advance.
    pub fn write_slice(&mut self, bytes: &[u8]) -> Result<(), WriterError> {
        let available = self.buffer.len() - self.cursor;
        if bytes.len() > available {
            return Err(WriterError::OutOfBounds {
                asked: bytes.len(),
                available,
            });
        }
        self.buffer[self.cursor..self.cursor + bytes.len()].copy_from_slice(bytes);
        self.cursor += bytes.len();
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), WriterError> {
        self.write_slice(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), WriterError> {
        self.write_slice(&value.to_le_bytes())
    }

    pub fn write_i16(&mut self, value: i16) -> Result<(), WriterError> {
        self.write_slice(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), WriterError> {
        self.write_slice(&value.to_le_bytes())
    }
}
