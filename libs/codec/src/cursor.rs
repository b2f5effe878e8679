//! Bounds-checked wire reader with switchable byte order
//!
//! Header fields before the flags word are always big-endian; once the
//! little-endian flag has been read, everything after it follows the
//! sender's declared order. The cursor starts big-endian and is flipped
//! exactly once, by the header parser.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{DecodeResult, DecodingError};

pub(crate) struct WireCursor<'a> {
    buf: &'a [u8],
    at: usize,
    little_endian: bool,
}

impl<'a> WireCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            at: 0,
            little_endian: false,
        }
    }

    pub fn set_little_endian(&mut self, little: bool) {
        self.little_endian = little;
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.at
    }

    /// Consumes exactly `n` bytes or reports how many were available.
    pub fn take(&mut self, n: usize, context: &'static str) -> DecodeResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(DecodingError::insufficient(context, n, self.remaining()));
        }
        let slice = &self.buf[self.at..self.at + n];
        self.at += n;
        Ok(slice)
    }

    pub fn read_u16(&mut self, context: &'static str) -> DecodeResult<u16> {
        let b = self.take(2, context)?;
        Ok(if self.little_endian {
            LittleEndian::read_u16(b)
        } else {
            BigEndian::read_u16(b)
        })
    }

    pub fn read_i32(&mut self, context: &'static str) -> DecodeResult<i32> {
        let b = self.take(4, context)?;
        Ok(if self.little_endian {
            LittleEndian::read_i32(b)
        } else {
            BigEndian::read_i32(b)
        })
    }

    pub fn read_u32(&mut self, context: &'static str) -> DecodeResult<u32> {
        let b = self.take(4, context)?;
        Ok(if self.little_endian {
            LittleEndian::read_u32(b)
        } else {
            BigEndian::read_u32(b)
        })
    }

    pub fn read_i64(&mut self, context: &'static str) -> DecodeResult<i64> {
        let b = self.take(8, context)?;
        Ok(if self.little_endian {
            LittleEndian::read_i64(b)
        } else {
            BigEndian::read_i64(b)
        })
    }
}
