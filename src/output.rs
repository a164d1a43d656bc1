// flac-codec -- A lossless audio codec library in Rust
// Copyright 2024 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! Byte-aligned writing helpers, the dual of `input::ReadBytes`. Used for
//! the stream magic and metadata blocks, which are always byte-aligned.

use std::io;

/// Extends any `io::Write` with big-endian fixed-width integer writes.
pub trait WriteBytes: io::Write {
    /// Writes a single byte.
    fn write_u8(&mut self, value: u8) -> io::Result<()> {
        self.write_all(&[value])
    }

    /// Writes a 16-bit unsigned integer, big-endian.
    fn write_be_u16(&mut self, value: u16) -> io::Result<()> {
        self.write_all(&value.to_be_bytes())
    }

    /// Writes the low 24 bits of `value`, big-endian.
    fn write_be_u24(&mut self, value: u32) -> io::Result<()> {
        let b = value.to_be_bytes();
        self.write_all(&b[1..4])
    }

    /// Writes a 32-bit unsigned integer, big-endian.
    fn write_be_u32(&mut self, value: u32) -> io::Result<()> {
        self.write_all(&value.to_be_bytes())
    }
}

impl<W: io::Write + ?Sized> WriteBytes for W {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_read_bytes() {
        use crate::input::ReadBytes;
        use std::io::Cursor;

        let mut buf = Vec::new();
        buf.write_u8(7).unwrap();
        buf.write_be_u16(0x1234).unwrap();
        buf.write_be_u24(0x00_abcd_ef & 0x00ff_ffff).unwrap();
        buf.write_be_u32(0xdead_beef).unwrap();

        let mut r = Cursor::new(buf);
        assert_eq!(r.read_u8().unwrap(), 7);
        assert_eq!(r.read_be_u16().unwrap(), 0x1234);
        assert_eq!(r.read_be_u24().unwrap(), 0xabcdef & 0x00ff_ffff);
        assert_eq!(r.read_be_u32().unwrap(), 0xdead_beef);
    }
}
