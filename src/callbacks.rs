// flac-codec -- A lossless audio codec library in Rust
// Copyright 2024 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! Capability traits the stream decoder and encoder drive their callers
//! through, so that the core never names `std::fs` or any other concrete
//! transport and stays a transformational library.
//!
//! Blanket implementations cover `std::io::Read`/`Write`/`Seek`, so most
//! callers just pass a `File` or a `Cursor` and never implement these
//! traits by hand.

use std::io;
use std::ops::ControlFlow;

use crate::error::Error;
use crate::metadata::StreamInfo;

/// Supplies bytes to the decoder.
pub trait ReadCallbacks {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<R: io::Read + ?Sized> ReadCallbacks for R {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(self, buf)
    }
}

/// A [`ReadCallbacks`] that additionally supports seeking, needed for the
/// proportional-search seek algorithm in [`crate::seek`].
pub trait SeekCallbacks: ReadCallbacks {
    fn seek(&mut self, pos: u64) -> io::Result<()>;
    fn tell(&mut self) -> io::Result<u64>;
    fn len(&mut self) -> io::Result<u64>;
}

/// Adapts any [`ReadCallbacks`] implementor to `std::io::Read`, so the
/// bitstream and frame machinery -- which only know about `std::io` --
/// can consume it directly.
pub(crate) struct AsRead<'a, R: ReadCallbacks + ?Sized>(pub &'a mut R);

impl<'a, R: ReadCallbacks + ?Sized> io::Read for AsRead<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        ReadCallbacks::read(self.0, buf)
    }
}

impl<S: io::Read + io::Seek + ?Sized> SeekCallbacks for S {
    fn seek(&mut self, pos: u64) -> io::Result<()> {
        io::Seek::seek(self, io::SeekFrom::Start(pos)).map(|_| ())
    }

    fn tell(&mut self) -> io::Result<u64> {
        io::Seek::stream_position(self)
    }

    fn len(&mut self) -> io::Result<u64> {
        let current = io::Seek::stream_position(self)?;
        let end = io::Seek::seek(self, io::SeekFrom::End(0))?;
        io::Seek::seek(self, io::SeekFrom::Start(current))?;
        Ok(end)
    }
}

/// Receives decoded audio and lifecycle events from the decoder, or raw
/// encoded bytes and lifecycle events from the encoder.
pub trait Sink {
    /// Delivers one decoded block, channels stored one `Vec<i32>` each.
    fn write_samples(&mut self, first_sample: u64, samples: &[Vec<i32>]) -> ControlFlow<()>;

    /// Delivers the stream's STREAMINFO, once known (decoder: after the
    /// header; encoder: at `finish()` on a non-seekable sink).
    fn metadata(&mut self, info: &StreamInfo);

    /// Reports a recoverable or fatal error encountered while decoding.
    fn error(&mut self, err: &Error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn seek_callbacks_blanket_impl_reports_length_and_restores_position() {
        let mut cursor = Cursor::new(vec![0u8; 100]);
        SeekCallbacks::seek(&mut cursor, 10).unwrap();
        let len = SeekCallbacks::len(&mut cursor).unwrap();
        assert_eq!(len, 100);
        assert_eq!(SeekCallbacks::tell(&mut cursor).unwrap(), 10);
    }

    #[test]
    fn read_callbacks_blanket_impl_reads_bytes() {
        let mut cursor = Cursor::new(vec![1u8, 2, 3]);
        let mut buf = [0u8; 2];
        let n = ReadCallbacks::read(&mut cursor, &mut buf).unwrap();
        assert_eq!(n, 2);
        assert_eq!(buf, [1, 2]);
    }
}
