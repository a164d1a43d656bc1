// flac-codec -- A lossless audio codec library in Rust
// Copyright 2024 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The `error` module defines the error and result types used throughout
//! the codec core.

use std::error;
use std::fmt;
use std::io;

/// An error that prevents successful encoding or decoding of a FLAC stream.
#[derive(Debug)]
pub enum Error {
    /// An IO error occurred on the underlying reader, writer, or callback.
    Io(io::Error),

    /// The stream, a metadata block, a frame, or a subframe was malformed.
    ///
    /// The payload is a human-readable description of what was wrong; it is
    /// not meant to be matched on. Use [`Error::is_recoverable`] to decide
    /// whether the condition is one the stream decoder can resynchronize
    /// from.
    FormatError(&'static str),

    /// A configuration or parameter was rejected before any bytes were
    /// produced or consumed.
    Unsupported(&'static str),
}

/// Either `T` on success, or an [`Error`] on failure.
pub type Result<T> = ::std::result::Result<T, Error>;

/// Shorthand for returning a `FormatError` from a function returning `Result<T>`.
pub fn fmt_err<T>(msg: &'static str) -> Result<T> {
    Err(Error::FormatError(msg))
}

/// Shorthand for returning an `Unsupported` error from a function returning `Result<T>`.
pub fn unsupported<T>(msg: &'static str) -> Result<T> {
    Err(Error::Unsupported(msg))
}

impl Error {
    /// Returns whether the stream decoder can resynchronize after this error.
    ///
    /// This corresponds to the `lost_sync`, `bad_header`, and
    /// `frame_crc_mismatch` error kinds: the decoder calls the error
    /// callback and returns to frame-sync search. All other `FormatError`s,
    /// as well as `Io` and `Unsupported`, are fatal: the instance does not
    /// advance further.
    pub fn is_recoverable(&self) -> bool {
        match *self {
            Error::FormatError(msg) => {
                msg.contains("sync")
                    || msg.contains("frame header")
                    || msg == "frame header CRC mismatch"
                    || msg == "frame CRC mismatch"
            }
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref err) => err.fmt(f),
            Error::FormatError(msg) => write!(f, "invalid FLAC stream: {}", msg),
            Error::Unsupported(msg) => write!(f, "unsupported: {}", msg),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            Error::FormatError(_) => None,
            Error::Unsupported(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_errors_are_classified_correctly() {
        assert!(Error::FormatError("frame sync code missing").is_recoverable());
        assert!(Error::FormatError("frame header CRC mismatch").is_recoverable());
        assert!(Error::FormatError("frame CRC mismatch").is_recoverable());
        assert!(!Error::FormatError("invalid subframe header, encountered reserved value")
            .is_recoverable());
        assert!(!Error::Unsupported("too many channels").is_recoverable());
    }
}
