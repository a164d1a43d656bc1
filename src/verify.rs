// flac-codec -- A lossless audio codec library in Rust
// Copyright 2024 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The encoder's internal verify pass: decode the frame bytes just written
//! and compare against the samples that went in, so a bitstream bug turns
//! into an error at encode time instead of a silently corrupt file.

use crate::error::{fmt_err, Result};
use crate::frame;

/// Decodes freshly encoded frames and checks them against the original
/// samples. Constructed once per stream; fed one frame at a time.
pub struct Verifier {
    bits_per_sample: u32,
}

impl Verifier {
    pub fn new(bits_per_sample: u32) -> Verifier {
        Verifier { bits_per_sample }
    }

    /// Decodes `frame_bytes` and compares the result sample-for-sample
    /// against `original`.
    pub fn check(&mut self, frame_bytes: &[u8], original: &[Vec<i64>]) -> Result<()> {
        let mut cursor = std::io::Cursor::new(frame_bytes);
        let mut reader = frame::FrameReader::new(&mut cursor);
        let (block, _header) = reader.read_next(self.bits_per_sample)?;

        if block.channels.len() != original.len() {
            return fmt_err("verify mismatch, channel count differs from the encoded audio");
        }
        for (decoded, expected) in block.channels.iter().zip(original) {
            if decoded != expected {
                return fmt_err("verify mismatch, decoded audio differs from the encoded audio");
            }
        }
        Ok(())
    }
}
