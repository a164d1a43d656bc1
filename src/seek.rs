// flac-codec -- A lossless audio codec library in Rust
// Copyright 2024 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! Seeking to an arbitrary sample without a seek table.
//!
//! The search narrows a byte-position interval known to bracket the target
//! sample. The first two probes use a proportional estimate (byte position
//! scales roughly with sample position, for constant-bitrate content); later
//! probes fall back to plain bisection once the proportional estimate has
//! done what it can. Each probe scans forward for a frame sync, reads its
//! header, and uses the header's first sample to narrow the interval or
//! (once the target falls inside the frame) to finish the search.

use std::io;

use crate::bitstream::BitReader;
use crate::callbacks::{AsRead, ReadCallbacks, SeekCallbacks};
use crate::error::{fmt_err, Error, Result};
use crate::frame::{self, Block, BlockTime, FrameHeader};

/// How far a single sync scan is willing to look before giving up. Frames
/// are at most a few hundred KiB even at high bit depth and sample rate;
/// this bound just protects against scanning the entire stream on garbage
/// input.
const MAX_SCAN_BYTES: u64 = 1 << 20;

/// Seeks `input` to the frame containing `target_sample`, decodes it, and
/// returns a block starting exactly at `target_sample`.
///
/// `audio_start` is the byte offset of the first frame (right after the
/// metadata blocks). `total_samples` comes from STREAMINFO, when known.
pub fn seek<S: SeekCallbacks>(
    input: &mut S,
    audio_start: u64,
    stream_bps: u32,
    total_samples: Option<u64>,
    target_sample: u64,
) -> Result<Block> {
    let stream_len = input.len().map_err(Error::Io)?;
    if audio_start >= stream_len {
        return fmt_err("seek error, stream has no audio frames");
    }

    let mut left_pos = audio_start;
    let mut right_pos = stream_len;
    let mut left_sample = 0u64;
    let mut right_sample = total_samples.unwrap_or(u64::MAX >> 1);

    let mut prev_pos: Option<u64> = None;
    let mut iteration = 0u32;

    loop {
        if left_pos >= right_pos {
            return fmt_err("seek error, search interval collapsed");
        }

        let pos = if iteration < 2 && right_sample > left_sample {
            let span = right_pos - left_pos;
            let offset_samples = target_sample.saturating_sub(left_sample);
            left_pos + offset_samples.saturating_mul(span) / (right_sample - left_sample)
        } else {
            left_pos + (right_pos - left_pos) / 2
        };
        let pos = pos.clamp(left_pos, right_pos - 1);

        if prev_pos == Some(pos) {
            return fmt_err("seek error, search position did not converge");
        }
        prev_pos = Some(pos);
        iteration += 1;

        let (frame_pos, header) = match find_and_read_header(input, pos, right_pos) {
            Ok(found) => found,
            Err(_) => {
                // Nothing synced between `pos` and `right_pos`: the target
                // must lie to the left of `pos`.
                right_pos = pos;
                continue;
            }
        };

        let frame_first_sample = first_sample_of(&header);
        let frame_last_sample = frame_first_sample + header.block_size as u64;

        if frame_first_sample <= target_sample && target_sample < frame_last_sample {
            input.seek(frame_pos).map_err(Error::Io)?;
            let mut block = decode_frame_at(input, stream_bps)?;
            let skip = (target_sample - frame_first_sample) as usize;
            for channel in block.channels.iter_mut() {
                channel.drain(0..skip);
            }
            block.first_sample = target_sample;
            return Ok(block);
        }

        if frame_first_sample > target_sample {
            right_pos = frame_pos;
            right_sample = frame_first_sample;
        } else {
            left_pos = frame_pos;
            left_sample = frame_first_sample;
        }
    }
}

fn first_sample_of(header: &FrameHeader) -> u64 {
    match header.block_time {
        BlockTime::FrameNumber(n) => n as u64 * header.block_size as u64,
        BlockTime::SampleNumber(n) => n,
    }
}

fn decode_frame_at<S: SeekCallbacks>(input: &mut S, stream_bps: u32) -> Result<Block> {
    let mut adapter = AsRead(input);
    let mut reader = frame::FrameReader::new(&mut adapter);
    let (block, _header) = reader.read_next(stream_bps)?;
    Ok(block)
}

/// Scans forward from `from` (inclusive) up to `limit` (exclusive) for a
/// frame sync code whose header parses and checksums cleanly, and returns
/// its byte offset together with the parsed header. Leaves `input`
/// positioned right after the header on success.
fn find_and_read_header<S: SeekCallbacks>(
    input: &mut S,
    from: u64,
    limit: u64,
) -> Result<(u64, FrameHeader)> {
    input.seek(from).map_err(Error::Io)?;

    let scan_limit = limit.min(from.saturating_add(MAX_SCAN_BYTES));
    let mut prev: Option<u8> = None;
    let mut offset = from;
    let mut buf = [0u8; 1];

    while offset < scan_limit {
        let n = ReadCallbacks::read(input, &mut buf).map_err(Error::Io)?;
        if n == 0 {
            return fmt_err("seek error, reached end of stream while searching for a frame");
        }
        let byte = buf[0];
        offset += 1;

        if prev == Some(0xff) && (byte & 0xfc) == 0xf8 {
            let candidate = offset - 2;
            let header_result = {
                input.seek(candidate).map_err(Error::Io)?;
                let mut adapter = AsRead(input);
                let mut bit_reader = BitReader::new(&mut adapter);
                frame::read_frame_header(&mut bit_reader)
            };
            match header_result {
                Ok(header) => return Ok((candidate, header)),
                Err(_) => {
                    // False sync: resume scanning right after it.
                    input.seek(offset).map_err(Error::Io)?;
                    prev = Some(byte);
                    continue;
                }
            }
        }
        prev = Some(byte);
    }

    fmt_err("seek error, no frame sync found in range")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subframe;
    use std::io::Cursor;

    fn encode_stream(blocks: &[Vec<Vec<i64>>], bps: u32) -> Vec<u8> {
        let writer = frame::FrameWriter::new(subframe::EncodeParams::default());
        let mut buf = Vec::new();
        for (i, block) in blocks.iter().enumerate() {
            writer.write_frame(&mut buf, i as u32, bps, block).unwrap();
        }
        buf
    }

    fn make_block(seed: i64, block_size: usize) -> Vec<Vec<i64>> {
        let left: Vec<i64> =
            (0..block_size).map(|i| ((seed + i as i64) * 37 % 101) - 50).collect();
        let right: Vec<i64> =
            (0..block_size).map(|i| ((seed + i as i64) * 53 % 97) - 48).collect();
        vec![left, right]
    }

    #[test]
    fn seeks_to_exact_sample_within_a_later_frame() {
        let block_size = 64usize;
        let blocks: Vec<_> = (0..8).map(|i| make_block(i * 13, block_size)).collect();
        let bytes = encode_stream(&blocks, 16);

        let mut cursor = Cursor::new(bytes);
        let target = 5 * block_size as u64 + 10;
        let block = seek(&mut cursor, 0, 16, Some(8 * block_size as u64), target).unwrap();

        assert_eq!(block.first_sample, target);
        let expected = make_block(5 * 13, block_size);
        assert_eq!(block.channels[0][0], expected[0][10]);
        assert_eq!(block.channels[1][0], expected[1][10]);
    }

    #[test]
    fn seeking_past_the_end_of_stream_fails() {
        let block_size = 64usize;
        let blocks: Vec<_> = (0..2).map(|i| make_block(i * 13, block_size)).collect();
        let bytes = encode_stream(&blocks, 16);

        let mut cursor = Cursor::new(bytes);
        let result = seek(&mut cursor, 0, 16, Some(2 * block_size as u64), 10_000);
        assert!(result.is_err());
    }

    #[test]
    fn seeking_to_the_first_sample_lands_in_the_first_frame() {
        let block_size = 64usize;
        let blocks: Vec<_> = (0..4).map(|i| make_block(i * 13, block_size)).collect();
        let bytes = encode_stream(&blocks, 16);

        let mut cursor = Cursor::new(bytes);
        let block = seek(&mut cursor, 0, 16, Some(4 * block_size as u64), 0).unwrap();
        assert_eq!(block.first_sample, 0);
        let expected = make_block(0, block_size);
        assert_eq!(block.channels[0], expected[0]);
    }
}
