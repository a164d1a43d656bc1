// flac-codec -- A lossless audio codec library in Rust
// Copyright 2024 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The `frame` module deals with the frames that make up a FLAC stream: a
//! frame header, one subframe per (possibly decorrelated) channel, and a
//! CRC-16 footer.
//!
//! Frame headers are always byte-aligned, and `BitReader`/`BitWriter` already
//! maintain a running CRC-8/CRC-16 tap over every byte consumed or emitted,
//! so the header and footer checksums fall out of the bitstream machinery
//! directly, with no separate CRC-computing reader wrapper needed.

use std::io;

use crate::bitstream::{BitReader, BitWriter};
use crate::error::{fmt_err, Error, Result};
use crate::subframe;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BlockingStrategy {
    Fixed,
    Variable,
}

/// Where a frame sits in the stream: either its frame number (fixed-size
/// blocking) or the sample number of its first sample (variable-size
/// blocking).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockTime {
    FrameNumber(u32),
    SampleNumber(u64),
}

/// How the channels in a frame relate to left/right audio.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelAssignment {
    /// The `n` channels are coded independently, with no decorrelation.
    Independent(u32),
    /// Channel 0 is left, channel 1 is the side channel (left - right).
    LeftSide,
    /// Channel 0 is the side channel (left - right), channel 1 is right.
    RightSide,
    /// Channel 0 is mid ((left + right) >> 1), channel 1 is side.
    MidSide,
}

impl ChannelAssignment {
    pub fn channels(self) -> u32 {
        match self {
            ChannelAssignment::Independent(n) => n,
            ChannelAssignment::LeftSide | ChannelAssignment::RightSide | ChannelAssignment::MidSide => 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub block_time: BlockTime,
    pub block_size: u32,
    /// `None` means the sample rate must be taken from STREAMINFO.
    pub sample_rate: Option<u32>,
    pub channel_assignment: ChannelAssignment,
    /// `None` means the bit depth must be taken from STREAMINFO.
    pub bits_per_sample: Option<u32>,
}

fn block_size_code(block_size: u32) -> Result<(u32, Option<(u32, u32)>)> {
    // Returns the 4-bit code, and if the size must be stored explicitly at
    // the end of the header, its (bit width, value - 1).
    Ok(match block_size {
        192 => (0b0001, None),
        576 | 1152 | 2304 | 4608 => {
            let n = (block_size / 576).trailing_zeros();
            (0b0010 + n, None)
        }
        256 | 512 | 1024 | 2048 | 4096 | 8192 | 16384 | 32768 => {
            let n = (block_size / 256).trailing_zeros();
            (0b1000 + n, None)
        }
        n if n >= 1 && n <= 256 => (0b0110, Some((8, n - 1))),
        n if n >= 1 && n <= 65536 => (0b0111, Some((16, n - 1))),
        _ => return fmt_err("block size out of representable range"),
    })
}

pub(crate) fn read_frame_header(reader: &mut BitReader) -> Result<FrameHeader> {
    reader.reset_crc8();

    let sync_res_block = reader.read_uint(16)?;
    let sync_code = sync_res_block & 0b1111_1111_1111_1100;
    if sync_code != 0b1111_1111_1111_1000 {
        return fmt_err("frame sync code missing");
    }
    if sync_res_block & 0b10 != 0 {
        return fmt_err("invalid frame header, encountered reserved value");
    }
    let blocking_strategy =
        if sync_res_block & 1 == 0 { BlockingStrategy::Fixed } else { BlockingStrategy::Variable };

    let bs_sr = reader.read_uint(8)?;
    let mut block_size = 0u32;
    let mut read_8bit_bs = false;
    let mut read_16bit_bs = false;
    match bs_sr >> 4 {
        0b0000 => return fmt_err("invalid frame header, encountered reserved value"),
        0b0001 => block_size = 192,
        n if (0b0010..=0b0101).contains(&n) => block_size = 576 * (1 << (n - 2)),
        0b0110 => read_8bit_bs = true,
        0b0111 => read_16bit_bs = true,
        n => block_size = 256 * (1 << (n - 8)),
    }

    let mut sample_rate = None;
    let mut read_8bit_sr = false;
    let mut read_16bit_sr = false;
    let mut read_16bit_sr_ten = false;
    match bs_sr & 0b1111 {
        0b0000 => {}
        0b0001 => sample_rate = Some(88_200),
        0b0010 => sample_rate = Some(176_400),
        0b0011 => sample_rate = Some(192_000),
        0b0100 => sample_rate = Some(8_000),
        0b0101 => sample_rate = Some(16_000),
        0b0110 => sample_rate = Some(22_050),
        0b0111 => sample_rate = Some(24_000),
        0b1000 => sample_rate = Some(32_000),
        0b1001 => sample_rate = Some(44_100),
        0b1010 => sample_rate = Some(48_000),
        0b1011 => sample_rate = Some(96_000),
        0b1100 => read_8bit_sr = true,
        0b1101 => read_16bit_sr = true,
        0b1110 => read_16bit_sr_ten = true,
        _ => return fmt_err("invalid frame header, encountered reserved value"),
    }

    let chan_bps_res = reader.read_uint(8)?;
    let channel_assignment = match chan_bps_res >> 4 {
        n if n < 8 => ChannelAssignment::Independent(n + 1),
        0b1000 => ChannelAssignment::LeftSide,
        0b1001 => ChannelAssignment::RightSide,
        0b1010 => ChannelAssignment::MidSide,
        _ => return fmt_err("invalid frame header, encountered reserved value"),
    };

    let bits_per_sample = match (chan_bps_res & 0b0000_1110) >> 1 {
        0b000 => None,
        0b001 => Some(8),
        0b010 => Some(12),
        0b100 => Some(16),
        0b101 => Some(20),
        0b110 => Some(24),
        _ => return fmt_err("invalid frame header, encountered reserved value"),
    };

    if chan_bps_res & 1 != 0 {
        return fmt_err("invalid frame header, encountered reserved value");
    }

    let block_time = match blocking_strategy {
        BlockingStrategy::Variable => BlockTime::SampleNumber(reader.read_utf8_uint64()?),
        BlockingStrategy::Fixed => {
            let frame = reader.read_utf8_uint32()?;
            if frame > 0x7fff_ffff {
                return fmt_err("invalid frame header, frame number too large");
            }
            BlockTime::FrameNumber(frame)
        }
    };

    if read_8bit_bs {
        block_size = reader.read_uint(8)? + 1;
    }
    if read_16bit_bs {
        let bs = reader.read_uint(16)?;
        if bs == 0xffff {
            return fmt_err("invalid block size, exceeds 65535");
        }
        block_size = bs + 1;
    }
    if block_size < 16 {
        return fmt_err("invalid block size, must be at least 16");
    }

    if read_8bit_sr {
        sample_rate = Some(reader.read_uint(8)?);
    }
    if read_16bit_sr {
        sample_rate = Some(reader.read_uint(16)?);
    }
    if read_16bit_sr_ten {
        sample_rate = Some(reader.read_uint(16)? * 10);
    }

    let computed_crc = reader.crc8();
    let stored_crc = reader.read_uint(8)? as u8;
    if computed_crc != stored_crc {
        return fmt_err("frame header CRC mismatch");
    }

    Ok(FrameHeader { block_time, block_size, sample_rate, channel_assignment, bits_per_sample })
}

/// Writes a frame header for a fixed-blocking-strategy stream.
///
/// Sample rate and bit depth are always written as "use STREAMINFO", which
/// every FLAC decoder supports and keeps this encoder's header logic simple;
/// only the block size, which a decoder cannot otherwise infer, is written
/// explicitly.
fn write_frame_header(
    writer: &mut BitWriter,
    frame_number: u32,
    block_size: u32,
    channel_assignment: ChannelAssignment,
) -> Result<()> {
    writer.reset_crc8();

    writer.write_uint(14, 0b1111_1111_1111_10);
    writer.write_uint(1, 0); // reserved
    writer.write_uint(1, 0); // fixed blocking strategy

    let (bs_code, explicit_bs) = block_size_code(block_size)?;
    writer.write_uint(4, bs_code);
    writer.write_uint(4, 0b0000); // sample rate: from STREAMINFO

    let chan_bits = match channel_assignment {
        ChannelAssignment::Independent(n) => {
            debug_assert!(n >= 1 && n <= 8);
            n - 1
        }
        ChannelAssignment::LeftSide => 0b1000,
        ChannelAssignment::RightSide => 0b1001,
        ChannelAssignment::MidSide => 0b1010,
    };
    writer.write_uint(4, chan_bits);
    writer.write_uint(3, 0b000); // bits per sample: from STREAMINFO
    writer.write_uint(1, 0); // reserved

    writer.write_utf8(frame_number as u64);

    if let Some((bits, value)) = explicit_bs {
        writer.write_uint(bits, value);
    }

    let crc = writer.crc8();
    writer.write_uint(8, crc as u32);

    Ok(())
}

/// Restores left/right samples from a left + side (left - right) pair,
/// in-place.
fn decode_left_side(left: &mut [i64], side: &mut [i64]) {
    for i in 0..left.len() {
        side[i] = left[i] - side[i];
    }
}

/// Restores left/right samples from a side (left - right) + right pair,
/// in-place.
fn decode_right_side(side: &mut [i64], right: &mut [i64]) {
    for i in 0..right.len() {
        side[i] += right[i];
    }
}

/// Restores left/right samples from a mid ((left+right)>>1) + side
/// (left - right) pair, in-place.
fn decode_mid_side(mid: &mut [i64], side: &mut [i64]) {
    for i in 0..mid.len() {
        let s = side[i];
        let m = (mid[i] << 1) | (s & 1);
        mid[i] = (m + s) >> 1;
        side[i] = (m - s) >> 1;
    }
}

/// Computes the side channel `left - right`.
fn encode_side(left: &[i64], right: &[i64]) -> Vec<i64> {
    left.iter().zip(right).map(|(&l, &r)| l - r).collect()
}

/// Computes the mid channel `(left + right) >> 1`.
fn encode_mid(left: &[i64], right: &[i64]) -> Vec<i64> {
    left.iter().zip(right).map(|(&l, &r)| (l + r) >> 1).collect()
}

/// Picks a channel assignment from the sum of absolute order-2 differences
/// of each candidate channel, the libFLAC "loose" heuristic: cheap enough to
/// run on every frame, and a good enough proxy for Rice-coded size to skip
/// encoding all four candidates in full.
fn loose_best_assignment(left: &[i64], right: &[i64], side: &[i64], mid: &[i64]) -> ChannelAssignment {
    fn order2_abs_sum(xs: &[i64]) -> u64 {
        xs.windows(3).map(|w| (w[2] - 2 * w[1] + w[0]).unsigned_abs()).sum()
    }

    let cost_left = order2_abs_sum(left);
    let cost_right = order2_abs_sum(right);
    let cost_side = order2_abs_sum(side);
    let cost_mid = order2_abs_sum(mid);

    let independent = cost_left + cost_right;
    let left_side = cost_left + cost_side;
    let right_side = cost_right + cost_side;
    let mid_side = cost_mid + cost_side;

    let best = independent.min(left_side).min(right_side).min(mid_side);
    if best == mid_side {
        ChannelAssignment::MidSide
    } else if best == left_side {
        ChannelAssignment::LeftSide
    } else if best == right_side {
        ChannelAssignment::RightSide
    } else {
        ChannelAssignment::Independent(2)
    }
}

/// A decoded block of audio: one `Vec<i64>` of samples per channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub first_sample: u64,
    pub channels: Vec<Vec<i64>>,
}

impl Block {
    pub fn block_size(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len())
    }
}

/// Reads frames from a byte stream, producing decoded blocks.
///
/// The caller must already be positioned at the start of a frame; this
/// reader does not search for a sync code after a desynchronization.
pub struct FrameReader<'r> {
    input: &'r mut dyn io::Read,
}

impl<'r> FrameReader<'r> {
    pub fn new(input: &'r mut dyn io::Read) -> FrameReader<'r> {
        FrameReader { input }
    }

    /// Decodes the next frame. `stream_bps`/`stream_sample_rate` are used
    /// when the frame header defers to STREAMINFO for those fields.
    pub fn read_next(&mut self, stream_bps: u32) -> Result<(Block, FrameHeader)> {
        let mut bit_reader = BitReader::new(&mut *self.input);
        let header = read_frame_header(&mut bit_reader)?;
        let bps = header.bits_per_sample.unwrap_or(stream_bps);
        let bs = header.block_size;

        let mut channels: Vec<Vec<i64>> = match header.channel_assignment {
            ChannelAssignment::Independent(n) => {
                let mut chans = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    chans.push(subframe::decode(&mut bit_reader, bps, bs)?);
                }
                chans
            }
            ChannelAssignment::LeftSide => {
                let left = subframe::decode(&mut bit_reader, bps, bs)?;
                let mut side = subframe::decode(&mut bit_reader, bps + 1, bs)?;
                let mut left = left;
                decode_left_side(&mut left, &mut side);
                vec![left, side]
            }
            ChannelAssignment::RightSide => {
                let mut side = subframe::decode(&mut bit_reader, bps + 1, bs)?;
                let right = subframe::decode(&mut bit_reader, bps, bs)?;
                let mut right = right;
                decode_right_side(&mut side, &mut right);
                vec![side, right]
            }
            ChannelAssignment::MidSide => {
                let mid = subframe::decode(&mut bit_reader, bps, bs)?;
                let side = subframe::decode(&mut bit_reader, bps + 1, bs)?;
                let mut mid = mid;
                let mut side = side;
                decode_mid_side(&mut mid, &mut side);
                vec![mid, side]
            }
        };

        bit_reader.align_to_byte();
        let computed_crc = bit_reader.crc16();

        let mut footer = [0u8; 2];
        self.input.read_exact(&mut footer).map_err(Error::Io)?;
        let stored_crc = u16::from_be_bytes(footer);
        if computed_crc != stored_crc {
            return fmt_err("frame CRC mismatch");
        }

        let first_sample = match header.block_time {
            BlockTime::FrameNumber(n) => n as u64 * bs as u64,
            BlockTime::SampleNumber(n) => n,
        };

        for ch in channels.iter_mut() {
            ch.truncate(bs as usize);
        }

        Ok((Block { first_sample, channels }, header))
    }
}

/// How a stereo pair is decorrelated before encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StereoMode {
    /// Always code left/right independently.
    Independent,
    /// Try all four assignments and keep the smallest.
    Exhaustive,
    /// Pick left/side, right/side, or mid/side from a cheap estimate
    /// instead of fully encoding all four candidates.
    Loose,
}

/// Encodes blocks as fixed-blocking-strategy frames.
pub struct FrameWriter {
    pub encode_params: subframe::EncodeParams,
    pub stereo_mode: StereoMode,
}

impl FrameWriter {
    pub fn new(encode_params: subframe::EncodeParams) -> FrameWriter {
        FrameWriter { encode_params, stereo_mode: StereoMode::Exhaustive }
    }

    pub fn with_stereo_mode(encode_params: subframe::EncodeParams, stereo_mode: StereoMode) -> FrameWriter {
        FrameWriter { encode_params, stereo_mode }
    }

    /// Encodes one frame's worth of channels (already split, not yet
    /// decorrelated) at `bps`, writing it to `output`. For two-channel
    /// input, tries all four channel assignments and keeps the smallest.
    pub fn write_frame<W: io::Write>(
        &self,
        output: &mut W,
        frame_number: u32,
        bps: u32,
        channels: &[Vec<i64>],
    ) -> Result<()> {
        let block_size = channels[0].len() as u32;

        let candidate = if channels.len() == 2 && self.stereo_mode != StereoMode::Independent {
            self.best_stereo_assignment(frame_number, bps, block_size, &channels[0], &channels[1])
        } else {
            let mut w = BitWriter::new();
            write_frame_header(&mut w, frame_number, block_size, ChannelAssignment::Independent(channels.len() as u32))?;
            for ch in channels {
                subframe::encode(&mut w, bps, ch, &self.encode_params);
            }
            w
        };

        let mut candidate = candidate;
        candidate.zero_pad_to_byte();
        let crc16 = candidate.crc16();
        output.write_all(candidate.buffer())?;
        output.write_all(&crc16.to_be_bytes())?;
        Ok(())
    }

    fn best_stereo_assignment(
        &self,
        frame_number: u32,
        bps: u32,
        block_size: u32,
        left: &[i64],
        right: &[i64],
    ) -> BitWriter {
        let side = encode_side(left, right);
        let mid = encode_mid(left, right);

        let attempt = |assignment: ChannelAssignment, chans: (&[i64], &[i64]), bits: (u32, u32)| {
            let mut w = BitWriter::new();
            write_frame_header(&mut w, frame_number, block_size, assignment).expect("block size already validated");
            subframe::encode(&mut w, bits.0, chans.0, &self.encode_params);
            subframe::encode(&mut w, bits.1, chans.1, &self.encode_params);
            w
        };

        if self.stereo_mode == StereoMode::Loose {
            // Estimate each assignment's cost from the sum of absolute
            // values of its order-2 difference, rather than paying for a
            // full subframe encode of all four candidates.
            let assignment = loose_best_assignment(left, right, &side, &mid);
            return match assignment {
                ChannelAssignment::Independent(_) => attempt(ChannelAssignment::Independent(2), (left, right), (bps, bps)),
                ChannelAssignment::LeftSide => attempt(ChannelAssignment::LeftSide, (left, &side), (bps, bps + 1)),
                ChannelAssignment::RightSide => attempt(ChannelAssignment::RightSide, (&side, right), (bps + 1, bps)),
                ChannelAssignment::MidSide => attempt(ChannelAssignment::MidSide, (&mid, &side), (bps, bps + 1)),
            };
        }

        let candidates = [
            attempt(ChannelAssignment::Independent(2), (left, right), (bps, bps)),
            attempt(ChannelAssignment::LeftSide, (left, &side), (bps, bps + 1)),
            attempt(ChannelAssignment::RightSide, (&side, right), (bps + 1, bps)),
            attempt(ChannelAssignment::MidSide, (&mid, &side), (bps, bps + 1)),
        ];

        candidates.into_iter().min_by_key(|w| w.bits_written()).expect("four candidates")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_left_side_matches_known_vector() {
        let mut left = vec![2i64, 5, 83, 113, 127, -63, -45, -15];
        let mut side = vec![-5i64, -33, -59, -125, 127, 89, 7, 3];
        decode_left_side(&mut left, &mut side);
        assert_eq!(side, vec![7i64, 38, 142, 238, 0, -152, -52, -18]);
    }

    #[test]
    fn decode_right_side_matches_known_vector() {
        let mut side = vec![-5i64, -33, -59, -125, 127, 89, 7, 3];
        let mut right = vec![7i64, 38, 142, 238, 0, -152, -52, -18];
        decode_right_side(&mut side, &mut right);
        assert_eq!(side, vec![2i64, 5, 83, 113, 127, -63, -45, -15]);
    }

    #[test]
    fn mid_side_round_trips_through_encode_decode() {
        let left = vec![2i64, 5, 83, 113, 127, -63, -45, -15];
        let right = vec![7i64, 38, 142, 238, 0, -152, -52, -18];
        let side = encode_side(&left, &right);
        let mid = encode_mid(&left, &right);

        let mut mid2 = mid.clone();
        let mut side2 = side.clone();
        decode_mid_side(&mut mid2, &mut side2);
        assert_eq!(mid2, left);
        assert_eq!(side2, right);
    }

    #[test]
    fn frame_header_round_trips() {
        let mut w = BitWriter::new();
        write_frame_header(&mut w, 3, 4096, ChannelAssignment::MidSide).unwrap();
        w.zero_pad_to_byte();
        let mut cursor = io::Cursor::new(w.buffer().to_vec());
        let mut r = BitReader::new(&mut cursor);
        let header = read_frame_header(&mut r).unwrap();
        assert_eq!(header.block_time, BlockTime::FrameNumber(3));
        assert_eq!(header.block_size, 4096);
        assert_eq!(header.channel_assignment, ChannelAssignment::MidSide);
        assert_eq!(header.sample_rate, None);
        assert_eq!(header.bits_per_sample, None);
    }

    #[test]
    fn block_size_code_round_trips_oddball_sizes() {
        for &bs in &[17u32, 1000, 5000, 65536] {
            let (code, explicit) = block_size_code(bs).unwrap();
            assert!(code <= 0b1111);
            if let Some((bits, value)) = explicit {
                assert!(bits == 8 || bits == 16);
                assert_eq!(value, bs - 1);
            }
        }
    }

    #[test]
    fn frame_round_trips_through_writer_and_reader() {
        let left: Vec<i64> = (0..64).map(|i| (100.0 * (i as f64 * 0.1).sin()).round() as i64).collect();
        let right: Vec<i64> = (0..64).map(|i| (90.0 * (i as f64 * 0.11).cos()).round() as i64).collect();

        let writer = FrameWriter::new(subframe::EncodeParams::default());
        let mut buf = Vec::new();
        writer.write_frame(&mut buf, 0, 16, &[left.clone(), right.clone()]).unwrap();

        let mut cursor = io::Cursor::new(buf);
        let mut reader = FrameReader::new(&mut cursor);
        let (block, header) = reader.read_next(16).unwrap();
        assert_eq!(header.block_time, BlockTime::FrameNumber(0));
        assert_eq!(block.channels[0], left);
        assert_eq!(block.channels[1], right);
    }
}
