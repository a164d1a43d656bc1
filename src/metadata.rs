// flac-codec -- A lossless audio codec library in Rust
// Copyright 2024 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The `metadata` module deals with the metadata blocks at the start of a
//! FLAC stream.
//!
//! Only the STREAMINFO block is modeled in full; every other block type is
//! skipped by its declared length, since this crate treats the metadata
//! object model beyond STREAMINFO as out of scope.

use std::io;

use crate::error::{fmt_err, Result};
use crate::input::ReadBytes;
use crate::output::WriteBytes;

/// The different kinds of metadata block defined by the FLAC format.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum BlockType {
    /// A STREAMINFO block, with technical details about the stream.
    StreamInfo = 0,
    /// A PADDING block, filled with zeros.
    Padding = 1,
    /// An APPLICATION block that holds application-defined data.
    Application = 2,
    /// A SEEKTABLE block, with data for supporting faster seeks.
    SeekTable = 3,
    /// A VORBIS_COMMENT block, with metadata tags.
    VorbisComment = 4,
    /// A CUESHEET block.
    CueSheet = 5,
    /// A PICTURE block, with cover art or other image metadata.
    Picture = 6,
}

/// A metadata block header.
#[derive(Clone, Copy)]
pub struct BlockHeader {
    /// Whether this is the last metadata block before the audio data.
    pub is_last: bool,
    /// The type of metadata block.
    pub block_type: BlockType,
    /// Length of the metadata block in bytes, excluding this header.
    pub length: u32,
}

/// Reads a metadata block header.
///
/// How the contents of the block should be interpreted depends on the type
/// of block; this crate only parses `StreamInfo` blocks, and skips
/// `header.length` bytes for everything else.
pub fn read_block_header<R: io::Read>(input: &mut R) -> Result<BlockHeader> {
    let byte = input.read_u8()?;

    // The first bit specifies whether this is the last block, the next 7
    // bits specify the type of the metadata block to follow.
    let is_last = (byte >> 7) == 1;
    let block_type_u8 = byte & 0b0111_1111;

    let length = input.read_be_u24()?;

    let block_type = match block_type_u8 {
        0 => BlockType::StreamInfo,
        1 => BlockType::Padding,
        2 => BlockType::Application,
        3 => BlockType::SeekTable,
        4 => BlockType::VorbisComment,
        5 => BlockType::CueSheet,
        6 => BlockType::Picture,
        127 => {
            // Invalid to avoid confusion with a frame sync code.
            return fmt_err("invalid metadata block type");
        }
        _ => {
            return fmt_err("invalid metadata block, encountered reserved block type");
        }
    };

    if block_type == BlockType::StreamInfo && length != 34 {
        return fmt_err("invalid streaminfo metadata block length");
    }

    Ok(BlockHeader { is_last, block_type, length })
}

/// Writes a metadata block header.
pub fn write_block_header<W: io::Write>(
    output: &mut W,
    is_last: bool,
    block_type: BlockType,
    length: u32,
) -> Result<()> {
    debug_assert!(length < (1 << 24));
    let byte = ((is_last as u8) << 7) | (block_type as u8);
    output.write_u8(byte)?;
    output.write_be_u24(length)?;
    Ok(())
}

/// The STREAMINFO metadata block: technical details about the stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    /// The minimum block size (in inter-channel samples) used in the stream.
    pub min_block_size: u16,

    /// The maximum block size (in inter-channel samples) used in the stream.
    ///
    /// To avoid allocations during decoding, a buffer of this size times the
    /// number of channels can be allocated up front.
    pub max_block_size: u16,

    /// The minimum frame size (in bytes) used in the stream.
    pub min_frame_size: Option<u32>,

    /// The maximum frame size (in bytes) used in the stream.
    pub max_frame_size: Option<u32>,

    /// The sample rate in Hz.
    pub sample_rate: u32,

    /// The number of channels.
    pub channels: u32,

    /// The number of bits per sample.
    pub bits_per_sample: u32,

    /// The total number of inter-channel samples in the stream.
    pub samples: Option<u64>,

    /// MD5 signature of the unencoded, interleaved little-endian audio data.
    pub md5sum: [u8; 16],
}

impl StreamInfo {
    /// STREAMINFO's fixed on-disk body size, in bytes.
    pub const BLOCK_LEN: u32 = 34;
}

/// Reads a STREAMINFO block body (34 bytes, following the block header).
pub fn read_streaminfo_block<R: io::Read>(input: &mut R) -> Result<StreamInfo> {
    let min_block_size = input.read_be_u16()?;
    let max_block_size = input.read_be_u16()?;

    let min_frame_size = input.read_be_u24()?;
    let max_frame_size = input.read_be_u24()?;

    // Next up are 20 bits that determine the sample rate.
    let sample_rate_msb = input.read_be_u16()?;
    let sample_rate_lsb = input.read_u8()?;
    let sample_rate = (sample_rate_msb as u32) << 4 | (sample_rate_lsb as u32) >> 4;

    // Next three bits are the number of channels - 1.
    let n_channels_bps = sample_rate_lsb;
    let n_channels = ((n_channels_bps >> 1) & 0b0000_0111) + 1;

    // The final bit is the most significant bit of bits-per-sample - 1.
    let bps_msb = n_channels_bps & 1;
    let bps_lsb_n_samples = input.read_u8()?;
    let bits_per_sample = (bps_msb << 4 | (bps_lsb_n_samples >> 4)) + 1;

    // Number of samples in 36 bits total, 4 bits already read.
    let n_samples_msb = bps_lsb_n_samples & 0b0000_1111;
    let n_samples_lsb = input.read_be_u32()?;
    let n_samples = (n_samples_msb as u64) << 32 | n_samples_lsb as u64;

    let mut md5sum = [0u8; 16];
    input.read_exact(&mut md5sum)?;

    if min_block_size > max_block_size {
        return fmt_err("inconsistent bounds, min block size > max block size");
    }
    if min_block_size < 16 {
        return fmt_err("invalid block size, must be at least 16");
    }
    if min_frame_size > max_frame_size && max_frame_size != 0 {
        return fmt_err("inconsistent bounds, min frame size > max frame size");
    }
    if sample_rate == 0 || sample_rate > 655_350 {
        return fmt_err("invalid sample rate");
    }

    Ok(StreamInfo {
        min_block_size,
        max_block_size,
        min_frame_size: if min_frame_size == 0 { None } else { Some(min_frame_size) },
        max_frame_size: if max_frame_size == 0 { None } else { Some(max_frame_size) },
        sample_rate,
        channels: n_channels as u32,
        bits_per_sample: bits_per_sample as u32,
        samples: if n_samples == 0 { None } else { Some(n_samples) },
        md5sum,
    })
}

/// Writes a STREAMINFO block body (34 bytes), the inverse of
/// [`read_streaminfo_block`].
pub fn write_streaminfo_block<W: io::Write>(output: &mut W, info: &StreamInfo) -> Result<()> {
    debug_assert!(info.channels >= 1 && info.channels <= 8);
    debug_assert!(info.bits_per_sample >= 4 && info.bits_per_sample <= 32);
    debug_assert!(info.sample_rate > 0 && info.sample_rate <= 655_350);

    output.write_be_u16(info.min_block_size)?;
    output.write_be_u16(info.max_block_size)?;
    output.write_be_u24(info.min_frame_size.unwrap_or(0))?;
    output.write_be_u24(info.max_frame_size.unwrap_or(0))?;

    let sample_rate_msb = (info.sample_rate >> 4) as u16;
    let sample_rate_lsb_hi = ((info.sample_rate & 0xf) << 4) as u8;
    let n_channels_bits = ((info.channels - 1) as u8) << 1;
    let bps_msb = (((info.bits_per_sample - 1) >> 4) & 1) as u8;
    let sample_rate_lsb = sample_rate_lsb_hi | n_channels_bits | bps_msb;

    output.write_be_u16(sample_rate_msb)?;
    output.write_u8(sample_rate_lsb)?;

    let bps_lsb = (((info.bits_per_sample - 1) & 0xf) as u8) << 4;
    let n_samples = info.samples.unwrap_or(0);
    let n_samples_msb = ((n_samples >> 32) & 0xf) as u8;
    output.write_u8(bps_lsb | n_samples_msb)?;
    output.write_be_u32((n_samples & 0xffff_ffff) as u32)?;

    output.write_all(&info.md5sum)?;

    Ok(())
}

/// Application id used in an APPLICATION block.
///
/// Registered application ids are listed at <https://www.xiph.org/flac/id.html>.
pub struct ApplicationId(pub u32);

/// Reads the application id from an APPLICATION block.
///
/// The first 4 bytes of an APPLICATION block contain its id; the remaining
/// `header.length - 4` bytes are application-specific data that this
/// function does not consume.
pub fn read_application_block<R: io::Read>(input: &mut R) -> Result<ApplicationId> {
    Ok(ApplicationId(input.read_be_u32()?))
}
