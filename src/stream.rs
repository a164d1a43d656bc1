// flac-codec -- A lossless audio codec library in Rust
// Copyright 2024 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The top-level stream decoder and encoder, tying together metadata,
//! frames, MD5 verification, and (for seekable sinks) in-place STREAMINFO
//! patching at `finish()`.

use std::io::{self, Read as _, Write as _};
use std::ops::ControlFlow;

use log::{debug, trace, warn};

use crate::apodization::Apodization;
use crate::callbacks::{AsRead, ReadCallbacks, Sink};
use crate::error::{fmt_err, unsupported, Error, Result};
use crate::frame;
use crate::md5::Md5Context;
use crate::metadata::{self, BlockType, StreamInfo};
use crate::output::WriteBytes;
use crate::subframe;
use crate::verify;

const STREAM_MAGIC: u32 = 0x664c_6143; // "fLaC"

/// Encoder configuration. Every field has a sensible default; construct with
/// `EncoderParams { channels, bits_per_sample, sample_rate, ..Default::default() }`.
#[derive(Clone, Debug)]
pub struct EncoderParams {
    pub channels: u32,
    pub bits_per_sample: u32,
    pub sample_rate: u32,
    pub block_size: u16,
    pub max_lpc_order: u8,
    pub qlp_coeff_precision: u8,
    pub do_qlp_coeff_prec_search: bool,
    pub do_exhaustive_model_search: bool,
    pub do_mid_side_stereo: bool,
    pub loose_mid_side_stereo: bool,
    pub max_residual_partition_order: u8,
    pub min_residual_partition_order: u8,
    pub apodizations: Vec<Apodization>,
    pub do_escape_coding: bool,
    pub rice_parameter_search_dist: u32,
    pub streamable_subset: bool,
    pub do_verify: bool,
}

impl Default for EncoderParams {
    fn default() -> EncoderParams {
        EncoderParams {
            channels: 2,
            bits_per_sample: 16,
            sample_rate: 44_100,
            block_size: 4096,
            max_lpc_order: 8,
            qlp_coeff_precision: 14,
            do_qlp_coeff_prec_search: false,
            do_exhaustive_model_search: true,
            do_mid_side_stereo: true,
            loose_mid_side_stereo: false,
            max_residual_partition_order: 6,
            min_residual_partition_order: 0,
            apodizations: vec![Apodization::Tukey(0.5)],
            do_escape_coding: false,
            rice_parameter_search_dist: 0,
            streamable_subset: true,
            do_verify: false,
        }
    }
}

const SUBSET_BLOCK_SIZES: &[u16] = &[
    192, 576, 1152, 2304, 4608, 256, 512, 1024, 2048, 4096, 8192, 16384,
];

fn validate_params(params: &EncoderParams) -> Result<()> {
    if params.channels == 0 || params.channels > 8 {
        return unsupported("invalid number of channels, must be in 1..=8");
    }
    if params.bits_per_sample < 4 || params.bits_per_sample > 24 {
        return unsupported("invalid bits per sample, must be in 4..=24");
    }
    if params.sample_rate == 0 || params.sample_rate > 655_350 {
        return unsupported("invalid sample rate");
    }
    if params.block_size < 16 {
        return unsupported("invalid block size, must be at least 16");
    }
    if params.max_lpc_order as u32 > crate::lpc::MAX_ORDER {
        return unsupported("invalid max LPC order, exceeds kernel's maximum");
    }
    if params.max_lpc_order as u32 >= params.block_size as u32 {
        return unsupported("block size too small for the requested max LPC order");
    }
    if params.qlp_coeff_precision != 0
        && ((params.qlp_coeff_precision as u32) < crate::lpc::MIN_PRECISION
            || (params.qlp_coeff_precision as u32) > crate::lpc::MAX_PRECISION)
    {
        return unsupported("invalid QLP coefficient precision, must be in 5..=15");
    }
    if params.min_residual_partition_order > params.max_residual_partition_order {
        return unsupported("invalid residual partition order bounds");
    }
    if params.apodizations.is_empty() {
        return unsupported("at least one apodization window must be configured");
    }

    if params.streamable_subset {
        if !SUBSET_BLOCK_SIZES.contains(&params.block_size) {
            return unsupported("not streamable, block size is outside the allowed subset");
        }
        if params.max_lpc_order > 12 {
            return unsupported("not streamable, max LPC order exceeds 12");
        }
        if params.max_residual_partition_order > 8 {
            return unsupported("not streamable, max residual partition order exceeds 8");
        }
    }

    Ok(())
}

/// Counts bytes read through an inner `io::Read`, used to locate the start
/// of the audio frames after the metadata blocks.
struct CountingRead<R> {
    inner: R,
    count: u64,
}

impl<R: io::Read> io::Read for CountingRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

/// Counts bytes written through an inner `io::Write`, used to track frame
/// sizes for STREAMINFO's min/max frame size fields.
struct CountingWrite<W> {
    inner: W,
    count: u64,
}

impl<W: io::Write> io::Write for CountingWrite<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Scans forward one byte at a time for the 14-bit frame sync pattern,
/// returning the two bytes it matched on. The caller replays them ahead of
/// the rest of the header (e.g. via `Read::chain`), since they have already
/// been consumed from `input`.
fn scan_for_sync<R: io::Read>(input: &mut R) -> Result<[u8; 2]> {
    let mut prev: Option<u8> = None;
    let mut buf = [0u8; 1];
    loop {
        let n = input.read(&mut buf).map_err(Error::Io)?;
        if n == 0 {
            return fmt_err("reached end of stream while searching for a frame sync");
        }
        let byte = buf[0];
        if prev == Some(0xff) && (byte & 0xfc) == 0xf8 {
            return Ok([0xff, byte]);
        }
        prev = Some(byte);
    }
}

/// How far `find_stream_magic` scans past the start of the input looking
/// for the `fLaC` marker before giving up.
const MAX_METADATA_SEARCH_BYTES: u64 = 128 * 1024;

/// Scans for the `fLaC` stream marker, tolerating leading junk (e.g. an
/// ID3v2 tag prepended by some other tool) up to
/// `MAX_METADATA_SEARCH_BYTES`, after which it gives up.
fn find_stream_magic<R: io::Read>(input: &mut R) -> Result<()> {
    let mut window = [0u8; 4];
    let mut filled = 0usize;
    let mut scanned = 0u64;
    let mut buf = [0u8; 1];

    loop {
        if scanned >= MAX_METADATA_SEARCH_BYTES {
            return fmt_err("missing fLaC stream marker");
        }
        let n = input.read(&mut buf).map_err(Error::Io)?;
        if n == 0 {
            return fmt_err("missing fLaC stream marker");
        }
        scanned += 1;

        if filled < 4 {
            window[filled] = buf[0];
            filled += 1;
        } else {
            window.copy_within(1..4, 0);
            window[3] = buf[0];
        }

        if filled == 4 && u32::from_be_bytes(window) == STREAM_MAGIC {
            return Ok(());
        }
    }
}

/// Reads the stream marker and metadata blocks, returning the STREAMINFO
/// block and the number of bytes consumed (the byte offset of the first
/// frame).
fn read_header<R: io::Read>(input: &mut R) -> Result<(StreamInfo, u64)> {
    let mut counting = CountingRead { inner: input, count: 0 };

    find_stream_magic(&mut counting)?;

    let mut streaminfo = None;
    loop {
        let header = metadata::read_block_header(&mut counting)?;
        if header.block_type == BlockType::StreamInfo {
            streaminfo = Some(metadata::read_streaminfo_block(&mut counting)?);
        } else {
            io::copy(&mut (&mut counting).take(header.length as u64), &mut io::sink())
                .map_err(Error::Io)?;
        }
        if header.is_last {
            break;
        }
    }

    let streaminfo = match streaminfo {
        Some(info) => info,
        None => return fmt_err("stream has no STREAMINFO block"),
    };

    trace!(
        "parsed STREAMINFO: {} Hz, {} channel(s), {} bits per sample",
        streaminfo.sample_rate, streaminfo.channels, streaminfo.bits_per_sample
    );

    Ok((streaminfo, counting.count))
}

/// Decodes a FLAC stream, driving a [`Sink`] with decoded samples and
/// lifecycle events.
pub struct Decoder<R> {
    input: R,
    streaminfo: StreamInfo,
    audio_start: u64,
    md5: Md5Context,
}

impl<R: ReadCallbacks> Decoder<R> {
    /// Reads the stream marker and metadata, positioning at the first frame.
    pub fn new(mut input: R) -> Result<Decoder<R>> {
        let (streaminfo, audio_start) = {
            let mut adapter = AsRead(&mut input);
            read_header(&mut adapter)?
        };

        Ok(Decoder { input, streaminfo, audio_start, md5: Md5Context::new() })
    }

    /// The stream's STREAMINFO, known since `new()` returned.
    pub fn streaminfo(&self) -> &StreamInfo {
        &self.streaminfo
    }

    /// Decodes every remaining frame, delivering samples and errors to
    /// `sink` until end of stream or the sink aborts.
    pub fn run<S: Sink>(&mut self, sink: &mut S) -> Result<()> {
        let bps = self.streaminfo.bits_per_sample;
        let bytes_per_sample = (bps + 7) / 8;
        sink.metadata(&self.streaminfo);

        loop {
            let sync = {
                let mut adapter = AsRead(&mut self.input);
                match scan_for_sync(&mut adapter) {
                    Ok(sync) => sync,
                    Err(_) => return Ok(()),
                }
            };

            let frame_result = {
                let mut adapter = AsRead(&mut self.input);
                let mut chained = io::Cursor::new(sync).chain(&mut adapter);
                let mut frame_reader = frame::FrameReader::new(&mut chained);
                frame_reader.read_next(bps)
            };

            match frame_result {
                Ok((block, header)) => {
                    trace!(
                        "decoded frame: {} samples, channel assignment {:?}",
                        block.block_size(),
                        header.channel_assignment
                    );
                    for i in 0..block.block_size() {
                        for channel in &block.channels {
                            self.md5.update_sample(channel[i] as i32, bytes_per_sample);
                        }
                    }
                    let samples: Vec<Vec<i32>> = block
                        .channels
                        .iter()
                        .map(|c| c.iter().map(|&s| s as i32).collect())
                        .collect();
                    if let ControlFlow::Break(()) = sink.write_samples(block.first_sample, &samples) {
                        return Ok(());
                    }
                }
                Err(e) => {
                    if e.is_recoverable() {
                        debug!("resynchronizing after recoverable error: {}", e);
                        sink.error(&e);
                    } else {
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Finalizes decoding: compares the accumulated MD5 against STREAMINFO's
    /// stored signature (skipped when the signature is all-zero, i.e.
    /// unknown) and hands the input back to the caller.
    pub fn finish(self) -> Result<R> {
        let computed = self.md5.finalize();
        if self.streaminfo.md5sum != [0u8; 16] && computed != self.streaminfo.md5sum {
            warn!("decoded signal does not match the stream's stored MD5 signature");
            return fmt_err("decoded signal does not match the stream's stored MD5 signature");
        }
        Ok(self.input)
    }
}

impl<R: crate::callbacks::SeekCallbacks> Decoder<R> {
    /// Seeks to `target_sample` and returns a block starting exactly there.
    pub fn seek(&mut self, target_sample: u64) -> Result<frame::Block> {
        crate::seek::seek(
            &mut self.input,
            self.audio_start,
            self.streaminfo.bits_per_sample,
            self.streaminfo.samples,
            target_sample,
        )
    }
}

fn to_subframe_params(params: &EncoderParams) -> subframe::EncodeParams {
    subframe::EncodeParams {
        max_lpc_order: params.max_lpc_order as u32,
        lpc_precision: if params.qlp_coeff_precision == 0 { 14 } else { params.qlp_coeff_precision as u32 },
        max_partition_order: params.max_residual_partition_order as u32,
        apodizations: params.apodizations.clone(),
        exhaustive_model_search: params.do_exhaustive_model_search,
        qlp_coeff_precision_search: params.do_qlp_coeff_prec_search,
        do_escape_coding: params.do_escape_coding,
    }
}

fn placeholder_streaminfo(params: &EncoderParams) -> StreamInfo {
    StreamInfo {
        min_block_size: params.block_size,
        max_block_size: params.block_size,
        min_frame_size: None,
        max_frame_size: None,
        sample_rate: params.sample_rate,
        channels: params.channels,
        bits_per_sample: params.bits_per_sample,
        samples: None,
        md5sum: [0u8; 16],
    }
}

/// Encodes PCM into a FLAC stream.
pub struct Encoder<W> {
    output: CountingWrite<W>,
    params: EncoderParams,
    frame_writer: frame::FrameWriter,
    md5: Md5Context,
    pending: Vec<Vec<i64>>,
    frame_number: u32,
    total_samples: u64,
    min_block_size: u32,
    max_block_size: u32,
    min_frame_size: u32,
    max_frame_size: u32,
    verifier: Option<verify::Verifier>,
}

impl<W: io::Write> Encoder<W> {
    /// Validates `params`, writes the stream marker and a placeholder
    /// STREAMINFO block, and returns an encoder ready to accept samples.
    pub fn new(output: W, params: EncoderParams) -> Result<Encoder<W>> {
        validate_params(&params)?;

        let mut output = CountingWrite { inner: output, count: 0 };
        output.write_be_u32(STREAM_MAGIC)?;
        metadata::write_block_header(&mut output, true, BlockType::StreamInfo, StreamInfo::BLOCK_LEN)?;
        metadata::write_streaminfo_block(&mut output, &placeholder_streaminfo(&params))?;

        let verifier =
            if params.do_verify { Some(verify::Verifier::new(params.bits_per_sample)) } else { None };

        let stereo_mode = if !params.do_mid_side_stereo {
            frame::StereoMode::Independent
        } else if params.loose_mid_side_stereo {
            frame::StereoMode::Loose
        } else {
            frame::StereoMode::Exhaustive
        };

        Ok(Encoder {
            output,
            pending: vec![Vec::new(); params.channels as usize],
            frame_writer: frame::FrameWriter::with_stereo_mode(to_subframe_params(&params), stereo_mode),
            md5: Md5Context::new(),
            frame_number: 0,
            total_samples: 0,
            min_block_size: u32::MAX,
            max_block_size: 0,
            min_frame_size: u32::MAX,
            max_frame_size: 0,
            verifier,
            params,
        })
    }

    /// Buffers interleaved-by-channel samples, flushing complete blocks as
    /// they fill up.
    pub fn write_samples(&mut self, channels: &[Vec<i32>]) -> Result<()> {
        if channels.len() != self.pending.len() {
            return unsupported("number of channels does not match the encoder's configuration");
        }
        for (dst, src) in self.pending.iter_mut().zip(channels) {
            dst.extend(src.iter().map(|&s| s as i64));
        }

        while self.pending[0].len() >= self.params.block_size as usize {
            self.emit_block(self.params.block_size as usize)?;
        }
        Ok(())
    }

    fn emit_block(&mut self, block_size: usize) -> Result<()> {
        let bps = self.params.bits_per_sample;
        let bytes_per_sample = (bps + 7) / 8;

        let block: Vec<Vec<i64>> =
            self.pending.iter_mut().map(|ch| ch.drain(0..block_size).collect()).collect();

        for i in 0..block_size {
            for ch in &block {
                self.md5.update_sample(ch[i] as i32, bytes_per_sample);
            }
        }

        let mut buf = Vec::new();
        self.frame_writer.write_frame(&mut buf, self.frame_number, bps, &block)?;

        if let Some(verifier) = &mut self.verifier {
            verifier.check(&buf, &block)?;
        }

        self.output.write_all(&buf).map_err(Error::Io)?;
        let frame_bytes = buf.len() as u32;

        self.min_block_size = self.min_block_size.min(block_size as u32);
        self.max_block_size = self.max_block_size.max(block_size as u32);
        self.min_frame_size = self.min_frame_size.min(frame_bytes);
        self.max_frame_size = self.max_frame_size.max(frame_bytes);
        self.total_samples += block_size as u64;
        self.frame_number += 1;

        trace!("emitted frame {} ({} samples, {} bytes)", self.frame_number - 1, block_size, frame_bytes);
        Ok(())
    }

    fn final_streaminfo(&self) -> StreamInfo {
        StreamInfo {
            min_block_size: if self.min_block_size == u32::MAX { 0 } else { self.min_block_size as u16 },
            max_block_size: self.max_block_size as u16,
            min_frame_size: if self.min_frame_size == u32::MAX { None } else { Some(self.min_frame_size) },
            max_frame_size: if self.max_frame_size == 0 { None } else { Some(self.max_frame_size) },
            sample_rate: self.params.sample_rate,
            channels: self.params.channels,
            bits_per_sample: self.params.bits_per_sample,
            samples: Some(self.total_samples),
            md5sum: self.md5.finalize(),
        }
    }

    /// Flushes any partial final block and returns the finished stream's
    /// STREAMINFO together with the underlying writer. Callers without a
    /// seekable sink should deliver the returned `StreamInfo` through their
    /// own metadata mechanism; callers with one should use
    /// [`Encoder::finish_seekable`] instead, which patches it in place.
    pub fn finish(mut self) -> Result<(W, StreamInfo)> {
        let remaining = self.pending[0].len();
        if remaining > 0 {
            self.emit_block(remaining)?;
        }
        Ok((self.output.inner, self.final_streaminfo()))
    }
}

impl<W: io::Write + io::Seek> Encoder<W> {
    /// Like [`Encoder::finish`], but additionally seeks back and rewrites
    /// the STREAMINFO block in place, so the caller gets a complete,
    /// self-describing stream without handling the metadata separately.
    pub fn finish_seekable(self) -> Result<W> {
        let (mut output, info) = self.finish()?;
        output.seek(io::SeekFrom::Start(4)).map_err(Error::Io)?;
        metadata::write_block_header(&mut output, true, BlockType::StreamInfo, StreamInfo::BLOCK_LEN)?;
        metadata::write_streaminfo_block(&mut output, &info)?;
        Ok(output)
    }
}
