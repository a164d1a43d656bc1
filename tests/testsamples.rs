// flac-codec -- A lossless audio codec library in Rust
// Copyright 2024 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! Exercises a battery of synthetic test samples through the encoder and
//! decoder, the way claxon's original test suite walked a `testsamples/`
//! directory of real FLAC files and compared against a reference decoder.
//! This crate can also encode, so the reference here is the original PCM
//! data rather than an external `flac`/`metaflac` binary.

use std::io::Cursor;
use std::ops::ControlFlow;

use flac_codec::error::Error;
use flac_codec::metadata::StreamInfo;
use flac_codec::stream::{Decoder, Encoder, EncoderParams};
use flac_codec::Sink;

struct Collector {
    channels: Vec<Vec<i32>>,
}

impl Sink for Collector {
    fn write_samples(&mut self, _first_sample: u64, samples: &[Vec<i32>]) -> ControlFlow<()> {
        if self.channels.is_empty() {
            self.channels = vec![Vec::new(); samples.len()];
        }
        for (dst, src) in self.channels.iter_mut().zip(samples) {
            dst.extend_from_slice(src);
        }
        ControlFlow::Continue(())
    }
    fn metadata(&mut self, _info: &StreamInfo) {}
    fn error(&mut self, _err: &Error) {}
}

fn silence(channels: usize, n: usize) -> Vec<Vec<i32>> {
    vec![vec![0; n]; channels]
}

fn ramp(channels: usize, n: usize) -> Vec<Vec<i32>> {
    (0..channels).map(|c| (0..n).map(|i| ((i + c) % 4000) as i32 - 2000).collect()).collect()
}

fn sine_like(channels: usize, n: usize, bits: u32) -> Vec<Vec<i32>> {
    let amp = (1i64 << (bits - 1)) / 4;
    (0..channels)
        .map(|c| {
            (0..n)
                .map(|i| {
                    let phase = (i as f64 + c as f64 * 17.0) * 0.05;
                    (amp as f64 * phase.sin()) as i32
                })
                .collect()
        })
        .collect()
}

fn noisy(channels: usize, n: usize, seed: i64) -> Vec<Vec<i32>> {
    (0..channels)
        .map(|c| {
            (0..n)
                .map(|i| {
                    let x = (seed + i as i64 * 6364136223846793005 + c as i64) as i64;
                    ((x >> 33) % 30000) as i32
                })
                .collect()
        })
        .collect()
}

fn round_trip(params: EncoderParams, channels: Vec<Vec<i32>>) {
    let mut encoder = Encoder::new(Cursor::new(Vec::new()), params).unwrap();
    encoder.write_samples(&channels).unwrap();
    let bytes = encoder.finish_seekable().unwrap().into_inner();

    let mut decoder = Decoder::new(Cursor::new(bytes)).unwrap();
    let mut collector = Collector { channels: Vec::new() };
    decoder.run(&mut collector).unwrap();
    decoder.finish().unwrap();

    assert_eq!(collector.channels, channels);
}

#[test]
fn silence_round_trips_for_every_channel_count() {
    for channels in 1..=2 {
        round_trip(
            EncoderParams { channels: channels as u32, block_size: 512, ..Default::default() },
            silence(channels, 2000),
        );
    }
}

#[test]
fn ramp_round_trips_at_several_bit_depths() {
    for &bits in &[8u32, 16, 24] {
        round_trip(
            EncoderParams { channels: 1, bits_per_sample: bits, block_size: 1024, ..Default::default() },
            ramp(1, 3000),
        );
    }
}

#[test]
fn sine_like_stereo_round_trips_with_mid_side() {
    round_trip(
        EncoderParams { channels: 2, bits_per_sample: 16, block_size: 4096, ..Default::default() },
        sine_like(2, 10_000, 16),
    );
}

#[test]
fn noisy_signal_round_trips_even_when_incompressible() {
    round_trip(
        EncoderParams { channels: 2, bits_per_sample: 16, block_size: 2048, ..Default::default() },
        noisy(2, 6000, 1234567),
    );
}

#[test]
fn loose_mid_side_and_non_exhaustive_search_still_round_trip() {
    round_trip(
        EncoderParams {
            channels: 2,
            bits_per_sample: 16,
            block_size: 2048,
            loose_mid_side_stereo: true,
            do_exhaustive_model_search: false,
            ..Default::default()
        },
        sine_like(2, 8000, 16),
    );
}

#[test]
fn verify_pass_catches_nothing_on_well_formed_audio() {
    round_trip(
        EncoderParams { channels: 1, bits_per_sample: 16, do_verify: true, ..Default::default() },
        ramp(1, 5000),
    );
}

/// If a `testsamples/` directory of real FLAC files is present alongside
/// the crate (not checked in, but a convenient drop-in for local testing
/// against a corpus), decode every file in it and check that decoding
/// succeeds and the signal's MD5 matches its own STREAMINFO. Silently does
/// nothing when the directory is absent.
#[test]
fn decodes_every_flac_file_in_an_optional_testsamples_directory() {
    if !std::path::Path::new("testsamples").is_dir() {
        return;
    }

    for entry in walkdir::WalkDir::new("testsamples").into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("flac") {
            continue;
        }
        let file = std::fs::File::open(path).unwrap();
        let mut decoder = Decoder::new(std::io::BufReader::new(file)).unwrap();
        let mut collector = Collector { channels: Vec::new() };
        decoder.run(&mut collector).unwrap();
        decoder.finish().unwrap_or_else(|e| panic!("{}: {}", path.display(), e));
    }
}
