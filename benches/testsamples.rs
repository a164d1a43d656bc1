// flac-codec -- A lossless audio codec library in Rust
// Copyright 2024 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! Benchmarks encode and decode throughput on a handful of synthetic
//! signals, the way claxon benchmarked decode-only throughput over a
//! `testsamples/` directory of real FLAC files using the nightly `test`
//! crate. `criterion` replaces that nightly-only harness; the signals are
//! generated in-memory since this crate can encode its own fixtures.

use std::io::Cursor;
use std::ops::ControlFlow;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use flac_codec::error::Error;
use flac_codec::metadata::StreamInfo;
use flac_codec::stream::{Decoder, Encoder, EncoderParams};
use flac_codec::Sink;

struct Discard;

impl Sink for Discard {
    fn write_samples(&mut self, _first_sample: u64, _samples: &[Vec<i32>]) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
    fn metadata(&mut self, _info: &StreamInfo) {}
    fn error(&mut self, _err: &Error) {}
}

fn sine(channels: usize, n: usize) -> Vec<Vec<i32>> {
    (0..channels)
        .map(|c| {
            (0..n)
                .map(|i| {
                    let phase = (i as f64 + c as f64 * 11.0) * 0.04;
                    (8000.0 * phase.sin()) as i32
                })
                .collect()
        })
        .collect()
}

fn encode_fixture(params: EncoderParams, channels: &[Vec<i32>]) -> Vec<u8> {
    let mut encoder = Encoder::new(Cursor::new(Vec::new()), params).unwrap();
    encoder.write_samples(channels).unwrap();
    encoder.finish_seekable().unwrap().into_inner()
}

fn bench_encode(c: &mut Criterion) {
    let channels = sine(2, 200_000);
    let params = EncoderParams { channels: 2, bits_per_sample: 16, block_size: 4096, ..Default::default() };

    c.bench_function("encode_stereo_sine_200k_samples", |b| {
        b.iter(|| encode_fixture(params.clone(), &channels));
    });
}

fn bench_decode(c: &mut Criterion) {
    let channels = sine(2, 200_000);
    let params = EncoderParams { channels: 2, bits_per_sample: 16, block_size: 4096, ..Default::default() };
    let bytes = encode_fixture(params, &channels);

    c.bench_function("decode_stereo_sine_200k_samples", |b| {
        b.iter_batched(
            || bytes.clone(),
            |bytes| {
                let mut decoder = Decoder::new(Cursor::new(bytes)).unwrap();
                decoder.run(&mut Discard).unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
