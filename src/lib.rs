// flac-codec -- A lossless audio codec library in Rust
// Copyright 2024 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! A FLAC encoder and decoder.
//!
//! ```no_run
//! use std::fs::File;
//! use std::ops::ControlFlow;
//! use flac_codec::{Decoder, Sink};
//! use flac_codec::metadata::StreamInfo;
//! use flac_codec::error::Error;
//!
//! struct PrintFirstBlock;
//!
//! impl Sink for PrintFirstBlock {
//!     fn write_samples(&mut self, first_sample: u64, samples: &[Vec<i32>]) -> ControlFlow<()> {
//!         println!("block at {}: {} samples", first_sample, samples[0].len());
//!         ControlFlow::Break(())
//!     }
//!     fn metadata(&mut self, info: &StreamInfo) {
//!         println!("{} Hz, {} channel(s)", info.sample_rate, info.channels);
//!     }
//!     fn error(&mut self, err: &Error) {
//!         eprintln!("decode error: {}", err);
//!     }
//! }
//!
//! let file = File::open("example.flac").unwrap();
//! let mut decoder = flac_codec::Decoder::new(file).unwrap();
//! decoder.run(&mut PrintFirstBlock).unwrap();
//! ```

pub mod apodization;
pub mod bitstream;
pub mod callbacks;
pub mod crc;
pub mod error;
pub mod fixed;
pub mod frame;
pub mod input;
pub mod lpc;
pub mod md5;
pub mod metadata;
pub mod output;
pub mod rice;
pub mod sample;
pub mod seek;
pub mod stream;
pub mod subframe;
pub mod verify;

pub use callbacks::{ReadCallbacks, SeekCallbacks, Sink};
pub use error::{Error, Result};
pub use stream::{Decoder, Encoder, EncoderParams};
