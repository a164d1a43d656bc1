// flac-codec -- A lossless audio codec library in Rust
// Copyright 2024 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The `sample` module provides the `Sample` trait, implemented for the
//! narrow integer types that a FLAC stream's bits-per-sample can select.
//!
//! FLAC samples are always signed and never wider than 32 bits. Prediction
//! and residual arithmetic, however, routinely needs headroom beyond the
//! sample width itself (an order-4 fixed predictor difference can exceed 32
//! bits for 32-bit samples). Rather than track a distinct "wide" type per
//! sample width, every computation here widens to `i64` and narrows back
//! only at the stream boundary, which is well within `i64`'s range for the
//! up-to-32-bit samples and up-to-32nd-order predictors FLAC allows.

use std::fmt;

/// An integer type that a FLAC STREAMINFO's bits-per-sample can select.
pub trait Sample:
    Copy + Clone + PartialEq + Eq + fmt::Debug + Send + Sync + 'static
{
    /// The number of bits this type occupies.
    const BITS: u32;

    /// The zero sample.
    fn zero() -> Self;

    /// Widens the sample to `i64`, the common accumulator type.
    fn to_i64(self) -> i64;

    /// Narrows an `i64` back to this sample type, wrapping on overflow.
    ///
    /// Callers are expected to only pass back values that came from this
    /// type's own `to_i64`, possibly combined through prediction arithmetic
    /// that does not escape the declared bit depth; wrapping is a safety
    /// net, not a normal code path.
    fn from_i64_wrapping(wide: i64) -> Self;
}

macro_rules! impl_sample {
    ($narrow: ident, $bits: expr) => {
        impl Sample for $narrow {
            const BITS: u32 = $bits;

            fn zero() -> $narrow {
                0
            }

            fn to_i64(self) -> i64 {
                self as i64
            }

            fn from_i64_wrapping(wide: i64) -> $narrow {
                wide as $narrow
            }
        }
    };
}

impl_sample!(i8, 8);
impl_sample!(i16, 16);
impl_sample!(i32, 32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widen_and_narrow_round_trip_in_range() {
        assert_eq!(i32::from_i64_wrapping(12345i32.to_i64()), 12345);
        assert_eq!(i16::from_i64_wrapping((-4242i16).to_i64()), -4242);
        assert_eq!(i8::from_i64_wrapping(100i8.to_i64()), 100);
    }

    #[test]
    fn bits_constants_match_type_widths() {
        assert_eq!(i8::BITS, 8);
        assert_eq!(i16::BITS, 16);
        assert_eq!(i32::BITS, 32);
    }
}
