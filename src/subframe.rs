// flac-codec -- A lossless audio codec library in Rust
// Copyright 2024 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The `subframe` module deals with the four subframe types FLAC uses to
//! encode a single channel's worth of a block: CONSTANT, VERBATIM, FIXED,
//! and LPC.

use crate::apodization::Apodization;
use crate::bitstream::{BitReader, BitWriter};
use crate::error::{fmt_err, Result};
use crate::fixed;
use crate::lpc;
use crate::rice;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SubframeType {
    Constant,
    Verbatim,
    Fixed(u32),
    Lpc(u32),
}

struct SubframeHeader {
    sf_type: SubframeType,
    wasted_bits: u32,
}

fn read_subframe_header(reader: &mut BitReader) -> Result<SubframeHeader> {
    if reader.read_uint(1)? != 0 {
        return fmt_err("invalid subframe header, padding bit is set");
    }

    let type_bits = reader.read_uint(6)?;
    let sf_type = match type_bits {
        0 => SubframeType::Constant,
        1 => SubframeType::Verbatim,

        // Bit patterns 00001x, 0001xx and 01xxxx are reserved.
        n if (n & 0b111_110 == 0b000_010)
            || (n & 0b111_100 == 0b000_100)
            || (n & 0b110_000 == 0b010_000) =>
        {
            return fmt_err("invalid subframe header, encountered reserved value");
        }

        n if n & 0b111_000 == 0b001_000 => {
            let order = n & 0b000_111;
            if order > fixed::MAX_ORDER {
                return fmt_err("invalid subframe header, fixed predictor order too large");
            }
            SubframeType::Fixed(order)
        }

        // The only remaining pattern is 1xxxxx, an LPC subframe; the low
        // five bits are the predictor order minus one.
        n => SubframeType::Lpc((n & 0b011_111) + 1),
    };

    let has_wasted = reader.read_uint(1)? == 1;
    let wasted_bits = if has_wasted { 1 + reader.read_unary_zeros()? } else { 0 };

    Ok(SubframeHeader { sf_type, wasted_bits })
}

fn write_subframe_header(writer: &mut BitWriter, sf_type: SubframeType, wasted_bits: u32) {
    writer.write_uint(1, 0);

    let type_bits = match sf_type {
        SubframeType::Constant => 0,
        SubframeType::Verbatim => 1,
        SubframeType::Fixed(order) => 0b00_1000 | order,
        SubframeType::Lpc(order) => 0b10_0000 | (order - 1),
    };
    writer.write_uint(6, type_bits);

    if wasted_bits == 0 {
        writer.write_uint(1, 0);
    } else {
        writer.write_uint(1, 1);
        writer.write_zeroes(wasted_bits - 1);
        writer.write_uint(1, 1);
    }
}

/// Decodes one subframe (one channel's worth of one block) into `block_size`
/// samples, widened to `i64`.
pub fn decode(reader: &mut BitReader, bps: u32, block_size: u32) -> Result<Vec<i64>> {
    let header = read_subframe_header(reader)?;
    if header.wasted_bits >= bps {
        return fmt_err("invalid subframe, wasted bits leave no bits per sample");
    }
    let eff_bps = bps - header.wasted_bits;

    let mut samples = match header.sf_type {
        SubframeType::Constant => {
            let value = reader.read_int64(eff_bps)?;
            vec![value; block_size as usize]
        }

        SubframeType::Verbatim => {
            let mut samples = Vec::with_capacity(block_size as usize);
            for _ in 0..block_size {
                samples.push(reader.read_int64(eff_bps)?);
            }
            samples
        }

        SubframeType::Fixed(order) => {
            if order > block_size {
                return fmt_err("invalid subframe, fixed predictor order exceeds block size");
            }
            let mut warmup = Vec::with_capacity(order as usize);
            for _ in 0..order {
                warmup.push(reader.read_int64(eff_bps)?);
            }
            let residual = rice::decode_residual(reader, order, block_size)?;
            let mut samples = warmup.clone();
            samples.extend(fixed::restore_signal(order, &warmup, &residual));
            samples
        }

        SubframeType::Lpc(order) => {
            if order > block_size {
                return fmt_err("invalid subframe, LPC predictor order exceeds block size");
            }
            let mut warmup = Vec::with_capacity(order as usize);
            for _ in 0..order {
                warmup.push(reader.read_int64(eff_bps)?);
            }

            let precision_raw = reader.read_uint(4)?;
            if precision_raw == 0b1111 {
                return fmt_err("invalid subframe, reserved LPC coefficient precision");
            }
            let precision = precision_raw + 1;

            // The 5-bit field is a signed quantity; a negative shift is a
            // legal left-shift of the reconstructed prediction, not an
            // error (see QuantizedLpc::shift).
            let shift = reader.read_int(5)?;

            let mut coefficients = Vec::with_capacity(order as usize);
            for _ in 0..order {
                coefficients.push(reader.read_int(precision)?);
            }

            let qlp = lpc::QuantizedLpc { coefficients, shift, precision };
            let residual = rice::decode_residual(reader, order, block_size)?;
            let mut samples = warmup.clone();
            samples.extend(lpc::restore_signal(&qlp, order, &warmup, &residual));
            samples
        }
    };

    if header.wasted_bits > 0 {
        for s in samples.iter_mut() {
            *s <<= header.wasted_bits;
        }
    }

    Ok(samples)
}

/// Parameters that steer subframe encoding: how hard to search for a good
/// LPC predictor, and how finely to partition the residual.
#[derive(Clone, Debug)]
pub struct EncodeParams {
    pub max_lpc_order: u32,
    pub lpc_precision: u32,
    pub max_partition_order: u32,
    /// Every window here is tried; the cheapest resulting subframe wins.
    pub apodizations: Vec<Apodization>,
    /// When false, skip straight to the order the Levinson-Durbin error
    /// vector suggests instead of trying every order up to `max_lpc_order`.
    pub exhaustive_model_search: bool,
    /// When true, also try `lpc_precision - 1` and `lpc_precision + 1`.
    pub qlp_coeff_precision_search: bool,
    /// When true, a residual partition that is cheaper stored as raw fixed-
    /// width samples than Rice-coded is allowed to escape.
    pub do_escape_coding: bool,
}

impl Default for EncodeParams {
    fn default() -> EncodeParams {
        EncodeParams {
            max_lpc_order: 8,
            lpc_precision: 14,
            max_partition_order: 6,
            apodizations: vec![Apodization::Tukey(0.5)],
            exhaustive_model_search: true,
            qlp_coeff_precision_search: false,
            do_escape_coding: true,
        }
    }
}

/// The number of bits every sample in `samples` has in common as trailing
/// zero bits; FLAC calls these "wasted bits" and stores them once instead of
/// in every sample.
fn wasted_bits(samples: &[i64]) -> u32 {
    let mut acc = 0i64;
    for &s in samples {
        acc |= s;
    }
    if acc == 0 {
        0
    } else {
        acc.trailing_zeros()
    }
}

/// Finds the LPC predictor (of some order up to `params.max_lpc_order`) with
/// the lowest estimated encoded size, if any order produces a usable
/// quantized predictor.
fn find_best_lpc(
    samples: &[i64],
    eff_bps: u32,
    block_size: u32,
    params: &EncodeParams,
) -> Option<(u32, lpc::QuantizedLpc, Vec<i64>, u64)> {
    let max_order = params.max_lpc_order.min(lpc::MAX_ORDER).min(block_size.saturating_sub(1));
    if max_order == 0 {
        return None;
    }

    let precisions: Vec<u32> = if params.qlp_coeff_precision_search {
        let p = params.lpc_precision as i32;
        let mut ps: Vec<u32> = [p - 1, p, p + 1]
            .iter()
            .map(|&v| v.clamp(lpc::MIN_PRECISION as i32, lpc::MAX_PRECISION as i32) as u32)
            .collect();
        ps.dedup();
        ps
    } else {
        vec![params.lpc_precision]
    };

    let mut best: Option<(u32, lpc::QuantizedLpc, Vec<i64>, u64)> = None;

    for &apodization in &params.apodizations {
        let windowed = apodization.apply(samples);
        let autoc = lpc::autocorrelate(&windowed, max_order as usize);
        let orders = lpc::levinson_durbin(&autoc, max_order as usize);

        let candidate_orders: Vec<u32> = if params.exhaustive_model_search {
            (1..=max_order).collect()
        } else {
            vec![best_order_by_error(&orders)]
        };

        for &order in &candidate_orders {
            let level = &orders[(order - 1) as usize];
            for &precision in &precisions {
                let qlp = match lpc::quantize(&level.coefficients, precision) {
                    Some(qlp) => qlp,
                    None => continue,
                };
                let residual = lpc::compute_residual(&qlp, order, samples);
                let header_bits = 4 + 5 + order as u64 * (qlp.precision as u64 + eff_bps as u64);
                let cost = header_bits + rice::estimate_bits(&residual);

                if best.as_ref().map_or(true, |b| cost < b.3) {
                    best = Some((order, qlp, residual, cost));
                }
            }
        }
    }

    best
}

/// Picks a single order from the Levinson-Durbin error vector, the way a
/// non-exhaustive encoder avoids paying for a full per-order Rice search:
/// estimate bits per residual sample from the prediction error energy, and
/// stop trusting a higher order once its extra coefficients cost more than
/// the error reduction is worth.
fn best_order_by_error(orders: &[lpc::LevinsonOrder]) -> u32 {
    let mut best_order = 1u32;
    let mut best_estimate = f64::INFINITY;
    for (i, level) in orders.iter().enumerate() {
        let order = (i + 1) as u32;
        let error = level.error.max(1e-9);
        let bits_per_sample = (0.5 * error.log2()).max(0.0);
        let estimate = bits_per_sample * orders.len() as f64 + order as f64 * 16.0;
        if estimate < best_estimate {
            best_estimate = estimate;
            best_order = order;
        }
    }
    best_order
}

/// Encodes `samples` (one channel's worth of one block, at `bps` bits per
/// sample) as a subframe, choosing whichever of CONSTANT, FIXED, and LPC
/// produces the smallest estimated size; VERBATIM is only used as the final
/// fallback when a block is too short for any predictor.
pub fn encode(writer: &mut BitWriter, bps: u32, samples: &[i64], params: &EncodeParams) {
    let block_size = samples.len() as u32;
    let wasted = wasted_bits(samples);
    let eff_bps = bps - wasted;

    let work: Vec<i64> = if wasted > 0 {
        samples.iter().map(|&s| s >> wasted).collect()
    } else {
        samples.to_vec()
    };

    if let Some(&first) = work.first() {
        if work.iter().all(|&s| s == first) {
            write_subframe_header(writer, SubframeType::Constant, wasted);
            writer.write_int64(eff_bps, first);
            return;
        }
    }

    if block_size < 2 {
        write_subframe_header(writer, SubframeType::Verbatim, wasted);
        for &s in &work {
            writer.write_int64(eff_bps, s);
        }
        return;
    }

    let fixed_order = fixed::best_order(&work, fixed::MAX_ORDER);
    let fixed_residual = fixed::compute_residual(fixed_order, &work);
    let fixed_cost =
        fixed_order as u64 * eff_bps as u64 + rice::estimate_bits(&fixed_residual);

    let lpc_candidate = find_best_lpc(&work, eff_bps, block_size, params);

    match lpc_candidate {
        Some((order, qlp, residual, cost)) if cost < fixed_cost => {
            write_subframe_header(writer, SubframeType::Lpc(order), wasted);
            for &s in &work[..order as usize] {
                writer.write_int64(eff_bps, s);
            }
            writer.write_uint(4, qlp.precision - 1);
            writer.write_int(5, qlp.shift);
            for &c in &qlp.coefficients {
                writer.write_int(qlp.precision, c);
            }
            rice::encode_residual(
                writer,
                &residual,
                order,
                block_size,
                params.max_partition_order,
                params.do_escape_coding,
            );
        }
        _ => {
            write_subframe_header(writer, SubframeType::Fixed(fixed_order), wasted);
            for &s in &work[..fixed_order as usize] {
                writer.write_int64(eff_bps, s);
            }
            rice::encode_residual(
                writer,
                &fixed_residual,
                fixed_order,
                block_size,
                params.max_partition_order,
                params.do_escape_coding,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(bps: u32, samples: &[i64], params: &EncodeParams) -> Vec<i64> {
        let mut w = BitWriter::new();
        encode(&mut w, bps, samples, params);
        w.zero_pad_to_byte();
        let mut cursor = Cursor::new(w.buffer().to_vec());
        let mut r = BitReader::new(&mut cursor);
        decode(&mut r, bps, samples.len() as u32).unwrap()
    }

    #[test]
    fn constant_subframe_round_trips() {
        let samples = vec![42i64; 32];
        let decoded = round_trip(16, &samples, &EncodeParams::default());
        assert_eq!(decoded, samples);
    }

    #[test]
    fn fixed_subframe_round_trips_a_ramp() {
        let samples: Vec<i64> = (0..64).map(|i| i * 3 - 17).collect();
        let decoded = round_trip(16, &samples, &EncodeParams::default());
        assert_eq!(decoded, samples);
    }

    #[test]
    fn lpc_subframe_round_trips_a_sine_wave() {
        let samples: Vec<i64> =
            (0..256).map(|i| (2000.0 * (i as f64 * 0.05).sin()).round() as i64).collect();
        let decoded = round_trip(16, &samples, &EncodeParams::default());
        assert_eq!(decoded, samples);
    }

    #[test]
    fn wasted_bits_are_recovered() {
        let samples: Vec<i64> = (0..32).map(|i| (i % 5 - 2) * 8).collect();
        assert_eq!(wasted_bits(&samples), 3);
        let decoded = round_trip(16, &samples, &EncodeParams::default());
        assert_eq!(decoded, samples);
    }

    #[test]
    fn verbatim_is_used_for_tiny_blocks() {
        let samples = vec![5i64, -5];
        let decoded = round_trip(16, &samples, &EncodeParams::default());
        assert_eq!(decoded, samples);
    }

    #[test]
    fn decode_rejects_reserved_subframe_type() {
        let mut w = BitWriter::new();
        w.write_uint(1, 0);
        w.write_uint(6, 0b000010);
        w.zero_pad_to_byte();
        let mut cursor = Cursor::new(w.buffer().to_vec());
        let mut r = BitReader::new(&mut cursor);
        assert!(decode(&mut r, 16, 8).is_err());
    }
}
