// flac-codec -- A lossless audio codec library in Rust
// Copyright 2024 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! Partitioned Rice coding of prediction residuals.
//!
//! A residual is split into `2^order` equally-sized partitions (the first
//! partition is short by the predictor's warm-up sample count), and every
//! partition gets its own Rice parameter, chosen to minimize that
//! partition's coded size. A partition whose best Rice parameter would
//! still be expensive is instead stored as escaped, fixed-width raw
//! samples.

use crate::bitstream::{BitReader, BitWriter};
use crate::error::{fmt_err, Result};

/// Residual coding method `00`: partition parameters are 4 bits wide.
const METHOD_RICE: u32 = 0;
/// Residual coding method `01`: partition parameters are 5 bits wide.
const METHOD_RICE2: u32 = 1;

const RICE_ESCAPE_PARAMETER: u32 = 0b1111;
const RICE2_ESCAPE_PARAMETER: u32 = 0b1_1111;

/// Maps a signed value onto the non-negative integers used by Rice coding.
///
/// `0, -1, 1, -2, 2, ...` maps to `0, 1, 2, 3, 4, ...`.
pub fn fold_signed(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

/// The inverse of [`fold_signed`].
pub fn unfold_signed(u: u64) -> i64 {
    ((u >> 1) as i64) ^ -((u & 1) as i64)
}

/// Decodes the whole residual of a subframe (all partitions).
///
/// `predictor_order` samples at the start of the block were already taken
/// by the warm-up samples, so the residual only covers
/// `block_size - predictor_order` values.
pub fn decode_residual(
    reader: &mut BitReader,
    predictor_order: u32,
    block_size: u32,
) -> Result<Vec<i64>> {
    let method = reader.read_uint(2)?;
    let param_bits = match method {
        METHOD_RICE => 4,
        METHOD_RICE2 => 5,
        _ => return fmt_err("reserved residual coding method"),
    };
    let escape_param = if method == METHOD_RICE { RICE_ESCAPE_PARAMETER } else { RICE2_ESCAPE_PARAMETER };

    let partition_order = reader.read_uint(4)?;
    let n_partitions = 1u32 << partition_order;

    if block_size % n_partitions != 0 {
        return fmt_err("block size is not divisible by the partition count");
    }
    let samples_per_partition = block_size / n_partitions;
    if predictor_order > samples_per_partition {
        return fmt_err("predictor order exceeds the first Rice partition's size");
    }

    let mut residual = Vec::with_capacity((block_size - predictor_order) as usize);
    for i in 0..n_partitions {
        let n = if i == 0 { samples_per_partition - predictor_order } else { samples_per_partition };
        decode_partition(reader, param_bits, escape_param, n, &mut residual)?;
    }

    Ok(residual)
}

fn decode_partition(
    reader: &mut BitReader,
    param_bits: u32,
    escape_param: u32,
    n: u32,
    out: &mut Vec<i64>,
) -> Result<()> {
    let param = reader.read_uint(param_bits)?;
    if param == escape_param {
        let raw_bits = reader.read_uint(5)?;
        if raw_bits == 0 {
            for _ in 0..n {
                out.push(0);
            }
            return Ok(());
        }
        if raw_bits > 32 {
            return fmt_err("escaped Rice partition sample width out of range");
        }
        for _ in 0..n {
            out.push(reader.read_int64(raw_bits)?);
        }
    } else {
        for _ in 0..n {
            let q = reader.read_unary()?;
            let r = if param > 0 { reader.read_uint64(param)? } else { 0 };
            let folded = ((q as u64) << param) | r;
            out.push(unfold_signed(folded));
        }
    }
    Ok(())
}

/// The cost in bits of Rice-coding `residual` with parameter `k`.
fn cost_bits(residual: &[i64], k: u32) -> u64 {
    let mut bits = 0u64;
    for &v in residual {
        let folded = fold_signed(v);
        bits += (folded >> k) + 1 + k as u64;
    }
    bits
}

/// Picks the Rice parameter (0..=30) that minimizes the coded size of `residual`.
fn best_parameter(residual: &[i64]) -> (u32, u64) {
    if residual.is_empty() {
        return (0, 0);
    }
    // The mean of the folded values gives a good starting point: libFLAC and
    // most encoders derive an initial guess from the sum, then refine by
    // search in a small neighborhood. We just search the full range, it is
    // cheap compared to everything else the encoder does per partition.
    let sum: u64 = residual.iter().map(|&v| fold_signed(v)).sum();
    let mean = sum / residual.len() as u64;
    let mut guess = 0u32;
    while (1u64 << (guess + 1)) <= mean + 1 && guess < 30 {
        guess += 1;
    }

    let lo = guess.saturating_sub(2);
    let hi = (guess + 2).min(30);
    let mut best_k = lo;
    let mut best_cost = cost_bits(residual, lo);
    for k in (lo + 1)..=hi {
        let cost = cost_bits(residual, k);
        if cost < best_cost {
            best_cost = cost;
            best_k = k;
        }
    }
    (best_k, best_cost)
}

/// Estimates the encoded size in bits of `residual` under single-partition
/// Rice coding at its best parameter. Used to compare candidate predictors
/// before committing to one; the actual partitioned encode can do better.
pub fn estimate_bits(residual: &[i64]) -> u64 {
    best_parameter(residual).1
}

/// The maximum raw sample width needed to store `residual` as escaped data.
fn escape_width(residual: &[i64]) -> u32 {
    let mut width = 0u32;
    for &v in residual {
        let bits = if v >= 0 {
            64 - (v as u64).leading_zeros() + 1
        } else {
            64 - (!v as u64).leading_zeros() + 1
        };
        width = width.max(bits);
    }
    width.max(1).min(32)
}

struct PartitionPlan {
    order: u32,
    costs: Vec<(u32, u64)>,
}

/// Finds the best partition order in `0..=max_order`, returning per-partition
/// `(parameter, cost_bits)` choices, including escape partitions (`param ==
/// escape_param`).
fn plan_partitions(
    residual: &[i64],
    predictor_order: u32,
    block_size: u32,
    max_order: u32,
    param_bits: u32,
    escape_param: u32,
    do_escape_coding: bool,
) -> PartitionPlan {
    let mut best: Option<PartitionPlan> = None;

    let mut order = 0u32;
    while order <= max_order {
        let n_partitions = 1u32 << order;
        if block_size % n_partitions != 0 {
            break;
        }
        let samples_per_partition = block_size / n_partitions;
        if samples_per_partition <= predictor_order && order > 0 {
            break;
        }

        let mut costs = Vec::with_capacity(n_partitions as usize);
        let mut start = 0usize;
        for i in 0..n_partitions {
            let n = if i == 0 { samples_per_partition - predictor_order } else { samples_per_partition };
            let part = &residual[start..start + n as usize];
            start += n as usize;

            let (k, rice_cost) = best_parameter(part);

            if do_escape_coding {
                let escape_w = escape_width(part);
                let escape_cost = 5 + escape_w as u64 * part.len() as u64;
                if rice_cost <= escape_cost {
                    costs.push((k, param_bits as u64 + rice_cost));
                } else {
                    costs.push((escape_param, param_bits as u64 + escape_cost));
                }
            } else {
                costs.push((k, param_bits as u64 + rice_cost));
            }
        }

        let total: u64 = costs.iter().map(|&(_, c)| c).sum::<u64>() + 4;
        let better = match &best {
            None => true,
            Some(b) => total < b.costs.iter().map(|&(_, c)| c).sum::<u64>() + 4,
        };
        if better {
            best = Some(PartitionPlan { order, costs });
        }

        if samples_per_partition <= predictor_order + 1 {
            break;
        }
        order += 1;
    }

    best.unwrap_or_else(|| {
        let (k, cost) = best_parameter(residual);
        PartitionPlan { order: 0, costs: vec![(k, cost)] }
    })
}

/// Encodes `residual` using partitioned Rice coding, searching for the best
/// partition order up to `max_partition_order`.
pub fn encode_residual(
    writer: &mut BitWriter,
    residual: &[i64],
    predictor_order: u32,
    block_size: u32,
    max_partition_order: u32,
    do_escape_coding: bool,
) {
    // Partition order is bounded so that even the first (shortest)
    // partition holds at least one sample, and by the 4-bit field width.
    let mut max_order = max_partition_order.min(15);
    while max_order > 0 && block_size % (1u32 << max_order) != 0 {
        max_order -= 1;
    }

    let use_rice2 = residual.iter().any(|&v| {
        let (k, _) = best_parameter(&[v]);
        k > 14
    });
    let (param_bits, escape_param, method) = if use_rice2 {
        (5, RICE2_ESCAPE_PARAMETER, METHOD_RICE2)
    } else {
        (4, RICE_ESCAPE_PARAMETER, METHOD_RICE)
    };

    let plan = plan_partitions(
        residual,
        predictor_order,
        block_size,
        max_order,
        param_bits,
        escape_param,
        do_escape_coding,
    );

    writer.write_uint(2, method);
    writer.write_uint(4, plan.order);

    let n_partitions = 1u32 << plan.order;
    let samples_per_partition = block_size / n_partitions;
    let mut start = 0usize;
    for (i, &(param, _)) in plan.costs.iter().enumerate() {
        let n = if i == 0 { samples_per_partition - predictor_order } else { samples_per_partition };
        let part = &residual[start..start + n as usize];
        start += n as usize;

        writer.write_uint(param_bits, param);
        if param == escape_param {
            let width = escape_width(part);
            writer.write_uint(5, width);
            for &v in part {
                writer.write_int64(width, v);
            }
        } else {
            for &v in part {
                writer.write_rice(v, param);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn fold_unfold_round_trips() {
        for v in -1000i64..1000 {
            assert_eq!(unfold_signed(fold_signed(v)), v);
        }
    }

    #[test]
    fn fold_matches_known_mapping() {
        assert_eq!(fold_signed(0), 0);
        assert_eq!(fold_signed(-1), 1);
        assert_eq!(fold_signed(1), 2);
        assert_eq!(fold_signed(-2), 3);
        assert_eq!(fold_signed(2), 4);
    }

    #[test]
    fn residual_round_trips_through_encode_decode() {
        let residual: Vec<i64> = (0..64).map(|i| ((i * 37) % 41) as i64 - 20).collect();
        let block_size = 64 + 2;
        let predictor_order = 2;

        let mut w = BitWriter::new();
        encode_residual(&mut w, &residual, predictor_order, block_size, 4, true);
        w.zero_pad_to_byte();

        let mut cursor = Cursor::new(w.buffer().to_vec());
        let mut r = BitReader::new(&mut cursor);
        let decoded = decode_residual(&mut r, predictor_order, block_size).unwrap();
        assert_eq!(decoded, residual);
    }

    #[test]
    fn residual_with_outlier_uses_escape_without_breaking_round_trip() {
        let mut residual = vec![1i64, -1, 2, -2, 0, 1, -1, 0];
        residual.push(1_000_000);
        residual.push(-1_000_000);
        let block_size = residual.len() as u32;

        let mut w = BitWriter::new();
        encode_residual(&mut w, &residual, 0, block_size, 2, true);
        w.zero_pad_to_byte();

        let mut cursor = Cursor::new(w.buffer().to_vec());
        let mut r = BitReader::new(&mut cursor);
        let decoded = decode_residual(&mut r, 0, block_size).unwrap();
        assert_eq!(decoded, residual);
    }

    #[test]
    fn decode_rejects_reserved_method() {
        let mut w = BitWriter::new();
        w.write_uint(2, 0b10);
        w.zero_pad_to_byte();
        let mut cursor = Cursor::new(w.buffer().to_vec());
        let mut r = BitReader::new(&mut cursor);
        assert!(decode_residual(&mut r, 0, 8).is_err());
    }
}
