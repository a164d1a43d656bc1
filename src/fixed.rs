// flac-codec -- A lossless audio codec library in Rust
// Copyright 2024 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! Fixed (orders 0 through 4) predictors.
//!
//! These are the FLAC format's built-in, coefficient-free predictors. Order
//! `n` approximates the signal with the `n`-th derivative of a polynomial
//! fit through the `n` previous samples; the coefficients below are the
//! binomial-expansion coefficients of `(1 - z^-1)^n`.

/// The highest fixed predictor order FLAC defines.
pub const MAX_ORDER: u32 = 4;

/// Computes the residual of `samples` under the fixed predictor of the
/// given `order`.
///
/// `samples` must include the `order` warm-up samples at the front; the
/// returned vector has `samples.len() - order` entries, one per sample
/// after the warm-up.
pub fn compute_residual(order: u32, samples: &[i64]) -> Vec<i64> {
    let order = order as usize;
    debug_assert!(samples.len() >= order);

    let mut residual = Vec::with_capacity(samples.len() - order);
    for i in order..samples.len() {
        let prediction = predict(order, &samples[i - order..i]);
        residual.push(samples[i] - prediction);
    }
    residual
}

/// Restores the signal from `residual`, given the `order` warm-up samples
/// that precede it.
///
/// `warmup` must have exactly `order` entries. The returned vector holds
/// only the restored (post-warm-up) samples, in order.
pub fn restore_signal(order: u32, warmup: &[i64], residual: &[i64]) -> Vec<i64> {
    let order_usize = order as usize;
    debug_assert_eq!(warmup.len(), order_usize);

    let mut history = warmup.to_vec();
    history.reserve(residual.len());
    let mut out = Vec::with_capacity(residual.len());

    for &r in residual {
        let history_len = history.len();
        let prediction = predict(order_usize, &history[history_len - order_usize..]);
        let sample = r + prediction;
        history.push(sample);
        out.push(sample);
    }

    out
}

/// `window` holds the `order` samples immediately preceding the one being
/// predicted, oldest first.
fn predict(order: usize, window: &[i64]) -> i64 {
    debug_assert_eq!(window.len(), order);
    match order {
        0 => 0,
        1 => window[0],
        2 => 2 * window[1] - window[0],
        3 => 3 * window[2] - 3 * window[1] + window[0],
        4 => 4 * window[3] - 6 * window[2] + 4 * window[1] - window[0],
        _ => unreachable!("fixed predictor order must be 0..=4"),
    }
}

/// Picks the fixed predictor order in `0..=max_order` (capped at
/// [`MAX_ORDER`] and at `samples.len() - 1`) whose residual has the
/// smallest sum of absolute values, a cheap proxy for Rice-coded size.
pub fn best_order(samples: &[i64], max_order: u32) -> u32 {
    let max_order = max_order.min(MAX_ORDER).min(samples.len().saturating_sub(1) as u32);

    let mut best = 0u32;
    let mut best_sum = u64::MAX;
    for order in 0..=max_order {
        let residual = compute_residual(order, samples);
        let sum: u64 = residual.iter().map(|&r| r.unsigned_abs()).sum();
        if sum < best_sum {
            best_sum = sum;
            best = order;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_zero_is_identity() {
        let samples = vec![1i64, 2, 3, -4, 5];
        assert_eq!(compute_residual(0, &samples), samples);
    }

    #[test]
    fn linear_ramp_is_exact_for_order_one() {
        let samples: Vec<i64> = (0..10).collect();
        let residual = compute_residual(1, &samples);
        assert!(residual.iter().all(|&r| r == 1));
    }

    #[test]
    fn quadratic_ramp_is_exact_for_order_two() {
        let samples: Vec<i64> = (0..10).map(|i: i64| i * i).collect();
        let residual = compute_residual(2, &samples);
        assert!(residual.iter().all(|&r| r == 2));
    }

    #[test]
    fn round_trips_for_every_order() {
        let samples = vec![10i64, -3, 7, 42, -100, 5, 6, -7, 8, 0, 1, -1];
        for order in 0..=MAX_ORDER {
            let order = order as usize;
            let residual = compute_residual(order as u32, &samples);
            let restored = restore_signal(order as u32, &samples[..order], &residual);
            assert_eq!(restored, &samples[order..], "round trip failed for order {}", order);
        }
    }

    #[test]
    fn best_order_picks_the_smallest_residual_for_a_ramp() {
        let samples: Vec<i64> = (0..64).collect();
        assert_eq!(best_order(&samples, MAX_ORDER), 1);
    }
}
