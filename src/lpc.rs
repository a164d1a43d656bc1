// flac-codec -- A lossless audio codec library in Rust
// Copyright 2024 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! Linear predictive coding: autocorrelation, Levinson-Durbin recursion,
//! coefficient quantization, and the quantized predictor itself.
//!
//! Residual and restoration arithmetic widens to `i64` regardless of the
//! subframe's bit depth. The reference encoder keeps a 32-bit accumulator
//! and must therefore bound `precision + bits_per_sample` well under 32;
//! widening removes that constraint; see `DESIGN.md` for the rationale.

pub const MAX_ORDER: u32 = 32;
pub const MIN_PRECISION: u32 = 5;
pub const MAX_PRECISION: u32 = 15;
/// Width of the signed shift field in a wire-format LPC subframe header.
const SHIFT_BITS: u32 = 5;

/// Computes the autocorrelation of `data` (already windowed) at lags
/// `0..=max_lag`.
pub fn autocorrelate(data: &[f64], max_lag: usize) -> Vec<f64> {
    let mut autoc = vec![0.0; max_lag + 1];
    for (lag, slot) in autoc.iter_mut().enumerate() {
        let mut sum = 0.0;
        for i in lag..data.len() {
            sum += data[i] * data[i - lag];
        }
        *slot = sum;
    }
    autoc
}

/// One order's worth of Levinson-Durbin output: the LPC coefficients (in
/// `coefficients[0..=order-1]`, coefficient `j` belongs to `sample[i-1-j]`)
/// and the prediction error power at that order.
#[derive(Clone, Debug)]
pub struct LevinsonOrder {
    pub coefficients: Vec<f64>,
    pub error: f64,
}

/// Runs the Levinson-Durbin recursion up to `max_order`, returning the
/// coefficients and residual error at every order from 1 to `max_order`.
///
/// Returns fewer than `max_order` entries if the recursion degenerates
/// (zero prediction error) before reaching it; every order beyond that
/// point would only reproduce the same signal with an all-zero error term.
pub fn levinson_durbin(autoc: &[f64], max_order: usize) -> Vec<LevinsonOrder> {
    let mut results = Vec::with_capacity(max_order);
    if autoc[0] == 0.0 {
        return results;
    }

    let mut error = autoc[0];
    let mut lpc = vec![0.0f64; max_order];

    for i in 0..max_order {
        let mut r = -autoc[i + 1];
        for j in 0..i {
            r -= lpc[j] * autoc[i - j];
        }
        r /= error;

        lpc[i] = r;
        for j in 0..(i / 2) {
            let tmp = lpc[j];
            lpc[j] += r * lpc[i - 1 - j];
            lpc[i - 1 - j] += r * tmp;
        }
        if i % 2 == 1 {
            let j = i / 2;
            lpc[j] += lpc[j] * r;
        }

        error *= 1.0 - r * r;

        // The coefficients above predict the *negative* of the next sample
        // (a property of how the recursion is derived); negate them into
        // the `sample[i-1-j]` convention used everywhere else in this crate.
        let coefficients: Vec<f64> = lpc[..=i].iter().map(|&c| -c).collect();
        results.push(LevinsonOrder { coefficients, error: error.max(0.0) });

        if error <= 0.0 {
            break;
        }
    }

    results
}

/// A quantized LPC predictor ready to be written to a subframe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuantizedLpc {
    pub coefficients: Vec<i32>,
    pub shift: i32,
    pub precision: u32,
}

/// Quantizes floating-point LPC `coefficients` to `precision`-bit signed
/// integers (including the sign bit), choosing a shift such that the
/// largest coefficient uses the full precision.
///
/// Rounding error from each coefficient is carried forward into the next,
/// rather than simply truncated, which keeps the quantized filter closer
/// to the floating-point one than `libFLAC`'s plain `floor` does.
///
/// Returns `None` when all coefficients are zero, or when the required
/// shift falls outside the signed `SHIFT_BITS`-wide range the subframe
/// header can encode; the caller falls back to a fixed predictor in
/// either case.
pub fn quantize(coefficients: &[f64], precision: u32) -> Option<QuantizedLpc> {
    let precision = precision.clamp(MIN_PRECISION, MAX_PRECISION);
    let data_bits = precision - 1; // one bit reserved for the sign.

    let cmax = coefficients.iter().fold(0.0f64, |acc, &c| acc.max(c.abs()));
    if cmax <= 0.0 {
        return None;
    }

    let max_shift = (1i32 << (SHIFT_BITS - 1)) - 1;
    let min_shift = -max_shift - 1;
    let shift = (data_bits as i32) - cmax.log2().floor() as i32 - 1;
    if shift < min_shift || shift > max_shift {
        // Out of the signed SHIFT_BITS-wide range the subframe header can
        // encode; the caller must fall back to a fixed predictor.
        return None;
    }

    let scale = 2f64.powi(shift);
    let qmax = (1i64 << data_bits) - 1;
    let qmin = -(1i64 << data_bits);

    let mut error = 0.0f64;
    let mut qlp = Vec::with_capacity(coefficients.len());
    for &c in coefficients {
        let ideal = c * scale + error;
        let mut q = ideal.round() as i64;
        q = q.clamp(qmin, qmax);
        error = ideal - q as f64;
        qlp.push(q as i32);
    }

    Some(QuantizedLpc { coefficients: qlp, shift, precision })
}

/// Computes the residual of `samples` (which must include the `order`
/// warm-up samples up front) under the quantized predictor.
pub fn compute_residual(qlp: &QuantizedLpc, order: u32, samples: &[i64]) -> Vec<i64> {
    let order = order as usize;
    debug_assert_eq!(qlp.coefficients.len(), order);
    debug_assert!(samples.len() >= order);

    let mut residual = Vec::with_capacity(samples.len() - order);
    for i in order..samples.len() {
        let prediction = predict(qlp, &samples[i - order..i]);
        residual.push(samples[i] - prediction);
    }
    residual
}

/// Restores the signal from `residual`, given the `order` warm-up samples
/// that precede it.
pub fn restore_signal(qlp: &QuantizedLpc, order: u32, warmup: &[i64], residual: &[i64]) -> Vec<i64> {
    let order = order as usize;
    debug_assert_eq!(qlp.coefficients.len(), order);
    debug_assert_eq!(warmup.len(), order);

    let mut history = warmup.to_vec();
    history.reserve(residual.len());
    let mut out = Vec::with_capacity(residual.len());

    for &r in residual {
        let history_len = history.len();
        let prediction = predict(qlp, &history[history_len - order..]);
        let sample = r + prediction;
        history.push(sample);
        out.push(sample);
    }

    out
}

/// `window` holds the `order` samples immediately preceding the predicted
/// one, oldest first; `window[order-1]` is the most recent sample.
fn predict(qlp: &QuantizedLpc, window: &[i64]) -> i64 {
    let order = qlp.coefficients.len();
    let mut sum = 0i64;
    for j in 0..order {
        // coefficient j belongs to the sample j+1 steps in the past.
        sum += qlp.coefficients[j] as i64 * window[order - 1 - j];
    }
    // The shift field is signed; a negative value widens the coefficients'
    // fixed-point scale rather than narrowing it, so it shifts left.
    if qlp.shift >= 0 {
        sum >> qlp.shift
    } else {
        sum << -qlp.shift
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apodization::Apodization;

    fn sine_wave(len: usize) -> Vec<i64> {
        (0..len)
            .map(|i| (1000.0 * (i as f64 * 0.1).sin()).round() as i64)
            .collect()
    }

    #[test]
    fn autocorrelation_at_lag_zero_is_energy() {
        let data = vec![1.0, 2.0, 3.0];
        let autoc = autocorrelate(&data, 2);
        assert_eq!(autoc[0], 1.0 + 4.0 + 9.0);
    }

    #[test]
    fn levinson_durbin_reduces_error_with_order() {
        let samples = sine_wave(200);
        let windowed = Apodization::Tukey(0.5).apply(&samples);
        let autoc = autocorrelate(&windowed, 8);
        let orders = levinson_durbin(&autoc, 8);
        assert!(!orders.is_empty());
        for window in orders.windows(2) {
            assert!(window[1].error <= window[0].error + 1e-6);
        }
    }

    #[test]
    fn quantize_respects_precision_bounds() {
        let coeffs = vec![1.9, -0.5, 0.25, -3.0];
        let q = quantize(&coeffs, 12).unwrap();
        let max = (1i64 << (q.precision - 1)) - 1;
        let min = -(1i64 << (q.precision - 1));
        for &c in &q.coefficients {
            assert!(c as i64 <= max && c as i64 >= min);
        }
    }

    #[test]
    fn round_trips_through_residual_and_restore() {
        let samples = sine_wave(64);
        let windowed = Apodization::Tukey(0.5).apply(&samples);
        let autoc = autocorrelate(&windowed, 8);
        let orders = levinson_durbin(&autoc, 8);
        let chosen = &orders[orders.len() - 1];
        let qlp = quantize(&chosen.coefficients, 12).unwrap();
        let order = qlp.coefficients.len() as u32;

        let residual = compute_residual(&qlp, order, &samples);
        let restored = restore_signal(&qlp, order, &samples[..order as usize], &residual);
        assert_eq!(restored, &samples[order as usize..]);
    }

    #[test]
    fn quantize_returns_none_for_all_zero_coefficients() {
        assert!(quantize(&[0.0, 0.0, 0.0], 12).is_none());
    }

    #[test]
    fn quantize_returns_none_when_required_shift_is_out_of_range() {
        // Coefficients this large push the shift well below the signed
        // 5-bit field's minimum; the caller must fall back to a fixed
        // predictor rather than receive a clamped, degraded filter.
        let coeffs = vec![1.0e8, -2.0e8];
        assert!(quantize(&coeffs, 5).is_none());
    }

    #[test]
    fn predict_round_trips_through_a_negative_shift() {
        // A legal (if unusual) negative shift widens the fixed-point scale,
        // i.e. predict() must shift left instead of right.
        let qlp = QuantizedLpc { coefficients: vec![1], shift: -2, precision: 5 };
        let samples = vec![1i64, 2, 4, 8, 16];
        let order = 1;

        let residual = compute_residual(&qlp, order, &samples);
        let restored = restore_signal(&qlp, order, &samples[..order as usize], &residual);
        assert_eq!(restored, &samples[order as usize..]);
    }
}
