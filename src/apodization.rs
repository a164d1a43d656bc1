// flac-codec -- A lossless audio codec library in Rust
// Copyright 2024 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! Apodization windows applied to a block before autocorrelation.
//!
//! Windowing trades a little bit of frequency resolution for a lot less
//! spectral leakage, which in turn gives Levinson-Durbin a cleaner
//! autocorrelation sequence to work from. `libFLAC` calls this "apodization";
//! we keep the name since it is what any tool inspecting the encoder's
//! parameters will expect.

use std::f64::consts::PI;

/// A choice of window function to apply before LPC analysis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Apodization {
    /// No windowing; every sample keeps its original weight.
    Rectangle,
    /// A Welch (parabolic) window.
    Welch,
    /// A Hann (raised cosine) window.
    Hann,
    /// A Tukey window with the given taper fraction in `0.0..=1.0`.
    Tukey(f64),
}

impl Apodization {
    /// Computes the window's weights for a block of `len` samples.
    pub fn weights(self, len: usize) -> Vec<f64> {
        if len == 0 {
            return Vec::new();
        }
        if len == 1 {
            return vec![1.0];
        }

        let n = (len - 1) as f64;
        match self {
            Apodization::Rectangle => vec![1.0; len],
            Apodization::Welch => (0..len)
                .map(|i| {
                    let x = (i as f64 - n / 2.0) / (n / 2.0);
                    1.0 - x * x
                })
                .collect(),
            Apodization::Hann => (0..len)
                .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n).cos())
                .collect(),
            Apodization::Tukey(taper) => tukey_weights(len, taper),
        }
    }

    /// Applies the window to `samples`, returning the weighted signal.
    pub fn apply(self, samples: &[i64]) -> Vec<f64> {
        let weights = self.weights(samples.len());
        samples.iter().zip(weights.iter()).map(|(&s, &w)| s as f64 * w).collect()
    }
}

fn tukey_weights(len: usize, taper: f64) -> Vec<f64> {
    let taper = taper.clamp(0.0, 1.0);
    if taper == 0.0 {
        return vec![1.0; len];
    }

    let n = (len - 1) as f64;
    let edge = (taper * n / 2.0).floor() as usize;

    (0..len)
        .map(|i| {
            if i < edge {
                0.5 * (1.0 + (PI * (2.0 * i as f64 / (taper * n) - 1.0)).cos())
            } else if i >= len - edge {
                let j = len - 1 - i;
                0.5 * (1.0 + (PI * (2.0 * j as f64 / (taper * n) - 1.0)).cos())
            } else {
                1.0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_is_all_ones() {
        assert_eq!(Apodization::Rectangle.weights(5), vec![1.0; 5]);
    }

    #[test]
    fn welch_and_hann_are_zero_at_the_edges() {
        let welch = Apodization::Welch.weights(9);
        assert!(welch[0].abs() < 1e-9);
        assert!(welch[8].abs() < 1e-9);

        let hann = Apodization::Hann.weights(9);
        assert!(hann[0].abs() < 1e-9);
        assert!(hann[8].abs() < 1e-9);
    }

    #[test]
    fn windows_are_symmetric() {
        for w in [Apodization::Welch, Apodization::Hann, Apodization::Tukey(0.5)] {
            let weights = w.weights(11);
            for i in 0..weights.len() {
                assert!(
                    (weights[i] - weights[weights.len() - 1 - i]).abs() < 1e-9,
                    "{:?} not symmetric at {}",
                    w,
                    i
                );
            }
        }
    }

    #[test]
    fn tukey_zero_taper_is_rectangle() {
        let weights = Apodization::Tukey(0.0).weights(7);
        assert_eq!(weights, vec![1.0; 7]);
    }

    #[test]
    fn apply_scales_samples_by_weights() {
        let samples = vec![10i64, 20, 30];
        let weighted = Apodization::Rectangle.apply(&samples);
        assert_eq!(weighted, vec![10.0, 20.0, 30.0]);
    }
}
