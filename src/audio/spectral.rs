//! # Spectral Metadata
//!
//! Descriptive statistics of the denoised signal, reported alongside the WAV file.
//!
//! ## Measures:
//! - **Dominant frequency**: centre frequency of the strongest real-FFT bin
//! - **Spectral centroid**: magnitude-weighted mean frequency ("brightness")
//! - **RMS**: root-mean-square amplitude
//! - **Duration**: sample count divided by sample rate
//!
//! Bin `k` sits at `k * sr / N` for `k = 0..=N/2`; no interpolation between bins.
//! Rounding happens only when the record is built for presentation.

use crate::audio::EPSILON;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

thread_local! {
    // Each blocking-pool thread keeps its own planner; plans are reused per length.
    static FFT_PLANNER: RefCell<RealFftPlanner<f64>> = RefCell::new(RealFftPlanner::new());
}

/// Spectral description of one signal, serialized into the `X-Audio-Metadata` header.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectralMetadata {
    pub dominant_frequency_hz: f64,
    pub centroid_frequency_hz: f64,
    pub rms: f64,
    pub duration_seconds: f64,
}

/// Compute the spectral metadata of `signal` sampled at `sample_rate`.
///
/// An empty signal or zero sample rate yields an all-zero record.
pub fn analyze_audio(signal: &[f32], sample_rate: u32) -> SpectralMetadata {
    let n = signal.len();
    if n == 0 || sample_rate == 0 {
        return SpectralMetadata {
            dominant_frequency_hz: 0.0,
            centroid_frequency_hz: 0.0,
            rms: 0.0,
            duration_seconds: 0.0,
        };
    }

    let sr = sample_rate as f64;
    let magnitudes = magnitude_spectrum(signal);
    let bin_width = sr / n as f64;

    // Strictly-greater keeps the lowest index on ties (DC for silence)
    let mut dominant_bin = 0;
    let mut dominant_mag = f64::NEG_INFINITY;
    for (k, &mag) in magnitudes.iter().enumerate() {
        if mag > dominant_mag {
            dominant_mag = mag;
            dominant_bin = k;
        }
    }

    let total_magnitude: f64 = magnitudes.iter().sum();
    let weighted: f64 = magnitudes
        .iter()
        .enumerate()
        .map(|(k, &mag)| k as f64 * bin_width * mag)
        .sum();

    let mean_square = signal.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>() / n as f64;

    SpectralMetadata {
        dominant_frequency_hz: round_to(dominant_bin as f64 * bin_width, 2),
        centroid_frequency_hz: round_to(weighted / (total_magnitude + EPSILON), 2),
        rms: round_to(mean_square.sqrt(), 6),
        duration_seconds: round_to(n as f64 / sr, 2),
    }
}

/// `|X_k|` for `k = 0..=N/2`.
fn magnitude_spectrum(signal: &[f32]) -> Vec<f64> {
    let fft = FFT_PLANNER.with(|planner| planner.borrow_mut().plan_fft_forward(signal.len()));

    let mut input: Vec<f64> = signal.iter().map(|&s| s as f64).collect();
    let mut spectrum = fft.make_output_vec();

    // Lengths come from the plan itself, so process() cannot fail on size
    if let Err(e) = fft.process(&mut input, &mut spectrum) {
        tracing::warn!("FFT failed, reporting an empty spectrum: {}", e);
        return vec![0.0; signal.len() / 2 + 1];
    }

    spectrum.iter().map(|c| c.norm()).collect()
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
