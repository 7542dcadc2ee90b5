//! # Audio Processing Module
//!
//! The numerical core of the denoise pipeline. Everything here is synchronous and
//! request-scoped; nothing is cached between requests.
//!
//! ## Key Components:
//! - **Codec**: WAV bytes ⇄ normalized mono `f32` signal
//! - **Segment**: Reflect padding to the inference frame length, and truncation back
//! - **Spectral**: Dominant frequency, spectral centroid, RMS and duration
//!
//! ## Signal Invariants:
//! - **Channels**: Mono (multi-channel input is averaged down on decode)
//! - **Amplitude**: Normalized into roughly [-1, 1] by `max(|x|) + 1e-9`
//! - **Sample Rate**: Carried through unchanged, never resampled

pub mod codec;      // WAV decode/encode and normalization
pub mod segment;    // Frame padding and reconstruction
pub mod spectral;   // Spectral metadata

pub use codec::{read_wav, write_wav_bytes};
pub use segment::PaddingPlan;
pub use spectral::{analyze_audio, SpectralMetadata};

/// Guard added to every normalization and centroid divisor.
pub const EPSILON: f64 = 1e-9;
