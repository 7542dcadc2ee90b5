//! # Denoise Pipeline
//!
//! The synchronous chain every upload goes through:
//!
//! ```text
//! bytes → read_wav → PaddingPlan::pad → Denoiser::denoise → PaddingPlan::reconstruct
//!                                                            ├→ write_wav_bytes
//!                                                            └→ analyze_audio
//! ```
//!
//! Each stage produces a new buffer; nothing is shared with other requests except the
//! read-only model. The first failing stage ends the run and no partial output escapes.

use crate::audio::{analyze_audio, read_wav, write_wav_bytes, PaddingPlan, SpectralMetadata};
use crate::error::{AppError, AppResult};
use crate::inference::Denoiser;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Result of one successful run.
#[derive(Debug, Clone)]
pub struct DenoiseOutput {
    pub wav_bytes: Vec<u8>,
    pub metadata: SpectralMetadata,
    pub sample_count: usize,
    pub sample_rate: u32,
}

pub struct DenoisePipeline {
    denoiser: Arc<dyn Denoiser>,
    frame_len: usize,
}

impl DenoisePipeline {
    pub fn new(denoiser: Arc<dyn Denoiser>, frame_len: usize) -> Self {
        Self { denoiser, frame_len }
    }

    /// Run the full chain on one upload.
    ///
    /// ## Errors:
    /// - **DecodeError**: the bytes are not a usable WAV file
    /// - **InferenceError**: the model failed or broke the same-length contract
    pub fn run(&self, wav_bytes: &[u8]) -> AppResult<DenoiseOutput> {
        let noisy = read_wav(wav_bytes)?;

        let plan = PaddingPlan::new(noisy.len(), self.frame_len);
        let padded = plan.pad(&noisy.samples);

        let inference_start = Instant::now();
        let enhanced_padded = self
            .denoiser
            .denoise(&padded)
            .map_err(|e| AppError::InferenceError(format!("{:#}", e)))?;

        if enhanced_padded.len() != padded.len() {
            return Err(AppError::InferenceError(format!(
                "model returned {} samples for an input of {}",
                enhanced_padded.len(),
                padded.len()
            )));
        }
        if enhanced_padded.iter().any(|s| !s.is_finite()) {
            return Err(AppError::InferenceError(
                "model returned non-finite samples".to_string(),
            ));
        }

        debug!(
            model = self.denoiser.name(),
            original_len = plan.original_len,
            padded_len = plan.padded_len(),
            inference_ms = inference_start.elapsed().as_millis() as u64,
            "Inference complete"
        );

        let enhanced = plan.reconstruct(&enhanced_padded);
        let wav_bytes = write_wav_bytes(&enhanced, noisy.sample_rate)?;
        let metadata = analyze_audio(&enhanced, noisy.sample_rate);

        Ok(DenoiseOutput {
            wav_bytes,
            metadata,
            sample_count: enhanced.len(),
            sample_rate: noisy.sample_rate,
        })
    }
}
