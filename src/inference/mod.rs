//! # Inference Module
//!
//! The boundary between the audio pipeline and the noise-suppression model.
//!
//! ## Key Components:
//! - **Denoiser trait**: `denoise(signal) -> signal`, same length in and out
//! - **ModelHandle**: Ready/NotReady state, built once at startup and injected into
//!   every request through `AppState`
//! - **ConvDenoiser**: candle-backed convolutional model loaded from safetensors
//! - **Loader**: Locates the model inside the configured export directory
//!
//! ## Concurrency Contract:
//! Requests call into the same `Arc<dyn Denoiser>` from several blocking-pool threads
//! at once. Implementations must therefore be reentrant: `denoise` takes `&self`, keeps
//! no per-call state in the struct, and the trait requires `Send + Sync`. A model that
//! cannot honour this must be run with `inference.max_concurrent = 1`, which turns the
//! request-side semaphore into a strict serialization point.

pub mod conv;      // Convolutional denoiser on candle
pub mod loader;    // Model discovery and startup loading

pub use conv::ConvDenoiser;
pub use loader::load_model;

use anyhow::Result;
use std::sync::Arc;

/// A noise-suppression model.
///
/// `denoise` receives a signal whose length is a multiple of the configured frame
/// length and must return a signal of exactly the same length.
pub trait Denoiser: Send + Sync {
    /// Human-readable model name for logs and health output.
    fn name(&self) -> &str;

    fn denoise(&self, signal: &[f32]) -> Result<Vec<f32>>;
}

/// Process-wide model availability.
///
/// ## States:
/// - **Ready**: the model loaded and every request may use it
/// - **NotReady**: loading failed (or never happened); the reason is kept for the
///   503 message and the health endpoint
#[derive(Clone)]
pub enum ModelHandle {
    Ready(Arc<dyn Denoiser>),
    NotReady { reason: String },
}

impl ModelHandle {
    pub fn ready(denoiser: Arc<dyn Denoiser>) -> Self {
        ModelHandle::Ready(denoiser)
    }

    pub fn not_ready(reason: impl Into<String>) -> Self {
        ModelHandle::NotReady {
            reason: reason.into(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ModelHandle::Ready(_))
    }

    pub fn denoiser(&self) -> Option<Arc<dyn Denoiser>> {
        match self {
            ModelHandle::Ready(denoiser) => Some(Arc::clone(denoiser)),
            ModelHandle::NotReady { .. } => None,
        }
    }

    /// Status summary for the health endpoint.
    pub fn status_json(&self) -> serde_json::Value {
        match self {
            ModelHandle::Ready(denoiser) => serde_json::json!({
                "status": "loaded",
                "available": true,
                "model": denoiser.name(),
            }),
            ModelHandle::NotReady { reason } => serde_json::json!({
                "status": "not_loaded",
                "available": false,
                "reason": reason,
            }),
        }
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelHandle::Ready(denoiser) => f.debug_tuple("Ready").field(&denoiser.name()).finish(),
            ModelHandle::NotReady { reason } => {
                f.debug_struct("NotReady").field("reason", reason).finish()
            }
        }
    }
}
