//! # Model Discovery and Loading
//!
//! Runs exactly once, before the server starts accepting traffic.
//!
//! ## Loading Process:
//! 1. List the configured export directory
//! 2. If it contains subdirectories, use the first one (sorted by name) as the
//!    model directory; otherwise use the export directory itself
//! 3. Load `<model dir>/<weights_file>` onto the configured device
//!
//! Any failure yields `ModelHandle::NotReady`; the caller keeps serving and every
//! denoise request answers 503 until the process is restarted with a valid model.

use crate::config::ModelConfig;
use crate::device::{create_device_from_string, DeviceManager};
use crate::inference::{ConvDenoiser, Denoiser, ModelHandle};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Locate the directory that holds the model inside `export_dir`.
pub fn resolve_model_dir(export_dir: &Path) -> Result<PathBuf> {
    let entries = std::fs::read_dir(export_dir)
        .with_context(|| format!("Cannot read model export directory {}", export_dir.display()))?;

    let mut subdirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            subdirs.push(entry.path());
        }
    }
    subdirs.sort();

    Ok(subdirs.into_iter().next().unwrap_or_else(|| export_dir.to_path_buf()))
}

/// Try to load the configured model; never fails, reports state instead.
pub fn load_model(config: &ModelConfig) -> ModelHandle {
    let start_time = Instant::now();

    match try_load(config) {
        Ok((denoiser, path)) => {
            info!(
                model = denoiser.name(),
                layers = denoiser.num_layers(),
                path = %path.display(),
                "Model loaded in {:.2}s",
                start_time.elapsed().as_secs_f64()
            );
            ModelHandle::ready(Arc::new(denoiser))
        }
        Err(e) => {
            error!(
                export_dir = %config.export_dir.display(),
                "Model load failed, denoise requests will return 503: {:#}",
                e
            );
            ModelHandle::not_ready(format!("{:#}", e))
        }
    }
}

fn try_load(config: &ModelConfig) -> Result<(ConvDenoiser, PathBuf)> {
    let model_dir = resolve_model_dir(&config.export_dir)?;
    let weights_path = model_dir.join(&config.weights_file);

    let device = create_device_from_string(&config.device);
    info!(
        path = %weights_path.display(),
        device = DeviceManager::describe(&device),
        "Loading denoising model"
    );

    let denoiser = ConvDenoiser::load(&weights_path, &device)?;
    Ok((denoiser, weights_path))
}
