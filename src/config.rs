//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platforms)
//! 2. Environment variables (APP_SERVER__HOST, APP_MODEL__EXPORT_DIR, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! Nested keys are separated by a double underscore so that field names which contain
//! a single underscore (`export_dir`, `frame_length`) survive the mapping.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, cors, model, audio, inference)
/// keeps each concern small and lets the environment override one group at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub model: ModelConfig,
    pub audio: AudioConfig,
    pub inference: InferenceConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Browser origins allowed to call the denoise endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

/// Where the denoising model lives and how it is run.
///
/// ## Fields:
/// - `export_dir`: Directory holding the exported model. If it contains subdirectories,
///   the first one (by name) is used as the model directory.
/// - `weights_file`: Name of the safetensors file inside the model directory
/// - `device`: Compute device preference ("auto", "cpu", "cuda", "metal")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub export_dir: PathBuf,
    pub weights_file: String,
    pub device: String,
}

/// Audio handling limits.
///
/// `frame_length` is the fixed inference frame: every signal is padded to a multiple
/// of it before it reaches the denoiser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub frame_length: usize,
    pub max_upload_bytes: usize,
}

/// Inference concurrency.
///
/// `max_concurrent` bounds how many requests may be inside the denoiser at once.
/// Set it to 1 when the model must not be invoked concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub max_concurrent: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),  // Localhost only (safe for development)
                port: 8080,
            },
            cors: CorsConfig {
                allowed_origins: vec![
                    "http://localhost:3000".to_string(),
                    "https://final-denoiser.vercel.app".to_string(),
                ],
            },
            model: ModelConfig {
                export_dir: PathBuf::from("./denoiser_export"),
                weights_file: "model.safetensors".to_string(),
                device: "auto".to_string(),
            },
            audio: AudioConfig {
                frame_length: 32_000,              // 2 seconds at 16 kHz
                max_upload_bytes: 50 * 1024 * 1024, // 50MB
            },
            inference: InferenceConfig {
                max_concurrent: 4,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and PORT environment variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_MODEL__EXPORT_DIR=/models/denoiser`: Override the export directory
    /// - `APP_INFERENCE__MAX_CONCURRENT=1`: Serialize all inference calls
    /// - `PORT=3000`: Special case for deployment platforms
    pub fn load() -> Result<Self> {
        Self::load_from(env::vars().collect())
    }

    /// Same layering as [`AppConfig::load`], reading variables from `vars`.
    fn load_from(vars: config::Map<String, String>) -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors.allowed_origins")
                    .try_parsing(true)
                    .source(Some(vars.clone())),
            );

        if let Some(host) = vars.get("HOST") {
            settings = settings.set_override("server.host", host.as_str())?;
        }

        if let Some(port) = vars.get("PORT") {
            settings = settings.set_override("server.port", port.as_str())?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Frame length is positive (padding divides by it)
    /// - Upload limit and inference concurrency are positive
    /// - A weights file name is set
    /// - CORS origins are `*` or an http(s) URL
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.audio.frame_length == 0 {
            return Err(anyhow::anyhow!("Audio frame length must be greater than 0"));
        }

        if self.audio.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("Max upload size must be greater than 0"));
        }

        if self.inference.max_concurrent == 0 {
            return Err(anyhow::anyhow!("Max concurrent inferences must be greater than 0"));
        }

        if self.model.weights_file.trim().is_empty() {
            return Err(anyhow::anyhow!("Model weights file name cannot be empty"));
        }

        for origin in &self.cors.allowed_origins {
            let is_url = origin.starts_with("http://") || origin.starts_with("https://");
            if origin != "*" && !is_url {
                return Err(anyhow::anyhow!("Invalid CORS origin: {}", origin));
            }
        }

        Ok(())
    }
}
