//! # Error Handling
//!
//! This module defines the error types of the denoise service and how they're converted
//! to HTTP responses.
//!
//! ## Key Rust Concepts for Error Handling:
//!
//! ### Enums for Error Types
//! - **Variants**: Each enum variant represents a different kind of failure
//! - **Data**: Each variant carries a human-readable message
//! - **Pattern matching**: `match` maps every variant to exactly one HTTP status
//!
//! ### Traits for Error Conversion
//! - **From trait**: Automatically converts library errors with `?`
//! - **ResponseError trait**: Converts errors to HTTP responses
//! - **Display trait**: Defines how errors are formatted as strings
//!
//! ## Pipeline failures:
//! The three pipeline failures are request-scoped. None of them touches process-wide
//! state, and a request that hits one never emits partial output.
//! - **ModelUnavailable** → 503, checked before any audio is read
//! - **DecodeError** → 400, the upload is not a usable WAV file
//! - **InferenceError** → 500, the denoiser failed or returned the wrong length

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the application.
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(AppError::DecodeError("no samples".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// The denoising model was never initialized (or failed to initialize)
    ModelUnavailable(String),

    /// The uploaded bytes are not a well-formed, non-empty WAV container
    DecodeError(String),

    /// The denoiser raised or returned output of unexpected length
    InferenceError(String),

    /// Internal server errors (worker pool failures, encoding failures, etc.)
    Internal(String),

    /// Client sent a malformed request (bad multipart form, missing field)
    BadRequest(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// User input failed validation rules (e.g. upload too large)
    ValidationError(String),
}

impl AppError {
    /// Machine-readable error type used in the JSON body.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::ModelUnavailable(_) => "model_unavailable",
            AppError::DecodeError(_) => "decode_error",
            AppError::InferenceError(_) => "inference_error",
            AppError::Internal(_) => "internal_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::ConfigError(_) => "config_error",
            AppError::ValidationError(_) => "validation_error",
        }
    }
}

/// Implementation of the Display trait for AppError.
///
/// ## Purpose:
/// This trait defines how errors are formatted as human-readable strings.
/// It's used in log lines and whenever an error is converted to a string.
impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ModelUnavailable(msg) => write!(f, "Model unavailable: {}", msg),
            AppError::DecodeError(msg) => write!(f, "Invalid WAV data: {}", msg),
            AppError::InferenceError(msg) => write!(f, "Inference failed: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Implementation of the ResponseError trait for AppError.
///
/// ## HTTP Status Code Mapping:
/// - ModelUnavailable → 503 (Service Unavailable)
/// - DecodeError/BadRequest/ValidationError → 400 (Bad Request)
/// - InferenceError/Internal/ConfigError → 500 (Internal Server Error)
///
/// ## JSON Response Format:
/// All errors return JSON with a consistent structure:
/// ```json
/// {
///   "error": {
///     "type": "decode_error",
///     "message": "Invalid WAV data: no RIFF tag found",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DecodeError(_)
            | AppError::BadRequest(_)
            | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::InferenceError(_) | AppError::Internal(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": self.error_type(),               // Machine-readable error type
                "message": self.to_string(),             // Human-readable error message
                "timestamp": chrono::Utc::now().to_rfc3339()  // When the error occurred
            }
        }))
    }
}

/// Automatic conversion from anyhow::Error to AppError.
///
/// ## Usage:
/// When you use `?` with an anyhow::Error inside a handler, it becomes an
/// AppError::Internal. Pipeline stages map their failures explicitly instead, so
/// that decode and inference problems keep their own status codes.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{:#}", err))
    }
}

/// JSON serialization only happens on our own metadata, so a failure is a server bug.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON serialization error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;
