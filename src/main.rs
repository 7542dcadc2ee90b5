//! # Audio Denoise Backend - Main Application Entry Point
//!
//! Actix-web server exposing one operation: upload a WAV clip, get back a
//! noise-suppressed WAV clip plus spectral metadata.
//!
//! ## Startup Order:
//! 1. **.env and logging**: `dotenv`, then `tracing-subscriber` with `RUST_LOG`
//! 2. **Configuration**: defaults → config.toml → `APP_*` environment variables
//! 3. **Model**: one load attempt from the export directory. Failure is logged and
//!    the server still starts; denoise requests answer 503 until a restart
//! 4. **HTTP server**: CORS, request tracing, metrics, routes
//! 5. **Shutdown**: SIGINT/SIGTERM stop the server gracefully
//!
//! ## Application Architecture:
//! - **audio**: WAV codec, frame padding, spectral analysis
//! - **inference**: Denoiser trait, model handle, candle model, loader
//! - **pipeline**: The per-request decode → denoise → encode/analyze chain
//! - **handlers**: HTTP request handlers
//! - **state / config / error / health / middleware**: service plumbing

mod audio;       // WAV codec, padding, spectral metadata
mod config;      // Configuration management (config.rs)
mod device;      // Compute device selection
mod error;       // Error handling types (error.rs)
mod handlers;    // HTTP request handlers (handlers/ directory)
mod health;      // Health check endpoints (health.rs)
mod inference;   // Denoising model boundary
mod middleware;  // Custom middleware (middleware/ directory)
mod pipeline;    // Per-request processing chain
mod state;       // Application state management (state.rs)

use actix_cors::Cors;
use actix_web::{http::header, web, App, HttpServer};
use anyhow::Result;
use crate::config::{AppConfig, CorsConfig};
use handlers::denoise::METADATA_HEADER;
use state::AppState;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> Result<()> {
    // It's fine if there's no .env file
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    // The only load attempt; no retries while serving
    let model = inference::load_model(&config.model);
    if !model.is_ready() {
        warn!("Serving without a model; /denoise will return 503");
    }

    let app_state = AppState::new(config.clone(), model);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    info!("Starting HTTP server on {}", bind_addr);

    let cors_config = config.cors.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // Middleware executes in reverse order of registration for requests
            .wrap(build_cors(&cors_config))
            .wrap(TracingLogger::default())
            .wrap(middleware::MetricsMiddleware)
            .route("/denoise", web::post().to(handlers::denoise))
            .service(
                web::scope("/api/v1")
                    .route("/denoise", web::post().to(handlers::denoise))
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config)),
            )
            .route("/health", web::get().to(health::health_check))
    })
    .disable_signals()
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize tracing.
///
/// `RUST_LOG` controls what gets logged; without it we default to
/// `audio_denoise_backend=debug,actix_web=info`.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audio_denoise_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// CORS for the browser frontend.
///
/// The metadata header and the suggested filename must be exposed explicitly,
/// otherwise browsers hide them from the frontend's `fetch` response.
fn build_cors(config: &CorsConfig) -> Cors {
    let mut cors = Cors::default()
        .allow_any_method()
        .allow_any_header()
        .supports_credentials()
        .expose_headers([METADATA_HEADER, header::CONTENT_DISPOSITION.as_str()])
        .max_age(3600);

    for origin in &config.allowed_origins {
        if origin == "*" {
            cors = cors.allow_any_origin();
        } else {
            cors = cors.allowed_origin(origin);
        }
    }

    cors
}

/// Resolve when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to install unix signal handlers, falling back to Ctrl+C: {}", e);
            }
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C");
}
