use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Service health. Always 200 while the process is up; `status` is "degraded" when
/// the model failed to load, since every denoise request will then answer 503.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();

    let status = if state.model.is_ready() { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(json!({
        "status": status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "active_inferences": metrics.active_inferences
        },
        "memory": get_memory_info(),
        "model": state.model.status_json(),
        "inference": {
            "frame_length": config.audio.frame_length,
            "max_concurrent": config.inference.max_concurrent,
            "available_permits": state.inference_permits.available_permits()
        }
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();
    endpoint_stats.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "active_inferences": metrics.active_inferences,
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "endpoints": endpoint_stats,
        "memory": get_memory_info()
    }))
}

fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        let pid = std::process::id();
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            let mut vm_rss = 0;
            let mut vm_size = 0;

            for line in status.lines() {
                if let Some(rest) = line.strip_prefix("VmRSS:") {
                    vm_rss = parse_kb(rest);
                } else if let Some(rest) = line.strip_prefix("VmSize:") {
                    vm_size = parse_kb(rest);
                }
            }

            return json!({
                "resident_memory_bytes": vm_rss,
                "virtual_memory_bytes": vm_size,
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false,
        "note": "Memory info not available on this platform"
    })
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_kb(field: &str) -> u64 {
    field
        .split_whitespace()
        .next()
        .and_then(|kb| kb.parse::<u64>().ok())
        .unwrap_or(0)
        * 1024
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::inference::testing::IdentityDenoiser;
    use crate::inference::ModelHandle;
    use actix_web::{test, App};
    use std::sync::Arc;

    async fn health_body(model: ModelHandle) -> serde_json::Value {
        let state = AppState::new(AppConfig::default(), model);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/health", web::get().to(health_check)),
        )
        .await;
        let req = test::TestRequest::get().uri("/health").to_request();
        test::call_and_read_body_json(&app, req).await
    }

    #[actix_web::test]
    async fn test_health_reports_model_state() {
        let body = health_body(ModelHandle::ready(Arc::new(IdentityDenoiser))).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model"]["status"], "loaded");

        let body = health_body(ModelHandle::not_ready("missing")).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["model"]["available"], false);
    }

    #[actix_web::test]
    async fn test_parse_kb() {
        assert_eq!(parse_kb("   2048 kB"), 2048 * 1024);
        assert_eq!(parse_kb("garbage"), 0);
    }
}
