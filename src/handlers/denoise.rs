//! # Denoise Endpoint
//!
//! `POST /denoise` (also `/api/v1/denoise`)
//!
//! ## Request:
//! Multipart form data with a WAV file in the field named "audio"
//!
//! ## Response (200):
//! - **Body**: denoised 16-bit PCM WAV (`audio/wav`)
//! - **Content-Disposition**: `attachment; filename="denoised_<upload name>"`
//! - **X-Audio-Metadata**: JSON spectral metadata, e.g.
//!   `{"dominantFrequencyHz":440.0,"centroidFrequencyHz":452.17,"rms":0.412,"durationSeconds":1.88}`
//!
//! ## Order of checks:
//! 1. Model readiness (503) before the upload is touched
//! 2. Form parsing and size limit (400)
//! 3. Decode (400), inference (500), encode and analysis

use crate::error::{AppError, AppResult};
use crate::pipeline::{DenoiseOutput, DenoisePipeline};
use crate::state::AppState;
use actix_multipart::{Field, Multipart};
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse};
use futures_util::stream::StreamExt;
use std::time::Instant;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

/// Response header carrying the serialized spectral metadata.
pub const METADATA_HEADER: &str = "X-Audio-Metadata";

/// Multipart field that holds the WAV file.
pub const AUDIO_FIELD: &str = "audio";

const DEFAULT_FILENAME: &str = "audio.wav";

/// An uploaded file read fully into memory.
#[derive(Debug)]
pub struct AudioUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Keeps `active_inferences` balanced even if the request future is dropped.
struct ActiveInference<'a>(&'a AppState);

impl<'a> ActiveInference<'a> {
    fn start(state: &'a AppState) -> Self {
        state.increment_active_inferences();
        Self(state)
    }
}

impl Drop for ActiveInference<'_> {
    fn drop(&mut self) {
        self.0.decrement_active_inferences();
    }
}

pub async fn denoise(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("denoise", %request_id);

    async move {
        let start_time = Instant::now();

        let Some(denoiser) = state.model.denoiser() else {
            warn!(model = ?state.model, "Rejecting request, model not loaded");
            return Err(AppError::ModelUnavailable("model not loaded".to_string()));
        };

        let config = state.get_config();
        let upload = read_audio_upload(payload, config.audio.max_upload_bytes).await?;
        info!(filename = %upload.filename, size_bytes = upload.bytes.len(), "Received upload");

        let _permit = state
            .inference_permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| AppError::Internal(format!("Inference queue closed: {}", e)))?;
        let _active = ActiveInference::start(&state);

        let pipeline = DenoisePipeline::new(denoiser, config.audio.frame_length);
        let bytes = upload.bytes;
        let output = web::block(in_request_span(move || pipeline.run(&bytes)))
            .await
            .map_err(|e| AppError::Internal(format!("Worker pool error: {}", e)))??;

        info!(
            samples = output.sample_count,
            sample_rate = output.sample_rate,
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Denoise complete"
        );

        assemble_response(&upload.filename, output)
    }
    .instrument(span)
    .await
}

/// Carry the current span and subscriber onto the blocking pool thread, so the
/// pipeline's log lines keep the request id.
fn in_request_span<F, R>(work: F) -> impl FnOnce() -> R + Send + 'static
where
    F: FnOnce() -> R + Send + 'static,
    R: 'static,
{
    let span = tracing::Span::current();
    let dispatch = tracing::dispatcher::get_default(|dispatch| dispatch.clone());
    move || tracing::dispatcher::with_default(&dispatch, || span.in_scope(work))
}

/// Package the WAV bytes and metadata into one HTTP response.
pub fn assemble_response(original_filename: &str, output: DenoiseOutput) -> AppResult<HttpResponse> {
    let metadata = serde_json::to_string(&output.metadata)?;

    Ok(HttpResponse::Ok()
        .content_type("audio/wav")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(format!(
                "denoised_{}",
                original_filename
            ))],
        })
        .insert_header((METADATA_HEADER, metadata))
        .body(output.wav_bytes))
}

/// Read the "audio" field of a multipart form, enforcing the upload limit.
pub async fn read_audio_upload(mut payload: Multipart, max_bytes: usize) -> AppResult<AudioUpload> {
    while let Some(item) = payload.next().await {
        let field: Field = item.map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?;

        let Some(content_disposition) = field.content_disposition() else {
            continue;
        };
        if content_disposition.get_name() != Some(AUDIO_FIELD) {
            continue;
        }

        let filename = content_disposition
            .get_filename()
            .map(sanitize_filename)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string());

        let bytes = read_field(field, max_bytes).await?;
        return Ok(AudioUpload { filename, bytes });
    }

    Err(AppError::BadRequest(format!(
        "No audio file provided in form field \"{}\"",
        AUDIO_FIELD
    )))
}

async fn read_field(mut field: Field, max_bytes: usize) -> AppResult<Vec<u8>> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Chunk error: {}", e)))?;
        if bytes.len() + chunk.len() > max_bytes {
            return Err(AppError::ValidationError(format!(
                "File too large (max: {} bytes)",
                max_bytes
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// Keep only the final path component and drop quotes and control characters.
fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    base.chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec::tests::wav_i16;
    use crate::audio::SpectralMetadata;
    use crate::config::AppConfig;
    use crate::inference::testing::{
        FailingDenoiser, IdentityDenoiser, OverlapTrackingDenoiser,
    };
    use crate::inference::{Denoiser, ModelHandle};
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, App};
    use std::io::Cursor;
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::registry::LookupSpan;
    use tracing_subscriber::Layer;

    /// Records the span names enclosing every event.
    struct ScopeRecorder(Arc<Mutex<Vec<Vec<String>>>>);

    impl<S> Layer<S> for ScopeRecorder
    where
        S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    {
        fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
            let names = ctx
                .event_scope(event)
                .map(|scope| scope.map(|span| span.name().to_string()).collect())
                .unwrap_or_default();
            self.0.lock().unwrap().push(names);
        }
    }

    const BOUNDARY: &str = "denoise-test-boundary";

    fn multipart(field: &str, filename: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: audio/wav\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn request(body: Vec<u8>) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/denoise")
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(body)
    }

    fn app_state(model: ModelHandle, max_concurrent: usize) -> AppState {
        let mut config = AppConfig::default();
        config.inference.max_concurrent = max_concurrent;
        AppState::new(config, model)
    }

    fn ready(denoiser: Arc<dyn Denoiser>) -> ModelHandle {
        ModelHandle::ready(denoiser)
    }

    macro_rules! service {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .route("/denoise", web::post().to(denoise)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_silent_clip_round_trip() {
        let app = service!(app_state(ready(Arc::new(IdentityDenoiser)), 4));
        let wav = wav_i16(&vec![0i16; 16_000], 1, 16_000);

        let resp = test::call_service(&app, request(multipart("audio", "clip.wav", &wav)).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "audio/wav");

        let disposition = resp.headers().get(header::CONTENT_DISPOSITION).unwrap();
        assert_eq!(disposition, "attachment; filename=\"denoised_clip.wav\"");

        let metadata: SpectralMetadata = serde_json::from_str(
            resp.headers().get(METADATA_HEADER).unwrap().to_str().unwrap(),
        )
        .unwrap();
        assert_eq!(metadata.duration_seconds, 1.0);
        assert_eq!(metadata.rms, 0.0);
        assert_eq!(metadata.dominant_frequency_hz, 0.0);

        let body = test::read_body(resp).await;
        let reader = hound::WavReader::new(Cursor::new(body.to_vec())).unwrap();
        assert_eq!(reader.len(), 16_000);
    }

    #[actix_web::test]
    async fn test_unaligned_clip_keeps_sample_count() {
        let app = service!(app_state(ready(Arc::new(IdentityDenoiser)), 4));
        let samples: Vec<i16> = (0..30_000).map(|i| ((i % 200) as i16 - 100) * 50).collect();
        let wav = wav_i16(&samples, 1, 16_000);

        let resp = test::call_service(&app, request(multipart("audio", "long.wav", &wav)).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = test::read_body(resp).await;
        let reader = hound::WavReader::new(Cursor::new(body.to_vec())).unwrap();
        assert_eq!(reader.len(), 30_000);
    }

    #[actix_web::test]
    async fn test_model_not_ready_returns_503_without_decoding() {
        let app = service!(app_state(ModelHandle::not_ready("no export dir"), 4));

        // Garbage upload: a decode attempt would produce 400, not 503
        let resp = test::call_service(&app, request(multipart("audio", "x.wav", b"garbage")).to_request()).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "model_unavailable");
        assert_eq!(body["error"]["message"], "Model unavailable: model not loaded");
    }

    #[actix_web::test]
    async fn test_undecodable_upload_returns_400() {
        let app = service!(app_state(ready(Arc::new(IdentityDenoiser)), 4));
        let resp = test::call_service(&app, request(multipart("audio", "x.wav", b"not a wav")).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "decode_error");
    }

    #[actix_web::test]
    async fn test_missing_audio_field_returns_400() {
        let app = service!(app_state(ready(Arc::new(IdentityDenoiser)), 4));
        let wav = wav_i16(&[1, 2, 3], 1, 16_000);
        let resp = test::call_service(&app, request(multipart("file", "x.wav", &wav)).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_inference_failure_returns_500() {
        let app = service!(app_state(ready(Arc::new(FailingDenoiser)), 4));
        let wav = wav_i16(&[100, -200, 300], 1, 16_000);

        let resp = test::call_service(&app, request(multipart("audio", "x.wav", &wav)).to_request()).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "inference_error");
    }

    #[actix_web::test]
    async fn test_single_permit_serializes_inference() {
        let tracker = Arc::new(OverlapTrackingDenoiser::default());
        let state = app_state(ready(tracker.clone()), 1);
        let app = service!(state.clone());
        let wav = wav_i16(&[100, -200, 300, -400], 1, 16_000);

        let responses = futures_util::future::join_all(
            (0..4).map(|_| test::call_service(&app, request(multipart("audio", "x.wav", &wav)).to_request())),
        )
        .await;

        assert!(responses.iter().all(|r| r.status() == StatusCode::OK));
        assert_eq!(tracker.calls.load(Ordering::SeqCst), 4);
        assert_eq!(tracker.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(state.get_metrics_snapshot().active_inferences, 0);
    }

    #[actix_web::test]
    async fn test_upload_over_limit_returns_400() {
        let mut config = AppConfig::default();
        config.audio.max_upload_bytes = 100;
        let app = service!(AppState::new(config, ready(Arc::new(IdentityDenoiser))));
        let wav = wav_i16(&vec![100i16; 1000], 1, 16_000);

        let resp = test::call_service(&app, request(multipart("audio", "big.wav", &wav)).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "validation_error");
    }

    #[actix_web::test]
    async fn test_blocking_work_keeps_request_span() {
        let scopes = Arc::new(Mutex::new(Vec::new()));
        let dispatch = tracing::Dispatch::new(
            tracing_subscriber::registry().with(ScopeRecorder(scopes.clone())),
        );

        let work = tracing::dispatcher::with_default(&dispatch, || {
            let span = tracing::info_span!("denoise", request_id = "req-1");
            let _entered = span.enter();
            in_request_span(|| tracing::debug!("on the worker"))
        });
        std::thread::spawn(work).join().unwrap();

        assert_eq!(*scopes.lock().unwrap(), vec![vec!["denoise".to_string()]]);
    }

    #[actix_web::test]
    async fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("clip.wav"), "clip.wav");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\a\"b.wav"), "ab.wav");
        assert_eq!(sanitize_filename("  \n "), "");
    }
}
