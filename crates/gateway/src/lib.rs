//! HTTP API gateway for MathTutor.
//!
//! Exposes the answer pipeline, model loading and OCR as JSON/SSE
//! endpoints and serves the embedded browser frontend.
//!
//! Built on Axum for high performance async HTTP.

pub mod api;
pub mod frontend;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use mathtutor_config::AppConfig;
use mathtutor_core::error::TutorError;
use mathtutor_core::media::TextRecognizer;
use mathtutor_core::provider::ModelLoader;
use mathtutor_media::TesseractRecognizer;
use mathtutor_tutor::{EngineHandle, RequestGate, Tutor};

/// Request bodies may carry images.
pub const BODY_LIMIT_BYTES: usize = 8 * 1024 * 1024;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub tutor: Arc<Tutor>,
    pub loader: Arc<dyn ModelLoader>,
    pub recognizer: Arc<dyn TextRecognizer>,
    /// Newest solve wins: each solve request supersedes the previous one.
    pub gate: RequestGate,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl GatewayState {
    /// Build state from configuration with the bundled engine, the
    /// configured model loader and Tesseract OCR.
    pub fn from_config(config: AppConfig) -> Result<Self, TutorError> {
        let engine = Arc::new(EngineHandle::new());
        let tutor = Tutor::from_config(&config, engine)?;
        Ok(Self {
            loader: mathtutor_providers::build_loader(&config.model),
            recognizer: Arc::new(TesseractRecognizer::from_config(&config.ocr)),
            tutor: Arc::new(tutor),
            gate: RequestGate::new(),
            start_time: chrono::Utc::now(),
            config,
        })
    }

    pub fn engine(&self) -> &Arc<EngineHandle> {
        self.tutor.engine()
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the full router: API, embedded frontend, and the shared layers.
///
/// - Request body size limit (8 MB)
/// - CORS for pages served from localhost
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            |origin: &HeaderValue, _parts: &axum::http::request::Parts| is_local_origin(origin),
        ))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    api::api_router(state)
        .merge(frontend::frontend_router())
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn is_local_origin(origin: &HeaderValue) -> bool {
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    let host = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
        .unwrap_or("");
    let host = host.rsplit_once(':').map_or(host, |(name, _port)| name);
    matches!(host, "localhost" | "127.0.0.1" | "[::1]")
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let autoload = config.model.autoload;

    let state = Arc::new(GatewayState::from_config(config)?);
    if autoload {
        api::spawn_model_load(&state);
    }

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
