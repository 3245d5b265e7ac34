//! HTTP API for the tutor.
//!
//! Endpoints:
//!
//! - `GET  /health`              — Liveness and model state
//! - `POST /api/solve`           — Answer a question
//! - `POST /api/solve/stream`    — Answer a question as an SSE stream
//! - `POST /api/ai/test`         — Ask the model the fixed test question
//! - `POST /api/model/load`      — Start loading the model in the background
//! - `GET  /api/model/status`    — Current model state and status line
//! - `POST /api/ocr`             — Recognize a question in an image and answer it

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Json,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use mathtutor_core::AnswerSource;
use mathtutor_core::media::PlotSeries;
use mathtutor_tutor::{AI_TEST_QUESTION, Answer, EngineState, EngineStatus};

use crate::SharedState;

/// Build the API router.
pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/solve", post(solve_handler))
        .route("/api/solve/stream", post(solve_stream_handler))
        .route("/api/ai/test", post(ai_test_handler))
        .route("/api/model/load", post(model_load_handler))
        .route("/api/model/status", get(model_status_handler))
        .route("/api/ocr", post(ocr_handler))
        .with_state(state)
}

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SolveRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SolveResponse {
    pub answer: String,
    pub source: AnswerSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot: Option<PlotSeries>,
}

impl From<Answer> for SolveResponse {
    fn from(answer: Answer) -> Self {
        Self {
            answer: answer.text,
            source: answer.source,
            plot: answer.plot,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OcrResponse {
    /// Text recognized in the image, asked as the question
    pub question: String,
    #[serde(flatten)]
    pub solution: SolveResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    model: EngineState,
    uptime_secs: i64,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: error.into() }))
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        model: state.engine().state(),
        uptime_secs: (chrono::Utc::now() - state.start_time).num_seconds(),
    })
}

/// `POST /api/solve` — Answer a question and return the final answer.
async fn solve_handler(
    State(state): State<SharedState>,
    Json(payload): Json<SolveRequest>,
) -> Json<SolveResponse> {
    info!(chars = payload.question.len(), "api/solve request");
    let token = state.gate.supersede();
    let answer = state.tutor.solve(&payload.question, &token, None).await;
    Json(answer.into())
}

/// `POST /api/solve/stream` — Answer a question, streaming pipeline events.
///
/// The solve is cancelled when the client disconnects or a newer solve
/// request arrives.
async fn solve_stream_handler(
    State(state): State<SharedState>,
    Json(payload): Json<SolveRequest>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    info!(chars = payload.question.len(), "api/solve/stream SSE request");

    let token = state.gate.supersede();
    let (tx, rx) = mpsc::channel(64);

    let tutor = state.tutor.clone();
    let task_token = token.clone();
    tokio::spawn(async move {
        tutor.solve(&payload.question, &task_token, Some(&tx)).await;
    });

    // Dropping the stream (client gone) cancels the solve.
    let guard = token.drop_guard();
    let stream = ReceiverStream::new(rx).map(move |event| {
        let _ = &guard;
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event.event_type()).data(data))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// `POST /api/ai/test` — Ask the model directly, bypassing algebra.
async fn ai_test_handler(State(state): State<SharedState>) -> Json<SolveResponse> {
    let token = state.gate.supersede();
    let answer = state.tutor.ask_ai(AI_TEST_QUESTION, &token, None).await;
    Json(answer.into())
}

/// Start loading the configured model on a background task.
///
/// Repeated calls while a load is running (or after it finished) do
/// nothing beyond reporting the status.
pub fn spawn_model_load(state: &SharedState) {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        let outcome = state
            .engine()
            .load(state.loader.as_ref(), &state.config.model.name, None)
            .await;
        info!(?outcome, "Background model load finished");
    });
}

/// `POST /api/model/load` — Start loading; poll `/api/model/status` for progress.
async fn model_load_handler(
    State(state): State<SharedState>,
) -> (StatusCode, Json<EngineStatus>) {
    let status = state.engine().status();
    match status.state {
        EngineState::Ready | EngineState::Loading => (StatusCode::OK, Json(status)),
        EngineState::Unloaded | EngineState::Failed => {
            spawn_model_load(&state);
            (StatusCode::ACCEPTED, Json(status))
        }
    }
}

/// `GET /api/model/status`
async fn model_status_handler(State(state): State<SharedState>) -> Json<EngineStatus> {
    Json(state.engine().status())
}

/// `POST /api/ocr` — Raw image body; the recognized text becomes the question.
async fn ocr_handler(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<OcrResponse>, ApiError> {
    info!(bytes = body.len(), "api/ocr request");

    let question = state.recognizer.recognize(&body).await.map_err(|e| {
        warn!(error = %e, "OCR failed");
        api_error(StatusCode::UNPROCESSABLE_ENTITY, format!("OCR failed: {e}"))
    })?;

    if question.is_empty() {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "No text found in the image",
        ));
    }

    let token = state.gate.supersede();
    let answer = state.tutor.solve(&question, &token, None).await;
    Ok(Json(OcrResponse {
        question,
        solution: answer.into(),
    }))
}
