//! Streaming events emitted while a question is being answered.
//!
//! Shells render these as they arrive: the CLI prints a spinner line,
//! the gateway forwards them over SSE.
//!
//! - `stage`  — the pipeline moved to a new stage
//! - `chunk`  — partial text from the model
//! - `done`   — the final answer
//! - `error`  — something failed (the answer still arrives via `done`)

use serde::{Deserialize, Serialize};

/// Where a final answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    /// Blank question
    EmptyInput,
    /// `plot` command
    Plot,
    /// The algebra engine answered
    Algebra,
    /// The language model answered
    Ai,
    /// The model was not loaded
    ModelNotReady,
    /// The model stream failed
    AiError,
    /// Superseded by a newer request
    Cancelled,
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Plot,
    Algebra,
    AiFallback,
    Formatting,
}

/// Events emitted during one solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TutorStreamEvent {
    /// Entered a pipeline stage.
    Stage { stage: Stage },

    /// Partial model text; `accumulated` is everything received so far.
    Chunk { content: String, accumulated: String },

    /// The final answer.
    Done {
        answer: String,
        source: AnswerSource,
    },

    /// A recoverable error occurred.
    Error { message: String },
}

impl TutorStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Stage { .. } => "stage",
            Self::Chunk { .. } => "chunk",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}
