//! Error types for the MathTutor domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; `TutorError` is the
//! umbrella the pipeline and the shells work with.

use thiserror::Error;

/// The top-level error type for tutor operations.
#[derive(Debug, Error)]
pub enum TutorError {
    // --- Input ---
    #[error("Please enter a question.")]
    EmptyInput,

    // --- Algebra / evaluation ---
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    // --- Language model ---
    #[error("AI model not loaded. Load the model first.")]
    ModelNotReady,

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Collaborators ---
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Request was superseded by a newer question")]
    Cancelled,

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, TutorError>;

// --- Bounded context errors ---

/// Raised by the algebra engine or the numeric evaluator.
///
/// Recovered locally: the pipeline falls back to the AI client and the
/// formatter inlines the message as an annotation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Undefined symbol {0}")]
    UndefinedSymbol(String),

    #[error("Unknown function {0}")]
    UnknownFunction(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Engine(String),
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Errors from the presentation-side collaborators (plotting, speech, OCR).
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} is not supported in this environment")]
    UnsupportedEnvironment(String),

    #[error("Failed to launch {program}: {reason}")]
    Launch { program: String, reason: String },

    #[error("{program} exited with status {code}: {stderr}")]
    CommandFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("Plotting failed: {0}")]
    Plot(String),

    #[error("Text recognition failed: {0}")]
    Recognition(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
