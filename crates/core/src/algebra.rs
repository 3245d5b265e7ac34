//! Algebra engine and numeric evaluator contracts.
//!
//! The engine speaks text in and text out, and signals "no symbolic answer"
//! with sentinel strings. Those sentinels are translated into
//! [`AlgebraicResult::Empty`] at the resolver boundary; nothing past it
//! compares against magic strings.

use crate::error::EvaluationError;

/// Sentinel for an empty list answer (`roots` with no real roots).
pub const EMPTY_LIST: &str = "[]";

/// Sentinel for an empty tuple answer.
pub const EMPTY_TUPLE: &str = "()";

/// Marker emitted when the engine has no value for an expression.
pub const UNDEFINED: &str = "undefined";

/// A computer-algebra engine.
///
/// Commands understood by the resolver and the formatter:
/// `integral(E)`, `d(E)`, `roots(E)`, `solve(E, x)`, plus any bare
/// expression for generic evaluation.
pub trait AlgebraEngine: Send + Sync {
    /// Run a command or expression and return the engine's canonical text.
    fn run(&self, input: &str) -> Result<String, EvaluationError>;
}

/// A general numeric/symbolic expression evaluator.
pub trait Evaluator: Send + Sync {
    /// Evaluate a closed expression and render the value as text.
    fn evaluate(&self, expression: &str) -> Result<String, EvaluationError>;

    /// Evaluate `expression` with `variable` bound to `value`.
    fn evaluate_at(
        &self,
        expression: &str,
        variable: &str,
        value: f64,
    ) -> Result<f64, EvaluationError>;
}

/// The outcome of an algebraic attempt, with sentinels already removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlgebraicResult {
    /// A meaningful answer.
    Answer(String),
    /// The engine produced no symbolic answer.
    Empty,
}

impl AlgebraicResult {
    /// Classify raw engine output.
    ///
    /// A result is meaningful iff it is non-blank and not one of the
    /// empty sentinels or the undefined marker.
    pub fn from_engine(raw: &str) -> Self {
        if is_sentinel(raw) {
            Self::Empty
        } else {
            Self::Answer(raw.trim().to_string())
        }
    }

    pub fn is_meaningful(&self) -> bool {
        matches!(self, Self::Answer(_))
    }

    pub fn answer(&self) -> Option<&str> {
        match self {
            Self::Answer(text) => Some(text),
            Self::Empty => None,
        }
    }
}

/// True when `raw` carries no symbolic answer.
pub fn is_sentinel(raw: &str) -> bool {
    let raw = raw.trim();
    raw.is_empty() || raw == EMPTY_LIST || raw == EMPTY_TUPLE || raw == UNDEFINED
}

/// True when `raw` is specifically one of the two empty-collection forms.
pub fn is_empty_collection(raw: &str) -> bool {
    let raw = raw.trim();
    raw == EMPTY_LIST || raw == EMPTY_TUPLE
}
