//! The MathTutor answer pipeline.
//!
//! A question goes through these stages, stopping at the first that answers:
//!
//! 1. **Empty check**: blank input gets "Please enter a question."
//! 2. **Plot**: `plot <expr>` samples the expression and hands it to the plotter
//! 3. **Algebra**: the [`AlgebraicResolver`] classifies the question and runs
//!    the engine; a meaningful result is labelled and returned
//! 4. **AI fallback**: the [`AiFallbackClient`] streams an answer from the
//!    loaded model and the [`OutputFormatter`] evaluates its directives
//!
//! The [`EngineHandle`] owns the single model session all requests share.

pub mod directive;
pub mod engine_handle;
pub mod fallback;
pub mod formatter;
pub mod intent;
pub mod pipeline;
pub mod plot;
pub mod resolver;

pub use directive::{Directive, DirectiveKind, DirectivePolicy, parse_directives};
pub use engine_handle::{EngineHandle, EngineState, EngineStatus, LoadOutcome, Session};
pub use fallback::{AiFallbackClient, FallbackReply, NOT_READY_MESSAGE, STREAM_ERROR_MESSAGE, SYSTEM_PROMPT};
pub use formatter::OutputFormatter;
pub use intent::Intent;
pub use pipeline::{AI_TEST_QUESTION, Answer, RequestGate, Tutor};
pub use resolver::AlgebraicResolver;
