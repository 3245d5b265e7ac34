//! # MathTutor Core
//!
//! Domain types, collaborator traits, and error definitions for the
//! MathTutor answer pipeline. This crate has **zero framework
//! dependencies**: it defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every external capability (algebra engine, evaluator, language model,
//! plotting, speech, OCR) is a trait here. Implementations live in their
//! respective crates, so the pipeline can be tested with scripted stubs.

pub mod algebra;
pub mod error;
pub mod event;
pub mod media;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use algebra::{AlgebraEngine, AlgebraicResult, Evaluator};
pub use error::{EvaluationError, MediaError, ProviderError, Result, TutorError};
pub use event::{AnswerSource, Stage, TutorStreamEvent};
pub use media::{Plotter, PlotDomain, PlotPoint, PlotSeries, SpeechInput, SpeechOutput, TextRecognizer};
pub use message::{Message, Role};
pub use provider::{LoadProgress, ModelLoader, ProgressSink, Provider, ProviderRequest, ProviderResponse, StreamChunk};
