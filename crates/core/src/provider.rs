//! Provider trait — the abstraction over language-model backends.
//!
//! A Provider knows how to send a chat to a model and get a response
//! back, either as a complete message or as a stream of text fragments.
//! A `ModelLoader` brings a provider into existence, reporting progress
//! while weights are fetched or a server connection is verified.
//!
//! Implementations: OpenAI-compatible servers (Ollama, llama.cpp, vLLM)
//! and in-process Candle inference.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::Message;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "phi3:mini", "tinyllama")
    pub model: String,

    /// The chat messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

fn default_temperature() -> f32 {
    0.5
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single fragment of a streaming response.
///
/// Fragments concatenate, in arrival order, to the full response. The
/// sequence ends with a chunk whose `done` flag is set (or when the
/// channel closes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    /// A content-bearing, non-final chunk.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            done: false,
            usage: None,
        }
    }

    /// The terminal chunk.
    pub fn finished(usage: Option<Usage>) -> Self {
        Self {
            content: None,
            done: true,
            usage,
        }
    }
}

/// Receiving half of a response stream.
pub type ChunkReceiver =
    tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>;

/// The core Provider trait.
///
/// The fallback client calls `stream()` without knowing which backend
/// is answering.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "ollama", "local").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as a single chunk.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let response = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(2);
        let _ = tx.send(Ok(StreamChunk::text(response.message.content))).await;
        let _ = tx.send(Ok(StreamChunk::finished(response.usage))).await;
        Ok(rx)
    }

    /// List available models for this provider.
    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

/// A progress report emitted while a model loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadProgress {
    /// Human-readable status line
    pub text: String,

    /// Completion fraction in `[0, 1]`, when the loader knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fraction: Option<f32>,
}

impl LoadProgress {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            fraction: None,
        }
    }

    pub fn with_fraction(mut self, fraction: f32) -> Self {
        self.fraction = Some(fraction.clamp(0.0, 1.0));
        self
    }
}

/// Callback receiving load progress reports.
pub type ProgressSink = Arc<dyn Fn(LoadProgress) + Send + Sync>;

/// Brings a provider for a named model into a ready state.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Short backend label for status messages ("remote", "local").
    fn backend(&self) -> &str;

    /// Load `model`, reporting progress through `progress`.
    async fn load(
        &self,
        model: &str,
        progress: ProgressSink,
    ) -> std::result::Result<Arc<dyn Provider>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(ProviderResponse {
                message: Message::assistant(last),
                usage: None,
                model: request.model,
            })
        }
    }

    #[test]
    fn provider_request_defaults() {
        let json = r#"{"model":"phi3:mini","messages":[]}"#;
        let req: ProviderRequest = serde_json::from_str(json).unwrap();
        assert!((req.temperature - 0.5).abs() < f32::EPSILON);
        assert!(!req.stream);
        assert!(req.max_tokens.is_none());
    }

    #[tokio::test]
    async fn default_stream_wraps_completion() {
        let request = ProviderRequest {
            model: "m".into(),
            messages: vec![Message::user("hello")],
            temperature: 0.5,
            max_tokens: None,
            stream: true,
            stop: vec![],
        };
        let mut rx = EchoProvider.stream(request).await.unwrap();

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.content.as_deref(), Some("hello"));
        assert!(!first.done);

        let last = rx.recv().await.unwrap().unwrap();
        assert!(last.done);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn load_progress_fraction_is_clamped() {
        let p = LoadProgress::new("Fetching weights").with_fraction(1.7);
        assert_eq!(p.fraction, Some(1.0));
    }
}
