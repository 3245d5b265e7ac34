//! OpenAI-compatible provider implementation.
//!
//! Works with any server exposing `/v1/chat/completions`: Ollama,
//! llama.cpp server, vLLM, LM Studio, OpenAI itself.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Model listing and health checks

use async_trait::async_trait;
use futures::StreamExt;
use mathtutor_core::error::ProviderError;
use mathtutor_core::message::Message;
use mathtutor_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().into(),
                content: Some(m.content.clone()),
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }

        body
    }

    /// Map non-200 statuses to provider errors.
    async fn check_status(
        response: reqwest::Response,
    ) -> std::result::Result<reqwest::Response, ProviderError> {
        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status == 404 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ModelNotFound(error_body));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request, false);

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        let response = Self::check_status(response).await?;

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice =
            api_response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::ApiError {
                    status_code: 200,
                    message: "No choices in response".into(),
                })?;

        Ok(ProviderResponse {
            message: Message::assistant(choice.message.content.unwrap_or_default()),
            usage: api_response.usage.map(ApiUsage::into_usage),
            model: api_response.model,
        })
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(model_ids(&body))
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request, true);

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        let response = Self::check_status(response).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // Read the SSE byte stream and forward parsed chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for event in decoder.push(&bytes) {
                    match event {
                        SseEvent::Chunk(chunk) => {
                            let done = chunk.done;
                            if tx.send(Ok(chunk)).await.is_err() {
                                return; // receiver dropped
                            }
                            if done {
                                return;
                            }
                        }
                        SseEvent::Unparseable { data, error } => {
                            trace!(
                                provider = %provider_name,
                                data = %data,
                                error = %error,
                                "Ignoring unparseable SSE chunk"
                            );
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(StreamChunk::finished(None))).await;
        });

        Ok(rx)
    }
}

/// Extract `data[].id` from a `/models` listing.
fn model_ids(body: &serde_json::Value) -> Vec<String> {
    body["data"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|m| m["id"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

// --- SSE decoding ---

#[derive(Debug)]
enum SseEvent {
    Chunk(StreamChunk),
    Unparseable { data: String, error: String },
}

/// Splits an SSE byte stream into lines and turns `data:` payloads into
/// stream chunks. Partial lines are buffered as raw bytes across `push`
/// calls, so a character split between network reads decodes intact.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw[..line_end]);
            let line = line.trim_end_matches('\r');

            // Skip empty lines and SSE comments
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();

            // "[DONE]" signals end of stream
            if data == "[DONE]" {
                events.push(SseEvent::Chunk(StreamChunk::finished(None)));
                continue;
            }

            match serde_json::from_str::<StreamResponse>(data) {
                Ok(stream_resp) => {
                    if let Some(choice) = stream_resp.choices.first() {
                        let has_content = choice.delta.content.as_ref().is_some_and(|c| !c.is_empty());
                        if has_content {
                            events.push(SseEvent::Chunk(StreamChunk {
                                content: choice.delta.content.clone(),
                                done: false,
                                usage: None,
                            }));
                        }
                    }

                    // Usage arrives in the final chunk (stream_options)
                    if let Some(usage) = stream_resp.usage {
                        events.push(SseEvent::Chunk(StreamChunk::finished(Some(usage.into_usage()))));
                    }
                }
                Err(e) => events.push(SseEvent::Unparseable {
                    data: data.to_string(),
                    error: e.to_string(),
                }),
            }
        }

        events
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl ApiUsage {
    fn into_usage(self) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
        }
    }
}

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(events: &[SseEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                SseEvent::Chunk(c) => c.content.clone(),
                SseEvent::Unparseable { .. } => None,
            })
            .collect()
    }

    #[test]
    fn ollama_constructor() {
        let provider = OpenAiCompatProvider::ollama(None);
        assert_eq!(provider.name(), "ollama");
        assert!(provider.base_url().contains("localhost:11434"));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let provider = OpenAiCompatProvider::new("llamacpp", "http://127.0.0.1:8080/v1/", "none");
        assert_eq!(provider.base_url(), "http://127.0.0.1:8080/v1");
    }

    #[test]
    fn message_conversion() {
        let messages = vec![Message::system("You are a math tutor"), Message::user("2+2?")];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
    }

    #[test]
    fn request_body_carries_sampling_settings() {
        let request = ProviderRequest {
            model: "phi3:mini".into(),
            messages: vec![Message::user("hi")],
            temperature: 0.5,
            max_tokens: Some(512),
            stream: true,
            stop: vec![],
        };
        let body = OpenAiCompatProvider::request_body(&request, true);
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert!(body.get("stop").is_none());
    }

    #[test]
    fn decoder_emits_content_in_order() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(
            concat!(
                "data: {\"choices\":[{\"delta\":{\"content\":\"The\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\" sum\"}}]}\n\n",
            )
            .as_bytes(),
        );
        assert_eq!(texts(&events), vec!["The", " sum"]);
    }

    #[test]
    fn decoder_buffers_partial_lines() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"choices\":[{\"delta\":{\"con").is_empty());
        let events = decoder.push(b"tent\":\"Hello\"}}]}\r\n");
        assert_eq!(texts(&events), vec!["Hello"]);
    }

    #[test]
    fn decoder_keeps_characters_split_across_reads() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"\u{3c0}r\u{b2}\"}}]}\n";
        let bytes = line.as_bytes();
        let split = line.find('\u{3c0}').unwrap() + 1;

        let mut decoder = SseDecoder::default();
        assert!(decoder.push(&bytes[..split]).is_empty());
        let events = decoder.push(&bytes[split..]);
        assert_eq!(texts(&events), vec!["\u{3c0}r\u{b2}"]);
    }

    #[test]
    fn decoder_done_marker() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b": keep-alive\ndata: [DONE]\n");
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], SseEvent::Chunk(c) if c.done));
    }

    #[test]
    fn decoder_usage_chunk_finishes() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(
            b"data: {\"choices\":[],\"usage\":{\"prompt_tokens\":10,\"completion_tokens\":5,\"total_tokens\":15}}\n",
        );
        match &events[..] {
            [SseEvent::Chunk(c)] => {
                assert!(c.done);
                assert_eq!(c.usage.as_ref().map(|u| u.total_tokens), Some(15));
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn decoder_skips_empty_deltas_and_reports_garbage() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b"data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\ndata: {oops\n");
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SseEvent::Unparseable { .. }));
    }

    #[test]
    fn model_listing() {
        let body = serde_json::json!({"data": [{"id": "phi3:mini"}, {"id": "llama3.2"}]});
        assert_eq!(model_ids(&body), vec!["phi3:mini", "llama3.2"]);
        assert!(model_ids(&serde_json::json!({})).is_empty());
    }
}
