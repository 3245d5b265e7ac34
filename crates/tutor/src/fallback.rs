//! AI Fallback Client — asks the loaded model when algebra has no answer.

use std::sync::Arc;

use mathtutor_core::error::TutorError;
use mathtutor_core::message::Message;
use mathtutor_core::provider::ProviderRequest;
use mathtutor_core::{AnswerSource, TutorStreamEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine_handle::{EngineHandle, Session};
use crate::formatter::OutputFormatter;

/// Tutor persona sent ahead of every question.
pub const SYSTEM_PROMPT: &str = "You are a friendly and helpful math tutor bot. Explain concepts clearly. \
If a calculation is needed, phrase it in a way that can be easily parsed by a separate calculator \
(e.g., 'The sum is [CALCULATION: 2 + 2]', 'The solution for x is [SOLVE: 2*x + 5 = 11]'). \
Do not calculate yourself unless explicitly asked for a simple concept explanation.";

/// Answer when the model has not been loaded.
pub const NOT_READY_MESSAGE: &str = "AI model not loaded. Load the model first.";

/// Answer when the chat stream fails to open or breaks.
pub const STREAM_ERROR_MESSAGE: &str = "Sorry, the AI encountered an error.";

/// Answer when a newer question superseded this one.
pub const CANCELLED_MESSAGE: &str = "Request was superseded by a newer question.";

/// Result of one fallback call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackReply {
    pub text: String,
    pub source: AnswerSource,
}

impl FallbackReply {
    fn new(text: impl Into<String>, source: AnswerSource) -> Self {
        Self {
            text: text.into(),
            source,
        }
    }
}

pub struct AiFallbackClient {
    engine: Arc<EngineHandle>,
    formatter: OutputFormatter,
    system_prompt: String,
    temperature: f32,
    max_tokens: u32,
}

impl AiFallbackClient {
    pub fn new(engine: Arc<EngineHandle>, formatter: OutputFormatter) -> Self {
        Self {
            engine,
            formatter,
            system_prompt: SYSTEM_PROMPT.to_string(),
            temperature: 0.5,
            max_tokens: 512,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn engine(&self) -> &Arc<EngineHandle> {
        &self.engine
    }

    /// The chat request for `question`: system prompt, then the question.
    pub fn request(&self, model: &str, question: &str) -> ProviderRequest {
        ProviderRequest {
            model: model.to_string(),
            messages: vec![Message::system(&self.system_prompt), Message::user(question)],
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
            stream: true,
            stop: vec![],
        }
    }

    /// Stream an answer and format it. Never fails: every error becomes
    /// one of the fixed messages above.
    ///
    /// Each received fragment is reported on `events` as a
    /// [`TutorStreamEvent::Chunk`].
    pub async fn generate(
        &self,
        question: &str,
        token: &CancellationToken,
        events: Option<&mpsc::Sender<TutorStreamEvent>>,
    ) -> FallbackReply {
        let Some(session) = self.engine.session() else {
            debug!("Fallback requested before the model was loaded");
            return FallbackReply::new(NOT_READY_MESSAGE, AnswerSource::ModelNotReady);
        };

        match self.stream_text(&session, question, token, events).await {
            Ok(raw) => FallbackReply::new(self.formatter.format(&raw), AnswerSource::Ai),
            Err(TutorError::Cancelled) => {
                debug!("Fallback stream cancelled");
                FallbackReply::new(CANCELLED_MESSAGE, AnswerSource::Cancelled)
            }
            Err(e) => {
                warn!(provider = session.provider.name(), error = %e, "AI fallback failed");
                FallbackReply::new(STREAM_ERROR_MESSAGE, AnswerSource::AiError)
            }
        }
    }

    /// Concatenate the streamed fragments in arrival order.
    async fn stream_text(
        &self,
        session: &Session,
        question: &str,
        token: &CancellationToken,
        events: Option<&mpsc::Sender<TutorStreamEvent>>,
    ) -> Result<String, TutorError> {
        let request = self.request(&session.model, question);
        let mut rx = tokio::select! {
            _ = token.cancelled() => return Err(TutorError::Cancelled),
            opened = session.provider.stream(request) => opened?,
        };

        let mut accumulated = String::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(TutorError::Cancelled),
                next = rx.recv() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk?;

            if let Some(content) = chunk.content.filter(|c| !c.is_empty()) {
                accumulated.push_str(&content);
                if let Some(events) = events {
                    let _ = events
                        .send(TutorStreamEvent::Chunk {
                            content,
                            accumulated: accumulated.clone(),
                        })
                        .await;
                }
            }
            if chunk.done {
                break;
            }
        }

        debug!(chars = accumulated.len(), "AI response assembled");
        Ok(accumulated)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::directive::DirectivePolicy;
    use async_trait::async_trait;
    use mathtutor_cas::{NumericEvaluator, SymbolicEngine};
    use mathtutor_core::error::ProviderError;
    use mathtutor_core::provider::{ChunkReceiver, Provider, ProviderResponse, StreamChunk};
    use std::sync::Mutex;

    /// Streams scripted fragments and records every request.
    pub(crate) struct ScriptedProvider {
        pub fragments: Vec<Result<&'static str, ProviderError>>,
        pub fail_open: bool,
        pub hang: bool,
        pub requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        pub fn new(fragments: &[&'static str]) -> Self {
            Self {
                fragments: fragments.iter().map(|f| Ok(*f)).collect(),
                fail_open: false,
                hang: false,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(ProviderResponse {
                message: Message::assistant(self.fragments.iter().flatten().copied().collect::<String>()),
                usage: None,
                model: request.model,
            })
        }

        async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
            self.requests.lock().unwrap().push(request);
            if self.fail_open {
                return Err(ProviderError::Network("connection refused".into()));
            }
            let (tx, rx) = mpsc::channel(self.fragments.len() + 1);
            for fragment in &self.fragments {
                let item = fragment.clone().map(StreamChunk::text);
                tx.send(item).await.unwrap();
            }
            if self.hang {
                // keep the sender alive so the stream never ends
                tokio::spawn(async move {
                    tx.closed().await;
                });
            } else {
                tx.send(Ok(StreamChunk::finished(None))).await.unwrap();
            }
            Ok(rx)
        }
    }

    pub(crate) fn formatter() -> OutputFormatter {
        OutputFormatter::new(
            Arc::new(NumericEvaluator::new()),
            Arc::new(SymbolicEngine::new()),
            DirectivePolicy::CalculationFirst,
        )
    }

    fn client_with(provider: Arc<ScriptedProvider>) -> AiFallbackClient {
        let engine = Arc::new(EngineHandle::with_provider(provider, "phi3:mini"));
        AiFallbackClient::new(engine, formatter())
    }

    #[tokio::test]
    async fn not_ready_issues_no_request() {
        let client = AiFallbackClient::new(Arc::new(EngineHandle::new()), formatter());
        let reply = client.generate("What is pi?", &CancellationToken::new(), None).await;
        assert_eq!(reply.text, NOT_READY_MESSAGE);
        assert_eq!(reply.source, AnswerSource::ModelNotReady);
    }

    #[tokio::test]
    async fn chunks_are_assembled_and_formatted() {
        let provider = Arc::new(ScriptedProvider::new(&["The", " sum", " is [CALCULATION: 2 + 2]"]));
        let client = client_with(provider.clone());
        let (tx, mut rx) = mpsc::channel(16);

        let reply = client
            .generate("What is two plus two?", &CancellationToken::new(), Some(&tx))
            .await;

        assert_eq!(reply.text, "The sum is **4**");
        assert_eq!(reply.source, AnswerSource::Ai);

        drop(tx);
        let mut accumulated = Vec::new();
        while let Some(event) = rx.recv().await {
            if let TutorStreamEvent::Chunk { accumulated: acc, .. } = event {
                accumulated.push(acc);
            }
        }
        assert_eq!(
            accumulated,
            vec!["The", "The sum", "The sum is [CALCULATION: 2 + 2]"]
        );
    }

    #[tokio::test]
    async fn request_shape() {
        let provider = Arc::new(ScriptedProvider::new(&["ok"]));
        let client = client_with(provider.clone());
        client.generate("Why?", &CancellationToken::new(), None).await;

        let requests = provider.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.model, "phi3:mini");
        assert_eq!(request.messages, vec![Message::system(SYSTEM_PROMPT), Message::user("Why?")]);
        assert!((request.temperature - 0.5).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, Some(512));
        assert!(request.stream);
    }

    #[tokio::test]
    async fn open_failure_is_apology() {
        let mut provider = ScriptedProvider::new(&[]);
        provider.fail_open = true;
        let client = client_with(Arc::new(provider));
        let reply = client.generate("q", &CancellationToken::new(), None).await;
        assert_eq!(reply.text, STREAM_ERROR_MESSAGE);
        assert_eq!(reply.source, AnswerSource::AiError);
    }

    #[tokio::test]
    async fn mid_stream_failure_is_apology() {
        let mut provider = ScriptedProvider::new(&["partial"]);
        provider
            .fragments
            .push(Err(ProviderError::StreamInterrupted("reset".into())));
        let client = client_with(Arc::new(provider));
        let reply = client.generate("q", &CancellationToken::new(), None).await;
        assert_eq!(reply.text, STREAM_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn cancelled_stream_stops_reading() {
        let mut provider = ScriptedProvider::new(&["Thinking"]);
        provider.hang = true;
        let client = client_with(Arc::new(provider));
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            canceller.cancel();
        });

        let reply = client.generate("q", &token, None).await;
        assert_eq!(reply.source, AnswerSource::Cancelled);
        assert_eq!(reply.text, CANCELLED_MESSAGE);
    }

    #[tokio::test]
    async fn custom_sampling_and_prompt() {
        let provider = Arc::new(ScriptedProvider::new(&["ok"]));
        let client = client_with(provider.clone())
            .with_system_prompt("Be brief.")
            .with_sampling(0.0, 64);
        client.generate("q", &CancellationToken::new(), None).await;

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[0].messages[0].content, "Be brief.");
        assert_eq!(requests[0].max_tokens, Some(64));
    }
}
