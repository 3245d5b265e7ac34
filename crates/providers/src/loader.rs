//! Model loaders — bring a provider for the configured model into a ready state.

use std::sync::Arc;

use async_trait::async_trait;
use mathtutor_config::ModelConfig;
use mathtutor_core::error::ProviderError;
use mathtutor_core::provider::{LoadProgress, ModelLoader, ProgressSink, Provider};
use tracing::{info, warn};

use crate::openai_compat::OpenAiCompatProvider;

/// Connects to an OpenAI-compatible server and checks that it serves the model.
pub struct RemoteLoader {
    api_url: String,
    api_key: String,
}

impl RemoteLoader {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.unwrap_or_else(|| "ollama".into()),
        }
    }
}

/// Ollama lists `phi3` as `phi3:latest`.
fn serves_model(listed: &[String], model: &str) -> bool {
    listed.is_empty()
        || listed
            .iter()
            .any(|id| id == model || id.strip_suffix(":latest") == Some(model))
}

#[async_trait]
impl ModelLoader for RemoteLoader {
    fn backend(&self) -> &str {
        "remote"
    }

    async fn load(
        &self,
        model: &str,
        progress: ProgressSink,
    ) -> std::result::Result<Arc<dyn Provider>, ProviderError> {
        progress(LoadProgress::new(format!("Connecting to {}", self.api_url)).with_fraction(0.1));
        let provider = OpenAiCompatProvider::new("remote", self.api_url.as_str(), self.api_key.as_str());

        if !provider.health_check().await? {
            return Err(ProviderError::Network(format!(
                "{} did not answer the model listing",
                self.api_url
            )));
        }

        progress(LoadProgress::new("Checking available models").with_fraction(0.5));
        let listed = provider.list_models().await?;
        if !serves_model(&listed, model) {
            warn!(model, available = ?listed, "Model not served");
            return Err(ProviderError::ModelNotFound(format!(
                "{model} is not served by {} (available: {})",
                self.api_url,
                listed.join(", ")
            )));
        }

        info!(model, url = %self.api_url, "Remote model ready");
        progress(LoadProgress::new(format!("{model} ready")).with_fraction(1.0));
        Ok(Arc::new(provider))
    }
}

/// Downloads and loads GGUF weights in-process on a blocking thread.
#[cfg(feature = "local")]
pub struct LocalLoader;

#[cfg(feature = "local")]
#[async_trait]
impl ModelLoader for LocalLoader {
    fn backend(&self) -> &str {
        "local"
    }

    async fn load(
        &self,
        model: &str,
        progress: ProgressSink,
    ) -> std::result::Result<Arc<dyn Provider>, ProviderError> {
        let model = model.to_string();
        let sink = progress.clone();
        let provider = tokio::task::spawn_blocking(move || {
            crate::local::LocalProvider::load(&model, &|text| sink(LoadProgress::new(text)))
        })
        .await
        .map_err(|e| ProviderError::ApiError {
            status_code: 500,
            message: format!("Model loading task failed: {e}"),
        })??;

        info!(model = provider.model_name(), "Local model ready");
        progress(LoadProgress::new(format!("{} ready", provider.model_name())).with_fraction(1.0));
        Ok(Arc::new(provider))
    }
}

/// Pick the loader for `config.backend`.
///
/// `"local"` needs the `local` feature; without it the remote loader is
/// used and a warning is logged.
pub fn build_loader(config: &ModelConfig) -> Arc<dyn ModelLoader> {
    match config.backend.as_str() {
        #[cfg(feature = "local")]
        "local" => Arc::new(LocalLoader),
        #[cfg(not(feature = "local"))]
        "local" => {
            warn!("Built without the `local` feature, using the remote backend");
            Arc::new(RemoteLoader::new(config.api_url.as_str(), config.api_key.clone()))
        }
        _ => Arc::new(RemoteLoader::new(config.api_url.as_str(), config.api_key.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn model_matching() {
        let listed = vec!["phi3:latest".to_string(), "llama3.2:1b".to_string()];
        assert!(serves_model(&listed, "phi3"));
        assert!(serves_model(&listed, "llama3.2:1b"));
        assert!(!serves_model(&listed, "phi3:mini"));
        assert!(serves_model(&[], "anything"));
    }

    #[test]
    fn remote_is_default_backend() {
        let loader = build_loader(&ModelConfig::default());
        assert_eq!(loader.backend(), "remote");
    }

    #[tokio::test]
    async fn unreachable_server_fails_with_progress() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: ProgressSink = Arc::new(move |p: LoadProgress| {
            sink_seen.lock().unwrap().push(p.text);
        });

        // Port 9 (discard) is closed on test machines.
        let loader = RemoteLoader::new("http://127.0.0.1:9/v1", None);
        let result = loader.load("phi3:mini", sink).await;

        assert!(matches!(result, Err(ProviderError::Network(_))));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.first().map(String::as_str), Some("Connecting to http://127.0.0.1:9/v1"));
    }
}
