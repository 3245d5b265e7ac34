//! EngineHandle — the one language-model session shared by all requests.
//!
//! States move `Unloaded → Loading → Ready | Failed`. Entry into `Loading`
//! is an atomic compare-and-set, so concurrent or repeated loads are no-ops
//! that report the current status. A failed load may be retried, and so
//! may a load that was dropped or panicked midway.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use mathtutor_core::provider::{LoadProgress, ModelLoader, ProgressSink, Provider};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

impl EngineState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Loading,
            2 => Self::Ready,
            3 => Self::Failed,
            _ => Self::Unloaded,
        }
    }
}

/// What a call to [`EngineHandle::load`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// This call loaded the model.
    Loaded,
    /// Another load is in flight; nothing was started.
    InProgress,
    /// The model was already loaded; nothing was started.
    AlreadyLoaded,
    /// This call tried and failed.
    Failed(String),
}

/// A loaded provider and the model it serves.
#[derive(Clone)]
pub struct Session {
    pub provider: Arc<dyn Provider>,
    pub model: String,
    pub loaded_at: DateTime<Utc>,
}

/// Status snapshot for shells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<DateTime<Utc>>,
}

pub struct EngineHandle {
    state: AtomicU8,
    session: RwLock<Option<Session>>,
    status: Arc<RwLock<String>>,
}

impl Default for EngineHandle {
    fn default() -> Self {
        Self::new()
    }
}

static SHARED: OnceLock<Arc<EngineHandle>> = OnceLock::new();

impl EngineHandle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(EngineState::Unloaded as u8),
            session: RwLock::new(None),
            status: Arc::new(RwLock::new("AI model not loaded".into())),
        }
    }

    /// A handle that is already `Ready` with `provider`.
    pub fn with_provider(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        let handle = Self::new();
        handle.install(provider, model.into());
        handle
    }

    /// The process-wide handle.
    pub fn shared() -> Arc<EngineHandle> {
        SHARED.get_or_init(|| Arc::new(EngineHandle::new())).clone()
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == EngineState::Ready
    }

    /// The loaded session, only while `Ready`.
    pub fn session(&self) -> Option<Session> {
        if !self.is_ready() {
            return None;
        }
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Latest status line (progress text while loading).
    pub fn status_text(&self) -> String {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> EngineStatus {
        let session = self.session();
        EngineStatus {
            state: self.state(),
            message: self.status_text(),
            model: session.as_ref().map(|s| s.model.clone()),
            loaded_at: session.map(|s| s.loaded_at),
        }
    }

    fn set_status(status: &RwLock<String>, text: String) {
        *status.write().unwrap_or_else(PoisonError::into_inner) = text;
    }

    fn install(&self, provider: Arc<dyn Provider>, model: String) {
        Self::set_status(&self.status, format!("Model \"{model}\" loaded successfully!"));
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(Session {
            provider,
            model,
            loaded_at: Utc::now(),
        });
        self.state.store(EngineState::Ready as u8, Ordering::Release);
    }

    fn begin_loading(&self) -> bool {
        [EngineState::Unloaded, EngineState::Failed].into_iter().any(|from| {
            self.state
                .compare_exchange(
                    from as u8,
                    EngineState::Loading as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
        })
    }

    /// Load `model` through `loader` unless a load is running or done.
    ///
    /// Progress reports update [`status_text`](Self::status_text) and are
    /// forwarded to `progress` when given.
    pub async fn load(
        &self,
        loader: &dyn ModelLoader,
        model: &str,
        progress: Option<ProgressSink>,
    ) -> LoadOutcome {
        if !self.begin_loading() {
            let state = self.state();
            info!(?state, "Model load skipped");
            return match state {
                EngineState::Ready => LoadOutcome::AlreadyLoaded,
                _ => LoadOutcome::InProgress,
            };
        }

        let mut guard = LoadingGuard {
            handle: self,
            settled: false,
        };

        info!(model, backend = loader.backend(), "Loading model");
        Self::set_status(
            &self.status,
            format!("Initializing engine and loading model: {model}..."),
        );

        let status = self.status.clone();
        let sink: ProgressSink = Arc::new(move |report: LoadProgress| {
            Self::set_status(&status, format!("Model loading: {}", report.text));
            if let Some(forward) = &progress {
                forward(report);
            }
        });

        let outcome = match loader.load(model, sink).await {
            Ok(provider) => {
                self.install(provider, model.to_string());
                info!(model, "Model ready");
                LoadOutcome::Loaded
            }
            Err(e) => {
                let message = format!("Error loading AI model: {e}");
                warn!(model, error = %e, "Model load failed");
                self.fail(message.clone());
                LoadOutcome::Failed(message)
            }
        };
        guard.settled = true;
        outcome
    }

    fn fail(&self, message: String) {
        Self::set_status(&self.status, message);
        self.state.store(EngineState::Failed as u8, Ordering::Release);
    }
}

/// Marks a load `Failed` if it ends without settling, i.e. the future was
/// dropped or the loader panicked.
struct LoadingGuard<'a> {
    handle: &'a EngineHandle,
    settled: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Model load interrupted");
            self.handle
                .fail("Error loading AI model: loading was interrupted".into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mathtutor_core::error::ProviderError;
    use mathtutor_core::message::Message;
    use mathtutor_core::provider::{ProviderRequest, ProviderResponse};
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct NullProvider;

    #[async_trait]
    impl Provider for NullProvider {
        fn name(&self) -> &str {
            "null"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                message: Message::assistant(""),
                usage: None,
                model: request.model,
            })
        }
    }

    /// Loader that counts attempts, optionally waits for a signal, and
    /// fails while `fail` is set.
    #[derive(Default)]
    struct CountingLoader {
        attempts: AtomicUsize,
        gate: Option<Arc<Notify>>,
        fail: Mutex<bool>,
    }

    #[async_trait]
    impl ModelLoader for CountingLoader {
        fn backend(&self) -> &str {
            "test"
        }

        async fn load(
            &self,
            model: &str,
            progress: ProgressSink,
        ) -> Result<Arc<dyn Provider>, ProviderError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            progress(LoadProgress::new("Fetching weights").with_fraction(0.5));
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if *self.fail.lock().unwrap() {
                return Err(ProviderError::ModelNotFound(model.to_string()));
            }
            Ok(Arc::new(NullProvider))
        }
    }

    #[tokio::test]
    async fn starts_unloaded() {
        let handle = EngineHandle::new();
        assert_eq!(handle.state(), EngineState::Unloaded);
        assert!(handle.session().is_none());
    }

    #[tokio::test]
    async fn load_reports_progress_and_becomes_ready() {
        let handle = EngineHandle::new();
        let loader = CountingLoader::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: ProgressSink = Arc::new(move |p: LoadProgress| sink_seen.lock().unwrap().push(p.text));

        let outcome = handle.load(&loader, "phi3:mini", Some(sink)).await;

        assert_eq!(outcome, LoadOutcome::Loaded);
        assert!(handle.is_ready());
        assert_eq!(handle.session().unwrap().model, "phi3:mini");
        assert_eq!(*seen.lock().unwrap(), vec!["Fetching weights"]);
        assert_eq!(handle.status_text(), "Model \"phi3:mini\" loaded successfully!");
    }

    #[tokio::test]
    async fn repeated_load_is_noop() {
        let handle = EngineHandle::new();
        let loader = CountingLoader::default();
        handle.load(&loader, "m", None).await;

        assert_eq!(handle.load(&loader, "m", None).await, LoadOutcome::AlreadyLoaded);
        assert_eq!(loader.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_load_is_noop_while_loading() {
        let handle = Arc::new(EngineHandle::new());
        let gate = Arc::new(Notify::new());
        let loader = Arc::new(CountingLoader {
            gate: Some(gate.clone()),
            ..Default::default()
        });

        let first = {
            let (handle, loader) = (handle.clone(), loader.clone());
            tokio::spawn(async move { handle.load(loader.as_ref(), "m", None).await })
        };
        while handle.state() != EngineState::Loading {
            tokio::task::yield_now().await;
        }

        assert_eq!(handle.load(loader.as_ref(), "m", None).await, LoadOutcome::InProgress);
        assert!(handle.status_text().starts_with("Model loading:"));

        gate.notify_one();
        assert_eq!(first.await.unwrap(), LoadOutcome::Loaded);
        assert_eq!(loader.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_load_can_be_retried() {
        let handle = EngineHandle::new();
        let loader = CountingLoader {
            fail: Mutex::new(true),
            ..Default::default()
        };

        let outcome = handle.load(&loader, "nope", None).await;
        assert!(matches!(outcome, LoadOutcome::Failed(ref m) if m.starts_with("Error loading AI model:")));
        assert_eq!(handle.state(), EngineState::Failed);
        assert!(handle.session().is_none());

        *loader.fail.lock().unwrap() = false;
        assert_eq!(handle.load(&loader, "nope", None).await, LoadOutcome::Loaded);
        assert_eq!(loader.attempts.load(Ordering::SeqCst), 2);
    }

    struct PanickingLoader;

    #[async_trait]
    impl ModelLoader for PanickingLoader {
        fn backend(&self) -> &str {
            "test"
        }

        async fn load(
            &self,
            _model: &str,
            _progress: ProgressSink,
        ) -> Result<Arc<dyn Provider>, ProviderError> {
            panic!("loader crashed");
        }
    }

    #[tokio::test]
    async fn dropped_load_can_be_retried() {
        let handle = Arc::new(EngineHandle::new());
        let stuck = Arc::new(CountingLoader {
            gate: Some(Arc::new(Notify::new())),
            ..Default::default()
        });

        let task = {
            let (handle, stuck) = (handle.clone(), stuck.clone());
            tokio::spawn(async move { handle.load(stuck.as_ref(), "m", None).await })
        };
        while handle.state() != EngineState::Loading {
            tokio::task::yield_now().await;
        }
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert_eq!(handle.state(), EngineState::Failed);
        assert_eq!(
            handle.status_text(),
            "Error loading AI model: loading was interrupted"
        );
        let loader = CountingLoader::default();
        assert_eq!(handle.load(&loader, "m", None).await, LoadOutcome::Loaded);
    }

    #[tokio::test]
    async fn panicking_load_can_be_retried() {
        let handle = Arc::new(EngineHandle::new());
        let task = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.load(&PanickingLoader, "m", None).await })
        };
        assert!(task.await.unwrap_err().is_panic());

        assert_eq!(handle.state(), EngineState::Failed);
        let loader = CountingLoader::default();
        assert_eq!(handle.load(&loader, "m", None).await, LoadOutcome::Loaded);
    }

    #[test]
    fn with_provider_is_ready() {
        let handle = EngineHandle::with_provider(Arc::new(NullProvider), "m");
        let status = handle.status();
        assert_eq!(status.state, EngineState::Ready);
        assert_eq!(status.model.as_deref(), Some("m"));
        assert!(status.loaded_at.is_some());
    }

    #[test]
    fn shared_is_one_instance() {
        assert!(Arc::ptr_eq(&EngineHandle::shared(), &EngineHandle::shared()));
    }
}
