//! The tutor wired for the terminal: ASCII plots, progress on stderr,
//! answers on stdout, optional speech.

use std::io::Write;
use std::sync::Arc;

use mathtutor_config::AppConfig;
use mathtutor_core::media::SpeechOutput;
use mathtutor_core::provider::{LoadProgress, ModelLoader, ProgressSink};
use mathtutor_core::{AnswerSource, Stage, TutorStreamEvent};
use mathtutor_media::{AsciiPlotter, speaker_from_config};
use mathtutor_tutor::{
    AI_TEST_QUESTION, Answer, EngineHandle, EngineStatus, LoadOutcome, RequestGate, Tutor,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct TutorSession {
    pub config: AppConfig,
    tutor: Tutor,
    loader: Arc<dyn ModelLoader>,
    speaker: Box<dyn SpeechOutput>,
    gate: RequestGate,
}

impl TutorSession {
    /// Load the config file and build a session from it.
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
        Self::from_config(config)
    }

    pub fn from_config(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let tutor = Tutor::from_config(&config, Arc::new(EngineHandle::new()))?
            .with_plotter(Arc::new(AsciiPlotter::from_config(&config.plot)));
        Ok(Self {
            loader: mathtutor_providers::build_loader(&config.model),
            speaker: speaker_from_config(&config.speech),
            tutor,
            gate: RequestGate::new(),
            config,
        })
    }

    /// Turn on spoken answers regardless of the config file.
    pub fn with_speech(mut self) -> Self {
        self.config.speech.enabled = true;
        self.speaker = speaker_from_config(&self.config.speech);
        self
    }

    pub fn status(&self) -> EngineStatus {
        self.tutor.engine().status()
    }

    /// Load the configured model, printing progress lines to stderr.
    pub async fn load_model(&self) -> LoadOutcome {
        let progress: ProgressSink = Arc::new(|report: LoadProgress| match report.fraction {
            Some(fraction) => eprintln!("  [{:>3.0}%] {}", fraction * 100.0, report.text),
            None => eprintln!("  {}", report.text),
        });

        eprintln!("  {}", format_loading(&self.config.model.name, self.loader.backend()));
        let outcome = self
            .tutor
            .engine()
            .load(self.loader.as_ref(), &self.config.model.name, Some(progress))
            .await;
        eprintln!("  {}", self.tutor.engine().status_text());
        outcome
    }

    /// Answer a question, print it and speak it when enabled.
    pub async fn ask(&self, question: &str) -> Answer {
        let token = self.gate.supersede();
        let progress = Progress::start(&token);
        let answer = self
            .tutor
            .solve(question, &token, Some(progress.sender()))
            .await;
        progress.finish().await;
        self.present(&answer).await;
        answer
    }

    /// Ask the model the fixed test question, skipping algebra.
    pub async fn test_ai(&self) -> Answer {
        let token = self.gate.supersede();
        let progress = Progress::start(&token);
        let answer = self
            .tutor
            .ask_ai(AI_TEST_QUESTION, &token, Some(progress.sender()))
            .await;
        progress.finish().await;
        self.present(&answer).await;
        answer
    }

    async fn present(&self, answer: &Answer) {
        // Plot answers already drew their chart
        println!("{answer}");
        let _ = std::io::stdout().flush();

        if answer.source == AnswerSource::EmptyInput || !self.config.speech.enabled {
            return;
        }
        if let Err(e) = self.speaker.speak(&answer.text).await {
            warn!(error = %e, "Could not speak the answer");
        }
    }
}

/// Progress line on stderr for one request; Ctrl+C cancels the request.
struct Progress {
    tx: mpsc::Sender<TutorStreamEvent>,
    printer: JoinHandle<()>,
    interrupt: JoinHandle<()>,
}

impl Progress {
    fn start(token: &CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let token = token.clone();
        Self {
            tx,
            printer: tokio::spawn(print_progress(rx)),
            interrupt: tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    token.cancel();
                }
            }),
        }
    }

    fn sender(&self) -> &mpsc::Sender<TutorStreamEvent> {
        &self.tx
    }

    async fn finish(self) {
        self.interrupt.abort();
        drop(self.tx);
        let _ = self.printer.await;
    }
}

fn format_loading(model: &str, backend: &str) -> String {
    format!("Loading {model} ({backend} backend)...")
}

async fn print_progress(mut rx: mpsc::Receiver<TutorStreamEvent>) {
    let mut shown = false;
    while let Some(event) = rx.recv().await {
        match event {
            TutorStreamEvent::Stage {
                stage: Stage::AiFallback,
            } => {
                eprint!("  Thinking...");
                shown = true;
            }
            TutorStreamEvent::Chunk { accumulated, .. } => {
                eprint!("\r  Thinking... {} chars", accumulated.chars().count());
                shown = true;
            }
            TutorStreamEvent::Done { .. } => {
                if shown {
                    eprint!("\r\x1b[2K");
                }
                shown = false;
            }
            TutorStreamEvent::Error { message } => debug!(%message, "Tutor reported an error"),
            TutorStreamEvent::Stage { .. } => {}
        }
        let _ = std::io::stderr().flush();
    }
}
