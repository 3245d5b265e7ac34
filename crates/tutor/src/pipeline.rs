//! The answer-resolution pipeline: empty check → plot → algebra → AI fallback.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use mathtutor_cas::{NumericEvaluator, SymbolicEngine};
use mathtutor_config::AppConfig;
use mathtutor_core::error::TutorError;
use mathtutor_core::media::{NullPlotter, PlotDomain, PlotSeries, Plotter};
use mathtutor_core::{AlgebraEngine, AnswerSource, Evaluator, Stage, TutorStreamEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::directive::DirectivePolicy;
use crate::engine_handle::EngineHandle;
use crate::fallback::AiFallbackClient;
use crate::formatter::OutputFormatter;
use crate::intent::Intent;
use crate::plot;
use crate::resolver::AlgebraicResolver;

/// Label in front of an algebra engine result.
pub const DEFAULT_ANSWER_LABEL: &str = "Algebraic Solution: ";

/// Question used by the "test AI fallback" action.
pub const AI_TEST_QUESTION: &str = "What is the Pythagorean theorem?";

/// The final answer shown (and spoken) to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub source: AnswerSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot: Option<PlotSeries>,
}

impl Answer {
    fn new(text: impl Into<String>, source: AnswerSource) -> Self {
        Self {
            text: text.into(),
            source,
            plot: None,
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Hands out one cancellation token per request and cancels the previous
/// one, so a stale stream cannot overwrite a newer answer.
#[derive(Debug, Default)]
pub struct RequestGate {
    current: Mutex<Option<CancellationToken>>,
}

impl RequestGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the running request, if any, and return the new one's token.
    pub fn supersede(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        token
    }
}

/// Orchestrates one question through the answer stages.
pub struct Tutor {
    resolver: AlgebraicResolver,
    fallback: AiFallbackClient,
    evaluator: Arc<dyn Evaluator>,
    plotter: Arc<dyn Plotter>,
    domain: PlotDomain,
    answer_label: String,
}

impl Tutor {
    pub fn new(
        engine: Arc<EngineHandle>,
        algebra: Arc<dyn AlgebraEngine>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        let formatter = OutputFormatter::new(
            evaluator.clone(),
            algebra.clone(),
            DirectivePolicy::default(),
        );
        Self {
            resolver: AlgebraicResolver::new(algebra),
            fallback: AiFallbackClient::new(engine, formatter),
            evaluator,
            plotter: Arc::new(NullPlotter),
            domain: PlotDomain::default(),
            answer_label: DEFAULT_ANSWER_LABEL.to_string(),
        }
    }

    /// Build a tutor on the bundled engine from configuration.
    pub fn from_config(config: &AppConfig, engine: Arc<EngineHandle>) -> Result<Self, TutorError> {
        let policy: DirectivePolicy = config
            .tutor
            .directive_policy
            .parse()
            .map_err(|message| TutorError::Config { message })?;

        let algebra: Arc<dyn AlgebraEngine> = Arc::new(SymbolicEngine::new());
        let evaluator: Arc<dyn Evaluator> = Arc::new(NumericEvaluator::new());
        let formatter = OutputFormatter::new(evaluator.clone(), algebra.clone(), policy);

        let mut fallback = AiFallbackClient::new(engine, formatter)
            .with_sampling(config.model.temperature, config.model.max_tokens);
        if let Some(prompt) = &config.tutor.system_prompt {
            fallback = fallback.with_system_prompt(prompt);
        }

        Ok(Self {
            resolver: AlgebraicResolver::new(algebra),
            fallback,
            evaluator,
            plotter: Arc::new(NullPlotter),
            domain: PlotDomain {
                x_min: config.plot.x_min,
                x_max: config.plot.x_max,
                step: config.plot.step,
            },
            answer_label: config.tutor.answer_label.clone(),
        })
    }

    pub fn with_plotter(mut self, plotter: Arc<dyn Plotter>) -> Self {
        self.plotter = plotter;
        self
    }

    pub fn with_answer_label(mut self, label: impl Into<String>) -> Self {
        self.answer_label = label.into();
        self
    }

    pub fn with_domain(mut self, domain: PlotDomain) -> Self {
        self.domain = domain;
        self
    }

    pub fn with_fallback(mut self, fallback: AiFallbackClient) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn engine(&self) -> &Arc<EngineHandle> {
        self.fallback.engine()
    }

    /// Answer one question. Never fails: every outcome is a displayable
    /// [`Answer`]. Stage changes, streamed fragments and the final answer
    /// are reported on `events` when given.
    pub async fn solve(
        &self,
        question: &str,
        token: &CancellationToken,
        events: Option<&mpsc::Sender<TutorStreamEvent>>,
    ) -> Answer {
        let request_id = Uuid::new_v4();
        let question = question.trim();
        debug!(%request_id, question, "Solving");

        let answer = self.run_stages(question, token, events).await;
        info!(%request_id, source = ?answer.source, "Answered");
        emit(
            events,
            TutorStreamEvent::Done {
                answer: answer.text.clone(),
                source: answer.source,
            },
        )
        .await;
        answer
    }

    async fn run_stages(
        &self,
        question: &str,
        token: &CancellationToken,
        events: Option<&mpsc::Sender<TutorStreamEvent>>,
    ) -> Answer {
        if question.is_empty() {
            return Answer::new(TutorError::EmptyInput.to_string(), AnswerSource::EmptyInput);
        }

        if let Ok(Intent::Plot(expression)) = Intent::classify(question) {
            emit(events, TutorStreamEvent::Stage { stage: Stage::Plot }).await;
            return self.plot(&expression);
        }

        emit(events, TutorStreamEvent::Stage { stage: Stage::Algebra }).await;
        match self.resolver.resolve(question) {
            Ok(result) => match result.answer() {
                Some(value) => {
                    return Answer::new(
                        format!("{}{value}", self.answer_label),
                        AnswerSource::Algebra,
                    );
                }
                None => debug!("Algebra gave no answer, falling back to AI"),
            },
            Err(e) => debug!(error = %e, "Algebra failed, falling back to AI"),
        }

        self.ask_ai(question, token, events).await
    }

    /// Ask the model directly, skipping algebra.
    pub async fn ask_ai(
        &self,
        question: &str,
        token: &CancellationToken,
        events: Option<&mpsc::Sender<TutorStreamEvent>>,
    ) -> Answer {
        emit(events, TutorStreamEvent::Stage { stage: Stage::AiFallback }).await;
        let reply = self.fallback.generate(question, token, events).await;
        Answer::new(reply.text, reply.source)
    }

    /// Sample `expression` and hand the series to the plotter.
    pub fn plot(&self, expression: &str) -> Answer {
        let series = plot::sample(expression, self.domain, self.evaluator.as_ref());
        let text = match self.plotter.plot(&series) {
            Ok(()) => format!("Plotted function: {expression}"),
            Err(e) => {
                warn!(expression, error = %e, "Plotting failed");
                e.to_string()
            }
        };
        Answer {
            text,
            source: AnswerSource::Plot,
            plot: Some(series),
        }
    }
}

async fn emit(events: Option<&mpsc::Sender<TutorStreamEvent>>, event: TutorStreamEvent) {
    if let Some(events) = events {
        let _ = events.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::tests::{ScriptedProvider, formatter};
    use crate::fallback::NOT_READY_MESSAGE;
    use mathtutor_core::error::{EvaluationError, MediaError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic engine returning one fixed string and counting calls.
    struct FixedEngine {
        output: Result<String, EvaluationError>,
        calls: AtomicUsize,
    }

    impl FixedEngine {
        fn answering(output: &str) -> Arc<Self> {
            Arc::new(Self {
                output: Ok(output.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                output: Err(EvaluationError::Parse("not math".into())),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl AlgebraEngine for FixedEngine {
        fn run(&self, _input: &str) -> Result<String, EvaluationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.output.clone()
        }
    }

    #[derive(Default)]
    struct RecordingPlotter {
        plotted: Mutex<Vec<String>>,
        fail: bool,
    }

    impl Plotter for RecordingPlotter {
        fn plot(&self, series: &PlotSeries) -> Result<(), MediaError> {
            if self.fail {
                return Err(MediaError::Plot("no display".into()));
            }
            self.plotted.lock().unwrap().push(series.label.clone());
            Ok(())
        }
    }

    fn tutor(engine: Arc<FixedEngine>, provider: Option<Arc<ScriptedProvider>>) -> Tutor {
        let handle = match provider {
            Some(provider) => EngineHandle::with_provider(provider, "phi3:mini"),
            None => EngineHandle::new(),
        };
        let handle = Arc::new(handle);
        Tutor::new(handle.clone(), engine, Arc::new(NumericEvaluator::new()))
            .with_fallback(AiFallbackClient::new(handle, formatter()))
    }

    async fn solve(tutor: &Tutor, question: &str) -> Answer {
        tutor.solve(question, &CancellationToken::new(), None).await
    }

    #[tokio::test]
    async fn blank_input_touches_nothing() {
        let engine = FixedEngine::answering("4");
        let provider = Arc::new(ScriptedProvider::new(&["hi"]));
        let tutor = tutor(engine.clone(), Some(provider.clone()));

        for blank in ["", "   ", "\t\n"] {
            let answer = solve(&tutor, blank).await;
            assert_eq!(answer.text, "Please enter a question.");
            assert_eq!(answer.source, AnswerSource::EmptyInput);
        }
        assert_eq!(engine.calls(), 0);
        assert_eq!(provider.request_count(), 0);
    }

    #[tokio::test]
    async fn plot_skips_algebra_and_ai() {
        let engine = FixedEngine::answering("4");
        let provider = Arc::new(ScriptedProvider::new(&["hi"]));
        let plotter = Arc::new(RecordingPlotter::default());
        let tutor = tutor(engine.clone(), Some(provider.clone())).with_plotter(plotter.clone());

        let answer = solve(&tutor, "Plot sin(x)").await;

        assert_eq!(answer.text, "Plotted function: sin(x)");
        assert_eq!(answer.source, AnswerSource::Plot);
        assert_eq!(answer.plot.as_ref().map(|p| p.points.len()), Some(101));
        assert_eq!(*plotter.plotted.lock().unwrap(), vec!["sin(x)"]);
        assert_eq!(engine.calls(), 0);
        assert_eq!(provider.request_count(), 0);
    }

    #[tokio::test]
    async fn plot_failure_is_reported() {
        let plotter = Arc::new(RecordingPlotter {
            fail: true,
            ..Default::default()
        });
        let tutor = tutor(FixedEngine::answering("4"), None).with_plotter(plotter);
        let answer = solve(&tutor, "plot x").await;
        assert_eq!(answer.text, "Plotting failed: no display");
        assert_eq!(answer.source, AnswerSource::Plot);
    }

    #[tokio::test]
    async fn meaningful_result_is_labelled() {
        let tutor = tutor(FixedEngine::answering("4"), None);
        let answer = solve(&tutor, "2+2").await;
        assert_eq!(answer.text, "Algebraic Solution: 4");
        assert_eq!(answer.source, AnswerSource::Algebra);
        assert_eq!(answer.to_string(), "Algebraic Solution: 4");
    }

    #[tokio::test]
    async fn deterministic_engine_is_idempotent() {
        let tutor = tutor(FixedEngine::answering("1/3*x^3"), None);
        let first = solve(&tutor, "integrate(x^2)").await;
        let second = solve(&tutor, "integrate(x^2)").await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn every_sentinel_routes_to_ai() {
        for sentinel in ["[]", "()", "undefined"] {
            let engine = FixedEngine::answering(sentinel);
            let provider = Arc::new(ScriptedProvider::new(&["From the model"]));
            let tutor = tutor(engine, Some(provider.clone()));

            let answer = solve(&tutor, "q").await;
            assert_eq!(answer.text, "From the model", "{sentinel}");
            assert_eq!(answer.source, AnswerSource::Ai);
            assert_eq!(provider.request_count(), 1);
        }
    }

    #[tokio::test]
    async fn engine_error_routes_to_ai() {
        let provider = Arc::new(ScriptedProvider::new(&["The", " sum", " is [CALCULATION: 2 + 2]"]));
        let tutor = tutor(FixedEngine::failing(), Some(provider));
        let answer = solve(&tutor, "What is two plus two?").await;
        assert_eq!(answer.text, "The sum is **4**");
    }

    #[tokio::test]
    async fn fallback_without_model_is_not_ready() {
        let tutor = tutor(FixedEngine::failing(), None);
        let answer = solve(&tutor, "Explain fractions").await;
        assert_eq!(answer.text, NOT_READY_MESSAGE);
        assert_eq!(answer.source, AnswerSource::ModelNotReady);
    }

    #[tokio::test]
    async fn custom_label() {
        let tutor = tutor(FixedEngine::answering("4"), None).with_answer_label("Answer: ");
        assert_eq!(solve(&tutor, "2+2").await.text, "Answer: 4");
    }

    #[tokio::test]
    async fn events_end_with_done() {
        let tutor = tutor(FixedEngine::answering("4"), None);
        let (tx, mut rx) = mpsc::channel(8);
        tutor.solve("2+2", &CancellationToken::new(), Some(&tx)).await;
        drop(tx);

        let mut types = Vec::new();
        while let Some(event) = rx.recv().await {
            types.push(event.event_type());
        }
        assert_eq!(types, vec!["stage", "done"]);
    }

    #[tokio::test]
    async fn ask_ai_bypasses_algebra() {
        let engine = FixedEngine::answering("4");
        let provider = Arc::new(ScriptedProvider::new(&["a^2 + b^2 = c^2"]));
        let tutor = tutor(engine.clone(), Some(provider));
        let answer = tutor
            .ask_ai(AI_TEST_QUESTION, &CancellationToken::new(), None)
            .await;
        assert_eq!(answer.text, "a^2 + b^2 = c^2");
        assert_eq!(engine.calls(), 0);
    }

    #[test]
    fn gate_cancels_previous_request() {
        let gate = RequestGate::new();
        let first = gate.supersede();
        assert!(!first.is_cancelled());
        let second = gate.supersede();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[test]
    fn from_config_rejects_unknown_policy() {
        let mut config = AppConfig::default();
        config.tutor.directive_policy = "random".into();
        assert!(matches!(
            Tutor::from_config(&config, Arc::new(EngineHandle::new())),
            Err(TutorError::Config { .. })
        ));
    }

    #[tokio::test]
    async fn bundled_engine_scenarios() {
        let tutor = Tutor::from_config(&AppConfig::default(), Arc::new(EngineHandle::new())).unwrap();
        assert_eq!(solve(&tutor, "2+2").await.text, "Algebraic Solution: 4");
        assert_eq!(
            solve(&tutor, "integrate(x^2)").await.text,
            "Algebraic Solution: 1/3*x^3"
        );
        assert_eq!(
            solve(&tutor, "solve(x^2=4)").await.text,
            "Algebraic Solution: [-2,2]"
        );
    }
}
