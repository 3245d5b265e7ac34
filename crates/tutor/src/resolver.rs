//! Algebraic Resolver — routes a question to the algebra engine by intent.

use std::sync::Arc;

use mathtutor_core::algebra::is_empty_collection;
use mathtutor_core::{AlgebraEngine, AlgebraicResult, EvaluationError};
use tracing::debug;

use crate::intent::Intent;

/// Classifies a question and runs the matching engine command.
///
/// Raw sentinel strings never leave this type: they become
/// [`AlgebraicResult::Empty`].
pub struct AlgebraicResolver {
    engine: Arc<dyn AlgebraEngine>,
}

impl AlgebraicResolver {
    pub fn new(engine: Arc<dyn AlgebraEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<dyn AlgebraEngine> {
        &self.engine
    }

    pub fn resolve(&self, question: &str) -> Result<AlgebraicResult, EvaluationError> {
        let raw = match Intent::classify(question)? {
            Intent::Integrate(expr) => self.engine.run(&format!("integral({expr})"))?,
            Intent::Derivative(expr) => self.engine.run(&format!("d({expr})"))?,
            Intent::Solve(expr) => {
                let roots = self.engine.run(&format!("roots({expr})"))?;
                if is_empty_collection(&roots) {
                    debug!(expr = %expr, "No roots, retrying as solve for x");
                    self.engine.run(&format!("solve({expr}, x)"))?
                } else {
                    roots
                }
            }
            Intent::Plot(_) | Intent::Generic(_) => self.engine.run(question)?,
        };

        let result = AlgebraicResult::from_engine(&raw);
        debug!(question, raw = %raw, meaningful = result.is_meaningful(), "Algebra resolved");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mathtutor_cas::SymbolicEngine;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Engine with canned answers that records every command it receives.
    #[derive(Default)]
    struct ScriptedEngine {
        answers: HashMap<String, Result<String, EvaluationError>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedEngine {
        fn answer(mut self, input: &str, output: &str) -> Self {
            self.answers.insert(input.into(), Ok(output.into()));
            self
        }
    }

    impl AlgebraEngine for ScriptedEngine {
        fn run(&self, input: &str) -> Result<String, EvaluationError> {
            self.calls.lock().unwrap().push(input.to_string());
            self.answers
                .get(input)
                .cloned()
                .unwrap_or_else(|| Err(EvaluationError::Parse(input.to_string())))
        }
    }

    #[test]
    fn integrate_wraps_in_integral() {
        let engine = Arc::new(ScriptedEngine::default().answer("integral(x^2)", "1/3*x^3"));
        let resolver = AlgebraicResolver::new(engine.clone());
        assert_eq!(
            resolver.resolve("integrate(x^2)").unwrap(),
            AlgebraicResult::Answer("1/3*x^3".into())
        );
        assert_eq!(*engine.calls.lock().unwrap(), vec!["integral(x^2)"]);
    }

    #[test]
    fn derivative_wraps_in_d() {
        let engine = Arc::new(ScriptedEngine::default().answer("d(x^3)", "3*x^2"));
        let resolver = AlgebraicResolver::new(engine);
        assert_eq!(
            resolver.resolve("derivative(x^3)").unwrap().answer(),
            Some("3*x^2")
        );
    }

    #[test]
    fn solve_retries_when_roots_is_empty() {
        let engine = Arc::new(
            ScriptedEngine::default()
                .answer("roots(x^2=4)", "[]")
                .answer("solve(x^2=4, x)", "[-2,2]"),
        );
        let resolver = AlgebraicResolver::new(engine.clone());
        assert_eq!(resolver.resolve("solve(x^2=4)").unwrap().answer(), Some("[-2,2]"));
        assert_eq!(
            *engine.calls.lock().unwrap(),
            vec!["roots(x^2=4)", "solve(x^2=4, x)"]
        );
    }

    #[test]
    fn solve_keeps_meaningful_roots() {
        let engine = Arc::new(ScriptedEngine::default().answer("roots(x^2-1)", "[-1,1]"));
        let resolver = AlgebraicResolver::new(engine.clone());
        assert_eq!(resolver.resolve("solve(x^2-1)").unwrap().answer(), Some("[-1,1]"));
        assert_eq!(engine.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn sentinels_become_empty() {
        for sentinel in ["[]", "()", "undefined", ""] {
            let engine = Arc::new(ScriptedEngine::default().answer("q", sentinel));
            let resolver = AlgebraicResolver::new(engine);
            assert_eq!(resolver.resolve("q").unwrap(), AlgebraicResult::Empty, "{sentinel:?}");
        }
    }

    #[test]
    fn engine_errors_are_returned() {
        let resolver = AlgebraicResolver::new(Arc::new(ScriptedEngine::default()));
        assert!(resolver.resolve("What is a prime number?").is_err());
    }

    #[test]
    fn unbalanced_question_never_reaches_engine() {
        let engine = Arc::new(ScriptedEngine::default());
        let resolver = AlgebraicResolver::new(engine.clone());
        assert!(resolver.resolve("integrate(x^2").is_err());
        assert!(engine.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn with_symbolic_engine() {
        let resolver = AlgebraicResolver::new(Arc::new(SymbolicEngine::new()));
        assert_eq!(resolver.resolve("2+2").unwrap().answer(), Some("4"));
        assert_eq!(resolver.resolve("integrate(x^2)").unwrap().answer(), Some("1/3*x^3"));
        assert_eq!(resolver.resolve("solve(x^2=4)").unwrap().answer(), Some("[-2,2]"));
        assert_eq!(resolver.resolve("solve(x^2+1)").unwrap(), AlgebraicResult::Empty);
    }
}
