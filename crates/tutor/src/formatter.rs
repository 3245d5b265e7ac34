//! Output Formatter — substitutes evaluated directives into model text.

use std::sync::Arc;

use mathtutor_core::algebra::is_empty_collection;
use mathtutor_core::{AlgebraEngine, Evaluator};
use tracing::warn;

use crate::directive::{Directive, DirectiveKind, DirectivePolicy, parse_directives};

/// Pure text transform over a finished model response.
#[derive(Clone)]
pub struct OutputFormatter {
    evaluator: Arc<dyn Evaluator>,
    engine: Arc<dyn AlgebraEngine>,
    policy: DirectivePolicy,
}

impl OutputFormatter {
    pub fn new(
        evaluator: Arc<dyn Evaluator>,
        engine: Arc<dyn AlgebraEngine>,
        policy: DirectivePolicy,
    ) -> Self {
        Self {
            evaluator,
            engine,
            policy,
        }
    }

    pub fn policy(&self) -> DirectivePolicy {
        self.policy
    }

    /// Replace the directives selected by the policy with their results.
    /// Text without directives comes back unchanged.
    pub fn format(&self, raw: &str) -> String {
        let directives = parse_directives(raw);
        let selected = self.policy.select(&directives);

        let mut output = raw.to_string();
        // back to front so earlier spans stay valid
        for directive in selected.into_iter().rev() {
            output.replace_range(directive.span.clone(), &self.substitute(directive));
        }
        output
    }

    fn substitute(&self, directive: &Directive) -> String {
        let expression = directive.expression.as_str();
        match directive.kind {
            DirectiveKind::Calculation => match self.evaluator.evaluate(expression) {
                Ok(value) => format!("**{value}**"),
                Err(e) => {
                    warn!(expression, error = %e, "Calculation directive failed");
                    format!("(Error calculating: {e})")
                }
            },
            DirectiveKind::Solve => match self.engine.run(&format!("solve({expression}, x)")) {
                Ok(result) if is_empty_collection(&result) => format!("(Could not solve: {expression})"),
                Ok(result) => format!("**{}**", result.trim()),
                Err(e) => {
                    warn!(expression, error = %e, "Solve directive failed");
                    format!("(Error solving: {e})")
                }
            },
        }
    }
}
