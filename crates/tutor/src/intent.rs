//! Question classification by case-insensitive prefix.

use mathtutor_core::EvaluationError;

/// What a question asks the tutor to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// `plot <expr>`: the text after the four letters, trimmed.
    Plot(String),
    /// `integrate(<expr>)`
    Integrate(String),
    /// `derivative(<expr>)`
    Derivative(String),
    /// `solve(<expr>)`
    Solve(String),
    /// Anything else, evaluated as a whole.
    Generic(String),
}

fn has_prefix(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

impl Intent {
    /// Classify a trimmed question. First matching prefix wins.
    ///
    /// Fails only when a call-style prefix has no matching `)`.
    pub fn classify(question: &str) -> Result<Self, EvaluationError> {
        if has_prefix(question, "plot") {
            return Ok(Self::Plot(question[4..].trim().to_string()));
        }
        if has_prefix(question, "integrate(") {
            return Ok(Self::Integrate(call_argument(question)?.to_string()));
        }
        if has_prefix(question, "derivative(") {
            return Ok(Self::Derivative(call_argument(question)?.to_string()));
        }
        if has_prefix(question, "solve(") {
            return Ok(Self::Solve(call_argument(question)?.to_string()));
        }
        Ok(Self::Generic(question.to_string()))
    }
}

/// Text between the first `(` and its matching `)`.
pub fn call_argument(text: &str) -> Result<&str, EvaluationError> {
    let open = text
        .find('(')
        .ok_or_else(|| EvaluationError::Parse(format!("expected '(' in {text}")))?;

    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[open + 1..open + i]);
                }
            }
            _ => {}
        }
    }
    Err(EvaluationError::Parse(format!("unbalanced parentheses in {text}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_case_insensitive() {
        assert_eq!(
            Intent::classify("Integrate(x^2)").unwrap(),
            Intent::Integrate("x^2".into())
        );
        assert_eq!(
            Intent::classify("DERIVATIVE(sin(x))").unwrap(),
            Intent::Derivative("sin(x)".into())
        );
        assert_eq!(
            Intent::classify("solve(x^2=4)").unwrap(),
            Intent::Solve("x^2=4".into())
        );
    }

    #[test]
    fn plot_takes_rest_of_line() {
        assert_eq!(
            Intent::classify("PLOT  sin(x) ").unwrap(),
            Intent::Plot("sin(x)".into())
        );
        assert_eq!(Intent::classify("plotx^2").unwrap(), Intent::Plot("x^2".into()));
    }

    #[test]
    fn everything_else_is_generic() {
        assert_eq!(Intent::classify("2+2").unwrap(), Intent::Generic("2+2".into()));
        // no parenthesis directly after the keyword
        assert_eq!(
            Intent::classify("solve x = 1").unwrap(),
            Intent::Generic("solve x = 1".into())
        );
    }

    #[test]
    fn nested_parentheses_are_matched() {
        assert_eq!(call_argument("integrate((x+1)*(x-1)) now").unwrap(), "(x+1)*(x-1)");
    }

    #[test]
    fn unbalanced_parentheses_fail() {
        assert!(matches!(
            Intent::classify("integrate(x^2"),
            Err(EvaluationError::Parse(_))
        ));
        assert!(Intent::classify("derivative((x)").is_err());
    }

    #[test]
    fn multibyte_input_does_not_panic() {
        assert_eq!(Intent::classify("π").unwrap(), Intent::Generic("π".into()));
        assert_eq!(Intent::classify("√").unwrap(), Intent::Generic("√".into()));
    }
}
