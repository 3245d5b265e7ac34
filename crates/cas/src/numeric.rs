//! Floating-point evaluation of parsed expressions.

use mathtutor_core::{EvaluationError, Evaluator};
use num_traits::ToPrimitive;

use crate::expr::Expr;
use crate::parser::parse;

/// Evaluates expressions to `f64`, with an optional variable binding.
///
/// Used for `[CALCULATION: ...]` directives and for sampling plots.
#[derive(Debug, Default, Clone, Copy)]
pub struct NumericEvaluator;

impl NumericEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for NumericEvaluator {
    fn evaluate(&self, expression: &str) -> Result<String, EvaluationError> {
        let expr = parse(expression)?;
        let value = eval(&expr, None)?;
        if !value.is_finite() {
            return Err(EvaluationError::Engine(format!(
                "{expression} is not a finite real number"
            )));
        }
        Ok(format_number(value))
    }

    fn evaluate_at(
        &self,
        expression: &str,
        variable: &str,
        value: f64,
    ) -> Result<f64, EvaluationError> {
        let expr = parse(expression)?;
        eval(&expr, Some((variable, value)))
    }
}

/// Evaluate `expr`, resolving at most one bound variable.
pub fn eval(expr: &Expr, binding: Option<(&str, f64)>) -> Result<f64, EvaluationError> {
    let go = |e: &Expr| eval(e, binding);
    match expr {
        Expr::Num(n) => n
            .to_f64()
            .ok_or_else(|| EvaluationError::Engine("number out of range".into())),
        Expr::Const(c) => Ok(c.value()),
        Expr::Var(name) => match binding {
            Some((bound, value)) if bound == name => Ok(value),
            _ => Err(EvaluationError::UndefinedSymbol(name.clone())),
        },
        Expr::Neg(a) => Ok(-go(a)?),
        Expr::Add(a, b) => Ok(go(a)? + go(b)?),
        Expr::Sub(a, b) => Ok(go(a)? - go(b)?),
        Expr::Mul(a, b) => Ok(go(a)? * go(b)?),
        Expr::Div(a, b) => {
            let (num, den) = (go(a)?, go(b)?);
            if den == 0.0 {
                return Err(EvaluationError::DivisionByZero);
            }
            Ok(num / den)
        }
        Expr::Mod(a, b) => {
            let (num, den) = (go(a)?, go(b)?);
            if den == 0.0 {
                return Err(EvaluationError::DivisionByZero);
            }
            Ok(num % den)
        }
        Expr::Pow(a, b) => Ok(go(a)?.powf(go(b)?)),
        Expr::Call(name, args) => {
            let values = args.iter().map(go).collect::<Result<Vec<_>, _>>()?;
            call(name, &values)
        }
        Expr::Eq(..) => Err(EvaluationError::Unsupported(
            "an equation has no numeric value".into(),
        )),
    }
}

fn call(name: &str, args: &[f64]) -> Result<f64, EvaluationError> {
    if let ("log", [x, base]) = (name, args) {
        return Ok(x.ln() / base.ln());
    }

    let [x] = args else {
        return Err(EvaluationError::Parse(format!(
            "{name} expects 1 argument, got {}",
            args.len()
        )));
    };
    let x = *x;
    Ok(match name {
        "sin" => x.sin(),
        "cos" => x.cos(),
        "tan" => x.tan(),
        "asin" => x.asin(),
        "acos" => x.acos(),
        "atan" => x.atan(),
        "sinh" => x.sinh(),
        "cosh" => x.cosh(),
        "tanh" => x.tanh(),
        "sqrt" => x.sqrt(),
        "abs" => x.abs(),
        "exp" => x.exp(),
        "ln" | "log" => x.ln(),
        "log10" => x.log10(),
        "log2" => x.log2(),
        "floor" => x.floor(),
        "ceil" => x.ceil(),
        "round" => x.round(),
        other => return Err(EvaluationError::UnknownFunction(other.to_string())),
    })
}

/// Integers print without a decimal point; other values are rounded to
/// 12 decimals with trailing zeros removed.
pub fn format_number(value: f64) -> String {
    if value.abs() < 1e15 && (value - value.round()).abs() < 1e-12 {
        return format!("{}", value.round() as i64);
    }
    if value.abs() >= 1e15 || !value.is_finite() {
        return format!("{value}");
    }
    let text = format!("{value:.12}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_arithmetic() {
        let ev = NumericEvaluator::new();
        assert_eq!(ev.evaluate("2 + 2").unwrap(), "4");
        assert_eq!(ev.evaluate("10 / 4").unwrap(), "2.5");
        assert_eq!(ev.evaluate("(10 + 5) / 3 - 2 * (1 + 1)").unwrap(), "1");
        assert_eq!(ev.evaluate("7 % 3").unwrap(), "1");
    }

    #[test]
    fn functions_and_constants() {
        let ev = NumericEvaluator::new();
        assert_eq!(ev.evaluate("sqrt(16) + 2^3").unwrap(), "12");
        assert_eq!(ev.evaluate("log(8, 2)").unwrap(), "3");
        assert_eq!(ev.evaluate("sin(pi)").unwrap(), "0");
        assert_eq!(ev.evaluate("abs(-3.5)").unwrap(), "3.5");
    }

    #[test]
    fn formats_decimals() {
        let ev = NumericEvaluator::new();
        assert!(ev.evaluate("10 / 3").unwrap().starts_with("3.333"));
    }

    #[test]
    fn undefined_symbols_are_errors() {
        let ev = NumericEvaluator::new();
        assert_eq!(
            ev.evaluate("x + 1"),
            Err(EvaluationError::UndefinedSymbol("x".into()))
        );
    }

    #[test]
    fn division_by_zero() {
        let ev = NumericEvaluator::new();
        assert_eq!(ev.evaluate("1 / 0"), Err(EvaluationError::DivisionByZero));
        assert!(ev.evaluate_at("1/x", "x", 0.0).is_err());
    }

    #[test]
    fn non_real_result_is_error() {
        let ev = NumericEvaluator::new();
        assert!(ev.evaluate("sqrt(-1)").is_err());
    }

    #[test]
    fn evaluate_with_binding() {
        let ev = NumericEvaluator::new();
        assert_eq!(ev.evaluate_at("x^2", "x", 3.0).unwrap(), 9.0);
        assert_eq!(ev.evaluate_at("2x + 1", "x", -0.5).unwrap(), 0.0);
        assert!(ev.evaluate_at("x + y", "x", 1.0).is_err());
    }

    #[test]
    fn wrong_arity() {
        let ev = NumericEvaluator::new();
        assert!(ev.evaluate("sin(1, 2)").is_err());
        assert!(ev.evaluate("d(x)").is_err());
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
        assert_eq!(format_number(1.4142135623730951), "1.414213562373");
    }
}
