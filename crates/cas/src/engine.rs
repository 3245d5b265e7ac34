//! The command-level algebra engine.

use mathtutor_core::algebra::{EMPTY_LIST, UNDEFINED};
use mathtutor_core::{AlgebraEngine, EvaluationError};
use tracing::debug;

use crate::calculus::{derivative, integral};
use crate::expr::{Expr, format_rational};
use crate::numeric::{eval, format_number};
use crate::parser::parse;
use crate::poly::{Poly, Root};

/// Text-in, text-out symbolic engine.
///
/// | Input | Output |
/// |---|---|
/// | `integral(E[, x])` | antiderivative, e.g. `1/3*x^3` |
/// | `d(E[, x])` | derivative |
/// | `roots(E)` | real roots of a polynomial, `[]` for none or for an equation |
/// | `solve(L=R[, x])` | real roots of `L-R`, `[]` for none |
/// | `simplify(E)` / `E` | exact value, canonical polynomial, or simplified form |
///
/// A bare equation in one variable is solved for that variable.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymbolicEngine;

impl SymbolicEngine {
    pub fn new() -> Self {
        Self
    }

    fn run_command(&self, name: &str, args: &[Expr]) -> Result<String, EvaluationError> {
        let (body, var) = match args {
            [body] => (body, default_var(body)),
            [body, Expr::Var(v)] => (body, v.clone()),
            [_, other] => {
                return Err(EvaluationError::Parse(format!(
                    "{name}: expected a variable name, got {other}"
                )));
            }
            _ => {
                return Err(EvaluationError::Parse(format!(
                    "{name} expects 1 or 2 arguments, got {}",
                    args.len()
                )));
            }
        };

        match name {
            "integral" => render(integral(reject_equation(name, body)?, &var)?),
            "d" => render(derivative(reject_equation(name, body)?, &var)?),
            "simplify" => render(reject_equation(name, body)?.clone()),
            // roots() only accepts expressions; equations go through solve()
            "roots" if matches!(body, Expr::Eq(..)) => Ok(EMPTY_LIST.to_string()),
            "roots" => solve_for(body, &var),
            "solve" => match body {
                Expr::Eq(lhs, rhs) => solve_for(&(lhs.as_ref().clone() - rhs.as_ref().clone()), &var),
                expr => solve_for(expr, &var),
            },
            other => Err(EvaluationError::UnknownFunction(other.to_string())),
        }
    }
}

const COMMANDS: &[&str] = &["integral", "d", "roots", "solve", "simplify"];

impl AlgebraEngine for SymbolicEngine {
    fn run(&self, input: &str) -> Result<String, EvaluationError> {
        let expr = parse(input)?;
        let output = match &expr {
            Expr::Call(name, args) if COMMANDS.contains(&name.as_str()) => {
                self.run_command(name, args)
            }
            Expr::Eq(lhs, rhs) => match expr.free_vars().len() {
                1 => solve_for(&(lhs.as_ref().clone() - rhs.as_ref().clone()), &default_var(&expr)),
                _ => Err(EvaluationError::Unsupported(format!(
                    "cannot solve {expr} without a single unknown"
                ))),
            },
            _ => render(expr.clone()),
        };
        debug!(input, ok = output.is_ok(), "Algebra engine run");
        output
    }
}

fn reject_equation<'a>(command: &str, body: &'a Expr) -> Result<&'a Expr, EvaluationError> {
    match body {
        Expr::Eq(..) => Err(EvaluationError::Unsupported(format!(
            "{command} of an equation"
        ))),
        other => Ok(other),
    }
}

/// `x` when present, else the only variable, else `x`.
fn default_var(expr: &Expr) -> String {
    let vars = expr.free_vars();
    if vars.contains("x") || vars.len() != 1 {
        return "x".to_string();
    }
    vars.into_iter().next().unwrap_or_else(|| "x".to_string())
}

/// Real roots of `expr = 0` as `[r1,r2,...]`.
fn solve_for(expr: &Expr, var: &str) -> Result<String, EvaluationError> {
    let expr = expr.clone().simplify();
    let others: Vec<String> = expr.free_vars().into_iter().filter(|v| v != var).collect();
    if !others.is_empty() {
        return Err(EvaluationError::Unsupported(format!(
            "cannot solve for {var} with other unknowns ({})",
            others.join(", ")
        )));
    }

    let poly = Poly::from_expr(&expr, var)?
        .ok_or_else(|| EvaluationError::Unsupported(format!("{expr} is not a polynomial in {var}")))?;
    Ok(format_roots(&poly.real_roots()))
}

fn format_roots(roots: &[Root]) -> String {
    let items: Vec<String> = roots.iter().map(ToString::to_string).collect();
    format!("[{}]", items.join(","))
}

/// Canonical text for a result expression.
fn render(expr: Expr) -> Result<String, EvaluationError> {
    let expr = expr.simplify();
    let vars = expr.free_vars();

    if vars.is_empty() {
        if let Some(exact) = expr.exact_value()? {
            return Ok(format_rational(&exact));
        }
        let value = eval(&expr, None)?;
        if !value.is_finite() {
            return Ok(UNDEFINED.to_string());
        }
        return Ok(format_number(value));
    }

    if let [var] = vars.iter().collect::<Vec<_>>()[..] {
        if let Some(poly) = Poly::from_expr(&expr, var)? {
            return Ok(poly.to_expr(var).to_string());
        }
    }
    Ok(expr.to_string())
}
