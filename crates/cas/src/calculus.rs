//! Symbolic differentiation and elementary antiderivatives.

use mathtutor_core::EvaluationError;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::One;

use crate::expr::Expr;
use crate::poly::Poly;

fn is_var(expr: &Expr, var: &str) -> bool {
    matches!(expr, Expr::Var(v) if v == var)
}

fn unsupported(what: &str, expr: &Expr) -> EvaluationError {
    EvaluationError::Unsupported(format!("{what} of {expr}"))
}

/// `d/d var` of `expr`, simplified.
pub fn derivative(expr: &Expr, var: &str) -> Result<Expr, EvaluationError> {
    Ok(differentiate(expr, var)?.simplify())
}

fn differentiate(expr: &Expr, var: &str) -> Result<Expr, EvaluationError> {
    if !expr.contains_var(var) {
        return Ok(Expr::int(0));
    }

    Ok(match expr {
        Expr::Var(_) => Expr::int(1),
        Expr::Neg(a) => -differentiate(a, var)?,
        Expr::Add(a, b) => differentiate(a, var)? + differentiate(b, var)?,
        Expr::Sub(a, b) => differentiate(a, var)? - differentiate(b, var)?,
        Expr::Mul(a, b) => {
            let (a, b) = (a.as_ref().clone(), b.as_ref().clone());
            differentiate(&a, var)? * b.clone() + a.clone() * differentiate(&b, var)?
        }
        Expr::Div(a, b) => {
            let (a, b) = (a.as_ref().clone(), b.as_ref().clone());
            (differentiate(&a, var)? * b.clone() - a * differentiate(&b, var)?)
                / b.pow(Expr::int(2))
        }
        Expr::Pow(base, exponent) => {
            let (base, exponent) = (base.as_ref().clone(), exponent.as_ref().clone());
            if !exponent.contains_var(var) {
                // power rule
                exponent.clone()
                    * base.clone().pow(exponent - Expr::int(1))
                    * differentiate(&base, var)?
            } else if !base.contains_var(var) {
                base.clone().pow(exponent.clone())
                    * Expr::call("ln", base)
                    * differentiate(&exponent, var)?
            } else {
                // d(u^v) = u^v * (v' ln u + v u'/u)
                base.clone().pow(exponent.clone())
                    * (differentiate(&exponent, var)? * Expr::call("ln", base.clone())
                        + exponent * differentiate(&base, var)? / base)
            }
        }
        Expr::Call(name, args) if args.len() == 1 => {
            let u = args[0].clone();
            let du = differentiate(&u, var)?;
            let outer = match name.as_str() {
                "sin" => Expr::call("cos", u),
                "cos" => -Expr::call("sin", u),
                "tan" => Expr::int(1) / Expr::call("cos", u).pow(Expr::int(2)),
                "exp" => Expr::call("exp", u),
                "ln" | "log" => Expr::int(1) / u,
                "log10" => Expr::int(1) / (u * Expr::call("ln", Expr::int(10))),
                "log2" => Expr::int(1) / (u * Expr::call("ln", Expr::int(2))),
                "sqrt" => Expr::int(1) / (Expr::int(2) * Expr::call("sqrt", u)),
                "sinh" => Expr::call("cosh", u),
                "cosh" => Expr::call("sinh", u),
                "tanh" => Expr::int(1) / Expr::call("cosh", u).pow(Expr::int(2)),
                "asin" => Expr::int(1) / Expr::call("sqrt", Expr::int(1) - u.pow(Expr::int(2))),
                "acos" => -(Expr::int(1) / Expr::call("sqrt", Expr::int(1) - u.pow(Expr::int(2)))),
                "atan" => Expr::int(1) / (Expr::int(1) + u.pow(Expr::int(2))),
                "abs" => u.clone() / Expr::call("abs", u),
                _ => return Err(unsupported("derivative", expr)),
            };
            outer * du
        }
        _ => return Err(unsupported("derivative", expr)),
    })
}

/// An antiderivative of `expr` in `var` (no constant of integration).
///
/// Polynomials integrate term by term; otherwise linear combinations of
/// `x^n`, `1/x`, `sin x`, `cos x`, `exp x`, `sqrt x`, `sinh x` and `cosh x`
/// are supported.
pub fn integral(expr: &Expr, var: &str) -> Result<Expr, EvaluationError> {
    if let Some(poly) = Poly::from_expr(expr, var)? {
        return Ok(poly.antiderivative().to_expr(var));
    }
    Ok(antiderivative(expr, var)?.simplify())
}

fn antiderivative(expr: &Expr, var: &str) -> Result<Expr, EvaluationError> {
    let x = Expr::var(var);
    if !expr.contains_var(var) {
        return Ok(expr.clone() * x);
    }
    if let Some(poly) = Poly::from_expr(expr, var)? {
        return Ok(poly.antiderivative().to_expr(var));
    }

    let ln_abs = || Expr::call("ln", Expr::call("abs", Expr::var(var)));

    Ok(match expr {
        Expr::Neg(a) => -antiderivative(a, var)?,
        Expr::Add(a, b) => antiderivative(a, var)? + antiderivative(b, var)?,
        Expr::Sub(a, b) => antiderivative(a, var)? - antiderivative(b, var)?,
        Expr::Mul(a, b) if !a.contains_var(var) => a.as_ref().clone() * antiderivative(b, var)?,
        Expr::Mul(a, b) if !b.contains_var(var) => antiderivative(a, var)? * b.as_ref().clone(),
        Expr::Div(a, b) if !b.contains_var(var) => antiderivative(a, var)? / b.as_ref().clone(),
        Expr::Div(a, b) if !a.contains_var(var) && is_var(b, var) => a.as_ref().clone() * ln_abs(),
        Expr::Pow(base, exponent) if is_var(base, var) => {
            let n = exponent
                .clone()
                .simplify()
                .as_rational()
                .cloned()
                .ok_or_else(|| unsupported("integral", expr))?;
            let minus_one = -BigRational::one();
            if n == minus_one {
                ln_abs()
            } else {
                let next = n + BigRational::one();
                Expr::Num(next.recip()) * x.pow(Expr::Num(next))
            }
        }
        Expr::Call(name, args) if args.len() == 1 && is_var(&args[0], var) => match name.as_str() {
            "sin" => -Expr::call("cos", x),
            "cos" => Expr::call("sin", x),
            "exp" => Expr::call("exp", x),
            "sinh" => Expr::call("cosh", x),
            "cosh" => Expr::call("sinh", x),
            "sqrt" => {
                let three_halves = BigRational::new(BigInt::from(3), BigInt::from(2));
                Expr::Num(three_halves.recip()) * x.pow(Expr::Num(three_halves))
            }
            _ => return Err(unsupported("integral", expr)),
        },
        _ => return Err(unsupported("integral", expr)),
    })
}
