//! Univariate polynomials with rational coefficients.

use std::fmt;

use mathtutor_core::EvaluationError;
use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::expr::{Expr, format_rational};
use crate::numeric::format_number;

/// Highest power expanded from `(…)^n`.
const MAX_EXPANDED_POWER: usize = 64;

/// Expansion budget: highest degree and widest coefficient (in bits).
const MAX_DEGREE: usize = 256;
const MAX_COEFF_BITS: u64 = 1024;

/// Candidate-divisor ceiling for the rational root search.
const MAX_DIVISOR_SEARCH: u64 = 1_000_000_000;

/// Most `p/q` pairs tried by the rational root search.
const MAX_ROOT_CANDIDATES: usize = 4096;

/// Sample intervals used to bracket irrational roots of degree >= 3 residuals.
const NUMERIC_SAMPLES: usize = 4000;

/// Coefficients in ascending order of power, without trailing zeros.
#[derive(Debug, Clone, PartialEq)]
pub struct Poly {
    coeffs: Vec<BigRational>,
}

/// A real root, exact when rational.
#[derive(Debug, Clone, PartialEq)]
pub enum Root {
    Exact(BigRational),
    Approx(f64),
}

impl Root {
    pub fn value(&self) -> f64 {
        match self {
            Self::Exact(r) => r.to_f64().unwrap_or(f64::NAN),
            Self::Approx(v) => *v,
        }
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(r) => write!(f, "{}", format_rational(r)),
            Self::Approx(v) => write!(f, "{}", format_number(*v)),
        }
    }
}

impl Poly {
    pub fn new(coeffs: Vec<BigRational>) -> Self {
        let mut poly = Self { coeffs };
        poly.trim();
        poly
    }

    pub fn constant(c: BigRational) -> Self {
        Self::new(vec![c])
    }

    /// The identity polynomial `x`.
    pub fn identity() -> Self {
        Self::new(vec![BigRational::zero(), BigRational::one()])
    }

    fn trim(&mut self) {
        while self.coeffs.last().is_some_and(Zero::is_zero) {
            self.coeffs.pop();
        }
    }

    pub fn coefficients(&self) -> &[BigRational] {
        &self.coeffs
    }

    /// `None` for the zero polynomial.
    pub fn degree(&self) -> Option<usize> {
        self.coeffs.len().checked_sub(1)
    }

    fn coeff(&self, k: usize) -> BigRational {
        self.coeffs.get(k).cloned().unwrap_or_else(BigRational::zero)
    }

    pub fn plus(&self, other: &Poly) -> Poly {
        let len = self.coeffs.len().max(other.coeffs.len());
        Poly::new((0..len).map(|k| self.coeff(k) + other.coeff(k)).collect())
    }

    pub fn negated(&self) -> Poly {
        Poly::new(self.coeffs.iter().map(|c| -c).collect())
    }

    pub fn minus(&self, other: &Poly) -> Poly {
        self.plus(&other.negated())
    }

    /// Product, or `Unsupported` when it would exceed the expansion budget.
    pub fn times(&self, other: &Poly) -> Result<Poly, EvaluationError> {
        if self.coeffs.is_empty() || other.coeffs.is_empty() {
            return Ok(Poly::new(vec![]));
        }
        if self.coeffs.len() + other.coeffs.len() - 2 > MAX_DEGREE {
            return Err(too_large());
        }
        let mut out = vec![BigRational::zero(); self.coeffs.len() + other.coeffs.len() - 1];
        for (i, a) in self.coeffs.iter().enumerate() {
            for (j, b) in other.coeffs.iter().enumerate() {
                out[i + j] += a * b;
            }
        }
        Poly::new(out).within_budget()
    }

    pub fn scaled(&self, factor: &BigRational) -> Result<Poly, EvaluationError> {
        Poly::new(self.coeffs.iter().map(|c| c * factor).collect()).within_budget()
    }

    fn powi(&self, n: usize) -> Result<Poly, EvaluationError> {
        if self.degree().unwrap_or(0).saturating_mul(n) > MAX_DEGREE {
            return Err(too_large());
        }
        let mut acc = Poly::constant(BigRational::one());
        for _ in 0..n {
            acc = acc.times(self)?;
        }
        Ok(acc)
    }

    fn within_budget(self) -> Result<Poly, EvaluationError> {
        let widest = self
            .coeffs
            .iter()
            .map(|c| c.numer().bits().max(c.denom().bits()))
            .max()
            .unwrap_or(0);
        if widest > MAX_COEFF_BITS {
            return Err(too_large());
        }
        Ok(self)
    }

    /// Read `expr` as a polynomial in `var`; `Ok(None)` when it is not one.
    ///
    /// Fails with `Unsupported` when the expansion would exceed the degree
    /// or coefficient budget.
    pub fn from_expr(expr: &Expr, var: &str) -> Result<Option<Poly>, EvaluationError> {
        let read = |e: &Expr| Poly::from_expr(e, var);
        Ok(Some(match expr {
            Expr::Num(n) => Poly::constant(n.clone()).within_budget()?,
            Expr::Var(v) if v == var => Poly::identity(),
            Expr::Neg(a) => match read(a)? {
                Some(a) => a.negated(),
                None => return Ok(None),
            },
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) => {
                let (Some(a), Some(b)) = (read(a)?, read(b)?) else {
                    return Ok(None);
                };
                match expr {
                    Expr::Add(..) => a.plus(&b).within_budget()?,
                    Expr::Sub(..) => a.minus(&b).within_budget()?,
                    _ => a.times(&b)?,
                }
            }
            Expr::Div(a, b) => {
                let Some(divisor) = read(b)? else {
                    return Ok(None);
                };
                if divisor.degree() != Some(0) {
                    return Ok(None);
                }
                let inverse = divisor.coeffs[0].recip();
                match read(a)? {
                    Some(a) => a.scaled(&inverse)?,
                    None => return Ok(None),
                }
            }
            Expr::Pow(base, exponent) => {
                let Some(n) = exponent.as_rational() else {
                    return Ok(None);
                };
                if !n.is_integer() || n.is_negative() {
                    return Ok(None);
                }
                let Some(n) = n.to_integer().to_usize().filter(|n| *n <= MAX_EXPANDED_POWER) else {
                    return Ok(None);
                };
                match read(base)? {
                    Some(base) => base.powi(n)?,
                    None => return Ok(None),
                }
            }
            _ => return Ok(None),
        }))
    }

    /// Canonical expression, highest power first: `x^2+2*x+1`, `1/3*x^3`.
    pub fn to_expr(&self, var: &str) -> Expr {
        let mut acc: Option<Expr> = None;
        for (k, c) in self.coeffs.iter().enumerate().rev() {
            if c.is_zero() {
                continue;
            }
            let magnitude = c.abs();
            let term = match k {
                0 => Expr::Num(magnitude),
                _ => {
                    let base = if k == 1 {
                        Expr::var(var)
                    } else {
                        Expr::var(var).pow(Expr::int(k as i64))
                    };
                    if magnitude.is_one() {
                        base
                    } else {
                        Expr::Num(magnitude) * base
                    }
                }
            };
            acc = Some(match acc {
                None if c.is_negative() => match term {
                    Expr::Num(n) => Expr::Num(-n),
                    Expr::Mul(coeff, base) => Expr::Mul(Box::new(-*coeff), base).simplify(),
                    other => -other,
                },
                None => term,
                Some(prev) if c.is_negative() => prev - term,
                Some(prev) => prev + term,
            });
        }
        acc.unwrap_or_else(|| Expr::int(0))
    }

    pub fn eval(&self, x: &BigRational) -> BigRational {
        self.coeffs
            .iter()
            .rev()
            .fold(BigRational::zero(), |acc, c| acc * x + c)
    }

    fn eval_f64(coeffs: &[f64], x: f64) -> f64 {
        coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
    }

    pub fn antiderivative(&self) -> Poly {
        let mut out = vec![BigRational::zero()];
        for (k, c) in self.coeffs.iter().enumerate() {
            out.push(c / BigRational::from_integer(BigInt::from(k + 1)));
        }
        Poly::new(out)
    }

    /// Real roots in ascending order, each listed once.
    pub fn real_roots(&self) -> Vec<Root> {
        let mut roots = Vec::new();
        let mut poly = self.clone();
        if poly.degree().unwrap_or(0) == 0 {
            return roots;
        }

        if poly.coeffs[0].is_zero() {
            roots.push(Root::Exact(BigRational::zero()));
            while poly.coeffs.first().is_some_and(Zero::is_zero) {
                poly.coeffs.remove(0);
            }
        }

        loop {
            match poly.degree() {
                Some(1) => {
                    roots.push(Root::Exact(-&poly.coeffs[0] / &poly.coeffs[1]));
                    break;
                }
                Some(2) => {
                    roots.extend(quadratic_roots(&poly.coeffs[2], &poly.coeffs[1], &poly.coeffs[0]));
                    break;
                }
                Some(d) if d >= 3 => match poly.rational_root() {
                    Some(r) => {
                        poly = poly.deflate(&r);
                        roots.push(Root::Exact(r));
                    }
                    None => {
                        roots.extend(poly.numeric_roots().into_iter().map(Root::Approx));
                        break;
                    }
                },
                _ => break,
            }
        }

        roots.sort_by(|a, b| a.value().total_cmp(&b.value()));
        roots.dedup_by(|a, b| (a.value() - b.value()).abs() < 1e-9);
        roots
    }

    /// Search ±p/q with p | a0 and q | an.
    fn rational_root(&self) -> Option<BigRational> {
        let scale = self
            .coeffs
            .iter()
            .fold(BigInt::one(), |acc, c| acc.lcm(c.denom()));
        let scale = BigRational::from_integer(scale);
        let ints: Vec<BigInt> = self.coeffs.iter().map(|c| (c * &scale).to_integer()).collect();

        let a0 = ints.first()?.abs().to_u64()?;
        let an = ints.last()?.abs().to_u64()?;
        if a0 == 0 {
            return Some(BigRational::zero());
        }
        if a0 > MAX_DIVISOR_SEARCH || an > MAX_DIVISOR_SEARCH {
            return None;
        }

        let (numerators, denominators) = (divisors(a0), divisors(an));
        if numerators.len() * denominators.len() > MAX_ROOT_CANDIDATES {
            return None;
        }
        for &p in &numerators {
            for &q in &denominators {
                for sign in [1i64, -1] {
                    let candidate = BigRational::new(BigInt::from(p) * sign, BigInt::from(q));
                    if self.eval(&candidate).is_zero() {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }

    /// Divide by `(x - root)`; the remainder is zero for a true root.
    fn deflate(&self, root: &BigRational) -> Poly {
        let n = self.coeffs.len() - 1;
        let mut quotient = vec![BigRational::zero(); n];
        quotient[n - 1] = self.coeffs[n].clone();
        for k in (1..n).rev() {
            quotient[k - 1] = &self.coeffs[k] + root * &quotient[k];
        }
        Poly::new(quotient)
    }

    /// Sign-change bracketing + bisection inside the Cauchy bound.
    fn numeric_roots(&self) -> Vec<f64> {
        let coeffs: Vec<f64> = self.coeffs.iter().map(|c| c.to_f64().unwrap_or(0.0)).collect();
        let Some(lead) = coeffs.last().copied().filter(|c| *c != 0.0) else {
            return vec![];
        };
        let bound = 1.0
            + coeffs[..coeffs.len() - 1]
                .iter()
                .map(|c| (c / lead).abs())
                .fold(0.0, f64::max);

        let step = 2.0 * bound / NUMERIC_SAMPLES as f64;
        let mut roots = Vec::new();
        for i in 0..NUMERIC_SAMPLES {
            let (mut lo, mut hi) = (-bound + i as f64 * step, -bound + (i + 1) as f64 * step);
            let (f_lo, f_hi) = (Self::eval_f64(&coeffs, lo), Self::eval_f64(&coeffs, hi));
            if f_lo == 0.0 {
                roots.push(lo);
                continue;
            }
            if f_lo.signum() == f_hi.signum() {
                continue;
            }
            for _ in 0..200 {
                let mid = 0.5 * (lo + hi);
                let f_mid = Self::eval_f64(&coeffs, mid);
                if f_mid == 0.0 {
                    lo = mid;
                    hi = mid;
                    break;
                }
                if f_mid.signum() == f_lo.signum() {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            roots.push(0.5 * (lo + hi));
        }
        roots
    }
}

fn too_large() -> EvaluationError {
    EvaluationError::Unsupported("polynomial too large to expand".into())
}

fn quadratic_roots(a: &BigRational, b: &BigRational, c: &BigRational) -> Vec<Root> {
    let four = BigRational::from_integer(BigInt::from(4));
    let two_a = a + a;
    let disc = b * b - four * a * c;

    if disc.is_negative() {
        return vec![];
    }
    if disc.is_zero() {
        return vec![Root::Exact(-b / &two_a)];
    }
    if let Some(s) = rational_sqrt(&disc) {
        return vec![
            Root::Exact((-b - &s) / &two_a),
            Root::Exact((-b + &s) / &two_a),
        ];
    }

    let (b, two_a, s) = (
        b.to_f64().unwrap_or(f64::NAN),
        two_a.to_f64().unwrap_or(f64::NAN),
        disc.to_f64().unwrap_or(f64::NAN).sqrt(),
    );
    vec![Root::Approx((-b - s) / two_a), Root::Approx((-b + s) / two_a)]
}

fn rational_sqrt(q: &BigRational) -> Option<BigRational> {
    let (n, d) = (q.numer(), q.denom());
    let (sn, sd) = (n.sqrt(), d.sqrt());
    (&sn * &sn == *n && &sd * &sd == *d).then(|| BigRational::new(sn, sd))
}

fn divisors(n: u64) -> Vec<u64> {
    let mut out = Vec::new();
    let mut i = 1;
    while i * i <= n {
        if n % i == 0 {
            out.push(i);
            if i != n / i {
                out.push(n / i);
            }
        }
        i += 1;
    }
    out.sort_unstable();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn poly(input: &str) -> Poly {
        Poly::from_expr(&parse(input).unwrap(), "x").unwrap().unwrap()
    }

    fn read(input: &str) -> Result<Option<Poly>, EvaluationError> {
        Poly::from_expr(&parse(input).unwrap(), "x")
    }

    fn roots(input: &str) -> String {
        poly(input)
            .real_roots()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    #[test]
    fn expands_products_and_powers() {
        assert_eq!(poly("(x+1)^2").to_expr("x").to_string(), "x^2+2*x+1");
        assert_eq!(poly("(x-1)(x+1)").to_expr("x").to_string(), "x^2-1");
        assert_eq!(poly("x/2 - 3").to_expr("x").to_string(), "1/2*x-3");
    }

    #[test]
    fn negative_leading_terms() {
        assert_eq!(poly("-x^2 + x").to_expr("x").to_string(), "-x^2+x");
        assert_eq!(poly("-2x - 1").to_expr("x").to_string(), "-2*x-1");
        assert_eq!(poly("0*x").to_expr("x").to_string(), "0");
    }

    #[test]
    fn not_polynomials() {
        assert_eq!(read("sin(x)"), Ok(None));
        assert_eq!(read("1/x"), Ok(None));
        assert_eq!(read("x^(1/2)"), Ok(None));
        assert_eq!(read("x*y"), Ok(None));
    }

    #[test]
    fn expansion_stops_at_the_budget() {
        assert_eq!(poly("(x+1)^64").degree(), Some(64));
        assert!(matches!(
            read("(((x+1)^64)^64)^64"),
            Err(EvaluationError::Unsupported(_))
        ));
        assert!(matches!(
            read("(x^2+1)^64 * (x^2+1)^64 * (x+1)"),
            Err(EvaluationError::Unsupported(_))
        ));
    }

    #[test]
    fn antiderivative() {
        assert_eq!(poly("x^2").antiderivative().to_expr("x").to_string(), "1/3*x^3");
        assert_eq!(poly("2x + 1").antiderivative().to_expr("x").to_string(), "x^2+x");
    }

    #[test]
    fn linear_and_quadratic_roots() {
        assert_eq!(roots("2x - 3"), "3/2");
        assert_eq!(roots("x^2 - 4"), "-2,2");
        assert_eq!(roots("x^2 - 2x + 1"), "1");
        assert_eq!(roots("x^2 + 1"), "");
    }

    #[test]
    fn irrational_roots_are_approximate() {
        let r = poly("x^2 - 2").real_roots();
        assert_eq!(r.len(), 2);
        assert!(matches!(r[0], Root::Approx(_)));
        assert!((r[1].value() - std::f64::consts::SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn cubic_by_deflation() {
        assert_eq!(roots("x^3 - 6x^2 + 11x - 6"), "1,2,3");
        assert_eq!(roots("x^3 - x"), "-1,0,1");
        assert_eq!(roots("2x^3 - x^2 - 2x + 1"), "-1,1/2,1");
    }

    #[test]
    fn cubic_with_irrational_roots_falls_back_to_numeric() {
        let r = poly("x^3 - 3x + 1").real_roots();
        assert_eq!(r.len(), 3);
        for root in &r {
            let v = root.value();
            assert!((v * v * v - 3.0 * v + 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn constants_have_no_roots() {
        assert!(poly("5").real_roots().is_empty());
        assert!(poly("0").real_roots().is_empty());
    }
}
