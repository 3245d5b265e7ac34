//! Expression tree with exact rational literals.

use std::collections::BTreeSet;
use std::fmt;

use mathtutor_core::EvaluationError;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};

/// Largest numerator or denominator, in bits, that an exact power may produce.
pub const MAX_EXACT_BITS: u64 = 16_384;

/// Named mathematical constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constant {
    Pi,
    E,
}

impl Constant {
    pub fn value(self) -> f64 {
        match self {
            Self::Pi => std::f64::consts::PI,
            Self::E => std::f64::consts::E,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Pi => "pi",
            Self::E => "e",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(BigRational),
    Const(Constant),
    Var(String),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Mod(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    /// `lhs = rhs`, only valid at the top level or as a call argument.
    Eq(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn int(n: i64) -> Self {
        Self::Num(BigRational::from_integer(BigInt::from(n)))
    }

    pub fn var(name: &str) -> Self {
        Self::Var(name.to_string())
    }

    pub fn call(name: &str, arg: Expr) -> Self {
        Self::Call(name.to_string(), vec![arg])
    }

    pub fn pow(self, exponent: Expr) -> Self {
        Self::Pow(Box::new(self), Box::new(exponent))
    }

    pub fn as_rational(&self) -> Option<&BigRational> {
        match self {
            Self::Num(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_rational().is_some_and(Zero::is_zero)
    }

    pub fn is_one(&self) -> bool {
        self.as_rational().is_some_and(One::is_one)
    }

    fn is_minus_one(&self) -> bool {
        self.as_rational().is_some_and(|n| (-n).is_one())
    }

    fn is_negative(&self) -> bool {
        match self {
            Self::Neg(_) => true,
            Self::Num(n) => n.is_negative(),
            _ => false,
        }
    }

    /// True when `name` occurs as a variable anywhere in the tree.
    pub fn contains_var(&self, name: &str) -> bool {
        match self {
            Self::Num(_) | Self::Const(_) => false,
            Self::Var(v) => v == name,
            Self::Neg(a) => a.contains_var(name),
            Self::Add(a, b)
            | Self::Sub(a, b)
            | Self::Mul(a, b)
            | Self::Div(a, b)
            | Self::Pow(a, b)
            | Self::Mod(a, b)
            | Self::Eq(a, b) => a.contains_var(name) || b.contains_var(name),
            Self::Call(_, args) => args.iter().any(|a| a.contains_var(name)),
        }
    }

    /// All variable names, sorted.
    pub fn free_vars(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        self.collect_vars(&mut vars);
        vars
    }

    fn collect_vars(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Num(_) | Self::Const(_) => {}
            Self::Var(v) => {
                out.insert(v.clone());
            }
            Self::Neg(a) => a.collect_vars(out),
            Self::Add(a, b)
            | Self::Sub(a, b)
            | Self::Mul(a, b)
            | Self::Div(a, b)
            | Self::Pow(a, b)
            | Self::Mod(a, b)
            | Self::Eq(a, b) => {
                a.collect_vars(out);
                b.collect_vars(out);
            }
            Self::Call(_, args) => args.iter().for_each(|a| a.collect_vars(out)),
        }
    }

    /// Exact value of a constant rational expression.
    ///
    /// `Ok(None)` means the expression is not a pure rational (it has
    /// variables, constants, function calls or a fractional exponent).
    pub fn exact_value(&self) -> Result<Option<BigRational>, EvaluationError> {
        let pair = |a: &Expr, b: &Expr| -> Result<Option<(BigRational, BigRational)>, EvaluationError> {
            match (a.exact_value()?, b.exact_value()?) {
                (Some(x), Some(y)) => Ok(Some((x, y))),
                _ => Ok(None),
            }
        };

        Ok(match self {
            Self::Num(n) => Some(n.clone()),
            Self::Neg(a) => a.exact_value()?.map(|n| -n),
            Self::Add(a, b) => pair(a, b)?.map(|(x, y)| x + y),
            Self::Sub(a, b) => pair(a, b)?.map(|(x, y)| x - y),
            Self::Mul(a, b) => pair(a, b)?.map(|(x, y)| x * y),
            Self::Div(a, b) => match pair(a, b)? {
                Some((_, y)) if y.is_zero() => return Err(EvaluationError::DivisionByZero),
                Some((x, y)) => Some(x / y),
                None => None,
            },
            Self::Mod(a, b) => match pair(a, b)? {
                Some((_, y)) if y.is_zero() => return Err(EvaluationError::DivisionByZero),
                Some((x, y)) => Some(x % y),
                None => None,
            },
            Self::Pow(a, b) => match pair(a, b)? {
                Some((base, exp)) if exp.is_integer() => match exp.to_integer().to_i64() {
                    Some(e) => Some(rational_pow(&base, e)?),
                    None => return Err(too_large()),
                },
                _ => None,
            },
            Self::Const(_) | Self::Var(_) | Self::Call(..) | Self::Eq(..) => None,
        })
    }

    /// Bottom-up algebraic cleanup: folds rational constants and removes
    /// identities (`0+a`, `1*a`, `a^1`, ...). Never fails; division by a
    /// literal zero is left in place for evaluation to report.
    pub fn simplify(self) -> Expr {
        match self {
            Self::Neg(a) => match a.simplify() {
                Self::Num(n) => Self::Num(-n),
                Self::Neg(inner) => *inner,
                other => Self::Neg(Box::new(other)),
            },
            Self::Add(a, b) => match (a.simplify(), b.simplify()) {
                (Self::Num(x), Self::Num(y)) => Self::Num(x + y),
                (a, b) if a.is_zero() => b,
                (a, b) if b.is_zero() => a,
                (a, Self::Neg(b)) => Self::Sub(Box::new(a), b),
                (a, Self::Num(n)) if n.is_negative() => Self::Sub(Box::new(a), Box::new(Self::Num(-n))),
                (a, b) => Self::Add(Box::new(a), Box::new(b)),
            },
            Self::Sub(a, b) => match (a.simplify(), b.simplify()) {
                (Self::Num(x), Self::Num(y)) => Self::Num(x - y),
                (a, b) if b.is_zero() => a,
                (a, b) if a.is_zero() => Self::Neg(Box::new(b)).simplify(),
                (a, b) if a == b => Self::int(0),
                (a, Self::Neg(b)) => Self::Add(Box::new(a), b),
                (a, Self::Num(n)) if n.is_negative() => Self::Add(Box::new(a), Box::new(Self::Num(-n))),
                (a, b) => Self::Sub(Box::new(a), Box::new(b)),
            },
            Self::Mul(a, b) => match (a.simplify(), b.simplify()) {
                (Self::Num(x), Self::Num(y)) => Self::Num(x * y),
                (a, b) if a.is_zero() || b.is_zero() => Self::int(0),
                (a, b) if a.is_one() => b,
                (a, b) if b.is_one() => a,
                (a, b) if a.is_minus_one() => Self::Neg(Box::new(b)),
                (a, b) if b.is_minus_one() => Self::Neg(Box::new(a)),
                (Self::Num(x), Self::Mul(inner_a, inner_b)) if inner_a.as_rational().is_some() => {
                    let y = inner_a.as_rational().cloned().unwrap_or_else(BigRational::one);
                    Self::Mul(Box::new(Self::Num(x * y)), inner_b).simplify()
                }
                (a, Self::Num(n)) => Self::Mul(Box::new(Self::Num(n)), Box::new(a)).simplify(),
                (a, Self::Mul(inner_a, inner_b))
                    if inner_a.as_rational().is_some() && a.as_rational().is_none() =>
                {
                    Self::Mul(inner_a, Box::new(Self::Mul(Box::new(a), inner_b))).simplify()
                }
                (Self::Neg(a), b) => Self::Neg(Box::new(Self::Mul(a, Box::new(b)))),
                (a, Self::Neg(b)) => Self::Neg(Box::new(Self::Mul(Box::new(a), b))),
                (a, b) => Self::Mul(Box::new(a), Box::new(b)),
            },
            Self::Div(a, b) => match (a.simplify(), b.simplify()) {
                (Self::Num(x), Self::Num(y)) if !y.is_zero() => Self::Num(x / y),
                (a, b) if b.is_one() => a,
                (a, b) if a.is_zero() && !b.is_zero() => Self::int(0),
                (a, b) => Self::Div(Box::new(a), Box::new(b)),
            },
            Self::Mod(a, b) => match (a.simplify(), b.simplify()) {
                (Self::Num(x), Self::Num(y)) if !y.is_zero() => Self::Num(x % y),
                (a, b) => Self::Mod(Box::new(a), Box::new(b)),
            },
            Self::Pow(a, b) => match (a.simplify(), b.simplify()) {
                (Self::Num(x), Self::Num(y)) if y.is_integer() => {
                    match y.to_integer().to_i64().map(|e| rational_pow(&x, e)) {
                        Some(Ok(value)) => Self::Num(value),
                        _ => Self::Num(x).pow(Self::Num(y)),
                    }
                }
                (_, b) if b.is_zero() => Self::int(1),
                (a, b) if b.is_one() => a,
                (a, b) => a.pow(b),
            },
            Self::Call(name, args) => Self::Call(name, args.into_iter().map(Expr::simplify).collect()),
            Self::Eq(a, b) => Self::Eq(Box::new(a.simplify()), Box::new(b.simplify())),
            atom => atom,
        }
    }

    /// Binding strength used when printing.
    fn precedence(&self) -> u8 {
        match self {
            Self::Eq(..) => 0,
            Self::Add(..) | Self::Sub(..) => 1,
            Self::Mul(..) | Self::Div(..) | Self::Mod(..) => 2,
            Self::Num(n) if !n.is_integer() => 2,
            Self::Neg(_) => 3,
            Self::Num(n) if n.is_negative() => 3,
            Self::Pow(..) => 4,
            Self::Num(_) | Self::Const(_) | Self::Var(_) | Self::Call(..) => 5,
        }
    }
}

fn too_large() -> EvaluationError {
    EvaluationError::Unsupported("number too large to compute exactly".into())
}

/// `base^exp` over the rationals; fails before computing a result wider
/// than [`MAX_EXACT_BITS`].
pub fn rational_pow(base: &BigRational, exp: i64) -> Result<BigRational, EvaluationError> {
    let width = base.numer().bits().max(base.denom().bits());
    if width > 1 && width.saturating_mul(exp.unsigned_abs()) > MAX_EXACT_BITS {
        return Err(too_large());
    }
    let magnitude = num_traits::pow(base.clone(), exp.unsigned_abs() as usize);
    if exp >= 0 {
        Ok(magnitude)
    } else if magnitude.is_zero() {
        Err(EvaluationError::DivisionByZero)
    } else {
        Ok(magnitude.recip())
    }
}

/// `3`, `-2`, `1/3`, `-5/2`.
pub fn format_rational(n: &BigRational) -> String {
    if n.is_integer() {
        n.numer().to_string()
    } else {
        format!("{}/{}", n.numer(), n.denom())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{}", format_rational(n)),
            Self::Const(c) => write!(f, "{}", c.name()),
            Self::Var(v) => write!(f, "{v}"),
            Self::Neg(a) => {
                write!(f, "-")?;
                write_operand(f, a, 2, true)
            }
            Self::Add(a, b) => {
                write_operand(f, a, 1, false)?;
                write!(f, "+")?;
                write_operand(f, b, 1, true)
            }
            Self::Sub(a, b) => {
                write_operand(f, a, 1, false)?;
                write!(f, "-")?;
                write_operand(f, b, 2, true)
            }
            Self::Mul(a, b) => {
                write_operand(f, a, 2, false)?;
                write!(f, "*")?;
                if matches!(**b, Self::Mod(..)) {
                    write!(f, "({b})")
                } else {
                    write_operand(f, b, 2, true)
                }
            }
            Self::Div(a, b) | Self::Mod(a, b) => {
                let op = if matches!(self, Self::Div(..)) { "/" } else { "%" };
                write_operand(f, a, 2, false)?;
                write!(f, "{op}")?;
                write_operand(f, b, 3, true)
            }
            Self::Pow(a, b) => {
                write_operand(f, a, 5, false)?;
                write!(f, "^")?;
                write_operand(f, b, 5, false)
            }
            Self::Call(name, args) => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Self::Eq(a, b) => write!(f, "{a}={b}"),
        }
    }
}

/// Print `child`, parenthesized when it binds looser than `min` or, on the
/// right of an operator, when it starts with a minus sign.
fn write_operand(f: &mut fmt::Formatter<'_>, child: &Expr, min: u8, right: bool) -> fmt::Result {
    if child.precedence() < min || (right && child.is_negative()) {
        write!(f, "({child})")
    } else {
        write!(f, "{child}")
    }
}

impl std::ops::Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::Add(Box::new(self), Box::new(rhs))
    }
}

impl std::ops::Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }
}

impl std::ops::Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::Mul(Box::new(self), Box::new(rhs))
    }
}

impl std::ops::Div for Expr {
    type Output = Expr;
    fn div(self, rhs: Expr) -> Expr {
        Expr::Div(Box::new(self), Box::new(rhs))
    }
}

impl std::ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Expr {
        Expr::var("x")
    }

    #[test]
    fn folds_constants() {
        let e = (Expr::int(2) + Expr::int(3)) * Expr::int(4);
        assert_eq!(e.simplify(), Expr::int(20));
    }

    #[test]
    fn removes_identities() {
        let e = Expr::int(0) + Expr::int(1) * x().pow(Expr::int(1));
        assert_eq!(e.simplify(), x());
    }

    #[test]
    fn coefficient_moves_left() {
        let e = (x() * Expr::int(3)).simplify();
        assert_eq!(e.to_string(), "3*x");
    }

    #[test]
    fn minus_one_becomes_negation() {
        let e = (Expr::int(-1) * Expr::call("sin", x())).simplify();
        assert_eq!(e.to_string(), "-sin(x)");
    }

    #[test]
    fn division_by_literal_zero_is_kept() {
        let e = (Expr::int(1) / Expr::int(0)).simplify();
        assert!(matches!(e, Expr::Div(..)));
        assert_eq!(e.exact_value(), Err(EvaluationError::DivisionByZero));
    }

    #[test]
    fn exact_value_of_rational_expression() {
        let e = Expr::int(2).pow(Expr::int(-2)) + Expr::int(1) / Expr::int(4);
        let value = e.exact_value().unwrap().unwrap();
        assert_eq!(format_rational(&value), "1/2");
    }

    #[test]
    fn exact_value_skips_functions() {
        let e = Expr::call("sqrt", Expr::int(2));
        assert_eq!(e.exact_value().unwrap(), None);
    }

    #[test]
    fn large_exact_powers() {
        let e = Expr::int(2).pow(Expr::int(2000));
        let value = e.exact_value().unwrap().unwrap();
        assert_eq!(value.numer().bits(), 2001);

        assert_eq!(rational_pow(&BigRational::one(), 1_000_000_000).unwrap(), BigRational::one());
        assert!(matches!(
            rational_pow(&BigRational::from_integer(BigInt::from(10)), 100_000),
            Err(EvaluationError::Unsupported(_))
        ));
    }

    #[test]
    fn nested_powers_stop_at_the_size_cap() {
        let mut e = Expr::int(2);
        for _ in 0..5 {
            e = e.pow(Expr::int(64));
        }
        let e = e.simplify();
        assert!(matches!(e, Expr::Pow(..)));
        assert!(matches!(e.exact_value(), Err(EvaluationError::Unsupported(_))));
    }

    #[test]
    fn display_parenthesizes_where_needed() {
        let e = Expr::int(2) * (x() + Expr::int(1));
        assert_eq!(e.to_string(), "2*(x+1)");

        let e = x() - (x() - Expr::int(1));
        assert_eq!(e.to_string(), "x-(x-1)");

        let e = (x() + Expr::int(1)).pow(Expr::int(2));
        assert_eq!(e.to_string(), "(x+1)^2");

        let e = x() + Expr::int(-3);
        assert_eq!(e.to_string(), "x+(-3)");
    }

    #[test]
    fn free_vars_are_sorted_and_unique() {
        let e = Expr::var("y") * x() + x();
        let vars: Vec<String> = e.free_vars().into_iter().collect();
        assert_eq!(vars, vec!["x", "y"]);
    }
}
