//! # MathTutor CAS
//!
//! A small computer-algebra engine over exact rationals. It backs the
//! [`AlgebraEngine`](mathtutor_core::AlgebraEngine) and
//! [`Evaluator`](mathtutor_core::Evaluator) traits with:
//!
//! - a recursive-descent parser with implicit multiplication
//! - polynomial arithmetic and real root finding
//! - symbolic derivatives and elementary antiderivatives
//! - `f64` evaluation with variable binding for plotting

pub mod calculus;
pub mod engine;
pub mod expr;
pub mod numeric;
pub mod parser;
pub mod poly;

pub use engine::SymbolicEngine;
pub use expr::Expr;
pub use numeric::{NumericEvaluator, format_number};
pub use parser::parse;
