//! Sampling a function of `x` over the plot domain.

use mathtutor_core::media::{PlotDomain, PlotPoint, PlotSeries};
use mathtutor_core::Evaluator;

/// Evaluate `expression` at every x of `domain`. Points that fail to
/// evaluate or are not finite become gaps.
pub fn sample(expression: &str, domain: PlotDomain, evaluator: &dyn Evaluator) -> PlotSeries {
    let points = domain
        .xs()
        .map(|x| PlotPoint {
            x,
            y: evaluator
                .evaluate_at(expression, "x", x)
                .ok()
                .filter(|y| y.is_finite()),
        })
        .collect();

    PlotSeries {
        label: expression.to_string(),
        domain,
        points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mathtutor_cas::NumericEvaluator;

    #[test]
    fn samples_whole_domain() {
        let series = sample("x^2", PlotDomain::default(), &NumericEvaluator::new());
        assert_eq!(series.points.len(), 101);
        assert_eq!(series.label, "x^2");
        let first = series.points[0];
        assert!((first.x + 10.0).abs() < 1e-12);
        assert!((first.y.unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn undefined_points_are_gaps() {
        let series = sample("sqrt(x)", PlotDomain::default(), &NumericEvaluator::new());
        assert!(series.points[0].y.is_none());
        assert!(series.points[100].y.is_some());
    }

    #[test]
    fn unparseable_expression_is_all_gaps() {
        let series = sample("sin(", PlotDomain::default(), &NumericEvaluator::new());
        assert_eq!(series.defined().count(), 0);
    }
}
