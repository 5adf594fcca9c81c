/// Per-segment scoring formulas. All return points in the 100-times-log
/// convention except the legacy relative rule, which keeps its historical
/// log base 2.

/// Baseline score for a discrete (binary / multiple-choice) forecast:
/// 100 * ln(p * k) / ln(k), k = active category count. Positive iff the
/// forecast beats the uniform reference.
pub fn baseline_discrete(p: f64, category_count: usize) -> f64 {
    let k = category_count as f64;
    100.0 * (p * k).ln() / k.ln()
}

/// Baseline score for a continuous forecast: 100 * ln(pmf[bucket] /
/// reference_density) / 2. Halved so the typical magnitudes match the
/// discrete scale.
pub fn baseline_continuous(p_bucket: f64, reference_density: f64) -> f64 {
    100.0 * (p_bucket / reference_density).ln() / 2.0
}

/// Geometric mean of the probabilities every active forecaster assigned to
/// the resolved bucket.
pub fn geometric_mean(probs: &[f64]) -> f64 {
    let log_sum: f64 = probs.iter().map(|p| p.ln()).sum();
    (log_sum / probs.len() as f64).exp()
}

/// Peer score: 100 * ln(p / gmean) with the n/(n-1) leave-one-out
/// correction, halved for continuous shapes. The correction removes the
/// forecaster's own contribution to the geometric-mean benchmark; scoring a
/// consensus method against the forecaster pool passes `correction = false`.
pub fn peer(p: f64, gmean: f64, n: usize, continuous: bool, correction: bool) -> f64 {
    let factor = if correction { n as f64 / (n as f64 - 1.0) } else { 1.0 };
    let halve = if continuous { 2.0 } else { 1.0 };
    100.0 * (p / gmean).ln() * factor / halve
}

/// Legacy relative score: log2(p / aggregate_p). Log base 2 is a deliberate
/// historical inconsistency with the natural-log rules and must stay.
pub fn relative_legacy(p: f64, aggregate_p: f64) -> f64 {
    (p / aggregate_p).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_binary_forecast_scores_zero_baseline() {
        let s = baseline_discrete(0.5, 2);
        assert!(s.abs() < 1e-9, "score={s}");
    }

    #[test]
    fn certain_correct_binary_forecast_scores_one_hundred() {
        let s = baseline_discrete(1.0, 2);
        assert!((s - 100.0).abs() < 1e-9, "score={s}");
    }

    #[test]
    fn uniform_multiple_choice_scores_zero_for_any_category_count() {
        for k in [3usize, 5, 8] {
            let s = baseline_discrete(1.0 / k as f64, k);
            assert!(s.abs() < 1e-9, "k={k} score={s}");
        }
    }

    #[test]
    fn continuous_baseline_positive_above_reference_density() {
        let density = 0.9 / 200.0;
        assert!(baseline_continuous(0.02, density) > 0.0);
        assert!(baseline_continuous(0.001, density) < 0.0);
        assert!(baseline_continuous(density, density).abs() < 1e-9);
    }

    #[test]
    fn geometric_mean_of_equal_probs_is_that_prob() {
        let g = geometric_mean(&[0.3, 0.3, 0.3]);
        assert!((g - 0.3).abs() < 1e-12);
    }

    #[test]
    fn peer_scores_sum_to_zero_across_forecasters() {
        let probs = [0.9, 0.5, 0.2];
        let g = geometric_mean(&probs);
        let total: f64 = probs.iter().map(|&p| peer(p, g, probs.len(), false, true)).sum();
        assert!(total.abs() < 1e-9, "total={total}");
    }

    #[test]
    fn relative_legacy_is_log_base_two() {
        let s = relative_legacy(0.8, 0.4);
        assert!((s - 1.0).abs() < 1e-12, "doubling the aggregate prob is one bit: {s}");
        let s = relative_legacy(0.25, 0.5);
        assert!((s + 1.0).abs() < 1e-12);
    }
}
