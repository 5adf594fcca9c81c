pub mod stats;
pub mod weighting;

use std::collections::HashSet;

use tracing::debug;

use crate::config::MC_PROB_FLOOR;
use crate::timeline::{build_forecast_sets, ForecastSet};
use crate::types::{
    AggregateForecast, AggregationMethod, Forecast, Question, QuestionShape, UserId,
};
use stats::{
    inverse_cdf_location, mean, probability_histogram, semi_standard_deviations, weighted_mean,
    weighted_median, weighted_percentile,
};
use weighting::{restrict_set, Weighting};

/// What a synthesis emits beyond the point estimate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SynthesisOptions {
    /// Quartile interval bounds and unweighted means.
    pub include_stats: bool,
    /// 100-bin weighted histogram of P(yes) (binary only).
    pub include_histogram: bool,
}

/// Combines one ForecastSet + weights into one consensus snapshot. Returns
/// None for an empty set — the caller closes the previous snapshot instead.
/// The forecaster count is always the raw contributor count, whatever the
/// weights say.
pub fn synthesize(
    set: &ForecastSet,
    weights: Option<&[f64]>,
    question: &Question,
    method: AggregationMethod,
    opts: &SynthesisOptions,
) -> Option<AggregateForecast> {
    if set.is_empty() {
        return None;
    }

    let mut aggregate = AggregateForecast {
        question_id: question.id,
        method,
        start_time: set.timestep,
        end_time: None,
        forecast_values: vec![],
        forecaster_count: set.len(),
        interval_lower_bounds: None,
        centers: None,
        interval_upper_bounds: None,
        means: None,
        histogram: None,
    };

    match set.shape {
        QuestionShape::Binary => {
            let ps: Vec<f64> = set.rows.iter().map(|r| r[0]).collect();
            let (lower, center, upper) = if method == AggregationMethod::ReputationWeighted {
                mean_with_semi_deviation_bounds(&ps, weights)
            } else {
                (
                    weighted_percentile(&ps, weights, 25.0),
                    weighted_median(&ps, weights),
                    weighted_percentile(&ps, weights, 75.0),
                )
            };
            aggregate.forecast_values = vec![1.0 - center, center];
            if opts.include_stats {
                aggregate.interval_lower_bounds = Some(vec![lower]);
                aggregate.centers = Some(vec![center]);
                aggregate.interval_upper_bounds = Some(vec![upper]);
                aggregate.means = Some(vec![mean(&ps)]);
            }
            if opts.include_histogram {
                aggregate.histogram = Some(probability_histogram(&ps, weights));
            }
        }
        QuestionShape::MultipleChoice => {
            let categories = set.rows[0].len();
            let mut lowers = Vec::with_capacity(categories);
            let mut centers = Vec::with_capacity(categories);
            let mut uppers = Vec::with_capacity(categories);
            let mut means = Vec::with_capacity(categories);
            for c in 0..categories {
                let column: Vec<f64> = set.rows.iter().map(|r| r[c]).collect();
                let (lower, center, upper) = if method == AggregationMethod::ReputationWeighted {
                    mean_with_semi_deviation_bounds(&column, weights)
                } else {
                    (
                        weighted_percentile(&column, weights, 25.0),
                        weighted_median(&column, weights),
                        weighted_percentile(&column, weights, 75.0),
                    )
                };
                lowers.push(lower);
                centers.push(center);
                uppers.push(upper);
                means.push(mean(&column));
            }
            let (ratio, residue_idx) = renormalize_categories(&mut centers);
            aggregate.forecast_values = centers.clone();
            if opts.include_stats {
                rescale_bounds(&mut lowers, ratio);
                rescale_bounds(&mut uppers, ratio);
                if let Some(idx) = residue_idx {
                    // The residue dumped on the largest category must not
                    // push its center outside the interval.
                    lowers[idx] = lowers[idx].min(centers[idx]);
                    uppers[idx] = uppers[idx].max(centers[idx]);
                }
                aggregate.interval_lower_bounds = Some(lowers);
                aggregate.centers = Some(centers);
                aggregate.interval_upper_bounds = Some(uppers);
                aggregate.means = Some(means);
            }
        }
        QuestionShape::Continuous => {
            // Pointwise weighted mean of monotonic CDFs stays monotonic;
            // averaging per-forecaster medians would not.
            let points = set.rows[0].len();
            let avg_cdf: Vec<f64> = (0..points)
                .map(|i| {
                    let column: Vec<f64> = set.rows.iter().map(|r| r[i]).collect();
                    weighted_mean(&column, weights)
                })
                .collect();
            if opts.include_stats {
                aggregate.interval_lower_bounds =
                    Some(vec![inverse_cdf_location(&avg_cdf, 0.25)]);
                aggregate.centers = Some(vec![inverse_cdf_location(&avg_cdf, 0.5)]);
                aggregate.interval_upper_bounds =
                    Some(vec![inverse_cdf_location(&avg_cdf, 0.75)]);
            }
            aggregate.forecast_values = avg_cdf;
        }
    }

    Some(aggregate)
}

/// Weighted mean flanked by one-sided semi-standard-deviations, clamped to
/// the probability domain.
fn mean_with_semi_deviation_bounds(values: &[f64], weights: Option<&[f64]>) -> (f64, f64, f64) {
    let center = weighted_mean(values, weights);
    let (below, above) = semi_standard_deviations(values, weights, center);
    ((center - below).max(0.0), center, (center + above).min(1.0))
}

/// Renormalizes multiple-choice category medians in place: subtract the
/// per-category floor, rescale so the remainder sums to 1 - n*floor, add the
/// floor back. Every category ends >= floor and the vector sums to 1
/// exactly. Returns the rescale ratio (so interval bounds can follow suit)
/// and the index that absorbed the float residue.
fn renormalize_categories(values: &mut [f64]) -> (f64, Option<usize>) {
    let n = values.len() as f64;
    let shifted_sum: f64 = values.iter().map(|v| (v - MC_PROB_FLOOR).max(0.0)).sum();
    let target = 1.0 - n * MC_PROB_FLOOR;
    let ratio = if shifted_sum > 0.0 { target / shifted_sum } else { 0.0 };
    let mut total = 0.0;
    for v in values.iter_mut() {
        *v = (*v - MC_PROB_FLOOR).max(0.0) * ratio + MC_PROB_FLOOR;
        total += *v;
    }
    // Dump float residue on the largest category so the sum is exact.
    let idx = (0..values.len()).max_by(|&a, &b| values[a].total_cmp(&values[b]));
    if let Some(idx) = idx {
        values[idx] += 1.0 - total;
    }
    (ratio, idx)
}

fn rescale_bounds(bounds: &mut [f64], ratio: f64) {
    for b in bounds.iter_mut() {
        *b = ((*b - MC_PROB_FLOOR).max(0.0) * ratio + MC_PROB_FLOOR).clamp(0.0, 1.0);
    }
}

/// Full consensus time series for one (question, method): forecast sets per
/// knot, weights, synthesis. Snapshots come out contiguous, ascending and
/// non-overlapping; a knot whose (possibly cohort-restricted) active set is
/// empty closes the previous snapshot without opening a new one, so at most
/// the trailing snapshot is open-ended.
pub fn build_aggregation_history(
    question: &Question,
    forecasts: &[Forecast],
    method: AggregationMethod,
    weighting: &dyn Weighting,
    cohort_members: Option<&HashSet<UserId>>,
    opts: &SynthesisOptions,
) -> Vec<AggregateForecast> {
    let sets = build_forecast_sets(question, forecasts);
    let mut history: Vec<AggregateForecast> = Vec::new();

    for set in &sets {
        let restricted;
        let set = match cohort_members {
            Some(members) => {
                restricted = restrict_set(set, members);
                &restricted
            }
            None => set,
        };

        if let Some(last) = history.last_mut() {
            if last.end_time.is_none() {
                last.end_time = Some(set.timestep);
            }
        }
        let weights = weighting.compute(set, question);
        if let Some(aggregate) = synthesize(set, weights.as_deref(), question, method, opts) {
            history.push(aggregate);
        }
    }

    debug!(
        question_id = question.id,
        %method,
        snapshots = history.len(),
        "built aggregation history"
    );
    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::weighting::{Cohort, RecencyWeighted, Unweighted, UserAttributes};
    use crate::types::{ForecastValues, QuestionType};
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn question(question_type: QuestionType, options: usize) -> Question {
        Question {
            id: 1,
            question_type,
            range_min: Some(0.0),
            range_max: Some(100.0),
            zero_point: None,
            open_lower_bound: false,
            open_upper_bound: false,
            options: (0..options).map(|i| format!("option_{i}")).collect(),
            option_spans: vec![],
            inbound_outcome_count: Some(4),
            open_time: Some(ts(1)),
            scheduled_close_time: Some(ts(21)),
            actual_close_time: Some(ts(21)),
            spot_scoring_time: None,
            resolution: None,
            question_weight: 1.0,
        }
    }

    fn binary_forecast(author: u64, day: u32, end_day: Option<u32>, p: f64) -> Forecast {
        Forecast {
            author_id: author,
            question_id: 1,
            start_time: ts(day),
            end_time: end_day.map(ts),
            values: ForecastValues::Binary(p),
        }
    }

    fn stats_opts() -> SynthesisOptions {
        SynthesisOptions { include_stats: true, include_histogram: true }
    }

    #[test]
    fn binary_point_estimate_is_weighted_median() {
        let q = question(QuestionType::Binary, 0);
        let forecasts = vec![
            binary_forecast(1, 2, None, 0.9),
            binary_forecast(2, 3, None, 0.5),
            binary_forecast(3, 4, None, 0.5),
        ];
        let history = build_aggregation_history(
            &q,
            &forecasts,
            AggregationMethod::Unweighted,
            &Unweighted,
            None,
            &stats_opts(),
        );
        let last = history.last().unwrap();
        // Median resists the 0.9 outlier.
        assert!((last.forecast_values[1] - 0.5).abs() < 1e-9);
        assert!((last.forecast_values[0] - 0.5).abs() < 1e-9);
        assert_eq!(last.forecaster_count, 3);
        let means = last.means.as_ref().unwrap();
        assert!((means[0] - (0.9 + 0.5 + 0.5) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn recency_with_two_forecasters_matches_unweighted() {
        let q = question(QuestionType::Binary, 0);
        let forecasts = vec![
            binary_forecast(1, 2, None, 0.3),
            binary_forecast(2, 3, None, 0.8),
        ];
        let unweighted = build_aggregation_history(
            &q,
            &forecasts,
            AggregationMethod::Unweighted,
            &Unweighted,
            None,
            &stats_opts(),
        );
        let recency = build_aggregation_history(
            &q,
            &forecasts,
            AggregationMethod::RecencyWeighted,
            &RecencyWeighted,
            None,
            &stats_opts(),
        );
        for (u, r) in unweighted.iter().zip(&recency) {
            assert_eq!(u.forecast_values, r.forecast_values);
            assert_eq!(u.interval_lower_bounds, r.interval_lower_bounds);
            assert_eq!(u.interval_upper_bounds, r.interval_upper_bounds);
        }
    }

    #[test]
    fn bounds_bracket_centers_when_stats_requested() {
        let q = question(QuestionType::Binary, 0);
        let forecasts: Vec<Forecast> = (1..=5)
            .map(|i| binary_forecast(i, 2 + i as u32, None, 0.1 + 0.15 * i as f64))
            .collect();
        let history = build_aggregation_history(
            &q,
            &forecasts,
            AggregationMethod::RecencyWeighted,
            &RecencyWeighted,
            None,
            &stats_opts(),
        );
        for aggregate in &history {
            let lowers = aggregate.interval_lower_bounds.as_ref().unwrap();
            let centers = aggregate.centers.as_ref().unwrap();
            let uppers = aggregate.interval_upper_bounds.as_ref().unwrap();
            for i in 0..centers.len() {
                assert!(lowers[i] <= centers[i] + 1e-12, "lower>{}", centers[i]);
                assert!(centers[i] <= uppers[i] + 1e-12, "center>{}", uppers[i]);
            }
        }
    }

    #[test]
    fn multiple_choice_sums_to_one_with_floor() {
        let q = question(QuestionType::MultipleChoice, 3);
        let forecasts = vec![
            Forecast {
                author_id: 1,
                question_id: 1,
                start_time: ts(2),
                end_time: None,
                values: ForecastValues::MultipleChoice(vec![0.998, 0.001, 0.001]),
            },
            Forecast {
                author_id: 2,
                question_id: 1,
                start_time: ts(3),
                end_time: None,
                values: ForecastValues::MultipleChoice(vec![0.9, 0.05, 0.05]),
            },
        ];
        let history = build_aggregation_history(
            &q,
            &forecasts,
            AggregationMethod::Unweighted,
            &Unweighted,
            None,
            &stats_opts(),
        );
        let values = &history.last().unwrap().forecast_values;
        let sum: f64 = values.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "sum={sum}");
        assert!(values.iter().all(|v| *v >= MC_PROB_FLOOR), "{values:?}");
    }

    #[test]
    fn multiple_choice_bounds_bracket_centers_exactly() {
        let q = question(QuestionType::MultipleChoice, 3);
        // Category medians 0.2 / 0.5 / 0.3 sum to 1.0 only up to float
        // dust, forcing the residue-absorption path.
        let vectors = [
            vec![0.3, 0.4, 0.3],
            vec![0.2, 0.5, 0.3],
            vec![0.1, 0.6, 0.3],
        ];
        let forecasts: Vec<Forecast> = vectors
            .into_iter()
            .enumerate()
            .map(|(i, values)| Forecast {
                author_id: i as u64 + 1,
                question_id: 1,
                start_time: ts(2 + i as u32),
                end_time: None,
                values: ForecastValues::MultipleChoice(values),
            })
            .collect();
        let history = build_aggregation_history(
            &q,
            &forecasts,
            AggregationMethod::Unweighted,
            &Unweighted,
            None,
            &stats_opts(),
        );
        for aggregate in &history {
            let lowers = aggregate.interval_lower_bounds.as_ref().unwrap();
            let centers = aggregate.centers.as_ref().unwrap();
            let uppers = aggregate.interval_upper_bounds.as_ref().unwrap();
            for i in 0..centers.len() {
                assert!(
                    lowers[i] <= centers[i] && centers[i] <= uppers[i],
                    "category {i}: {} / {} / {}",
                    lowers[i],
                    centers[i],
                    uppers[i]
                );
            }
        }
    }

    #[test]
    fn continuous_consensus_cdf_stays_monotonic() {
        let q = question(QuestionType::Numeric, 0);
        let forecasts = vec![
            Forecast {
                author_id: 1,
                question_id: 1,
                start_time: ts(2),
                end_time: None,
                values: ForecastValues::Continuous(vec![0.0, 0.1, 0.3, 0.7, 1.0]),
            },
            Forecast {
                author_id: 2,
                question_id: 1,
                start_time: ts(3),
                end_time: None,
                values: ForecastValues::Continuous(vec![0.0, 0.4, 0.6, 0.9, 1.0]),
            },
        ];
        let history = build_aggregation_history(
            &q,
            &forecasts,
            AggregationMethod::Unweighted,
            &Unweighted,
            None,
            &stats_opts(),
        );
        let last = history.last().unwrap();
        for pair in last.forecast_values.windows(2) {
            assert!(pair[1] >= pair[0], "consensus CDF decreased: {pair:?}");
        }
        let center = last.centers.as_ref().unwrap()[0];
        let lower = last.interval_lower_bounds.as_ref().unwrap()[0];
        let upper = last.interval_upper_bounds.as_ref().unwrap()[0];
        assert!(lower <= center && center <= upper);
    }

    #[test]
    fn history_is_contiguous_with_one_open_end() {
        let q = question(QuestionType::Binary, 0);
        let forecasts = vec![
            binary_forecast(1, 2, Some(6), 0.4),
            binary_forecast(2, 4, None, 0.7),
            binary_forecast(3, 5, Some(8), 0.6),
        ];
        let history = build_aggregation_history(
            &q,
            &forecasts,
            AggregationMethod::Unweighted,
            &Unweighted,
            None,
            &SynthesisOptions::default(),
        );
        for pair in history.windows(2) {
            assert_eq!(pair[0].end_time, Some(pair[1].start_time));
        }
        let open_ended = history.iter().filter(|a| a.end_time.is_none()).count();
        assert_eq!(open_ended, 1);
        for pair in history.windows(2) {
            assert!(pair[0].start_time < pair[1].start_time);
        }
    }

    #[test]
    fn cohort_restricted_history_composes_with_base_weighting() {
        let q = question(QuestionType::Binary, 0);
        let users = vec![
            UserAttributes { id: 1, is_bot: false, is_pro: true, has_medal: false, joined_at: None },
            UserAttributes { id: 2, is_bot: false, is_pro: false, has_medal: false, joined_at: None },
        ];
        let pros = Cohort::Pro.members(&users);
        let forecasts = vec![
            binary_forecast(1, 2, Some(6), 0.9),
            binary_forecast(2, 3, None, 0.2),
        ];
        let history = build_aggregation_history(
            &q,
            &forecasts,
            AggregationMethod::Unweighted,
            &Unweighted,
            Some(&pros),
            &stats_opts(),
        );
        // Knots at days 2, 3 and 6; the non-pro forecaster never contributes.
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|a| a.forecaster_count == 1));
        assert!((history[0].forecast_values[1] - 0.9).abs() < 1e-9);
        // Withdrawal of the only pro closes the series even though the
        // non-pro forecast is still standing.
        assert_eq!(history.last().unwrap().end_time, Some(ts(6)));
    }

    #[test]
    fn withdrawal_of_all_forecasters_closes_the_series() {
        let q = question(QuestionType::Binary, 0);
        let forecasts = vec![binary_forecast(1, 2, Some(5), 0.4)];
        let history = build_aggregation_history(
            &q,
            &forecasts,
            AggregationMethod::Unweighted,
            &Unweighted,
            None,
            &SynthesisOptions::default(),
        );
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].end_time, Some(ts(5)));
    }
}
