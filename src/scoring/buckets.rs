use crate::config::{BASELINE_OPEN_BOUND_MASS, MIN_SCORED_BUCKET_MASS, MIN_SCORED_PROBABILITY};
use crate::error::{EngineError, Result};
use crate::types::{ForecastValues, Question, QuestionShape, Resolution};

/// Probability-mass representation of a forecast. Binary: [P(no), P(yes)].
/// Multiple-choice: the category vector. Continuous: inbound bucket masses
/// flanked by the two out-of-bounds tails, inbound_count + 2 entries.
/// Probabilities are clamped into the scored range so every downstream log
/// rule yields a finite score.
pub fn pmf(values: &ForecastValues) -> Vec<f64> {
    match values {
        ForecastValues::Binary(p) => {
            let p = clamp_probability(*p);
            vec![1.0 - p, p]
        }
        ForecastValues::MultipleChoice(probs) => {
            probs.iter().map(|&p| clamp_probability(p)).collect()
        }
        ForecastValues::Continuous(cdf) => scored_cdf_pmf(cdf),
    }
}

/// Clamps a discrete probability into the scored interval.
pub fn clamp_probability(p: f64) -> f64 {
    p.clamp(MIN_SCORED_PROBABILITY, 1.0 - MIN_SCORED_PROBABILITY)
}

/// CDF → PMF with zero-mass buckets floored for log-scoring.
pub fn scored_cdf_pmf(cdf: &[f64]) -> Vec<f64> {
    cdf_to_pmf(cdf)
        .into_iter()
        .map(|m| m.max(MIN_SCORED_BUCKET_MASS))
        .collect()
}

pub fn cdf_to_pmf(cdf: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(cdf.len() + 1);
    out.push(cdf[0]);
    for pair in cdf.windows(2) {
        out.push(pair[1] - pair[0]);
    }
    out.push(1.0 - cdf[cdf.len() - 1]);
    out
}

/// Maps a scaled domain value to its internal [0, 1] location, inverting the
/// question's log scaling when a zero_point is set.
pub fn unscale_location(question: &Question, scaled: f64) -> Result<f64> {
    let (min, max) = match (question.range_min, question.range_max) {
        (Some(min), Some(max)) if max > min => (min, max),
        _ => {
            return Err(EngineError::Config(format!(
                "question {}: continuous resolution needs a valid range",
                question.id
            )))
        }
    };
    match question.zero_point {
        Some(zp) => {
            let ratio = (max - zp) / (min - zp);
            Ok(((scaled - zp) / (min - zp)).ln() / ratio.ln())
        }
        None => Ok((scaled - min) / (max - min)),
    }
}

/// Bucket index a resolution maps to in the PMF representation. None for
/// ambiguous/annulled resolutions (nothing to look up — everyone scores
/// zero).
pub fn resolution_bucket(question: &Question, resolution: &Resolution) -> Result<Option<usize>> {
    let value = match resolution {
        Resolution::Ambiguous | Resolution::Annulled => return Ok(None),
        Resolution::Value(v) => v.as_str(),
    };

    let bucket = match question.shape() {
        QuestionShape::Binary => match value {
            "yes" => 1,
            "no" => 0,
            other => {
                return Err(EngineError::Input(format!(
                    "binary resolution must be yes/no, got {other:?}"
                )))
            }
        },
        QuestionShape::MultipleChoice => question
            .options
            .iter()
            .position(|o| o == value)
            .ok_or_else(|| {
                EngineError::Input(format!("resolution {value:?} is not a known option"))
            })?,
        QuestionShape::Continuous => {
            let inbound = question.inbound_count();
            let last = inbound + 1;
            match value {
                "below_lower_bound" => 0,
                "above_upper_bound" => last,
                _ => {
                    let scaled: f64 = value.parse().map_err(|_| {
                        EngineError::Input(format!("unparseable continuous resolution {value:?}"))
                    })?;
                    let location = unscale_location(question, scaled)?;
                    if location < 0.0 {
                        0
                    } else if location >= 1.0 {
                        // Exactly at the upper bound resolves into the top
                        // inbound bucket, not the tail.
                        if location > 1.0 { last } else { inbound }
                    } else {
                        ((location * inbound as f64) as usize + 1).min(inbound)
                    }
                }
            }
        }
    };
    Ok(Some(bucket))
}

/// Reference density for the continuous baseline score: each open tail holds
/// BASELINE_OPEN_BOUND_MASS, the remainder spreads evenly over the inbound
/// buckets. A closed tail holds no mass (and no resolution can land there).
pub fn baseline_density(question: &Question, bucket: usize, pmf_len: usize) -> f64 {
    let open_bounds =
        usize::from(question.open_lower_bound) + usize::from(question.open_upper_bound);
    if bucket == 0 || bucket == pmf_len - 1 {
        BASELINE_OPEN_BOUND_MASS
    } else {
        (1.0 - BASELINE_OPEN_BOUND_MASS * open_bounds as f64) / (pmf_len - 2) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QuestionType;

    fn numeric_question(zero_point: Option<f64>) -> Question {
        Question {
            id: 1,
            question_type: QuestionType::Numeric,
            range_min: Some(0.0),
            range_max: Some(100.0),
            zero_point,
            open_lower_bound: true,
            open_upper_bound: true,
            options: vec![],
            option_spans: vec![],
            inbound_outcome_count: Some(200),
            open_time: None,
            scheduled_close_time: None,
            actual_close_time: None,
            spot_scoring_time: None,
            resolution: None,
            question_weight: 1.0,
        }
    }

    #[test]
    fn binary_pmf_is_no_yes() {
        assert_eq!(pmf(&ForecastValues::Binary(0.7)), vec![0.30000000000000004, 0.7]);
    }

    #[test]
    fn certain_probabilities_are_clamped_for_scoring() {
        assert_eq!(pmf(&ForecastValues::Binary(1.0)), vec![0.001, 0.999]);
        assert_eq!(pmf(&ForecastValues::Binary(0.0)), vec![0.999, 0.001]);
        let mc = pmf(&ForecastValues::MultipleChoice(vec![1.0, 0.0, 0.0]));
        assert!(mc.iter().all(|p| *p >= 0.001 && *p <= 0.999), "{mc:?}");
        // Flat CDF segments and closed-bound tails get a mass floor.
        let continuous = scored_cdf_pmf(&[0.0, 0.5, 0.5, 1.0]);
        assert!(continuous.iter().all(|m| *m >= 1e-5), "{continuous:?}");
    }

    #[test]
    fn continuous_pmf_has_two_tails_and_sums_to_one() {
        let out = cdf_to_pmf(&[0.05, 0.3, 0.6, 0.95]);
        assert_eq!(out.len(), 5);
        assert!((out[0] - 0.05).abs() < 1e-12);
        assert!((out[4] - 0.05).abs() < 1e-12);
        let sum: f64 = out.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn binary_resolution_maps_to_yes_no_buckets() {
        let mut q = numeric_question(None);
        q.question_type = QuestionType::Binary;
        let yes = Resolution::Value("yes".into());
        let no = Resolution::Value("no".into());
        assert_eq!(resolution_bucket(&q, &yes).unwrap(), Some(1));
        assert_eq!(resolution_bucket(&q, &no).unwrap(), Some(0));
        assert!(resolution_bucket(&q, &Resolution::Value("maybe".into())).is_err());
    }

    #[test]
    fn ambiguous_resolution_has_no_bucket() {
        let q = numeric_question(None);
        assert_eq!(resolution_bucket(&q, &Resolution::Ambiguous).unwrap(), None);
        assert_eq!(resolution_bucket(&q, &Resolution::Annulled).unwrap(), None);
    }

    #[test]
    fn continuous_resolution_buckets_are_one_indexed() {
        let q = numeric_question(None);
        // Midpoint of the domain: location 0.5 of 200 inbound buckets.
        let mid = resolution_bucket(&q, &Resolution::Value("50".into())).unwrap();
        assert_eq!(mid, Some(101));
        let below = resolution_bucket(&q, &Resolution::Value("below_lower_bound".into())).unwrap();
        assert_eq!(below, Some(0));
        let above = resolution_bucket(&q, &Resolution::Value("above_upper_bound".into())).unwrap();
        assert_eq!(above, Some(201));
        // Out-of-range numerics clamp into the tails.
        let low = resolution_bucket(&q, &Resolution::Value("-5".into())).unwrap();
        assert_eq!(low, Some(0));
    }

    #[test]
    fn log_scaled_location_uses_zero_point() {
        let mut q = numeric_question(Some(-100.0));
        q.range_min = Some(1.0);
        q.range_max = Some(1000.0);
        let loc_min = unscale_location(&q, 1.0).unwrap();
        let loc_max = unscale_location(&q, 1000.0).unwrap();
        assert!(loc_min.abs() < 1e-12);
        assert!((loc_max - 1.0).abs() < 1e-12);
        // Log scaling bends the midpoint away from the linear center.
        let mid = unscale_location(&q, 500.0).unwrap();
        let linear_mid = (500.0 - 1.0) / 999.0;
        assert!((mid - linear_mid).abs() > 0.05, "mid={mid} linear={linear_mid}");
    }

    #[test]
    fn baseline_density_splits_open_bound_mass() {
        let q = numeric_question(None);
        let n = 202;
        assert_eq!(baseline_density(&q, 0, n), 0.05);
        assert_eq!(baseline_density(&q, 201, n), 0.05);
        let inner = baseline_density(&q, 100, n);
        assert!((inner - 0.9 / 200.0).abs() < 1e-12);
        let mut closed = numeric_question(None);
        closed.open_lower_bound = false;
        closed.open_upper_bound = false;
        let inner = baseline_density(&closed, 100, n);
        assert!((inner - 1.0 / 200.0).abs() < 1e-12);
    }
}
