use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::types::{Forecast, ForecastValues, Question, QuestionShape, UserId};

/// The forecasts standing at one time knot, in oldest-first submission
/// order. Value rows are shape-dependent: binary rows hold [P(yes)],
/// multiple-choice rows the category vector, continuous rows the CDF.
#[derive(Debug, Clone)]
pub struct ForecastSet {
    pub timestep: DateTime<Utc>,
    pub users: Vec<UserId>,
    pub rows: Vec<Vec<f64>>,
    /// Per-forecast start times, parallel to `users`. Recency and
    /// reputation weighting read these.
    pub start_times: Vec<DateTime<Utc>>,
    pub shape: QuestionShape,
}

impl ForecastSet {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }
}

fn value_row(values: &ForecastValues) -> Vec<f64> {
    match values {
        ForecastValues::Binary(p) => vec![*p],
        ForecastValues::MultipleChoice(probs) => probs.clone(),
        ForecastValues::Continuous(cdf) => cdf.clone(),
    }
}

/// Builds one ForecastSet per distinct time knot of a question's forecasts.
///
/// Knots are the sorted set of all start/end timestamps. At knot t a
/// forecast is active iff start <= t and (end is None or end > t). Knots
/// whose active set is empty are still emitted (with empty vectors) so the
/// aggregation-history builder can close the previous snapshot there.
/// Assumes at most one standing forecast per author at any instant.
pub fn build_forecast_sets(question: &Question, forecasts: &[Forecast]) -> Vec<ForecastSet> {
    let shape = question.shape();

    let mut knots: BTreeSet<DateTime<Utc>> = BTreeSet::new();
    for f in forecasts {
        knots.insert(f.start_time);
        if let Some(end) = f.end_time {
            knots.insert(end);
        }
    }

    let mut sets = Vec::with_capacity(knots.len());
    for t in knots {
        let mut active: Vec<&Forecast> =
            forecasts.iter().filter(|f| f.is_standing_at(t)).collect();
        // Oldest first; author id breaks start-time ties deterministically.
        active.sort_by_key(|f| (f.start_time, f.author_id));

        sets.push(ForecastSet {
            timestep: t,
            users: active.iter().map(|f| f.author_id).collect(),
            rows: active.iter().map(|f| value_row(&f.values)).collect(),
            start_times: active.iter().map(|f| f.start_time).collect(),
            shape,
        });
    }

    debug!(
        question_id = question.id,
        knots = sets.len(),
        forecasts = forecasts.len(),
        "built forecast sets"
    );
    sets
}
