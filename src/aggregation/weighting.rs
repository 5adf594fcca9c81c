use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::config::{REPUTATION_FLOOR, REPUTATION_OFFSET, REPUTATION_WEIGHT_EXPONENT};
use crate::timeline::ForecastSet;
use crate::types::{Question, UserId};

/// Per-forecaster weight function. `None` means "no weighting": every
/// forecaster counts equally and downstream math takes the unweighted path.
pub trait Weighting {
    fn compute(&self, set: &ForecastSet, question: &Question) -> Option<Vec<f64>>;
}

pub struct Unweighted;

impl Weighting for Unweighted {
    fn compute(&self, _set: &ForecastSet, _question: &Question) -> Option<Vec<f64>> {
        None
    }
}

/// Newer forecasts dominate: for n forecasters ordered oldest to newest,
/// w_i = exp(sqrt(i) - sqrt(n)), i 1-indexed. With two or fewer forecasters
/// the weighting degenerates to equal weights.
pub struct RecencyWeighted;

impl Weighting for RecencyWeighted {
    fn compute(&self, set: &ForecastSet, _question: &Question) -> Option<Vec<f64>> {
        let n = set.len();
        if n <= 2 {
            return None;
        }
        let sqrt_n = (n as f64).sqrt();
        Some(
            (1..=n)
                .map(|i| ((i as f64).sqrt() - sqrt_n).exp())
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Reputation
// ---------------------------------------------------------------------------

/// One historical peer-score row visible to reputation weighting: the
/// forecaster's peer score and coverage on a publicly-visible question,
/// stamped with its resolution time.
#[derive(Debug, Clone)]
pub struct HistoricalScore {
    pub user_id: UserId,
    pub score: f64,
    pub coverage: f64,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct RepPoint {
    at: DateTime<Utc>,
    cum_score: f64,
    cum_coverage: f64,
}

/// Time-indexed reputation lookup, built once per computation from a
/// historical-Score snapshot and queried many times. Per user: resolution-
/// time-sorted prefix sums, binary-searched at query time, so "as of t"
/// never sees a score resolved after t.
#[derive(Debug, Default)]
pub struct ReputationIndex {
    by_user: HashMap<UserId, Vec<RepPoint>>,
}

impl ReputationIndex {
    pub fn build(scores: &[HistoricalScore]) -> Self {
        let mut index = ReputationIndex::default();
        index.refresh(scores);
        index
    }

    /// Rebuilds the index from a fresh snapshot, dropping all prior state.
    pub fn refresh(&mut self, scores: &[HistoricalScore]) {
        let mut grouped: HashMap<UserId, Vec<&HistoricalScore>> = HashMap::new();
        for s in scores {
            grouped.entry(s.user_id).or_default().push(s);
        }
        self.by_user.clear();
        for (user, mut rows) in grouped {
            rows.sort_by_key(|s| s.resolved_at);
            let mut cum_score = 0.0;
            let mut cum_coverage = 0.0;
            let points = rows
                .into_iter()
                .map(|s| {
                    cum_score += s.score;
                    cum_coverage += s.coverage;
                    RepPoint { at: s.resolved_at, cum_score, cum_coverage }
                })
                .collect();
            self.by_user.insert(user, points);
        }
    }

    /// reputation = max(sum_score / (offset + sum_coverage), floor) over the
    /// user's history resolved at or before `t`. Users with no history sit
    /// at the floor.
    pub fn reputation_at(&self, user: UserId, t: DateTime<Utc>) -> f64 {
        let (sum_score, sum_coverage) = match self.by_user.get(&user) {
            None => (0.0, 0.0),
            Some(points) => {
                let idx = points.partition_point(|p| p.at <= t);
                if idx == 0 {
                    (0.0, 0.0)
                } else {
                    (points[idx - 1].cum_score, points[idx - 1].cum_coverage)
                }
            }
        };
        (sum_score / (REPUTATION_OFFSET + sum_coverage)).max(REPUTATION_FLOOR)
    }
}

/// w_i = (decay_i^0.5 * reputation_i^0.5)^6 where decay_i =
/// exp(-(t - start_i) / (close - open)). Forecasts age out on the question's
/// own timescale; reputation comes from the injected index.
pub struct ReputationWeighted<'a> {
    pub index: &'a ReputationIndex,
}

impl Weighting for ReputationWeighted<'_> {
    fn compute(&self, set: &ForecastSet, question: &Question) -> Option<Vec<f64>> {
        if set.is_empty() {
            return None;
        }
        let t = set.timestep;
        let lifetime = match (question.open_time, question.scheduled_close_time) {
            (Some(open), Some(close)) if close > open => Some((close - open).num_seconds() as f64),
            _ => None,
        };
        Some(
            set.users
                .iter()
                .zip(&set.start_times)
                .map(|(&user, &start)| {
                    let decay = match lifetime {
                        Some(total) => {
                            let age = (t - start).num_seconds().max(0) as f64;
                            (-age / total).exp()
                        }
                        None => 1.0,
                    };
                    let reputation = self.index.reputation_at(user, t);
                    (decay.sqrt() * reputation.sqrt()).powf(REPUTATION_WEIGHT_EXPONENT)
                })
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Cohorts
// ---------------------------------------------------------------------------

/// User attributes cohort filters select on.
#[derive(Debug, Clone)]
pub struct UserAttributes {
    pub id: UserId,
    pub is_bot: bool,
    pub is_pro: bool,
    pub has_medal: bool,
    pub joined_at: Option<DateTime<Utc>>,
}

/// Sub-cohort selectors. A cohort restricts the ForecastSet and then
/// delegates to any base weighting, rather than being its own algorithm.
#[derive(Debug, Clone, Copy)]
pub enum Cohort {
    Pro,
    Medalist,
    JoinedBefore(DateTime<Utc>),
}

impl Cohort {
    pub fn members(&self, users: &[UserAttributes]) -> HashSet<UserId> {
        users
            .iter()
            .filter(|u| match self {
                Cohort::Pro => u.is_pro,
                Cohort::Medalist => u.has_medal,
                Cohort::JoinedBefore(cutoff) => u.joined_at.is_some_and(|j| j < *cutoff),
            })
            .map(|u| u.id)
            .collect()
    }
}

/// Restricts a ForecastSet to the given members, preserving order.
pub fn restrict_set(set: &ForecastSet, members: &HashSet<UserId>) -> ForecastSet {
    let keep: Vec<usize> = (0..set.len())
        .filter(|&i| members.contains(&set.users[i]))
        .collect();
    ForecastSet {
        timestep: set.timestep,
        users: keep.iter().map(|&i| set.users[i]).collect(),
        rows: keep.iter().map(|&i| set.rows[i].clone()).collect(),
        start_times: keep.iter().map(|&i| set.start_times[i]).collect(),
        shape: set.shape,
    }
}
