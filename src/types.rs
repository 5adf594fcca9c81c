use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_INBOUND_OUTCOME_COUNT;
use crate::error::{EngineError, Result};

pub type UserId = u64;
pub type QuestionId = u64;

// ---------------------------------------------------------------------------
// Question
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Binary,
    MultipleChoice,
    Numeric,
    Date,
    Discrete,
}

/// The three computational shapes a question can take. Selected once per
/// question; every synthesis/scoring path dispatches on this, never on
/// per-element rechecks of the raw type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionShape {
    Binary,
    MultipleChoice,
    Continuous,
}

impl QuestionType {
    pub fn shape(&self) -> QuestionShape {
        match self {
            QuestionType::Binary => QuestionShape::Binary,
            QuestionType::MultipleChoice => QuestionShape::MultipleChoice,
            QuestionType::Numeric | QuestionType::Date | QuestionType::Discrete => {
                QuestionShape::Continuous
            }
        }
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QuestionType::Binary => "binary",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::Numeric => "numeric",
            QuestionType::Date => "date",
            QuestionType::Discrete => "discrete",
        };
        write!(f, "{s}")
    }
}

/// Nominal resolution of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// "yes"/"no", an option label, a numeric/date string, or the sentinel
    /// strings "below_lower_bound" / "above_upper_bound".
    Value(String),
    Ambiguous,
    Annulled,
}

impl Resolution {
    /// Ambiguous and annulled questions score zero for everyone.
    pub fn is_scorable(&self) -> bool {
        matches!(self, Resolution::Value(_))
    }
}

/// Lifetime of one multiple-choice option. Options can be added or retired
/// while a question is open; the active category count at an instant drives
/// the discrete baseline score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionSpan {
    pub created_at: Option<DateTime<Utc>>,
    pub discontinued_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub question_type: QuestionType,
    /// Scaled domain bounds (continuous shapes only).
    pub range_min: Option<f64>,
    pub range_max: Option<f64>,
    /// Log-scaling anchor; None means the domain is linear.
    pub zero_point: Option<f64>,
    pub open_lower_bound: bool,
    pub open_upper_bound: bool,
    /// Ordered option labels (multiple-choice only).
    pub options: Vec<String>,
    /// Parallel to `options`; empty means every option spans the whole
    /// question lifetime.
    pub option_spans: Vec<OptionSpan>,
    /// Inbound bucket count for continuous shapes; CDF has this + 1 points.
    pub inbound_outcome_count: Option<usize>,
    pub open_time: Option<DateTime<Utc>>,
    pub scheduled_close_time: Option<DateTime<Utc>>,
    pub actual_close_time: Option<DateTime<Utc>>,
    pub spot_scoring_time: Option<DateTime<Utc>>,
    pub resolution: Option<Resolution>,
    pub question_weight: f64,
}

impl Question {
    pub fn shape(&self) -> QuestionShape {
        self.question_type.shape()
    }

    pub fn inbound_count(&self) -> usize {
        self.inbound_outcome_count
            .unwrap_or(DEFAULT_INBOUND_OUTCOME_COUNT)
    }

    /// Expected CDF length for a continuous forecast on this question.
    pub fn cdf_len(&self) -> usize {
        self.inbound_count() + 1
    }

    /// Number of options standing at instant `at`. Options with no recorded
    /// span count as active for the whole lifetime.
    pub fn active_option_count(&self, at: DateTime<Utc>) -> usize {
        if self.option_spans.is_empty() {
            return self.options.len();
        }
        self.option_spans
            .iter()
            .filter(|s| {
                s.created_at.is_none_or(|c| c <= at)
                    && s.discontinued_at.is_none_or(|d| d > at)
            })
            .count()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    /// Scoring window [open_time, actual_close_time]. Config error if either
    /// end is missing — the caller skips just this question.
    pub fn scoring_window(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let open = self
            .open_time
            .ok_or_else(|| EngineError::Config(format!("question {}: null open_time", self.id)))?;
        let close = self.actual_close_time.ok_or_else(|| {
            EngineError::Config(format!("question {}: null actual_close_time", self.id))
        })?;
        Ok((open, close))
    }
}

// ---------------------------------------------------------------------------
// Forecast
// ---------------------------------------------------------------------------

/// Type-specific forecast payload. Immutable after creation; withdrawal and
/// supersession only ever set the forecast's end_time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastValues {
    /// P(yes).
    Binary(f64),
    /// Category probabilities, parallel to the question's options.
    MultipleChoice(Vec<f64>),
    /// Monotonic CDF over the internal [0, 1] domain, inbound_count + 1
    /// points.
    Continuous(Vec<f64>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub author_id: UserId,
    pub question_id: QuestionId,
    pub start_time: DateTime<Utc>,
    /// None = still standing.
    pub end_time: Option<DateTime<Utc>>,
    pub values: ForecastValues,
}

impl Forecast {
    /// Standing at instant `t` iff start <= t and (no end or end > t).
    pub fn is_standing_at(&self, t: DateTime<Utc>) -> bool {
        self.start_time <= t && self.end_time.is_none_or(|e| e > t)
    }

    /// Rejects malformed payloads instead of repairing them: wrong shape or
    /// CDF length, NaN, out-of-range probabilities, non-monotonic CDF, and
    /// CDF endpoints that violate the question's bound openness.
    pub fn validate(&self, question: &Question) -> Result<()> {
        match (&self.values, question.shape()) {
            (ForecastValues::Binary(p), QuestionShape::Binary) => {
                if !p.is_finite() || !(0.0..=1.0).contains(p) {
                    return Err(EngineError::Input(format!("binary probability {p} out of range")));
                }
            }
            (ForecastValues::MultipleChoice(probs), QuestionShape::MultipleChoice) => {
                if probs.len() != question.options.len() {
                    return Err(EngineError::Input(format!(
                        "expected {} category probabilities, got {}",
                        question.options.len(),
                        probs.len()
                    )));
                }
                if probs.iter().any(|p| !p.is_finite() || !(0.0..=1.0).contains(p)) {
                    return Err(EngineError::Input("category probability out of range".into()));
                }
            }
            (ForecastValues::Continuous(cdf), QuestionShape::Continuous) => {
                validate_cdf(cdf, question)?;
            }
            (values, shape) => {
                return Err(EngineError::Input(format!(
                    "payload {values:?} does not match question shape {shape:?}"
                )));
            }
        }
        Ok(())
    }
}

/// CDF invariants: correct length, finite, within [0,1], non-decreasing, and
/// floor/ceiling pinned to 0/1 wherever the matching bound is closed.
pub fn validate_cdf(cdf: &[f64], question: &Question) -> Result<()> {
    if cdf.len() != question.cdf_len() {
        return Err(EngineError::Input(format!(
            "expected CDF of {} points, got {}",
            question.cdf_len(),
            cdf.len()
        )));
    }
    for pair in cdf.windows(2) {
        if !pair[0].is_finite() || !pair[1].is_finite() {
            return Err(EngineError::Input("CDF contains a non-finite value".into()));
        }
        if pair[1] < pair[0] {
            return Err(EngineError::Input("CDF is not non-decreasing".into()));
        }
    }
    let first = cdf[0];
    let last = cdf[cdf.len() - 1];
    if !(0.0..=1.0).contains(&first) || !(0.0..=1.0).contains(&last) {
        return Err(EngineError::Input("CDF endpoints out of [0, 1]".into()));
    }
    if !question.open_lower_bound && first.abs() > 1e-9 {
        return Err(EngineError::Input("closed lower bound requires cdf[0] == 0".into()));
    }
    if !question.open_upper_bound && (1.0 - last).abs() > 1e-9 {
        return Err(EngineError::Input("closed upper bound requires cdf[-1] == 1".into()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    Unweighted,
    RecencyWeighted,
    /// Reputation-and-decay weighted single aggregation.
    ReputationWeighted,
}

impl std::fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AggregationMethod::Unweighted => "unweighted",
            AggregationMethod::RecencyWeighted => "recency_weighted",
            AggregationMethod::ReputationWeighted => "reputation_weighted",
        };
        write!(f, "{s}")
    }
}

/// One consensus snapshot for a (question, method, interval).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateForecast {
    pub question_id: QuestionId,
    pub method: AggregationMethod,
    pub start_time: DateTime<Utc>,
    /// None = ongoing.
    pub end_time: Option<DateTime<Utc>>,
    /// Binary: [P(no), P(yes)]. Multiple-choice: renormalized category
    /// vector. Continuous: weighted-mean CDF.
    pub forecast_values: Vec<f64>,
    /// Raw contributor count, independent of weighting.
    pub forecaster_count: usize,
    pub interval_lower_bounds: Option<Vec<f64>>,
    pub centers: Option<Vec<f64>>,
    pub interval_upper_bounds: Option<Vec<f64>>,
    /// Unweighted means (binary/MC stats only).
    pub means: Option<Vec<f64>>,
    /// Weighted histogram of P(yes) (binary stats only).
    pub histogram: Option<Vec<f64>>,
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreType {
    Baseline,
    Peer,
    SpotBaseline,
    SpotPeer,
    /// Legacy log-base-2 relative score. Intentionally inconsistent with the
    /// natural-log rules; preserved for comparability of old tournaments.
    RelativeLegacy,
}

impl std::fmt::Display for ScoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScoreType::Baseline => "baseline",
            ScoreType::Peer => "peer",
            ScoreType::SpotBaseline => "spot_baseline",
            ScoreType::SpotPeer => "spot_peer",
            ScoreType::RelativeLegacy => "relative_legacy",
        };
        write!(f, "{s}")
    }
}

/// Who a score row belongs to — a forecaster or a consensus method scored as
/// if it were one. Exactly one of the two, by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSubject {
    User(UserId),
    Aggregate(AggregationMethod),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub subject: ScoreSubject,
    pub question_id: QuestionId,
    pub score: f64,
    /// Fraction of the question's scored lifetime covered by a standing
    /// forecast, in [0, 1].
    pub coverage: f64,
    pub score_type: ScoreType,
}

/// Superseded score generation, emitted when a rescore replaces rows so the
/// caller can persist the history. Same shape as Score plus the time it was
/// displaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedScore {
    pub score: Score,
    pub archived_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
