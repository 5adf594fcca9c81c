//! Forecast aggregation, scoring and leaderboard engine for a
//! prediction-market platform.
//!
//! The crate is a pure compute core: it turns one question's standing
//! forecasts into a consensus time series, scores forecasters (and the
//! consensus methods themselves) against the resolution with proper scoring
//! rules, and folds accumulated scores into ranked, prize- and
//! medal-bearing leaderboards. All entry points are synchronous transforms
//! over immutable snapshots; an external worker pool is expected to invoke
//! them once per question or leaderboard job and persist whatever comes
//! back.

pub mod aggregation;
pub mod config;
pub mod error;
pub mod leaderboard;
pub mod movement;
pub mod scoring;
pub mod timeline;
pub mod types;

pub use aggregation::weighting::{
    Cohort, HistoricalScore, RecencyWeighted, ReputationIndex, ReputationWeighted, Unweighted,
    UserAttributes, Weighting,
};
pub use aggregation::{build_aggregation_history, synthesize, SynthesisOptions};
pub use error::{EngineError, Result};
pub use leaderboard::prizes::{assign_prize_percentages, decimal_h_index, Medal};
pub use leaderboard::{
    build_leaderboard, ExclusionRecord, ExclusionScope, LeaderboardConfig, LeaderboardEntry,
    LeaderboardScoreType,
};
pub use movement::{calculate_movement, MovementDirection, QuestionMovement};
pub use scoring::{archive_scores, score_aggregates, score_batch, score_question, ScoringJob};
pub use timeline::{build_forecast_sets, compress_history, ForecastSet};
pub use types::{
    AggregateForecast, AggregationMethod, ArchivedScore, Forecast, ForecastValues, Question,
    QuestionId, QuestionShape, QuestionType, Resolution, Score, ScoreSubject, ScoreType, UserId,
};
