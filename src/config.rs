/// Default number of inbound buckets for a continuous question, giving a CDF
/// of 201 points and a PMF of 202 entries (two out-of-bounds tails).
pub const DEFAULT_INBOUND_OUTCOME_COUNT: usize = 200;

/// Probability mass reserved for each open out-of-bounds tail by the
/// continuous baseline reference distribution.
pub const BASELINE_OPEN_BOUND_MASS: f64 = 0.05;

/// Floor applied per category when renormalizing a multiple-choice
/// consensus — every category ends up >= this and the vector sums to 1.
pub const MC_PROB_FLOOR: f64 = 0.001;

/// Discrete probabilities are clamped into
/// [MIN_SCORED_PROBABILITY, 1 - MIN_SCORED_PROBABILITY] before any
/// log-scoring rule, matching the platform's submission bounds. A certain
/// forecast that resolves against scores a large negative number, never
/// -inf.
pub const MIN_SCORED_PROBABILITY: f64 = 0.001;

/// Zero-mass continuous buckets (flat CDF segments, closed-bound tails) are
/// floored here before log-scoring rules.
pub const MIN_SCORED_BUCKET_MASS: f64 = 1e-5;

/// Bin count for the binary consensus histogram of P(yes).
pub const HISTOGRAM_BIN_COUNT: usize = 100;

/// Maximum knots kept by the history compressor.
pub const HISTORY_MAX_SIZE: usize = 400;

/// Reputation = max(sum_peer_score / (REPUTATION_OFFSET + sum_coverage), floor).
pub const REPUTATION_OFFSET: f64 = 30.0;
pub const REPUTATION_FLOOR: f64 = 1e-6;

/// Exponent applied to (decay^0.5 * reputation^0.5) in reputation weighting.
pub const REPUTATION_WEIGHT_EXPONENT: f64 = 6.0;

/// Two ranking keys closer than this share a rank.
pub const RANK_EPSILON: f64 = 1e-7;

/// Coverage / contribution floors used when normalizing global leaderboards.
pub const PEER_GLOBAL_COVERAGE_FLOOR: f64 = 30.0;
pub const LEGACY_GLOBAL_CONTRIBUTION_FLOOR: f64 = 40.0;

/// History compressor age windows (relative to "now") and their shares of
/// the point budget. Shares are skewed toward recency; a window with fewer
/// available knots than its quota donates the remainder to the next-older
/// window.
pub mod history_windows {
    pub const AGE_DAYS: [i64; 3] = [1, 7, 60];
    pub const BUDGET_SHARES: [f64; 4] = [0.4, 0.3, 0.2, 0.1];
}

/// Medal thresholds as fractions of non-excluded entries, with minimum
/// counts. Cumulative: rank within gold share earns gold, else silver
/// share earns silver, else bronze share earns bronze.
pub mod medals {
    pub const GOLD_SHARE: f64 = 0.01;
    pub const SILVER_SHARE: f64 = 0.02;
    pub const BRONZE_SHARE: f64 = 0.05;
    pub const GOLD_MIN: usize = 1;
    pub const SILVER_MIN: usize = 2;
    pub const BRONZE_MIN: usize = 3;
}
