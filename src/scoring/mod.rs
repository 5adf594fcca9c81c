pub mod buckets;
pub mod rules;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::aggregation::weighting::RecencyWeighted;
use crate::aggregation::{build_aggregation_history, SynthesisOptions};
use crate::error::{EngineError, Result};
use crate::types::{
    AggregateForecast, ArchivedScore, Forecast, Question, QuestionShape, Resolution, Score,
    ScoreSubject, ScoreType, UserId,
};
use buckets::{baseline_density, clamp_probability, pmf, resolution_bucket, scored_cdf_pmf};

/// One forecast clipped to the scoring window, with its PMF computed once.
struct Segment {
    author: UserId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    pmf: Vec<f64>,
}

impl Segment {
    fn covers(&self, t0: DateTime<Utc>, t1: DateTime<Utc>) -> bool {
        self.start <= t0 && self.end >= t1
    }
}

#[derive(Default, Clone, Copy)]
struct Accum {
    score: f64,
    coverage: f64,
}

/// Scores every forecaster on a resolved question against its resolution,
/// one row per (author, score_type). Time-averaged rules integrate
/// score * segment_duration / question_duration over every standing-forecast
/// segment inside [open_time, actual_close_time]; spot rules evaluate a
/// single instant. Pure and deterministic: rescoring unchanged inputs yields
/// bit-identical rows.
pub fn score_question(
    question: &Question,
    forecasts: &[Forecast],
    resolution: &Resolution,
    score_types: &[ScoreType],
) -> Result<Vec<Score>> {
    for f in forecasts {
        f.validate(question)?;
    }

    let authors: BTreeSet<UserId> = forecasts.iter().map(|f| f.author_id).collect();

    let Some(bucket) = resolution_bucket(question, resolution)? else {
        // Ambiguous / annulled: everyone scores zero.
        info!(question_id = question.id, "unscorable resolution, zeroing all scores");
        return Ok(zero_rows(question, score_types, &authors));
    };

    let (open, close) = question.scoring_window()?;
    let total_ms = (close - open).num_milliseconds() as f64;
    if total_ms <= 0.0 {
        return Ok(zero_rows(question, score_types, &authors));
    }

    let shape = question.shape();
    let continuous = shape == QuestionShape::Continuous;

    let segments: Vec<Segment> = forecasts
        .iter()
        .map(|f| Segment {
            author: f.author_id,
            start: f.start_time.max(open),
            end: f.end_time.unwrap_or(close).min(close),
            pmf: pmf(&f.values),
        })
        .collect();

    // Recency-weighted consensus series, only built if the legacy relative
    // rule asks for it.
    let relative_benchmark = if score_types.contains(&ScoreType::RelativeLegacy) {
        Some(benchmark_series(question, forecasts, bucket))
    } else {
        None
    };

    let mut accums: BTreeMap<ScoreType, BTreeMap<UserId, Accum>> = BTreeMap::new();
    for &st in score_types {
        let mut per_user = BTreeMap::new();
        for &a in &authors {
            per_user.insert(a, Accum::default());
        }
        accums.insert(st, per_user);
    }

    let integral_types: Vec<ScoreType> = score_types
        .iter()
        .copied()
        .filter(|t| {
            matches!(
                t,
                ScoreType::Baseline | ScoreType::Peer | ScoreType::RelativeLegacy
            )
        })
        .collect();

    if !integral_types.is_empty() {
        let mut knots: BTreeSet<DateTime<Utc>> = BTreeSet::new();
        for s in &segments {
            if s.end > s.start {
                knots.insert(s.start);
                knots.insert(s.end);
            }
        }
        let knots: Vec<_> = knots.into_iter().collect();

        for pair in knots.windows(2) {
            let (t0, t1) = (pair[0], pair[1]);
            let frac = (t1 - t0).num_milliseconds() as f64 / total_ms;
            if frac <= 0.0 {
                continue;
            }
            let active: Vec<&Segment> = segments.iter().filter(|s| s.covers(t0, t1)).collect();
            if active.is_empty() {
                continue;
            }
            let n = active.len();
            let gmean = rules::geometric_mean(
                &active.iter().map(|s| s.pmf[bucket]).collect::<Vec<_>>(),
            );
            let benchmark_p = relative_benchmark
                .as_ref()
                .and_then(|series| benchmark_at(series, t0));

            for seg in &active {
                let p = seg.pmf[bucket];
                for &st in &integral_types {
                    let contribution = match st {
                        ScoreType::Baseline => {
                            baseline_segment(question, shape, p, seg.pmf.len(), bucket, t0)
                        }
                        ScoreType::Peer => {
                            if n >= 2 {
                                rules::peer(p, gmean, n, continuous, true)
                            } else {
                                0.0
                            }
                        }
                        ScoreType::RelativeLegacy => match benchmark_p {
                            Some(q) => rules::relative_legacy(p, q),
                            None => 0.0,
                        },
                        _ => unreachable!(),
                    };
                    let accum = accums
                        .get_mut(&st)
                        .and_then(|m| m.get_mut(&seg.author))
                        .expect("author pre-seeded");
                    accum.score += contribution * frac;
                    accum.coverage += frac;
                }
            }
        }
    }

    let spot_types: Vec<ScoreType> = score_types
        .iter()
        .copied()
        .filter(|t| matches!(t, ScoreType::SpotBaseline | ScoreType::SpotPeer))
        .collect();

    if !spot_types.is_empty() {
        let spot = question
            .spot_scoring_time
            .or(question.scheduled_close_time)
            .ok_or_else(|| {
                EngineError::Config(format!(
                    "question {}: spot scoring needs a spot_scoring_time",
                    question.id
                ))
            })?
            .min(close);

        let standing: Vec<&Forecast> = forecasts
            .iter()
            .filter(|f| f.is_standing_at(spot) && spot >= open)
            .collect();
        let n = standing.len();
        let pmfs: Vec<Vec<f64>> = standing.iter().map(|f| pmf(&f.values)).collect();
        let gmean =
            rules::geometric_mean(&pmfs.iter().map(|p| p[bucket]).collect::<Vec<_>>());

        for (f, user_pmf) in standing.iter().zip(&pmfs) {
            let p = user_pmf[bucket];
            for &st in &spot_types {
                let score = match st {
                    ScoreType::SpotBaseline => {
                        baseline_segment(question, shape, p, user_pmf.len(), bucket, spot)
                    }
                    ScoreType::SpotPeer => {
                        if n >= 2 {
                            rules::peer(p, gmean, n, continuous, true)
                        } else {
                            0.0
                        }
                    }
                    _ => unreachable!(),
                };
                let accum = accums
                    .get_mut(&st)
                    .and_then(|m| m.get_mut(&f.author_id))
                    .expect("author pre-seeded");
                accum.score = score;
                accum.coverage = 1.0;
            }
        }
    }

    let mut rows = Vec::new();
    for &st in score_types {
        let per_user = &accums[&st];
        for (&author, accum) in per_user {
            // Spot rules only produce rows for standing forecasters.
            if matches!(st, ScoreType::SpotBaseline | ScoreType::SpotPeer)
                && accum.coverage == 0.0
            {
                continue;
            }
            rows.push(Score {
                subject: ScoreSubject::User(author),
                question_id: question.id,
                score: accum.score,
                coverage: accum.coverage,
                score_type: st,
            });
        }
    }

    debug!(
        question_id = question.id,
        rows = rows.len(),
        "scored question"
    );
    Ok(rows)
}

/// Scores one consensus method's aggregate series as if it were a
/// forecaster. Peer-type rules benchmark it against the forecaster pool's
/// geometric mean without the leave-one-out correction.
pub fn score_aggregates(
    question: &Question,
    history: &[AggregateForecast],
    forecasts: &[Forecast],
    resolution: &Resolution,
    score_types: &[ScoreType],
) -> Result<Vec<Score>> {
    let Some(first) = history.first() else {
        return Ok(vec![]);
    };
    let subject = ScoreSubject::Aggregate(first.method);

    let Some(bucket) = resolution_bucket(question, resolution)? else {
        return Ok(score_types
            .iter()
            .map(|&st| Score {
                subject,
                question_id: question.id,
                score: 0.0,
                coverage: 0.0,
                score_type: st,
            })
            .collect());
    };

    let (open, close) = question.scoring_window()?;
    let total_ms = (close - open).num_milliseconds() as f64;
    if total_ms <= 0.0 {
        return Ok(vec![]);
    }

    let shape = question.shape();
    let continuous = shape == QuestionShape::Continuous;

    let snapshots: Vec<Segment> = history
        .iter()
        .map(|a| Segment {
            author: 0,
            start: a.start_time.max(open),
            end: a.end_time.unwrap_or(close).min(close),
            pmf: aggregate_pmf(a, shape),
        })
        .collect();
    let user_segments: Vec<Segment> = forecasts
        .iter()
        .map(|f| Segment {
            author: f.author_id,
            start: f.start_time.max(open),
            end: f.end_time.unwrap_or(close).min(close),
            pmf: pmf(&f.values),
        })
        .collect();

    let relative_benchmark = if score_types.contains(&ScoreType::RelativeLegacy) {
        Some(benchmark_series(question, forecasts, bucket))
    } else {
        None
    };

    let mut accums: BTreeMap<ScoreType, Accum> = BTreeMap::new();

    let mut knots: BTreeSet<DateTime<Utc>> = BTreeSet::new();
    for s in snapshots.iter().chain(&user_segments) {
        if s.end > s.start {
            knots.insert(s.start);
            knots.insert(s.end);
        }
    }
    let knots: Vec<_> = knots.into_iter().collect();

    for pair in knots.windows(2) {
        let (t0, t1) = (pair[0], pair[1]);
        let frac = (t1 - t0).num_milliseconds() as f64 / total_ms;
        let Some(snapshot) = snapshots.iter().find(|s| s.covers(t0, t1)) else {
            continue;
        };
        let p = snapshot.pmf[bucket];
        let peers: Vec<f64> = user_segments
            .iter()
            .filter(|s| s.covers(t0, t1))
            .map(|s| s.pmf[bucket])
            .collect();

        for &st in score_types {
            let contribution = match st {
                ScoreType::Baseline => {
                    baseline_segment(question, shape, p, snapshot.pmf.len(), bucket, t0)
                }
                ScoreType::Peer => {
                    if peers.is_empty() {
                        0.0
                    } else {
                        rules::peer(p, rules::geometric_mean(&peers), peers.len(), continuous, false)
                    }
                }
                ScoreType::RelativeLegacy => relative_benchmark
                    .as_ref()
                    .and_then(|series| benchmark_at(series, t0))
                    .map_or(0.0, |q| rules::relative_legacy(p, q)),
                // Spot rules are handled below, outside the interval loop.
                ScoreType::SpotBaseline | ScoreType::SpotPeer => continue,
            };
            let accum = accums.entry(st).or_default();
            accum.score += contribution * frac;
            accum.coverage += frac;
        }
    }

    for &st in score_types {
        if !matches!(st, ScoreType::SpotBaseline | ScoreType::SpotPeer) {
            continue;
        }
        let spot = question
            .spot_scoring_time
            .or(question.scheduled_close_time)
            .ok_or_else(|| {
                EngineError::Config(format!(
                    "question {}: spot scoring needs a spot_scoring_time",
                    question.id
                ))
            })?
            .min(close);
        let Some(snapshot) = snapshots
            .iter()
            .find(|s| s.start <= spot && (s.end > spot || s.end == close))
        else {
            continue;
        };
        let p = snapshot.pmf[bucket];
        let peers: Vec<f64> = user_segments
            .iter()
            .filter(|s| s.start <= spot && (s.end > spot || s.end == close))
            .map(|s| s.pmf[bucket])
            .collect();
        let score = match st {
            ScoreType::SpotBaseline => {
                baseline_segment(question, shape, p, snapshot.pmf.len(), bucket, spot)
            }
            _ => {
                if peers.is_empty() {
                    0.0
                } else {
                    rules::peer(p, rules::geometric_mean(&peers), peers.len(), continuous, false)
                }
            }
        };
        accums.insert(st, Accum { score, coverage: 1.0 });
    }

    Ok(score_types
        .iter()
        .filter_map(|st| {
            accums.get(st).map(|accum| Score {
                subject,
                question_id: question.id,
                score: accum.score,
                coverage: accum.coverage,
                score_type: *st,
            })
        })
        .collect())
}

/// One question's scoring inputs inside a batch.
pub struct ScoringJob<'a> {
    pub question: &'a Question,
    pub forecasts: &'a [Forecast],
    pub resolution: &'a Resolution,
}

/// Scores a batch of questions, isolating failures: a question that raises
/// is logged and skipped, never aborting the rest.
pub fn score_batch(jobs: &[ScoringJob<'_>], score_types: &[ScoreType]) -> Vec<Score> {
    let mut rows = Vec::new();
    for job in jobs {
        match score_question(job.question, job.forecasts, job.resolution, score_types) {
            Ok(mut scores) => rows.append(&mut scores),
            Err(e) => {
                warn!(question_id = job.question.id, error = %e, "skipping unscorable question");
            }
        }
    }
    rows
}

/// Wraps a superseded score generation for archival before replacement.
pub fn archive_scores(old: &[Score], archived_at: DateTime<Utc>) -> Vec<ArchivedScore> {
    old.iter()
        .map(|s| ArchivedScore { score: s.clone(), archived_at })
        .collect()
}

fn baseline_segment(
    question: &Question,
    shape: QuestionShape,
    p: f64,
    pmf_len: usize,
    bucket: usize,
    at: DateTime<Utc>,
) -> f64 {
    match shape {
        QuestionShape::Binary => rules::baseline_discrete(p, 2),
        QuestionShape::MultipleChoice => {
            let k = question.active_option_count(at).max(2);
            rules::baseline_discrete(p, k)
        }
        QuestionShape::Continuous => {
            rules::baseline_continuous(p, baseline_density(question, bucket, pmf_len))
        }
    }
}

/// Recency-weighted consensus probability of the resolved bucket over time,
/// the benchmark of the legacy relative rule.
fn benchmark_series(
    question: &Question,
    forecasts: &[Forecast],
    bucket: usize,
) -> Vec<(DateTime<Utc>, Option<DateTime<Utc>>, f64)> {
    let history = build_aggregation_history(
        question,
        forecasts,
        crate::types::AggregationMethod::RecencyWeighted,
        &RecencyWeighted,
        None,
        &SynthesisOptions::default(),
    );
    let shape = question.shape();
    history
        .iter()
        .map(|a| (a.start_time, a.end_time, aggregate_pmf(a, shape)[bucket]))
        .collect()
}

fn benchmark_at(
    series: &[(DateTime<Utc>, Option<DateTime<Utc>>, f64)],
    t: DateTime<Utc>,
) -> Option<f64> {
    series
        .iter()
        .find(|(start, end, _)| *start <= t && end.is_none_or(|e| e > t))
        .map(|(_, _, p)| *p)
}

/// PMF of a consensus snapshot. Binary snapshots already store [P(no),
/// P(yes)]; continuous ones store the averaged CDF. Clamped like forecaster
/// PMFs so aggregate rows stay finite too.
fn aggregate_pmf(aggregate: &AggregateForecast, shape: QuestionShape) -> Vec<f64> {
    match shape {
        QuestionShape::Binary | QuestionShape::MultipleChoice => aggregate
            .forecast_values
            .iter()
            .map(|&p| clamp_probability(p))
            .collect(),
        QuestionShape::Continuous => scored_cdf_pmf(&aggregate.forecast_values),
    }
}

fn zero_rows(
    question: &Question,
    score_types: &[ScoreType],
    authors: &BTreeSet<UserId>,
) -> Vec<Score> {
    let mut rows = Vec::new();
    for &st in score_types {
        for &author in authors {
            rows.push(Score {
                subject: ScoreSubject::User(author),
                question_id: question.id,
                score: 0.0,
                coverage: 0.0,
                score_type: st,
            });
        }
    }
    rows
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
