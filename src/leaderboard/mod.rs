pub mod prizes;

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregation::weighting::UserAttributes;
use crate::config::{
    LEGACY_GLOBAL_CONTRIBUTION_FLOOR, PEER_GLOBAL_COVERAGE_FLOOR, RANK_EPSILON,
};
use crate::types::{Question, QuestionId, Score, ScoreSubject, ScoreType, UserId};
use prizes::{assign_prize_percentages, medal_for_rank, Medal};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardScoreType {
    BaselineGlobal,
    PeerGlobal,
    PeerGlobalLegacy,
    PeerTournament,
    SpotPeerTournament,
    RelativeLegacyTournament,
}

impl LeaderboardScoreType {
    /// The per-question score rows this leaderboard aggregates.
    pub fn source_score_type(&self) -> ScoreType {
        match self {
            LeaderboardScoreType::BaselineGlobal => ScoreType::Baseline,
            LeaderboardScoreType::PeerGlobal
            | LeaderboardScoreType::PeerGlobalLegacy
            | LeaderboardScoreType::PeerTournament => ScoreType::Peer,
            LeaderboardScoreType::SpotPeerTournament => ScoreType::SpotPeer,
            LeaderboardScoreType::RelativeLegacyTournament => ScoreType::RelativeLegacy,
        }
    }

    fn is_tournament(&self) -> bool {
        matches!(
            self,
            LeaderboardScoreType::PeerTournament
                | LeaderboardScoreType::SpotPeerTournament
                | LeaderboardScoreType::RelativeLegacyTournament
        )
    }
}

/// Scope a per-user exclusion record applies to. Project and leaderboard
/// scopes carry the id they target; records whose scope does not match the
/// leaderboard being built are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionScope {
    Project(u64),
    Leaderboard(u64),
    Global,
}

impl ExclusionScope {
    fn applies_to(&self, config: &LeaderboardConfig) -> bool {
        match self {
            ExclusionScope::Global => true,
            ExclusionScope::Project(p) => config.project_id == Some(*p),
            ExclusionScope::Leaderboard(l) => config.leaderboard_id == Some(*l),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionRecord {
    pub user_id: UserId,
    pub scope: ExclusionScope,
    /// Keep the entry visible (flagged, unranked) instead of hiding it.
    pub show_anyway: bool,
}

#[derive(Debug, Clone)]
pub struct LeaderboardConfig {
    pub score_type: LeaderboardScoreType,
    /// Identity scoped exclusion records are matched against.
    pub project_id: Option<u64>,
    pub leaderboard_id: Option<u64>,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    /// Present iff the leaderboard is finalize-eligible (medals, freeze).
    pub finalize_time: Option<DateTime<Utc>>,
    pub prize_pool: Option<f64>,
    pub minimum_prize_percent: f64,
    pub include_bots: bool,
    /// Restrict to these users when set.
    pub user_list: Option<HashSet<UserId>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Surrogate key, re-matched from the previous generation by subject so
    /// persistence keeps stable row identities across regenerations.
    pub id: Option<u64>,
    pub subject: ScoreSubject,
    pub score: f64,
    pub take: f64,
    pub coverage: f64,
    pub contribution_count: usize,
    pub rank: usize,
    pub excluded: bool,
    pub show_when_excluded: bool,
    pub percent_prize: f64,
    pub prize: f64,
    pub medal: Option<Medal>,
}

// ---------------------------------------------------------------------------
// Ranker
// ---------------------------------------------------------------------------

/// Rebuilds a leaderboard from scratch out of per-question Score rows.
/// Wholesale delete-and-recreate: the result fully replaces the previous
/// generation, with surrogate ids re-matched by subject. Past finalize_time
/// the previous generation is returned untouched unless `force` is set.
pub fn build_leaderboard(
    config: &LeaderboardConfig,
    questions: &[Question],
    scores: &[Score],
    users: &[UserAttributes],
    exclusions: &[ExclusionRecord],
    existing: &[LeaderboardEntry],
    now: DateTime<Utc>,
    force: bool,
) -> Vec<LeaderboardEntry> {
    if !force && config.finalize_time.is_some_and(|f| now > f) {
        info!("leaderboard already finalized, refresh is a no-op");
        return existing.to_vec();
    }

    let source_type = config.score_type.source_score_type();
    let eligible_questions: HashMap<QuestionId, f64> = questions
        .iter()
        .filter(|q| {
            q.resolution.as_ref().is_some_and(|r| r.is_scorable())
                && q.actual_close_time.is_some_and(|close| {
                    config.window_start.is_none_or(|s| close >= s)
                        && config.window_end.is_none_or(|e| close <= e)
                })
        })
        .map(|q| (q.id, q.question_weight))
        .collect();

    struct Sums {
        score: f64,
        coverage: f64,
        count: usize,
    }
    let mut by_subject: BTreeMap<ScoreSubject, Sums> = BTreeMap::new();
    for s in scores {
        if s.score_type != source_type {
            continue;
        }
        let Some(&weight) = eligible_questions.get(&s.question_id) else {
            continue;
        };
        if let (ScoreSubject::User(u), Some(list)) = (&s.subject, &config.user_list) {
            if !list.contains(u) {
                continue;
            }
        }
        let sums = by_subject
            .entry(s.subject)
            .or_insert(Sums { score: 0.0, coverage: 0.0, count: 0 });
        sums.score += s.score * weight;
        sums.coverage += s.coverage * weight;
        sums.count += 1;
    }

    let max_coverage = by_subject
        .values()
        .map(|s| s.coverage)
        .fold(0.0_f64, f64::max);
    let user_info: HashMap<UserId, &UserAttributes> = users.iter().map(|u| (u.id, u)).collect();
    let exclusion_info: HashMap<UserId, &ExclusionRecord> = exclusions
        .iter()
        .filter(|e| e.scope.applies_to(config))
        .map(|e| (e.user_id, e))
        .collect();
    let existing_ids: HashMap<ScoreSubject, u64> = existing
        .iter()
        .filter_map(|e| e.id.map(|id| (e.subject, id)))
        .collect();

    let mut entries: Vec<LeaderboardEntry> = by_subject
        .into_iter()
        .map(|(subject, sums)| {
            let (score, take) =
                normalize(config.score_type, sums.score, sums.coverage, sums.count, max_coverage);
            let (excluded, show_when_excluded) = match subject {
                // Consensus methods are displayed alongside forecasters but
                // never consume ranks, prizes or medals.
                ScoreSubject::Aggregate(_) => (true, true),
                ScoreSubject::User(u) => {
                    let is_bot = user_info.get(&u).is_some_and(|a| a.is_bot);
                    if is_bot && !config.include_bots {
                        (true, false)
                    } else if let Some(record) = exclusion_info.get(&u) {
                        (true, record.show_anyway)
                    } else {
                        (false, false)
                    }
                }
            };
            LeaderboardEntry {
                id: existing_ids.get(&subject).copied(),
                subject,
                score,
                take,
                coverage: sums.coverage,
                contribution_count: sums.count,
                rank: 0,
                excluded,
                show_when_excluded,
                percent_prize: 0.0,
                prize: 0.0,
                medal: None,
            }
        })
        .collect();

    // Descending ranking key; subject breaks exact ties deterministically.
    let tournament = config.score_type.is_tournament();
    let key = |e: &LeaderboardEntry| if tournament { e.take } else { e.score };
    entries.sort_by(|a, b| key(b).total_cmp(&key(a)).then(a.subject.cmp(&b.subject)));

    assign_ranks(&mut entries, key);

    if let Some(pool) = config.prize_pool {
        let ranked: Vec<usize> = (0..entries.len()).filter(|&i| !entries[i].excluded).collect();
        let takes: Vec<f64> = ranked.iter().map(|&i| entries[i].take).collect();
        let percents = assign_prize_percentages(&takes, config.minimum_prize_percent);
        for (&i, percent) in ranked.iter().zip(percents) {
            entries[i].percent_prize = percent;
            entries[i].prize = percent * pool;
        }
    }

    if config.finalize_time.is_some() {
        let eligible = entries.iter().filter(|e| !e.excluded).count();
        for e in entries.iter_mut().filter(|e| !e.excluded) {
            e.medal = medal_for_rank(e.rank, eligible);
        }
    }

    debug!(entries = entries.len(), "rebuilt leaderboard");
    entries
}

/// Score/take normalization per leaderboard type. Globals divide by a
/// coverage or contribution floor; tournaments turn score into a prize take.
fn normalize(
    score_type: LeaderboardScoreType,
    score: f64,
    coverage: f64,
    count: usize,
    max_coverage: f64,
) -> (f64, f64) {
    match score_type {
        LeaderboardScoreType::BaselineGlobal => (score, 0.0),
        LeaderboardScoreType::PeerGlobal => {
            (score / coverage.max(PEER_GLOBAL_COVERAGE_FLOOR), 0.0)
        }
        LeaderboardScoreType::PeerGlobalLegacy => {
            (score / (count as f64).max(LEGACY_GLOBAL_CONTRIBUTION_FLOOR), 0.0)
        }
        LeaderboardScoreType::PeerTournament | LeaderboardScoreType::SpotPeerTournament => {
            let take = score.max(0.0).powi(2);
            (score, take)
        }
        LeaderboardScoreType::RelativeLegacyTournament => {
            let take = if max_coverage > 0.0 {
                coverage / max_coverage * score.exp()
            } else {
                0.0
            };
            (score, take)
        }
    }
}

/// Tie-aware dense ranking over the sorted entries. Keys equal within
/// RANK_EPSILON share a rank; the next distinct key gets previous_rank + 1.
/// Excluded entries display the current rank without consuming it.
fn assign_ranks(entries: &mut [LeaderboardEntry], key: impl Fn(&LeaderboardEntry) -> f64) {
    let mut rank = 0usize;
    let mut prev_key: Option<f64> = None;
    for i in 0..entries.len() {
        let k = key(&entries[i]);
        if entries[i].excluded {
            // Display position it would occupy, without consuming a rank.
            entries[i].rank = rank + 1;
            continue;
        }
        match prev_key {
            Some(p) if (p - k).abs() <= RANK_EPSILON => {}
            _ => rank += 1,
        }
        prev_key = Some(k);
        entries[i].rank = rank;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
