use serde::{Deserialize, Serialize};

use crate::config::medals;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Medal {
    Gold,
    Silver,
    Bronze,
}

impl std::fmt::Display for Medal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Medal::Gold => "gold",
            Medal::Silver => "silver",
            Medal::Bronze => "bronze",
        };
        write!(f, "{s}")
    }
}

/// Medal for a 1-based rank among `eligible` non-excluded entries.
/// Thresholds are cumulative: the gold share wins gold, the next entries up
/// to the silver share win silver, then bronze.
pub fn medal_for_rank(rank: usize, eligible: usize) -> Option<Medal> {
    if eligible == 0 {
        return None;
    }
    let count = |share: f64, min: usize| ((share * eligible as f64).ceil() as usize).max(min);
    if rank <= count(medals::GOLD_SHARE, medals::GOLD_MIN) {
        Some(Medal::Gold)
    } else if rank <= count(medals::SILVER_SHARE, medals::SILVER_MIN) {
        Some(Medal::Silver)
    } else if rank <= count(medals::BRONZE_SHARE, medals::BRONZE_MIN) {
        Some(Medal::Bronze)
    } else {
        None
    }
}

/// h-index with a two-decimal fractional tie-break: h is the largest integer
/// such that h values are >= h; the fraction rewards volume,
/// round(n / (n + 1), 2) over the n positive contributions.
pub fn decimal_h_index(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let mut h = 0usize;
    for (i, v) in sorted.iter().enumerate() {
        if *v >= (i + 1) as f64 {
            h = i + 1;
        }
    }
    let n = values.iter().filter(|v| **v > 0.0).count() as f64;
    h as f64 + (n / (n + 1.0) * 100.0).round() / 100.0
}

/// Proportional prize shares with a minimum-percent cutoff. Shares start at
/// take / sum(take); entries under the threshold are zeroed worst-first and
/// their take redistributed among the survivors, iterating until every
/// nonzero share clears the threshold. The final shares sum to 1 across the
/// survivors (all-zero take yields all-zero shares).
pub fn assign_prize_percentages(takes: &[f64], minimum_prize_percent: f64) -> Vec<f64> {
    let mut alive: Vec<bool> = takes.iter().map(|t| *t > 0.0).collect();
    loop {
        let total: f64 = takes
            .iter()
            .zip(&alive)
            .filter(|(_, a)| **a)
            .map(|(t, _)| t)
            .sum();
        if total <= 0.0 {
            return vec![0.0; takes.len()];
        }
        // Worst surviving entry below the threshold, if any.
        let worst = (0..takes.len())
            .filter(|&i| alive[i] && takes[i] / total < minimum_prize_percent)
            .min_by(|&a, &b| takes[a].total_cmp(&takes[b]));
        match worst {
            Some(i) => alive[i] = false,
            None => {
                return takes
                    .iter()
                    .zip(&alive)
                    .map(|(t, a)| if *a { t / total } else { 0.0 })
                    .collect();
            }
        }
    }
}
