use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::config::history_windows::{AGE_DAYS, BUDGET_SHARES};

/// Down-samples a knot sequence to at most `max_size` points while keeping
/// recent history dense. Knots must be ascending.
///
/// The sequence is partitioned by age relative to `now` into four windows
/// (last day / last week / last 60 days / older) whose budget shares skew
/// toward recency. A window with fewer knots than its quota donates the
/// remainder to the next-older window. Within a window, evenly spaced
/// target instants between its min and max are snapped to the nearest real
/// knot — never interpolated. The global first and last knot always
/// survive. Input already within budget is returned unchanged.
pub fn compress_history(
    knots: &[DateTime<Utc>],
    max_size: usize,
    now: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    if knots.len() <= max_size {
        return knots.to_vec();
    }
    // Two slots are reserved so the forced global endpoints can never push
    // the result over budget.
    let budget = max_size.saturating_sub(2);

    // Window boundaries, newest window first.
    let cutoffs: Vec<DateTime<Utc>> = AGE_DAYS.iter().map(|d| now - Duration::days(*d)).collect();
    let mut windows: [Vec<DateTime<Utc>>; 4] = Default::default();
    for &t in knots {
        let idx = if t >= cutoffs[0] {
            0
        } else if t >= cutoffs[1] {
            1
        } else if t >= cutoffs[2] {
            2
        } else {
            3
        };
        windows[idx].push(t);
    }

    let mut kept: BTreeSet<DateTime<Utc>> = BTreeSet::new();
    kept.insert(knots[0]);
    kept.insert(knots[knots.len() - 1]);

    let mut carry = 0usize;
    for (i, window) in windows.iter().enumerate() {
        let mut quota = (budget as f64 * BUDGET_SHARES[i]).floor() as usize + carry;
        carry = 0;
        if window.is_empty() {
            carry = quota;
            continue;
        }
        if window.len() <= quota {
            carry = quota - window.len();
            kept.extend(window.iter().copied());
            continue;
        }
        if quota == 0 {
            continue;
        }
        // Evenly spaced targets over [min, max], snapped to real knots.
        // Duplicate snaps collapse in the set.
        let lo = window[0];
        let hi = window[window.len() - 1];
        let span_ms = (hi - lo).num_milliseconds();
        let mut selected: BTreeSet<DateTime<Utc>> = BTreeSet::new();
        for k in 0..quota {
            let frac = if quota == 1 { 1.0 } else { k as f64 / (quota - 1) as f64 };
            let target = lo + Duration::milliseconds((span_ms as f64 * frac).round() as i64);
            selected.insert(nearest_knot(window, target));
        }
        carry = quota - selected.len();
        kept.extend(selected);
    }

    debug!(
        input = knots.len(),
        output = kept.len(),
        max_size,
        "compressed history"
    );
    kept.into_iter().collect()
}

/// Nearest element of an ascending slice to `target`.
fn nearest_knot(window: &[DateTime<Utc>], target: DateTime<Utc>) -> DateTime<Utc> {
    match window.binary_search(&target) {
        Ok(i) => window[i],
        Err(i) => {
            if i == 0 {
                window[0]
            } else if i == window.len() {
                window[window.len() - 1]
            } else {
                let before = window[i - 1];
                let after = window[i];
                if target - before <= after - target {
                    before
                } else {
                    after
                }
            }
        }
    }
}
