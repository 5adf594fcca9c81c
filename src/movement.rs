use serde::{Deserialize, Serialize};

use crate::aggregation::stats::inverse_cdf_location;
use crate::types::{AggregateForecast, QuestionShape};

/// Display classification of how a consensus moved between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementDirection {
    Up,
    Down,
    Expanded,
    Contracted,
    Unchanged,
}

impl std::fmt::Display for MovementDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MovementDirection::Up => "up",
            MovementDirection::Down => "down",
            MovementDirection::Expanded => "expanded",
            MovementDirection::Contracted => "contracted",
            MovementDirection::Unchanged => "unchanged",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuestionMovement {
    pub direction: MovementDirection,
    pub magnitude: f64,
}

const MOVEMENT_TOLERANCE: f64 = 1e-9;

/// Directional divergence between two consensus snapshots of one question.
///
/// Discrete shapes use the Jeffrey divergence sum((p-q) * log2(p/q)) over
/// the probability vectors, with the direction read off the most-moved
/// category. Continuous shapes use the earth-mover distance over the CDF
/// grid, decomposed into a signed asymmetry and a symmetric residue: a
/// dominant asymmetry reads as Up/Down, otherwise the interquartile widths
/// decide Expanded/Contracted.
pub fn calculate_movement(
    old: &AggregateForecast,
    new: &AggregateForecast,
    shape: QuestionShape,
) -> QuestionMovement {
    match shape {
        QuestionShape::Binary | QuestionShape::MultipleChoice => {
            discrete_movement(&old.forecast_values, &new.forecast_values)
        }
        QuestionShape::Continuous => {
            continuous_movement(&old.forecast_values, &new.forecast_values)
        }
    }
}

fn discrete_movement(p: &[f64], q: &[f64]) -> QuestionMovement {
    let magnitude: f64 = p
        .iter()
        .zip(q)
        .map(|(p, q)| (p - q) * (p / q).log2())
        .sum();
    if magnitude.abs() <= MOVEMENT_TOLERANCE {
        return QuestionMovement { direction: MovementDirection::Unchanged, magnitude: 0.0 };
    }
    // Direction follows the category that moved the most. For binary
    // vectors ([P(no), P(yes)]) this is the P(yes) shift.
    let moved = p
        .iter()
        .zip(q)
        .enumerate()
        .max_by(|a, b| {
            let da = (a.1 .1 - a.1 .0).abs();
            let db = (b.1 .1 - b.1 .0).abs();
            da.total_cmp(&db)
        })
        .map(|(i, (p, q))| (i, q - p));
    let direction = match moved {
        Some((_, delta)) if delta > 0.0 => MovementDirection::Up,
        Some(_) => MovementDirection::Down,
        None => MovementDirection::Unchanged,
    };
    QuestionMovement { direction, magnitude }
}

fn continuous_movement(old_cdf: &[f64], new_cdf: &[f64]) -> QuestionMovement {
    let n = old_cdf.len() as f64;
    // A shift toward larger values lowers the CDF, so old - new is positive
    // when the consensus moved up.
    let mut signed = 0.0;
    let mut total = 0.0;
    for (o, w) in old_cdf.iter().zip(new_cdf) {
        let d = o - w;
        signed += d;
        total += d.abs();
    }
    let asymmetry = signed / n;
    let magnitude = total / n;
    let symmetric = magnitude - asymmetry.abs();

    if magnitude <= MOVEMENT_TOLERANCE {
        return QuestionMovement { direction: MovementDirection::Unchanged, magnitude: 0.0 };
    }
    if asymmetry.abs() > symmetric {
        let direction = if asymmetry > 0.0 {
            MovementDirection::Up
        } else {
            MovementDirection::Down
        };
        return QuestionMovement { direction, magnitude };
    }

    let width = |cdf: &[f64]| inverse_cdf_location(cdf, 0.75) - inverse_cdf_location(cdf, 0.25);
    let old_width = width(old_cdf);
    let new_width = width(new_cdf);
    let direction = if (new_width - old_width).abs() <= MOVEMENT_TOLERANCE {
        MovementDirection::Unchanged
    } else if new_width > old_width {
        MovementDirection::Expanded
    } else {
        MovementDirection::Contracted
    };
    QuestionMovement { direction, magnitude }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_binary_snapshots_are_unchanged() {
        let m = discrete_movement(&[0.4, 0.6], &[0.4, 0.6]);
        assert_eq!(m.direction, MovementDirection::Unchanged);
        assert_eq!(m.magnitude, 0.0);
    }

    #[test]
    fn binary_probability_rise_reads_up() {
        let m = discrete_movement(&[0.5, 0.5], &[0.3, 0.7]);
        assert_eq!(m.direction, MovementDirection::Up);
        assert!(m.magnitude > 0.0);
    }

    #[test]
    fn jeffrey_divergence_is_symmetric_in_magnitude() {
        let a = discrete_movement(&[0.5, 0.5], &[0.2, 0.8]);
        let b = discrete_movement(&[0.2, 0.8], &[0.5, 0.5]);
        assert!((a.magnitude - b.magnitude).abs() < 1e-12);
        assert_eq!(a.direction, MovementDirection::Up);
        assert_eq!(b.direction, MovementDirection::Down);
    }

    #[test]
    fn cdf_shift_toward_larger_values_reads_up() {
        let old = [0.0, 0.5, 0.8, 0.95, 1.0];
        let new = [0.0, 0.2, 0.5, 0.8, 1.0];
        let m = continuous_movement(&old, &new);
        assert_eq!(m.direction, MovementDirection::Up);
        assert!(m.magnitude > 0.0);
    }

    #[test]
    fn widening_distribution_reads_expanded() {
        // Same median, fatter tails.
        let old = [0.0, 0.1, 0.5, 0.9, 1.0];
        let new = [0.0, 0.25, 0.5, 0.75, 1.0];
        let m = continuous_movement(&old, &new);
        assert_eq!(m.direction, MovementDirection::Expanded);
    }

    #[test]
    fn narrowing_distribution_reads_contracted() {
        let old = [0.0, 0.25, 0.5, 0.75, 1.0];
        let new = [0.0, 0.1, 0.5, 0.9, 1.0];
        let m = continuous_movement(&old, &new);
        assert_eq!(m.direction, MovementDirection::Contracted);
    }
}
