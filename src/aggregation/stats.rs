use crate::config::HISTOGRAM_BIN_COUNT;

/// Weighted percentile with the cumulative-midpoint convention: sorted
/// values sit at (cum_i - w_i/2) / W and the requested fraction is linearly
/// interpolated between neighbors. `weights: None` means equal weights.
/// Values must be non-empty.
pub fn weighted_percentile(values: &[f64], weights: Option<&[f64]>, percentile: f64) -> f64 {
    let mut pairs: Vec<(f64, f64)> = values
        .iter()
        .enumerate()
        .map(|(i, &v)| (v, weights.map_or(1.0, |w| w[i])))
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let total: f64 = pairs.iter().map(|p| p.1).sum();
    let target = percentile / 100.0;

    let mut cum = 0.0;
    let mut prev_mid = 0.0;
    let mut prev_val = pairs[0].0;
    for (v, w) in &pairs {
        let mid = (cum + w / 2.0) / total;
        if target <= mid {
            if mid == prev_mid {
                return *v;
            }
            let frac = (target - prev_mid) / (mid - prev_mid);
            return prev_val + frac * (v - prev_val);
        }
        cum += w;
        prev_mid = mid;
        prev_val = *v;
    }
    pairs[pairs.len() - 1].0
}

pub fn weighted_median(values: &[f64], weights: Option<&[f64]>) -> f64 {
    weighted_percentile(values, weights, 50.0)
}

pub fn weighted_mean(values: &[f64], weights: Option<&[f64]>) -> f64 {
    match weights {
        None => values.iter().sum::<f64>() / values.len() as f64,
        Some(w) => {
            let total: f64 = w.iter().sum();
            values.iter().zip(w).map(|(v, w)| v * w).sum::<f64>() / total
        }
    }
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Weighted one-sided semi-standard-deviations around `center`: the square
/// root of the weighted mean squared deviation of the values strictly below
/// (resp. above) the center. A side with no mass contributes zero spread.
/// Used by reputation-weighted consensus, whose weights are too skewed for
/// percentile intervals.
pub fn semi_standard_deviations(
    values: &[f64],
    weights: Option<&[f64]>,
    center: f64,
) -> (f64, f64) {
    let mut below = (0.0, 0.0); // (sum w*(v-c)^2, sum w)
    let mut above = (0.0, 0.0);
    for (i, &v) in values.iter().enumerate() {
        let w = weights.map_or(1.0, |w| w[i]);
        let sq = (v - center) * (v - center);
        if v < center {
            below.0 += w * sq;
            below.1 += w;
        } else if v > center {
            above.0 += w * sq;
            above.1 += w;
        }
    }
    let side = |(sum_sq, sum_w): (f64, f64)| if sum_w > 0.0 { (sum_sq / sum_w).sqrt() } else { 0.0 };
    (side(below), side(above))
}

/// Weighted histogram of probabilities over [0, 1] in HISTOGRAM_BIN_COUNT
/// equal bins; 1.0 lands in the last bin.
pub fn probability_histogram(values: &[f64], weights: Option<&[f64]>) -> Vec<f64> {
    let mut bins = vec![0.0; HISTOGRAM_BIN_COUNT];
    for (i, &v) in values.iter().enumerate() {
        let w = weights.map_or(1.0, |w| w[i]);
        let idx = ((v * HISTOGRAM_BIN_COUNT as f64) as usize).min(HISTOGRAM_BIN_COUNT - 1);
        bins[idx] += w;
    }
    bins
}

/// Inverse-CDF lookup on a monotonic curve over the internal [0, 1] domain:
/// the location where the interpolated CDF crosses `quantile`. Mass outside
/// the curve (open bounds) clamps to the matching endpoint.
pub fn inverse_cdf_location(cdf: &[f64], quantile: f64) -> f64 {
    let n = cdf.len();
    if quantile <= cdf[0] {
        return 0.0;
    }
    if quantile >= cdf[n - 1] {
        return 1.0;
    }
    for i in 1..n {
        if cdf[i] >= quantile {
            let x0 = (i - 1) as f64 / (n - 1) as f64;
            let x1 = i as f64 / (n - 1) as f64;
            let step = cdf[i] - cdf[i - 1];
            if step <= 0.0 {
                return x1;
            }
            return x0 + (quantile - cdf[i - 1]) / step * (x1 - x0);
        }
    }
    1.0
}
