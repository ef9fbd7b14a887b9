use rayon::prelude::*;

/// Arithmetic mean; zero for an empty slice.
pub fn sample_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().copied().sum::<f64>() / values.len() as f64
}

/// Sample variance with an `n - 1` divisor; zero when fewer than two values.
pub fn sample_variance(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let sum_squares = values
        .par_iter()
        .map(|value| {
            let diff = value - mean;
            diff * diff
        })
        .sum::<f64>();
    sum_squares / (values.len() as f64 - 1.0)
}

pub fn sample_std(values: &[f64]) -> f64 {
    sample_variance(values, sample_mean(values)).sqrt()
}

/// Quantile by linear interpolation between order statistics.
///
/// Non-finite values are excluded before ranking; returns `None` when nothing
/// finite remains.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let pos = q.clamp(0.0, 1.0) * (finite.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    if lower == upper {
        Some(finite[lower])
    } else {
        Some(finite[lower] + (finite[upper] - finite[lower]) * (pos - lower as f64))
    }
}
