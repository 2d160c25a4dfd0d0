//! Heuristic for choosing a logarithmic value scale.

/// Ratio between the spread of the upper and lower halves of the sorted
/// values above which a log scale is preferred.
pub const LOG_SCALE_SPREAD_RATIO: f64 = 10.0;

/// Whether `values` span a range better shown on a log scale.
///
/// The values are sorted and split at the median. If the upper half is
/// spread more than [`LOG_SCALE_SPREAD_RATIO`] times as widely as the lower
/// half, the data are dominated by a few large magnitudes.
pub fn should_use_log_scale(values: &[f64]) -> bool {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.len() < 2 {
        return false;
    }
    sorted.sort_by(f64::total_cmp);

    let (lower, upper) = sorted.split_at(sorted.len() / 2);
    let lower_sd = standard_deviation(lower);
    let upper_sd = standard_deviation(upper);
    if lower_sd == 0.0 || upper_sd == 0.0 {
        return false;
    }

    upper_sd / lower_sd > LOG_SCALE_SPREAD_RATIO
}

fn standard_deviation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}
