//! Numeric series primitives used by the indicators
//!
//! `NaN` marks an undefined value throughout. None of these functions fail.

/// Smoothing factor for an EMA given its span
pub fn alpha_from_span(span: f64) -> f64 {
    2.0 / (span + 1.0)
}

/// Smoothing factor for an EMA given its center of mass
pub fn alpha_from_com(com: f64) -> f64 {
    1.0 / (1.0 + com)
}

/// Exponentially weighted mean without bias adjustment
///
/// Seeds with the first defined value. An undefined input repeats the
/// previous output and the weight of the running mean keeps decaying across
/// the gap.
pub fn ewm(values: &[f64], alpha: f64) -> Vec<f64> {
    let decay = 1.0 - alpha;
    let mut out = Vec::with_capacity(values.len());
    let mut weighted = f64::NAN;
    let mut old_weight = 1.0;

    for (i, &x) in values.iter().enumerate() {
        let observed = !x.is_nan();
        if i == 0 {
            weighted = x;
        } else if !weighted.is_nan() {
            old_weight *= decay;
            if observed {
                if weighted != x {
                    weighted = (old_weight * weighted + alpha * x) / (old_weight + alpha);
                }
                old_weight = 1.0;
            }
        } else if observed {
            weighted = x;
        }
        out.push(weighted);
    }
    out
}

/// First difference; the first element is undefined
pub fn diff(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if !values.is_empty() {
        out.push(f64::NAN);
    }
    out.extend(values.windows(2).map(|w| w[1] - w[0]));
    out
}

/// Defined values of the window ending at `i`, which must be full
fn full_window(values: &[f64], i: usize, window: usize) -> Option<&[f64]> {
    if window == 0 || i + 1 < window {
        return None;
    }
    let slice = &values[i + 1 - window..=i];
    if slice.iter().any(|v| v.is_nan()) {
        return None;
    }
    Some(slice)
}

/// Rolling mean over a full window
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            full_window(values, i, window)
                .map_or(f64::NAN, |w| w.iter().sum::<f64>() / w.len() as f64)
        })
        .collect()
}

/// Rolling sample standard deviation (ddof = 1) over a full window
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| match full_window(values, i, window) {
            Some(w) if w.len() > 1 => {
                let n = w.len() as f64;
                let mean = w.iter().sum::<f64>() / n;
                let var = w.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
                var.sqrt()
            }
            _ => f64::NAN,
        })
        .collect()
}

/// Rolling fold over the defined values of up to `window` trailing elements
///
/// Requires only one defined value (`min_periods = 1`).
fn rolling_partial(values: &[f64], window: usize, pick: fn(f64, f64) -> f64) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            values[i.saturating_sub(window - 1)..=i]
                .iter()
                .copied()
                .filter(|v| !v.is_nan())
                .reduce(pick)
                .unwrap_or(f64::NAN)
        })
        .collect()
}

pub fn rolling_min(values: &[f64], window: usize) -> Vec<f64> {
    rolling_partial(values, window, f64::min)
}

pub fn rolling_max(values: &[f64], window: usize) -> Vec<f64> {
    rolling_partial(values, window, f64::max)
}
