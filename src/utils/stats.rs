//! Small numeric helpers shared by the analyses

/// Divisor used when a denominator is missing or zero
pub const FALLBACK_DIVISOR: f64 = 1.0;

/// Denominator with the fallback of 1 for missing or zero values
#[must_use]
pub fn safe_divisor(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v != 0.0 && v.is_finite() => v,
        _ => FALLBACK_DIVISOR,
    }
}

/// Percent change from `previous` to `current` as a fraction
///
/// Undefined when either value is missing or `previous` is zero.
#[must_use]
pub fn pct_change(previous: Option<f64>, current: Option<f64>) -> Option<f64> {
    match (previous, current) {
        (Some(p), Some(c)) if p != 0.0 => Some(c / p - 1.0),
        _ => None,
    }
}

/// Percent change of each element against the element `lag` positions earlier
#[must_use]
pub fn lagged_pct_change(values: &[f64], lag: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            i.checked_sub(lag)
                .and_then(|j| pct_change(Some(values[j]), Some(values[i])))
        })
        .collect()
}

/// Pearson correlation of two equally long samples
///
/// Undefined for fewer than two points or zero variance on either side.
#[must_use]
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx.sqrt() * syy.sqrt()))
}

/// Trailing-window Pearson correlation
///
/// Element `i` covers `i + 1 - window ..= i`. It is `None` until `window`
/// points exist, or when any value inside the window is missing.
#[must_use]
pub fn rolling_correlation(
    xs: &[Option<f64>],
    ys: &[Option<f64>],
    window: usize,
) -> Vec<Option<f64>> {
    (0..xs.len())
        .map(|i| {
            if window == 0 || i + 1 < window {
                return None;
            }
            let start = i + 1 - window;
            let x: Option<Vec<f64>> = xs[start..=i].iter().copied().collect();
            let y: Option<Vec<f64>> = ys.get(start..=i)?.iter().copied().collect();
            pearson(&x?, &y?)
        })
        .collect()
}

#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Median of the values (average of the middle pair for even counts)
#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Nearest-rank quantile of pre-sorted values, `q` in [0, 1]
#[must_use]
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted.get(rank).copied()
}

/// Sample standard deviation (n - 1 denominator)
#[must_use]
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Sign of a value as -1, 0 or 1
#[must_use]
pub fn sign(value: f64) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}
