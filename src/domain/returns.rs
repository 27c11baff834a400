//! Period-over-period deltas and returns.

/// `v[i] - v[i-1]`, with the first element defined as 0.
pub fn period_deltas(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }
    out.push(0.0);
    out.extend(values.windows(2).map(|w| w[1] - w[0]));
    out
}

/// Simple returns `(v[i] - v[i-1]) / v[i-1]`.
///
/// The first element, and any step from a zero (or non-finite) base, is 0.
/// The output never contains NaN or infinities.
pub fn period_returns(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }
    out.push(0.0);
    out.extend(values.windows(2).map(|w| safe_return(w[0], w[1])));
    out
}

/// Return from the first non-zero value to the last value.
pub fn cumulative_return(values: &[f64]) -> f64 {
    let base = values.iter().copied().find(|v| *v != 0.0 && v.is_finite());
    match (base, values.last()) {
        (Some(base), Some(last)) => safe_return(base, *last),
        _ => 0.0,
    }
}

fn safe_return(prev: f64, current: f64) -> f64 {
    if prev == 0.0 || !prev.is_finite() {
        return 0.0;
    }
    let r = (current - prev) / prev;
    if r.is_finite() { r } else { 0.0 }
}
