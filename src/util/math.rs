//! Small numeric helpers shared by decoding, clustering and evaluation.

/// Returns the index and value of the largest element.
///
/// Ties resolve to the first occurrence; NaN values never win.
pub(crate) fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &value) in values.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((idx, value)),
        }
    }
    best
}

/// Median of the values, averaging the two middle elements for even lengths.
///
/// The slice is reordered in place. Returns `None` for an empty slice.
pub(crate) fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some(0.5 * (values[mid - 1] + values[mid]))
    }
}

/// Clamps an interval `[start, start + len)` to `[0, limit]`.
///
/// Returns the clamped start and the remaining length, both non-negative.
pub(crate) fn clamp_extent(start: f32, len: f32, limit: f32) -> (f32, f32) {
    let lo = start.clamp(0.0, limit);
    let hi = (start + len).clamp(lo, limit);
    (lo, hi - lo)
}
