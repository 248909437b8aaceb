//! Per-step learning-rate tables.

use crate::util::{DetPostError, DetPostResult};

/// Cosine-decayed learning rate for every step, starting at `start_step`.
///
/// For step `i` the epoch is `min(i / step_per_epoch, decay_epoch)` and the
/// rate is `min_lr + 0.5 * (max_lr - min_lr) * (1 + cos(pi * epoch / decay_epoch))`.
/// The returned table has `total_step - start_step` entries.
pub fn cosine_decay_lr(
    min_lr: f32,
    max_lr: f32,
    total_step: usize,
    step_per_epoch: usize,
    decay_epoch: usize,
    start_step: usize,
) -> DetPostResult<Vec<f32>> {
    if !(min_lr.is_finite() && min_lr >= 0.0) {
        return Err(DetPostError::param("min_lr", "must be a non-negative number"));
    }
    if !(max_lr.is_finite() && max_lr > 0.0) {
        return Err(DetPostError::param("max_lr", "must be a positive number"));
    }
    if min_lr >= max_lr {
        return Err(DetPostError::param(
            "max_lr",
            format!("must be greater than min_lr ({max_lr} <= {min_lr})"),
        ));
    }
    for (name, value) in [
        ("total_step", total_step),
        ("step_per_epoch", step_per_epoch),
        ("decay_epoch", decay_epoch),
    ] {
        if value == 0 {
            return Err(DetPostError::param(name, "must be positive"));
        }
    }
    if start_step >= total_step {
        return Err(DetPostError::param(
            "start_step",
            format!("must be less than total_step ({start_step} >= {total_step})"),
        ));
    }

    let min = min_lr as f64;
    let delta = 0.5 * (max_lr as f64 - min);
    let decay = decay_epoch as f64;
    Ok((start_step..total_step)
        .map(|i| {
            let epoch = (i / step_per_epoch).min(decay_epoch) as f64;
            (min + delta * (1.0 + (std::f64::consts::PI * epoch / decay).cos())) as f32
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::cosine_decay_lr;

    fn assert_close(got: &[f32], want: &[f32]) {
        assert_eq!(got.len(), want.len());
        for (g, w) in got.iter().zip(want) {
            assert!((g - w).abs() < 1e-6, "{got:?} != {want:?}");
        }
    }

    #[test]
    fn decays_per_epoch_and_holds_minimum() {
        let lr = cosine_decay_lr(0.01, 0.1, 6, 2, 2, 0).unwrap();
        assert_close(&lr, &[0.1, 0.1, 0.055, 0.055, 0.01, 0.01]);

        let resumed = cosine_decay_lr(0.01, 0.1, 6, 2, 2, 2).unwrap();
        assert_close(&resumed, &[0.055, 0.055, 0.01, 0.01]);
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(cosine_decay_lr(0.1, 0.1, 6, 2, 2, 0).is_err());
        assert!(cosine_decay_lr(-0.1, 0.1, 6, 2, 2, 0).is_err());
        assert!(cosine_decay_lr(0.0, 0.1, 0, 2, 2, 0).is_err());
        assert!(cosine_decay_lr(0.0, 0.1, 6, 0, 2, 0).is_err());
        assert!(cosine_decay_lr(0.0, 0.1, 6, 2, 0, 0).is_err());
        assert!(cosine_decay_lr(0.0, 0.1, 6, 2, 2, 6).is_err());
    }
}
