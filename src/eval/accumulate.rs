//! Precision/recall accumulation across images.

use crate::eval::matching::ImageEval;

/// Precision is `-1` where a category has no unignored ground truth.
pub(crate) const MISSING: f64 = -1.0;

/// Accumulated precision `[t][r][k][a][m]` and recall `[t][k][a][m]`.
#[derive(Clone, Debug)]
pub(crate) struct Accumulated {
    pub num_t: usize,
    pub num_r: usize,
    pub num_k: usize,
    pub num_a: usize,
    pub num_m: usize,
    precision: Vec<f64>,
    recall: Vec<f64>,
}

impl Accumulated {
    fn new(num_t: usize, num_r: usize, num_k: usize, num_a: usize, num_m: usize) -> Self {
        Self {
            num_t,
            num_r,
            num_k,
            num_a,
            num_m,
            precision: vec![MISSING; num_t * num_r * num_k * num_a * num_m],
            recall: vec![MISSING; num_t * num_k * num_a * num_m],
        }
    }

    fn p_idx(&self, t: usize, r: usize, k: usize, a: usize, m: usize) -> usize {
        (((t * self.num_r + r) * self.num_k + k) * self.num_a + a) * self.num_m + m
    }

    fn r_idx(&self, t: usize, k: usize, a: usize, m: usize) -> usize {
        ((t * self.num_k + k) * self.num_a + a) * self.num_m + m
    }

    pub fn precision(&self, t: usize, r: usize, k: usize, a: usize, m: usize) -> f64 {
        self.precision[self.p_idx(t, r, k, a, m)]
    }

    pub fn recall(&self, t: usize, k: usize, a: usize, m: usize) -> f64 {
        self.recall[self.r_idx(t, k, a, m)]
    }
}

/// Builds precision/recall tables.
///
/// `per_ka[k * num_a + a]` holds the image evaluations of category `k` in
/// area range `a`.
pub(crate) fn accumulate(
    per_ka: &[Vec<ImageEval>],
    num_k: usize,
    num_a: usize,
    num_t: usize,
    recall_thresholds: &[f64],
    max_dets: &[usize],
) -> Accumulated {
    let mut acc = Accumulated::new(num_t, recall_thresholds.len(), num_k, num_a, max_dets.len());

    for k in 0..num_k {
        for a in 0..num_a {
            let evals = &per_ka[k * num_a + a];
            if evals.is_empty() {
                continue;
            }
            let num_pos = evals
                .iter()
                .flat_map(|e| e.gt_ignore.iter())
                .filter(|&&ig| !ig)
                .count();
            if num_pos == 0 {
                continue;
            }

            for (m, &max_det) in max_dets.iter().enumerate() {
                // (score, image eval, detection column), stable by score.
                let mut entries: Vec<(f32, usize, usize)> = Vec::new();
                for (e_idx, e) in evals.iter().enumerate() {
                    let n = e.dt_scores.len().min(max_det);
                    entries.extend((0..n).map(|d| (e.dt_scores[d], e_idx, d)));
                }
                entries.sort_by(|x, y| y.0.total_cmp(&x.0));

                for t in 0..num_t {
                    let mut tp = 0usize;
                    let mut fp = 0usize;
                    let mut rc = Vec::with_capacity(entries.len());
                    let mut pr = Vec::with_capacity(entries.len());
                    for &(_, e_idx, d) in &entries {
                        let e = &evals[e_idx];
                        if !e.dt_ignore[t][d] {
                            if e.dt_matched[t][d] {
                                tp += 1;
                            } else {
                                fp += 1;
                            }
                        }
                        rc.push(tp as f64 / num_pos as f64);
                        pr.push(tp as f64 / ((tp + fp) as f64 + f64::EPSILON));
                    }

                    let r_idx = acc.r_idx(t, k, a, m);
                    acc.recall[r_idx] = rc.last().copied().unwrap_or(0.0);

                    for i in (1..pr.len()).rev() {
                        if pr[i] > pr[i - 1] {
                            pr[i - 1] = pr[i];
                        }
                    }

                    for (r, &thr) in recall_thresholds.iter().enumerate() {
                        let pos = rc.partition_point(|&v| v < thr);
                        let p_idx = acc.p_idx(t, r, k, a, m);
                        acc.precision[p_idx] = pr.get(pos).copied().unwrap_or(0.0);
                    }
                }
            }
        }
    }

    acc
}
