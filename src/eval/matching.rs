//! Per-image greedy matching of detections to ground truth.

use crate::aggregate::Detection;
use crate::eval::coco::GtObject;

/// Object-size bucket, in squared pixels.
#[derive(Clone, Copy, Debug)]
pub(crate) struct AreaRange {
    pub lo: f64,
    pub hi: f64,
}

impl AreaRange {
    fn contains(&self, area: f64) -> bool {
        area >= self.lo && area <= self.hi
    }
}

/// `all`, `small`, `medium`, `large`.
pub(crate) const AREA_RANGES: [AreaRange; 4] = [
    AreaRange { lo: 0.0, hi: 1e10 },
    AreaRange { lo: 0.0, hi: 32.0 * 32.0 },
    AreaRange { lo: 32.0 * 32.0, hi: 96.0 * 96.0 },
    AreaRange { lo: 96.0 * 96.0, hi: 1e10 },
];

/// Matching outcome of one (image, category, area range) triple.
///
/// Detection columns follow descending score order; rows are IoU thresholds.
#[derive(Clone, Debug)]
pub(crate) struct ImageEval {
    pub dt_scores: Vec<f32>,
    pub dt_matched: Vec<Vec<bool>>,
    pub dt_ignore: Vec<Vec<bool>>,
    pub gt_ignore: Vec<bool>,
}

/// Matches detections to ground truth for one area range.
///
/// `dts` must already be sorted by descending score and capped at the largest
/// detection limit; `ious[d][g]` is the overlap of `dts[d]` and `gts[g]`.
/// Returns `None` when there is nothing to evaluate.
pub(crate) fn evaluate_image(
    gts: &[GtObject],
    dts: &[Detection],
    ious: &[Vec<f64>],
    area: &AreaRange,
    iou_thresholds: &[f64],
) -> Option<ImageEval> {
    if gts.is_empty() && dts.is_empty() {
        return None;
    }

    // Crowd regions and out-of-range objects are ignored; ignored ones go last.
    let ignore_of = |g: &GtObject| g.iscrowd || !area.contains(g.area as f64);
    let mut gt_order: Vec<usize> = (0..gts.len()).collect();
    gt_order.sort_by_key(|&g| ignore_of(&gts[g]));
    let gt_ignore: Vec<bool> = gt_order.iter().map(|&g| ignore_of(&gts[g])).collect();

    let num_t = iou_thresholds.len();
    let mut gt_matched = vec![vec![false; gts.len()]; num_t];
    let mut dt_matched = vec![vec![false; dts.len()]; num_t];
    let mut dt_ignore = vec![vec![false; dts.len()]; num_t];

    if !gts.is_empty() && !dts.is_empty() {
        for (t, &thr) in iou_thresholds.iter().enumerate() {
            for d in 0..dts.len() {
                let mut best_iou = thr.min(1.0 - 1e-10);
                let mut best: Option<usize> = None;
                for (pos, &g) in gt_order.iter().enumerate() {
                    if gt_matched[t][pos] && !gts[g].iscrowd {
                        continue;
                    }
                    // Never trade a real match for an ignored object.
                    if let Some(m) = best {
                        if !gt_ignore[m] && gt_ignore[pos] {
                            break;
                        }
                    }
                    let iou = ious[d][g];
                    if iou < best_iou {
                        continue;
                    }
                    best_iou = iou;
                    best = Some(pos);
                }
                if let Some(m) = best {
                    dt_ignore[t][d] = gt_ignore[m];
                    dt_matched[t][d] = true;
                    gt_matched[t][m] = true;
                }
            }
        }
    }

    for (d, det) in dts.iter().enumerate() {
        let out_of_range = !area.contains(det.bbox().area() as f64);
        if out_of_range {
            for t in 0..num_t {
                if !dt_matched[t][d] {
                    dt_ignore[t][d] = true;
                }
            }
        }
    }

    Some(ImageEval {
        dt_scores: dts.iter().map(Detection::score).collect(),
        dt_matched,
        dt_ignore,
        gt_ignore,
    })
}

#[cfg(test)]
mod tests {
    use super::{evaluate_image, AREA_RANGES};
    use crate::aggregate::Detection;
    use crate::eval::coco::GtObject;
    use crate::geometry::{iou_coco, BoxXywh};

    fn gt(id: u64, bbox: BoxXywh, iscrowd: bool) -> GtObject {
        GtObject {
            id,
            bbox,
            area: bbox.area(),
            iscrowd,
        }
    }

    fn ious(dts: &[Detection], gts: &[GtObject]) -> Vec<Vec<f64>> {
        dts.iter()
            .map(|d| {
                gts.iter()
                    .map(|g| iou_coco(&d.bbox(), &g.bbox, g.iscrowd))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn each_object_matches_at_most_one_detection() {
        let gts = [gt(1, BoxXywh::new(0.0, 0.0, 50.0, 50.0), false)];
        let dts = [
            Detection::new(1, 1, BoxXywh::new(0.0, 0.0, 50.0, 50.0), 0.9),
            Detection::new(1, 1, BoxXywh::new(1.0, 1.0, 50.0, 50.0), 0.8),
        ];
        let e = evaluate_image(&gts, &dts, &ious(&dts, &gts), &AREA_RANGES[0], &[0.5]).unwrap();
        assert_eq!(e.dt_matched[0], vec![true, false]);
        assert_eq!(e.dt_ignore[0], vec![false, false]);
    }

    #[test]
    fn crowd_region_absorbs_detections_as_ignored() {
        let gts = [gt(1, BoxXywh::new(0.0, 0.0, 200.0, 200.0), true)];
        let dts = [
            Detection::new(1, 1, BoxXywh::new(10.0, 10.0, 20.0, 20.0), 0.9),
            Detection::new(1, 1, BoxXywh::new(100.0, 100.0, 20.0, 20.0), 0.8),
        ];
        let e = evaluate_image(&gts, &dts, &ious(&dts, &gts), &AREA_RANGES[0], &[0.5]).unwrap();
        assert_eq!(e.dt_matched[0], vec![true, true]);
        assert_eq!(e.dt_ignore[0], vec![true, true]);
        assert_eq!(e.gt_ignore, vec![true]);
    }

    #[test]
    fn nothing_to_evaluate_returns_none() {
        assert!(evaluate_image(&[], &[], &[], &AREA_RANGES[0], &[0.5]).is_none());
    }
}
