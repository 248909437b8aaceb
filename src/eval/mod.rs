//! COCO-style `bbox` evaluation.
//!
//! Detections are matched to ground truth per (image, category) at each IoU
//! threshold, for four object-size buckets. Precision/recall curves are then
//! accumulated per category, made monotone and sampled at evenly spaced
//! recall points. The twelve summary statistics follow the usual COCO layout.

mod accumulate;
mod coco;
mod matching;

pub use coco::{Category, GroundTruth, GtObject, ImageInfo};

use crate::aggregate::Detection;
use crate::geometry::iou_coco;
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{DetPostError, DetPostResult};
use accumulate::{accumulate, Accumulated, MISSING};
use matching::{evaluate_image, AREA_RANGES};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Evaluation parameters.
#[derive(Clone, Debug)]
pub struct EvalConfig {
    /// IoU thresholds, ascending.
    pub iou_thresholds: Vec<f64>,
    /// Number of evenly spaced recall sample points in `[0, 1]`.
    pub recall_points: usize,
    /// Detection caps per image, ascending; the last one caps matching.
    pub max_dets: [usize; 3],
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            iou_thresholds: (0..10).map(|i| (50 + 5 * i) as f64 / 100.0).collect(),
            recall_points: 101,
            max_dets: [1, 10, 100],
        }
    }
}

impl EvalConfig {
    fn validate(&self) -> DetPostResult<()> {
        if self.iou_thresholds.is_empty() {
            return Err(DetPostError::param("iou_thresholds", "must not be empty"));
        }
        if self
            .iou_thresholds
            .iter()
            .any(|t| !(0.0..=1.0).contains(t))
        {
            return Err(DetPostError::param("iou_thresholds", "must lie in [0, 1]"));
        }
        if self.recall_points < 2 {
            return Err(DetPostError::param("recall_points", "must be at least 2"));
        }
        if self.max_dets[0] == 0 || self.max_dets.windows(2).any(|w| w[0] > w[1]) {
            return Err(DetPostError::param(
                "max_dets",
                "must be positive and ascending",
            ));
        }
        Ok(())
    }

    fn recall_thresholds(&self) -> Vec<f64> {
        let last = (self.recall_points - 1) as f64;
        (0..self.recall_points).map(|i| i as f64 / last).collect()
    }

    fn iou_index(&self, iou: f64) -> Option<usize> {
        self.iou_thresholds
            .iter()
            .position(|&t| (t - iou).abs() < 1e-9)
    }
}

/// Average precision of one category over all IoU thresholds.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CategoryAp {
    pub category_id: u32,
    /// `-1` when the category has no ground truth.
    pub ap: f64,
}

/// The twelve COCO summary statistics; `-1` marks an undefined value.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Summary {
    pub ap: f64,
    pub ap50: f64,
    pub ap75: f64,
    pub ap_small: f64,
    pub ap_medium: f64,
    pub ap_large: f64,
    pub ar1: f64,
    pub ar10: f64,
    pub ar100: f64,
    pub ar_small: f64,
    pub ar_medium: f64,
    pub ar_large: f64,
    pub per_category: Vec<CategoryAp>,
    /// Detections that took part in matching.
    pub num_detections: usize,
    /// Detections dropped because their image is not annotated.
    pub skipped_detections: usize,
    #[serde(skip)]
    iou_range: (f64, f64),
    #[serde(skip)]
    max_dets: [usize; 3],
}

impl Summary {
    /// Statistics in COCO order.
    pub fn stats(&self) -> [f64; 12] {
        [
            self.ap,
            self.ap50,
            self.ap75,
            self.ap_small,
            self.ap_medium,
            self.ap_large,
            self.ar1,
            self.ar10,
            self.ar100,
            self.ar_small,
            self.ar_medium,
            self.ar_large,
        ]
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (lo, hi) = self.iou_range;
        let all_iou = format!("{lo:.2}:{hi:.2}");
        let [m1, m10, m100] = self.max_dets;
        let rows: [(&str, &str, String, &str, usize, f64); 12] = [
            ("Average Precision", "(AP)", all_iou.clone(), "all", m100, self.ap),
            ("Average Precision", "(AP)", "0.50".into(), "all", m100, self.ap50),
            ("Average Precision", "(AP)", "0.75".into(), "all", m100, self.ap75),
            ("Average Precision", "(AP)", all_iou.clone(), "small", m100, self.ap_small),
            ("Average Precision", "(AP)", all_iou.clone(), "medium", m100, self.ap_medium),
            ("Average Precision", "(AP)", all_iou.clone(), "large", m100, self.ap_large),
            ("Average Recall", "(AR)", all_iou.clone(), "all", m1, self.ar1),
            ("Average Recall", "(AR)", all_iou.clone(), "all", m10, self.ar10),
            ("Average Recall", "(AR)", all_iou.clone(), "all", m100, self.ar100),
            ("Average Recall", "(AR)", all_iou.clone(), "small", m100, self.ar_small),
            ("Average Recall", "(AR)", all_iou.clone(), "medium", m100, self.ar_medium),
            ("Average Recall", "(AR)", all_iou, "large", m100, self.ar_large),
        ];
        for (title, kind, iou, area, max_det, value) in rows {
            writeln!(
                f,
                " {title:<18} {kind} @[ IoU={iou:<9} | area={area:>6} | maxDets={max_det:>3} ] = {value:.3}"
            )?;
        }
        Ok(())
    }
}

/// Scores `detections` against `ground_truth`.
///
/// Detections whose image is not annotated are skipped with a warning; an
/// (image, category) pair without detections simply contributes none.
pub fn evaluate(
    ground_truth: &GroundTruth,
    detections: &[Detection],
    cfg: &EvalConfig,
) -> DetPostResult<Summary> {
    cfg.validate()?;
    let _span = trace_span!("evaluate", detections = detections.len()).entered();

    let mut by_key: BTreeMap<(u64, u32), Vec<Detection>> = BTreeMap::new();
    let mut unknown_images = BTreeSet::new();
    let mut skipped = 0usize;
    for det in detections {
        if !ground_truth.contains_image(det.image_id()) {
            skipped += 1;
            unknown_images.insert(det.image_id());
            continue;
        }
        by_key
            .entry((det.image_id(), det.category_id()))
            .or_default()
            .push(*det);
    }
    for image_id in &unknown_images {
        trace_warn!("image {} is not annotated; its detections are skipped", image_id);
    }

    let max_det = cfg.max_dets[2];
    for dts in by_key.values_mut() {
        dts.sort_by(|a, b| b.score().total_cmp(&a.score()));
        dts.truncate(max_det);
    }

    let category_ids = ground_truth.category_ids();
    let num_k = category_ids.len();
    let num_a = AREA_RANGES.len();
    let mut per_ka = vec![Vec::new(); num_k * num_a];
    let mut matched_detections = 0usize;

    for (k, &category_id) in category_ids.iter().enumerate() {
        for image_id in ground_truth.image_ids() {
            let gts = ground_truth.objects(image_id, category_id);
            let dts = by_key
                .get(&(image_id, category_id))
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            if gts.is_empty() && dts.is_empty() {
                continue;
            }
            matched_detections += dts.len();

            let ious: Vec<Vec<f64>> = dts
                .iter()
                .map(|d| {
                    gts.iter()
                        .map(|g| iou_coco(&d.bbox(), &g.bbox, g.iscrowd))
                        .collect()
                })
                .collect();

            for (a, area) in AREA_RANGES.iter().enumerate() {
                if let Some(e) = evaluate_image(gts, dts, &ious, area, &cfg.iou_thresholds) {
                    per_ka[k * num_a + a].push(e);
                }
            }
        }
    }

    let acc = accumulate(
        &per_ka,
        num_k,
        num_a,
        cfg.iou_thresholds.len(),
        &cfg.recall_thresholds(),
        &cfg.max_dets,
    );
    let summary = summarize(&acc, cfg, &category_ids, matched_detections, skipped);
    trace_event!("evaluation", ap = summary.ap, ap50 = summary.ap50, skipped = skipped);
    Ok(summary)
}

fn mean_valid(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .filter(|&v| v > MISSING)
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        MISSING
    } else {
        sum / n as f64
    }
}

fn average_precision(
    acc: &Accumulated,
    t: Option<usize>,
    k: Option<usize>,
    a: usize,
    m: usize,
) -> f64 {
    let ts: Vec<usize> = t.map_or_else(|| (0..acc.num_t).collect(), |t| vec![t]);
    let ks: Vec<usize> = k.map_or_else(|| (0..acc.num_k).collect(), |k| vec![k]);
    let mut values = Vec::with_capacity(ts.len() * ks.len() * acc.num_r);
    for &t in &ts {
        for r in 0..acc.num_r {
            for &k in &ks {
                values.push(acc.precision(t, r, k, a, m));
            }
        }
    }
    mean_valid(values.into_iter())
}

fn average_recall(acc: &Accumulated, a: usize, m: usize) -> f64 {
    let mut values = Vec::with_capacity(acc.num_t * acc.num_k);
    for t in 0..acc.num_t {
        for k in 0..acc.num_k {
            values.push(acc.recall(t, k, a, m));
        }
    }
    mean_valid(values.into_iter())
}

fn summarize(
    acc: &Accumulated,
    cfg: &EvalConfig,
    category_ids: &[u32],
    num_detections: usize,
    skipped_detections: usize,
) -> Summary {
    let m_last = acc.num_m - 1;
    let at_iou = |iou: f64| {
        cfg.iou_index(iou)
            .map_or(MISSING, |t| average_precision(acc, Some(t), None, 0, m_last))
    };
    let per_category = category_ids
        .iter()
        .enumerate()
        .map(|(k, &category_id)| CategoryAp {
            category_id,
            ap: average_precision(acc, None, Some(k), 0, m_last),
        })
        .collect();
    let first = cfg.iou_thresholds[0];
    let last = cfg.iou_thresholds[cfg.iou_thresholds.len() - 1];

    Summary {
        ap: average_precision(acc, None, None, 0, m_last),
        ap50: at_iou(0.5),
        ap75: at_iou(0.75),
        ap_small: average_precision(acc, None, None, 1, m_last),
        ap_medium: average_precision(acc, None, None, 2, m_last),
        ap_large: average_precision(acc, None, None, 3, m_last),
        ar1: average_recall(acc, 0, 0),
        ar10: average_recall(acc, 0, 1),
        ar100: average_recall(acc, 0, m_last),
        ar_small: average_recall(acc, 1, m_last),
        ar_medium: average_recall(acc, 2, m_last),
        ar_large: average_recall(acc, 3, m_last),
        per_category,
        num_detections,
        skipped_detections,
        iou_range: (first, last),
        max_dets: cfg.max_dets,
    }
}
