//! Per-class non-maximum suppression.
//!
//! Both algorithms share the same greedy loop: take the best remaining box,
//! keep it, drop every remaining box whose overlap with it exceeds the
//! threshold, repeat. They differ only in the overlap measure:
//!
//! * [`SuppressionMode::Greedy`] uses IoU on the inclusive pixel grid.
//! * [`SuppressionMode::Diou`] uses IoU minus the normalized squared center
//!   distance, so boxes whose centers are far apart survive more easily.
//!
//! The loop is inherently sequential; callers may parallelize across
//! (image, category) pairs but never within one set.

mod diou;
mod nms;

pub use diou::diou_nms;
pub use nms::nms;

use crate::candidate::{order_desc, Candidate, CandidateSet, ImageCandidates};
use crate::geometry::Corners;
use crate::trace::trace_event;

/// Suppression algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SuppressionMode {
    /// Classic IoU-threshold NMS.
    #[default]
    Greedy,
    /// Distance-IoU NMS.
    Diou,
}

/// Suppression configuration.
#[derive(Clone, Debug)]
pub struct SuppressConfig {
    pub mode: SuppressionMode,
    /// Boxes overlapping a kept box by more than this value are removed.
    pub iou_threshold: f32,
}

impl Default for SuppressConfig {
    fn default() -> Self {
        Self {
            mode: SuppressionMode::Greedy,
            iou_threshold: 0.5,
        }
    }
}

/// Applies the configured suppression to candidate sets.
#[derive(Clone, Debug, Default)]
pub struct Suppressor {
    cfg: SuppressConfig,
}

impl Suppressor {
    pub fn new(cfg: SuppressConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &SuppressConfig {
        &self.cfg
    }

    /// Returns the kept subset of `set`, highest score first.
    pub fn suppress(&self, set: &CandidateSet) -> CandidateSet {
        let items = set.as_slice();
        let keep = match self.cfg.mode {
            SuppressionMode::Greedy => nms(items, self.cfg.iou_threshold),
            SuppressionMode::Diou => diou_nms(items, self.cfg.iou_threshold),
        };
        keep.into_iter().map(|idx| items[idx]).collect()
    }

    /// Suppresses every category of one image independently.
    pub fn suppress_image(&self, candidates: &ImageCandidates) -> ImageCandidates {
        let mut out = ImageCandidates::new(candidates.image_id());
        for (category_id, set) in candidates.iter() {
            for candidate in self.suppress(set).into_vec() {
                out.push(category_id, candidate);
            }
        }
        trace_event!(
            "suppressed_image",
            image_id = candidates.image_id(),
            before = candidates.num_candidates(),
            after = out.num_candidates()
        );
        out
    }
}

/// Greedy suppression loop shared by both algorithms.
///
/// Returns kept indices into `corners`, ordered by descending score.
pub(crate) fn greedy_keep<F>(
    order: Vec<usize>,
    corners: &[Corners],
    threshold: f32,
    overlap: F,
) -> Vec<usize>
where
    F: Fn(&Corners, &Corners) -> f32,
{
    let mut keep = Vec::new();
    let mut remaining = order;
    while let Some((&best, rest)) = remaining.split_first() {
        keep.push(best);
        remaining = rest
            .iter()
            .copied()
            .filter(|&idx| overlap(&corners[best], &corners[idx]) <= threshold)
            .collect();
    }
    keep
}

pub(crate) fn prepare(candidates: &[Candidate]) -> (Vec<usize>, Vec<Corners>) {
    let order = order_desc(candidates);
    let corners = candidates.iter().map(|c| c.bbox.corners()).collect();
    (order, corners)
}
