//! Distance-IoU non-maximum suppression.

use crate::candidate::Candidate;
use crate::geometry::diou_inclusive;
use crate::suppress::{greedy_keep, prepare};

/// Applies greedy DIoU-NMS and returns the kept indices, best first.
///
/// A box is removed when `IoU - d² / c²` (clipped to `[-1, 1]`) with an
/// already kept box is greater than `threshold`, where `d` is the distance
/// between centers and `c` the diagonal of the smallest enclosing box.
pub fn diou_nms(candidates: &[Candidate], threshold: f32) -> Vec<usize> {
    let (order, corners) = prepare(candidates);
    greedy_keep(order, &corners, threshold, diou_inclusive)
}
