//! Classic IoU non-maximum suppression.

use crate::candidate::Candidate;
use crate::geometry::iou_inclusive;
use crate::suppress::{greedy_keep, prepare};

/// Applies greedy NMS and returns the kept indices, best first.
///
/// A box is removed when its inclusive-grid IoU with an already kept box is
/// greater than `threshold`. Equal scores keep insertion order.
pub fn nms(candidates: &[Candidate], threshold: f32) -> Vec<usize> {
    let (order, corners) = prepare(candidates);
    greedy_keep(order, &corners, threshold, iou_inclusive)
}
