//! Overlap measures.

use crate::geometry::{BoxXywh, Corners};

/// Additive guard on every IoU denominator.
pub const IOU_EPS: f32 = 1e-10;

fn inclusive_intersection(a: &Corners, b: &Corners) -> f32 {
    let w = (a.x2.min(b.x2) - a.x1.max(b.x1) + 1.0).max(0.0);
    let h = (a.y2.min(b.y2) - a.y1.max(b.y1) + 1.0).max(0.0);
    w * h
}

/// IoU on the inclusive pixel grid.
///
/// Both the intersection and the areas count boundary pixels on each side.
/// Inverted or zero-area boxes yield a finite value.
pub fn iou_inclusive(a: &Corners, b: &Corners) -> f32 {
    let inter = inclusive_intersection(a, b);
    let union = a.pixel_area() + b.pixel_area() - inter;
    let iou = inter / (union + IOU_EPS);
    if iou.is_finite() {
        iou
    } else {
        0.0
    }
}

/// Distance-IoU on the inclusive pixel grid, clipped to `[-1, 1]`.
///
/// Subtracts the squared center distance over the squared diagonal of the
/// smallest enclosing box from [`iou_inclusive`].
pub fn diou_inclusive(a: &Corners, b: &Corners) -> f32 {
    let iou = iou_inclusive(a, b);
    let (acx, acy) = a.center();
    let (bcx, bcy) = b.center();
    let center_dist2 = (acx - bcx).powi(2) + (acy - bcy).powi(2);

    let outer_w = a.x2.max(b.x2) - a.x1.min(b.x1);
    let outer_h = a.y2.max(b.y2) - a.y1.min(b.y1);
    let diag2 = outer_w * outer_w + outer_h * outer_h;

    let diou = iou - center_dist2 / (diag2 + IOU_EPS);
    if diou.is_finite() {
        diou.clamp(-1.0, 1.0)
    } else {
        iou
    }
}

/// Continuous IoU as used by COCO evaluation.
///
/// When `crowd` is set the union is replaced by the area of `det`, so a crowd
/// region covers every detection lying inside it.
pub fn iou_coco(det: &BoxXywh, gt: &BoxXywh, crowd: bool) -> f64 {
    let dx2 = (det.x + det.width) as f64;
    let dy2 = (det.y + det.height) as f64;
    let gx2 = (gt.x + gt.width) as f64;
    let gy2 = (gt.y + gt.height) as f64;

    let iw = dx2.min(gx2) - (det.x as f64).max(gt.x as f64);
    let ih = dy2.min(gy2) - (det.y as f64).max(gt.y as f64);
    if iw <= 0.0 || ih <= 0.0 {
        return 0.0;
    }
    let inter = iw * ih;
    let det_area = det.width as f64 * det.height as f64;
    let union = if crowd {
        det_area
    } else {
        det_area + gt.width as f64 * gt.height as f64 - inter
    };
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}
