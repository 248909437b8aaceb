//! Box representations shared by the decoder, suppressors and evaluator.
//!
//! Detections travel as [`BoxXywh`] (top-left corner plus extent, the COCO
//! interchange layout). Suppression converts to [`Corners`] and measures
//! overlap on the inclusive pixel grid, where a box spanning `x1..=x2` covers
//! `x2 - x1 + 1` pixels.

use serde::{Deserialize, Serialize};

mod iou;

pub use iou::{diou_inclusive, iou_coco, iou_inclusive, IOU_EPS};

/// Axis-aligned box in pixel units: top-left corner, width and height.
///
/// Serializes as the four-element array `[x, y, w, h]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoxXywh {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Horizontal extent.
    pub width: f32,
    /// Vertical extent.
    pub height: f32,
}

impl BoxXywh {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a box from its center and extent.
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    /// Continuous area `width * height` (no pixel-grid correction).
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Corner form with `x2 = x + width`, `y2 = y + height`.
    pub fn corners(&self) -> Corners {
        Corners {
            x1: self.x,
            y1: self.y,
            x2: self.x + self.width,
            y2: self.y + self.height,
        }
    }

    /// Returns `true` when every coordinate is finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

impl From<[f32; 4]> for BoxXywh {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoxXywh> for [f32; 4] {
    fn from(b: BoxXywh) -> Self {
        [b.x, b.y, b.width, b.height]
    }
}

/// Axis-aligned box in corner form.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Corners {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Corners {
    /// Area on the inclusive pixel grid: `(x2 - x1 + 1) * (y2 - y1 + 1)`.
    pub fn pixel_area(&self) -> f32 {
        (self.x2 - self.x1 + 1.0) * (self.y2 - self.y1 + 1.0)
    }

    /// Center point.
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }
}
