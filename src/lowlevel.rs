//! Low-level building blocks for custom post-processing pipelines.
//!
//! These expose the overlap measures, index-returning suppression loops and
//! clustering primitives underneath the high-level `Decoder`, `Suppressor`
//! and `compute_anchors` APIs. Most users should prefer those.

pub use crate::anchors::{average_iou, kmeans, shape_iou, Clusters};
pub use crate::decode::{BOX_ATTRS, COCO80_TO_91};
pub use crate::geometry::{diou_inclusive, iou_coco, iou_inclusive, Corners, IOU_EPS};
pub use crate::suppress::{diou_nms, nms};
