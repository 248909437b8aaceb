//! K-means anchor-box clustering.
//!
//! Boxes are reduced to their (width, height) and clustered with the distance
//! `1 - IoU`, where the IoU of two sizes assumes both boxes share a corner.
//! Cluster centers are updated to the per-dimension median of their members.
//! Initialization samples distinct boxes with a seeded RNG, so the result is
//! fully determined by the seed and the input order.

mod annotation;

pub use annotation::{parse_annotation_line, read_annotation_file};

use crate::geometry::IOU_EPS;
use crate::trace::{trace_event, trace_span};
use crate::util::math::median;
use crate::util::{DetPostError, DetPostResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;

/// Width and height of a box, in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxSize {
    pub width: f32,
    pub height: f32,
}

impl BoxSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Clustering parameters.
#[derive(Clone, Debug)]
pub struct KMeansConfig {
    /// Number of anchors to produce.
    pub clusters: usize,
    /// Seed for choosing the initial centers.
    pub seed: u64,
    /// Upper bound on assignment/update rounds.
    pub max_iterations: usize,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            clusters: 9,
            seed: 0,
            max_iterations: 1000,
        }
    }
}

/// Result of a clustering run.
#[derive(Clone, Debug, PartialEq)]
pub struct Clusters {
    pub centers: Vec<BoxSize>,
    /// Cluster index of each input box.
    pub assignments: Vec<usize>,
    pub iterations: usize,
    /// `false` when `max_iterations` was reached first.
    pub converged: bool,
}

/// IoU of two sizes placed at a common corner.
pub fn shape_iou(a: BoxSize, b: BoxSize) -> f32 {
    let inter = a.width.min(b.width) * a.height.min(b.height);
    inter / (a.area() + b.area() - inter + IOU_EPS)
}

fn validate(boxes: &[BoxSize]) -> DetPostResult<()> {
    match boxes.iter().position(|b| !b.is_valid()) {
        Some(index) => Err(DetPostError::DegenerateBox { index }),
        None => Ok(()),
    }
}

fn nearest(b: BoxSize, centers: &[BoxSize]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (idx, &c) in centers.iter().enumerate() {
        let dist = 1.0 - shape_iou(b, c);
        if dist < best_dist {
            best_dist = dist;
            best = idx;
        }
    }
    best
}

/// Clusters box sizes into `cfg.clusters` centers.
pub fn kmeans(boxes: &[BoxSize], cfg: &KMeansConfig) -> DetPostResult<Clusters> {
    let k = cfg.clusters;
    if k == 0 {
        return Err(DetPostError::param("clusters", "must be at least 1"));
    }
    if k > boxes.len() {
        return Err(DetPostError::param(
            "clusters",
            format!("{k} clusters requested for {} boxes", boxes.len()),
        ));
    }
    validate(boxes)?;
    let _span = trace_span!("kmeans", boxes = boxes.len(), clusters = k).entered();

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let mut centers: Vec<BoxSize> = rand::seq::index::sample(&mut rng, boxes.len(), k)
        .into_iter()
        .map(|idx| boxes[idx])
        .collect();

    let mut last: Option<Vec<usize>> = None;
    let mut iterations = 0;
    let mut converged = false;
    while iterations < cfg.max_iterations {
        iterations += 1;
        let assignments: Vec<usize> = boxes.iter().map(|&b| nearest(b, &centers)).collect();
        if last.as_ref() == Some(&assignments) {
            converged = true;
            break;
        }

        for (cluster, center) in centers.iter_mut().enumerate() {
            let mut widths = Vec::new();
            let mut heights = Vec::new();
            for (b, _) in boxes
                .iter()
                .zip(&assignments)
                .filter(|&(_, &a)| a == cluster)
            {
                widths.push(b.width);
                heights.push(b.height);
            }
            // Empty clusters keep their previous center.
            if let (Some(w), Some(h)) = (median(&mut widths), median(&mut heights)) {
                *center = BoxSize::new(w, h);
            }
        }
        last = Some(assignments);
    }

    let assignments = match last {
        Some(a) if converged => a,
        _ => boxes.iter().map(|&b| nearest(b, &centers)).collect(),
    };
    trace_event!("kmeans_done", iterations = iterations, converged = converged);
    Ok(Clusters {
        centers,
        assignments,
        iterations,
        converged,
    })
}

/// Mean over boxes of the best IoU against any center.
pub fn average_iou(boxes: &[BoxSize], centers: &[BoxSize]) -> DetPostResult<f32> {
    if boxes.is_empty() || centers.is_empty() {
        return Err(DetPostError::InvalidInput(
            "average_iou needs at least one box and one center",
        ));
    }
    validate(boxes)?;
    let total: f32 = boxes
        .iter()
        .map(|&b| {
            centers
                .iter()
                .map(|&c| shape_iou(b, c))
                .fold(0.0f32, f32::max)
        })
        .sum();
    Ok(total / boxes.len() as f32)
}

/// Integer anchor size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Anchor {
    pub width: u32,
    pub height: u32,
}

/// Anchors sorted by area together with their fit on the training boxes.
#[derive(Clone, Debug, PartialEq)]
pub struct AnchorSet {
    pub anchors: Vec<Anchor>,
    /// [`average_iou`] of the unrounded centers.
    pub mean_iou: f32,
}

impl AnchorSet {
    /// Truncates centers to integers and sorts them by area.
    pub fn from_centers(centers: &[BoxSize], mean_iou: f32) -> Self {
        let mut anchors: Vec<Anchor> = centers
            .iter()
            .map(|c| Anchor {
                width: c.width as u32,
                height: c.height as u32,
            })
            .collect();
        anchors.sort_by_key(|a| a.width as u64 * a.height as u64);
        Self { anchors, mean_iou }
    }

    /// Builds the anchor set of a k-means run over `boxes`.
    pub fn from_clusters(boxes: &[BoxSize], clusters: &Clusters) -> DetPostResult<Self> {
        let mean_iou = average_iou(boxes, &clusters.centers)?;
        Ok(Self::from_centers(&clusters.centers, mean_iou))
    }
}

impl fmt::Display for AnchorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, a) in self.anchors.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{},{}", a.width, a.height)?;
        }
        Ok(())
    }
}

/// Clusters `boxes` and returns the sorted integer anchors.
pub fn compute_anchors(boxes: &[BoxSize], cfg: &KMeansConfig) -> DetPostResult<AnchorSet> {
    let clusters = kmeans(boxes, cfg)?;
    AnchorSet::from_clusters(boxes, &clusters)
}

#[cfg(test)]
mod tests {
    use super::{shape_iou, AnchorSet, BoxSize};

    #[test]
    fn shape_iou_of_identical_sizes_is_one() {
        let b = BoxSize::new(10.0, 20.0);
        assert!((shape_iou(b, b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn shape_iou_of_nested_sizes_is_area_ratio() {
        let iou = shape_iou(BoxSize::new(10.0, 10.0), BoxSize::new(20.0, 20.0));
        assert!((iou - 0.25).abs() < 1e-6);
    }

    #[test]
    fn anchors_are_truncated_and_sorted_by_area() {
        let set = AnchorSet::from_centers(
            &[BoxSize::new(30.7, 40.2), BoxSize::new(10.9, 12.1)],
            0.5,
        );
        assert_eq!(set.to_string(), "10,12, 30,40");
    }
}
