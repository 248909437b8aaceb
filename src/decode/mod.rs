//! Multi-scale head decoding.
//!
//! The decoder turns raw head tensors into per-image [`ImageCandidates`]:
//! coordinates are rescaled from image fractions to original pixels, boxes are
//! clamped to the image, scores are formed from objectness and class scores,
//! low-confidence candidates are dropped and class indices are translated to
//! external category ids.

mod category;
mod head;
#[cfg(feature = "rayon")]
pub mod rayon;

pub use category::{CategoryMap, COCO80_TO_91};
pub use head::{HeadTensor, HeadView};

use crate::candidate::{Candidate, ImageCandidates};
use crate::geometry::BoxXywh;
use crate::trace::{trace_event, trace_span};
use crate::util::math::{argmax, clamp_extent};
use crate::util::{DetPostError, DetPostResult};

/// Number of leading box/objectness values in each anchor row.
pub const BOX_ATTRS: usize = 5;

/// How class scores turn into candidates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConfidencePolicy {
    /// One candidate per anchor for the arg-max class.
    SingleLabel,
    /// One candidate per class whose raw score exceeds `threshold`.
    MultiLabel { threshold: f32 },
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        ConfidencePolicy::MultiLabel { threshold: 0.1 }
    }
}

/// Decoder configuration.
#[derive(Clone, Debug)]
pub struct DecodeConfig {
    /// Number of model classes; heads must carry `5 + num_classes` attributes.
    pub num_classes: usize,
    /// Candidates scoring below this value are discarded.
    pub ignore_threshold: f32,
    /// Class selection policy.
    pub policy: ConfidencePolicy,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            num_classes: 80,
            ignore_threshold: 0.001,
            policy: ConfidencePolicy::default(),
        }
    }
}

/// Identity and original size of one batch element.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageMeta {
    pub image_id: u64,
    /// Original width in pixels.
    pub width: f32,
    /// Original height in pixels.
    pub height: f32,
}

impl ImageMeta {
    pub fn new(image_id: u64, width: f32, height: f32) -> Self {
        Self {
            image_id,
            width,
            height,
        }
    }
}

/// Converts head tensors into candidate sets.
#[derive(Clone, Debug)]
pub struct Decoder {
    cfg: DecodeConfig,
    categories: CategoryMap,
}

impl Decoder {
    /// Creates a decoder with default configuration.
    pub fn new(categories: CategoryMap) -> Self {
        Self {
            cfg: DecodeConfig::default(),
            categories,
        }
    }

    /// Replaces the decoder configuration.
    pub fn with_config(mut self, cfg: DecodeConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.cfg
    }

    pub fn categories(&self) -> &CategoryMap {
        &self.categories
    }

    /// Decodes every image of a batch, in batch order.
    ///
    /// `metas[b]` describes batch element `b` of every head.
    pub fn decode_batch(
        &self,
        heads: &[HeadView<'_>],
        metas: &[ImageMeta],
    ) -> DetPostResult<Vec<ImageCandidates>> {
        self.validate(heads, metas.len(), metas)?;
        let _span = trace_span!("decode_batch", images = metas.len(), heads = heads.len()).entered();
        let out: Vec<ImageCandidates> = metas
            .iter()
            .enumerate()
            .map(|(b, meta)| self.decode_validated(heads, b, meta))
            .collect();
        trace_event!(
            "decoded_candidates",
            count = out.iter().map(ImageCandidates::num_candidates).sum::<usize>()
        );
        Ok(out)
    }

    /// Decodes batch element `batch_idx` of every head.
    pub fn decode_image(
        &self,
        heads: &[HeadView<'_>],
        batch_idx: usize,
        meta: &ImageMeta,
    ) -> DetPostResult<ImageCandidates> {
        self.validate(heads, batch_idx + 1, std::slice::from_ref(meta))?;
        Ok(self.decode_validated(heads, batch_idx, meta))
    }

    pub(crate) fn validate(
        &self,
        heads: &[HeadView<'_>],
        images: usize,
        metas: &[ImageMeta],
    ) -> DetPostResult<()> {
        if self.cfg.num_classes == 0 {
            return Err(DetPostError::InvalidInput("num_classes must be at least 1"));
        }
        if self.categories.len() < self.cfg.num_classes {
            return Err(DetPostError::IndexOutOfBounds {
                index: self.cfg.num_classes - 1,
                len: self.categories.len(),
                context: "category table",
            });
        }
        let expected = BOX_ATTRS + self.cfg.num_classes;
        for head in heads {
            if head.attrs() != expected {
                return Err(DetPostError::AttributeMismatch {
                    expected,
                    got: head.attrs(),
                });
            }
            if head.batch() < images {
                return Err(DetPostError::BatchMismatch {
                    images,
                    batch: head.batch(),
                });
            }
        }
        for meta in metas {
            if !(meta.width.is_finite() && meta.width >= 0.0) {
                return Err(DetPostError::param(
                    "width",
                    format!("image {} has width {}", meta.image_id, meta.width),
                ));
            }
            if !(meta.height.is_finite() && meta.height >= 0.0) {
                return Err(DetPostError::param(
                    "height",
                    format!("image {} has height {}", meta.image_id, meta.height),
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn decode_validated(
        &self,
        heads: &[HeadView<'_>],
        batch_idx: usize,
        meta: &ImageMeta,
    ) -> ImageCandidates {
        let mut out = ImageCandidates::new(meta.image_id);
        for head in heads {
            let Some(rows) = head.rows(batch_idx) else {
                continue;
            };
            for row in rows {
                self.decode_row(row, meta, &mut out);
            }
        }
        out
    }

    fn decode_row(&self, row: &[f32], meta: &ImageMeta, out: &mut ImageCandidates) {
        let Some(bbox) = rescale_box(row, meta) else {
            return;
        };
        let objectness = row[4];
        let classes = &row[BOX_ATTRS..];

        match self.cfg.policy {
            ConfidencePolicy::SingleLabel => {
                if let Some((class_idx, class_score)) = argmax(classes) {
                    self.emit(class_idx, class_score * objectness, bbox, out);
                }
            }
            ConfidencePolicy::MultiLabel { threshold } => {
                for (class_idx, &class_score) in classes.iter().enumerate() {
                    if class_score > threshold {
                        self.emit(class_idx, class_score * objectness, bbox, out);
                    }
                }
            }
        }
    }

    fn emit(&self, class_idx: usize, score: f32, bbox: BoxXywh, out: &mut ImageCandidates) {
        if !score.is_finite() || score < self.cfg.ignore_threshold {
            return;
        }
        if let Some(category_id) = self.categories.get(class_idx) {
            out.push(category_id, Candidate::new(bbox, score));
        }
    }
}

/// Rescales a fractional center box to pixels and clamps it to the image.
///
/// Returns `None` when any coordinate is not finite after scaling.
fn rescale_box(row: &[f32], meta: &ImageMeta) -> Option<BoxXywh> {
    let raw = BoxXywh::from_center(
        row[0] * meta.width,
        row[1] * meta.height,
        row[2] * meta.width,
        row[3] * meta.height,
    );
    if ![raw.x, raw.y, raw.width, raw.height].iter().all(|v| v.is_finite()) {
        return None;
    }
    let (x, width) = clamp_extent(raw.x, raw.width, meta.width);
    let (y, height) = clamp_extent(raw.y, raw.height, meta.height);
    Some(BoxXywh::new(x, y, width, height))
}
