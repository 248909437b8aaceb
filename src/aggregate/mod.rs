//! Dataset-wide accumulation of kept detections.
//!
//! The [`Aggregator`] owns a [`ResultStore`] mapping image id to category id
//! to the kept boxes of that pair. It grows monotonically through
//! [`Aggregator::record`] and is written exactly once by
//! [`Aggregator::finalize`]; afterwards it is read-only and the written file
//! can be scored with [`Aggregator::evaluate`].

mod record;

pub use record::{read_detections, write_detections, Detection};

use crate::candidate::{Candidate, ImageCandidates};
use crate::eval::{evaluate, EvalConfig, GroundTruth, Summary};
use crate::suppress::Suppressor;
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{DetPostError, DetPostResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Kept boxes keyed by image id, then category id.
#[derive(Clone, Debug, Default)]
pub struct ResultStore {
    results: BTreeMap<u64, BTreeMap<u32, Vec<Candidate>>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends boxes for one (image, category) pair.
    pub fn record<I>(&mut self, image_id: u64, category_id: u32, kept: I)
    where
        I: IntoIterator<Item = Candidate>,
    {
        self.results
            .entry(image_id)
            .or_default()
            .entry(category_id)
            .or_default()
            .extend(kept);
    }

    /// Boxes stored for one (image, category) pair.
    pub fn get(&self, image_id: u64, category_id: u32) -> &[Candidate] {
        self.results
            .get(&image_id)
            .and_then(|cats| cats.get(&category_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn num_images(&self) -> usize {
        self.results.len()
    }

    pub fn num_detections(&self) -> usize {
        self.results
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    /// Flattens the store into detection records, ordered by image id, then
    /// category id, then recording order.
    pub fn detections(&self) -> Vec<Detection> {
        let mut out = Vec::with_capacity(self.num_detections());
        for (&image_id, cats) in &self.results {
            for (&category_id, boxes) in cats {
                out.extend(
                    boxes
                        .iter()
                        .map(|c| Detection::new(image_id, category_id, c.bbox, c.score)),
                );
            }
        }
        out
    }
}

/// Collects suppression output and produces the detection file.
#[derive(Debug, Default)]
pub struct Aggregator {
    store: ResultStore,
    written: Option<PathBuf>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the kept boxes of one (image, category) pair.
    ///
    /// No deduplication is performed; callers record each pair once.
    /// Boxes with a non-finite coordinate or score are dropped with a warning
    /// since they cannot be written to the detection file.
    pub fn record<I>(&mut self, image_id: u64, category_id: u32, kept: I) -> DetPostResult<()>
    where
        I: IntoIterator<Item = Candidate>,
    {
        if self.written.is_some() {
            return Err(DetPostError::AlreadyFinalized);
        }
        let (finite, dropped): (Vec<Candidate>, Vec<Candidate>) = kept
            .into_iter()
            .partition(|c| c.bbox.is_finite() && c.score.is_finite());
        if !dropped.is_empty() {
            trace_warn!(
                "image {} category {}: dropped {} non-finite detections",
                image_id,
                category_id,
                dropped.len()
            );
        }
        self.store.record(image_id, category_id, finite);
        Ok(())
    }

    /// Records every category of an already suppressed image.
    pub fn record_image(&mut self, kept: ImageCandidates) -> DetPostResult<()> {
        let image_id = kept.image_id();
        for (category_id, set) in kept {
            self.record(image_id, category_id, set.into_vec())?;
        }
        Ok(())
    }

    /// Suppresses each category of `candidates` and records the survivors.
    pub fn suppress_and_record(
        &mut self,
        candidates: &ImageCandidates,
        suppressor: &Suppressor,
    ) -> DetPostResult<()> {
        for (category_id, set) in candidates.iter() {
            let kept = suppressor.suppress(set);
            self.record(candidates.image_id(), category_id, kept.into_vec())?;
        }
        Ok(())
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Path of the written detection file, once finalized.
    pub fn output_path(&self) -> Option<&Path> {
        self.written.as_deref()
    }

    pub fn is_finalized(&self) -> bool {
        self.written.is_some()
    }

    /// Writes the store as a flat detection list to `path`.
    ///
    /// A failed write leaves the aggregator open so it can be retried.
    pub fn finalize<P: AsRef<Path>>(&mut self, path: P) -> DetPostResult<PathBuf> {
        if self.written.is_some() {
            return Err(DetPostError::AlreadyFinalized);
        }
        let path = path.as_ref().to_path_buf();
        let _span = trace_span!("finalize").entered();
        let detections = self.store.detections();
        write_detections(&path, &detections)?;
        trace_event!(
            "detections_written",
            images = self.store.num_images(),
            detections = detections.len()
        );
        self.written = Some(path.clone());
        Ok(path)
    }

    /// Loads the written file and scores it against `ground_truth`.
    pub fn evaluate(&self, ground_truth: &GroundTruth, cfg: &EvalConfig) -> DetPostResult<Summary> {
        let path = self.written.as_ref().ok_or(DetPostError::NotFinalized)?;
        let detections = read_detections(path)?;
        evaluate(ground_truth, &detections, cfg)
    }
}
