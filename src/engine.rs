//! Decode → suppress → record for whole batches.

use crate::aggregate::Aggregator;
use crate::candidate::ImageCandidates;
use crate::decode::{Decoder, HeadView, ImageMeta};
use crate::eval::{EvalConfig, GroundTruth, Summary};
use crate::suppress::Suppressor;
use crate::trace::trace_span;
use crate::util::{DetPostError, DetPostResult};
use std::path::{Path, PathBuf};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Drives a [`Decoder`] and a [`Suppressor`] into an owned [`Aggregator`].
#[derive(Debug)]
pub struct Engine {
    decoder: Decoder,
    suppressor: Suppressor,
    aggregator: Aggregator,
    parallel: bool,
}

impl Engine {
    pub fn new(decoder: Decoder, suppressor: Suppressor) -> Self {
        Self {
            decoder,
            suppressor,
            aggregator: Aggregator::new(),
            parallel: false,
        }
    }

    /// Processes images of a batch on the rayon pool.
    ///
    /// Only takes effect with the `rayon` feature; results are recorded in
    /// batch order either way, so the store does not depend on this flag.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    pub fn suppressor(&self) -> &Suppressor {
        &self.suppressor
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn into_aggregator(self) -> Aggregator {
        self.aggregator
    }

    /// Decodes and suppresses one batch and records the kept boxes.
    ///
    /// Returns the number of detections recorded for this batch.
    pub fn process(&mut self, heads: &[HeadView<'_>], metas: &[ImageMeta]) -> DetPostResult<usize> {
        if self.aggregator.is_finalized() {
            return Err(DetPostError::AlreadyFinalized);
        }
        let _span = trace_span!("engine_batch", images = metas.len()).entered();
        let kept = if self.parallel {
            self.run_parallel(heads, metas)?
        } else {
            self.run_sequential(heads, metas)?
        };

        let mut recorded = 0;
        for image in kept {
            recorded += image.num_candidates();
            self.aggregator.record_image(image)?;
        }
        Ok(recorded)
    }

    fn run_sequential(
        &self,
        heads: &[HeadView<'_>],
        metas: &[ImageMeta],
    ) -> DetPostResult<Vec<ImageCandidates>> {
        let decoded = self.decoder.decode_batch(heads, metas)?;
        Ok(decoded
            .iter()
            .map(|c| self.suppressor.suppress_image(c))
            .collect())
    }

    #[cfg(feature = "rayon")]
    fn run_parallel(
        &self,
        heads: &[HeadView<'_>],
        metas: &[ImageMeta],
    ) -> DetPostResult<Vec<ImageCandidates>> {
        self.decoder.validate(heads, metas.len(), metas)?;
        Ok(metas
            .par_iter()
            .enumerate()
            .map(|(b, meta)| {
                let decoded = self.decoder.decode_validated(heads, b, meta);
                self.suppressor.suppress_image(&decoded)
            })
            .collect())
    }

    #[cfg(not(feature = "rayon"))]
    fn run_parallel(
        &self,
        heads: &[HeadView<'_>],
        metas: &[ImageMeta],
    ) -> DetPostResult<Vec<ImageCandidates>> {
        self.run_sequential(heads, metas)
    }

    /// Writes the detection file; see [`Aggregator::finalize`].
    pub fn finalize<P: AsRef<Path>>(&mut self, path: P) -> DetPostResult<PathBuf> {
        self.aggregator.finalize(path)
    }

    /// Scores the written file; see [`Aggregator::evaluate`].
    pub fn evaluate(&self, ground_truth: &GroundTruth, cfg: &EvalConfig) -> DetPostResult<Summary> {
        self.aggregator.evaluate(ground_truth, cfg)
    }
}
