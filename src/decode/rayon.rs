//! Rayon-parallel batch decoding (feature-gated).
//!
//! Batch elements are independent, so each image is decoded on its own task.
//! The output order matches [`Decoder::decode_batch`].

use crate::candidate::ImageCandidates;
use crate::decode::{Decoder, HeadView, ImageMeta};
use crate::util::DetPostResult;
use rayon::prelude::*;

/// Decodes every image of a batch in parallel.
pub fn decode_batch_par(
    decoder: &Decoder,
    heads: &[HeadView<'_>],
    metas: &[ImageMeta],
) -> DetPostResult<Vec<ImageCandidates>> {
    decoder.validate(heads, metas.len(), metas)?;
    Ok(metas
        .par_iter()
        .enumerate()
        .map(|(b, meta)| decoder.decode_validated(heads, b, meta))
        .collect())
}
