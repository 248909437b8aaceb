//! Error types for detpost.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for detpost operations.
pub type DetPostResult<T> = std::result::Result<T, DetPostError>;

/// Errors that can occur while decoding, suppressing, aggregating or
/// evaluating detections.
#[derive(Debug, Error)]
pub enum DetPostError {
    /// The input data or parameters are invalid.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// A tensor shape has a zero-sized dimension.
    #[error("invalid head shape: {shape:?}")]
    InvalidShape { shape: [usize; 5] },
    /// A head's attribute count does not match `5 + num_classes`.
    #[error("head has {got} attributes per anchor, expected {expected}")]
    AttributeMismatch { expected: usize, got: usize },
    /// The backing buffer is smaller than required.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// A head holds fewer batch elements than images supplied.
    #[error("batch mismatch: {images} images but head batch is {batch}")]
    BatchMismatch { images: usize, batch: usize },
    /// An index is out of bounds for the requested collection.
    #[error("index {index} out of bounds for {context} (len {len})")]
    IndexOutOfBounds {
        index: usize,
        len: usize,
        context: &'static str,
    },
    /// A box with zero width or height was passed where area is required.
    #[error("box {index} has no area")]
    DegenerateBox { index: usize },
    /// A parameter failed validation.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    /// Training was stopped because the loss is not finite.
    #[error("epoch {epoch} step {step}: invalid loss {loss}, terminating training")]
    InvalidLoss { epoch: usize, step: usize, loss: f32 },
    /// The aggregator has already been finalized.
    #[error("result store is already finalized")]
    AlreadyFinalized,
    /// The aggregator has not written its detection file yet.
    #[error("result store has not been finalized")]
    NotFinalized,
    /// Reading or writing a file failed.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// JSON could not be encoded or decoded.
    #[error("json error on {path}: {reason}")]
    Json { path: PathBuf, reason: String },
    /// An annotation line could not be parsed.
    #[error("annotation line {line}: {reason}")]
    Annotation { line: usize, reason: String },
    /// Image loading failed.
    #[cfg(feature = "image-io")]
    #[error("image I/O error: {reason}")]
    ImageIo { reason: String },
}

impl DetPostError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DetPostError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, err: serde_json::Error) -> Self {
        DetPostError::Json {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn param(name: &'static str, reason: impl Into<String>) -> Self {
        DetPostError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
