//! detpost is a CPU-side post-processing toolkit for YOLO-style detectors.
//!
//! The pipeline decodes multi-scale head tensors into scored boxes, prunes
//! them with greedy or distance-IoU non-max suppression, aggregates the kept
//! boxes into a COCO-style detection file and scores that file against COCO
//! ground truth. Alongside it live k-means anchor clustering, a training-loop
//! listener interface and a cosine learning-rate table.
//!
//! Cross-image parallelism is available via the `rayon` feature, structured
//! logging via `tracing`, and image-size probing via `image-io`.

mod trace;

pub mod aggregate;
pub mod anchors;
pub mod callback;
pub mod candidate;
pub mod decode;
pub mod engine;
pub mod eval;
pub mod geometry;
#[cfg(feature = "image-io")]
pub mod io;
pub mod lowlevel;
pub mod schedule;
pub mod suppress;
pub mod util;

pub use aggregate::{Aggregator, Detection, ResultStore};
pub use anchors::{compute_anchors, AnchorSet, BoxSize, KMeansConfig};
pub use callback::{Callback, CallbackList, RunContext};
pub use candidate::{Candidate, CandidateSet, ImageCandidates};
pub use decode::{
    CategoryMap, ConfidencePolicy, DecodeConfig, Decoder, HeadTensor, HeadView, ImageMeta,
};
pub use engine::Engine;
pub use eval::{evaluate, EvalConfig, GroundTruth, Summary};
pub use geometry::BoxXywh;
pub use schedule::cosine_decay_lr;
pub use suppress::{SuppressConfig, SuppressionMode, Suppressor};
pub use util::{DetPostError, DetPostResult};
