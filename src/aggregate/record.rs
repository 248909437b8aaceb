//! Detection records and the JSON interchange file.

use crate::geometry::BoxXywh;
use crate::util::{DetPostError, DetPostResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// One kept detection as written to the interchange file.
///
/// Serializes as `{"image_id", "category_id", "bbox": [x, y, w, h], "score"}`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    image_id: u64,
    category_id: u32,
    bbox: BoxXywh,
    score: f32,
}

impl Detection {
    pub fn new(image_id: u64, category_id: u32, bbox: BoxXywh, score: f32) -> Self {
        Self {
            image_id,
            category_id,
            bbox,
            score,
        }
    }

    pub fn image_id(&self) -> u64 {
        self.image_id
    }

    pub fn category_id(&self) -> u32 {
        self.category_id
    }

    pub fn bbox(&self) -> BoxXywh {
        self.bbox
    }

    pub fn score(&self) -> f32 {
        self.score
    }
}

/// Writes detections as a flat JSON array.
pub fn write_detections<P: AsRef<Path>>(path: P, detections: &[Detection]) -> DetPostResult<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|err| DetPostError::io(path, err))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, detections).map_err(|err| DetPostError::json(path, err))?;
    writer.flush().map_err(|err| DetPostError::io(path, err))?;
    Ok(())
}

/// Reads a detection file written by [`write_detections`].
pub fn read_detections<P: AsRef<Path>>(path: P) -> DetPostResult<Vec<Detection>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| DetPostError::io(path, err))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|err| DetPostError::json(path, err))
}
