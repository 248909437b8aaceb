//! Image file helpers backed by the `image` crate.
//!
//! Available when the `image-io` feature is enabled.

use crate::decode::ImageMeta;
use crate::util::{DetPostError, DetPostResult};
use std::path::Path;

/// Reads the pixel dimensions of an image without decoding its pixels.
pub fn image_size<P: AsRef<Path>>(path: P) -> DetPostResult<(u32, u32)> {
    image::image_dimensions(path.as_ref()).map_err(|err| DetPostError::ImageIo {
        reason: format!("{}: {err}", path.as_ref().display()),
    })
}

/// Builds decode metadata for `image_id` from the image file on disk.
pub fn image_meta<P: AsRef<Path>>(image_id: u64, path: P) -> DetPostResult<ImageMeta> {
    let (width, height) = image_size(path)?;
    if width == 0 || height == 0 {
        return Err(DetPostError::InvalidInput("image has no pixels"));
    }
    Ok(ImageMeta::new(image_id, width as f32, height as f32))
}
