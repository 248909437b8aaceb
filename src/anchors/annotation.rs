//! Box-size extraction from line-based annotation files.
//!
//! Each line reads `index path width height` followed by any number of
//! `class x_min y_min x_max y_max` groups.

use crate::anchors::BoxSize;
use crate::util::{DetPostError, DetPostResult};
use std::fs;
use std::path::Path;

fn parse_field<T: std::str::FromStr>(token: &str, line: usize, what: &str) -> DetPostResult<T> {
    token.parse().map_err(|_| DetPostError::Annotation {
        line,
        reason: format!("cannot parse {what} from `{token}`"),
    })
}

/// Extracts the box sizes of one annotation line.
///
/// With `target_size = Some((w, h))` every size is scaled by the letterbox
/// ratio `min(w / img_w, h / img_h)`. Boxes without positive extent are
/// skipped. Blank lines yield no boxes.
pub fn parse_annotation_line(
    text: &str,
    line: usize,
    target_size: Option<(f32, f32)>,
) -> DetPostResult<Vec<BoxSize>> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return Ok(Vec::new());
    }
    if tokens.len() < 4 {
        return Err(DetPostError::Annotation {
            line,
            reason: format!("expected at least 4 fields, got {}", tokens.len()),
        });
    }
    let img_w: f32 = parse_field(tokens[2], line, "image width")?;
    let img_h: f32 = parse_field(tokens[3], line, "image height")?;
    let ratio = match target_size {
        Some((tw, th)) => {
            if img_w <= 0.0 || img_h <= 0.0 {
                return Err(DetPostError::Annotation {
                    line,
                    reason: "image size must be positive".into(),
                });
            }
            (tw / img_w).min(th / img_h)
        }
        None => 1.0,
    };

    let mut out = Vec::new();
    for group in tokens[4..].chunks_exact(5) {
        let x_min: f32 = parse_field(group[1], line, "x_min")?;
        let y_min: f32 = parse_field(group[2], line, "y_min")?;
        let x_max: f32 = parse_field(group[3], line, "x_max")?;
        let y_max: f32 = parse_field(group[4], line, "y_max")?;
        let width = x_max - x_min;
        let height = y_max - y_min;
        if width <= 0.0 || height <= 0.0 {
            continue;
        }
        out.push(BoxSize::new(width * ratio, height * ratio));
    }
    Ok(out)
}

/// Reads every box size of an annotation file.
pub fn read_annotation_file<P: AsRef<Path>>(
    path: P,
    target_size: Option<(f32, f32)>,
) -> DetPostResult<Vec<BoxSize>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|err| DetPostError::io(path, err))?;
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        out.extend(parse_annotation_line(line, idx + 1, target_size)?);
    }
    Ok(out)
}
