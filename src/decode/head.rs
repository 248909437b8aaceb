//! Raw detection-head tensors.
//!
//! A head tensor is laid out as `(batch, grid_y, grid_x, anchors, attrs)` in
//! row-major order, where each anchor row holds `attrs = 5 + num_classes`
//! values: `cx, cy, w, h` as fractions of the image, objectness, then the
//! per-class scores.

use crate::util::{DetPostError, DetPostResult};

/// Borrowed view into one head tensor.
#[derive(Copy, Clone, Debug)]
pub struct HeadView<'a> {
    data: &'a [f32],
    shape: [usize; 5],
}

impl<'a> HeadView<'a> {
    /// Creates a view over `data` with shape `(batch, grid_y, grid_x, anchors, attrs)`.
    pub fn new(data: &'a [f32], shape: [usize; 5]) -> DetPostResult<Self> {
        let needed = required_len(shape)?;
        if data.len() < needed {
            return Err(DetPostError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self { data, shape })
    }

    pub fn shape(&self) -> [usize; 5] {
        self.shape
    }

    pub fn batch(&self) -> usize {
        self.shape[0]
    }

    pub fn grid_y(&self) -> usize {
        self.shape[1]
    }

    pub fn grid_x(&self) -> usize {
        self.shape[2]
    }

    pub fn anchors(&self) -> usize {
        self.shape[3]
    }

    /// Values per anchor row (`5 + num_classes`).
    pub fn attrs(&self) -> usize {
        self.shape[4]
    }

    /// Anchor rows per batch element.
    pub fn rows_per_image(&self) -> usize {
        self.shape[1] * self.shape[2] * self.shape[3]
    }

    /// Returns the contiguous slice of batch element `b`.
    pub fn image(&self, b: usize) -> Option<&'a [f32]> {
        if b >= self.batch() {
            return None;
        }
        let len = self.rows_per_image() * self.attrs();
        let start = b.checked_mul(len)?;
        self.data.get(start..start + len)
    }

    /// Iterates the anchor rows of batch element `b`.
    pub fn rows(&self, b: usize) -> Option<std::slice::ChunksExact<'a, f32>> {
        let attrs = self.attrs();
        self.image(b).map(|data| data.chunks_exact(attrs))
    }
}

/// Owned head tensor, e.g. read from a raw inference dump.
#[derive(Clone, Debug)]
pub struct HeadTensor {
    data: Vec<f32>,
    shape: [usize; 5],
}

impl HeadTensor {
    /// Creates an owned tensor after validating its length.
    pub fn new(data: Vec<f32>, shape: [usize; 5]) -> DetPostResult<Self> {
        HeadView::new(&data, shape)?;
        Ok(Self { data, shape })
    }

    /// Decodes little-endian `f32` values.
    ///
    /// The byte count must be exactly four times the element count of `shape`.
    pub fn from_le_bytes(bytes: &[u8], shape: [usize; 5]) -> DetPostResult<Self> {
        let needed = required_len(shape)?;
        if bytes.len() != needed * 4 {
            return Err(DetPostError::BufferTooSmall {
                needed: needed * 4,
                got: bytes.len(),
            });
        }
        let data = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self { data, shape })
    }

    pub fn view(&self) -> HeadView<'_> {
        HeadView {
            data: &self.data,
            shape: self.shape,
        }
    }

    pub fn shape(&self) -> [usize; 5] {
        self.shape
    }
}

fn required_len(shape: [usize; 5]) -> DetPostResult<usize> {
    if shape.iter().any(|&d| d == 0) {
        return Err(DetPostError::InvalidShape { shape });
    }
    shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or(DetPostError::InvalidShape { shape })
}
