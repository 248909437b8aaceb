//! Model class index to external category id translation.

use crate::util::{DetPostError, DetPostResult};

/// COCO category ids for the 80 contiguous model classes.
///
/// COCO numbers its categories 1..=90 with gaps (12, 26, 29, ...).
pub const COCO80_TO_91: [u32; 80] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 27, 28,
    31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 46, 47, 48, 49, 50, 51, 52, 53, 54, 55,
    56, 57, 58, 59, 60, 61, 62, 63, 64, 65, 67, 70, 72, 73, 74, 75, 76, 77, 78, 79, 80, 81, 82, 84,
    85, 86, 87, 88, 89, 90,
];

/// Fixed ordered table from model class index to category id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryMap {
    ids: Vec<u32>,
}

impl CategoryMap {
    /// Creates a table from an ordered id list; ids must be unique.
    pub fn new(ids: Vec<u32>) -> DetPostResult<Self> {
        if ids.is_empty() {
            return Err(DetPostError::InvalidInput("category table is empty"));
        }
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return Err(DetPostError::InvalidInput(
                "category table contains duplicate ids",
            ));
        }
        Ok(Self { ids })
    }

    /// The 80-class COCO table.
    pub fn coco80() -> Self {
        Self {
            ids: COCO80_TO_91.to_vec(),
        }
    }

    /// Maps index `i` to id `i` for `num_classes` classes.
    pub fn identity(num_classes: usize) -> Self {
        Self {
            ids: (0..num_classes as u32).collect(),
        }
    }

    /// Category id of model class `index`.
    pub fn get(&self, index: usize) -> Option<u32> {
        self.ids.get(index).copied()
    }

    /// Model class index of category `id`.
    pub fn index_of(&self, id: u32) -> Option<usize> {
        self.ids.iter().position(|&v| v == id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }
}

impl Default for CategoryMap {
    fn default() -> Self {
        Self::coco80()
    }
}
