//! Scored candidate boxes produced by decoding and consumed by suppression.
//!
//! A [`CandidateSet`] holds the boxes of one (image, category) pair in the
//! order they were decoded. [`ImageCandidates`] groups the sets of one image
//! by external category id.

use crate::geometry::BoxXywh;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Candidate box with its confidence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    /// Box in original-image pixels.
    pub bbox: BoxXywh,
    /// Confidence in `[0, 1]`.
    pub score: f32,
}

impl Candidate {
    pub fn new(bbox: BoxXywh, score: f32) -> Self {
        Self { bbox, score }
    }
}

fn candidate_cmp_desc(a: &Candidate, b: &Candidate) -> Ordering {
    b.score.total_cmp(&a.score)
}

/// Returns candidate indices ordered by descending score.
///
/// The sort is stable, so equal scores keep insertion order.
pub(crate) fn order_desc(candidates: &[Candidate]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| candidate_cmp_desc(&candidates[a], &candidates[b]));
    order
}

/// Ordered candidates for one (image, category) pair.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CandidateSet {
    items: Vec<Candidate>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a candidate, keeping insertion order.
    pub fn push(&mut self, candidate: Candidate) {
        self.items.push(candidate);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[Candidate] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Candidate> {
        self.items
    }
}

impl From<Vec<Candidate>> for CandidateSet {
    fn from(items: Vec<Candidate>) -> Self {
        Self { items }
    }
}

impl FromIterator<Candidate> for CandidateSet {
    fn from_iter<I: IntoIterator<Item = Candidate>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a CandidateSet {
    type Item = &'a Candidate;
    type IntoIter = std::slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// All candidate sets decoded for one image, keyed by category id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImageCandidates {
    image_id: u64,
    by_category: BTreeMap<u32, CandidateSet>,
}

impl ImageCandidates {
    pub fn new(image_id: u64) -> Self {
        Self {
            image_id,
            by_category: BTreeMap::new(),
        }
    }

    pub fn image_id(&self) -> u64 {
        self.image_id
    }

    /// Adds a candidate to the set of `category_id`.
    pub fn push(&mut self, category_id: u32, candidate: Candidate) {
        self.by_category
            .entry(category_id)
            .or_default()
            .push(candidate);
    }

    /// Returns the set of one category, if any candidate was decoded for it.
    pub fn get(&self, category_id: u32) -> Option<&CandidateSet> {
        self.by_category.get(&category_id)
    }

    /// Iterates `(category_id, set)` pairs in ascending category order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &CandidateSet)> {
        self.by_category.iter().map(|(&id, set)| (id, set))
    }

    /// Number of categories with at least one candidate.
    pub fn num_categories(&self) -> usize {
        self.by_category.len()
    }

    /// Total candidates across all categories.
    pub fn num_candidates(&self) -> usize {
        self.by_category.values().map(CandidateSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_category.is_empty()
    }
}

impl IntoIterator for ImageCandidates {
    type Item = (u32, CandidateSet);
    type IntoIter = std::collections::btree_map::IntoIter<u32, CandidateSet>;

    fn into_iter(self) -> Self::IntoIter {
        self.by_category.into_iter()
    }
}
