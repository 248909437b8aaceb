//! COCO instance annotations.

use crate::geometry::BoxXywh;
use crate::util::{DetPostError, DetPostResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CocoImage {
    id: u64,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CocoAnnotation {
    #[serde(default)]
    id: u64,
    image_id: u64,
    category_id: u32,
    bbox: BoxXywh,
    #[serde(default)]
    area: Option<f32>,
    #[serde(default)]
    iscrowd: u8,
}

/// A category declared by the annotation file.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: u32,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct CocoDataset {
    #[serde(default)]
    images: Vec<CocoImage>,
    #[serde(default)]
    annotations: Vec<CocoAnnotation>,
    #[serde(default)]
    categories: Vec<Category>,
}

/// Size and file name of an annotated image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pub file_name: Option<String>,
}

/// One ground-truth object.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GtObject {
    pub id: u64,
    pub bbox: BoxXywh,
    /// Annotated area (segmentation area in COCO), falling back to `w * h`.
    pub area: f32,
    pub iscrowd: bool,
}

/// Ground truth indexed by (image id, category id).
#[derive(Clone, Debug, Default)]
pub struct GroundTruth {
    images: BTreeMap<u64, ImageInfo>,
    categories: Vec<Category>,
    objects: BTreeMap<(u64, u32), Vec<GtObject>>,
}

impl GroundTruth {
    /// Loads a COCO instance annotation file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> DetPostResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| DetPostError::io(path, err))?;
        let dataset: CocoDataset = serde_json::from_reader(BufReader::new(file))
            .map_err(|err| DetPostError::json(path, err))?;
        Ok(Self::from_dataset(dataset))
    }

    /// Parses COCO instance annotations from a JSON string.
    pub fn from_json_str(json: &str) -> DetPostResult<Self> {
        let dataset: CocoDataset =
            serde_json::from_str(json).map_err(|err| DetPostError::json("<memory>", err))?;
        Ok(Self::from_dataset(dataset))
    }

    fn from_dataset(dataset: CocoDataset) -> Self {
        let mut images: BTreeMap<u64, ImageInfo> = dataset
            .images
            .into_iter()
            .map(|img| {
                (
                    img.id,
                    ImageInfo {
                        id: img.id,
                        width: img.width,
                        height: img.height,
                        file_name: img.file_name,
                    },
                )
            })
            .collect();

        let mut objects: BTreeMap<(u64, u32), Vec<GtObject>> = BTreeMap::new();
        for (idx, ann) in dataset.annotations.into_iter().enumerate() {
            images.entry(ann.image_id).or_insert(ImageInfo {
                id: ann.image_id,
                width: 0,
                height: 0,
                file_name: None,
            });
            // Ids of zero are reserved for "unmatched" bookkeeping.
            let id = if ann.id == 0 { idx as u64 + 1 } else { ann.id };
            objects
                .entry((ann.image_id, ann.category_id))
                .or_default()
                .push(GtObject {
                    id,
                    bbox: ann.bbox,
                    area: ann.area.unwrap_or_else(|| ann.bbox.area()),
                    iscrowd: ann.iscrowd != 0,
                });
        }

        let mut categories = dataset.categories;
        if categories.is_empty() {
            let mut ids: Vec<u32> = objects.keys().map(|&(_, cat)| cat).collect();
            ids.sort_unstable();
            ids.dedup();
            categories = ids
                .into_iter()
                .map(|id| Category {
                    id,
                    name: String::new(),
                })
                .collect();
        }
        categories.sort_by_key(|c| c.id);

        Self {
            images,
            categories,
            objects,
        }
    }

    /// Image record for `image_id`.
    pub fn image(&self, image_id: u64) -> Option<&ImageInfo> {
        self.images.get(&image_id)
    }

    pub fn contains_image(&self, image_id: u64) -> bool {
        self.images.contains_key(&image_id)
    }

    /// Annotated image ids in ascending order.
    pub fn image_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.images.keys().copied()
    }

    pub fn num_images(&self) -> usize {
        self.images.len()
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Category ids in ascending order.
    pub fn category_ids(&self) -> Vec<u32> {
        self.categories.iter().map(|c| c.id).collect()
    }

    /// Ground-truth objects of one (image, category) pair.
    pub fn objects(&self, image_id: u64, category_id: u32) -> &[GtObject] {
        self.objects
            .get(&(image_id, category_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::GroundTruth;

    #[test]
    fn parses_minimal_annotation_file() {
        let gt = GroundTruth::from_json_str(
            r#"{
                "images": [{"id": 7, "width": 640, "height": 480, "file_name": "000000000007.jpg"}],
                "annotations": [
                    {"id": 1, "image_id": 7, "category_id": 3, "bbox": [10, 20, 30, 40], "iscrowd": 0},
                    {"id": 2, "image_id": 7, "category_id": 3, "bbox": [0, 0, 5, 5], "area": 12.5, "iscrowd": 1}
                ],
                "categories": [{"id": 3, "name": "car"}, {"id": 1, "name": "person"}]
            }"#,
        )
        .unwrap();

        assert_eq!(gt.num_images(), 1);
        assert_eq!(gt.image(7).unwrap().width, 640);
        assert_eq!(gt.category_ids(), vec![1, 3]);
        let objs = gt.objects(7, 3);
        assert_eq!(objs.len(), 2);
        assert_eq!(objs[0].area, 1200.0);
        assert!(objs[1].iscrowd);
        assert_eq!(objs[1].area, 12.5);
        assert!(gt.objects(7, 1).is_empty());
    }

    #[test]
    fn categories_fall_back_to_annotated_ids() {
        let gt = GroundTruth::from_json_str(
            r#"{"annotations": [
                {"image_id": 1, "category_id": 5, "bbox": [0, 0, 1, 1]},
                {"image_id": 2, "category_id": 2, "bbox": [0, 0, 1, 1]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(gt.category_ids(), vec![2, 5]);
        assert!(gt.contains_image(2));
        assert_eq!(gt.objects(1, 5)[0].id, 1);
    }
}
