use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Label reported for a face that matched no gallery entry.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Face region in pixel coordinates of the source image.
///
/// `right` and `bottom` are exclusive, so a valid box always has
/// `top < bottom` and `left < right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl BoundingBox {
    pub fn new(top: u32, right: u32, bottom: u32, left: u32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    /// Build a box from an origin plus size.
    pub fn from_xywh(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            top: y,
            right: x.saturating_add(width),
            bottom: y.saturating_add(height),
            left: x,
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Restrict the box to an image of the given extent.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        Self {
            top: self.top.min(height),
            right: self.right.min(width),
            bottom: self.bottom.min(height),
            left: self.left.min(width),
        }
    }

    /// Whether the box lies inside an image of the given extent.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        !self.is_empty() && self.right <= width && self.bottom <= height
    }

    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    /// Intersection over union.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right.min(other.right);
        let bottom = self.bottom.min(other.bottom);

        let intersection = if right > left && bottom > top {
            (right - left) as f32 * (bottom - top) as f32
        } else {
            0.0
        };

        let union = self.area() as f32 + other.area() as f32 - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// Identity-discriminative vector produced by the embedder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceEncoding(Vec<f32>);

impl FaceEncoding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Euclidean distance in encoding space.
    ///
    /// Encodings of different dimensionality are infinitely far apart.
    pub fn distance(&self, other: &FaceEncoding) -> f32 {
        if self.0.len() != other.0.len() {
            return f32::INFINITY;
        }

        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

impl From<Vec<f32>> for FaceEncoding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// A detected face and the encoding computed for it in the same pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
    pub bounding_box: BoundingBox,
    pub encoding: FaceEncoding,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GalleryEntry {
    pub label: String,
    pub encoding: FaceEncoding,
    /// Enrollment image the encoding was taken from.
    pub source: PathBuf,
}

/// Every enrolled encoding visible to one recognition request.
///
/// Iteration order is insertion order, which the builder keeps equal to the
/// store's enumeration order.
#[derive(Debug, Clone, Default)]
pub struct GalleryIndex {
    entries: Vec<GalleryEntry>,
}

impl GalleryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: GalleryEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GalleryEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    /// Distinct labels in first-seen order.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !labels.contains(&entry.label.as_str()) {
                labels.push(&entry.label);
            }
        }
        labels
    }

    /// Number of entries per label.
    pub fn label_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.label.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

impl FromIterator<GalleryEntry> for GalleryIndex {
    fn from_iter<I: IntoIterator<Item = GalleryEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a GalleryIndex {
    type Item = &'a GalleryEntry;
    type IntoIter = std::slice::Iter<'a, GalleryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub bounding_box: BoundingBox,
    pub label: String,
}

impl MatchResult {
    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_LABEL
    }
}
