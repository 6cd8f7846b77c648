//! Deterministic model-free backend.
//!
//! Treats every connected region of bright pixels on a dark background as a
//! face and encodes it by its mean colour. Two regions painted with the same
//! colour are the same identity; primaries are far apart in encoding space.
//! Runs without model files, which makes it the backend of the test-suite
//! and of local demos.

use async_trait::async_trait;
use image::RgbImage;
use std::collections::VecDeque;

use crate::detector::FaceDetector;
use crate::embedder::FaceEmbedder;
use crate::error::FaceError;
use crate::types::{BoundingBox, FaceEncoding};

/// Pixels with every channel at or below this value are background.
pub const DEFAULT_BACKGROUND_LEVEL: u8 = 32;

/// Encoding length, matching the common 128-d face embedding.
pub const SYNTHETIC_ENCODING_DIM: usize = 128;

fn is_foreground(pixel: &image::Rgb<u8>, background_level: u8) -> bool {
    pixel.0.iter().any(|&c| c > background_level)
}

#[derive(Debug, Clone)]
pub struct BlobFaceDetector {
    background_level: u8,
    min_face_size: u32,
}

impl BlobFaceDetector {
    pub fn new() -> Self {
        Self {
            background_level: DEFAULT_BACKGROUND_LEVEL,
            min_face_size: 2,
        }
    }

    /// Bounding boxes of 4-connected foreground regions in row-major order of
    /// their first pixel.
    fn find_regions(&self, image: &RgbImage) -> Vec<BoundingBox> {
        let (width, height) = image.dimensions();
        let mut visited = vec![false; width as usize * height as usize];
        let mut regions = Vec::new();
        let mut queue = VecDeque::new();

        for y in 0..height {
            for x in 0..width {
                let idx = (y * width + x) as usize;
                if visited[idx] || !is_foreground(image.get_pixel(x, y), self.background_level) {
                    continue;
                }

                visited[idx] = true;
                queue.push_back((x, y));
                let (mut min_x, mut min_y, mut max_x, mut max_y) = (x, y, x, y);

                while let Some((cx, cy)) = queue.pop_front() {
                    min_x = min_x.min(cx);
                    min_y = min_y.min(cy);
                    max_x = max_x.max(cx);
                    max_y = max_y.max(cy);

                    let neighbours = [
                        (cx.checked_sub(1), Some(cy)),
                        (cx.checked_add(1).filter(|&n| n < width), Some(cy)),
                        (Some(cx), cy.checked_sub(1)),
                        (Some(cx), cy.checked_add(1).filter(|&n| n < height)),
                    ];
                    for (nx, ny) in neighbours {
                        let (Some(nx), Some(ny)) = (nx, ny) else {
                            continue;
                        };
                        let nidx = (ny * width + nx) as usize;
                        if !visited[nidx]
                            && is_foreground(image.get_pixel(nx, ny), self.background_level)
                        {
                            visited[nidx] = true;
                            queue.push_back((nx, ny));
                        }
                    }
                }

                let region = BoundingBox::new(min_y, max_x + 1, max_y + 1, min_x);
                if region.width() >= self.min_face_size && region.height() >= self.min_face_size {
                    regions.push(region);
                }
            }
        }

        regions
    }
}

impl Default for BlobFaceDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FaceDetector for BlobFaceDetector {
    fn name(&self) -> &'static str {
        "synthetic_blob"
    }

    async fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, FaceError> {
        Ok(self.find_regions(image))
    }
}

#[derive(Debug, Clone)]
pub struct MeanColorEmbedder {
    background_level: u8,
    min_face_size: u32,
}

impl MeanColorEmbedder {
    pub fn new() -> Self {
        Self {
            background_level: DEFAULT_BACKGROUND_LEVEL,
            min_face_size: 8,
        }
    }
}

impl Default for MeanColorEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FaceEmbedder for MeanColorEmbedder {
    fn name(&self) -> &'static str {
        "synthetic_mean_color"
    }

    fn dimension(&self) -> Option<usize> {
        Some(SYNTHETIC_ENCODING_DIM)
    }

    async fn embed(&self, image: &RgbImage, face: &BoundingBox) -> Result<FaceEncoding, FaceError> {
        let (width, height) = image.dimensions();
        let region = face.clamp_to(width, height);

        if region.width() < self.min_face_size || region.height() < self.min_face_size {
            return Err(FaceError::Embedding(format!(
                "face region {}x{} is below the minimum of {}px",
                region.width(),
                region.height(),
                self.min_face_size
            )));
        }

        let mut sums = [0u64; 3];
        let mut count = 0u64;
        for y in region.top..region.bottom {
            for x in region.left..region.right {
                let pixel = image.get_pixel(x, y);
                if is_foreground(pixel, self.background_level) {
                    for (sum, channel) in sums.iter_mut().zip(pixel.0) {
                        *sum += channel as u64;
                    }
                    count += 1;
                }
            }
        }

        if count == 0 {
            return Err(FaceError::Embedding("face region has no foreground pixels".to_string()));
        }

        let mut values = vec![0.0f32; SYNTHETIC_ENCODING_DIM];
        for (value, sum) in values.iter_mut().zip(sums) {
            *value = sum as f32 / count as f32 / 255.0;
        }

        Ok(FaceEncoding::new(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn canvas(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([0, 0, 0]))
    }

    fn paint(image: &mut RgbImage, bbox: BoundingBox, color: [u8; 3]) {
        for y in bbox.top..bbox.bottom {
            for x in bbox.left..bbox.right {
                image.put_pixel(x, y, Rgb(color));
            }
        }
    }

    #[tokio::test]
    async fn test_detects_separate_regions() {
        let mut image = canvas(100, 60);
        let first = BoundingBox::from_xywh(5, 5, 20, 20);
        let second = BoundingBox::from_xywh(60, 30, 25, 20);
        paint(&mut image, first, [255, 0, 0]);
        paint(&mut image, second, [0, 0, 255]);

        let boxes = BlobFaceDetector::new().detect(&image).await.unwrap();
        assert_eq!(boxes, vec![first, second]);
    }

    #[tokio::test]
    async fn test_blank_image_has_no_faces() {
        let boxes = BlobFaceDetector::new().detect(&canvas(32, 32)).await.unwrap();
        assert!(boxes.is_empty());
    }

    #[tokio::test]
    async fn test_ignores_specks() {
        let mut image = canvas(20, 20);
        image.put_pixel(3, 3, Rgb([200, 200, 200]));
        let boxes = BlobFaceDetector::new().detect(&image).await.unwrap();
        assert!(boxes.is_empty());
    }

    #[tokio::test]
    async fn test_same_color_same_encoding() {
        let mut image = canvas(80, 40);
        let left = BoundingBox::from_xywh(0, 0, 20, 20);
        let right = BoundingBox::from_xywh(50, 10, 30, 30);
        paint(&mut image, left, [10, 200, 90]);
        paint(&mut image, right, [10, 200, 90]);

        let embedder = MeanColorEmbedder::new();
        let a = embedder.embed(&image, &left).await.unwrap();
        let b = embedder.embed(&image, &right).await.unwrap();
        assert_eq!(a.len(), SYNTHETIC_ENCODING_DIM);
        assert_eq!(a.distance(&b), 0.0);
    }

    #[tokio::test]
    async fn test_primaries_are_far_apart() {
        let mut image = canvas(60, 20);
        let red = BoundingBox::from_xywh(0, 0, 20, 20);
        let blue = BoundingBox::from_xywh(40, 0, 20, 20);
        paint(&mut image, red, [255, 0, 0]);
        paint(&mut image, blue, [0, 0, 255]);

        let embedder = MeanColorEmbedder::new();
        let a = embedder.embed(&image, &red).await.unwrap();
        let b = embedder.embed(&image, &blue).await.unwrap();
        assert!(a.distance(&b) > 1.0);
    }

    #[tokio::test]
    async fn test_small_region_fails_to_embed() {
        let mut image = canvas(20, 20);
        let tiny = BoundingBox::from_xywh(2, 2, 4, 4);
        paint(&mut image, tiny, [255, 255, 255]);

        let err = MeanColorEmbedder::new().embed(&image, &tiny).await.unwrap_err();
        assert!(matches!(err, FaceError::Embedding(_)));
    }
}
