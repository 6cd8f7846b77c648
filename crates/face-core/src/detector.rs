use async_trait::async_trait;
use image::RgbImage;

use crate::error::FaceError;
use crate::types::BoundingBox;

/// Locates face regions in a decoded image.
///
/// The returned order carries no meaning, but it must be stable for a given
/// image so that encodings computed afterwards can be paired by index.
/// An image without faces yields an empty vector, not an error.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// Backend identifier used in logs and metrics.
    fn name(&self) -> &'static str;

    async fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, FaceError>;

    /// Verify the detector is operational.
    async fn health_check(&self) -> bool {
        true
    }
}

/// Greedy non-maximum suppression over scored boxes, highest score first.
pub fn non_max_suppression(
    mut boxes: Vec<(BoundingBox, f32)>,
    iou_threshold: f32,
) -> Vec<(BoundingBox, f32)> {
    boxes.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep: Vec<(BoundingBox, f32)> = Vec::new();
    for candidate in boxes {
        if keep
            .iter()
            .all(|(kept, _)| kept.iou(&candidate.0) < iou_threshold)
        {
            keep.push(candidate);
        }
    }

    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nms_suppresses_overlapping_boxes() {
        let boxes = vec![
            (BoundingBox::from_xywh(10, 10, 50, 50), 0.7),
            (BoundingBox::from_xywh(12, 12, 50, 50), 0.9),
            (BoundingBox::from_xywh(200, 200, 40, 40), 0.8),
        ];

        let kept = non_max_suppression(boxes, 0.4);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].0, BoundingBox::from_xywh(12, 12, 50, 50));
        assert_eq!(kept[1].0, BoundingBox::from_xywh(200, 200, 40, 40));
    }

    #[test]
    fn test_nms_empty() {
        assert!(non_max_suppression(Vec::new(), 0.4).is_empty());
    }
}
