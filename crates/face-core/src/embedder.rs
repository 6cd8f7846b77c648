use async_trait::async_trait;
use image::RgbImage;

use crate::error::FaceError;
use crate::types::{BoundingBox, FaceEncoding};

/// Maps a detected face region to a fixed-length encoding.
///
/// Failing for one region (too small, occluded) is reported as
/// [`FaceError::Embedding`]; callers drop that region rather than the image.
#[async_trait]
pub trait FaceEmbedder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Encoding length, when known ahead of the first inference.
    fn dimension(&self) -> Option<usize> {
        None
    }

    async fn embed(&self, image: &RgbImage, face: &BoundingBox) -> Result<FaceEncoding, FaceError>;

    async fn health_check(&self) -> bool {
        true
    }
}
