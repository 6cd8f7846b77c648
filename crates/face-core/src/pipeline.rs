use image::RgbImage;
use std::sync::Arc;
use tracing::{info, warn};

use crate::assembler::assemble;
use crate::config::RecognitionConfig;
use crate::decoder::{decode_image, sniff_extension};
use crate::detector::FaceDetector;
use crate::embedder::FaceEmbedder;
use crate::error::FaceError;
use crate::gallery::GalleryBuilder;
use crate::matcher::Matcher;
use crate::store::{EnrollmentStore, SavedImage};
use crate::types::{DetectedFace, GalleryIndex, MatchResult};

/// Detect faces in `image` and encode each one.
///
/// A box whose encoding fails is dropped together with that encoding, so
/// every returned box is paired with the encoding computed from it.
pub async fn extract_faces(
    image: &RgbImage,
    detector: &dyn FaceDetector,
    embedder: &dyn FaceEmbedder,
) -> Result<Vec<DetectedFace>, FaceError> {
    let (width, height) = image.dimensions();
    let boxes = detector.detect(image).await?;
    let mut faces = Vec::with_capacity(boxes.len());

    for bounding_box in boxes {
        if !bounding_box.fits_within(width, height) {
            warn!(?bounding_box, width, height, "dropping face box outside the image");
            continue;
        }

        match embedder.embed(image, &bounding_box).await {
            Ok(encoding) => faces.push(DetectedFace {
                bounding_box,
                encoding,
            }),
            Err(e) => {
                warn!(?bounding_box, error = %e, "dropping face without encoding");
                telemetry::metrics::FACE_EMBEDDING_FAILURES.inc();
            }
        }
    }

    Ok(faces)
}

/// Query-side pipeline: decoder, detector and embedder on the uploaded image,
/// gallery rebuild, matching, and result assembly.
#[derive(Clone)]
pub struct RecognitionPipeline {
    detector: Arc<dyn FaceDetector>,
    embedder: Arc<dyn FaceEmbedder>,
    gallery: GalleryBuilder,
    matcher: Matcher,
    config: RecognitionConfig,
}

impl RecognitionPipeline {
    pub fn new(
        detector: Arc<dyn FaceDetector>,
        embedder: Arc<dyn FaceEmbedder>,
        config: RecognitionConfig,
    ) -> Self {
        Self {
            gallery: GalleryBuilder::new(detector.clone(), embedder.clone()),
            matcher: Matcher::new(config.tolerance, config.match_policy),
            detector,
            embedder,
            config,
        }
    }

    pub fn backend(&self) -> (&'static str, &'static str) {
        (self.detector.name(), self.embedder.name())
    }

    /// Decode `bytes` and return every face that could be encoded.
    pub async fn detect_faces(&self, bytes: &[u8]) -> Result<Vec<DetectedFace>, FaceError> {
        let image = decode_image(bytes)?;
        extract_faces(&image, self.detector.as_ref(), self.embedder.as_ref()).await
    }

    pub async fn build_gallery(
        &self,
        store: &dyn EnrollmentStore,
    ) -> Result<GalleryIndex, FaceError> {
        self.gallery.build(store).await
    }

    /// Resolve already-encoded faces against a gallery.
    pub fn match_faces(&self, faces: Vec<DetectedFace>, gallery: &GalleryIndex) -> Vec<MatchResult> {
        let labels = faces
            .iter()
            .map(|face| self.matcher.label_for(&face.encoding, gallery))
            .collect();
        assemble(faces, labels)
    }

    /// Label every face in the query image.
    ///
    /// A query that cannot be decoded is an error; a query without faces is an
    /// empty result, and in that case the gallery is not built at all.
    pub async fn recognize(
        &self,
        bytes: &[u8],
        store: &dyn EnrollmentStore,
    ) -> Result<Vec<MatchResult>, FaceError> {
        let faces = self.detect_faces(bytes).await?;
        telemetry::metrics::FACES_DETECTED
            .with_label_values(&["query"])
            .inc_by(faces.len() as u64);

        if faces.is_empty() {
            info!("no faces found in query image");
            return Ok(Vec::new());
        }

        let gallery = self.build_gallery(store).await?;
        let results = self.match_faces(faces, &gallery);

        info!(
            faces = results.len(),
            recognized = results.iter().filter(|r| !r.is_unknown()).count(),
            gallery_entries = gallery.len(),
            policy = %self.matcher.policy(),
            "recognition complete"
        );

        Ok(results)
    }

    /// Validate and persist a new enrollment image for `label`.
    pub async fn enroll(
        &self,
        label: &str,
        bytes: &[u8],
        store: &dyn EnrollmentStore,
    ) -> Result<SavedImage, FaceError> {
        let extension = sniff_extension(bytes)?;

        if self.config.require_single_face_enrollment {
            let faces = self.detect_faces(bytes).await?;
            if faces.len() != 1 {
                return Err(FaceError::EnrollmentRejected(format!(
                    "expected exactly one face, found {}",
                    faces.len()
                )));
            }
        } else {
            decode_image(bytes)?;
        }

        let saved = store.save_image(label, extension, bytes).await?;
        info!(label, filename = %saved.filename, "enrollment image stored");
        Ok(saved)
    }

    pub async fn health_check(&self) -> bool {
        self.detector.health_check().await && self.embedder.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FsEnrollmentStore, StoreLayout};
    use crate::synthetic::{BlobFaceDetector, MeanColorEmbedder};
    use crate::types::{BoundingBox, UNKNOWN_LABEL};
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn png(faces: &[(BoundingBox, [u8; 3])]) -> Vec<u8> {
        let mut image = RgbImage::from_pixel(96, 64, Rgb([0, 0, 0]));
        for (bbox, color) in faces {
            for y in bbox.top..bbox.bottom {
                for x in bbox.left..bbox.right {
                    image.put_pixel(x, y, Rgb(*color));
                }
            }
        }
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn pipeline(config: RecognitionConfig) -> RecognitionPipeline {
        RecognitionPipeline::new(
            Arc::new(BlobFaceDetector::new()),
            Arc::new(MeanColorEmbedder::new()),
            config,
        )
    }

    #[tokio::test]
    async fn test_unencodable_box_is_dropped_with_its_encoding() {
        let big = BoundingBox::from_xywh(4, 4, 20, 20);
        let tiny = BoundingBox::from_xywh(60, 10, 4, 4);
        let image = decode_image(&png(&[(big, [255, 0, 0]), (tiny, [0, 255, 0])])).unwrap();

        let faces = extract_faces(&image, &BlobFaceDetector::new(), &MeanColorEmbedder::new())
            .await
            .unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].bounding_box, big);
    }

    #[tokio::test]
    async fn test_recognize_rejects_undecodable_query() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsEnrollmentStore::new(dir.path(), StoreLayout::PerLabel);
        let err = pipeline(RecognitionConfig::default())
            .recognize(b"not an image", &store)
            .await
            .unwrap_err();
        assert!(matches!(err, FaceError::Decode(_)));
    }

    #[tokio::test]
    async fn test_recognize_known_and_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsEnrollmentStore::new(dir.path(), StoreLayout::PerLabel);
        let pipeline = pipeline(RecognitionConfig::default());

        let alice = BoundingBox::from_xywh(4, 4, 20, 20);
        pipeline
            .enroll("alice", &png(&[(alice, [255, 0, 0])]), &store)
            .await
            .unwrap();

        let stranger = BoundingBox::from_xywh(50, 30, 24, 24);
        let results = pipeline
            .recognize(&png(&[(alice, [255, 0, 0]), (stranger, [0, 0, 255])]), &store)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].bounding_box, alice);
        assert_eq!(results[0].label, "alice");
        assert_eq!(results[1].bounding_box, stranger);
        assert_eq!(results[1].label, UNKNOWN_LABEL);
    }

    #[tokio::test]
    async fn test_enroll_rejects_undecodable_image() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsEnrollmentStore::new(dir.path(), StoreLayout::PerLabel);
        let err = pipeline(RecognitionConfig::default())
            .enroll("alice", b"garbage", &store)
            .await
            .unwrap_err();
        assert!(matches!(err, FaceError::Decode(_)));
        assert!(store.list_sources().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_single_face_enrollment_check() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsEnrollmentStore::new(dir.path(), StoreLayout::PerLabel);
        let strict = pipeline(RecognitionConfig {
            require_single_face_enrollment: true,
            ..RecognitionConfig::default()
        });

        let two_faces = png(&[
            (BoundingBox::from_xywh(2, 2, 16, 16), [255, 0, 0]),
            (BoundingBox::from_xywh(40, 2, 16, 16), [0, 255, 0]),
        ]);
        let err = strict.enroll("group", &two_faces, &store).await.unwrap_err();
        assert!(matches!(err, FaceError::EnrollmentRejected(_)));

        let err = strict.enroll("nobody", &png(&[]), &store).await.unwrap_err();
        assert!(matches!(err, FaceError::EnrollmentRejected(_)));

        let one_face = png(&[(BoundingBox::from_xywh(2, 2, 16, 16), [255, 0, 0])]);
        strict.enroll("solo", &one_face, &store).await.unwrap();
        assert_eq!(store.list_sources().await.unwrap().len(), 1);
    }
}
