use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::decoder::decode_image;
use crate::detector::FaceDetector;
use crate::embedder::FaceEmbedder;
use crate::error::FaceError;
use crate::pipeline::extract_faces;
use crate::store::{EnrollmentSource, EnrollmentStore};
use crate::types::{FaceEncoding, GalleryEntry, GalleryIndex};

/// Builds a [`GalleryIndex`] from the current contents of an enrollment store.
///
/// Every face found in an enrollment image becomes its own entry under that
/// image's label; no face-count validation happens here. A source that cannot
/// be read, decoded, or encoded is skipped with a warning and never aborts the
/// build.
#[derive(Clone)]
pub struct GalleryBuilder {
    detector: Arc<dyn FaceDetector>,
    embedder: Arc<dyn FaceEmbedder>,
}

impl GalleryBuilder {
    pub fn new(detector: Arc<dyn FaceDetector>, embedder: Arc<dyn FaceEmbedder>) -> Self {
        Self { detector, embedder }
    }

    /// Only a failure to enumerate the store is returned as an error.
    pub async fn build(&self, store: &dyn EnrollmentStore) -> Result<GalleryIndex, FaceError> {
        let start = Instant::now();
        let sources = store.list_sources().await?;
        let mut index = GalleryIndex::new();
        let mut skipped = 0usize;

        for source in &sources {
            match self.encode_source(store, source).await {
                Ok(encodings) if encodings.is_empty() => {
                    skipped += 1;
                    warn!(
                        label = %source.label,
                        path = %source.path.display(),
                        "skipping enrollment image: no encodable face"
                    );
                    telemetry::metrics::GALLERY_SKIPPED_SOURCES
                        .with_label_values(&["no_face"])
                        .inc();
                }
                Ok(encodings) => {
                    debug!(
                        label = %source.label,
                        path = %source.path.display(),
                        faces = encodings.len(),
                        "encoded enrollment image"
                    );
                    for encoding in encodings {
                        index.push(GalleryEntry {
                            label: source.label.clone(),
                            encoding,
                            source: source.path.clone(),
                        });
                    }
                }
                Err(e) => {
                    skipped += 1;
                    warn!(
                        label = %source.label,
                        path = %source.path.display(),
                        error = %e,
                        "skipping enrollment image"
                    );
                    telemetry::metrics::GALLERY_SKIPPED_SOURCES
                        .with_label_values(&[e.kind()])
                        .inc();
                }
            }
        }

        let elapsed = start.elapsed();
        telemetry::metrics::GALLERY_BUILD_DURATION.observe(elapsed.as_secs_f64());
        telemetry::metrics::GALLERY_ENTRIES.set(index.len() as i64);

        info!(
            sources = sources.len(),
            skipped,
            entries = index.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "gallery built"
        );

        Ok(index)
    }

    async fn encode_source(
        &self,
        store: &dyn EnrollmentStore,
        source: &EnrollmentSource,
    ) -> Result<Vec<FaceEncoding>, FaceError> {
        let bytes = store.read_source(source).await?;
        let image = decode_image(&bytes)?;
        let faces = extract_faces(&image, self.detector.as_ref(), self.embedder.as_ref()).await?;
        telemetry::metrics::FACES_DETECTED
            .with_label_values(&["enrollment"])
            .inc_by(faces.len() as u64);

        Ok(faces.into_iter().map(|face| face.encoding).collect())
    }
}
