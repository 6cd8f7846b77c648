//! Face-matching pipeline.
//!
//! A query image is decoded, its faces are located and encoded, and every
//! encoding is resolved against a gallery assembled from the enrollment
//! store at request time.

pub mod assembler;
pub mod config;
pub mod decoder;
pub mod detector;
pub mod embedder;
pub mod error;
pub mod gallery;
pub mod matcher;
pub mod onnx;
pub mod pipeline;
pub mod store;
pub mod synthetic;
pub mod types;

pub use config::RecognitionConfig;
pub use detector::FaceDetector;
pub use embedder::FaceEmbedder;
pub use error::{DecodeError, FaceError};
pub use gallery::GalleryBuilder;
pub use matcher::{MatchPolicy, Matcher, DEFAULT_TOLERANCE};
pub use pipeline::{extract_faces, RecognitionPipeline};
pub use store::{EnrollmentSource, EnrollmentStore, FsEnrollmentStore, SavedImage, StoreLayout};
pub use types::{
    BoundingBox, DetectedFace, FaceEncoding, GalleryEntry, GalleryIndex, MatchResult,
    UNKNOWN_LABEL,
};
