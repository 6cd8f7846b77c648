use thiserror::Error;

/// Raised when uploaded bytes are not a decodable image.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("image payload is empty")]
    Empty,

    #[error("unrecognized image format")]
    UnknownFormat,

    #[error("could not decode image: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Error)]
pub enum FaceError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("face detection failed: {0}")]
    Detection(String),

    #[error("face embedding failed: {0}")]
    Embedding(String),

    #[error("failed to read enrollment source {path}: {source}")]
    EnrollmentRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("enrollment store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("failed to store enrollment image: {0}")]
    StorageWrite(String),

    #[error("invalid label: {0}")]
    InvalidLabel(String),

    #[error("enrollment rejected: {0}")]
    EnrollmentRejected(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("onnx runtime: {0}")]
    Ort(#[from] ort::Error),
}

impl FaceError {
    /// Short machine-readable reason, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            FaceError::Decode(_) => "decode",
            FaceError::Detection(_) => "detection",
            FaceError::Embedding(_) => "embedding",
            FaceError::EnrollmentRead { .. } => "read",
            FaceError::StoreUnavailable(_) => "store",
            FaceError::StorageWrite(_) => "write",
            FaceError::InvalidLabel(_) => "label",
            FaceError::EnrollmentRejected(_) => "rejected",
            FaceError::Model(_) | FaceError::Ort(_) => "model",
        }
    }
}
