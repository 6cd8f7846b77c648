use anyhow::{anyhow, Result};
use face_core::onnx::{OnnxConfig, OnnxFaceDetector, OnnxFaceEmbedder};
use face_core::synthetic::{BlobFaceDetector, MeanColorEmbedder};
use face_core::{FaceDetector, FaceEmbedder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Which detector/embedder pair the service runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceBackend {
    #[default]
    Onnx,
    /// Model-free backend for demos and tests.
    Synthetic,
}

impl FaceBackend {
    pub fn load(self, onnx: &OnnxConfig) -> Result<(Arc<dyn FaceDetector>, Arc<dyn FaceEmbedder>)> {
        match self {
            FaceBackend::Onnx => {
                let detector = OnnxFaceDetector::load(onnx.clone())?;
                let embedder = OnnxFaceEmbedder::load(onnx.clone())?;
                Ok((Arc::new(detector), Arc::new(embedder)))
            }
            FaceBackend::Synthetic => {
                tracing::warn!("using the synthetic face backend; results are not real face matches");
                Ok((
                    Arc::new(BlobFaceDetector::new()),
                    Arc::new(MeanColorEmbedder::new()),
                ))
            }
        }
    }
}

impl FromStr for FaceBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "onnx" => Ok(FaceBackend::Onnx),
            "synthetic" => Ok(FaceBackend::Synthetic),
            other => Err(anyhow!("unknown face backend '{}' (expected onnx or synthetic)", other)),
        }
    }
}

impl fmt::Display for FaceBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaceBackend::Onnx => f.write_str("onnx"),
            FaceBackend::Synthetic => f.write_str("synthetic"),
        }
    }
}
