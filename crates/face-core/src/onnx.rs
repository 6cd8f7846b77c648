/// ONNX Runtime face backend
///
/// Two models, loaded independently:
/// 1. Detection: a single-head detector emitting `[batch, 5, predictions]`
///    (cx, cy, w, h, confidence) at a square input resolution
/// 2. Embedding: maps an aligned face crop to a fixed-length encoding
use anyhow::{Context, Result};
use async_trait::async_trait;
use image::{imageops::FilterType, RgbImage};
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::detector::{non_max_suppression, FaceDetector};
use crate::embedder::FaceEmbedder;
use crate::error::FaceError;
use crate::types::{BoundingBox, FaceEncoding};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnnxConfig {
    /// Path to the face detection ONNX model file
    pub detection_model_path: String,

    /// Path to the face embedding ONNX model file
    pub embedding_model_path: String,

    /// Confidence threshold for face detections (0.0 to 1.0)
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,

    /// IoU (Intersection over Union) threshold for NMS
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    /// Maximum number of faces to detect per image
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,

    /// Detection model input size (width and height)
    #[serde(default = "default_detection_input_size")]
    pub detection_input_size: u32,

    /// Embedding model input size (width and height)
    #[serde(default = "default_embedding_input_size")]
    pub embedding_input_size: u32,

    /// Scale encodings to unit length
    #[serde(default = "default_normalize")]
    pub normalize_embeddings: bool,

    /// Execution provider preference (CPU, CUDA, TensorRT)
    #[serde(default = "default_execution_provider")]
    pub execution_provider: String,

    /// GPU device ID (0, 1, 2, etc.)
    #[serde(default)]
    pub device_id: i32,

    /// Number of intra-operation threads
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    /// Number of inter-operation threads
    #[serde(default = "default_inter_threads")]
    pub inter_threads: usize,
}

fn default_confidence() -> f32 {
    0.6
}

fn default_iou_threshold() -> f32 {
    0.4
}

fn default_max_detections() -> usize {
    50
}

fn default_detection_input_size() -> u32 {
    640
}

fn default_embedding_input_size() -> u32 {
    112
}

fn default_normalize() -> bool {
    true
}

fn default_execution_provider() -> String {
    "CPU".to_string()
}

fn default_intra_threads() -> usize {
    4
}

fn default_inter_threads() -> usize {
    1
}

impl Default for OnnxConfig {
    fn default() -> Self {
        Self {
            detection_model_path: "models/face_detector.onnx".to_string(),
            embedding_model_path: "models/face_embedding.onnx".to_string(),
            confidence_threshold: default_confidence(),
            iou_threshold: default_iou_threshold(),
            max_detections: default_max_detections(),
            detection_input_size: default_detection_input_size(),
            embedding_input_size: default_embedding_input_size(),
            normalize_embeddings: default_normalize(),
            execution_provider: default_execution_provider(),
            device_id: 0,
            intra_threads: default_intra_threads(),
            inter_threads: default_inter_threads(),
        }
    }
}

/// Create an ONNX session, falling back TensorRT -> CUDA -> CPU.
///
/// Returns the session and the provider that was actually configured.
pub fn create_session(config: &OnnxConfig, model_path: &str) -> Result<(Session, String)> {
    if !std::path::Path::new(model_path).is_file() {
        anyhow::bail!("model file not found: {}", model_path);
    }

    match config.execution_provider.to_uppercase().as_str() {
        "TENSORRT" => {
            tracing::info!("Attempting TensorRT for {}", model_path);
            let result = Session::builder()
                .context("Failed to create session builder")?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .context("Failed to set optimization level")?
                .with_intra_threads(config.intra_threads)
                .context("Failed to set intra threads")?
                .with_inter_threads(config.inter_threads)
                .context("Failed to set inter threads")?
                .with_execution_providers([
                    TensorRTExecutionProvider::default()
                        .with_device_id(config.device_id)
                        .build(),
                    CUDAExecutionProvider::default()
                        .with_device_id(config.device_id)
                        .build(),
                    CPUExecutionProvider::default().build(),
                ])
                .context("Failed to set execution providers")?
                .commit_from_file(model_path);

            match result {
                Ok(session) => Ok((session, "TensorRT".to_string())),
                Err(e) => {
                    tracing::warn!("TensorRT failed, trying CUDA: {}", e);
                    try_cuda(config, model_path)
                }
            }
        }
        "CUDA" => try_cuda(config, model_path),
        _ => try_cpu(config, model_path),
    }
}

fn try_cuda(config: &OnnxConfig, model_path: &str) -> Result<(Session, String)> {
    tracing::info!("Attempting CUDA for {}", model_path);
    let result = Session::builder()
        .context("Failed to create session builder")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(config.intra_threads)
        .context("Failed to set intra threads")?
        .with_inter_threads(config.inter_threads)
        .context("Failed to set inter threads")?
        .with_execution_providers([
            CUDAExecutionProvider::default()
                .with_device_id(config.device_id)
                .build(),
            CPUExecutionProvider::default().build(),
        ])
        .context("Failed to set execution providers")?
        .commit_from_file(model_path);

    match result {
        Ok(session) => Ok((session, "CUDA".to_string())),
        Err(e) => {
            tracing::warn!("CUDA failed, using CPU: {}", e);
            try_cpu(config, model_path)
        }
    }
}

fn try_cpu(config: &OnnxConfig, model_path: &str) -> Result<(Session, String)> {
    let session = Session::builder()
        .context("Failed to create session builder")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(config.intra_threads)
        .context("Failed to set intra threads")?
        .with_inter_threads(config.inter_threads)
        .context("Failed to set inter threads")?
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load model from {}", model_path))?;
    Ok((session, "CPU".to_string()))
}

/// Resize to a square NCHW tensor, scaling each channel with `normalize`.
fn to_nchw(image: &RgbImage, size: u32, normalize: impl Fn(u8) -> f32) -> Array<f32, IxDyn> {
    let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
    let mut input = Array::zeros(IxDyn(&[1, 3, size as usize, size as usize]));

    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..3 {
            input[[0, channel, y as usize, x as usize]] = normalize(pixel[channel]);
        }
    }

    input
}

/// Copy a raw output tensor into an owned dynamic array.
fn to_array(shape: &[usize], data: &[f32]) -> Result<Array<f32, IxDyn>, FaceError> {
    Array::from_shape_vec(IxDyn(shape), data.to_vec())
        .map_err(|e| FaceError::Model(format!("unexpected output shape: {}", e)))
}

pub struct OnnxFaceDetector {
    config: OnnxConfig,
    session: Arc<tokio::sync::Mutex<Session>>,
}

impl OnnxFaceDetector {
    pub fn load(config: OnnxConfig) -> Result<Self> {
        let (session, execution_provider) = create_session(&config, &config.detection_model_path)?;

        tracing::info!(
            path = %config.detection_model_path,
            provider = %execution_provider,
            device = config.device_id,
            "Initialized face detection model"
        );

        Ok(Self {
            config,
            session: Arc::new(tokio::sync::Mutex::new(session)),
        })
    }

    /// Decode `[batch, 5, predictions]` into boxes in source-image pixels.
    fn postprocess(
        &self,
        output: &Array<f32, IxDyn>,
        original_width: u32,
        original_height: u32,
    ) -> Result<Vec<BoundingBox>, FaceError> {
        let shape = output.shape();
        if shape.len() != 3 || shape[1] < 5 {
            return Err(FaceError::Detection(format!(
                "expected detector output [1, 5, N], got {:?}",
                shape
            )));
        }

        let scale_x = original_width as f32 / self.config.detection_input_size as f32;
        let scale_y = original_height as f32 / self.config.detection_input_size as f32;

        let mut boxes = Vec::new();
        for i in 0..shape[2] {
            let confidence = output[[0, 4, i]];
            if confidence < self.config.confidence_threshold {
                continue;
            }

            let cx = output[[0, 0, i]];
            let cy = output[[0, 1, i]];
            let w = output[[0, 2, i]];
            let h = output[[0, 3, i]];

            let left = ((cx - w / 2.0) * scale_x).max(0.0) as u32;
            let top = ((cy - h / 2.0) * scale_y).max(0.0) as u32;
            let right = ((cx + w / 2.0) * scale_x).max(0.0) as u32;
            let bottom = ((cy + h / 2.0) * scale_y).max(0.0) as u32;

            let bbox = BoundingBox::new(top, right, bottom, left)
                .clamp_to(original_width, original_height);
            if !bbox.is_empty() {
                boxes.push((bbox, confidence));
            }
        }

        Ok(non_max_suppression(boxes, self.config.iou_threshold)
            .into_iter()
            .take(self.config.max_detections)
            .map(|(bbox, _)| bbox)
            .collect())
    }
}

#[async_trait]
impl FaceDetector for OnnxFaceDetector {
    fn name(&self) -> &'static str {
        "onnx_detector"
    }

    async fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, FaceError> {
        let (width, height) = image.dimensions();
        let input = to_nchw(image, self.config.detection_input_size, |c| c as f32 / 255.0);
        let input_tensor = Value::from_array(input)?;

        let output = {
            let mut session = self.session.lock().await;
            let outputs = session.run(ort::inputs![input_tensor])?;
            let value = outputs
                .get("output0")
                .or_else(|| outputs.get("output"))
                .or_else(|| outputs.get("boxes"))
                .ok_or_else(|| FaceError::Model("No detection output tensor found".to_string()))?;
            let (shape, data) = value.try_extract_tensor::<f32>()?;
            let shape_usize: Vec<usize> = shape.as_ref().iter().map(|&x| x as usize).collect();
            to_array(&shape_usize, data)?
        };

        self.postprocess(&output, width, height)
    }
}

pub struct OnnxFaceEmbedder {
    config: OnnxConfig,
    session: Arc<tokio::sync::Mutex<Session>>,
}

impl OnnxFaceEmbedder {
    pub fn load(config: OnnxConfig) -> Result<Self> {
        let (session, execution_provider) = create_session(&config, &config.embedding_model_path)?;

        tracing::info!(
            path = %config.embedding_model_path,
            provider = %execution_provider,
            "Initialized face embedding model"
        );

        Ok(Self {
            config,
            session: Arc::new(tokio::sync::Mutex::new(session)),
        })
    }
}

/// Scale a vector to unit length; a zero vector is returned unchanged.
pub fn l2_normalize(values: &mut [f32]) {
    let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in values.iter_mut() {
            *val /= norm;
        }
    }
}

#[async_trait]
impl FaceEmbedder for OnnxFaceEmbedder {
    fn name(&self) -> &'static str {
        "onnx_embedder"
    }

    async fn embed(&self, image: &RgbImage, face: &BoundingBox) -> Result<FaceEncoding, FaceError> {
        let (width, height) = image.dimensions();
        let region = face.clamp_to(width, height);
        if region.is_empty() {
            return Err(FaceError::Embedding(format!(
                "face region {:?} lies outside the {}x{} image",
                face, width, height
            )));
        }

        let crop = image::imageops::crop_imm(
            image,
            region.left,
            region.top,
            region.width(),
            region.height(),
        )
        .to_image();

        // [-1, 1] input range, as ArcFace-style models expect.
        let input = to_nchw(&crop, self.config.embedding_input_size, |c| c as f32 / 127.5 - 1.0);
        let input_tensor = Value::from_array(input)?;

        let output = {
            let mut session = self.session.lock().await;
            let outputs = session.run(ort::inputs![input_tensor])?;
            let value = outputs
                .get("output")
                .or_else(|| outputs.get("output0"))
                .or_else(|| outputs.get("embedding"))
                .ok_or_else(|| FaceError::Model("No embedding output tensor found".to_string()))?;
            let (shape, data) = value.try_extract_tensor::<f32>()?;
            let shape_usize: Vec<usize> = shape.as_ref().iter().map(|&x| x as usize).collect();
            to_array(&shape_usize, data)?
        };

        if output.ndim() != 2 || output.shape()[1] == 0 {
            return Err(FaceError::Embedding(format!(
                "expected embedding output [1, D], got {:?}",
                output.shape()
            )));
        }

        let mut values: Vec<f32> = (0..output.shape()[1]).map(|i| output[[0, i]]).collect();
        if self.config.normalize_embeddings {
            l2_normalize(&mut values);
        }

        if values.iter().any(|v| !v.is_finite()) {
            return Err(FaceError::Embedding("embedding contains non-finite values".to_string()));
        }

        Ok(FaceEncoding::new(values))
    }
}
