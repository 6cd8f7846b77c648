//! HTTP front end for face recognition and enrollment.

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod state;

pub use backend::FaceBackend;
pub use config::{AccessMode, FaceServiceConfig};
pub use error::ApiError;
pub use state::{AccessPolicy, AppState};

use anyhow::{Context, Result};
use auth_service::{AuthService, AuthState, SqliteUserRepository};
use face_core::{FsEnrollmentStore, RecognitionPipeline};
use std::sync::Arc;

/// Load models, open the stores, and assemble the shared state.
pub async fn build_state(config: &FaceServiceConfig) -> Result<AppState> {
    let (detector, embedder) = config
        .backend
        .load(&config.onnx)
        .with_context(|| format!("failed to load {} face backend", config.backend))?;
    let pipeline = RecognitionPipeline::new(detector, embedder, config.recognition.clone());

    let store = Arc::new(FsEnrollmentStore::new(&config.images_dir, config.store_layout));

    let users = SqliteUserRepository::connect(&config.auth.database_url)
        .await
        .context("failed to open user store")?;
    let auth = AuthState::new(Arc::new(AuthService::new(Arc::new(users), config.auth.clone())));

    Ok(AppState::new(
        pipeline,
        store,
        auth,
        AccessPolicy {
            mode: config.access_mode,
            protect_recognizer: config.protect_recognizer,
        },
        config.max_upload_bytes,
    ))
}
