use anyhow::{anyhow, Context, Result};
use auth_service::AuthConfig;
use face_core::onnx::OnnxConfig;
use face_core::{MatchPolicy, RecognitionConfig, StoreLayout};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::backend::FaceBackend;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Who may enroll, and how enrollments and results are shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Anyone may enroll under any `name`; flat result records.
    #[default]
    Open,
    /// Enrollment is tied to the bearer token's account; results nest the
    /// box under `face_location`.
    Authenticated,
}

impl AccessMode {
    /// Store layout used when none is configured explicitly.
    pub fn default_layout(self) -> StoreLayout {
        match self {
            AccessMode::Open => StoreLayout::PerLabel,
            AccessMode::Authenticated => StoreLayout::PerUserPics,
        }
    }
}

impl FromStr for AccessMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(AccessMode::Open),
            "authenticated" | "auth" => Ok(AccessMode::Authenticated),
            other => Err(anyhow!(
                "unknown access mode '{}' (expected open or authenticated)",
                other
            )),
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Open => f.write_str("open"),
            AccessMode::Authenticated => f.write_str("authenticated"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FaceServiceConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: SocketAddr,
    /// Root of the enrollment store
    pub images_dir: PathBuf,
    pub store_layout: StoreLayout,
    pub access_mode: AccessMode,
    /// Also require a bearer token on `/recognizer` (authenticated mode only)
    pub protect_recognizer: bool,
    pub max_upload_bytes: usize,
    pub backend: FaceBackend,
    pub onnx: OnnxConfig,
    pub recognition: RecognitionConfig,
    pub auth: AuthConfig,
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("invalid {}='{}': {}", name, value, e)),
        _ => Ok(None),
    }
}

impl FaceServiceConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = parse_var::<SocketAddr>("FACEGATE_ADDR")?
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8000)));

        let images_dir = env::var("FACEGATE_IMAGES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("images"));

        let access_mode = parse_var::<AccessMode>("FACEGATE_ACCESS_MODE")?.unwrap_or_default();
        let store_layout = parse_var::<StoreLayout>("FACEGATE_STORE_LAYOUT")?
            .unwrap_or_else(|| access_mode.default_layout());

        let protect_recognizer = parse_var::<bool>("FACEGATE_PROTECT_RECOGNIZER")?.unwrap_or(false);
        if protect_recognizer && access_mode == AccessMode::Open {
            tracing::warn!("FACEGATE_PROTECT_RECOGNIZER has no effect in open access mode");
        }

        let max_upload_bytes = parse_var::<usize>("FACEGATE_MAX_UPLOAD_BYTES")?
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        if max_upload_bytes == 0 {
            return Err(anyhow!("FACEGATE_MAX_UPLOAD_BYTES must be greater than 0"));
        }

        let backend = parse_var::<FaceBackend>("FACE_BACKEND")?.unwrap_or_default();

        let mut onnx = OnnxConfig::default();
        if let Ok(path) = env::var("FACE_DETECTION_MODEL") {
            onnx.detection_model_path = path;
        }
        if let Ok(path) = env::var("FACE_EMBEDDING_MODEL") {
            onnx.embedding_model_path = path;
        }
        if let Ok(provider) = env::var("FACE_RECOGNITION_EXECUTION_PROVIDER") {
            onnx.execution_provider = provider;
        }
        if let Some(device_id) = parse_var::<i32>("FACE_RECOGNITION_DEVICE_ID")? {
            onnx.device_id = device_id;
        }

        let mut recognition = RecognitionConfig::default();
        if let Some(tolerance) = parse_var::<f32>("FACE_TOLERANCE")? {
            common::validation::validate_range(tolerance, 0.0, 10.0, "FACE_TOLERANCE")?;
            recognition.tolerance = tolerance;
        }
        if let Some(policy) = parse_var::<MatchPolicy>("FACE_MATCH_POLICY")? {
            recognition.match_policy = policy;
        }
        if let Some(single) = parse_var::<bool>("FACE_REQUIRE_SINGLE_FACE")? {
            recognition.require_single_face_enrollment = single;
        }

        let auth = AuthConfig::from_env().context("invalid auth configuration")?;

        Ok(Self {
            bind_addr,
            images_dir,
            store_layout,
            access_mode,
            protect_recognizer,
            max_upload_bytes,
            backend,
            onnx,
            recognition,
            auth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_access_mode() {
        assert_eq!("open".parse::<AccessMode>().unwrap(), AccessMode::Open);
        assert_eq!(
            "Authenticated".parse::<AccessMode>().unwrap(),
            AccessMode::Authenticated
        );
        assert!("public".parse::<AccessMode>().is_err());
    }

    #[test]
    fn test_access_mode_default_layout() {
        assert_eq!(AccessMode::Open.default_layout(), StoreLayout::PerLabel);
        assert_eq!(
            AccessMode::Authenticated.default_layout(),
            StoreLayout::PerUserPics
        );
    }

    #[test]
    fn test_from_env() {
        // Single test so env mutations do not race with each other.
        env::set_var("FACEGATE_ACCESS_MODE", "authenticated");
        env::set_var("FACE_BACKEND", "synthetic");
        env::set_var("FACE_TOLERANCE", "0.45");
        env::set_var("FACE_MATCH_POLICY", "nearest");

        let config = FaceServiceConfig::from_env().unwrap();
        assert_eq!(config.access_mode, AccessMode::Authenticated);
        assert_eq!(config.store_layout, StoreLayout::PerUserPics);
        assert_eq!(config.backend, FaceBackend::Synthetic);
        assert_eq!(config.recognition.tolerance, 0.45);
        assert_eq!(config.recognition.match_policy, MatchPolicy::Nearest);
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(config.bind_addr.port(), 8000);

        env::set_var("FACE_TOLERANCE", "-1");
        assert!(FaceServiceConfig::from_env().is_err());

        env::set_var("FACE_TOLERANCE", "abc");
        assert!(FaceServiceConfig::from_env().is_err());

        for name in [
            "FACEGATE_ACCESS_MODE",
            "FACE_BACKEND",
            "FACE_TOLERANCE",
            "FACE_MATCH_POLICY",
        ] {
            env::remove_var(name);
        }
    }
}
