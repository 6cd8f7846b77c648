use crate::config::AccessMode;
use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Multipart, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use face_core::{BoundingBox, FaceError, MatchResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;
use tracing::info;

/// Multipart field carrying the uploaded image.
pub const IMAGE_FIELD: &str = "image";

/// Health check endpoint
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "face-service"
        })),
    )
}

/// Readiness check endpoint
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let backend = state.pipeline().health_check().await;
    let store = state.store().health_check().await;
    let users = state.auth().service().health_check().await;
    let (detector, embedder) = state.pipeline().backend();

    let status = if backend && store && users {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ready" } else { "not ready" },
            "checks": {
                "backend": backend,
                "store": store,
                "users": users,
            },
            "detector": detector,
            "embedder": embedder,
        })),
    )
}

/// Prometheus metrics endpoint
pub async fn metrics() -> impl IntoResponse {
    match telemetry::encode_metrics() {
        Ok(body) => body.into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

/// One recognized face, shaped by the access mode.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RecognizedFace {
    Located {
        face_location: BoundingBox,
        name: String,
    },
    Flat {
        top: u32,
        right: u32,
        bottom: u32,
        left: u32,
        name: String,
    },
}

impl RecognizedFace {
    pub fn from_match(result: MatchResult, mode: AccessMode) -> Self {
        let MatchResult {
            bounding_box,
            label,
        } = result;

        match mode {
            AccessMode::Open => RecognizedFace::Flat {
                top: bounding_box.top,
                right: bounding_box.right,
                bottom: bounding_box.bottom,
                left: bounding_box.left,
                name: label,
            },
            AccessMode::Authenticated => RecognizedFace::Located {
                face_location: bounding_box,
                name: label,
            },
        }
    }
}

async fn read_image_field(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(IMAGE_FIELD) {
            let bytes = field.bytes().await?;
            return Ok(bytes.to_vec());
        }
    }

    Err(ApiError::unprocessable(format!(
        "missing multipart field '{}'",
        IMAGE_FIELD
    )))
}

/// Label every face in the uploaded image
pub async fn recognize(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<Vec<RecognizedFace>>, ApiError> {
    let start = Instant::now();
    let access = state.access();

    if access.recognizer_requires_auth() {
        let user = state.authenticate(&headers).await?;
        tracing::debug!(username = %user.username, "recognizer caller authenticated");
    }

    let image = read_image_field(multipart).await?;
    let result = state.pipeline().recognize(&image, state.store()).await;

    let status = match &result {
        Ok(results) if results.is_empty() => "no_faces",
        Ok(_) => "success",
        Err(FaceError::Decode(_)) => "invalid_image",
        Err(_) => "error",
    };
    telemetry::metrics::RECOGNITION_REQUESTS
        .with_label_values(&[status])
        .inc();
    telemetry::metrics::RECOGNITION_DURATION.observe(start.elapsed().as_secs_f64());

    let results = result?;
    Ok(Json(
        results
            .into_iter()
            .map(|r| RecognizedFace::from_match(r, access.mode))
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct AddImageQuery {
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddImageResponse {
    pub message: String,
    pub filename: String,
}

/// Store a new enrollment image
pub async fn add_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AddImageQuery>,
    multipart: Multipart,
) -> Result<Json<AddImageResponse>, ApiError> {
    let label = match state.access().mode {
        AccessMode::Open => query
            .name
            .ok_or_else(|| ApiError::unprocessable("missing query parameter 'name'"))?,
        AccessMode::Authenticated => state.authenticate(&headers).await?.username,
    };

    let image = read_image_field(multipart).await?;

    match state.pipeline().enroll(&label, &image, state.store()).await {
        Ok(saved) => {
            telemetry::metrics::ENROLLMENTS
                .with_label_values(&["success"])
                .inc();
            info!(label = %saved.label, filename = %saved.filename, "Enrollment image added");
            Ok(Json(AddImageResponse {
                message: "Image added successfully".to_string(),
                filename: saved.filename,
            }))
        }
        Err(e) => {
            telemetry::metrics::ENROLLMENTS
                .with_label_values(&[e.kind()])
                .inc();
            Err(e.into())
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LabelSummary {
    pub label: String,
    pub images: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LabelsResponse {
    pub labels: Vec<LabelSummary>,
    pub count: usize,
}

/// List enrolled labels and their image counts
pub async fn list_labels(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<LabelsResponse>, ApiError> {
    if state.access().mode == AccessMode::Authenticated {
        state.authenticate(&headers).await?;
    }

    let labels: Vec<LabelSummary> = state
        .store()
        .label_counts()
        .await?
        .into_iter()
        .map(|(label, images)| LabelSummary { label, images })
        .collect();

    Ok(Json(LabelsResponse {
        count: labels.len(),
        labels,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognized_face_shapes() {
        let result = MatchResult {
            bounding_box: BoundingBox::new(1, 20, 30, 4),
            label: "alice".to_string(),
        };

        let flat = serde_json::to_value(RecognizedFace::from_match(result.clone(), AccessMode::Open)).unwrap();
        assert_eq!(
            flat,
            json!({"top": 1, "right": 20, "bottom": 30, "left": 4, "name": "alice"})
        );

        let located =
            serde_json::to_value(RecognizedFace::from_match(result, AccessMode::Authenticated)).unwrap();
        assert_eq!(
            located,
            json!({"face_location": {"top": 1, "right": 20, "bottom": 30, "left": 4}, "name": "alice"})
        );
    }
}
