use auth_service::{AuthState, User};
use axum::extract::FromRef;
use axum::http::HeaderMap;
use face_core::{EnrollmentStore, RecognitionPipeline};
use std::sync::Arc;

use crate::config::AccessMode;
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPolicy {
    pub mode: AccessMode,
    pub protect_recognizer: bool,
}

impl AccessPolicy {
    pub fn open() -> Self {
        Self {
            mode: AccessMode::Open,
            protect_recognizer: false,
        }
    }

    pub fn authenticated(protect_recognizer: bool) -> Self {
        Self {
            mode: AccessMode::Authenticated,
            protect_recognizer,
        }
    }

    pub fn recognizer_requires_auth(&self) -> bool {
        self.mode == AccessMode::Authenticated && self.protect_recognizer
    }
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pipeline: RecognitionPipeline,
    store: Arc<dyn EnrollmentStore>,
    auth: AuthState,
    access: AccessPolicy,
    max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        pipeline: RecognitionPipeline,
        store: Arc<dyn EnrollmentStore>,
        auth: AuthState,
        access: AccessPolicy,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                pipeline,
                store,
                auth,
                access,
                max_upload_bytes,
            }),
        }
    }

    pub fn pipeline(&self) -> &RecognitionPipeline {
        &self.inner.pipeline
    }

    pub fn store(&self) -> &dyn EnrollmentStore {
        self.inner.store.as_ref()
    }

    pub fn auth(&self) -> &AuthState {
        &self.inner.auth
    }

    pub fn access(&self) -> AccessPolicy {
        self.inner.access
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.inner.max_upload_bytes
    }

    /// Resolve the request's bearer token to a registered account.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<User, ApiError> {
        let token = common::auth::extract_token(headers)
            .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;
        Ok(self.inner.auth.service().current_user(token).await?)
    }
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.inner.auth.clone()
    }
}
