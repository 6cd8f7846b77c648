use axum::{
    extract::{Form, FromRef, FromRequestParts, State},
    http::request::Parts,
    routing::{get, post},
    Json, Router,
};

use crate::{error::ApiError, models::*, state::AuthState};

/// Account routes. Generic over the outer state so other services can mount
/// them next to their own routes.
pub fn routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    AuthState: FromRef<S>,
{
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/users/me", get(me))
}

/// Standalone router with health and metrics endpoints.
pub fn router(state: AuthState) -> Router {
    routes::<AuthState>()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Extractor resolving the bearer token to a registered user.
pub struct CurrentUser(pub User);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthState::from_ref(state);
        let token = common::auth::extract_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;
        let user = auth.service().current_user(token).await?;
        Ok(CurrentUser(user))
    }
}

// ===== Health & Metrics =====

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics() -> Result<String, ApiError> {
    telemetry::metrics::encode_metrics()
        .map_err(|e| ApiError::internal(format!("failed to encode metrics: {}", e)))
}

// ===== Accounts =====

async fn register(
    State(state): State<AuthState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<User>, ApiError> {
    let user = state.service().register(req).await?;
    Ok(Json(user))
}

async fn login(
    State(state): State<AuthState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = state.service().login(form).await?;
    Ok(Json(token))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}
