pub mod routes;

use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Build the API router, account routes included.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health and metrics endpoints
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/metrics", get(routes::metrics))
        // Recognition and enrollment
        .route("/recognizer", post(routes::recognize))
        .route("/add_image", post(routes::add_image))
        .route("/labels", get(routes::list_labels))
        // Accounts
        .merge(auth_service::routes::routes::<AppState>())
        .layer(DefaultBodyLimit::max(state.max_upload_bytes()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
