//! Prometheus scrape endpoint

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::AppState;

/// Render the Prometheus text format, or 404 when metrics are disabled
pub async fn render(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled".to_string()),
    }
}
