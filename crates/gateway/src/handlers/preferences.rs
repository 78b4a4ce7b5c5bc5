//! Dashboard preferences

use axum::{extract::State, Json};
use paperlens_common::{errors::Result, models::ThemePreference};
use serde::{Deserialize, Serialize};

use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ThemeBody {
    pub theme: Option<ThemePreference>,
}

pub async fn get_theme(State(state): State<AppState>) -> Result<Json<ThemeBody>> {
    let theme = state.queue.theme().await?;
    Ok(Json(ThemeBody { theme }))
}

#[derive(Debug, Deserialize)]
pub struct SetThemeRequest {
    pub theme: ThemePreference,
}

/// Store the colour scheme; takes effect for every project
pub async fn set_theme(
    State(state): State<AppState>,
    Json(request): Json<SetThemeRequest>,
) -> Result<Json<ThemeBody>> {
    state.queue.set_theme(request.theme).await?;
    tracing::debug!(theme = ?request.theme, "Theme preference saved");
    Ok(Json(ThemeBody {
        theme: Some(request.theme),
    }))
}
