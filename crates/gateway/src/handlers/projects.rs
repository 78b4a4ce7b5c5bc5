//! Project management handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use paperlens_common::{
    errors::{AppError, Result},
    models::{Project, ProjectSummary},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;

/// Request to create a new project
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 200))]
    pub nickname: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectListResponse {
    pub active_project_id: Option<Uuid>,
    pub projects: Vec<ProjectSummary>,
}

/// Create a project; it becomes the active one
pub async fn create_project(
    State(state): State<AppState>,
    Json(request): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("nickname".to_string()),
    })?;
    let nickname = request.nickname.trim();
    if nickname.is_empty() {
        return Err(AppError::Validation {
            message: "nickname must not be blank".to_string(),
            field: Some("nickname".to_string()),
        });
    }

    let project = state.queue.create_project(nickname).await?;
    tracing::info!(project_id = %project.id, "Project created via API");

    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn list_projects(State(state): State<AppState>) -> Result<Json<ProjectListResponse>> {
    let projects = state.queue.list_projects().await?;
    let active_project_id = state.queue.active_project().await?;
    Ok(Json(ProjectListResponse {
        active_project_id,
        projects,
    }))
}

/// Snapshot of one project, file bytes excluded
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Project>> {
    Ok(Json(state.queue.project(id).await?))
}

/// Bind the analysis queue to a project
pub async fn select_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Project>> {
    Ok(Json(state.queue.select_project(id).await?))
}
