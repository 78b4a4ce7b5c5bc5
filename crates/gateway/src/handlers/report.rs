//! Report generation and PDF export

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use paperlens_common::{
    errors::{AppError, Result},
    metrics,
    models::{Project, ReportData},
};
use paperlens_report::{render_report_pdf, ExportOptions};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::AppState;

async fn build_report(state: &AppState, id: Uuid) -> Result<(Project, ReportData)> {
    let project = state.queue.project(id).await?;
    let report = state.reports.generate(&project.chat_history).await?;
    Ok((project, report))
}

/// Synthesize a report from the project's chat answers
#[instrument(skip(state), fields(project_id = %id))]
pub async fn generate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReportData>> {
    let (_, report) = build_report(&state, id).await?;
    metrics::record_report("json");
    Ok(Json(report))
}

/// Synthesize a report and return it as a PDF download
#[instrument(skip(state), fields(project_id = %id))]
pub async fn export_pdf(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Response> {
    let (project, report) = build_report(&state, id).await?;

    let options = ExportOptions::new(format!("{} - Research Report", project.nickname))
        .with_subtitle(format!(
            "{} documents, {} chat answers",
            project.completed_count(),
            project.chat_history.iter().filter(|m| m.is_ai()).count()
        ));

    let bytes = tokio::task::spawn_blocking(move || render_report_pdf(&report, &options))
        .await
        .map_err(|e| AppError::Internal {
            message: format!("Report rendering task failed: {}", e),
        })??;

    metrics::record_report("pdf");
    info!(bytes = bytes.len(), "Report exported");

    let disposition = format!("attachment; filename=\"{}-report.pdf\"", file_stem(&project.nickname));
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// ASCII file name stem derived from a nickname
fn file_stem(nickname: &str) -> String {
    let stem: String = nickname
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let stem = stem
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if stem.is_empty() {
        "paperlens".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("Soil Review 2024!"), "soil-review-2024");
        assert_eq!(file_stem("Écologie"), "cologie");
        assert_eq!(file_stem("???"), "paperlens");
    }
}
