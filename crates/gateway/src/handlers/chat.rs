//! Grounded chat handler

use axum::{
    extract::{Path, State},
    Json,
};
use paperlens_common::{
    context::CHAT_FAILURE_MESSAGE,
    errors::{AppError, Result},
    metrics,
    models::ChatMessage,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 8000))]
    pub question: String,

    /// Follow the answer with a web-grounded research gap analysis
    #[serde(default = "default_gap_analysis")]
    pub gap_analysis: bool,
}

fn default_gap_analysis() -> bool {
    true
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub question: ChatMessage,
    pub answer: ChatMessage,
}

/// Answer a question from the active project's eligible documents.
///
/// Both turns are appended to the history. A provider failure is not an
/// HTTP error: the fixed failure message is stored as the answer.
#[instrument(skip(state, request), fields(project_id = %id))]
pub async fn ask(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("question".to_string()),
    })?;

    let project = state.queue.project(id).await?;
    if state.queue.active_project().await? != Some(id) {
        return Err(AppError::ProjectNotActive { id: id.to_string() });
    }

    let question = request.question.trim().to_string();
    let has_eligible = project.files.iter().any(|f| f.is_eligible());

    let answer = match state
        .synthesizer
        .answer(&question, &project.files, &project.chat_history)
        .await
    {
        Ok(answer) if !has_eligible => {
            metrics::record_chat_answer("refused");
            ChatMessage::ai(answer.text)
        }
        Ok(answer) => {
            let gap = if request.gap_analysis {
                match state.synthesizer.analyze_gaps(&question, &answer.text).await {
                    Ok(gap) => Some(gap),
                    Err(e) => {
                        warn!(error = %e, "Gap analysis failed; keeping answer without it");
                        None
                    }
                }
            } else {
                None
            };
            metrics::record_chat_answer("answered");
            info!(
                citations = answer.citations.len(),
                grounded = answer.grounded,
                gap_analysis = gap.is_some(),
                "Question answered"
            );
            ChatMessage::ai(answer.text)
                .with_citations(answer.citations)
                .with_gap_analysis(gap)
        }
        Err(e) => {
            warn!(error = %e, "Answering failed; storing fallback message");
            metrics::record_chat_answer("fallback");
            ChatMessage::ai(CHAT_FAILURE_MESSAGE)
        }
    };

    let question = ChatMessage::user(question);
    state
        .queue
        .append_messages(id, vec![question.clone(), answer.clone()])
        .await?;

    Ok(Json(ChatResponse { question, answer }))
}
