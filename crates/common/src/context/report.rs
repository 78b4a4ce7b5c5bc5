//! Report Writer - restructures chat answers into a research report

use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, instrument};

use super::prompts;
use crate::errors::LlmError;
use crate::llm::{GenerateRequest, ModelClient};
use crate::models::{ChatMessage, ReportData};
use crate::retry::{with_retry, RetryPolicy};

const TEMPERATURE: f32 = 0.2;

#[derive(Clone)]
pub struct ReportWriter {
    client: Arc<dyn ModelClient>,
    model: String,
    retry: RetryPolicy,
}

impl ReportWriter {
    pub fn new(client: Arc<dyn ModelClient>, model: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            model: model.into(),
            retry,
        }
    }

    /// Build a report from the AI answers in `history`.
    ///
    /// Fails with [`LlmError::EmptyHistory`] before any provider call when
    /// there are no AI answers.
    #[instrument(skip(self, history), fields(messages = history.len()))]
    pub async fn generate(&self, history: &[ChatMessage]) -> Result<ReportData, LlmError> {
        let answers: Vec<&ChatMessage> = history.iter().filter(|m| m.is_ai()).collect();
        if answers.is_empty() {
            return Err(LlmError::EmptyHistory);
        }

        let mut prompt = format!("{}\n\nAnswers:\n", prompts::REPORT_PROMPT);
        for (i, answer) in answers.iter().enumerate() {
            let _ = writeln!(prompt, "\n--- Answer {} ---\n{}", i + 1, answer.content);
        }

        let request = GenerateRequest::new(&self.model)
            .text(prompt)
            .schema(prompts::report_schema())
            .temperature(TEMPERATURE);

        let response = with_retry(self.retry, "generate_report", || {
            self.client.generate(request.clone())
        })
        .await?;

        let report: ReportData = response.parse_json()?;
        info!(
            answers = answers.len(),
            references = report.references.len(),
            "Report generated"
        );
        Ok(report)
    }
}
