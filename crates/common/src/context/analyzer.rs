//! Document Analyzer - per-file metadata extraction

use base64::{engine::general_purpose::STANDARD, Engine};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::prompts;
use crate::errors::LlmError;
use crate::llm::{GenerateRequest, ModelClient};
use crate::models::{DocumentAnalysis, FilePayload};
use crate::retry::{with_retry, RetryPolicy};

const TEMPERATURE: f32 = 0.1;

/// Extracts a [`DocumentAnalysis`] from one uploaded document
#[derive(Clone)]
pub struct DocumentAnalyzer {
    client: Arc<dyn ModelClient>,
    model: String,
    retry: RetryPolicy,
}

impl DocumentAnalyzer {
    pub fn new(client: Arc<dyn ModelClient>, model: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            model: model.into(),
            retry,
        }
    }

    /// Analyze one document. Every call is a fresh extraction.
    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    pub async fn analyze(
        &self,
        file_name: &str,
        payload: &FilePayload,
    ) -> Result<DocumentAnalysis, LlmError> {
        let encoded = STANDARD.encode(payload.bytes());
        let request = GenerateRequest::new(&self.model)
            .inline_data(payload.media_type(), encoded)
            .text(format!("File name: {}\n\n{}", file_name, prompts::ANALYSIS_PROMPT))
            .schema(prompts::analysis_schema())
            .temperature(TEMPERATURE);

        let response = with_retry(self.retry, "analyze_document", || {
            self.client.generate(request.clone())
        })
        .await?;

        let analysis: DocumentAnalysis = response.parse_json()?;
        debug!(title = %analysis.title, topic = %analysis.citation.main_topic, "Document analyzed");
        Ok(analysis)
    }
}
