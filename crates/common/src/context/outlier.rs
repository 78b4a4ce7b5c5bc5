//! Outlier Detector - batch thematic cohesion check

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

use super::prompts;
use crate::errors::LlmError;
use crate::llm::{GenerateRequest, ModelClient};
use crate::models::{AnalyzedFile, OutlierReport};
use crate::retry::{with_retry, RetryPolicy};

/// Completed files needed before a cohesion check means anything
pub const MIN_FILES_FOR_COHESION: usize = 3;

const TEMPERATURE: f32 = 0.1;

/// What the model sees of each document
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentDigest<'a> {
    filename: &'a str,
    title: &'a str,
    main_topic: &'a str,
    literature_type: &'a str,
    tags: &'a [String],
}

#[derive(Clone)]
pub struct OutlierDetector {
    client: Arc<dyn ModelClient>,
    model: String,
    retry: RetryPolicy,
}

impl OutlierDetector {
    pub fn new(client: Arc<dyn ModelClient>, model: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            model: model.into(),
            retry,
        }
    }

    /// Classify the completed files among `files` against their dominant theme.
    ///
    /// Below [`MIN_FILES_FOR_COHESION`] completed files this returns
    /// [`OutlierReport::insufficient`] without contacting the provider.
    #[instrument(skip(self, files), fields(files = files.len()))]
    pub async fn detect(&self, files: &[AnalyzedFile]) -> Result<OutlierReport, LlmError> {
        let digests: Vec<DocumentDigest<'_>> = files
            .iter()
            .filter_map(|file| {
                let result = file.result()?;
                Some(DocumentDigest {
                    filename: &file.file_name,
                    title: &result.title,
                    main_topic: &result.citation.main_topic,
                    literature_type: result.citation.literature_type.as_str(),
                    tags: &result.thematic_tags,
                })
            })
            .collect();

        if digests.len() < MIN_FILES_FOR_COHESION {
            return Ok(OutlierReport::insufficient());
        }

        let documents = serde_json::to_string_pretty(&digests)
            .map_err(|e| LlmError::Configuration(format!("Failed to encode documents: {}", e)))?;

        let request = GenerateRequest::new(&self.model)
            .text(format!("{}\n\nDocuments:\n{}", prompts::OUTLIER_PROMPT, documents))
            .schema(prompts::outlier_schema())
            .temperature(TEMPERATURE);

        let response = with_retry(self.retry, "detect_outliers", || {
            self.client.generate(request.clone())
        })
        .await?;

        let report: OutlierReport = response.parse_json()?;
        info!(
            theme = %report.main_theme,
            outliers = report.outliers.len(),
            documents = digests.len(),
            "Cohesion check complete"
        );
        Ok(report)
    }
}
