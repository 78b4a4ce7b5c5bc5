//! Hosted model client abstraction
//!
//! Every adapter talks to the model through [`ModelClient`], so tests can
//! swap in [`MockModelClient`] without touching the network.

mod gemini;
mod mock;

pub use gemini::GeminiClient;
pub use mock::MockModelClient;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::errors::LlmError;

/// One piece of request content
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    /// Base64-encoded document bytes
    InlineData { mime_type: String, data: String },
}

/// Provider-independent generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub parts: Vec<Part>,
    /// JSON schema the response must follow; requests JSON output when set
    pub response_schema: Option<Value>,
    pub temperature: f32,
    /// Let the provider ground its answer with web search
    pub web_search: bool,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            parts: Vec::new(),
            response_schema: None,
            temperature: 0.0,
            web_search: false,
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(Part::Text(text.into()));
        self
    }

    pub fn inline_data(mut self, mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        self.parts.push(Part::InlineData {
            mime_type: mime_type.into(),
            data: data.into(),
        });
        self
    }

    pub fn schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_web_search(mut self) -> Self {
        self.web_search = true;
        self
    }

    pub fn has_inline_data(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::InlineData { .. }))
    }

    /// All text parts joined by newlines
    pub fn prompt_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(text) => Some(text.as_str()),
                Part::InlineData { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A web page the provider used to ground its answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateResponse {
    pub text: Option<String>,
    pub grounding_sources: Vec<GroundingSource>,
}

impl GenerateResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            grounding_sources: Vec::new(),
        }
    }

    pub fn with_sources(mut self, sources: Vec<GroundingSource>) -> Self {
        self.grounding_sources = sources;
        self
    }

    /// The response text, or `EmptyResponse` when missing or blank
    pub fn require_text(&self) -> Result<&str, LlmError> {
        self.text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }

    /// Strictly deserialize the response text as JSON
    pub fn parse_json<T: DeserializeOwned>(&self) -> Result<T, LlmError> {
        let text = self.require_text()?;
        serde_json::from_str(strip_code_fence(text)).map_err(LlmError::from_json)
    }
}

/// Remove a surrounding ```json fence some models add despite JSON mode
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError>;

    fn provider_name(&self) -> &str;
}

/// Build the configured provider
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn ModelClient>, LlmError> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiClient::new(config)?)),
        "mock" => Ok(Arc::new(MockModelClient::new())),
        other => Err(LlmError::Configuration(format!(
            "Unknown LLM provider: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Theme {
        theme: String,
    }

    #[test]
    fn test_builder_collects_parts() {
        let request = GenerateRequest::new("model")
            .inline_data("application/pdf", "JVBERg==")
            .text("Analyze paper.pdf")
            .temperature(0.1)
            .with_web_search();

        assert!(request.has_inline_data());
        assert!(request.web_search);
        assert_eq!(request.prompt_text(), "Analyze paper.pdf");
    }

    #[test]
    fn test_blank_text_is_empty_response() {
        let response = GenerateResponse::from_text("   ");
        assert_eq!(response.require_text(), Err(LlmError::EmptyResponse));
        assert_eq!(
            GenerateResponse::default().parse_json::<Theme>().unwrap_err(),
            LlmError::EmptyResponse
        );
    }

    #[test]
    fn test_parse_json_accepts_fenced_block() {
        let response = GenerateResponse::from_text("```json\n{\"theme\": \"Ecology\"}\n```");
        let parsed: Theme = response.parse_json().unwrap();
        assert_eq!(parsed.theme, "Ecology");
    }

    #[test]
    fn test_parse_json_classifies_failures() {
        let wrong_shape = GenerateResponse::from_text(r#"{"other": 1}"#);
        assert!(matches!(
            wrong_shape.parse_json::<Theme>(),
            Err(LlmError::SchemaViolation(_))
        ));

        let not_json = GenerateResponse::from_text("Sure! Here is the theme.");
        assert!(matches!(
            not_json.parse_json::<Theme>(),
            Err(LlmError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_unknown_provider_is_configuration_error() {
        let config = LlmConfig {
            provider: "acme".into(),
            ..LlmConfig::default()
        };
        assert!(matches!(
            create_client(&config),
            Err(LlmError::Configuration(_))
        ));
    }
}
