//! Gemini `generateContent` REST client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{GenerateRequest, GenerateResponse, GroundingSource, ModelClient, Part};
use crate::config::LlmConfig;
use crate::errors::LlmError;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::Configuration("llm.api_key is not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                LlmError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    #[instrument(skip(self, request), fields(model = %request.model, web_search = request.web_search))]
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let url = self.endpoint(&request.model);
        let body = WireRequest::from(request);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(provider_error(status.as_u16(), &text));
        }

        let parsed: WireResponse = serde_json::from_str(&text).map_err(LlmError::from_json)?;
        let response = parsed.into_response();
        debug!(
            has_text = response.text.is_some(),
            sources = response.grounding_sources.len(),
            "Gemini response received"
        );
        Ok(response)
    }

    fn provider_name(&self) -> &str {
        "gemini"
    }
}

/// Turn a non-2xx body into a provider error, keeping the API status string
/// (e.g. `RESOURCE_EXHAUSTED`) in the message so it can be classified.
fn provider_error(status: u16, body: &str) -> LlmError {
    let message = serde_json::from_str::<WireErrorEnvelope>(body)
        .map(|envelope| match envelope.error.status {
            Some(code) => format!("{} {}", code, envelope.error.message),
            None => envelope.error.message,
        })
        .unwrap_or_else(|_| body.trim().to_string());

    LlmError::Provider { status, message }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest {
    contents: Vec<WireContent>,
    generation_config: WireGenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize)]
struct WireContent {
    role: &'static str,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WirePart {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Inline {
        inline_data: WireBlob,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireBlob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTool {
    google_search: Value,
}

impl From<GenerateRequest> for WireRequest {
    fn from(request: GenerateRequest) -> Self {
        let parts = request
            .parts
            .into_iter()
            .map(|part| match part {
                Part::Text(text) => WirePart::Text { text },
                Part::InlineData { mime_type, data } => WirePart::Inline {
                    inline_data: WireBlob { mime_type, data },
                },
            })
            .collect();

        let tools = if request.web_search {
            vec![WireTool {
                google_search: Value::Object(Default::default()),
            }]
        } else {
            Vec::new()
        };

        Self {
            contents: vec![WireContent { role: "user", parts }],
            generation_config: WireGenerationConfig {
                temperature: request.temperature,
                response_mime_type: request
                    .response_schema
                    .as_ref()
                    .map(|_| "application/json"),
                response_schema: request.response_schema,
            },
            tools,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    content: Option<WireResponseContent>,
    grounding_metadata: Option<WireGroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct WireResponseContent {
    #[serde(default)]
    parts: Vec<WireResponsePart>,
}

#[derive(Debug, Deserialize)]
struct WireResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireGroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<WireGroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct WireGroundingChunk {
    web: Option<WireWebSource>,
}

#[derive(Debug, Deserialize)]
struct WireWebSource {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireErrorEnvelope {
    error: WireError,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

impl WireResponse {
    fn into_response(self) -> GenerateResponse {
        let Some(candidate) = self.candidates.into_iter().next() else {
            return GenerateResponse::default();
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        let grounding_sources = candidate
            .grounding_metadata
            .map(|m| m.grounding_chunks)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|chunk| chunk.web)
            .filter_map(|web| {
                let uri = web.uri?;
                let title = web.title.unwrap_or_else(|| uri.clone());
                Some(GroundingSource { title, uri })
            })
            .collect();

        GenerateResponse {
            text: (!text.is_empty()).then_some(text),
            grounding_sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let request = GenerateRequest::new("gemini-2.5-flash")
            .inline_data("application/pdf", "JVBERg==")
            .text("Analyze")
            .schema(json!({"type": "OBJECT"}))
            .temperature(0.1);

        let wire = serde_json::to_value(WireRequest::from(request)).unwrap();
        assert_eq!(wire["contents"][0]["parts"][0]["inlineData"]["mimeType"], "application/pdf");
        assert_eq!(wire["contents"][0]["parts"][1]["text"], "Analyze");
        assert_eq!(wire["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(wire["generationConfig"]["responseSchema"]["type"], "OBJECT");
        assert!(wire.get("tools").is_none());
    }

    #[test]
    fn test_web_search_adds_tool_without_json_mode() {
        let request = GenerateRequest::new("gemini-2.5-pro")
            .text("Question")
            .with_web_search();

        let wire = serde_json::to_value(WireRequest::from(request)).unwrap();
        assert_eq!(wire["tools"][0]["googleSearch"], json!({}));
        assert!(wire["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn test_response_text_and_sources() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [{"text": "Hello "}, {"text": "world"}]},
                "groundingMetadata": {
                    "groundingChunks": [
                        {"web": {"uri": "https://a.example", "title": "A"}},
                        {"web": {"uri": "https://b.example"}},
                        {}
                    ]
                }
            }]
        });

        let parsed: WireResponse = serde_json::from_value(body).unwrap();
        let response = parsed.into_response();
        assert_eq!(response.text.as_deref(), Some("Hello world"));
        assert_eq!(response.grounding_sources.len(), 2);
        assert_eq!(response.grounding_sources[1].title, "https://b.example");
    }

    #[test]
    fn test_no_candidates_means_no_text() {
        let parsed: WireResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(parsed.into_response(), GenerateResponse::default());
    }

    #[test]
    fn test_error_envelope_keeps_status_marker() {
        let body = r#"{"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#;
        let err = provider_error(429, body);
        assert_eq!(
            err,
            LlmError::Provider {
                status: 429,
                message: "RESOURCE_EXHAUSTED Quota exceeded".into()
            }
        );
        assert!(err.is_transient());
    }

    #[test]
    fn test_missing_api_key_is_configuration_error() {
        assert!(matches!(
            GeminiClient::new(&LlmConfig::default()),
            Err(LlmError::Configuration(_))
        ));
    }
}
