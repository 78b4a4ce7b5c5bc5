//! Synthesizer - grounded question answering and gap analysis
//!
//! Provides:
//! - Answers grounded in the eligible documents of a project, with web search
//! - Citation extraction against the documents' titles
//! - Research gap analysis for an answer

use regex_lite::Regex;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::prompts;
use crate::errors::LlmError;
use crate::llm::{GenerateRequest, GroundingSource, ModelClient};
use crate::models::{AnalyzedFile, ChatMessage, ChatRole, GapAnalysis};
use crate::retry::{with_retry, RetryPolicy};

/// Reply when no completed, non-outlier document is available
pub const NO_ELIGIBLE_DOCUMENTS_MESSAGE: &str = "I don't have any analyzed documents to answer \
from yet. Upload PDFs to this project and wait for their analysis to finish, or check that \
they were not all flagged as outliers.";

/// Reply stored in the chat when answering fails
pub const CHAT_FAILURE_MESSAGE: &str =
    "Sorry, I couldn't answer that right now. Please try again in a moment.";

/// Prior chat turns included with each question
pub const HISTORY_WINDOW: usize = 4;

const ANSWER_TEMPERATURE: f32 = 0.3;
const GAP_TEMPERATURE: f32 = 0.3;

const FENCED_JSON: &str = r"(?s)```(?:json)?\s*(\{.*\})\s*```";

/// A synthesized chat answer
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// Answer text, with web sources appended when the provider used any
    pub text: String,
    /// Titles of the project documents the answer cites
    pub citations: Vec<String>,
    /// Whether the provider grounded the answer with web search
    pub grounded: bool,
}

impl Answer {
    fn refusal() -> Self {
        Self {
            text: NO_ELIGIBLE_DOCUMENTS_MESSAGE.to_string(),
            citations: Vec::new(),
            grounded: false,
        }
    }
}

/// Synthesizer for chat answers
#[derive(Clone)]
pub struct Synthesizer {
    client: Arc<dyn ModelClient>,
    model: String,
    retry: RetryPolicy,
}

impl Synthesizer {
    pub fn new(client: Arc<dyn ModelClient>, model: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            model: model.into(),
            retry,
        }
    }

    /// Answer `question` from the eligible files, with the tail of `history`
    /// (turns before the question) as conversational context.
    #[instrument(skip(self, files, history), fields(files = files.len(), history = history.len()))]
    pub async fn answer(
        &self,
        question: &str,
        files: &[AnalyzedFile],
        history: &[ChatMessage],
    ) -> Result<Answer, LlmError> {
        let eligible: Vec<&AnalyzedFile> = files.iter().filter(|f| f.is_eligible()).collect();
        if eligible.is_empty() {
            debug!("No eligible documents, refusing without a provider call");
            return Ok(Answer::refusal());
        }

        let prompt = build_answer_prompt(question, &eligible, history);
        let request = GenerateRequest::new(&self.model)
            .text(prompt)
            .temperature(ANSWER_TEMPERATURE)
            .with_web_search();

        let response = with_retry(self.retry, "answer_question", || {
            self.client.generate(request.clone())
        })
        .await?;

        let mut text = response.require_text()?.trim().to_string();
        let citations = extract_citations(&text, &eligible);
        append_web_sources(&mut text, &response.grounding_sources);

        debug!(
            citations = citations.len(),
            web_sources = response.grounding_sources.len(),
            "Answer synthesized"
        );

        Ok(Answer {
            text,
            citations,
            grounded: !response.grounding_sources.is_empty(),
        })
    }

    /// Identify a research gap left open by an answer, with recommended readings
    #[instrument(skip(self, question, answer))]
    pub async fn analyze_gaps(&self, question: &str, answer: &str) -> Result<GapAnalysis, LlmError> {
        let request = GenerateRequest::new(&self.model)
            .text(format!(
                "{}\n\nQuestion:\n{}\n\nAnswer:\n{}",
                prompts::GAP_PROMPT,
                question,
                answer
            ))
            .temperature(GAP_TEMPERATURE)
            .with_web_search();

        let response = with_retry(self.retry, "analyze_gaps", || {
            self.client.generate(request.clone())
        })
        .await?;

        let text = response.require_text()?;
        let json = extract_json_block(text)?;
        serde_json::from_str(json).map_err(LlmError::from_json)
    }
}

fn build_answer_prompt(question: &str, files: &[&AnalyzedFile], history: &[ChatMessage]) -> String {
    let mut prompt = format!("{}\n\nDocuments:\n", prompts::CHAT_PROMPT);

    for (i, file) in files.iter().enumerate() {
        let Some(result) = file.result() else { continue };
        let _ = writeln!(prompt, "\n[{}] {} ({})", i + 1, result.title, file.file_name);
        let _ = writeln!(prompt, "Reference: {}", result.citation.format_reference());
        let _ = writeln!(prompt, "Field: {}", result.citation.main_topic);
        let _ = writeln!(prompt, "Summary: {}", result.summary);
        for point in &result.key_points {
            let _ = writeln!(prompt, "- {}", point);
        }
        if !result.thematic_tags.is_empty() {
            let _ = writeln!(prompt, "Tags: {}", result.thematic_tags.join(", "));
        }
    }

    let recent = &history[history.len().saturating_sub(HISTORY_WINDOW)..];
    if !recent.is_empty() {
        prompt.push_str("\nConversation so far:\n");
        for message in recent {
            let speaker = match message.role {
                ChatRole::User => "User",
                ChatRole::Ai => "Assistant",
            };
            let _ = writeln!(prompt, "{}: {}", speaker, message.content);
        }
    }

    let _ = write!(prompt, "\nQuestion: {}\n\nAnswer:", question);
    prompt
}

/// Distinct titles of the documents the answer mentions, in document order
fn extract_citations(answer: &str, files: &[&AnalyzedFile]) -> Vec<String> {
    let haystack = answer.to_lowercase();
    let mut seen = HashSet::new();

    files
        .iter()
        .map(|f| f.display_title())
        .filter(|title| haystack.contains(&title.to_lowercase()))
        .filter(|title| seen.insert(title.to_string()))
        .map(str::to_string)
        .collect()
}

fn append_web_sources(text: &mut String, sources: &[GroundingSource]) {
    let mut seen = HashSet::new();
    let unique: Vec<&GroundingSource> = sources
        .iter()
        .filter(|s| seen.insert(s.uri.as_str()))
        .collect();
    if unique.is_empty() {
        return;
    }

    text.push_str("\n\nWeb Sources:\n");
    for source in unique {
        let _ = writeln!(text, "- [{}]({})", source.title, source.uri);
    }
    let trimmed_len = text.trim_end().len();
    text.truncate(trimmed_len);
}

/// The JSON object inside a model reply, fenced or bare
fn extract_json_block(text: &str) -> Result<&str, LlmError> {
    let fenced = Regex::new(FENCED_JSON)
        .map_err(|e| LlmError::Configuration(format!("Invalid JSON block pattern: {}", e)))?;
    if let Some(block) = fenced.captures(text).and_then(|c| c.get(1)) {
        return Ok(block.as_str());
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&text[start..=end]),
        _ => Err(LlmError::MalformedResponse(
            "No JSON object in gap analysis reply".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GenerateResponse, MockModelClient};
    use crate::models::{CitationData, DocumentAnalysis, FilePayload, LiteratureType};

    fn completed(name: &str, title: &str) -> AnalyzedFile {
        let mut file = AnalyzedFile::pending(name, FilePayload::new(vec![0u8], "application/pdf"));
        file.mark_completed(DocumentAnalysis {
            title: title.into(),
            summary: format!("Summary of {}", title),
            key_points: vec![format!("Finding of {}", title)],
            citation: CitationData {
                title: title.into(),
                journal: None,
                year: Some("2022".into()),
                authors: vec!["Kim, S.".into()],
                literature_type: LiteratureType::PrimaryResearch,
                main_topic: "Ecology".into(),
            },
            thematic_tags: vec!["soil".into()],
        });
        file
    }

    fn synthesizer(client: Arc<MockModelClient>) -> Synthesizer {
        Synthesizer::new(client, "synth", RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_no_eligible_files_refuses_without_call() {
        let client = Arc::new(MockModelClient::new());
        let mut outlier = completed("x.pdf", "Tax codes");
        outlier.mark_outlier("Law");
        let pending = AnalyzedFile::pending("p.pdf", FilePayload::new(vec![0u8], "application/pdf"));

        let answer = synthesizer(client.clone())
            .answer("Why?", &[outlier, pending], &[])
            .await
            .unwrap();

        assert_eq!(answer.text, NO_ELIGIBLE_DOCUMENTS_MESSAGE);
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_answer_uses_eligible_files_and_recent_history() {
        let client = Arc::new(
            MockModelClient::new().with_response("Drought shrinks microbes [Soil microbes].\n\nSources: Soil microbes"),
        );
        let mut outlier = completed("law.pdf", "Tax codes");
        outlier.mark_outlier("Law");
        let files = vec![completed("soil.pdf", "Soil microbes"), completed("roots.pdf", "Root depth"), outlier];
        let history: Vec<ChatMessage> = (0..6).map(|i| ChatMessage::user(format!("turn {}", i))).collect();

        let answer = synthesizer(client.clone())
            .answer("What does drought do?", &files, &history)
            .await
            .unwrap();

        assert_eq!(answer.citations, vec!["Soil microbes".to_string()]);
        assert!(!answer.grounded);

        let request = &client.requests()[0];
        assert!(request.web_search);
        assert_eq!(request.temperature, 0.3);
        let prompt = request.prompt_text();
        assert!(prompt.contains("Root depth"));
        assert!(!prompt.contains("Tax codes"));
        assert!(!prompt.contains("turn 1"));
        assert!(prompt.contains("turn 2") && prompt.contains("turn 5"));
    }

    #[tokio::test]
    async fn test_web_sources_are_appended_once() {
        let source = GroundingSource {
            title: "FAO report".into(),
            uri: "https://fao.example/report".into(),
        };
        let client = Arc::new(MockModelClient::new().with_result(Ok(
            GenerateResponse::from_text("Answer text").with_sources(vec![source.clone(), source]),
        )));

        let answer = synthesizer(client)
            .answer("Q", &[completed("a.pdf", "A")], &[])
            .await
            .unwrap();

        assert!(answer.grounded);
        assert_eq!(
            answer.text,
            "Answer text\n\nWeb Sources:\n- [FAO report](https://fao.example/report)"
        );
    }

    #[tokio::test]
    async fn test_gap_analysis_from_fenced_reply() {
        let client = Arc::new(MockModelClient::new().with_response(
            "Here you go:\n```json\n{\"identifiedGap\": \"Long-term data\", \"recommendedReadings\": [{\"title\": \"Decadal soils\", \"url\": \"https://x.example\", \"reason\": \"Spans 20 years\"}], \"futureDirection\": \"Monitor\"}\n```",
        ));

        let gap = synthesizer(client).analyze_gaps("Q", "A").await.unwrap();
        assert_eq!(gap.identified_gap, "Long-term data");
        assert_eq!(gap.recommended_readings[0].title, "Decadal soils");
    }

    #[tokio::test]
    async fn test_gap_analysis_without_json_is_malformed() {
        let client = Arc::new(MockModelClient::new().with_response("No gaps found."));
        assert!(matches!(
            synthesizer(client).analyze_gaps("Q", "A").await,
            Err(LlmError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_bare_json_block_is_extracted() {
        let text = "Result: {\"a\": {\"b\": 1}} done";
        assert_eq!(extract_json_block(text).unwrap(), "{\"a\": {\"b\": 1}}");
    }
}
