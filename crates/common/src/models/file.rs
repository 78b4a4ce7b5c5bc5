//! Per-document processing record

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::DocumentAnalysis;

/// Analysis lifecycle of one uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl AnalysisStatus {
    /// Check if the file will not be analyzed again
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStatus::Completed | AnalysisStatus::Error)
    }
}

/// Result of the batch cohesion check for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThematicStatus {
    Unknown,
    Aligned,
    Outlier,
}

/// Raw uploaded bytes. Cheap to clone; never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct FilePayload {
    bytes: Arc<[u8]>,
    media_type: String,
}

impl FilePayload {
    pub fn new(bytes: impl Into<Arc<[u8]>>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for FilePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePayload")
            .field("len", &self.bytes.len())
            .field("media_type", &self.media_type)
            .finish()
    }
}

/// One uploaded document and everything learned about it.
///
/// Status fields are private so that `result` is set iff the file is
/// completed, `error` iff it failed, and `outlier_reason` only for outliers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedFile {
    pub id: Uuid,
    pub file_name: String,
    #[serde(skip)]
    pub payload: Option<FilePayload>,
    status: AnalysisStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<DocumentAnalysis>,
    thematic_status: ThematicStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    outlier_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl AnalyzedFile {
    /// A freshly uploaded file waiting for analysis
    pub fn pending(file_name: impl Into<String>, payload: FilePayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            payload: Some(payload),
            status: AnalysisStatus::Pending,
            result: None,
            thematic_status: ThematicStatus::Unknown,
            outlier_reason: None,
            error: None,
        }
    }

    pub fn status(&self) -> AnalysisStatus {
        self.status
    }

    pub fn result(&self) -> Option<&DocumentAnalysis> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn thematic_status(&self) -> ThematicStatus {
        self.thematic_status
    }

    pub fn outlier_reason(&self) -> Option<&str> {
        self.outlier_reason.as_deref()
    }

    pub fn is_completed(&self) -> bool {
        self.status == AnalysisStatus::Completed
    }

    /// Completed and not flagged as a thematic outlier
    pub fn is_eligible(&self) -> bool {
        self.is_completed() && self.thematic_status != ThematicStatus::Outlier
    }

    /// Display title: the extracted title when known, else the file name
    pub fn display_title(&self) -> &str {
        self.result
            .as_ref()
            .map(|r| r.title.as_str())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.file_name)
    }

    pub fn mark_processing(&mut self) {
        self.status = AnalysisStatus::Processing;
        self.result = None;
        self.error = None;
    }

    pub fn mark_completed(&mut self, result: DocumentAnalysis) {
        self.status = AnalysisStatus::Completed;
        self.result = Some(result);
        self.error = None;
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = AnalysisStatus::Error;
        self.result = None;
        self.error = Some(message.into());
    }

    pub fn mark_aligned(&mut self) {
        self.thematic_status = ThematicStatus::Aligned;
        self.outlier_reason = None;
    }

    pub fn mark_outlier(&mut self, reason: impl Into<String>) {
        self.thematic_status = ThematicStatus::Outlier;
        self.outlier_reason = Some(reason.into());
    }

    /// Copy of this record without the raw bytes
    pub fn without_payload(&self) -> Self {
        Self {
            payload: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CitationData, LiteratureType};

    fn analysis(title: &str) -> DocumentAnalysis {
        DocumentAnalysis {
            title: title.into(),
            summary: "summary".into(),
            key_points: vec!["point".into()],
            citation: CitationData {
                title: title.into(),
                journal: None,
                year: None,
                authors: vec![],
                literature_type: LiteratureType::Other,
                main_topic: "Topic".into(),
            },
            thematic_tags: vec![],
        }
    }

    fn pending() -> AnalyzedFile {
        AnalyzedFile::pending("paper.pdf", FilePayload::new(b"%PDF-1.7".to_vec(), "application/pdf"))
    }

    #[test]
    fn test_pending_file_defaults() {
        let file = pending();
        assert_eq!(file.status(), AnalysisStatus::Pending);
        assert_eq!(file.thematic_status(), ThematicStatus::Unknown);
        assert!(file.result().is_none());
        assert!(file.error().is_none());
    }

    #[test]
    fn test_result_present_only_when_completed() {
        let mut file = pending();
        file.mark_processing();
        assert!(file.result().is_none());

        file.mark_completed(analysis("Title"));
        assert!(file.result().is_some());
        assert!(file.error().is_none());

        file.mark_failed("boom");
        assert!(file.result().is_none());
        assert_eq!(file.error(), Some("boom"));
    }

    #[test]
    fn test_outlier_reason_cleared_when_aligned() {
        let mut file = pending();
        file.mark_completed(analysis("Title"));
        file.mark_outlier("different field");
        assert!(!file.is_eligible());
        assert_eq!(file.outlier_reason(), Some("different field"));

        file.mark_aligned();
        assert!(file.is_eligible());
        assert!(file.outlier_reason().is_none());
    }

    #[test]
    fn test_payload_is_not_serialized() {
        let file = pending();
        let json = serde_json::to_value(&file).unwrap();
        assert!(json.get("payload").is_none());
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["thematicStatus"], "UNKNOWN");

        let restored: AnalyzedFile = serde_json::from_value(json).unwrap();
        assert!(restored.payload.is_none());
        assert_eq!(restored, file.without_payload());
    }

    #[test]
    fn test_display_title_falls_back_to_file_name() {
        let mut file = pending();
        assert_eq!(file.display_title(), "paper.pdf");
        file.mark_completed(analysis("Deep Sea Vents"));
        assert_eq!(file.display_title(), "Deep Sea Vents");
    }
}
