//! Project workspace

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AnalysisStatus, AnalyzedFile, ChatMessage, OutlierReport};

/// A named workspace of uploaded documents and the conversation about them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub nickname: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub files: Vec<AnalyzedFile>,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    /// Set by a successful outlier pass, cleared whenever files are added
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_description: Option<String>,
}

/// Lightweight listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub id: Uuid,
    pub nickname: String,
    pub created_at: DateTime<Utc>,
    pub file_count: usize,
    pub completed_count: usize,
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_description: Option<String>,
}

/// Stored dashboard colour scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    Light,
    Dark,
}

impl Project {
    pub fn new(nickname: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            nickname: nickname.into(),
            created_at: Utc::now(),
            files: Vec::new(),
            chat_history: Vec::new(),
            theme_description: None,
        }
    }

    /// Append newly uploaded files and invalidate the current theme.
    ///
    /// Returns the number of files appended. An empty batch changes nothing.
    pub fn add_files(&mut self, files: Vec<AnalyzedFile>) -> usize {
        if files.is_empty() {
            return 0;
        }
        let added = files.len();
        self.files.extend(files);
        self.theme_description = None;
        added
    }

    /// First pending file in stored order
    pub fn next_pending_mut(&mut self) -> Option<&mut AnalyzedFile> {
        self.files
            .iter_mut()
            .find(|f| f.status() == AnalysisStatus::Pending)
    }

    pub fn file(&self, file_id: Uuid) -> Option<&AnalyzedFile> {
        self.files.iter().find(|f| f.id == file_id)
    }

    pub fn file_mut(&mut self, file_id: Uuid) -> Option<&mut AnalyzedFile> {
        self.files.iter_mut().find(|f| f.id == file_id)
    }

    pub fn completed_files(&self) -> impl Iterator<Item = &AnalyzedFile> {
        self.files.iter().filter(|f| f.is_completed())
    }

    pub fn completed_count(&self) -> usize {
        self.completed_files().count()
    }

    pub fn count_with_status(&self, status: AnalysisStatus) -> usize {
        self.files.iter().filter(|f| f.status() == status).count()
    }

    /// No file is pending or processing
    pub fn is_settled(&self) -> bool {
        self.files.iter().all(|f| f.status().is_terminal())
    }

    /// Stamp every completed file from a cohesion check and record the theme.
    ///
    /// Prior stamps are overwritten, not merged.
    pub fn apply_outlier_report(&mut self, report: &OutlierReport) {
        for file in self.files.iter_mut().filter(|f| f.is_completed()) {
            match report.reason_for(&file.file_name) {
                Some(reason) => file.mark_outlier(reason),
                None => file.mark_aligned(),
            }
        }
        self.theme_description = Some(report.main_theme.clone());
    }

    pub fn push_message(&mut self, message: ChatMessage) {
        self.chat_history.push(message);
    }

    /// Copy of the project with every file's raw bytes dropped
    pub fn without_payloads(&self) -> Self {
        Self {
            id: self.id,
            nickname: self.nickname.clone(),
            created_at: self.created_at,
            files: self.files.iter().map(AnalyzedFile::without_payload).collect(),
            chat_history: self.chat_history.clone(),
            theme_description: self.theme_description.clone(),
        }
    }

    pub fn summary(&self) -> ProjectSummary {
        ProjectSummary {
            id: self.id,
            nickname: self.nickname.clone(),
            created_at: self.created_at,
            file_count: self.files.len(),
            completed_count: self.completed_count(),
            message_count: self.chat_history.len(),
            theme_description: self.theme_description.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CitationData, DocumentAnalysis, FilePayload, LiteratureType, Outlier, ThematicStatus,
    };

    fn pdf(name: &str) -> AnalyzedFile {
        AnalyzedFile::pending(name, FilePayload::new(b"%PDF".to_vec(), "application/pdf"))
    }

    fn analysis(topic: &str) -> DocumentAnalysis {
        DocumentAnalysis {
            title: format!("A study of {}", topic),
            summary: String::new(),
            key_points: vec![],
            citation: CitationData {
                title: format!("A study of {}", topic),
                journal: None,
                year: None,
                authors: vec![],
                literature_type: LiteratureType::PrimaryResearch,
                main_topic: topic.into(),
            },
            thematic_tags: vec![],
        }
    }

    #[test]
    fn test_add_files_resets_theme() {
        let mut project = Project::new("Reefs");
        project.theme_description = Some("Marine biology".into());

        assert_eq!(project.add_files(vec![pdf("a.pdf"), pdf("b.pdf")]), 2);
        assert!(project.theme_description.is_none());
        assert_eq!(project.count_with_status(AnalysisStatus::Pending), 2);
    }

    #[test]
    fn test_empty_batch_keeps_theme() {
        let mut project = Project::new("Reefs");
        project.theme_description = Some("Marine biology".into());
        assert_eq!(project.add_files(Vec::new()), 0);
        assert_eq!(project.theme_description.as_deref(), Some("Marine biology"));
    }

    #[test]
    fn test_next_pending_follows_stored_order() {
        let mut project = Project::new("Order");
        project.add_files(vec![pdf("first.pdf"), pdf("second.pdf")]);

        let first = project.next_pending_mut().unwrap();
        assert_eq!(first.file_name, "first.pdf");
        first.mark_processing();

        assert_eq!(project.next_pending_mut().unwrap().file_name, "second.pdf");
        assert!(!project.is_settled());
    }

    #[test]
    fn test_apply_outlier_report_overwrites_previous_stamps() {
        let mut project = Project::new("Reefs");
        project.add_files(vec![pdf("reef.pdf"), pdf("tax.pdf"), pdf("broken.pdf")]);
        project.files[0].mark_completed(analysis("Marine biology"));
        project.files[1].mark_completed(analysis("Tax law"));
        project.files[2].mark_failed("unreadable");
        project.files[0].mark_outlier("stale stamp");

        project.apply_outlier_report(&OutlierReport {
            main_theme: "Marine biology".into(),
            outliers: vec![Outlier {
                filename: "tax.pdf".into(),
                reason: "Legal field".into(),
            }],
        });

        assert_eq!(project.files[0].thematic_status(), ThematicStatus::Aligned);
        assert_eq!(project.files[1].thematic_status(), ThematicStatus::Outlier);
        assert_eq!(project.files[1].outlier_reason(), Some("Legal field"));
        assert_eq!(project.files[2].thematic_status(), ThematicStatus::Unknown);
        assert_eq!(project.theme_description.as_deref(), Some("Marine biology"));
    }

    #[test]
    fn test_summary_counts() {
        let mut project = Project::new("Counts");
        project.add_files(vec![pdf("a.pdf"), pdf("b.pdf")]);
        project.files[0].mark_completed(analysis("x"));
        project.push_message(ChatMessage::user("hi"));

        let summary = project.summary();
        assert_eq!(summary.file_count, 2);
        assert_eq!(summary.completed_count, 1);
        assert_eq!(summary.message_count, 1);
    }
}
