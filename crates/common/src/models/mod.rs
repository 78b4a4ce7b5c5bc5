//! Data model
//!
//! Projects, their analyzed files and chat history, plus the structured
//! results the hosted model produces for them.

mod analysis;
mod chat;
mod file;
mod project;

pub use analysis::{
    CitationData, DocumentAnalysis, GapAnalysis, LiteratureType, Outlier, OutlierReport,
    RecommendedReading, ReportData, INSUFFICIENT_FILES_THEME,
};
pub use chat::{ChatMessage, ChatRole};
pub use file::{AnalysisStatus, AnalyzedFile, FilePayload, ThematicStatus};
pub use project::{Project, ProjectSummary, ThemePreference};
