//! PaperLens Report Export
//!
//! Renders a synthesized [`ReportData`](paperlens_common::models::ReportData)
//! into a paginated A4 PDF.

pub mod layout;
pub mod pdf;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use pdf::render_report_pdf;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to encode page content: {0}")]
    Content(String),

    #[error("Failed to write PDF: {0}")]
    Write(String),
}

/// Cover text for an exported report
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub title: String,
    pub subtitle: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl ExportOptions {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subtitle: None,
            generated_at: Utc::now(),
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }
}

impl From<ExportError> for paperlens_common::AppError {
    fn from(e: ExportError) -> Self {
        paperlens_common::AppError::Export {
            message: e.to_string(),
        }
    }
}
