//! Structured results produced by the hosted model

use serde::{Deserialize, Serialize};

/// Theme reported when too few documents are analyzed for a cohesion check
pub const INSUFFICIENT_FILES_THEME: &str = "Insufficient files for cohesion check";

/// Metadata extracted from one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAnalysis {
    pub title: String,
    pub summary: String,
    pub key_points: Vec<String>,
    pub citation: CitationData,
    pub thematic_tags: Vec<String>,
}

/// Literature classification of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiteratureType {
    #[serde(rename = "Primary Research")]
    PrimaryResearch,
    #[serde(rename = "Review Article")]
    ReviewArticle,
    #[serde(rename = "Other")]
    Other,
}

impl LiteratureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiteratureType::PrimaryResearch => "Primary Research",
            LiteratureType::ReviewArticle => "Review Article",
            LiteratureType::Other => "Other",
        }
    }
}

/// Bibliographic data attached to a document analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationData {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    pub authors: Vec<String>,
    pub literature_type: LiteratureType,
    /// Scientific field label used by the outlier pass
    pub main_topic: String,
}

impl CitationData {
    /// Render an APA-style reference line.
    ///
    /// ```
    /// use paperlens_common::models::{CitationData, LiteratureType};
    ///
    /// let citation = CitationData {
    ///     title: "Soil microbes and drought".into(),
    ///     journal: Some("Ecology Letters".into()),
    ///     year: Some("2021".into()),
    ///     authors: vec!["Smith, J.".into(), "Doe, A.".into()],
    ///     literature_type: LiteratureType::PrimaryResearch,
    ///     main_topic: "Soil ecology".into(),
    /// };
    /// assert_eq!(
    ///     citation.format_reference(),
    ///     "Smith, J. & Doe, A. (2021). Soil microbes and drought. Ecology Letters."
    /// );
    /// ```
    pub fn format_reference(&self) -> String {
        let authors = match self.authors.as_slice() {
            [] => "Unknown author".to_string(),
            [only] => only.clone(),
            [first, second] => format!("{} & {}", first, second),
            [leading @ .., last] if leading.len() < 5 => {
                format!("{}, & {}", leading.join(", "), last)
            }
            [first, ..] => format!("{} et al.", first),
        };

        let year = self
            .year
            .as_deref()
            .map(str::trim)
            .filter(|y| !y.is_empty())
            .unwrap_or("n.d.");

        let title = self.title.trim().trim_end_matches('.');
        let mut reference = format!("{} ({}). {}.", authors, year, title);
        if let Some(journal) = self.journal.as_deref().map(str::trim).filter(|j| !j.is_empty()) {
            reference.push(' ');
            reference.push_str(journal.trim_end_matches('.'));
            reference.push('.');
        }
        reference
    }
}

/// One document flagged as thematically divergent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outlier {
    pub filename: String,
    pub reason: String,
}

/// Result of a batch cohesion check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlierReport {
    pub main_theme: String,
    pub outliers: Vec<Outlier>,
}

impl OutlierReport {
    /// The defined no-op result for batches below the cohesion threshold
    pub fn insufficient() -> Self {
        Self {
            main_theme: INSUFFICIENT_FILES_THEME.to_string(),
            outliers: Vec::new(),
        }
    }

    /// Reason recorded for a file name, if it was flagged
    pub fn reason_for(&self, file_name: &str) -> Option<&str> {
        let wanted = file_name.trim();
        self.outliers
            .iter()
            .find(|o| o.filename.trim() == wanted)
            .or_else(|| {
                self.outliers
                    .iter()
                    .find(|o| o.filename.trim().eq_ignore_ascii_case(wanted))
            })
            .map(|o| o.reason.as_str())
    }
}

/// A reading suggested by gap analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedReading {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub reason: String,
}

/// Research gap identified next to a chat answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapAnalysis {
    pub identified_gap: String,
    pub recommended_readings: Vec<RecommendedReading>,
    pub future_direction: String,
}

/// Synthesized report assembled from the chat answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
    pub background: String,
    pub methods: String,
    pub results: String,
    pub discussion: String,
    pub references: Vec<String>,
}
