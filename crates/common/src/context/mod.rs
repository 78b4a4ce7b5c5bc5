//! Analysis adapters
//!
//! Each adapter turns one piece of PaperLens work into a hosted model call
//! made through the retry wrapper:
//! - Document analysis (per-file metadata extraction)
//! - Outlier detection (batch cohesion check)
//! - Question answering and gap analysis
//! - Report structuring

mod analyzer;
mod outlier;
pub mod prompts;
mod report;
mod synthesizer;

pub use analyzer::DocumentAnalyzer;
pub use outlier::{OutlierDetector, MIN_FILES_FOR_COHESION};
pub use report::ReportWriter;
pub use synthesizer::{
    Answer, Synthesizer, CHAT_FAILURE_MESSAGE, HISTORY_WINDOW, NO_ELIGIBLE_DOCUMENTS_MESSAGE,
};
