//! PaperLens Common Library
//!
//! Shared code for the PaperLens services including:
//! - Project, file and chat data model
//! - Hosted model client abstraction (Gemini + mock)
//! - Retry with exponential backoff for transient provider errors
//! - Analysis adapters (document extraction, outlier detection, chat, report)
//! - Project store backends
//! - Error types, configuration, and metrics

pub mod config;
pub mod context;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod retry;
pub mod store;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, LlmError, Result, StoreError};
pub use llm::ModelClient;
pub use store::ProjectStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default model used for per-document extraction
pub const DEFAULT_EXTRACTION_MODEL: &str = "gemini-2.5-flash";

/// Default model used for chat, outlier detection and report synthesis
pub const DEFAULT_SYNTHESIS_MODEL: &str = "gemini-2.5-pro";
