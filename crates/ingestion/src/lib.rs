//! PaperLens Ingestion
//!
//! Owns the project collection and drives document analysis:
//! 1. Uploaded PDFs are queued on the active project
//! 2. Pending files are analyzed one at a time, in upload order
//! 3. Settled batches get a single outlier re-evaluation

pub mod catalog;
pub mod errors;
pub mod queue;
pub mod upload;

pub use errors::IngestionError;
pub use queue::{AnalysisQueue, QueueEvent, QueueHandle};
pub use upload::{AddFilesOutcome, UploadedFile};
