//! Ingestion error types

use paperlens_common::errors::{AppError, StoreError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Project not found: {0}")]
    ProjectNotFound(Uuid),

    #[error("Project {0} is not the active project")]
    ProjectNotActive(Uuid),

    #[error("Analysis queue is not running")]
    QueueClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<IngestionError> for AppError {
    fn from(e: IngestionError) -> Self {
        match e {
            IngestionError::ProjectNotFound(id) => AppError::ProjectNotFound { id: id.to_string() },
            IngestionError::ProjectNotActive(id) => AppError::ProjectNotActive { id: id.to_string() },
            IngestionError::QueueClosed => AppError::QueueUnavailable {
                message: "analysis queue is not running".to_string(),
            },
            IngestionError::Io(err) => AppError::from(err),
            IngestionError::Store(err) => AppError::Store(err),
        }
    }
}
