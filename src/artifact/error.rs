//! Artifact layer errors

use thiserror::Error;

use crate::artifact::record::ArtifactId;
use crate::storage::{InvalidNameError, StorageError};

#[derive(Debug, Error)]
pub enum ArtifactError {
    /// no file for this id
    #[error("artifact not found: {0}")]
    NotFound(ArtifactId),

    /// the file exists but does not decode to the record it should hold
    #[error("corrupted record at {path}: {reason}")]
    CorruptedRecord { path: String, reason: String },

    #[error("invalid artifact id: {0}")]
    InvalidId(#[from] InvalidNameError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ArtifactError {
    pub(crate) fn corrupted(path: impl Into<String>, reason: impl ToString) -> Self {
        ArtifactError::CorruptedRecord {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            ArtifactError::NotFound(_) => true,
            ArtifactError::Storage(e) => e.is_not_found(),
            _ => false,
        }
    }

    pub fn is_write_failure(&self) -> bool {
        matches!(self, ArtifactError::Storage(e) if e.is_write_failure())
    }
}

pub type ArtifactResult<T> = Result<T, ArtifactError>;
