use thiserror::Error;

use crate::artifact::{ArtifactError, ArtifactId};
use crate::storage::{InvalidNameError, StorageError};

#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("baseline not found: {0}")]
    NotFound(String),

    /// a live artifact has no commit to pin
    #[error("artifact {0} has never been committed")]
    MissingHistory(ArtifactId),

    #[error("corrupted baseline {id}: {reason}")]
    Corrupted { id: String, reason: String },

    #[error("invalid baseline name: {0}")]
    InvalidName(#[from] InvalidNameError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl BaselineError {
    pub fn is_not_found(&self) -> bool {
        match self {
            BaselineError::NotFound(_) => true,
            BaselineError::Artifact(e) => e.is_not_found(),
            BaselineError::Storage(e) => e.is_not_found(),
            _ => false,
        }
    }

    pub fn is_write_failure(&self) -> bool {
        match self {
            BaselineError::Artifact(e) => e.is_write_failure(),
            BaselineError::Storage(e) => e.is_write_failure(),
            _ => false,
        }
    }
}

pub type BaselineResult<T> = Result<T, BaselineError>;
