//! Crate-level error taxonomy.

use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::baseline::BaselineError;
use crate::pending::PendingError;
use crate::storage::{InvalidNameError, StorageError};

pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// the repository could not be opened or created; nothing else can run
    #[error("repository init failed: {0}")]
    RepositoryInit(#[source] StorageError),

    /// a dispatched commit did not land
    #[error("commit of {key} failed: {reason}")]
    CommitFailed { key: String, reason: String },

    #[error("malformed status path {path}: {reason}")]
    MalformedStatusPath { path: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Pending(#[from] PendingError),

    #[error(transparent)]
    Baseline(#[from] BaselineError),
}

/// Coarse error classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    WriteFailure,
    CommitFailure,
    RepositoryInitFailure,
    MalformedStatusPath,
    Invalid,
}

fn classify_storage(e: &StorageError) -> ErrorClass {
    if e.is_not_found() {
        ErrorClass::NotFound
    } else if e.is_write_failure() {
        ErrorClass::WriteFailure
    } else {
        match e {
            StorageError::ConcurrentModification { .. }
            | StorageError::NothingToCommit(_)
            | StorageError::EmptyCommitMessage
            | StorageError::EmptyRepository
            | StorageError::TagAlreadyExists(_) => ErrorClass::CommitFailure,
            StorageError::NotInitialized(_) => ErrorClass::RepositoryInitFailure,
            _ => ErrorClass::Invalid,
        }
    }
}

impl WorkspaceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            WorkspaceError::RepositoryInit(_) => ErrorClass::RepositoryInitFailure,
            WorkspaceError::CommitFailed { .. } => ErrorClass::CommitFailure,
            WorkspaceError::MalformedStatusPath { .. } => ErrorClass::MalformedStatusPath,
            WorkspaceError::InvalidConfig(_) | WorkspaceError::InvalidName(_) => ErrorClass::Invalid,
            WorkspaceError::Storage(e) => classify_storage(e),
            WorkspaceError::Artifact(ArtifactError::Storage(e)) => classify_storage(e),
            WorkspaceError::Artifact(ArtifactError::NotFound(_)) => ErrorClass::NotFound,
            WorkspaceError::Artifact(_) => ErrorClass::Invalid,
            WorkspaceError::Pending(PendingError::UnknownChange(_)) => ErrorClass::NotFound,
            WorkspaceError::Pending(PendingError::EmptyMessage(_)) => ErrorClass::CommitFailure,
            WorkspaceError::Pending(PendingError::Storage(e)) => match classify_storage(e) {
                ErrorClass::NotFound => ErrorClass::NotFound,
                _ => ErrorClass::CommitFailure,
            },
            WorkspaceError::Baseline(e) if e.is_not_found() => ErrorClass::NotFound,
            WorkspaceError::Baseline(e) if e.is_write_failure() => ErrorClass::WriteFailure,
            WorkspaceError::Baseline(BaselineError::Storage(e)) => classify_storage(e),
            WorkspaceError::Baseline(_) => ErrorClass::Invalid,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactId, ArtifactKind};
    use crate::fs::FsError;

    #[test]
    fn test_classification() {
        let id = ArtifactId::new(ArtifactKind::Requirement, 1);
        let cases = [
            (WorkspaceError::Artifact(ArtifactError::NotFound(id)), ErrorClass::NotFound),
            (
                WorkspaceError::Storage(StorageError::write(
                    "requirements/REQ-001.md",
                    FsError::WriteRejected { path: "x".into(), reason: "ro".into() },
                )),
                ErrorClass::WriteFailure,
            ),
            (
                WorkspaceError::Pending(PendingError::Storage(StorageError::ConcurrentModification {
                    expected: "a".into(),
                    found: "b".into(),
                })),
                ErrorClass::CommitFailure,
            ),
            (
                WorkspaceError::RepositoryInit(StorageError::NotInitialized(".git".into())),
                ErrorClass::RepositoryInitFailure,
            ),
            (
                WorkspaceError::MalformedStatusPath { path: "x".into(), reason: "y".into() },
                ErrorClass::MalformedStatusPath,
            ),
            (WorkspaceError::InvalidConfig("bad".into()), ErrorClass::Invalid),
            (WorkspaceError::Baseline(BaselineError::MissingHistory(id)), ErrorClass::Invalid),
        ];
        for (err, class) in cases {
            assert_eq!(err.class(), class, "{err}");
        }
    }
}
