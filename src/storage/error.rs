//! Storage layer error types
//!
//! All errors that can occur inside the version-control engine are defined
//! here. We use `thiserror` for ergonomic error definition and better error
//! messages.

use thiserror::Error;

use crate::fs::FsError;
use crate::storage::types::InvalidNameError;

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// the storage adapter failed on a read or probe
    #[error("storage adapter error: {0}")]
    Adapter(#[from] FsError),

    /// the storage adapter rejected a write
    #[error("write to {path} failed: {source}")]
    Write {
        path: String,
        #[source]
        source: FsError,
    },

    /// a working-tree file does not exist
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// an object referenced by the repository is missing
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// an object or ref could not be decoded
    #[error("corrupted data at {path}: {reason}")]
    CorruptedData { path: String, reason: String },

    /// an object has a different type than the caller expected
    #[error("unexpected object type for {id}: expected {expected}, found {found}")]
    UnexpectedObjectKind {
        id: String,
        expected: String,
        found: String,
    },

    /// invalid path, tag or hash
    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// repo is not initialized
    #[error("repository not initialized at {0}")]
    NotInitialized(String),

    /// repo is empty (no commits)
    #[error("repository is empty: no commits found")]
    EmptyRepository,

    /// the commit was not found
    #[error("commit not found: {0}")]
    CommitNotFound(String),

    /// tag already exists
    #[error("tag already exists: {0}")]
    TagAlreadyExists(String),

    /// HEAD moved between reading it and writing the new commit
    #[error("concurrent modification: HEAD expected {expected}, found {found}")]
    ConcurrentModification { expected: String, found: String },

    /// the path does not differ from HEAD
    #[error("nothing to commit for {0}")]
    NothingToCommit(String),

    /// commits need a message
    #[error("commit message must not be empty")]
    EmptyCommitMessage,

    /// zlib stream failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// wrap an adapter failure that happened during a write
    pub(crate) fn write(path: impl Into<String>, source: FsError) -> Self {
        StorageError::Write {
            path: path.into(),
            source,
        }
    }

    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::FileNotFound(_)
            | StorageError::ObjectNotFound(_)
            | StorageError::CommitNotFound(_) => true,
            StorageError::Adapter(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// check if this error is a conflict
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::TagAlreadyExists(_) | StorageError::ConcurrentModification { .. }
        )
    }

    /// check if the backend refused to persist bytes
    pub fn is_write_failure(&self) -> bool {
        matches!(self, StorageError::Write { .. })
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
