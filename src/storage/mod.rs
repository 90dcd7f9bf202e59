//! storage layer for reqtrace
//!
//! this module is a small git implementation that runs entirely on top of a
//! [`StorageAdapter`](crate::fs::StorageAdapter). The upper layers (artifact
//! store, pending changes, baselines) use this API and never touch objects
//! or refs directly.
//!
//!  # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     GitRepository                           │
//! │  (working files, single-path commits, status, history, tags)│
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌──────────────┬──────┴───────┬──────────────┐
//!        ▼              ▼              ▼              ▼
//!  ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//!  │   tree   │   │  commit  │   │   refs   │   │ worktree │
//!  │ (dirs)   │   │(history) │   │(HEAD,tag)│   │ (status) │
//!  └──────────┘   └──────────┘   └──────────┘   └──────────┘
//!        │              │              │
//!        └──────────────┼──────────────┘
//!                       ▼
//!                ┌─────────────┐       ┌─────────────┐
//!                │   object    │       │    index    │
//!                │ (loose, zlib)│      │  (mirror)   │
//!                └─────────────┘       └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use reqtrace::fs::MemoryAdapter;
//! use reqtrace::storage::{GitRepository, GitSignature, RepoPath};
//!
//! let repo = GitRepository::init(Arc::new(MemoryAdapter::new()), GitSignature::reqtrace()).await?;
//!
//! let path = RepoPath::new("requirements/REQ-001.md")?;
//! repo.write_file(&path, b"...").await?;
//! assert_eq!(repo.status().await?.len(), 1);
//!
//! repo.stage_and_commit_path(&path, "First commit", None).await?;
//! assert!(repo.status().await?.is_empty());
//! ```

mod commit;
mod error;
mod index;
mod object;
mod refs;
mod repository;
mod tree;
mod types;
mod worktree;

// Re-export public API
pub use commit::{CommitInfo, CommitMessage};
pub use error::{StorageError, StorageResult};
pub use refs::TagInfo;
pub use repository::GitRepository;
pub use types::{
    BlobId, BranchName, CommitId, FileStatus, GitSignature, InvalidNameError, ObjectId, RepoPath,
    StatusEntry, TagName, TreeId,
};
