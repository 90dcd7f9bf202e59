//! reqtrace - version-controlled artifact storage
//!
//! Requirements, use cases, test cases and the other engineering artifacts
//! of a project live as one text file each in a directory that is also a
//! git repository. Every artifact is committed on its own, and baselines
//! pin the whole set to a tagged point in history.
//!
//! # Example
//!
//! ```no_run
//! use reqtrace::artifact::{ArtifactDraft, ArtifactKind};
//! use reqtrace::pending::ChangeKey;
//! use reqtrace::workspace::{Workspace, WorkspaceConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = WorkspaceConfig::new("./my_project").author("Ada", "ada@example.com");
//! let ws = Workspace::open(config).await?;
//! let login = ws
//!     .create(ArtifactKind::Requirement, ArtifactDraft::titled("Login"))
//!     .await?;
//! ws.commit_and_wait(&ChangeKey::artifact(login.id), None, None).await?;
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod baseline;
pub mod fs;
pub mod pending;
pub mod storage;
pub mod workspace;
