//! Baselines: named snapshots of the whole workspace.
//!
//! A baseline records, for every live artifact, the hash of the newest
//! commit that touched it, and tags the history tip as
//! `baseline-{version}`.

mod error;
mod manager;
mod types;

pub use error::{BaselineError, BaselineResult};
pub use manager::BaselineManager;
pub use types::{ArtifactCommit, Baseline, MissingHistoryPolicy};
