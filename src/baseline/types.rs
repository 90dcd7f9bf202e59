//! Baseline records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactKind;

/// the commit an artifact was at when the baseline was taken
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactCommit {
    pub commit_hash: String,
    pub artifact_type: ArtifactKind,
}

/// A named snapshot pinning every live artifact to a commit.
///
/// Stored as `baselines/{id}.json`, next to an annotated tag at the history
/// tip at the time it was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Baseline {
    pub id: String,
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub tag: String,
    /// keyed by artifact id
    pub artifact_commits: BTreeMap<String, ArtifactCommit>,
}

/// What to do with a live artifact that was never committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingHistoryPolicy {
    /// leave it out of the baseline
    #[default]
    Omit,
    /// refuse to create the baseline
    Fail,
}
