//! Per-kind id counters.
//!
//! The next id is one past the highest number in use: the files in the
//! kind's folder, ids already handed out by this process, and the floor in
//! `counters/{folder}.json`. Creating an artifact leaves the counter file
//! alone, so a new record is the only pending path it produces. The floor
//! is written when a file is permanently deleted, which keeps its number
//! from ever coming back.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::artifact::error::{ArtifactError, ArtifactResult};
use crate::artifact::kind::ArtifactKind;
use crate::artifact::record::ArtifactId;
use crate::storage::{GitRepository, RepoPath};

/// folder holding the counter files
pub const COUNTERS_DIR: &str = "counters";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CounterFile {
    last_number: u32,
}

pub fn counter_path(kind: ArtifactKind) -> RepoPath {
    RepoPath::from_trusted(format!("{}/{}.json", COUNTERS_DIR, kind.folder()))
}

/// Hands out monotonic ids, one allocation at a time.
#[derive(Debug, Default)]
pub struct IdAllocator {
    /// highest number issued per kind since startup
    issued: Mutex<HashMap<ArtifactKind, u32>>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// reserve the next id for `kind`
    pub async fn allocate(&self, repo: &GitRepository, kind: ArtifactKind) -> ArtifactResult<ArtifactId> {
        let mut issued = self.issued.lock().await;

        let floor = read_floor(repo, kind).await?;
        let highest = highest_existing(repo, kind).await?;
        let previous = issued.get(&kind).copied().unwrap_or(0);

        let number = floor.max(highest).max(previous) + 1;
        issued.insert(kind, number);

        let id = ArtifactId::new(kind, number);
        debug!(%id, "allocated id");
        Ok(id)
    }

    /// Raise the counter floor to `id` once its file is gone.
    pub async fn retire(&self, repo: &GitRepository, id: ArtifactId) -> ArtifactResult<()> {
        let mut issued = self.issued.lock().await;
        let kind = id.kind();
        let entry = issued.entry(kind).or_insert(0);
        *entry = (*entry).max(id.number());

        if read_floor(repo, kind).await? >= id.number() {
            return Ok(());
        }
        let path = counter_path(kind);
        let bytes = serde_json::to_vec_pretty(&CounterFile { last_number: id.number() })
            .map_err(|e| ArtifactError::corrupted(path.as_str(), e))?;
        repo.write_file(&path, &bytes).await?;
        debug!(%id, "raised counter floor");
        Ok(())
    }
}

async fn read_floor(repo: &GitRepository, kind: ArtifactKind) -> ArtifactResult<u32> {
    let path = counter_path(kind);
    match repo.read_file(&path).await {
        Ok(bytes) => Ok(serde_json::from_slice::<CounterFile>(&bytes)
            .map_err(|e| ArtifactError::corrupted(path.as_str(), e))?
            .last_number),
        Err(e) if e.is_not_found() => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// largest number among the kind's files on disk
async fn highest_existing(repo: &GitRepository, kind: ArtifactKind) -> ArtifactResult<u32> {
    let suffix = format!(".{}", kind.extension());
    let highest = repo
        .list_dir(kind.folder())
        .await?
        .iter()
        .filter_map(|name| name.strip_suffix(suffix.as_str()))
        .filter_map(|stem| ArtifactId::parse(stem).ok())
        .filter(|id| id.kind() == kind)
        .map(|id| id.number())
        .max()
        .unwrap_or(0);
    Ok(highest)
}
