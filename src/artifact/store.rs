//! Artifact CRUD over the repository's working tree.
//!
//! Nothing here commits. Every write lands in the working tree and shows up
//! in [`GitRepository::status`] until the pending-changes layer commits it.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::artifact::counter::{IdAllocator, COUNTERS_DIR};
use crate::artifact::error::{ArtifactError, ArtifactResult};
use crate::artifact::format;
use crate::artifact::kind::ArtifactKind;
use crate::artifact::record::{Artifact, ArtifactDraft, ArtifactId, ArtifactPatch};
use crate::storage::{CommitId, CommitInfo, GitRepository};

/// folders that hold non-artifact workspace data
pub const ASSETS_DIR: &str = "assets";
pub const SAVED_FILTERS_DIR: &str = "saved-filters";
pub const BASELINES_DIR: &str = "baselines";

/// Typed access to every artifact in a workspace.
///
/// Clone this to share across tasks - it uses Arc internally.
#[derive(Clone)]
pub struct ArtifactStore {
    repo: GitRepository,
    ids: Arc<IdAllocator>,
}

impl ArtifactStore {
    pub fn new(repo: GitRepository) -> Self {
        Self {
            repo,
            ids: Arc::new(IdAllocator::new()),
        }
    }

    pub fn repository(&self) -> &GitRepository {
        &self.repo
    }

    /// create the type folders and the auxiliary data folders
    pub async fn init_layout(&self) -> ArtifactResult<()> {
        let kinds = ArtifactKind::ALL.iter().map(|k| k.folder());
        let extra = [ASSETS_DIR, COUNTERS_DIR, SAVED_FILTERS_DIR, BASELINES_DIR];
        for dir in kinds.chain(extra) {
            self.repo.create_dir(dir).await?;
        }
        Ok(())
    }

    // ==================== Read ====================

    /// Load one artifact from the working tree.
    pub async fn get(&self, id: &ArtifactId) -> ArtifactResult<Artifact> {
        match self.repo.read_file(&id.path()).await {
            Ok(bytes) => format::decode(*id, &bytes),
            Err(e) if e.is_not_found() => Err(ArtifactError::NotFound(*id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Like [`get`](Self::get), but a missing file is `None`.
    pub async fn find(&self, id: &ArtifactId) -> ArtifactResult<Option<Artifact>> {
        match self.get(id).await {
            Ok(artifact) => Ok(Some(artifact)),
            Err(ArtifactError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Every artifact of `kind`, deleted ones included, sorted by id.
    ///
    /// Files that don't belong or don't decode are skipped.
    pub async fn list(&self, kind: ArtifactKind) -> ArtifactResult<Vec<Artifact>> {
        let suffix = format!(".{}", kind.extension());
        let mut out = Vec::new();
        for name in self.repo.list_dir(kind.folder()).await? {
            let Some(id) = name
                .strip_suffix(suffix.as_str())
                .and_then(|stem| ArtifactId::parse(stem).ok())
                .filter(|id| id.kind() == kind)
            else {
                debug!(folder = kind.folder(), %name, "skipping foreign file");
                continue;
            };
            match self.get(&id).await {
                Ok(artifact) => out.push(artifact),
                Err(e @ ArtifactError::CorruptedRecord { .. }) => {
                    warn!(%id, error = %e, "skipping unreadable record");
                }
                // removed between readdir and read
                Err(ArtifactError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        out.sort_by_key(|a| a.id);
        Ok(out)
    }

    /// artifacts of `kind` that are not soft-deleted
    pub async fn list_live(&self, kind: ArtifactKind) -> ArtifactResult<Vec<Artifact>> {
        let mut all = self.list(kind).await?;
        all.retain(|a| !a.is_deleted());
        Ok(all)
    }

    /// live artifacts of every kind, kind by kind
    pub async fn list_all_live(&self) -> ArtifactResult<Vec<Artifact>> {
        let mut out = Vec::new();
        for kind in ArtifactKind::ALL {
            out.extend(self.list_live(kind).await?);
        }
        Ok(out)
    }

    // ==================== Write ====================

    /// Create a new artifact with the next id of its kind.
    pub async fn create(&self, kind: ArtifactKind, draft: ArtifactDraft) -> ArtifactResult<Artifact> {
        let id = self.ids.allocate(&self.repo, kind).await?;
        let artifact = Artifact::new(id, draft, Utc::now());
        self.save(&artifact).await?;
        info!(%id, "created artifact");
        Ok(artifact)
    }

    /// Merge `patch` into the stored record and bump its revision.
    pub async fn update(&self, id: &ArtifactId, patch: ArtifactPatch) -> ArtifactResult<Artifact> {
        let mut artifact = self.get(id).await?;
        artifact.apply(patch, Utc::now());
        self.save(&artifact).await?;
        debug!(%id, revision = %artifact.revision, "updated artifact");
        Ok(artifact)
    }

    /// Mark deleted; the file stays in place.
    pub async fn soft_delete(&self, id: &ArtifactId) -> ArtifactResult<Artifact> {
        let mut artifact = self.get(id).await?;
        if !artifact.is_deleted() {
            artifact.mark_deleted(Utc::now());
            self.save(&artifact).await?;
            info!(%id, "soft-deleted artifact");
        }
        Ok(artifact)
    }

    pub async fn restore(&self, id: &ArtifactId) -> ArtifactResult<Artifact> {
        let mut artifact = self.get(id).await?;
        if artifact.is_deleted() {
            artifact.restore(Utc::now());
            self.save(&artifact).await?;
            info!(%id, "restored artifact");
        }
        Ok(artifact)
    }

    /// Remove the file and drop every reference to it.
    ///
    /// Returns the records that referenced `id`; each got a revision bump.
    /// The kind's counter is raised to `id` so the number is never reissued.
    pub async fn permanent_delete(&self, id: &ArtifactId) -> ArtifactResult<Vec<Artifact>> {
        match self.repo.remove_file(&id.path()).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Err(ArtifactError::NotFound(*id)),
            Err(e) => return Err(e.into()),
        }
        info!(%id, "permanently deleted artifact");
        self.ids.retire(&self.repo, *id).await?;

        let now = Utc::now();
        let mut affected = Vec::new();
        for kind in ArtifactKind::ALL {
            for mut other in self.list(kind).await? {
                let Some(patch) = other.without_reference(id) else {
                    continue;
                };
                other.apply(patch, now);
                self.save(&other).await?;
                debug!(id = %other.id, removed = %id, "dropped reference");
                affected.push(other);
            }
        }
        Ok(affected)
    }

    async fn save(&self, artifact: &Artifact) -> ArtifactResult<()> {
        let bytes = format::encode(artifact)?;
        self.repo.write_file(&artifact.path(), &bytes).await?;
        Ok(())
    }

    // ==================== History ====================

    /// Commits that touched this artifact's file, newest first.
    pub async fn history(&self, id: &ArtifactId) -> ArtifactResult<Vec<CommitInfo>> {
        Ok(self.repo.history(&id.path()).await?)
    }

    /// The record as it was stored at `commit`.
    pub async fn load_at(&self, id: &ArtifactId, commit: CommitId) -> ArtifactResult<Artifact> {
        match self.repo.read_file_at(commit, &id.path()).await {
            Ok(bytes) => format::decode(*id, &bytes),
            Err(e) if e.is_not_found() => Err(ArtifactError::NotFound(*id)),
            Err(e) => Err(e.into()),
        }
    }
}
