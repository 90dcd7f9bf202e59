//! Workspace API - high-level interface for reqtrace.

use std::sync::Arc;

use tracing::{info, warn};

use crate::artifact::{
    Artifact, ArtifactDraft, ArtifactId, ArtifactKind, ArtifactPatch, ArtifactStore,
};
use crate::baseline::{Baseline, BaselineManager};
use crate::fs::{DiskAdapter, StorageAdapter};
use crate::pending::{
    ChangeKey, ChangePath, CommitDispatch, CommitOutcome, ParsedPath, PendingChange,
    PendingChanges, PendingEvent,
};
use crate::storage::{CommitId, CommitInfo, GitRepository, StatusEntry, TagInfo};
use crate::workspace::config::WorkspaceConfig;
use crate::workspace::error::{WorkspaceError, WorkspaceResult};

/// The main workspace handle.
///
/// Only exists once the repository has been opened; every operation below
/// can assume a working repository.
#[derive(Clone)]
pub struct Workspace {
    config: WorkspaceConfig,
    repo: GitRepository,
    artifacts: ArtifactStore,
    pending: PendingChanges,
    baselines: BaselineManager,
}

impl Workspace {
    /// Open the workspace at `config.root` on disk.
    pub async fn open(config: WorkspaceConfig) -> WorkspaceResult<Self> {
        let adapter = Arc::new(DiskAdapter::new(config.root.clone()));
        Self::open_with_adapter(config, adapter).await
    }

    /// Open a workspace over any storage backend.
    pub async fn open_with_adapter(
        config: WorkspaceConfig,
        adapter: Arc<dyn StorageAdapter>,
    ) -> WorkspaceResult<Self> {
        let repo = match GitRepository::open_or_init(adapter, config.signature(), config.create_if_missing).await {
            Ok(repo) => repo,
            Err(e) => {
                warn!(root = %config.root.display(), error = %e, "repository init failed");
                return Err(WorkspaceError::RepositoryInit(e));
            }
        };

        let artifacts = ArtifactStore::new(repo.clone());
        if config.create_if_missing {
            artifacts.init_layout().await?;
        }
        let pending = PendingChanges::new(artifacts.clone(), config.refresh_debounce);
        let baselines = BaselineManager::new(artifacts.clone(), config.baseline_policy);
        info!(root = %config.root.display(), "opened workspace");

        Ok(Self {
            config,
            repo,
            artifacts,
            pending,
            baselines,
        })
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn repository(&self) -> &GitRepository {
        &self.repo
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn pending(&self) -> &PendingChanges {
        &self.pending
    }

    pub fn baselines(&self) -> &BaselineManager {
        &self.baselines
    }

    // ==================== Artifacts ====================

    pub async fn create(&self, kind: ArtifactKind, draft: ArtifactDraft) -> WorkspaceResult<Artifact> {
        Ok(self.artifacts.create(kind, draft).await?)
    }

    pub async fn get(&self, id: &ArtifactId) -> WorkspaceResult<Artifact> {
        Ok(self.artifacts.get(id).await?)
    }

    pub async fn list(&self, kind: ArtifactKind) -> WorkspaceResult<Vec<Artifact>> {
        Ok(self.artifacts.list(kind).await?)
    }

    pub async fn list_live(&self, kind: ArtifactKind) -> WorkspaceResult<Vec<Artifact>> {
        Ok(self.artifacts.list_live(kind).await?)
    }

    pub async fn update(&self, id: &ArtifactId, patch: ArtifactPatch) -> WorkspaceResult<Artifact> {
        Ok(self.artifacts.update(id, patch).await?)
    }

    pub async fn soft_delete(&self, id: &ArtifactId) -> WorkspaceResult<Artifact> {
        Ok(self.artifacts.soft_delete(id).await?)
    }

    pub async fn restore(&self, id: &ArtifactId) -> WorkspaceResult<Artifact> {
        Ok(self.artifacts.restore(id).await?)
    }

    /// Remove the file and scrub references; returns the records touched.
    pub async fn permanent_delete(&self, id: &ArtifactId) -> WorkspaceResult<Vec<Artifact>> {
        Ok(self.artifacts.permanent_delete(id).await?)
    }

    pub async fn history(&self, id: &ArtifactId) -> WorkspaceResult<Vec<CommitInfo>> {
        Ok(self.artifacts.history(id).await?)
    }

    pub async fn load_at(&self, id: &ArtifactId, commit: CommitId) -> WorkspaceResult<Artifact> {
        Ok(self.artifacts.load_at(id, commit).await?)
    }

    // ==================== Status & Commits ====================

    pub async fn status(&self) -> WorkspaceResult<Vec<StatusEntry>> {
        Ok(self.repo.status().await?)
    }

    /// The pending change a status path belongs to.
    pub fn change_for_path(&self, path: &str) -> WorkspaceResult<ChangeKey> {
        match ChangePath::parse(path) {
            ParsedPath::Recognized { category, id } => Ok(ChangeKey::new(category, id)),
            ParsedPath::Unrecognized { path, reason } => Err(WorkspaceError::MalformedStatusPath {
                path,
                reason: reason.to_string(),
            }),
        }
    }

    pub async fn refresh_pending(&self) -> WorkspaceResult<Vec<PendingChange>> {
        Ok(self.pending.refresh().await?)
    }

    pub fn set_draft(&self, key: &ChangeKey, message: impl Into<String>) -> WorkspaceResult<()> {
        Ok(self.pending.set_draft(key, message)?)
    }

    /// Dispatch a commit without waiting for it.
    ///
    /// `author` names the committer for this commit only; the configured
    /// author is used otherwise.
    pub fn commit(&self, key: &ChangeKey, author: Option<&str>) -> WorkspaceResult<CommitDispatch> {
        Ok(self.pending.commit(key, author)?)
    }

    /// Commit one change and wait for it to land.
    ///
    /// `message` replaces the draft when given.
    pub async fn commit_and_wait(
        &self,
        key: &ChangeKey,
        message: Option<&str>,
        author: Option<&str>,
    ) -> WorkspaceResult<CommitId> {
        if self.pending.get(key).is_none() {
            self.pending.refresh().await?;
        }
        if let Some(message) = message {
            self.pending.set_draft(key, message)?;
        }
        let mut events = self.pending.events();
        let outcome = match self.pending.commit(key, author)? {
            CommitDispatch::Dispatched(handle) => handle.await.map_err(|e| WorkspaceError::CommitFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?,
            CommitDispatch::AlreadyInFlight => loop {
                // wait for the running commit of this key to report
                match events.recv().await {
                    Ok(PendingEvent::Committed { key: k, commit }) if &k == key => {
                        break CommitOutcome::Committed(commit)
                    }
                    Ok(PendingEvent::CommitFailed { key: k, error }) if &k == key => {
                        break CommitOutcome::Failed(error)
                    }
                    Ok(_) => continue,
                    Err(e) => break CommitOutcome::Failed(e.to_string()),
                }
            },
        };
        match outcome {
            CommitOutcome::Committed(id) => Ok(id),
            CommitOutcome::Failed(reason) => Err(WorkspaceError::CommitFailed {
                key: key.to_string(),
                reason,
            }),
        }
    }

    /// Whole-repository history, newest first.
    pub async fn log(&self, limit: Option<usize>) -> WorkspaceResult<Vec<CommitInfo>> {
        Ok(self.repo.log(limit).await?)
    }

    pub async fn tags(&self) -> WorkspaceResult<Vec<TagInfo>> {
        Ok(self.repo.list_tags().await?)
    }

    // ==================== Baselines ====================

    pub async fn create_baseline(&self, name: &str, description: &str, version: &str) -> WorkspaceResult<Baseline> {
        let baseline = self.baselines.create_baseline(name, description, version).await?;
        self.pending.request_refresh();
        Ok(baseline)
    }

    pub async fn list_baselines(&self) -> WorkspaceResult<Vec<Baseline>> {
        Ok(self.baselines.list_baselines().await?)
    }

    pub async fn get_baseline(&self, id: &str) -> WorkspaceResult<Baseline> {
        Ok(self.baselines.get_baseline(id).await?)
    }

    pub async fn delete_baseline(&self, id: &str) -> WorkspaceResult<()> {
        self.baselines.delete_baseline(id).await?;
        self.pending.request_refresh();
        Ok(())
    }
}
