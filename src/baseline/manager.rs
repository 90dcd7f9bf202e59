//! Baseline manager.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::artifact::{ArtifactStore, BASELINES_DIR};
use crate::baseline::error::{BaselineError, BaselineResult};
use crate::baseline::types::{ArtifactCommit, Baseline, MissingHistoryPolicy};
use crate::storage::{CommitMessage, RepoPath, TagName};

/// Creates, lists and deletes baselines.
#[derive(Clone)]
pub struct BaselineManager {
    store: ArtifactStore,
    policy: MissingHistoryPolicy,
}

impl BaselineManager {
    pub fn new(store: ArtifactStore, policy: MissingHistoryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> MissingHistoryPolicy {
        self.policy
    }

    /// Pin every live artifact to its newest commit and tag the history tip.
    ///
    /// The record is written to the working tree; committing it is up to
    /// the caller. The tag goes last, so a failed attempt leaves neither
    /// behind and can be retried with the same version.
    pub async fn create_baseline(&self, name: &str, description: &str, version: &str) -> BaselineResult<Baseline> {
        let mut artifact_commits = BTreeMap::new();
        for artifact in self.store.list_all_live().await? {
            let history = self.store.history(&artifact.id).await?;
            match history.first() {
                Some(latest) => {
                    artifact_commits.insert(
                        artifact.id.to_string(),
                        ArtifactCommit {
                            commit_hash: latest.id.to_string(),
                            artifact_type: artifact.kind(),
                        },
                    );
                }
                None => match self.policy {
                    MissingHistoryPolicy::Omit => {
                        debug!(id = %artifact.id, "omitting uncommitted artifact from baseline");
                    }
                    MissingHistoryPolicy::Fail => return Err(BaselineError::MissingHistory(artifact.id)),
                },
            }
        }

        let tag = TagName::sanitized(&format!("baseline-{}", version))?;
        let repo = self.store.repository();

        let baseline = Baseline {
            id: Ulid::new().to_string(),
            version: version.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            timestamp: Utc::now(),
            tag: tag.to_string(),
            artifact_commits,
        };
        let bytes = serde_json::to_vec_pretty(&baseline).map_err(|e| BaselineError::Corrupted {
            id: baseline.id.clone(),
            reason: e.to_string(),
        })?;
        let path = baseline_path(&baseline.id)?;
        repo.write_file(&path, &bytes).await?;

        if let Err(e) = repo.create_tag(&tag, &CommitMessage::baseline_tag(name, version)).await {
            if let Err(cleanup) = repo.remove_file(&path).await {
                warn!(%path, error = %cleanup, "could not remove orphaned baseline record");
            }
            return Err(e.into());
        }

        info!(
            id = %baseline.id,
            %tag,
            artifacts = baseline.artifact_commits.len(),
            "created baseline"
        );
        Ok(baseline)
    }

    /// Remove the record; the tag is kept.
    pub async fn delete_baseline(&self, id: &str) -> BaselineResult<()> {
        let path = baseline_path(id)?;
        match self.store.repository().remove_file(&path).await {
            Ok(()) => {
                info!(%id, "deleted baseline");
                Ok(())
            }
            Err(e) if e.is_not_found() => Err(BaselineError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_baseline(&self, id: &str) -> BaselineResult<Baseline> {
        let path = baseline_path(id)?;
        let bytes = match self.store.repository().read_file(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Err(BaselineError::NotFound(id.to_string())),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|e| BaselineError::Corrupted {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    /// All readable baselines, oldest first.
    pub async fn list_baselines(&self) -> BaselineResult<Vec<Baseline>> {
        let mut out = Vec::new();
        for name in self.store.repository().list_dir(BASELINES_DIR).await? {
            let Some(id) = name.strip_suffix(".json") else {
                continue;
            };
            match self.get_baseline(id).await {
                Ok(baseline) => out.push(baseline),
                Err(e) => warn!(%id, error = %e, "skipping unreadable baseline"),
            }
        }
        out.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }
}

fn baseline_path(id: &str) -> BaselineResult<RepoPath> {
    if id.contains('/') {
        return Err(BaselineError::NotFound(id.to_string()));
    }
    Ok(RepoPath::join(BASELINES_DIR, &format!("{}.json", id))?)
}
