//! Branch, HEAD and tag management.
//!
//! Refs are plain files holding a hex object name:
//! - `.git/HEAD` is symbolic and always reads `ref: refs/heads/main`
//! - `.git/refs/heads/main` is the tip of the single line of history
//! - `.git/refs/tags/<name>` points at an annotated tag object
//!
//! HEAD updates are compare-and-swap so a commit built on a stale parent is
//! never published.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::fs::StorageAdapter;
use crate::storage::commit::get_commit;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::object::{ObjectKind, ObjectStore};
use crate::storage::types::{BranchName, CommitId, GitSignature, ObjectId, TagName};

/// minimal config so stock git tooling accepts the directory
const DEFAULT_CONFIG: &str = "[core]\n\trepositoryformatversion = 0\n\tfilemode = false\n\tbare = false\n";

/// a tag with the details shown next to baselines
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagInfo {
    pub name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub target: String,
}

/// decoded annotated tag object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagObject {
    pub target: CommitId,
    pub name: TagName,
    pub tagger: GitSignature,
    pub when: DateTime<Utc>,
    pub message: String,
}

impl TagObject {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = format!(
            "object {}\ntype commit\ntag {}\ntagger {}\n\n{}",
            self.target,
            self.name,
            self.tagger.to_git_line(self.when),
            self.message
        );
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out.into_bytes()
    }

    pub fn decode(id: ObjectId, body: &[u8]) -> StorageResult<Self> {
        let corrupted = |reason: &str| StorageError::CorruptedData {
            path: format!("tag {}", id.short()),
            reason: reason.to_string(),
        };

        let text = std::str::from_utf8(body).map_err(|_| corrupted("tag is not utf-8"))?;
        let (headers, message) = text.split_once("\n\n").unwrap_or((text, ""));

        let mut target = None;
        let mut name = None;
        let mut tagger = GitSignature::reqtrace();
        let mut when = DateTime::<Utc>::UNIX_EPOCH;

        for line in headers.lines() {
            match line.split_once(' ') {
                Some(("object", value)) => target = Some(CommitId::from_hex(value)?),
                Some(("tag", value)) => name = Some(TagName::new(value)?),
                Some(("tagger", value)) => {
                    if let Some((sig, at)) = parse_tagger(value) {
                        tagger = sig;
                        when = at;
                    }
                }
                _ => {}
            }
        }

        Ok(Self {
            target: target.ok_or_else(|| corrupted("missing object"))?,
            name: name.ok_or_else(|| corrupted("missing tag name"))?,
            tagger,
            when,
            message: message.trim_end_matches('\n').to_string(),
        })
    }
}

fn parse_tagger(value: &str) -> Option<(GitSignature, DateTime<Utc>)> {
    let open = value.find('<')?;
    let close = value[open..].find('>')? + open;
    let secs: i64 = value[close + 1..].split_whitespace().next()?.parse().ok()?;
    Some((
        GitSignature::new(value[..open].trim_end(), &value[open + 1..close]),
        DateTime::<Utc>::from_timestamp(secs, 0)?,
    ))
}

/// Manages refs inside the git directory.
#[derive(Clone)]
pub struct RefManager {
    adapter: Arc<dyn StorageAdapter>,
    git_dir: String,
    branch: BranchName,
}

impl RefManager {
    pub fn new(adapter: Arc<dyn StorageAdapter>, git_dir: &str) -> Self {
        Self {
            adapter,
            git_dir: git_dir.to_string(),
            branch: BranchName::main(),
        }
    }

    fn path(&self, rel: &str) -> String {
        format!("{}/{}", self.git_dir, rel)
    }

    async fn write(&self, rel: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.path(rel);
        self.adapter
            .write_file(&path, data)
            .await
            .map_err(|e| StorageError::write(path.clone(), e))
    }

    /// check if HEAD exists
    pub async fn is_initialized(&self) -> StorageResult<bool> {
        Ok(self.adapter.exists(&self.path("HEAD")).await?)
    }

    /// lay out an empty repository with an unborn `main`
    pub async fn init(&self) -> StorageResult<()> {
        for dir in ["objects", "refs/heads", "refs/tags"] {
            let path = self.path(dir);
            self.adapter
                .mkdir(&path)
                .await
                .map_err(|e| StorageError::write(path.clone(), e))?;
        }
        self.write("config", DEFAULT_CONFIG.as_bytes()).await?;
        self.write("HEAD", format!("ref: {}\n", self.branch.as_ref_path()).as_bytes())
            .await?;
        debug!(git_dir = %self.git_dir, "initialized refs");
        Ok(())
    }

    /// the branch HEAD points to
    async fn head_target(&self) -> StorageResult<String> {
        let head = match self.adapter.read_to_string(&self.path("HEAD")).await {
            Ok(head) => head,
            Err(e) if e.is_not_found() => return Err(StorageError::NotInitialized(self.git_dir.clone())),
            Err(e) => return Err(e.into()),
        };
        match head.trim().strip_prefix("ref: ") {
            Some(target) => Ok(target.to_string()),
            None => Err(StorageError::CorruptedData {
                path: self.path("HEAD"),
                reason: "detached HEAD is not supported".to_string(),
            }),
        }
    }

    /// Get the current HEAD commit, `None` while the branch is unborn.
    pub async fn head_commit(&self) -> StorageResult<Option<CommitId>> {
        let target = self.head_target().await?;
        match self.adapter.read_to_string(&self.path(&target)).await {
            Ok(hex) => Ok(Some(CommitId::from_hex(&hex)?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Move HEAD's branch to `new` only if it still points to `expected`.
    ///
    /// Returns `ConcurrentModification` if something else moved it.
    pub async fn update_head(&self, new: CommitId, expected: Option<CommitId>) -> StorageResult<()> {
        let current = self.head_commit().await?;
        if current != expected {
            let show = |c: Option<CommitId>| c.map(|c| c.to_string()).unwrap_or_else(|| "(unborn)".to_string());
            return Err(StorageError::ConcurrentModification {
                expected: show(expected),
                found: show(current),
            });
        }
        let target = self.head_target().await?;
        self.write(&target, format!("{}\n", new).as_bytes()).await?;
        debug!(branch = %target, commit = %new.short(), "moved HEAD");
        Ok(())
    }

    /// check if a tag exists
    pub async fn tag_exists(&self, name: &TagName) -> StorageResult<bool> {
        Ok(self.adapter.exists(&self.path(&name.as_ref_path())).await?)
    }

    /// Create an annotated tag pointing at `target`.
    pub async fn create_tag(
        &self,
        store: &ObjectStore,
        name: &TagName,
        target: CommitId,
        message: &str,
        tagger: &GitSignature,
    ) -> StorageResult<TagInfo> {
        if self.tag_exists(name).await? {
            return Err(StorageError::TagAlreadyExists(name.to_string()));
        }

        let object = TagObject {
            target,
            name: name.clone(),
            tagger: tagger.clone(),
            when: Utc::now(),
            message: message.to_string(),
        };
        let id = store.write(ObjectKind::Tag, &object.encode()).await?;
        self.write(&name.as_ref_path(), format!("{}\n", id).as_bytes()).await?;

        Ok(TagInfo {
            name: name.to_string(),
            message: object.message,
            timestamp: object.when,
            target: target.to_string(),
        })
    }

    /// List tags with their message and time, sorted by name.
    ///
    /// Lightweight tags pointing straight at a commit report that commit's
    /// message and time instead.
    pub async fn list_tags(&self, store: &ObjectStore) -> StorageResult<Vec<TagInfo>> {
        let tags_dir = self.path("refs/tags");
        let names = match self.adapter.readdir(&tags_dir).await {
            Ok(names) => names,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut tags = Vec::new();
        for name in names {
            let hex = self.adapter.read_to_string(&format!("{}/{}", tags_dir, name)).await?;
            let id = ObjectId::from_hex(&hex)?;
            let (kind, body) = store.read(id).await?;
            let info = match kind {
                ObjectKind::Tag => {
                    let tag = TagObject::decode(id, &body)?;
                    TagInfo {
                        name,
                        message: tag.message,
                        timestamp: tag.when,
                        target: tag.target.to_string(),
                    }
                }
                ObjectKind::Commit => {
                    let commit = get_commit(store, CommitId::new(id)).await?;
                    TagInfo {
                        name,
                        message: commit.message,
                        timestamp: commit.timestamp,
                        target: commit.id.to_string(),
                    }
                }
                other => {
                    debug!(tag = %name, kind = other.as_str(), "skipping tag on non-commit");
                    continue;
                }
            };
            tags.push(info);
        }
        Ok(tags)
    }
}
