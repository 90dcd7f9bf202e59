//! Commit creation and history traversal
//!
//! commits are the atomic units of change. here:
//! - each commit touches exactly one working-tree path
//! - history is a single first-parent line on `main`
//! - per-path history is derived by comparing the path's blob between a
//!   commit and its parent
//!
//! this module handles the commit object codec, commit creation and
//! history walking.

use chrono::{DateTime, Utc};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::object::{ObjectKind, ObjectStore};
use crate::storage::tree::blob_at_path;
use crate::storage::types::{BlobId, CommitId, GitSignature, ObjectId, RepoPath, TreeId};

/// an author or committer line with its timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureLine {
    pub signature: GitSignature,
    pub when: DateTime<Utc>,
}

impl SignatureLine {
    pub fn new(signature: GitSignature, when: DateTime<Utc>) -> Self {
        Self { signature, when }
    }

    fn encode(&self) -> String {
        self.signature.to_git_line(self.when)
    }

    /// parse `Name <email> 1700000000 +0000`
    fn decode(line: &str) -> Option<Self> {
        let open = line.find('<')?;
        let close = line[open..].find('>')? + open;
        let name = line[..open].trim_end().to_string();
        let email = line[open + 1..close].to_string();

        let mut rest = line[close + 1..].split_whitespace();
        let secs: i64 = rest.next()?.parse().ok()?;
        let when = DateTime::<Utc>::from_timestamp(secs, 0)?;

        Some(Self {
            signature: GitSignature::new(name, email),
            when,
        })
    }
}

/// decoded commit object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitObject {
    pub tree: TreeId,
    pub parents: Vec<CommitId>,
    pub author: SignatureLine,
    pub committer: SignatureLine,
    pub message: String,
}

impl CommitObject {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = format!("tree {}\n", self.tree);
        for parent in &self.parents {
            out.push_str(&format!("parent {}\n", parent));
        }
        out.push_str(&format!("author {}\n", self.author.encode()));
        out.push_str(&format!("committer {}\n", self.committer.encode()));
        out.push('\n');
        out.push_str(&self.message);
        if !self.message.ends_with('\n') {
            out.push('\n');
        }
        out.into_bytes()
    }

    pub fn decode(id: ObjectId, body: &[u8]) -> StorageResult<Self> {
        let corrupted = |reason: &str| StorageError::CorruptedData {
            path: format!("commit {}", id.short()),
            reason: reason.to_string(),
        };

        let text = std::str::from_utf8(body).map_err(|_| corrupted("commit is not utf-8"))?;
        let (headers, message) = text
            .split_once("\n\n")
            .ok_or_else(|| corrupted("missing message separator"))?;

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        for line in headers.lines() {
            let (key, value) = match line.split_once(' ') {
                Some(kv) => kv,
                None => continue,
            };
            match key {
                "tree" => tree = Some(TreeId::new(ObjectId::from_hex(value)?)),
                "parent" => parents.push(CommitId::new(ObjectId::from_hex(value)?)),
                "author" => author = SignatureLine::decode(value),
                "committer" => committer = SignatureLine::decode(value),
                // gpgsig, encoding and friends are irrelevant here
                _ => {}
            }
        }

        let author = author.ok_or_else(|| corrupted("missing author"))?;
        Ok(Self {
            tree: tree.ok_or_else(|| corrupted("missing tree"))?,
            parents,
            committer: committer.unwrap_or_else(|| author.clone()),
            author,
            message: message.to_string(),
        })
    }
}

/// information about a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub id: CommitId,
    pub tree_id: TreeId,
    pub parent_ids: Vec<CommitId>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
}

impl CommitInfo {
    pub(crate) fn from_object(id: CommitId, object: CommitObject) -> Self {
        Self {
            id,
            tree_id: object.tree,
            parent_ids: object.parents,
            message: object.message.trim_end_matches('\n').to_string(),
            author_name: object.author.signature.name,
            author_email: object.author.signature.email,
            timestamp: object.author.when,
        }
    }

    /// get the first (or only) parent
    pub fn first_parent(&self) -> Option<CommitId> {
        self.parent_ids.first().copied()
    }

    /// get a short summary of the commit (first line of message)
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }
}

/// builder for creating commits with a fluent interface
pub struct CommitBuilder<'a> {
    store: &'a ObjectStore,
    tree_id: Option<TreeId>,
    parents: Vec<CommitId>,
    message: String,
    signature: GitSignature,
}

impl<'a> CommitBuilder<'a> {
    pub fn new(store: &'a ObjectStore) -> Self {
        Self {
            store,
            tree_id: None,
            parents: Vec::new(),
            message: String::new(),
            signature: GitSignature::reqtrace(),
        }
    }

    /// set the tree for this commit
    pub fn tree(mut self, tree_id: TreeId) -> Self {
        self.tree_id = Some(tree_id);
        self
    }

    /// add a parent commit
    pub fn parent(mut self, parent: CommitId) -> Self {
        self.parents.push(parent);
        self
    }

    /// set the commit message
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// set the author/committer signature
    pub fn signature(mut self, signature: GitSignature) -> Self {
        self.signature = signature;
        self
    }

    /// create the commit object and return its ID
    ///
    /// no ref is moved here; that is [`RefManager::update_head`]'s job.
    ///
    /// [`RefManager::update_head`]: crate::storage::refs::RefManager::update_head
    pub async fn commit(self) -> StorageResult<CommitId> {
        let tree = self
            .tree_id
            .ok_or_else(|| StorageError::Internal("commit requires a tree".to_string()))?;
        if self.message.trim().is_empty() {
            return Err(StorageError::EmptyCommitMessage);
        }

        let line = SignatureLine::new(self.signature, Utc::now());
        let object = CommitObject {
            tree,
            parents: self.parents,
            author: line.clone(),
            committer: line,
            message: self.message,
        };
        let id = self.store.write(ObjectKind::Commit, &object.encode()).await?;
        Ok(CommitId::new(id))
    }
}

/// get information about a commit
pub async fn get_commit(store: &ObjectStore, id: CommitId) -> StorageResult<CommitInfo> {
    let body = match store.read_kind(id.raw(), ObjectKind::Commit).await {
        Ok(body) => body,
        Err(e) if e.is_not_found() => return Err(StorageError::CommitNotFound(id.to_string())),
        Err(e) => return Err(e),
    };
    let object = CommitObject::decode(id.raw(), &body)?;
    Ok(CommitInfo::from_object(id, object))
}

/// first-parent history starting at `start`, newest first
pub async fn history(store: &ObjectStore, start: CommitId, limit: Option<usize>) -> StorageResult<Vec<CommitInfo>> {
    let mut commits = Vec::new();
    let mut cursor = Some(start);
    while let Some(id) = cursor {
        if limit.is_some_and(|max| commits.len() >= max) {
            break;
        }
        let info = get_commit(store, id).await?;
        cursor = info.first_parent();
        commits.push(info);
    }
    Ok(commits)
}

/// commits along the first-parent chain that changed `path`, newest first
///
/// a commit counts when the path's blob differs from the one in its parent,
/// which includes the commit that first added it and one that removed it.
pub async fn path_history(store: &ObjectStore, start: CommitId, path: &RepoPath) -> StorageResult<Vec<CommitInfo>> {
    let mut changed = Vec::new();
    let mut newer: Option<(CommitInfo, Option<BlobId>)> = None;
    let mut cursor = Some(start);

    while let Some(id) = cursor {
        let info = get_commit(store, id).await?;
        let blob = blob_at_path(store, info.tree_id, path).await?;
        if let Some((newer_info, newer_blob)) = newer.take() {
            if newer_blob != blob {
                changed.push(newer_info);
            }
        }
        cursor = info.first_parent();
        newer = Some((info, blob));
    }

    // the root commit changed the path if it has it at all
    if let Some((oldest, Some(_))) = newer {
        changed.push(oldest);
    }
    Ok(changed)
}

/// message formatting for workspace commits
pub struct CommitMessage;

impl CommitMessage {
    /// default for an artifact with no history yet
    pub const FIRST_COMMIT: &'static str = "First commit";

    pub fn assets() -> String {
        "Update assets".to_string()
    }

    pub fn counters() -> String {
        "Update counters".to_string()
    }

    pub fn saved_filters() -> String {
        "Update saved filters".to_string()
    }

    pub fn baselines() -> String {
        "Update baselines".to_string()
    }

    pub fn user(id: &str) -> String {
        format!("Update user {}", id)
    }

    /// annotated tag message for a baseline
    pub fn baseline_tag(name: &str, version: &str) -> String {
        format!("Baseline {} ({})", name, version)
    }
}
