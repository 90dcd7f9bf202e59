//! Core repository wrapper.
//!
//! This is the central component of the storage layer. It owns every byte
//! under the workspace root: working files, loose objects, refs and the
//! index mirror, all reached through one [`StorageAdapter`].
//!
//! All other layers use this for version-control access.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::fs::StorageAdapter;
use crate::storage::commit::{self, CommitBuilder, CommitInfo};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::index::{Index, IndexEntry};
use crate::storage::object::{ObjectKind, ObjectStore};
use crate::storage::refs::{RefManager, TagInfo};
use crate::storage::tree::{self, TreeMutator};
use crate::storage::types::{BlobId, CommitId, GitSignature, RepoPath, StatusEntry, TagName};
use crate::storage::worktree;

/// The main repository wrapper.
///
/// Clone this to share across tasks - it uses Arc internally.
#[derive(Clone)]
pub struct GitRepository {
    inner: Arc<GitRepositoryInner>,
}

struct GitRepositoryInner {
    adapter: Arc<dyn StorageAdapter>,
    objects: ObjectStore,
    refs: RefManager,
    signature: GitSignature,
    /// held from reading HEAD until the new commit is published
    commit_lock: Mutex<()>,
}

impl GitRepository {
    fn build(adapter: Arc<dyn StorageAdapter>, signature: GitSignature) -> Self {
        let git_dir = RepoPath::GIT_DIR;
        Self {
            inner: Arc::new(GitRepositoryInner {
                objects: ObjectStore::new(adapter.clone(), git_dir),
                refs: RefManager::new(adapter.clone(), git_dir),
                adapter,
                signature,
                commit_lock: Mutex::new(()),
            }),
        }
    }

    /// Open an existing repository.
    pub async fn open(adapter: Arc<dyn StorageAdapter>, signature: GitSignature) -> StorageResult<Self> {
        let repo = Self::build(adapter, signature);
        if !repo.inner.refs.is_initialized().await? {
            return Err(StorageError::NotInitialized(RepoPath::GIT_DIR.to_string()));
        }
        // a HEAD we cannot parse is as fatal as a missing one
        repo.head().await?;
        Ok(repo)
    }

    /// Initialize a new repository, or open the one already there.
    ///
    /// The branch starts unborn; the first commit has no parent.
    pub async fn init(adapter: Arc<dyn StorageAdapter>, signature: GitSignature) -> StorageResult<Self> {
        let repo = Self::build(adapter, signature);
        if repo.inner.refs.is_initialized().await? {
            return Self::open(repo.inner.adapter.clone(), repo.inner.signature.clone()).await;
        }
        repo.inner.refs.init().await?;
        info!("initialized repository");
        Ok(repo)
    }

    /// Open or initialize a repository.
    pub async fn open_or_init(
        adapter: Arc<dyn StorageAdapter>,
        signature: GitSignature,
        create_if_missing: bool,
    ) -> StorageResult<Self> {
        if create_if_missing {
            Self::init(adapter, signature).await
        } else {
            Self::open(adapter, signature).await
        }
    }

    pub fn signature(&self) -> &GitSignature {
        &self.inner.signature
    }

    pub fn adapter(&self) -> &Arc<dyn StorageAdapter> {
        &self.inner.adapter
    }

    // ==================== History ====================

    /// Get the current HEAD commit, `None` before the first commit.
    pub async fn head(&self) -> StorageResult<Option<CommitId>> {
        self.inner.refs.head_commit().await
    }

    /// Get information about a commit.
    pub async fn get_commit(&self, id: CommitId) -> StorageResult<CommitInfo> {
        commit::get_commit(&self.inner.objects, id).await
    }

    /// every committed file at HEAD
    async fn head_files(&self, head: Option<CommitId>) -> StorageResult<BTreeMap<String, BlobId>> {
        match head {
            Some(id) => {
                let info = self.get_commit(id).await?;
                tree::flatten(&self.inner.objects, info.tree_id).await
            }
            None => Ok(BTreeMap::new()),
        }
    }

    /// Commits that changed `path`, newest first; empty if never committed.
    pub async fn history(&self, path: &RepoPath) -> StorageResult<Vec<CommitInfo>> {
        match self.head().await? {
            Some(head) => commit::path_history(&self.inner.objects, head, path).await,
            None => Ok(Vec::new()),
        }
    }

    /// Whole-repository history, newest first.
    pub async fn log(&self, limit: Option<usize>) -> StorageResult<Vec<CommitInfo>> {
        match self.head().await? {
            Some(head) => commit::history(&self.inner.objects, head, limit).await,
            None => Ok(Vec::new()),
        }
    }

    /// File content as of a historical commit.
    pub async fn read_file_at(&self, at: CommitId, path: &RepoPath) -> StorageResult<Vec<u8>> {
        let info = self.get_commit(at).await?;
        let blob = tree::blob_at_path(&self.inner.objects, info.tree_id, path)
            .await?
            .ok_or_else(|| StorageError::FileNotFound(format!("{}@{}", path, at.short())))?;
        self.inner.objects.read_kind(blob.raw(), ObjectKind::Blob).await
    }

    // ==================== Working Tree ====================

    /// Read a working file.
    pub async fn read_file(&self, path: &RepoPath) -> StorageResult<Vec<u8>> {
        match self.inner.adapter.read_file(path.as_str()).await {
            Ok(data) => Ok(data),
            Err(e) if e.is_not_found() => Err(StorageError::FileNotFound(path.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Write a working file. Nothing is committed.
    pub async fn write_file(&self, path: &RepoPath, data: &[u8]) -> StorageResult<()> {
        debug!(%path, bytes = data.len(), "write working file");
        self.inner
            .adapter
            .write_file(path.as_str(), data)
            .await
            .map_err(|e| StorageError::write(path.as_str(), e))
    }

    /// Remove a working file. Nothing is committed.
    pub async fn remove_file(&self, path: &RepoPath) -> StorageResult<()> {
        match self.inner.adapter.unlink(path.as_str()).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Err(StorageError::FileNotFound(path.to_string())),
            Err(e) => Err(StorageError::write(path.as_str(), e)),
        }
    }

    pub async fn file_exists(&self, path: &RepoPath) -> StorageResult<bool> {
        Ok(self.inner.adapter.exists(path.as_str()).await?)
    }

    /// Names directly inside a working directory; empty if it doesn't exist.
    pub async fn list_dir(&self, dir: &str) -> StorageResult<Vec<String>> {
        match self.inner.adapter.readdir(dir).await {
            Ok(names) => Ok(names),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn create_dir(&self, dir: &str) -> StorageResult<()> {
        self.inner
            .adapter
            .mkdir(dir)
            .await
            .map_err(|e| StorageError::write(dir, e))
    }

    /// Paths that differ from HEAD, sorted by path.
    pub async fn status(&self) -> StorageResult<Vec<StatusEntry>> {
        let head = self.head().await?;
        let files = self.head_files(head).await?;
        worktree::compute_status(self.inner.adapter.as_ref(), &files).await
    }

    // ==================== Commit ====================

    /// Commit exactly one path on top of HEAD.
    ///
    /// The new tree is HEAD's tree with only `path` replaced, or removed if
    /// the working file is gone. Other modified paths stay pending. On any
    /// failure HEAD does not move, so the path is still reported by
    /// [`status`](Self::status).
    pub async fn stage_and_commit_path(
        &self,
        path: &RepoPath,
        message: &str,
        author: Option<&str>,
    ) -> StorageResult<CommitId> {
        if message.trim().is_empty() {
            return Err(StorageError::EmptyCommitMessage);
        }

        let _guard = self.inner.commit_lock.lock().await;
        let objects = &self.inner.objects;

        let parent = self.head().await?;
        let mut mutator = match parent {
            Some(id) => TreeMutator::from_tree(objects, self.get_commit(id).await?.tree_id).await?,
            None => TreeMutator::empty(),
        };

        match self.inner.adapter.read_file(path.as_str()).await {
            Ok(data) => {
                let blob = BlobId::new(objects.write(ObjectKind::Blob, &data).await?);
                if mutator.get(path) == Some(blob) {
                    return Err(StorageError::NothingToCommit(path.to_string()));
                }
                mutator.upsert(path, blob);
            }
            Err(e) if e.is_not_found() => {
                if !mutator.remove(path) {
                    return Err(StorageError::NothingToCommit(path.to_string()));
                }
            }
            Err(e) => return Err(e.into()),
        }

        let files = mutator.files().clone();
        let tree_id = mutator.write(objects).await?;

        let signature = match author {
            Some(name) => self.inner.signature.with_name(name),
            None => self.inner.signature.clone(),
        };
        let mut builder = CommitBuilder::new(objects)
            .tree(tree_id)
            .message(message)
            .signature(signature);
        if let Some(parent) = parent {
            builder = builder.parent(parent);
        }
        let commit_id = builder.commit().await?;

        self.inner.refs.update_head(commit_id, parent).await?;
        info!(%path, commit = %commit_id.short(), "committed");

        // the commit is already published; a stale index only confuses stock git
        if let Err(e) = self.write_index(&files, path).await {
            warn!(error = %e, "failed to refresh index");
        }
        Ok(commit_id)
    }

    /// rewrite `.git/index` to match the committed tree
    async fn write_index(&self, files: &BTreeMap<String, BlobId>, committed: &RepoPath) -> StorageResult<()> {
        let index_path = format!("{}/index", RepoPath::GIT_DIR);
        let previous = match self.inner.adapter.read_file(&index_path).await {
            Ok(bytes) => Index::decode(&bytes).unwrap_or_default(),
            Err(_) => Index::default(),
        };

        let mut entries = Vec::with_capacity(files.len());
        for (path, id) in files {
            let entry = match previous.get(path) {
                Some(old) if old.id == *id && path != committed.as_str() => old.clone(),
                _ if path == committed.as_str() => match self.inner.adapter.stat(path).await {
                    Ok(stat) => IndexEntry {
                        path: path.clone(),
                        id: *id,
                        size: stat.size.min(u32::MAX as u64) as u32,
                        mtime: stat.mtime,
                    },
                    Err(_) => IndexEntry::unstatted(path.clone(), *id),
                },
                _ => IndexEntry::unstatted(path.clone(), *id),
            };
            entries.push(entry);
        }

        let bytes = Index::new(entries).encode();
        self.inner
            .adapter
            .write_file(&index_path, &bytes)
            .await
            .map_err(|e| StorageError::write(index_path.clone(), e))
    }

    // ==================== Tags ====================

    /// Annotated tag at the current history tip.
    pub async fn create_tag(&self, name: &TagName, message: &str) -> StorageResult<TagInfo> {
        let head = self.head().await?.ok_or(StorageError::EmptyRepository)?;
        let tag = self
            .inner
            .refs
            .create_tag(&self.inner.objects, name, head, message, &self.inner.signature)
            .await?;
        info!(tag = %name, commit = %head.short(), "created tag");
        Ok(tag)
    }

    pub async fn list_tags(&self) -> StorageResult<Vec<TagInfo>> {
        self.inner.refs.list_tags(&self.inner.objects).await
    }

    // ==================== Utility Operations ====================

    /// number of loose objects
    pub async fn object_count(&self) -> StorageResult<usize> {
        self.inner.objects.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{DiskAdapter, MemoryAdapter};
    use crate::storage::types::FileStatus;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn setup() -> (MemoryAdapter, GitRepository) {
        let fs = MemoryAdapter::new();
        let repo = GitRepository::init(Arc::new(fs.clone()), GitSignature::reqtrace())
            .await
            .unwrap();
        (fs, repo)
    }

    fn path(p: &str) -> RepoPath {
        RepoPath::new(p).unwrap()
    }

    #[tokio::test]
    async fn test_init_and_open() {
        let fs = MemoryAdapter::new();
        let adapter: Arc<dyn StorageAdapter> = Arc::new(fs.clone());

        let missing = GitRepository::open(adapter.clone(), GitSignature::reqtrace()).await;
        assert!(matches!(missing, Err(StorageError::NotInitialized(_))));

        let repo = GitRepository::init(adapter.clone(), GitSignature::reqtrace()).await.unwrap();
        assert_eq!(repo.head().await.unwrap(), None);

        let reopened = GitRepository::open(adapter, GitSignature::reqtrace()).await.unwrap();
        assert_eq!(reopened.head().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_init_failure_is_reported() {
        let fs = MemoryAdapter::new();
        fs.reject_writes_under(".git");
        let result = GitRepository::init(Arc::new(fs), GitSignature::reqtrace()).await;
        assert!(result.err().is_some_and(|e| e.is_write_failure()));
    }

    #[tokio::test]
    async fn test_first_commit_writes_three_objects() {
        let (_fs, repo) = setup().await;
        let before = repo.object_count().await.unwrap();

        let p = path("requirements/REQ-001.md");
        repo.write_file(&p, b"---\nid: REQ-001\n---\n").await.unwrap();
        repo.stage_and_commit_path(&p, "First commit", None).await.unwrap();

        // blob, requirements/ tree, root tree, commit
        assert!(repo.object_count().await.unwrap() - before >= 3);
    }

    #[tokio::test]
    async fn test_commit_isolation() {
        let (_fs, repo) = setup().await;
        let req = path("requirements/REQ-001.md");
        let uc = path("usecases/UC-001.md");
        repo.write_file(&req, b"req").await.unwrap();
        repo.write_file(&uc, b"uc").await.unwrap();

        let commit_id = repo.stage_and_commit_path(&req, "add req", Some("Ada")).await.unwrap();

        assert_eq!(
            repo.status().await.unwrap(),
            vec![StatusEntry::new("usecases/UC-001.md", FileStatus::New)]
        );
        assert!(repo.read_file_at(commit_id, &uc).await.unwrap_err().is_not_found());
        assert_eq!(repo.read_file_at(commit_id, &req).await.unwrap(), b"req");

        let info = repo.get_commit(commit_id).await.unwrap();
        assert_eq!(info.author_name, "Ada");
        assert!(repo.history(&uc).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_tracks_one_path() {
        let (_fs, repo) = setup().await;
        let req = path("requirements/REQ-001.md");
        let uc = path("usecases/UC-001.md");

        repo.write_file(&req, b"v1").await.unwrap();
        repo.stage_and_commit_path(&req, "First commit", None).await.unwrap();
        repo.write_file(&uc, b"u").await.unwrap();
        repo.stage_and_commit_path(&uc, "add uc", None).await.unwrap();
        repo.write_file(&req, b"v2").await.unwrap();
        repo.stage_and_commit_path(&req, "tighten wording", None).await.unwrap();

        let history = repo.history(&req).await.unwrap();
        let messages: Vec<&str> = history.iter().map(|c| c.message.as_str()).collect();
        assert_eq!(messages, vec!["tighten wording", "First commit"]);
        assert_eq!(repo.log(None).await.unwrap().len(), 3);
        assert_eq!(repo.log(Some(1)).await.unwrap()[0].message, "tighten wording");
    }

    #[tokio::test]
    async fn test_commit_rejects_empty_and_noop() {
        let (_fs, repo) = setup().await;
        let p = path("requirements/REQ-001.md");
        repo.write_file(&p, b"x").await.unwrap();

        let empty = repo.stage_and_commit_path(&p, "   ", None).await;
        assert!(matches!(empty, Err(StorageError::EmptyCommitMessage)));

        repo.stage_and_commit_path(&p, "First commit", None).await.unwrap();
        let again = repo.stage_and_commit_path(&p, "again", None).await;
        assert!(matches!(again, Err(StorageError::NothingToCommit(_))));

        let never = repo.stage_and_commit_path(&path("risks/RISK-001.md"), "x", None).await;
        assert!(matches!(never, Err(StorageError::NothingToCommit(_))));
    }

    #[tokio::test]
    async fn test_failed_commit_stays_pending() {
        let (fs, repo) = setup().await;
        let p = path("requirements/REQ-001.md");
        repo.write_file(&p, b"x").await.unwrap();

        fs.reject_writes_under(".git");
        let err = repo.stage_and_commit_path(&p, "First commit", None).await.unwrap_err();
        assert!(err.is_write_failure());
        assert_eq!(repo.head().await.unwrap(), None);
        assert_eq!(
            repo.status().await.unwrap(),
            vec![StatusEntry::new("requirements/REQ-001.md", FileStatus::New)]
        );

        fs.allow_all_writes();
        repo.stage_and_commit_path(&p, "First commit", None).await.unwrap();
        assert!(repo.status().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_removal() {
        let (_fs, repo) = setup().await;
        let p = path("requirements/REQ-001.md");
        repo.write_file(&p, b"x").await.unwrap();
        repo.stage_and_commit_path(&p, "First commit", None).await.unwrap();

        repo.remove_file(&p).await.unwrap();
        assert_eq!(
            repo.status().await.unwrap(),
            vec![StatusEntry::new("requirements/REQ-001.md", FileStatus::Deleted)]
        );

        repo.stage_and_commit_path(&p, "Remove REQ-001", None).await.unwrap();
        assert!(repo.status().await.unwrap().is_empty());
        assert_eq!(repo.history(&p).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_commits_of_different_paths() {
        let (_fs, repo) = setup().await;
        let mut handles = Vec::new();
        for i in 1..=5 {
            let p = path(&format!("requirements/REQ-00{}.md", i));
            repo.write_file(&p, format!("req {}", i).as_bytes()).await.unwrap();
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.stage_and_commit_path(&p, "First commit", None).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(repo.status().await.unwrap().is_empty());
        assert_eq!(repo.log(None).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_tags() {
        let (_fs, repo) = setup().await;
        let name = TagName::new("baseline-v1").unwrap();
        assert!(matches!(
            repo.create_tag(&name, "Baseline v1").await,
            Err(StorageError::EmptyRepository)
        ));

        let p = path("requirements/REQ-001.md");
        repo.write_file(&p, b"x").await.unwrap();
        let head = repo.stage_and_commit_path(&p, "First commit", None).await.unwrap();

        let tag = repo.create_tag(&name, "Baseline v1").await.unwrap();
        assert_eq!(tag.target, head.to_string());
        let tags = repo.list_tags().await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].message, "Baseline v1");
    }

    #[tokio::test]
    async fn test_working_file_io() {
        let (_fs, repo) = setup().await;
        let p = path("counters/requirements.json");
        assert!(!repo.file_exists(&p).await.unwrap());
        assert!(repo.read_file(&p).await.unwrap_err().is_not_found());
        assert!(repo.list_dir("counters").await.unwrap().is_empty());

        repo.write_file(&p, b"{}").await.unwrap();
        repo.create_dir("usecases").await.unwrap();
        assert!(repo.file_exists(&p).await.unwrap());
        assert_eq!(repo.list_dir("counters").await.unwrap(), vec!["requirements.json"]);

        repo.remove_file(&p).await.unwrap();
        assert!(repo.remove_file(&p).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_stock_git_reads_repository() {
        let dir = TempDir::new().unwrap();
        let repo = GitRepository::init(Arc::new(DiskAdapter::new(dir.path())), GitSignature::reqtrace())
            .await
            .unwrap();

        let p = path("requirements/REQ-001.md");
        repo.write_file(&p, b"---\nid: REQ-001\n---\nhello\n").await.unwrap();
        let ours = repo.stage_and_commit_path(&p, "First commit", None).await.unwrap();

        let git = git2::Repository::open(dir.path()).unwrap();
        let head = git.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.id().to_string(), ours.to_string());
        assert_eq!(head.message().unwrap(), "First commit\n");
        assert_eq!(head.author().name().unwrap(), "ReqTrace User");

        let entry = head.tree().unwrap().get_path(std::path::Path::new("requirements/REQ-001.md")).unwrap();
        let blob = git.find_blob(entry.id()).unwrap();
        assert_eq!(blob.content(), b"---\nid: REQ-001\n---\nhello\n");

        let index = git.index().unwrap();
        assert!(index.get_path(std::path::Path::new("requirements/REQ-001.md"), 0).is_some());
    }
}
