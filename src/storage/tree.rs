//! tree operations for the working-tree snapshot.
//!
//! in git, a tree is a directory. here:
//! - the root tree holds one directory per artifact folder plus `assets/`,
//!   `counters/`, `baselines/` and friends
//! - each directory holds the file blobs
//!
//! the write path never edits a tree in place. [`TreeMutator`] flattens the
//! current snapshot to `path -> blob`, applies changes, and rebuilds every
//! directory bottom-up. unchanged directories hash to the same object, so
//! rewriting them costs nothing.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::object::{hash_object, ObjectKind, ObjectStore};
use crate::storage::types::{BlobId, ObjectId, RepoPath, TreeId};

/// git mode of a tree entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    File,
    Directory,
}

impl EntryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryMode::File => "100644",
            EntryMode::Directory => "40000",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "100644" | "100755" => Some(EntryMode::File),
            "40000" | "040000" => Some(EntryMode::Directory),
            _ => None,
        }
    }
}

/// one line of a tree object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub mode: EntryMode,
    pub id: ObjectId,
}

impl TreeEntry {
    pub fn file(name: impl Into<String>, id: BlobId) -> Self {
        Self {
            name: name.into(),
            mode: EntryMode::File,
            id: id.raw(),
        }
    }

    pub fn directory(name: impl Into<String>, id: TreeId) -> Self {
        Self {
            name: name.into(),
            mode: EntryMode::Directory,
            id: id.raw(),
        }
    }

    /// git compares directories as if their name ended in `/`
    fn sort_key(&self) -> Vec<u8> {
        let mut key = self.name.as_bytes().to_vec();
        if self.mode == EntryMode::Directory {
            key.push(b'/');
        }
        key
    }
}

fn git_order(a: &TreeEntry, b: &TreeEntry) -> Ordering {
    a.sort_key().cmp(&b.sort_key())
}

/// serialize entries in git's canonical order
pub fn encode_tree(entries: &[TreeEntry]) -> Vec<u8> {
    let mut sorted: Vec<&TreeEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| git_order(a, b));

    let mut body = Vec::new();
    for entry in sorted {
        body.extend_from_slice(entry.mode.as_str().as_bytes());
        body.push(b' ');
        body.extend_from_slice(entry.name.as_bytes());
        body.push(0);
        body.extend_from_slice(entry.id.as_bytes());
    }
    body
}

/// parse a tree object body
pub fn decode_tree(id: ObjectId, body: &[u8]) -> StorageResult<Vec<TreeEntry>> {
    let corrupted = |reason: &str| StorageError::CorruptedData {
        path: format!("tree {}", id.short()),
        reason: reason.to_string(),
    };

    let mut entries = Vec::new();
    let mut rest = body;
    while !rest.is_empty() {
        let space = rest
            .iter()
            .position(|b| *b == b' ')
            .ok_or_else(|| corrupted("missing mode separator"))?;
        let mode = std::str::from_utf8(&rest[..space]).map_err(|_| corrupted("mode is not utf-8"))?;
        let mode = EntryMode::parse(mode).ok_or_else(|| corrupted("unsupported entry mode"))?;
        rest = &rest[space + 1..];

        let nul = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| corrupted("missing name terminator"))?;
        let name = std::str::from_utf8(&rest[..nul])
            .map_err(|_| corrupted("name is not utf-8"))?
            .to_string();
        rest = &rest[nul + 1..];

        if rest.len() < 20 {
            return Err(corrupted("truncated object name"));
        }
        let mut raw = [0u8; 20];
        raw.copy_from_slice(&rest[..20]);
        rest = &rest[20..];

        entries.push(TreeEntry {
            name,
            mode,
            id: ObjectId::from_bytes(raw),
        });
    }
    Ok(entries)
}

/// the well-known id of a tree with no entries
pub fn empty_tree_id() -> TreeId {
    TreeId::new(hash_object(ObjectKind::Tree, &[]))
}

/// A read only snapshot of one directory level.
#[derive(Debug, Clone)]
pub struct TreeHandle {
    id: TreeId,
    entries: Vec<TreeEntry>,
}

impl TreeHandle {
    pub async fn load(store: &ObjectStore, id: TreeId) -> StorageResult<Self> {
        let body = store.read_kind(id.raw(), ObjectKind::Tree).await?;
        let entries = decode_tree(id.raw(), &body)?;
        Ok(Self { id, entries })
    }

    pub fn id(&self) -> TreeId {
        self.id
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// every file under a tree, keyed by its full path
pub async fn flatten(store: &ObjectStore, root: TreeId) -> StorageResult<BTreeMap<String, BlobId>> {
    let mut files = BTreeMap::new();
    let mut pending = vec![(String::new(), root)];

    while let Some((prefix, tree_id)) = pending.pop() {
        let tree = TreeHandle::load(store, tree_id).await?;
        for entry in tree.entries {
            let path = if prefix.is_empty() {
                entry.name
            } else {
                format!("{}/{}", prefix, entry.name)
            };
            match entry.mode {
                EntryMode::File => {
                    files.insert(path, BlobId::new(entry.id));
                }
                EntryMode::Directory => pending.push((path, TreeId::new(entry.id))),
            }
        }
    }
    Ok(files)
}

/// resolve one path inside a tree without flattening the whole thing
pub async fn blob_at_path(store: &ObjectStore, root: TreeId, path: &RepoPath) -> StorageResult<Option<BlobId>> {
    let segments: Vec<&str> = path.as_str().split('/').collect();
    let mut current = root;

    for (i, segment) in segments.iter().enumerate() {
        let tree = TreeHandle::load(store, current).await?;
        let entry = match tree.get(segment) {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let last = i == segments.len() - 1;
        match (entry.mode, last) {
            (EntryMode::File, true) => return Ok(Some(BlobId::new(entry.id))),
            (EntryMode::Directory, false) => current = TreeId::new(entry.id),
            _ => return Ok(None),
        }
    }
    Ok(None)
}

/// a mutable tree builder for making changes
///
/// this adds up changes and produces a new tree when it's final.
/// the original tree is not modified.
///
/// # Usage Pattern
///
/// ```ignore
/// let mut mutator = TreeMutator::from_tree(&store, head_tree).await?;
/// mutator.upsert(&path, blob_id);
/// mutator.remove(&other);
/// let new_tree_id = mutator.write(&store).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct TreeMutator {
    files: BTreeMap<String, BlobId>,
}

impl TreeMutator {
    pub async fn from_tree(store: &ObjectStore, tree: TreeId) -> StorageResult<Self> {
        Ok(Self {
            files: flatten(store, tree).await?,
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// insert or replace the file at `path`
    pub fn upsert(&mut self, path: &RepoPath, blob: BlobId) {
        self.files.insert(path.as_str().to_string(), blob);
    }

    /// drop the file at `path`, reporting whether it was there
    pub fn remove(&mut self, path: &RepoPath) -> bool {
        self.files.remove(path.as_str()).is_some()
    }

    pub fn get(&self, path: &RepoPath) -> Option<BlobId> {
        self.files.get(path.as_str()).copied()
    }

    pub fn files(&self) -> &BTreeMap<String, BlobId> {
        &self.files
    }

    /// root id the current contents would produce, without storing anything
    pub fn tree_id(&self) -> TreeId {
        let mut bodies = Vec::new();
        TreeId::new(build_level(self.files.iter().map(|(p, b)| (p.as_str(), *b)), &mut bodies))
    }

    /// store every directory object and return the new root
    pub async fn write(self, store: &ObjectStore) -> StorageResult<TreeId> {
        let mut bodies = Vec::new();
        let root = build_level(self.files.iter().map(|(p, b)| (p.as_str(), *b)), &mut bodies);
        // children were pushed before their parents
        for body in &bodies {
            store.write(ObjectKind::Tree, body).await?;
        }
        Ok(TreeId::new(root))
    }
}

/// encode one directory level, appending every tree body (children first)
fn build_level<'a>(files: impl Iterator<Item = (&'a str, BlobId)>, bodies: &mut Vec<Vec<u8>>) -> ObjectId {
    let mut entries = Vec::new();
    let mut dirs: BTreeMap<&'a str, Vec<(&'a str, BlobId)>> = BTreeMap::new();

    for (path, blob) in files {
        match path.split_once('/') {
            Some((dir, rest)) => dirs.entry(dir).or_default().push((rest, blob)),
            None => entries.push(TreeEntry::file(path, blob)),
        }
    }

    for (dir, children) in dirs {
        let child = build_level(children.into_iter(), bodies);
        entries.push(TreeEntry::directory(dir, TreeId::new(child)));
    }

    let body = encode_tree(&entries);
    let id = hash_object(ObjectKind::Tree, &body);
    bodies.push(body);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryAdapter;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store() -> ObjectStore {
        ObjectStore::new(Arc::new(MemoryAdapter::new()), ".git")
    }

    fn path(p: &str) -> RepoPath {
        RepoPath::new(p).unwrap()
    }

    async fn blob(store: &ObjectStore, content: &[u8]) -> BlobId {
        BlobId::new(store.write(ObjectKind::Blob, content).await.unwrap())
    }

    #[test]
    fn test_empty_tree_id() {
        assert_eq!(empty_tree_id().to_string(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
        assert_eq!(TreeMutator::empty().tree_id(), empty_tree_id());
    }

    #[test]
    fn test_directory_sort_order() {
        let id = hash_object(ObjectKind::Blob, b"x");
        let entries = vec![
            TreeEntry::directory("a", TreeId::new(id)),
            TreeEntry::file("a.b", BlobId::new(id)),
            TreeEntry::file("B", BlobId::new(id)),
        ];
        let decoded = decode_tree(id, &encode_tree(&entries)).unwrap();
        let names: Vec<&str> = decoded.iter().map(|e| e.name.as_str()).collect();
        // '.' sorts before '/', upper case before lower
        assert_eq!(names, vec!["B", "a.b", "a"]);
    }

    #[test]
    fn test_decode_truncated_fails() {
        let id = hash_object(ObjectKind::Blob, b"x");
        let mut body = encode_tree(&[TreeEntry::file("f", BlobId::new(id))]);
        body.truncate(body.len() - 3);
        assert!(decode_tree(id, &body).is_err());
    }

    #[tokio::test]
    async fn test_mutator_roundtrip() {
        let store = store();
        let one = blob(&store, b"one").await;
        let two = blob(&store, b"two").await;

        let mut mutator = TreeMutator::empty();
        mutator.upsert(&path("requirements/REQ-001.md"), one);
        mutator.upsert(&path("requirements/REQ-002.md"), two);
        mutator.upsert(&path("assets/img/logo.png"), two);
        let expected = mutator.tree_id();
        let root = mutator.write(&store).await.unwrap();
        assert_eq!(root, expected);

        let files = flatten(&store, root).await.unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(files["requirements/REQ-001.md"], one);
        assert_eq!(files["assets/img/logo.png"], two);

        assert_eq!(
            blob_at_path(&store, root, &path("requirements/REQ-002.md")).await.unwrap(),
            Some(two)
        );
        assert_eq!(blob_at_path(&store, root, &path("requirements")).await.unwrap(), None);
        assert_eq!(blob_at_path(&store, root, &path("usecases/UC-001.md")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_prunes_empty_directories() {
        let store = store();
        let one = blob(&store, b"one").await;

        let mut mutator = TreeMutator::empty();
        mutator.upsert(&path("requirements/REQ-001.md"), one);
        let root = mutator.write(&store).await.unwrap();

        let mut mutator = TreeMutator::from_tree(&store, root).await.unwrap();
        assert!(mutator.remove(&path("requirements/REQ-001.md")));
        assert!(!mutator.remove(&path("requirements/REQ-001.md")));
        assert_eq!(mutator.tree_id(), empty_tree_id());
    }

    #[tokio::test]
    async fn test_tree_hash_matches_git2() {
        let dir = TempDir::new().unwrap();
        let repo = git2::Repository::init(dir.path()).unwrap();

        let blob_oid = repo.blob(b"hello\n").unwrap();
        let mut sub = repo.treebuilder(None).unwrap();
        sub.insert("REQ-001.md", blob_oid, 0o100644).unwrap();
        let sub_oid = sub.write().unwrap();
        let mut root = repo.treebuilder(None).unwrap();
        root.insert("requirements", sub_oid, 0o040000).unwrap();
        root.insert("README.md", blob_oid, 0o100644).unwrap();
        let root_oid = root.write().unwrap();

        let store = store();
        let hello = blob(&store, b"hello\n").await;
        let mut mutator = TreeMutator::empty();
        mutator.upsert(&path("requirements/REQ-001.md"), hello);
        mutator.upsert(&path("README.md"), hello);

        assert_eq!(mutator.tree_id().to_string(), root_oid.to_string());
    }
}
