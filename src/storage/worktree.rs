//! Working-tree walk and status.
//!
//! Status is computed by hashing every working file and comparing it with
//! the HEAD snapshot. There is no stat cache: the working trees this engine
//! serves hold a few thousand small text files at most.

use std::collections::BTreeMap;

use tracing::debug;

use crate::fs::{FsError, StorageAdapter};
use crate::storage::error::StorageResult;
use crate::storage::object::{hash_object, ObjectKind};
use crate::storage::types::{BlobId, FileStatus, RepoPath, StatusEntry};

/// every regular file below the root, `.git` excluded, sorted
pub async fn list_files(adapter: &dyn StorageAdapter) -> StorageResult<Vec<RepoPath>> {
    let mut files = Vec::new();
    let mut pending = vec![String::new()];

    while let Some(dir) = pending.pop() {
        let names = match adapter.readdir(&dir).await {
            Ok(names) => names,
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e.into()),
        };

        for name in names {
            let path = if dir.is_empty() {
                if name == RepoPath::GIT_DIR {
                    continue;
                }
                name
            } else {
                format!("{}/{}", dir, name)
            };

            let stat = match adapter.lstat(&path).await {
                Ok(stat) => stat,
                Err(FsError::SymlinkUnsupported(_)) => {
                    debug!(%path, "skipping symlink");
                    continue;
                }
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };

            if stat.is_directory() {
                pending.push(path);
                continue;
            }
            match RepoPath::new(path.as_str()) {
                Ok(repo_path) => files.push(repo_path),
                Err(e) => debug!(%path, error = %e, "skipping untrackable path"),
            }
        }
    }

    files.sort();
    Ok(files)
}

/// blob id a working file would get if committed
pub async fn hash_working_file(adapter: &dyn StorageAdapter, path: &RepoPath) -> StorageResult<BlobId> {
    let data = adapter.read_file(path.as_str()).await?;
    Ok(BlobId::new(hash_object(ObjectKind::Blob, &data)))
}

/// diff the working tree against a flattened HEAD tree
///
/// clean paths are omitted; the result is sorted by path.
pub async fn compute_status(
    adapter: &dyn StorageAdapter,
    head: &BTreeMap<String, BlobId>,
) -> StorageResult<Vec<StatusEntry>> {
    let mut entries = Vec::new();
    let working = list_files(adapter).await?;

    for path in &working {
        let current = hash_working_file(adapter, path).await?;
        match head.get(path.as_str()) {
            None => entries.push(StatusEntry::new(path.as_str(), FileStatus::New)),
            Some(committed) if *committed != current => {
                entries.push(StatusEntry::new(path.as_str(), FileStatus::Modified))
            }
            Some(_) => {}
        }
    }

    let present: std::collections::BTreeSet<&str> = working.iter().map(|p| p.as_str()).collect();
    for path in head.keys() {
        if !present.contains(path.as_str()) {
            entries.push(StatusEntry::new(path.as_str(), FileStatus::Deleted));
        }
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryAdapter;
    use pretty_assertions::assert_eq;

    fn blob(content: &[u8]) -> BlobId {
        BlobId::new(hash_object(ObjectKind::Blob, content))
    }

    #[tokio::test]
    async fn test_list_files_skips_git_dir() {
        let fs = MemoryAdapter::new();
        fs.write_file(".git/HEAD", b"ref: refs/heads/main\n").await.unwrap();
        fs.write_file("requirements/REQ-001.md", b"r").await.unwrap();
        fs.write_file("assets/img/logo.png", b"png").await.unwrap();
        fs.mkdir("usecases").await.unwrap();

        let files: Vec<String> = list_files(&fs).await.unwrap().into_iter().map(|p| p.into_string()).collect();
        assert_eq!(files, vec!["assets/img/logo.png", "requirements/REQ-001.md"]);
    }

    #[tokio::test]
    async fn test_status_classifies_paths() {
        let fs = MemoryAdapter::new();
        fs.write_file("requirements/REQ-001.md", b"same").await.unwrap();
        fs.write_file("requirements/REQ-002.md", b"edited").await.unwrap();
        fs.write_file("usecases/UC-001.md", b"brand new").await.unwrap();

        let mut head = BTreeMap::new();
        head.insert("requirements/REQ-001.md".to_string(), blob(b"same"));
        head.insert("requirements/REQ-002.md".to_string(), blob(b"original"));
        head.insert("risks/RISK-001.md".to_string(), blob(b"gone"));

        let status = compute_status(&fs, &head).await.unwrap();
        assert_eq!(
            status,
            vec![
                StatusEntry::new("requirements/REQ-002.md", FileStatus::Modified),
                StatusEntry::new("risks/RISK-001.md", FileStatus::Deleted),
                StatusEntry::new("usecases/UC-001.md", FileStatus::New),
            ]
        );
    }

    #[tokio::test]
    async fn test_clean_tree_is_empty() {
        let fs = MemoryAdapter::new();
        fs.write_file("a.txt", b"a").await.unwrap();
        let mut head = BTreeMap::new();
        head.insert("a.txt".to_string(), blob(b"a"));
        assert!(compute_status(&fs, &head).await.unwrap().is_empty());
    }
}
