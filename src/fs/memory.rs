//! In-memory adapter.
//!
//! Files live in a sorted map; directories are either created explicitly or
//! inferred from the prefixes of stored file paths, so `readdir` reports a
//! folder as soon as any file exists below it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::adapter::{normalize_path, parent_of, FileStat, FsError, FsResult, StorageAdapter};

#[derive(Debug, Clone)]
struct MemoryFile {
    data: Vec<u8>,
    mtime: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<String, MemoryFile>,
    dirs: BTreeSet<String>,
    /// writes under any of these prefixes fail with `WriteRejected`
    rejected_prefixes: Vec<String>,
}

impl MemoryState {
    fn is_dir(&self, path: &str) -> bool {
        if path.is_empty() || self.dirs.contains(path) {
            return true;
        }
        let prefix = format!("{}/", path);
        self.files
            .range(prefix.clone()..)
            .next()
            .map(|(k, _)| k.starts_with(&prefix))
            .unwrap_or(false)
    }

    fn check_writable(&self, path: &str) -> FsResult<()> {
        for prefix in &self.rejected_prefixes {
            if path == prefix || path.starts_with(&format!("{}/", prefix)) || prefix.is_empty() {
                return Err(FsError::WriteRejected {
                    path: path.to_string(),
                    reason: "backend is read-only for this location".to_string(),
                });
            }
        }
        Ok(())
    }

    /// make sure every ancestor of `path` can be a directory
    fn ensure_parents(&mut self, path: &str) -> FsResult<()> {
        let mut current = parent_of(path);
        let mut pending = Vec::new();
        while !current.is_empty() {
            if self.files.contains_key(current) {
                return Err(FsError::NotADirectory(current.to_string()));
            }
            pending.push(current.to_string());
            current = parent_of(current);
        }
        self.dirs.extend(pending);
        Ok(())
    }
}

/// A cloneable handle to an in-memory file tree.
///
/// Clones share the same state, which lets a test keep a handle to inspect
/// or sabotage storage after passing it to a repository.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every write at or below `prefix` ("" rejects everything).
    pub fn reject_writes_under(&self, prefix: &str) {
        let prefix = normalize_path(prefix).unwrap_or_default();
        self.state.write().rejected_prefixes.push(prefix);
    }

    /// Lift all write rejections.
    pub fn allow_all_writes(&self) {
        self.state.write().rejected_prefixes.clear();
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn stat(&self, path: &str) -> FsResult<FileStat> {
        let path = normalize_path(path)?;
        let state = self.state.read();
        if let Some(file) = state.files.get(&path) {
            return Ok(FileStat::file(file.data.len() as u64, file.mtime));
        }
        if state.is_dir(&path) {
            return Ok(FileStat::directory(DateTime::<Utc>::UNIX_EPOCH));
        }
        Err(FsError::NotFound(path))
    }

    async fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        let path = normalize_path(path)?;
        let state = self.state.read();
        match state.files.get(&path) {
            Some(file) => Ok(file.data.clone()),
            None if state.is_dir(&path) => Err(FsError::IsADirectory(path)),
            None => Err(FsError::NotFound(path)),
        }
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> FsResult<()> {
        let path = normalize_path(path)?;
        let mut state = self.state.write();
        state.check_writable(&path)?;
        if path.is_empty() || state.is_dir(&path) {
            return Err(FsError::IsADirectory(path));
        }
        state.ensure_parents(&path)?;
        state.files.insert(
            path,
            MemoryFile {
                data: data.to_vec(),
                mtime: Utc::now(),
            },
        );
        Ok(())
    }

    async fn unlink(&self, path: &str) -> FsResult<()> {
        let path = normalize_path(path)?;
        let mut state = self.state.write();
        state.check_writable(&path)?;
        match state.files.remove(&path) {
            Some(_) => Ok(()),
            None if state.is_dir(&path) => Err(FsError::IsADirectory(path)),
            None => Err(FsError::NotFound(path)),
        }
    }

    async fn mkdir(&self, path: &str) -> FsResult<()> {
        let path = normalize_path(path)?;
        if path.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write();
        state.check_writable(&path)?;
        if state.files.contains_key(&path) {
            return Err(FsError::NotADirectory(path));
        }
        state.ensure_parents(&path)?;
        state.dirs.insert(path);
        Ok(())
    }

    async fn rmdir(&self, path: &str) -> FsResult<()> {
        let path = normalize_path(path)?;
        let mut state = self.state.write();
        state.check_writable(&path)?;
        if state.files.contains_key(&path) {
            return Err(FsError::NotADirectory(path));
        }
        if !state.is_dir(&path) {
            return Err(FsError::NotFound(path));
        }
        let prefix = format!("{}/", path);
        let has_children = state.files.keys().any(|k| k.starts_with(&prefix))
            || state.dirs.iter().any(|d| d.starts_with(&prefix));
        if !has_children {
            state.dirs.remove(&path);
        }
        Ok(())
    }

    async fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        let path = normalize_path(path)?;
        let state = self.state.read();
        if state.files.contains_key(&path) {
            return Err(FsError::NotADirectory(path));
        }
        if !state.is_dir(&path) {
            return Err(FsError::NotFound(path));
        }

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };

        let children: BTreeSet<String> = state
            .files
            .keys()
            .chain(state.dirs.iter())
            .filter_map(|key| key.strip_prefix(prefix.as_str()))
            .filter(|rest| !rest.is_empty())
            .map(|rest| rest.split('/').next().unwrap_or(rest).to_string())
            .collect();

        Ok(children.into_iter().collect())
    }
}
