//! The adapter trait, its stat record and its error type.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// errors raised by storage adapters
#[derive(Debug, Error)]
pub enum FsError {
    /// the path does not exist
    #[error("no such file or directory: {0}")]
    NotFound(String),

    /// a path component that must be a directory is a file
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// a file operation was attempted on a directory
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// symbolic links are never followed or created
    #[error("symbolic links are not supported: {0}")]
    SymlinkUnsupported(String),

    /// the path escapes the adapter root or is otherwise malformed
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// the backend refused a write (permissions, quota, detached handle)
    #[error("write rejected at {path}: {reason}")]
    WriteRejected { path: String, reason: String },

    /// file content was expected to be UTF-8
    #[error("invalid utf-8 in {0}")]
    InvalidEncoding(String),

    /// any other backend I/O failure
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    /// check if this error means the path is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }

    /// check if this error came from a rejected write
    pub fn is_write_rejected(&self) -> bool {
        matches!(self, FsError::WriteRejected { .. })
    }
}

/// result alias for adapter operations
pub type FsResult<T> = Result<T, FsError>;

/// what a path points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// result of a successful `stat`/`lstat`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub kind: EntryKind,
    pub size: u64,
    pub mtime: DateTime<Utc>,
}

impl FileStat {
    pub fn file(size: u64, mtime: DateTime<Utc>) -> Self {
        Self {
            kind: EntryKind::File,
            size,
            mtime,
        }
    }

    pub fn directory(mtime: DateTime<Utc>) -> Self {
        Self {
            kind: EntryKind::Directory,
            size: 0,
            mtime,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// links are never reported; adapters fail instead
    pub fn is_symlink(&self) -> bool {
        false
    }
}

/// The minimal POSIX-like surface the version-control engine needs.
///
/// All paths are relative, `/`-separated and interpreted against the
/// adapter's root. The empty string names the root itself.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// stat a path. Must fail with [`FsError::NotFound`] when it is absent.
    async fn stat(&self, path: &str) -> FsResult<FileStat>;

    /// identical to `stat`; links are unsupported so there is nothing to
    /// distinguish
    async fn lstat(&self, path: &str) -> FsResult<FileStat> {
        self.stat(path).await
    }

    /// read a whole file
    async fn read_file(&self, path: &str) -> FsResult<Vec<u8>>;

    /// read a whole file as UTF-8
    async fn read_to_string(&self, path: &str) -> FsResult<String> {
        let bytes = self.read_file(path).await?;
        String::from_utf8(bytes).map_err(|_| FsError::InvalidEncoding(path.to_string()))
    }

    /// write a whole file, creating parent directories and replacing any
    /// previous content
    async fn write_file(&self, path: &str, data: &[u8]) -> FsResult<()>;

    /// remove a file
    async fn unlink(&self, path: &str) -> FsResult<()>;

    /// create a directory and its parents; existing directories are fine
    async fn mkdir(&self, path: &str) -> FsResult<()>;

    /// remove an empty directory. A non-empty directory is left alone.
    async fn rmdir(&self, path: &str) -> FsResult<()>;

    /// immediate child names of a directory, sorted
    async fn readdir(&self, path: &str) -> FsResult<Vec<String>>;

    async fn readlink(&self, path: &str) -> FsResult<String> {
        Err(FsError::SymlinkUnsupported(path.to_string()))
    }

    async fn symlink(&self, _target: &str, path: &str) -> FsResult<()> {
        Err(FsError::SymlinkUnsupported(path.to_string()))
    }

    /// existence probe derived from `stat` failing with NotFound
    async fn exists(&self, path: &str) -> FsResult<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Normalize a relative adapter path.
///
/// Leading `/` and `./`, empty segments and `.` segments are dropped;
/// `..` is rejected so no adapter can be walked out of its root.
pub fn normalize_path(path: &str) -> FsResult<String> {
    let mut segments = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return Err(FsError::InvalidPath(path.to_string())),
            other => segments.push(other),
        }
    }
    Ok(segments.join("/"))
}

/// parent directory of a normalized path ("" for top-level entries)
pub(crate) fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..pos],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("requirements/REQ-001.md").unwrap(), "requirements/REQ-001.md");
        assert_eq!(normalize_path("/requirements//REQ-001.md").unwrap(), "requirements/REQ-001.md");
        assert_eq!(normalize_path("./a/./b/").unwrap(), "a/b");
        assert_eq!(normalize_path("").unwrap(), "");
        assert_eq!(normalize_path("/").unwrap(), "");
    }

    #[test]
    fn test_normalize_rejects_parent_segments() {
        assert!(matches!(normalize_path("../etc/passwd"), Err(FsError::InvalidPath(_))));
        assert!(matches!(normalize_path("a/../../b"), Err(FsError::InvalidPath(_))));
    }

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("a/b/c.md"), "a/b");
        assert_eq!(parent_of("c.md"), "");
    }

    #[test]
    fn test_stat_predicates() {
        let now = Utc::now();
        let file = FileStat::file(12, now);
        assert!(file.is_file());
        assert!(!file.is_directory());
        assert!(!file.is_symlink());

        let dir = FileStat::directory(now);
        assert!(dir.is_directory());
        assert_eq!(dir.size, 0);
    }

    #[test]
    fn test_error_classification() {
        assert!(FsError::NotFound("x".into()).is_not_found());
        assert!(!FsError::SymlinkUnsupported("x".into()).is_not_found());
        let rejected = FsError::WriteRejected {
            path: "x".into(),
            reason: "read-only".into(),
        };
        assert!(rejected.is_write_rejected());
    }
}
