//! Adapter over a real directory, built on `tokio::fs`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::adapter::{normalize_path, FileStat, FsError, FsResult, StorageAdapter};

/// A storage adapter rooted at a directory on disk.
///
/// Symbolic links inside the root are refused rather than followed.
#[derive(Debug, Clone)]
pub struct DiskAdapter {
    root: PathBuf,
}

impl DiskAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> FsResult<(String, PathBuf)> {
        let normalized = normalize_path(path)?;
        let full = if normalized.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&normalized)
        };
        Ok((normalized, full))
    }
}

fn map_io(path: &str, err: std::io::Error) -> FsError {
    match err.kind() {
        ErrorKind::NotFound => FsError::NotFound(path.to_string()),
        ErrorKind::PermissionDenied => FsError::WriteRejected {
            path: path.to_string(),
            reason: err.to_string(),
        },
        _ => FsError::Io {
            path: path.to_string(),
            source: err,
        },
    }
}

#[async_trait]
impl StorageAdapter for DiskAdapter {
    async fn stat(&self, path: &str) -> FsResult<FileStat> {
        let (normalized, full) = self.resolve(path)?;
        let meta = tokio::fs::symlink_metadata(&full)
            .await
            .map_err(|e| map_io(&normalized, e))?;

        if meta.file_type().is_symlink() {
            return Err(FsError::SymlinkUnsupported(normalized));
        }

        let mtime = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        if meta.is_dir() {
            Ok(FileStat::directory(mtime))
        } else {
            Ok(FileStat::file(meta.len(), mtime))
        }
    }

    async fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        let stat = self.stat(path).await?;
        let (normalized, full) = self.resolve(path)?;
        if stat.is_directory() {
            return Err(FsError::IsADirectory(normalized));
        }
        tokio::fs::read(&full).await.map_err(|e| map_io(&normalized, e))
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> FsResult<()> {
        let (normalized, full) = self.resolve(path)?;
        if normalized.is_empty() {
            return Err(FsError::IsADirectory(normalized));
        }
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(&normalized, e))?;
        }
        debug!(path = %normalized, bytes = data.len(), "write file");
        tokio::fs::write(&full, data)
            .await
            .map_err(|e| map_io(&normalized, e))
    }

    async fn unlink(&self, path: &str) -> FsResult<()> {
        let (normalized, full) = self.resolve(path)?;
        let stat = self.stat(&normalized).await?;
        if stat.is_directory() {
            return Err(FsError::IsADirectory(normalized));
        }
        tokio::fs::remove_file(&full)
            .await
            .map_err(|e| map_io(&normalized, e))
    }

    async fn mkdir(&self, path: &str) -> FsResult<()> {
        let (normalized, full) = self.resolve(path)?;
        tokio::fs::create_dir_all(&full)
            .await
            .map_err(|e| map_io(&normalized, e))
    }

    async fn rmdir(&self, path: &str) -> FsResult<()> {
        let (normalized, full) = self.resolve(path)?;
        if !self.readdir(&normalized).await?.is_empty() {
            return Ok(());
        }
        tokio::fs::remove_dir(&full)
            .await
            .map_err(|e| map_io(&normalized, e))
    }

    async fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        let (normalized, full) = self.resolve(path)?;
        let stat = self.stat(&normalized).await?;
        if !stat.is_directory() {
            return Err(FsError::NotADirectory(normalized));
        }

        let mut entries = tokio::fs::read_dir(&full)
            .await
            .map_err(|e| map_io(&normalized, e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| map_io(&normalized, e))?
        {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, DiskAdapter) {
        let dir = TempDir::new().unwrap();
        let fs = DiskAdapter::new(dir.path());
        (dir, fs)
    }

    #[tokio::test]
    async fn test_stat_missing_fails() {
        let (_dir, fs) = setup();
        assert!(fs.stat("nope.md").await.unwrap_err().is_not_found());
        assert!(fs.lstat("nope.md").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_write_creates_parents() {
        let (dir, fs) = setup();
        fs.write_file("requirements/REQ-001.md", b"body").await.unwrap();

        assert!(dir.path().join("requirements/REQ-001.md").exists());
        assert_eq!(fs.read_file("requirements/REQ-001.md").await.unwrap(), b"body");
        assert!(fs.stat("requirements").await.unwrap().is_directory());
    }

    #[tokio::test]
    async fn test_readdir_sorted() {
        let (_dir, fs) = setup();
        fs.write_file("b.txt", b"").await.unwrap();
        fs.write_file("a.txt", b"").await.unwrap();
        fs.mkdir("c").await.unwrap();
        assert_eq!(fs.readdir("").await.unwrap(), vec!["a.txt", "b.txt", "c"]);
    }

    #[tokio::test]
    async fn test_rmdir_non_empty_is_noop() {
        let (_dir, fs) = setup();
        fs.write_file("d/f.txt", b"x").await.unwrap();
        fs.rmdir("d").await.unwrap();
        assert!(fs.stat("d").await.is_ok());

        fs.unlink("d/f.txt").await.unwrap();
        fs.rmdir("d").await.unwrap();
        assert!(fs.stat("d").await.unwrap_err().is_not_found());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_is_refused() {
        let (dir, fs) = setup();
        fs.write_file("target.txt", b"x").await.unwrap();
        std::os::unix::fs::symlink(dir.path().join("target.txt"), dir.path().join("link.txt")).unwrap();

        assert!(matches!(fs.lstat("link.txt").await, Err(FsError::SymlinkUnsupported(_))));
        assert!(matches!(fs.stat("link.txt").await, Err(FsError::SymlinkUnsupported(_))));
    }

    #[tokio::test]
    async fn test_escape_is_rejected() {
        let (_dir, fs) = setup();
        assert!(matches!(fs.read_file("../outside").await, Err(FsError::InvalidPath(_))));
    }
}
