//! Loose object store.
//!
//! Objects use git's exact on-disk framing so a stock git client can read
//! the repository:
//!
//! ```text
//! .git/objects/4b/825dc642cb6eb9a060e54bf8d69288fbee4904
//!              ^^ first byte of the SHA-1, rest is the file name
//! content = zlib("{kind} {len}\0{body}")
//! ```
//!
//! Everything goes through the [`StorageAdapter`], never a filesystem.

use std::io::{Read, Write};
use std::sync::Arc;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};
use tracing::trace;

use crate::fs::StorageAdapter;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::ObjectId;

/// the four git object kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
            ObjectKind::Tag => "tag",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blob" => Some(ObjectKind::Blob),
            "tree" => Some(ObjectKind::Tree),
            "commit" => Some(ObjectKind::Commit),
            "tag" => Some(ObjectKind::Tag),
            _ => None,
        }
    }
}

fn header(kind: ObjectKind, len: usize) -> Vec<u8> {
    format!("{} {}\0", kind.as_str(), len).into_bytes()
}

/// compute the object name without storing anything
pub fn hash_object(kind: ObjectKind, body: &[u8]) -> ObjectId {
    let mut hasher = Sha1::new();
    hasher.update(header(kind, body.len()));
    hasher.update(body);
    let digest: [u8; 20] = hasher.finalize().into();
    ObjectId::from_bytes(digest)
}

/// frame and compress an object, returning its name and stored bytes
pub fn encode_loose(kind: ObjectKind, body: &[u8]) -> StorageResult<(ObjectId, Vec<u8>)> {
    let id = hash_object(kind, body);
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&header(kind, body.len()))?;
    encoder.write_all(body)?;
    Ok((id, encoder.finish()?))
}

/// inflate and unframe a stored object
pub fn decode_loose(path: &str, stored: &[u8]) -> StorageResult<(ObjectKind, Vec<u8>)> {
    let mut raw = Vec::new();
    ZlibDecoder::new(stored).read_to_end(&mut raw)?;

    let corrupted = |reason: &str| StorageError::CorruptedData {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let nul = raw
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| corrupted("missing header terminator"))?;
    let header = std::str::from_utf8(&raw[..nul]).map_err(|_| corrupted("header is not utf-8"))?;
    let (kind, len) = header
        .split_once(' ')
        .ok_or_else(|| corrupted("malformed header"))?;
    let kind = ObjectKind::parse(kind).ok_or_else(|| corrupted("unknown object kind"))?;
    let len: usize = len.parse().map_err(|_| corrupted("malformed length"))?;

    let body = raw.split_off(nul + 1);
    if body.len() != len {
        return Err(corrupted("length mismatch"));
    }
    Ok((kind, body))
}

/// Content-addressed object storage inside `.git/objects`.
#[derive(Clone)]
pub struct ObjectStore {
    adapter: Arc<dyn StorageAdapter>,
    objects_dir: String,
}

impl ObjectStore {
    pub fn new(adapter: Arc<dyn StorageAdapter>, git_dir: &str) -> Self {
        Self {
            adapter,
            objects_dir: format!("{}/objects", git_dir),
        }
    }

    pub fn objects_dir(&self) -> &str {
        &self.objects_dir
    }

    fn object_path(&self, id: ObjectId) -> String {
        let hex = id.to_hex();
        format!("{}/{}/{}", self.objects_dir, &hex[..2], &hex[2..])
    }

    /// check if an object is already stored
    pub async fn contains(&self, id: ObjectId) -> StorageResult<bool> {
        Ok(self.adapter.exists(&self.object_path(id)).await?)
    }

    /// store an object; already-present objects are not rewritten
    pub async fn write(&self, kind: ObjectKind, body: &[u8]) -> StorageResult<ObjectId> {
        let (id, stored) = encode_loose(kind, body)?;
        if self.contains(id).await? {
            return Ok(id);
        }
        let path = self.object_path(id);
        self.adapter
            .write_file(&path, &stored)
            .await
            .map_err(|e| StorageError::write(path.clone(), e))?;
        trace!(id = %id.short(), kind = kind.as_str(), "wrote object");
        Ok(id)
    }

    /// read any object
    pub async fn read(&self, id: ObjectId) -> StorageResult<(ObjectKind, Vec<u8>)> {
        let path = self.object_path(id);
        let stored = match self.adapter.read_file(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Err(StorageError::ObjectNotFound(id.to_hex())),
            Err(e) => return Err(e.into()),
        };
        let (kind, body) = decode_loose(&path, &stored)?;
        if hash_object(kind, &body) != id {
            return Err(StorageError::CorruptedData {
                path,
                reason: "content does not match object name".to_string(),
            });
        }
        Ok((kind, body))
    }

    /// read an object and insist on its kind
    pub async fn read_kind(&self, id: ObjectId, expected: ObjectKind) -> StorageResult<Vec<u8>> {
        let (kind, body) = self.read(id).await?;
        if kind != expected {
            return Err(StorageError::UnexpectedObjectKind {
                id: id.to_hex(),
                expected: expected.as_str().to_string(),
                found: kind.as_str().to_string(),
            });
        }
        Ok(body)
    }

    /// number of loose objects (diagnostics and tests)
    pub async fn count(&self) -> StorageResult<usize> {
        let fanout = match self.adapter.readdir(&self.objects_dir).await {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut count = 0;
        for dir in fanout {
            if dir.len() != 2 || !dir.chars().all(|c| c.is_ascii_hexdigit()) {
                continue;
            }
            count += self
                .adapter
                .readdir(&format!("{}/{}", self.objects_dir, dir))
                .await?
                .len();
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryAdapter;

    fn store() -> (MemoryAdapter, ObjectStore) {
        let fs = MemoryAdapter::new();
        let store = ObjectStore::new(Arc::new(fs.clone()), ".git");
        (fs, store)
    }

    #[test]
    fn test_hash_matches_git() {
        // `git hash-object -t blob --stdin <<< ''` minus the newline
        assert_eq!(
            hash_object(ObjectKind::Blob, b"").to_hex(),
            "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"
        );
        assert_eq!(
            hash_object(ObjectKind::Blob, b"hello\n").to_hex(),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
        assert_eq!(
            hash_object(ObjectKind::Tree, b"").to_hex(),
            "4b825dc642cb6eb9a060e54bf8d69288fbee4904"
        );
    }

    #[test]
    fn test_loose_framing() {
        let (id, stored) = encode_loose(ObjectKind::Blob, b"hello\n").unwrap();
        let (kind, body) = decode_loose("x", &stored).unwrap();
        assert_eq!(kind, ObjectKind::Blob);
        assert_eq!(body, b"hello\n");
        assert_eq!(id, hash_object(ObjectKind::Blob, b"hello\n"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_loose("x", b"not zlib at all").is_err());
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (fs, store) = store();
        let id = store.write(ObjectKind::Blob, b"hello\n").await.unwrap();

        assert!(fs
            .stat(".git/objects/ce/013625030ba8dba906f756967f9e9ca394464a")
            .await
            .unwrap()
            .is_file());

        let body = store.read_kind(id, ObjectKind::Blob).await.unwrap();
        assert_eq!(body, b"hello\n");

        let wrong = store.read_kind(id, ObjectKind::Tree).await;
        assert!(matches!(wrong, Err(StorageError::UnexpectedObjectKind { .. })));
    }

    #[tokio::test]
    async fn test_write_is_deduplicated() {
        let (_fs, store) = store();
        store.write(ObjectKind::Blob, b"same").await.unwrap();
        store.write(ObjectKind::Blob, b"same").await.unwrap();
        store.write(ObjectKind::Blob, b"other").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_missing_object() {
        let (_fs, store) = store();
        let id = hash_object(ObjectKind::Blob, b"never stored");
        assert!(!store.contains(id).await.unwrap());
        assert!(matches!(store.read(id).await, Err(StorageError::ObjectNotFound(_))));
    }

    #[tokio::test]
    async fn test_rejected_write_is_write_failure() {
        let (fs, store) = store();
        fs.reject_writes_under(".git");
        let err = store.write(ObjectKind::Blob, b"x").await.unwrap_err();
        assert!(err.is_write_failure());
    }
}
