//! `.git/index` mirror.
//!
//! The engine never stages through the index; commits are built straight
//! from the HEAD tree. The file is still written after every commit so that
//! `git status` run by hand in the same directory agrees with ours.
//!
//! Layout (version 2):
//!
//! ```text
//! "DIRC" | version u32 | count u32
//! entries, sorted by path, each padded with NULs to a multiple of 8
//! SHA-1 of everything above
//! ```

use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BlobId, ObjectId};

const SIGNATURE: &[u8; 4] = b"DIRC";
const VERSION: u32 = 2;
const REGULAR_FILE_MODE: u32 = 0o100644;
/// fixed-size part of an entry before the path
const ENTRY_HEADER_LEN: usize = 62;

/// one tracked file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub path: String,
    pub id: BlobId,
    pub size: u32,
    pub mtime: DateTime<Utc>,
}

impl IndexEntry {
    /// entry without stat data; git re-hashes the file on next status
    pub fn unstatted(path: impl Into<String>, id: BlobId) -> Self {
        Self {
            path: path.into(),
            id,
            size: 0,
            mtime: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    entries: Vec<IndexEntry>,
}

impl Index {
    pub fn new(mut entries: Vec<IndexEntry>) -> Self {
        entries.sort_by(|a, b| a.path.as_bytes().cmp(b.path.as_bytes()));
        entries.dedup_by(|a, b| a.path == b.path);
        Self { entries }
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.entries
            .binary_search_by(|e| e.path.as_bytes().cmp(path.as_bytes()))
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(SIGNATURE);
        out.extend_from_slice(&VERSION.to_be_bytes());
        out.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());

        for entry in &self.entries {
            let secs = entry.mtime.timestamp().clamp(0, u32::MAX as i64) as u32;
            let nanos = entry.mtime.timestamp_subsec_nanos();
            let start = out.len();

            // ctime, mtime
            for _ in 0..2 {
                out.extend_from_slice(&secs.to_be_bytes());
                out.extend_from_slice(&nanos.to_be_bytes());
            }
            // dev, ino
            out.extend_from_slice(&[0u8; 8]);
            out.extend_from_slice(&REGULAR_FILE_MODE.to_be_bytes());
            // uid, gid
            out.extend_from_slice(&[0u8; 8]);
            out.extend_from_slice(&entry.size.to_be_bytes());
            out.extend_from_slice(entry.id.raw().as_bytes());

            let name_len = entry.path.len().min(0xFFF) as u16;
            out.extend_from_slice(&name_len.to_be_bytes());
            out.extend_from_slice(entry.path.as_bytes());

            let written = out.len() - start;
            let padded = (written + 8) / 8 * 8;
            out.resize(start + padded, 0);
        }

        let digest: [u8; 20] = Sha1::digest(&out).into();
        out.extend_from_slice(&digest);
        out
    }

    pub fn decode(bytes: &[u8]) -> StorageResult<Self> {
        let corrupted = |reason: &str| StorageError::CorruptedData {
            path: ".git/index".to_string(),
            reason: reason.to_string(),
        };

        if bytes.len() < 12 + 20 {
            return Err(corrupted("file too short"));
        }
        let (content, trailer) = bytes.split_at(bytes.len() - 20);
        let digest: [u8; 20] = Sha1::digest(content).into();
        if digest.as_slice() != trailer {
            return Err(corrupted("checksum mismatch"));
        }
        if &content[..4] != SIGNATURE {
            return Err(corrupted("bad signature"));
        }
        let version = read_u32(content, 4);
        if version != VERSION {
            return Err(corrupted("unsupported index version"));
        }
        let count = read_u32(content, 8) as usize;

        // the header count is untrusted; every entry takes at least a header
        let mut entries = Vec::with_capacity(count.min(content.len() / ENTRY_HEADER_LEN));
        let mut pos = 12;
        for _ in 0..count {
            if pos + ENTRY_HEADER_LEN > content.len() {
                return Err(corrupted("truncated entry"));
            }
            let secs = read_u32(content, pos + 8);
            let nanos = read_u32(content, pos + 12);
            let size = read_u32(content, pos + 36);
            let mut raw = [0u8; 20];
            raw.copy_from_slice(&content[pos + 40..pos + 60]);

            let name_start = pos + ENTRY_HEADER_LEN;
            let name_end = content[name_start..]
                .iter()
                .position(|b| *b == 0)
                .map(|n| name_start + n)
                .ok_or_else(|| corrupted("unterminated path"))?;
            let path = std::str::from_utf8(&content[name_start..name_end])
                .map_err(|_| corrupted("path is not utf-8"))?
                .to_string();

            let written = name_end - pos;
            pos += (written + 8) / 8 * 8;

            entries.push(IndexEntry {
                path,
                id: BlobId::new(ObjectId::from_bytes(raw)),
                size,
                mtime: DateTime::<Utc>::from_timestamp(secs as i64, nanos).unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            });
        }
        Ok(Self { entries })
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_be_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::object::{hash_object, ObjectKind};

    fn blob(content: &[u8]) -> BlobId {
        BlobId::new(hash_object(ObjectKind::Blob, content))
    }

    #[test]
    fn test_entries_sorted_and_padded() {
        let index = Index::new(vec![
            IndexEntry::unstatted("usecases/UC-001.md", blob(b"u")),
            IndexEntry::unstatted("requirements/REQ-001.md", blob(b"r")),
        ]);
        let bytes = index.encode();

        assert_eq!(&bytes[..4], b"DIRC");
        // header + two entries + trailer, entries are 8-aligned
        let body = bytes.len() - 12 - 20;
        assert_eq!(body % 8, 0);

        let decoded = Index::decode(&bytes).unwrap();
        assert_eq!(decoded.entries()[0].path, "requirements/REQ-001.md");
        assert_eq!(decoded, index);
        assert_eq!(decoded.get("usecases/UC-001.md").unwrap().id, blob(b"u"));
        assert!(decoded.get("risks/RISK-001.md").is_none());
    }

    #[test]
    fn test_stat_fields_survive() {
        let mtime = DateTime::<Utc>::from_timestamp(1_700_000_000, 42).unwrap();
        let entry = IndexEntry {
            path: "a.txt".to_string(),
            id: blob(b"hello\n"),
            size: 6,
            mtime,
        };
        let decoded = Index::decode(&Index::new(vec![entry.clone()]).encode()).unwrap();
        assert_eq!(decoded.entries(), &[entry]);
    }

    #[test]
    fn test_checksum_is_verified() {
        let mut bytes = Index::new(vec![IndexEntry::unstatted("a", blob(b"a"))]).encode();
        bytes[20] ^= 0xff;
        assert!(Index::decode(&bytes).is_err());
        assert!(Index::decode(b"DIRC").is_err());
    }

    #[test]
    fn test_oversized_entry_count_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"DIRC");
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());
        let digest: [u8; 20] = Sha1::digest(&bytes).into();
        bytes.extend_from_slice(&digest);

        let err = Index::decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("truncated entry"), "{err}");
    }
}
