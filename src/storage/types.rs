//! core type-safe wrappers around git primitives for the storage layer.

use std::fmt;
use std::fmt::Formatter;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// raw 20-byte SHA-1 object name
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) [u8; 20]);

impl ObjectId {
    pub(crate) fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// parse a 40-character hex name
    pub fn from_hex(hex_str: &str) -> Result<Self, InvalidNameError> {
        let trimmed = hex_str.trim();
        let bytes = hex::decode(trimmed).map_err(|_| InvalidNameError::InvalidHash(trimmed.to_string()))?;
        let array: [u8; 20] = bytes
            .try_into()
            .map_err(|_| InvalidNameError::InvalidHash(trimmed.to_string()))?;
        Ok(Self(array))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// short form of the object name
    pub fn short(&self) -> String {
        self.to_hex()[..7].to_string()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short())
    }
}

/// This makes sure we don't accidentally pass a blob ID where a commit ID
/// is expected. The inner ObjectId is only accessible within the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitId(pub(crate) ObjectId);

impl CommitId {
    pub(crate) fn new(oid: ObjectId) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> ObjectId {
        self.0
    }

    /// parse CommitId from a hex string
    pub fn from_hex(hex: &str) -> Result<Self, InvalidNameError> {
        ObjectId::from_hex(hex).map(CommitId)
    }

    /// short form of the commit ID
    pub fn short(&self) -> String {
        self.0.short()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git blob identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(pub(crate) ObjectId);

impl BlobId {
    pub(crate) fn new(oid: ObjectId) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> ObjectId {
        self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git tree identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(pub(crate) ObjectId);

impl TreeId {
    pub(crate) fn new(oid: ObjectId) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> ObjectId {
        self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated path inside the working tree.
///
/// Paths are relative and `/`-separated. They may not climb out of the
/// root and may not reach into the `.git` directory.
///
/// Format for artifacts: `{type-folder}/{id}.{ext}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoPath(String);

impl RepoPath {
    /// directory holding repository internals
    pub const GIT_DIR: &'static str = ".git";

    pub fn new(path: impl Into<String>) -> Result<Self, InvalidNameError> {
        let path = path.into();
        Self::validate(&path)?;
        Ok(Self(path))
    }

    /// for paths assembled from components that are already known to be valid
    pub(crate) fn from_trusted(path: String) -> Self {
        debug_assert!(Self::validate(&path).is_ok(), "invalid trusted path {}", path);
        Self(path)
    }

    /// build `{folder}/{file}`
    pub fn join(folder: &str, file: &str) -> Result<Self, InvalidNameError> {
        Self::new(format!("{}/{}", folder, file))
    }

    fn validate(path: &str) -> Result<(), InvalidNameError> {
        if path.is_empty() {
            return Err(InvalidNameError::Empty);
        }

        if path.len() > 4096 {
            return Err(InvalidNameError::TooLong(path.len()));
        }

        if path.starts_with('/') || path.ends_with('/') || path.contains('\\') {
            return Err(InvalidNameError::InvalidPath(path.to_string()));
        }

        for segment in path.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(InvalidNameError::InvalidPath(path.to_string()));
            }
            if let Some((position, c)) = segment.char_indices().find(|(_, c)| c.is_control()) {
                return Err(InvalidNameError::InvalidCharacter { char: c, position });
            }
        }

        let first = path.split('/').next().unwrap_or_default();
        if first == Self::GIT_DIR {
            return Err(InvalidNameError::Reserved(path.to_string()));
        }

        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// first path segment
    pub fn folder(&self) -> &str {
        self.0.split('/').next().unwrap_or(&self.0)
    }

    /// last path segment
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RepoPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// a validated tag name (single ref component)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagName(String);

impl TagName {
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(InvalidNameError::Empty);
        }
        if name.len() > 200 {
            return Err(InvalidNameError::TooLong(name.len()));
        }
        if name.starts_with('.') || name.ends_with('.') || name.ends_with(".lock") || name.contains("..") {
            return Err(InvalidNameError::InvalidPath(name));
        }
        for (i, c) in name.chars().enumerate() {
            if !c.is_ascii_alphanumeric() && !matches!(c, '-' | '_' | '.') {
                return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
            }
        }
        Ok(Self(name))
    }

    /// Turn free text into a valid tag name, replacing anything git would
    /// refuse with `-`.
    pub fn sanitized(raw: &str) -> Result<Self, InvalidNameError> {
        let mut cleaned: String = raw
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '-' })
            .collect();
        while cleaned.contains("..") {
            cleaned = cleaned.replace("..", ".");
        }
        let mut cleaned = cleaned.trim_start_matches('.');
        loop {
            let trimmed = cleaned.trim_end_matches('.').trim_end_matches(".lock");
            if trimmed.len() == cleaned.len() {
                break;
            }
            cleaned = trimmed;
        }
        Self::new(cleaned)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// full ref path, e.g. `refs/tags/baseline-v1`
    pub fn as_ref_path(&self) -> String {
        format!("refs/tags/{}", self.0)
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// the single line of history this engine maintains
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchName(String);

impl BranchName {
    /// the main branch name
    pub const MAIN: &'static str = "main";

    pub fn main() -> Self {
        Self(Self::MAIN.to_string())
    }

    /// get the full ref path (e.g., "refs/heads/main")
    pub fn as_ref_path(&self) -> String {
        format!("refs/heads/{}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// git signature (author/committer info)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSignature {
    pub name: String,
    pub email: String,
}

impl GitSignature {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// default signature for reqtrace commits
    pub fn reqtrace() -> Self {
        Self::new("ReqTrace User", "user@reqtrace.local")
    }

    /// same email, different display name (per-commit author)
    pub fn with_name(&self, name: &str) -> Self {
        let name = name.trim();
        if name.is_empty() {
            return self.clone();
        }
        Self::new(name, self.email.clone())
    }

    /// git's `Name <email> seconds +0000` form
    pub(crate) fn to_git_line(&self, when: DateTime<Utc>) -> String {
        let clean = |s: &str| s.replace(['<', '>', '\n'], "");
        format!("{} <{}> {} +0000", clean(&self.name), clean(&self.email), when.timestamp())
    }
}

impl Default for GitSignature {
    fn default() -> Self {
        Self::reqtrace()
    }
}

/// working-tree state of a path relative to the last commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    New,
    Modified,
    Deleted,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::New => "new",
            FileStatus::Modified => "modified",
            FileStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// one path that differs from HEAD
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub path: String,
    pub status: FileStatus,
}

impl StatusEntry {
    pub fn new(path: impl Into<String>, status: FileStatus) -> Self {
        Self {
            path: path.into(),
            status,
        }
    }
}

/// error type for invalid names (paths, tags, hashes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    TooLong(usize),
    InvalidCharacter { char: char, position: usize },
    Reserved(String),
    InvalidPath(String),
    InvalidHash(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::TooLong(len) => write!(f, "name too long: {} characters", len),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character '{}' at position {}", char, position)
            }
            Self::Reserved(name) => write!(f, "'{}' is a reserved name", name),
            Self::InvalidPath(path) => write!(f, "invalid path: '{}'", path),
            Self::InvalidHash(hash) => write!(f, "invalid object hash: '{}'", hash),
        }
    }
}

impl std::error::Error for InvalidNameError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_path_valid() {
        assert!(RepoPath::new("requirements/REQ-001.md").is_ok());
        assert!(RepoPath::new("assets/img/logo.png").is_ok());
        assert!(RepoPath::new("README.md").is_ok());
    }

    #[test]
    fn test_repo_path_invalid() {
        assert!(RepoPath::new("").is_err());
        assert!(RepoPath::new("/abs/path").is_err());
        assert!(RepoPath::new("a//b").is_err());
        assert!(RepoPath::new("a/../b").is_err());
        assert!(RepoPath::new("dir/").is_err());
        assert!(matches!(RepoPath::new(".git/HEAD"), Err(InvalidNameError::Reserved(_))));
    }

    #[test]
    fn test_repo_path_parts() {
        let path = RepoPath::new("requirements/REQ-001.md").unwrap();
        assert_eq!(path.folder(), "requirements");
        assert_eq!(path.file_name(), "REQ-001.md");
    }

    #[test]
    fn test_object_id_hex() {
        let hex = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";
        let oid = ObjectId::from_hex(hex).unwrap();
        assert_eq!(oid.to_hex(), hex);
        assert_eq!(oid.short(), "4b825dc");
        assert!(ObjectId::from_hex("xyz").is_err());
        assert!(ObjectId::from_hex("abcd").is_err());
    }

    #[test]
    fn test_tag_name() {
        assert!(TagName::new("baseline-v1.0").is_ok());
        assert!(TagName::new("has space").is_err());
        assert!(TagName::new("a..b").is_err());
        assert!(TagName::new("").is_err());

        let tag = TagName::sanitized("baseline v1/2 (final)").unwrap();
        assert_eq!(tag.as_str(), "baseline-v1-2--final-");
        assert_eq!(tag.as_ref_path(), "refs/tags/baseline-v1-2--final-");
    }

    #[test]
    fn test_sanitized_tag_never_ends_with_dot() {
        assert!(TagName::new("baseline-1.").is_err());
        assert_eq!(TagName::sanitized("baseline-..").unwrap().as_str(), "baseline-");
        assert_eq!(TagName::sanitized("baseline-2.lock.").unwrap().as_str(), "baseline-2");
        assert_eq!(TagName::sanitized("baseline-1.0").unwrap().as_str(), "baseline-1.0");
    }

    #[test]
    fn test_signature_line() {
        let sig = GitSignature::new("Ada <x>", "ada@example.com");
        let when = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(sig.to_git_line(when), "Ada x <ada@example.com> 1700000000 +0000");
        assert_eq!(sig.with_name("Bob").name, "Bob");
        assert_eq!(sig.with_name("  ").name, "Ada <x>");
    }

    #[test]
    fn test_branch_name_main() {
        let branch = BranchName::main();
        assert_eq!(branch.as_ref_path(), "refs/heads/main");
    }

    #[test]
    fn test_file_status_str() {
        assert_eq!(FileStatus::New.as_str(), "new");
        assert_eq!(FileStatus::Modified.to_string(), "modified");
        assert_eq!(serde_json::to_string(&FileStatus::Deleted).unwrap(), "\"deleted\"");
    }
}
