//! Artifact records and the values they are built from.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::artifact::kind::ArtifactKind;
use crate::storage::{InvalidNameError, RepoPath};

/// keys the file format uses itself; never accepted as custom fields
pub const RESERVED_KEYS: &[&str] = &[
    "id",
    "title",
    "description",
    "revision",
    "createdAt",
    "lastModified",
    "isDeleted",
    "deletedAt",
    "parentIds",
    "linkedIds",
];

/// Two-digit version stamp: `"01"` on create, +1 per update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(u32);

impl Revision {
    pub const FIRST: Revision = Revision(1);

    pub fn new(n: u32) -> Self {
        Self(n)
    }

    pub fn number(&self) -> u32 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl Default for Revision {
    fn default() -> Self {
        Self::FIRST
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl FromStr for Revision {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Revision)
    }
}

impl Serialize for Revision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Revision {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // older files store the stamp as a bare number
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u32),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Raw::Number(n) => Ok(Revision(n)),
        }
    }
}

/// A type-prefixed artifact id such as `REQ-001`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactId {
    kind: ArtifactKind,
    number: u32,
}

impl ArtifactId {
    pub fn new(kind: ArtifactKind, number: u32) -> Self {
        Self { kind, number }
    }

    pub fn parse(s: &str) -> Result<Self, InvalidNameError> {
        let (prefix, digits) = s
            .split_once('-')
            .ok_or_else(|| InvalidNameError::InvalidPath(s.to_string()))?;
        let kind = ArtifactKind::from_prefix(prefix).ok_or_else(|| InvalidNameError::InvalidPath(s.to_string()))?;
        if digits.is_empty() {
            return Err(InvalidNameError::Empty);
        }
        if let Some((i, c)) = digits.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
            return Err(InvalidNameError::InvalidCharacter {
                char: c,
                position: prefix.len() + 1 + i,
            });
        }
        let number = digits
            .parse()
            .map_err(|_| InvalidNameError::TooLong(digits.len()))?;
        Ok(Self { kind, number })
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// `{folder}/{id}.{ext}`
    pub fn path(&self) -> RepoPath {
        // folder, prefix and digits are all path-safe
        RepoPath::from_trusted(format!("{}/{}.{}", self.kind.folder(), self, self.kind.extension()))
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:03}", self.kind.prefix(), self.number)
    }
}

impl FromStr for ArtifactId {
    type Err = InvalidNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ArtifactId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ArtifactId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// whether the record is soft-deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Active,
    Deleted { at: DateTime<Utc> },
}

impl Lifecycle {
    pub fn is_deleted(&self) -> bool {
        matches!(self, Lifecycle::Deleted { .. })
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Lifecycle::Active => None,
            Lifecycle::Deleted { at } => Some(*at),
        }
    }
}

/// One stored artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub id: ArtifactId,
    pub title: String,
    pub description: String,
    pub revision: Revision,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub lifecycle: Lifecycle,
    /// hierarchy links (e.g. a requirement's parent requirement)
    pub parent_ids: Vec<ArtifactId>,
    /// traceability links to other artifacts
    pub linked_ids: Vec<ArtifactId>,
    /// type-specific attributes such as priority or status
    pub fields: BTreeMap<String, Value>,
}

/// input for creating an artifact
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactDraft {
    pub title: String,
    pub description: String,
    pub parent_ids: Vec<ArtifactId>,
    pub linked_ids: Vec<ArtifactId>,
    pub fields: BTreeMap<String, Value>,
}

impl ArtifactDraft {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn parent(mut self, id: ArtifactId) -> Self {
        self.parent_ids.push(id);
        self
    }

    pub fn link(mut self, id: ArtifactId) -> Self {
        self.linked_ids.push(id);
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// Partial update. `None` leaves a property alone; a field mapped to
/// `None` is removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub parent_ids: Option<Vec<ArtifactId>>,
    pub linked_ids: Option<Vec<ArtifactId>>,
    pub fields: BTreeMap<String, Option<Value>>,
}

impl ArtifactPatch {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn parent_ids(mut self, ids: Vec<ArtifactId>) -> Self {
        self.parent_ids = Some(ids);
        self
    }

    pub fn linked_ids(mut self, ids: Vec<ArtifactId>) -> Self {
        self.linked_ids = Some(ids);
        self
    }

    pub fn set_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), Some(value));
        self
    }

    pub fn remove_field(mut self, key: impl Into<String>) -> Self {
        self.fields.insert(key.into(), None);
        self
    }
}

fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

impl Artifact {
    pub fn new(id: ArtifactId, draft: ArtifactDraft, now: DateTime<Utc>) -> Self {
        let mut fields = draft.fields;
        fields.retain(|k, _| !is_reserved(k));
        Self {
            id,
            title: draft.title,
            description: draft.description,
            revision: Revision::FIRST,
            created_at: now,
            last_modified: now,
            lifecycle: Lifecycle::Active,
            parent_ids: draft.parent_ids,
            linked_ids: draft.linked_ids,
            fields,
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        self.id.kind()
    }

    pub fn path(&self) -> RepoPath {
        self.id.path()
    }

    pub fn is_deleted(&self) -> bool {
        self.lifecycle.is_deleted()
    }

    /// merge a patch; this is the only place the revision moves
    pub fn apply(&mut self, patch: ArtifactPatch, now: DateTime<Utc>) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(parents) = patch.parent_ids {
            self.parent_ids = parents;
        }
        if let Some(links) = patch.linked_ids {
            self.linked_ids = links;
        }
        for (key, value) in patch.fields {
            if is_reserved(&key) {
                continue;
            }
            match value {
                Some(value) => {
                    self.fields.insert(key, value);
                }
                None => {
                    self.fields.remove(&key);
                }
            }
        }
        self.revision = self.revision.next();
        self.last_modified = now;
    }

    pub fn mark_deleted(&mut self, now: DateTime<Utc>) {
        self.lifecycle = Lifecycle::Deleted { at: now };
        self.last_modified = now;
    }

    pub fn restore(&mut self, now: DateTime<Utc>) {
        self.lifecycle = Lifecycle::Active;
        self.last_modified = now;
    }

    /// the patch that removes `id` from this record's references, if any
    pub fn without_reference(&self, id: &ArtifactId) -> Option<ArtifactPatch> {
        let refers = self.parent_ids.contains(id) || self.linked_ids.contains(id);
        if !refers {
            return None;
        }
        let keep = |ids: &[ArtifactId]| ids.iter().filter(|x| *x != id).copied().collect();
        Some(
            ArtifactPatch::default()
                .parent_ids(keep(&self.parent_ids))
                .linked_ids(keep(&self.linked_ids)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    fn req(n: u32) -> ArtifactId {
        ArtifactId::new(ArtifactKind::Requirement, n)
    }

    #[test]
    fn test_revision_format() {
        assert_eq!(Revision::FIRST.to_string(), "01");
        assert_eq!(Revision::new(9).next().to_string(), "10");
        assert_eq!(Revision::new(99).next().to_string(), "100");
        assert_eq!("07".parse::<Revision>().unwrap(), Revision::new(7));

        let text: Revision = serde_json::from_str("\"03\"").unwrap();
        let number: Revision = serde_json::from_str("3").unwrap();
        assert_eq!(text, number);
        assert_eq!(serde_json::to_string(&text).unwrap(), "\"03\"");
    }

    #[test]
    fn test_artifact_id() {
        let id = ArtifactId::parse("REQ-001").unwrap();
        assert_eq!(id, req(1));
        assert_eq!(id.to_string(), "REQ-001");
        assert_eq!(ArtifactId::new(ArtifactKind::UseCase, 1234).to_string(), "UC-1234");
        assert_eq!(id.path().as_str(), "requirements/REQ-001.md");
        assert_eq!(ArtifactId::parse("USER-002").unwrap().path().as_str(), "users/USER-002.json");

        assert!(ArtifactId::parse("REQ").is_err());
        assert!(ArtifactId::parse("REQ-").is_err());
        assert!(ArtifactId::parse("XYZ-001").is_err());
        assert!(ArtifactId::parse("REQ-01a").is_err());
    }

    #[test]
    fn test_update_increments_revision() {
        let mut a = Artifact::new(req(1), ArtifactDraft::titled("Login"), at(0));
        assert_eq!(a.revision.to_string(), "01");

        a.apply(ArtifactPatch::default().title("Log in"), at(10));
        a.apply(ArtifactPatch::default().set_field("priority", json!("high")), at(20));
        assert_eq!(a.revision.to_string(), "03");
        assert_eq!(a.title, "Log in");
        assert_eq!(a.fields["priority"], json!("high"));
        assert_eq!(a.last_modified, at(20));
        assert_eq!(a.created_at, at(0));

        a.apply(ArtifactPatch::default().remove_field("priority"), at(30));
        assert!(a.fields.is_empty());
    }

    #[test]
    fn test_reserved_fields_are_dropped() {
        let draft = ArtifactDraft::titled("x").field("revision", json!("99")).field("owner", json!("ada"));
        let a = Artifact::new(req(1), draft, at(0));
        assert_eq!(a.fields.len(), 1);
        assert!(a.fields.contains_key("owner"));
    }

    #[test]
    fn test_soft_delete_then_restore() {
        let original = Artifact::new(req(1), ArtifactDraft::titled("x"), at(0));
        let mut a = original.clone();
        a.mark_deleted(at(5));
        assert!(a.is_deleted());
        assert_eq!(a.lifecycle.deleted_at(), Some(at(5)));
        assert_eq!(a.revision, original.revision);

        a.restore(at(6));
        assert_eq!(Artifact { last_modified: original.last_modified, ..a }, original);
    }

    #[test]
    fn test_without_reference() {
        let a = Artifact::new(req(2), ArtifactDraft::titled("child").parent(req(1)).link(req(3)), at(0));
        let patch = a.without_reference(&req(1)).unwrap();
        assert_eq!(patch.parent_ids, Some(vec![]));
        assert_eq!(patch.linked_ids, Some(vec![req(3)]));
        assert!(a.without_reference(&req(9)).is_none());
    }
}
