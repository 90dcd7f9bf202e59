//! On-disk record format.
//!
//! Markdown kinds keep their metadata in YAML front matter and the
//! description as the document body:
//!
//! ```text
//! ---
//! id: REQ-001
//! title: Login
//! revision: '02'
//! createdAt: 2024-05-01T09:00:00Z
//! lastModified: 2024-05-02T10:30:00Z
//! isDeleted: false
//! parentIds:
//! - REQ-000
//! priority: high
//! ---
//! The user can log in with a password.
//! ```
//!
//! JSON kinds store the same keys, plus `description`, as one object.
//! Type-specific fields sit next to the fixed keys.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::artifact::error::{ArtifactError, ArtifactResult};
use crate::artifact::kind::RecordFormat;
use crate::artifact::record::{Artifact, ArtifactId, Lifecycle, Revision};

const FENCE: &str = "---\n";

/// serialized shape shared by both formats
///
/// the deletion pair is flattened here and folded back into [`Lifecycle`]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordFile {
    id: ArtifactId,
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    revision: Revision,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    #[serde(default)]
    is_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    parent_ids: Vec<ArtifactId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    linked_ids: Vec<ArtifactId>,
    #[serde(flatten)]
    fields: BTreeMap<String, Value>,
}

impl RecordFile {
    fn from_artifact(artifact: &Artifact, inline_description: bool) -> Self {
        Self {
            id: artifact.id,
            title: artifact.title.clone(),
            description: inline_description.then(|| artifact.description.clone()),
            revision: artifact.revision,
            created_at: artifact.created_at,
            last_modified: artifact.last_modified,
            is_deleted: artifact.lifecycle.is_deleted(),
            deleted_at: artifact.lifecycle.deleted_at(),
            parent_ids: artifact.parent_ids.clone(),
            linked_ids: artifact.linked_ids.clone(),
            fields: artifact.fields.clone(),
        }
    }

    fn into_artifact(self, description: String) -> Artifact {
        let lifecycle = match (self.is_deleted, self.deleted_at) {
            (true, Some(at)) => Lifecycle::Deleted { at },
            // flag without a time: the last write is the best guess
            (true, None) => Lifecycle::Deleted { at: self.last_modified },
            (false, _) => Lifecycle::Active,
        };
        Artifact {
            id: self.id,
            title: self.title,
            description,
            revision: self.revision,
            created_at: self.created_at,
            last_modified: self.last_modified,
            lifecycle,
            parent_ids: self.parent_ids,
            linked_ids: self.linked_ids,
            fields: self.fields,
        }
    }
}

/// serialize an artifact in its kind's format
pub fn encode(artifact: &Artifact) -> ArtifactResult<Vec<u8>> {
    let path = artifact.path();
    match artifact.kind().format() {
        RecordFormat::Markdown => {
            let front = serde_yaml::to_string(&RecordFile::from_artifact(artifact, false))
                .map_err(|e| ArtifactError::corrupted(path.as_str(), e))?;
            let mut out = String::with_capacity(front.len() + artifact.description.len() + 8);
            out.push_str(FENCE);
            out.push_str(&front);
            out.push_str(FENCE);
            out.push_str(&artifact.description);
            Ok(out.into_bytes())
        }
        RecordFormat::Json => {
            let mut bytes = serde_json::to_vec_pretty(&RecordFile::from_artifact(artifact, true))
                .map_err(|e| ArtifactError::corrupted(path.as_str(), e))?;
            bytes.push(b'\n');
            Ok(bytes)
        }
    }
}

/// deserialize the file of `expected`
///
/// validates that the id inside the file matches the one in its name
pub fn decode(expected: ArtifactId, bytes: &[u8]) -> ArtifactResult<Artifact> {
    let path = expected.path();
    let text = std::str::from_utf8(bytes).map_err(|e| ArtifactError::corrupted(path.as_str(), e))?;

    let artifact = match expected.kind().format() {
        RecordFormat::Markdown => {
            let (front, body) = split_front_matter(text)
                .ok_or_else(|| ArtifactError::corrupted(path.as_str(), "missing front matter"))?;
            let file: RecordFile =
                serde_yaml::from_str(front).map_err(|e| ArtifactError::corrupted(path.as_str(), e))?;
            file.into_artifact(body.to_string())
        }
        RecordFormat::Json => {
            let mut file: RecordFile =
                serde_json::from_str(text).map_err(|e| ArtifactError::corrupted(path.as_str(), e))?;
            let description = file.description.take().unwrap_or_default();
            file.into_artifact(description)
        }
    };

    if artifact.id != expected {
        return Err(ArtifactError::corrupted(
            path.as_str(),
            format!("file holds {}", artifact.id),
        ));
    }
    Ok(artifact)
}

/// split `---\n{yaml}---\n{body}` into yaml and body
fn split_front_matter(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix(FENCE)?;
    if let Some(body) = rest.strip_prefix(FENCE) {
        return Some(("", body));
    }
    let end = rest.find("\n---\n")?;
    Some((&rest[..end + 1], &rest[end + 1 + FENCE.len()..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::kind::ArtifactKind;
    use crate::artifact::record::ArtifactDraft;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    fn sample(kind: ArtifactKind) -> Artifact {
        let draft = ArtifactDraft::titled("Login: with password")
            .description("The user can log in.\n\n---\n\nSecond section\n")
            .parent(ArtifactId::new(kind, 7))
            .link(ArtifactId::new(ArtifactKind::TestCase, 3))
            .field("priority", json!("high"))
            .field("estimate", json!(3))
            .field("tags", json!(["auth", "ui"]));
        let mut a = Artifact::new(ArtifactId::new(kind, 1), draft, at(1_700_000_000));
        a.last_modified = at(1_700_000_100);
        a
    }

    #[test]
    fn test_markdown_layout() {
        let a = sample(ArtifactKind::Requirement);
        let text = String::from_utf8(encode(&a).unwrap()).unwrap();

        assert!(text.starts_with("---\nid: REQ-001\n"));
        assert!(text.lines().any(|l| l.starts_with("revision: ") && l.contains("01")));
        assert!(text.contains("isDeleted: false\n"));
        assert!(text.contains("priority: high\n"));
        assert!(text.ends_with("---\nThe user can log in.\n\n---\n\nSecond section\n"));
    }

    #[test]
    fn test_roundtrip_every_kind() {
        for kind in ArtifactKind::ALL {
            let mut a = sample(kind);
            assert_eq!(decode(a.id, &encode(&a).unwrap()).unwrap(), a);

            a.mark_deleted(at(1_700_000_200));
            assert_eq!(decode(a.id, &encode(&a).unwrap()).unwrap(), a);
        }
    }

    #[test]
    fn test_roundtrip_empty_description() {
        let a = Artifact::new(ArtifactId::new(ArtifactKind::Risk, 2), ArtifactDraft::titled(""), at(0));
        assert_eq!(decode(a.id, &encode(&a).unwrap()).unwrap(), a);
    }

    #[test]
    fn test_json_layout() {
        let a = sample(ArtifactKind::User);
        let value: Value = serde_json::from_slice(&encode(&a).unwrap()).unwrap();
        assert_eq!(value["id"], json!("USER-001"));
        assert_eq!(value["revision"], json!("01"));
        assert_eq!(value["isDeleted"], json!(false));
        assert_eq!(value["description"], json!(a.description));
        assert!(value.get("deletedAt").is_none());
    }

    #[test]
    fn test_id_mismatch_is_corruption() {
        let a = sample(ArtifactKind::Requirement);
        let bytes = encode(&a).unwrap();
        let err = decode(ArtifactId::new(ArtifactKind::Requirement, 2), &bytes).unwrap_err();
        assert!(matches!(err, ArtifactError::CorruptedRecord { .. }));
    }

    #[test]
    fn test_reads_numeric_revision_and_bare_flag() {
        let text = "---\nid: RISK-004\ntitle: Outage\nrevision: 5\ncreatedAt: 2024-01-01T00:00:00Z\nlastModified: 2024-01-02T00:00:00Z\nisDeleted: true\n---\n";
        let id = ArtifactId::new(ArtifactKind::Risk, 4);
        let a = decode(id, text.as_bytes()).unwrap();
        assert_eq!(a.revision.to_string(), "05");
        assert_eq!(a.lifecycle.deleted_at(), Some(a.last_modified));
        assert_eq!(a.description, "");
    }

    #[test]
    fn test_garbage_is_corruption() {
        let id = ArtifactId::new(ArtifactKind::Requirement, 1);
        assert!(matches!(decode(id, b"no front matter"), Err(ArtifactError::CorruptedRecord { .. })));
        let id = ArtifactId::new(ArtifactKind::Project, 1);
        assert!(matches!(decode(id, b"{"), Err(ArtifactError::CorruptedRecord { .. })));
    }
}
