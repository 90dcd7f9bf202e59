//! The fixed table of artifact types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// how a kind's files are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// YAML front matter between `---` fences, description as the body
    Markdown,
    /// one pretty-printed JSON object
    Json,
}

/// Every artifact type the workspace stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Requirement,
    UseCase,
    TestCase,
    Information,
    Risk,
    Project,
    User,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 7] = [
        ArtifactKind::Requirement,
        ArtifactKind::UseCase,
        ArtifactKind::TestCase,
        ArtifactKind::Information,
        ArtifactKind::Risk,
        ArtifactKind::Project,
        ArtifactKind::User,
    ];

    /// top-level folder holding this kind's files
    pub fn folder(&self) -> &'static str {
        match self {
            ArtifactKind::Requirement => "requirements",
            ArtifactKind::UseCase => "usecases",
            ArtifactKind::TestCase => "testcases",
            ArtifactKind::Information => "information",
            ArtifactKind::Risk => "risks",
            ArtifactKind::Project => "projects",
            ArtifactKind::User => "users",
        }
    }

    /// id prefix, e.g. `REQ` in `REQ-001`
    pub fn prefix(&self) -> &'static str {
        match self {
            ArtifactKind::Requirement => "REQ",
            ArtifactKind::UseCase => "UC",
            ArtifactKind::TestCase => "TC",
            ArtifactKind::Information => "INFO",
            ArtifactKind::Risk => "RISK",
            ArtifactKind::Project => "PROJ",
            ArtifactKind::User => "USER",
        }
    }

    pub fn format(&self) -> RecordFormat {
        match self {
            ArtifactKind::Project | ArtifactKind::User => RecordFormat::Json,
            _ => RecordFormat::Markdown,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self.format() {
            RecordFormat::Markdown => "md",
            RecordFormat::Json => "json",
        }
    }

    pub fn from_folder(folder: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.folder() == folder)
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.prefix() == prefix)
    }

    /// accepts the serialized name, the folder, or the id prefix
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|k| {
            k.as_str() == lower || k.folder() == lower || k.prefix().eq_ignore_ascii_case(&lower)
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Requirement => "requirement",
            ArtifactKind::UseCase => "usecase",
            ArtifactKind::TestCase => "testcase",
            ArtifactKind::Information => "information",
            ArtifactKind::Risk => "risk",
            ArtifactKind::Project => "project",
            ArtifactKind::User => "user",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_tables_agree() {
        for kind in ArtifactKind::ALL {
            assert_eq!(ArtifactKind::from_folder(kind.folder()), Some(kind));
            assert_eq!(ArtifactKind::from_prefix(kind.prefix()), Some(kind));
            assert_eq!(ArtifactKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ArtifactKind::from_folder("assets"), None);
    }

    #[test]
    fn test_formats() {
        assert_eq!(ArtifactKind::Requirement.extension(), "md");
        assert_eq!(ArtifactKind::Risk.format(), RecordFormat::Markdown);
        assert_eq!(ArtifactKind::User.extension(), "json");
        assert_eq!(ArtifactKind::Project.format(), RecordFormat::Json);
    }

    #[test]
    fn test_parse_is_forgiving() {
        assert_eq!(ArtifactKind::parse("REQ"), Some(ArtifactKind::Requirement));
        assert_eq!(ArtifactKind::parse("usecases"), Some(ArtifactKind::UseCase));
        assert_eq!(ArtifactKind::parse(" Risk "), Some(ArtifactKind::Risk));
        assert_eq!(ArtifactKind::parse("nope"), None);
    }
}
