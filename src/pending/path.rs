//! Classifies working-tree paths reported by status.

use std::fmt;

use crate::artifact::{
    ArtifactId, ArtifactKind, ASSETS_DIR, BASELINES_DIR, COUNTERS_DIR, SAVED_FILTERS_DIR,
};

/// what a pending path belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeCategory {
    Artifact(ArtifactKind),
    Asset,
    Counter,
    SavedFilter,
    Baseline,
}

impl ChangeCategory {
    /// folder shared by every path of a synthetic category
    pub fn folder(&self) -> &'static str {
        match self {
            ChangeCategory::Artifact(kind) => kind.folder(),
            ChangeCategory::Asset => ASSETS_DIR,
            ChangeCategory::Counter => COUNTERS_DIR,
            ChangeCategory::SavedFilter => SAVED_FILTERS_DIR,
            ChangeCategory::Baseline => BASELINES_DIR,
        }
    }

    /// synthetic categories collapse all their paths into one change
    pub fn is_synthetic(&self) -> bool {
        !matches!(self, ChangeCategory::Artifact(_))
    }
}

impl fmt::Display for ChangeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeCategory::Artifact(kind) => write!(f, "{}", kind),
            ChangeCategory::Asset => f.write_str("asset"),
            ChangeCategory::Counter => f.write_str("counter"),
            ChangeCategory::SavedFilter => f.write_str("saved-filter"),
            ChangeCategory::Baseline => f.write_str("baseline"),
        }
    }
}

/// Result of classifying one status path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPath {
    Recognized { category: ChangeCategory, id: String },
    Unrecognized { path: String, reason: &'static str },
}

impl ParsedPath {
    pub fn is_recognized(&self) -> bool {
        matches!(self, ParsedPath::Recognized { .. })
    }
}

pub struct ChangePath;

impl ChangePath {
    /// Classify `path`.
    ///
    /// Artifact files map to their id; everything under a synthetic folder
    /// maps to that folder's single change.
    pub fn parse(path: &str) -> ParsedPath {
        let unrecognized = |reason| ParsedPath::Unrecognized {
            path: path.to_string(),
            reason,
        };

        let Some((folder, rest)) = path.split_once('/') else {
            return unrecognized("file outside any folder");
        };
        if rest.is_empty() {
            return unrecognized("empty file name");
        }

        let synthetic = |category: ChangeCategory, json_only: bool| {
            if json_only && (rest.contains('/') || !rest.ends_with(".json")) {
                return unrecognized("expected a json file directly in the folder");
            }
            ParsedPath::Recognized {
                category,
                id: category.folder().to_string(),
            }
        };
        match folder {
            ASSETS_DIR => return synthetic(ChangeCategory::Asset, false),
            COUNTERS_DIR => return synthetic(ChangeCategory::Counter, true),
            SAVED_FILTERS_DIR => return synthetic(ChangeCategory::SavedFilter, true),
            BASELINES_DIR => return synthetic(ChangeCategory::Baseline, true),
            _ => {}
        }

        let Some(kind) = ArtifactKind::from_folder(folder) else {
            return unrecognized("unknown folder");
        };
        if rest.contains('/') {
            return unrecognized("nested path in artifact folder");
        }
        let Some(stem) = rest.strip_suffix(&format!(".{}", kind.extension())) else {
            return unrecognized("wrong extension for folder");
        };
        match ArtifactId::parse(stem) {
            Ok(id) if id.kind() == kind => ParsedPath::Recognized {
                category: ChangeCategory::Artifact(kind),
                id: id.to_string(),
            },
            Ok(_) => unrecognized("id prefix does not match folder"),
            Err(_) => unrecognized("file name is not an artifact id"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn recognized(category: ChangeCategory, id: &str) -> ParsedPath {
        ParsedPath::Recognized {
            category,
            id: id.to_string(),
        }
    }

    #[test]
    fn test_artifact_paths() {
        assert_eq!(
            ChangePath::parse("requirements/REQ-001.md"),
            recognized(ChangeCategory::Artifact(ArtifactKind::Requirement), "REQ-001")
        );
        assert_eq!(
            ChangePath::parse("users/USER-012.json"),
            recognized(ChangeCategory::Artifact(ArtifactKind::User), "USER-012")
        );
        assert_eq!(
            ChangePath::parse("usecases/UC-1000.md"),
            recognized(ChangeCategory::Artifact(ArtifactKind::UseCase), "UC-1000")
        );
    }

    #[test]
    fn test_synthetic_paths() {
        assert_eq!(
            ChangePath::parse("assets/img/logo.png"),
            recognized(ChangeCategory::Asset, "assets")
        );
        assert_eq!(
            ChangePath::parse("counters/requirements.json"),
            recognized(ChangeCategory::Counter, "counters")
        );
        assert_eq!(
            ChangePath::parse("saved-filters/open.json"),
            recognized(ChangeCategory::SavedFilter, "saved-filters")
        );
        assert_eq!(
            ChangePath::parse("baselines/01HZX.json"),
            recognized(ChangeCategory::Baseline, "baselines")
        );
    }

    #[test]
    fn test_unrecognized_paths() {
        for path in [
            "README.md",
            "notes/a.md",
            "requirements/REQ-001.json",
            "requirements/UC-001.md",
            "requirements/draft.md",
            "requirements/sub/REQ-001.md",
            "counters/readme.txt",
            "assets/",
        ] {
            let parsed = ChangePath::parse(path);
            assert!(!parsed.is_recognized(), "{path} should be unrecognized");
            match parsed {
                ParsedPath::Unrecognized { path: p, .. } => assert_eq!(p, path),
                _ => unreachable!(),
            }
        }
    }
}
