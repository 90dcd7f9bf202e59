//! Workspace configuration.
//!
//! Built in code, or loaded from an optional `reqtrace.toml` at the
//! workspace root:
//!
//! ```toml
//! author_name = "Ada"
//! author_email = "ada@example.com"
//! refresh_debounce_ms = 500
//! baseline_policy = "fail"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::baseline::MissingHistoryPolicy;
use crate::storage::GitSignature;
use crate::workspace::error::{WorkspaceError, WorkspaceResult};

/// name of the optional config file at the workspace root
pub const CONFIG_FILE: &str = "reqtrace.toml";

/// Workspace configuration options.
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// Directory holding the artifacts and `.git`.
    pub root: PathBuf,
    /// Commit author name.
    pub author_name: String,
    /// Commit author email.
    pub author_email: String,
    /// Delay between the last refresh request of a burst and the refresh.
    pub refresh_debounce: Duration,
    /// How baselines treat artifacts that were never committed.
    pub baseline_policy: MissingHistoryPolicy,
    /// Initialize the repository if there is none.
    pub create_if_missing: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        let signature = GitSignature::reqtrace();
        Self {
            root: PathBuf::from("."),
            author_name: signature.name,
            author_email: signature.email,
            refresh_debounce: Duration::from_millis(300),
            baseline_policy: MissingHistoryPolicy::default(),
            create_if_missing: true,
        }
    }
}

/// on-disk shape; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    author_name: Option<String>,
    author_email: Option<String>,
    refresh_debounce_ms: Option<u64>,
    baseline_policy: Option<MissingHistoryPolicy>,
    create_if_missing: Option<bool>,
}

impl WorkspaceConfig {
    /// Create a new configuration with the given root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Defaults for `root`, overridden by `root/reqtrace.toml` if present.
    pub async fn load(root: impl AsRef<Path>) -> WorkspaceResult<Self> {
        let root = root.as_ref();
        let path = root.join(CONFIG_FILE);
        let config = Self::new(root);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                debug!(path = %path.display(), "loading config");
                config.merge_toml(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(config),
            Err(e) => Err(WorkspaceError::InvalidConfig(format!("{}: {}", path.display(), e))),
        }
    }

    /// apply the keys present in `text`
    pub fn merge_toml(mut self, text: &str) -> WorkspaceResult<Self> {
        let file: ConfigFile =
            toml::from_str(text).map_err(|e| WorkspaceError::InvalidConfig(e.to_string()))?;
        if let Some(name) = file.author_name {
            self.author_name = name;
        }
        if let Some(email) = file.author_email {
            self.author_email = email;
        }
        if let Some(ms) = file.refresh_debounce_ms {
            self.refresh_debounce = Duration::from_millis(ms);
        }
        if let Some(policy) = file.baseline_policy {
            self.baseline_policy = policy;
        }
        if let Some(create) = file.create_if_missing {
            self.create_if_missing = create;
        }
        Ok(self)
    }

    pub fn author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author_name = name.into();
        self.author_email = email.into();
        self
    }

    pub fn refresh_debounce(mut self, delay: Duration) -> Self {
        self.refresh_debounce = delay;
        self
    }

    pub fn baseline_policy(mut self, policy: MissingHistoryPolicy) -> Self {
        self.baseline_policy = policy;
        self
    }

    /// Set create_if_missing flag.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn signature(&self) -> GitSignature {
        GitSignature::new(self.author_name.clone(), self.author_email.clone())
    }
}
