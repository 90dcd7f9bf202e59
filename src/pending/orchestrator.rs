//! Pending-changes orchestrator.
//!
//! Owns the list of uncommitted changes derived from working-tree status,
//! their draft commit messages, and the dispatch of per-change commits.
//!
//! ```text
//!  status() ──► ChangePath::parse ──► group by ChangeKey ──► watch<Vec<PendingChange>>
//!                                                               ▲
//!  commit(key) ── CommitGuard ── spawn ── stage_and_commit_path ─┤
//!                                   │                           │
//!                                   └── PendingEvent ──► broadcast
//!                                                 └── RefreshDebouncer::poke
//! ```
//!
//! Life of one change:
//! `Unseen -> DefaultMessageComputed -> Editing -> Committing -> (Committed | Failed)`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::artifact::{ArtifactId, ArtifactKind, ArtifactStore};
use crate::pending::activity::{Activity, ActivityTracker};
use crate::pending::debounce::RefreshDebouncer;
use crate::pending::guard::{CommitGuard, CommitPermit};
use crate::pending::path::{ChangeCategory, ChangePath, ParsedPath};
use crate::storage::{
    CommitId, CommitMessage, FileStatus, GitRepository, RepoPath, StatusEntry, StorageError,
};

const EVENT_CAPACITY: usize = 64;

/// identity of one pending change
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChangeKey {
    pub category: ChangeCategory,
    pub id: String,
}

impl ChangeKey {
    pub fn new(category: ChangeCategory, id: impl Into<String>) -> Self {
        Self {
            category,
            id: id.into(),
        }
    }

    pub fn artifact(id: ArtifactId) -> Self {
        Self::new(ChangeCategory::Artifact(id.kind()), id.to_string())
    }
}

impl fmt::Display for ChangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeState {
    /// the default message is filled in, the user has not touched it
    DefaultMessageComputed,
    Editing,
    Committing,
    /// the last commit attempt failed; the draft is kept for a retry
    Failed { error: String },
}

/// One uncommitted change as shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    pub key: ChangeKey,
    pub title: String,
    pub status: FileStatus,
    /// first path of the change
    pub path: String,
    /// every path the commit will include
    pub paths: Vec<String>,
    pub draft_message: String,
    pub state: ChangeState,
}

/// Reported once per finished commit.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingEvent {
    Committed { key: ChangeKey, commit: CommitId },
    CommitFailed { key: ChangeKey, error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Committed(CommitId),
    Failed(String),
}

#[derive(Debug)]
pub enum CommitDispatch {
    Dispatched(JoinHandle<CommitOutcome>),
    /// a commit for this change is still running; nothing was done
    AlreadyInFlight,
}

#[derive(Debug, Error)]
pub enum PendingError {
    #[error("no pending change for {0}")]
    UnknownChange(ChangeKey),

    #[error("commit message for {0} is empty")]
    EmptyMessage(ChangeKey),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type PendingResult<T> = Result<T, PendingError>;

#[derive(Debug, Clone)]
struct Draft {
    message: String,
    state: ChangeState,
}

/// status paths of one change, before drafts are merged in
struct Group {
    title: String,
    entries: Vec<StatusEntry>,
}

/// The pending-changes service.
///
/// Clone this to share across tasks - it uses Arc internally.
#[derive(Clone)]
pub struct PendingChanges {
    inner: Arc<PendingInner>,
}

struct PendingInner {
    store: ArtifactStore,
    drafts: Mutex<HashMap<ChangeKey, Draft>>,
    skipped: Mutex<Vec<ParsedPath>>,
    guard: CommitGuard,
    activity: ActivityTracker,
    debouncer: RefreshDebouncer,
    changes: watch::Sender<Vec<PendingChange>>,
    events: broadcast::Sender<PendingEvent>,
    refreshes: AtomicU64,
}

impl PendingChanges {
    /// Must be called inside a tokio runtime; the refresh debouncer runs as
    /// a background task.
    pub fn new(store: ArtifactStore, debounce: Duration) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<PendingInner>| {
            let weak = weak.clone();
            let debouncer = RefreshDebouncer::spawn(debounce, move || {
                let weak = weak.clone();
                async move {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    if let Err(e) = (PendingChanges { inner }).refresh().await {
                        warn!(error = %e, "debounced refresh failed");
                    }
                }
            });
            let (changes, _) = watch::channel(Vec::new());
            let (events, _) = broadcast::channel(EVENT_CAPACITY);
            PendingInner {
                store,
                drafts: Mutex::new(HashMap::new()),
                skipped: Mutex::new(Vec::new()),
                guard: CommitGuard::new(),
                activity: ActivityTracker::new(),
                debouncer,
                changes,
                events,
                refreshes: AtomicU64::new(0),
            }
        });
        Self { inner }
    }

    fn repo(&self) -> &GitRepository {
        self.inner.store.repository()
    }

    // ==================== Queries ====================

    pub fn list(&self) -> Vec<PendingChange> {
        self.inner.changes.borrow().clone()
    }

    pub fn get(&self, key: &ChangeKey) -> Option<PendingChange> {
        self.inner.changes.borrow().iter().find(|c| &c.key == key).cloned()
    }

    /// receiver that sees every published list
    pub fn subscribe(&self) -> watch::Receiver<Vec<PendingChange>> {
        self.inner.changes.subscribe()
    }

    /// commit results, one event per dispatched commit
    pub fn events(&self) -> broadcast::Receiver<PendingEvent> {
        self.inner.events.subscribe()
    }

    /// status paths the last refresh could not attribute to a change
    pub fn skipped_paths(&self) -> Vec<ParsedPath> {
        self.inner.skipped.lock().clone()
    }

    pub fn refresh_count(&self) -> u64 {
        self.inner.refreshes.load(Ordering::Relaxed)
    }

    pub fn activity(&self) -> Activity {
        self.inner.activity.snapshot()
    }

    /// schedule a refresh after the debounce delay
    pub fn request_refresh(&self) {
        self.inner.debouncer.poke();
    }

    // ==================== Refresh ====================

    /// Recompute the pending list from working-tree status.
    pub async fn refresh(&self) -> PendingResult<Vec<PendingChange>> {
        let status = self.repo().status().await?;

        let mut groups: BTreeMap<ChangeKey, Group> = BTreeMap::new();
        let mut skipped = Vec::new();
        for entry in status {
            match ChangePath::parse(&entry.path) {
                ParsedPath::Recognized { category, id } => {
                    let key = ChangeKey::new(category, id);
                    if let Some(group) = groups.get_mut(&key) {
                        group.entries.push(entry);
                        continue;
                    }
                    let title = self.title_for(&key).await;
                    groups.insert(key, Group { title, entries: vec![entry] });
                }
                ParsedPath::Unrecognized { path, reason } => {
                    debug!(%path, reason, "skipping unrecognized status path");
                    skipped.push(ParsedPath::Unrecognized { path, reason });
                }
            }
        }
        let unseen: Vec<(ChangeKey, String)> = {
            let drafts = self.inner.drafts.lock();
            groups
                .iter()
                .filter(|(key, _)| !drafts.contains_key(key))
                .map(|(key, group)| (key.clone(), group.entries[0].path.clone()))
                .collect()
        };
        let mut defaults = Vec::with_capacity(unseen.len());
        for (key, path) in unseen {
            let message = self.default_message(&key, &path).await?;
            defaults.push((key, message));
        }

        // checked under the drafts lock: a commit dispatched while this
        // refresh was suspended was removed optimistically and stays hidden
        let list = {
            let guard = &self.inner.guard;
            let mut drafts = self.inner.drafts.lock();
            groups.retain(|key, _| !guard.is_in_flight(key));
            for (key, message) in defaults {
                if groups.contains_key(&key) {
                    drafts.entry(key).or_insert(Draft {
                        message,
                        state: ChangeState::DefaultMessageComputed,
                    });
                }
            }
            drafts.retain(|key, _| groups.contains_key(key) || guard.is_in_flight(key));

            let list = groups
                .into_iter()
                .filter_map(|(key, group)| {
                    let draft = drafts.get(&key)?.clone();
                    Some(build_change(key, group, draft))
                })
                .collect::<Vec<_>>();
            self.inner.changes.send_replace(list.clone());
            list
        };

        *self.inner.skipped.lock() = skipped;
        self.inner.refreshes.fetch_add(1, Ordering::Relaxed);
        debug!(pending = list.len(), "refreshed pending changes");
        Ok(list)
    }

    async fn title_for(&self, key: &ChangeKey) -> String {
        let fallback = || match key.category {
            ChangeCategory::Artifact(_) => key.id.clone(),
            ChangeCategory::Asset => "Assets".to_string(),
            ChangeCategory::Counter => "Counters".to_string(),
            ChangeCategory::SavedFilter => "Saved filters".to_string(),
            ChangeCategory::Baseline => "Baselines".to_string(),
        };
        let Ok(id) = ArtifactId::parse(&key.id) else {
            return fallback();
        };
        match self.inner.store.find(&id).await {
            Ok(Some(artifact)) if !artifact.title.is_empty() => artifact.title,
            // deleted file or unreadable record
            _ => fallback(),
        }
    }

    /// message proposed the first time a change is seen
    async fn default_message(&self, key: &ChangeKey, path: &str) -> PendingResult<String> {
        let message = match key.category {
            ChangeCategory::Asset => CommitMessage::assets(),
            ChangeCategory::Counter => CommitMessage::counters(),
            ChangeCategory::SavedFilter => CommitMessage::saved_filters(),
            ChangeCategory::Baseline => CommitMessage::baselines(),
            ChangeCategory::Artifact(ArtifactKind::User) => CommitMessage::user(&key.id),
            ChangeCategory::Artifact(_) => {
                let path = RepoPath::new(path).map_err(StorageError::from)?;
                if self.repo().history(&path).await?.is_empty() {
                    CommitMessage::FIRST_COMMIT.to_string()
                } else {
                    String::new()
                }
            }
        };
        Ok(message)
    }

    // ==================== Drafts ====================

    /// Replace the draft message of a listed change.
    pub fn set_draft(&self, key: &ChangeKey, message: impl Into<String>) -> PendingResult<()> {
        let message = message.into();
        let mut found = false;
        self.inner.changes.send_if_modified(|list| {
            if let Some(change) = list.iter_mut().find(|c| &c.key == key) {
                change.draft_message = message.clone();
                change.state = ChangeState::Editing;
                found = true;
            }
            found
        });
        if !found {
            return Err(PendingError::UnknownChange(key.clone()));
        }
        self.inner.drafts.lock().insert(
            key.clone(),
            Draft {
                message,
                state: ChangeState::Editing,
            },
        );
        Ok(())
    }

    // ==================== Commit ====================

    /// Commit one change in the background.
    ///
    /// The change leaves the list right away. Its outcome arrives on
    /// [`events`](Self::events) and through the returned handle; a refresh
    /// is scheduled either way. `author` replaces the configured author
    /// name for this commit only.
    pub fn commit(&self, key: &ChangeKey, author: Option<&str>) -> PendingResult<CommitDispatch> {
        let Some(permit) = self.inner.guard.try_acquire(key) else {
            debug!(%key, "commit already in flight");
            return Ok(CommitDispatch::AlreadyInFlight);
        };
        let Some(change) = self.get(key) else {
            return Err(PendingError::UnknownChange(key.clone()));
        };
        let message = change.draft_message.trim().to_string();
        if message.is_empty() {
            return Err(PendingError::EmptyMessage(key.clone()));
        }

        self.inner.drafts.lock().remove(key);
        self.inner.changes.send_modify(|list| list.retain(|c| &c.key != key));
        self.inner.activity.start();

        let this = self.clone();
        let author = author.map(str::to_string);
        let handle = tokio::spawn(async move { this.run_commit(permit, change, message, author).await });
        Ok(CommitDispatch::Dispatched(handle))
    }

    async fn run_commit(
        &self,
        permit: CommitPermit,
        change: PendingChange,
        message: String,
        author: Option<String>,
    ) -> CommitOutcome {
        let key = permit.key().clone();
        let result = self.commit_paths(&change.paths, &message, author.as_deref()).await;

        let (outcome, event) = match result {
            Ok(commit) => {
                info!(%key, commit = %commit.short(), "committed change");
                (
                    CommitOutcome::Committed(commit),
                    PendingEvent::Committed { key: key.clone(), commit },
                )
            }
            Err(e) => {
                warn!(%key, error = %e, "commit failed");
                let error = e.to_string();
                self.inner.drafts.lock().insert(
                    key.clone(),
                    Draft {
                        message,
                        state: ChangeState::Failed { error: error.clone() },
                    },
                );
                (
                    CommitOutcome::Failed(error.clone()),
                    PendingEvent::CommitFailed { key: key.clone(), error },
                )
            }
        };

        drop(permit);
        self.inner.activity.finish();
        // nobody listening is fine
        let _ = self.inner.events.send(event);
        self.inner.debouncer.poke();
        outcome
    }

    /// one commit per path; a group whose paths are all clean is an error
    async fn commit_paths(
        &self,
        paths: &[String],
        message: &str,
        author: Option<&str>,
    ) -> Result<CommitId, StorageError> {
        let mut last = None;
        for path in paths {
            let path = RepoPath::new(path.as_str())?;
            match self.repo().stage_and_commit_path(&path, message, author).await {
                Ok(id) => last = Some(id),
                Err(StorageError::NothingToCommit(_)) => {}
                Err(e) => return Err(e),
            }
        }
        let joined = paths.join(", ");
        last.ok_or(StorageError::NothingToCommit(joined))
    }
}

fn build_change(key: ChangeKey, group: Group, draft: Draft) -> PendingChange {
    let first = &group.entries[0];
    let status = if group.entries.iter().all(|e| e.status == first.status) {
        first.status
    } else {
        FileStatus::Modified
    };
    PendingChange {
        path: first.path.clone(),
        paths: group.entries.iter().map(|e| e.path.clone()).collect(),
        key,
        title: group.title,
        status,
        draft_message: draft.message,
        state: draft.state,
    }
}
