//! Pending-changes layer.
//!
//! Turns raw working-tree status into a list of per-artifact changes, each
//! with a draft commit message, and commits them one at a time.

mod activity;
mod debounce;
mod guard;
mod orchestrator;
mod path;

pub use activity::{Activity, ActivityTracker};
pub use debounce::RefreshDebouncer;
pub use guard::{CommitGuard, CommitPermit};
pub use orchestrator::{
    ChangeKey, ChangeState, CommitDispatch, CommitOutcome, PendingChange, PendingChanges,
    PendingError, PendingEvent, PendingResult,
};
pub use path::{ChangeCategory, ChangePath, ParsedPath};
