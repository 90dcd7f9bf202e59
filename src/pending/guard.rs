//! Per-change commit permits.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::pending::orchestrator::ChangeKey;

/// Tracks which changes have a commit in flight.
///
/// Cloning shares the same set.
#[derive(Debug, Clone, Default)]
pub struct CommitGuard {
    in_flight: Arc<Mutex<HashSet<ChangeKey>>>,
}

impl CommitGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if a commit for `key` is already running
    pub fn try_acquire(&self, key: &ChangeKey) -> Option<CommitPermit> {
        let mut set = self.in_flight.lock();
        if !set.insert(key.clone()) {
            return None;
        }
        Some(CommitPermit {
            key: key.clone(),
            in_flight: self.in_flight.clone(),
        })
    }

    pub fn is_in_flight(&self, key: &ChangeKey) -> bool {
        self.in_flight.lock().contains(key)
    }
}

/// Held for the duration of one commit; releases the key on drop.
#[derive(Debug)]
pub struct CommitPermit {
    key: ChangeKey,
    in_flight: Arc<Mutex<HashSet<ChangeKey>>>,
}

impl CommitPermit {
    pub fn key(&self) -> &ChangeKey {
        &self.key
    }
}

impl Drop for CommitPermit {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactKind;
    use crate::pending::path::ChangeCategory;

    fn key(id: &str) -> ChangeKey {
        ChangeKey::new(ChangeCategory::Artifact(ArtifactKind::Requirement), id)
    }

    #[test]
    fn test_second_acquire_is_refused() {
        let guard = CommitGuard::new();
        let permit = guard.try_acquire(&key("REQ-001")).unwrap();
        assert!(guard.try_acquire(&key("REQ-001")).is_none());
        assert!(guard.try_acquire(&key("REQ-002")).is_some());
        assert!(guard.is_in_flight(permit.key()));

        drop(permit);
        assert!(!guard.is_in_flight(&key("REQ-001")));
        assert!(guard.try_acquire(&key("REQ-001")).is_some());
    }

    #[test]
    fn test_clones_share_state() {
        let guard = CommitGuard::new();
        let other = guard.clone();
        let _permit = guard.try_acquire(&key("REQ-001")).unwrap();
        assert!(other.try_acquire(&key("REQ-001")).is_none());
        assert!(other.is_in_flight(&key("REQ-001")));
    }
}
