//! Started/finished counters for progress display.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ActivityTracker {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    started: AtomicU64,
    finished: AtomicU64,
}

/// snapshot of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Activity {
    pub started: u64,
    pub finished: u64,
}

impl Activity {
    pub fn running(&self) -> u64 {
        self.started.saturating_sub(self.finished)
    }

    pub fn is_idle(&self) -> bool {
        self.running() == 0
    }
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        self.inner.started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn finish(&self) {
        self.inner.finished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Activity {
        Activity {
            started: self.inner.started.load(Ordering::Relaxed),
            finished: self.inner.finished.load(Ordering::Relaxed),
        }
    }
}
