//! Trailing-edge debouncer for status refreshes.
//!
//! A burst of pokes collapses into one call, fired `delay` after the last
//! poke of the burst.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct RefreshDebouncer {
    tx: mpsc::UnboundedSender<()>,
}

impl RefreshDebouncer {
    /// Spawn the debounce task on the current runtime.
    ///
    /// The task exits once every handle is dropped.
    pub fn spawn<F, Fut>(delay: Duration, on_fire: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        tokio::spawn(async move {
            // wait for the first poke of a burst
            while rx.recv().await.is_some() {
                loop {
                    tokio::select! {
                        poke = rx.recv() => {
                            if poke.is_none() {
                                return;
                            }
                        }
                        _ = tokio::time::sleep(delay) => break,
                    }
                }
                trace!("debounced refresh firing");
                on_fire().await;
            }
        });
        Self { tx }
    }

    /// request a refresh
    pub fn poke(&self) {
        // a closed channel means the owner is gone
        let _ = self.tx.send(());
    }
}
