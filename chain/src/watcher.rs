//! Background timers for challenge expiries.

use log::*;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A running expiry timer. Dropping the watcher cancels it, so a timer tied
/// to a challenge dies with the machine that was waiting on it.
pub struct TimeoutWatcher {
    handle: JoinHandle<()>,
}

impl TimeoutWatcher {
    /// Fire `on_expiry` once `delay` has elapsed, unless dropped first.
    pub fn after<F>(delay: Duration, on_expiry: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!("Challenge expiry timer fired after {delay:?}");
            on_expiry();
        });
        TimeoutWatcher { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for TimeoutWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
