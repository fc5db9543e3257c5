//! The externally supplied body timeout.
//!
//! Whoever started the request also started a timer that bounds how long the body may take.
//! The streaming bridge must cancel it once it is done with the body, whichever way that
//! happens. [`TimeoutGuard`] is shared between the bridge and its sink, and only the first
//! [`clear`](TimeoutGuard::clear) runs the cancellation.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

type Cancel = Box<dyn FnOnce() + Send>;

#[derive(Clone, Default)]
pub struct TimeoutGuard {
    cancel: Arc<Mutex<Option<Cancel>>>,
}

impl TimeoutGuard {
    /// Wrap an arbitrary cancellation (e.g. a host `clearTimeout` binding).
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Arc::new(Mutex::new(Some(Box::new(cancel)))),
        }
    }

    /// Cancel a tokio task acting as the timer.
    pub fn from_abort_handle(handle: tokio::task::AbortHandle) -> Self {
        Self::new(move || handle.abort())
    }

    /// Start a tokio timer that calls `on_timeout` after `after`, guarded by the returned handle.
    pub fn arm<F>(after: Duration, on_timeout: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            on_timeout();
        });
        Self::from_abort_handle(task.abort_handle())
    }

    /// No timer at all
    pub fn inert() -> Self {
        Self::default()
    }

    /// Cancel the timer. Only the first call across all clones has an effect; returns whether
    /// this call was it.
    pub fn clear(&self) -> bool {
        let cancel = self
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match cancel {
            Some(cancel) => {
                cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_cleared(&self) -> bool {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl std::fmt::Debug for TimeoutGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutGuard")
            .field("cleared", &self.is_cleared())
            .finish()
    }
}
