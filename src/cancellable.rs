use std::sync::{Arc, Mutex};

use log::warn;
use tokio::sync::Notify;

use crate::error::{FsError, FsResult};

/// Cancellation token handed to every asynchronous backend operation.
///
/// Cancelling is best-effort: a backend that already finished simply never
/// looks at the flag again, which makes a late `cancel()` a no-op.
#[derive(Clone, Debug)]
pub struct Cancellable {
    inner: Arc<CancellableInner>,
}

#[derive(Debug)]
struct CancellableInner {
    cancelled: Mutex<bool>,
    notify: Notify,
}

impl Cancellable {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellableInner {
                cancelled: Mutex::new(false),
                notify: Notify::new(),
            }),
        }
    }

    pub fn cancel(&self) {
        let mut cancelled = match self.inner.cancelled.lock() {
            Ok(guard) => guard,
            Err(e) => {
                warn!("Cancellable: recovering poisoned lock: {}", e);
                e.into_inner()
            }
        };
        if !*cancelled {
            *cancelled = true;
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self.inner.cancelled.lock() {
            Ok(cancelled) => *cancelled,
            Err(e) => {
                warn!("Cancellable: recovering poisoned lock: {}", e);
                *e.into_inner()
            }
        }
    }

    pub fn check(&self) -> FsResult<()> {
        if self.is_cancelled() {
            Err(FsError::cancelled())
        } else {
            Ok(())
        }
    }

    /// Resolves once `cancel()` has been called.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking so a concurrent cancel() cannot slip between.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for Cancellable {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorthand used by backends at the top of each operation.
pub fn check(cancellable: Option<&Cancellable>) -> FsResult<()> {
    match cancellable {
        Some(c) => c.check(),
        None => Ok(()),
    }
}
