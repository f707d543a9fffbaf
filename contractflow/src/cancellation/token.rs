//! Cancellation token checked by the executor between steps.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Callback invoked once when a token is cancelled.
pub type CancelCallback = Box<dyn FnOnce(&str) + Send>;

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    callbacks: Mutex<Vec<CancelCallback>>,
}

/// A cloneable handle for requesting cancellation of a run.
///
/// Clones share state. Cancellation is idempotent and the first reason
/// wins. A stage invocation already in flight is never interrupted; the
/// executor observes the token before starting each step.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Returns false if already cancelled.
    ///
    /// The reason is stored before the flag is raised, so any observer that
    /// sees the token cancelled also sees its reason.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let callbacks = {
            let mut callbacks = self.inner.callbacks.lock();
            if self.is_cancelled() {
                return false;
            }
            *self.inner.reason.write() = Some(reason.clone());
            self.inner.cancelled.store(true, Ordering::SeqCst);
            std::mem::take(&mut *callbacks)
        };

        debug!(%reason, "Cancellation requested");
        for callback in callbacks {
            run_callback(callback, &reason);
        }
        true
    }

    /// Registers a callback. Runs immediately if already cancelled.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce(&str) + Send + 'static,
    {
        {
            let mut callbacks = self.inner.callbacks.lock();
            if !self.is_cancelled() {
                callbacks.push(Box::new(callback));
                return;
            }
        }
        let reason = self.reason().unwrap_or_default();
        run_callback(Box::new(callback), &reason);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// The first cancellation reason, if cancelled.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.read().clone()
    }
}

fn run_callback(callback: CancelCallback, reason: &str) {
    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(reason))).is_err() {
        warn!("Cancellation callback panicked");
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_first_reason_wins() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        assert!(token.cancel("operator stop"));
        assert!(!token.cancel("second"));
        assert_eq!(token.reason().as_deref(), Some("operator stop"));
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let handle = token.clone();
        handle.cancel("from another task");
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_callbacks_run_once() {
        let token = CancellationToken::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let before = Arc::clone(&hits);
        token.on_cancel(move |reason| {
            assert_eq!(reason, "stop");
            before.fetch_add(1, Ordering::SeqCst);
        });
        token.cancel("stop");
        token.cancel("again");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let after = Arc::clone(&hits);
        token.on_cancel(move |_| {
            after.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reason_visible_once_cancelled() {
        let token = CancellationToken::new();
        let watcher = token.clone();
        let observer = std::thread::spawn(move || {
            while !watcher.is_cancelled() {
                std::hint::spin_loop();
            }
            watcher.reason()
        });

        token.cancel("deadline");
        assert_eq!(observer.join().unwrap().as_deref(), Some("deadline"));
    }

    #[test]
    fn test_concurrent_cancel_keeps_single_reason() {
        let token = CancellationToken::new();
        let winners: usize = (0..8)
            .map(|i| {
                let handle = token.clone();
                std::thread::spawn(move || handle.cancel(format!("worker {i}")))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|t| usize::from(t.join().unwrap()))
            .sum();

        assert_eq!(winners, 1);
        assert!(token.reason().is_some_and(|r| r.starts_with("worker ")));
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let token = CancellationToken::new();
        token.on_cancel(|_| panic!("boom"));
        assert!(token.cancel("stop"));
        assert!(token.is_cancelled());
    }
}
