//! Debounced persistence
//!
//! Caches call [`Debouncer::mark_dirty`] after every mutation. A background
//! task waits until no new mutation has arrived for `delay` and then asks
//! the cache to flush its current snapshot once. Bursts of inserts therefore
//! produce a single write. Dropping the debouncer flushes anything pending.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Something that can write its current state to durable storage
#[async_trait]
pub trait Flush: Send + Sync + 'static {
    async fn flush(&self);
}

struct Shared {
    dirty: AtomicBool,
    notify: Notify,
}

/// Coalesces flush requests within a quiet window
pub struct Debouncer {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
}

impl Debouncer {
    /// Spawn the flush task for `target`. Must be called inside a tokio runtime.
    pub fn spawn(name: &str, delay: Duration, target: Arc<dyn Flush>) -> Self {
        let shared = Arc::new(Shared {
            dirty: AtomicBool::new(false),
            notify: Notify::new(),
        });
        let shutdown = CancellationToken::new();

        let task_shared = shared.clone();
        let task_shutdown = shutdown.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_shutdown.cancelled() => break,
                    _ = task_shared.notify.notified() => {}
                }

                // Restart the quiet window on every new mutation
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => break,
                        _ = task_shared.notify.notified() => continue,
                        _ = task_shutdown.cancelled() => break,
                    }
                }

                if task_shared.dirty.swap(false, Ordering::AcqRel) {
                    trace!("Debounced flush of {}", name);
                    target.flush().await;
                }
                if task_shutdown.is_cancelled() {
                    break;
                }
            }

            if task_shared.dirty.swap(false, Ordering::AcqRel) {
                trace!("Final flush of {} on shutdown", name);
                target.flush().await;
            }
        });

        Self { shared, shutdown }
    }

    /// Record a mutation; the flush happens once the window goes quiet
    pub fn mark_dirty(&self) {
        self.shared.dirty.store(true, Ordering::Release);
        self.shared.notify.notify_one();
    }

    /// Whether a flush is still owed
    pub fn is_dirty(&self) -> bool {
        self.shared.dirty.load(Ordering::Acquire)
    }

    /// Drop the pending flush; used when the caller flushed synchronously
    pub fn clear_dirty(&self) {
        self.shared.dirty.store(false, Ordering::Release);
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
