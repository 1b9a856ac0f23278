//! Concurrency Gate
//!
//! A counting permit gate bounding how many operations of one kind run at
//! once. Waiters are admitted in arrival order. A permit is released when
//! it is dropped, so every exit path of the holder (return, error, task
//! cancellation) gives it back.
//!
//! Unlike `tokio::sync::Semaphore`, the gate can be force-reset between
//! refresh runs. A reset starts a new epoch: permits handed out before the
//! reset are not counted against the new epoch and releasing them later is
//! a no-op, which bounds the overshoot to the number of stale holders.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, trace};

#[derive(Debug)]
struct GateState {
    limit: usize,
    active: usize,
    peak: usize,
    epoch: u64,
    /// Each waiter is handed the epoch it was admitted into
    waiters: VecDeque<oneshot::Sender<u64>>,
}

impl GateState {
    fn admit(&mut self) {
        self.active += 1;
        self.peak = self.peak.max(self.active);
    }
}

/// Bounded-parallelism permit gate
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    name: Arc<str>,
    state: Arc<Mutex<GateState>>,
}

/// Proof of admission. Dropping it releases the slot.
#[derive(Debug)]
pub struct GatePermit {
    state: Arc<Mutex<GateState>>,
    epoch: u64,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        release(&self.state, self.epoch);
    }
}

/// A queued acquire. If the acquiring future is dropped after the slot was
/// already handed over, the slot is passed on instead of leaking.
struct PendingWaiter {
    state: Arc<Mutex<GateState>>,
    rx: Option<oneshot::Receiver<u64>>,
}

impl PendingWaiter {
    async fn wait(&mut self) -> Option<u64> {
        let granted = match self.rx.as_mut() {
            Some(rx) => rx.await.ok(),
            None => None,
        };
        self.rx = None;
        granted
    }
}

impl Drop for PendingWaiter {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            if let Ok(epoch) = rx.try_recv() {
                release(&self.state, epoch);
            }
        }
    }
}

fn lock(state: &Mutex<GateState>) -> MutexGuard<'_, GateState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn release(state: &Mutex<GateState>, epoch: u64) {
    let mut state = lock(state);
    if epoch != state.epoch {
        trace!("Ignoring release of permit from stale epoch {}", epoch);
        return;
    }
    // Hand the slot straight to the next live waiter; active stays the same
    while let Some(waiter) = state.waiters.pop_front() {
        if waiter.send(epoch).is_ok() {
            return;
        }
    }
    state.active = state.active.saturating_sub(1);
}

impl ConcurrencyGate {
    /// Create a gate admitting at most `limit` holders (minimum 1)
    pub fn new<S: Into<String>>(name: S, limit: usize) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name.as_str()),
            state: Arc::new(Mutex::new(GateState {
                limit: limit.max(1),
                active: 0,
                peak: 0,
                epoch: 0,
                waiters: VecDeque::new(),
            })),
        }
    }

    /// Wait until fewer than `limit` holders are active, then take a slot
    pub async fn acquire(&self) -> GatePermit {
        loop {
            let rx = {
                let mut state = lock(&self.state);
                if state.active < state.limit {
                    state.admit();
                    return GatePermit {
                        state: self.state.clone(),
                        epoch: state.epoch,
                    };
                }
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                trace!(
                    "Gate {} full ({}/{}), queued waiter #{}",
                    self.name,
                    state.active,
                    state.limit,
                    state.waiters.len()
                );
                rx
            };

            let mut waiter = PendingWaiter {
                state: self.state.clone(),
                rx: Some(rx),
            };
            if let Some(epoch) = waiter.wait().await {
                return GatePermit {
                    state: self.state.clone(),
                    epoch,
                };
            }
        }
    }

    /// Run `body` while holding a permit
    pub async fn with_permit<F, T>(&self, body: F) -> T
    where
        F: Future<Output = T>,
    {
        let _permit = self.acquire().await;
        body.await
    }

    /// Forget every outstanding permit and start a new epoch.
    ///
    /// Queued waiters are admitted into the new epoch up to the limit.
    pub fn reset(&self) {
        let mut state = lock(&self.state);
        let stale = state.active;
        state.epoch += 1;
        state.active = 0;
        let epoch = state.epoch;
        while state.active < state.limit {
            let Some(waiter) = state.waiters.pop_front() else {
                break;
            };
            if waiter.send(epoch).is_ok() {
                state.admit();
            }
        }
        debug!(
            "Gate {} reset: dropped {} stale permit(s), admitted {} waiter(s)",
            self.name, stale, state.active
        );
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> usize {
        lock(&self.state).limit
    }

    /// Holders counted against the current epoch
    pub fn active(&self) -> usize {
        lock(&self.state).active
    }

    /// Highest `active` value observed since creation
    pub fn peak_active(&self) -> usize {
        lock(&self.state).peak
    }

    pub fn waiting(&self) -> usize {
        lock(&self.state).waiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_admits_up_to_limit() {
        let gate = ConcurrencyGate::new("test", 2);
        let p1 = gate.acquire().await;
        let _p2 = gate.acquire().await;
        assert_eq!(gate.active(), 2);

        let gate2 = gate.clone();
        let third = tokio::spawn(async move {
            let _p = gate2.acquire().await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!third.is_finished());
        assert_eq!(gate.waiting(), 1);

        drop(p1);
        third.await.unwrap();
        assert_eq!(gate.active(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_holders_never_exceed_limit() {
        let gate = ConcurrencyGate::new("bounded", 3);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let observed_max = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..40 {
            let gate = gate.clone();
            let in_flight = in_flight.clone();
            let observed_max = observed_max.clone();
            handles.push(tokio::spawn(async move {
                gate.with_permit(async {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    observed_max.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(observed_max.load(Ordering::SeqCst) <= 3);
        assert!(gate.peak_active() <= 3);
        assert_eq!(gate.active(), 0);
    }

    #[tokio::test]
    async fn test_permit_released_on_error_and_cancellation() {
        let gate = ConcurrencyGate::new("exits", 1);

        let result: Result<(), &str> = gate.with_permit(async { Err("boom") }).await;
        assert!(result.is_err());
        assert_eq!(gate.active(), 0);

        let gate2 = gate.clone();
        let holder = tokio::spawn(async move {
            gate2
                .with_permit(tokio::time::sleep(Duration::from_secs(60)))
                .await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(gate.active(), 1);
        holder.abort();
        let _ = holder.await;
        assert_eq!(gate.active(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_leak_slot() {
        let gate = ConcurrencyGate::new("waiters", 1);
        let permit = gate.acquire().await;

        let gate2 = gate.clone();
        let waiter = tokio::spawn(async move {
            let _p = gate2.acquire().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        waiter.abort();
        let _ = waiter.await;

        drop(permit);
        assert_eq!(gate.active(), 0);
        let _again = gate.acquire().await;
        assert_eq!(gate.active(), 1);
    }

    #[tokio::test]
    async fn test_reset_ignores_stale_permits() {
        let gate = ConcurrencyGate::new("reset", 1);
        let stale = gate.acquire().await;

        gate.reset();
        assert_eq!(gate.active(), 0);

        let fresh = gate.acquire().await;
        assert_eq!(gate.active(), 1);

        // Releasing the pre-reset permit must not free the fresh slot
        drop(stale);
        assert_eq!(gate.active(), 1);
        drop(fresh);
        assert_eq!(gate.active(), 0);
    }

    #[tokio::test]
    async fn test_reset_admits_queued_waiters() {
        let gate = ConcurrencyGate::new("unstick", 1);
        let _leaked = gate.acquire().await;

        let gate2 = gate.clone();
        let waiter = tokio::spawn(async move {
            let _p = gate2.acquire().await;
            42
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        gate.reset();
        assert_eq!(waiter.await.unwrap(), 42);
    }
}
