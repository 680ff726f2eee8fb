//! Global execution lock.
//!
//! A single-slot mutex with FIFO waiter hand-off and a forced-release safety
//! timer. The entire opportunity lifecycle (reserve, both legs, commit or
//! release) runs under this lock, so at most one opportunity is in flight at
//! any time. A holder that does not release within the timeout is forcibly
//! released with a critical log; the stale permit's later release becomes a
//! no-op.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error};

/// Default forced-release ceiling.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct LockState {
    /// Generation of the current holder, if any.
    holder: Option<u64>,
    next_generation: u64,
    waiters: VecDeque<oneshot::Sender<u64>>,
}

#[derive(Debug)]
struct LockInner {
    state: Mutex<LockState>,
    timeout: Duration,
}

impl LockInner {
    /// Releases the slot if `generation` still holds it; hands off to the
    /// longest-waiting acquirer. Stale generations are no-ops, which is what
    /// makes double release and release-after-force-release safe.
    fn release_generation(&self, generation: u64, forced: bool) {
        let mut state = self.state.lock();
        if state.holder != Some(generation) {
            return;
        }

        if forced {
            error!(
                generation,
                timeout_secs = self.timeout.as_secs(),
                "critical: execution lock force-released; holder exceeded the safety ceiling"
            );
        }

        // FIFO hand-off, skipping waiters whose acquire future was dropped.
        while let Some(waiter) = state.waiters.pop_front() {
            let next = state.next_generation;
            state.next_generation += 1;
            if waiter.send(next).is_ok() {
                state.holder = Some(next);
                return;
            }
        }
        state.holder = None;
    }
}

/// Proof of holding the execution lock. Dropping it releases the slot, so
/// `acquire` followed by any exit path is a guaranteed release.
#[derive(Debug)]
pub struct ExecutionPermit {
    inner: Arc<LockInner>,
    generation: u64,
}

impl ExecutionPermit {
    /// Explicit release; equivalent to dropping the permit.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ExecutionPermit {
    fn drop(&mut self) {
        self.inner.release_generation(self.generation, false);
    }
}

/// Single-slot mutual exclusion with FIFO waiters and a forced-release
/// watchdog.
#[derive(Debug, Clone)]
pub struct ExecutionLock {
    inner: Arc<LockInner>,
}

impl ExecutionLock {
    /// Creates a lock with the default 30-second safety ceiling.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates a lock with an explicit safety ceiling.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(LockInner {
                state: Mutex::new(LockState {
                    holder: None,
                    next_generation: 0,
                    waiters: VecDeque::new(),
                }),
                timeout,
            }),
        }
    }

    /// Suspends until the slot is free, then returns the permit.
    pub async fn acquire(&self) -> ExecutionPermit {
        let pending = {
            let mut state = self.inner.state.lock();
            if state.holder.is_none() && state.waiters.is_empty() {
                let generation = state.next_generation;
                state.next_generation += 1;
                state.holder = Some(generation);
                Ok(generation)
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Err(rx)
            }
        };

        let generation = match pending {
            Ok(generation) => generation,
            Err(rx) => rx.await.expect("execution lock dropped while waiting"),
        };
        debug!(generation, "execution lock acquired");

        // Watchdog: force release if the holder overstays.
        let watchdog = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(watchdog.timeout).await;
            watchdog.release_generation(generation, true);
        });

        ExecutionPermit {
            inner: self.inner.clone(),
            generation,
        }
    }

    /// True while some permit holds the slot.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.inner.state.lock().holder.is_some()
    }
}

impl Default for ExecutionLock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_acquire_release_cycle() {
        let lock = ExecutionLock::new();
        assert!(!lock.is_held());

        let permit = lock.acquire().await;
        assert!(lock.is_held());

        permit.release();
        assert!(!lock.is_held());
    }

    #[tokio::test]
    async fn test_mutual_exclusion() {
        let lock = ExecutionLock::new();
        let in_section = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = lock.clone();
            let in_section = in_section.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let permit = lock.acquire().await;
                let now = in_section.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_section.fetch_sub(1, Ordering::SeqCst);
                permit.release();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fifo_handoff_order() {
        let lock = ExecutionLock::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = lock.acquire().await;

        let mut handles = Vec::new();
        for i in 0..4 {
            let lock = lock.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let permit = lock.acquire().await;
                order.lock().push(i);
                permit.release();
            }));
            // Let each waiter enqueue before spawning the next.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        first.release();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_forced_release_frees_the_slot() {
        let lock = ExecutionLock::with_timeout(Duration::from_millis(20));
        let stale = lock.acquire().await;

        // Watchdog fires and hands the slot to the next waiter.
        let acquired = tokio::time::timeout(Duration::from_millis(200), lock.acquire()).await;
        assert!(acquired.is_ok(), "forced release did not free the slot");

        // The stale permit's release is now a no-op.
        stale.release();
        assert!(lock.is_held());
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let lock = ExecutionLock::new();
        {
            let _permit = lock.acquire().await;
            assert!(lock.is_held());
        }
        assert!(!lock.is_held());
    }
}
