//! Periodic task scheduler with clean shutdown.
//!
//! Owns every long-lived ticker in the engine so components stay free of
//! `tokio::spawn` calls. Ticks never overlap themselves: the task body runs
//! to completion before the next interval fires, and missed ticks are
//! skipped rather than bursted.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Signals all scheduled tasks to stop at their next tick boundary.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Requests shutdown. In-flight ticks are allowed to complete.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Owns periodic tasks and their join handles.
pub struct Scheduler {
    shutdown_rx: watch::Receiver<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Creates a scheduler and its shutdown handle.
    #[must_use]
    pub fn new() -> (Self, ShutdownHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                shutdown_rx: rx,
                handles: Vec::new(),
            },
            ShutdownHandle { tx },
        )
    }

    /// Spawns a named periodic task.
    ///
    /// The closure is invoked once per period; because the future is awaited
    /// inline, a tick still running when the next period elapses causes the
    /// late tick to be skipped (`MissedTickBehavior::Skip`).
    pub fn spawn_periodic<F, Fut>(&mut self, name: &'static str, period: Duration, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick of tokio's interval fires immediately; consume
            // it so tasks start one full period after spawn.
            interval.tick().await;

            info!(task = name, period_secs = period.as_secs(), "periodic task started");
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        debug!(task = name, "tick");
                        task().await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!(task = name, "periodic task stopping");
                            break;
                        }
                    }
                }
            }
        });
        self.handles.push(handle);
    }

    /// Waits for all tasks to finish after shutdown was signalled.
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_periodic_task_fires_each_period() {
        let (mut scheduler, shutdown) = Scheduler::new();
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();

        scheduler.spawn_periodic("counter", Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(35)).await;
        shutdown.shutdown();
        scheduler.join().await;

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_tick_skips_missed_fires() {
        let (mut scheduler, shutdown) = Scheduler::new();
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();

        // Each tick takes 2.5 periods; missed fires must be skipped, not
        // bursted.
        scheduler.spawn_periodic("slow", Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(25)).await;
            }
        });

        tokio::time::sleep(Duration::from_secs(75)).await;
        shutdown.shutdown();
        scheduler.join().await;

        let fired = count.load(Ordering::SeqCst);
        assert!(fired <= 3, "expected skipped ticks, got {fired}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_tasks() {
        let (mut scheduler, shutdown) = Scheduler::new();
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();

        scheduler.spawn_periodic("stop-me", Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(15)).await;
        shutdown.shutdown();
        scheduler.join().await;
        let after_shutdown = count.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_shutdown);
    }
}
