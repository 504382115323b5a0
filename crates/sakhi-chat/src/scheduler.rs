//! Deferred reply delivery and time sources.
//!
//! The conversation store never sleeps itself. It hands each reply to a
//! [`ReplyScheduler`] together with the simulated delay, and stamps messages
//! with a [`Clock`]. Production uses [`TokioScheduler`] and [`SystemClock`];
//! tests swap in [`ImmediateScheduler`], [`ManualScheduler`] and [`ManualClock`].

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::watch;

/// Work to run once a reply delay has elapsed.
pub type ReplyTask = Box<dyn FnOnce() + Send + 'static>;

// =============================================================================
// Clocks
// =============================================================================

/// Source of message timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock by `by` (negative values step backwards).
    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

// =============================================================================
// Schedulers
// =============================================================================

/// Runs reply tasks after a delay.
pub trait ReplyScheduler: Send + Sync {
    /// Arrange for `task` to run once `delay` has elapsed.
    fn schedule(&self, delay: Duration, task: ReplyTask);

    /// Stop delivering tasks that have not run yet.
    fn shutdown(&self) {}
}

/// Timer-backed scheduler on a tokio runtime.
///
/// Every task is a spawned sleep. `shutdown` (or dropping the scheduler)
/// cancels the tasks still sleeping.
#[derive(Debug)]
pub struct TokioScheduler {
    handle: Handle,
    shutdown_tx: watch::Sender<bool>,
}

impl TokioScheduler {
    /// Create a scheduler spawning onto `handle`.
    pub fn new(handle: Handle) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            handle,
            shutdown_tx,
        }
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

impl ReplyScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: ReplyTask) {
        if self.is_shut_down() {
            tracing::debug!("Scheduler is shut down, reply not scheduled");
            return;
        }
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        self.handle.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => task(),
                _ = shutdown_rx.wait_for(|stopped| *stopped) => {
                    tracing::debug!("Pending reply cancelled by shutdown");
                }
            }
        });
    }

    fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

/// Runs every task synchronously inside `schedule`, ignoring the delay.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateScheduler;

impl ReplyScheduler for ImmediateScheduler {
    fn schedule(&self, _delay: Duration, task: ReplyTask) {
        task();
    }
}

/// Queues tasks until the caller fires them, in any order.
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<Vec<(Duration, ReplyTask)>>,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting to be fired.
    pub fn pending(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Delays of the queued tasks, in scheduling order.
    pub fn delays(&self) -> Vec<Duration> {
        self.queue
            .lock()
            .map(|q| q.iter().map(|(d, _)| *d).collect())
            .unwrap_or_default()
    }

    /// Fire the task at `index` (0 = oldest). Returns false if there is none.
    pub fn run_at(&self, index: usize) -> bool {
        // Take the task out before running it so it may schedule again.
        let task = match self.queue.lock() {
            Ok(mut q) if index < q.len() => q.remove(index).1,
            _ => return false,
        };
        task();
        true
    }

    /// Fire the oldest task.
    pub fn run_next(&self) -> bool {
        self.run_at(0)
    }

    /// Fire the newest task.
    pub fn run_last(&self) -> bool {
        let len = self.pending();
        len > 0 && self.run_at(len - 1)
    }

    /// Fire everything queued, oldest first. Returns how many ran.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Drop every queued task without running it.
    pub fn clear(&self) -> usize {
        self.queue
            .lock()
            .map(|mut q| q.drain(..).count())
            .unwrap_or(0)
    }
}

impl ReplyScheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: ReplyTask) {
        if let Ok(mut q) = self.queue.lock() {
            q.push((delay, task));
        }
    }

    fn shutdown(&self) {
        let dropped = self.clear();
        tracing::debug!(dropped, "Manual scheduler cleared");
    }
}

// =============================================================================
// Tests
// =============================================================================
