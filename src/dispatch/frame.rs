//! Frame dispatcher: one bounded drain of the notification queue per loop tick.
//!
//! [`FrameDispatcher::drain`] is the only place pending actions run. Each tick
//! it copies the live [`DispatchBudget`], takes actions in FIFO order until the
//! queue is empty, the action cap is reached, or the wall-clock cap is exceeded,
//! and then reports whether the remaining backlog is above the warning
//! threshold. A drain started while another is in flight is skipped.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use super::budget::SharedBudget;
use super::clock::SharedClock;
use crate::callback::{panic_message, CallbackError};
use crate::queue::{NotificationQueue, NotificationSender, PendingAction};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Why a drain stopped taking actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The queue ran dry.
    Empty,
    /// `max_actions_per_tick` actions were processed and more are waiting.
    ActionCap,
    /// `max_wall_clock_per_tick` elapsed.
    TimeBudget,
    /// Another drain was already in flight; nothing was processed.
    Reentrant,
}

/// Outcome of a single drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Actions taken from the queue, including failed ones.
    pub processed: usize,
    /// Actions whose callback returned an error or panicked.
    pub failed: usize,
    /// Queue length when the drain ended.
    pub remaining: usize,
    pub stop: StopReason,
    /// Whether this tick emitted a backlog signal.
    pub backlog_warned: bool,
    /// Longest time an action processed this tick spent queued.
    pub max_wait: Duration,
}

impl DrainReport {
    fn start() -> Self {
        Self {
            processed: 0,
            failed: 0,
            remaining: 0,
            stop: StopReason::Empty,
            backlog_warned: false,
            max_wait: Duration::ZERO,
        }
    }

    /// Whether the tick was skipped by the reentrancy guard.
    pub fn skipped(&self) -> bool {
        self.stop == StopReason::Reentrant
    }
}

/// Backlog pressure observed at the end of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacklogSignal {
    pub remaining: usize,
    pub processed: usize,
    pub threshold: usize,
}

/// Hook invoked once per tick that ends above the backlog threshold.
pub type BacklogObserver = Arc<dyn Fn(&BacklogSignal) + Send + Sync>;

/// Totals across all ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub processed: u64,
    pub failed: u64,
    pub backlog_warnings: u64,
    /// Longest queueing latency seen so far.
    pub max_wait: Duration,
}

// ---------------------------------------------------------------------------
// DrainGuard
// ---------------------------------------------------------------------------

/// Holds the in-flight flag for the duration of a drain. Cleared on drop, so a
/// panic escaping the drain cannot wedge the dispatcher.
struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// FrameDispatcher
// ---------------------------------------------------------------------------

/// Single consumer of the notification queue.
///
/// The queue lock is held only while taking the next action and is released
/// before the action runs, so a callback may call back into the dispatcher
/// (and be turned away by the in-flight flag) or enqueue more work.
pub struct FrameDispatcher {
    queue: Mutex<NotificationQueue>,
    sender: NotificationSender,
    clock: SharedClock,
    budget: SharedBudget,
    draining: AtomicBool,
    stats: Mutex<DispatchStats>,
    backlog_observer: RwLock<Option<BacklogObserver>>,
}

impl FrameDispatcher {
    /// Take ownership of `queue` and drain it under `budget`, timed by the queue's clock.
    pub fn new(queue: NotificationQueue, budget: SharedBudget) -> Self {
        let sender = queue.sender();
        let clock = queue.clock().clone();
        Self {
            queue: Mutex::new(queue),
            sender,
            clock,
            budget,
            draining: AtomicBool::new(false),
            stats: Mutex::new(DispatchStats::default()),
            backlog_observer: RwLock::new(None),
        }
    }

    /// A producer handle for the queue this dispatcher drains.
    pub fn sender(&self) -> NotificationSender {
        self.sender.clone()
    }

    /// The live budget.
    pub fn budget(&self) -> &SharedBudget {
        &self.budget
    }

    /// Number of queued actions.
    pub fn pending_count(&self) -> usize {
        self.sender.len()
    }

    /// Whether a drain is currently running.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Install the backlog hook, replacing any previous one.
    pub fn set_backlog_observer(&self, observer: impl Fn(&BacklogSignal) + Send + Sync + 'static) {
        *self.backlog_observer.write() = Some(Arc::new(observer));
    }

    /// Totals since creation.
    pub fn stats(&self) -> DispatchStats {
        *self.stats.lock()
    }

    /// Run one bounded drain.
    pub fn drain(&self) -> DrainReport {
        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            log::debug!("drain requested while a drain is in flight, skipping tick");
            self.stats.lock().skipped_ticks += 1;
            return DrainReport {
                remaining: self.sender.len(),
                stop: StopReason::Reentrant,
                ..DrainReport::start()
            };
        };

        let budget = self.budget.get();
        let started = self.clock.now();
        let mut report = DrainReport::start();

        loop {
            if report.processed >= budget.max_actions_per_tick {
                report.stop = if self.sender.is_empty() {
                    StopReason::Empty
                } else {
                    StopReason::ActionCap
                };
                break;
            }
            let next = self.queue.lock().try_dequeue();
            let Some(action) = next else {
                report.stop = StopReason::Empty;
                break;
            };

            report.processed += 1;
            let wait = self.clock.now().saturating_sub(action.enqueued_at());
            report.max_wait = report.max_wait.max(wait);

            let context = action.context();
            if let Err(err) = run_guarded(action) {
                report.failed += 1;
                log::warn!("{context} callback failed: {err}");
            }

            if self.clock.now().saturating_sub(started) > budget.max_wall_clock_per_tick {
                report.stop = StopReason::TimeBudget;
                break;
            }
        }

        report.remaining = self.sender.len();
        if report.remaining > budget.backlog_warning_threshold {
            report.backlog_warned = true;
            let signal = BacklogSignal {
                remaining: report.remaining,
                processed: report.processed,
                threshold: budget.backlog_warning_threshold,
            };
            log::warn!(
                "pending action backlog: {} waiting, {} processed this tick",
                signal.remaining,
                signal.processed
            );
            let observer = self.backlog_observer.read().clone();
            if let Some(observer) = observer {
                observer(&signal);
            }
        }

        let mut stats = self.stats.lock();
        stats.ticks += 1;
        stats.processed += report.processed as u64;
        stats.failed += report.failed as u64;
        stats.backlog_warnings += u64::from(report.backlog_warned);
        stats.max_wait = stats.max_wait.max(report.max_wait);
        drop(stats);

        report
    }
}

impl std::fmt::Debug for FrameDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDispatcher")
            .field("pending", &self.pending_count())
            .field("draining", &self.is_draining())
            .field("budget", &self.budget.get())
            .finish()
    }
}

/// Run an action inside a failure boundary. Panics become `CallbackError::Panicked`.
fn run_guarded(action: PendingAction) -> Result<(), CallbackError> {
    match panic::catch_unwind(AssertUnwindSafe(move || action.run())) {
        Ok(result) => result,
        Err(payload) => Err(CallbackError::Panicked(panic_message(&*payload))),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
