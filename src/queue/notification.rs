//! Multiple-producer, single-consumer notification queue.
//!
//! Producers hold a cloneable [`NotificationSender`]; the frame dispatcher owns
//! the [`NotificationQueue`]. Enqueue never blocks and never runs callbacks.
//! Actions come out in the order they went in.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::action::PendingAction;
use crate::dispatch::clock::{SharedClock, SystemClock};

struct Shared {
    len: AtomicUsize,
    clock: SharedClock,
}

// ---------------------------------------------------------------------------
// NotificationSender
// ---------------------------------------------------------------------------

/// Producer half. Safe to use from any thread, including from inside a
/// toolkit callback frame.
#[derive(Clone)]
pub struct NotificationSender {
    tx: UnboundedSender<PendingAction>,
    shared: Arc<Shared>,
}

impl NotificationSender {
    /// Stamp and enqueue an action. Returns `false` only if the consumer is gone,
    /// in which case the action is dropped.
    pub fn enqueue(&self, action: PendingAction) -> bool {
        let action = action.stamped(self.shared.clock.now());
        // Count before sending so the consumer can never observe an underflow.
        self.shared.len.fetch_add(1, Ordering::AcqRel);
        match self.tx.send(action) {
            Ok(()) => true,
            Err(err) => {
                self.shared.len.fetch_sub(1, Ordering::AcqRel);
                log::debug!("notification queue closed, dropping {}", err.0.context());
                false
            }
        }
    }

    /// Approximate number of queued actions.
    pub fn len(&self) -> usize {
        self.shared.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for NotificationSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSender")
            .field("len", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// NotificationQueue
// ---------------------------------------------------------------------------

/// Consumer half, owned by the frame dispatcher.
pub struct NotificationQueue {
    rx: UnboundedReceiver<PendingAction>,
    tx: UnboundedSender<PendingAction>,
    shared: Arc<Shared>,
}

impl NotificationQueue {
    /// Create an empty queue stamped by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Create an empty queue stamped by `clock`.
    pub fn with_clock(clock: SharedClock) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            rx,
            tx,
            shared: Arc::new(Shared {
                len: AtomicUsize::new(0),
                clock,
            }),
        }
    }

    /// A new producer handle.
    pub fn sender(&self) -> NotificationSender {
        NotificationSender {
            tx: self.tx.clone(),
            shared: self.shared.clone(),
        }
    }

    /// Take the oldest action, if any. Never blocks.
    pub fn try_dequeue(&mut self) -> Option<PendingAction> {
        let action = self.rx.try_recv().ok()?;
        self.shared.len.fetch_sub(1, Ordering::AcqRel);
        Some(action)
    }

    /// Approximate number of queued actions.
    pub fn len(&self) -> usize {
        self.shared.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The clock used to stamp actions.
    pub fn clock(&self) -> &SharedClock {
        &self.shared.clock
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NotificationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationQueue")
            .field("len", &self.len())
            .finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
