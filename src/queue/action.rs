//! Pending actions: self-contained units of deferred work.
//!
//! A [`PendingAction`] owns copies of everything it needs to run. It is built by
//! a trampoline (or by [`Engine::post`](crate::engine::Engine::post)), consumed
//! exactly once by the frame dispatcher, then dropped.

use std::fmt;
use std::time::Duration;

use crate::callback::{CallbackError, Notification, SharedCallback};
use crate::handle::CallbackKind;
use crate::toolkit::{EventCode, TargetId};

/// One-shot deferred closure, used for toolkit mutations that must not run
/// inside the toolkit's own call frame.
pub type DeferredWork = Box<dyn FnOnce() -> Result<(), CallbackError> + Send>;

/// What produced a pending action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Event,
    Timer,
    Deferred,
}

impl From<CallbackKind> for ActionKind {
    fn from(kind: CallbackKind) -> Self {
        match kind {
            CallbackKind::Event => Self::Event,
            CallbackKind::Timer => Self::Timer,
        }
    }
}

enum Work {
    Notify {
        callback: SharedCallback,
        notification: Notification,
    },
    Deferred(DeferredWork),
}

/// Captured notification plus the callback resolved at capture time.
pub struct PendingAction {
    work: Work,
    enqueued_at: Duration,
}

impl PendingAction {
    /// Action delivering `notification` to `callback`.
    pub fn notify(callback: SharedCallback, notification: Notification) -> Self {
        Self {
            work: Work::Notify {
                callback,
                notification,
            },
            enqueued_at: Duration::ZERO,
        }
    }

    /// Action running a one-shot closure.
    pub fn deferred(work: impl FnOnce() -> Result<(), CallbackError> + Send + 'static) -> Self {
        Self {
            work: Work::Deferred(Box::new(work)),
            enqueued_at: Duration::ZERO,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match &self.work {
            Work::Notify { notification, .. } => notification.kind().into(),
            Work::Deferred(_) => ActionKind::Deferred,
        }
    }

    /// The captured notification, if this action delivers one.
    pub fn notification(&self) -> Option<&Notification> {
        match &self.work {
            Work::Notify { notification, .. } => Some(notification),
            Work::Deferred(_) => None,
        }
    }

    /// Queue clock reading when the action was enqueued.
    pub fn enqueued_at(&self) -> Duration {
        self.enqueued_at
    }

    pub(crate) fn stamped(mut self, at: Duration) -> Self {
        self.enqueued_at = at;
        self
    }

    /// Diagnostic context for logs, available after the action has been consumed.
    pub fn context(&self) -> ActionContext {
        match &self.work {
            Work::Notify {
                notification: Notification::Event(event),
                ..
            } => ActionContext::Event {
                code: event.code(),
                target: event.target(),
            },
            Work::Notify {
                notification: Notification::Timer,
                ..
            } => ActionContext::Timer,
            Work::Deferred(_) => ActionContext::Deferred,
        }
    }

    /// Run the action, consuming it.
    pub fn run(self) -> Result<(), CallbackError> {
        match self.work {
            Work::Notify {
                callback,
                notification,
            } => callback.invoke(&notification),
            Work::Deferred(work) => work(),
        }
    }
}

impl fmt::Debug for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAction")
            .field("context", &self.context())
            .field("enqueued_at", &self.enqueued_at)
            .finish()
    }
}

/// Which kind of action and which target, for failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionContext {
    Event { code: EventCode, target: TargetId },
    Timer,
    Deferred,
}

impl fmt::Display for ActionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event { code, target } => write!(f, "event {code} on {target}"),
            Self::Timer => f.write_str("timer"),
            Self::Deferred => f.write_str("deferred work"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::EventRecord;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn notify_runs_callback_with_snapshot() {
        let seen = Arc::new(AtomicI32::new(0));
        let s = seen.clone();
        let cb: SharedCallback = Arc::new(move |n: &Notification| -> Result<(), CallbackError> {
            if let Some(event) = n.as_event() {
                s.store(event.code().raw(), Ordering::SeqCst);
            }
            Ok(())
        });
        let event = EventRecord::new(EventCode(11), TargetId(0x30), None);
        let action = PendingAction::notify(cb, Notification::Event(event));
        assert_eq!(action.kind(), ActionKind::Event);
        action.run().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn deferred_runs_once() {
        let action = PendingAction::deferred(|| Err(CallbackError::script("nope")));
        assert_eq!(action.kind(), ActionKind::Deferred);
        assert!(action.notification().is_none());
        assert_eq!(action.run(), Err(CallbackError::script("nope")));
    }

    #[test]
    fn context_display() {
        let ctx = ActionContext::Event {
            code: EventCode(1),
            target: TargetId(0xff),
        };
        assert_eq!(ctx.to_string(), "event 1 on 0xff");
        assert_eq!(ActionContext::Timer.to_string(), "timer");
        assert_eq!(ActionContext::Deferred.to_string(), "deferred work");
    }

    #[test]
    fn stamp_sets_enqueue_time() {
        let action = PendingAction::deferred(|| Ok(())).stamped(Duration::from_millis(5));
        assert_eq!(action.enqueued_at(), Duration::from_millis(5));
    }
}
