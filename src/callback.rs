//! Callback trait and the records delivered to callbacks.
//!
//! A [`Callback`] is the opaque application/script target: the engine never
//! interprets it, only invokes it from the frame dispatcher with a
//! [`Notification`]. Closures of the right shape implement it directly.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::handle::CallbackKind;
use crate::toolkit::{EventCode, TargetId};

/// Optional opaque data supplied at registration and handed back with each event.
pub type UserPayload = Arc<dyn Any + Send + Sync>;

/// Shared reference to a callback, as stored in records and pending actions.
pub type SharedCallback = Arc<dyn Callback>;

// ---------------------------------------------------------------------------
// CallbackError
// ---------------------------------------------------------------------------

/// Failure raised by a callback while it ran in the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackError {
    #[error("script error: {0}")]
    Script(String),
    #[error("callback panicked: {0}")]
    Panicked(String),
}

impl CallbackError {
    /// Convenience constructor for a script-level error.
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script(message.into())
    }
}

// ---------------------------------------------------------------------------
// EventRecord
// ---------------------------------------------------------------------------

/// Snapshot of an event, copied out of the native notification at capture time.
#[derive(Clone)]
pub struct EventRecord {
    code: EventCode,
    target: TargetId,
    payload: Option<UserPayload>,
}

impl EventRecord {
    pub fn new(code: EventCode, target: TargetId, payload: Option<UserPayload>) -> Self {
        Self {
            code,
            target,
            payload,
        }
    }

    /// The event code.
    pub fn code(&self) -> EventCode {
        self.code
    }

    /// The object the event was dispatched to. Use it to look the object up
    /// again through the toolkit; it may have been deleted since.
    pub fn target(&self) -> TargetId {
        self.target
    }

    /// The payload supplied at registration.
    pub fn payload(&self) -> Option<&UserPayload> {
        self.payload.as_ref()
    }

    /// The payload downcast to a concrete type.
    pub fn payload_as<T: Any>(&self) -> Option<&T> {
        self.payload.as_deref().and_then(|p| p.downcast_ref::<T>())
    }
}

impl fmt::Debug for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRecord")
            .field("code", &self.code)
            .field("target", &self.target)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// What a callback receives when its pending action runs.
#[derive(Debug, Clone)]
pub enum Notification {
    /// An event listener fired.
    Event(EventRecord),
    /// A timer fired. Timers carry no data beyond the fact of firing.
    Timer,
}

impl Notification {
    /// Which kind of registration produced this notification.
    pub fn kind(&self) -> CallbackKind {
        match self {
            Self::Event(_) => CallbackKind::Event,
            Self::Timer => CallbackKind::Timer,
        }
    }

    /// The event record, if this is an event.
    pub fn as_event(&self) -> Option<&EventRecord> {
        match self {
            Self::Event(event) => Some(event),
            Self::Timer => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Callback
// ---------------------------------------------------------------------------

/// An invocable application or script target.
pub trait Callback: Send + Sync + 'static {
    fn invoke(&self, notification: &Notification) -> Result<(), CallbackError>;
}

impl<F> Callback for F
where
    F: Fn(&Notification) -> Result<(), CallbackError> + Send + Sync + 'static,
{
    fn invoke(&self, notification: &Notification) -> Result<(), CallbackError> {
        self(notification)
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
