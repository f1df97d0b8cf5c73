//! Registration ids and callback records.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::OnceCell;
use slotmap::new_key_type;

use crate::callback::{SharedCallback, UserPayload};
use crate::queue::NotificationSender;
use crate::toolkit::{EventCode, NativeHandle, TargetId};

new_key_type! {
    /// Opaque identity of a registration. Copy, lightweight (u64).
    ///
    /// Slot index plus generation: once a registration is removed its id never
    /// resolves again, even after the slot is reused.
    pub struct RegistrationId;
}

/// Which notification source a registration listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    Event,
    Timer,
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event => f.write_str("event"),
            Self::Timer => f.write_str("timer"),
        }
    }
}

/// Everything needed to turn a native notification into a pending action.
///
/// Immutable once created. The native handle is bound exactly once, right after
/// the toolkit accepts the registration.
pub struct CallbackRecord {
    kind: CallbackKind,
    target: Option<TargetId>,
    code: EventCode,
    callback: SharedCallback,
    payload: Option<UserPayload>,
    route: NotificationSender,
    native: OnceCell<NativeHandle>,
    released: AtomicBool,
}

impl CallbackRecord {
    /// Record for an event listener on `target` filtered by `code`.
    pub fn event(
        target: TargetId,
        code: EventCode,
        callback: SharedCallback,
        payload: Option<UserPayload>,
        route: NotificationSender,
    ) -> Self {
        Self {
            kind: CallbackKind::Event,
            target: Some(target),
            code,
            callback,
            payload,
            route,
            native: OnceCell::new(),
            released: AtomicBool::new(false),
        }
    }

    /// Record for a timer.
    pub fn timer(callback: SharedCallback, route: NotificationSender) -> Self {
        Self {
            kind: CallbackKind::Timer,
            target: None,
            code: EventCode::ALL,
            callback,
            payload: None,
            route,
            native: OnceCell::new(),
            released: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> CallbackKind {
        self.kind
    }

    /// The native object an event listener is attached to. `None` for timers.
    pub fn target(&self) -> Option<TargetId> {
        self.target
    }

    /// Event code filter. `EventCode::ALL` for timers.
    pub fn code(&self) -> EventCode {
        self.code
    }

    pub fn callback(&self) -> &SharedCallback {
        &self.callback
    }

    pub fn payload(&self) -> Option<&UserPayload> {
        self.payload.as_ref()
    }

    /// The queue notifications for this registration are routed to.
    pub fn route(&self) -> &NotificationSender {
        &self.route
    }

    /// The toolkit-side listener or timer handle, once bound.
    pub fn native(&self) -> Option<NativeHandle> {
        self.native.get().copied()
    }

    /// Bind the native handle. Returns `false` if one was already bound.
    pub(crate) fn bind_native(&self, handle: NativeHandle) -> bool {
        self.native.set(handle).is_ok()
    }

    /// Claim the right to release the native side. `true` for the first caller only.
    pub(crate) fn claim_release(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel)
    }
}

impl fmt::Debug for CallbackRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRecord")
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("code", &self.code)
            .field("has_payload", &self.payload.is_some())
            .field("native", &self.native.get())
            .finish()
    }
}
