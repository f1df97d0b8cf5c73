//! `extern "C"` entry points the toolkit calls directly.
//!
//! A trampoline runs inside the toolkit's own input/render pass. It decodes the
//! context value, resolves the registration, copies plain data out of the raw
//! notification, enqueues a [`PendingAction`] and returns. It never invokes a
//! callback and never lets a panic unwind into the toolkit.
//!
//! The logic lives in [`capture_event`] and [`capture_timer`], which take the
//! handle table explicitly. The `extern "C"` functions bind them to
//! [`HandleTable::global`].

use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::callback::{panic_message, EventRecord, Notification};
use crate::handle::{CallbackKind, CallbackRecord, HandleTable};
use crate::queue::PendingAction;
use crate::toolkit::{EventCode, NativeContext, RawEvent, RawTimer, TargetId};

// ---------------------------------------------------------------------------
// C entry points
// ---------------------------------------------------------------------------

/// Event listener trampoline. Pass this to the toolkit as the listener callback.
pub extern "C" fn event_trampoline(event: *mut RawEvent) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: the toolkit passes a pointer that is valid for the duration
        // of this call, or null.
        if let Some(raw) = unsafe { event.as_ref() } {
            capture_event(HandleTable::global(), raw);
        }
    }));
    if let Err(payload) = outcome {
        log::error!("panic in event trampoline: {}", panic_message(&*payload));
    }
}

/// Timer trampoline. Pass this to the toolkit as the timer callback.
pub extern "C" fn timer_trampoline(timer: *mut RawTimer) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: as for `event_trampoline`.
        if let Some(raw) = unsafe { timer.as_ref() } {
            capture_timer(HandleTable::global(), raw);
        }
    }));
    if let Err(payload) = outcome {
        log::error!("panic in timer trampoline: {}", panic_message(&*payload));
    }
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// Turn a raw event into a pending action. Returns whether one was enqueued.
///
/// A null `target` in the raw event falls back to the object the listener was
/// registered on.
pub fn capture_event(table: &HandleTable, raw: &RawEvent) -> bool {
    let Some(record) = resolve(table, raw.user_data, CallbackKind::Event) else {
        return false;
    };

    let code = EventCode(raw.code);
    if !record.code().matches(code) {
        log::trace!("event {code} filtered by listener for {}", record.code());
        return false;
    }

    let mut target = TargetId::from_ptr(raw.target);
    if target.is_null() {
        if let Some(own) = record.target() {
            target = own;
        }
    }

    log::trace!("captured event {code} on {target}");
    let event = EventRecord::new(code, target, record.payload().cloned());
    record.route().enqueue(PendingAction::notify(
        record.callback().clone(),
        Notification::Event(event),
    ))
}

/// Turn a raw timer firing into a pending action. Returns whether one was enqueued.
pub fn capture_timer(table: &HandleTable, raw: &RawTimer) -> bool {
    let Some(record) = resolve(table, raw.user_data, CallbackKind::Timer) else {
        return false;
    };
    log::trace!("captured timer tick ({} ms period)", raw.period_ms);
    record
        .route()
        .enqueue(PendingAction::notify(record.callback().clone(), Notification::Timer))
}

fn resolve(table: &HandleTable, user_data: *mut c_void, kind: CallbackKind) -> Option<Arc<CallbackRecord>> {
    let Some(id) = NativeContext::from_ptr(user_data).registration() else {
        log::debug!("{kind} notification with null context, ignoring");
        return None;
    };
    let Some(record) = table.resolve(id) else {
        log::debug!("{kind} notification for stale registration {id:?}, ignoring");
        return None;
    };
    if record.kind() != kind {
        log::debug!("{kind} notification routed to a {} registration, ignoring", record.kind());
        return None;
    }
    Some(record)
}

// ===========================================================================
// Tests
// ===========================================================================
