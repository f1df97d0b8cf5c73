//! C-ABI notification structs, identity newtypes and trampoline signatures.
//!
//! These are the only shapes that cross the toolkit boundary. The toolkit hands
//! a [`RawEvent`] or [`RawTimer`] to a trampoline for the duration of one call;
//! nothing in them may be retained after the trampoline returns.

use std::ffi::c_void;
use std::fmt;

use slotmap::{Key, KeyData};

use crate::handle::RegistrationId;

// A registration id is slot index plus generation in one 64-bit value, and it
// travels through the toolkit as a `void*`. Narrower pointers would drop the
// generation and make live registrations look stale.
#[cfg(not(target_pointer_width = "64"))]
compile_error!("vdu-bridge requires a 64-bit target: registration contexts are carried in a pointer");

// ---------------------------------------------------------------------------
// EventCode
// ---------------------------------------------------------------------------

/// Numeric event code as delivered by the toolkit (pressed, released, clicked, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EventCode(pub i32);

impl EventCode {
    /// Listener filter that receives every event code.
    pub const ALL: EventCode = EventCode(0);

    /// The raw integer code.
    pub fn raw(self) -> i32 {
        self.0
    }

    /// Whether a listener registered with `self` as its filter receives `code`.
    pub fn matches(self, code: EventCode) -> bool {
        self == Self::ALL || self == code
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TargetId
// ---------------------------------------------------------------------------

/// Identity of a native toolkit object: its address on the native side.
///
/// Plain data. Holding a `TargetId` does not keep the object alive; it can only
/// be used to look the object up again through the toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TargetId(pub usize);

impl TargetId {
    /// Capture the identity of a native object pointer.
    pub fn from_ptr(ptr: *const c_void) -> Self {
        Self(ptr as usize)
    }

    /// The identity as a pointer, for handing back to the toolkit.
    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    /// Whether this is the null object.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// NativeContext
// ---------------------------------------------------------------------------

/// Opaque per-registration context value stored by the toolkit as `user_data`
/// and passed back unmodified on every notification.
///
/// Encodes a [`RegistrationId`] (slot index and generation) in one pointer-sized
/// word. Only 64-bit targets are supported, so the round trip is lossless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeContext(u64);

impl NativeContext {
    /// The context value for a registration.
    pub fn from_registration(id: RegistrationId) -> Self {
        Self(id.data().as_ffi())
    }

    /// Recover a context value from the `user_data` pointer the toolkit passed back.
    pub fn from_ptr(ptr: *const c_void) -> Self {
        Self(ptr as usize as u64)
    }

    /// The context as a `user_data` pointer.
    pub fn as_ptr(self) -> *mut c_void {
        self.0 as usize as *mut c_void
    }

    /// Decode the registration id. `None` for a null context.
    pub fn registration(self) -> Option<RegistrationId> {
        if self.0 == 0 {
            return None;
        }
        Some(KeyData::from_ffi(self.0).into())
    }
}

// ---------------------------------------------------------------------------
// Raw notifications
// ---------------------------------------------------------------------------

/// An event notification as the toolkit lays it out.
#[repr(C)]
#[derive(Debug)]
pub struct RawEvent {
    /// Event code.
    pub code: i32,
    /// Object the event is currently dispatched to.
    pub target: *mut c_void,
    /// The listener's context value.
    pub user_data: *mut c_void,
}

/// A timer firing as the toolkit lays it out.
#[repr(C)]
#[derive(Debug)]
pub struct RawTimer {
    /// The timer's context value.
    pub user_data: *mut c_void,
    /// Configured period in milliseconds.
    pub period_ms: u32,
}

/// Entry point the toolkit calls for an event listener.
pub type EventTrampoline = extern "C" fn(*mut RawEvent);

/// Entry point the toolkit calls when a timer fires.
pub type TimerTrampoline = extern "C" fn(*mut RawTimer);
