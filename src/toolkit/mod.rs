//! The native toolkit boundary.
//!
//! [`Toolkit`] is what the engine needs from the native side: attach and detach
//! event listeners, create and delete timers. Every registration carries a
//! trampoline plus an opaque [`NativeContext`]; the toolkit calls the trampoline
//! with that context whenever the notification occurs.

pub mod abi;

pub use abi::{
    EventCode, EventTrampoline, NativeContext, RawEvent, RawTimer, TargetId, TimerTrampoline,
};

/// Raw toolkit-side handle of a listener or timer. Owned by the toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(pub u64);

/// Errors reported by the toolkit when a registration is refused.
#[derive(Debug, thiserror::Error)]
pub enum ToolkitError {
    #[error("unknown native object {0}")]
    UnknownTarget(TargetId),
    #[error("toolkit rejected the registration: {0}")]
    Rejected(String),
}

/// Native-side registration operations.
///
/// Implementations must never run application code synchronously from these
/// methods; notifications are delivered only through the trampolines.
pub trait Toolkit: Send + 'static {
    /// Attach an event listener for `code` on `target`.
    fn add_event_listener(
        &mut self,
        target: TargetId,
        code: EventCode,
        trampoline: EventTrampoline,
        context: NativeContext,
    ) -> Result<NativeHandle, ToolkitError>;

    /// Detach a listener previously returned by `add_event_listener`.
    fn remove_event_listener(&mut self, target: TargetId, handle: NativeHandle);

    /// Create a periodic timer.
    fn create_timer(
        &mut self,
        period_ms: u32,
        trampoline: TimerTrampoline,
        context: NativeContext,
    ) -> Result<NativeHandle, ToolkitError>;

    /// Delete a timer previously returned by `create_timer`.
    fn delete_timer(&mut self, handle: NativeHandle);
}
