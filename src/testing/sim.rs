//! SimToolkit: a headless stand-in for the native UI toolkit.
//!
//! Keeps native objects, event listeners and timers in plain collections and
//! calls the registered `extern "C"` trampolines exactly as a real toolkit
//! would: [`emit`](SimToolkit::emit) for input events and
//! [`advance`](SimToolkit::advance) for virtual time.

use std::collections::HashSet;

use crate::toolkit::{
    EventCode, EventTrampoline, NativeContext, NativeHandle, RawEvent, RawTimer, TargetId,
    TimerTrampoline, Toolkit, ToolkitError,
};

const FIRST_ADDRESS: usize = 0x1000;
const OBJECT_STRIDE: usize = 0x40;

struct Listener {
    handle: NativeHandle,
    target: TargetId,
    code: EventCode,
    trampoline: EventTrampoline,
    context: NativeContext,
}

struct SimTimer {
    handle: NativeHandle,
    period_ms: u32,
    elapsed_ms: u32,
    trampoline: TimerTrampoline,
    context: NativeContext,
}

impl SimTimer {
    fn fire(&self) {
        let mut raw = RawTimer {
            user_data: self.context.as_ptr(),
            period_ms: self.period_ms,
        };
        (self.trampoline)(&mut raw);
    }
}

// ---------------------------------------------------------------------------
// SimToolkit
// ---------------------------------------------------------------------------

/// A headless toolkit for driving an engine in tests.
///
/// # Examples
///
/// ```
/// use vdu_bridge::testing::SimToolkit;
/// use vdu_bridge::{Engine, EventCode, Notification, CallbackError};
///
/// let mut sim = SimToolkit::new();
/// let button = sim.create_object();
/// let engine = Engine::new(sim);
/// engine
///     .add_event_cb(button, EventCode(7), |_: &Notification| -> Result<(), CallbackError> { Ok(()) }, None)
///     .unwrap();
/// engine.with_toolkit(|sim| sim.emit(button, EventCode(7)));
/// assert_eq!(engine.process_pending().processed, 1);
/// ```
pub struct SimToolkit {
    objects: HashSet<TargetId>,
    listeners: Vec<Listener>,
    timers: Vec<SimTimer>,
    next_address: usize,
    next_handle: u64,
    now_ms: u64,
    rejecting: bool,
}

impl SimToolkit {
    /// Create a toolkit with no objects.
    pub fn new() -> Self {
        Self {
            objects: HashSet::new(),
            listeners: Vec::new(),
            timers: Vec::new(),
            next_address: FIRST_ADDRESS,
            next_handle: 1,
            now_ms: 0,
            rejecting: false,
        }
    }

    // ── Objects ──────────────────────────────────────────────────────

    /// Create a native object and return its identity.
    pub fn create_object(&mut self) -> TargetId {
        let target = TargetId(self.next_address);
        self.next_address += OBJECT_STRIDE;
        self.objects.insert(target);
        target
    }

    /// Delete an object together with its listeners. Returns `false` if unknown.
    pub fn delete_object(&mut self, target: TargetId) -> bool {
        if !self.objects.remove(&target) {
            return false;
        }
        self.listeners.retain(|l| l.target != target);
        true
    }

    /// Whether `target` is a live object.
    pub fn has_object(&self, target: TargetId) -> bool {
        self.objects.contains(&target)
    }

    /// Make every subsequent registration fail with [`ToolkitError::Rejected`].
    pub fn reject_registrations(&mut self, reject: bool) {
        self.rejecting = reject;
    }

    // ── Notifications ────────────────────────────────────────────────

    /// Dispatch `code` to `target`, calling every matching listener in the
    /// order they were added. Returns the number of listeners called.
    pub fn emit(&mut self, target: TargetId, code: EventCode) -> usize {
        if !self.objects.contains(&target) {
            return 0;
        }
        let mut called = 0;
        for listener in self.listeners.iter().filter(|l| l.target == target) {
            if !listener.code.matches(code) {
                continue;
            }
            let mut raw = RawEvent {
                code: code.raw(),
                target: target.as_ptr(),
                user_data: listener.context.as_ptr(),
            };
            (listener.trampoline)(&mut raw);
            called += 1;
        }
        called
    }

    /// Advance virtual time by `ms` milliseconds, firing every timer whose
    /// period elapses. Returns the number of timer firings.
    pub fn advance(&mut self, ms: u64) -> usize {
        let mut fired = 0;
        for _ in 0..ms {
            self.now_ms += 1;
            for timer in &mut self.timers {
                timer.elapsed_ms += 1;
                if timer.elapsed_ms >= timer.period_ms {
                    timer.elapsed_ms = 0;
                    timer.fire();
                    fired += 1;
                }
            }
        }
        fired
    }

    /// Fire a timer immediately without touching its period.
    pub fn fire_timer(&mut self, handle: NativeHandle) -> bool {
        match self.timers.iter().find(|t| t.handle == handle) {
            Some(timer) => {
                timer.fire();
                true
            }
            None => false,
        }
    }

    // ── Query ────────────────────────────────────────────────────────

    /// Virtual milliseconds since creation.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    pub fn has_listener(&self, handle: NativeHandle) -> bool {
        self.listeners.iter().any(|l| l.handle == handle)
    }

    pub fn has_timer(&self, handle: NativeHandle) -> bool {
        self.timers.iter().any(|t| t.handle == handle)
    }

    fn allocate_handle(&mut self) -> NativeHandle {
        let handle = NativeHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }
}

impl Default for SimToolkit {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimToolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimToolkit")
            .field("objects", &self.objects.len())
            .field("listeners", &self.listeners.len())
            .field("timers", &self.timers.len())
            .field("now_ms", &self.now_ms)
            .finish()
    }
}

impl Toolkit for SimToolkit {
    fn add_event_listener(
        &mut self,
        target: TargetId,
        code: EventCode,
        trampoline: EventTrampoline,
        context: NativeContext,
    ) -> Result<NativeHandle, ToolkitError> {
        if self.rejecting {
            return Err(ToolkitError::Rejected("registrations disabled".into()));
        }
        if !self.objects.contains(&target) {
            return Err(ToolkitError::UnknownTarget(target));
        }
        let handle = self.allocate_handle();
        self.listeners.push(Listener {
            handle,
            target,
            code,
            trampoline,
            context,
        });
        Ok(handle)
    }

    fn remove_event_listener(&mut self, target: TargetId, handle: NativeHandle) {
        self.listeners
            .retain(|l| !(l.target == target && l.handle == handle));
    }

    fn create_timer(
        &mut self,
        period_ms: u32,
        trampoline: TimerTrampoline,
        context: NativeContext,
    ) -> Result<NativeHandle, ToolkitError> {
        if self.rejecting {
            return Err(ToolkitError::Rejected("registrations disabled".into()));
        }
        let handle = self.allocate_handle();
        self.timers.push(SimTimer {
            handle,
            period_ms,
            elapsed_ms: 0,
            trampoline,
            context,
        });
        Ok(handle)
    }

    fn delete_timer(&mut self, handle: NativeHandle) {
        self.timers.retain(|t| t.handle != handle);
    }
}

// ===========================================================================
// Tests
// ===========================================================================
