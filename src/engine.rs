//! Engine: the application-facing facade over the dispatch core.
//!
//! An [`Engine`] owns a [`Toolkit`], a notification queue and its frame
//! dispatcher, and the set of registrations it created in the process-wide
//! [`HandleTable`]. Scripts register event callbacks and timers through it; the
//! application loop calls [`Engine::process_pending`] once per frame.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::callback::{Callback, CallbackError, UserPayload};
use crate::dispatch::{
    BacklogSignal, DispatchBudget, DispatchStats, DrainReport, FrameDispatcher, SharedBudget,
    SharedClock,
};
use crate::handle::{CallbackKind, CallbackRecord, HandleTable, RegistrationId, TableError};
use crate::queue::{NotificationQueue, NotificationSender, PendingAction};
use crate::toolkit::{
    EventCode, NativeContext, NativeHandle, TargetId, Toolkit, ToolkitError,
};
use crate::trampoline::{event_trampoline, timer_trampoline};

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Configuration for an engine.
#[derive(Clone, Default)]
pub struct EngineConfig {
    /// Initial per-tick budget.
    pub budget: DispatchBudget,
    /// Most live registrations this engine may hold.
    pub capacity_limit: Option<usize>,
    /// Time source for budgets and queueing latency. System clock when `None`.
    pub clock: Option<SharedClock>,
}

impl EngineConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dispatch budget (builder).
    pub fn with_budget(mut self, budget: DispatchBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Limit the number of live registrations (builder).
    pub fn with_capacity_limit(mut self, limit: usize) -> Self {
        self.capacity_limit = Some(limit);
        self
    }

    /// Use a custom clock (builder).
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("budget", &self.budget)
            .field("capacity_limit", &self.capacity_limit)
            .field("custom_clock", &self.clock.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RegisterError
// ---------------------------------------------------------------------------

/// Why a registration could not be created.
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("toolkit refused {kind} registration")]
    Toolkit {
        kind: CallbackKind,
        #[source]
        source: ToolkitError,
    },
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct Inner<T: Toolkit> {
    toolkit: Mutex<T>,
    table: &'static HandleTable,
    dispatcher: FrameDispatcher,
    sender: NotificationSender,
    owned: Mutex<HashSet<RegistrationId>>,
    capacity_limit: Option<usize>,
}

/// Script-facing dispatch engine.
///
/// Cheap to clone; clones share the same queue and registrations. When the
/// last clone is dropped every registration it still owns is unregistered,
/// native side first. Callbacks that need the engine should capture a
/// [`WeakEngine`]: a strong handle held by a registered callback keeps the
/// engine alive for as long as that registration exists.
///
/// Locks are never held while callbacks run, so callbacks may register,
/// unregister, post work and touch the toolkit freely. The closure passed to
/// [`with_toolkit`](Self::with_toolkit) holds the toolkit lock and must not
/// call back into the engine.
pub struct Engine<T: Toolkit> {
    inner: Arc<Inner<T>>,
}

impl<T: Toolkit> Clone for Engine<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Toolkit> Engine<T> {
    /// Create an engine with the default config.
    pub fn new(toolkit: T) -> Self {
        Self::with_config(toolkit, EngineConfig::default())
    }

    /// Create an engine from an [`EngineConfig`].
    pub fn with_config(toolkit: T, config: EngineConfig) -> Self {
        let queue = match config.clock {
            Some(clock) => NotificationQueue::with_clock(clock),
            None => NotificationQueue::new(),
        };
        let sender = queue.sender();
        let dispatcher = FrameDispatcher::new(queue, SharedBudget::new(config.budget));
        Self {
            inner: Arc::new(Inner {
                toolkit: Mutex::new(toolkit),
                table: HandleTable::global(),
                dispatcher,
                sender,
                owned: Mutex::new(HashSet::new()),
                capacity_limit: config.capacity_limit,
            }),
        }
    }

    /// A handle that does not keep the engine alive.
    pub fn downgrade(&self) -> WeakEngine<T> {
        WeakEngine {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Attach `callback` to `code` events on `target`. [`EventCode::ALL`]
    /// receives every code. `payload` is handed back with each event.
    pub fn add_event_cb(
        &self,
        target: TargetId,
        code: EventCode,
        callback: impl Callback,
        payload: Option<UserPayload>,
    ) -> Result<RegistrationId, RegisterError> {
        let record = CallbackRecord::event(
            target,
            code,
            Arc::new(callback),
            payload,
            self.inner.sender.clone(),
        );
        self.inner.register(record, |toolkit, context| {
            toolkit.add_event_listener(target, code, event_trampoline, context)
        })
    }

    /// Create a timer that notifies `callback` every `period_ms` milliseconds.
    pub fn timer_create(
        &self,
        period_ms: u32,
        callback: impl Callback,
    ) -> Result<RegistrationId, RegisterError> {
        let record = CallbackRecord::timer(Arc::new(callback), self.inner.sender.clone());
        self.inner.register(record, |toolkit, context| {
            toolkit.create_timer(period_ms, timer_trampoline, context)
        })
    }

    /// Remove any registration owned by this engine. Idempotent: returns `false`
    /// for unknown or already-removed ids. Actions already queued still run.
    pub fn unregister(&self, id: RegistrationId) -> bool {
        if !self.inner.owned.lock().remove(&id) {
            return false;
        }
        self.inner.release(id)
    }

    /// Remove an event registration. `false` if `id` is not a live event
    /// registration of this engine.
    pub fn remove_event_cb(&self, id: RegistrationId) -> bool {
        self.unregister_kind(id, CallbackKind::Event)
    }

    /// Delete a timer. `false` if `id` is not a live timer of this engine.
    pub fn timer_delete(&self, id: RegistrationId) -> bool {
        self.unregister_kind(id, CallbackKind::Timer)
    }

    fn unregister_kind(&self, id: RegistrationId, kind: CallbackKind) -> bool {
        match self.inner.table.resolve(id) {
            Some(record) if record.kind() == kind => self.unregister(id),
            _ => false,
        }
    }

    /// Whether `id` is a live registration of this engine.
    pub fn is_registered(&self, id: RegistrationId) -> bool {
        self.inner.owned.lock().contains(&id)
    }

    /// Number of live registrations owned by this engine.
    pub fn registration_count(&self) -> usize {
        self.inner.owned.lock().len()
    }

    /// The toolkit-side handle bound to a registration.
    pub fn native_handle(&self, id: RegistrationId) -> Option<NativeHandle> {
        if !self.is_registered(id) {
            return None;
        }
        self.inner.table.resolve(id).and_then(|record| record.native())
    }

    // ── Deferred work ────────────────────────────────────────────────

    /// Queue a closure to run on the next drain, outside any toolkit call
    /// frame. Returns `false` only if the queue is gone.
    pub fn post(
        &self,
        work: impl FnOnce() -> Result<(), CallbackError> + Send + 'static,
    ) -> bool {
        self.inner.sender.enqueue(PendingAction::deferred(work))
    }

    /// A producer handle for posting from other threads.
    pub fn sender(&self) -> NotificationSender {
        self.inner.sender.clone()
    }

    // ── Frame processing ─────────────────────────────────────────────

    /// Drain pending actions under the current budget. Call once per frame.
    pub fn process_pending(&self) -> DrainReport {
        self.inner.dispatcher.drain()
    }

    /// Number of queued actions.
    pub fn pending_count(&self) -> usize {
        self.inner.dispatcher.pending_count()
    }

    /// The live budget. Changes apply from the next tick.
    pub fn budget(&self) -> &SharedBudget {
        self.inner.dispatcher.budget()
    }

    /// Dispatch totals since creation.
    pub fn stats(&self) -> DispatchStats {
        self.inner.dispatcher.stats()
    }

    /// Install a hook called once per tick that ends above the backlog threshold.
    pub fn on_backlog(&self, observer: impl Fn(&BacklogSignal) + Send + Sync + 'static) {
        self.inner.dispatcher.set_backlog_observer(observer);
    }

    // ── Toolkit access ───────────────────────────────────────────────

    /// Run `f` with exclusive access to the toolkit.
    pub fn with_toolkit<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut *self.inner.toolkit.lock())
    }
}

impl<T: Toolkit> std::fmt::Debug for Engine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registrations", &self.registration_count())
            .field("dispatcher", &self.inner.dispatcher)
            .finish()
    }
}

impl<T: Toolkit> Inner<T> {
    fn register(
        &self,
        record: CallbackRecord,
        attach: impl FnOnce(&mut T, NativeContext) -> Result<NativeHandle, ToolkitError>,
    ) -> Result<RegistrationId, RegisterError> {
        let kind = record.kind();
        let mut owned = self.owned.lock();
        if let Some(limit) = self.capacity_limit {
            if owned.len() >= limit {
                return Err(TableError::Exhausted { capacity: limit }.into());
            }
        }

        let id = self.table.register(record)?;
        let attached = attach(&mut *self.toolkit.lock(), NativeContext::from_registration(id));
        match attached {
            Ok(handle) => {
                self.table.bind_native(id, handle);
                owned.insert(id);
                log::debug!("registered {kind} {id:?} as native {handle:?}");
                Ok(id)
            }
            Err(source) => {
                self.table.unregister(id, |_| {});
                Err(RegisterError::Toolkit { kind, source })
            }
        }
    }

    fn release(&self, id: RegistrationId) -> bool {
        self.table.unregister(id, |record| {
            let Some(handle) = record.native() else {
                return;
            };
            let mut toolkit = self.toolkit.lock();
            match (record.kind(), record.target()) {
                (CallbackKind::Event, Some(target)) => toolkit.remove_event_listener(target, handle),
                (CallbackKind::Timer, _) => toolkit.delete_timer(handle),
                (CallbackKind::Event, None) => {}
            }
        })
    }
}

impl<T: Toolkit> Drop for Inner<T> {
    fn drop(&mut self) {
        let ids: Vec<RegistrationId> = self.owned.get_mut().drain().collect();
        if !ids.is_empty() {
            log::debug!("engine dropped, releasing {} registrations", ids.len());
        }
        for id in ids {
            self.release(id);
        }
    }
}

// ---------------------------------------------------------------------------
// WeakEngine
// ---------------------------------------------------------------------------

/// Non-owning engine handle, for capture inside callbacks.
pub struct WeakEngine<T: Toolkit> {
    inner: Weak<Inner<T>>,
}

impl<T: Toolkit> WeakEngine<T> {
    /// The engine, if it is still alive.
    pub fn upgrade(&self) -> Option<Engine<T>> {
        self.inner.upgrade().map(|inner| Engine { inner })
    }
}

impl<T: Toolkit> Clone for WeakEngine<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::Notification;
    use crate::dispatch::StopReason;
    use crate::testing::SimToolkit;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Callback) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let cb = move |_: &Notification| -> Result<(), CallbackError> {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        (hits, cb)
    }

    fn engine_with_object() -> (Engine<SimToolkit>, TargetId) {
        let mut sim = SimToolkit::new();
        let obj = sim.create_object();
        (Engine::new(sim), obj)
    }

    // ── Config ───────────────────────────────────────────────────────

    #[test]
    fn config_defaults() {
        let config = EngineConfig::new();
        assert_eq!(config.budget, DispatchBudget::default());
        assert_eq!(config.capacity_limit, None);
        assert!(config.clock.is_none());
    }

    #[test]
    fn config_builder() {
        let config = EngineConfig::new()
            .with_budget(DispatchBudget::new().with_max_actions(5))
            .with_capacity_limit(3);
        assert_eq!(config.budget.max_actions_per_tick, 5);
        assert_eq!(config.capacity_limit, Some(3));
    }

    // ── Registration ─────────────────────────────────────────────────

    #[test]
    fn add_event_cb_attaches_native_listener() {
        let (engine, obj) = engine_with_object();
        let (_, cb) = counter();
        let id = engine.add_event_cb(obj, EventCode(7), cb, None).unwrap();
        assert!(engine.is_registered(id));
        assert_eq!(engine.registration_count(), 1);
        let handle = engine.native_handle(id).unwrap();
        assert!(engine.with_toolkit(|sim| sim.has_listener(handle)));
    }

    #[test]
    fn unknown_target_is_rolled_back() {
        let engine = Engine::new(SimToolkit::new());
        let (_, cb) = counter();
        let err = engine
            .add_event_cb(TargetId(0x42), EventCode::ALL, cb, None)
            .unwrap_err();
        assert!(matches!(
            err,
            RegisterError::Toolkit {
                kind: CallbackKind::Event,
                source: ToolkitError::UnknownTarget(_),
            }
        ));
        assert_eq!(engine.registration_count(), 0);
    }

    #[test]
    fn capacity_limit_is_enforced() {
        let engine = Engine::with_config(
            SimToolkit::new(),
            EngineConfig::new().with_capacity_limit(1),
        );
        let (_, a) = counter();
        let (_, b) = counter();
        engine.timer_create(10, a).unwrap();
        let err = engine.timer_create(10, b).unwrap_err();
        assert!(matches!(
            err,
            RegisterError::Table(TableError::Exhausted { capacity: 1 })
        ));
        assert_eq!(engine.with_toolkit(|sim| sim.timer_count()), 1);
    }

    #[test]
    fn capacity_frees_on_unregister() {
        let engine = Engine::with_config(
            SimToolkit::new(),
            EngineConfig::new().with_capacity_limit(1),
        );
        let (_, a) = counter();
        let (_, b) = counter();
        let first = engine.timer_create(10, a).unwrap();
        assert!(engine.unregister(first));
        assert!(engine.timer_create(10, b).is_ok());
        assert_eq!(engine.registration_count(), 1);
    }

    // ── Unregistration ───────────────────────────────────────────────

    #[test]
    fn unregister_is_idempotent() {
        let (engine, _) = engine_with_object();
        let (_, cb) = counter();
        let id = engine.timer_create(50, cb).unwrap();
        assert!(engine.unregister(id));
        assert!(!engine.unregister(id));
        assert_eq!(engine.with_toolkit(|sim| sim.timer_count()), 0);
    }

    #[test]
    fn kind_specific_removal() {
        let (engine, obj) = engine_with_object();
        let (_, a) = counter();
        let (_, b) = counter();
        let listener = engine.add_event_cb(obj, EventCode::ALL, a, None).unwrap();
        let timer = engine.timer_create(10, b).unwrap();

        assert!(!engine.timer_delete(listener));
        assert!(!engine.remove_event_cb(timer));
        assert!(engine.remove_event_cb(listener));
        assert!(engine.timer_delete(timer));
        assert_eq!(engine.registration_count(), 0);
    }

    #[test]
    fn foreign_ids_are_not_removed() {
        let (a, _) = engine_with_object();
        let b = Engine::new(SimToolkit::new());
        let (_, cb) = counter();
        let id = a.timer_create(10, cb).unwrap();
        assert!(!b.unregister(id));
        assert!(a.is_registered(id));
    }

    // ── Processing ───────────────────────────────────────────────────

    #[test]
    fn event_runs_only_on_process_pending() {
        let (engine, obj) = engine_with_object();
        let (hits, cb) = counter();
        engine.add_event_cb(obj, EventCode(7), cb, None).unwrap();

        assert_eq!(engine.with_toolkit(|sim| sim.emit(obj, EventCode(7))), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(engine.pending_count(), 1);

        let report = engine.process_pending();
        assert_eq!(report.processed, 1);
        assert_eq!(report.stop, StopReason::Empty);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn post_runs_deferred_work() {
        let (engine, _) = engine_with_object();
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        assert!(engine.post(move || {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        engine.process_pending();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_can_use_weak_engine() {
        let (engine, obj) = engine_with_object();
        let weak = engine.downgrade();
        let created = Arc::new(AtomicUsize::new(0));
        let c = created.clone();
        engine
            .add_event_cb(
                obj,
                EventCode::ALL,
                move |_: &Notification| -> Result<(), CallbackError> {
                    let engine = weak
                        .upgrade()
                        .ok_or_else(|| CallbackError::script("engine gone"))?;
                    let c = c.clone();
                    engine
                        .timer_create(100, move |_: &Notification| -> Result<(), CallbackError> {
                            c.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .map_err(|e| CallbackError::script(e.to_string()))?;
                    Ok(())
                },
                None,
            )
            .unwrap();

        engine.with_toolkit(|sim| sim.emit(obj, EventCode(3)));
        let report = engine.process_pending();
        assert_eq!(report.failed, 0);
        assert_eq!(engine.registration_count(), 2);

        engine.with_toolkit(|sim| sim.advance(100));
        engine.process_pending();
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    // ── Teardown ─────────────────────────────────────────────────────

    #[test]
    fn weak_engine_dies_with_engine() {
        let engine = Engine::new(SimToolkit::new());
        let weak = engine.downgrade();
        assert!(weak.upgrade().is_some());
        drop(engine);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn drop_unregisters_from_global_table() {
        let engine = Engine::new(SimToolkit::new());
        let (_, cb) = counter();
        let id = engine.timer_create(10, cb).unwrap();
        assert!(HandleTable::global().contains(id));
        drop(engine);
        assert!(!HandleTable::global().contains(id));
    }
}
