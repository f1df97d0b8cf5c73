//! The handle table: a generational arena of callback records.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use slotmap::SlotMap;

use super::record::{CallbackRecord, RegistrationId};
use crate::toolkit::NativeHandle;

/// Most live slots the underlying arena can address.
const ARENA_LIMIT: usize = (u32::MAX - 1) as usize;

/// The table consulted by the `extern "C"` trampolines.
static GLOBAL: Lazy<HandleTable> = Lazy::new(HandleTable::new);

/// Errors from table registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("handle table exhausted: {capacity} live registrations")]
    Exhausted { capacity: usize },
}

/// Maps registration ids to callback records.
///
/// Records are stored behind `Arc` so a lookup is a read lock plus a refcount
/// increment, which is all a trampoline does inside the toolkit's call frame.
/// `register` and `unregister` take the write lock. The frame dispatcher never
/// touches the table.
pub struct HandleTable {
    records: RwLock<SlotMap<RegistrationId, Arc<CallbackRecord>>>,
}

impl HandleTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(SlotMap::with_key()),
        }
    }

    /// The process-wide table used by the trampolines.
    pub fn global() -> &'static HandleTable {
        &GLOBAL
    }

    /// Store a record and return its new id. Fails only when the arena is full.
    pub fn register(&self, record: CallbackRecord) -> Result<RegistrationId, TableError> {
        let mut records = self.records.write();
        if records.len() >= ARENA_LIMIT {
            return Err(TableError::Exhausted {
                capacity: ARENA_LIMIT,
            });
        }
        Ok(records.insert(Arc::new(record)))
    }

    /// Look up a live record.
    pub fn resolve(&self, id: RegistrationId) -> Option<Arc<CallbackRecord>> {
        self.records.read().get(id).cloned()
    }

    /// Bind the toolkit-side handle of a record. `false` if the id is gone or
    /// a handle was already bound.
    pub fn bind_native(&self, id: RegistrationId, handle: NativeHandle) -> bool {
        match self.resolve(id) {
            Some(record) => record.bind_native(handle),
            None => false,
        }
    }

    /// Remove a record, releasing its native side first.
    ///
    /// `release` runs at most once per record, before removal and with no table
    /// lock held. Unknown or already-removed ids are a no-op returning `false`.
    pub fn unregister(&self, id: RegistrationId, release: impl FnOnce(&CallbackRecord)) -> bool {
        let Some(record) = self.resolve(id) else {
            return false;
        };
        if record.claim_release() {
            release(&*record);
        }
        self.records.write().remove(id).is_some()
    }

    /// Whether `id` is live.
    pub fn contains(&self, id: RegistrationId) -> bool {
        self.records.read().contains_key(id)
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{CallbackError, Notification, SharedCallback};
    use crate::handle::CallbackKind;
    use crate::queue::NotificationQueue;
    use crate::toolkit::{EventCode, TargetId};
    use std::cell::Cell;

    fn noop() -> SharedCallback {
        Arc::new(|_: &Notification| -> Result<(), CallbackError> { Ok(()) })
    }

    fn timer_record(queue: &NotificationQueue) -> CallbackRecord {
        CallbackRecord::timer(noop(), queue.sender())
    }

    // ── Register / resolve ───────────────────────────────────────────

    #[test]
    fn new_table_is_empty() {
        let table = HandleTable::new();
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn register_then_resolve() {
        let queue = NotificationQueue::new();
        let table = HandleTable::new();
        let rec = CallbackRecord::event(TargetId(0x10), EventCode(4), noop(), None, queue.sender());
        let id = table.register(rec).unwrap();
        let resolved = table.resolve(id).unwrap();
        assert_eq!(resolved.kind(), CallbackKind::Event);
        assert_eq!(resolved.target(), Some(TargetId(0x10)));
        assert!(table.contains(id));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn ids_are_distinct() {
        let queue = NotificationQueue::new();
        let table = HandleTable::new();
        let a = table.register(timer_record(&queue)).unwrap();
        let b = table.register(timer_record(&queue)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn exhausted_error_message() {
        let err = TableError::Exhausted { capacity: 4 };
        assert_eq!(err.to_string(), "handle table exhausted: 4 live registrations");
    }

    // ── Unregister ───────────────────────────────────────────────────

    #[test]
    fn unregister_releases_before_removal() {
        let queue = NotificationQueue::new();
        let table = HandleTable::new();
        let id = table.register(timer_record(&queue)).unwrap();
        let was_live = Cell::new(false);
        assert!(table.unregister(id, |_| was_live.set(table.contains(id))));
        assert!(was_live.get());
        assert!(!table.contains(id));
    }

    #[test]
    fn unregister_twice_is_noop() {
        let queue = NotificationQueue::new();
        let table = HandleTable::new();
        let id = table.register(timer_record(&queue)).unwrap();
        let releases = Cell::new(0);
        assert!(table.unregister(id, |_| releases.set(releases.get() + 1)));
        assert!(!table.unregister(id, |_| releases.set(releases.get() + 1)));
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn stale_id_does_not_resolve_after_slot_reuse() {
        let queue = NotificationQueue::new();
        let table = HandleTable::new();
        let old = table.register(timer_record(&queue)).unwrap();
        table.unregister(old, |_| {});
        let new = table.register(timer_record(&queue)).unwrap();
        assert!(table.resolve(old).is_none());
        assert!(table.resolve(new).is_some());
        // Removing the stale id must not touch the new record.
        assert!(!table.unregister(old, |_| {}));
        assert!(table.contains(new));
    }

    #[test]
    fn bind_native_through_table() {
        let queue = NotificationQueue::new();
        let table = HandleTable::new();
        let id = table.register(timer_record(&queue)).unwrap();
        assert!(table.bind_native(id, NativeHandle(9)));
        assert_eq!(table.resolve(id).unwrap().native(), Some(NativeHandle(9)));
        table.unregister(id, |_| {});
        assert!(!table.bind_native(id, NativeHandle(10)));
    }

    #[test]
    fn global_table_is_shared() {
        let a = HandleTable::global() as *const HandleTable;
        let b = HandleTable::global() as *const HandleTable;
        assert_eq!(a, b);
    }
}
