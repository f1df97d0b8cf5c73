//! Per-tick dispatch budget and its shared, updatable handle.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

// ---------------------------------------------------------------------------
// DispatchBudget
// ---------------------------------------------------------------------------

/// Limits applied to a single drain.
///
/// The action cap and the wall-clock cap are both enforced; whichever is hit
/// first ends the tick. The backlog threshold only controls when a warning is
/// emitted and never changes what runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchBudget {
    /// Most actions executed per tick. Zero pauses draining.
    pub max_actions_per_tick: usize,
    /// Time after which a tick stops taking new actions.
    pub max_wall_clock_per_tick: Duration,
    /// Queue length above which a backlog signal is emitted at the end of a tick.
    pub backlog_warning_threshold: usize,
}

impl Default for DispatchBudget {
    fn default() -> Self {
        Self {
            max_actions_per_tick: 50,
            max_wall_clock_per_tick: Duration::from_millis(10),
            backlog_warning_threshold: 200,
        }
    }
}

impl DispatchBudget {
    /// Create a budget with the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-tick action cap (builder).
    pub fn with_max_actions(mut self, max: usize) -> Self {
        self.max_actions_per_tick = max;
        self
    }

    /// Set the per-tick wall-clock cap (builder).
    pub fn with_max_wall_clock(mut self, max: Duration) -> Self {
        self.max_wall_clock_per_tick = max;
        self
    }

    /// Set the backlog warning threshold (builder).
    pub fn with_backlog_threshold(mut self, threshold: usize) -> Self {
        self.backlog_warning_threshold = threshold;
        self
    }
}

// ---------------------------------------------------------------------------
// SharedBudget
// ---------------------------------------------------------------------------

/// Shared handle to the live budget. The dispatcher copies it at the start of
/// every tick; the application may replace it at any time.
#[derive(Debug, Clone, Default)]
pub struct SharedBudget {
    inner: Arc<RwLock<DispatchBudget>>,
}

impl SharedBudget {
    pub fn new(budget: DispatchBudget) -> Self {
        Self {
            inner: Arc::new(RwLock::new(budget)),
        }
    }

    /// Copy of the current budget.
    pub fn get(&self) -> DispatchBudget {
        *self.inner.read()
    }

    /// Replace the budget. Takes effect from the next tick.
    pub fn set(&self, budget: DispatchBudget) {
        *self.inner.write() = budget;
    }

    /// Modify the budget in place.
    pub fn update(&self, f: impl FnOnce(&mut DispatchBudget)) {
        f(&mut *self.inner.write());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let b = DispatchBudget::new();
        assert_eq!(b.max_actions_per_tick, 50);
        assert_eq!(b.max_wall_clock_per_tick, Duration::from_millis(10));
        assert_eq!(b.backlog_warning_threshold, 200);
    }

    #[test]
    fn builder() {
        let b = DispatchBudget::new()
            .with_max_actions(5)
            .with_max_wall_clock(Duration::from_millis(2))
            .with_backlog_threshold(20);
        assert_eq!(b.max_actions_per_tick, 5);
        assert_eq!(b.max_wall_clock_per_tick, Duration::from_millis(2));
        assert_eq!(b.backlog_warning_threshold, 20);
    }

    #[test]
    fn shared_budget_updates_are_visible_to_clones() {
        let shared = SharedBudget::new(DispatchBudget::new());
        let clone = shared.clone();
        shared.update(|b| b.max_actions_per_tick = 3);
        assert_eq!(clone.get().max_actions_per_tick, 3);
        clone.set(DispatchBudget::new().with_backlog_threshold(1));
        assert_eq!(shared.get().backlog_warning_threshold, 1);
    }
}
