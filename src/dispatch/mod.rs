//! Frame dispatch: bounded per-tick draining of pending actions.
//!
//! - [`FrameDispatcher`]: the drain loop with its reentrancy guard.
//! - [`DispatchBudget`] / [`SharedBudget`]: per-tick limits.
//! - [`Clock`]: time source for budgets and queueing latency.

pub mod budget;
pub mod clock;
pub mod frame;

pub use budget::{DispatchBudget, SharedBudget};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use frame::{BacklogObserver, BacklogSignal, DispatchStats, DrainReport, FrameDispatcher, StopReason};
