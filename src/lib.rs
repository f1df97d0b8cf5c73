//! # vdu-bridge
//!
//! Deferred native-callback dispatch for scripting retained-mode embedded-display
//! UI toolkits (LVGL-style objects, event listeners and timers).
//!
//! The toolkit invokes native trampolines from inside its own input/render pass,
//! where running script or application code is unsafe. This crate captures each
//! notification as a self-contained [`PendingAction`](queue::PendingAction),
//! queues it, and runs it later from the application loop under a per-frame
//! budget.
//!
//! ## Core Systems
//!
//! - **[`handle`]**: Generational handle table mapping opaque registration ids to callback records
//! - **[`queue`]**: Multiple-producer, single-consumer FIFO of pending actions
//! - **[`trampoline`]**: `extern "C"` entry points the toolkit calls directly
//! - **[`dispatch`]**: Per-frame drain with action/time budgets and a reentrancy guard
//! - **[`engine`]**: Script-facing facade: event callbacks, timers, deferred work
//! - **[`toolkit`]**: The native toolkit boundary: trait, C-ABI structs, handles
//! - **[`callback`]**: Callback trait and the notification records callbacks receive
//! - **[`testing`]**: Headless simulated toolkit for driving the engine in tests

// Boundary types
pub mod callback;
pub mod toolkit;

// Core systems
pub mod dispatch;
pub mod handle;
pub mod queue;
pub mod trampoline;

// Facade
pub mod engine;

// Headless support
pub mod testing;

pub use callback::{Callback, CallbackError, EventRecord, Notification, UserPayload};
pub use dispatch::{DispatchBudget, DrainReport, FrameDispatcher, StopReason};
pub use engine::{Engine, EngineConfig, RegisterError};
pub use handle::{CallbackKind, HandleTable, RegistrationId};
pub use toolkit::{EventCode, NativeHandle, TargetId, Toolkit, ToolkitError};
