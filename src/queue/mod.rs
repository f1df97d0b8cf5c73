//! Notification queue: pending actions and the MPSC queue that carries them.

pub mod action;
pub mod notification;

pub use action::{ActionContext, ActionKind, DeferredWork, PendingAction};
pub use notification::{NotificationQueue, NotificationSender};
