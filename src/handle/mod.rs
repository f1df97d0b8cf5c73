//! Handle table: generational registration ids mapped to immutable callback records.

pub mod record;
pub mod table;

pub use record::{CallbackKind, CallbackRecord, RegistrationId};
pub use table::{HandleTable, TableError};
