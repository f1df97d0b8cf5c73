//! Headless testing support.
//!
//! Use [`SimToolkit`] to drive an [`Engine`](crate::engine::Engine) without a
//! display: create objects, emit events and advance virtual time, then call
//! `process_pending` as the application loop would.

pub mod sim;

pub use sim::SimToolkit;
