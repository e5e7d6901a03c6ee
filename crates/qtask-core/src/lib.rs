//! # qtask-core
//!
//! Domain types shared by every component of the quantum task queue:
//!
//! - [`Task`] and [`StatusHistoryEntry`] — the persisted shapes.
//! - [`TaskStatus`] — the lifecycle state machine (§4.3 of the design).
//! - [`Counts`] — the measurement-result map produced by a completed task.
//! - [`error`] — the shared error taxonomy (`ValidationError`, `ErrorCategory`).
//! - [`config`] — environment-driven configuration for every binary.
//!
//! This crate has no I/O of its own; it's pure data and rules, so that the
//! store, broker, simulator, coordinator, HTTP, and worker crates can all
//! depend on it without pulling in each other's concerns.

pub mod config;
pub mod error;
pub mod task;
pub mod validation;

pub use error::{ErrorCategory, ValidationError};
pub use task::{Counts, StatusHistoryEntry, Task, TaskStatus};
