//! SQLite access layer for warden.
//!
//! Two databases are involved. The *event store* belongs to the relay
//! process; it is read through a small pool of read-only connections and
//! written only through a short-lived [`MaintenanceHandle`] for deletion,
//! vacuum and integrity checks. The *control store* belongs to warden and
//! holds settings, the deletion request queue and sync jobs.
//!
//! Everything runs on [`tokio_rusqlite`] connection threads so no database
//! work blocks the async runtime.

mod connection;
mod control;
mod deletion;
mod encode;
mod events;
mod export;
mod maintenance;
mod retention;
mod schema;
mod sql;
mod stats;
mod sync_jobs;

pub mod error;

pub use connection::{EventStore, MaintenanceHandle, StoreOptions, Stores};
pub use control::ControlStore;
pub use error::{Error, Result};
pub use maintenance::{CollectSummary, ProcessSummary, RetentionOutcome};
pub use tokio_util::sync::CancellationToken;

#[cfg(test)]
mod tests;
