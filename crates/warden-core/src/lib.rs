//! Core types and trait definitions for the warden relay control plane.
//!
//! This crate is deliberately free of database dependencies. It describes
//! the events read from the relay's store, the filters and retention rules
//! applied to them, and the admin records (deletion requests, sync jobs)
//! kept in the control store.

pub mod deletion;
pub mod error;
pub mod event;
pub mod filter;
pub mod retention;
pub mod settings;
pub mod stats;
pub mod sync_job;

pub use error::{Error, Result};
