//! Durable job state store: the Job Orchestrator's single source of truth.
//!
//! Backed by a single SQLite database file (`state.db` under the
//! configured data root). Status transitions, progress
//! monotonicity, and delete eligibility are enforced here rather than
//! trusted to callers, so every crate that talks to the store inherits
//! the same invariants.

pub mod client;
pub mod error;
pub mod repos;

pub use client::{connect, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use repos::JobStore;
