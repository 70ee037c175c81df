//! SQLite backend for the ReleaseDesk control plane.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.

mod catalog;
mod encode;
mod fleet;
mod license;
mod rollout;
mod schema;
mod store;

pub mod audit;
pub mod error;

pub use audit::SqliteAuditSink;
pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
