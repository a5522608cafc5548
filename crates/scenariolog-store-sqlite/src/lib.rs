//! SQLite backend for the scenariolog flight recorder.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on one dedicated
//! thread without blocking the async runtime. That single connection is also
//! what makes the store single-writer.

mod encode;
mod fts;
mod migrate;
mod schema;
mod store;

pub mod config;
pub mod error;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use schema::SCHEMA_VERSION;
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
