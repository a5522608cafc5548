//! Core types and trait definitions for the scenariolog flight recorder.
//!
//! This crate is deliberately free of database and process dependencies.
//! The SQLite backend and the step execution engine both depend on it.

pub mod artifact;
pub mod error;
pub mod id;
pub mod kv;
pub mod run;
pub mod search;
pub mod step;
pub mod store;

pub use error::{Error, Result};
