//! Error type for `scenariolog-store-sqlite`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] scenariolog_core::Error),

  /// Any failed statement, including constraint violations such as a
  /// duplicate run id or a re-captured artifact.
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("failed to apply PRAGMA {pragma}: {source}")]
  Pragma {
    pragma: &'static str,
    #[source]
    source: tokio_rusqlite::Error,
  },

  #[error("unsupported schema version: {0}")]
  UnsupportedSchemaVersion(i64),

  #[error("run not found: {0}")]
  RunNotFound(String),

  /// The full-text search table has not been provisioned in this database.
  #[error("full-text search not available (log_lines_fts missing)")]
  SearchUnavailable,

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("i/o error on {path:?}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("configuration error: {0}")]
  Config(#[from] config::ConfigError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
