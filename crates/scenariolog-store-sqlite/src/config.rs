//! Store configuration.
//!
//! Loaded from an optional TOML file layered under `SCENARIOLOG_*`
//! environment variables, e.g. `SCENARIOLOG_BUSY_TIMEOUT_MS=10000`.

use std::path::Path;

use serde::Deserialize;

use crate::Result;

/// Runtime settings for [`SqliteStore`](crate::SqliteStore).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  /// How long a statement waits on a locked database before failing.
  pub busy_timeout_ms:  u64,
  /// Provision the FTS5 log index during migration when SQLite supports it.
  pub full_text_search: bool,
}

impl Default for StoreConfig {
  fn default() -> Self { Self { busy_timeout_ms: 5_000, full_text_search: true } }
}

impl StoreConfig {
  /// Load settings from `file` (if given and present) and the environment.
  pub fn load(file: Option<&Path>) -> Result<Self> {
    let mut builder = config::Config::builder();
    if let Some(path) = file {
      builder = builder.add_source(config::File::from(path).required(false));
    }
    let settings = builder
      .add_source(config::Environment::with_prefix("SCENARIOLOG"))
      .build()?;
    Ok(settings.try_deserialize()?)
  }

  /// Settings for a store that never provisions the search index.
  pub fn without_search() -> Self { Self { full_text_search: false, ..Self::default() } }
}
