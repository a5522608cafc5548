//! Error types for `scenariolog-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A required field was empty or otherwise unusable.
  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Fail with [`Error::InvalidArgument`] when `value` is empty.
pub(crate) fn require(field: &str, value: &str) -> Result<()> {
  if value.is_empty() {
    return Err(Error::InvalidArgument(format!("{field} is required")));
  }
  Ok(())
}
