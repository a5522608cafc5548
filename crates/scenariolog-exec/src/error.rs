//! Error type for `scenariolog-exec`.

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can stop a step from being recorded.
///
/// A non-zero exit is not an error; it is reported in
/// [`ExecStepResult::exit_code`](crate::ExecStepResult::exit_code).
#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid step spec: {0}")]
  InvalidSpec(String),

  #[error("cannot resolve log path: {0}")]
  LogPath(String),

  #[error("{context} ({path:?}): {source}")]
  Io {
    context: &'static str,
    path:    PathBuf,
    #[source]
    source:  std::io::Error,
  },

  #[error("failed to spawn {program:?}: {source}")]
  Spawn {
    program: String,
    #[source]
    source:  std::io::Error,
  },

  #[error("failed to capture {stream}: {source}")]
  Copy {
    stream: &'static str,
    #[source]
    source: std::io::Error,
  },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
