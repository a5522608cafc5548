//! Artifacts: captured files with size and content hash.
//!
//! An artifact row is created once per captured file and never changes. The
//! tuple `(run, step, command, kind, path)` is unique; recording the same
//! file twice is a constraint violation rather than an overwrite.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Result, error::require};

/// What a captured file holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
  Stdout,
  Stderr,
  Other(String),
}

impl ArtifactKind {
  pub fn as_str(&self) -> &str {
    match self {
      Self::Stdout => "stdout",
      Self::Stderr => "stderr",
      Self::Other(s) => s,
    }
  }
}

impl From<&str> for ArtifactKind {
  fn from(s: &str) -> Self {
    match s {
      "stdout" => Self::Stdout,
      "stderr" => Self::Stderr,
      other => Self::Other(other.to_owned()),
    }
  }
}

impl fmt::Display for ArtifactKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Input for [`RunStore::insert_artifact`](crate::store::RunStore::insert_artifact).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewArtifact {
  pub run_id:     String,
  pub step_id:    String,
  pub command_id: Option<String>,
  pub kind:       ArtifactKind,
  /// Relative to the run's root directory when the file lives under it,
  /// absolute otherwise.
  pub path:       String,
  pub is_text:    bool,
  pub size_bytes: u64,
  /// Hex-encoded SHA-256 of the file contents, if known.
  pub sha256:     Option<String>,
}

impl NewArtifact {
  /// Reject records missing any of run id, step id, kind or path.
  pub fn validate(&self) -> Result<()> {
    require("run_id", &self.run_id)?;
    require("step_id", &self.step_id)?;
    require("kind", self.kind.as_str())?;
    require("path", &self.path)
  }
}

/// A persisted artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
  pub artifact_id: i64,
  pub run_id:      String,
  pub step_id:     Option<String>,
  pub command_id:  Option<String>,
  pub kind:        ArtifactKind,
  pub path:        String,
  pub is_text:     bool,
  pub size_bytes:  Option<u64>,
  pub sha256:      Option<String>,
}
