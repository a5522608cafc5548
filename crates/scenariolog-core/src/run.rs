//! Runs: one end-to-end scenario execution.
//!
//! A run row is written once at start and completed exactly once. The
//! completion fields (`completed_at`, `exit_code`, `duration_ms`) are either
//! all present or all absent.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, error::require};

// ─── Records ─────────────────────────────────────────────────────────────────

/// Input for [`RunStore::start_run`](crate::store::RunStore::start_run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRun {
  pub run_id:     String,
  /// Directory the scenario runs in; artifact paths are stored relative to it.
  pub root_dir:   PathBuf,
  pub suite:      Option<String>,
  pub started_at: DateTime<Utc>,
}

impl NewRun {
  /// Convenience constructor for a run starting now with a fresh id.
  pub fn starting_now(root_dir: impl Into<PathBuf>) -> Self {
    let started_at = Utc::now();
    Self {
      run_id: crate::id::new_run_id(started_at),
      root_dir: root_dir.into(),
      suite: None,
      started_at,
    }
  }

  pub fn with_suite(mut self, suite: impl Into<String>) -> Self {
    self.suite = Some(suite.into());
    self
  }

  pub fn validate(&self) -> Result<()> {
    require("run_id", &self.run_id)?;
    require("root_dir", &self.root_dir.to_string_lossy())
  }

  /// The suite label, treating an empty string as absent.
  pub fn suite(&self) -> Option<&str> { self.suite.as_deref().filter(|s| !s.is_empty()) }
}

/// How a finished run (or step) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
  pub completed_at: DateTime<Utc>,
  pub exit_code:    i32,
  pub duration_ms:  i64,
}

impl Completion {
  /// Build a completion, clamping negative durations (clock skew) to zero.
  pub fn between(
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    exit_code: i32,
  ) -> Self {
    let duration_ms = (completed_at - started_at).num_milliseconds().max(0);
    Self { completed_at, exit_code, duration_ms }
  }
}

/// A persisted run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
  pub run_id:     String,
  pub root_dir:   PathBuf,
  pub suite:      Option<String>,
  pub started_at: DateTime<Utc>,
  /// `None` until the run is ended.
  pub completion: Option<Completion>,
}

// ─── Reporting ───────────────────────────────────────────────────────────────

/// High-level run metadata plus step counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
  pub run:              Run,
  pub total_steps:      u64,
  /// Steps that finished with a non-zero exit code.
  pub failed_steps:     u64,
  pub full_text_search: bool,
}
