//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 UTC strings with a fixed nine-digit fraction, so
//! lexical order in SQL matches chronological order.

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use scenariolog_core::{
  artifact::{Artifact, ArtifactKind},
  kv::{KvScope, KvTag},
  run::{Completion, Run},
  step::Step,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Nanos, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Completion ──────────────────────────────────────────────────────────────

/// Completion columns are written together; treat any missing one as "not
/// completed".
fn decode_completion(
  completed_at: Option<String>,
  exit_code: Option<i32>,
  duration_ms: Option<i64>,
) -> Result<Option<Completion>> {
  match (completed_at, exit_code, duration_ms) {
    (Some(at), Some(exit_code), Some(duration_ms)) => Ok(Some(Completion {
      completed_at: decode_dt(&at)?,
      exit_code,
      duration_ms,
    })),
    _ => Ok(None),
  }
}

// ─── Raw rows ────────────────────────────────────────────────────────────────

/// A `scenario_runs` row as read from SQLite.
pub struct RawRun {
  pub run_id:       String,
  pub root_dir:     String,
  pub suite:        Option<String>,
  pub started_at:   String,
  pub completed_at: Option<String>,
  pub exit_code:    Option<i32>,
  pub duration_ms:  Option<i64>,
}

impl RawRun {
  pub const COLUMNS: &'static str =
    "run_id, root_dir, suite, started_at, completed_at, exit_code, duration_ms";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      run_id:       row.get(0)?,
      root_dir:     row.get(1)?,
      suite:        row.get(2)?,
      started_at:   row.get(3)?,
      completed_at: row.get(4)?,
      exit_code:    row.get(5)?,
      duration_ms:  row.get(6)?,
    })
  }

  pub fn into_run(self) -> Result<Run> {
    Ok(Run {
      run_id:     self.run_id,
      root_dir:   PathBuf::from(self.root_dir),
      suite:      self.suite,
      started_at: decode_dt(&self.started_at)?,
      completion: decode_completion(self.completed_at, self.exit_code, self.duration_ms)?,
    })
  }
}

/// A `steps` row as read from SQLite.
pub struct RawStep {
  pub step_id:      String,
  pub run_id:       String,
  pub step_num:     u32,
  pub step_name:    String,
  pub script_path:  Option<String>,
  pub started_at:   String,
  pub completed_at: Option<String>,
  pub exit_code:    Option<i32>,
  pub duration_ms:  Option<i64>,
}

impl RawStep {
  pub const COLUMNS: &'static str = "step_id, run_id, step_num, step_name, script_path, \
                                     started_at, completed_at, exit_code, duration_ms";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      step_id:      row.get(0)?,
      run_id:       row.get(1)?,
      step_num:     row.get(2)?,
      step_name:    row.get(3)?,
      script_path:  row.get(4)?,
      started_at:   row.get(5)?,
      completed_at: row.get(6)?,
      exit_code:    row.get(7)?,
      duration_ms:  row.get(8)?,
    })
  }

  pub fn into_step(self) -> Result<Step> {
    Ok(Step {
      step_id:     self.step_id,
      run_id:      self.run_id,
      step_num:    self.step_num,
      step_name:   self.step_name,
      script_path: self.script_path,
      started_at:  decode_dt(&self.started_at)?,
      completion:  decode_completion(self.completed_at, self.exit_code, self.duration_ms)?,
    })
  }
}

pub const ARTIFACT_COLUMNS: &str =
  "artifact_id, run_id, step_id, command_id, kind, path, is_text, size_bytes, sha256";

pub fn artifact_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Artifact> {
  let kind: String = row.get(4)?;
  let size_bytes: Option<i64> = row.get(7)?;
  Ok(Artifact {
    artifact_id: row.get(0)?,
    run_id:      row.get(1)?,
    step_id:     row.get(2)?,
    command_id:  row.get(3)?,
    kind:        ArtifactKind::from(kind.as_str()),
    path:        row.get(5)?,
    is_text:     row.get(6)?,
    size_bytes:  size_bytes.map(|n| n.max(0) as u64),
    sha256:      row.get(8)?,
  })
}

pub fn kv_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<KvTag> {
  let step_id: Option<String> = row.get(1)?;
  let command_id: Option<String> = row.get(2)?;
  let scope = match (step_id, command_id) {
    (Some(step_id), Some(command_id)) => KvScope::Command { step_id, command_id },
    (Some(step_id), None) => KvScope::Step { step_id },
    _ => KvScope::Run,
  };
  Ok(KvTag { run_id: row.get(0)?, scope, key: row.get(3)?, value: row.get(4)? })
}

// ─── Paths ───────────────────────────────────────────────────────────────────

pub fn encode_path(path: &std::path::Path) -> String { path.to_string_lossy().into_owned() }
