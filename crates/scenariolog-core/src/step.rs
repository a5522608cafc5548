//! Steps: one subprocess invocation within a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, error::require, run::Completion};

/// Input for [`RunStore::begin_step`](crate::store::RunStore::begin_step).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStep {
  pub step_id:     String,
  pub run_id:      String,
  pub step_num:    u32,
  pub step_name:   String,
  pub script_path: Option<String>,
  pub started_at:  DateTime<Utc>,
}

impl NewStep {
  /// A step of `run_id` starting now, with its deterministic id.
  pub fn new(run_id: &str, step_num: u32, step_name: impl Into<String>) -> Self {
    Self {
      step_id: crate::id::step_id(run_id, step_num),
      run_id: run_id.to_owned(),
      step_num,
      step_name: step_name.into(),
      script_path: None,
      started_at: Utc::now(),
    }
  }

  pub fn validate(&self) -> Result<()> {
    require("step_id", &self.step_id)?;
    require("run_id", &self.run_id)?;
    require("step_name", &self.step_name)
  }
}

/// A persisted step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
  pub step_id:     String,
  pub run_id:      String,
  pub step_num:    u32,
  pub step_name:   String,
  pub script_path: Option<String>,
  pub started_at:  DateTime<Utc>,
  pub completion:  Option<Completion>,
}

/// A step that exited non-zero, with where to look for its stderr.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepFailure {
  pub step_num:    u32,
  pub step_name:   String,
  pub exit_code:   i32,
  pub duration_ms: Option<i64>,
  pub stderr_path: Option<String>,
}

/// One row of the slowest-steps report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTiming {
  pub step_num:    u32,
  pub step_name:   String,
  pub duration_ms: Option<i64>,
  pub exit_code:   Option<i32>,
}
