//! Inputs and outputs of a single step execution.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// What to run for one step, and where to put its output.
#[derive(Debug, Clone)]
pub struct ExecStepSpec {
  pub run_id:      String,
  /// Root of the scenario; artifact paths are stored relative to it.
  pub root_dir:    PathBuf,
  /// Working directory of the command. Defaults to `root_dir`.
  pub work_dir:    Option<PathBuf>,
  /// Where `step-NN-stdout.txt` / `step-NN-stderr.txt` are written. A
  /// relative path is resolved against `root_dir`. Must already exist.
  pub log_dir:     PathBuf,
  pub step_num:    u32,
  pub step_name:   String,
  pub script_path: Option<String>,
  /// Program followed by its arguments.
  pub argv:        Vec<String>,
}

impl ExecStepSpec {
  /// A step writing its logs directly into `root_dir`.
  pub fn new(
    run_id: impl Into<String>,
    root_dir: impl Into<PathBuf>,
    step_num: u32,
    step_name: impl Into<String>,
    argv: impl IntoIterator<Item = impl Into<String>>,
  ) -> Self {
    Self {
      run_id: run_id.into(),
      root_dir: root_dir.into(),
      work_dir: None,
      log_dir: PathBuf::from("."),
      step_num,
      step_name: step_name.into(),
      script_path: None,
      argv: argv.into_iter().map(Into::into).collect(),
    }
  }

  pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
    self.log_dir = log_dir.into();
    self
  }

  pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
    self.work_dir = Some(work_dir.into());
    self
  }

  pub fn with_script_path(mut self, script_path: impl Into<String>) -> Self {
    self.script_path = Some(script_path.into());
    self
  }

  pub(crate) fn validate(&self) -> Result<()> {
    if self.run_id.is_empty() {
      return Err(Error::InvalidSpec("run_id is required".into()));
    }
    if self.step_name.is_empty() {
      return Err(Error::InvalidSpec("step_name is required".into()));
    }
    match self.argv.first() {
      Some(program) if !program.is_empty() => Ok(()),
      _ => Err(Error::InvalidSpec("argv must name a program".into())),
    }
  }

  /// The directory the command runs in, if any was configured.
  pub(crate) fn working_dir(&self) -> Option<&Path> {
    self
      .work_dir
      .as_deref()
      .filter(|d| !d.as_os_str().is_empty())
      .or_else(|| Some(self.root_dir.as_path()).filter(|d| !d.as_os_str().is_empty()))
  }
}

/// What a finished step produced.
#[derive(Debug, Clone)]
pub struct ExecStepResult {
  pub step_id:            String,
  /// The process exit code, or [`FAILED_EXIT_CODE`](crate::FAILED_EXIT_CODE)
  /// when it was killed, cancelled or could not be waited on.
  pub exit_code:          i32,
  pub duration_ms:        i64,
  pub cancelled:          bool,
  /// Stored artifact paths (root-relative when possible).
  pub stdout_path:        String,
  pub stderr_path:        String,
  pub stdout_sha256:      String,
  pub stderr_sha256:      String,
  pub stdout_artifact_id: i64,
  pub stderr_artifact_id: i64,
}
