//! The `RunStore` trait: everything the recorder persists.
//!
//! The trait is implemented by storage backends (e.g.
//! `scenariolog-store-sqlite`). The step execution engine depends on this
//! abstraction, not on any concrete backend.

use std::{future::Future, path::Path};

use chrono::{DateTime, Utc};

use crate::{
  artifact::{Artifact, NewArtifact},
  kv::KvTag,
  run::{Completion, NewRun, Run, RunSummary},
  search::{SearchHit, SearchQuery},
  step::{NewStep, Step, StepFailure, StepTiming},
};

/// Abstraction over a scenariolog storage backend.
///
/// Backends are single-writer: implementations serialize mutations
/// themselves, callers never need external locking.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes.
pub trait RunStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Runs ──────────────────────────────────────────────────────────────

  /// Persist a new run. Fails if the run id is already taken.
  fn start_run(
    &self,
    run: NewRun,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Record the completion of a run that was previously started.
  ///
  /// Returns an error (and writes nothing) if the run does not exist.
  fn end_run<'a>(
    &'a self,
    run_id: &'a str,
    exit_code: i32,
    completed_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Completion, Self::Error>> + Send + 'a;

  /// Retrieve a run by id. Returns `None` if not found.
  fn get_run<'a>(
    &'a self,
    run_id: &'a str,
  ) -> impl Future<Output = Result<Option<Run>, Self::Error>> + Send + 'a;

  /// The most recently started run, if any.
  fn latest_run_id(
    &self,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;

  // ── Steps ─────────────────────────────────────────────────────────────

  /// Insert the row for a step that is about to execute.
  fn begin_step(
    &self,
    step: NewStep,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Write the completion fields of a started step.
  fn finish_step<'a>(
    &'a self,
    step_id: &'a str,
    completion: Completion,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn get_step<'a>(
    &'a self,
    step_id: &'a str,
  ) -> impl Future<Output = Result<Option<Step>, Self::Error>> + Send + 'a;

  /// All steps of a run, ordered by step number.
  fn list_steps<'a>(
    &'a self,
    run_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Step>, Self::Error>> + Send + 'a;

  // ── KV tags ───────────────────────────────────────────────────────────

  /// Insert or replace a tag. Tags with an empty value are skipped.
  fn set_kv(
    &self,
    tag: KvTag,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn list_kv<'a>(
    &'a self,
    run_id: &'a str,
  ) -> impl Future<Output = Result<Vec<KvTag>, Self::Error>> + Send + 'a;

  // ── Artifacts ─────────────────────────────────────────────────────────

  /// Record a captured file and return its artifact id.
  fn insert_artifact(
    &self,
    artifact: NewArtifact,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  fn list_artifacts<'a>(
    &'a self,
    run_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Artifact>, Self::Error>> + Send + 'a;

  // ── Full-text search ──────────────────────────────────────────────────

  /// Index the lines of a text artifact read from `path`.
  ///
  /// Returns `Ok(None)` without touching anything when the backend has no
  /// search index (degraded mode), otherwise the number of lines indexed.
  fn index_artifact<'a>(
    &'a self,
    run_id: &'a str,
    artifact_id: i64,
    path: &'a Path,
  ) -> impl Future<Output = Result<Option<usize>, Self::Error>> + Send + 'a;

  /// Search the indexed lines of one run.
  fn search<'a>(
    &'a self,
    query: &'a SearchQuery,
  ) -> impl Future<Output = Result<Vec<SearchHit>, Self::Error>> + Send + 'a;

  // ── Reporting ─────────────────────────────────────────────────────────

  /// Run metadata plus step counts. Returns `None` if the run is unknown.
  fn run_summary<'a>(
    &'a self,
    run_id: &'a str,
  ) -> impl Future<Output = Result<Option<RunSummary>, Self::Error>> + Send + 'a;

  /// Steps that exited non-zero, ordered by step number.
  fn failures<'a>(
    &'a self,
    run_id: &'a str,
  ) -> impl Future<Output = Result<Vec<StepFailure>, Self::Error>> + Send + 'a;

  /// The `top` slowest steps, slowest first.
  fn timings<'a>(
    &'a self,
    run_id: &'a str,
    top: usize,
  ) -> impl Future<Output = Result<Vec<StepTiming>, Self::Error>> + Send + 'a;
}
