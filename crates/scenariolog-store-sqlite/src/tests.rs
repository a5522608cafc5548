//! Integration tests for `SqliteStore`.

use std::{io::Write as _, path::PathBuf};

use chrono::{DateTime, Duration, TimeZone, Utc};
use scenariolog_core::{
  artifact::{ArtifactKind, NewArtifact},
  kv::{KvScope, KvTag},
  run::{Completion, NewRun},
  search::SearchQuery,
  step::NewStep,
  store::RunStore,
};

use crate::{Error, SCHEMA_VERSION, SqliteStore, StoreConfig};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 12, 13, 22, 0, 0).unwrap() }

fn new_run(run_id: &str) -> NewRun {
  NewRun {
    run_id:     run_id.into(),
    root_dir:   PathBuf::from("/tmp/scenario"),
    suite:      None,
    started_at: t0(),
  }
}

async fn run_with_step(s: &SqliteStore, run_id: &str, step_num: u32) -> String {
  s.start_run(new_run(run_id)).await.unwrap();
  add_step(s, run_id, step_num).await
}

async fn add_step(s: &SqliteStore, run_id: &str, step_num: u32) -> String {
  let mut step = NewStep::new(run_id, step_num, format!("step {step_num}"));
  step.started_at = t0();
  let step_id = step.step_id.clone();
  s.begin_step(step).await.unwrap();
  step_id
}

fn stdout_artifact(run_id: &str, step_id: &str, path: &str) -> NewArtifact {
  NewArtifact {
    run_id:     run_id.into(),
    step_id:    step_id.into(),
    command_id: None,
    kind:       ArtifactKind::Stdout,
    path:       path.into(),
    is_text:    true,
    size_bytes: 12,
    sha256:     Some("ab".repeat(32)),
  }
}

fn finish_after(ms: i64, exit_code: i32) -> Completion {
  Completion::between(t0(), t0() + Duration::milliseconds(ms), exit_code)
}

// ─── Migration ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn migrate_is_idempotent() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("scenariolog.sqlite");

  let s = SqliteStore::open(&path).await.unwrap();
  assert_eq!(s.schema_version().await.unwrap(), SCHEMA_VERSION);
  s.migrate().await.unwrap();
  s.migrate().await.unwrap();
  assert_eq!(s.schema_version().await.unwrap(), SCHEMA_VERSION);
  drop(s);

  // Reopening an existing file migrates again without error.
  let s = SqliteStore::open(&path).await.unwrap();
  assert_eq!(s.schema_version().await.unwrap(), SCHEMA_VERSION);
  assert!(s.search_available().await.unwrap());
}

#[tokio::test]
async fn oversized_busy_timeout_is_clamped() {
  let dir = tempfile::tempdir().unwrap();
  let config = StoreConfig { busy_timeout_ms: u64::MAX, ..StoreConfig::default() };
  let s = SqliteStore::open_with(dir.path().join("db.sqlite"), &config)
    .await
    .unwrap();

  let timeout: i64 = s
    .conn
    .call(|conn| Ok(conn.query_row("PRAGMA busy_timeout", [], |row| row.get(0))?))
    .await
    .unwrap();
  assert_eq!(timeout, i64::from(i32::MAX));
}

#[tokio::test]
async fn newer_schema_version_is_rejected() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("future.sqlite");
  {
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.pragma_update(None, "user_version", 2).unwrap();
  }

  let err = SqliteStore::open(&path).await.err().expect("open should fail");
  assert!(matches!(err, Error::UnsupportedSchemaVersion(2)), "got {err:?}");
}

// ─── Runs ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn run_lifecycle_records_completion() {
  let s = store().await;
  s.start_run(new_run("r1")).await.unwrap();

  let run = s.get_run("r1").await.unwrap().unwrap();
  assert_eq!(run.root_dir, PathBuf::from("/tmp/scenario"));
  assert_eq!(run.started_at, t0());
  assert!(run.completion.is_none());

  let done = s
    .end_run("r1", 7, t0() + Duration::milliseconds(1_500))
    .await
    .unwrap();
  assert_eq!(done.duration_ms, 1_500);

  let run = s.get_run("r1").await.unwrap().unwrap();
  let completion = run.completion.unwrap();
  assert_eq!(completion.exit_code, 7);
  assert_eq!(completion.duration_ms, 1_500);
  assert_eq!(completion.completed_at, t0() + Duration::milliseconds(1_500));
}

#[tokio::test]
async fn end_run_before_start_clamps_duration() {
  let s = store().await;
  s.start_run(new_run("r1")).await.unwrap();

  let done = s.end_run("r1", 0, t0() - Duration::seconds(3)).await.unwrap();
  assert_eq!(done.duration_ms, 0);
}

#[tokio::test]
async fn duplicate_run_id_is_rejected() {
  let s = store().await;
  s.start_run(new_run("r1")).await.unwrap();

  let err = s.start_run(new_run("r1")).await.unwrap_err();
  assert!(matches!(err, Error::Database(_)), "got {err:?}");
}

#[tokio::test]
async fn start_run_requires_ids() {
  let s = store().await;
  let err = s.start_run(new_run("")).await.unwrap_err();
  assert!(matches!(err, Error::Core(_)), "got {err:?}");
}

#[tokio::test]
async fn ending_unknown_run_fails_without_writing() {
  let s = store().await;

  let err = s.end_run("missing", 0, t0()).await.unwrap_err();
  assert!(matches!(err, Error::RunNotFound(ref id) if id == "missing"), "got {err:?}");
  assert!(s.get_run("missing").await.unwrap().is_none());
  assert!(s.latest_run_id().await.unwrap().is_none());
}

#[tokio::test]
async fn suite_is_stored_and_tagged() {
  let s = store().await;
  s.start_run(new_run("r1").with_suite("smoke")).await.unwrap();

  let run = s.get_run("r1").await.unwrap().unwrap();
  assert_eq!(run.suite.as_deref(), Some("smoke"));

  let tags = s.list_kv("r1").await.unwrap();
  assert_eq!(tags, vec![KvTag::new("r1", KvScope::Run, "suite", "smoke")]);
}

#[tokio::test]
async fn latest_run_id_follows_start_time() {
  let s = store().await;
  s.start_run(new_run("older")).await.unwrap();
  let mut newer = new_run("newer");
  newer.started_at = t0() + Duration::seconds(1);
  s.start_run(newer).await.unwrap();

  assert_eq!(s.latest_run_id().await.unwrap().as_deref(), Some("newer"));
}

// ─── Steps ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn step_lifecycle() {
  let s = store().await;
  let step_id = run_with_step(&s, "r1", 1).await;
  assert_eq!(step_id, "r1-step-01");

  let step = s.get_step(&step_id).await.unwrap().unwrap();
  assert_eq!(step.step_num, 1);
  assert!(step.completion.is_none());

  s.finish_step(&step_id, finish_after(250, 3)).await.unwrap();
  let step = s.get_step(&step_id).await.unwrap().unwrap();
  let completion = step.completion.unwrap();
  assert_eq!(completion.exit_code, 3);
  assert_eq!(completion.duration_ms, 250);
}

#[tokio::test]
async fn step_requires_existing_run() {
  let s = store().await;
  let err = s.begin_step(NewStep::new("ghost", 1, "orphan")).await.unwrap_err();
  assert!(matches!(err, Error::Database(_)), "got {err:?}");
}

#[tokio::test]
async fn list_steps_orders_by_number() {
  let s = store().await;
  s.start_run(new_run("r1")).await.unwrap();
  for n in [3, 1, 2] {
    add_step(&s, "r1", n).await;
  }

  let nums: Vec<u32> = s
    .list_steps("r1")
    .await
    .unwrap()
    .into_iter()
    .map(|s| s.step_num)
    .collect();
  assert_eq!(nums, vec![1, 2, 3]);
}

// ─── KV tags ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn run_scoped_kv_is_replaced() {
  let s = store().await;
  s.start_run(new_run("r1")).await.unwrap();

  s.set_kv(KvTag::new("r1", KvScope::Run, "k", "v1")).await.unwrap();
  s.set_kv(KvTag::new("r1", KvScope::Run, "k", "v2")).await.unwrap();

  let tags = s.list_kv("r1").await.unwrap();
  assert_eq!(tags, vec![KvTag::new("r1", KvScope::Run, "k", "v2")]);
}

#[tokio::test]
async fn step_scoped_kv_is_replaced_independently_of_run_scope() {
  let s = store().await;
  let step_id = run_with_step(&s, "r1", 1).await;

  s.set_kv(KvTag::new("r1", KvScope::Run, "k", "run")).await.unwrap();
  s.set_kv(KvTag::new("r1", KvScope::step(&step_id), "k", "a")).await.unwrap();
  s.set_kv(KvTag::new("r1", KvScope::step(&step_id), "k", "b")).await.unwrap();

  let tags = s.list_kv("r1").await.unwrap();
  assert_eq!(tags.len(), 2);
  assert!(tags.contains(&KvTag::new("r1", KvScope::Run, "k", "run")));
  assert!(tags.contains(&KvTag::new("r1", KvScope::step(&step_id), "k", "b")));
}

#[tokio::test]
async fn empty_kv_value_is_skipped() {
  let s = store().await;
  s.start_run(new_run("r1")).await.unwrap();

  s.set_kv(KvTag::new("r1", KvScope::Run, "k", "")).await.unwrap();
  assert!(s.list_kv("r1").await.unwrap().is_empty());
}

async fn insert_command(s: &SqliteStore, command_id: &str, step_id: &str) {
  let (command_id, step_id) = (command_id.to_owned(), step_id.to_owned());
  s.conn
    .call(move |conn| {
      conn.execute(
        "INSERT INTO commands (command_id, step_id, command_num, started_at)
         VALUES (?1, ?2, 1, '2025-12-13T22:00:00.000000000Z')",
        [command_id, step_id],
      )?;
      Ok(())
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn command_scoped_kv_is_replaced() {
  let s = store().await;
  let step_id = run_with_step(&s, "r1", 1).await;
  insert_command(&s, "c1", &step_id).await;
  let scope = KvScope::Command { step_id: step_id.clone(), command_id: "c1".into() };

  s.set_kv(KvTag::new("r1", scope.clone(), "k", "a")).await.unwrap();
  s.set_kv(KvTag::new("r1", KvScope::step(&step_id), "k", "step")).await.unwrap();
  s.set_kv(KvTag::new("r1", scope.clone(), "k", "b")).await.unwrap();

  let tags = s.list_kv("r1").await.unwrap();
  assert_eq!(tags.len(), 2);
  assert!(tags.contains(&KvTag::new("r1", scope, "k", "b")));
  assert!(tags.contains(&KvTag::new("r1", KvScope::step(&step_id), "k", "step")));
}

#[tokio::test]
async fn command_scope_requires_existing_command() {
  let s = store().await;
  let step_id = run_with_step(&s, "r1", 1).await;
  let scope = KvScope::Command { step_id, command_id: "missing".into() };

  let err = s.set_kv(KvTag::new("r1", scope, "k", "v")).await.unwrap_err();
  assert!(matches!(err, Error::Database(_)), "got {err:?}");
}

#[tokio::test]
async fn command_without_step_violates_check() {
  let s = store().await;
  let step_id = run_with_step(&s, "r1", 1).await;
  insert_command(&s, "c1", &step_id).await;

  let inserted = s
    .conn
    .call(|conn| {
      Ok(conn.execute(
        "INSERT INTO kv (run_id, step_id, command_id, k, v) VALUES ('r1', NULL, 'c1', 'k', 'v')",
        [],
      ))
    })
    .await
    .unwrap();
  assert!(inserted.is_err());
  assert!(s.list_kv("r1").await.unwrap().is_empty());
}

#[tokio::test]
async fn kv_requires_key() {
  let s = store().await;
  s.start_run(new_run("r1")).await.unwrap();

  let err = s.set_kv(KvTag::new("r1", KvScope::Run, "", "v")).await.unwrap_err();
  assert!(matches!(err, Error::Core(_)), "got {err:?}");
}

// ─── Artifacts ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn artifacts_are_listed_with_metadata() {
  let s = store().await;
  let step_id = run_with_step(&s, "r1", 1).await;

  let id = s
    .insert_artifact(stdout_artifact("r1", &step_id, "logs/step-01-stdout.txt"))
    .await
    .unwrap();
  assert!(id > 0);

  let artifacts = s.list_artifacts("r1").await.unwrap();
  assert_eq!(artifacts.len(), 1);
  let a = &artifacts[0];
  assert_eq!(a.artifact_id, id);
  assert_eq!(a.step_id.as_deref(), Some(step_id.as_str()));
  assert_eq!(a.kind, ArtifactKind::Stdout);
  assert_eq!(a.size_bytes, Some(12));
  assert_eq!(a.sha256.as_deref().map(str::len), Some(64));
}

#[tokio::test]
async fn duplicate_artifact_is_rejected() {
  let s = store().await;
  let step_id = run_with_step(&s, "r1", 1).await;
  let artifact = stdout_artifact("r1", &step_id, "logs/out.txt");

  s.insert_artifact(artifact.clone()).await.unwrap();
  let err = s.insert_artifact(artifact).await.unwrap_err();
  assert!(matches!(err, Error::Database(_)), "got {err:?}");
}

#[tokio::test]
async fn artifact_requires_path() {
  let s = store().await;
  let step_id = run_with_step(&s, "r1", 1).await;

  let err = s
    .insert_artifact(stdout_artifact("r1", &step_id, ""))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(_)), "got {err:?}");
}

#[tokio::test]
async fn empty_hash_is_stored_as_null() {
  let s = store().await;
  let step_id = run_with_step(&s, "r1", 1).await;
  let mut artifact = stdout_artifact("r1", &step_id, "out.txt");
  artifact.sha256 = Some(String::new());

  s.insert_artifact(artifact).await.unwrap();
  assert!(s.list_artifacts("r1").await.unwrap()[0].sha256.is_none());
}

// ─── Full-text search ────────────────────────────────────────────────────────

fn write_log(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
  let path = dir.path().join(name);
  let mut f = std::fs::File::create(&path).unwrap();
  f.write_all(contents.as_bytes()).unwrap();
  path
}

#[tokio::test]
async fn indexed_lines_are_searchable() {
  let dir = tempfile::tempdir().unwrap();
  let log = write_log(&dir, "out.txt", "alpha\r\nneedle in a haystack\ngamma\n");

  let s = store().await;
  let step_id = run_with_step(&s, "r1", 1).await;
  let id = s
    .insert_artifact(stdout_artifact("r1", &step_id, "out.txt"))
    .await
    .unwrap();

  assert_eq!(s.index_artifact("r1", id, &log).await.unwrap(), Some(3));

  let hits = s.search(&SearchQuery::new("r1", "needle")).await.unwrap();
  assert_eq!(hits.len(), 1);
  let hit = &hits[0];
  assert_eq!(hit.artifact_id, id);
  assert_eq!(hit.line_num, 2);
  assert_eq!(hit.text, "needle in a haystack");
  assert_eq!(hit.kind, ArtifactKind::Stdout);
  assert_eq!(hit.step_id.as_deref(), Some(step_id.as_str()));
  assert_eq!(hit.path, "out.txt");
}

async fn index_contents(contents: &str) -> (SqliteStore, Option<usize>) {
  let dir = tempfile::tempdir().unwrap();
  let log = write_log(&dir, "out.txt", contents);

  let s = store().await;
  let step_id = run_with_step(&s, "r1", 1).await;
  let id = s
    .insert_artifact(stdout_artifact("r1", &step_id, "out.txt"))
    .await
    .unwrap();
  let indexed = s.index_artifact("r1", id, &log).await.unwrap();
  (s, indexed)
}

#[tokio::test]
async fn last_line_without_newline_is_indexed() {
  let (s, indexed) = index_contents("first\nunterminated tail").await;
  assert_eq!(indexed, Some(2));

  let hits = s.search(&SearchQuery::new("r1", "tail")).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].line_num, 2);
  assert_eq!(hits[0].text, "unterminated tail");
}

#[tokio::test]
async fn empty_artifact_indexes_no_lines() {
  let (_s, indexed) = index_contents("").await;
  assert_eq!(indexed, Some(0));
}

#[tokio::test]
async fn very_long_lines_are_clipped() {
  let long = "x".repeat(crate::fts::MAX_LINE_BYTES * 4);
  let (s, indexed) = index_contents(&format!("{long}\nneedle\n")).await;
  assert_eq!(indexed, Some(2));

  let first: String = s
    .conn
    .call(|conn| {
      Ok(conn.query_row("SELECT text FROM log_lines_fts WHERE line_num = 1", [], |row| {
        row.get(0)
      })?)
    })
    .await
    .unwrap();
  assert_eq!(first.len(), crate::fts::MAX_LINE_BYTES);

  let hits = s.search(&SearchQuery::new("r1", "needle")).await.unwrap();
  assert_eq!(hits[0].line_num, 2);
}

#[tokio::test]
async fn search_is_scoped_to_run() {
  let dir = tempfile::tempdir().unwrap();
  let log = write_log(&dir, "out.txt", "shared token\n");

  let s = store().await;
  for run_id in ["r1", "r2"] {
    let step_id = run_with_step(&s, run_id, 1).await;
    let id = s
      .insert_artifact(stdout_artifact(run_id, &step_id, "out.txt"))
      .await
      .unwrap();
    s.index_artifact(run_id, id, &log).await.unwrap();
  }

  let hits = s.search(&SearchQuery::new("r2", "token")).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].step_id.as_deref(), Some("r2-step-01"));
}

#[tokio::test]
async fn search_applies_limit() {
  let dir = tempfile::tempdir().unwrap();
  let log = write_log(&dir, "out.txt", "hit\nhit\nhit\nhit\n");

  let s = store().await;
  let step_id = run_with_step(&s, "r1", 1).await;
  let id = s
    .insert_artifact(stdout_artifact("r1", &step_id, "out.txt"))
    .await
    .unwrap();
  s.index_artifact("r1", id, &log).await.unwrap();

  let limited = s.search(&SearchQuery::new("r1", "hit").with_limit(2)).await.unwrap();
  assert_eq!(limited.iter().map(|h| h.line_num).collect::<Vec<_>>(), vec![1, 2]);

  let defaulted = s.search(&SearchQuery::new("r1", "hit").with_limit(0)).await.unwrap();
  assert_eq!(defaulted.len(), 4);
}

#[tokio::test]
async fn search_requires_query_text() {
  let s = store().await;
  let err = s.search(&SearchQuery::new("r1", "")).await.unwrap_err();
  assert!(matches!(err, Error::Core(_)), "got {err:?}");
}

#[tokio::test]
async fn store_without_search_degrades_then_upgrades() {
  let dir = tempfile::tempdir().unwrap();
  let db = dir.path().join("scenariolog.sqlite");
  let log = write_log(&dir, "out.txt", "line one\nline two\nline three\n");

  let s = SqliteStore::open_with(&db, &StoreConfig::without_search())
    .await
    .unwrap();
  assert!(!s.search_available().await.unwrap());

  // Recording keeps working.
  let step_id = run_with_step(&s, "r1", 1).await;
  let id = s
    .insert_artifact(stdout_artifact("r1", &step_id, "out.txt"))
    .await
    .unwrap();
  assert_eq!(s.index_artifact("r1", id, &log).await.unwrap(), None);

  let err = s.search(&SearchQuery::new("r1", "line")).await.unwrap_err();
  assert!(matches!(err, Error::SearchUnavailable), "got {err:?}");

  let summary = s.run_summary("r1").await.unwrap().unwrap();
  assert!(!summary.full_text_search);

  // Provisioning later makes subsequent captures searchable.
  assert!(s.ensure_search_index().await.unwrap());
  assert_eq!(s.index_artifact("r1", id, &log).await.unwrap(), Some(3));
  let lines: Vec<u64> = s
    .search(&SearchQuery::new("r1", "line"))
    .await
    .unwrap()
    .into_iter()
    .map(|h| h.line_num)
    .collect();
  assert_eq!(lines, vec![1, 2, 3]);
}

#[tokio::test]
async fn indexing_missing_file_reports_path() {
  let s = store().await;
  let step_id = run_with_step(&s, "r1", 1).await;
  let id = s
    .insert_artifact(stdout_artifact("r1", &step_id, "gone.txt"))
    .await
    .unwrap();

  let missing = PathBuf::from("/nonexistent/scenariolog/gone.txt");
  let err = s.index_artifact("r1", id, &missing).await.unwrap_err();
  assert!(matches!(err, Error::Io { ref path, .. } if *path == missing), "got {err:?}");
}

// ─── Reporting ───────────────────────────────────────────────────────────────

async fn seeded_run(s: &SqliteStore) {
  s.start_run(new_run("r1")).await.unwrap();
  for (num, ms, code) in [(1, 100, 0), (2, 300, 2), (3, 200, 0)] {
    let step_id = add_step(s, "r1", num).await;
    s.finish_step(&step_id, finish_after(ms, code)).await.unwrap();
  }
  // Still running.
  add_step(s, "r1", 4).await;

  let mut stderr = stdout_artifact("r1", "r1-step-02", "logs/step-02-stderr.txt");
  stderr.kind = ArtifactKind::Stderr;
  s.insert_artifact(stderr).await.unwrap();
}

#[tokio::test]
async fn summary_counts_steps() {
  let s = store().await;
  seeded_run(&s).await;

  let summary = s.run_summary("r1").await.unwrap().unwrap();
  assert_eq!(summary.total_steps, 4);
  assert_eq!(summary.failed_steps, 1);
  assert!(summary.full_text_search);
  assert!(s.run_summary("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn failures_include_stderr_path() {
  let s = store().await;
  seeded_run(&s).await;

  let failures = s.failures("r1").await.unwrap();
  assert_eq!(failures.len(), 1);
  let f = &failures[0];
  assert_eq!(f.step_num, 2);
  assert_eq!(f.exit_code, 2);
  assert_eq!(f.duration_ms, Some(300));
  assert_eq!(f.stderr_path.as_deref(), Some("logs/step-02-stderr.txt"));
}

#[tokio::test]
async fn timings_are_slowest_first() {
  let s = store().await;
  seeded_run(&s).await;

  let top: Vec<(u32, Option<i64>)> = s
    .timings("r1", 2)
    .await
    .unwrap()
    .into_iter()
    .map(|t| (t.step_num, t.duration_ms))
    .collect();
  assert_eq!(top, vec![(2, Some(300)), (3, Some(200))]);
}
