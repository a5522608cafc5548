//! The SQLite implementation of [`RunStore`].

use std::{io::BufReader, path::Path};

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use scenariolog_core::{
  artifact::{Artifact, NewArtifact},
  kv::{KvScope, KvTag},
  run::{Completion, NewRun, Run, RunSummary},
  search::{SearchHit, SearchQuery},
  step::{NewStep, Step, StepFailure, StepTiming},
  store::RunStore,
};

use crate::{
  Error, Result, StoreConfig,
  encode::{
    ARTIFACT_COLUMNS, RawRun, RawStep, artifact_from_row, decode_dt, encode_dt, encode_path,
    kv_from_row,
  },
  fts,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A scenariolog store backed by a single SQLite file.
///
/// Clones share the one inner connection and therefore the one writer.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn:   tokio_rusqlite::Connection,
  pub(crate) config: StoreConfig,
}

impl SqliteStore {
  /// Open (or create) a store at `path` with default settings.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::open_with(path, &StoreConfig::default()).await
  }

  /// Open (or create) a store at `path`, apply pragmas and migrate.
  pub async fn open_with(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, config).await
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, &StoreConfig::default()).await
  }

  async fn init(conn: tokio_rusqlite::Connection, config: &StoreConfig) -> Result<Self> {
    let store = Self { conn, config: config.clone() };
    store.apply_pragmas().await?;
    store.migrate().await?;
    Ok(store)
  }

  /// Read a run's start time, or `None` if the run does not exist.
  async fn run_started_at(&self, run_id: &str) -> Result<Option<DateTime<Utc>>> {
    let run_id = run_id.to_owned();
    let raw: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT started_at FROM scenario_runs WHERE run_id = ?1",
              [run_id],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    raw.as_deref().map(decode_dt).transpose()
  }
}

// ─── RunStore impl ───────────────────────────────────────────────────────────

impl RunStore for SqliteStore {
  type Error = Error;

  // ── Runs ──────────────────────────────────────────────────────────────────

  async fn start_run(&self, run: NewRun) -> Result<()> {
    run.validate()?;

    let run_id   = run.run_id.clone();
    let root_dir = encode_path(&run.root_dir);
    let suite    = run.suite().map(str::to_owned);
    let at_str   = encode_dt(run.started_at);

    let insert_suite = suite.clone();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO scenario_runs (run_id, root_dir, suite, started_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![run_id, root_dir, insert_suite, at_str],
        )?;
        Ok(())
      })
      .await?;

    if let Some(suite) = suite {
      let tag = KvTag::new(run.run_id.clone(), KvScope::Run, "suite", suite);
      if let Err(e) = self.set_kv(tag).await {
        tracing::debug!(run_id = %run.run_id, error = %e, "failed to tag run suite");
      }
    }

    tracing::debug!(run_id = %run.run_id, "run started");
    Ok(())
  }

  async fn end_run(
    &self,
    run_id: &str,
    exit_code: i32,
    completed_at: DateTime<Utc>,
  ) -> Result<Completion> {
    let started_at = self
      .run_started_at(run_id)
      .await?
      .ok_or_else(|| Error::RunNotFound(run_id.to_owned()))?;

    let completion = Completion::between(started_at, completed_at, exit_code);

    let id_str = run_id.to_owned();
    let at_str = encode_dt(completion.completed_at);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE scenario_runs
           SET completed_at = ?1, exit_code = ?2, duration_ms = ?3
           WHERE run_id = ?4",
          rusqlite::params![at_str, completion.exit_code, completion.duration_ms, id_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(completion)
  }

  async fn get_run(&self, run_id: &str) -> Result<Option<Run>> {
    let id_str = run_id.to_owned();
    let raw: Option<RawRun> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {} FROM scenario_runs WHERE run_id = ?1", RawRun::COLUMNS);
        Ok(conn.query_row(&sql, [id_str], RawRun::from_row).optional()?)
      })
      .await?;

    raw.map(RawRun::into_run).transpose()
  }

  async fn latest_run_id(&self) -> Result<Option<String>> {
    let id = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row(
              "SELECT run_id FROM scenario_runs ORDER BY started_at DESC, run_id DESC LIMIT 1",
              [],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(id)
  }

  // ── Steps ─────────────────────────────────────────────────────────────────

  async fn begin_step(&self, step: NewStep) -> Result<()> {
    step.validate()?;

    let at_str = encode_dt(step.started_at);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO steps (step_id, run_id, step_num, step_name, script_path, started_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            step.step_id,
            step.run_id,
            step.step_num,
            step.step_name,
            step.script_path.filter(|p| !p.is_empty()),
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn finish_step(&self, step_id: &str, completion: Completion) -> Result<()> {
    let id_str = step_id.to_owned();
    let at_str = encode_dt(completion.completed_at);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE steps
           SET completed_at = ?1, exit_code = ?2, duration_ms = ?3
           WHERE step_id = ?4",
          rusqlite::params![at_str, completion.exit_code, completion.duration_ms, id_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_step(&self, step_id: &str) -> Result<Option<Step>> {
    let id_str = step_id.to_owned();
    let raw: Option<RawStep> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {} FROM steps WHERE step_id = ?1", RawStep::COLUMNS);
        Ok(conn.query_row(&sql, [id_str], RawStep::from_row).optional()?)
      })
      .await?;

    raw.map(RawStep::into_step).transpose()
  }

  async fn list_steps(&self, run_id: &str) -> Result<Vec<Step>> {
    let id_str = run_id.to_owned();
    let raws: Vec<RawStep> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM steps WHERE run_id = ?1 ORDER BY step_num",
          RawStep::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([id_str], RawStep::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawStep::into_step).collect()
  }

  // ── KV tags ───────────────────────────────────────────────────────────────

  async fn set_kv(&self, tag: KvTag) -> Result<()> {
    tag.validate()?;
    if tag.is_empty() {
      return Ok(());
    }

    let step_id    = tag.scope.step_id().map(str::to_owned);
    let command_id = tag.scope.command_id().map(str::to_owned);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let updated = tx.execute(
          "UPDATE kv SET v = ?5
           WHERE run_id = ?1 AND step_id IS ?2 AND command_id IS ?3 AND k = ?4",
          rusqlite::params![tag.run_id, step_id, command_id, tag.key, tag.value],
        )?;
        if updated == 0 {
          tx.execute(
            "INSERT INTO kv (run_id, step_id, command_id, k, v) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![tag.run_id, step_id, command_id, tag.key, tag.value],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_kv(&self, run_id: &str) -> Result<Vec<KvTag>> {
    let id_str = run_id.to_owned();
    let tags = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT run_id, step_id, command_id, k, v FROM kv WHERE run_id = ?1 ORDER BY kv_id",
        )?;
        let rows = stmt
          .query_map([id_str], kv_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(tags)
  }

  // ── Artifacts ─────────────────────────────────────────────────────────────

  async fn insert_artifact(&self, artifact: NewArtifact) -> Result<i64> {
    artifact.validate()?;

    let kind = artifact.kind.as_str().to_owned();
    let size = i64::try_from(artifact.size_bytes).unwrap_or(i64::MAX);
    let sha  = artifact.sha256.filter(|s| !s.is_empty());

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO artifacts
             (run_id, step_id, command_id, kind, path, is_text, size_bytes, sha256)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            artifact.run_id,
            artifact.step_id,
            artifact.command_id,
            kind,
            artifact.path,
            artifact.is_text,
            size,
            sha,
          ],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;
    Ok(id)
  }

  async fn list_artifacts(&self, run_id: &str) -> Result<Vec<Artifact>> {
    let id_str = run_id.to_owned();
    let artifacts = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE run_id = ?1 ORDER BY artifact_id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([id_str], artifact_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(artifacts)
  }

  // ── Full-text search ──────────────────────────────────────────────────────

  async fn index_artifact(
    &self,
    run_id: &str,
    artifact_id: i64,
    path: &Path,
  ) -> Result<Option<usize>> {
    if !self.search_available().await? {
      return Ok(None);
    }

    let file = tokio::fs::File::open(path)
      .await
      .map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    // Reads happen on the connection thread, inside the indexing transaction.
    let reader = BufReader::new(file.into_std().await);

    let id_str = run_id.to_owned();
    let indexed = self
      .conn
      .call(move |conn| fts::index_lines(conn, &id_str, artifact_id, reader))
      .await?;

    if let Some(lines) = indexed {
      tracing::debug!(run_id, artifact_id, lines, "indexed artifact");
    }
    Ok(indexed)
  }

  async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
    if query.run_id.is_empty() {
      return Err(scenariolog_core::Error::InvalidArgument("run_id is required".into()).into());
    }
    if query.query.is_empty() {
      return Err(scenariolog_core::Error::InvalidArgument("query is required".into()).into());
    }

    let run_id = query.run_id.clone();
    let text   = query.query.clone();
    let limit  = query.effective_limit();

    self
      .conn
      .call(move |conn| Ok(fts::search(conn, &run_id, &text, limit)?))
      .await?
      .ok_or(Error::SearchUnavailable)
  }

  // ── Reporting ─────────────────────────────────────────────────────────────

  async fn run_summary(&self, run_id: &str) -> Result<Option<RunSummary>> {
    let Some(run) = self.get_run(run_id).await? else {
      return Ok(None);
    };

    let id_str = run_id.to_owned();
    let (total_steps, failed_steps): (i64, i64) = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT
             COUNT(*),
             COUNT(CASE WHEN exit_code IS NOT NULL AND exit_code != 0 THEN 1 END)
           FROM steps WHERE run_id = ?1",
          [id_str],
          |row| Ok((row.get(0)?, row.get(1)?)),
        )?)
      })
      .await?;

    Ok(Some(RunSummary {
      run,
      total_steps: total_steps as u64,
      failed_steps: failed_steps as u64,
      full_text_search: self.search_available().await?,
    }))
  }

  async fn failures(&self, run_id: &str) -> Result<Vec<StepFailure>> {
    let id_str = run_id.to_owned();
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT s.step_num, s.step_name, s.exit_code, s.duration_ms, a.path
           FROM steps s
           LEFT JOIN artifacts a ON a.step_id = s.step_id AND a.kind = 'stderr'
           WHERE s.run_id = ?1
             AND s.exit_code IS NOT NULL
             AND s.exit_code != 0
           ORDER BY s.step_num",
        )?;
        let rows = stmt
          .query_map([id_str], |row| {
            Ok(StepFailure {
              step_num:    row.get(0)?,
              step_name:   row.get(1)?,
              exit_code:   row.get(2)?,
              duration_ms: row.get(3)?,
              stderr_path: row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  async fn timings(&self, run_id: &str, top: usize) -> Result<Vec<StepTiming>> {
    let id_str = run_id.to_owned();
    let limit  = i64::try_from(top).unwrap_or(i64::MAX);
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT step_num, step_name, duration_ms, exit_code
           FROM steps
           WHERE run_id = ?1
           ORDER BY duration_ms DESC, step_num
           LIMIT ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str, limit], |row| {
            Ok(StepTiming {
              step_num:    row.get(0)?,
              step_name:   row.get(1)?,
              duration_ms: row.get(2)?,
              exit_code:   row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }
}
