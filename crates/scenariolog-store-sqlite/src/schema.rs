//! SQL schema for the scenariolog SQLite store.
//!
//! The core tables are versioned through `PRAGMA user_version` and applied
//! once, inside a single transaction. The FTS5 log index is optional and
//! provisioned separately on every migration.

/// Schema version written by this crate. `0` means uninitialised.
pub const SCHEMA_VERSION: i64 = 1;

/// Name of the optional FTS5 table holding indexed log lines.
pub const FTS_TABLE: &str = "log_lines_fts";

/// Version 1 DDL, one statement per entry.
pub const SCHEMA_V1: &[&str] = &[
  // One row per run.
  "CREATE TABLE IF NOT EXISTS scenario_runs (
      run_id       TEXT PRIMARY KEY,
      root_dir     TEXT NOT NULL,
      suite        TEXT,
      started_at   TEXT NOT NULL,   -- RFC 3339 UTC, nanoseconds
      completed_at TEXT,
      exit_code    INTEGER,
      duration_ms  INTEGER
  )",
  // One row per executed step.
  "CREATE TABLE IF NOT EXISTS steps (
      step_id      TEXT PRIMARY KEY,   -- <run_id>-step-<NN>
      run_id       TEXT NOT NULL,
      step_num     INTEGER NOT NULL,
      step_name    TEXT NOT NULL,
      script_path  TEXT,
      started_at   TEXT NOT NULL,
      completed_at TEXT,
      exit_code    INTEGER,
      duration_ms  INTEGER,
      FOREIGN KEY (run_id) REFERENCES scenario_runs(run_id) ON DELETE CASCADE
  )",
  "CREATE INDEX IF NOT EXISTS idx_steps_run ON steps(run_id)",
  "CREATE INDEX IF NOT EXISTS idx_steps_num ON steps(run_id, step_num)",
  // Finer-grained invocations inside a step. Not written yet; present so kv
  // and artifacts can reference commands.
  "CREATE TABLE IF NOT EXISTS commands (
      command_id   TEXT PRIMARY KEY,
      step_id      TEXT NOT NULL,
      command_num  INTEGER NOT NULL,
      argv0        TEXT,
      argv_json    TEXT,
      cwd          TEXT,
      started_at   TEXT NOT NULL,
      completed_at TEXT,
      exit_code    INTEGER,
      duration_ms  INTEGER,
      FOREIGN KEY (step_id) REFERENCES steps(step_id) ON DELETE CASCADE
  )",
  "CREATE INDEX IF NOT EXISTS idx_commands_step ON commands(step_id)",
  "CREATE INDEX IF NOT EXISTS idx_commands_num ON commands(step_id, command_num)",
  // Arbitrary tags at run, step or command scope.
  "CREATE TABLE IF NOT EXISTS kv (
      kv_id      INTEGER PRIMARY KEY AUTOINCREMENT,
      run_id     TEXT NOT NULL,
      step_id    TEXT,
      command_id TEXT,
      k          TEXT NOT NULL,
      v          TEXT NOT NULL,
      created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
      CHECK (command_id IS NULL OR step_id IS NOT NULL),
      FOREIGN KEY (run_id)     REFERENCES scenario_runs(run_id) ON DELETE CASCADE,
      FOREIGN KEY (step_id)    REFERENCES steps(step_id)        ON DELETE CASCADE,
      FOREIGN KEY (command_id) REFERENCES commands(command_id)  ON DELETE CASCADE
  )",
  // NULLs are distinct in plain UNIQUE indexes; fold them so run- and
  // step-scoped keys are unique too.
  "CREATE UNIQUE INDEX IF NOT EXISTS idx_kv_scope_key
     ON kv(run_id, IFNULL(step_id, ''), IFNULL(command_id, ''), k)",
  "CREATE INDEX IF NOT EXISTS idx_kv_key ON kv(k)",
  "CREATE INDEX IF NOT EXISTS idx_kv_run ON kv(run_id)",
  // Captured files (stdout, stderr, ...) and their metadata.
  "CREATE TABLE IF NOT EXISTS artifacts (
      artifact_id INTEGER PRIMARY KEY AUTOINCREMENT,
      run_id      TEXT NOT NULL,
      step_id     TEXT,
      command_id  TEXT,
      kind        TEXT NOT NULL,
      path        TEXT NOT NULL,
      is_text     INTEGER NOT NULL DEFAULT 1,
      size_bytes  INTEGER,
      sha256      TEXT,
      created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
      CHECK (command_id IS NULL OR step_id IS NOT NULL),
      FOREIGN KEY (run_id)     REFERENCES scenario_runs(run_id) ON DELETE CASCADE,
      FOREIGN KEY (step_id)    REFERENCES steps(step_id)        ON DELETE CASCADE,
      FOREIGN KEY (command_id) REFERENCES commands(command_id)  ON DELETE CASCADE
  )",
  "CREATE UNIQUE INDEX IF NOT EXISTS idx_artifacts_unique_path
     ON artifacts(run_id, IFNULL(step_id, ''), IFNULL(command_id, ''), kind, path)",
  "CREATE INDEX IF NOT EXISTS idx_artifacts_run ON artifacts(run_id)",
  "CREATE INDEX IF NOT EXISTS idx_artifacts_kind ON artifacts(kind)",
  "CREATE INDEX IF NOT EXISTS idx_artifacts_is_text ON artifacts(is_text)",
];

/// Optional FTS5 index over captured lines. Idempotent.
pub const FTS_DDL: &str = "
CREATE VIRTUAL TABLE IF NOT EXISTS log_lines_fts USING fts5(
    run_id UNINDEXED,
    artifact_id UNINDEXED,
    line_num UNINDEXED,
    text,
    tokenize = 'unicode61'
)";

/// Documented capability probe; avoids matching on error text.
pub const FTS_PROBE: &str = "SELECT sqlite_compileoption_used('ENABLE_FTS5')";
