//! Connection pragmas and schema migration.
//!
//! Core tables are created in one transaction gated on `PRAGMA user_version`.
//! The FTS5 index is provisioned best-effort afterwards, so a SQLite build
//! without FTS5 still yields a fully usable recorder.

use rusqlite::{TransactionBehavior, types::Value};

use crate::{
  Error, Result, SqliteStore,
  schema::{FTS_DDL, FTS_PROBE, FTS_TABLE, SCHEMA_V1, SCHEMA_VERSION},
};

impl SqliteStore {
  /// Apply connection pragmas in order; any failure aborts opening.
  pub(crate) async fn apply_pragmas(&self) -> Result<()> {
    // SQLite keeps the timeout in a C int.
    let busy_timeout = i64::from(i32::try_from(self.config.busy_timeout_ms).unwrap_or(i32::MAX));
    let pragmas: [(&'static str, Value); 4] = [
      ("foreign_keys", Value::Integer(1)),
      ("journal_mode", Value::Text("WAL".into())),
      ("synchronous", Value::Text("NORMAL".into())),
      ("busy_timeout", Value::Integer(busy_timeout)),
    ];

    for (pragma, value) in pragmas {
      self
        .conn
        .call(move |conn| {
          // journal_mode answers with the resulting mode.
          if pragma == "journal_mode" {
            conn.pragma_update_and_check(None, pragma, value, |_| Ok(()))?;
          } else {
            conn.pragma_update(None, pragma, value)?;
          }
          Ok(())
        })
        .await
        .map_err(|source| Error::Pragma { pragma, source })?;
    }
    Ok(())
  }

  /// Bring the schema up to [`SCHEMA_VERSION`] and, if enabled, provision the
  /// search index. Safe to call repeatedly.
  pub async fn migrate(&self) -> Result<()> {
    let found = self
      .conn
      .call(|conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let found: i64 = tx.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if found == 0 {
          for stmt in SCHEMA_V1 {
            tx.execute_batch(stmt)?;
          }
          tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
          tx.commit()?;
        }
        Ok(found)
      })
      .await?;

    match found {
      0 => tracing::debug!(version = SCHEMA_VERSION, "applied schema"),
      SCHEMA_VERSION => tracing::debug!(version = found, "schema up to date"),
      other => return Err(Error::UnsupportedSchemaVersion(other)),
    }

    if self.config.full_text_search {
      self.ensure_search_index().await?;
    }
    Ok(())
  }

  /// The schema version marker stored in the database file.
  pub async fn schema_version(&self) -> Result<i64> {
    let v = self
      .conn
      .call(|conn| Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?))
      .await?;
    Ok(v)
  }

  /// Create the FTS5 log index if this SQLite build supports it.
  ///
  /// Returns whether the index exists afterwards. Missing FTS5 support is
  /// not an error.
  pub async fn ensure_search_index(&self) -> Result<bool> {
    let available = self
      .conn
      .call(|conn| {
        let supported: bool = conn.query_row(FTS_PROBE, [], |row| row.get(0))?;
        if !supported {
          return Ok(false);
        }
        conn.execute_batch(FTS_DDL)?;
        Ok(true)
      })
      .await?;

    if available {
      tracing::debug!(table = FTS_TABLE, "full-text search index ready");
    } else {
      tracing::info!("SQLite built without FTS5; full-text search disabled");
    }
    Ok(available)
  }

  /// Whether the FTS5 log index exists in this database.
  pub async fn search_available(&self) -> Result<bool> {
    let exists = self.conn.call(|conn| Ok(crate::fts::has_search_table(conn)?)).await?;
    Ok(exists)
  }
}
