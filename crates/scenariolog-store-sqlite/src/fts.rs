//! Line indexing and search over the optional `log_lines_fts` table.
//!
//! These helpers run on the connection thread (inside
//! `tokio_rusqlite::Connection::call`), so they take a plain
//! `rusqlite::Connection`.

use std::io::BufRead;

use rusqlite::Connection;
use scenariolog_core::{artifact::ArtifactKind, search::SearchHit};

use crate::schema::FTS_TABLE;

/// Lines longer than this are truncated before insertion.
pub const MAX_LINE_BYTES: usize = 16 * 1024;

/// Raw bytes kept per line: room for one more UTF-8 character and a CRLF, so
/// the cut never lands inside a character that survives clipping.
const RAW_LINE_CAP: usize = MAX_LINE_BYTES + 6;

pub fn has_search_table(conn: &Connection) -> rusqlite::Result<bool> {
  let count: i64 = conn.query_row(
    "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
    [FTS_TABLE],
    |row| row.get(0),
  )?;
  Ok(count > 0)
}

/// Index every line of `reader` for one artifact in a single transaction.
///
/// Returns `None` when the search table does not exist.
pub fn index_lines(
  conn: &mut Connection,
  run_id: &str,
  artifact_id: i64,
  mut reader: impl BufRead,
) -> tokio_rusqlite::Result<Option<usize>> {
  if !has_search_table(conn)? {
    return Ok(None);
  }

  let tx = conn.transaction()?;
  let mut line_num = 0usize;
  {
    let mut stmt = tx.prepare(
      "INSERT INTO log_lines_fts (run_id, artifact_id, line_num, text) VALUES (?1, ?2, ?3, ?4)",
    )?;

    let mut buf = Vec::with_capacity(RAW_LINE_CAP);
    while read_line_capped(&mut reader, &mut buf, RAW_LINE_CAP)
      .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?
    {
      line_num += 1;
      let text = clip_line(trim_line_ending(&buf));
      stmt.execute(rusqlite::params![run_id, artifact_id, line_num as i64, text])?;
    }
  }
  tx.commit()?;

  Ok(Some(line_num))
}

/// Run a scoped match query. Returns `None` when the search table does not
/// exist.
pub fn search(
  conn: &Connection,
  run_id: &str,
  query: &str,
  limit: i64,
) -> rusqlite::Result<Option<Vec<SearchHit>>> {
  if !has_search_table(conn)? {
    return Ok(None);
  }

  let mut stmt = conn.prepare(
    "SELECT
       log_lines_fts.artifact_id,
       artifacts.step_id,
       artifacts.kind,
       artifacts.path,
       log_lines_fts.line_num,
       log_lines_fts.text
     FROM log_lines_fts
     JOIN artifacts ON artifacts.artifact_id = log_lines_fts.artifact_id
     WHERE log_lines_fts.run_id = ?1
       AND log_lines_fts MATCH ?2
     ORDER BY log_lines_fts.artifact_id, log_lines_fts.line_num
     LIMIT ?3",
  )?;

  let hits = stmt
    .query_map(rusqlite::params![run_id, query, limit], |row| {
      let kind: String = row.get(2)?;
      let line_num: i64 = row.get(4)?;
      Ok(SearchHit {
        artifact_id: row.get(0)?,
        step_id:     row.get(1)?,
        kind:        ArtifactKind::from(kind.as_str()),
        path:        row.get(3)?,
        line_num:    line_num.max(0) as u64,
        text:        row.get(5)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  Ok(Some(hits))
}

/// Read one `\n`-terminated line into `buf`, keeping at most `cap` bytes and
/// discarding the rest of the line. Returns `false` at end of input.
fn read_line_capped(
  reader: &mut impl BufRead,
  buf: &mut Vec<u8>,
  cap: usize,
) -> std::io::Result<bool> {
  buf.clear();
  let mut read_any = false;
  loop {
    let available = match reader.fill_buf() {
      Ok(available) => available,
      Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
      Err(e) => return Err(e),
    };
    if available.is_empty() {
      return Ok(read_any);
    }
    read_any = true;

    let (used, done) = match available.iter().position(|&b| b == b'\n') {
      Some(i) => (i + 1, true),
      None => (available.len(), false),
    };
    let keep = used.min(cap.saturating_sub(buf.len()));
    buf.extend_from_slice(&available[..keep]);
    reader.consume(used);
    if done {
      return Ok(true);
    }
  }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
  let line = line.strip_suffix(b"\n").unwrap_or(line);
  line.strip_suffix(b"\r").unwrap_or(line)
}

/// Decode lossily and cut to [`MAX_LINE_BYTES`] on a character boundary.
fn clip_line(line: &[u8]) -> String {
  let mut text = String::from_utf8_lossy(line).into_owned();
  if text.len() > MAX_LINE_BYTES {
    let mut end = MAX_LINE_BYTES;
    while !text.is_char_boundary(end) {
      end -= 1;
    }
    text.truncate(end);
  }
  text
}
