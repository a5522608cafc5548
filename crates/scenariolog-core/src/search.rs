//! Full-text search over captured log lines.

use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactKind;

/// Limit applied when a query asks for zero or a negative number of hits.
pub const DEFAULT_SEARCH_LIMIT: i64 = 100;

/// Parameters for [`RunStore::search`](crate::store::RunStore::search).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
  pub run_id: String,
  /// An FTS5 match expression.
  pub query:  String,
  /// Maximum number of hits; values `<= 0` mean [`DEFAULT_SEARCH_LIMIT`].
  pub limit:  i64,
}

impl SearchQuery {
  pub fn new(run_id: impl Into<String>, query: impl Into<String>) -> Self {
    Self { run_id: run_id.into(), query: query.into(), limit: DEFAULT_SEARCH_LIMIT }
  }

  pub fn with_limit(mut self, limit: i64) -> Self {
    self.limit = limit;
    self
  }

  pub fn effective_limit(&self) -> i64 {
    if self.limit <= 0 { DEFAULT_SEARCH_LIMIT } else { self.limit }
  }
}

/// One matching line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
  pub artifact_id: i64,
  pub step_id:     Option<String>,
  pub kind:        ArtifactKind,
  pub path:        String,
  /// 1-based.
  pub line_num:    u64,
  pub text:        String,
}
