//! Identifier generation for runs and steps.
//!
//! Run ids sort lexically by start time and stay unique across concurrent
//! invocations on one host without coordination:
//!
//! ```text
//! 2025-12-13T22:03:04.123456789Z-pid-12345-1a2b3c4d5e6f7788
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use rand_core::{OsRng, RngCore};

/// Create a new run id for a run starting at `now`.
pub fn new_run_id(now: DateTime<Utc>) -> String {
  let ts = now.to_rfc3339_opts(SecondsFormat::Nanos, true);

  // Zero bytes still produce a well-formed id if the OS RNG is unavailable.
  let mut suffix = [0u8; 8];
  let _ = OsRng.try_fill_bytes(&mut suffix);

  format!("{ts}-pid-{}-{}", std::process::id(), hex::encode(suffix))
}

/// Deterministic step id: `<run-id>-step-<NN>`.
pub fn step_id(run_id: &str, step_num: u32) -> String {
  format!("{run_id}-step-{step_num:02}")
}
