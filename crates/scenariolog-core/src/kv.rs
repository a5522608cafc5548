//! Key/value tags attached to a run, a step, or a command.
//!
//! Values are plain strings. Tagging the same key twice within one scope
//! replaces the value.

use serde::{Deserialize, Serialize};

use crate::{Result, error::require};

/// Granularity a tag is attached at.
///
/// A command scope always carries its owning step, so a command tag without a
/// step cannot be expressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum KvScope {
  Run,
  Step { step_id: String },
  Command { step_id: String, command_id: String },
}

impl KvScope {
  pub fn step(step_id: impl Into<String>) -> Self { Self::Step { step_id: step_id.into() } }

  pub fn step_id(&self) -> Option<&str> {
    match self {
      Self::Run => None,
      Self::Step { step_id } | Self::Command { step_id, .. } => Some(step_id),
    }
  }

  pub fn command_id(&self) -> Option<&str> {
    match self {
      Self::Command { command_id, .. } => Some(command_id),
      _ => None,
    }
  }
}

/// A single tag. An empty `value` means "nothing to record".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvTag {
  pub run_id: String,
  pub scope:  KvScope,
  pub key:    String,
  pub value:  String,
}

impl KvTag {
  pub fn new(
    run_id: impl Into<String>,
    scope: KvScope,
    key: impl Into<String>,
    value: impl Into<String>,
  ) -> Self {
    Self { run_id: run_id.into(), scope, key: key.into(), value: value.into() }
  }

  /// A tag whose value is the compact JSON encoding of `value`.
  pub fn json<T: Serialize + ?Sized>(
    run_id: impl Into<String>,
    scope: KvScope,
    key: impl Into<String>,
    value: &T,
  ) -> Result<Self> {
    Ok(Self::new(run_id, scope, key, serde_json::to_string(value)?))
  }

  /// Reject tags without a run id, a key, or (for scoped tags) an owner id.
  pub fn validate(&self) -> Result<()> {
    require("run_id", &self.run_id)?;
    require("key", &self.key)?;
    if let Some(step_id) = self.scope.step_id() {
      require("step_id", step_id)?;
    }
    if let Some(command_id) = self.scope.command_id() {
      require("command_id", command_id)?;
    }
    Ok(())
  }

  /// Empty values are not stored.
  pub fn is_empty(&self) -> bool { self.value.is_empty() }
}
