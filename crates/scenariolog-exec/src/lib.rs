//! Step execution for the scenariolog flight recorder.
//!
//! [`exec_step`] runs one subprocess, captures both output streams to files,
//! and records the step, its artifacts and their indexed lines through any
//! [`RunStore`](scenariolog_core::store::RunStore) backend.

pub mod cancel;
pub mod engine;
pub mod error;
pub mod procgroup;
pub mod step;

pub use cancel::CancelToken;
pub use engine::{FAILED_EXIT_CODE, exec_step, exec_step_with};
pub use error::{Error, Result};
pub use procgroup::{DirectChildOnly, PlatformProcessGroup, ProcessGroup};
#[cfg(unix)]
pub use procgroup::PosixProcessGroup;
pub use step::{ExecStepResult, ExecStepSpec};
