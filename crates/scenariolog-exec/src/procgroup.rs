//! Process-group isolation and termination.
//!
//! A step's command may start its own children. Cancelling only the direct
//! child would leave those running and holding the output pipes open, so on
//! unix the child is started as the leader of a new process group and the
//! whole group is signalled.

use std::{future::Future, time::Duration};

use tokio::process::Command;

/// Delay between the polite and the forced termination signal.
pub const TERMINATE_GRACE: Duration = Duration::from_millis(250);

/// Platform capability for containing and stopping a process tree.
pub trait ProcessGroup: Send + Sync {
  /// Configure `cmd` before it is spawned.
  fn isolate(&self, cmd: &mut Command);

  /// Stop everything started under the child with process id `pid`.
  ///
  /// Best effort: failures are logged, never returned.
  fn terminate(&self, pid: u32) -> impl Future<Output = ()> + Send + '_;
}

// ─── unix ────────────────────────────────────────────────────────────────────

/// Starts the child in its own process group; terminates with `SIGTERM`,
/// then `SIGKILL` after [`TERMINATE_GRACE`].
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixProcessGroup;

#[cfg(unix)]
impl PosixProcessGroup {
  fn signal(pgid: u32, signal: nix::sys::signal::Signal) {
    use nix::{errno::Errno, sys::signal::killpg, unistd::Pid};

    let Ok(raw) = i32::try_from(pgid) else {
      tracing::warn!(pgid, "process group id out of range");
      return;
    };
    match killpg(Pid::from_raw(raw), signal) {
      Ok(()) => {}
      // Already gone.
      Err(Errno::ESRCH) => {}
      Err(e) => {
        tracing::warn!(pgid, signal = signal.as_str(), error = %e, "failed to signal process group")
      }
    }
  }
}

#[cfg(unix)]
impl ProcessGroup for PosixProcessGroup {
  fn isolate(&self, cmd: &mut Command) { cmd.process_group(0); }

  async fn terminate(&self, pid: u32) {
    use nix::sys::signal::Signal;

    tracing::debug!(pgid = pid, "terminating process group");
    Self::signal(pid, Signal::SIGTERM);
    tokio::time::sleep(TERMINATE_GRACE).await;
    Self::signal(pid, Signal::SIGKILL);
  }
}

// ─── fallback ────────────────────────────────────────────────────────────────

/// No group handling; only the direct child is killed (by the engine).
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectChildOnly;

impl ProcessGroup for DirectChildOnly {
  fn isolate(&self, _cmd: &mut Command) {}

  async fn terminate(&self, _pid: u32) {}
}

#[cfg(unix)]
pub type PlatformProcessGroup = PosixProcessGroup;

#[cfg(not(unix))]
pub type PlatformProcessGroup = DirectChildOnly;
