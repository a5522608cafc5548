//! The step execution engine.
//!
//! One call to [`exec_step`] performs the whole lifecycle of a step: insert
//! the step row, run the command with both streams copied to log files,
//! finalize the row, hash and record the two files as artifacts, and index
//! them for search. The row is finalized on every path once it exists.

use std::{
  path::{Component, Path, PathBuf},
  process::{ExitStatus, Stdio},
};

use chrono::{DateTime, Utc};
use scenariolog_core::{
  artifact::{ArtifactKind, NewArtifact},
  kv::{KvScope, KvTag},
  run::Completion,
  step::NewStep,
  store::RunStore,
};
use sha2::{Digest, Sha256};
use tokio::{
  fs::File,
  io::{AsyncRead, AsyncReadExt as _, AsyncWriteExt as _},
  process::Command,
  task::JoinHandle,
};

use crate::{
  CancelToken, Error, ExecStepResult, ExecStepSpec, PlatformProcessGroup, ProcessGroup, Result,
};

/// Exit code recorded when a step did not exit normally: killed by a signal,
/// cancelled, never started, or could not be waited on.
pub const FAILED_EXIT_CODE: i32 = 127;

/// Run one step with the platform's process-group handling.
pub async fn exec_step<S: RunStore>(
  store: &S,
  spec: &ExecStepSpec,
  cancel: &CancelToken,
) -> Result<ExecStepResult> {
  exec_step_with(store, spec, cancel, &PlatformProcessGroup::default()).await
}

/// Run one step, containing the process tree with `group`.
pub async fn exec_step_with<S, G>(
  store: &S,
  spec: &ExecStepSpec,
  cancel: &CancelToken,
  group: &G,
) -> Result<ExecStepResult>
where
  S: RunStore,
  G: ProcessGroup,
{
  spec.validate()?;

  let mut step = NewStep::new(&spec.run_id, spec.step_num, spec.step_name.clone());
  step.script_path = spec.script_path.clone().filter(|p| !p.is_empty());
  let started_at = step.started_at;
  let step_id = step.step_id.clone();

  store.begin_step(step).await.map_err(Error::store)?;
  tag_step(store, spec, &step_id).await;

  let captured = match capture(spec, cancel, group).await {
    Ok(captured) => captured,
    Err(e) => {
      finalize_best_effort(store, &step_id, started_at, Utc::now(), FAILED_EXIT_CODE).await;
      return Err(e);
    }
  };

  if let Some(e) = captured.copy_error.filter(|_| !captured.cancelled) {
    finalize_best_effort(store, &step_id, started_at, captured.completed_at, captured.exit_code)
      .await;
    return Err(e);
  }

  let completion = Completion::between(started_at, captured.completed_at, captured.exit_code);
  store.finish_step(&step_id, completion).await.map_err(Error::store)?;

  let stdout = record_artifact(store, spec, &step_id, ArtifactKind::Stdout, &captured.stdout_path)
    .await?;
  let stderr = record_artifact(store, spec, &step_id, ArtifactKind::Stderr, &captured.stderr_path)
    .await?;

  tracing::info!(
    run_id = %spec.run_id,
    step_id = %step_id,
    exit_code = completion.exit_code,
    duration_ms = completion.duration_ms,
    cancelled = captured.cancelled,
    "step finished"
  );

  Ok(ExecStepResult {
    step_id,
    exit_code: completion.exit_code,
    duration_ms: completion.duration_ms,
    cancelled: captured.cancelled,
    stdout_path: stdout.stored_path,
    stderr_path: stderr.stored_path,
    stdout_sha256: stdout.sha256,
    stderr_sha256: stderr.sha256,
    stdout_artifact_id: stdout.artifact_id,
    stderr_artifact_id: stderr.artifact_id,
  })
}

// ─── Process capture ─────────────────────────────────────────────────────────

struct Captured {
  stdout_path:  PathBuf,
  stderr_path:  PathBuf,
  exit_code:    i32,
  cancelled:    bool,
  completed_at: DateTime<Utc>,
  /// The first stream copy failure, if any.
  copy_error:   Option<Error>,
}

async fn capture<G: ProcessGroup>(
  spec: &ExecStepSpec,
  cancel: &CancelToken,
  group: &G,
) -> Result<Captured> {
  let (stdout_path, stderr_path) = step_log_paths(spec)?;
  let stdout_file = create_log(&stdout_path).await?;
  let stderr_file = create_log(&stderr_path).await?;

  let program = &spec.argv[0];
  let mut cmd = Command::new(program);
  cmd
    .args(&spec.argv[1..])
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);
  if let Some(dir) = spec.working_dir() {
    cmd.current_dir(dir);
  }
  group.isolate(&mut cmd);

  let mut child = cmd
    .spawn()
    .map_err(|source| Error::Spawn { program: program.clone(), source })?;

  // The group id stays valid after its leader exits; keep it for later.
  let pid = child.id();
  let stdout_task = tokio::spawn(copy_stream("stdout", child.stdout.take(), stdout_file));
  let stderr_task = tokio::spawn(copy_stream("stderr", child.stderr.take(), stderr_file));

  let mut cancelled = false;
  let status = tokio::select! {
    status = child.wait() => status,
    () = cancel.cancelled() => {
      cancelled = true;
      if let Some(pid) = pid {
        group.terminate(pid).await;
      }
      // The group may not have included the child on every platform.
      if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "failed to kill cancelled step");
      }
      child.wait().await
    }
  };

  // Both copies end once every writer of the pipes has exited, which may be
  // long after the direct child for backgrounded descendants.
  let drain = async {
    (join_copy("stdout", stdout_task).await, join_copy("stderr", stderr_task).await)
  };
  tokio::pin!(drain);
  let (stdout_copy, stderr_copy) = if cancelled {
    drain.await
  } else {
    tokio::select! {
      copies = &mut drain => copies,
      () = cancel.cancelled() => {
        cancelled = true;
        if let Some(pid) = pid {
          group.terminate(pid).await;
        }
        drain.await
      }
    }
  };
  let completed_at = Utc::now();

  let exit_code = if cancelled { FAILED_EXIT_CODE } else { exit_code(status) };

  Ok(Captured {
    stdout_path,
    stderr_path,
    exit_code,
    cancelled,
    completed_at,
    copy_error: stdout_copy.err().or(stderr_copy.err()),
  })
}

fn exit_code(status: std::io::Result<ExitStatus>) -> i32 {
  match status {
    Ok(status) => status.code().unwrap_or(FAILED_EXIT_CODE),
    Err(e) => {
      tracing::debug!(error = %e, "failed to wait for step");
      FAILED_EXIT_CODE
    }
  }
}

/// `<log_dir>/step-NN-stdout.txt` and `<log_dir>/step-NN-stderr.txt`.
pub(crate) fn step_log_paths(spec: &ExecStepSpec) -> Result<(PathBuf, PathBuf)> {
  if spec.log_dir.as_os_str().is_empty() {
    return Err(Error::LogPath("log_dir is required".into()));
  }

  let log_dir = if spec.log_dir.is_absolute() {
    spec.log_dir.clone()
  } else if spec.root_dir.as_os_str().is_empty() {
    return Err(Error::LogPath(format!(
      "root_dir is required when log_dir {:?} is relative",
      spec.log_dir
    )));
  } else {
    spec.root_dir.join(&spec.log_dir)
  };

  let n = spec.step_num;
  Ok((
    log_dir.join(format!("step-{n:02}-stdout.txt")),
    log_dir.join(format!("step-{n:02}-stderr.txt")),
  ))
}

async fn create_log(path: &Path) -> Result<File> {
  File::create(path).await.map_err(|source| Error::Io {
    context: "failed to create log file",
    path: path.to_path_buf(),
    source,
  })
}

/// Copy one pipe into its log file, then flush and sync the file. The file
/// is closed when this returns.
async fn copy_stream<R>(stream: &'static str, pipe: Option<R>, mut file: File) -> Result<u64>
where
  R: AsyncRead + Unpin,
{
  let to_copy_error = |source: std::io::Error| Error::Copy { stream, source };

  let copied = match pipe {
    Some(mut pipe) => tokio::io::copy(&mut pipe, &mut file).await.map_err(to_copy_error)?,
    None => 0,
  };
  file.flush().await.map_err(to_copy_error)?;
  file.sync_all().await.map_err(to_copy_error)?;
  Ok(copied)
}

async fn join_copy(stream: &'static str, task: JoinHandle<Result<u64>>) -> Result<u64> {
  task
    .await
    .map_err(|e| Error::Copy { stream, source: std::io::Error::other(e) })?
}

// ─── Finalization ────────────────────────────────────────────────────────────

/// Finalize a step on an error path. The original error wins, so a failure
/// here is only logged.
async fn finalize_best_effort<S: RunStore>(
  store: &S,
  step_id: &str,
  started_at: DateTime<Utc>,
  completed_at: DateTime<Utc>,
  exit_code: i32,
) {
  let completion = Completion::between(started_at, completed_at, exit_code);
  if let Err(e) = store.finish_step(step_id, completion).await {
    tracing::debug!(step_id, error = %e, "failed to finalize step");
  }
}

async fn tag_step<S: RunStore>(store: &S, spec: &ExecStepSpec, step_id: &str) {
  let scope = || KvScope::step(step_id);
  let run_id = spec.run_id.as_str();

  let mut tags = vec![
    KvTag::new(run_id, scope(), "step.name", spec.step_name.as_str()),
    KvTag::new(run_id, scope(), "step.num", spec.step_num.to_string()),
    KvTag::new(run_id, scope(), "step.script_path", spec.script_path.clone().unwrap_or_default()),
    KvTag::new(run_id, scope(), "cmd.argv0", spec.argv[0].as_str()),
  ];
  match KvTag::json(run_id, scope(), "cmd.args_json", &spec.argv[1..]) {
    Ok(tag) => tags.push(tag),
    Err(e) => tracing::debug!(step_id, error = %e, "failed to encode step arguments"),
  }

  for tag in tags {
    if let Err(e) = store.set_kv(tag).await {
      tracing::debug!(step_id, error = %e, "failed to tag step");
    }
  }
}

// ─── Artifacts ───────────────────────────────────────────────────────────────

struct Recorded {
  artifact_id: i64,
  stored_path: String,
  sha256:      String,
}

async fn record_artifact<S: RunStore>(
  store: &S,
  spec: &ExecStepSpec,
  step_id: &str,
  kind: ArtifactKind,
  path: &Path,
) -> Result<Recorded> {
  let (sha256, size_bytes) = file_sha256_and_size(path).await?;
  let stored_path = stored_path(&spec.root_dir, path);

  let artifact_id = store
    .insert_artifact(NewArtifact {
      run_id: spec.run_id.clone(),
      step_id: step_id.to_owned(),
      command_id: None,
      kind,
      path: stored_path.clone(),
      is_text: true,
      size_bytes,
      sha256: Some(sha256.clone()),
    })
    .await
    .map_err(Error::store)?;

  match store.index_artifact(&spec.run_id, artifact_id, path).await {
    Ok(_) => {}
    Err(e) => tracing::debug!(artifact_id, error = %e, "failed to index artifact"),
  }

  Ok(Recorded { artifact_id, stored_path, sha256 })
}

/// Hex SHA-256 and byte size of the file at `path`.
pub(crate) async fn file_sha256_and_size(path: &Path) -> Result<(String, u64)> {
  let io_error = |source: std::io::Error| Error::Io {
    context: "failed to hash log file",
    path: path.to_path_buf(),
    source,
  };

  let mut file = File::open(path).await.map_err(io_error)?;
  let mut hasher = Sha256::new();
  let mut buf = vec![0u8; 64 * 1024];
  let mut size = 0u64;
  loop {
    let n = file.read(&mut buf).await.map_err(io_error)?;
    if n == 0 {
      break;
    }
    hasher.update(&buf[..n]);
    size += n as u64;
  }
  Ok((hex::encode(hasher.finalize()), size))
}

/// `path` relative to `root` with forward slashes when it lies under `root`,
/// otherwise `path` unchanged.
pub(crate) fn stored_path(root: &Path, path: &Path) -> String {
  if root.as_os_str().is_empty() {
    return path.to_string_lossy().into_owned();
  }
  match path.strip_prefix(root) {
    Ok(rel) => rel
      .components()
      .filter_map(|c| match c {
        Component::Normal(part) => Some(part.to_string_lossy()),
        _ => None,
      })
      .collect::<Vec<_>>()
      .join("/"),
    Err(_) => path.to_string_lossy().into_owned(),
  }
}
