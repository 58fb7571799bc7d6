//! Execution Sandbox - runs a compiled artifact once per test case
//!
//! **Guarantees:**
//! - Hard wall-clock timeout: the whole process group is SIGKILLed, the
//!   caller never waits longer than the timeout plus a short drain grace
//! - Bounded capture: stdout is cut at `max_output_chars` characters with a
//!   truncation marker, stderr at `max_stderr_bytes`; both pipes are drained
//!   to EOF so chatty programs can still exit
//! - No leftovers: the process group is killed after every run, so forked
//!   descendants do not outlive the test case
//! - No shared state: every run starts in its own empty working directory,
//!   removed afterwards, and the artifact directory is read-only
//!
//! **Not provided:** namespaces, cgroups or seccomp. Optional setrlimit
//! limits come from `EngineConfig::limits`.

use crate::compiler::Artifact;
use crate::config::{EngineConfig, ResourceLimits};
use crate::error::SandboxError;
use crate::process::{
    apply_resource_limits, byte_budget_for_chars, cap_chars, isolate_process_group,
    kill_process_group, read_capped,
};
use async_trait::async_trait;
use codegrade_common::config::TRUNCATION_MARKER;
use codegrade_common::types::ExecutionResult;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

/// How long to wait for pipe readers after the process group is gone
const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, artifact: &Artifact, input: &str) -> Result<ExecutionResult, SandboxError>;
}

#[derive(Debug, Clone)]
pub struct LocalProcessRunner {
    timeout: Duration,
    max_output_chars: usize,
    max_stderr_bytes: usize,
    limits: Option<ResourceLimits>,
    scratch_root: Option<PathBuf>,
}

impl LocalProcessRunner {
    pub fn new(timeout: Duration, max_output_chars: usize, max_stderr_bytes: usize) -> Self {
        Self {
            timeout,
            max_output_chars,
            max_stderr_bytes,
            limits: None,
            scratch_root: None,
        }
    }

    pub fn with_limits(mut self, limits: Option<ResourceLimits>) -> Self {
        self.limits = limits;
        self
    }

    /// Parent for per-run working directories; `None` means the system temp dir
    pub fn with_scratch_root(mut self, scratch_root: Option<PathBuf>) -> Self {
        self.scratch_root = scratch_root;
        self
    }

    fn work_dir(&self) -> io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("codegrade-run-");
        match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.execution_timeout(),
            config.max_output_chars,
            config.max_stderr_bytes,
        )
        .with_limits(config.limits.clone())
        .with_scratch_root(config.scratch_dir.clone())
    }
}

#[async_trait]
impl ProcessRunner for LocalProcessRunner {
    #[instrument(skip(self, artifact, input), fields(timeout_ms = self.timeout.as_millis() as u64, input_size = input.len()))]
    async fn run(&self, artifact: &Artifact, input: &str) -> Result<ExecutionResult, SandboxError> {
        let work_dir = self.work_dir()?;
        let mut cmd = Command::new(artifact.executable());
        cmd.current_dir(work_dir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        isolate_process_group(&mut cmd);
        if let Some(limits) = &self.limits {
            apply_resource_limits(&mut cmd, limits);
        }

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(SandboxError::Spawn)?;
        let pid = child.id();

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stdout pipe missing"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stderr pipe missing"))?;

        // Programs that never read stdin get a broken pipe; that is not our error
        let input = input.to_owned();
        let stdin_task = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                let _ = stdin.write_all(input.as_bytes()).await;
                let _ = stdin.shutdown().await;
            }
        });
        let stdout_task = tokio::spawn(read_capped(stdout, byte_budget_for_chars(self.max_output_chars)));
        let stderr_task = tokio::spawn(read_capped(stderr, self.max_stderr_bytes));

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => Some(status?),
            Err(_) => {
                kill_process_group(pid);
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to reap timed-out process");
                }
                None
            }
        };
        // Anything the program left running in its group goes too
        kill_process_group(pid);
        let duration_ms = start.elapsed().as_millis() as u64;

        stdin_task.abort();
        let stdout = self.collect_stdout(stdout_task).await?;
        let stderr = collect_stderr(stderr_task).await?;
        if let Err(e) = work_dir.close() {
            warn!(error = %e, "Failed to remove run directory");
        }

        let Some(status) = status else {
            debug!(duration_ms = duration_ms, "Execution timed out");
            return Ok(ExecutionResult::timed_out(stdout, stderr, duration_ms));
        };

        let (exit_code, signal) = exit_details(&status);
        debug!(
            duration_ms = duration_ms,
            exit_code = ?exit_code,
            signal = ?signal,
            "Execution finished"
        );

        Ok(ExecutionResult {
            exited_normally: status.success(),
            stdout,
            stderr,
            timed_out: false,
            duration_ms,
            exit_code,
            signal,
        })
    }
}

impl LocalProcessRunner {
    async fn collect_stdout(&self, task: JoinHandle<io::Result<(Vec<u8>, bool)>>) -> io::Result<String> {
        let (bytes, _) = join_reader(task).await?;
        Ok(cap_chars(&String::from_utf8_lossy(&bytes), self.max_output_chars))
    }
}

/// The reader already stopped at `max_stderr_bytes`; only the marker is added here
async fn collect_stderr(task: JoinHandle<io::Result<(Vec<u8>, bool)>>) -> io::Result<String> {
    let (bytes, truncated) = join_reader(task).await?;
    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if truncated {
        text.push_str(TRUNCATION_MARKER);
    }
    Ok(text)
}

/// Wait for a pipe reader. A descendant that escaped the process group can
/// hold the pipe open forever; after the grace period whatever it kept is
/// given up rather than blocking the caller.
async fn join_reader(mut task: JoinHandle<io::Result<(Vec<u8>, bool)>>) -> io::Result<(Vec<u8>, bool)> {
    match tokio::time::timeout(DRAIN_GRACE, &mut task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(io::Error::new(io::ErrorKind::Other, join_err.to_string())),
        Err(_) => {
            task.abort();
            warn!("Output pipe still open after the process group was killed");
            Ok((Vec::new(), false))
        }
    }
}

#[cfg(unix)]
fn exit_details(status: &ExitStatus) -> (Option<i32>, Option<i32>) {
    use std::os::unix::process::ExitStatusExt;
    (status.code(), status.signal())
}

#[cfg(not(unix))]
fn exit_details(status: &ExitStatus) -> (Option<i32>, Option<i32>) {
    (status.code(), None)
}
