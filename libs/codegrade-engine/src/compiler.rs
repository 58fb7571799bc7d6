//! Compiler Stage
//!
//! Turns submitted source text into a runnable [`Artifact`] inside a fresh,
//! per-request scratch directory, or reports the toolchain's diagnostics.
//!
//! The stage never deletes what it produced. The [`Artifact`] owns its
//! scratch directory and removes it when released or dropped, so whoever
//! holds it (the executor) decides when that happens.
//!
//! The toolchain runs inside the scratch directory with relative paths only,
//! so diagnostics never mention where that directory lives.

use crate::config::{EngineConfig, ToolchainConfig};
use crate::error::EngineError;
use crate::process::{isolate_process_group, kill_process_group};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

pub const COMPILATION_TIMEOUT: &str = "Compilation timeout";

/// A compiled program and the scratch directory it lives in.
///
/// Dropping the artifact deletes the directory; [`Artifact::release`] does
/// the same but reports failures. Either way it happens exactly once.
#[derive(Debug)]
pub struct Artifact {
    dir: Option<TempDir>,
    path: PathBuf,
    executable: PathBuf,
}

impl Artifact {
    pub fn new(dir: TempDir, executable: PathBuf) -> Self {
        Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
            executable,
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn dir(&self) -> &Path {
        &self.path
    }

    /// Make the directory and everything in it read-only.
    /// Test runs share the artifact and must not be able to leave files for each other.
    pub fn seal(&self) -> io::Result<()> {
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let mode = if entry.path() == self.executable { 0o555 } else { 0o444 };
                set_mode(&entry.path(), mode)?;
            }
        }
        set_mode(&self.path, 0o555)
    }

    /// Delete the scratch directory now
    pub fn release(mut self) -> io::Result<()> {
        let unsealed = set_mode(&self.path, 0o755);
        let closed = match self.dir.take() {
            Some(dir) => dir.close(),
            None => Ok(()),
        };
        unsealed.and(closed)
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let _ = set_mode(&self.path, 0o755);
            drop(dir);
        }
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[derive(Debug)]
pub struct CompilationResult {
    pub success: bool,
    pub artifact: Option<Artifact>,
    /// Toolchain output, only populated on failure
    pub diagnostics: String,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl CompilationResult {
    pub fn success(artifact: Artifact, duration_ms: u64) -> Self {
        Self {
            success: true,
            artifact: Some(artifact),
            diagnostics: String::new(),
            timed_out: false,
            duration_ms,
        }
    }

    pub fn failure(diagnostics: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            artifact: None,
            diagnostics: diagnostics.into(),
            timed_out: false,
            duration_ms,
        }
    }

    pub fn timeout(duration_ms: u64) -> Self {
        Self {
            timed_out: true,
            ..Self::failure(COMPILATION_TIMEOUT, duration_ms)
        }
    }
}

#[async_trait]
pub trait Compiler: Send + Sync {
    /// Compile `source`. `Err` is reserved for infrastructure failures;
    /// a program that does not compile is an `Ok` failure result.
    async fn compile(&self, source: &str) -> Result<CompilationResult, EngineError>;

    /// Check that the toolchain can be launched and describe it
    async fn probe(&self) -> Result<String, EngineError>;
}

/// Production compiler: one fixed external toolchain invoked as a child process
#[derive(Debug, Clone)]
pub struct GccCompiler {
    toolchain: ToolchainConfig,
    scratch_root: Option<PathBuf>,
    timeout: Duration,
}

impl GccCompiler {
    pub fn new(toolchain: ToolchainConfig, scratch_root: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            toolchain,
            scratch_root,
            timeout,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.toolchain.clone(),
            config.scratch_dir.clone(),
            config.compile_timeout(),
        )
    }

    /// Always an absolute path: test runs start elsewhere and find the
    /// executable through it
    fn scratch_dir(&self) -> Result<TempDir, EngineError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("codegrade-");
        let dir = match &self.scratch_root {
            Some(root) => {
                let root = std::env::current_dir().map_err(EngineError::Scratch)?.join(root);
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        };
        dir.map_err(EngineError::Scratch)
    }

    fn spawn_error(&self, err: io::Error) -> EngineError {
        if err.kind() == io::ErrorKind::NotFound || err.kind() == io::ErrorKind::PermissionDenied {
            EngineError::ToolchainUnavailable {
                program: self.toolchain.compiler.clone(),
                source: err,
            }
        } else {
            EngineError::Internal(format!("failed to launch {}: {}", self.toolchain.compiler, err))
        }
    }
}

#[async_trait]
impl Compiler for GccCompiler {
    #[instrument(skip(self, source), fields(compiler = %self.toolchain.compiler, source_size = source.len()))]
    async fn compile(&self, source: &str) -> Result<CompilationResult, EngineError> {
        let dir = self.scratch_dir()?;
        let source_path = dir.path().join(&self.toolchain.source_file);
        let executable = dir.path().join(&self.toolchain.executable_name);

        tokio::fs::write(&source_path, source)
            .await
            .map_err(EngineError::Scratch)?;

        let mut cmd = Command::new(&self.toolchain.compiler);
        cmd.arg("-o")
            .arg(&self.toolchain.executable_name)
            .arg(&self.toolchain.source_file)
            .args(&self.toolchain.flags)
            .current_dir(dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        isolate_process_group(&mut cmd);

        let start = Instant::now();
        let child = cmd.spawn().map_err(|e| self.spawn_error(e))?;
        let pid = child.id();

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| {
                EngineError::Internal(format!("failed to collect compiler output: {}", e))
            })?,
            Err(_) => {
                // The child handle was dropped with the future; take out the
                // rest of the toolchain (cc1, as, ld) with it.
                kill_process_group(pid);
                let duration_ms = start.elapsed().as_millis() as u64;
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Compilation timed out");
                return Ok(CompilationResult::timeout(duration_ms));
            }
        };
        kill_process_group(pid);

        let duration_ms = start.elapsed().as_millis() as u64;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let diagnostics = if stderr.trim().is_empty() {
                String::from_utf8_lossy(&output.stdout).into_owned()
            } else {
                stderr.into_owned()
            };
            info!(
                duration_ms = duration_ms,
                exit_code = ?output.status.code(),
                error_preview = diagnostics.lines().next().unwrap_or(""),
                "Compilation failed"
            );
            return Ok(CompilationResult::failure(diagnostics, duration_ms));
        }

        if !executable.is_file() {
            return Err(EngineError::Internal(format!(
                "{} exited successfully but produced no executable",
                self.toolchain.compiler
            )));
        }

        let artifact = Artifact::new(dir, executable);
        artifact.seal().map_err(EngineError::Scratch)?;

        debug!(duration_ms = duration_ms, artifact = %artifact.executable().display(), "Compilation succeeded");
        Ok(CompilationResult::success(artifact, duration_ms))
    }

    async fn probe(&self) -> Result<String, EngineError> {
        let mut cmd = Command::new(&self.toolchain.compiler);
        cmd.arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        isolate_process_group(&mut cmd);

        let child = cmd.spawn().map_err(|e| self.spawn_error(e))?;
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| EngineError::Internal(format!("{} --version timed out", self.toolchain.compiler)))?
            .map_err(|e| EngineError::Internal(format!("failed to query {}: {}", self.toolchain.compiler, e)))?;

        if !output.status.success() {
            return Err(EngineError::Internal(format!(
                "{} --version exited with {}",
                self.toolchain.compiler, output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiler_named(name: &str) -> GccCompiler {
        GccCompiler::new(
            ToolchainConfig {
                compiler: name.to_string(),
                ..ToolchainConfig::default()
            },
            None,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_release_removes_scratch_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        let artifact = Artifact::new(dir, path.join("main"));

        assert!(path.exists());
        artifact.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_removes_scratch_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        {
            let _artifact = Artifact::new(dir, path.join("main"));
        }
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_sealed_artifact_is_still_removed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        std::fs::write(path.join("main"), b"").unwrap();
        std::fs::write(path.join("main.c"), b"int main(void) { return 0; }").unwrap();
        let artifact = Artifact::new(dir, path.join("main"));

        artifact.seal().unwrap();
        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&path), 0o555);
        assert_eq!(mode(&path.join("main")), 0o555);
        assert_eq!(mode(&path.join("main.c")), 0o444);

        artifact.release().unwrap();
        assert!(!path.exists());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        {
            let artifact = Artifact::new(dir, path.join("main"));
            artifact.seal().unwrap();
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_timeout_result_is_a_failure() {
        let result = CompilationResult::timeout(10_000);
        assert!(!result.success);
        assert!(result.timed_out);
        assert!(result.artifact.is_none());
        assert_eq!(result.diagnostics, "Compilation timeout");
    }

    #[tokio::test]
    async fn test_missing_toolchain_is_internal_error() {
        let compiler = compiler_named("codegrade-no-such-compiler");

        let err = compiler.compile("int main(void) { return 0; }").await.unwrap_err();
        assert!(matches!(err, EngineError::ToolchainUnavailable { .. }));

        let err = compiler.probe().await.unwrap_err();
        assert!(matches!(err, EngineError::ToolchainUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_unusable_scratch_root_is_internal_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let compiler = GccCompiler::new(
            ToolchainConfig::default(),
            Some(file.path().join("nested")),
            Duration::from_secs(5),
        );

        let err = compiler.compile("int main(void) { return 0; }").await.unwrap_err();
        assert!(matches!(err, EngineError::Scratch(_)));
    }

    /// A stand-in toolchain written as a shell script
    fn script_compiler(dir: &Path, body: &str, timeout: Duration) -> GccCompiler {
        let script = dir.join("fakecc");
        std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        GccCompiler::new(
            ToolchainConfig {
                compiler: script.to_string_lossy().into_owned(),
                ..ToolchainConfig::default()
            },
            None,
            timeout,
        )
    }

    #[tokio::test]
    async fn test_toolchain_sees_only_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = script_compiler(dir.path(), "echo \"$@\" >&2\nexit 1", Duration::from_secs(5));

        let first = compiler.compile("int main(void) { return 0; }").await.unwrap();
        let second = compiler.compile("int main(void) { return 0; }").await.unwrap();

        assert!(!first.success);
        assert_eq!(first.diagnostics, "-o main main.c -std=c99 -Wall -Wextra\n");
        assert_eq!(first.diagnostics, second.diagnostics);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_compile_returns_sealed_artifact() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let compiler = script_compiler(
            dir.path(),
            "printf '#!/bin/sh\\necho hi\\n' > \"$2\"\nchmod 755 \"$2\"",
            Duration::from_secs(5),
        );

        let result = compiler.compile("int main(void) { return 0; }").await.unwrap();
        let artifact = result.artifact.unwrap();
        let scratch = artifact.dir().to_path_buf();

        assert!(artifact.executable().is_absolute());
        let mode = std::fs::metadata(&scratch).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o555);

        artifact.release().unwrap();
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn test_compiler_timeout_kills_toolchain() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = script_compiler(dir.path(), "sleep 30", Duration::from_millis(200));

        let start = Instant::now();
        let result = compiler.compile("int main(void) { return 0; }").await.unwrap();
        assert!(!result.success);
        assert!(result.timed_out);
        assert_eq!(result.diagnostics, COMPILATION_TIMEOUT);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
