use std::io;
use thiserror::Error;

/// Infrastructure failures that make the engine unusable for a request.
///
/// Every variant reaches the caller as `InternalError`; callers are expected
/// to fall back to a cheaper evaluation instead of reporting a wrong answer.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("toolchain `{program}` is unavailable: {source}")]
    ToolchainUnavailable {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("scratch filesystem unavailable: {0}")]
    Scratch(#[source] io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Caller-facing error kind
    pub fn kind(&self) -> &'static str {
        "InternalError"
    }
}

/// Failure of the sandbox machinery for a single run.
/// Recorded against that test case only.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to launch artifact: {0}")]
    Spawn(#[source] io::Error),

    #[error("i/o error while supervising the process: {0}")]
    Io(#[from] io::Error),
}
