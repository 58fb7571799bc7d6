// Shared defaults for the grading engine
// Both the engine config loader and the binaries read these

/// Wall-clock budget for one compiler invocation
pub const DEFAULT_COMPILE_TIMEOUT_MS: u64 = 10_000;

/// Wall-clock budget for one test-case run
pub const DEFAULT_EXECUTION_TIMEOUT_MS: u64 = 5_000;

/// Captured stdout is cut at this many characters before comparison
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 10_000;

/// Captured stderr is cut at this many bytes
pub const DEFAULT_MAX_STDERR_BYTES: usize = 64 * 1024;

/// Evaluations allowed to run at the same time in one process
pub const DEFAULT_MAX_CONCURRENT_EVALUATIONS: usize = 4;

/// Test cases of one evaluation allowed to run at the same time
pub const DEFAULT_MAX_PARALLEL_TESTS: usize = 1;

/// Appended to captured output that exceeded its cap
pub const TRUNCATION_MARKER: &str = "... (truncated)";

/// Listen address of the HTTP API when CODEGRADE_API_ADDR is unset
pub const DEFAULT_API_ADDR: &str = "0.0.0.0:3000";

pub const DEFAULT_COMPILER: &str = "gcc";
pub const DEFAULT_SOURCE_FILE: &str = "main.c";
pub const DEFAULT_EXECUTABLE_NAME: &str = "main";

pub fn default_compiler_flags() -> Vec<String> {
    ["-std=c99", "-Wall", "-Wextra"]
        .iter()
        .map(|flag| flag.to_string())
        .collect()
}

/// Environment variable names understood by the config loader
pub mod env {
    pub const CONFIG_PATH: &str = "CODEGRADE_CONFIG";
    pub const COMPILE_TIMEOUT_MS: &str = "CODEGRADE_COMPILE_TIMEOUT_MS";
    pub const EXECUTION_TIMEOUT_MS: &str = "CODEGRADE_EXECUTION_TIMEOUT_MS";
    pub const MAX_OUTPUT_CHARS: &str = "CODEGRADE_MAX_OUTPUT_CHARS";
    pub const SCRATCH_DIR: &str = "CODEGRADE_SCRATCH_DIR";
    pub const MAX_CONCURRENT: &str = "CODEGRADE_MAX_CONCURRENT";
    pub const MAX_PARALLEL_TESTS: &str = "CODEGRADE_MAX_PARALLEL_TESTS";
    pub const API_ADDR: &str = "CODEGRADE_API_ADDR";
}
