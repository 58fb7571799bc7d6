// Engine configuration: config/engine.json plus environment overrides
use anyhow::{bail, Context, Result};
use codegrade_common::config::{self as defaults, env};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// The single supported toolchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainConfig {
    pub compiler: String,
    pub flags: Vec<String>,
    pub source_file: String,
    pub executable_name: String,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compiler: defaults::DEFAULT_COMPILER.to_string(),
            flags: defaults::default_compiler_flags(),
            source_file: defaults::DEFAULT_SOURCE_FILE.to_string(),
            executable_name: defaults::DEFAULT_EXECUTABLE_NAME.to_string(),
        }
    }
}

/// Optional per-process resource limits applied with setrlimit before exec.
/// Absent by default: only wall-clock time is bounded unless configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub memory_limit_mb: Option<u64>,
    pub cpu_time_limit_secs: Option<u64>,
    pub max_file_size_mb: Option<u64>,
    pub max_processes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub toolchain: ToolchainConfig,
    pub compile_timeout_ms: u64,
    pub execution_timeout_ms: u64,
    pub max_output_chars: usize,
    pub max_stderr_bytes: usize,
    /// Parent directory for per-request scratch directories.
    /// `None` means the system temp dir.
    pub scratch_dir: Option<PathBuf>,
    pub max_parallel_tests: usize,
    pub max_concurrent_evaluations: usize,
    pub limits: Option<ResourceLimits>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            toolchain: ToolchainConfig::default(),
            compile_timeout_ms: defaults::DEFAULT_COMPILE_TIMEOUT_MS,
            execution_timeout_ms: defaults::DEFAULT_EXECUTION_TIMEOUT_MS,
            max_output_chars: defaults::DEFAULT_MAX_OUTPUT_CHARS,
            max_stderr_bytes: defaults::DEFAULT_MAX_STDERR_BYTES,
            scratch_dir: None,
            max_parallel_tests: defaults::DEFAULT_MAX_PARALLEL_TESTS,
            max_concurrent_evaluations: defaults::DEFAULT_MAX_CONCURRENT_EVALUATIONS,
            limits: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Engine config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: EngineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Resolve the config the way the binaries do:
    /// `$CODEGRADE_CONFIG`, then `config/engine.json`, then built-in defaults,
    /// with environment overrides applied last.
    pub fn load_default() -> Result<Self> {
        let mut config = match std::env::var(env::CONFIG_PATH) {
            Ok(path) => Self::load(Path::new(&path))?,
            Err(_) => {
                let default_path = Path::new("config/engine.json");
                if default_path.exists() {
                    Self::load(default_path)?
                } else {
                    info!("No engine config file found, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(env::COMPILE_TIMEOUT_MS) {
            self.compile_timeout_ms = parse_override(env::COMPILE_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(env::EXECUTION_TIMEOUT_MS) {
            self.execution_timeout_ms = parse_override(env::EXECUTION_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(env::MAX_OUTPUT_CHARS) {
            self.max_output_chars = parse_override(env::MAX_OUTPUT_CHARS, &value)?;
        }
        if let Some(value) = lookup(env::MAX_CONCURRENT) {
            self.max_concurrent_evaluations = parse_override(env::MAX_CONCURRENT, &value)?;
        }
        if let Some(value) = lookup(env::MAX_PARALLEL_TESTS) {
            self.max_parallel_tests = parse_override(env::MAX_PARALLEL_TESTS, &value)?;
        }
        if let Some(value) = lookup(env::SCRATCH_DIR) {
            if !value.trim().is_empty() {
                self.scratch_dir = Some(PathBuf::from(value));
            }
        }

        debug!(config = ?self, "Engine config after overrides");
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.toolchain.compiler.trim().is_empty() {
            bail!("toolchain.compiler must not be empty");
        }
        if self.toolchain.source_file.trim().is_empty() || self.toolchain.executable_name.trim().is_empty() {
            bail!("toolchain.source_file and toolchain.executable_name must not be empty");
        }
        if self.compile_timeout_ms == 0 || self.execution_timeout_ms == 0 {
            bail!("timeouts must be greater than zero");
        }
        if self.max_output_chars == 0 || self.max_stderr_bytes == 0 {
            bail!("output caps must be greater than zero");
        }
        if self.max_parallel_tests == 0 || self.max_concurrent_evaluations == 0 {
            bail!("max_parallel_tests and max_concurrent_evaluations must be at least 1");
        }
        Ok(())
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }
}

fn parse_override<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse::<T>()
        .with_context(|| format!("Invalid value for {}: {:?}", key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.compile_timeout_ms, 10_000);
        assert_eq!(config.execution_timeout_ms, 5_000);
        assert_eq!(config.max_output_chars, 10_000);
        assert_eq!(config.toolchain.compiler, "gcc");
        assert_eq!(config.toolchain.flags, vec!["-std=c99", "-Wall", "-Wextra"]);
        assert!(config.limits.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, r#"{ "execution_timeout_ms": 1500, "max_parallel_tests": 2 }"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.execution_timeout_ms, 1500);
        assert_eq!(config.max_parallel_tests, 2);
        assert_eq!(config.compile_timeout_ms, 10_000);
        assert_eq!(config.toolchain, ToolchainConfig::default());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = EngineConfig::load(&dir.path().join("nope.json"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_rejects_zero_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, r#"{ "compile_timeout_ms": 0 }"#).unwrap();

        assert!(EngineConfig::load(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = EngineConfig::default();
        config
            .apply_overrides(lookup_from(&[
                (env::EXECUTION_TIMEOUT_MS, "250"),
                (env::MAX_OUTPUT_CHARS, " 64 "),
                (env::SCRATCH_DIR, "/var/tmp/grading"),
                (env::MAX_CONCURRENT, "8"),
            ]))
            .unwrap();

        assert_eq!(config.execution_timeout(), Duration::from_millis(250));
        assert_eq!(config.max_output_chars, 64);
        assert_eq!(config.scratch_dir, Some(PathBuf::from("/var/tmp/grading")));
        assert_eq!(config.max_concurrent_evaluations, 8);
    }

    #[test]
    fn test_invalid_override_is_an_error() {
        let mut config = EngineConfig::default();
        let result = config.apply_overrides(lookup_from(&[(env::COMPILE_TIMEOUT_MS, "soon")]));
        assert!(result.is_err());

        let mut config = EngineConfig::default();
        let result = config.apply_overrides(lookup_from(&[(env::MAX_CONCURRENT, "0")]));
        assert!(result.is_err());
    }
}
