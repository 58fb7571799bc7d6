//! Evaluation Orchestrator - High-Level Pipeline
//!
//! **Responsibility:**
//! Drive one evaluation: parse tests -> compile -> run each case -> compare
//! -> aggregate.
//!
//! **Architecture:**
//! 1. [`Compiler`] produces an [`Artifact`] or diagnostics (compiler.rs)
//! 2. [`ProcessRunner`] runs the artifact once per case (sandbox.rs)
//! 3. The evaluator judges and aggregates outcomes (evaluator.rs)
//!
//! This module is the glue layer. It owns the artifact between a successful
//! compile and the end of the run loop, and nothing else: how code compiles,
//! how it runs and how it is scored all live elsewhere.
//!
//! **Failure semantics:**
//! - Compilation failure is terminal and reported as [`Evaluation::CompilationFailed`]
//! - Per-test failures are recorded and the loop continues
//! - Infrastructure failures surface as [`EngineError`] (`InternalError`)

use crate::compiler::{Artifact, Compiler, GccCompiler};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::evaluator::{aggregate_results, evaluate_test};
use crate::sandbox::{LocalProcessRunner, ProcessRunner};
use crate::testcase::{cases_or_smoke_test, parse_test_cases};
use codegrade_common::types::{CompilationFailure, Evaluation, TestCase, TestOutcome};
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{self, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, debug_span, info, instrument, warn, Instrument};
use uuid::Uuid;

/// Pipeline stage, used as a structured logging field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ParseTests,
    Compile,
    CompileFailed,
    RunTests,
    Aggregate,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ParseTests => "parse_tests",
            Stage::Compile => "compile",
            Stage::CompileFailed => "compile_failed",
            Stage::RunTests => "run_tests",
            Stage::Aggregate => "aggregate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The grading engine. Cheap to share behind an `Arc`; holds no per-request state.
pub struct Engine {
    compiler: Arc<dyn Compiler>,
    runner: Arc<dyn ProcessRunner>,
    max_parallel_tests: usize,
}

impl Engine {
    pub fn new(compiler: Arc<dyn Compiler>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            compiler,
            runner,
            max_parallel_tests: 1,
        }
    }

    /// Run up to `max_parallel_tests` cases of one evaluation at once
    pub fn with_parallelism(mut self, max_parallel_tests: usize) -> Self {
        self.max_parallel_tests = max_parallel_tests.max(1);
        self
    }

    /// Production wiring: gcc plus the local process runner
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            Arc::new(GccCompiler::from_config(config)),
            Arc::new(LocalProcessRunner::from_config(config)),
        )
        .with_parallelism(config.max_parallel_tests)
    }

    /// Check that the toolchain is usable
    pub async fn probe(&self) -> Result<String, EngineError> {
        self.compiler.probe().await
    }

    /// Evaluate `source` against a serialized test case specification.
    /// A missing or malformed specification runs the smoke test.
    pub async fn evaluate(&self, source: &str, test_spec: Option<&str>) -> Result<Evaluation, EngineError> {
        debug!(stage = %Stage::ParseTests, "Parsing test cases");
        let cases = parse_test_cases(test_spec);
        self.evaluate_cases(source, cases).await
    }

    /// Evaluate `source` against already-parsed cases
    #[instrument(skip_all, fields(evaluation_id = %Uuid::new_v4(), test_count = cases.len()))]
    pub async fn evaluate_cases(&self, source: &str, cases: Vec<TestCase>) -> Result<Evaluation, EngineError> {
        let cases = cases_or_smoke_test(cases);
        let start = Instant::now();

        debug!(stage = %Stage::Compile, "Compiling submission");
        let compilation = self.compiler.compile(source).await?;

        let artifact = match (compilation.success, compilation.artifact) {
            (true, Some(artifact)) => artifact,
            (true, None) => {
                return Err(EngineError::Internal(
                    "compiler reported success without an artifact".to_string(),
                ))
            }
            (false, _) => {
                info!(
                    stage = %Stage::CompileFailed,
                    timed_out = compilation.timed_out,
                    duration_ms = compilation.duration_ms,
                    "Compilation failed; no test cases run"
                );
                return Ok(Evaluation::CompilationFailed(CompilationFailure::new(
                    compilation.diagnostics,
                    cases.len(),
                )));
            }
        };

        debug!(stage = %Stage::RunTests, "Running test cases");
        let outcomes = self.run_tests(&artifact, &cases).await;

        // Dropping the artifact on panic or cancellation removes it too
        if let Err(e) = artifact.release() {
            warn!(error = %e, "Failed to remove scratch directory");
        }

        let report = aggregate_results(outcomes);
        info!(
            stage = %Stage::Aggregate,
            passed = report.passed_count,
            total = report.total_count,
            overall_correct = report.overall_correct,
            duration_ms = start.elapsed().as_millis() as u64,
            "Evaluation finished"
        );

        Ok(Evaluation::Completed(report))
    }

    /// Synchronous entry point for callers without a runtime.
    /// Must not be called from inside an async context.
    pub fn evaluate_blocking(&self, source: &str, test_spec: Option<&str>) -> Result<Evaluation, EngineError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| EngineError::Internal(format!("failed to start runtime: {}", e)))?;
        runtime.block_on(self.evaluate(source, test_spec))
    }

    /// Outcomes come back in case order whatever the parallelism.
    /// Per-case futures are boxed to keep this future `Send`.
    async fn run_tests(&self, artifact: &Artifact, cases: &[TestCase]) -> Vec<TestOutcome> {
        let runs: Vec<BoxFuture<'_, TestOutcome>> = cases
            .iter()
            .enumerate()
            .map(|(i, case)| self.run_test(artifact, i + 1, case).boxed())
            .collect();

        stream::iter(runs)
            .buffered(self.max_parallel_tests)
            .collect()
            .await
    }

    async fn run_test(&self, artifact: &Artifact, index: usize, case: &TestCase) -> TestOutcome {
        let span = debug_span!("test_case", test_index = index);
        let execution = self.runner.run(artifact, &case.input).instrument(span).await;

        if let Ok(result) = &execution {
            debug!(
                test_index = index,
                duration_ms = result.duration_ms,
                timed_out = result.timed_out,
                exited_normally = result.exited_normally,
                "Test case executed"
            );
        }

        let outcome = evaluate_test(index, case, execution);
        if !outcome.passed {
            debug!(
                test_index = index,
                status = %outcome.status,
                error = outcome.error.as_deref().unwrap_or(""),
                "Test case failed"
            );
        }
        outcome
    }
}
