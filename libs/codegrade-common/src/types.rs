use serde::{Deserialize, Serialize};
use std::fmt;

/// One graded (input, expected output, description) triple.
///
/// Serialized with the snake_case field names used by the test-case
/// specification format, so a `Vec<TestCase>` round-trips through the same
/// JSON that authors write by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
    pub description: String,
}

impl TestCase {
    pub fn new(
        input: impl Into<String>,
        expected_output: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
            description: description.into(),
        }
    }

    /// The implicit case used when a submission comes without test cases:
    /// no input, no expected output, so it only checks for a clean exit.
    pub fn smoke_test() -> Self {
        Self::new("", "", "Basic execution test")
    }
}

/// Raw result of running the artifact once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub exited_normally: bool,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration_ms: u64,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExecutionResult {
    pub fn timed_out(stdout: String, stderr: String, duration_ms: u64) -> Self {
        Self {
            exited_normally: false,
            stdout,
            stderr,
            timed_out: true,
            duration_ms,
            exit_code: None,
            signal: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestStatus {
    Passed,
    OutputMismatch,
    RuntimeError,
    TimeLimitExceeded,
    /// The sandbox itself failed for this case (spawn or pipe error)
    ExecutionFault,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Passed => "passed",
            TestStatus::OutputMismatch => "output_mismatch",
            TestStatus::RuntimeError => "runtime_error",
            TestStatus::TimeLimitExceeded => "time_limit_exceeded",
            TestStatus::ExecutionFault => "execution_fault",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Graded result of one test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    /// 1-based position of the case in the submitted specification
    pub index: usize,
    pub description: String,
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
    pub passed: bool,
    pub status: TestStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationReport {
    pub overall_correct: bool,
    pub passed_count: usize,
    pub total_count: usize,
    pub success_rate: f64,
    pub outcomes: Vec<TestOutcome>,
}

pub const COMPILATION_FAILED: &str = "Compilation failed";

/// Payload returned instead of a report when the submission did not compile.
/// `total_count` is the number of cases that would have run, never zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationFailure {
    pub error: String,
    pub compilation_error: String,
    pub overall_correct: bool,
    pub passed_count: usize,
    pub total_count: usize,
}

impl CompilationFailure {
    pub fn new(diagnostics: impl Into<String>, total_count: usize) -> Self {
        Self {
            error: COMPILATION_FAILED.to_string(),
            compilation_error: diagnostics.into(),
            overall_correct: false,
            passed_count: 0,
            total_count,
        }
    }
}

/// Terminal value of one evaluation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Evaluation {
    CompilationFailed(CompilationFailure),
    Completed(EvaluationReport),
}

/// The outcome shapes a caller has to distinguish.
/// `InternalError` is not listed: it arrives as the `Err` side of the
/// engine's `Result`, never as an `Evaluation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Correct,
    EvaluationFailure,
    CompilationFailure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Correct => "correct",
            Outcome::EvaluationFailure => "evaluation_failure",
            Outcome::CompilationFailure => "compilation_failure",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Evaluation {
    pub fn overall_correct(&self) -> bool {
        match self {
            Evaluation::Completed(report) => report.overall_correct,
            Evaluation::CompilationFailed(_) => false,
        }
    }

    pub fn passed_count(&self) -> usize {
        match self {
            Evaluation::Completed(report) => report.passed_count,
            Evaluation::CompilationFailed(failure) => failure.passed_count,
        }
    }

    pub fn total_count(&self) -> usize {
        match self {
            Evaluation::Completed(report) => report.total_count,
            Evaluation::CompilationFailed(failure) => failure.total_count,
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            Evaluation::CompilationFailed(_) => Outcome::CompilationFailure,
            Evaluation::Completed(report) if report.overall_correct => Outcome::Correct,
            Evaluation::Completed(_) => Outcome::EvaluationFailure,
        }
    }

    pub fn report(&self) -> Option<&EvaluationReport> {
        match self {
            Evaluation::Completed(report) => Some(report),
            Evaluation::CompilationFailed(_) => None,
        }
    }
}
