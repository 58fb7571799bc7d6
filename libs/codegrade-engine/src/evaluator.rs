//! Test Evaluator - Output Normalization, Comparison and Scoring
//!
//! **Core Responsibility:**
//! Decide whether one run passed, and fold per-test outcomes into a report.
//!
//! **Critical Properties:**
//! - Knows nothing about processes, compilers or scratch directories
//! - Pure functions: (execution result, test case) -> outcome
//!
//! **Normalization Rules:**
//! - Line endings: `\r\n` and `\r` become `\n`
//! - Trailing whitespace on each line: removed
//! - Leading whitespace on each line: kept (indentation is significant)
//! - Blank lines before the first and after the last non-blank line: removed
//! - Case, inner spacing and blank lines between content: significant
//!
//! **Comparison Rules:**
//! - Empty expected output: any normal exit passes (existence check)
//! - Otherwise: exact equality of the normalized forms
//!
//! **Verdict:** all-or-nothing. `overall_correct` needs at least one case and
//! every case passing; the success rate is informational only.

use crate::error::SandboxError;
use codegrade_common::types::{
    EvaluationReport, ExecutionResult, TestCase, TestOutcome, TestStatus,
};

pub const EXECUTION_TIMEOUT: &str = "Execution timeout";
pub const OUTPUT_MISMATCH: &str = "Output mismatch";

/// Canonical form of captured or expected output.
///
/// Only blank lines are trimmed at the ends of the blob. This is not a
/// whole-string `trim()`: the first content line keeps its leading
/// indentation, so `"  42"` and `"42"` are different answers.
pub fn normalize_output(output: &str) -> String {
    let unified = output.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = unified.split('\n').map(str::trim_end).collect();

    let first = lines.iter().position(|line| !line.is_empty());
    let last = lines.iter().rposition(|line| !line.is_empty());

    match (first, last) {
        (Some(first), Some(last)) => lines[first..=last].join("\n"),
        _ => String::new(),
    }
}

/// Compare a normally-exited run's output to the expectation
pub fn matches(actual: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return true;
    }
    normalize_output(actual) == normalize_output(expected)
}

/// Grade one test case from its execution result
///
/// Priority: sandbox fault, then timeout, then runtime error, then output.
/// A run that exited nonzero fails even when its output matches.
pub fn evaluate_test(
    index: usize,
    test_case: &TestCase,
    execution: Result<ExecutionResult, SandboxError>,
) -> TestOutcome {
    let (status, actual_output, error) = match execution {
        Err(e) => (
            TestStatus::ExecutionFault,
            String::new(),
            Some(format!("Execution error: {}", e)),
        ),
        Ok(result) if result.timed_out => (
            TestStatus::TimeLimitExceeded,
            result.stdout,
            Some(EXECUTION_TIMEOUT.to_string()),
        ),
        Ok(result) if !result.exited_normally => {
            let error = runtime_error_message(&result);
            (TestStatus::RuntimeError, result.stdout, Some(error))
        }
        Ok(result) => {
            if matches(&result.stdout, &test_case.expected_output) {
                (TestStatus::Passed, result.stdout, None)
            } else {
                (
                    TestStatus::OutputMismatch,
                    result.stdout,
                    Some(OUTPUT_MISMATCH.to_string()),
                )
            }
        }
    };

    TestOutcome {
        index,
        description: test_case.description.clone(),
        input: test_case.input.clone(),
        expected_output: test_case.expected_output.clone(),
        actual_output,
        passed: status == TestStatus::Passed,
        status,
        error,
    }
}

/// Short learner-facing description of an abnormal exit
fn runtime_error_message(result: &ExecutionResult) -> String {
    let how = match (result.exit_code, result.signal) {
        (Some(code), _) => format!("exit code {}", code),
        (None, Some(signal)) => format!("killed by signal {}", signal),
        (None, None) => "abnormal termination".to_string(),
    };

    match result.stderr.lines().map(str::trim).find(|line| !line.is_empty()) {
        Some(first_line) => format!("Runtime error ({}): {}", how, first_line),
        None => format!("Runtime error ({})", how),
    }
}

/// Fold ordered outcomes into the final report
pub fn aggregate_results(outcomes: Vec<TestOutcome>) -> EvaluationReport {
    let total_count = outcomes.len();
    let passed_count = outcomes.iter().filter(|outcome| outcome.passed).count();
    let overall_correct = total_count > 0 && passed_count == total_count;
    let success_rate = if total_count > 0 {
        passed_count as f64 / total_count as f64
    } else {
        0.0
    };

    EvaluationReport {
        overall_correct,
        passed_count,
        total_count,
        success_rate,
        outcomes,
    }
}
