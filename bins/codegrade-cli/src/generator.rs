// Text generation: scaffolded files and human-readable reports

use anyhow::{Context, Result};
use codegrade_common::types::{Evaluation, TestStatus};
use codegrade_engine::testcase::simple_test_case_json;
use codegrade_engine::EngineConfig;
use std::fmt::Write;

pub const HELLO_WORLD_SOURCE: &str = r#"#include <stdio.h>

int main(void) {
    printf("Hello, World!\n");
    return 0;
}
"#;

/// config/engine.json with every default spelled out
pub fn default_config_json() -> Result<String> {
    serde_json::to_string_pretty(&EngineConfig::default()).context("Failed to serialize engine config")
}

pub fn hello_world_tests_json() -> String {
    simple_test_case_json("Hello, World!\n", "")
}

/// Summary printed by `run` when --json is not given
pub fn render_summary(evaluation: &Evaluation) -> String {
    let mut out = String::new();

    match evaluation {
        Evaluation::CompilationFailed(failure) => {
            let _ = writeln!(out, "❌ {}", failure.error);
            let _ = writeln!(out);
            for line in failure.compilation_error.lines() {
                let _ = writeln!(out, "    {}", line);
            }
            let _ = writeln!(out);
            let _ = writeln!(out, "Passed 0/{} test case(s)", failure.total_count);
        }
        Evaluation::Completed(report) => {
            for outcome in &report.outcomes {
                let mark = if outcome.passed { "✅" } else { "❌" };
                let _ = write!(out, "{} Test {}: {}", mark, outcome.index, outcome.description);
                match (&outcome.error, outcome.status) {
                    (_, TestStatus::Passed) => {}
                    (Some(error), _) => {
                        let _ = write!(out, " ({})", error);
                    }
                    (None, status) => {
                        let _ = write!(out, " ({})", status);
                    }
                }
                let _ = writeln!(out);

                if outcome.status == TestStatus::OutputMismatch {
                    let _ = writeln!(out, "    expected: {:?}", outcome.expected_output);
                    let _ = writeln!(out, "    actual:   {:?}", outcome.actual_output);
                }
            }
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "Passed {}/{} test case(s) ({:.0}%)",
                report.passed_count,
                report.total_count,
                report.success_rate * 100.0
            );
        }
    }

    let verdict = if evaluation.overall_correct() { "CORRECT" } else { "NOT CORRECT" };
    let _ = writeln!(out, "Verdict: {}", verdict);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegrade_common::types::{CompilationFailure, EvaluationReport, TestOutcome};
    use codegrade_engine::testcase::parse_test_cases;

    #[test]
    fn test_default_config_loads_back() {
        let json = default_config_json().unwrap();
        let config: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_hello_world_tests_parse() {
        let cases = parse_test_cases(Some(&hello_world_tests_json()));
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].expected_output, "Hello, World!\n");
    }

    #[test]
    fn test_summary_for_compile_failure() {
        let evaluation = Evaluation::CompilationFailed(CompilationFailure::new(
            "main.c:4:5: error: expected ';'",
            2,
        ));
        let text = render_summary(&evaluation);
        assert!(text.contains("Compilation failed"));
        assert!(text.contains("    main.c:4:5: error: expected ';'"));
        assert!(text.contains("Passed 0/2"));
        assert!(text.ends_with("Verdict: NOT CORRECT\n"));
    }

    #[test]
    fn test_summary_for_mismatch() {
        let evaluation = Evaluation::Completed(EvaluationReport {
            overall_correct: false,
            passed_count: 0,
            total_count: 1,
            success_rate: 0.0,
            outcomes: vec![TestOutcome {
                index: 1,
                description: "sum".to_string(),
                input: "1 2".to_string(),
                expected_output: "3".to_string(),
                actual_output: "4\n".to_string(),
                passed: false,
                status: TestStatus::OutputMismatch,
                error: Some("Output mismatch".to_string()),
            }],
        });
        let text = render_summary(&evaluation);
        assert!(text.contains("❌ Test 1: sum (Output mismatch)"));
        assert!(text.contains("actual:   \"4\\n\""));
        assert!(text.contains("Passed 0/1 test case(s) (0%)"));
    }
}
