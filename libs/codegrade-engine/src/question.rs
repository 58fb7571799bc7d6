//! Question kinds and how a submission to each is judged.
//!
//! Only [`Question::CodingExercise`] touches the grading engine. When the
//! engine is unusable (`InternalError`) the exercise falls back to comparing
//! the submission with the reference solution as text, so the learner still
//! gets a verdict instead of an outage.

use crate::pool::GradingPool;
use codegrade_common::types::Evaluation;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Question {
    MultipleChoice {
        correct_option: String,
    },
    FillInBlank {
        accepted: Vec<String>,
    },
    CodingExercise {
        /// Serialized test case specification, see `testcase`
        #[serde(default)]
        test_cases: Option<String>,
        #[serde(default)]
        reference_solution: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub correct: bool,
    /// Engine result, present only for coding exercises the engine graded
    pub evaluation: Option<Evaluation>,
    pub used_fallback: bool,
}

impl Verdict {
    fn plain(correct: bool) -> Self {
        Self {
            correct,
            evaluation: None,
            used_fallback: false,
        }
    }
}

impl Question {
    pub fn kind(&self) -> &'static str {
        match self {
            Question::MultipleChoice { .. } => "multiple_choice",
            Question::FillInBlank { .. } => "fill_in_blank",
            Question::CodingExercise { .. } => "coding_exercise",
        }
    }

    pub async fn evaluate(&self, submission: &str, pool: &GradingPool) -> Verdict {
        match self {
            Question::MultipleChoice { correct_option } => {
                Verdict::plain(choice_matches(submission, correct_option))
            }
            Question::FillInBlank { accepted } => {
                let answer = submission.trim();
                Verdict::plain(accepted.iter().any(|a| a.trim().eq_ignore_ascii_case(answer)))
            }
            Question::CodingExercise {
                test_cases,
                reference_solution,
            } => match pool.evaluate(submission, test_cases.as_deref()).await {
                Ok(evaluation) => Verdict {
                    correct: evaluation.overall_correct(),
                    evaluation: Some(evaluation),
                    used_fallback: false,
                },
                Err(e) => {
                    warn!(error = %e, kind = e.kind(), "Grading engine unavailable, using pattern match");
                    let correct = reference_solution
                        .as_deref()
                        .map(|reference| pattern_match(submission, reference))
                        .unwrap_or(false);
                    info!(correct = correct, "Pattern match fallback verdict");
                    Verdict {
                        correct,
                        evaluation: None,
                        used_fallback: true,
                    }
                }
            },
        }
    }
}

/// Accepts either the option text or the labelled form "B. option text"
fn choice_matches(submission: &str, correct_option: &str) -> bool {
    let answer = submission.trim();
    let text = match answer.split_once(". ") {
        Some((_, rest)) if answer.len() > 2 => rest.trim(),
        _ => answer,
    };
    text.to_lowercase() == correct_option.trim().to_lowercase()
}

/// Text heuristic used when the engine cannot run: the submission matches
/// when it equals the reference solution once comments and whitespace are
/// removed. Empty programs never match.
pub fn pattern_match(submission: &str, reference: &str) -> bool {
    let submitted = squash(submission);
    !submitted.is_empty() && submitted == squash(reference)
}

/// Drop C comments and all whitespace outside string and character literals
fn squash(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            '"' | '\'' => {
                out.push(c);
                let mut escaped = false;
                for next in chars.by_ref() {
                    out.push(next);
                    if escaped {
                        escaped = false;
                    } else if next == '\\' {
                        escaped = true;
                    } else if next == c {
                        break;
                    }
                }
            }
            c if c.is_whitespace() => {}
            c => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompilationResult, Compiler};
    use crate::error::{EngineError, SandboxError};
    use crate::executor::Engine;
    use crate::sandbox::ProcessRunner;
    use crate::Artifact;
    use async_trait::async_trait;
    use codegrade_common::types::ExecutionResult;
    use std::io;
    use std::sync::Arc;

    const REFERENCE: &str = "#include <stdio.h>\nint main(void) {\n    printf(\"Hello, World!\\n\");\n    return 0;\n}\n";

    struct BrokenCompiler;

    #[async_trait]
    impl Compiler for BrokenCompiler {
        async fn compile(&self, _source: &str) -> Result<CompilationResult, EngineError> {
            Err(EngineError::Scratch(io::Error::new(io::ErrorKind::Other, "disk full")))
        }

        async fn probe(&self) -> Result<String, EngineError> {
            Err(EngineError::Internal("broken".to_string()))
        }
    }

    struct WorkingCompiler;

    #[async_trait]
    impl Compiler for WorkingCompiler {
        async fn compile(&self, _source: &str) -> Result<CompilationResult, EngineError> {
            let dir = tempfile::tempdir().unwrap();
            let executable = dir.path().join("main");
            Ok(CompilationResult::success(Artifact::new(dir, executable), 0))
        }

        async fn probe(&self) -> Result<String, EngineError> {
            Ok("working".to_string())
        }
    }

    struct HelloRunner;

    #[async_trait]
    impl ProcessRunner for HelloRunner {
        async fn run(&self, _artifact: &Artifact, _input: &str) -> Result<ExecutionResult, SandboxError> {
            Ok(ExecutionResult {
                exited_normally: true,
                stdout: "Hello, World!\n".to_string(),
                stderr: String::new(),
                timed_out: false,
                duration_ms: 1,
                exit_code: Some(0),
                signal: None,
            })
        }
    }

    fn pool_with(compiler: Arc<dyn Compiler>) -> GradingPool {
        GradingPool::new(Arc::new(Engine::new(compiler, Arc::new(HelloRunner))), 1)
    }

    fn exercise(reference: Option<&str>) -> Question {
        Question::CodingExercise {
            test_cases: Some(r#"[{"expected_output": "Hello, World!\n"}]"#.to_string()),
            reference_solution: reference.map(str::to_string),
        }
    }

    #[test]
    fn test_multiple_choice_accepts_labelled_and_plain_answers() {
        assert!(choice_matches("B. A pointer", "a pointer"));
        assert!(choice_matches("  a pointer ", "A pointer"));
        assert!(!choice_matches("C. An array", "A pointer"));
    }

    #[test]
    fn test_pattern_match_ignores_comments_and_layout() {
        let submission = "#include <stdio.h>\n// greet\nint main(void){ /* say it */ printf(\"Hello, World!\\n\"); return 0; }";
        assert!(pattern_match(submission, REFERENCE));
    }

    #[test]
    fn test_pattern_match_keeps_string_contents() {
        let a = "int main(void){ printf(\"a b\"); }";
        let b = "int main(void){ printf(\"ab\"); }";
        assert!(!pattern_match(a, b));

        let url = "int main(void){ puts(\"http://x\"); }";
        assert!(pattern_match(url, "int main(void) {\n  puts(\"http://x\");\n}"));
    }

    #[test]
    fn test_pattern_match_rejects_empty_submission() {
        assert!(!pattern_match("  // nothing\n", "// nothing"));
    }

    #[test]
    fn test_question_deserializes_from_tagged_json() {
        let question: Question = serde_json::from_str(
            r#"{"type": "fill_in_blank", "accepted": ["printf", "puts"]}"#,
        )
        .unwrap();
        assert_eq!(question.kind(), "fill_in_blank");

        let question: Question = serde_json::from_str(r#"{"type": "coding_exercise"}"#).unwrap();
        assert_eq!(
            question,
            Question::CodingExercise {
                test_cases: None,
                reference_solution: None
            }
        );
    }

    #[tokio::test]
    async fn test_fill_in_blank() {
        let pool = pool_with(Arc::new(WorkingCompiler));
        let question = Question::FillInBlank {
            accepted: vec!["printf".to_string(), "puts".to_string()],
        };

        assert!(question.evaluate(" PUTS ", &pool).await.correct);
        assert!(!question.evaluate("scanf", &pool).await.correct);
    }

    #[tokio::test]
    async fn test_coding_exercise_uses_engine() {
        let pool = pool_with(Arc::new(WorkingCompiler));
        let verdict = exercise(None).evaluate("int main(void){}", &pool).await;

        assert!(verdict.correct);
        assert!(!verdict.used_fallback);
        assert!(verdict.evaluation.unwrap().overall_correct());
    }

    #[tokio::test]
    async fn test_coding_exercise_falls_back_on_internal_error() {
        let pool = pool_with(Arc::new(BrokenCompiler));

        let verdict = exercise(Some(REFERENCE)).evaluate(REFERENCE, &pool).await;
        assert!(verdict.correct);
        assert!(verdict.used_fallback);
        assert!(verdict.evaluation.is_none());

        let verdict = exercise(Some(REFERENCE)).evaluate("int main(void){return 1;}", &pool).await;
        assert!(!verdict.correct);
        assert!(verdict.used_fallback);
    }

    #[tokio::test]
    async fn test_fallback_without_reference_is_incorrect() {
        let pool = pool_with(Arc::new(BrokenCompiler));
        let verdict = exercise(None).evaluate(REFERENCE, &pool).await;

        assert!(!verdict.correct);
        assert!(verdict.used_fallback);
    }
}
