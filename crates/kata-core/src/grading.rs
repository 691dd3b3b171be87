//! Pass/fail judgment of execution results against a lesson's grading spec.
//!
//! Decision order: an execution error always fails; then the spec's single
//! mode applies. Feedback is templated presentation convenience scaled by
//! lesson difficulty; it never influences `passed`.

use serde::{Deserialize, Serialize};

use crate::core_types::{ClassifiedError, ErrorCategory, ExecutionResult};
use crate::store::Difficulty;

/// How a lesson judges a submission. The three modes are mutually
/// exclusive and fixed at authoring time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradingSpec {
    /// Pass iff the submission's textual result equals this string.
    ExpectedOutput(String),
    /// Structured expectations; an expected value takes precedence over an
    /// expected output, and no expectations at all is an automatic pass.
    TestCase(TestExpectations),
    /// Any non-error execution passes.
    None,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TestExpectations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Outcome of grading one submission. Produced fresh per submission and
/// never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    pub actual_output: Option<String>,
    pub expected_output: Option<String>,
    pub error: Option<ClassifiedError>,
    pub feedback: String,
}

/// Judge a result against a grading spec.
pub fn evaluate(spec: &GradingSpec, difficulty: Difficulty, result: &ExecutionResult) -> Verdict {
    if let Some(error) = &result.error {
        return Verdict {
            passed: false,
            actual_output: None,
            expected_output: expected_of(spec),
            error: Some(error.clone()),
            feedback: error_feedback(error, difficulty),
        };
    }

    match spec {
        GradingSpec::ExpectedOutput(expected) => {
            let actual = actual_text(result);
            let expected = expected.trim().to_string();
            let passed = actual == expected;
            Verdict {
                passed,
                feedback: if passed {
                    success_feedback(difficulty)
                } else {
                    mismatch_feedback(&expected, &actual, difficulty)
                },
                actual_output: Some(actual),
                expected_output: Some(expected),
                error: None,
            }
        }
        GradingSpec::TestCase(expectations) => {
            if let Some(expected) = &expectations.value {
                let actual = result
                    .value
                    .as_ref()
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                let expected = expected.trim().to_string();
                let passed = actual == expected;
                Verdict {
                    passed,
                    feedback: if passed {
                        success_feedback(difficulty)
                    } else {
                        mismatch_feedback(&expected, &actual, difficulty)
                    },
                    actual_output: Some(actual),
                    expected_output: Some(expected),
                    error: None,
                }
            } else if let Some(expected) = &expectations.output {
                let actual = result.output.trim().to_string();
                let expected = expected.trim().to_string();
                let passed = actual == expected;
                Verdict {
                    passed,
                    feedback: if passed {
                        success_feedback(difficulty)
                    } else {
                        mismatch_feedback(&expected, &actual, difficulty)
                    },
                    actual_output: Some(actual),
                    expected_output: Some(expected),
                    error: None,
                }
            } else {
                // No expectations authored: automatic pass.
                Verdict {
                    passed: true,
                    actual_output: None,
                    expected_output: None,
                    error: None,
                    feedback: success_feedback(difficulty),
                }
            }
        }
        GradingSpec::None => Verdict {
            passed: true,
            actual_output: None,
            expected_output: None,
            error: None,
            feedback: success_feedback(difficulty),
        },
    }
}

/// The submission's textual result for output comparison: captured output
/// when present, otherwise the plain rendering of the returned value.
fn actual_text(result: &ExecutionResult) -> String {
    let trimmed = result.output.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    result
        .value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_default()
}

fn expected_of(spec: &GradingSpec) -> Option<String> {
    match spec {
        GradingSpec::ExpectedOutput(expected) => Some(expected.trim().to_string()),
        GradingSpec::TestCase(expectations) => expectations
            .value
            .as_ref()
            .or(expectations.output.as_ref())
            .map(|s| s.trim().to_string()),
        GradingSpec::None => None,
    }
}

fn success_feedback(difficulty: Difficulty) -> String {
    match difficulty {
        Difficulty::Beginner => "Correct! Nice work.".to_string(),
        Difficulty::Intermediate => "Correct! All checks passed.".to_string(),
        Difficulty::Advanced => {
            "Correct! All checks passed. Well done on a tough one.".to_string()
        }
    }
}

fn mismatch_feedback(expected: &str, actual: &str, difficulty: Difficulty) -> String {
    let mut feedback = format!(
        "Not quite: expected `{}` but got `{}`.",
        expected, actual
    );
    if difficulty == Difficulty::Beginner {
        feedback.push_str(" Compare your result character by character with the expected text.");
    }
    feedback
}

fn error_feedback(error: &ClassifiedError, difficulty: Difficulty) -> String {
    let mut feedback = format!("Your submission failed with a {}.", error.category.label());
    if difficulty == Difficulty::Beginner {
        let hint = match error.category {
            ErrorCategory::Syntax => Some("Check for unbalanced brackets or incomplete lines."),
            ErrorCategory::Arithmetic => Some("Watch out for division by zero."),
            ErrorCategory::Timeout => Some("Make sure every loop can finish."),
            ErrorCategory::ResourceExceeded => {
                Some("Try a smaller input or less output.")
            }
            _ => None,
        };
        if let Some(hint) = hint {
            feedback.push(' ');
            feedback.push_str(hint);
        }
    }
    feedback
}
