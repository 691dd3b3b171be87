//! Core type definitions for the execution engine
//!
//! This module defines the fundamental data structures shared by the sandbox,
//! the formatter and the grading layer. The central design decision is that
//! failures of submitted code are *data*, never errors of the engine itself:
//! every fault a snippet can produce is captured as a [`ClassifiedError`] and
//! carried inside an [`ExecutionResult`], so callers only ever deal with
//! infrastructure errors through `Result`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::interp::Value;

/// Classification of everything that can go wrong with a submitted snippet.
///
/// The category drives user messaging and retry policy; the grading layer
/// never fabricates a pass when any of these is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Syntax,
    Compile,
    Arithmetic,
    Argument,
    UndefinedOperation,
    FunctionMismatch,
    Timeout,
    ResourceExceeded,
    DangerousCode,
    UnknownRuntime,
}

impl ErrorCategory {
    /// Short human-readable label used in feedback and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::Syntax => "syntax error",
            ErrorCategory::Compile => "compile error",
            ErrorCategory::Arithmetic => "arithmetic error",
            ErrorCategory::Argument => "argument error",
            ErrorCategory::UndefinedOperation => "undefined operation",
            ErrorCategory::FunctionMismatch => "function mismatch",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::ResourceExceeded => "resource limit exceeded",
            ErrorCategory::DangerousCode => "dangerous code",
            ErrorCategory::UnknownRuntime => "runtime error",
        }
    }
}

/// A classified failure produced by the safety gate, the sandbox or the
/// interpreter. `category` is machine-facing, `message` is the raw detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ClassifiedError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    /// Distinct, human-readable message per category. Timeout and resource
    /// cases suggest the likely cause instead of echoing a bare trace.
    pub fn user_message(&self) -> String {
        match self.category {
            ErrorCategory::Timeout => format!(
                "Your code did not finish in time ({}). A common cause is a loop that never terminates.",
                self.message
            ),
            ErrorCategory::ResourceExceeded => format!(
                "Your code exceeded its resource budget ({}). Check for unbounded allocation, runaway recursion, or excessive output.",
                self.message
            ),
            ErrorCategory::DangerousCode => format!(
                "Submission rejected before execution: {}.",
                self.message
            ),
            ErrorCategory::UnknownRuntime => format!(
                "Your code failed with an unexpected runtime error: {}.",
                self.message
            ),
            _ => format!("{}: {}", capitalize(self.category.label()), self.message),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Outcome of one sandbox invocation. Exactly one of `value` (success) or
/// `error` (failure) is meaningfully populated; `output` may be non-empty in
/// either case because a snippet can print before it faults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub value: Option<Value>,
    pub output: String,
    pub error: Option<ClassifiedError>,
    pub elapsed_ms: u64,
}

impl ExecutionResult {
    pub fn success(value: Option<Value>, output: String, elapsed_ms: u64) -> Self {
        Self {
            value,
            output,
            error: None,
            elapsed_ms,
        }
    }

    pub fn failure(error: ClassifiedError, output: String, elapsed_ms: u64) -> Self {
        Self {
            value: None,
            output,
            error: Some(error),
            elapsed_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-invocation resource envelope for the sandbox.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    pub timeout: Duration,
    pub memory_ceiling_bytes: usize,
    pub capture_output: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5_000),
            memory_ceiling_bytes: 48 * 1024 * 1024,
            capture_output: true,
        }
    }
}
