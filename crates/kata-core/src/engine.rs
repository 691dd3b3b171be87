//! The engine facade exposed to surrounding layers.
//!
//! Wires the safety gate, sandbox, grading and progress orchestration into
//! the four operations collaborators call: `check_safety`, `execute`,
//! `execute_and_format` and `submit_solution`. This is a library boundary,
//! not a network service; the web layer calls these directly.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::core_types::{ExecOptions, ExecutionResult};
use crate::errors::SubmitError;
use crate::format::{self, DisplayResult};
use crate::grading::{self, Verdict};
use crate::progress::{ProgressOrchestrator, ProgressTransition};
use crate::safety::{SafetyCheck, SafetyGate, SafetyViolation};
use crate::sandbox::Sandbox;
use crate::store::{EventSink, LessonStore, ProgressStore};

/// Verdict plus the progress transition it caused.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionOutcome {
    pub verdict: Verdict,
    pub transition: ProgressTransition,
}

pub struct Engine {
    config: EngineConfig,
    gate: SafetyGate,
    sandbox: Sandbox,
    orchestrator: ProgressOrchestrator,
    lessons: Arc<dyn LessonStore>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        lessons: Arc<dyn LessonStore>,
        progress: Arc<dyn ProgressStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let sandbox = Sandbox::new(&config);
        let orchestrator = ProgressOrchestrator::new(lessons.clone(), progress, events);
        Self {
            config,
            gate: SafetyGate::new(),
            sandbox,
            orchestrator,
            lessons,
        }
    }

    /// Sandbox dispatch counter; lets callers verify that rejected or
    /// denied submissions never executed.
    pub fn execution_count(&self) -> u64 {
        self.sandbox.execution_count()
    }

    /// The configured per-invocation resource envelope.
    pub fn default_options(&self) -> ExecOptions {
        self.config.exec_options()
    }

    pub fn check_safety(&self, source: &str) -> SafetyCheck {
        self.gate.check(source)
    }

    /// Gate then run. A deny-list rejection comes back as a
    /// `DangerousCode` result rather than an error, so callers get one
    /// uniform shape for everything a submission can do.
    pub async fn execute(&self, source: &str, options: &ExecOptions) -> ExecutionResult {
        match self.gate.check(source) {
            SafetyCheck::Reject(violation) => {
                ExecutionResult::failure(violation.to_classified(), String::new(), 0)
            }
            SafetyCheck::Ok => self.sandbox.run(source, options).await,
        }
    }

    /// Gate, run and project to display fields. Rejection is surfaced as
    /// `Err` here because there is nothing to display.
    pub async fn execute_and_format(
        &self,
        source: &str,
        options: &ExecOptions,
    ) -> Result<DisplayResult, SafetyViolation> {
        match self.gate.check(source) {
            SafetyCheck::Reject(violation) => Err(violation),
            SafetyCheck::Ok => {
                let result = self.sandbox.run(source, options).await;
                log::debug!("execution finished: {}", format::summary(&result));
                Ok(format::format(&result))
            }
        }
    }

    /// Full submission flow: lookup, access control, gate, sandbox,
    /// grading, persistence and event fan-out. Evaluation happens before
    /// any persistence call; the store is never held across execution.
    pub async fn submit_solution(
        &self,
        user_id: &str,
        lesson_id: &str,
        source: &str,
    ) -> Result<SubmissionOutcome, SubmitError> {
        let lesson = self
            .lessons
            .get_lesson(lesson_id)
            .await?
            .ok_or_else(|| SubmitError::LessonNotFound {
                lesson_id: lesson_id.to_string(),
            })?;

        self.orchestrator.ensure_reachable(user_id, &lesson).await?;

        let result = self.execute(source, &self.default_options()).await;
        let verdict = grading::evaluate(&lesson.grading_spec, lesson.difficulty, &result);
        log::info!(
            "user {} submitted to lesson {}: passed={} ({})",
            user_id,
            lesson.id,
            verdict.passed,
            format::summary(&result)
        );

        let transition = self
            .orchestrator
            .record_verdict(user_id, &lesson, source, &verdict)
            .await?;

        Ok(SubmissionOutcome {
            verdict,
            transition,
        })
    }
}
