//! End-to-end submission flow tests through the engine facade.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::core_types::ErrorCategory;
use crate::engine::Engine;
use crate::errors::SubmitError;
use crate::grading::{GradingSpec, TestExpectations};
use crate::memstore::{InMemoryLessonStore, InMemoryProgressStore, RecordingEventSink};
use crate::safety::SafetyCheck;
use crate::store::{Difficulty, Lesson, ProgressStatus};

fn catalog() -> Vec<Lesson> {
    vec![
        Lesson {
            id: "arith-1".into(),
            title: "Adding numbers".into(),
            order_index: 0,
            grading_spec: GradingSpec::ExpectedOutput("4".into()),
            difficulty: Difficulty::Beginner,
        },
        Lesson {
            id: "output-1".into(),
            title: "Printing text".into(),
            order_index: 1,
            grading_spec: GradingSpec::TestCase(TestExpectations {
                value: None,
                output: Some("Hello".into()),
            }),
            difficulty: Difficulty::Intermediate,
        },
        Lesson {
            id: "free-1".into(),
            title: "Playground".into(),
            order_index: 2,
            grading_spec: GradingSpec::None,
            difficulty: Difficulty::Advanced,
        },
    ]
}

struct Fixture {
    engine: Engine,
    events: Arc<RecordingEventSink>,
}

fn fixture() -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let events = Arc::new(RecordingEventSink::new());
    let engine = Engine::new(
        EngineConfig::default(),
        Arc::new(InMemoryLessonStore::new(catalog())),
        Arc::new(InMemoryProgressStore::new()),
        events.clone(),
    );
    Fixture { engine, events }
}

#[tokio::test]
async fn test_passing_submission_completes_and_unlocks() {
    let fx = fixture();
    let outcome = fx
        .engine
        .submit_solution("ada", "arith-1", "2 + 2")
        .await
        .unwrap();

    assert!(outcome.verdict.passed);
    assert_eq!(outcome.verdict.actual_output.as_deref(), Some("4"));
    assert_eq!(outcome.transition.status, ProgressStatus::Completed);
    assert!(outcome.transition.newly_completed);
    assert_eq!(outcome.transition.unlocked.as_ref().unwrap().id, "output-1");
    assert_eq!(
        fx.events.topics(),
        vec!["lesson_completed", "lesson_unlocked", "stats_updated"]
    );
}

#[tokio::test]
async fn test_failing_submission_reports_mismatch() {
    let fx = fixture();
    let outcome = fx
        .engine
        .submit_solution("ada", "arith-1", "2 + 3")
        .await
        .unwrap();

    assert!(!outcome.verdict.passed);
    assert_eq!(outcome.verdict.actual_output.as_deref(), Some("5"));
    assert_eq!(outcome.verdict.expected_output.as_deref(), Some("4"));
    assert_eq!(outcome.transition.status, ProgressStatus::InProgress);
    assert!(fx.events.events().is_empty());
}

#[tokio::test]
async fn test_unreachable_lesson_never_executes() {
    let fx = fixture();
    let denied = fx.engine.submit_solution("ada", "output-1", "1 + 1").await;
    assert!(matches!(denied, Err(SubmitError::AccessDenied { .. })));
    assert_eq!(fx.engine.execution_count(), 0);
    assert!(fx.events.events().is_empty());
}

#[tokio::test]
async fn test_unknown_lesson_is_not_found() {
    let fx = fixture();
    let missing = fx.engine.submit_solution("ada", "ghost", "1").await;
    assert!(matches!(missing, Err(SubmitError::LessonNotFound { .. })));
    assert_eq!(fx.engine.execution_count(), 0);
}

#[tokio::test]
async fn test_progression_through_the_catalog() -> anyhow::Result<()> {
    let fx = fixture();
    fx.engine.submit_solution("ada", "arith-1", "2 + 2").await?;
    let outcome = fx
        .engine
        .submit_solution("ada", "output-1", "output(\"Hello\")")
        .await?;
    assert!(outcome.verdict.passed);
    assert_eq!(outcome.transition.unlocked.as_ref().unwrap().id, "free-1");

    // The playground accepts any clean execution.
    let outcome = fx
        .engine
        .submit_solution("ada", "free-1", "let x = [1, 2]\nlen(x)")
        .await?;
    assert!(outcome.verdict.passed);
    assert!(outcome.transition.unlocked.is_none());
    Ok(())
}

#[tokio::test]
async fn test_dangerous_submission_fails_without_executing() {
    let fx = fixture();
    let outcome = fx
        .engine
        .submit_solution("ada", "arith-1", "read_file(\"/etc/passwd\")")
        .await
        .unwrap();

    assert!(!outcome.verdict.passed);
    let error = outcome.verdict.error.unwrap();
    assert_eq!(error.category, ErrorCategory::DangerousCode);
    assert_eq!(fx.engine.execution_count(), 0);
    // The failed attempt is still recorded.
    assert_eq!(outcome.transition.attempts, 1);
}

#[tokio::test]
async fn test_resubmission_keeps_completion_and_counts_attempt() {
    let fx = fixture();
    let first = fx
        .engine
        .submit_solution("ada", "arith-1", "2 + 2")
        .await
        .unwrap();
    let second = fx
        .engine
        .submit_solution("ada", "arith-1", "1 + 3")
        .await
        .unwrap();

    assert!(first.transition.newly_completed);
    assert!(!second.transition.newly_completed);
    assert_eq!(second.transition.status, ProgressStatus::Completed);
    assert_eq!(second.transition.attempts, 2);
    // Fan-out happened once, for the first completion only.
    assert_eq!(
        fx.events
            .topics()
            .iter()
            .filter(|t| *t == &"lesson_completed")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_runtime_fault_produces_failing_verdict() {
    let fx = fixture();
    let outcome = fx
        .engine
        .submit_solution("ada", "arith-1", "output(\"Hello\")\n1 / 0")
        .await
        .unwrap();

    assert!(!outcome.verdict.passed);
    let error = outcome.verdict.error.unwrap();
    assert_eq!(error.category, ErrorCategory::Arithmetic);
    assert!(outcome.verdict.feedback.contains("arithmetic error"));
}

#[tokio::test]
async fn test_execute_and_format_round_trip() {
    let fx = fixture();
    let display = fx
        .engine
        .execute_and_format("output(\"hi\")\n[1, 2, 3]", &fx.engine.default_options())
        .await
        .unwrap();
    assert!(display.success);
    assert_eq!(display.value_text, "[1, 2, 3]");
    assert_eq!(display.output_text.as_deref(), Some("hi"));
    assert!(display.error_text.is_none());

    let rejected = fx
        .engine
        .execute_and_format("eval(code)", &fx.engine.default_options())
        .await;
    assert!(rejected.is_err());
}

#[tokio::test]
async fn test_check_safety_is_exposed() {
    let fx = fixture();
    assert!(fx.engine.check_safety("1 + 1").is_ok());
    assert!(matches!(
        fx.engine.check_safety("spawn(worker)"),
        SafetyCheck::Reject(_)
    ));
}

#[tokio::test]
async fn test_users_progress_independently() {
    let fx = fixture();
    fx.engine
        .submit_solution("ada", "arith-1", "2 + 2")
        .await
        .unwrap();

    // Another user has not completed lesson one yet.
    let denied = fx.engine.submit_solution("grace", "output-1", "1").await;
    assert!(matches!(denied, Err(SubmitError::AccessDenied { .. })));
}
