//! Sandboxed execution and solution-evaluation engine for the kata
//! learning platform.
//!
//! Learners submit arbitrary snippets that must run against a grading rubric
//! without harming the host, other learners, or the server. This crate is
//! that engine: a static safety gate, a bounded-time bounded-memory sandbox
//! built around an embedded capability-closed interpreter, a display
//! formatter, a grading layer, and the progress/unlock orchestration.
//!
//! # Architecture Overview
//!
//! - **Safety gate**: data-driven deny-list scan of raw source before any
//!   execution is attempted
//! - **Sandbox**: one isolated worker per invocation, raced against a
//!   wall-clock timeout, with memory/output/call-depth budgets enforced
//!   inside the evaluator
//! - **Formatter**: pure projection of raw results into display fields
//! - **Grading**: expected-output, test-case, and pass-on-success specs
//! - **Progress orchestration**: reachability checks, the completion state
//!   machine, and domain-event fan-out to surrounding collaborators
//!
//! Isolation is language-level plus hard resource ceilings, an explicit
//! trade-off documented in the sandbox module; it is not an OS-level
//! boundary against a determined attacker.

pub mod config;
pub mod core_types;
pub mod engine;
pub mod errors;
pub mod format;
pub mod grading;
pub mod interp;
pub mod memstore;
pub mod progress;
pub mod safety;
pub mod sandbox;
pub mod store;

pub use config::EngineConfig;
pub use core_types::{ClassifiedError, ErrorCategory, ExecOptions, ExecutionResult};
pub use engine::{Engine, SubmissionOutcome};
pub use errors::SubmitError;
pub use format::DisplayResult;
pub use grading::{evaluate, GradingSpec, TestExpectations, Verdict};
pub use interp::Value;
pub use progress::{ProgressOrchestrator, ProgressTransition, UnlockedLesson};
pub use safety::{SafetyCheck, SafetyGate, SafetyViolation};
pub use sandbox::Sandbox;
pub use store::{
    Difficulty, EngineEvent, EventSink, Lesson, LessonStore, ProgressState, ProgressStatus,
    ProgressStore, StoreError,
};

#[cfg(test)]
mod submission_flow_test;
