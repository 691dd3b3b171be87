//! External collaborator interfaces: lesson content, progress persistence
//! and domain-event fan-out.
//!
//! The engine depends on these abstractions only; real backends (database,
//! web socket broadcast) live in surrounding layers. Events carry ids and
//! titles but never raw submitted source.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::grading::GradingSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

/// One lesson as authored. `order_index` defines the unlock sequence;
/// index 0 is always reachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    pub title: String,
    pub order_index: u32,
    pub grading_spec: GradingSpec,
    pub difficulty: Difficulty,
}

/// Per-(user, lesson) progress. `completed` never regresses and
/// `attempts` only increases; stores must uphold both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub status: ProgressStatus,
    pub attempts: u32,
    pub last_submitted_code: String,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl ProgressState {
    pub fn is_completed(&self) -> bool {
        self.status == ProgressStatus::Completed
    }
}

/// Infrastructure failures from persistence backends. These are the only
/// faults that propagate out of the engine as errors.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("conflicting concurrent write for key {key}")]
    WriteConflict { key: String },
}

#[async_trait]
pub trait LessonStore: Send + Sync {
    async fn get_lesson(&self, id: &str) -> Result<Option<Lesson>, StoreError>;
    async fn get_lesson_by_order(&self, order_index: u32) -> Result<Option<Lesson>, StoreError>;
}

/// Persistence for progress records, keyed uniquely by (user, lesson).
/// Both upserts are atomic per call: a failure leaves the prior record
/// intact. Implementations must serialize (or reject) concurrent writes to
/// the same key rather than silently overwrite.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get_progress(
        &self,
        user_id: &str,
        lesson_id: &str,
    ) -> Result<Option<ProgressState>, StoreError>;

    /// Record one failed (or in-progress) attempt: increments `attempts`,
    /// stores the submitted code, and moves `not_started` to `in_progress`
    /// without ever downgrading `completed`.
    async fn upsert_attempt(
        &self,
        user_id: &str,
        lesson_id: &str,
        code: &str,
    ) -> Result<ProgressState, StoreError>;

    /// Record one passing attempt: increments `attempts`, stores the code,
    /// marks the record completed, and sets `completed_at` only on the
    /// first completion. The returned flag is true iff *this call* moved the
    /// record to completed; it must be decided under the same lock as the
    /// write so two racing first-time passes cannot both claim it.
    async fn upsert_completion(
        &self,
        user_id: &str,
        lesson_id: &str,
        code: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(ProgressState, bool), StoreError>;

    /// Number of lessons the user has completed, for statistics events.
    async fn completed_count(&self, user_id: &str) -> Result<u32, StoreError>;
}

/// Domain events published to surrounding collaborators (broadcast layer,
/// statistics). Fire-and-forget: the engine does not await acknowledgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EngineEvent {
    LessonCompleted {
        event_id: Uuid,
        user_id: String,
        lesson_id: String,
        lesson_title: String,
        attempts: u32,
    },
    LessonUnlocked {
        event_id: Uuid,
        user_id: String,
        lesson_id: String,
        lesson_title: String,
    },
    StatsUpdated {
        event_id: Uuid,
        user_id: String,
        completed_count: u32,
    },
}

impl EngineEvent {
    /// Topic the event is published under.
    pub fn topic(&self) -> &'static str {
        match self {
            EngineEvent::LessonCompleted { .. } => "lesson_completed",
            EngineEvent::LessonUnlocked { .. } => "lesson_unlocked",
            EngineEvent::StatsUpdated { .. } => "stats_updated",
        }
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: EngineEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_topics() {
        let event = EngineEvent::LessonCompleted {
            event_id: Uuid::new_v4(),
            user_id: "u".into(),
            lesson_id: "l".into(),
            lesson_title: "t".into(),
            attempts: 1,
        };
        assert_eq!(event.topic(), "lesson_completed");
    }

    #[test]
    fn test_lesson_round_trips_through_json() {
        let lesson = Lesson {
            id: "l1".into(),
            title: "Numbers".into(),
            order_index: 0,
            grading_spec: GradingSpec::ExpectedOutput("4".into()),
            difficulty: Difficulty::Beginner,
        };
        let json = serde_json::to_string(&lesson).unwrap();
        let back: Lesson = serde_json::from_str(&json).unwrap();
        assert_eq!(back, lesson);
    }

    #[test]
    fn test_progress_completion_flag() {
        let state = ProgressState {
            status: ProgressStatus::Completed,
            attempts: 2,
            last_submitted_code: "1 + 1".into(),
            completed_at: Some(Utc::now()),
        };
        assert!(state.is_completed());
    }
}
