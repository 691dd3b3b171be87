//! Progress state machine and unlock orchestration.
//!
//! Per (user, lesson) the lifecycle is `not_started → in_progress →
//! completed`, with self-loops for repeated failures and for resubmission of
//! a completed lesson. Only a passing verdict moves a record to completed;
//! nothing ever moves one back. The attempts policy is uniform and explicit:
//! every submission increments `attempts`, including resubmissions of
//! completed lessons. Reachability is checked before any execution: a lesson
//! is reachable when it is first in sequence or its immediate predecessor is
//! completed.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::SubmitError;
use crate::grading::Verdict;
use crate::store::{
    EngineEvent, EventSink, Lesson, LessonStore, ProgressStatus, ProgressStore,
};

/// Identifying metadata of a lesson that just became reachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockedLesson {
    pub id: String,
    pub title: String,
}

/// What one submission did to the user's progress record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressTransition {
    pub status: ProgressStatus,
    pub attempts: u32,
    /// True only the first time this lesson moves to completed.
    pub newly_completed: bool,
    pub unlocked: Option<UnlockedLesson>,
}

pub struct ProgressOrchestrator {
    lessons: Arc<dyn LessonStore>,
    progress: Arc<dyn ProgressStore>,
    events: Arc<dyn EventSink>,
}

impl ProgressOrchestrator {
    pub fn new(
        lessons: Arc<dyn LessonStore>,
        progress: Arc<dyn ProgressStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            lessons,
            progress,
            events,
        }
    }

    /// Access control, enforced before the sandbox ever runs. A missing
    /// predecessor record (a gap in the authored sequence) does not lock the
    /// user out; only an incomplete predecessor does.
    pub async fn ensure_reachable(&self, user_id: &str, lesson: &Lesson) -> Result<(), SubmitError> {
        if lesson.order_index == 0 {
            return Ok(());
        }
        let predecessor = self
            .lessons
            .get_lesson_by_order(lesson.order_index - 1)
            .await?;
        let Some(predecessor) = predecessor else {
            return Ok(());
        };
        let completed = self
            .progress
            .get_progress(user_id, &predecessor.id)
            .await?
            .map(|state| state.is_completed())
            .unwrap_or(false);
        if completed {
            Ok(())
        } else {
            log::info!(
                "user {} denied access to lesson {} (predecessor {} incomplete)",
                user_id,
                lesson.id,
                predecessor.id
            );
            Err(SubmitError::AccessDenied {
                lesson_id: lesson.id.clone(),
            })
        }
    }

    /// Apply one graded submission to the progress record and emit domain
    /// events. Persistence is a single upsert call, so a store failure
    /// leaves the prior record untouched and no events are published.
    pub async fn record_verdict(
        &self,
        user_id: &str,
        lesson: &Lesson,
        source: &str,
        verdict: &Verdict,
    ) -> Result<ProgressTransition, SubmitError> {
        if !verdict.passed {
            let state = self
                .progress
                .upsert_attempt(user_id, &lesson.id, source)
                .await?;
            log::debug!(
                "user {} failed lesson {} (attempt {})",
                user_id,
                lesson.id,
                state.attempts
            );
            return Ok(ProgressTransition {
                status: state.status,
                attempts: state.attempts,
                newly_completed: false,
                unlocked: None,
            });
        }

        // The store decides under its own lock whether this pass was the
        // first completion, so two racing submissions cannot both claim it.
        let (state, newly_completed) = self
            .progress
            .upsert_completion(user_id, &lesson.id, source, Utc::now())
            .await?;

        let unlocked = if newly_completed {
            let next = self
                .lessons
                .get_lesson_by_order(lesson.order_index + 1)
                .await?;
            next.map(|next| UnlockedLesson {
                id: next.id,
                title: next.title,
            })
        } else {
            None
        };

        if newly_completed {
            log::info!(
                "user {} completed lesson {} after {} attempt(s)",
                user_id,
                lesson.id,
                state.attempts
            );
            self.events
                .publish(EngineEvent::LessonCompleted {
                    event_id: Uuid::new_v4(),
                    user_id: user_id.to_string(),
                    lesson_id: lesson.id.clone(),
                    lesson_title: lesson.title.clone(),
                    attempts: state.attempts,
                })
                .await;
            if let Some(next) = &unlocked {
                self.events
                    .publish(EngineEvent::LessonUnlocked {
                        event_id: Uuid::new_v4(),
                        user_id: user_id.to_string(),
                        lesson_id: next.id.clone(),
                        lesson_title: next.title.clone(),
                    })
                    .await;
            }
            let completed_count = self.progress.completed_count(user_id).await?;
            self.events
                .publish(EngineEvent::StatsUpdated {
                    event_id: Uuid::new_v4(),
                    user_id: user_id.to_string(),
                    completed_count,
                })
                .await;
        }

        Ok(ProgressTransition {
            status: state.status,
            attempts: state.attempts,
            newly_completed,
            unlocked,
        })
    }
}
