//! In-memory reference implementations of the store interfaces.
//!
//! These double as the single-writer reference semantics (one mutex over the
//! progress map serializes concurrent writes to the same key) and as test
//! fixtures for the engine. Production deployments supply database-backed
//! implementations of the same traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::store::{
    EngineEvent, EventSink, Lesson, LessonStore, ProgressState, ProgressStatus, ProgressStore,
    StoreError,
};

/// Read-only lesson catalog held in memory.
#[derive(Debug, Default)]
pub struct InMemoryLessonStore {
    lessons: Vec<Lesson>,
}

impl InMemoryLessonStore {
    pub fn new(mut lessons: Vec<Lesson>) -> Self {
        lessons.sort_by_key(|lesson| lesson.order_index);
        Self { lessons }
    }
}

#[async_trait]
impl LessonStore for InMemoryLessonStore {
    async fn get_lesson(&self, id: &str) -> Result<Option<Lesson>, StoreError> {
        Ok(self.lessons.iter().find(|l| l.id == id).cloned())
    }

    async fn get_lesson_by_order(&self, order_index: u32) -> Result<Option<Lesson>, StoreError> {
        Ok(self
            .lessons
            .iter()
            .find(|l| l.order_index == order_index)
            .cloned())
    }
}

/// Progress records behind a single mutex: writes to any key are serialized,
/// so a double-submitting user cannot lose an update.
#[derive(Debug, Default)]
pub struct InMemoryProgressStore {
    records: Mutex<HashMap<(String, String), ProgressState>>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn get_progress(
        &self,
        user_id: &str,
        lesson_id: &str,
    ) -> Result<Option<ProgressState>, StoreError> {
        let records = self.records.lock().expect("progress store lock");
        Ok(records
            .get(&(user_id.to_string(), lesson_id.to_string()))
            .cloned())
    }

    async fn upsert_attempt(
        &self,
        user_id: &str,
        lesson_id: &str,
        code: &str,
    ) -> Result<ProgressState, StoreError> {
        let mut records = self.records.lock().expect("progress store lock");
        let entry = records
            .entry((user_id.to_string(), lesson_id.to_string()))
            .or_insert_with(|| ProgressState {
                status: ProgressStatus::NotStarted,
                attempts: 0,
                last_submitted_code: String::new(),
                completed_at: None,
            });
        entry.attempts += 1;
        entry.last_submitted_code = code.to_string();
        // A failed attempt never downgrades a completed lesson.
        if entry.status != ProgressStatus::Completed {
            entry.status = ProgressStatus::InProgress;
        }
        Ok(entry.clone())
    }

    async fn upsert_completion(
        &self,
        user_id: &str,
        lesson_id: &str,
        code: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(ProgressState, bool), StoreError> {
        let mut records = self.records.lock().expect("progress store lock");
        let entry = records
            .entry((user_id.to_string(), lesson_id.to_string()))
            .or_insert_with(|| ProgressState {
                status: ProgressStatus::NotStarted,
                attempts: 0,
                last_submitted_code: String::new(),
                completed_at: None,
            });
        let newly_completed = entry.status != ProgressStatus::Completed;
        entry.attempts += 1;
        entry.last_submitted_code = code.to_string();
        entry.status = ProgressStatus::Completed;
        // First completion wins; resubmissions keep the original timestamp.
        if entry.completed_at.is_none() {
            entry.completed_at = Some(completed_at);
        }
        Ok((entry.clone(), newly_completed))
    }

    async fn completed_count(&self, user_id: &str) -> Result<u32, StoreError> {
        let records = self.records.lock().expect("progress store lock");
        Ok(records
            .iter()
            .filter(|((user, _), state)| user == user_id && state.is_completed())
            .count() as u32)
    }
}

/// Collects published events; the test probe for fan-out behavior.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().expect("event sink lock").clone()
    }

    pub fn topics(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.topic()).collect()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(&self, event: EngineEvent) {
        self.events.lock().expect("event sink lock").push(event);
    }
}

/// Drops events after logging them; for deployments without a broadcast
/// layer wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn publish(&self, event: EngineEvent) {
        log::debug!("discarding event on topic {}: {:?}", event.topic(), event);
    }
}
