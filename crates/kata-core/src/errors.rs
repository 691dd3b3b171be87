//! Engine-level error types.
//!
//! Submitted-code failures never appear here; those travel as
//! [`crate::core_types::ClassifiedError`] data. These errors cover the
//! orchestration boundary: lookups that miss, lessons the user has not
//! unlocked, and infrastructure faults from the stores.

use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug, Clone)]
pub enum SubmitError {
    #[error("lesson `{lesson_id}` not found")]
    LessonNotFound { lesson_id: String },
    #[error("lesson `{lesson_id}` is not reachable yet: complete the preceding lesson first")]
    AccessDenied { lesson_id: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_lesson() {
        let err = SubmitError::AccessDenied {
            lesson_id: "loops-2".into(),
        };
        assert!(err.to_string().contains("loops-2"));
        let err = SubmitError::LessonNotFound {
            lesson_id: "ghost".into(),
        };
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_store_errors_convert() {
        let err: SubmitError = StoreError::Unavailable("db down".into()).into();
        assert!(err.to_string().contains("db down"));
    }
}
