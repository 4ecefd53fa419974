//! Job error types.

use std::time::Duration;

use thiserror::Error;

use autograd_core::CoreError;
use autograd_queue::QueueError;

use crate::usecase::{GradeError, UsecaseError};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("unable to get all due assignments: {0}")]
    DueAssignments(#[source] UsecaseError),

    #[error("unable to get unchecked submissions of assignment {assignment_id}: {source}")]
    UncheckedSubmissions {
        assignment_id: i64,
        #[source]
        source: UsecaseError,
    },

    #[error("unable to enqueue {job} {id}: {source}")]
    Enqueue {
        job: &'static str,
        id: i64,
        #[source]
        source: QueueError,
    },

    /// Grader failure, passed through untouched.
    #[error(transparent)]
    Grade(#[from] GradeError),

    #[error("invalid dispatch cursor: {0}")]
    InvalidCursor(#[source] CoreError),

    #[error("invalid job arguments: {0}")]
    Argument(#[source] QueueError),

    #[error("dispatch deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("dispatch cancelled")]
    Cancelled,

    #[error("dispatch task failed: {0}")]
    Task(String),
}
