//! Collaborator interfaces consulted by the grading jobs.
//!
//! Persistence and grading live outside this crate; the jobs only see these
//! narrow traits.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use autograd_core::{AssignmentId, Cursor, SubmissionId};

/// Failure reported by an assignment or submission lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsecaseError {
    #[error("database error: {0}")]
    Database(String),

    #[error("{0}")]
    Other(String),
}

/// Failure reported by the grader for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GradeError {
    #[error("submission {0} not found")]
    SubmissionNotFound(SubmissionId),

    #[error("grading submission {submission_id} failed: {reason}")]
    Failed {
        submission_id: SubmissionId,
        reason: String,
    },
}

#[async_trait]
pub trait AssignmentUsecase: Send + Sync {
    /// IDs of assignments past their due date at the cursor's page, plus the
    /// total number of due assignments.
    async fn find_all_due_dates(
        &self,
        cursor: &Cursor,
    ) -> Result<(Vec<AssignmentId>, i64), UsecaseError>;
}

#[async_trait]
pub trait SubmissionUsecase: Send + Sync {
    /// IDs of ungraded submissions under `assignment_id`, plus their count.
    async fn find_all_uncheck_by_assignment_id(
        &self,
        assignment_id: AssignmentId,
    ) -> Result<(Vec<SubmissionId>, i64), UsecaseError>;
}

#[async_trait]
pub trait Grader: Send + Sync {
    async fn grade_submission(&self, submission_id: SubmissionId) -> Result<(), GradeError>;
}

#[async_trait]
impl<T: AssignmentUsecase + ?Sized> AssignmentUsecase for Arc<T> {
    async fn find_all_due_dates(
        &self,
        cursor: &Cursor,
    ) -> Result<(Vec<AssignmentId>, i64), UsecaseError> {
        (**self).find_all_due_dates(cursor).await
    }
}

#[async_trait]
impl<T: SubmissionUsecase + ?Sized> SubmissionUsecase for Arc<T> {
    async fn find_all_uncheck_by_assignment_id(
        &self,
        assignment_id: AssignmentId,
    ) -> Result<(Vec<SubmissionId>, i64), UsecaseError> {
        (**self).find_all_uncheck_by_assignment_id(assignment_id).await
    }
}

#[async_trait]
impl<T: Grader + ?Sized> Grader for Arc<T> {
    async fn grade_submission(&self, submission_id: SubmissionId) -> Result<(), GradeError> {
        (**self).grade_submission(submission_id).await
    }
}
