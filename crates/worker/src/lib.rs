//! Due-assignment discovery and the grading job cascade.
//!
//! - [`source`] pages through assignments past their due date.
//! - [`pipeline`] streams those pages into GradeAssignment jobs under a deadline.
//! - [`jobs`] holds the three job handlers and their worker-pool wiring.
//! - [`usecase`] declares the collaborators the handlers consult.
//! - `runner` (feature `queue-redis`, on by default) runs the pool over Redis.

pub mod error;
pub mod jobs;
pub mod pipeline;
#[cfg(feature = "queue-redis")]
pub mod runner;
pub mod source;
pub mod usecase;

pub use error::JobError;
pub use jobs::{
    build_pool, JobHandler, ASSIGNMENT_ID_ARG, CHECK_DUE_ASSIGNMENTS, GRADE_ASSIGNMENT,
    GRADE_SUBMISSION, SUBMISSION_ID_ARG,
};
pub use pipeline::{DispatchPipeline, DispatchSummary, PipelineConfig};
#[cfg(feature = "queue-redis")]
pub use runner::{run_redis_worker, Collaborators};
pub use source::PagedAssignmentSource;
pub use usecase::{AssignmentUsecase, GradeError, Grader, SubmissionUsecase, UsecaseError};
