//! The grading job cascade.
//!
//! ```text
//! check_due_assignment ──▶ grade_assignment{assignmentID} ──▶ grade_submission{submissionID}
//!   (cron, no args)          one per due assignment              one per unchecked submission
//! ```
//!
//! Every hop uses a unique enqueue, so re-triggering while earlier jobs are
//! still pending never duplicates work.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use autograd_core::config::WorkerConfig;
use autograd_core::{AssignmentId, SubmissionId};
use autograd_queue::{Enqueuer, Job, JobArgs, JobBackend, PoolConfig, QueueError, WorkerPool};

use crate::error::JobError;
use crate::pipeline::{DispatchPipeline, DispatchSummary, PipelineConfig};
use crate::usecase::{AssignmentUsecase, Grader, SubmissionUsecase};

// job names
pub const CHECK_DUE_ASSIGNMENTS: &str = "check_due_assignment";
pub const GRADE_ASSIGNMENT: &str = "grade_assignment";
pub const GRADE_SUBMISSION: &str = "grade_submission";

// argument keys
pub const ASSIGNMENT_ID_ARG: &str = "assignmentID";
pub const SUBMISSION_ID_ARG: &str = "submissionID";

/// Handlers for the three grading jobs. Stateless between invocations, so a
/// single instance serves every worker concurrently.
pub struct JobHandler {
    enqueuer: Arc<dyn Enqueuer>,
    grader: Arc<dyn Grader>,
    submissions: Arc<dyn SubmissionUsecase>,
    assignments: Arc<dyn AssignmentUsecase>,
    pipeline: PipelineConfig,
    pipeline_timeout: Duration,
}

impl JobHandler {
    pub fn new(
        enqueuer: Arc<dyn Enqueuer>,
        grader: Arc<dyn Grader>,
        submissions: Arc<dyn SubmissionUsecase>,
        assignments: Arc<dyn AssignmentUsecase>,
    ) -> Self {
        Self {
            enqueuer,
            grader,
            submissions,
            assignments,
            pipeline: PipelineConfig::default(),
            pipeline_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_pipeline(mut self, config: PipelineConfig, timeout: Duration) -> Self {
        self.pipeline = config;
        self.pipeline_timeout = timeout;
        self
    }

    pub fn with_worker_config(self, config: &WorkerConfig) -> Self {
        self.with_pipeline(PipelineConfig::from(config), config.pipeline_timeout())
    }

    /// Find every assignment past its due date and fan out one
    /// GradeAssignment job per assignment.
    pub async fn check_due_assignments(&self, _job: &Job) -> Result<DispatchSummary, JobError> {
        let pipeline = DispatchPipeline::new(
            self.assignments.clone(),
            self.enqueuer.clone(),
            self.pipeline.clone(),
        );
        pipeline.run(self.pipeline_timeout).await
    }

    /// Fan out one GradeSubmission job per unchecked submission.
    ///
    /// Stops at the first enqueue failure. Submissions enqueued before it stay
    /// enqueued, and their pending uniqueness makes a retry of this job skip them.
    pub async fn grade_assignment(&self, job: &Job) -> Result<usize, JobError> {
        let assignment_id: AssignmentId =
            job.arg_i64(ASSIGNMENT_ID_ARG).map_err(JobError::Argument)?;

        let (ids, total) = self
            .submissions
            .find_all_uncheck_by_assignment_id(assignment_id)
            .await
            .map_err(|source| JobError::UncheckedSubmissions {
                assignment_id,
                source,
            })?;

        debug!(assignment_id, count = ids.len(), total, "unchecked submissions found");

        let mut enqueued = 0;
        for id in ids {
            let args = JobArgs::new().with(SUBMISSION_ID_ARG, id);
            match self.enqueuer.enqueue_unique(GRADE_SUBMISSION, args).await {
                Ok(Some(_)) => enqueued += 1,
                Ok(None) => debug!(submission_id = id, "grade submission already pending"),
                Err(source) => {
                    error!(assignment_id, submission_id = id, error = %source, "unable to enqueue grade submission");
                    return Err(JobError::Enqueue {
                        job: GRADE_SUBMISSION,
                        id,
                        source,
                    });
                }
            }
        }

        info!(assignment_id, enqueued, "assignment fanned out");
        Ok(enqueued)
    }

    /// Grade exactly one submission. Grader failures are returned as-is.
    pub async fn grade_submission(&self, job: &Job) -> Result<(), JobError> {
        let submission_id: SubmissionId =
            job.arg_i64(SUBMISSION_ID_ARG).map_err(JobError::Argument)?;
        self.grader.grade_submission(submission_id).await?;
        debug!(submission_id, "submission graded");
        Ok(())
    }

    /// Register the three handlers on `pool`, plus the cron trigger for
    /// CheckDueAssignments.
    pub fn register(self: Arc<Self>, pool: &mut WorkerPool, cron: &str) -> Result<(), QueueError> {
        let handler = self.clone();
        pool.register(CHECK_DUE_ASSIGNMENTS, move |job: Job| {
            let handler = handler.clone();
            async move { handler.check_due_assignments(&job).await.map(|_| ()) }
        });

        let handler = self.clone();
        pool.register(GRADE_ASSIGNMENT, move |job: Job| {
            let handler = handler.clone();
            async move { handler.grade_assignment(&job).await.map(|_| ()) }
        });

        let handler = self;
        pool.register(GRADE_SUBMISSION, move |job: Job| {
            let handler = handler.clone();
            async move { handler.grade_submission(&job).await }
        });

        pool.periodically_enqueue(cron, CHECK_DUE_ASSIGNMENTS)?;
        Ok(())
    }
}

/// Pool settings and cascade wiring taken from the worker config.
pub fn build_pool(
    backend: Arc<dyn JobBackend>,
    handler: Arc<JobHandler>,
    config: &WorkerConfig,
) -> Result<WorkerPool, QueueError> {
    let mut pool = WorkerPool::new(
        backend,
        PoolConfig {
            concurrency: config.concurrency,
            max_fails: config.max_fails,
            ..PoolConfig::default()
        },
    );
    handler.register(&mut pool, &config.check_due_cron)?;
    Ok(pool)
}
