//! Redis-backed worker process wiring (requires the `queue-redis` feature).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use autograd_core::Config;
use autograd_queue::{Enqueuer, JobBackend, QueueError, RedisQueue};

use crate::jobs::{build_pool, JobHandler};
use crate::usecase::{AssignmentUsecase, Grader, SubmissionUsecase};

/// The persistence and grading side a worker process plugs in.
#[derive(Clone)]
pub struct Collaborators {
    pub grader: Arc<dyn Grader>,
    pub submissions: Arc<dyn SubmissionUsecase>,
    pub assignments: Arc<dyn AssignmentUsecase>,
}

/// Connect to `config.redis`, run the grading pool until `shutdown` fires,
/// and return once in-flight jobs have finished.
pub async fn run_redis_worker(
    config: &Config,
    collaborators: Collaborators,
    shutdown: CancellationToken,
) -> Result<(), QueueError> {
    let queue = Arc::new(
        RedisQueue::connect(
            &config.redis.url,
            config.redis.namespace.clone(),
            config.redis.worker_id.clone(),
        )
        .await?,
    );

    let enqueuer: Arc<dyn Enqueuer> = queue.clone();
    let handler = Arc::new(
        JobHandler::new(
            enqueuer,
            collaborators.grader,
            collaborators.submissions,
            collaborators.assignments,
        )
        .with_worker_config(&config.worker),
    );

    let backend: Arc<dyn JobBackend> = queue;
    let pool = build_pool(backend, handler, &config.worker)?;

    info!(
        namespace = %config.redis.namespace,
        worker_id = %config.redis.worker_id,
        "grading worker starting"
    );
    pool.run(shutdown).await;
    info!("grading worker stopped");
    Ok(())
}
