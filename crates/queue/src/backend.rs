//! Enqueue and backend traits.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::QueueError;
use crate::job::{Job, JobArgs};

/// Producer side of the job queue.
#[async_trait]
pub trait Enqueuer: Send + Sync {
    /// Enqueue a job unconditionally.
    async fn enqueue(&self, name: &str, args: JobArgs) -> Result<Job, QueueError>;

    /// Enqueue a job unless one with the same name and arguments is still
    /// pending. Returns `None` for the duplicate case.
    async fn enqueue_unique(&self, name: &str, args: JobArgs) -> Result<Option<Job>, QueueError>;
}

/// Blanket implementation so `Arc<dyn Enqueuer>` can be used directly.
#[async_trait]
impl<T: Enqueuer + ?Sized> Enqueuer for Arc<T> {
    async fn enqueue(&self, name: &str, args: JobArgs) -> Result<Job, QueueError> {
        (**self).enqueue(name, args).await
    }

    async fn enqueue_unique(&self, name: &str, args: JobArgs) -> Result<Option<Job>, QueueError> {
        (**self).enqueue_unique(name, args).await
    }
}

/// Storage a [`WorkerPool`](crate::pool::WorkerPool) pulls jobs from.
#[async_trait]
pub trait JobBackend: Enqueuer {
    /// Take the next pending job among `names`, or `None` if all are empty.
    async fn dequeue(&self, names: &[String]) -> Result<Option<Job>, QueueError>;

    /// Job finished successfully. Releases its uniqueness lock.
    async fn complete(&self, job: &Job) -> Result<(), QueueError>;

    /// Job failed and should run again. The uniqueness lock stays held.
    async fn retry(&self, job: Job) -> Result<(), QueueError>;

    /// Job exhausted its attempts. Moves it to the dead set and releases its lock.
    async fn kill(&self, job: Job) -> Result<(), QueueError>;
}
