//! Worker pool that dispatches dequeued jobs to named handlers.
//!
//! A pool owns a [`JobBackend`], a handler per job name, and any number of
//! [`PeriodicEnqueuer`]s. [`WorkerPool::run`] spawns `concurrency` workers
//! that each loop: dequeue → handle → complete / retry / kill. Retry policy
//! lives here: a job is retried until it has failed `max_fails` times, then
//! moved to the backend's dead set.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{Enqueuer, JobBackend};
use crate::error::QueueError;
use crate::job::Job;
use crate::periodic::PeriodicEnqueuer;

/// Error type handlers report back to the pool.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed async function that handles one job.
pub type JobHandlerFn =
    Arc<dyn Fn(Job) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub concurrency: usize,
    /// Attempts before a job is killed.
    pub max_fails: u32,
    /// Sleep between polls when every queue is empty.
    pub poll_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            max_fails: 4,
            poll_interval: Duration::from_millis(500),
        }
    }
}

pub struct WorkerPool {
    backend: Arc<dyn JobBackend>,
    config: PoolConfig,
    handlers: HashMap<String, JobHandlerFn>,
    periodic: Vec<PeriodicEnqueuer>,
}

impl WorkerPool {
    pub fn new(backend: Arc<dyn JobBackend>, config: PoolConfig) -> Self {
        Self {
            backend,
            config,
            handlers: HashMap::new(),
            periodic: Vec::new(),
        }
    }

    /// Register the handler for `name`. A second registration replaces the first.
    pub fn register<F, Fut, E>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<HandlerError> + 'static,
    {
        let handler = Arc::new(handler);
        let boxed: JobHandlerFn = Arc::new(move |job| {
            let handler = handler.clone();
            Box::pin(async move { handler(job).await.map_err(Into::into) })
        });
        self.handlers.insert(name.into(), boxed);
        self
    }

    /// Enqueue `name` on every tick of `cron_expression`.
    pub fn periodically_enqueue(
        &mut self,
        cron_expression: &str,
        name: impl Into<String>,
    ) -> Result<&mut Self, QueueError> {
        self.periodic.push(PeriodicEnqueuer::new(cron_expression, name)?);
        Ok(self)
    }

    pub fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run workers and periodic enqueuers until `shutdown` is cancelled.
    /// In-flight jobs finish before this returns.
    pub async fn run(self, shutdown: CancellationToken) {
        let names = Arc::new(self.job_names());
        let handlers = Arc::new(self.handlers);
        let concurrency = self.config.concurrency.max(1);

        info!(
            concurrency,
            jobs = ?names,
            periodic = self.periodic.len(),
            "worker pool starting"
        );

        let mut tasks = Vec::with_capacity(concurrency + self.periodic.len());

        for periodic in self.periodic {
            let enqueuer: Arc<dyn Enqueuer> = Arc::new(self.backend.clone());
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                periodic.run(enqueuer, shutdown).await;
            }));
        }

        for worker_id in 0..concurrency {
            let worker = Worker {
                id: worker_id,
                backend: self.backend.clone(),
                handlers: handlers.clone(),
                names: names.clone(),
                max_fails: self.config.max_fails.max(1),
                poll_interval: self.config.poll_interval,
            };
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move { worker.run(shutdown).await }));
        }

        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                error!(error = %e, "worker task ended abnormally");
            }
        }

        info!("worker pool stopped");
    }
}

struct Worker {
    id: usize,
    backend: Arc<dyn JobBackend>,
    handlers: Arc<HashMap<String, JobHandlerFn>>,
    names: Arc<Vec<String>>,
    max_fails: u32,
    poll_interval: Duration,
}

impl Worker {
    async fn run(&self, shutdown: CancellationToken) {
        debug!(worker = self.id, "worker started");
        while !shutdown.is_cancelled() {
            match self.backend.dequeue(&self.names).await {
                Ok(Some(job)) => {
                    if let Err(e) = self.process(job).await {
                        warn!(worker = self.id, error = %e, "failed to record job outcome");
                    }
                }
                Ok(None) => self.idle(&shutdown).await,
                Err(e) => {
                    warn!(worker = self.id, error = %e, "dequeue failed");
                    self.idle(&shutdown).await;
                }
            }
        }
        debug!(worker = self.id, "worker stopped");
    }

    async fn idle(&self, shutdown: &CancellationToken) {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.poll_interval) => {}
        }
    }

    async fn process(&self, mut job: Job) -> Result<(), QueueError> {
        let Some(handler) = self.handlers.get(&job.name) else {
            error!(job = %job.name, job_id = %job.id, "no handler registered");
            job.last_error = Some(format!("no handler registered for {}", job.name));
            return self.backend.kill(job).await;
        };

        debug!(worker = self.id, job = %job.name, job_id = %job.id, "running job");

        let outcome = match AssertUnwindSafe(handler(job.clone())).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(panic_message(panic).into()),
        };

        match outcome {
            Ok(()) => {
                debug!(worker = self.id, job = %job.name, job_id = %job.id, "job done");
                self.backend.complete(&job).await
            }
            Err(e) => {
                job.fails += 1;
                job.last_error = Some(e.to_string());
                if job.fails < self.max_fails {
                    warn!(
                        job = %job.name,
                        job_id = %job.id,
                        fails = job.fails,
                        error = %e,
                        "job failed, retrying"
                    );
                    self.backend.retry(job).await
                } else {
                    error!(
                        job = %job.name,
                        job_id = %job.id,
                        fails = job.fails,
                        error = %e,
                        "job failed permanently"
                    );
                    self.backend.kill(job).await
                }
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("handler panicked: {detail}")
}
