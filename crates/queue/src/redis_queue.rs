//! Redis-backed job queue (requires the `queue-redis` feature).
//!
//! Layout under the configured namespace:
//!
//! ```text
//! <ns>:jobs:<name>           LIST   pending jobs, LPUSH in, LMOVE out
//! <ns>:inprogress:<worker>   LIST   jobs dequeued by one worker, not yet acked
//! <ns>:unique:<key>          STRING lock held by a pending unique job (SET NX)
//! <ns>:dead                  LIST   jobs that exhausted their attempts
//! ```
//!
//! A dequeue moves the job atomically into the worker's in-progress list, and
//! complete/retry/kill remove it again. Jobs left there by a crashed process
//! are pushed back to their queues when a queue with the same worker id
//! connects.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Direction};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{Enqueuer, JobBackend};
use crate::error::QueueError;
use crate::job::{Job, JobArgs};

/// Key names for one namespace and worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisKeys {
    namespace: String,
    worker_id: String,
}

impl RedisKeys {
    pub fn new(namespace: impl Into<String>, worker_id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            worker_id: worker_id.into(),
        }
    }

    pub fn jobs(&self, name: &str) -> String {
        format!("{}:jobs:{}", self.namespace, name)
    }

    pub fn in_progress(&self) -> String {
        format!("{}:inprogress:{}", self.namespace, self.worker_id)
    }

    pub fn unique_lock(&self, unique_key: &str) -> String {
        format!("{}:unique:{}", self.namespace, unique_key)
    }

    pub fn dead(&self) -> String {
        format!("{}:dead", self.namespace)
    }
}

pub struct RedisQueue {
    conn: MultiplexedConnection,
    keys: RedisKeys,
    /// Raw payloads of dequeued jobs by job id, for removal from the
    /// in-progress list.
    in_flight: Mutex<HashMap<String, String>>,
}

impl RedisQueue {
    /// Connect and requeue anything a previous process with `worker_id` left
    /// in progress. `worker_id` must be unique among running workers.
    pub async fn connect(
        url: &str,
        namespace: impl Into<String>,
        worker_id: impl Into<String>,
    ) -> Result<Self, QueueError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        let queue = Self {
            conn,
            keys: RedisKeys::new(namespace, worker_id),
            in_flight: Mutex::new(HashMap::new()),
        };
        let recovered = queue.requeue_in_progress().await?;
        info!(
            namespace = %queue.keys.namespace,
            worker_id = %queue.keys.worker_id,
            recovered,
            "redis job queue connected"
        );
        Ok(queue)
    }

    pub fn keys(&self) -> &RedisKeys {
        &self.keys
    }

    /// Push every job in this worker's in-progress list back to the front of
    /// its queue.
    pub async fn requeue_in_progress(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        let mut recovered = 0;
        loop {
            let payload: Option<String> = conn.rpop(self.keys.in_progress(), None).await?;
            let Some(payload) = payload else {
                return Ok(recovered);
            };
            match serde_json::from_str::<Job>(&payload) {
                Ok(job) => {
                    // Dequeue takes from the right, so this job goes next.
                    conn.rpush::<_, _, ()>(self.keys.jobs(&job.name), &payload).await?;
                    recovered += 1;
                }
                Err(e) => {
                    warn!(error = %e, "dropping unreadable in-progress job");
                    conn.lpush::<_, _, ()>(self.keys.dead(), &payload).await?;
                }
            }
        }
    }

    async fn push(&self, job: &Job) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job)?;
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(self.keys.jobs(&job.name), payload).await?;
        Ok(())
    }

    /// Drop `job` from the in-progress list.
    async fn ack(&self, job: &Job) -> Result<(), QueueError> {
        let payload = self.in_flight.lock().await.remove(&job.id);
        if let Some(payload) = payload {
            let mut conn = self.conn.clone();
            conn.lrem::<_, _, ()>(self.keys.in_progress(), 1, payload).await?;
        }
        Ok(())
    }

    async fn release(&self, job: &Job) -> Result<(), QueueError> {
        if job.unique {
            let mut conn = self.conn.clone();
            conn.del::<_, ()>(self.keys.unique_lock(&job.unique_key()?)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Enqueuer for RedisQueue {
    async fn enqueue(&self, name: &str, args: JobArgs) -> Result<Job, QueueError> {
        let job = Job::new(name, args);
        self.push(&job).await?;
        Ok(job)
    }

    async fn enqueue_unique(&self, name: &str, args: JobArgs) -> Result<Option<Job>, QueueError> {
        let job = Job::new_unique(name, args);
        let lock = self.keys.unique_lock(&job.unique_key()?);

        let mut conn = self.conn.clone();
        let acquired: bool = conn.set_nx(&lock, &job.id).await?;
        if !acquired {
            debug!(key = %lock, "unique job already pending");
            return Ok(None);
        }

        if let Err(e) = self.push(&job).await {
            conn.del::<_, ()>(&lock).await?;
            return Err(e);
        }
        Ok(Some(job))
    }
}

#[async_trait]
impl JobBackend for RedisQueue {
    async fn dequeue(&self, names: &[String]) -> Result<Option<Job>, QueueError> {
        let mut conn = self.conn.clone();
        for name in names {
            let payload: Option<String> = conn
                .lmove(
                    self.keys.jobs(name),
                    self.keys.in_progress(),
                    Direction::Right,
                    Direction::Left,
                )
                .await?;
            if let Some(payload) = payload {
                let job: Job = serde_json::from_str(&payload)?;
                self.in_flight.lock().await.insert(job.id.clone(), payload);
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    async fn complete(&self, job: &Job) -> Result<(), QueueError> {
        self.ack(job).await?;
        self.release(job).await
    }

    async fn retry(&self, job: Job) -> Result<(), QueueError> {
        self.push(&job).await?;
        self.ack(&job).await
    }

    async fn kill(&self, job: Job) -> Result<(), QueueError> {
        let payload = serde_json::to_string(&job)?;
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(self.keys.dead(), payload).await?;
        self.ack(&job).await?;
        self.release(&job).await
    }
}
