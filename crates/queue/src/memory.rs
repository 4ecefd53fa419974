//! In-process job queue.
//!
//! Keeps one FIFO per job name plus the set of uniqueness keys held by
//! pending jobs. Used by tests and single-process deployments.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::{Enqueuer, JobBackend};
use crate::error::QueueError;
use crate::job::{Job, JobArgs};

#[derive(Default)]
struct State {
    queues: HashMap<String, VecDeque<Job>>,
    unique_keys: HashSet<String>,
    dead: Vec<Job>,
}

impl State {
    fn release(&mut self, job: &Job) -> Result<(), QueueError> {
        if job.unique {
            self.unique_keys.remove(&job.unique_key()?);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<State>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of pending jobs named `name`, oldest first.
    pub async fn pending(&self, name: &str) -> Vec<Job> {
        let state = self.state.lock().await;
        state
            .queues
            .get(name)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn pending_count(&self) -> usize {
        let state = self.state.lock().await;
        state.queues.values().map(VecDeque::len).sum()
    }

    pub async fn dead_jobs(&self) -> Vec<Job> {
        self.state.lock().await.dead.clone()
    }
}

#[async_trait]
impl Enqueuer for MemoryQueue {
    async fn enqueue(&self, name: &str, args: JobArgs) -> Result<Job, QueueError> {
        let job = Job::new(name, args);
        let mut state = self.state.lock().await;
        state
            .queues
            .entry(job.name.clone())
            .or_default()
            .push_back(job.clone());
        Ok(job)
    }

    async fn enqueue_unique(&self, name: &str, args: JobArgs) -> Result<Option<Job>, QueueError> {
        let job = Job::new_unique(name, args);
        let key = job.unique_key()?;
        let mut state = self.state.lock().await;
        if !state.unique_keys.insert(key.clone()) {
            debug!(key = %key, "unique job already pending");
            return Ok(None);
        }
        state
            .queues
            .entry(job.name.clone())
            .or_default()
            .push_back(job.clone());
        Ok(Some(job))
    }
}

#[async_trait]
impl JobBackend for MemoryQueue {
    async fn dequeue(&self, names: &[String]) -> Result<Option<Job>, QueueError> {
        let mut state = self.state.lock().await;
        for name in names {
            if let Some(job) = state.queues.get_mut(name).and_then(VecDeque::pop_front) {
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    async fn complete(&self, job: &Job) -> Result<(), QueueError> {
        self.state.lock().await.release(job)
    }

    async fn retry(&self, job: Job) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.queues.entry(job.name.clone()).or_default().push_back(job);
        Ok(())
    }

    async fn kill(&self, job: Job) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.release(&job)?;
        state.dead.push(job);
        Ok(())
    }
}
