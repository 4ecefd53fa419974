//! Due-assignment dispatch: a paging producer and an enqueuing consumer
//! joined by a bounded channel.
//!
//! ```text
//! ┌──────────────────────┐  Vec<AssignmentId>  ┌──────────────────────┐
//! │ PagedAssignmentSource │ ──── mpsc(cap) ───▶ │ enqueue_unique(       │
//! │ (producer task)       │                     │  grade_assignment)    │
//! └──────────────────────┘                     └──────────────────────┘
//!            ▲                                            ▲
//!            └──────── CancellationToken + deadline ──────┘
//! ```
//!
//! The first task to fail claims the run's error and cancels the token; the
//! other task stops at its next channel operation or collaborator call. When
//! the deadline passes first, the run fails with
//! [`JobError::DeadlineExceeded`] unless both tasks still finish cleanly.
//!
//! A batch already received when cancellation is observed is abandoned from
//! the first unprocessed ID; the abandoned count is logged. A consumer that
//! observes cancellation after the producer has closed an empty channel has
//! nothing left to do and finishes cleanly.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use autograd_core::config::WorkerConfig;
use autograd_core::{AssignmentId, Cursor, SortOrder};
use autograd_queue::{Enqueuer, JobArgs};

use crate::error::JobError;
use crate::jobs::{ASSIGNMENT_ID_ARG, GRADE_ASSIGNMENT};
use crate::source::PagedAssignmentSource;
use crate::usecase::AssignmentUsecase;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub page_size: u64,
    pub start_page: u64,
    pub sort: SortOrder,
    /// Batches buffered between producer and consumer (at least 1).
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            start_page: 1,
            sort: SortOrder::CreatedAtDesc,
            channel_capacity: 1,
        }
    }
}

impl From<&WorkerConfig> for PipelineConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            page_size: config.due_page_size,
            start_page: 1,
            sort: config.due_sort,
            channel_capacity: config.pipeline_channel_capacity,
        }
    }
}

/// Outcome of a clean run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Non-empty pages fetched.
    pub pages: u64,
    /// GradeAssignment jobs newly enqueued.
    pub forwarded: u64,
    /// IDs whose GradeAssignment job was already pending.
    pub duplicates: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Producer = 1,
    Consumer = 2,
    Deadline = 3,
}

/// First-claim-wins record of which side ended the run.
#[derive(Default)]
struct FirstFailure(AtomicU8);

impl FirstFailure {
    fn claim(&self, side: Side) -> bool {
        self.0
            .compare_exchange(0, side as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn winner(&self) -> Option<Side> {
        match self.0.load(Ordering::SeqCst) {
            1 => Some(Side::Producer),
            2 => Some(Side::Consumer),
            3 => Some(Side::Deadline),
            _ => None,
        }
    }
}

pub struct DispatchPipeline {
    assignments: Arc<dyn AssignmentUsecase>,
    enqueuer: Arc<dyn Enqueuer>,
    config: PipelineConfig,
}

impl DispatchPipeline {
    pub fn new(
        assignments: Arc<dyn AssignmentUsecase>,
        enqueuer: Arc<dyn Enqueuer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            assignments,
            enqueuer,
            config,
        }
    }

    /// Page through every due assignment and enqueue a unique GradeAssignment
    /// job for each, giving up once `timeout` has elapsed.
    pub async fn run(&self, timeout: Duration) -> Result<DispatchSummary, JobError> {
        let cursor = Cursor::new(self.config.page_size, self.config.start_page, self.config.sort)
            .map_err(JobError::InvalidCursor)?;
        let deadline = Instant::now() + timeout;

        info!(
            page_size = cursor.size(),
            start_page = cursor.page(),
            sort = %cursor.sort(),
            timeout_ms = timeout.as_millis() as u64,
            "dispatching due assignments"
        );

        let cancel = CancellationToken::new();
        let first = Arc::new(FirstFailure::default());
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));

        let producer = {
            let source = PagedAssignmentSource::new(self.assignments.clone(), cursor);
            let cancel = cancel.clone();
            let first = first.clone();
            tokio::spawn(async move {
                let result = produce(source, tx, &cancel).await;
                if let Err(e) = &result {
                    fail(Side::Producer, e, &first, &cancel);
                }
                result
            })
        };

        let consumer = {
            let enqueuer = self.enqueuer.clone();
            let cancel = cancel.clone();
            let first = first.clone();
            tokio::spawn(async move {
                let result = consume(enqueuer, rx, &cancel).await;
                if let Err(e) = &result {
                    fail(Side::Consumer, e, &first, &cancel);
                }
                result
            })
        };

        let joined = async move { tokio::join!(producer, consumer) };
        tokio::pin!(joined);

        let (produced, consumed) = tokio::select! {
            results = &mut joined => results,
            _ = tokio::time::sleep_until(deadline) => {
                if first.claim(Side::Deadline) {
                    warn!(timeout_ms = timeout.as_millis() as u64, "dispatch deadline reached, cancelling");
                }
                cancel.cancel();
                joined.await
            }
        };
        // Tear down after a clean finish; never reported.
        cancel.cancel();

        let produced = produced.map_err(|e| JobError::Task(e.to_string())).and_then(|r| r);
        let consumed = consumed.map_err(|e| JobError::Task(e.to_string())).and_then(|r| r);

        let outcome = match (first.winner(), produced, consumed) {
            (_, Ok(pages), Ok((forwarded, duplicates))) => Ok(DispatchSummary {
                pages,
                forwarded,
                duplicates,
            }),
            (Some(Side::Deadline), _, _) => Err(JobError::DeadlineExceeded(timeout)),
            (Some(Side::Producer), Err(e), _) | (Some(Side::Consumer), _, Err(e)) => Err(e),
            // A panicked task never claims, and its sibling only sees a closed channel.
            (_, Err(e @ JobError::Task(_)), _) | (_, _, Err(e @ JobError::Task(_))) => Err(e),
            (_, Err(e), _) | (_, _, Err(e)) => Err(e),
        };

        match &outcome {
            Ok(summary) => info!(
                pages = summary.pages,
                forwarded = summary.forwarded,
                duplicates = summary.duplicates,
                "due assignments dispatched"
            ),
            Err(e) => error!(error = %e, "dispatching due assignments failed"),
        }
        outcome
    }
}

fn fail(side: Side, err: &JobError, first: &FirstFailure, cancel: &CancellationToken) {
    if !matches!(err, JobError::Cancelled) && first.claim(side) {
        debug!(side = ?side, error = %err, "dispatch side failed, cancelling sibling");
    }
    cancel.cancel();
}

/// Push every page into `tx`. Dropping `tx` on return closes the channel.
async fn produce(
    mut source: PagedAssignmentSource,
    tx: mpsc::Sender<Vec<AssignmentId>>,
    cancel: &CancellationToken,
) -> Result<u64, JobError> {
    let mut pages = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(JobError::Cancelled),
            next = source.next_batch() => next?,
        };
        let Some(batch) = next else {
            return Ok(pages);
        };
        pages += 1;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(JobError::Cancelled),
            sent = tx.send(batch) => {
                // Receiver gone: the consumer already stopped.
                if sent.is_err() {
                    return Err(JobError::Cancelled);
                }
            }
        }
    }
}

/// Enqueue every ID of every batch until the channel closes.
async fn consume(
    enqueuer: Arc<dyn Enqueuer>,
    mut rx: mpsc::Receiver<Vec<AssignmentId>>,
    cancel: &CancellationToken,
) -> Result<(u64, u64), JobError> {
    let mut forwarded = 0;
    let mut duplicates = 0;
    loop {
        let batch = tokio::select! {
            biased;
            _ = cancel.cancelled() => match rx.try_recv() {
                // Producer already drained the source and nothing is buffered.
                Err(TryRecvError::Disconnected) => return Ok((forwarded, duplicates)),
                Err(TryRecvError::Empty) => return Err(JobError::Cancelled),
                Ok(batch) => {
                    warn!(
                        abandoned = batch.len(),
                        "dispatch cancelled, abandoning buffered batch"
                    );
                    return Err(JobError::Cancelled);
                }
            },
            batch = rx.recv() => batch,
        };
        let Some(batch) = batch else {
            return Ok((forwarded, duplicates));
        };

        for (index, &id) in batch.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    abandoned = batch.len() - index,
                    next_assignment_id = id,
                    "dispatch cancelled, abandoning rest of batch"
                );
                return Err(JobError::Cancelled);
            }

            let args = JobArgs::new().with(ASSIGNMENT_ID_ARG, id);
            match enqueuer.enqueue_unique(GRADE_ASSIGNMENT, args).await {
                Ok(Some(job)) => {
                    debug!(assignment_id = id, job_id = %job.id, "grade assignment enqueued");
                    forwarded += 1;
                }
                Ok(None) => {
                    debug!(assignment_id = id, "grade assignment already pending");
                    duplicates += 1;
                }
                Err(source) => {
                    error!(assignment_id = id, error = %source, "unable to enqueue grade assignment");
                    return Err(JobError::Enqueue {
                        job: GRADE_ASSIGNMENT,
                        id,
                        source,
                    });
                }
            }
        }
    }
}
