//! Fakes shared by the worker integration tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use autograd_core::{AssignmentId, Cursor, SubmissionId};
use autograd_queue::{Enqueuer, Job, JobArgs, QueueError};
use autograd_worker::{
    AssignmentUsecase, GradeError, Grader, SubmissionUsecase, UsecaseError, ASSIGNMENT_ID_ARG,
    SUBMISSION_ID_ARG,
};

// ── Assignments ──────────────────────────────────────────────────────

/// Serves `ids` in pages of the cursor's size.
#[derive(Default)]
pub struct PagedAssignments {
    pub ids: Vec<AssignmentId>,
    pub fail_page: Option<u64>,
    /// Sleep before answering each page.
    pub delay: Duration,
    /// Never run out: every page is full.
    pub endless: bool,
    /// Wait for this notification before answering `gate.0`.
    pub gate: Option<(u64, Arc<Notify>)>,
    pub requested: Mutex<Vec<u64>>,
}

impl PagedAssignments {
    pub fn new(ids: Vec<AssignmentId>) -> Self {
        Self {
            ids,
            ..Self::default()
        }
    }

    pub async fn requested(&self) -> Vec<u64> {
        self.requested.lock().await.clone()
    }
}

#[async_trait]
impl AssignmentUsecase for PagedAssignments {
    async fn find_all_due_dates(
        &self,
        cursor: &Cursor,
    ) -> Result<(Vec<AssignmentId>, i64), UsecaseError> {
        self.requested.lock().await.push(cursor.page());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some((page, notify)) = &self.gate {
            if *page == cursor.page() {
                notify.notified().await;
            }
        }
        if self.fail_page == Some(cursor.page()) {
            return Err(UsecaseError::Database("connection refused".into()));
        }
        if self.endless {
            let start = cursor.offset() as i64;
            let page = (start..start + cursor.size() as i64).collect();
            return Ok((page, i64::MAX));
        }
        let page = self
            .ids
            .iter()
            .copied()
            .skip(cursor.offset() as usize)
            .take(cursor.size() as usize)
            .collect();
        Ok((page, self.ids.len() as i64))
    }
}

// ── Enqueuer ─────────────────────────────────────────────────────────

/// Records the ID argument of every successful enqueue, in call order.
#[derive(Default)]
pub struct RecordingEnqueuer {
    /// 1-based call number that fails.
    pub fail_on: Option<usize>,
    /// 1-based call number that panics.
    pub panic_on: Option<usize>,
    /// Sleep after recording each enqueue.
    pub delay: Duration,
    /// Notified after the first successful enqueue.
    pub first_enqueued: Option<Arc<Notify>>,
    pub calls: Mutex<usize>,
    pub jobs: Mutex<Vec<(String, i64)>>,
}

impl RecordingEnqueuer {
    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on: Some(call),
            ..Self::default()
        }
    }

    pub async fn ids(&self) -> Vec<i64> {
        self.jobs.lock().await.iter().map(|(_, id)| *id).collect()
    }
}

fn id_arg(args: &JobArgs) -> i64 {
    args.i64(ASSIGNMENT_ID_ARG)
        .or_else(|_| args.i64(SUBMISSION_ID_ARG))
        .unwrap_or(-1)
}

#[async_trait]
impl Enqueuer for RecordingEnqueuer {
    async fn enqueue(&self, name: &str, args: JobArgs) -> Result<Job, QueueError> {
        self.enqueue_unique(name, args)
            .await?
            .ok_or_else(|| QueueError::Provider("duplicate".into()))
    }

    async fn enqueue_unique(&self, name: &str, args: JobArgs) -> Result<Option<Job>, QueueError> {
        let call = {
            let mut calls = self.calls.lock().await;
            *calls += 1;
            *calls
        };
        if self.fail_on == Some(call) {
            return Err(QueueError::Connection("broken pipe".into()));
        }
        if self.panic_on == Some(call) {
            panic!("enqueuer crashed on call {call}");
        }

        let first = {
            let mut jobs = self.jobs.lock().await;
            jobs.push((name.to_string(), id_arg(&args)));
            jobs.len() == 1
        };
        if first {
            if let Some(notify) = &self.first_enqueued {
                notify.notify_one();
            }
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(Some(Job::new_unique(name, args)))
    }
}

// ── Submissions and grading ──────────────────────────────────────────

#[derive(Default)]
pub struct FixedSubmissions {
    pub by_assignment: HashMap<AssignmentId, Vec<SubmissionId>>,
    pub fail: bool,
}

impl FixedSubmissions {
    pub fn new(entries: &[(AssignmentId, &[SubmissionId])]) -> Self {
        Self {
            by_assignment: entries.iter().map(|(a, s)| (*a, s.to_vec())).collect(),
            fail: false,
        }
    }
}

#[async_trait]
impl SubmissionUsecase for FixedSubmissions {
    async fn find_all_uncheck_by_assignment_id(
        &self,
        assignment_id: AssignmentId,
    ) -> Result<(Vec<SubmissionId>, i64), UsecaseError> {
        if self.fail {
            return Err(UsecaseError::Database("timeout".into()));
        }
        let ids = self
            .by_assignment
            .get(&assignment_id)
            .cloned()
            .unwrap_or_default();
        let total = ids.len() as i64;
        Ok((ids, total))
    }
}

#[derive(Default)]
pub struct RecordingGrader {
    pub fail_on: Option<SubmissionId>,
    pub graded: Mutex<BTreeSet<SubmissionId>>,
}

#[async_trait]
impl Grader for RecordingGrader {
    async fn grade_submission(&self, submission_id: SubmissionId) -> Result<(), GradeError> {
        if self.fail_on == Some(submission_id) {
            return Err(GradeError::Failed {
                submission_id,
                reason: "runner crashed".into(),
            });
        }
        self.graded.lock().await.insert(submission_id);
        Ok(())
    }
}
