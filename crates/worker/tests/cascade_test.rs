//! Integration tests for the three grading jobs and their pool wiring.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use autograd_core::config::WorkerConfig;
use autograd_queue::{Job, JobArgs, JobBackend, MemoryQueue, QueueError};
use autograd_worker::{
    build_pool, GradeError, JobError, JobHandler, UsecaseError, ASSIGNMENT_ID_ARG,
    CHECK_DUE_ASSIGNMENTS, GRADE_ASSIGNMENT, GRADE_SUBMISSION, SUBMISSION_ID_ARG,
};

use common::{FixedSubmissions, PagedAssignments, RecordingEnqueuer, RecordingGrader};

fn handler(
    enqueuer: Arc<RecordingEnqueuer>,
    grader: Arc<RecordingGrader>,
    submissions: FixedSubmissions,
) -> JobHandler {
    JobHandler::new(
        enqueuer,
        grader,
        Arc::new(submissions),
        Arc::new(PagedAssignments::new(vec![])),
    )
}

// ── GradeAssignment ──────────────────────────────────────────────────

#[tokio::test]
async fn grade_assignment_fans_out_submissions() {
    let enqueuer = Arc::new(RecordingEnqueuer::default());
    let handler = handler(
        enqueuer.clone(),
        Arc::default(),
        FixedSubmissions::new(&[(5, &[9001, 9002, 9003])]),
    );

    let job = Job::new(GRADE_ASSIGNMENT, JobArgs::new().with(ASSIGNMENT_ID_ARG, 5));
    let enqueued = handler.grade_assignment(&job).await.unwrap();

    assert_eq!(enqueued, 3);
    assert_eq!(enqueuer.ids().await, vec![9001, 9002, 9003]);
    assert!(enqueuer
        .jobs
        .lock()
        .await
        .iter()
        .all(|(name, _)| name == GRADE_SUBMISSION));
}

#[tokio::test]
async fn grade_assignment_without_submissions_is_ok() {
    let enqueuer = Arc::new(RecordingEnqueuer::default());
    let handler = handler(enqueuer.clone(), Arc::default(), FixedSubmissions::default());

    let job = Job::new(GRADE_ASSIGNMENT, JobArgs::new().with(ASSIGNMENT_ID_ARG, 5));
    assert_eq!(handler.grade_assignment(&job).await.unwrap(), 0);
    assert!(enqueuer.ids().await.is_empty());
}

#[tokio::test]
async fn grade_assignment_stops_at_first_enqueue_failure() {
    let enqueuer = Arc::new(RecordingEnqueuer::failing_on(2));
    let handler = handler(
        enqueuer.clone(),
        Arc::default(),
        FixedSubmissions::new(&[(5, &[9001, 9002])]),
    );

    let job = Job::new(GRADE_ASSIGNMENT, JobArgs::new().with(ASSIGNMENT_ID_ARG, 5));
    let err = handler.grade_assignment(&job).await.unwrap_err();

    match err {
        JobError::Enqueue { job, id, source } => {
            assert_eq!(job, GRADE_SUBMISSION);
            assert_eq!(id, 9002);
            assert!(matches!(source, QueueError::Connection(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    // Earlier enqueue stays.
    assert_eq!(enqueuer.ids().await, vec![9001]);
}

#[tokio::test]
async fn grade_assignment_lookup_failure_names_assignment() {
    let handler = handler(
        Arc::default(),
        Arc::default(),
        FixedSubmissions {
            fail: true,
            ..FixedSubmissions::default()
        },
    );

    let job = Job::new(GRADE_ASSIGNMENT, JobArgs::new().with(ASSIGNMENT_ID_ARG, 5));
    let err = handler.grade_assignment(&job).await.unwrap_err();

    assert!(matches!(
        err,
        JobError::UncheckedSubmissions {
            assignment_id: 5,
            source: UsecaseError::Database(_),
        }
    ));
}

#[tokio::test]
async fn grade_assignment_accepts_string_id() {
    let enqueuer = Arc::new(RecordingEnqueuer::default());
    let handler = handler(
        enqueuer.clone(),
        Arc::default(),
        FixedSubmissions::new(&[(5, &[1])]),
    );

    let job = Job::new(GRADE_ASSIGNMENT, JobArgs::new().with(ASSIGNMENT_ID_ARG, json!("5")));
    assert_eq!(handler.grade_assignment(&job).await.unwrap(), 1);
}

#[tokio::test]
async fn grade_assignment_missing_argument() {
    let handler = handler(Arc::default(), Arc::default(), FixedSubmissions::default());

    let job = Job::new(GRADE_ASSIGNMENT, JobArgs::new());
    let err = handler.grade_assignment(&job).await.unwrap_err();

    assert!(matches!(err, JobError::Argument(QueueError::MissingArgument(_))));
}

// ── GradeSubmission ──────────────────────────────────────────────────

#[tokio::test]
async fn grade_submission_grades_one() {
    let grader = Arc::new(RecordingGrader::default());
    let handler = handler(Arc::default(), grader.clone(), FixedSubmissions::default());

    let job = Job::new(GRADE_SUBMISSION, JobArgs::new().with(SUBMISSION_ID_ARG, 7));
    handler.grade_submission(&job).await.unwrap();

    assert_eq!(grader.graded.lock().await.iter().copied().collect::<Vec<_>>(), vec![7]);
}

#[tokio::test]
async fn grade_submission_returns_grader_error_unchanged() {
    let grader = Arc::new(RecordingGrader {
        fail_on: Some(7),
        ..RecordingGrader::default()
    });
    let handler = handler(Arc::default(), grader, FixedSubmissions::default());

    let job = Job::new(GRADE_SUBMISSION, JobArgs::new().with(SUBMISSION_ID_ARG, 7));
    let err = handler.grade_submission(&job).await.unwrap_err();

    let expected = GradeError::Failed {
        submission_id: 7,
        reason: "runner crashed".into(),
    };
    assert!(matches!(&err, JobError::Grade(e) if *e == expected));
    assert_eq!(err.to_string(), expected.to_string());
}

#[tokio::test]
async fn grade_submission_rejects_non_numeric_id() {
    let handler = handler(Arc::default(), Arc::default(), FixedSubmissions::default());

    let job = Job::new(GRADE_SUBMISSION, JobArgs::new().with(SUBMISSION_ID_ARG, json!("seven")));
    let err = handler.grade_submission(&job).await.unwrap_err();

    assert!(matches!(err, JobError::Argument(QueueError::InvalidArgument { .. })));
}

// ── CheckDueAssignments ──────────────────────────────────────────────

#[tokio::test]
async fn check_due_assignments_runs_dispatch() {
    let enqueuer = Arc::new(RecordingEnqueuer::default());
    let handler = JobHandler::new(
        enqueuer.clone(),
        Arc::new(RecordingGrader::default()),
        Arc::new(FixedSubmissions::default()),
        Arc::new(PagedAssignments::new((1..=25).collect())),
    );

    let job = Job::new_unique(CHECK_DUE_ASSIGNMENTS, JobArgs::new());
    let summary = handler.check_due_assignments(&job).await.unwrap();

    // Default page size of 10.
    assert_eq!(summary.pages, 3);
    assert_eq!(summary.forwarded, 25);
    assert_eq!(enqueuer.ids().await, (1..=25).collect::<Vec<_>>());
}

#[tokio::test]
async fn check_due_assignments_uses_worker_config() {
    let enqueuer = Arc::new(RecordingEnqueuer::default());
    let config = WorkerConfig {
        due_page_size: 4,
        ..WorkerConfig::default()
    };
    let handler = JobHandler::new(
        enqueuer.clone(),
        Arc::new(RecordingGrader::default()),
        Arc::new(FixedSubmissions::default()),
        Arc::new(PagedAssignments::new((1..=10).collect())),
    )
    .with_worker_config(&config);

    let summary = handler
        .check_due_assignments(&Job::new(CHECK_DUE_ASSIGNMENTS, JobArgs::new()))
        .await
        .unwrap();

    assert_eq!(summary.pages, 3);
    assert_eq!(summary.forwarded, 10);
}

// ── Pool wiring ──────────────────────────────────────────────────────

#[tokio::test]
async fn build_pool_registers_all_three_jobs() {
    let queue = Arc::new(MemoryQueue::new());
    let handler = Arc::new(handler(Arc::default(), Arc::default(), FixedSubmissions::default()));

    let pool = build_pool(queue, handler, &WorkerConfig::default()).unwrap();

    assert_eq!(
        pool.job_names(),
        vec![CHECK_DUE_ASSIGNMENTS, GRADE_ASSIGNMENT, GRADE_SUBMISSION]
    );
}

#[tokio::test]
async fn build_pool_rejects_bad_cron() {
    let queue = Arc::new(MemoryQueue::new());
    let handler = Arc::new(handler(Arc::default(), Arc::default(), FixedSubmissions::default()));
    let config = WorkerConfig {
        check_due_cron: "every minute".into(),
        ..WorkerConfig::default()
    };

    let result = build_pool(queue, handler, &config);
    assert!(matches!(result, Err(QueueError::InvalidSchedule { .. })));
}

#[tokio::test]
async fn cascade_grades_every_unchecked_submission() {
    let queue = Arc::new(MemoryQueue::new());
    let grader = Arc::new(RecordingGrader::default());
    let config = WorkerConfig {
        concurrency: 3,
        check_due_cron: "* * * * * *".into(),
        due_page_size: 1,
        ..WorkerConfig::default()
    };
    let handler = Arc::new(
        JobHandler::new(
            queue.clone(),
            grader.clone(),
            Arc::new(FixedSubmissions::new(&[(1, &[11, 12]), (2, &[21])])),
            Arc::new(PagedAssignments::new(vec![1, 2])),
        )
        .with_worker_config(&config),
    );

    let backend: Arc<dyn JobBackend> = queue.clone();
    let pool = build_pool(backend, handler, &config).unwrap();
    let shutdown = CancellationToken::new();
    let running = tokio::spawn(pool.run(shutdown.clone()));

    let graded = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let graded: Vec<i64> = grader.graded.lock().await.iter().copied().collect();
            if graded.len() == 3 {
                return graded;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("cascade did not finish");

    shutdown.cancel();
    running.await.unwrap();

    assert_eq!(graded, vec![11, 12, 21]);
    assert!(queue.dead_jobs().await.is_empty());
}
