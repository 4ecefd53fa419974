//! Cron-driven enqueue of a recurring job.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::Enqueuer;
use crate::error::QueueError;
use crate::job::JobArgs;

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for seconds.
///
/// The `cron` crate requires 6 fields: `sec min hour day-of-month month day-of-week`.
pub(crate) fn normalize_cron(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Enqueues `job_name` (unique, no args) on every tick of a cron schedule.
#[derive(Debug, Clone)]
pub struct PeriodicEnqueuer {
    expression: String,
    schedule: Schedule,
    job_name: String,
}

impl PeriodicEnqueuer {
    pub fn new(expression: &str, job_name: impl Into<String>) -> Result<Self, QueueError> {
        let expression = normalize_cron(expression);
        let schedule =
            Schedule::from_str(&expression).map_err(|e| QueueError::InvalidSchedule {
                expression: expression.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            expression,
            schedule,
            job_name: job_name.into(),
        })
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First tick strictly after `from`.
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// Loop until `shutdown` fires. Enqueue failures are logged and the loop
    /// waits for the next tick.
    pub async fn run(&self, enqueuer: Arc<dyn Enqueuer>, shutdown: CancellationToken) {
        info!(job = %self.job_name, cron = %self.expression, "periodic enqueuer started");

        loop {
            let Some(next) = self.next_after(Utc::now()) else {
                warn!(job = %self.job_name, cron = %self.expression, "schedule has no upcoming ticks");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(job = %self.job_name, "periodic enqueuer stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            match enqueuer.enqueue_unique(&self.job_name, JobArgs::new()).await {
                Ok(Some(job)) => debug!(job = %self.job_name, job_id = %job.id, "periodic job enqueued"),
                Ok(None) => debug!(job = %self.job_name, "previous periodic job still pending"),
                Err(e) => warn!(job = %self.job_name, error = %e, "periodic enqueue failed"),
            }
        }
    }
}
