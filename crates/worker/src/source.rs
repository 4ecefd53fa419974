//! Page-by-page stream of due assignment IDs.

use std::sync::Arc;

use tracing::{debug, error};

use autograd_core::{AssignmentId, Cursor};

use crate::error::JobError;
use crate::usecase::AssignmentUsecase;

/// Walks [`AssignmentUsecase::find_all_due_dates`] one page at a time.
///
/// The cursor advances only after a non-empty page. The first empty page ends
/// the stream, and every later call returns `Ok(None)` without querying.
pub struct PagedAssignmentSource {
    assignments: Arc<dyn AssignmentUsecase>,
    cursor: Cursor,
    exhausted: bool,
}

impl PagedAssignmentSource {
    pub fn new(assignments: Arc<dyn AssignmentUsecase>, cursor: Cursor) -> Self {
        Self {
            assignments,
            cursor,
            exhausted: false,
        }
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetch the next batch, or `None` once the data runs out.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<AssignmentId>>, JobError> {
        if self.exhausted {
            return Ok(None);
        }

        let (ids, total) = match self.assignments.find_all_due_dates(&self.cursor).await {
            Ok(page) => page,
            Err(e) => {
                error!(page = self.cursor.page(), error = %e, "unable to get all due assignments");
                self.exhausted = true;
                return Err(JobError::DueAssignments(e));
            }
        };

        if ids.is_empty() {
            debug!(page = self.cursor.page(), total, "no more due assignments");
            self.exhausted = true;
            return Ok(None);
        }

        debug!(page = self.cursor.page(), count = ids.len(), total, "fetched due assignments");
        self.cursor.advance();
        Ok(Some(ids))
    }
}
