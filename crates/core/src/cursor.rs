//! Pagination cursor shared by the assignment and submission collaborators.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Identifier of an assignment row.
pub type AssignmentId = i64;

/// Identifier of a submission row.
pub type SubmissionId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    CreatedAtDesc,
    CreatedAtAsc,
}

impl SortOrder {
    /// SQL `ORDER BY` fragment for this ordering.
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::CreatedAtDesc => "created_at DESC",
            SortOrder::CreatedAtAsc => "created_at ASC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::CreatedAtDesc => write!(f, "created_at_desc"),
            SortOrder::CreatedAtAsc => write!(f, "created_at_asc"),
        }
    }
}

impl FromStr for SortOrder {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created_at_desc" | "desc" => Ok(SortOrder::CreatedAtDesc),
            "created_at_asc" | "asc" => Ok(SortOrder::CreatedAtAsc),
            other => Err(CoreError::InvalidSortOrder(other.to_string())),
        }
    }
}

/// Page-based cursor. Pages are 1-indexed and the size is fixed once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    size: u64,
    page: u64,
    sort: SortOrder,
}

impl Cursor {
    pub fn new(size: u64, page: u64, sort: SortOrder) -> Result<Self, CoreError> {
        if size == 0 {
            return Err(CoreError::InvalidCursor("page size must be positive".into()));
        }
        if page == 0 {
            return Err(CoreError::InvalidCursor("page numbers start at 1".into()));
        }
        Ok(Self { size, page, sort })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn sort(&self) -> SortOrder {
        self.sort
    }

    /// Number of rows to skip for the current page.
    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.size
    }

    /// Move to the following page.
    pub fn advance(&mut self) {
        self.page += 1;
    }
}
