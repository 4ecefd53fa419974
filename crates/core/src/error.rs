use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("invalid sort order: {0}")]
    InvalidSortOrder(String),
}
