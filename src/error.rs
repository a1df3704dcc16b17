use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Course not found: {0}")]
    CourseNotFound(String),

    #[error("Row {index} is out of range for a batch of {len} rows")]
    RowOutOfRange { index: usize, len: usize },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ImportError>;
