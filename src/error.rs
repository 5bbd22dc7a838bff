use thiserror::Error;
use tokio::io;

use crate::storage::StorageError;

pub type ServiceResult<T> = core::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    FromString(String),
    #[error("{0}")]
    IoError(#[from] io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("{0}")]
    Storage(#[from] StorageError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("AI provider error: {0}")]
    ApiError(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    /// HTTP status code used when the error reaches an API caller.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::NotFound(_) => 404,
            ServiceError::BadRequest(_) | ServiceError::Conflict(_) => 400,
            ServiceError::Validation(_) => 422,
            ServiceError::NetworkError(_) | ServiceError::ApiError(_) => 502,
            _ => 500,
        }
    }
}
