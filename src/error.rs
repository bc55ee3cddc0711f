use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use thiserror::Error;

/// Error taxonomy of the leave core. Every validation failure maps to one
/// of the first four kinds and is raised before any state is mutated.
#[derive(Debug, Error)]
pub enum LeaveError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Unique-constraint hit on `request_number`; the caller retries with
    /// the next sequence.
    #[error("duplicate request number {0}")]
    DuplicateRequestNumber(String),
    /// The balance row moved between read and write. The caller re-reads
    /// and retries the whole operation.
    #[error("stale balance row for employee {employee_id}, leave type {leave_type_id}, year {year}")]
    StaleBalance {
        employee_id: u64,
        leave_type_id: u64,
        year: i32,
    },
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl ResponseError for LeaveError {
    fn status_code(&self) -> StatusCode {
        match self {
            LeaveError::NotFound(_) => StatusCode::NOT_FOUND,
            LeaveError::InvalidInput(_) | LeaveError::InvalidState(_) => StatusCode::BAD_REQUEST,
            LeaveError::Forbidden(_) => StatusCode::FORBIDDEN,
            LeaveError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            LeaveError::Storage(e) => {
                tracing::error!(error = %e, "storage failure");
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "message": message }))
    }
}
