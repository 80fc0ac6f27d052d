//! HTTP error mapping for matcompd.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use matcomp_common::{CompareError, HistoryError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: i32,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("comparison failed: {0}")]
    Compare(#[from] CompareError),

    #[error("{0}")]
    History(#[from] HistoryError),

    #[error("worker failed: {0}")]
    Worker(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Compare(e) if e.is_validation() => StatusCode::BAD_REQUEST,
            ApiError::Compare(_) => StatusCode::BAD_GATEWAY,
            ApiError::History(HistoryError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::History(_) | ApiError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            ApiError::Compare(e) => e.code(),
            ApiError::History(e) => e.code(),
            ApiError::Worker(_) => 5000,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("  {}", self);
        } else {
            warn!("  {}", self);
        }

        let body = ErrorBody {
            error: self.to_string(),
            code: self.code(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matcomp_common::BackendError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(CompareError::TooFewTasks).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(CompareError::Backend(BackendError::Http("refused".into()))).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(HistoryError::NotFound("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(HistoryError::LockPoisoned).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_compare_message_prefix() {
        let err = ApiError::from(CompareError::TooFewTasks);
        assert_eq!(err.to_string(), "comparison failed: at least 2 tasks required");
        assert_eq!(err.code(), 1001);
    }
}
