//! Error types for matcomp.
//!
//! Only caller-input violations and infrastructure failures are errors.
//! Missing or degenerate data inside a valid request is absorbed by the
//! engine and never surfaces here.

use thiserror::Error;

/// Rejections raised before any comparison work starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompareError {
    #[error("at least 2 tasks required")]
    TooFewTasks,

    #[error("at least 1 target column required")]
    NoTargets,

    #[error("duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("duplicate target column: {0}")]
    DuplicateTarget(String),

    #[error("target column name must not be empty")]
    EmptyTargetName,

    #[error("tolerance must be a finite percentage in 0..=100, got {0}")]
    InvalidTolerance(f64),

    #[error("display precision must be at most {max}, got {got}")]
    InvalidPrecision { got: u32, max: u32 },

    #[error("malformed row {row} in task {task_id}: {reason}")]
    MalformedRow {
        task_id: String,
        row: usize,
        reason: String,
    },

    #[error("task {0} was not supplied")]
    MissingTask(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl CompareError {
    /// Stable numeric code, mirrored in daemon error bodies.
    pub fn code(&self) -> i32 {
        match self {
            CompareError::TooFewTasks => 1001,
            CompareError::NoTargets => 1002,
            CompareError::DuplicateTask(_) => 1003,
            CompareError::DuplicateTarget(_) => 1004,
            CompareError::EmptyTargetName => 1005,
            CompareError::InvalidTolerance(_) => 1006,
            CompareError::InvalidPrecision { .. } => 1007,
            CompareError::MalformedRow { .. } => 1008,
            CompareError::MissingTask(_) => 1009,
            CompareError::Backend(e) => e.code(),
        }
    }

    /// True for errors caused by the request itself rather than by the backend.
    pub fn is_validation(&self) -> bool {
        !matches!(self, CompareError::Backend(_))
    }
}

/// Failures talking to the prediction backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("backend returned HTTP {status} for task {task_id}")]
    Status { task_id: String, status: u16 },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    pub fn code(&self) -> i32 {
        match self {
            BackendError::TaskNotFound(_) => 2001,
            BackendError::Status { .. } => 2002,
            BackendError::Http(_) => 2003,
            BackendError::InvalidResponse(_) => 2004,
        }
    }
}

/// Failures of the comparison history store.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("history record not found: {0}")]
    NotFound(String),

    #[error("history database is unavailable (lock poisoned)")]
    LockPoisoned,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HistoryError {
    pub fn code(&self) -> i32 {
        match self {
            HistoryError::NotFound(_) => 3001,
            HistoryError::LockPoisoned => 3002,
            HistoryError::Database(_) => 3003,
            HistoryError::Json(_) => 3004,
            HistoryError::Io(_) => 3005,
        }
    }
}
