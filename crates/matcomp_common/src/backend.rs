//! Prediction backend access.
//!
//! The task-orchestration backend owns datasets and prediction runs; all we
//! need from it is `GET /results/{task_id}` -> `{ "predictions": [...] }`.
//! An in-memory source backs tests and inline comparisons.

use crate::error::BackendError;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Body of `GET /results/{task_id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionsResponse {
    #[serde(default)]
    pub predictions: Vec<Value>,
}

/// Anything that can hand over a task's raw prediction rows.
pub trait PredictionSource: Send + Sync {
    fn fetch_predictions(&self, task_id: &str) -> Result<Vec<Value>, BackendError>;
}

/// Backend reached over HTTP with a blocking client.
///
/// A client is built per fetch so the source can be shared with async code
/// and only ever touched from blocking workers.
#[derive(Debug, Clone)]
pub struct HttpPredictionSource {
    base_url: String,
    timeout: Duration,
}

impl HttpPredictionSource {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of one task's results, with the id encoded as one path segment.
    pub fn results_url(&self, task_id: &str) -> Result<Url, BackendError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| BackendError::Http(format!("Invalid backend URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| BackendError::Http(format!("Backend URL cannot have a path: {}", self.base_url)))?
            .pop_if_empty()
            .push("results")
            .push(task_id);
        Ok(url)
    }
}

impl PredictionSource for HttpPredictionSource {
    fn fetch_predictions(&self, task_id: &str) -> Result<Vec<Value>, BackendError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| BackendError::Http(format!("Failed to create HTTP client: {}", e)))?;

        let url = self.results_url(task_id)?;
        debug!("GET {}", url);

        let response = client
            .get(url)
            .send()
            .map_err(|e| BackendError::Http(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BackendError::TaskNotFound(task_id.to_string()));
        }
        if !status.is_success() {
            warn!("Backend returned {} for task {}", status, task_id);
            return Err(BackendError::Status {
                task_id: task_id.to_string(),
                status: status.as_u16(),
            });
        }

        let body: PredictionsResponse = response
            .json()
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        Ok(body.predictions)
    }
}

/// Fixed rows per task, held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPredictionSource {
    tasks: HashMap<String, Vec<Value>>,
}

impl InMemoryPredictionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, task_id: impl Into<String>, rows: Vec<Value>) {
        self.tasks.insert(task_id.into(), rows);
    }

    pub fn with_task(mut self, task_id: impl Into<String>, rows: Vec<Value>) -> Self {
        self.insert(task_id, rows);
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl PredictionSource for InMemoryPredictionSource {
    fn fetch_predictions(&self, task_id: &str) -> Result<Vec<Value>, BackendError> {
        self.tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| BackendError::TaskNotFound(task_id.to_string()))
    }
}
