//! matcomp common - comparison engine shared by matcompd and matcompctl
//!
//! Consistency clustering across tasks, per-task error statistics,
//! backend access, comparison history and configuration.

pub mod backend;
pub mod comparison;
pub mod config;
pub mod consistency;
pub mod error;
pub mod history;
pub mod stats;
pub mod types;

pub use backend::{HttpPredictionSource, InMemoryPredictionSource, PredictionSource};
pub use comparison::*;
pub use config::Config;
pub use consistency::{ClusterPolicy, ConsistencyDistribution, DistributionBucket, Tolerance};
pub use error::{BackendError, CompareError, HistoryError};
pub use history::{HistoryRecord, HistoryStore, HistorySummary, NewHistoryRecord};
pub use stats::{ErrorStatistics, Severity};
pub use types::{PredictionRow, TargetValue, TaskResult};
