//! Multi-task comparison.
//!
//! Runs the consistency engine over the samples shared by all tasks and the
//! statistics kernel over each task's own rows, per target column, and
//! merges everything into one [`ComparisonResult`].

use crate::backend::PredictionSource;
use crate::consistency::{
    build_distribution, ClusterPolicy, ConsistencyDistribution, ConsistencyEngine, Tolerance,
    DEFAULT_DISPLAY_PRECISION,
};
use crate::error::CompareError;
use crate::stats::{relative_error_percent, ErrorStatistics, Severity};
use crate::types::TaskResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info};

/// What the caller asks to compare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRequest {
    pub task_ids: Vec<String>,
    pub target_columns: Vec<String>,
    /// Agreement tolerance in percent (0-100)
    #[serde(default)]
    pub tolerance: f64,
    /// Overrides the configured cluster policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_policy: Option<ClusterPolicy>,
}

impl ComparisonRequest {
    pub fn new(task_ids: Vec<String>, target_columns: Vec<String>, tolerance: f64) -> Self {
        Self {
            task_ids,
            target_columns,
            tolerance,
            cluster_policy: None,
        }
    }

    /// Reject requests the comparison is undefined for.
    pub fn validate(&self) -> Result<(), CompareError> {
        if self.task_ids.len() < 2 {
            return Err(CompareError::TooFewTasks);
        }
        if self.target_columns.is_empty() {
            return Err(CompareError::NoTargets);
        }

        let mut seen = HashSet::new();
        for id in &self.task_ids {
            if !seen.insert(id.as_str()) {
                return Err(CompareError::DuplicateTask(id.clone()));
            }
        }

        let mut seen = HashSet::new();
        for target in &self.target_columns {
            if target.trim().is_empty() {
                return Err(CompareError::EmptyTargetName);
            }
            if !seen.insert(target.as_str()) {
                return Err(CompareError::DuplicateTarget(target.clone()));
            }
        }

        Tolerance::new(self.tolerance, 0)?;
        Ok(())
    }
}

/// Engine settings that do not come with each request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComparisonOptions {
    pub cluster_policy: ClusterPolicy,
    pub display_precision: u32,
}

impl Default for ComparisonOptions {
    fn default() -> Self {
        Self {
            cluster_policy: ClusterPolicy::default(),
            display_precision: DEFAULT_DISPLAY_PRECISION,
        }
    }
}

/// One task's value for one sample and target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPrediction {
    pub predicted: Option<f64>,
    pub error_percent: Option<f64>,
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDetail {
    pub actual: Option<f64>,
    pub consistency_level: Option<usize>,
    /// task_id -> prediction
    pub predictions: BTreeMap<String, TaskPrediction>,
}

/// Everything known about one common sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleDetail {
    pub sample_index: i64,
    /// Lowest per-target level; `None` if the sample qualified nowhere
    pub consistency_level: Option<usize>,
    pub targets: BTreeMap<String, TargetDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConsistency {
    pub total_samples: usize,
    pub distribution: ConsistencyDistribution,
}

/// The consolidated, persistable output of one comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub task_ids: Vec<String>,
    pub target_columns: Vec<String>,
    pub n_tasks: usize,
    pub tolerance: f64,
    pub cluster_policy: ClusterPolicy,
    pub total_samples: usize,
    pub consistency_distribution: ConsistencyDistribution,
    pub target_consistency: BTreeMap<String, TargetConsistency>,
    pub sample_details: Vec<SampleDetail>,
    /// target -> task_id -> statistics
    pub target_metrics: BTreeMap<String, BTreeMap<String, ErrorStatistics>>,
}

impl ComparisonResult {
    pub fn metrics(&self, target: &str, task_id: &str) -> Option<&ErrorStatistics> {
        self.target_metrics.get(target)?.get(task_id)
    }
}

/// Stateless orchestrator; every call is independent.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComparisonAggregator {
    options: ComparisonOptions,
}

impl ComparisonAggregator {
    pub fn new(options: ComparisonOptions) -> Self {
        Self { options }
    }

    /// Fetch every task through `source`, then compare.
    pub fn compare_from_source(
        &self,
        request: &ComparisonRequest,
        source: &dyn PredictionSource,
    ) -> Result<ComparisonResult, CompareError> {
        request.validate()?;

        let mut tasks = Vec::with_capacity(request.task_ids.len());
        for task_id in &request.task_ids {
            let rows = source.fetch_predictions(task_id)?;
            debug!("Fetched {} rows for task {}", rows.len(), task_id);
            tasks.push(TaskResult::from_rows(task_id, &rows, &request.target_columns)?);
        }

        self.compare_tasks(request, &tasks)
    }

    /// Compare already-parsed tasks. Tasks not named in the request are ignored.
    pub fn compare_tasks(
        &self,
        request: &ComparisonRequest,
        tasks: &[TaskResult],
    ) -> Result<ComparisonResult, CompareError> {
        request.validate()?;

        let policy = request.cluster_policy.unwrap_or(self.options.cluster_policy);
        let tolerance = Tolerance::new(request.tolerance, self.options.display_precision)?;
        let engine = ConsistencyEngine::new(tolerance, policy);

        let ordered: Vec<&TaskResult> = request
            .task_ids
            .iter()
            .map(|id| {
                tasks
                    .iter()
                    .find(|t| &t.task_id == id)
                    .ok_or_else(|| CompareError::MissingTask(id.clone()))
            })
            .collect::<Result<_, _>>()?;
        let n_tasks = ordered.len();

        let common = common_samples(&ordered);
        debug!(
            "Comparing {} tasks over {} common samples, {} targets",
            n_tasks,
            common.len(),
            request.target_columns.len()
        );

        let mut sample_details: Vec<SampleDetail> = common
            .iter()
            .map(|&sample_index| SampleDetail {
                sample_index,
                consistency_level: None,
                targets: BTreeMap::new(),
            })
            .collect();

        let mut target_consistency = BTreeMap::new();
        let mut target_metrics = BTreeMap::new();

        for target in &request.target_columns {
            let mut levels = Vec::new();

            for detail in sample_details.iter_mut() {
                let target_detail = build_target_detail(&engine, &ordered, detail.sample_index, target);
                if let Some(level) = target_detail.consistency_level {
                    levels.push(level);
                    detail.consistency_level = Some(
                        detail
                            .consistency_level
                            .map_or(level, |current| current.min(level)),
                    );
                }
                detail.targets.insert(target.clone(), target_detail);
            }

            target_consistency.insert(
                target.clone(),
                TargetConsistency {
                    total_samples: levels.len(),
                    distribution: build_distribution(&levels, n_tasks),
                },
            );

            let per_task: BTreeMap<String, ErrorStatistics> = ordered
                .iter()
                .map(|task| {
                    let stats = ErrorStatistics::from_pairs(&task.scored_pairs(target));
                    (task.task_id.clone(), stats)
                })
                .collect();
            target_metrics.insert(target.clone(), per_task);
        }

        let overall: Vec<usize> = sample_details
            .iter()
            .filter_map(|d| d.consistency_level)
            .collect();

        info!(
            "Comparison done: {} tasks, {} of {} common samples scored",
            n_tasks,
            overall.len(),
            common.len()
        );

        Ok(ComparisonResult {
            task_ids: request.task_ids.clone(),
            target_columns: request.target_columns.clone(),
            n_tasks,
            tolerance: request.tolerance,
            cluster_policy: policy,
            total_samples: overall.len(),
            consistency_distribution: build_distribution(&overall, n_tasks),
            target_consistency,
            sample_details,
            target_metrics,
        })
    }
}

/// Sample indices present in every task.
fn common_samples(tasks: &[&TaskResult]) -> Vec<i64> {
    let Some((first, rest)) = tasks.split_first() else {
        return Vec::new();
    };
    let mut common: BTreeSet<i64> = first.sample_indices().collect();
    for task in rest {
        common.retain(|idx| task.get(*idx).is_some());
    }
    common.into_iter().collect()
}

fn build_target_detail(
    engine: &ConsistencyEngine,
    tasks: &[&TaskResult],
    sample_index: i64,
    target: &str,
) -> TargetDetail {
    let mut actual = None;
    let mut agreeing_inputs = Vec::with_capacity(tasks.len());
    let mut predictions = BTreeMap::new();

    for task in tasks {
        let value = task
            .get(sample_index)
            .and_then(|row| row.target(target))
            .copied()
            .unwrap_or_default();

        if actual.is_none() {
            actual = value.actual;
        }
        if let Some((_, predicted)) = value.pair() {
            agreeing_inputs.push(predicted);
        }

        let error_percent = value
            .pair()
            .and_then(|(a, p)| relative_error_percent(a, p));
        predictions.insert(
            task.task_id.clone(),
            TaskPrediction {
                predicted: value.predicted,
                error_percent,
                severity: error_percent.map(Severity::classify),
            },
        );
    }

    TargetDetail {
        actual,
        consistency_level: engine.level(&agreeing_inputs),
        predictions,
    }
}
