//! Comparison scenarios end to end through the public API.
//!
//! Rows are fed as backend-shaped JSON through an in-memory source so the
//! parsing, consistency and statistics paths run together.

use approx::assert_relative_eq;
use matcomp_common::stats::{self, HISTOGRAM_EDGES};
use matcomp_common::{
    BackendError, CompareError, ComparisonAggregator, ComparisonRequest, ErrorStatistics,
    HistoryStore, InMemoryPredictionSource, NewHistoryRecord, TaskResult,
};
use serde_json::{json, Value};

fn rows(target: &str, data: &[(i64, f64, f64)]) -> Vec<Value> {
    data.iter()
        .map(|&(idx, actual, predicted)| {
            json!({
                "sample_index": idx,
                target: actual,
                format!("{}_predicted", target): predicted,
                "split": "test",
            })
        })
        .collect()
}

fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn two_tasks_exact_agreement_distribution() {
    let source = InMemoryPredictionSource::new()
        .with_task("a", rows("y", &[(0, 10.0, 10.0), (1, 10.0, 10.0), (2, 5.0, 5.0)]))
        .with_task("b", rows("y", &[(0, 10.0, 10.0), (1, 10.0, 11.0), (2, 5.0, 5.0)]));

    let request = ComparisonRequest::new(ids(&["a", "b"]), ids(&["y"]), 0.0);
    let result = ComparisonAggregator::default()
        .compare_from_source(&request, &source)
        .unwrap();

    let levels: Vec<Option<usize>> = result
        .sample_details
        .iter()
        .map(|d| d.consistency_level)
        .collect();
    assert_eq!(levels, vec![Some(2), Some(1), Some(2)]);

    assert_eq!(result.total_samples, 3);
    assert_eq!(result.consistency_distribution.len(), 2);

    let agree = &result.consistency_distribution["All 2 tasks agree"];
    assert_eq!(agree.count, 2);
    assert_eq!(agree.level, 2);
    assert_relative_eq!(agree.percentage, 200.0 / 3.0, epsilon = 1e-9);

    let different = &result.consistency_distribution["All different"];
    assert_eq!(different.count, 1);
    assert_eq!(different.level, 1);
    assert_relative_eq!(different.percentage, 100.0 / 3.0, epsilon = 1e-9);
}

#[test]
fn zero_actual_is_excluded_from_error_metrics() {
    let task = TaskResult::from_rows(
        "solo",
        &rows("y", &[(0, 10.0, 11.0), (1, 20.0, 18.0), (2, 0.0, 5.0), (3, 30.0, 33.0)]),
        &ids(&["y"]),
    )
    .unwrap();
    assert_eq!(task.len(), 4);

    let metrics = ErrorStatistics::from_pairs(&task.scored_pairs("y"));
    assert_eq!(metrics.count, 3);
    assert_relative_eq!(metrics.mae, 2.0, epsilon = 1e-12);
    // 10%, 10%, 10%
    assert_relative_eq!(metrics.mape, 10.0, epsilon = 1e-9);
}

#[test]
fn empty_pair_set_yields_zeroes() {
    let metrics = ErrorStatistics::empty();
    assert_eq!(metrics.mae, 0.0);
    assert_eq!(metrics.rmse, 0.0);
    assert_eq!(metrics.r2, 0.0);
    assert_eq!(metrics.mape, 0.0);
    assert_eq!(metrics.count, 0);
    assert!(metrics.summary.is_none());
}

#[test]
fn single_task_request_is_rejected() {
    let source = InMemoryPredictionSource::new().with_task("a", rows("y", &[(0, 1.0, 1.0)]));
    let request = ComparisonRequest::new(ids(&["a"]), ids(&["y"]), 0.0);

    let err = ComparisonAggregator::default()
        .compare_from_source(&request, &source)
        .unwrap_err();
    assert_eq!(err, CompareError::TooFewTasks);
    assert_eq!(err.to_string(), "at least 2 tasks required");
    assert!(err.is_validation());
}

#[test]
fn constant_actual_gives_zero_r2() {
    let metrics = ErrorStatistics::from_pairs(&[(5.0, 4.0), (5.0, 6.0), (5.0, 5.0)]);
    assert_eq!(metrics.r2, 0.0);
    assert!(!metrics.r2.is_nan());
}

#[test]
fn histogram_over_fixed_edges() {
    let buckets = stats::histogram(&[3.0, 7.0, 100.0], &HISTOGRAM_EDGES);
    let labels: Vec<&str> = buckets.iter().map(|b| b.label.as_str()).collect();
    assert_eq!(
        labels,
        vec!["0-5%", "5-10%", "10-15%", "15-20%", "20-30%", ">50%"]
    );

    let counts: Vec<usize> = buckets.iter().map(|b| b.count).collect();
    assert_eq!(counts, vec![1, 1, 0, 0, 0, 1]);
    assert_eq!(buckets.last().unwrap().upper, None);
}

#[test]
fn own_metrics_use_all_rows_not_only_common_samples() {
    let source = InMemoryPredictionSource::new()
        .with_task("a", rows("y", &[(0, 10.0, 10.0), (1, 10.0, 12.0), (7, 4.0, 2.0)]))
        .with_task("b", rows("y", &[(0, 10.0, 10.0), (1, 10.0, 12.0)]));

    let request = ComparisonRequest::new(ids(&["a", "b"]), ids(&["y"]), 5.0);
    let result = ComparisonAggregator::default()
        .compare_from_source(&request, &source)
        .unwrap();

    assert_eq!(result.sample_details.len(), 2);
    assert_eq!(result.metrics("y", "a").unwrap().count, 3);
    assert_eq!(result.metrics("y", "b").unwrap().count, 2);
}

#[test]
fn target_without_common_samples_is_valid_and_empty() {
    let source = InMemoryPredictionSource::new()
        .with_task("a", rows("y", &[(0, 1.0, 1.0)]))
        .with_task("b", rows("y", &[(1, 1.0, 1.0)]));

    let request = ComparisonRequest::new(ids(&["a", "b"]), ids(&["y"]), 0.0);
    let result = ComparisonAggregator::default()
        .compare_from_source(&request, &source)
        .unwrap();

    assert_eq!(result.total_samples, 0);
    assert!(result.consistency_distribution.is_empty());
    assert_eq!(result.target_consistency["y"].total_samples, 0);
}

#[test]
fn unknown_task_surfaces_backend_error() {
    let source = InMemoryPredictionSource::new().with_task("a", rows("y", &[(0, 1.0, 1.0)]));
    let request = ComparisonRequest::new(ids(&["a", "ghost"]), ids(&["y"]), 0.0);

    let err = ComparisonAggregator::default()
        .compare_from_source(&request, &source)
        .unwrap_err();
    assert_eq!(
        err,
        CompareError::Backend(BackendError::TaskNotFound("ghost".to_string()))
    );
    assert!(!err.is_validation());
}

#[test]
fn malformed_row_is_rejected_with_position() {
    let mut bad = rows("y", &[(0, 1.0, 1.0)]);
    bad.push(json!({ "sample_index": 1, "y": "n/a", "y_predicted": 1.0 }));
    let source = InMemoryPredictionSource::new()
        .with_task("a", rows("y", &[(0, 1.0, 1.0)]))
        .with_task("b", bad);

    let request = ComparisonRequest::new(ids(&["a", "b"]), ids(&["y"]), 0.0);
    let err = ComparisonAggregator::default()
        .compare_from_source(&request, &source)
        .unwrap_err();
    match err {
        CompareError::MalformedRow { task_id, row, .. } => {
            assert_eq!(task_id, "b");
            assert_eq!(row, 1);
        }
        other => panic!("expected malformed row, got {:?}", other),
    }
}

#[test]
fn result_contains_no_nan_or_infinity() {
    let source = InMemoryPredictionSource::new()
        .with_task(
            "a",
            vec![
                json!({ "sample_index": 0, "y": 0.0, "y_predicted": 0.0 }),
                json!({ "sample_index": 1, "y": null, "y_predicted": 3.0 }),
                json!({ "sample_index": 2, "y": 2.0, "y_predicted": 2.0 }),
            ],
        )
        .with_task(
            "b",
            vec![
                json!({ "sample_index": 0, "y": 0.0, "y_predicted": 1.0 }),
                json!({ "sample_index": 2, "y": 2.0, "y_predicted": 2.0 }),
            ],
        );

    let request = ComparisonRequest::new(ids(&["a", "b"]), ids(&["y"]), 10.0);
    let result = ComparisonAggregator::default()
        .compare_from_source(&request, &source)
        .unwrap();

    // sample 0 has a zero actual, so only sample 2 is scored for either task
    assert_eq!(result.metrics("y", "a").unwrap().count, 1);
    assert_eq!(result.metrics("y", "b").unwrap().count, 1);
    for bucket in result.consistency_distribution.values() {
        assert!(bucket.percentage.is_finite());
    }
    for metrics in result.target_metrics["y"].values() {
        assert!(metrics.mae.is_finite());
        assert!(metrics.rmse.is_finite());
        assert!(metrics.r2.is_finite());
        assert!(metrics.mape.is_finite());
    }
}

#[test]
fn extreme_finite_values_keep_result_finite_and_storable() {
    let source = InMemoryPredictionSource::new()
        .with_task("a", rows("y", &[(0, 1e200, 3e200), (1, 2e200, 2e200)]))
        .with_task("b", rows("y", &[(0, 1e-300, 1e10), (1, 2.0, 2.0)]));

    let request = ComparisonRequest::new(ids(&["a", "b"]), ids(&["y"]), 5.0);
    let result = ComparisonAggregator::default()
        .compare_from_source(&request, &source)
        .unwrap();

    for metrics in result.target_metrics["y"].values() {
        for value in [metrics.mae, metrics.rmse, metrics.r2, metrics.mape] {
            assert!(value.is_finite(), "non-finite metric in {:?}", metrics);
        }
        let summary = metrics.summary.as_ref().unwrap();
        assert!(summary.mean.is_finite() && summary.std.is_finite());
    }
    assert_relative_eq!(result.metrics("y", "a").unwrap().r2, -7.0, max_relative = 1e-9);
    assert_eq!(result.metrics("y", "b").unwrap().mape, f64::MAX / 2.0);

    let store = HistoryStore::open_in_memory().unwrap();
    let saved = store
        .save(NewHistoryRecord::from_result(result.clone(), None))
        .unwrap();
    let loaded = store.get(&saved.id).unwrap().unwrap();
    assert_eq!(loaded.comparison_results, result);
}
