//! Property tests for the comparison engine.
//!
//! Randomized inputs from a seeded xorshift generator, so failures are
//! reproducible without an external property-testing crate.
//!
//! ## Invariants
//!
//! - Identical inputs give identical results
//! - Distribution counts sum to total_samples, percentages to 100
//! - A higher tolerance never lowers a sample's level
//! - Every error value lands in exactly one histogram bucket
//! - MAE and RMSE are never negative

use approx::assert_relative_eq;
use matcomp_common::consistency::{ConsistencyEngine, Tolerance};
use matcomp_common::stats::{self, HISTOGRAM_EDGES};
use matcomp_common::{
    ClusterPolicy, ComparisonAggregator, ComparisonRequest, PredictionRow, TaskResult,
};

// ============================================================================
// TEST HELPERS
// ============================================================================

/// xorshift64
struct TestRng {
    state: u64,
}

impl TestRng {
    fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() as f64) / (u64::MAX as f64)
    }

    fn next_range(&mut self, min: u64, max: u64) -> u64 {
        if max <= min {
            return min;
        }
        min + (self.next_u64() % (max - min))
    }

    /// Values clustered on a coarse grid so exact ties actually happen.
    fn next_prediction(&mut self) -> f64 {
        (self.next_range(0, 40) as f64) * 0.5 + if self.next_range(0, 4) == 0 { self.next_f64() } else { 0.0 }
    }
}

fn random_tasks(rng: &mut TestRng, n_tasks: usize, n_samples: i64) -> Vec<TaskResult> {
    (0..n_tasks)
        .map(|t| {
            let mut task = TaskResult::new(format!("task-{}", t));
            for idx in 0..n_samples {
                // some tasks skip some samples, some rows miss a prediction
                if rng.next_range(0, 10) == 0 {
                    continue;
                }
                let actual = Some(rng.next_range(0, 20) as f64);
                let predicted = if rng.next_range(0, 12) == 0 {
                    None
                } else {
                    Some(rng.next_prediction())
                };
                task.insert(
                    PredictionRow::new(idx)
                        .with_target("y", actual, predicted)
                        .with_target("z", actual.map(|a| a * 2.0), Some(rng.next_prediction())),
                )
                .unwrap();
            }
            task
        })
        .collect()
}

fn request_for(tasks: &[TaskResult], tolerance: f64) -> ComparisonRequest {
    ComparisonRequest::new(
        tasks.iter().map(|t| t.task_id.clone()).collect(),
        vec!["y".to_string(), "z".to_string()],
        tolerance,
    )
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn prop_comparison_is_idempotent() {
    let mut rng = TestRng::new(7);
    for _ in 0..50 {
        let n_tasks = rng.next_range(2, 6) as usize;
        let tasks = random_tasks(&mut rng, n_tasks, 30);
        let tolerance = rng.next_range(0, 25) as f64;
        let request = request_for(&tasks, tolerance);

        let aggregator = ComparisonAggregator::default();
        let first = aggregator.compare_tasks(&request, &tasks).unwrap();
        let second = aggregator.compare_tasks(&request, &tasks).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}

// ============================================================================
// Distribution completeness
// ============================================================================

#[test]
fn prop_distribution_is_complete() {
    let mut rng = TestRng::new(42);
    for _ in 0..100 {
        let n_tasks = rng.next_range(2, 7) as usize;
        let tasks = random_tasks(&mut rng, n_tasks, 25);
        let request = request_for(&tasks, rng.next_range(0, 15) as f64);
        let result = ComparisonAggregator::default()
            .compare_tasks(&request, &tasks)
            .unwrap();

        let distributions = std::iter::once((result.total_samples, &result.consistency_distribution))
            .chain(
                result
                    .target_consistency
                    .values()
                    .map(|t| (t.total_samples, &t.distribution)),
            );

        for (total, distribution) in distributions {
            let count: usize = distribution.values().map(|b| b.count).sum();
            assert_eq!(count, total);
            if total > 0 {
                let percentage: f64 = distribution.values().map(|b| b.percentage).sum();
                assert_relative_eq!(percentage, 100.0, epsilon = 1e-9);
            } else {
                assert!(distribution.is_empty());
            }
            for bucket in distribution.values() {
                assert!(bucket.level >= 1 && bucket.level <= n_tasks);
            }
        }
    }
}

// ============================================================================
// Tolerance monotonicity
// ============================================================================

#[test]
fn prop_tolerance_is_monotonic() {
    let mut rng = TestRng::new(1234);
    for policy in [ClusterPolicy::Transitive, ClusterPolicy::Reference] {
        for _ in 0..500 {
            let n = rng.next_range(2, 8) as usize;
            let predictions: Vec<f64> = (0..n).map(|_| rng.next_prediction()).collect();

            let mut previous = 0;
            for pct in [0.0, 0.5, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0] {
                let engine = ConsistencyEngine::new(Tolerance::new(pct, 4).unwrap(), policy);
                let level = engine.level(&predictions).unwrap();
                assert!(
                    level >= previous,
                    "{:?} level dropped from {} to {} at {}% for {:?}",
                    policy,
                    previous,
                    level,
                    pct,
                    predictions
                );
                assert!(level >= 1 && level <= n);
                previous = level;
            }
        }
    }
}

#[test]
fn prop_transitive_level_never_below_reference() {
    let mut rng = TestRng::new(99);
    for _ in 0..500 {
        let n = rng.next_range(2, 8) as usize;
        let predictions: Vec<f64> = (0..n).map(|_| rng.next_prediction()).collect();
        let tolerance = Tolerance::new(rng.next_range(0, 30) as f64, 4).unwrap();

        let transitive = ConsistencyEngine::new(tolerance, ClusterPolicy::Transitive)
            .level(&predictions)
            .unwrap();
        let reference = ConsistencyEngine::new(tolerance, ClusterPolicy::Reference)
            .level(&predictions)
            .unwrap();
        assert!(transitive >= reference);
    }
}

// ============================================================================
// Histogram coverage
// ============================================================================

#[test]
fn prop_histogram_covers_every_value_once() {
    let mut rng = TestRng::new(5);
    for _ in 0..200 {
        let n = rng.next_range(0, 60) as usize;
        let values: Vec<f64> = (0..n).map(|_| rng.next_f64() * 250.0).collect();
        let buckets = stats::histogram(&values, &HISTOGRAM_EDGES);

        let total: usize = buckets.iter().map(|b| b.count).sum();
        assert_eq!(total, values.len());

        for &v in &values {
            let containing = buckets
                .iter()
                .filter(|b| v >= b.lower && b.upper.map_or(true, |u| v < u))
                .count();
            assert_eq!(containing, 1, "value {} in {} buckets", v, containing);
        }

        // the first five buckets are always present
        assert!(buckets.len() >= 5);
        assert_eq!(buckets[0].lower, 0.0);
    }
}

// ============================================================================
// Metric bounds
// ============================================================================

#[test]
fn prop_mae_rmse_non_negative() {
    let mut rng = TestRng::new(2024);
    for _ in 0..300 {
        let n = rng.next_range(0, 40) as usize;
        let pairs: Vec<(f64, f64)> = (0..n)
            .map(|_| (rng.next_f64() * 200.0 - 100.0, rng.next_f64() * 200.0 - 100.0))
            .collect();

        let mae = stats::mae(&pairs);
        let rmse = stats::rmse(&pairs);
        assert!(mae >= 0.0);
        assert!(rmse >= 0.0);
        assert!(stats::r2(&pairs).is_finite());
    }
}

#[test]
fn prop_rmse_equals_mae_for_equal_magnitude_errors() {
    let mut rng = TestRng::new(77);
    for _ in 0..100 {
        let n = rng.next_range(1, 30) as usize;
        let magnitude = rng.next_f64() * 10.0;
        let pairs: Vec<(f64, f64)> = (0..n)
            .map(|i| {
                let actual = rng.next_f64() * 50.0 + 1.0;
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                (actual, actual + sign * magnitude)
            })
            .collect();

        assert_relative_eq!(stats::mae(&pairs), stats::rmse(&pairs), epsilon = 1e-9);
    }
}
