//! Cross-task prediction agreement.
//!
//! For one sample and one target, the consistency level is the size of the
//! largest cluster of predictions that agree under the configured tolerance.
//! Levels are then tallied into a labeled distribution.

use crate::error::CompareError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Floor for the magnitude used by relative tolerance, so two zeros agree.
pub const AGREEMENT_EPSILON: f64 = 1e-9;

/// Decimal places used for exact (zero-tolerance) comparison.
pub const DEFAULT_DISPLAY_PRECISION: u32 = 4;
pub const MAX_DISPLAY_PRECISION: u32 = 12;

/// How agreement edges are turned into clusters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterPolicy {
    /// Union-find over all pairwise agreement edges (transitively closed).
    #[default]
    Transitive,
    /// Largest set of predictions agreeing with a single reference prediction.
    Reference,
}

impl ClusterPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterPolicy::Transitive => "transitive",
            ClusterPolicy::Reference => "reference",
        }
    }
}

impl fmt::Display for ClusterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "transitive" | "union-find" => Ok(ClusterPolicy::Transitive),
            "reference" | "star" => Ok(ClusterPolicy::Reference),
            other => Err(format!(
                "unknown cluster policy '{}' (expected transitive or reference)",
                other
            )),
        }
    }
}

/// Agreement rule between two predicted values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    percent: f64,
    precision: u32,
}

impl Tolerance {
    pub fn new(percent: f64, precision: u32) -> Result<Self, CompareError> {
        if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
            return Err(CompareError::InvalidTolerance(percent));
        }
        if precision > MAX_DISPLAY_PRECISION {
            return Err(CompareError::InvalidPrecision {
                got: precision,
                max: MAX_DISPLAY_PRECISION,
            });
        }
        Ok(Self { percent, precision })
    }

    /// Two values agree when they are equal at display precision, or, with a
    /// positive tolerance, when `|a - b| <= pct/100 * max(|a|, |b|, eps)`.
    pub fn agrees(&self, a: f64, b: f64) -> bool {
        if equal_at_precision(a, b, self.precision) {
            return true;
        }
        if self.percent == 0.0 {
            return false;
        }
        let scale = a.abs().max(b.abs()).max(AGREEMENT_EPSILON);
        (a - b).abs() <= self.percent / 100.0 * scale
    }
}

/// Values too large to scale by `10^precision` are compared exactly.
fn equal_at_precision(a: f64, b: f64, precision: u32) -> bool {
    let factor = 10f64.powi(precision as i32);
    let (scaled_a, scaled_b) = (a * factor, b * factor);
    if scaled_a.is_finite() && scaled_b.is_finite() {
        scaled_a.round() == scaled_b.round()
    } else {
        a == b
    }
}

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            let next = self.parent[x];
            self.parent[x] = self.parent[next]; // path halving
            x = next;
        }
        x
    }

    fn union(&mut self, x: usize, y: usize) {
        let (rx, ry) = (self.find(x), self.find(y));
        if rx == ry {
            return;
        }
        let (root, child) = match self.rank[rx].cmp(&self.rank[ry]) {
            std::cmp::Ordering::Less => (ry, rx),
            std::cmp::Ordering::Greater => (rx, ry),
            std::cmp::Ordering::Equal => {
                self.rank[rx] += 1;
                (rx, ry)
            }
        };
        self.parent[child] = root;
        self.size[root] += self.size[child];
    }

    fn largest(&mut self) -> usize {
        (0..self.parent.len())
            .map(|i| {
                let root = self.find(i);
                self.size[root]
            })
            .max()
            .unwrap_or(0)
    }
}

/// Computes consistency levels for one target under a fixed tolerance.
#[derive(Debug, Clone, Copy)]
pub struct ConsistencyEngine {
    tolerance: Tolerance,
    policy: ClusterPolicy,
}

impl ConsistencyEngine {
    pub fn new(tolerance: Tolerance, policy: ClusterPolicy) -> Self {
        Self { tolerance, policy }
    }

    /// Level for one sample's predictions, or `None` when fewer than two
    /// finite predictions are available.
    pub fn level(&self, predictions: &[f64]) -> Option<usize> {
        let values: Vec<f64> = predictions.iter().copied().filter(|v| v.is_finite()).collect();
        if values.len() < 2 {
            return None;
        }

        let level = match self.policy {
            ClusterPolicy::Transitive => self.largest_transitive_cluster(&values),
            ClusterPolicy::Reference => self.largest_reference_cluster(&values),
        };
        Some(level)
    }

    fn largest_transitive_cluster(&self, values: &[f64]) -> usize {
        let mut set = DisjointSet::new(values.len());
        for i in 0..values.len() {
            for j in (i + 1)..values.len() {
                if self.tolerance.agrees(values[i], values[j]) {
                    set.union(i, j);
                }
            }
        }
        set.largest()
    }

    fn largest_reference_cluster(&self, values: &[f64]) -> usize {
        values
            .iter()
            .map(|&reference| {
                values
                    .iter()
                    .filter(|&&other| self.tolerance.agrees(reference, other))
                    .count()
            })
            .max()
            .unwrap_or(0)
    }
}

/// One labeled entry of a [`ConsistencyDistribution`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionBucket {
    pub count: usize,
    pub percentage: f64,
    pub level: usize,
}

/// Bucket label -> bucket.
pub type ConsistencyDistribution = BTreeMap<String, DistributionBucket>;

pub fn level_label(level: usize, n_tasks: usize) -> String {
    if level == n_tasks {
        format!("All {} tasks agree", n_tasks)
    } else if level <= 1 {
        "All different".to_string()
    } else {
        format!("Exactly {} tasks agree", level)
    }
}

/// Levels that always get a bucket: N, N-1 (N > 2), 2 (N > 3) and 1.
pub fn canonical_levels(n_tasks: usize) -> Vec<usize> {
    let mut levels = vec![n_tasks];
    if n_tasks > 2 {
        levels.push(n_tasks - 1);
    }
    if n_tasks > 3 {
        levels.push(2);
    }
    if n_tasks > 1 {
        levels.push(1);
    }
    levels.dedup();
    levels
}

/// Tally per-sample levels into labeled buckets. Empty input yields an
/// empty distribution.
pub fn build_distribution(levels: &[usize], n_tasks: usize) -> ConsistencyDistribution {
    let mut distribution = ConsistencyDistribution::new();
    let total = levels.len();
    if total == 0 {
        return distribution;
    }

    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for &level in canonical_levels(n_tasks).iter() {
        counts.insert(level, 0);
    }
    for &level in levels {
        *counts.entry(level).or_insert(0) += 1;
    }

    for (level, count) in counts {
        distribution.insert(
            level_label(level, n_tasks),
            DistributionBucket {
                count,
                percentage: 100.0 * count as f64 / total as f64,
                level,
            },
        );
    }
    distribution
}

/// Buckets ordered from full agreement down to "All different".
pub fn buckets_by_level(distribution: &ConsistencyDistribution) -> Vec<(&str, &DistributionBucket)> {
    let mut buckets: Vec<(&str, &DistributionBucket)> = distribution
        .iter()
        .map(|(label, bucket)| (label.as_str(), bucket))
        .collect();
    buckets.sort_by(|a, b| b.1.level.cmp(&a.1.level));
    buckets
}
