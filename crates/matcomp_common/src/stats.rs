//! Regression error statistics over actual-vs-predicted pairs.
//!
//! Every function here is pure and total over finite input: empty input
//! yields zeros (or `None` for summaries), never NaN or infinity.

use serde::{Deserialize, Serialize};

/// `(actual, predicted)`
pub type Pair = (f64, f64);

/// Fixed relative-error histogram edges, in percent.
pub const HISTOGRAM_EDGES: [f64; 8] = [0.0, 5.0, 10.0, 15.0, 20.0, 30.0, 50.0, 100.0];

/// Buckets whose lower edge is below this are emitted even when empty.
pub const HISTOGRAM_ALWAYS_SHOWN_BELOW: f64 = 30.0;

/// Clamp into the finite range. Overflowing magnitudes saturate at
/// `f64::MAX`; NaN has no magnitude and becomes 0.
fn saturate(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-f64::MAX, f64::MAX)
    }
}

/// Mean of finite values that stays finite when their sum would overflow.
fn mean_of(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let sum: f64 = values.iter().sum();
    if sum.is_finite() {
        sum / n
    } else {
        values.iter().map(|v| v / n).sum()
    }
}

/// Root of the mean square, scaled by the largest magnitude on overflow.
fn root_mean_square(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let direct = (values.iter().map(|v| v * v).sum::<f64>() / n).sqrt();
    if direct.is_finite() {
        return direct;
    }
    let scale = values.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let scaled = values.iter().map(|v| (v / scale).powi(2)).sum::<f64>() / n;
    saturate(scaled.sqrt() * scale)
}

fn absolute_errors(pairs: &[Pair]) -> Vec<f64> {
    pairs.iter().map(|(a, p)| saturate((a - p).abs())).collect()
}

/// Mean absolute error.
pub fn mae(pairs: &[Pair]) -> f64 {
    mean_of(&absolute_errors(pairs))
}

/// Root mean squared error.
pub fn rmse(pairs: &[Pair]) -> f64 {
    root_mean_square(&absolute_errors(pairs))
}

/// Coefficient of determination.
///
/// A constant (or empty) actual series has no variance to explain, so the
/// result is exactly `0.0` instead of NaN.
pub fn r2(pairs: &[Pair]) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }

    let (ss_res, ss_tot) = match squared_sums(pairs, 1.0) {
        (res, tot) if res.is_finite() && tot.is_finite() => (res, tot),
        _ => {
            // the ratio is scale free, so recompute on values in [-1, 1]
            let scale = pairs
                .iter()
                .fold(0.0f64, |m, (a, p)| m.max(a.abs()).max(p.abs()));
            squared_sums(pairs, scale)
        }
    };

    if ss_tot == 0.0 {
        return 0.0;
    }

    saturate(1.0 - ss_res / ss_tot)
}

/// Residual and total sums of squares over `pairs` divided by `scale`.
fn squared_sums(pairs: &[Pair], scale: f64) -> (f64, f64) {
    let n = pairs.len() as f64;
    let mean_actual = pairs.iter().map(|(a, _)| a / scale).sum::<f64>() / n;
    let ss_res = pairs
        .iter()
        .map(|(a, p)| (a / scale - p / scale).powi(2))
        .sum();
    let ss_tot = pairs
        .iter()
        .map(|(a, _)| (a / scale - mean_actual).powi(2))
        .sum();
    (ss_res, ss_tot)
}

/// Mean absolute percentage error, in percent.
///
/// Callers filter out zero actual values; any that slip through are skipped.
pub fn mape(pairs: &[Pair]) -> f64 {
    let errors: Vec<f64> = pairs
        .iter()
        .filter_map(|&(a, p)| relative_error_percent(a, p))
        .collect();
    mean_of(&errors)
}

/// `|actual - predicted| / |actual| * 100`, undefined for a zero actual.
/// Errors too large to represent saturate at `f64::MAX`.
pub fn relative_error_percent(actual: f64, predicted: f64) -> Option<f64> {
    if actual == 0.0 || !actual.is_finite() || !predicted.is_finite() {
        return None;
    }
    Some(saturate((actual - predicted).abs() / actual.abs() * 100.0))
}

fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Floor-indexed quartiles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
}

/// Quartiles by index `floor(n * q)` into the sorted values, no interpolation.
pub fn percentiles(values: &[f64]) -> Option<Percentiles> {
    let sorted = sorted_finite(values);
    percentiles_sorted(&sorted)
}

fn percentiles_sorted(sorted: &[f64]) -> Option<Percentiles> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let at = |q: f64| sorted[((n as f64 * q).floor() as usize).min(n - 1)];
    Some(Percentiles {
        q1: at(0.25),
        median: sorted[n / 2],
        q3: at(0.75),
    })
}

/// Descriptive summary of a set of relative errors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub q1: f64,
    pub q3: f64,
}

pub fn summarize(values: &[f64]) -> Option<ErrorSummary> {
    let sorted = sorted_finite(values);
    let quartiles = percentiles_sorted(&sorted)?;
    let mean = mean_of(&sorted);
    let deviations: Vec<f64> = sorted.iter().map(|v| saturate(v - mean)).collect();

    Some(ErrorSummary {
        mean,
        median: quartiles.median,
        std: root_mean_square(&deviations),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        q1: quartiles.q1,
        q3: quartiles.q3,
    })
}

/// One histogram bucket. `upper == None` marks the open-ended last bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub label: String,
    pub lower: f64,
    pub upper: Option<f64>,
    pub count: usize,
}

/// Bucket `values` by `edges`.
///
/// Buckets are `[edges[i], edges[i+1])` except the last, which is
/// `[edges[len-2], inf)` and labeled `>{edges[len-2]}%`. Values below the
/// first edge count toward the first bucket. Empty buckets are dropped
/// unless their lower edge is below [`HISTOGRAM_ALWAYS_SHOWN_BELOW`].
pub fn histogram(values: &[f64], edges: &[f64]) -> Vec<HistogramBucket> {
    if edges.len() < 2 {
        return Vec::new();
    }
    let last = edges.len() - 2;

    let mut counts = vec![0usize; last + 1];
    for &v in values.iter().filter(|v| !v.is_nan()) {
        let slot = (0..last)
            .find(|&i| v < edges[i + 1])
            .unwrap_or(last);
        counts[slot] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .filter_map(|(i, count)| {
            let lower = edges[i];
            if count == 0 && lower >= HISTOGRAM_ALWAYS_SHOWN_BELOW {
                return None;
            }
            let (label, upper) = if i == last {
                (format!(">{}%", lower), None)
            } else {
                (format!("{}-{}%", lower, edges[i + 1]), Some(edges[i + 1]))
            };
            Some(HistogramBucket {
                label,
                lower,
                upper,
                count,
            })
        })
        .collect()
}

/// Counts of relative errors strictly below 5, 10 and 20 percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBands {
    pub within_5: usize,
    pub within_10: usize,
    pub within_20: usize,
}

pub fn error_bands(values: &[f64]) -> ErrorBands {
    let below = |limit: f64| values.iter().filter(|&&v| v < limit).count();
    ErrorBands {
        within_5: below(5.0),
        within_10: below(10.0),
        within_20: below(20.0),
    }
}

/// Ordinal error-magnitude tier used to color charts and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Excellent,
    Good,
    Fair,
    Moderate,
    Poor,
    Severe,
}

impl Severity {
    /// Classify an error percentage. NaN is treated as the worst tier.
    pub fn classify(error_percent: f64) -> Self {
        let e = error_percent.abs();
        if e < 5.0 {
            Severity::Excellent
        } else if e < 10.0 {
            Severity::Good
        } else if e < 15.0 {
            Severity::Fair
        } else if e < 20.0 {
            Severity::Moderate
        } else if e < 30.0 {
            Severity::Poor
        } else {
            Severity::Severe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Excellent => "excellent",
            Severity::Good => "good",
            Severity::Fair => "fair",
            Severity::Moderate => "moderate",
            Severity::Poor => "poor",
            Severity::Severe => "severe",
        }
    }

    /// Display color as `#rrggbb`.
    pub fn color(&self) -> &'static str {
        match self {
            Severity::Excellent => "#10b981",
            Severity::Good => "#84cc16",
            Severity::Fair => "#eab308",
            Severity::Moderate => "#f97316",
            Severity::Poor => "#ef4444",
            Severity::Severe => "#991b1b",
        }
    }

    /// Color as an RGB triple for terminal renderers.
    pub fn rgb(&self) -> (u8, u8, u8) {
        let hex = &self.color()[1..];
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(0);
        (channel(0), channel(2), channel(4))
    }
}

/// Error metrics for one task and one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorStatistics {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    pub mape: f64,
    pub count: usize,
    /// Summary of relative errors (percent); absent when there are none
    pub summary: Option<ErrorSummary>,
    pub bands: ErrorBands,
    pub histogram: Vec<HistogramBucket>,
}

impl ErrorStatistics {
    pub fn from_pairs(pairs: &[Pair]) -> Self {
        let relative: Vec<f64> = pairs
            .iter()
            .filter_map(|&(a, p)| relative_error_percent(a, p))
            .collect();

        Self {
            mae: mae(pairs),
            rmse: rmse(pairs),
            r2: r2(pairs),
            mape: mape(pairs),
            count: pairs.len(),
            summary: summarize(&relative),
            bands: error_bands(&relative),
            histogram: histogram(&relative, &HISTOGRAM_EDGES),
        }
    }

    pub fn empty() -> Self {
        Self::from_pairs(&[])
    }

    pub fn severity(&self) -> Severity {
        Severity::classify(self.mape)
    }
}
