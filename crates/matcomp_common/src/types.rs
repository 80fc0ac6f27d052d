//! Typed prediction rows.
//!
//! Backend rows are loose JSON objects carrying `<target>` and
//! `<target>_predicted` fields next to arbitrary extras. They are parsed
//! against the declared target columns; undeclared fields are dropped.

use crate::error::CompareError;
use crate::stats::Pair;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const SAMPLE_INDEX_FIELD: &str = "sample_index";
pub const PREDICTED_SUFFIX: &str = "_predicted";

/// Name of the predicted-value field for a target column.
pub fn predicted_column(target: &str) -> String {
    format!("{}{}", target, PREDICTED_SUFFIX)
}

/// Actual and predicted value of one target for one sample.
/// Non-finite inputs are stored as `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetValue {
    pub actual: Option<f64>,
    pub predicted: Option<f64>,
}

impl TargetValue {
    pub fn new(actual: Option<f64>, predicted: Option<f64>) -> Self {
        Self {
            actual: actual.filter(|v| v.is_finite()),
            predicted: predicted.filter(|v| v.is_finite()),
        }
    }

    /// Both values present; usable for agreement checks.
    pub fn pair(&self) -> Option<Pair> {
        match (self.actual, self.predicted) {
            (Some(a), Some(p)) => Some((a, p)),
            _ => None,
        }
    }

    /// Usable for error statistics: both present and a non-zero actual.
    pub fn scored_pair(&self) -> Option<Pair> {
        self.pair().filter(|(a, _)| *a != 0.0)
    }
}

/// One sample's outcome from one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub sample_index: i64,
    pub values: BTreeMap<String, TargetValue>,
}

impl PredictionRow {
    pub fn new(sample_index: i64) -> Self {
        Self {
            sample_index,
            values: BTreeMap::new(),
        }
    }

    pub fn with_target(mut self, target: &str, actual: Option<f64>, predicted: Option<f64>) -> Self {
        self.values
            .insert(target.to_string(), TargetValue::new(actual, predicted));
        self
    }

    pub fn target(&self, name: &str) -> Option<&TargetValue> {
        self.values.get(name)
    }

    /// Parse a backend row, keeping only the declared targets.
    pub fn from_json(value: &Value, targets: &[String]) -> Result<Self, String> {
        let obj = value
            .as_object()
            .ok_or_else(|| "row is not a JSON object".to_string())?;

        let sample_index = obj
            .get(SAMPLE_INDEX_FIELD)
            .ok_or_else(|| format!("missing '{}'", SAMPLE_INDEX_FIELD))
            .and_then(parse_sample_index)?;

        let mut row = PredictionRow::new(sample_index);
        for target in targets {
            let predicted_key = predicted_column(target);
            let actual = parse_number(obj.get(target.as_str()), target)?;
            let predicted = parse_number(obj.get(predicted_key.as_str()), &predicted_key)?;
            row.values
                .insert(target.clone(), TargetValue::new(actual, predicted));
        }
        Ok(row)
    }
}

fn parse_sample_index(value: &Value) -> Result<i64, String> {
    if let Some(i) = value.as_i64() {
        return Ok(i);
    }
    match value.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
        _ => Err(format!("'{}' must be an integer, got {}", SAMPLE_INDEX_FIELD, value)),
    }
}

fn parse_number(value: Option<&Value>, field: &str) -> Result<Option<f64>, String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<f64>()
                .map(Some)
                .map_err(|_| format!("field '{}' is not numeric: {:?}", field, s))
        }
        Some(other) => Err(format!("field '{}' is not numeric: {}", field, other)),
    }
}

/// All rows of one prediction task, keyed by sample index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    rows: BTreeMap<i64, PredictionRow>,
}

impl TaskResult {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            rows: BTreeMap::new(),
        }
    }

    /// Parse raw backend rows against the declared targets.
    pub fn from_rows(task_id: &str, rows: &[Value], targets: &[String]) -> Result<Self, CompareError> {
        let mut task = TaskResult::new(task_id);
        for (i, raw) in rows.iter().enumerate() {
            let row = PredictionRow::from_json(raw, targets).map_err(|reason| {
                CompareError::MalformedRow {
                    task_id: task_id.to_string(),
                    row: i,
                    reason,
                }
            })?;
            task.insert_at(row, i)?;
        }
        Ok(task)
    }

    pub fn insert(&mut self, row: PredictionRow) -> Result<(), CompareError> {
        let position = self.rows.len();
        self.insert_at(row, position)
    }

    fn insert_at(&mut self, row: PredictionRow, position: usize) -> Result<(), CompareError> {
        if self.rows.contains_key(&row.sample_index) {
            return Err(CompareError::MalformedRow {
                task_id: self.task_id.clone(),
                row: position,
                reason: format!("duplicate sample_index {}", row.sample_index),
            });
        }
        self.rows.insert(row.sample_index, row);
        Ok(())
    }

    pub fn with_row(mut self, row: PredictionRow) -> Result<Self, CompareError> {
        self.insert(row)?;
        Ok(self)
    }

    pub fn get(&self, sample_index: i64) -> Option<&PredictionRow> {
        self.rows.get(&sample_index)
    }

    pub fn sample_indices(&self) -> impl Iterator<Item = i64> + '_ {
        self.rows.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// This task's own pairs for error statistics, in sample order.
    pub fn scored_pairs(&self, target: &str) -> Vec<Pair> {
        self.rows
            .values()
            .filter_map(|row| row.target(target).and_then(TargetValue::scored_pair))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn targets() -> Vec<String> {
        vec!["band_gap".to_string()]
    }

    #[test]
    fn test_parse_row() {
        let raw = json!({
            "sample_index": 7,
            "band_gap": 1.5,
            "band_gap_predicted": "1.4",
            "composition": "Fe2O3",
        });
        let row = PredictionRow::from_json(&raw, &targets()).unwrap();
        assert_eq!(row.sample_index, 7);
        let v = row.target("band_gap").unwrap();
        assert_eq!(v.actual, Some(1.5));
        assert_eq!(v.predicted, Some(1.4));
        assert!(row.target("composition").is_none());
    }

    #[test]
    fn test_parse_row_missing_values_are_none() {
        let raw = json!({ "sample_index": 3.0, "band_gap": null, "band_gap_predicted": "" });
        let row = PredictionRow::from_json(&raw, &targets()).unwrap();
        assert_eq!(row.sample_index, 3);
        assert_eq!(row.target("band_gap").unwrap().pair(), None);

        let raw = json!({ "sample_index": 4 });
        let row = PredictionRow::from_json(&raw, &targets()).unwrap();
        assert_eq!(*row.target("band_gap").unwrap(), TargetValue::default());
    }

    #[test]
    fn test_nan_string_is_dropped() {
        let raw = json!({ "sample_index": 1, "band_gap": "NaN", "band_gap_predicted": 2.0 });
        let row = PredictionRow::from_json(&raw, &targets()).unwrap();
        assert_eq!(row.target("band_gap").unwrap().actual, None);
    }

    #[test]
    fn test_malformed_rows() {
        assert!(PredictionRow::from_json(&json!([1, 2]), &targets()).is_err());
        assert!(PredictionRow::from_json(&json!({ "band_gap": 1.0 }), &targets()).is_err());
        assert!(PredictionRow::from_json(&json!({ "sample_index": 1.5 }), &targets()).is_err());
        let bad = json!({ "sample_index": 1, "band_gap": "high" });
        assert!(PredictionRow::from_json(&bad, &targets()).is_err());
        let bad = json!({ "sample_index": 1, "band_gap_predicted": true });
        assert!(PredictionRow::from_json(&bad, &targets()).is_err());
    }

    #[test]
    fn test_duplicate_sample_index_rejected() {
        let rows = vec![json!({ "sample_index": 1 }), json!({ "sample_index": 1 })];
        let err = TaskResult::from_rows("t1", &rows, &targets()).unwrap_err();
        match err {
            CompareError::MalformedRow { task_id, row, .. } => {
                assert_eq!(task_id, "t1");
                assert_eq!(row, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_scored_pairs_skip_zero_and_missing() {
        let task = TaskResult::new("t1")
            .with_row(PredictionRow::new(0).with_target("y", Some(10.0), Some(11.0)))
            .unwrap()
            .with_row(PredictionRow::new(1).with_target("y", Some(0.0), Some(5.0)))
            .unwrap()
            .with_row(PredictionRow::new(2).with_target("y", None, Some(5.0)))
            .unwrap()
            .with_row(PredictionRow::new(3).with_target("y", Some(2.0), Some(f64::NAN)))
            .unwrap();
        assert_eq!(task.len(), 4);
        assert_eq!(task.scored_pairs("y"), vec![(10.0, 11.0)]);
        assert!(task.scored_pairs("other").is_empty());
    }
}
