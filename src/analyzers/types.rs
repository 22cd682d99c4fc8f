//! Data types used by the aggregation pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::utility::{mean, sample_stddev};
use crate::error::{DataError, Result};
use crate::table::{Frame, Value};

/// Per-group statistic computed for every feature column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Mean,
    Std,
}

impl Statistic {
    /// Suffix appended to feature names in the output (`feature1_mean`).
    pub fn suffix(self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Std => "std",
        }
    }

    /// Evaluates the statistic; `None` when it is undefined for the input.
    pub fn compute(self, values: &[f64]) -> Option<f64> {
        match self {
            Statistic::Mean => mean(values),
            Statistic::Std => sample_stddev(values),
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for Statistic {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(Statistic::Mean),
            "std" => Ok(Statistic::Std),
            other => Err(format!("unknown statistic '{other}', expected 'mean' or 'std'")),
        }
    }
}

/// One output row: a label value and `{feature}_{stat}` → value pairs in
/// feature order. `None` marks an undefined statistic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRecord {
    pub label: Value,
    pub stats: Vec<(String, Option<f64>)>,
}

impl AggregationRecord {
    /// Looks up a statistic by its output field name.
    pub fn get(&self, field: &str) -> Option<Option<f64>> {
        self.stats
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| *value)
    }

    /// Flat JSON object: `{ <label_column>: label, "<feature>_<stat>": value, ... }`.
    pub fn to_json(&self, label_column: &str) -> serde_json::Map<String, serde_json::Value> {
        let mut row = serde_json::Map::new();
        row.insert(label_column.to_string(), self.label.to_json());
        for (name, value) in &self.stats {
            let value = value.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null);
            row.insert(name.clone(), value);
        }
        row
    }
}

/// Realized result of one grouped aggregation, one record per distinct label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub label_column: String,
    pub statistic: Statistic,
    pub records: Vec<AggregationRecord>,
}

impl AggregationResult {
    /// Builds the result from a grouped frame whose first column is the label.
    pub fn from_frame(frame: &Frame, label_column: &str, statistic: Statistic) -> Result<Self> {
        let columns = frame.columns();
        match columns.first() {
            Some(first) if first.name == label_column => {}
            _ => {
                return Err(DataError::Aggregation(format!(
                    "grouped frame does not start with label column '{label_column}'"
                )));
            }
        }

        let records = frame
            .rows()
            .map(|row| {
                let mut cells = row.into_iter();
                let label = cells.next().unwrap_or(Value::Null);
                let stats = columns[1..]
                    .iter()
                    .zip(cells)
                    .map(|(column, cell)| (column.name.clone(), cell.as_f64()))
                    .collect();
                AggregationRecord { label, stats }
            })
            .collect();

        Ok(AggregationResult {
            label_column: label_column.to_string(),
            statistic,
            records,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find(&self, label: &Value) -> Option<&AggregationRecord> {
        self.records.iter().find(|r| &r.label == label)
    }

    /// Output field names: the label column followed by every statistic field.
    pub fn field_names(&self) -> Vec<String> {
        let mut names = vec![self.label_column.clone()];
        if let Some(first) = self.records.first() {
            names.extend(first.stats.iter().map(|(name, _)| name.clone()));
        }
        names
    }

    /// Rows as flat JSON objects, the shape returned to HTTP callers.
    pub fn to_rows(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.records
            .iter()
            .map(|r| r.to_json(&self.label_column))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistic_parse_and_display() {
        assert_eq!("mean".parse::<Statistic>().unwrap(), Statistic::Mean);
        assert_eq!("STD".parse::<Statistic>().unwrap(), Statistic::Std);
        assert!("median".parse::<Statistic>().is_err());
        assert_eq!(Statistic::Std.to_string(), "std");
    }

    #[test]
    fn test_record_to_json_is_flat() {
        let record = AggregationRecord {
            label: Value::Int(1),
            stats: vec![
                ("feature1_std".to_string(), Some(7.5)),
                ("feature2_std".to_string(), None),
            ],
        };
        let json = serde_json::Value::Object(record.to_json("class"));
        assert_eq!(
            json,
            serde_json::json!({"class": 1, "feature1_std": 7.5, "feature2_std": null})
        );
    }

    #[test]
    fn test_result_survives_json_encoding() {
        let result = AggregationResult {
            label_column: "class".into(),
            statistic: Statistic::Mean,
            records: vec![AggregationRecord {
                label: Value::from("setosa"),
                stats: vec![("f1_mean".to_string(), Some(1.5))],
            }],
        };
        let bytes = serde_json::to_vec(&result).unwrap();
        let back: AggregationResult = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, result);
        assert_eq!(back.field_names(), vec!["class", "f1_mean"]);
    }
}
