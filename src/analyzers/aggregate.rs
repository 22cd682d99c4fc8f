use tracing::debug;

use crate::analyzers::types::{AggregationResult, Statistic};
use crate::error::Result;
use crate::table::{AggExpr, LazyTable};

/// Number of trailing columns never treated as features: the label plus one
/// reserved column after it. Given N columns, features are `columns[0..N-2]`.
pub const RESERVED_TRAILING_COLUMNS: usize = 2;

/// Selects the feature columns of a dataset.
///
/// Drops the last [`RESERVED_TRAILING_COLUMNS`] columns by position, and the
/// label column by name should it appear before them.
pub fn feature_columns(columns: &[String], label: &str) -> Vec<String> {
    let end = columns.len().saturating_sub(RESERVED_TRAILING_COLUMNS);
    columns[..end]
        .iter()
        .filter(|c| c.as_str() != label)
        .cloned()
        .collect()
}

/// Groups `table` by `label` and computes `statistic` for each of `columns`,
/// then realizes the result.
///
/// Output fields are named `{column}_{statistic}`. An empty table yields an
/// empty result. A standard deviation over fewer than two rows is `None`.
pub fn aggregate(
    table: LazyTable,
    label: &str,
    columns: &[String],
    statistic: Statistic,
) -> Result<AggregationResult> {
    let aggs = columns
        .iter()
        .map(|c| AggExpr::new(c.as_str(), statistic))
        .collect();

    let grouped = table.group_by(label, aggs).collect()?;
    let result = AggregationResult::from_frame(&grouped, label, statistic)?;

    debug!(
        label,
        %statistic,
        features = columns.len(),
        groups = result.len(),
        "Aggregated table"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, ColumnType, Frame, Value};

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    fn example_table() -> LazyTable {
        let ints = |v: &[i64]| v.iter().map(|&i| Value::Int(i)).collect::<Vec<_>>();
        let frame = Frame::new(vec![
            Column::new("class", ColumnType::Int64, ints(&[1, 1, 2, 2])),
            Column::new("feature1", ColumnType::Int64, ints(&[10, 20, 30, 40])),
            Column::new("feature2", ColumnType::Int64, ints(&[100, 200, 300, 400])),
        ])
        .unwrap();
        LazyTable::from_frame(frame)
    }

    #[test]
    fn test_feature_columns_excludes_two_trailing() {
        let cols = names(&["sepal", "petal", "class", "source"]);
        assert_eq!(feature_columns(&cols, "class"), names(&["sepal", "petal"]));
    }

    #[test]
    fn test_feature_columns_drops_leading_label() {
        let cols = names(&["class", "f1", "f2", "f3"]);
        assert_eq!(feature_columns(&cols, "class"), names(&["f1"]));
    }

    #[test]
    fn test_feature_columns_short_schema() {
        assert!(feature_columns(&names(&["class"]), "class").is_empty());
        assert!(feature_columns(&[], "class").is_empty());
    }

    #[test]
    fn test_mean_example() {
        let result = aggregate(
            example_table(),
            "class",
            &names(&["feature1", "feature2"]),
            Statistic::Mean,
        )
        .unwrap();

        assert_eq!(result.len(), 2);
        let one = result.find(&Value::Int(1)).unwrap();
        assert_eq!(one.get("feature1_mean"), Some(Some(15.0)));
        assert_eq!(one.get("feature2_mean"), Some(Some(150.0)));
        let two = result.find(&Value::Int(2)).unwrap();
        assert_eq!(two.get("feature1_mean"), Some(Some(35.0)));
        assert_eq!(two.get("feature2_mean"), Some(Some(350.0)));
    }

    #[test]
    fn test_std_single_row_group_is_undefined() {
        let frame = Frame::new(vec![
            Column::new("class", ColumnType::Utf8, vec![Value::from("a"), Value::from("b"), Value::from("b")]),
            Column::new("f", ColumnType::Float64, vec![Value::Float(1.0), Value::Float(2.0), Value::Float(4.0)]),
        ])
        .unwrap();

        let result = aggregate(LazyTable::from_frame(frame), "class", &names(&["f"]), Statistic::Std).unwrap();

        assert_eq!(result.find(&Value::from("a")).unwrap().get("f_std"), Some(None));
        let b = result.find(&Value::from("b")).unwrap().get("f_std").unwrap().unwrap();
        assert!((b - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_empty_table_is_empty_result() {
        let frame = Frame::new(vec![
            Column::new("class", ColumnType::Int64, vec![]),
            Column::new("f", ColumnType::Float64, vec![]),
        ])
        .unwrap();
        let result = aggregate(LazyTable::from_frame(frame), "class", &names(&["f"]), Statistic::Mean).unwrap();
        assert!(result.is_empty());
    }
}
