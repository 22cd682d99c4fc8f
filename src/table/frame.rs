use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::reader::ChunkReader;

use super::lazy::AggExpr;
use super::value::Value;
use crate::error::{DataError, Result};

// ---------------------------------------------------------------------------
// Column types
// ---------------------------------------------------------------------------

/// Physical type of a column. Narrower Arrow types are widened on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    Int64,
    Float64,
    Utf8,
}

impl ColumnType {
    pub fn to_arrow(self) -> DataType {
        match self {
            ColumnType::Boolean => DataType::Boolean,
            ColumnType::Int64 => DataType::Int64,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::Utf8 => DataType::Utf8,
        }
    }

    pub fn from_arrow(data_type: &DataType) -> Option<Self> {
        match data_type {
            DataType::Boolean => Some(ColumnType::Boolean),
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => Some(ColumnType::Int64),
            DataType::Float16 | DataType::Float32 | DataType::Float64 => Some(ColumnType::Float64),
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => Some(ColumnType::Utf8),
            _ => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Int64 | ColumnType::Float64)
    }

    /// Numeric, or boolean read as 0/1.
    pub fn is_aggregatable(self) -> bool {
        self.is_numeric() || self == ColumnType::Boolean
    }
}

/// Value fed to an aggregation. Booleans count as 0 and 1.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        other => other.as_f64(),
    }
}

// ---------------------------------------------------------------------------
// Column
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub dtype: ColumnType,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, dtype: ColumnType, values: Vec<Value>) -> Self {
        Column {
            name: name.into(),
            dtype,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn to_array(&self) -> Result<ArrayRef> {
        let mismatch = |v: &Value| {
            DataError::Format(format!(
                "column '{}' declared {:?} holds incompatible value '{v}'",
                self.name, self.dtype
            ))
        };

        let array: ArrayRef = match self.dtype {
            ColumnType::Int64 => {
                let values = self
                    .values
                    .iter()
                    .map(|v| match v {
                        Value::Int(i) => Ok(Some(*i)),
                        Value::Null => Ok(None),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(Int64Array::from(values))
            }
            ColumnType::Float64 => {
                let values = self
                    .values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        other => other.as_f64().map(Some).ok_or_else(|| mismatch(other)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(Float64Array::from(values))
            }
            ColumnType::Boolean => {
                let values = self
                    .values
                    .iter()
                    .map(|v| match v {
                        Value::Bool(b) => Ok(Some(*b)),
                        Value::Null => Ok(None),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(BooleanArray::from(values))
            }
            ColumnType::Utf8 => {
                let values: Vec<Option<String>> = self
                    .values
                    .iter()
                    .map(|v| match v {
                        Value::Null => None,
                        other => Some(other.to_string()),
                    })
                    .collect();
                Arc::new(StringArray::from(values))
            }
        };
        Ok(array)
    }
}

/// Convert one Arrow array into cells of the given column type.
fn array_values(array: &ArrayRef, dtype: ColumnType) -> Result<Vec<Value>> {
    let array = cast(array.as_ref(), &dtype.to_arrow())?;

    let values = match dtype {
        ColumnType::Int64 => array
            .as_primitive::<Int64Type>()
            .iter()
            .map(|v| v.map(Value::Int).unwrap_or(Value::Null))
            .collect(),
        ColumnType::Float64 => array
            .as_primitive::<Float64Type>()
            .iter()
            .map(|v| v.map(Value::Float).unwrap_or(Value::Null))
            .collect(),
        ColumnType::Boolean => array
            .as_boolean()
            .iter()
            .map(|v| v.map(Value::Bool).unwrap_or(Value::Null))
            .collect(),
        ColumnType::Utf8 => array
            .as_string::<i32>()
            .iter()
            .map(|v| v.map(|s| Value::Str(s.to_string())).unwrap_or(Value::Null))
            .collect(),
    };
    Ok(values)
}

// ---------------------------------------------------------------------------
// Frame: a fully materialized table
// ---------------------------------------------------------------------------

/// Column-major, fully materialized table. All columns have the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<Column>,
}

impl Frame {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        if let Some(first) = columns.first() {
            if let Some(bad) = columns.iter().find(|c| c.len() != first.len()) {
                return Err(DataError::Format(format!(
                    "column '{}' has {} values but '{}' has {}",
                    bad.name,
                    bad.len(),
                    first.name,
                    first.len()
                )));
            }
        }
        Ok(Frame { columns })
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| DataError::Aggregation(format!("column '{name}' not found")))
    }

    pub fn row(&self, index: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.values[index].clone()).collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<Value>> + '_ {
        (0..self.height()).map(|i| self.row(i))
    }

    fn take(&self, indices: &[usize]) -> Frame {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                dtype: c.dtype,
                values: indices.iter().map(|&i| c.values[i].clone()).collect(),
            })
            .collect();
        Frame { columns }
    }

    // -- eager operations -----------------------------------------------------

    /// Replace every floating-point NaN with the missing-value marker.
    pub fn fill_nan(mut self) -> Frame {
        for column in self.columns.iter_mut().filter(|c| c.dtype == ColumnType::Float64) {
            for value in column.values.iter_mut().filter(|v| v.is_nan()) {
                *value = Value::Null;
            }
        }
        self
    }

    /// Keep only rows without a missing value in any column.
    pub fn drop_nulls(self) -> Frame {
        let keep: Vec<usize> = (0..self.height())
            .filter(|&i| self.columns.iter().all(|c| !c.values[i].is_null()))
            .collect();
        if keep.len() == self.height() {
            return self;
        }
        self.take(&keep)
    }

    /// Group rows by the distinct values of `by` and evaluate each aggregation
    /// over the non-null values of its column.
    ///
    /// The output has the key column first, then one `Float64` column per
    /// aggregation named by its alias. Groups come out in key order.
    pub fn group_by(&self, by: &str, aggs: &[AggExpr]) -> Result<Frame> {
        let key_idx = self.column_index(by)?;

        let mut targets = Vec::with_capacity(aggs.len());
        for agg in aggs {
            let idx = self.column_index(&agg.column)?;
            let column = &self.columns[idx];
            // a column with no values has no type to violate
            let all_null = column.values.iter().all(Value::is_null);
            if !column.dtype.is_aggregatable() && !all_null {
                return Err(DataError::Aggregation(format!(
                    "column '{}' is not numeric",
                    agg.column
                )));
            }
            targets.push(idx);
        }

        let key_column = &self.columns[key_idx];
        let mut groups: BTreeMap<&Value, Vec<usize>> = BTreeMap::new();
        for (row, key) in key_column.values.iter().enumerate() {
            groups.entry(key).or_default().push(row);
        }

        let mut keys = Vec::with_capacity(groups.len());
        let mut outputs: Vec<Vec<Value>> = vec![Vec::with_capacity(groups.len()); aggs.len()];

        for (key, rows) in &groups {
            keys.push((*key).clone());
            for ((agg, &col_idx), out) in aggs.iter().zip(&targets).zip(outputs.iter_mut()) {
                let values: Vec<f64> = rows
                    .iter()
                    .filter_map(|&r| numeric(&self.columns[col_idx].values[r]))
                    .collect();
                out.push(agg.statistic.compute(&values).into());
            }
        }

        let mut columns = vec![Column::new(by, key_column.dtype, keys)];
        for (agg, values) in aggs.iter().zip(outputs) {
            columns.push(Column::new(agg.alias.clone(), ColumnType::Float64, values));
        }
        Frame::new(columns)
    }

    // -- Arrow / Parquet ------------------------------------------------------

    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|c| Field::new(c.name.clone(), c.dtype.to_arrow(), true))
            .collect();
        let arrays = self
            .columns
            .iter()
            .map(Column::to_array)
            .collect::<Result<Vec<_>>>()?;
        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
    }

    /// Encode the frame as a single-row-group Parquet file into `writer`,
    /// returning the writer once the footer is flushed.
    pub fn write_parquet<W: Write + Send>(&self, writer: W) -> Result<W> {
        let batch = self.to_record_batch()?;
        let mut writer = ArrowWriter::try_new(writer, batch.schema(), None)?;
        writer.write(&batch)?;
        Ok(writer.into_inner()?)
    }

    /// Read a whole Parquet file.
    pub fn read_parquet(path: &Path) -> Result<Frame> {
        let file = File::open(path).map_err(|e| DataError::io(path, e))?;
        Self::from_parquet(file)
    }

    /// Decode an in-memory Parquet buffer.
    pub fn from_parquet_bytes(bytes: Bytes) -> Result<Frame> {
        Self::from_parquet(bytes)
    }

    fn from_parquet<R: ChunkReader + 'static>(reader: R) -> Result<Frame> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(reader)?;
        let schema = builder.schema().clone();

        let mut columns = schema
            .fields()
            .iter()
            .map(|f| {
                let dtype = ColumnType::from_arrow(f.data_type()).ok_or_else(|| {
                    DataError::Format(format!(
                        "column '{}' has unsupported type {:?}",
                        f.name(),
                        f.data_type()
                    ))
                })?;
                Ok(Column::new(f.name().clone(), dtype, Vec::new()))
            })
            .collect::<Result<Vec<_>>>()?;

        for batch in builder.build()? {
            let batch = batch?;
            for (column, array) in columns.iter_mut().zip(batch.columns()) {
                column.values.extend(array_values(array, column.dtype)?);
            }
        }

        Frame::new(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::types::Statistic;

    fn sample() -> Frame {
        Frame::new(vec![
            Column::new(
                "class",
                ColumnType::Int64,
                vec![Value::Int(1), Value::Int(1), Value::Int(2), Value::Null],
            ),
            Column::new(
                "f1",
                ColumnType::Float64,
                vec![Value::Float(10.0), Value::Float(f64::NAN), Value::Float(30.0), Value::Float(40.0)],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_new_rejects_ragged_columns() {
        let result = Frame::new(vec![
            Column::new("a", ColumnType::Int64, vec![Value::Int(1)]),
            Column::new("b", ColumnType::Int64, vec![]),
        ]);
        assert!(matches!(result, Err(DataError::Format(_))));
    }

    #[test]
    fn test_fill_nan_only_touches_nan() {
        let frame = sample().fill_nan();
        let f1 = &frame.column("f1").unwrap().values;
        assert_eq!(f1[0], Value::Float(10.0));
        assert!(f1[1].is_null());
        assert_eq!(frame.height(), 4);
    }

    #[test]
    fn test_drop_nulls_keeps_nan_rows() {
        // NaN is not missing until fill_nan runs
        let frame = sample().drop_nulls();
        assert_eq!(frame.height(), 3);
    }

    #[test]
    fn test_group_by_mean() {
        let frame = sample().fill_nan().drop_nulls();
        let grouped = frame
            .group_by("class", &[AggExpr::new("f1", Statistic::Mean)])
            .unwrap();

        assert_eq!(grouped.column_names(), vec!["class", "f1_mean"]);
        let mut rows: Vec<_> = grouped.rows().collect();
        rows.sort();
        assert_eq!(
            rows,
            vec![
                vec![Value::Int(1), Value::Float(10.0)],
                vec![Value::Int(2), Value::Float(30.0)],
            ]
        );
    }

    #[test]
    fn test_group_by_boolean_feature_as_fraction() {
        let frame = Frame::new(vec![
            Column::new("class", ColumnType::Int64, vec![Value::Int(1), Value::Int(1), Value::Int(1), Value::Int(1)]),
            Column::new(
                "flag",
                ColumnType::Boolean,
                vec![Value::Bool(true), Value::Bool(false), Value::Bool(true), Value::Bool(true)],
            ),
        ])
        .unwrap();
        let grouped = frame
            .group_by("class", &[AggExpr::new("flag", Statistic::Mean)])
            .unwrap();
        assert_eq!(grouped.row(0), vec![Value::Int(1), Value::Float(0.75)]);
    }

    #[test]
    fn test_group_by_all_null_text_column_is_empty_result() {
        let frame = Frame::new(vec![
            Column::new("class", ColumnType::Utf8, vec![]),
            Column::new("f1", ColumnType::Utf8, vec![]),
        ])
        .unwrap();
        let grouped = frame
            .group_by("class", &[AggExpr::new("f1", Statistic::Std)])
            .unwrap();
        assert_eq!(grouped.height(), 0);
        assert_eq!(grouped.column_names(), vec!["class", "f1_std"]);
    }

    #[test]
    fn test_group_by_unknown_column() {
        let err = sample().group_by("label", &[]).unwrap_err();
        assert!(matches!(err, DataError::Aggregation(_)));
    }

    #[test]
    fn test_group_by_rejects_text_feature() {
        let frame = Frame::new(vec![
            Column::new("class", ColumnType::Int64, vec![Value::Int(1)]),
            Column::new("name", ColumnType::Utf8, vec![Value::from("a")]),
        ])
        .unwrap();
        let err = frame
            .group_by("class", &[AggExpr::new("name", Statistic::Mean)])
            .unwrap_err();
        assert!(err.to_string().contains("not numeric"));
    }

    #[test]
    fn test_parquet_bytes_round_trip() {
        let frame = sample();
        let buffer = frame.write_parquet(Vec::new()).unwrap();
        let back = Frame::from_parquet_bytes(Bytes::from(buffer)).unwrap();
        assert_eq!(back, frame);
    }
}
