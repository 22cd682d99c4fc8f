//! One-shot conversion of a delimited-text dataset into a Parquet file.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tracing::{debug, info};

use crate::error::{DataError, Result};
use crate::table::{Column, ColumnType, Frame, Value};

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Reads the whole CSV file at `source` and writes it as Parquet to `target`.
///
/// The file is written to a temporary sibling and renamed into place, so a
/// concurrent reader sees either the old file, no file, or the complete new
/// one. Concurrent converters of the same source produce identical content;
/// the last rename wins.
#[tracing::instrument(skip_all, fields(source = %source.display(), target = %target.display()))]
pub fn convert(source: &Path, target: &Path) -> Result<()> {
    let frame = read_csv(source)?;

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| DataError::io(parent, e))?;
    }

    let tmp = temp_sibling(target);
    if let Err(e) = write_file(&frame, &tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, target).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        DataError::io(target, e)
    })?;

    info!(
        rows = frame.height(),
        columns = frame.width(),
        "Converted CSV to parquet"
    );
    Ok(())
}

/// Reads the CSV at `source` and encodes it as Parquet in memory.
#[tracing::instrument(skip_all, fields(source = %source.display()))]
pub fn csv_to_parquet_bytes(source: &Path) -> Result<Bytes> {
    let frame = read_csv(source)?;
    let buffer = frame.write_parquet(Vec::new())?;
    debug!(bytes = buffer.len(), "Encoded CSV as in-memory parquet");
    Ok(Bytes::from(buffer))
}

fn write_file(frame: &Frame, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| DataError::io(path, e))?;
    let file = frame.write_parquet(file)?;
    file.sync_all().map_err(|e| DataError::io(path, e))
}

fn temp_sibling(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "data.parquet".to_string());
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    target.with_file_name(format!(".{name}.{}.{seq}.tmp", std::process::id()))
}

// ---------------------------------------------------------------------------
// CSV reader with type inference
// ---------------------------------------------------------------------------

/// Reads a headed CSV file into a [`Frame`], inferring one type per column.
///
/// Inference looks at every non-empty cell: all integers → `Int64`, all
/// numbers → `Float64` (`NaN` included), all `true`/`false` → `Boolean`,
/// anything else → `Utf8`. Empty cells become missing values, and a column
/// with no values at all is a nullable `Float64`.
pub fn read_csv(source: &Path) -> Result<Frame> {
    let file = File::open(source).map_err(|e| DataError::io(source, e))?;
    let mut reader = csv::Reader::from_reader(file);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(source, e))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(DataError::Format(format!(
            "{} has no header row",
            source.display()
        )));
    }

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(source, e))?;
        for (column, cell) in cells.iter_mut().zip(record.iter()) {
            column.push(cell.to_string());
        }
    }

    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, raw)| {
            let dtype = infer_type(&raw);
            let values = raw.iter().map(|cell| parse_cell(cell, dtype)).collect();
            Column::new(name, dtype, values)
        })
        .collect();

    Frame::new(columns)
}

fn csv_error(source: &Path, err: csv::Error) -> DataError {
    match err.into_kind() {
        csv::ErrorKind::Io(e) => DataError::io(source, e),
        csv::ErrorKind::UnequalLengths {
            pos,
            expected_len,
            len,
        } => {
            let line = pos.map(|p| p.line()).unwrap_or_default();
            DataError::Format(format!(
                "{} line {line}: found {len} fields, expected {expected_len}",
                source.display()
            ))
        }
        csv::ErrorKind::Utf8 { pos, err } => {
            let line = pos.map(|p| p.line()).unwrap_or_default();
            DataError::Format(format!("{} line {line}: {err}", source.display()))
        }
        other => DataError::Format(format!("{}: {other:?}", source.display())),
    }
}

fn is_bool(cell: &str) -> bool {
    cell.eq_ignore_ascii_case("true") || cell.eq_ignore_ascii_case("false")
}

fn infer_type(cells: &[String]) -> ColumnType {
    let present: Vec<&str> = cells
        .iter()
        .map(String::as_str)
        .filter(|c| !c.is_empty())
        .collect();

    if present.is_empty() {
        return ColumnType::Float64;
    }
    if present.iter().all(|c| c.parse::<i64>().is_ok()) {
        return ColumnType::Int64;
    }
    if present.iter().all(|c| c.parse::<f64>().is_ok()) {
        return ColumnType::Float64;
    }
    if present.iter().all(|c| is_bool(c)) {
        return ColumnType::Boolean;
    }
    ColumnType::Utf8
}

fn parse_cell(cell: &str, dtype: ColumnType) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    match dtype {
        ColumnType::Int64 => cell.parse().map(Value::Int).unwrap_or(Value::Null),
        ColumnType::Float64 => cell.parse().map(Value::Float).unwrap_or(Value::Null),
        ColumnType::Boolean => Value::Bool(cell.eq_ignore_ascii_case("true")),
        ColumnType::Utf8 => Value::Str(cell.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::LazyTable;
    use std::io::Write;

    fn write_csv(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_convert_creates_target() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_csv(
            dir.path(),
            "test_data.csv",
            "class,feature1,feature2\n1,10,100\n1,20,200\n2,30,300\n2,40,400\n",
        );
        let target = dir.path().join("test_data.parquet");

        convert(&source, &target).unwrap();

        assert!(target.exists());
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_convert_creates_missing_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_csv(dir.path(), "a.csv", "x,class\n1,a\n");
        let target = dir.path().join("cache").join("a.parquet");

        convert(&source, &target).unwrap();
        assert!(target.exists());
    }

    #[test]
    fn test_convert_round_trip_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_csv(
            dir.path(),
            "mixed.csv",
            "f1,f2,class,note\n1,0.5,a,x\n2,,b,\n3,NaN,a,z\n",
        );
        let target = dir.path().join("mixed.parquet");

        convert(&source, &target).unwrap();
        let original = read_csv(&source).unwrap();
        let loaded = LazyTable::scan_parquet(&target).unwrap().collect().unwrap();

        assert_eq!(loaded.height(), 3);
        assert_eq!(loaded, original);
        assert_eq!(loaded.column("f1").unwrap().dtype, ColumnType::Int64);
        assert_eq!(loaded.column("f2").unwrap().dtype, ColumnType::Float64);
        assert!(loaded.column("f2").unwrap().values[1].is_null());
        assert!(loaded.column("f2").unwrap().values[2].is_nan());
        assert_eq!(loaded.column("class").unwrap().dtype, ColumnType::Utf8);
    }

    #[test]
    fn test_missing_source_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = convert(&dir.path().join("nope.csv"), &dir.path().join("nope.parquet")).unwrap_err();
        assert!(err.is_io());
        assert!(!dir.path().join("nope.parquet").exists());
    }

    #[test]
    fn test_ragged_rows_are_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_csv(dir.path(), "bad.csv", "a,b,class\n1,2,x\n3,y\n");
        let err = convert(&source, &dir.path().join("bad.parquet")).unwrap_err();
        assert!(matches!(err, DataError::Format(_)), "{err}");
    }

    #[test]
    fn test_empty_file_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_csv(dir.path(), "empty.csv", "");
        let err = read_csv(&source).unwrap_err();
        assert!(matches!(err, DataError::Format(_)));
    }

    #[test]
    fn test_infer_type() {
        let cells = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(infer_type(&cells(&["1", "", "-3"])), ColumnType::Int64);
        assert_eq!(infer_type(&cells(&["1", "2.5", "NaN"])), ColumnType::Float64);
        assert_eq!(infer_type(&cells(&["true", "False"])), ColumnType::Boolean);
        assert_eq!(infer_type(&cells(&["1", "abc"])), ColumnType::Utf8);
        assert_eq!(infer_type(&cells(&["", ""])), ColumnType::Float64);
        assert_eq!(infer_type(&[]), ColumnType::Float64);
    }

    #[test]
    fn test_in_memory_encoding_decodes() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_csv(dir.path(), "m.csv", "f1,class,extra\n1.5,a,0\n");
        let bytes = csv_to_parquet_bytes(&source).unwrap();
        let frame = Frame::from_parquet_bytes(bytes).unwrap();
        assert_eq!(frame.row(0), vec![Value::Float(1.5), Value::from("a"), Value::Int(0)]);
    }
}
