//! Output formatting and persistence for aggregation results.
//!
//! Supports debug logging, JSON rendering, and CSV export.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use csv::WriterBuilder;
use tracing::debug;

use crate::analyzers::types::AggregationResult;

/// Logs a result using Rust's debug pretty-print format.
pub fn print_pretty(result: &AggregationResult) {
    debug!("{:#?}", result);
}

/// Renders a result as pretty-printed JSON rows, the same shape the HTTP
/// routes return.
pub fn to_json(result: &AggregationResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(&result.to_rows())?)
}

/// Writes the JSON rows of `result` to `out`, followed by a newline.
pub fn print_json<W: Write>(mut out: W, result: &AggregationResult) -> Result<()> {
    writeln!(out, "{}", to_json(result)?)?;
    Ok(())
}

/// Writes a result as CSV: one header row of field names, one row per label.
///
/// Undefined statistics are written as empty cells. Overwrites `path`.
pub fn write_csv(path: &Path, result: &AggregationResult) -> Result<()> {
    debug!(path = %path.display(), rows = result.len(), "Writing CSV export");

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = WriterBuilder::new().from_writer(file);

    writer.write_record(result.field_names())?;
    for record in &result.records {
        let mut row = vec![record.label.to_string()];
        row.extend(
            record
                .stats
                .iter()
                .map(|(_, value)| value.map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&row)?;
    }
    writer.flush()?;

    Ok(())
}
