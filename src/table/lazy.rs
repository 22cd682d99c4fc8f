use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::debug;

use super::frame::Frame;
use crate::analyzers::types::Statistic;
use crate::error::{DataError, Result};

/// One aggregation inside a group-by: `statistic(column) AS alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggExpr {
    pub column: String,
    pub statistic: Statistic,
    pub alias: String,
}

impl AggExpr {
    /// Aggregation aliased as `{column}_{statistic}`.
    pub fn new(column: impl Into<String>, statistic: Statistic) -> Self {
        let column = column.into();
        let alias = format!("{column}_{statistic}");
        AggExpr {
            column,
            statistic,
            alias,
        }
    }
}

/// A recorded, not yet executed, transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    FillNan,
    DropNulls,
    GroupBy { by: String, aggs: Vec<AggExpr> },
}

#[derive(Debug, Clone)]
enum Source {
    Parquet(PathBuf),
    Memory(Arc<Frame>),
}

/// A deferred table: a physical source plus the list of operations to run
/// over it. Nothing is read beyond the schema until [`LazyTable::collect`].
///
/// Builder methods consume the handle and return a new one, so a cached
/// handle can be cloned and extended freely.
#[derive(Debug, Clone)]
pub struct LazyTable {
    source: Source,
    schema: Vec<String>,
    plan: Vec<Op>,
}

impl LazyTable {
    /// Open a Parquet file lazily. Only the footer metadata is read.
    pub fn scan_parquet(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| DataError::io(path, e))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let schema = builder
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect::<Vec<_>>();

        debug!(path = %path.display(), columns = schema.len(), "Scanned parquet schema");

        Ok(LazyTable {
            source: Source::Parquet(path.to_path_buf()),
            schema,
            plan: Vec::new(),
        })
    }

    /// Wrap an already materialized frame.
    pub fn from_frame(frame: Frame) -> Self {
        LazyTable {
            schema: frame.column_names(),
            source: Source::Memory(Arc::new(frame)),
            plan: Vec::new(),
        }
    }

    /// Output column names once the recorded plan has run.
    pub fn columns(&self) -> Vec<String> {
        self.plan.iter().fold(self.schema.clone(), |columns, op| match op {
            Op::FillNan | Op::DropNulls => columns,
            Op::GroupBy { by, aggs } => std::iter::once(by.clone())
                .chain(aggs.iter().map(|a| a.alias.clone()))
                .collect(),
        })
    }

    pub fn plan(&self) -> &[Op] {
        &self.plan
    }

    /// Path of the backing file, if the source is on disk.
    pub fn source_path(&self) -> Option<&Path> {
        match &self.source {
            Source::Parquet(path) => Some(path),
            Source::Memory(_) => None,
        }
    }

    fn then(mut self, op: Op) -> Self {
        self.plan.push(op);
        self
    }

    pub fn fill_nan(self) -> Self {
        self.then(Op::FillNan)
    }

    pub fn drop_nulls(self) -> Self {
        self.then(Op::DropNulls)
    }

    pub fn group_by(self, by: impl Into<String>, aggs: Vec<AggExpr>) -> Self {
        self.then(Op::GroupBy { by: by.into(), aggs })
    }

    /// Read the source and run the plan, producing concrete rows.
    pub fn collect(&self) -> Result<Frame> {
        let mut frame = match &self.source {
            Source::Parquet(path) => Frame::read_parquet(path)?,
            Source::Memory(frame) => frame.as_ref().clone(),
        };

        for op in &self.plan {
            frame = match op {
                Op::FillNan => frame.fill_nan(),
                Op::DropNulls => frame.drop_nulls(),
                Op::GroupBy { by, aggs } => frame.group_by(by, aggs)?,
            };
        }

        debug!(rows = frame.height(), ops = self.plan.len(), "Collected lazy table");
        Ok(frame)
    }
}
