//! Tabular data: cells, materialized frames and deferred tables.
//!
//! ```text
//!  .parquet file / in-memory Frame
//!        │
//!        ▼
//!   ┌───────────┐
//!   │ LazyTable │  source + recorded plan (fill_nan, drop_nulls, group_by)
//!   └───────────┘
//!        │ collect()
//!        ▼
//!   ┌───────────┐
//!   │   Frame   │  columns of Values
//!   └───────────┘
//! ```

pub mod frame;
pub mod lazy;
pub mod value;

pub use frame::{Column, ColumnType, Frame};
pub use lazy::{AggExpr, LazyTable, Op};
pub use value::Value;
