//! Grouped aggregation over cleaned tables.
//!
//! This module selects feature columns, groups rows by the label column,
//! and computes a per-group mean or sample standard deviation for every
//! feature.

pub mod aggregate;
pub mod types;
pub mod utility;
