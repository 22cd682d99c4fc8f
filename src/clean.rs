//! Missing-value handling.

use crate::table::LazyTable;

/// Normalizes NaN to the missing marker, then drops every row holding a
/// missing value in any column.
///
/// The order matters: dropping first would keep NaN rows. Only appends to
/// the plan; nothing is read.
pub fn clean(table: LazyTable) -> LazyTable {
    table.fill_nan().drop_nulls()
}
