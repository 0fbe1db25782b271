//! Cell values, row keys and rows.

mod datum;
mod row;
mod rowkey;

pub use datum::{Collation, ColumnType, Datum};
pub use row::{RowFlag, StoreRow};
pub use rowkey::RowKey;

/// Identity of a table, part of every row cache key.
pub type TableId = u64;

/// Identity of a column inside its table schema.
pub type ColumnId = u32;
