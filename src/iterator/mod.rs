//! Point get, multi get and range scan over a [MicroBlockSource].
//!
//! A [RowIterator] serves a query from the row cache where it can, and
//! otherwise locates candidate blocks, prefetches them, binary searches them
//! with a [crate::block::MicroBlockReader] and decodes the matching rows.

mod row_iterator;
mod source;

pub use row_iterator::RowIterator;
pub use source::{BlockHandle, MicroBlockSource, PrefetchHandle};

use crate::types::RowKey;

pub const DEFAULT_PREFETCH_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct IteratorOptions {
    /// Blocks read ahead of the one being scanned.
    pub prefetch_depth: usize,
    /// Read and populate the row cache on point gets.
    pub use_cache: bool,
    /// Populate the row cache with every row a scan returns.
    pub fill_cache_on_scan: bool,
}

impl Default for IteratorOptions {
    fn default() -> Self {
        IteratorOptions {
            prefetch_depth: DEFAULT_PREFETCH_DEPTH,
            use_cache: true,
            fill_cache_on_scan: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IteratorStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub blocks_read: u64,
    pub rows_returned: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanRange<'k> {
    pub start: RowKey<'k>,
    pub start_inclusive: bool,
    pub end: RowKey<'k>,
    pub end_inclusive: bool,
}

impl<'k> ScanRange<'k> {
    pub fn new(
        start: RowKey<'k>,
        start_inclusive: bool,
        end: RowKey<'k>,
        end_inclusive: bool,
    ) -> ScanRange<'k> {
        ScanRange {
            start,
            start_inclusive,
            end,
            end_inclusive,
        }
    }

    /// Every row.
    pub fn whole() -> ScanRange<'k> {
        ScanRange::new(RowKey::Min, true, RowKey::Max, true)
    }

    pub fn into_owned(self) -> ScanRange<'static> {
        ScanRange {
            start: self.start.into_owned(),
            start_inclusive: self.start_inclusive,
            end: self.end.into_owned(),
            end_inclusive: self.end_inclusive,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryRange<'k> {
    Get(RowKey<'k>),
    /// Rows come back in request order, one per key.
    MultiGet(Vec<RowKey<'k>>),
    Scan(ScanRange<'k>),
}
