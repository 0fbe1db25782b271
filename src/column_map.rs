//! Schema projection used to decode a block.
//!
//! Blocks store every column of the table in schema order, rowkey columns
//! first. A [ColumnMap] records that stored layout and which of those columns
//! a query wants back, in which order. Requested columns the block does not
//! carry (added to the schema after the block was written) come back as null.

use crate::error::RowLiteError;
use crate::types::{Collation, ColumnId, ColumnType};
use crate::Result;
use std::collections::HashMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ColumnDesc {
    pub column_id: ColumnId,
    pub column_type: ColumnType,
    pub collation: Collation,
}

impl ColumnDesc {
    pub fn new(column_id: ColumnId, column_type: ColumnType) -> ColumnDesc {
        ColumnDesc {
            column_id,
            column_type,
            collation: Collation::Binary,
        }
    }

    pub fn with_collation(mut self, collation: Collation) -> ColumnDesc {
        self.collation = collation;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ColumnMap {
    schema_version: u64,
    rowkey_count: usize,
    store_columns: Vec<ColumnDesc>,
    rowkey_collations: Vec<Collation>,
    out_columns: Vec<ColumnDesc>,
    /// Output column index -> stored column index, `None` for outside columns.
    projection: Vec<Option<usize>>,
    /// (stored index, output index), sorted by stored index.
    store_to_out: Vec<(usize, usize)>,
}

impl ColumnMap {
    /// Build a projection of `out_columns` over the stored layout `store_columns`,
    /// whose first `rowkey_count` columns form the sort key.
    pub fn new(
        schema_version: u64,
        rowkey_count: usize,
        store_columns: Vec<ColumnDesc>,
        out_columns: &[ColumnDesc],
    ) -> Result<ColumnMap> {
        if rowkey_count == 0 || rowkey_count > store_columns.len() {
            return Err(RowLiteError::InvalidArgument(format!(
                "rowkey count {} with {} stored columns",
                rowkey_count,
                store_columns.len()
            )));
        }
        if store_columns.len() > u16::MAX as usize {
            return Err(RowLiteError::invalid("too many stored columns"));
        }

        let mut index_of: HashMap<ColumnId, usize> = HashMap::with_capacity(store_columns.len());
        for (i, col) in store_columns.iter().enumerate() {
            if index_of.insert(col.column_id, i).is_some() {
                return Err(RowLiteError::InvalidArgument(format!(
                    "duplicate stored column id {}",
                    col.column_id
                )));
            }
        }

        let mut projection = Vec::with_capacity(out_columns.len());
        let mut store_to_out = Vec::with_capacity(out_columns.len());
        for (out_idx, col) in out_columns.iter().enumerate() {
            match index_of.get(&col.column_id) {
                Some(&store_idx) => {
                    if store_columns[store_idx].column_type != col.column_type {
                        return Err(RowLiteError::InvalidArgument(format!(
                            "column {} is stored as {:?}, requested as {:?}",
                            col.column_id, store_columns[store_idx].column_type, col.column_type
                        )));
                    }
                    projection.push(Some(store_idx));
                    store_to_out.push((store_idx, out_idx));
                }
                None => projection.push(None),
            }
        }
        store_to_out.sort_unstable();

        let rowkey_collations = store_columns[..rowkey_count]
            .iter()
            .map(|c| c.collation)
            .collect();

        Ok(ColumnMap {
            schema_version,
            rowkey_count,
            store_columns,
            rowkey_collations,
            out_columns: out_columns.to_vec(),
            projection,
            store_to_out,
        })
    }

    /// Project every stored column in stored order.
    pub fn full(
        schema_version: u64,
        rowkey_count: usize,
        store_columns: Vec<ColumnDesc>,
    ) -> Result<ColumnMap> {
        let out = store_columns.clone();
        ColumnMap::new(schema_version, rowkey_count, store_columns, &out)
    }

    #[inline]
    pub fn schema_version(&self) -> u64 {
        self.schema_version
    }

    #[inline]
    pub fn rowkey_count(&self) -> usize {
        self.rowkey_count
    }

    #[inline]
    pub fn store_count(&self) -> usize {
        self.store_columns.len()
    }

    /// Number of cells a decoded row carries.
    #[inline]
    pub fn out_count(&self) -> usize {
        self.out_columns.len()
    }

    pub fn store_columns(&self) -> &[ColumnDesc] {
        &self.store_columns
    }

    pub fn out_columns(&self) -> &[ColumnDesc] {
        &self.out_columns
    }

    pub fn rowkey_columns(&self) -> &[ColumnDesc] {
        &self.store_columns[..self.rowkey_count]
    }

    pub fn rowkey_collations(&self) -> &[Collation] {
        &self.rowkey_collations
    }

    /// Stored index feeding output column `out_idx`, `None` for a column the
    /// block does not carry.
    pub fn store_index(&self, out_idx: usize) -> Option<usize> {
        self.projection.get(out_idx).copied().flatten()
    }

    pub(crate) fn store_to_out(&self) -> &[(usize, usize)] {
        &self.store_to_out
    }

    /// Highest stored column a decode has to reach.
    pub(crate) fn last_needed_store_index(&self) -> Option<usize> {
        self.store_to_out.last().map(|(s, _)| *s)
    }
}
