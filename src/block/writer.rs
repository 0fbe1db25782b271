use crate::block::codec::{
    compare_encoded_cells, encode_row, encode_rowkey, encoded_row_size, MicroBlockHeader,
    MICRO_BLOCK_HEADER_SIZE,
};
use crate::column_map::{ColumnDesc, ColumnMap};
use crate::error::RowLiteError;
use crate::types::StoreRow;
use crate::Result;
use std::cmp::Ordering;

/// Builds one micro block from rows appended in strictly ascending rowkey order.
pub struct MicroBlockWriter {
    block_size_limit: usize,
    rowkey_columns: Vec<ColumnDesc>,
    store_columns: Vec<ColumnDesc>,
    data: Vec<u8>,
    row_offsets: Vec<u32>,
    /// Encoded rowkey of the last appended row. Kept across [MicroBlockWriter::reuse]
    /// so consecutive blocks of one stream stay sorted.
    last_rowkey: Vec<u8>,
}

impl MicroBlockWriter {
    pub fn new(column_map: &ColumnMap, block_size_limit: usize) -> Result<MicroBlockWriter> {
        if block_size_limit <= MICRO_BLOCK_HEADER_SIZE || block_size_limit > u32::MAX as usize {
            return Err(RowLiteError::InvalidArgument(format!(
                "micro block size limit {}",
                block_size_limit
            )));
        }
        Ok(MicroBlockWriter {
            block_size_limit,
            rowkey_columns: column_map.rowkey_columns().to_vec(),
            store_columns: column_map.store_columns().to_vec(),
            data: Vec::with_capacity(block_size_limit),
            row_offsets: Vec::new(),
            last_rowkey: Vec::new(),
        })
    }

    /// Size of the block [MicroBlockWriter::build] would produce now.
    #[inline]
    pub fn estimated_size(&self) -> usize {
        MICRO_BLOCK_HEADER_SIZE + self.row_offsets.len() * 4 + self.data.len()
    }

    #[inline]
    pub fn row_count(&self) -> usize {
        self.row_offsets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.row_offsets.is_empty()
    }

    /// Whether `row` can be appended without exceeding the size limit. An
    /// empty block accepts any row.
    pub fn fits(&self, row: &StoreRow<'_>) -> bool {
        self.is_empty() || self.estimated_size() + 4 + encoded_row_size(row) <= self.block_size_limit
    }

    pub fn last_rowkey(&self) -> Option<&[u8]> {
        if self.last_rowkey.is_empty() {
            None
        } else {
            Some(&self.last_rowkey)
        }
    }

    pub fn append_row(&mut self, row: &StoreRow<'_>) -> Result<()> {
        self.check_row(row)?;
        if !self.fits(row) {
            return Err(RowLiteError::AllocationFailed(format!(
                "row of {} bytes does not fit micro block of {} bytes",
                encoded_row_size(row),
                self.block_size_limit
            )));
        }
        if self.data.len() + encoded_row_size(row) > u32::MAX as usize {
            return Err(RowLiteError::AllocationFailed("payload exceeds u32".into()));
        }

        self.row_offsets.push(self.data.len() as u32);
        encode_row(row, &mut self.data);

        self.last_rowkey.clear();
        encode_rowkey(&row.cells[..self.rowkey_columns.len()], &mut self.last_rowkey);
        Ok(())
    }

    fn check_row(&self, row: &StoreRow<'_>) -> Result<()> {
        if row.cells.len() != self.store_columns.len() {
            return Err(RowLiteError::InvalidArgument(format!(
                "row has {} cells, block stores {} columns",
                row.cells.len(),
                self.store_columns.len()
            )));
        }
        for (i, (cell, desc)) in row.cells.iter().zip(&self.store_columns).enumerate() {
            if !cell.fits(desc.column_type) {
                return Err(RowLiteError::InvalidArgument(format!(
                    "cell {} is {:?}, column {} is {:?}",
                    i,
                    cell.column_type(),
                    desc.column_id,
                    desc.column_type
                )));
            }
            if i < self.rowkey_columns.len() && cell.is_null() {
                return Err(RowLiteError::InvalidArgument(format!(
                    "rowkey column {} is null",
                    desc.column_id
                )));
            }
        }
        if let Some(last) = self.last_rowkey() {
            let rowkey = &row.cells[..self.rowkey_columns.len()];
            if compare_encoded_cells(last, rowkey, &self.rowkey_columns)? != Ordering::Less {
                return Err(RowLiteError::InvalidArgument(format!(
                    "rowkey {:?} is not greater than the previous row",
                    rowkey
                )));
            }
        }
        Ok(())
    }

    /// Serialize header, row directory and payloads.
    pub fn build(&self) -> Result<Vec<u8>> {
        if self.is_empty() {
            return Err(RowLiteError::invalid("cannot build an empty micro block"));
        }
        let header = MicroBlockHeader {
            rowkey_count: self.rowkey_columns.len() as u16,
            column_count: self.store_columns.len() as u16,
            row_count: self.row_offsets.len() as u32,
            payload_len: self.data.len() as u32,
        };
        let mut block = Vec::with_capacity(self.estimated_size());
        header.encode(&mut block);
        for offset in &self.row_offsets {
            block.extend_from_slice(&offset.to_le_bytes());
        }
        block.extend_from_slice(&self.data);
        debug_assert_eq!(block.len(), self.estimated_size());
        Ok(block)
    }

    /// Drop the buffered rows to start the next block of the same stream.
    pub fn reuse(&mut self) {
        self.data.clear();
        self.row_offsets.clear();
    }

    /// Forget everything, including the ordering of the previous stream.
    pub fn reset(&mut self) {
        self.reuse();
        self.last_rowkey.clear();
    }
}

#[cfg(test)]
mod tests {
    use crate::block::writer::MicroBlockWriter;
    use crate::column_map::{ColumnDesc, ColumnMap};
    use crate::error::RowLiteError;
    use crate::types::{ColumnType, Datum, StoreRow};

    fn column_map() -> ColumnMap {
        ColumnMap::full(
            1,
            1,
            vec![
                ColumnDesc::new(1, ColumnType::Int),
                ColumnDesc::new(2, ColumnType::Varchar),
            ],
        )
        .unwrap()
    }

    fn row(k: i64, v: &str) -> StoreRow<'_> {
        StoreRow::from_cells(vec![Datum::Int(k), Datum::from(v)])
    }

    #[test]
    fn test_append_and_build() {
        let map = column_map();
        let mut writer = MicroBlockWriter::new(&map, 4096).unwrap();
        assert!(writer.build().is_err());
        for i in 0..10 {
            writer.append_row(&row(i, "value")).unwrap();
        }
        assert_eq!(writer.row_count(), 10);
        let block = writer.build().unwrap();
        assert_eq!(block.len(), writer.estimated_size());
    }

    #[test]
    fn test_order_is_enforced() {
        let map = column_map();
        let mut writer = MicroBlockWriter::new(&map, 4096).unwrap();
        writer.append_row(&row(5, "a")).unwrap();
        assert!(matches!(
            writer.append_row(&row(5, "b")),
            Err(RowLiteError::InvalidArgument(_))
        ));
        assert!(writer.append_row(&row(4, "b")).is_err());

        // ordering survives reuse, not reset
        writer.reuse();
        assert!(writer.append_row(&row(3, "c")).is_err());
        writer.reset();
        writer.append_row(&row(3, "c")).unwrap();
    }

    #[test]
    fn test_rejects_bad_rows() {
        let map = column_map();
        let mut writer = MicroBlockWriter::new(&map, 4096).unwrap();
        let null_key = StoreRow::from_cells(vec![Datum::Null, Datum::from("x")]);
        assert!(writer.append_row(&null_key).is_err());
        let wrong_type = StoreRow::from_cells(vec![Datum::UInt(1), Datum::from("x")]);
        assert!(writer.append_row(&wrong_type).is_err());
        let short = StoreRow::from_cells(vec![Datum::Int(1)]);
        assert!(writer.append_row(&short).is_err());
        let null_value = StoreRow::from_cells(vec![Datum::Int(1), Datum::Null]);
        writer.append_row(&null_value).unwrap();
    }

    #[test]
    fn test_size_limit() {
        let map = column_map();
        let mut writer = MicroBlockWriter::new(&map, 64).unwrap();
        let big = "x".repeat(100);
        // the first row always fits
        writer.append_row(&row(1, &big)).unwrap();
        assert!(!writer.fits(&row(2, "y")));
        assert!(matches!(
            writer.append_row(&row(2, "y")),
            Err(RowLiteError::AllocationFailed(_))
        ));
        assert!(MicroBlockWriter::new(&map, 8).is_err());
    }
}
