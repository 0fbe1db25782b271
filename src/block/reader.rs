use crate::block::codec::{
    compare_encoded_rowkey, decode_row_into, parse_row, rowkey_span, validate_search_key,
    MicroBlockHeader, RowPayload, MICRO_BLOCK_HEADER_SIZE,
};
use crate::byteutils::read_u32;
use crate::column_map::ColumnMap;
use crate::error::RowLiteError;
use crate::row_cache::RowCacheValue;
use crate::types::{RowKey, StoreRow};
use crate::Result;
use std::cmp::Ordering;
use std::fmt;

/// Largest batch callers are expected to hand to [MicroBlockReader::get_rows].
pub const MAX_BATCH_ROW_COUNT: usize = 256;

/// Borrowed bytes of one encoded micro block. The owner (block cache, mapped
/// file, ...) must outlive every reader decoding it.
#[derive(Clone, Copy)]
pub struct MicroBlockData<'a> {
    data: &'a [u8],
}

impl<'a> MicroBlockData<'a> {
    pub fn new(data: &'a [u8]) -> MicroBlockData<'a> {
        MicroBlockData { data }
    }

    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<'a> fmt::Debug for MicroBlockData<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicroBlockData")
            .field("len", &self.data.len())
            .finish()
    }
}

/// Rows reachable by ordinal position.
pub trait OrdinalAccess<'a> {
    fn begin(&self) -> Result<usize>;
    fn end(&self) -> Result<usize>;
    fn get_row(&self, position: usize, row: &mut StoreRow<'a>) -> Result<()>;
}

/// Rows reachable by key.
pub trait KeyLocate {
    /// First position in `[begin, end)` whose key is `>= key` (`lower_bound`)
    /// or `> key`, and whether the row there equals `key`.
    fn find_bound(
        &self,
        key: &RowKey<'_>,
        lower_bound: bool,
        begin: usize,
        end: usize,
    ) -> Result<(usize, bool)>;
}

struct ReaderState<'a> {
    header: MicroBlockHeader,
    directory: &'a [u8],
    payload: &'a [u8],
    column_map: &'a ColumnMap,
}

/// Decoder of one micro block.
///
/// A reader is either uninitialized or bound to one block and one column map.
/// It is meant to be reused: [MicroBlockReader::reset] it and
/// [MicroBlockReader::init] it again for the next block.
#[derive(Default)]
pub struct MicroBlockReader<'a> {
    state: Option<ReaderState<'a>>,
}

impl<'a> MicroBlockReader<'a> {
    pub fn new() -> MicroBlockReader<'a> {
        MicroBlockReader { state: None }
    }

    pub fn init(&mut self, block: MicroBlockData<'a>, column_map: &'a ColumnMap) -> Result<()> {
        if self.state.is_some() {
            return Err(RowLiteError::AlreadyInitialized);
        }
        if block.is_empty() {
            return Err(RowLiteError::invalid("empty micro block"));
        }
        let data = block.data();
        let header = MicroBlockHeader::decode(data)?;
        if header.rowkey_count as usize != column_map.rowkey_count()
            || header.column_count as usize != column_map.store_count()
        {
            return Err(RowLiteError::InvalidArgument(format!(
                "block has {} columns ({} rowkey), column map expects {} ({} rowkey)",
                header.column_count,
                header.rowkey_count,
                column_map.store_count(),
                column_map.rowkey_count()
            )));
        }

        let payload_offset = header.payload_offset();
        match payload_offset.checked_add(header.payload_len as usize) {
            Some(total) if total == data.len() => {}
            _ => {
                return Err(RowLiteError::CorruptPayload(format!(
                    "{} rows and {} payload bytes do not fit a block of {} bytes",
                    header.row_count,
                    header.payload_len,
                    data.len()
                )))
            }
        }
        let directory = &data[MICRO_BLOCK_HEADER_SIZE..payload_offset];
        let payload = &data[payload_offset..];
        check_directory(directory, payload.len())?;

        self.state = Some(ReaderState {
            header,
            directory,
            payload,
            column_map,
        });
        Ok(())
    }

    pub fn reset(&mut self) {
        self.state = None;
    }

    #[inline]
    pub fn is_inited(&self) -> bool {
        self.state.is_some()
    }

    #[inline]
    fn state(&self) -> Result<&ReaderState<'a>> {
        self.state.as_ref().ok_or(RowLiteError::NotInitialized)
    }

    pub fn row_count(&self) -> Result<usize> {
        Ok(self.state()?.header.row_count as usize)
    }

    pub fn column_map(&self) -> Result<&'a ColumnMap> {
        Ok(self.state()?.column_map)
    }

    pub fn begin(&self) -> Result<usize> {
        self.state()?;
        Ok(0)
    }

    pub fn end(&self) -> Result<usize> {
        self.row_count()
    }

    fn row_payload(&self, position: usize) -> Result<RowPayload<'a>> {
        let state = self.state()?;
        let row_count = state.header.row_count as usize;
        if position >= row_count {
            return Err(RowLiteError::OutOfRange {
                position,
                begin: 0,
                end: row_count,
            });
        }
        let offset = read_u32(state.directory, position * 4)? as usize;
        parse_row(state.payload, offset)
    }

    pub fn get_row(&self, position: usize, row: &mut StoreRow<'a>) -> Result<()> {
        let payload = self.row_payload(position)?;
        decode_row_into(&payload, self.state()?.column_map, row, |d| d)
    }

    /// Materialize up to `min(count, rows.len(), end - start)` rows starting at
    /// `start`. `row_count` holds the number of fully decoded rows, also when
    /// the batch stops on an error.
    pub fn get_rows(
        &self,
        start: usize,
        count: usize,
        rows: &mut [StoreRow<'a>],
        row_count: &mut usize,
    ) -> Result<()> {
        *row_count = 0;
        let state = self.state()?;
        let end = state.header.row_count as usize;
        if start > end {
            return Err(RowLiteError::OutOfRange {
                position: start,
                begin: 0,
                end,
            });
        }
        let batch = count.min(rows.len()).min(end - start);
        for (i, slot) in rows.iter_mut().take(batch).enumerate() {
            let payload = self.row_payload(start + i)?;
            decode_row_into(&payload, state.column_map, slot, |d| d)?;
            *row_count += 1;
        }
        Ok(())
    }

    pub fn find_bound(
        &self,
        key: &RowKey<'_>,
        lower_bound: bool,
        begin: usize,
        end: usize,
    ) -> Result<(usize, bool)> {
        let state = self.state()?;
        let row_count = state.header.row_count as usize;
        if begin > end {
            return Err(RowLiteError::InvalidArgument(format!(
                "search range [{}, {})",
                begin, end
            )));
        }
        if end > row_count {
            return Err(RowLiteError::OutOfRange {
                position: end,
                begin: 0,
                end: row_count,
            });
        }
        let rowkey_columns = state.column_map.rowkey_columns();
        validate_search_key(key, rowkey_columns)?;
        match key {
            RowKey::Min => return Ok((begin, false)),
            RowKey::Max => return Ok((end, false)),
            RowKey::Tuple(_) => {}
        }

        let (mut lo, mut hi) = (begin, end);
        let mut equal_at = None;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let payload = self.row_payload(mid)?;
            let ord = compare_encoded_rowkey(payload.cells, key, rowkey_columns)?;
            if ord == Ordering::Equal {
                equal_at = Some(mid);
            }
            let go_right = if lower_bound {
                ord == Ordering::Less
            } else {
                ord != Ordering::Greater
            };
            if go_right {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok((lo, lo < end && equal_at == Some(lo)))
    }

    /// Encoded rowkey of the row at `position`, borrowed from the block.
    pub fn rowkey_bytes(&self, position: usize) -> Result<&'a [u8]> {
        let payload = self.row_payload(position)?;
        rowkey_span(payload.cells, self.state()?.column_map.rowkey_count())
    }

    /// Copy the row at `position` into a row cache value.
    pub fn get_cached_value(&self, position: usize) -> Result<RowCacheValue> {
        let payload = self.row_payload(position)?;
        let schema_version = self.state()?.column_map.schema_version();
        Ok(RowCacheValue::new_row(payload.flag, schema_version, payload.raw))
    }
}

fn check_directory(directory: &[u8], payload_len: usize) -> Result<()> {
    let mut last = 0;
    for i in 0..directory.len() / 4 {
        let offset = read_u32(directory, i * 4)? as usize;
        if offset < last || offset >= payload_len {
            return Err(RowLiteError::CorruptPayload(format!(
                "row {} starts at {}, previous row at {}, payload is {} bytes",
                i, offset, last, payload_len
            )));
        }
        last = offset;
    }
    Ok(())
}

impl<'a> OrdinalAccess<'a> for MicroBlockReader<'a> {
    fn begin(&self) -> Result<usize> {
        MicroBlockReader::begin(self)
    }

    fn end(&self) -> Result<usize> {
        MicroBlockReader::end(self)
    }

    fn get_row(&self, position: usize, row: &mut StoreRow<'a>) -> Result<()> {
        MicroBlockReader::get_row(self, position, row)
    }
}

impl<'a> KeyLocate for MicroBlockReader<'a> {
    fn find_bound(
        &self,
        key: &RowKey<'_>,
        lower_bound: bool,
        begin: usize,
        end: usize,
    ) -> Result<(usize, bool)> {
        MicroBlockReader::find_bound(self, key, lower_bound, begin, end)
    }
}

#[cfg(test)]
mod tests {
    use crate::block::reader::{MicroBlockData, MicroBlockReader};
    use crate::block::writer::MicroBlockWriter;
    use crate::column_map::{ColumnDesc, ColumnMap};
    use crate::error::RowLiteError;
    use crate::types::{ColumnType, Datum, RowFlag, RowKey, StoreRow};

    fn column_map() -> ColumnMap {
        ColumnMap::full(
            1,
            1,
            vec![
                ColumnDesc::new(16, ColumnType::Int),
                ColumnDesc::new(17, ColumnType::Varchar),
            ],
        )
        .unwrap()
    }

    fn build_block(map: &ColumnMap, keys: &[i64]) -> Vec<u8> {
        let mut writer = MicroBlockWriter::new(map, 1 << 16).unwrap();
        for k in keys {
            let v = format!("value{}", k);
            let mut row = StoreRow::from_cells(vec![Datum::Int(*k), Datum::from(v.as_str())]);
            if *k == 8 {
                row.flag = RowFlag::DoesNotExist;
            }
            writer.append_row(&row).unwrap();
        }
        writer.build().unwrap()
    }

    fn int_key(k: i64) -> RowKey<'static> {
        RowKey::new(vec![Datum::Int(k)])
    }

    #[test]
    fn test_find_bound() {
        let map = column_map();
        let block = build_block(&map, &[2, 4, 6, 8]);
        let mut reader = MicroBlockReader::new();
        reader.init(MicroBlockData::new(&block), &map).unwrap();
        let (begin, end) = (reader.begin().unwrap(), reader.end().unwrap());
        assert_eq!((begin, end), (0, 4));

        assert_eq!(
            reader.find_bound(&int_key(5), true, begin, end).unwrap(),
            (2, false)
        );
        assert_eq!(
            reader.find_bound(&int_key(6), true, begin, end).unwrap(),
            (2, true)
        );
        assert_eq!(
            reader.find_bound(&int_key(6), false, begin, end).unwrap(),
            (3, false)
        );
        assert_eq!(
            reader.find_bound(&int_key(9), true, begin, end).unwrap(),
            (4, false)
        );
        assert_eq!(
            reader.find_bound(&int_key(1), false, begin, end).unwrap(),
            (0, false)
        );
        assert_eq!(
            reader.find_bound(&RowKey::Min, true, begin, end).unwrap(),
            (0, false)
        );
        assert_eq!(
            reader.find_bound(&RowKey::Max, true, begin, end).unwrap(),
            (4, false)
        );
        // sub range
        assert_eq!(reader.find_bound(&int_key(8), true, 0, 2).unwrap(), (2, false));
        assert_eq!(reader.find_bound(&int_key(2), true, 1, 3).unwrap(), (1, false));
    }

    #[test]
    fn test_find_bound_invalid() {
        let map = column_map();
        let block = build_block(&map, &[2, 4]);
        let mut reader = MicroBlockReader::new();
        reader.init(MicroBlockData::new(&block), &map).unwrap();
        assert!(matches!(
            reader.find_bound(&int_key(1), true, 0, 3),
            Err(RowLiteError::OutOfRange { .. })
        ));
        assert!(matches!(
            reader.find_bound(&int_key(1), true, 2, 1),
            Err(RowLiteError::InvalidArgument(_))
        ));
        let wrong_type = RowKey::new(vec![Datum::from("2")]);
        assert!(matches!(
            reader.find_bound(&wrong_type, true, 0, 2),
            Err(RowLiteError::InvalidArgument(_))
        ));
        let null_key = RowKey::new(vec![Datum::Null]);
        assert_eq!(reader.find_bound(&null_key, true, 0, 2).unwrap(), (0, false));
    }

    #[test]
    fn test_get_row_and_flag() {
        let map = column_map();
        let block = build_block(&map, &[2, 4, 6, 8]);
        let mut reader = MicroBlockReader::new();
        reader.init(MicroBlockData::new(&block), &map).unwrap();
        let mut row = StoreRow::new(map.out_count());
        reader.get_row(1, &mut row).unwrap();
        assert!(row.exists());
        assert_eq!(row.cells, vec![Datum::Int(4), Datum::from("value4")]);
        reader.get_row(3, &mut row).unwrap();
        assert_eq!(row.flag, RowFlag::DoesNotExist);
        assert_eq!(
            reader.get_row(4, &mut row),
            Err(RowLiteError::OutOfRange {
                position: 4,
                begin: 0,
                end: 4
            })
        );
    }

    #[test]
    fn test_state_machine() {
        let map = column_map();
        let block = build_block(&map, &[1, 2, 3]);
        let mut reader = MicroBlockReader::new();
        let mut row = StoreRow::new(2);
        assert_eq!(reader.begin(), Err(RowLiteError::NotInitialized));
        assert_eq!(reader.get_row(0, &mut row), Err(RowLiteError::NotInitialized));
        assert_eq!(
            reader.find_bound(&RowKey::Min, true, 0, 0),
            Err(RowLiteError::NotInitialized)
        );

        reader.init(MicroBlockData::new(&block), &map).unwrap();
        assert_eq!(
            reader.init(MicroBlockData::new(&block), &map),
            Err(RowLiteError::AlreadyInitialized)
        );
        reader.reset();
        assert!(!reader.is_inited());
        assert_eq!(reader.end(), Err(RowLiteError::NotInitialized));
        reader.init(MicroBlockData::new(&block), &map).unwrap();
        assert_eq!(reader.end().unwrap(), 3);
    }

    #[test]
    fn test_corrupt_block() {
        let map = column_map();
        let block = build_block(&map, &[1, 2, 3]);
        let mut reader = MicroBlockReader::new();

        let truncated = &block[..block.len() - 1];
        assert!(matches!(
            reader.init(MicroBlockData::new(truncated), &map),
            Err(RowLiteError::CorruptPayload(_))
        ));
        assert!(!reader.is_inited());

        let mut bad_magic = block.clone();
        bad_magic[0] ^= 0xff;
        assert!(matches!(
            reader.init(MicroBlockData::new(&bad_magic), &map),
            Err(RowLiteError::CorruptPayload(_))
        ));

        // the second row claims to start past the payload
        let mut bad_offset = block.clone();
        bad_offset[24..28].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            reader.init(MicroBlockData::new(&bad_offset), &map),
            Err(RowLiteError::CorruptPayload(_))
        ));

        // a row length running past the payload is caught on access
        let mut bad_len = block.clone();
        let last_row = 20 + 3 * 4 + u32::from_le_bytes([block[28], block[29], block[30], block[31]]) as usize;
        bad_len[last_row..last_row + 4].copy_from_slice(&1000u32.to_le_bytes());
        reader.init(MicroBlockData::new(&bad_len), &map).unwrap();
        let mut row = StoreRow::new(2);
        assert!(matches!(
            reader.get_row(2, &mut row),
            Err(RowLiteError::CorruptPayload(_))
        ));
        reader.get_row(1, &mut row).unwrap();

        let other = ColumnMap::full(1, 1, vec![ColumnDesc::new(16, ColumnType::Int)]).unwrap();
        reader.reset();
        assert!(matches!(
            reader.init(MicroBlockData::new(&block), &other),
            Err(RowLiteError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_rowkey_bytes_and_cached_value() {
        let map = column_map();
        let block = build_block(&map, &[2, 4]);
        let mut reader = MicroBlockReader::new();
        reader.init(MicroBlockData::new(&block), &map).unwrap();
        let mut expected = Vec::new();
        crate::block::codec::encode_rowkey(&[Datum::Int(4)], &mut expected);
        assert_eq!(reader.rowkey_bytes(1).unwrap(), expected.as_slice());
        let value = reader.get_cached_value(1).unwrap();
        assert!(!value.is_absent());
        assert_eq!(value.schema_version(), 1);
    }
}
