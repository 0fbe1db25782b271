use crate::block::codec::compare_encoded_rowkey;
use crate::byteutils::{read_slice, read_u32};
use crate::column_map::ColumnDesc;
use crate::ioutils::write_u32;
use crate::types::RowKey;
use crate::Result;
use std::cmp::Ordering;
use std::io::Write;

pub(crate) struct IndexEntry {
    pub offset: u32,
    pub stored_length: u32,
    pub raw_length: u32,
    /// Encoded rowkey of the last row in the block.
    pub end_key: Vec<u8>,
}

#[derive(Default)]
pub(crate) struct IndexBlock {
    entries: Vec<IndexEntry>,
}

impl IndexBlock {
    pub(crate) fn add_index(&mut self, offset: u32, stored_length: u32, raw_length: u32, end_key: &[u8]) {
        self.entries.push(IndexEntry {
            offset,
            stored_length,
            raw_length,
            end_key: end_key.to_vec(),
        });
    }

    pub(crate) fn write_to(&self, writer: &mut impl Write) -> Result<()> {
        for entry in &self.entries {
            write_u32(writer, entry.offset)?;
            write_u32(writer, entry.stored_length)?;
            write_u32(writer, entry.raw_length)?;
            write_u32(writer, entry.end_key.len() as u32)?;
            writer.write_all(&entry.end_key)?;
        }
        Ok(())
    }

    pub(crate) fn load_index(buf: &[u8]) -> Result<IndexBlock> {
        let mut index_block = IndexBlock::default();
        let mut offset = 0;
        while offset < buf.len() {
            let block_offset = read_u32(buf, offset)?;
            let stored_length = read_u32(buf, offset + 4)?;
            let raw_length = read_u32(buf, offset + 8)?;
            let key_length = read_u32(buf, offset + 12)? as usize;
            let end_key = read_slice(buf, offset + 16, key_length)?;
            index_block.add_index(block_offset, stored_length, raw_length, end_key);
            offset += 16 + key_length;
        }
        Ok(index_block)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub(crate) fn get(&self, index: usize) -> Option<&IndexEntry> {
        self.entries.get(index)
    }

    pub(crate) fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Index of the first block whose end key is greater or equal to `key`,
    /// `len()` if there is none.
    pub(crate) fn find_first_ge(&self, key: &RowKey<'_>, rowkey_columns: &[ColumnDesc]) -> Result<usize> {
        let (mut lo, mut hi) = (0, self.entries.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match compare_encoded_rowkey(&self.entries[mid].end_key, key, rowkey_columns)? {
                Ordering::Less => lo = mid + 1,
                _ => hi = mid,
            }
        }
        Ok(lo)
    }

    /// Blocks that may hold keys in `[start, end]`, as a range of indexes.
    pub(crate) fn locate(
        &self,
        start: &RowKey<'_>,
        end: &RowKey<'_>,
        rowkey_columns: &[ColumnDesc],
    ) -> Result<std::ops::Range<usize>> {
        let first = self.find_first_ge(start, rowkey_columns)?;
        if first == self.entries.len() {
            return Ok(first..first);
        }
        let last = self.find_first_ge(end, rowkey_columns)?;
        Ok(first..(last + 1).min(self.entries.len()))
    }
}

#[cfg(test)]
mod tests {
    use crate::block::codec::encode_rowkey;
    use crate::column_map::ColumnDesc;
    use crate::macro_block::index_block::IndexBlock;
    use crate::types::{ColumnType, Datum, RowKey};

    fn end_key(k: i64) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_rowkey(&[Datum::Int(k)], &mut buf);
        buf
    }

    fn key(k: i64) -> RowKey<'static> {
        RowKey::new(vec![Datum::Int(k)])
    }

    #[test]
    fn test_index_block() {
        let columns = [ColumnDesc::new(1, ColumnType::Int)];
        let mut index = IndexBlock::default();
        for (i, k) in [10, 20, 30].iter().enumerate() {
            index.add_index(i as u32 * 100, 100, 120, &end_key(*k));
        }
        let mut buf = Vec::new();
        index.write_to(&mut buf).unwrap();
        let index = IndexBlock::load_index(&buf).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.get(2).unwrap().offset, 200);
        assert_eq!(index.get(1).unwrap().raw_length, 120);

        assert_eq!(index.find_first_ge(&key(5), &columns).unwrap(), 0);
        assert_eq!(index.find_first_ge(&key(20), &columns).unwrap(), 1);
        assert_eq!(index.find_first_ge(&key(21), &columns).unwrap(), 2);
        assert_eq!(index.find_first_ge(&key(31), &columns).unwrap(), 3);

        assert_eq!(index.locate(&key(15), &key(25), &columns).unwrap(), 1..3);
        assert_eq!(index.locate(&key(12), &key(12), &columns).unwrap(), 1..2);
        assert_eq!(index.locate(&RowKey::Min, &RowKey::Max, &columns).unwrap(), 0..3);
        assert_eq!(index.locate(&key(40), &RowKey::Max, &columns).unwrap(), 3..3);

        assert!(IndexBlock::load_index(&buf[..buf.len() - 1]).is_err());
    }
}
