use crate::block::MicroBlockData;
use crate::bloom::BloomFilter;
use crate::column_map::ColumnDesc;
use crate::error::RowLiteError;
use crate::iterator::{BlockHandle, MicroBlockSource, PrefetchHandle};
use crate::macro_block::footer::{Footer, FOOTER_BYTE_SIZE};
use crate::macro_block::index_block::IndexBlock;
use crate::macro_block::Compression;
use crate::types::RowKey;
use crate::Result;
use memmap::{Mmap, MmapOptions};
use std::fs::File;
use std::path::Path;
use std::sync::OnceLock;

/// A memory-mapped macro block file.
///
/// Uncompressed micro blocks are handed out as slices of the mapping.
/// Compressed ones are decompressed on first use into a buffer owned by the
/// reader, so every block handed out lives as long as the reader.
pub struct MacroBlockReader {
    mmap: Mmap,
    footer: Footer,
    index: IndexBlock,
    filter: BloomFilter,
    decompressed: Vec<OnceLock<std::result::Result<Vec<u8>, String>>>,
}

impl MacroBlockReader {
    pub fn open(path: impl AsRef<Path>) -> Result<MacroBlockReader> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len < FOOTER_BYTE_SIZE as u64 {
            return Err(RowLiteError::CorruptPayload(format!(
                "{} is too short ({} bytes) for a macro block",
                path.display(),
                len
            )));
        }
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        let reader = MacroBlockReader::from_mmap(mmap)?;
        debug!(
            "open macro block {}: {} rows in {} micro blocks",
            path.display(),
            reader.row_count(),
            reader.block_count()
        );
        Ok(reader)
    }

    fn from_mmap(mmap: Mmap) -> Result<MacroBlockReader> {
        let footer = Footer::load_footer(&mmap)?;
        let index_start = footer.index_offset as usize;
        let index = IndexBlock::load_index(
            &mmap[index_start..index_start + footer.index_length as usize],
        )?;
        if index.len() != footer.block_count as usize {
            return Err(RowLiteError::CorruptPayload(format!(
                "index holds {} blocks, footer says {}",
                index.len(),
                footer.block_count
            )));
        }
        for entry in index.entries() {
            if entry.offset as usize + entry.stored_length as usize > index_start {
                return Err(RowLiteError::CorruptPayload(format!(
                    "micro block at {} overlaps the index block",
                    entry.offset
                )));
            }
        }

        let filter_start = footer.filter_offset as usize;
        let filter =
            BloomFilter::from_bytes(&mmap[filter_start..filter_start + footer.filter_length as usize])
                .ok_or_else(|| RowLiteError::corrupt("filter block too short"))?;

        let decompressed = match footer.compression {
            Compression::None => Vec::new(),
            Compression::Snappy => (0..index.len()).map(|_| OnceLock::new()).collect(),
        };
        Ok(MacroBlockReader {
            mmap,
            footer,
            index,
            filter,
            decompressed,
        })
    }

    #[inline]
    pub fn row_count(&self) -> u32 {
        self.footer.row_count
    }

    #[inline]
    pub fn block_count(&self) -> u32 {
        self.footer.block_count
    }

    #[inline]
    pub fn compression(&self) -> Compression {
        self.footer.compression
    }

    /// Handle of every micro block, in key order.
    pub fn block_handles(&self) -> Vec<BlockHandle> {
        (0..self.index.len()).filter_map(|i| self.handle(i)).collect()
    }

    fn handle(&self, index: usize) -> Option<BlockHandle> {
        self.index.get(index).map(|entry| BlockHandle {
            index,
            offset: entry.offset as u64,
            length: entry.stored_length as u64,
        })
    }

    /// Bytes of one micro block, decompressed if needed.
    pub fn block_data(&self, index: usize) -> Result<MicroBlockData<'_>> {
        let entry = self.index.get(index).ok_or(RowLiteError::OutOfRange {
            position: index,
            begin: 0,
            end: self.index.len(),
        })?;
        let start = entry.offset as usize;
        let stored = &self.mmap[start..start + entry.stored_length as usize];
        match self.footer.compression {
            Compression::None => Ok(MicroBlockData::new(stored)),
            Compression::Snappy => {
                let raw_length = entry.raw_length as usize;
                let block = self.decompressed[index].get_or_init(|| decompress(stored, raw_length));
                match block {
                    Ok(buf) => Ok(MicroBlockData::new(buf)),
                    Err(msg) => Err(RowLiteError::CorruptPayload(msg.clone())),
                }
            }
        }
    }
}

fn decompress(stored: &[u8], raw_length: usize) -> std::result::Result<Vec<u8>, String> {
    let buf = snap::raw::Decoder::new()
        .decompress_vec(stored)
        .map_err(|e| format!("snappy: {}", e))?;
    if buf.len() != raw_length {
        return Err(format!(
            "micro block decompressed to {} bytes, expected {}",
            buf.len(),
            raw_length
        ));
    }
    Ok(buf)
}

impl<'a> MicroBlockSource<'a> for MacroBlockReader {
    fn locate(
        &'a self,
        start: &RowKey<'_>,
        end: &RowKey<'_>,
        rowkey_columns: &[ColumnDesc],
    ) -> Result<Vec<BlockHandle>> {
        let range = self.index.locate(start, end, rowkey_columns)?;
        Ok(range.filter_map(|i| self.handle(i)).collect())
    }

    fn may_contain(&'a self, rowkey: &[u8]) -> bool {
        self.filter.may_contain(rowkey)
    }

    fn prefetch(&'a self, handle: &BlockHandle) -> Result<PrefetchHandle<'a>> {
        Ok(PrefetchHandle::ready(self.block_data(handle.index)))
    }
}
