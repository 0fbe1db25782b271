use crate::block::codec::encode_rowkey_identity;
use crate::block::MicroBlockWriter;
use crate::bloom::BloomFilter;
use crate::column_map::{ColumnDesc, ColumnMap};
use crate::error::RowLiteError;
use crate::ioutils::BufWriterWithPos;
use crate::macro_block::footer::Footer;
use crate::macro_block::index_block::IndexBlock;
use crate::macro_block::{Compression, MacroBlockMeta, MacroBlockOptions};
use crate::types::StoreRow;
use crate::Result;
use std::convert::TryFrom;
use std::io::{self, Seek, Write};

/// Writes rows, in strictly ascending rowkey order, into a macro block.
pub struct MacroBlockWriter<W: Write + Seek> {
    writer: BufWriterWithPos<W>,
    options: MacroBlockOptions,
    micro_block: MicroBlockWriter,
    index_block: IndexBlock,
    rowkey_columns: Vec<ColumnDesc>,
    /// Identity encoded rowkeys of every row, for the filter block.
    rowkeys: Vec<Vec<u8>>,
    row_count: u32,
}

impl<W: Write + Seek> MacroBlockWriter<W> {
    /// Blocks are appended after whatever `inner` already holds.
    pub fn new(
        inner: W,
        column_map: &ColumnMap,
        options: MacroBlockOptions,
    ) -> Result<MacroBlockWriter<W>> {
        Ok(MacroBlockWriter {
            writer: BufWriterWithPos::new(inner)?,
            options,
            micro_block: MicroBlockWriter::new(column_map, options.micro_block_size)?,
            index_block: IndexBlock::default(),
            rowkey_columns: column_map.rowkey_columns().to_vec(),
            rowkeys: Vec::new(),
            row_count: 0,
        })
    }

    pub fn append_row(&mut self, row: &StoreRow<'_>) -> Result<()> {
        if !self.micro_block.fits(row) {
            self.flush_micro_block()?;
        }
        self.micro_block.append_row(row)?;
        let mut rowkey = Vec::new();
        encode_rowkey_identity(
            &row.cells[..self.rowkey_columns.len()],
            &self.rowkey_columns,
            &mut rowkey,
        );
        self.rowkeys.push(rowkey);
        self.row_count += 1;
        Ok(())
    }

    fn flush_micro_block(&mut self) -> Result<()> {
        if self.micro_block.is_empty() {
            return Ok(());
        }
        let block = self.micro_block.build()?;
        let compressed;
        let stored: &[u8] = match self.options.compression {
            Compression::None => &block,
            Compression::Snappy => {
                compressed = snap::raw::Encoder::new()
                    .compress_vec(&block)
                    .map_err(io::Error::from)?;
                &compressed
            }
        };
        let offset = to_u32(self.writer.pos)?;
        self.writer.write_all(stored)?;
        let end_key = self.micro_block.last_rowkey().unwrap_or(&[]);
        self.index_block.add_index(
            offset,
            to_u32(stored.len() as u64)?,
            to_u32(block.len() as u64)?,
            end_key,
        );
        self.micro_block.reuse();
        Ok(())
    }

    /// Write the pending micro block, the index, the filter and the footer.
    pub fn finish(mut self) -> Result<MacroBlockMeta> {
        self.flush_micro_block()?;

        let index_offset = self.writer.pos;
        self.index_block.write_to(&mut self.writer)?;
        let filter_offset = self.writer.pos;

        let mut filter = BloomFilter::create_filter(self.rowkeys.len());
        for rowkey in &self.rowkeys {
            filter.add(rowkey);
        }
        self.writer.write_all(filter.as_bytes())?;

        let footer = Footer {
            index_offset: to_u32(index_offset)?,
            index_length: to_u32(filter_offset - index_offset)?,
            filter_offset: to_u32(filter_offset)?,
            filter_length: filter.len(),
            row_count: self.row_count,
            block_count: self.index_block.len() as u32,
            compression: self.options.compression,
        };
        footer.write_to(&mut self.writer)?;
        self.writer.flush()?;

        let meta = MacroBlockMeta {
            row_count: self.row_count,
            block_count: footer.block_count,
            size: self.writer.pos,
            compression: self.options.compression,
        };
        info!(
            "macro block finished: {} rows in {} micro blocks, {} bytes, {:?}",
            meta.row_count, meta.block_count, meta.size, meta.compression
        );
        Ok(meta)
    }
}

fn to_u32(n: u64) -> Result<u32> {
    u32::try_from(n)
        .map_err(|_| RowLiteError::AllocationFailed(format!("offset {} exceeds u32", n)))
}
