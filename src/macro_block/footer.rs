use crate::byteutils::read_u32;
use crate::error::RowLiteError;
use crate::ioutils::write_u32;
use crate::macro_block::Compression;
use crate::Result;
use std::io::Write;

pub const FOOTER_MAGIC_NUMBER: u32 = 0xdb991122;
pub const FOOTER_BYTE_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Footer {
    pub index_offset: u32,
    pub index_length: u32,
    pub filter_offset: u32,
    pub filter_length: u32,
    pub row_count: u32,
    pub block_count: u32,
    pub compression: Compression,
}

impl Footer {
    pub(crate) fn write_to(&self, writer: &mut impl Write) -> Result<()> {
        write_u32(writer, self.index_offset)?;
        write_u32(writer, self.index_length)?;
        write_u32(writer, self.filter_offset)?;
        write_u32(writer, self.filter_length)?;
        write_u32(writer, self.row_count)?;
        write_u32(writer, self.block_count)?;
        write_u32(writer, self.compression.to_u32())?;
        write_u32(writer, FOOTER_MAGIC_NUMBER)?;
        Ok(())
    }

    /// Decode the footer from the tail of `file`, checking that every region
    /// it points at lies before it.
    pub(crate) fn load_footer(file: &[u8]) -> Result<Footer> {
        if file.len() < FOOTER_BYTE_SIZE {
            return Err(RowLiteError::CorruptPayload(format!(
                "macro block of {} bytes is shorter than its footer",
                file.len()
            )));
        }
        let footer_offset = file.len() - FOOTER_BYTE_SIZE;
        let buf = &file[footer_offset..];

        // validate magic number
        let magic_number = read_u32(buf, 28)?;
        if magic_number != FOOTER_MAGIC_NUMBER {
            return Err(RowLiteError::corrupt("invalid footer magic number"));
        }
        let compression = read_u32(buf, 24)?;
        let footer = Footer {
            index_offset: read_u32(buf, 0)?,
            index_length: read_u32(buf, 4)?,
            filter_offset: read_u32(buf, 8)?,
            filter_length: read_u32(buf, 12)?,
            row_count: read_u32(buf, 16)?,
            block_count: read_u32(buf, 20)?,
            compression: Compression::from_u32(compression).ok_or_else(|| {
                RowLiteError::CorruptPayload(format!("unknown compression {}", compression))
            })?,
        };

        let index_end = footer.index_offset as usize + footer.index_length as usize;
        let filter_end = footer.filter_offset as usize + footer.filter_length as usize;
        if index_end > footer.filter_offset as usize || filter_end > footer_offset {
            return Err(RowLiteError::CorruptPayload(format!(
                "footer regions {:?} exceed file of {} bytes",
                footer,
                file.len()
            )));
        }
        Ok(footer)
    }
}
