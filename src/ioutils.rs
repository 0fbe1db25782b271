use crate::Result;
use std::io;
use std::io::{BufWriter, Seek, SeekFrom, Write};

/// Buffered writer that tracks the absolute position of the next byte,
/// so block offsets can be recorded without seeking.
pub struct BufWriterWithPos<W: Write + Seek> {
    writer: BufWriter<W>,
    pub pos: u64,
}

impl<W: Write + Seek> BufWriterWithPos<W> {
    pub fn new(mut inner: W) -> Result<Self> {
        let pos = inner.seek(SeekFrom::End(0))?;
        Ok(BufWriterWithPos {
            writer: BufWriter::new(inner),
            pos,
        })
    }
}

impl<W: Write + Seek> Write for BufWriterWithPos<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = self.writer.write(buf)?;
        self.pos += len as u64;
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

pub fn write_u32(writer: &mut impl Write, n: u32) -> Result<()> {
    writer.write_all(&n.to_le_bytes())?;
    Ok(())
}
