//! Little-endian helpers over borrowed byte slices.

use crate::error::RowLiteError;
use crate::Result;

pub fn u32_from_le_bytes(bytes: &[u8]) -> u32 {
    debug_assert_eq!(bytes.len(), 4);
    let mut buf = [0u8; 4];
    buf.clone_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn fixed<'a>(buf: &'a [u8], offset: usize, len: usize, what: &str) -> Result<&'a [u8]> {
    match offset.checked_add(len) {
        Some(end) if end <= buf.len() => Ok(&buf[offset..end]),
        _ => Err(RowLiteError::CorruptPayload(format!(
            "{} at offset {} (+{}) exceeds buffer of {} bytes",
            what,
            offset,
            len,
            buf.len()
        ))),
    }
}

pub fn read_u8(buf: &[u8], offset: usize) -> Result<u8> {
    Ok(fixed(buf, offset, 1, "u8")?[0])
}

pub fn read_u16(buf: &[u8], offset: usize) -> Result<u16> {
    let mut b = [0u8; 2];
    b.clone_from_slice(fixed(buf, offset, 2, "u16")?);
    Ok(u16::from_le_bytes(b))
}

pub fn read_u32(buf: &[u8], offset: usize) -> Result<u32> {
    Ok(u32_from_le_bytes(fixed(buf, offset, 4, "u32")?))
}

pub fn read_u64(buf: &[u8], offset: usize) -> Result<u64> {
    let mut b = [0u8; 8];
    b.clone_from_slice(fixed(buf, offset, 8, "u64")?);
    Ok(u64::from_le_bytes(b))
}

/// Borrow `len` bytes starting at `offset`.
pub fn read_slice(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    fixed(buf, offset, len, "slice")
}
