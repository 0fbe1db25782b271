//! Cell, row and header encodings shared by [super::MicroBlockWriter] and
//! [super::MicroBlockReader].

use crate::byteutils::{read_slice, read_u16, read_u32, read_u64, read_u8};
use crate::column_map::{ColumnDesc, ColumnMap};
use crate::error::RowLiteError;
use crate::types::{Collation, ColumnType, Datum, RowFlag, RowKey, StoreRow};
use crate::Result;
use std::borrow::Cow;
use std::cmp::Ordering;

pub const MICRO_BLOCK_MAGIC: u32 = 0x6b6c_626d;
pub const MICRO_BLOCK_VERSION: u16 = 1;
pub const MICRO_BLOCK_HEADER_SIZE: usize = 20;

/// row length, flag, cell count
pub(crate) const ROW_HEADER_SIZE: usize = 4 + 1 + 2;

const NULL_TAG: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MicroBlockHeader {
    pub rowkey_count: u16,
    pub column_count: u16,
    pub row_count: u32,
    pub payload_len: u32,
}

impl MicroBlockHeader {
    pub(crate) fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&MICRO_BLOCK_MAGIC.to_le_bytes());
        buf.extend_from_slice(&MICRO_BLOCK_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.rowkey_count.to_le_bytes());
        buf.extend_from_slice(&self.column_count.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&self.row_count.to_le_bytes());
        buf.extend_from_slice(&self.payload_len.to_le_bytes());
    }

    pub(crate) fn decode(buf: &[u8]) -> Result<MicroBlockHeader> {
        if buf.len() < MICRO_BLOCK_HEADER_SIZE {
            return Err(RowLiteError::CorruptPayload(format!(
                "block of {} bytes is shorter than its header",
                buf.len()
            )));
        }
        let magic = read_u32(buf, 0)?;
        if magic != MICRO_BLOCK_MAGIC {
            return Err(RowLiteError::CorruptPayload(format!(
                "invalid micro block magic number {:#x}",
                magic
            )));
        }
        let version = read_u16(buf, 4)?;
        if version != MICRO_BLOCK_VERSION {
            return Err(RowLiteError::CorruptPayload(format!(
                "unsupported micro block version {}",
                version
            )));
        }
        Ok(MicroBlockHeader {
            rowkey_count: read_u16(buf, 6)?,
            column_count: read_u16(buf, 8)?,
            row_count: read_u32(buf, 12)?,
            payload_len: read_u32(buf, 16)?,
        })
    }

    /// Length of header plus row directory.
    #[inline]
    pub(crate) fn payload_offset(&self) -> usize {
        MICRO_BLOCK_HEADER_SIZE + self.row_count as usize * 4
    }
}

pub fn encode_datum(datum: &Datum<'_>, buf: &mut Vec<u8>) {
    match datum.column_type() {
        None => buf.push(NULL_TAG),
        Some(t) => buf.push(t.tag()),
    }
    match datum {
        Datum::Null => {}
        Datum::Bool(b) => buf.push(*b as u8),
        Datum::Int(i) | Datum::Timestamp(i) => buf.extend_from_slice(&i.to_le_bytes()),
        Datum::UInt(u) => buf.extend_from_slice(&u.to_le_bytes()),
        Datum::Double(d) => buf.extend_from_slice(&d.to_bits().to_le_bytes()),
        Datum::Varchar(s) => put_var_len(s.as_bytes(), buf),
        Datum::Blob(b) => put_var_len(b, buf),
    }
}

fn put_var_len(bytes: &[u8], buf: &mut Vec<u8>) {
    debug_assert!(bytes.len() <= u32::MAX as usize);
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

pub fn encoded_datum_size(datum: &Datum<'_>) -> usize {
    1 + match datum {
        Datum::Null => 0,
        Datum::Bool(_) => 1,
        Datum::Int(_) | Datum::UInt(_) | Datum::Double(_) | Datum::Timestamp(_) => 8,
        Datum::Varchar(s) => 4 + s.len(),
        Datum::Blob(b) => 4 + b.len(),
    }
}

/// Decode the cell at `offset`, returning it with the offset of the next cell.
pub fn decode_datum(
    buf: &[u8],
    offset: usize,
    expected: ColumnType,
) -> Result<(Datum<'_>, usize)> {
    let tag = read_u8(buf, offset)?;
    let offset = offset + 1;
    if tag == NULL_TAG {
        return Ok((Datum::Null, offset));
    }
    let column_type = ColumnType::from_tag(tag)
        .ok_or_else(|| RowLiteError::CorruptPayload(format!("unknown cell tag {}", tag)))?;
    if column_type != expected {
        return Err(RowLiteError::CorruptPayload(format!(
            "cell of type {:?} in a {:?} column",
            column_type, expected
        )));
    }
    let decoded = match column_type {
        ColumnType::Bool => match read_u8(buf, offset)? {
            0 => (Datum::Bool(false), offset + 1),
            1 => (Datum::Bool(true), offset + 1),
            b => return Err(RowLiteError::corrupt(format!("invalid bool byte {}", b))),
        },
        ColumnType::Int => (Datum::Int(read_u64(buf, offset)? as i64), offset + 8),
        ColumnType::UInt => (Datum::UInt(read_u64(buf, offset)?), offset + 8),
        ColumnType::Double => (
            Datum::Double(f64::from_bits(read_u64(buf, offset)?)),
            offset + 8,
        ),
        ColumnType::Timestamp => (Datum::Timestamp(read_u64(buf, offset)? as i64), offset + 8),
        ColumnType::Varchar => {
            let (bytes, next) = get_var_len(buf, offset)?;
            let s = std::str::from_utf8(bytes)
                .map_err(|e| RowLiteError::corrupt(format!("varchar cell: {}", e)))?;
            (Datum::Varchar(Cow::Borrowed(s)), next)
        }
        ColumnType::Blob => {
            let (bytes, next) = get_var_len(buf, offset)?;
            (Datum::Blob(Cow::Borrowed(bytes)), next)
        }
    };
    Ok(decoded)
}

fn get_var_len(buf: &[u8], offset: usize) -> Result<(&[u8], usize)> {
    let len = read_u32(buf, offset)? as usize;
    let bytes = read_slice(buf, offset + 4, len)?;
    Ok((bytes, offset + 4 + len))
}

/// Offset of the cell after the one at `offset`, without materializing it.
pub fn skip_datum(buf: &[u8], offset: usize) -> Result<usize> {
    let tag = read_u8(buf, offset)?;
    let offset = offset + 1;
    let next = match tag {
        NULL_TAG => offset,
        _ => match ColumnType::from_tag(tag) {
            Some(ColumnType::Bool) => offset + 1,
            Some(ColumnType::Varchar) | Some(ColumnType::Blob) => get_var_len(buf, offset)?.1,
            Some(_) => offset + 8,
            None => return Err(RowLiteError::corrupt(format!("unknown cell tag {}", tag))),
        },
    };
    if next > buf.len() {
        return Err(RowLiteError::corrupt("cell exceeds row payload"));
    }
    Ok(next)
}

/// Append the encoding of the rowkey `cells`. The result is byte-identical to
/// the leading cells of a row payload with the same key.
pub fn encode_rowkey(cells: &[Datum<'_>], buf: &mut Vec<u8>) {
    for cell in cells {
        encode_datum(cell, buf);
    }
}

#[inline]
fn normalizes(desc: &ColumnDesc) -> bool {
    desc.column_type == ColumnType::Varchar && desc.collation != Collation::Binary
}

/// Append the identity encoding of the rowkey `cells`: the [encode_rowkey]
/// form with varchar cells normalized through their collation, so rowkeys
/// that compare equal encode to the same bytes. Bloom filters and the row
/// cache are keyed by it.
pub fn encode_rowkey_identity(
    cells: &[Datum<'_>],
    rowkey_columns: &[ColumnDesc],
    buf: &mut Vec<u8>,
) {
    for (cell, desc) in cells.iter().zip(rowkey_columns) {
        match cell {
            Datum::Varchar(s) if normalizes(desc) => {
                encode_datum(&Datum::Varchar(desc.collation.normalize(s)), buf)
            }
            _ => encode_datum(cell, buf),
        }
    }
}

/// Identity encoding of a rowkey stored in [encode_rowkey] form. Borrows
/// `encoded` when no rowkey column needs normalizing.
pub fn rowkey_identity<'a>(
    encoded: &'a [u8],
    rowkey_columns: &[ColumnDesc],
) -> Result<Cow<'a, [u8]>> {
    if !rowkey_columns.iter().any(normalizes) {
        return Ok(Cow::Borrowed(encoded));
    }
    let cells = decode_rowkey(encoded, rowkey_columns)?;
    let mut buf = Vec::with_capacity(encoded.len());
    encode_rowkey_identity(&cells, rowkey_columns, &mut buf);
    Ok(Cow::Owned(buf))
}

pub fn encoded_row_size(row: &StoreRow<'_>) -> usize {
    ROW_HEADER_SIZE + row.cells.iter().map(encoded_datum_size).sum::<usize>()
}

pub fn encode_row(row: &StoreRow<'_>, buf: &mut Vec<u8>) {
    let start = buf.len();
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.push(row.flag.to_u8());
    buf.extend_from_slice(&(row.cells.len() as u16).to_le_bytes());
    for cell in &row.cells {
        encode_datum(cell, buf);
    }
    let len = (buf.len() - start - 4) as u32;
    buf[start..start + 4].copy_from_slice(&len.to_le_bytes());
}

/// A row payload located inside a block or a cache entry.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RowPayload<'a> {
    pub flag: RowFlag,
    pub cell_count: u16,
    /// Cell encodings only.
    pub cells: &'a [u8],
    /// The whole payload, length prefix included.
    pub raw: &'a [u8],
}

pub(crate) fn parse_row(buf: &[u8], offset: usize) -> Result<RowPayload<'_>> {
    let len = read_u32(buf, offset)? as usize;
    if len < ROW_HEADER_SIZE - 4 {
        return Err(RowLiteError::CorruptPayload(format!(
            "row length {} shorter than its header",
            len
        )));
    }
    let body = read_slice(buf, offset + 4, len)?;
    let flag = RowFlag::from_u8(body[0])
        .ok_or_else(|| RowLiteError::corrupt(format!("invalid row flag {}", body[0])))?;
    let cell_count = read_u16(body, 1)?;
    Ok(RowPayload {
        flag,
        cell_count,
        cells: &body[3..],
        raw: &buf[offset..offset + 4 + len],
    })
}

/// Materialize the projected columns of `payload` into `out`.
///
/// `convert` maps each decoded cell into the lifetime of `out`: identity for
/// rows that alias a block, [Datum::into_owned] for rows decoded from cache
/// entries. On error `out` is left empty.
pub(crate) fn decode_row_into<'a, 'o, F>(
    payload: &RowPayload<'a>,
    column_map: &ColumnMap,
    out: &mut StoreRow<'o>,
    convert: F,
) -> Result<()>
where
    F: Fn(Datum<'a>) -> Datum<'o>,
{
    let out_count = column_map.out_count();
    if out.cells.capacity() < out_count {
        return Err(RowLiteError::AllocationFailed(format!(
            "row storage holds {} cells, {} needed",
            out.cells.capacity(),
            out_count
        )));
    }
    out.clear();
    out.cells.resize(out_count, Datum::Null);
    let res = fill_cells(payload, column_map, out, convert);
    match res {
        Ok(()) => {
            out.flag = payload.flag;
            Ok(())
        }
        Err(e) => {
            out.clear();
            Err(e)
        }
    }
}

fn fill_cells<'a, 'o, F>(
    payload: &RowPayload<'a>,
    column_map: &ColumnMap,
    out: &mut StoreRow<'o>,
    convert: F,
) -> Result<()>
where
    F: Fn(Datum<'a>) -> Datum<'o>,
{
    if payload.cell_count as usize != column_map.store_count() {
        return Err(RowLiteError::CorruptPayload(format!(
            "row has {} cells, column map expects {}",
            payload.cell_count,
            column_map.store_count()
        )));
    }
    let last = match column_map.last_needed_store_index() {
        Some(last) => last,
        None => return Ok(()),
    };
    let store_columns = column_map.store_columns();
    let targets = column_map.store_to_out();
    let buf = payload.cells;
    let mut offset = 0;
    let mut t = 0;
    for (store_idx, desc) in store_columns.iter().enumerate().take(last + 1) {
        if t < targets.len() && targets[t].0 == store_idx {
            let (datum, next) = decode_datum(buf, offset, desc.column_type)?;
            while t < targets.len() && targets[t].0 == store_idx {
                out.cells[targets[t].1] = convert(datum.clone());
                t += 1;
            }
            offset = next;
        } else {
            offset = skip_datum(buf, offset)?;
        }
    }
    Ok(())
}

/// Slice holding the first `rowkey_count` cells of `cells`.
pub(crate) fn rowkey_span(cells: &[u8], rowkey_count: usize) -> Result<&[u8]> {
    let mut offset = 0;
    for _ in 0..rowkey_count {
        offset = skip_datum(cells, offset)?;
    }
    Ok(&cells[..offset])
}

/// Decode an encoded rowkey back into datums.
pub fn decode_rowkey<'a>(bytes: &'a [u8], columns: &[ColumnDesc]) -> Result<Vec<Datum<'a>>> {
    let mut cells = Vec::with_capacity(columns.len());
    let mut offset = 0;
    for desc in columns {
        let (datum, next) = decode_datum(bytes, offset, desc.column_type)?;
        cells.push(datum);
        offset = next;
    }
    Ok(cells)
}

/// Compare the rowkey encoded at the start of `encoded` with `key`.
pub(crate) fn compare_encoded_rowkey(
    encoded: &[u8],
    key: &RowKey<'_>,
    rowkey_columns: &[ColumnDesc],
) -> Result<Ordering> {
    match key {
        RowKey::Min => Ok(Ordering::Greater),
        RowKey::Max => Ok(Ordering::Less),
        RowKey::Tuple(cells) => compare_encoded_cells(encoded, cells, rowkey_columns),
    }
}

pub(crate) fn compare_encoded_cells(
    encoded: &[u8],
    cells: &[Datum<'_>],
    rowkey_columns: &[ColumnDesc],
) -> Result<Ordering> {
    debug_assert_eq!(cells.len(), rowkey_columns.len());
    let mut offset = 0;
    for (cell, desc) in cells.iter().zip(rowkey_columns) {
        let (stored, next) = decode_datum(encoded, offset, desc.column_type)?;
        match stored.compare(cell, desc.collation)? {
            Ordering::Equal => offset = next,
            o => return Ok(o),
        }
    }
    Ok(Ordering::Equal)
}

/// Check that `key` can be compared against rows described by `rowkey_columns`.
pub(crate) fn validate_search_key(key: &RowKey<'_>, rowkey_columns: &[ColumnDesc]) -> Result<()> {
    if let RowKey::Tuple(cells) = key {
        if cells.len() != rowkey_columns.len() {
            return Err(RowLiteError::InvalidArgument(format!(
                "search key has {} cells, rowkey has {} columns",
                cells.len(),
                rowkey_columns.len()
            )));
        }
        for (i, (cell, desc)) in cells.iter().zip(rowkey_columns).enumerate() {
            if !cell.fits(desc.column_type) {
                return Err(RowLiteError::InvalidArgument(format!(
                    "search key cell {} is {:?}, column is {:?}",
                    i,
                    cell.column_type(),
                    desc.column_type
                )));
            }
        }
    }
    Ok(())
}
