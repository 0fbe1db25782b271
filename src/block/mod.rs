//! Micro blocks: the unit of sorted row storage.
//!
//! A micro block holds a run of rows sorted by rowkey, strictly ascending.
//! It is immutable once built and is decoded in place.
//!
//! # Micro Block
//!
//! ```text
//! +-----------------------------------------------------+ (offset 0)
//! | Header                                              |
//! +-----------------------------------------------------+ (offset 20)
//! | row offset 1 | row offset 2 | ... | row offset n    | -> payload
//! +-----------------------------------------------------+
//! | Row 1 | Row 2 | ... | Row n                         |
//! +-----------------------------------------------------+
//! ```
//!
//! Row offsets are u32, relative to the start of the payload area.
//!
//! ## Header
//!
//! ```text
//! +---------------------------------------------------------------------------------+
//! | magic | version | rowkey count | column count | reserved | row count | payload |
//! +---------------------------------------------------------------------------------+
//! \------/\--------/\-------------/\-------------/\---------/\----------/\--------/
//!   u32      u16          u16            u16          u16        u32        u32
//! ```
//!
//! The magic number is 0x6b6c626d, the version 1.
//!
//! ## Row
//!
//! ```text
//! +--------------------------------------------------+
//! | length | flag | cell count | cell 1 | ... | cell n |
//! +--------------------------------------------------+
//! \-------/\-----/\-----------/\---------------------/
//!    u32     u8       u16             var-len
//! ```
//!
//! `length` counts the bytes after itself. Flag 0 is an existing row, 1 a
//! row known not to exist.
//!
//! ## Cell
//!
//! ```text
//! +-------------+
//! | tag | value |
//! +-------------+
//! ```
//!
//! | tag | type      | value                |
//! |-----|-----------|----------------------|
//! | 0   | null      | none                 |
//! | 1   | bool      | u8, 0 or 1           |
//! | 2   | int       | i64                  |
//! | 3   | uint      | u64                  |
//! | 4   | double    | f64 bits             |
//! | 5   | timestamp | i64                  |
//! | 6   | varchar   | u32 length, utf-8    |
//! | 7   | blob      | u32 length, bytes    |
//!
//! Cells follow stored column order, rowkey columns first. The rowkey cells of
//! a row are byte-identical to [codec::encode_rowkey] of the same key, which
//! is what row cache keys and bloom filters hash.
//!
//! NOTE: All fixed-length integer are little-endian.

pub mod codec;
mod reader;
mod writer;

pub use reader::{KeyLocate, MicroBlockData, MicroBlockReader, OrdinalAccess, MAX_BATCH_ROW_COUNT};
pub use writer::MicroBlockWriter;

#[cfg(not(debug_assertions))]
pub const DEFAULT_MICRO_BLOCK_SIZE: usize = 16 * 1024;

#[cfg(debug_assertions)]
pub const DEFAULT_MICRO_BLOCK_SIZE: usize = 1024;
