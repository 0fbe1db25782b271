//! Macro block files: a run of micro blocks with the index and bloom filter
//! needed to locate them.
//!
//! # Macro Block
//!
//! ```text
//! +-------------------------+ (offset 0)
//! | Micro Block 1           |<-+
//! +-------------------------+  |
//! | Micro Block 2           |<-+
//! +-------------------------+  |
//! | ...                     |  |
//! +-------------------------+  |
//! | Micro Block n           |<-+
//! +-------------------------+  |
//! | Index Block             |--+
//! +-------------------------+
//! | Filter Block            |
//! +-------------------------+
//! | Footer                  |
//! +-------------------------+
//! ```
//!
//! Micro blocks are stored as built, or snappy compressed as a whole.
//!
//! ## Index Block
//!
//! ```text
//! +----------------------------------------------------------------+
//! | offset | stored length | raw length | key1 length | end key1   | -> Micro Block1
//! +----------------------------------------------------------------+
//! | offset | stored length | raw length | key2 length | end key2   | -> Micro Block2
//! +----------------------------------------------------------------+
//! |                             ...                                |
//! +----------------------------------------------------------------+
//! \-------/\--------------/\-----------/\------------/\-----------/
//!    u32         u32            u32          u32         var-len
//! ```
//!
//! End keys are encoded rowkeys of the last row of each micro block.
//!
//! ## Filter Block
//!
//! Bloom filter over the encoded rowkeys of every row.
//!
//! ## Footer
//!
//! Length of Footer is fixed (32 bytes).
//!
//! ```text
//! +----------------------------------------------------------------------------------+
//! | index offset | index length | filter offset | filter length | row count |        |
//! | block count | compression | Magic Number 0xdb991122                              |
//! +----------------------------------------------------------------------------------+
//! ```
//!
//! Every field is u32.
//!
//! NOTE: All fixed-length integer are little-endian.

mod footer;
mod index_block;
mod reader;
mod writer;

pub use footer::{FOOTER_BYTE_SIZE, FOOTER_MAGIC_NUMBER};
pub use reader::MacroBlockReader;
pub use writer::MacroBlockWriter;

use crate::block::DEFAULT_MICRO_BLOCK_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Snappy,
}

impl Default for Compression {
    fn default() -> Self {
        Compression::None
    }
}

impl Compression {
    pub(crate) fn to_u32(self) -> u32 {
        match self {
            Compression::None => 0,
            Compression::Snappy => 1,
        }
    }

    pub(crate) fn from_u32(n: u32) -> Option<Compression> {
        match n {
            0 => Some(Compression::None),
            1 => Some(Compression::Snappy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MacroBlockOptions {
    /// Size limit of one micro block before compression.
    pub micro_block_size: usize,
    pub compression: Compression,
}

impl Default for MacroBlockOptions {
    fn default() -> Self {
        MacroBlockOptions {
            micro_block_size: DEFAULT_MICRO_BLOCK_SIZE,
            compression: Compression::None,
        }
    }
}

/// Summary of a finished macro block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroBlockMeta {
    pub row_count: u32,
    pub block_count: u32,
    /// Bytes written, footer included.
    pub size: u64,
    pub compression: Compression,
}
