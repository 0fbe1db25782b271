//! Sorted micro block storage: encoding, in-place decoding, key lookup and a
//! shared row cache.

#[macro_use]
extern crate log;

pub mod block;
mod bloom;
mod byteutils;
mod cache;
pub mod column_map;
pub mod error;
mod hash;
mod ioutils;
pub mod iterator;
pub mod macro_block;
pub mod row_cache;
pub mod types;

pub use column_map::{ColumnDesc, ColumnMap};
pub use error::RowLiteError;
pub use iterator::{QueryRange, RowIterator, ScanRange};
pub use row_cache::RowCache;

pub type Result<T> = std::result::Result<T, error::RowLiteError>;
