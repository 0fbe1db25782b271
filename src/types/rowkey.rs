use crate::error::RowLiteError;
use crate::types::{Collation, Datum};
use crate::Result;
use std::cmp::Ordering;

/// Sort key of a row.
///
/// `Min` sorts before and `Max` after every concrete tuple; they are only
/// used as bounds of range scans and never stored in a block. Within a
/// tuple, [Datum::Null] sorts before any value of its column.
#[derive(Clone, Debug, PartialEq)]
pub enum RowKey<'a> {
    Min,
    Tuple(Vec<Datum<'a>>),
    Max,
}

impl<'a> RowKey<'a> {
    pub fn new(cells: Vec<Datum<'a>>) -> RowKey<'a> {
        RowKey::Tuple(cells)
    }

    #[inline]
    pub fn is_min(&self) -> bool {
        matches!(self, RowKey::Min)
    }

    #[inline]
    pub fn is_max(&self) -> bool {
        matches!(self, RowKey::Max)
    }

    pub fn cells(&self) -> Option<&[Datum<'a>]> {
        match self {
            RowKey::Tuple(cells) => Some(cells),
            _ => None,
        }
    }

    pub fn into_owned(self) -> RowKey<'static> {
        match self {
            RowKey::Min => RowKey::Min,
            RowKey::Max => RowKey::Max,
            RowKey::Tuple(cells) => {
                RowKey::Tuple(cells.into_iter().map(Datum::into_owned).collect())
            }
        }
    }

    pub fn compare(&self, other: &RowKey<'_>, collations: &[Collation]) -> Result<Ordering> {
        match (self, other) {
            (RowKey::Min, RowKey::Min) | (RowKey::Max, RowKey::Max) => Ok(Ordering::Equal),
            (RowKey::Min, _) | (_, RowKey::Max) => Ok(Ordering::Less),
            (RowKey::Max, _) | (_, RowKey::Min) => Ok(Ordering::Greater),
            (RowKey::Tuple(cells), other) => compare_cells(cells, other, collations),
        }
    }
}

impl<'a> From<Vec<Datum<'a>>> for RowKey<'a> {
    fn from(cells: Vec<Datum<'a>>) -> Self {
        RowKey::Tuple(cells)
    }
}

/// Compare the rowkey cells of a row with `key`, component-wise in rowkey
/// column order.
pub(crate) fn compare_cells(
    cells: &[Datum<'_>],
    key: &RowKey<'_>,
    collations: &[Collation],
) -> Result<Ordering> {
    match key {
        RowKey::Min => Ok(Ordering::Greater),
        RowKey::Max => Ok(Ordering::Less),
        RowKey::Tuple(key_cells) => {
            if cells.len() != key_cells.len() || cells.len() > collations.len() {
                return Err(RowLiteError::InvalidArgument(format!(
                    "rowkey arity mismatch: {} vs {}",
                    cells.len(),
                    key_cells.len()
                )));
            }
            for ((a, b), collation) in cells.iter().zip(key_cells).zip(collations) {
                match a.compare(b, *collation)? {
                    Ordering::Equal => {}
                    o => return Ok(o),
                }
            }
            Ok(Ordering::Equal)
        }
    }
}
