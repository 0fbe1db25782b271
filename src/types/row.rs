use crate::types::Datum;

/// Whether a stored row is a live row or a marker that the key does not exist.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RowFlag {
    Exists,
    DoesNotExist,
}

impl Default for RowFlag {
    fn default() -> Self {
        RowFlag::Exists
    }
}

impl RowFlag {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            RowFlag::Exists => 0,
            RowFlag::DoesNotExist => 1,
        }
    }

    pub(crate) fn from_u8(b: u8) -> Option<RowFlag> {
        match b {
            0 => Some(RowFlag::Exists),
            1 => Some(RowFlag::DoesNotExist),
            _ => None,
        }
    }
}

/// Caller-owned row storage. Readers fill `cells` in place and never grow it
/// past its capacity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoreRow<'a> {
    pub flag: RowFlag,
    pub cells: Vec<Datum<'a>>,
}

impl<'a> StoreRow<'a> {
    /// Empty row able to hold `column_count` cells.
    pub fn new(column_count: usize) -> StoreRow<'a> {
        StoreRow {
            flag: RowFlag::Exists,
            cells: Vec::with_capacity(column_count),
        }
    }

    pub fn from_cells(cells: Vec<Datum<'a>>) -> StoreRow<'a> {
        StoreRow {
            flag: RowFlag::Exists,
            cells,
        }
    }

    #[inline]
    pub fn exists(&self) -> bool {
        self.flag == RowFlag::Exists
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        self.cells.len()
    }

    /// Forget the contents, keep the allocation.
    pub fn clear(&mut self) {
        self.flag = RowFlag::Exists;
        self.cells.clear();
    }

    pub fn into_owned(self) -> StoreRow<'static> {
        StoreRow {
            flag: self.flag,
            cells: self.cells.into_iter().map(Datum::into_owned).collect(),
        }
    }
}
