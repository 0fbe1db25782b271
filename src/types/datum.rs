use crate::error::RowLiteError;
use crate::Result;
use std::borrow::Cow;
use std::cmp::Ordering;

/// Declared type of a stored column.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Bool,
    Int,
    UInt,
    Double,
    /// Microseconds since the unix epoch.
    Timestamp,
    Varchar,
    Blob,
}

impl ColumnType {
    /// Cell tag written in front of every non-null value. Tag `0` is null.
    pub(crate) fn tag(self) -> u8 {
        match self {
            ColumnType::Bool => 1,
            ColumnType::Int => 2,
            ColumnType::UInt => 3,
            ColumnType::Double => 4,
            ColumnType::Timestamp => 5,
            ColumnType::Varchar => 6,
            ColumnType::Blob => 7,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<ColumnType> {
        match tag {
            1 => Some(ColumnType::Bool),
            2 => Some(ColumnType::Int),
            3 => Some(ColumnType::UInt),
            4 => Some(ColumnType::Double),
            5 => Some(ColumnType::Timestamp),
            6 => Some(ColumnType::Varchar),
            7 => Some(ColumnType::Blob),
            _ => None,
        }
    }

    #[inline]
    pub fn is_var_len(self) -> bool {
        matches!(self, ColumnType::Varchar | ColumnType::Blob)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Collation {
    /// Byte order.
    Binary,
    /// Case-insensitive, trailing spaces ignored.
    Utf8Mb4GeneralCi,
}

impl Default for Collation {
    fn default() -> Self {
        Collation::Binary
    }
}

impl Collation {
    pub fn compare_str(self, a: &str, b: &str) -> Ordering {
        match self {
            Collation::Binary => a.as_bytes().cmp(b.as_bytes()),
            Collation::Utf8Mb4GeneralCi => {
                let a = a.trim_end_matches(' ').chars().flat_map(char::to_lowercase);
                let b = b.trim_end_matches(' ').chars().flat_map(char::to_lowercase);
                a.cmp(b)
            }
        }
    }

    /// Form of `s` that is byte-equal for exactly the strings
    /// [Collation::compare_str] finds equal.
    pub fn normalize(self, s: &str) -> Cow<'_, str> {
        match self {
            Collation::Binary => Cow::Borrowed(s),
            Collation::Utf8Mb4GeneralCi => Cow::Owned(
                s.trim_end_matches(' ')
                    .chars()
                    .flat_map(char::to_lowercase)
                    .collect(),
            ),
        }
    }
}

/// A single cell value. Variable-length values borrow the block buffer they
/// were decoded from whenever possible.
#[derive(Clone, Debug, PartialEq)]
pub enum Datum<'a> {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    Timestamp(i64),
    Varchar(Cow<'a, str>),
    Blob(Cow<'a, [u8]>),
}

impl<'a> Default for Datum<'a> {
    fn default() -> Self {
        Datum::Null
    }
}

impl<'a> Datum<'a> {
    /// `None` for null.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Datum::Null => None,
            Datum::Bool(_) => Some(ColumnType::Bool),
            Datum::Int(_) => Some(ColumnType::Int),
            Datum::UInt(_) => Some(ColumnType::UInt),
            Datum::Double(_) => Some(ColumnType::Double),
            Datum::Timestamp(_) => Some(ColumnType::Timestamp),
            Datum::Varchar(_) => Some(ColumnType::Varchar),
            Datum::Blob(_) => Some(ColumnType::Blob),
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Varchar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Int(i) | Datum::Timestamp(i) => Some(*i),
            _ => None,
        }
    }

    /// Whether this value may be stored in a column of type `column_type`.
    #[inline]
    pub fn fits(&self, column_type: ColumnType) -> bool {
        match self.column_type() {
            None => true,
            Some(t) => t == column_type,
        }
    }

    /// Detach from the buffer this datum borrows.
    pub fn into_owned(self) -> Datum<'static> {
        match self {
            Datum::Null => Datum::Null,
            Datum::Bool(b) => Datum::Bool(b),
            Datum::Int(i) => Datum::Int(i),
            Datum::UInt(u) => Datum::UInt(u),
            Datum::Double(d) => Datum::Double(d),
            Datum::Timestamp(t) => Datum::Timestamp(t),
            Datum::Varchar(s) => Datum::Varchar(Cow::Owned(s.into_owned())),
            Datum::Blob(b) => Datum::Blob(Cow::Owned(b.into_owned())),
        }
    }

    /// Null sorts before every value. Values of different types do not compare.
    pub fn compare(&self, other: &Datum<'_>, collation: Collation) -> Result<Ordering> {
        let ord = match (self, other) {
            (Datum::Null, Datum::Null) => Ordering::Equal,
            (Datum::Null, _) => Ordering::Less,
            (_, Datum::Null) => Ordering::Greater,
            (Datum::Bool(a), Datum::Bool(b)) => a.cmp(b),
            (Datum::Int(a), Datum::Int(b)) => a.cmp(b),
            (Datum::UInt(a), Datum::UInt(b)) => a.cmp(b),
            (Datum::Double(a), Datum::Double(b)) => a.total_cmp(b),
            (Datum::Timestamp(a), Datum::Timestamp(b)) => a.cmp(b),
            (Datum::Varchar(a), Datum::Varchar(b)) => collation.compare_str(a, b),
            (Datum::Blob(a), Datum::Blob(b)) => a.as_ref().cmp(b.as_ref()),
            (a, b) => {
                return Err(RowLiteError::InvalidArgument(format!(
                    "cannot compare {:?} with {:?}",
                    a.column_type(),
                    b.column_type()
                )))
            }
        };
        Ok(ord)
    }
}

impl<'a> From<bool> for Datum<'a> {
    fn from(b: bool) -> Self {
        Datum::Bool(b)
    }
}

impl<'a> From<i64> for Datum<'a> {
    fn from(i: i64) -> Self {
        Datum::Int(i)
    }
}

impl<'a> From<u64> for Datum<'a> {
    fn from(u: u64) -> Self {
        Datum::UInt(u)
    }
}

impl<'a> From<f64> for Datum<'a> {
    fn from(d: f64) -> Self {
        Datum::Double(d)
    }
}

impl<'a> From<&'a str> for Datum<'a> {
    fn from(s: &'a str) -> Self {
        Datum::Varchar(Cow::Borrowed(s))
    }
}

impl<'a> From<String> for Datum<'a> {
    fn from(s: String) -> Self {
        Datum::Varchar(Cow::Owned(s))
    }
}

impl<'a> From<&'a [u8]> for Datum<'a> {
    fn from(b: &'a [u8]) -> Self {
        Datum::Blob(Cow::Borrowed(b))
    }
}

impl<'a> From<Vec<u8>> for Datum<'a> {
    fn from(b: Vec<u8>) -> Self {
        Datum::Blob(Cow::Owned(b))
    }
}
