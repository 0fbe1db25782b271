use std::io;

#[derive(thiserror::Error, Debug)]
pub enum RowLiteError {
    #[error("{0}")]
    IOError(#[from] io::Error),

    #[error("not initialized")]
    NotInitialized,

    #[error("already initialized, reset first")]
    AlreadyInitialized,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("position {position} out of range [{begin}, {end})")]
    OutOfRange {
        position: usize,
        begin: usize,
        end: usize,
    },

    #[error("entry not found")]
    EntryNotFound,

    #[error("corrupt payload: {0}")]
    CorruptPayload(String),

    #[error("allocation failed: {0}")]
    AllocationFailed(String),

    #[error("block prefetch cancelled")]
    PrefetchCancelled,
}

impl RowLiteError {
    pub(crate) fn corrupt(msg: impl Into<String>) -> RowLiteError {
        RowLiteError::CorruptPayload(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> RowLiteError {
        RowLiteError::InvalidArgument(msg.into())
    }
}

impl PartialEq for RowLiteError {
    fn eq(&self, other: &Self) -> bool {
        use RowLiteError::*;
        match (self, other) {
            (IOError(_), IOError(_))
            | (NotInitialized, NotInitialized)
            | (AlreadyInitialized, AlreadyInitialized)
            | (EntryNotFound, EntryNotFound)
            | (CorruptPayload(_), CorruptPayload(_))
            | (AllocationFailed(_), AllocationFailed(_))
            | (PrefetchCancelled, PrefetchCancelled) => true,
            (InvalidArgument(s1), InvalidArgument(s2)) => s1.eq(s2),
            (
                OutOfRange {
                    position: p1,
                    begin: b1,
                    end: e1,
                },
                OutOfRange {
                    position: p2,
                    begin: b2,
                    end: e2,
                },
            ) => p1 == p2 && b1 == b2 && e1 == e2,
            _ => false,
        }
    }
}
