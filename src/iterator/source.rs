use crate::block::MicroBlockData;
use crate::column_map::ColumnDesc;
use crate::error::RowLiteError;
use crate::types::RowKey;
use crate::Result;
use crossbeam_channel::{Receiver, Sender};

/// Location of one micro block inside its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    pub index: usize,
    pub offset: u64,
    pub length: u64,
}

/// The block location and I/O layer an iterator reads through.
///
/// Buffers handed out by a source live for `'a`, which is what lets decoded
/// rows borrow them without copying.
pub trait MicroBlockSource<'a> {
    /// Blocks that may hold keys in `[start, end]`, in key order.
    fn locate(
        &'a self,
        start: &RowKey<'_>,
        end: &RowKey<'_>,
        rowkey_columns: &[ColumnDesc],
    ) -> Result<Vec<BlockHandle>>;

    /// `false` only if no row with the rowkey exists in this source. `rowkey`
    /// is in the collation-normalized form of
    /// [crate::block::codec::encode_rowkey_identity].
    fn may_contain(&'a self, rowkey: &[u8]) -> bool;

    /// Start reading the block; the result arrives through the handle.
    fn prefetch(&'a self, handle: &BlockHandle) -> Result<PrefetchHandle<'a>>;
}

/// Completion of an asynchronous block read. The I/O layer cancels a read by
/// dropping the sending half.
pub struct PrefetchHandle<'a> {
    receiver: Receiver<Result<MicroBlockData<'a>>>,
}

impl<'a> PrefetchHandle<'a> {
    pub fn channel() -> (Sender<Result<MicroBlockData<'a>>>, PrefetchHandle<'a>) {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        (sender, PrefetchHandle { receiver })
    }

    /// A handle whose read has already completed.
    pub fn ready(result: Result<MicroBlockData<'a>>) -> PrefetchHandle<'a> {
        let (sender, handle) = PrefetchHandle::channel();
        // the receiver is alive and the slot is empty
        let _ = sender.send(result);
        handle
    }

    pub fn is_ready(&self) -> bool {
        !self.receiver.is_empty()
    }

    /// Block until the read completes.
    pub fn wait(self) -> Result<MicroBlockData<'a>> {
        match self.receiver.recv() {
            Ok(result) => result,
            Err(_) => Err(RowLiteError::PrefetchCancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::block::MicroBlockData;
    use crate::error::RowLiteError;
    use crate::iterator::PrefetchHandle;

    #[test]
    fn test_prefetch_handle() {
        let data = [1u8, 2, 3];
        let handle = PrefetchHandle::ready(Ok(MicroBlockData::new(&data)));
        assert!(handle.is_ready());
        assert_eq!(handle.wait().unwrap().data(), &data);

        let (sender, handle) = PrefetchHandle::channel();
        assert!(!handle.is_ready());
        let t = std::thread::spawn(move || {
            sender.send(Err(RowLiteError::EntryNotFound)).unwrap();
        });
        assert_eq!(handle.wait().unwrap_err(), RowLiteError::EntryNotFound);
        t.join().unwrap();

        let (sender, handle) = PrefetchHandle::channel();
        drop(sender);
        assert_eq!(handle.wait().unwrap_err(), RowLiteError::PrefetchCancelled);
    }
}
