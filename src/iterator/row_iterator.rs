use crate::block::codec::validate_search_key;
use crate::block::{KeyLocate, MicroBlockReader, OrdinalAccess};
use crate::column_map::ColumnMap;
use crate::error::RowLiteError;
use crate::iterator::{
    BlockHandle, IteratorOptions, IteratorStats, MicroBlockSource, PrefetchHandle, QueryRange,
    ScanRange,
};
use crate::row_cache::{RowCache, RowCacheKey, RowCacheValue};
use crate::types::{Datum, RowFlag, RowKey, StoreRow, TableId};
use crate::Result;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    Get,
    MultiGet,
    Scan,
}

/// Reads the rows of one table from a [MicroBlockSource].
///
/// Usage: [RowIterator::open] a query, call [RowIterator::get_next_row] until
/// it returns `None`, then [RowIterator::reset] before the next query. Rows
/// read from blocks borrow the source buffers for `'a`; rows served from the
/// cache own their cells.
pub struct RowIterator<'a, S: MicroBlockSource<'a>> {
    source: &'a S,
    column_map: &'a ColumnMap,
    table_id: TableId,
    cache: Option<Arc<RowCache>>,
    options: IteratorOptions,

    mode: Mode,
    keys: Vec<RowKey<'static>>,
    next_key: usize,

    range: ScanRange<'static>,
    blocks: Vec<BlockHandle>,
    next_prefetch: usize,
    pending: VecDeque<PrefetchHandle<'a>>,
    /// Cursor `[pos, end)` inside the block `reader` is bound to.
    pos: usize,
    end: usize,

    reader: MicroBlockReader<'a>,
    row: StoreRow<'a>,
    stats: IteratorStats,
}

impl<'a, S: MicroBlockSource<'a>> RowIterator<'a, S> {
    pub fn new(source: &'a S, column_map: &'a ColumnMap, table_id: TableId) -> RowIterator<'a, S> {
        RowIterator {
            source,
            column_map,
            table_id,
            cache: None,
            options: IteratorOptions::default(),
            mode: Mode::Idle,
            keys: Vec::new(),
            next_key: 0,
            range: ScanRange::whole(),
            blocks: Vec::new(),
            next_prefetch: 0,
            pending: VecDeque::new(),
            pos: 0,
            end: 0,
            reader: MicroBlockReader::new(),
            row: StoreRow::new(column_map.out_count()),
            stats: IteratorStats::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<RowCache>) -> RowIterator<'a, S> {
        self.cache = Some(cache);
        self
    }

    pub fn with_options(mut self, options: IteratorOptions) -> RowIterator<'a, S> {
        self.options = options;
        self
    }

    pub fn stats(&self) -> IteratorStats {
        self.stats
    }

    pub fn open(&mut self, query: QueryRange<'_>) -> Result<()> {
        if self.mode != Mode::Idle {
            return Err(RowLiteError::AlreadyInitialized);
        }
        let res = self.open_query(query);
        if res.is_err() {
            self.reset();
        }
        res
    }

    fn open_query(&mut self, query: QueryRange<'_>) -> Result<()> {
        let out_count = self.column_map.out_count();
        if self.row.cells.capacity() < out_count {
            self.row = StoreRow::new(out_count);
        }
        match query {
            QueryRange::Get(key) => {
                self.check_point_key(&key)?;
                self.keys.push(key.into_owned());
                self.mode = Mode::Get;
            }
            QueryRange::MultiGet(keys) => {
                for key in &keys {
                    self.check_point_key(key)?;
                }
                self.keys
                    .extend(keys.into_iter().map(RowKey::into_owned));
                self.mode = Mode::MultiGet;
            }
            QueryRange::Scan(range) => {
                let rowkey_columns = self.column_map.rowkey_columns();
                validate_search_key(&range.start, rowkey_columns)?;
                validate_search_key(&range.end, rowkey_columns)?;
                let empty = match range
                    .start
                    .compare(&range.end, self.column_map.rowkey_collations())?
                {
                    Ordering::Greater => {
                        return Err(RowLiteError::InvalidArgument(format!(
                            "scan start {:?} sorts after end {:?}",
                            range.start, range.end
                        )))
                    }
                    Ordering::Equal => !(range.start_inclusive && range.end_inclusive),
                    Ordering::Less => false,
                };
                if !empty {
                    self.blocks = self
                        .source
                        .locate(&range.start, &range.end, rowkey_columns)?;
                }
                self.range = range.into_owned();
                self.mode = Mode::Scan;
                self.issue_prefetch()?;
            }
        }
        debug!(
            "table {}: open {:?} query, {} keys, {} candidate blocks",
            self.table_id,
            self.mode,
            self.keys.len(),
            self.blocks.len()
        );
        Ok(())
    }

    fn check_point_key(&self, key: &RowKey<'_>) -> Result<()> {
        if key.cells().is_none() {
            return Err(RowLiteError::invalid("point lookup needs a concrete rowkey"));
        }
        validate_search_key(key, self.column_map.rowkey_columns())
    }

    /// The next row of the query, `None` once it is exhausted.
    ///
    /// A get whose key does not exist fails with
    /// [RowLiteError::EntryNotFound]; a multi get returns a row flagged
    /// [RowFlag::DoesNotExist] for it instead.
    pub fn get_next_row(&mut self) -> Result<Option<&StoreRow<'a>>> {
        let res = match self.mode {
            Mode::Idle => return Err(RowLiteError::NotInitialized),
            Mode::Get | Mode::MultiGet => self.next_point_row(),
            Mode::Scan => self.next_scan_row(),
        };
        match res {
            Ok(true) => {
                self.stats.rows_returned += 1;
                Ok(Some(&self.row))
            }
            Ok(false) => Ok(None),
            Err(e) => {
                if let RowLiteError::CorruptPayload(msg) = &e {
                    error!("table {}: corrupt block: {}", self.table_id, msg);
                }
                Err(e)
            }
        }
    }

    fn next_point_row(&mut self) -> Result<bool> {
        if self.next_key >= self.keys.len() {
            return Ok(false);
        }
        let idx = self.next_key;
        self.next_key += 1;

        let keys = std::mem::take(&mut self.keys);
        let key = &keys[idx];
        let res = match self.point_get(key) {
            Ok(true) => Ok(true),
            Ok(false) if self.mode == Mode::Get => Err(RowLiteError::EntryNotFound),
            Ok(false) => {
                self.fill_absent_row(key);
                Ok(true)
            }
            Err(e) => Err(e),
        };
        self.keys = keys;
        res
    }

    /// Look `key` up through the cache, then the source. Returns whether an
    /// existing row was materialized into `self.row`.
    fn point_get(&mut self, key: &RowKey<'_>) -> Result<bool> {
        let cells = match key.cells() {
            Some(cells) => cells,
            None => return Err(RowLiteError::invalid("point lookup needs a concrete rowkey")),
        };
        let cache_key =
            RowCacheKey::from_cells(self.table_id, cells, self.column_map.rowkey_columns());
        let cache = self.active_cache();

        if let Some(cache) = &cache {
            let cached = cache.get(&cache_key).ok().flatten();
            match cached {
                Some(value) if value.schema_version() == self.column_map.schema_version() => {
                    self.stats.cache_hits += 1;
                    if value.is_absent() {
                        return Ok(false);
                    }
                    value.decode_into(self.column_map, &mut self.row)?;
                    if self.mode == Mode::MultiGet {
                        return Ok(true);
                    }
                    return Ok(self.row.exists());
                }
                _ => self.stats.cache_misses += 1,
            }
        }

        if !self.source.may_contain(cache_key.rowkey()) {
            return Ok(false);
        }
        let handles = self
            .source
            .locate(key, key, self.column_map.rowkey_columns())?;
        for handle in &handles {
            self.load_block(handle, self.source.prefetch(handle)?)?;
            if let Some(pos) = seek_key(&self.reader, key)? {
                self.reader.get_row(pos, &mut self.row)?;
                if let Some(cache) = &cache {
                    cache.put(cache_key, self.reader.get_cached_value(pos)?);
                }
                if self.mode == Mode::MultiGet {
                    return Ok(true);
                }
                return Ok(self.row.exists());
            }
        }

        if let Some(cache) = &cache {
            cache.put(cache_key, RowCacheValue::absent(self.column_map.schema_version()));
        }
        Ok(false)
    }

    /// Row standing for a missing key: the projected rowkey cells, null
    /// elsewhere.
    fn fill_absent_row(&mut self, key: &RowKey<'_>) {
        let cells = key.cells().unwrap_or(&[]);
        let rowkey_count = self.column_map.rowkey_count();
        self.row.clear();
        self.row.cells.resize(self.column_map.out_count(), Datum::Null);
        for (out_idx, cell) in self.row.cells.iter_mut().enumerate() {
            match self.column_map.store_index(out_idx) {
                Some(store_idx) if store_idx < rowkey_count && store_idx < cells.len() => {
                    *cell = cells[store_idx].clone().into_owned();
                }
                _ => {}
            }
        }
        self.row.flag = RowFlag::DoesNotExist;
    }

    fn next_scan_row(&mut self) -> Result<bool> {
        loop {
            if self.reader.is_inited() {
                while self.pos < self.end {
                    let pos = self.pos;
                    self.pos += 1;
                    self.reader.get_row(pos, &mut self.row)?;
                    if !self.row.exists() {
                        continue;
                    }
                    if self.options.fill_cache_on_scan {
                        self.fill_cache(pos)?;
                    }
                    return Ok(true);
                }
            }

            let handle = match self.pending.pop_front() {
                Some(handle) => handle,
                None => {
                    self.reader.reset();
                    return Ok(false);
                }
            };
            let block = self.next_prefetch - self.pending.len() - 1;
            let block = self.blocks[block];
            self.load_block(&block, handle)?;
            self.issue_prefetch()?;

            let (begin, end) = block_range(&self.reader, &self.range)?;
            self.pos = begin;
            self.end = end;
        }
    }

    fn load_block(&mut self, block: &BlockHandle, handle: PrefetchHandle<'a>) -> Result<()> {
        self.reader.reset();
        let data = handle.wait()?;
        self.stats.blocks_read += 1;
        debug!(
            "table {}: read block {} ({} bytes)",
            self.table_id,
            block.index,
            data.len()
        );
        self.reader.init(data, self.column_map)
    }

    fn issue_prefetch(&mut self) -> Result<()> {
        let depth = self.options.prefetch_depth.max(1);
        while self.pending.len() < depth && self.next_prefetch < self.blocks.len() {
            let handle = self.source.prefetch(&self.blocks[self.next_prefetch])?;
            self.pending.push_back(handle);
            self.next_prefetch += 1;
        }
        Ok(())
    }

    fn fill_cache(&self, pos: usize) -> Result<()> {
        if let Some(cache) = self.active_cache() {
            let key = RowCacheKey::from_encoded(
                self.table_id,
                self.reader.rowkey_bytes(pos)?,
                self.column_map.rowkey_columns(),
            )?;
            cache.put(key, self.reader.get_cached_value(pos)?);
        }
        Ok(())
    }

    fn active_cache(&self) -> Option<Arc<RowCache>> {
        if self.options.use_cache {
            self.cache.clone()
        } else {
            None
        }
    }

    /// Forget the current query; buffers are kept for the next one.
    pub fn reset(&mut self) {
        self.mode = Mode::Idle;
        self.keys.clear();
        self.next_key = 0;
        self.range = ScanRange::whole();
        self.blocks.clear();
        self.next_prefetch = 0;
        self.pending.clear();
        self.pos = 0;
        self.end = 0;
        self.reader.reset();
        self.row.clear();
    }

    /// Reset and release every buffer.
    pub fn close(&mut self) {
        self.reset();
        self.keys = Vec::new();
        self.blocks = Vec::new();
        self.pending = VecDeque::new();
        self.row = StoreRow::default();
    }
}

/// Position of the row equal to `key`, if any.
fn seek_key<'a, B>(block: &B, key: &RowKey<'_>) -> Result<Option<usize>>
where
    B: KeyLocate + OrdinalAccess<'a>,
{
    let (pos, is_equal) = block.find_bound(key, true, block.begin()?, block.end()?)?;
    Ok(if is_equal { Some(pos) } else { None })
}

/// Positions `[begin, end)` of the rows of `block` inside `range`.
fn block_range<'a, B>(block: &B, range: &ScanRange<'_>) -> Result<(usize, usize)>
where
    B: KeyLocate + OrdinalAccess<'a>,
{
    let n = block.end()?;
    let (begin, _) = block.find_bound(&range.start, range.start_inclusive, block.begin()?, n)?;
    let (end, _) = block.find_bound(&range.end, !range.end_inclusive, begin, n)?;
    Ok((begin, end))
}
