//! Cache of encoded rows keyed by logical row identity.
//!
//! A [RowCache] is built empty and shared explicitly (`Arc<RowCache>`) with
//! every iterator that reads through it. Entries hold a copy of the row
//! payload as stored in its micro block, or an absence marker for a key known
//! to be missing, so a hit never touches a block.

use crate::block::codec::{decode_row_into, encode_rowkey_identity, parse_row, rowkey_identity};
use crate::cache::{LookUp, ShardLRUCache};
use crate::column_map::{ColumnDesc, ColumnMap};
use crate::error::RowLiteError;
use crate::hash::row_key_hash;
use crate::types::{Datum, RowFlag, StoreRow, TableId};
use crate::Result;
use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub const DEFAULT_ROW_CACHE_SHARDS: usize = 16;

#[cfg(not(debug_assertions))]
pub const DEFAULT_ROW_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

#[cfg(debug_assertions)]
pub const DEFAULT_ROW_CACHE_CAPACITY: usize = 1024 * 1024;

pub const DEFAULT_ROW_CACHE_BLOCK_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone)]
pub struct RowCacheConfig {
    pub name: String,
    /// Rounded up to a power of two.
    pub num_shards: usize,
    pub capacity_bytes: usize,
    /// Largest charge a single entry may have.
    pub block_size: usize,
}

impl Default for RowCacheConfig {
    fn default() -> Self {
        RowCacheConfig {
            name: "row_cache".into(),
            num_shards: DEFAULT_ROW_CACHE_SHARDS,
            capacity_bytes: DEFAULT_ROW_CACHE_CAPACITY,
            block_size: DEFAULT_ROW_CACHE_BLOCK_SIZE,
        }
    }
}

/// Table id plus identity encoded rowkey, with the hash computed once up
/// front. Rowkeys that compare equal under their collations share one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowCacheKey {
    table_id: TableId,
    rowkey: Vec<u8>,
    hash: u32,
}

impl RowCacheKey {
    /// `rowkey` must be the encoding produced by [encode_rowkey_identity].
    pub fn new(table_id: TableId, rowkey: Vec<u8>) -> RowCacheKey {
        let hash = row_key_hash(table_id, &rowkey);
        RowCacheKey {
            table_id,
            rowkey,
            hash,
        }
    }

    pub fn from_cells(
        table_id: TableId,
        cells: &[Datum<'_>],
        rowkey_columns: &[ColumnDesc],
    ) -> RowCacheKey {
        let mut rowkey = Vec::new();
        encode_rowkey_identity(cells, rowkey_columns, &mut rowkey);
        RowCacheKey::new(table_id, rowkey)
    }

    /// Key of a rowkey as stored in a block.
    pub fn from_encoded(
        table_id: TableId,
        encoded: &[u8],
        rowkey_columns: &[ColumnDesc],
    ) -> Result<RowCacheKey> {
        let rowkey = rowkey_identity(encoded, rowkey_columns)?.into_owned();
        Ok(RowCacheKey::new(table_id, rowkey))
    }

    #[inline]
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    #[inline]
    pub fn rowkey(&self) -> &[u8] {
        &self.rowkey
    }

    #[inline]
    pub fn hash_code(&self) -> u32 {
        self.hash
    }

    fn charge(&self) -> usize {
        std::mem::size_of::<RowCacheKey>() + self.rowkey.len()
    }
}

impl Hash for RowCacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.hash);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowCacheValue {
    flag: RowFlag,
    schema_version: u64,
    generation: u64,
    /// `None` marks a key known to be absent.
    payload: Option<Arc<[u8]>>,
}

impl RowCacheValue {
    /// Copy of an encoded row payload, length prefix included.
    pub fn new_row(flag: RowFlag, schema_version: u64, payload: &[u8]) -> RowCacheValue {
        RowCacheValue {
            flag,
            schema_version,
            generation: 0,
            payload: Some(Arc::from(payload)),
        }
    }

    pub fn absent(schema_version: u64) -> RowCacheValue {
        RowCacheValue {
            flag: RowFlag::DoesNotExist,
            schema_version,
            generation: 0,
            payload: None,
        }
    }

    #[inline]
    pub fn is_absent(&self) -> bool {
        self.payload.is_none()
    }

    #[inline]
    pub fn flag(&self) -> RowFlag {
        self.flag
    }

    #[inline]
    pub fn schema_version(&self) -> u64 {
        self.schema_version
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    /// Decode the cached row through `column_map`. Decoded cells own their
    /// bytes, so `row` does not borrow the cache.
    pub fn decode_into<'o>(&self, column_map: &ColumnMap, row: &mut StoreRow<'o>) -> Result<()> {
        let payload = self.payload.as_deref().ok_or(RowLiteError::EntryNotFound)?;
        let parsed = parse_row(payload, 0)?;
        decode_row_into(&parsed, column_map, row, |d| d.into_owned())
    }

    fn charge(&self) -> usize {
        std::mem::size_of::<RowCacheValue>() + self.payload.as_ref().map_or(0, |p| p.len())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub evictions: u64,
    pub resident_bytes: usize,
    pub entries: usize,
}

struct Inner {
    name: String,
    block_size: usize,
    lru: ShardLRUCache<RowCacheKey, RowCacheValue>,
    generations: DashMap<TableId, u64>,
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    evictions: AtomicU64,
}

impl Inner {
    fn generation(&self, table_id: TableId) -> u64 {
        self.generations.get(&table_id).map_or(0, |g| *g)
    }
}

pub struct RowCache {
    inner: ArcSwapOption<Inner>,
    /// Serializes init and destroy; lookups only load `inner`.
    lifecycle: Mutex<()>,
}

impl Default for RowCache {
    fn default() -> Self {
        RowCache::new()
    }
}

impl RowCache {
    pub fn new() -> RowCache {
        RowCache {
            inner: ArcSwapOption::empty(),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn init(&self, config: RowCacheConfig) -> Result<()> {
        let _guard = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if self.inner.load().is_some() {
            return Err(RowLiteError::AlreadyInitialized);
        }
        if config.num_shards == 0
            || config.capacity_bytes == 0
            || config.block_size == 0
            || config.block_size > config.capacity_bytes
        {
            return Err(RowLiteError::InvalidArgument(format!(
                "row cache {}: {} shards, {} bytes, block size {}",
                config.name, config.num_shards, config.capacity_bytes, config.block_size
            )));
        }

        let lru = ShardLRUCache::new(config.num_shards, config.capacity_bytes);
        info!(
            "row cache {} initialized: {} shards of {} bytes, block size {}",
            config.name,
            lru.num_shards(),
            lru.shard_capacity(),
            config.block_size
        );
        self.inner.store(Some(Arc::new(Inner {
            name: config.name,
            block_size: config.block_size,
            lru,
            generations: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })));
        Ok(())
    }

    pub fn is_inited(&self) -> bool {
        self.inner.load().is_some()
    }

    fn inner(&self) -> Result<Arc<Inner>> {
        self.inner.load_full().ok_or(RowLiteError::NotInitialized)
    }

    pub fn name(&self) -> Result<String> {
        Ok(self.inner()?.name.clone())
    }

    /// `Ok(None)` when the key is not cached; a cached value may still be an
    /// absence marker.
    pub fn get(&self, key: &RowCacheKey) -> Result<Option<RowCacheValue>> {
        let inner = self.inner()?;
        // generation check and stale erase share one shard lock
        let look_up = inner.lru.look_up_if(key, key.hash, |value| {
            value.generation == inner.generation(key.table_id)
        });
        match look_up {
            LookUp::Hit(value) => {
                inner.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(value))
            }
            LookUp::Erased => {
                debug!("drop stale row cache entry of table {}", key.table_id);
                inner.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            LookUp::Miss => {
                inner.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Insert or overwrite. Population is best effort: a refused entry is
    /// logged and reported as `false`.
    pub fn put(&self, key: RowCacheKey, mut value: RowCacheValue) -> bool {
        let inner = match self.inner.load_full() {
            Some(inner) => inner,
            None => {
                warn!("put into uninitialized row cache");
                return false;
            }
        };
        let charge = key.charge() + value.charge();
        if charge > inner.block_size {
            warn!(
                "row cache {}: entry of {} bytes exceeds block size {}",
                inner.name, charge, inner.block_size
            );
            return false;
        }
        value.generation = inner.generation(key.table_id);
        let hash = key.hash;
        match inner.lru.insert(key, value, hash, charge) {
            Some(evicted) => {
                inner.puts.fetch_add(1, Ordering::Relaxed);
                inner.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
                true
            }
            None => {
                warn!(
                    "row cache {}: entry of {} bytes exceeds shard capacity {}",
                    inner.name,
                    charge,
                    inner.lru.shard_capacity()
                );
                false
            }
        }
    }

    pub fn erase(&self, key: &RowCacheKey) -> Result<bool> {
        Ok(self.inner()?.lru.erase(key, key.hash).is_some())
    }

    /// Make every entry of `table_id` cached so far read as a miss.
    pub fn invalidate_table(&self, table_id: TableId) -> Result<()> {
        let inner = self.inner()?;
        let mut generation = inner.generations.entry(table_id).or_insert(0);
        *generation += 1;
        debug!(
            "row cache {}: table {} now at generation {}",
            inner.name, table_id, *generation
        );
        Ok(())
    }

    pub fn stats(&self) -> Result<RowCacheStats> {
        let inner = self.inner()?;
        Ok(RowCacheStats {
            hits: inner.hits.load(Ordering::Relaxed),
            misses: inner.misses.load(Ordering::Relaxed),
            puts: inner.puts.load(Ordering::Relaxed),
            evictions: inner.evictions.load(Ordering::Relaxed),
            resident_bytes: inner.lru.usage(),
            entries: inner.lru.len(),
        })
    }

    /// Drop every entry. The cache can be initialized again afterwards.
    pub fn destroy(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        let inner = self.inner.swap(None).ok_or(RowLiteError::NotInitialized)?;
        inner.lru.clear();
        info!("row cache {} destroyed", inner.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::RowLiteError;
    use crate::block::codec::encode_rowkey;
    use crate::column_map::ColumnDesc;
    use crate::row_cache::{RowCache, RowCacheConfig, RowCacheKey, RowCacheValue};
    use crate::types::{Collation, ColumnType, Datum, RowFlag};
    use std::sync::{Arc, Barrier};

    fn config() -> RowCacheConfig {
        RowCacheConfig {
            name: "test".into(),
            num_shards: 4,
            capacity_bytes: 64 * 1024,
            block_size: 1024,
        }
    }

    fn key(table_id: u64, k: i64) -> RowCacheKey {
        RowCacheKey::from_cells(
            table_id,
            &[Datum::Int(k)],
            &[ColumnDesc::new(1, ColumnType::Int)],
        )
    }

    #[test]
    fn test_lifecycle() {
        let cache = RowCache::new();
        assert_eq!(cache.get(&key(1, 1)), Err(RowLiteError::NotInitialized));
        assert!(!cache.put(key(1, 1), RowCacheValue::absent(1)));
        assert_eq!(cache.destroy(), Err(RowLiteError::NotInitialized));

        cache.init(config()).unwrap();
        assert_eq!(cache.init(config()), Err(RowLiteError::AlreadyInitialized));
        assert_eq!(cache.name().unwrap(), "test");
        assert!(cache.put(key(1, 1), RowCacheValue::absent(1)));
        cache.destroy().unwrap();
        assert!(!cache.is_inited());

        cache.init(config()).unwrap();
        assert!(cache.get(&key(1, 1)).unwrap().is_none());
    }

    #[test]
    fn test_invalid_config() {
        let cache = RowCache::new();
        let mut c = config();
        c.num_shards = 0;
        assert!(cache.init(c).is_err());
        let mut c = config();
        c.block_size = c.capacity_bytes + 1;
        assert!(cache.init(c).is_err());
        assert!(!cache.is_inited());
    }

    #[test]
    fn test_get_put() {
        let cache = RowCache::new();
        cache.init(config()).unwrap();
        let payload = [1u8, 2, 3, 4];
        assert!(cache.put(key(7, 1), RowCacheValue::new_row(RowFlag::Exists, 3, &payload)));
        assert!(cache.put(key(7, 2), RowCacheValue::absent(3)));

        let value = cache.get(&key(7, 1)).unwrap().unwrap();
        assert_eq!(value.payload(), Some(&payload[..]));
        assert_eq!(value.schema_version(), 3);
        assert!(cache.get(&key(7, 2)).unwrap().unwrap().is_absent());
        assert!(cache.get(&key(8, 1)).unwrap().is_none());

        let stats = cache.stats().unwrap();
        assert_eq!((stats.hits, stats.misses, stats.puts), (2, 1, 2));
        assert_eq!(stats.entries, 2);

        assert!(cache.erase(&key(7, 1)).unwrap());
        assert!(!cache.erase(&key(7, 1)).unwrap());
    }

    #[test]
    fn test_oversized_entry() {
        let cache = RowCache::new();
        cache.init(config()).unwrap();
        let payload = vec![0u8; 2048];
        assert!(!cache.put(key(1, 1), RowCacheValue::new_row(RowFlag::Exists, 1, &payload)));
        assert!(cache.get(&key(1, 1)).unwrap().is_none());
    }

    #[test]
    fn test_invalidate_table() {
        let cache = RowCache::new();
        cache.init(config()).unwrap();
        cache.put(key(1, 1), RowCacheValue::absent(1));
        cache.put(key(2, 1), RowCacheValue::absent(1));
        cache.invalidate_table(1).unwrap();
        assert!(cache.get(&key(1, 1)).unwrap().is_none());
        assert!(cache.get(&key(2, 1)).unwrap().is_some());

        cache.put(key(1, 1), RowCacheValue::absent(1));
        assert!(cache.get(&key(1, 1)).unwrap().is_some());
    }

    #[test]
    fn test_stale_erase_keeps_fresh_entry() {
        const NUM_KEYS: i64 = 2000;
        let cache = Arc::new(RowCache::new());
        cache
            .init(RowCacheConfig {
                capacity_bytes: 4 << 20,
                ..config()
            })
            .unwrap();

        for round in 0..20u64 {
            for k in 0..NUM_KEYS {
                cache.put(key(1, k), RowCacheValue::absent(round));
            }
            cache.invalidate_table(1).unwrap();

            // readers drop the stale entries while the writer replaces them
            let barrier = Arc::new(Barrier::new(3));
            let readers: Vec<_> = (0..2)
                .map(|_| {
                    let cache = cache.clone();
                    let barrier = barrier.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        for k in 0..NUM_KEYS {
                            let _ = cache.get(&key(1, k)).unwrap();
                        }
                    })
                })
                .collect();
            barrier.wait();
            for k in 0..NUM_KEYS {
                assert!(cache.put(key(1, k), RowCacheValue::absent(round + 100)));
            }
            for reader in readers {
                reader.join().unwrap();
            }

            for k in 0..NUM_KEYS {
                let value = cache.get(&key(1, k)).unwrap();
                assert_eq!(value.map(|v| v.schema_version()), Some(round + 100));
            }
        }
    }

    #[test]
    fn test_key_identity() {
        let columns = [
            ColumnDesc::new(1, ColumnType::Varchar).with_collation(Collation::Utf8Mb4GeneralCi),
        ];
        let upper = RowCacheKey::from_cells(9, &[Datum::from("ABC")], &columns);
        let lower = RowCacheKey::from_cells(9, &[Datum::from("abc  ")], &columns);
        assert_eq!(upper, lower);
        assert_eq!(upper.hash_code(), lower.hash_code());

        let mut stored = Vec::new();
        encode_rowkey(&[Datum::from("aBc")], &mut stored);
        assert_eq!(RowCacheKey::from_encoded(9, &stored, &columns).unwrap(), upper);

        let binary = [ColumnDesc::new(1, ColumnType::Varchar)];
        assert_ne!(
            RowCacheKey::from_cells(9, &[Datum::from("ABC")], &binary),
            RowCacheKey::from_cells(9, &[Datum::from("abc")], &binary)
        );
    }

    #[test]
    fn test_eviction() {
        let cache = RowCache::new();
        cache
            .init(RowCacheConfig {
                name: "small".into(),
                num_shards: 1,
                capacity_bytes: 4096,
                block_size: 1024,
            })
            .unwrap();
        for i in 0..1000 {
            cache.put(key(1, i), RowCacheValue::absent(1));
        }
        let stats = cache.stats().unwrap();
        assert!(stats.resident_bytes <= 4096);
        assert!(stats.evictions > 0);
        assert_eq!(stats.entries as u64 + stats.evictions, 1000);
        assert!(cache.get(&key(1, 999)).unwrap().is_some());
        assert!(cache.get(&key(1, 0)).unwrap().is_none());
    }
}
