//! Sharded LRU cache whose capacity is charged in bytes.
//!
//! Each shard is an independent LRU list behind its own [Mutex]; the shard of
//! an entry is picked from the top bits of its precomputed hash. Eviction
//! happens on insert only and never crosses shards.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

const NIL: usize = usize::MAX;

/// Outcome of [ShardLRUCache::look_up_if].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookUp<V> {
    Hit(V),
    /// An entry was found, failed the check and was erased.
    Erased,
    Miss,
}

pub struct ShardLRUCache<K, V> {
    shards: Vec<Mutex<LRUCache<K, V>>>,
    shard_bits: u32,
    shard_capacity: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> ShardLRUCache<K, V> {
    /// `num_shards` is rounded up to a power of two, every shard is charged
    /// at most `capacity / num_shards`.
    pub fn new(num_shards: usize, capacity: usize) -> ShardLRUCache<K, V> {
        let num_shards = num_shards.max(1).next_power_of_two();
        let shard_capacity = capacity / num_shards;
        let shards = (0..num_shards)
            .map(|_| Mutex::new(LRUCache::new(shard_capacity)))
            .collect();
        ShardLRUCache {
            shards,
            shard_bits: num_shards.trailing_zeros(),
            shard_capacity,
        }
    }

    #[inline]
    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    pub fn shard_capacity(&self) -> usize {
        self.shard_capacity
    }

    #[inline]
    fn shard(&self, hash: u32) -> usize {
        ((hash as u64) >> (32 - self.shard_bits)) as usize
    }

    /// A panic while holding a shard lock leaves the LRU list consistent, so
    /// poisoning is ignored.
    fn lock(&self, hash: u32) -> MutexGuard<LRUCache<K, V>> {
        self.shards[self.shard(hash)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite `key`. Returns the number of entries evicted to
    /// make room, or `None` when `charge` exceeds a whole shard.
    pub fn insert(&self, key: K, value: V, hash: u32, charge: usize) -> Option<usize> {
        self.lock(hash).insert(key, value, charge)
    }

    /// Look `key` up and erase it unless `valid` accepts its value. The check
    /// runs under the shard lock, so it always sees the entry it erases.
    pub fn look_up_if<F>(&self, key: &K, hash: u32, valid: F) -> LookUp<V>
    where
        F: FnOnce(&V) -> bool,
    {
        self.lock(hash).look_up_if(key, valid)
    }

    #[cfg(test)]
    pub fn look_up(&self, key: &K, hash: u32) -> Option<V> {
        match self.look_up_if(key, hash, |_| true) {
            LookUp::Hit(value) => Some(value),
            _ => None,
        }
    }

    pub fn erase(&self, key: &K, hash: u32) -> Option<V> {
        self.lock(hash).erase(key)
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            shard.lock().unwrap_or_else(PoisonError::into_inner).clear();
        }
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes charged across all shards.
    pub fn usage(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).usage)
            .sum()
    }
}

struct LRUEntry<K, V> {
    key: K,
    value: V,
    charge: usize,
    prev: usize,
    next: usize,
}

/// LRU list threaded through a dense slab by index.
struct LRUCache<K, V> {
    table: HashMap<K, usize>,
    slots: Vec<LRUEntry<K, V>>,
    // most recently used
    head: usize,
    // least recently used, evicted first
    tail: usize,
    capacity: usize,
    usage: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> LRUCache<K, V> {
    fn new(capacity: usize) -> LRUCache<K, V> {
        LRUCache {
            table: HashMap::new(),
            slots: Vec::new(),
            head: NIL,
            tail: NIL,
            capacity,
            usage: 0,
        }
    }

    #[inline]
    fn len(&self) -> usize {
        self.slots.len()
    }

    fn look_up_if<F: FnOnce(&V) -> bool>(&mut self, key: &K, valid: F) -> LookUp<V> {
        let idx = match self.table.get(key) {
            Some(&idx) => idx,
            None => return LookUp::Miss,
        };
        if !valid(&self.slots[idx].value) {
            self.remove_at(idx);
            return LookUp::Erased;
        }
        if self.head != idx {
            self.detach(idx);
            self.attach_to_head(idx);
        }
        LookUp::Hit(self.slots[idx].value.clone())
    }

    #[cfg(test)]
    fn look_up(&mut self, key: &K) -> Option<V> {
        match self.look_up_if(key, |_| true) {
            LookUp::Hit(value) => Some(value),
            _ => None,
        }
    }

    fn insert(&mut self, key: K, value: V, charge: usize) -> Option<usize> {
        if charge > self.capacity {
            return None;
        }
        if let Some(&idx) = self.table.get(&key) {
            self.remove_at(idx);
        }
        let mut evicted = 0;
        while self.usage + charge > self.capacity && self.tail != NIL {
            self.remove_at(self.tail);
            evicted += 1;
        }

        let idx = self.slots.len();
        self.slots.push(LRUEntry {
            key: key.clone(),
            value,
            charge,
            prev: NIL,
            next: NIL,
        });
        self.table.insert(key, idx);
        self.attach_to_head(idx);
        self.usage += charge;
        Some(evicted)
    }

    fn erase(&mut self, key: &K) -> Option<V> {
        let idx = *self.table.get(key)?;
        Some(self.remove_at(idx).value)
    }

    fn clear(&mut self) {
        self.table.clear();
        self.slots.clear();
        self.head = NIL;
        self.tail = NIL;
        self.usage = 0;
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        if prev != NIL {
            self.slots[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.slots[next].prev = prev;
        } else {
            self.tail = prev;
        }
        self.slots[idx].prev = NIL;
        self.slots[idx].next = NIL;
    }

    fn attach_to_head(&mut self, idx: usize) {
        self.slots[idx].prev = NIL;
        self.slots[idx].next = self.head;
        if self.head != NIL {
            self.slots[self.head].prev = idx;
        } else {
            self.tail = idx;
        }
        self.head = idx;
    }

    /// Unlink the entry at `idx` and move the last slot into its place.
    fn remove_at(&mut self, idx: usize) -> LRUEntry<K, V> {
        self.detach(idx);
        let last = self.slots.len() - 1;
        if idx != last {
            let (prev, next) = (self.slots[last].prev, self.slots[last].next);
            if prev != NIL {
                self.slots[prev].next = idx;
            } else {
                self.head = idx;
            }
            if next != NIL {
                self.slots[next].prev = idx;
            } else {
                self.tail = idx;
            }
            if let Some(i) = self.table.get_mut(&self.slots[last].key) {
                *i = idx;
            }
        }
        let entry = self.slots.swap_remove(idx);
        self.table.remove(&entry.key);
        self.usage -= entry.charge;
        entry
    }
}
