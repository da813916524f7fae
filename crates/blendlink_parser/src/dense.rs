//! Dense open-addressing hash table
//!
//! `DenseTable` keeps entries in contiguous storage (stable indices until a
//! removal) with a separate bucket/chain overlay for O(1) expected lookup.
//! It backs the old-address map and the type-name index, where the engine
//! needs indexed iteration and repeated lookups of the same key.
//!
//! Contract notes:
//! - `insert` refuses duplicate keys (returns `false`, leaves the stored
//!   value untouched)
//! - `find` caches the most recent (hash, slot) pair; re-resolving the same
//!   pointer many times during relocation hits this fast path
//! - `remove` compacts storage by moving the last entry into the freed slot

use ahash::RandomState;
use std::cell::Cell;
use std::hash::{BuildHasher, Hash};

const EMPTY: u32 = u32::MAX;
const INITIAL_CAPACITY: usize = 64;

pub struct DenseTable<K, V> {
    hasher: RandomState,
    /// Head entry index per bucket; length is always a power of two
    buckets: Vec<u32>,
    /// Per-entry chain link to the next entry in the same bucket
    next: Vec<u32>,
    keys: Vec<K>,
    values: Vec<V>,
    /// Most recent successful lookup as (hash, entry index)
    cache: Cell<Option<(u64, u32)>>,
}

impl<K: Hash + Eq, V> Default for DenseTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq, V> DenseTable<K, V> {
    pub fn new() -> Self {
        Self {
            hasher: RandomState::new(),
            buckets: Vec::new(),
            next: Vec::new(),
            keys: Vec::new(),
            values: Vec::new(),
            cache: Cell::new(None),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut table = Self::new();
        table.rebuild(capacity.max(INITIAL_CAPACITY).next_power_of_two());
        table
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn hash_of(&self, key: &K) -> u64 {
        self.hasher.hash_one(key)
    }

    fn bucket_of(&self, hash: u64) -> usize {
        hash as usize & (self.buckets.len() - 1)
    }

    /// Insert a key/value pair. Returns `false` without mutating anything
    /// if the key is already present.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        if self.buckets.is_empty() {
            self.rebuild(INITIAL_CAPACITY);
        }
        if self.find(&key).is_some() {
            return false;
        }
        if self.keys.len() == self.buckets.len() {
            self.rebuild((self.keys.len() * 2).next_power_of_two());
        }

        let hash = self.hash_of(&key);
        let bucket = self.bucket_of(hash);
        let index = self.keys.len() as u32;
        self.next.push(self.buckets[bucket]);
        self.buckets[bucket] = index;
        self.keys.push(key);
        self.values.push(value);
        true
    }

    /// Find the dense slot of a key, if present.
    pub fn find(&self, key: &K) -> Option<usize> {
        if self.keys.is_empty() {
            return None;
        }
        let hash = self.hash_of(key);

        if let Some((cached_hash, cached_index)) = self.cache.get()
            && cached_hash == hash
            && (cached_index as usize) < self.keys.len()
            && self.keys[cached_index as usize] == *key
        {
            return Some(cached_index as usize);
        }

        let mut entry = self.buckets[self.bucket_of(hash)];
        while entry != EMPTY {
            if self.keys[entry as usize] == *key {
                self.cache.set(Some((hash, entry)));
                return Some(entry as usize);
            }
            entry = self.next[entry as usize];
        }
        None
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.find(key).map(|index| &self.values[index])
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.find(key).map(|index| &mut self.values[index])
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    pub fn key_at(&self, index: usize) -> Option<&K> {
        self.keys.get(index)
    }

    pub fn value_at(&self, index: usize) -> Option<&V> {
        self.values.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.keys.iter().zip(self.values.iter())
    }

    /// Remove a key. The last entry is moved into the freed slot so storage
    /// stays dense. Returns the removed value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        if self.keys.is_empty() {
            return None;
        }
        let hash = self.hash_of(key);
        let bucket = self.bucket_of(hash);
        let index = self.unlink(bucket, key)? as usize;
        self.cache.set(None);

        let last = self.keys.len() - 1;
        if index != last {
            // The moved entry's chain still points at `last`; redirect it.
            let moved_hash = self.hash_of(&self.keys[last]);
            let moved_bucket = self.bucket_of(moved_hash);
            self.redirect(moved_bucket, last as u32, index as u32);
        }
        self.next.swap_remove(index);
        self.keys.swap_remove(index);
        Some(self.values.swap_remove(index))
    }

    /// Unlink `key` from its bucket chain, returning the freed entry index.
    fn unlink(&mut self, bucket: usize, key: &K) -> Option<u32> {
        let mut entry = self.buckets[bucket];
        let mut prev = EMPTY;
        while entry != EMPTY {
            if self.keys[entry as usize] == *key {
                if prev == EMPTY {
                    self.buckets[bucket] = self.next[entry as usize];
                } else {
                    self.next[prev as usize] = self.next[entry as usize];
                }
                return Some(entry);
            }
            prev = entry;
            entry = self.next[entry as usize];
        }
        None
    }

    /// Rewrite the single chain link pointing at `from` to point at `to`.
    fn redirect(&mut self, bucket: usize, from: u32, to: u32) {
        if self.buckets[bucket] == from {
            self.buckets[bucket] = to;
            return;
        }
        let mut entry = self.buckets[bucket];
        while entry != EMPTY {
            if self.next[entry as usize] == from {
                self.next[entry as usize] = to;
                return;
            }
            entry = self.next[entry as usize];
        }
    }

    /// Grow to `capacity` buckets (power of two) and relink every entry.
    fn rebuild(&mut self, capacity: usize) {
        self.buckets.clear();
        self.buckets.resize(capacity, EMPTY);
        self.cache.set(None);
        for index in 0..self.keys.len() {
            let bucket = {
                let hash = self.hash_of(&self.keys[index]);
                self.bucket_of(hash)
            };
            self.next[index] = self.buckets[bucket];
            self.buckets[bucket] = index as u32;
        }
    }
}

impl<K: std::fmt::Debug, V: std::fmt::Debug> std::fmt::Debug for DenseTable<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.keys.iter().zip(self.values.iter()))
            .finish()
    }
}
