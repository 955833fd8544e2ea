//! Byte-budgeted LRU caches shared across reads.
//!
//! ROOT baskets and keys are immutable once written, so anything keyed by
//! file + seek is safe to reuse across reads. Three caches
//! hang off [`Caches`]: decompressed basket bytes, basket key headers and
//! finished arrays. All of them are caller-owned and outlive a single read.
//!
//! Puts are idempotent (a key always maps to the same deterministic value), so
//! concurrent writers are last-write-wins. [`Cache::get_or_insert_with`] still
//! keeps at most one computation per key in flight so that two threads asking
//! for the same basket do not both decompress it.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::array::Array;
use crate::basket::BasketHeader;
use crate::error::Result;

/// Configuration for an [`LruCache`].
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Maximum total weight (bytes) kept in the cache.
    /// Default: 256 MiB.
    pub max_bytes: usize,
    /// Whether caching is enabled. When `false`, `get`/`insert` are no-ops.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_bytes: 256 * 1024 * 1024, enabled: true }
    }
}

impl CacheConfig {
    /// Create a disabled (no-op) cache config.
    pub fn disabled() -> Self {
        Self { max_bytes: 0, enabled: false }
    }

    /// A cache that never evicts.
    pub fn unbounded() -> Self {
        Self { max_bytes: usize::MAX, enabled: true }
    }
}

/// Approximate in-memory size of a cached value.
pub trait Weigh {
    /// Weight in bytes, counted against [`CacheConfig::max_bytes`].
    fn weight(&self) -> usize;
}

impl Weigh for Arc<[u8]> {
    fn weight(&self) -> usize {
        self.len()
    }
}

impl Weigh for Arc<Array> {
    fn weight(&self) -> usize {
        self.nbytes()
    }
}

/// A concurrent key → value cache supplied by the caller.
pub trait Cache<K, V>: Send + Sync {
    /// Look up `key`.
    fn get(&self, key: &K) -> Option<V>;

    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: K, value: V);

    /// Drop every entry.
    fn clear(&self);

    /// Return the cached value or compute, store and return it.
    fn get_or_insert_with(&self, key: &K, f: &mut dyn FnMut() -> Result<V>) -> Result<V>
    where
        K: Clone,
        V: Clone,
    {
        if let Some(v) = self.get(key) {
            return Ok(v);
        }
        let v = f()?;
        self.put(key.clone(), v.clone());
        Ok(v)
    }
}

struct CacheEntry<K, V> {
    value: V,
    size: usize,
    prev: Option<K>,
    next: Option<K>,
}

/// Internal LRU state.
///
/// `HashMap` for O(1) lookup plus an intrusive doubly-linked list threaded
/// through the keys for O(1) promotion/eviction.
struct Inner<K, V> {
    map: HashMap<K, CacheEntry<K, V>>,
    /// Least-recently-used key.
    head: Option<K>,
    /// Most-recently-used key.
    tail: Option<K>,
    current_bytes: usize,
    max_bytes: usize,
    hits: u64,
    misses: u64,
}

impl<K: Clone + Eq + Hash, V: Clone + Weigh> Inner<K, V> {
    fn new(max_bytes: usize) -> Self {
        Self {
            map: HashMap::new(),
            head: None,
            tail: None,
            current_bytes: 0,
            max_bytes,
            hits: 0,
            misses: 0,
        }
    }

    fn detach(&mut self, key: &K) {
        let (prev, next) = match self.map.get(key) {
            Some(entry) => (entry.prev.clone(), entry.next.clone()),
            None => return,
        };

        match &prev {
            Some(prev_key) => {
                if let Some(prev_entry) = self.map.get_mut(prev_key) {
                    prev_entry.next = next.clone();
                }
            }
            None => self.head = next.clone(),
        }

        match &next {
            Some(next_key) => {
                if let Some(next_entry) = self.map.get_mut(next_key) {
                    next_entry.prev = prev.clone();
                }
            }
            None => self.tail = prev,
        }

        if let Some(entry) = self.map.get_mut(key) {
            entry.prev = None;
            entry.next = None;
        }
    }

    fn push_back(&mut self, key: &K) {
        if self.tail.as_ref() == Some(key) || !self.map.contains_key(key) {
            return;
        }
        match self.tail.clone() {
            Some(tail_key) => {
                if let Some(tail_entry) = self.map.get_mut(&tail_key) {
                    tail_entry.next = Some(key.clone());
                }
                if let Some(entry) = self.map.get_mut(key) {
                    entry.prev = Some(tail_key);
                    entry.next = None;
                }
                self.tail = Some(key.clone());
            }
            None => {
                self.head = Some(key.clone());
                self.tail = Some(key.clone());
            }
        }
    }

    fn remove_key(&mut self, key: &K) -> Option<CacheEntry<K, V>> {
        if !self.map.contains_key(key) {
            return None;
        }
        self.detach(key);
        let entry = self.map.remove(key)?;
        self.current_bytes = self.current_bytes.saturating_sub(entry.size);
        Some(entry)
    }

    fn get(&mut self, key: &K) -> Option<V> {
        if self.map.contains_key(key) {
            self.hits += 1;
            if self.tail.as_ref() != Some(key) {
                self.detach(key);
                self.push_back(key);
            }
            self.map.get(key).map(|entry| entry.value.clone())
        } else {
            self.misses += 1;
            None
        }
    }

    fn insert(&mut self, key: K, value: V) {
        let size = value.weight();
        self.remove_key(&key);

        // A single entry larger than the whole budget is never cached.
        if size > self.max_bytes {
            return;
        }

        while self.current_bytes + size > self.max_bytes {
            let Some(lru) = self.head.clone() else { break };
            self.remove_key(&lru);
        }

        self.map.insert(key.clone(), CacheEntry { value, size, prev: None, next: None });
        self.push_back(&key);
        self.current_bytes += size;
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Thread-safe LRU cache bounded by the total weight of its values.
pub struct LruCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    pending: Mutex<HashSet<K>>,
    ready: Condvar,
    enabled: bool,
}

impl<K: Clone + Eq + Hash, V: Clone + Weigh> LruCache<K, V> {
    /// Create a new cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::new(config.max_bytes)),
            pending: Mutex::new(HashSet::new()),
            ready: Condvar::new(),
            enabled: config.enabled,
        }
    }

    /// Look up a value; `None` on miss or when disabled.
    pub fn get(&self, key: &K) -> Option<V> {
        if !self.enabled {
            return None;
        }
        lock(&self.inner).get(key)
    }

    /// Insert a value, evicting least-recently-used entries as needed.
    pub fn insert(&self, key: K, value: V) {
        if self.enabled {
            lock(&self.inner).insert(key, value);
        }
    }

    /// Whether `key` is currently cached (does not touch LRU order or stats).
    pub fn contains(&self, key: &K) -> bool {
        self.enabled && lock(&self.inner).map.contains_key(key)
    }

    /// Cache statistics snapshot.
    pub fn stats(&self) -> CacheStats {
        let inner = lock(&self.inner);
        CacheStats {
            entries: inner.map.len(),
            current_bytes: inner.current_bytes,
            max_bytes: inner.max_bytes,
            hits: inner.hits,
            misses: inner.misses,
        }
    }

    /// Clear all cached entries. Statistics are kept.
    pub fn clear(&self) {
        let mut inner = lock(&self.inner);
        inner.map.clear();
        inner.head = None;
        inner.tail = None;
        inner.current_bytes = 0;
    }
}

impl<K: Clone + Eq + Hash, V: Clone + Weigh> Default for LruCache<K, V> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

/// Removes a key from the in-flight set even if the computation panics.
struct PendingGuard<'a, K: Eq + Hash> {
    pending: &'a Mutex<HashSet<K>>,
    ready: &'a Condvar,
    key: Option<K>,
}

impl<K: Eq + Hash> Drop for PendingGuard<'_, K> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            lock(self.pending).remove(&key);
            self.ready.notify_all();
        }
    }
}

impl<K, V> Cache<K, V> for LruCache<K, V>
where
    K: Clone + Eq + Hash + Send,
    V: Clone + Weigh + Send,
{
    fn get(&self, key: &K) -> Option<V> {
        LruCache::get(self, key)
    }

    fn put(&self, key: K, value: V) {
        self.insert(key, value)
    }

    fn clear(&self) {
        LruCache::clear(self)
    }

    fn get_or_insert_with(&self, key: &K, f: &mut dyn FnMut() -> Result<V>) -> Result<V> {
        if !self.enabled {
            return f();
        }
        // Lock order is always pending → inner.
        let mut pending = lock(&self.pending);
        loop {
            if pending.contains(key) {
                pending = self.ready.wait(pending).unwrap_or_else(PoisonError::into_inner);
                continue;
            }
            if let Some(v) = lock(&self.inner).get(key) {
                return Ok(v);
            }
            break;
        }
        pending.insert(key.clone());
        drop(pending);

        let _guard = PendingGuard { pending: &self.pending, ready: &self.ready, key: Some(key.clone()) };
        let v = f()?;
        self.insert(key.clone(), v.clone());
        Ok(v)
    }
}

/// Decompressed basket payloads, keyed by `"{file uuid}:{basket seek}"`.
pub type BasketCache = dyn Cache<String, Arc<[u8]>>;
/// Basket key headers, keyed like [`BasketCache`].
pub type KeyCache = dyn Cache<String, BasketHeader>;
/// Finished arrays, keyed by `"{file uuid}:@{first basket seek}:{branch}:{interpretation}:{start}-{stop}"`.
pub type ArrayCache = dyn Cache<String, Arc<Array>>;

/// The three caches consulted by a read. Any of them may be absent.
#[derive(Clone, Default)]
pub struct Caches {
    /// Object-level cache of finished arrays.
    pub arrays: Option<Arc<ArrayCache>>,
    /// Raw basket cache.
    pub baskets: Option<Arc<BasketCache>>,
    /// Key cache.
    pub keys: Option<Arc<KeyCache>>,
}

impl Caches {
    /// No caching at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// One [`LruCache`] per granularity, each with `config`.
    pub fn lru(config: CacheConfig) -> Self {
        Self {
            arrays: Some(Arc::new(LruCache::<String, Arc<Array>>::new(config))),
            baskets: Some(Arc::new(LruCache::<String, Arc<[u8]>>::new(config))),
            keys: Some(Arc::new(LruCache::<String, BasketHeader>::new(config))),
        }
    }

    /// Empty every cache present.
    pub fn clear(&self) {
        if let Some(c) = &self.arrays {
            c.clear();
        }
        if let Some(c) = &self.baskets {
            c.clear();
        }
        if let Some(c) = &self.keys {
            c.clear();
        }
    }
}

impl std::fmt::Debug for Caches {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Caches")
            .field("arrays", &self.arrays.is_some())
            .field("baskets", &self.baskets.is_some())
            .field("keys", &self.keys.is_some())
            .finish()
    }
}

/// Snapshot of cache statistics.
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    /// Number of cached entries.
    pub entries: usize,
    /// Current total weight in cache.
    pub current_bytes: usize,
    /// Maximum configured weight.
    pub max_bytes: usize,
    /// Total cache hits since creation.
    pub hits: u64,
    /// Total cache misses since creation.
    pub misses: u64,
}

impl CacheStats {
    /// Hit rate as a fraction [0.0, 1.0].
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}
