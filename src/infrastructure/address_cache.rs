//! Address Cache
//!
//! Memoizes name lookups with a short TTL, bounded by the total length
//! of the cached address strings.

use crate::domain::entities::BackendAddress;
use crate::infrastructure::lru::{LruCache, Weighted};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Default byte capacity (1 MiB).
pub const DEFAULT_CACHE_CAPACITY: usize = 1024 * 1024;

/// Default entry TTL.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(1);

/// A cached lookup result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub addresses: Vec<BackendAddress>,
    pub created_at: Instant,
}

impl CacheEntry {
    pub fn new(addresses: Vec<BackendAddress>) -> Self {
        Self {
            addresses,
            created_at: Instant::now(),
        }
    }

    /// Whether the entry is older than `ttl`.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

impl Weighted for CacheEntry {
    fn weight(&self) -> usize {
        self.addresses.iter().map(String::len).sum()
    }
}

/// Process-wide cache of resolved addresses, safe to share across tasks.
///
/// Stale entries are not swept; they are skipped on read and overwritten
/// by the next successful lookup.
pub struct AddressCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl AddressCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Return the cached addresses for `name` if present and fresh.
    pub fn get(&self, name: &str) -> Option<Vec<BackendAddress>> {
        let mut entries = self.entries.lock();
        match entries.get(name) {
            Some(entry) if !entry.is_expired(self.ttl) => Some(entry.addresses.clone()),
            _ => None,
        }
    }

    /// Store a fresh result for `name`.
    pub fn set(&self, name: &str, addresses: Vec<BackendAddress>) {
        self.entries
            .lock()
            .insert(name.to_string(), CacheEntry::new(addresses));
    }

    /// Total bytes of cached addresses.
    pub fn size(&self) -> usize {
        self.entries.lock().size()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for AddressCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
    }
}
