//! Weighted LRU Map
//!
//! A least-recently-used map bounded by the summed weight of its values
//! rather than by entry count. Not synchronized; callers wrap it in a lock.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Something that reports how much capacity it consumes.
pub trait Weighted {
    fn weight(&self) -> usize;
}

struct Slot<V> {
    value: V,
    weight: usize,
    tick: u64,
}

/// LRU map bounded by total weight.
///
/// Recency order is kept in a `BTreeMap` keyed by a monotonically
/// increasing tick, so the least recently used key is always the first
/// entry of `order`.
pub struct LruCache<K, V> {
    map: HashMap<K, Slot<V>>,
    order: BTreeMap<u64, K>,
    tick: u64,
    size: usize,
    capacity: usize,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Weighted,
{
    /// Create a cache that holds at most `capacity` total weight.
    pub fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: BTreeMap::new(),
            tick: 0,
            size: 0,
            capacity,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Get a value and mark it most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let tick = self.next_tick();
        let slot = self.map.get_mut(key)?;
        if let Some(owned) = self.order.remove(&slot.tick) {
            self.order.insert(tick, owned);
        }
        slot.tick = tick;
        Some(&slot.value)
    }

    /// Get a value without touching recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key).map(|slot| &slot.value)
    }

    /// Insert or replace a value, then evict least recently used entries
    /// until the total weight fits the capacity.
    ///
    /// A value heavier than the whole capacity is evicted immediately.
    pub fn insert(&mut self, key: K, value: V) {
        self.remove(&key);

        let tick = self.next_tick();
        let weight = value.weight();
        self.size += weight;
        self.order.insert(tick, key.clone());
        self.map.insert(
            key,
            Slot {
                value,
                weight,
                tick,
            },
        );

        self.evict();
    }

    /// Remove a key, returning its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = self.map.remove(key)?;
        self.order.remove(&slot.tick);
        self.size -= slot.weight;
        Some(slot.value)
    }

    fn evict(&mut self) {
        while self.size > self.capacity {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            if let Some(slot) = self.map.remove(&key) {
                self.size -= slot.weight;
            }
        }
    }

    /// Total weight currently held.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
