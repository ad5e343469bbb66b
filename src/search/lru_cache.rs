use dashmap::DashMap;
use std::{
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tracing::debug;

/// Cache entry con TTL
#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Option<Duration>,
    last_access: AtomicU64,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Option<Duration>, tick: u64) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
            last_access: AtomicU64::new(tick),
        }
    }

    fn is_expired(&self) -> bool {
        self.ttl
            .map(|ttl| self.created_at.elapsed() > ttl)
            .unwrap_or(false)
    }
}

/// Cache LRU concurrente con expiración opcional
#[derive(Debug)]
pub struct LRUCache<K: Clone + Eq + Hash, V> {
    data: Arc<DashMap<K, CacheEntry<V>>>,
    capacity: usize,
    clock: Arc<AtomicU64>,
    metrics: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired_removals: AtomicU64,
}

impl<K, V> LRUCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
            clock: Arc::new(AtomicU64::new(0)),
            metrics: Arc::new(Counters::default()),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Option<Duration>) -> Option<V> {
        if !self.data.contains_key(&key) && self.data.len() >= self.capacity {
            self.evict_oldest();
        }
        let entry = CacheEntry::new(value, ttl, self.tick());
        self.data.insert(key, entry).map(|old| old.value)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let expired = match self.data.get(key) {
            Some(entry) if !entry.is_expired() => {
                entry.last_access.store(self.tick(), Ordering::Relaxed);
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.data.remove(key);
            self.metrics.expired_removals.fetch_add(1, Ordering::Relaxed);
        }
        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.data.remove(key).map(|(_, entry)| entry.value)
    }

    pub fn clear(&self) {
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn evict_oldest(&self) {
        let oldest = self
            .data
            .iter()
            .min_by_key(|entry| entry.value().last_access.load(Ordering::Relaxed))
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            self.data.remove(&key);
            self.metrics.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Limpia entradas expiradas y retorna el número de elementos removidos
    pub fn cleanup_expired(&self) -> usize {
        let keys_to_remove: Vec<K> = self
            .data
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();

        let removed = keys_to_remove
            .into_iter()
            .filter(|key| self.data.remove(key).is_some())
            .count();

        if removed > 0 {
            self.metrics
                .expired_removals
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!("Limpiadas {} entradas expiradas del cache", removed);
        }

        removed
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            evictions: self.metrics.evictions.load(Ordering::Relaxed),
            expired_removals: self.metrics.expired_removals.load(Ordering::Relaxed),
        }
    }
}

impl<K, V> Clone for LRUCache<K, V>
where
    K: Clone + Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            capacity: self.capacity,
            clock: self.clock.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// Métricas básicas del cache
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_removals: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}
