use async_trait::async_trait;
use serenity::model::id::UserId;
use std::time::Duration;
use tracing::{debug, info};

use super::{lru_cache::LRUCache, query::QueryType, result::SearchResult};

/// Cache key over the normalized query, its type and the requester.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryFingerprint {
    pub query: String,
    pub query_type: QueryType,
    pub requested_by: Option<UserId>,
}

impl QueryFingerprint {
    pub fn new(query: &str, query_type: &QueryType, requested_by: Option<UserId>) -> Self {
        Self {
            query: normalize(query),
            query_type: query_type.clone(),
            requested_by,
        }
    }
}

/// Trims and lowercases; collapses runs of whitespace.
fn normalize(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Memoization layer for search results.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryCache: Send + Sync {
    async fn resolve(&self, fingerprint: &QueryFingerprint) -> Option<SearchResult>;

    async fn add_data(&self, data: SearchResult);
}

/// Caché en memoria para resultados de búsqueda
#[derive(Debug, Clone)]
pub struct MemoryQueryCache {
    entries: LRUCache<QueryFingerprint, SearchResult>,
    ttl: Option<Duration>,
}

impl MemoryQueryCache {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        info!("🗄️ Caché de búsquedas inicializado ({} entradas)", capacity);
        Self {
            entries: LRUCache::new(capacity),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Removes expired results; meant for a periodic maintenance task.
    pub fn cleanup_old_entries(&self) {
        let removed = self.entries.cleanup_expired();
        if removed > 0 {
            info!("🧹 Cache cleanup: removed {} expired entries", removed);
        }
    }

    pub fn metrics(&self) -> super::lru_cache::CacheMetrics {
        self.entries.metrics()
    }
}

#[async_trait]
impl QueryCache for MemoryQueryCache {
    async fn resolve(&self, fingerprint: &QueryFingerprint) -> Option<SearchResult> {
        let hit = self.entries.get(fingerprint);
        debug!(
            "🔎 Cache {} para '{}' ({})",
            if hit.is_some() { "hit" } else { "miss" },
            fingerprint.query,
            fingerprint.query_type
        );
        hit
    }

    async fn add_data(&self, data: SearchResult) {
        if data.is_empty() {
            return;
        }
        self.entries.insert_with_ttl(data.fingerprint(), data, self.ttl);
    }
}
