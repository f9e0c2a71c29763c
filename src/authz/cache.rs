use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use super::Principal;

const MAX_ENTRIES: usize = 4096;

#[derive(Debug, Clone)]
struct CacheEntry {
    principal: Arc<Principal>,
    inserted_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }
}

/// Resolved principals keyed by employee id.
///
/// Changes made outside this process show up after at most `ttl`. A zero TTL
/// disables caching.
///
/// Every [`clear`](Self::clear) bumps a generation counter. Loads record the
/// generation they started under and [`insert`](Self::insert) drops anything
/// loaded before the latest clear.
#[derive(Debug)]
pub struct PrincipalCache {
    entries: RwLock<HashMap<i64, CacheEntry>>,
    generation: AtomicU64,
    ttl: Duration,
}

impl PrincipalCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            ttl,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub async fn get(&self, employee_id: i64) -> Option<Arc<Principal>> {
        if !self.is_enabled() {
            return None;
        }
        let entries = self.entries.read().await;
        entries
            .get(&employee_id)
            .filter(|e| !e.is_expired(self.ttl))
            .map(|e| Arc::clone(&e.principal))
    }

    /// Read before loading a principal and pass to [`insert`](Self::insert).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub async fn insert(&self, principal: Arc<Principal>, loaded_at: u64) {
        if !self.is_enabled() {
            return;
        }
        let mut entries = self.entries.write().await;
        if loaded_at != self.generation() {
            tracing::debug!(employee_id = principal.employee_id, "stale principal not cached");
            return;
        }

        if entries.len() >= MAX_ENTRIES {
            let ttl = self.ttl;
            entries.retain(|_, e| !e.is_expired(ttl));
        }
        if entries.len() >= MAX_ENTRIES {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(id, _)| *id);
            if let Some(id) = oldest {
                entries.remove(&id);
            }
        }

        entries.insert(
            principal.employee_id,
            CacheEntry { principal, inserted_at: Instant::now() },
        );
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        let dropped = entries.len();
        entries.clear();
        tracing::debug!(dropped, "principal cache cleared");
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
