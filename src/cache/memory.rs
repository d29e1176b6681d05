//! In-memory cache store.
//!
//! Keeps entries in a `HashMap` behind a tokio `RwLock`. Nothing survives a
//! restart, which makes it the store of choice for tests and for hosts that
//! only want per-process deduplication.

use super::{add_ttl, CacheEntry, CacheStats, CacheStore, Clock, NewEntry, SystemClock};
use crate::config::CacheTtl;
use crate::error::CacheError;
use crate::fingerprint::FileFingerprint;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Process-local [`CacheStore`].
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<FileFingerprint, CacheEntry>>,
    ttl: CacheTtl,
    clock: Arc<dyn Clock>,
}

impl MemoryCacheStore {
    pub fn new(ttl: CacheTtl) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: CacheTtl, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new(CacheTtl::default())
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn lookup(&self, fingerprint: &FileFingerprint) -> Result<Option<CacheEntry>, CacheError> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().await;
            match entries.get(fingerprint) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired_at(now) => return Ok(Some(entry.clone())),
                Some(_) => {}
            }
        }

        // Expired: re-check under the write lock, a concurrent store may
        // have replaced it in between.
        let mut entries = self.entries.write().await;
        match entries.get(fingerprint) {
            Some(entry) if entry.is_expired_at(now) => {
                entries.remove(fingerprint);
                debug!(fingerprint = %fingerprint.short(), "expired entry removed on lookup");
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.clone())),
            None => Ok(None),
        }
    }

    async fn store(&self, entry: NewEntry) -> Result<(), CacheError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        if let Some(existing) = entries.get(&entry.fingerprint) {
            if !existing.is_expired_at(now) {
                debug!(fingerprint = %entry.fingerprint.short(), "live entry exists; store skipped");
                return Ok(());
            }
        }

        let ttl = self.ttl.for_result(entry.result.succeeded);
        entries.insert(
            entry.fingerprint,
            CacheEntry {
                fingerprint: entry.fingerprint,
                file_name: entry.file_name,
                file_kind: entry.file_kind,
                content_type: entry.content_type,
                result: entry.result,
                created_at: now,
                expires_at: add_ttl(now, ttl),
            },
        );
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<u64, CacheError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired_at(now));
        Ok((before - entries.len()) as u64)
    }

    async fn invalidate(&self, fingerprint: &FileFingerprint) -> Result<bool, CacheError> {
        Ok(self.entries.write().await.remove(fingerprint).is_some())
    }

    async fn clear(&self) -> Result<u64, CacheError> {
        let mut entries = self.entries.write().await;
        let removed = entries.len() as u64;
        entries.clear();
        Ok(removed)
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        let mut stats = CacheStats::default();
        for entry in entries.values() {
            if entry.is_expired_at(now) {
                stats.expired += 1;
            } else {
                stats.live += 1;
                if !entry.result.succeeded {
                    stats.negative += 1;
                }
            }
        }
        Ok(stats)
    }
}
