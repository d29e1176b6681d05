//! Content-addressed result cache.
//!
//! The cache maps a [`FileFingerprint`] to the [`ProcessingResult`] computed
//! for those bytes, plus the name/kind/content type seen on first upload.
//!
//! * [`sqlite`]: durable store on a single SQLite file (bundled `rusqlite`).
//! * [`memory`]: process-local store for tests and hosts without persistence.
//!
//! # Expiration
//!
//! Every entry expires `ttl` after it was written. Expiry is enforced lazily:
//! a lookup that finds an entry with `expires_at <= now` deletes it and
//! reports a miss, so an expired result is never served even if no sweep ever
//! runs. [`spawn_sweeper`] adds a periodic bulk delete on top of that.
//!
//! # Failure semantics
//!
//! Store methods return [`CacheError`] on storage faults. The processor never
//! lets those reach its caller: a failed lookup is a miss and a failed write
//! is logged and dropped.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryCacheStore;
pub use sqlite::SqliteCacheStore;

use crate::error::CacheError;
use crate::fingerprint::FileFingerprint;
use crate::output::{FileKind, ProcessingResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A persisted cache record. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub fingerprint: FileFingerprint,
    pub file_name: String,
    pub file_kind: FileKind,
    pub content_type: String,
    pub result: ProcessingResult,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Whether the entry is expired at `now` (`expires_at <= now`).
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Everything a store needs to write a new entry; timestamps are the store's job.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub fingerprint: FileFingerprint,
    pub file_name: String,
    pub file_kind: FileKind,
    pub content_type: String,
    pub result: ProcessingResult,
}

/// Entry counts reported by [`CacheStore::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Entries that would be served by a lookup right now.
    pub live: u64,
    /// Entries past their expiry that no lookup or sweep has removed yet.
    pub expired: u64,
    /// Live entries holding a failed result.
    pub negative: u64,
}

/// Durable fingerprint → result mapping with expiration.
///
/// Implementations serialise internally; callers share one store as
/// `Arc<dyn CacheStore>` across concurrent requests without extra locking.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch the live entry for `fingerprint`.
    ///
    /// An entry with `expires_at <= now` is deleted as part of the lookup and
    /// `Ok(None)` is returned.
    async fn lookup(&self, fingerprint: &FileFingerprint) -> Result<Option<CacheEntry>, CacheError>;

    /// Write a new entry with `created_at = now` and `expires_at = now + ttl`.
    ///
    /// If a live entry for the fingerprint already exists the write is a
    /// no-op: the first stored name, kind and result are kept.
    async fn store(&self, entry: NewEntry) -> Result<(), CacheError>;

    /// Delete every entry with `expires_at <= now`; returns how many went.
    async fn sweep_expired(&self) -> Result<u64, CacheError>;

    /// Delete the entry for `fingerprint` whether or not it has expired.
    async fn invalidate(&self, fingerprint: &FileFingerprint) -> Result<bool, CacheError>;

    /// Delete every entry; returns how many went.
    async fn clear(&self) -> Result<u64, CacheError>;

    async fn stats(&self) -> Result<CacheStats, CacheError>;
}

// ── Clock ────────────────────────────────────────────────────────────────

/// Time source for stores, injectable so expiry is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Add a std duration to a timestamp, saturating at the representable maximum.
pub(crate) fn add_ttl(at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ── Sweeper ──────────────────────────────────────────────────────────────

/// Run [`CacheStore::sweep_expired`] every `interval` until the handle is aborted.
///
/// Sweep failures are logged and the loop keeps going; lookups enforce
/// expiry on their own, so a failing sweeper never causes stale hits.
pub fn spawn_sweeper(store: Arc<dyn CacheStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so the sweep runs
        // one interval after startup.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.sweep_expired().await {
                Ok(0) => debug!("cache sweep: nothing expired"),
                Ok(removed) => info!(removed, "cache sweep removed expired entries"),
                Err(e) => warn!(error = %e, "cache sweep failed"),
            }
        }
    })
}
