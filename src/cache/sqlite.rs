//! SQLite-backed cache store.
//!
//! One table, `processed_file`, keyed by the hex fingerprint. Timestamps are
//! stored as Unix milliseconds and metadata as a JSON object. The connection
//! sits behind a `std::sync::Mutex`; every statement runs on tokio's blocking
//! pool so callers on the async runtime never wait on disk I/O.
//!
//! If an existing database file turns out to be corrupt on open, it is
//! deleted and recreated empty. Losing cached results only costs a
//! re-extraction.

use super::{add_ttl, CacheEntry, CacheStats, CacheStore, Clock, NewEntry, SystemClock};
use crate::config::CacheTtl;
use crate::error::CacheError;
use crate::fingerprint::FileFingerprint;
use crate::output::{FileKind, Metadata, ProcessingResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS processed_file (
    fingerprint       TEXT PRIMARY KEY,
    file_name         TEXT NOT NULL,
    file_kind         TEXT NOT NULL,
    content_type      TEXT NOT NULL,
    succeeded         INTEGER NOT NULL,
    extracted_content TEXT,
    failure_reason    TEXT,
    metadata          TEXT,
    created_at        INTEGER NOT NULL,
    expires_at        INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_processed_file_expires ON processed_file(expires_at);
";

const SELECT_ENTRY: &str = "
SELECT file_name, file_kind, content_type, succeeded, extracted_content,
       failure_reason, metadata, created_at, expires_at
FROM processed_file WHERE fingerprint = ?1";

// A conflicting row is only overwritten once it has expired.
const UPSERT_ENTRY: &str = "
INSERT INTO processed_file (
    fingerprint, file_name, file_kind, content_type, succeeded,
    extracted_content, failure_reason, metadata, created_at, expires_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT(fingerprint) DO UPDATE SET
    file_name         = excluded.file_name,
    file_kind         = excluded.file_kind,
    content_type      = excluded.content_type,
    succeeded         = excluded.succeeded,
    extracted_content = excluded.extracted_content,
    failure_reason    = excluded.failure_reason,
    metadata          = excluded.metadata,
    created_at        = excluded.created_at,
    expires_at        = excluded.expires_at
WHERE processed_file.expires_at <= excluded.created_at";

/// Durable [`CacheStore`] on a single SQLite file.
pub struct SqliteCacheStore {
    conn: Arc<Mutex<Connection>>,
    ttl: CacheTtl,
    clock: Arc<dyn Clock>,
}

impl SqliteCacheStore {
    /// Open or create the cache database at `path`.
    ///
    /// Parent directories are created as needed. A corrupt file is replaced
    /// by a fresh database.
    pub fn open(path: impl AsRef<Path>, ttl: CacheTtl) -> Result<Self, CacheError> {
        Self::open_with_clock(path, ttl, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        path: impl AsRef<Path>,
        ttl: CacheTtl,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| CacheError::Io(format!("create {}: {e}", parent.display())))?;
        }

        let conn = match open_and_init(path) {
            Ok(conn) => conn,
            Err(CacheError::Corrupt(reason)) => {
                warn!(path = %path.display(), %reason, "cache database corrupt; recreating");
                std::fs::remove_file(path)
                    .map_err(|e| CacheError::Io(format!("remove {}: {e}", path.display())))?;
                open_and_init(path)?
            }
            Err(e) => return Err(e),
        };

        info!(path = %path.display(), "cache database opened");
        Ok(Self::from_connection(conn, ttl, clock))
    }

    /// A private in-memory database, gone when the store is dropped.
    pub fn open_in_memory(ttl: CacheTtl) -> Result<Self, CacheError> {
        Self::in_memory_with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn in_memory_with_clock(ttl: CacheTtl, clock: Arc<dyn Clock>) -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_connection(conn, ttl, clock))
    }

    fn from_connection(conn: Connection, ttl: CacheTtl, clock: Arc<dyn Clock>) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            ttl,
            clock,
        }
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        F: FnOnce(&Connection) -> Result<T, CacheError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(|e| e.into_inner());
            f(&guard)
        })
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
    }
}

fn open_and_init(path: &Path) -> Result<Connection, CacheError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

// ── Row conversion ──────────────────────────────────────────────────────

struct EntryRow {
    file_name: String,
    file_kind: String,
    content_type: String,
    succeeded: bool,
    extracted_content: Option<String>,
    failure_reason: Option<String>,
    metadata: Option<String>,
    created_at: i64,
    expires_at: i64,
}

impl EntryRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            file_name: row.get(0)?,
            file_kind: row.get(1)?,
            content_type: row.get(2)?,
            succeeded: row.get(3)?,
            extracted_content: row.get(4)?,
            failure_reason: row.get(5)?,
            metadata: row.get(6)?,
            created_at: row.get(7)?,
            expires_at: row.get(8)?,
        })
    }

    fn into_entry(self, fingerprint: FileFingerprint) -> Result<CacheEntry, CacheError> {
        let metadata = self
            .metadata
            .as_deref()
            .map(serde_json::from_str::<Metadata>)
            .transpose()?;
        Ok(CacheEntry {
            fingerprint,
            file_name: self.file_name,
            file_kind: FileKind::parse(&self.file_kind),
            content_type: self.content_type,
            result: ProcessingResult {
                succeeded: self.succeeded,
                extracted_content: self.extracted_content,
                failure_reason: self.failure_reason,
                metadata,
            },
            created_at: from_millis(self.created_at)?,
            expires_at: from_millis(self.expires_at)?,
        })
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, CacheError> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| CacheError::Serialization(format!("timestamp out of range: {ms}")))
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn lookup(&self, fingerprint: &FileFingerprint) -> Result<Option<CacheEntry>, CacheError> {
        let fingerprint = *fingerprint;
        let now = self.clock.now().timestamp_millis();
        self.with_conn(move |conn| {
            let key = fingerprint.to_hex();
            let row = conn
                .query_row(SELECT_ENTRY, params![key], EntryRow::from_row)
                .optional()?;
            match row {
                None => Ok(None),
                Some(row) if row.expires_at <= now => {
                    conn.execute(
                        "DELETE FROM processed_file WHERE fingerprint = ?1 AND expires_at <= ?2",
                        params![key, now],
                    )?;
                    debug!(fingerprint = %fingerprint.short(), "expired entry removed on lookup");
                    Ok(None)
                }
                Some(row) => match row.into_entry(fingerprint) {
                    Ok(entry) => Ok(Some(entry)),
                    // Undecodable rows would block the upsert until expiry.
                    Err(CacheError::Serialization(reason)) => {
                        conn.execute(
                            "DELETE FROM processed_file WHERE fingerprint = ?1",
                            params![key],
                        )?;
                        warn!(
                            fingerprint = %fingerprint.short(),
                            %reason,
                            "undecodable entry removed on lookup"
                        );
                        Ok(None)
                    }
                    Err(e) => Err(e),
                },
            }
        })
        .await
    }

    async fn store(&self, entry: NewEntry) -> Result<(), CacheError> {
        let now = self.clock.now();
        let expires_at = add_ttl(now, self.ttl.for_result(entry.result.succeeded));
        let metadata = entry
            .result
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.with_conn(move |conn| {
            let changed = conn.execute(
                UPSERT_ENTRY,
                params![
                    entry.fingerprint.to_hex(),
                    entry.file_name,
                    entry.file_kind.as_str(),
                    entry.content_type,
                    entry.result.succeeded,
                    entry.result.extracted_content,
                    entry.result.failure_reason,
                    metadata,
                    now.timestamp_millis(),
                    expires_at.timestamp_millis(),
                ],
            )?;
            if changed == 0 {
                debug!(fingerprint = %entry.fingerprint.short(), "live entry exists; store skipped");
            }
            Ok(())
        })
        .await
    }

    async fn sweep_expired(&self) -> Result<u64, CacheError> {
        let now = self.clock.now().timestamp_millis();
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM processed_file WHERE expires_at <= ?1",
                params![now],
            )?;
            Ok(removed as u64)
        })
        .await
    }

    async fn invalidate(&self, fingerprint: &FileFingerprint) -> Result<bool, CacheError> {
        let key = fingerprint.to_hex();
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM processed_file WHERE fingerprint = ?1",
                params![key],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn clear(&self) -> Result<u64, CacheError> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM processed_file", [])?;
            Ok(removed as u64)
        })
        .await
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        let now = self.clock.now().timestamp_millis();
        self.with_conn(move |conn| {
            let (live, expired, negative) = conn.query_row(
                "SELECT
                    COALESCE(SUM(CASE WHEN expires_at > ?1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN expires_at <= ?1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN expires_at > ?1 AND succeeded = 0 THEN 1 ELSE 0 END), 0)
                 FROM processed_file",
                params![now],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
            )?;
            Ok(CacheStats {
                live: live as u64,
                expired: expired as u64,
                negative: negative as u64,
            })
        })
        .await
    }
}
