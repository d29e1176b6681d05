//! Error types for the filecache library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`FileCacheError`] (**fatal**): the host cannot set the pipeline up at all
//!   (bad configuration, no vision provider, cache database unusable, upload
//!   rejected at the boundary). Returned as `Err(FileCacheError)` from
//!   constructors and helpers, never from
//!   [`crate::processor::FileProcessor::process_file`].
//!
//! * [`CacheError`]: a fault inside a [`crate::cache::CacheStore`]. The
//!   processor treats a failed lookup as a miss and a failed write as
//!   "log and continue"; the cache is an optimisation, not a dependency.
//!
//! * [`ExtractionError`] (**non-fatal**): a backend could not produce content
//!   for one file. Rendered into [`crate::output::ProcessingResult::failure_reason`]
//!   and cached as a negative result.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the filecache library.
#[derive(Debug, Error)]
pub enum FileCacheError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The declared content type is not on the upload allow-list.
    #[error("File type not supported: '{content_type}'. Supported formats: JPEG, PNG, WebP, PDF, DOC, DOCX")]
    UnsupportedContentType { content_type: String },

    /// The upload exceeds the size limit for its kind.
    #[error("File size too large: {size} bytes (limit {limit} bytes for {content_type})")]
    FileTooLarge {
        content_type: String,
        size: usize,
        limit: usize,
    },

    /// The upload is empty.
    #[error("File '{file_name}' is empty")]
    EmptyFile { file_name: String },

    /// A local input path does not exist or cannot be read.
    #[error("Cannot read '{path}': {reason}")]
    FileNotReadable { path: PathBuf, reason: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// A fingerprint string was not 64 hex characters.
    #[error("Invalid fingerprint '{input}': expected 64 hexadecimal characters")]
    InvalidFingerprint { input: String },

    // ── Provider errors ───────────────────────────────────────────────────
    /// The configured vision provider is not initialised (missing API key etc.).
    #[error("Vision provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Cache errors ──────────────────────────────────────────────────────
    /// The cache database could not be opened or initialised.
    #[error("Cache unavailable: {0}")]
    Cache(#[from] CacheError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error type for cache store operations.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("database error: {0}")]
    Database(String),

    #[error("cache database corrupt: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The blocking worker running a statement panicked or was cancelled.
    #[error("cache task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for CacheError {
    fn from(e: rusqlite::Error) -> Self {
        let msg = e.to_string();
        if msg.contains("corrupt") || msg.contains("CORRUPT") || msg.contains("not a database") {
            CacheError::Corrupt(msg)
        } else {
            CacheError::Database(msg)
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

/// A non-fatal extraction failure for a single file.
///
/// Backends never propagate this; they render it into a failed
/// [`crate::output::ProcessingResult`] so the orchestrator and callers only
/// ever see one result shape.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ExtractionError {
    /// The bytes do not start with the `%PDF` magic.
    #[error("File is not a valid PDF (first bytes: {magic:?})")]
    NotAPdf { magic: Vec<u8> },

    /// pdfium could not parse the document.
    #[error("PDF is corrupt or unreadable: {detail}")]
    CorruptPdf { detail: String },

    /// PDF requires a password.
    #[error("PDF is encrypted and requires a password")]
    PasswordRequired,

    /// No pdfium library could be bound.
    #[error("PDF engine unavailable: {0}")]
    PdfiumUnavailable(String),

    /// Vision call failed after retries.
    #[error("Image analysis failed after {retries} retries: {detail}")]
    VisionFailed { retries: u32, detail: String },

    /// Backend call exceeded the configured timeout.
    #[error("{kind} processing timed out after {secs}s")]
    Timeout { kind: String, secs: u64 },

    /// Backend panicked; the panic was contained.
    #[error("{kind} processing panicked: {detail}")]
    Panicked { kind: String, detail: String },
}
