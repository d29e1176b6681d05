//! # filecache
//!
//! Content-addressed extraction cache for chat attachments.
//!
//! ## Why this crate?
//!
//! Users attach the same PDF or screenshot to conversation after
//! conversation. Extracting a PDF's text is CPU-bound and describing an
//! image means a paid, multi-second vision-model call. This crate keys every
//! result on the SHA-256 of the file's bytes, so identical content is
//! processed once no matter what it is called or who uploads it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bytes + name + content type
//!  │
//!  ├─ 1. Hash      SHA-256 fingerprint of the raw bytes
//!  ├─ 2. Classify  application/pdf → PDF, image/* → image, else unsupported
//!  ├─ 3. Lookup    live cache entry? return it, no backend call
//!  ├─ 4. Extract   pdfium text extraction / vision-model description
//!  ├─ 5. Store     success or normalised failure, with a TTL
//!  └─ 6. Return    ProcessingResult
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use filecache::{FileProcessor, ProcessorConfig, SqliteCacheStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Vision provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ProcessorConfig::default();
//!     let store = Arc::new(SqliteCacheStore::open("filecache.db", config.cache_ttl())?);
//!     let processor = FileProcessor::from_config(config, store)?;
//!
//!     let bytes = std::fs::read("report.pdf")?;
//!     let result = processor.process_file(&bytes, "report.pdf", "application/pdf").await;
//!     println!("{}", filecache::attachment_context("report.pdf", &result));
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `filecache` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! filecache = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod input;
pub mod output;
pub mod postprocess;
pub mod processor;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{Backends, ExtractionBackend, ImageAnalyzer, PdfExtractor};
pub use cache::{
    spawn_sweeper, CacheEntry, CacheStats, CacheStore, Clock, ManualClock, MemoryCacheStore,
    NewEntry, SqliteCacheStore, SystemClock,
};
pub use config::{CacheTtl, ProcessorConfig, ProcessorConfigBuilder};
pub use error::{CacheError, ExtractionError, FileCacheError};
pub use fingerprint::{hash_content, FileFingerprint};
pub use input::{resolve_input, sniff_content_type, UploadPolicy};
pub use output::{FileInput, FileKind, Metadata, ProcessedFile, ProcessingResult};
pub use processor::FileProcessor;
pub use progress::{NoopProgressCallback, ProcessingCallback, ProgressCallback};
pub use prompts::attachment_context;
