//! Progress-callback trait for per-file processing events.
//!
//! Inject an [`Arc<dyn ProcessingCallback>`] via
//! [`crate::config::ProcessorConfigBuilder::progress_callback`] to observe
//! cache hits, backend calls and batch progress without the library knowing
//! how the host reports them (terminal bar, metrics, audit log).
//!
//! # Example
//!
//! ```rust
//! use filecache::{ProcessingCallback, ProcessorConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct HitCounter {
//!     hits: AtomicUsize,
//! }
//!
//! impl ProcessingCallback for HitCounter {
//!     fn on_cache_hit(&self, _file_name: &str, _fingerprint: &filecache::FileFingerprint) {
//!         self.hits.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(HitCounter { hits: AtomicUsize::new(0) });
//!
//! let config = ProcessorConfig::builder()
//!     .progress_callback(counter as Arc<dyn ProcessingCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::fingerprint::FileFingerprint;
use crate::output::{FileKind, ProcessingResult};
use std::sync::Arc;
use std::time::Duration;

/// Called by the processor as it handles each file.
///
/// Implementations must be `Send + Sync`: `process_batch` handles several
/// files concurrently, so any method may be called from different tasks at
/// the same time. All methods default to no-ops.
pub trait ProcessingCallback: Send + Sync {
    /// Called once before a batch starts.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// A live cache entry answered the request; no backend will run.
    fn on_cache_hit(&self, file_name: &str, fingerprint: &FileFingerprint) {
        let _ = (file_name, fingerprint);
    }

    /// A backend is about to be invoked after a cache miss.
    fn on_backend_start(&self, file_name: &str, kind: FileKind) {
        let _ = (file_name, kind);
    }

    /// A file finished (hit, backend success or backend failure).
    ///
    /// # Arguments
    /// * `from_cache`: whether the result was replayed from the cache
    /// * `elapsed`: wall-clock time spent on this file
    fn on_file_complete(
        &self,
        file_name: &str,
        result: &ProcessingResult,
        from_cache: bool,
        elapsed: Duration,
    ) {
        let _ = (file_name, result, from_cache, elapsed);
    }

    /// The declared content type is not processable; nothing was attempted.
    fn on_file_rejected(&self, file_name: &str, content_type: &str) {
        let _ = (file_name, content_type);
    }

    /// Called once after every file in a batch has a result.
    fn on_batch_complete(&self, total_files: usize, succeeded: usize) {
        let _ = (total_files, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ProcessingCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ProcessorConfig`].
pub type ProgressCallback = Arc<dyn ProcessingCallback>;
