//! The orchestrator: fingerprint, cache lookup, dispatch, store.
//!
//! ```text
//! bytes ──▶ hash ──▶ classify ──▶ lookup ──hit──▶ cached result
//!                       │            │
//!                  unsupported      miss
//!                       │            ▼
//!                       ▼         backend (timeout + panic guard)
//!                    failure         │
//!                                    ▼
//!                              normalise ──▶ store ──▶ result
//! ```
//!
//! [`FileProcessor::process_file`] always returns a [`ProcessingResult`].
//! Cache faults are logged and absorbed; backend faults, timeouts and
//! panics become failed results which are cached like successes.

use crate::backend::{Backends, ExtractionBackend, ImageAnalyzer, PdfExtractor};
use crate::cache::{CacheStore, NewEntry};
use crate::config::ProcessorConfig;
use crate::error::{ExtractionError, FileCacheError};
use crate::fingerprint::hash_content;
use crate::output::{FileInput, FileKind, ProcessingResult};
use crate::progress::ProcessingCallback;
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Caches extraction results by content fingerprint.
///
/// Cheap to share: wrap it in an `Arc` and call it from as many tasks as
/// needed. The processor itself holds no lock; the store serialises its own
/// writes.
pub struct FileProcessor {
    store: Arc<dyn CacheStore>,
    backends: Backends,
    config: ProcessorConfig,
}

impl FileProcessor {
    pub fn new(store: Arc<dyn CacheStore>, backends: Backends, config: ProcessorConfig) -> Self {
        Self {
            store,
            backends,
            config,
        }
    }

    /// Build the default backends (pdfium text extraction, LLM image
    /// analysis) from `config`.
    ///
    /// # Errors
    /// [`FileCacheError::ProviderNotConfigured`] when no vision provider can
    /// be resolved.
    pub fn from_config(config: ProcessorConfig, store: Arc<dyn CacheStore>) -> Result<Self, FileCacheError> {
        let provider = resolve_provider(&config)?;
        let backends = Backends::new(
            Arc::new(PdfExtractor::from_config(&config)),
            Arc::new(ImageAnalyzer::new(provider, &config)),
        );
        Ok(Self::new(store, backends, config))
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    fn callback(&self) -> Option<&dyn ProcessingCallback> {
        self.config.progress_callback.as_deref()
    }

    /// Extract content from one file, replaying a cached result when the
    /// same bytes were processed before.
    ///
    /// `file_name` is informational: it is stored with a new entry but never
    /// affects the cache key. `content_type` selects the backend; anything
    /// other than `application/pdf` or `image/*` is rejected with
    /// `"Unsupported file type: <content_type>"` and neither read from nor
    /// written to the cache.
    pub async fn process_file(&self, bytes: &[u8], file_name: &str, content_type: &str) -> ProcessingResult {
        let start = Instant::now();
        let fingerprint = hash_content(bytes);
        let kind = FileKind::from_content_type(content_type);

        let Some(backend) = self.backends.for_kind(kind) else {
            info!(file_name, content_type, "unsupported file type; not processed");
            if let Some(cb) = self.callback() {
                cb.on_file_rejected(file_name, content_type);
            }
            return ProcessingResult::failure(format!("Unsupported file type: {content_type}"));
        };

        match self.store.lookup(&fingerprint).await {
            Ok(Some(entry)) => {
                info!(
                    file_name,
                    fingerprint = %fingerprint.short(),
                    succeeded = entry.result.succeeded,
                    "cache hit"
                );
                if let Some(cb) = self.callback() {
                    cb.on_cache_hit(file_name, &fingerprint);
                    cb.on_file_complete(file_name, &entry.result, true, start.elapsed());
                }
                return entry.result;
            }
            Ok(None) => debug!(file_name, fingerprint = %fingerprint.short(), "cache miss"),
            Err(e) => warn!(
                file_name,
                fingerprint = %fingerprint.short(),
                error = %e,
                "cache lookup failed; treating as miss"
            ),
        }

        if let Some(cb) = self.callback() {
            cb.on_backend_start(file_name, kind);
        }
        let result = self
            .run_backend(backend.as_ref(), bytes, content_type)
            .await
            .into_cacheable();

        let entry = NewEntry {
            fingerprint,
            file_name: file_name.to_string(),
            file_kind: kind,
            content_type: content_type.to_string(),
            result: result.clone(),
        };
        match self.store.store(entry).await {
            Ok(()) => info!(
                file_name,
                fingerprint = %fingerprint.short(),
                succeeded = result.succeeded,
                "result cached"
            ),
            Err(e) => warn!(
                file_name,
                fingerprint = %fingerprint.short(),
                error = %e,
                "cache store failed; result returned uncached"
            ),
        }

        if let Some(cb) = self.callback() {
            cb.on_file_complete(file_name, &result, false, start.elapsed());
        }
        result
    }

    /// Process several files, at most `config.concurrency` at once.
    ///
    /// Results come back in input order.
    pub async fn process_batch(&self, files: Vec<FileInput>) -> Vec<ProcessingResult> {
        let total = files.len();
        if let Some(cb) = self.callback() {
            cb.on_batch_start(total);
        }

        let results: Vec<ProcessingResult> = stream::iter(
            files
                .iter()
                .map(|f| self.process_file(&f.bytes, &f.file_name, &f.content_type)),
        )
        .buffered(self.config.concurrency)
        .collect()
        .await;

        let succeeded = results.iter().filter(|r| r.succeeded).count();
        info!(total, succeeded, "batch processed");
        if let Some(cb) = self.callback() {
            cb.on_batch_complete(total, succeeded);
        }
        results
    }

    /// Invoke `backend` under the configured timeout, containing panics.
    async fn run_backend(
        &self,
        backend: &dyn ExtractionBackend,
        bytes: &[u8],
        content_type: &str,
    ) -> ProcessingResult {
        let timeout = self.config.backend_timeout();
        let guarded = AssertUnwindSafe(backend.process(bytes, content_type)).catch_unwind();

        match tokio::time::timeout(timeout, guarded).await {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => {
                let detail = panic_message(payload.as_ref());
                error!(backend = backend.name(), %detail, "backend panicked");
                ExtractionError::Panicked {
                    kind: backend.name().to_string(),
                    detail,
                }
                .into()
            }
            Err(_) => {
                warn!(backend = backend.name(), ?timeout, "backend timed out");
                ExtractionError::Timeout {
                    kind: backend.name().to_string(),
                    secs: timeout.as_secs(),
                }
                .into()
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Default model when a provider is named without one.
const DEFAULT_VISION_MODEL: &str = "gpt-4.1-nano";

fn create_vision_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, FileCacheError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        FileCacheError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the vision provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`, `config.vision_model`).
/// 3. **Environment pair** (`FILECACHE_LLM_PROVIDER` + `FILECACHE_VISION_MODEL`),
///    honoured only when both are set.
/// 4. **Auto-detection** via [`ProviderFactory::from_env`], preferring OpenAI
///    when `OPENAI_API_KEY` is present.
pub fn resolve_provider(config: &ProcessorConfig) -> Result<Arc<dyn LLMProvider>, FileCacheError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.vision_model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("FILECACHE_LLM_PROVIDER"),
        std::env::var("FILECACHE_VISION_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.vision_model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| FileCacheError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
