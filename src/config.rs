//! Configuration for the file-processing pipeline.
//!
//! Every knob lives in [`ProcessorConfig`], built via its
//! [`ProcessorConfigBuilder`]. One struct covers the cache lifetimes, the
//! backend timeout, the vision provider and the batch concurrency, so a host
//! can share it across tasks and log it in one line.

use crate::error::FileCacheError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Seven days, the lifetime of a cache entry.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Upper bound for vision retries per image.
pub const MAX_RETRIES: u32 = 10;

/// Configuration for a [`crate::processor::FileProcessor`].
///
/// Built via [`ProcessorConfig::builder()`] or using
/// [`ProcessorConfig::default()`].
///
/// # Example
/// ```rust
/// use filecache::ProcessorConfig;
///
/// let config = ProcessorConfig::builder()
///     .backend_timeout_secs(60)
///     .vision_model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.backend_timeout_secs, 60);
/// ```
#[derive(Clone)]
pub struct ProcessorConfig {
    /// Lifetime of a successful cache entry in seconds. Default: 7 days.
    pub cache_ttl_secs: u64,

    /// Lifetime of a cached extraction failure in seconds. Default: 7 days.
    ///
    /// A shorter value lets a transient backend outage recover sooner at the
    /// cost of re-attempting deterministically broken files more often.
    pub negative_ttl_secs: u64,

    /// Per-file backend timeout in seconds. Default: 120.
    ///
    /// Vision calls routinely take several seconds and adversarial PDFs can
    /// keep a parser busy indefinitely; on expiry the file gets a failed
    /// result instead of a hung request.
    pub backend_timeout_secs: u64,

    /// Files processed at once by `process_batch`. Default: 4.
    pub concurrency: usize,

    /// Vision model identifier, e.g. "gpt-4.1-nano". If None, uses provider default.
    pub vision_model: Option<String>,

    /// Vision provider name (e.g. "openai", "anthropic", "gemini", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed vision provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Custom image-analysis instruction. If None, uses the built-in default.
    pub image_prompt: Option<String>,

    /// Sampling temperature for image analysis. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the vision model may generate per image. Default: 2048.
    pub max_tokens: usize,

    /// Retry attempts on a failed vision call. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Directory holding the pdfium shared library. If None, binds the system library.
    pub pdfium_library_dir: Option<PathBuf>,

    /// Optional observer for per-file events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            negative_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            backend_timeout_secs: 120,
            concurrency: 4,
            vision_model: None,
            provider_name: None,
            provider: None,
            image_prompt: None,
            temperature: 0.1,
            max_tokens: 2048,
            max_retries: 2,
            retry_backoff_ms: 500,
            pdfium_library_dir: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ProcessorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorConfig")
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("negative_ttl_secs", &self.negative_ttl_secs)
            .field("backend_timeout_secs", &self.backend_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("vision_model", &self.vision_model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("pdfium_library_dir", &self.pdfium_library_dir)
            .finish()
    }
}

impl ProcessorConfig {
    /// Create a new builder for `ProcessorConfig`.
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder {
            config: Self::default(),
            negative_ttl_set: false,
        }
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    /// Entry lifetimes handed to a cache store.
    pub fn cache_ttl(&self) -> CacheTtl {
        CacheTtl {
            positive: Duration::from_secs(self.cache_ttl_secs),
            negative: Duration::from_secs(self.negative_ttl_secs),
        }
    }
}

/// Builder for [`ProcessorConfig`].
#[derive(Debug)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
    negative_ttl_set: bool,
}

impl ProcessorConfigBuilder {
    pub fn cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.cache_ttl_secs = secs;
        self
    }

    /// Lifetime of cached failures. Unless set, follows `cache_ttl_secs`.
    pub fn negative_ttl_secs(mut self, secs: u64) -> Self {
        self.config.negative_ttl_secs = secs;
        self.negative_ttl_set = true;
        self
    }

    pub fn backend_timeout_secs(mut self, secs: u64) -> Self {
        self.config.backend_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision_model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn image_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.image_prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    /// Capped at [`MAX_RETRIES`].
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn pdfium_library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_dir = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<ProcessorConfig, FileCacheError> {
        if !self.negative_ttl_set {
            self.config.negative_ttl_secs = self.config.cache_ttl_secs;
        }
        let c = &self.config;
        if c.cache_ttl_secs == 0 {
            return Err(FileCacheError::InvalidConfig(
                "Cache TTL must be ≥ 1 second".into(),
            ));
        }
        if c.negative_ttl_secs > c.cache_ttl_secs {
            return Err(FileCacheError::InvalidConfig(format!(
                "Negative TTL ({}s) must not exceed the cache TTL ({}s)",
                c.negative_ttl_secs, c.cache_ttl_secs
            )));
        }
        if c.backend_timeout_secs == 0 {
            return Err(FileCacheError::InvalidConfig(
                "Backend timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(FileCacheError::InvalidConfig(
                "Max tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Entry lifetimes applied by a cache store when writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    /// Lifetime of successful results.
    pub positive: Duration,
    /// Lifetime of cached failures.
    pub negative: Duration,
}

impl CacheTtl {
    /// Same lifetime for successes and failures.
    pub fn uniform(ttl: Duration) -> Self {
        Self {
            positive: ttl,
            negative: ttl,
        }
    }

    pub fn for_result(&self, succeeded: bool) -> Duration {
        if succeeded {
            self.positive
        } else {
            self.negative
        }
    }
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self::uniform(Duration::from_secs(DEFAULT_CACHE_TTL_SECS))
    }
}
