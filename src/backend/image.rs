//! Image analysis: describe an image with a vision-capable LLM.
//!
//! The bytes are sent as-is (base64, declared MIME type) together with a
//! fixed instruction from [`crate::prompts`]; the reply is cleaned by
//! [`crate::postprocess::clean_description`] and becomes the extracted
//! content.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^attempt`)
//! spreads retries out: with 500 ms base and 2 retries the waits are
//! 500 ms then 1 s.
//!
//! An empty reply is not retried. It is a successful analysis with empty
//! content, like a PDF without a text layer.

use super::ExtractionBackend;
use crate::config::ProcessorConfig;
use crate::error::ExtractionError;
use crate::output::{Metadata, ProcessingResult};
use crate::postprocess::clean_description;
use crate::prompts::DEFAULT_IMAGE_PROMPT;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Describes images through an [`LLMProvider`].
pub struct ImageAnalyzer {
    provider: Arc<dyn LLMProvider>,
    prompt: String,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl ImageAnalyzer {
    /// Analyzer with the prompt and sampling settings from `config`.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ProcessorConfig) -> Self {
        Self {
            provider,
            prompt: config
                .image_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_IMAGE_PROMPT.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    fn build_messages(&self, bytes: &[u8], content_type: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::user_with_images(
            self.prompt.as_str(),
            vec![encode_image(bytes, content_type)],
        )]
    }

    fn build_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }

    async fn analyze(&self, bytes: &[u8], content_type: &str) -> Result<String, ExtractionError> {
        let start = Instant::now();
        let messages = self.build_messages(bytes, content_type);
        let options = self.build_options();

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "Image analysis: retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "Image analysis: {} input tokens, {} output tokens, {:?}",
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    let description = clean_description(&response.content);
                    if description.is_empty() {
                        debug!("Image analysis: provider returned no description");
                    }
                    return Ok(description);
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    warn!("Image analysis: attempt {} failed: {}", attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(ExtractionError::VisionFailed {
            retries: self.max_retries,
            detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

#[async_trait]
impl ExtractionBackend for ImageAnalyzer {
    fn name(&self) -> &str {
        "image"
    }

    async fn process(&self, bytes: &[u8], content_type: &str) -> ProcessingResult {
        match self.analyze(bytes, content_type).await {
            Ok(description) => ProcessingResult::success(description, Some(image_metadata(bytes))),
            Err(e) => {
                warn!(error = %e, "Image analysis failed");
                e.into()
            }
        }
    }
}

/// Wait before retry `attempt` (1-based): `base * 2^(attempt - 1)`, saturating.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Wrap raw image bytes for the multimodal request body.
///
/// `detail: "high"` lets GPT-4-class models tile the image at full
/// resolution so small print stays legible.
fn encode_image(bytes: &[u8], content_type: &str) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, content_type).with_detail("high")
}

/// `size`, plus `width`/`height` when the header can be decoded.
fn image_metadata(bytes: &[u8]) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("size".into(), bytes.len().into());
    if let Some((width, height)) = dimensions(bytes) {
        metadata.insert("width".into(), width.into());
        metadata.insert("height".into(), height.into());
    }
    metadata
}

fn dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
