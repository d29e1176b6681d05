//! Extraction backends.
//!
//! A backend turns the raw bytes of one file into a [`ProcessingResult`].
//! There are two:
//!
//! * [`pdf::PdfExtractor`] pulls the embedded text out of a PDF via pdfium.
//! * [`image::ImageAnalyzer`] asks a vision model to describe an image.
//!
//! Backends never return an error channel. A malformed file, an unreachable
//! provider or a missing pdfium library all come back as
//! `ProcessingResult::failure(reason)`, which the processor caches like any
//! other outcome.

pub mod image;
pub mod pdf;

pub use self::image::ImageAnalyzer;
pub use self::pdf::PdfExtractor;

use crate::error::ExtractionError;
use crate::output::{FileKind, ProcessingResult};
use async_trait::async_trait;
use std::sync::Arc;

/// One way of extracting content from a file.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Short name used in logs and timeout messages, e.g. `"pdf"`.
    fn name(&self) -> &str;

    /// Extract content from `bytes`.
    ///
    /// `content_type` is the declared MIME type; image backends forward it
    /// to the provider.
    async fn process(&self, bytes: &[u8], content_type: &str) -> ProcessingResult;
}

/// The backend variants, selected by [`FileKind`].
#[derive(Clone)]
pub struct Backends {
    pub pdf: Arc<dyn ExtractionBackend>,
    pub image: Arc<dyn ExtractionBackend>,
}

impl Backends {
    pub fn new(pdf: Arc<dyn ExtractionBackend>, image: Arc<dyn ExtractionBackend>) -> Self {
        Self { pdf, image }
    }

    /// The backend responsible for `kind`; `None` for unsupported files.
    pub fn for_kind(&self, kind: FileKind) -> Option<&Arc<dyn ExtractionBackend>> {
        match kind {
            FileKind::Pdf => Some(&self.pdf),
            FileKind::Image => Some(&self.image),
            FileKind::Unsupported => None,
        }
    }
}

impl From<ExtractionError> for ProcessingResult {
    fn from(err: ExtractionError) -> Self {
        ProcessingResult::failure(err.to_string())
    }
}
