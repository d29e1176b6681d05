//! PDF text extraction via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and parses synchronously. Extraction runs on tokio's blocking pool
//! so a large document never stalls the async worker threads.
//!
//! ## Library binding
//!
//! pdfium is bound per call: from the configured directory when one is set,
//! otherwise from the working directory and then the system library path.
//! A missing library is an extraction failure for that file, not a panic.

use super::ExtractionBackend;
use crate::config::ProcessorConfig;
use crate::error::ExtractionError;
use crate::output::{Metadata, ProcessingResult};
use crate::postprocess::normalise_text;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extracts embedded text from PDF documents.
#[derive(Debug, Clone, Default)]
pub struct PdfExtractor {
    library_dir: Option<PathBuf>,
}

impl PdfExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind pdfium from `dir` instead of the default search locations.
    pub fn with_library_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: Some(dir.into()),
        }
    }

    pub fn from_config(config: &ProcessorConfig) -> Self {
        Self {
            library_dir: config.pdfium_library_dir.clone(),
        }
    }

    async fn extract(&self, bytes: &[u8]) -> Result<ProcessingResult, ExtractionError> {
        check_magic(bytes)?;

        let owned = bytes.to_vec();
        let library_dir = self.library_dir.clone();
        let extracted = tokio::task::spawn_blocking(move || {
            extract_blocking(&owned, library_dir.as_deref())
        })
        .await
        .map_err(|e| ExtractionError::Panicked {
            kind: "pdf".to_string(),
            detail: e.to_string(),
        })??;

        let text = normalise_text(&extracted.text);
        info!(
            pages = extracted.page_count,
            chars = text.len(),
            "PDF text extracted"
        );

        let mut metadata = Metadata::new();
        metadata.insert("pageCount".into(), extracted.page_count.into());
        metadata.insert("size".into(), bytes.len().into());
        if let Some(title) = extracted.title {
            metadata.insert("title".into(), title.into());
        }
        if let Some(author) = extracted.author {
            metadata.insert("author".into(), author.into());
        }

        Ok(ProcessingResult::success(text, Some(metadata)))
    }
}

#[async_trait]
impl ExtractionBackend for PdfExtractor {
    fn name(&self) -> &str {
        "pdf"
    }

    async fn process(&self, bytes: &[u8], _content_type: &str) -> ProcessingResult {
        match self.extract(bytes).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "PDF extraction failed");
                e.into()
            }
        }
    }
}

/// Reject anything that does not start with `%PDF` before pdfium sees it.
fn check_magic(bytes: &[u8]) -> Result<(), ExtractionError> {
    if bytes.starts_with(b"%PDF") {
        Ok(())
    } else {
        Err(ExtractionError::NotAPdf {
            magic: bytes.iter().take(4).copied().collect(),
        })
    }
}

struct ExtractedPdf {
    page_count: usize,
    text: String,
    title: Option<String>,
    author: Option<String>,
}

fn bind_pdfium(library_dir: Option<&Path>) -> Result<Pdfium, ExtractionError> {
    let bindings = match library_dir {
        Some(dir) => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| ExtractionError::PdfiumUnavailable(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of text extraction.
fn extract_blocking(bytes: &[u8], library_dir: Option<&Path>) -> Result<ExtractedPdf, ExtractionError> {
    let pdfium = bind_pdfium(library_dir)?;

    let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
        let err_str = format!("{e:?}");
        if err_str.contains("Password") || err_str.contains("password") {
            ExtractionError::PasswordRequired
        } else {
            ExtractionError::CorruptPdf { detail: err_str }
        }
    })?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata
            .get(tag)
            .map(|t| t.value().trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let pages = document.pages();
    let page_count = pages.len() as usize;
    debug!("PDF loaded: {} pages", page_count);

    let mut page_texts = Vec::with_capacity(page_count);
    for (idx, page) in pages.iter().enumerate() {
        match page.text() {
            Ok(text) => page_texts.push(text.all()),
            Err(e) => {
                warn!("Page {}: text layer unreadable ({:?}); skipped", idx + 1, e);
                page_texts.push(String::new());
            }
        }
    }

    Ok(ExtractedPdf {
        page_count,
        text: page_texts.join("\n\n"),
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
    })
}
