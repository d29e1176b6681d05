//! Result types produced by the processing pipeline.
//!
//! [`ProcessingResult`] is the sole contract surface consumed by the calling
//! chat pipeline. Every outcome, including infrastructure faults, is folded
//! into this one shape so callers never branch on error types.

use crate::fingerprint::FileFingerprint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Backend-specific attributes (`pageCount`, `size`, `width`, `height`, `error`).
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Metadata key carrying the failure reason on cached negative results.
pub const ERROR_METADATA_KEY: &str = "error";

/// Outcome of extracting or analysing one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl ProcessingResult {
    /// A successful extraction.
    pub fn success(content: impl Into<String>, metadata: Option<Metadata>) -> Self {
        Self {
            succeeded: true,
            extracted_content: Some(content.into()),
            failure_reason: None,
            metadata,
        }
    }

    /// A failed extraction with a human-readable reason.
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            extracted_content: None,
            failure_reason: Some(reason.into()),
            metadata: None,
        }
    }

    /// Normalise a result into the form that is written to the cache.
    ///
    /// Successful results are unchanged. Failures lose any content and carry
    /// `{error: reason}` as their only metadata, so a replayed negative entry
    /// is indistinguishable from the first response.
    pub fn into_cacheable(self) -> Self {
        if self.succeeded {
            return self;
        }
        let reason = self
            .failure_reason
            .unwrap_or_else(|| "Unknown processing error".to_string());
        let mut metadata = Metadata::new();
        metadata.insert(
            ERROR_METADATA_KEY.to_string(),
            serde_json::Value::String(reason.clone()),
        );
        Self {
            succeeded: false,
            extracted_content: None,
            failure_reason: Some(reason),
            metadata: Some(metadata),
        }
    }

    /// Look up a metadata attribute.
    pub fn metadata_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.as_ref().and_then(|m| m.get(key))
    }
}

/// Normalised file kind derived from the declared content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Image,
    #[serde(rename = "unknown")]
    Unsupported,
}

impl FileKind {
    /// Classify a declared content type.
    ///
    /// Matching is case-insensitive and ignores MIME parameters such as
    /// `; charset=binary`. The filename extension is never consulted.
    pub fn from_content_type(content_type: &str) -> Self {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence == "application/pdf" {
            FileKind::Pdf
        } else if essence
            .strip_prefix("image/")
            .is_some_and(|subtype| !subtype.is_empty())
        {
            FileKind::Image
        } else {
            FileKind::Unsupported
        }
    }

    /// Persisted form: `"pdf"`, `"image"` or `"unknown"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Pdf => "pdf",
            FileKind::Image => "image",
            FileKind::Unsupported => "unknown",
        }
    }

    /// Inverse of [`FileKind::as_str`]; unrecognised values map to `Unsupported`.
    pub fn parse(s: &str) -> Self {
        match s {
            "pdf" => FileKind::Pdf,
            "image" => FileKind::Image,
            _ => FileKind::Unsupported,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file submitted to [`crate::processor::FileProcessor::process_batch`].
#[derive(Debug, Clone)]
pub struct FileInput {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

impl FileInput {
    pub fn new(
        bytes: impl Into<Vec<u8>>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: file_name.into(),
            content_type: content_type.into(),
        }
    }
}

/// A processed file together with its fingerprint, as reported by the CLI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedFile {
    pub file_name: String,
    pub content_type: String,
    pub fingerprint: FileFingerprint,
    pub result: ProcessingResult,
}
