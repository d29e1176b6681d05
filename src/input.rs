//! Input handling at the upload boundary.
//!
//! Before a file reaches [`crate::processor::FileProcessor`] the host has to
//! turn "something the user attached" into bytes plus a declared content
//! type. This module covers that edge:
//!
//! * [`UploadPolicy`]: the allow-list and per-kind size limits applied when a
//!   file is uploaded.
//! * [`sniff_content_type`]: derive a MIME type from magic bytes when the
//!   caller has none (CLI input, blob downloads without a `Content-Type`).
//! * [`resolve_input`]: read a local path or download a URL into a
//!   [`FileInput`].
//!
//! Nothing here is consulted by the core classification: a file declared as
//! `text/plain` stays unsupported even if its bytes start with `%PDF`.

use crate::error::FileCacheError;
use crate::output::FileInput;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// 5 MiB.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
/// 10 MiB.
pub const MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

/// Used when neither the caller nor the bytes reveal a type.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

const IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/jpg", "image/webp"];
const DOCUMENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

// ── Upload policy ────────────────────────────────────────────────────────

/// Which uploads are accepted, and how large they may be.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub image_types: Vec<String>,
    pub document_types: Vec<String>,
    pub max_image_bytes: usize,
    pub max_document_bytes: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            image_types: IMAGE_TYPES.iter().map(|s| s.to_string()).collect(),
            document_types: DOCUMENT_TYPES.iter().map(|s| s.to_string()).collect(),
            max_image_bytes: MAX_IMAGE_BYTES,
            max_document_bytes: MAX_DOCUMENT_BYTES,
        }
    }
}

impl UploadPolicy {
    /// Validate an upload before it is stored or processed.
    ///
    /// The size limit is checked first: images get `max_image_bytes`, every
    /// other type `max_document_bytes`. Word documents pass this check even
    /// though the processor will report them as unsupported.
    pub fn check(&self, file_name: &str, content_type: &str, size: usize) -> Result<(), FileCacheError> {
        if size == 0 {
            return Err(FileCacheError::EmptyFile {
                file_name: file_name.to_string(),
            });
        }

        let essence = essence(content_type);
        let is_image = self.image_types.iter().any(|t| *t == essence);
        let limit = if is_image {
            self.max_image_bytes
        } else {
            self.max_document_bytes
        };
        if size > limit {
            return Err(FileCacheError::FileTooLarge {
                content_type: essence,
                size,
                limit,
            });
        }

        if !is_image && !self.document_types.iter().any(|t| *t == essence) {
            return Err(FileCacheError::UnsupportedContentType {
                content_type: content_type.to_string(),
            });
        }
        Ok(())
    }
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ── Content sniffing ─────────────────────────────────────────────────────

/// Guess a MIME type from the leading bytes.
///
/// `%PDF` → `application/pdf`; otherwise whatever `image::guess_format`
/// recognises. Returns `None` for anything else.
pub fn sniff_content_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"%PDF") {
        return Some("application/pdf");
    }
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
}

// ── Resolution ───────────────────────────────────────────────────────────

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Turn a local path or an http(s) URL into a [`FileInput`].
///
/// `content_type` overrides detection. Without it, a URL uses the response
/// `Content-Type` header, then sniffing; a local file uses sniffing. Both
/// fall back to [`FALLBACK_CONTENT_TYPE`]. The file name is passed through
/// [`sanitize_file_name`].
pub async fn resolve_input(
    source: &str,
    content_type: Option<&str>,
    timeout_secs: u64,
) -> Result<FileInput, FileCacheError> {
    let mut input = if is_url(source) {
        fetch_url(source, timeout_secs).await?
    } else {
        read_local(Path::new(source)).await?
    };
    if let Some(ct) = content_type {
        input.content_type = ct.to_string();
    }
    input.file_name = sanitize_file_name(&input.file_name);
    Ok(input)
}

async fn read_local(path: &Path) -> Result<FileInput, FileCacheError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| FileCacheError::FileNotReadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let content_type = sniff_content_type(&bytes).unwrap_or(FALLBACK_CONTENT_TYPE);

    debug!(path = %path.display(), content_type, size = bytes.len(), "read local input");
    Ok(FileInput::new(bytes, file_name, content_type))
}

/// Download an attachment, e.g. from blob storage.
pub async fn fetch_url(url: &str, timeout_secs: u64) -> Result<FileInput, FileCacheError> {
    info!("Downloading attachment from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| FileCacheError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            FileCacheError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            FileCacheError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_err)?;

    if !response.status().is_success() {
        return Err(FileCacheError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let header_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|ct| essence(ct) != FALLBACK_CONTENT_TYPE);

    let bytes = response.bytes().await.map_err(map_send_err)?.to_vec();

    let content_type = header_type.unwrap_or_else(|| {
        sniff_content_type(&bytes)
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string()
    });
    let file_name = file_name_from_url(url);

    info!(%file_name, %content_type, size = bytes.len(), "downloaded attachment");
    Ok(FileInput::new(bytes, file_name, content_type))
}

/// Last path segment of the URL, or `"attachment"`.
fn file_name_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty())
        .unwrap_or_else(|| "attachment".to_string())
}
