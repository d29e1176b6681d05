//! Prompt text shared by the pipeline and its callers.
//!
//! The image-analysis instruction lives here so it can be changed (or
//! inspected by tests) without touching retry or error handling in
//! [`crate::backend::image`]. Callers can override it via
//! [`crate::config::ProcessorConfig::image_prompt`].

use crate::output::ProcessingResult;

/// Default instruction sent alongside every analysed image.
pub const DEFAULT_IMAGE_PROMPT: &str = "Please analyze this image in detail. Describe what you see, \
including any text, objects, people, scenes, or important elements. Be thorough and specific in \
your description.";

/// Render a processed attachment as a block for the model-facing conversation.
///
/// Successful results embed the extracted text; failures become an explanatory
/// placeholder so the conversation turn proceeds instead of blocking.
pub fn attachment_context(file_name: &str, result: &ProcessingResult) -> String {
    match (result.succeeded, result.extracted_content.as_deref()) {
        (true, Some(content)) if !content.trim().is_empty() => format!(
            "[Attached file: {file_name}]\n\"\"\"\n{}\n\"\"\"",
            content.trim_end()
        ),
        (true, _) => format!("[Attached file: {file_name} (no extractable content)]"),
        (false, _) => format!(
            "[Attached file: {file_name} (content could not be processed: {})]",
            result
                .failure_reason
                .as_deref()
                .unwrap_or("unknown error")
        ),
    }
}
