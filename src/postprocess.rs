//! Post-processing: deterministic cleanup of extracted text.
//!
//! Two entry points, one per backend:
//!
//! * [`normalise_text`] for text pulled out of PDF pages. pdfium hands back
//!   whatever the producer wrote, including CRLF line endings, runs of blank
//!   lines from layout gaps and invisible formatting characters.
//! * [`clean_description`] for vision-model replies, which additionally get
//!   an outer code fence stripped when the model wraps its answer in one.
//!
//! Every rule is a pure `&str -> String` function and independently tested.
//! Content is never reworded.

use once_cell::sync::Lazy;
use regex::Regex;

/// Clean text extracted from a PDF.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 1
/// 5. Trim leading and trailing blank lines
pub fn normalise_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    trim_blank_edges(&s)
}

/// Clean a vision-model description.
///
/// Same rules as [`normalise_text`], preceded by stripping an outer
/// ```` ``` ```` / ```` ```markdown ```` fence.
pub fn clean_description(input: &str) -> String {
    let s = strip_outer_fence(input);
    normalise_text(&s)
}

// ── Rule: Strip outer code fence ─────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:markdown|md|text)?[ \t]*\r?\n(.*?)\r?\n```\s*$").unwrap()
});

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ──────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").into_owned()
}

// ── Rule 5: Trim blank edges ─────────────────────────────────────────────

fn trim_blank_edges(input: &str) -> String {
    input.trim_matches('\n').to_string()
}
