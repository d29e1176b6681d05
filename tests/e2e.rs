//! End-to-end tests with the real backends.
//!
//! The PDF test needs a pdfium shared library (system path, working
//! directory or `FILECACHE_PDFIUM_DIR`); the image test makes a live vision
//! call. Both are gated behind the `E2E_ENABLED` environment variable so
//! they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 LD_LIBRARY_PATH=. cargo test --test e2e -- --nocapture

use filecache::{
    CacheStore, FileProcessor, ImageAnalyzer, PdfExtractor, ProcessorConfig, SqliteCacheStore,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

macro_rules! e2e_skip_unless_enabled {
    () => {
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    };
}

/// One page, one line of Helvetica: "Hello". No xref table; pdfium rebuilds it.
const HELLO_PDF: &[u8] = b"%PDF-1.4
1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj
2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj
3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 200 200] /Contents 4 0 R
  /Resources << /Font << /F1 5 0 R >> >> >> endobj
4 0 obj << /Length 36 >> stream
BT /F1 24 Tf 20 100 Td (Hello) Tj ET
endstream endobj
5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj
trailer << /Root 1 0 R >>
%%EOF
";

fn pdf_extractor() -> PdfExtractor {
    match std::env::var("FILECACHE_PDFIUM_DIR") {
        Ok(dir) => PdfExtractor::with_library_dir(dir),
        Err(_) => PdfExtractor::new(),
    }
}

fn red_square_png() -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 64, Rgba([220, 20, 20, 255])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode png");
    buf
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_pdf_text_extraction() {
    e2e_skip_unless_enabled!();

    use filecache::ExtractionBackend;
    let result = pdf_extractor().process(HELLO_PDF, "application/pdf").await;

    assert!(result.succeeded, "extraction failed: {:?}", result.failure_reason);
    assert_eq!(result.extracted_content.as_deref(), Some("Hello"));
    assert_eq!(result.metadata_value("pageCount"), Some(&serde_json::json!(1)));
    assert_eq!(
        result.metadata_value("size"),
        Some(&serde_json::json!(HELLO_PDF.len()))
    );
}

#[tokio::test]
async fn test_pdf_roundtrip_through_sqlite() {
    e2e_skip_unless_enabled!();

    let dir = tempfile::tempdir().unwrap();
    let config = ProcessorConfig::default();
    let store: Arc<dyn CacheStore> =
        Arc::new(SqliteCacheStore::open(dir.path().join("e2e.db"), config.cache_ttl()).unwrap());
    let pdf: Arc<dyn filecache::ExtractionBackend> = Arc::new(pdf_extractor());
    // No image is submitted; the PDF backend fills the slot.
    let processor = FileProcessor::new(
        store.clone(),
        filecache::Backends::new(pdf.clone(), pdf),
        config,
    );

    let first = processor
        .process_file(HELLO_PDF, "hello.pdf", "application/pdf")
        .await;
    let second = processor
        .process_file(HELLO_PDF, "hello-again.pdf", "application/pdf")
        .await;

    assert!(first.succeeded, "extraction failed: {:?}", first.failure_reason);
    assert_eq!(first, second);
    assert_eq!(store.stats().await.unwrap().live, 1);
}

#[tokio::test]
async fn test_image_description_live() {
    e2e_skip_unless_enabled!();

    let config = ProcessorConfig::default();
    let provider = match filecache::processor::resolve_provider(&config) {
        Ok(p) => p,
        Err(e) => {
            println!("SKIP: no vision provider: {e}");
            return;
        }
    };

    use filecache::ExtractionBackend;
    let analyzer = ImageAnalyzer::new(provider, &config);
    let png = red_square_png();
    let result = analyzer.process(&png, "image/png").await;

    assert!(result.succeeded, "analysis failed: {:?}", result.failure_reason);
    let description = result.extracted_content.as_ref().unwrap().to_lowercase();
    assert!(description.contains("red"), "unexpected description: {description}");
    assert_eq!(result.metadata_value("width"), Some(&serde_json::json!(64)));
}
