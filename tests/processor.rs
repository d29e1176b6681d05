//! Integration tests for `FileProcessor` against both cache stores.
//!
//! Backends are stubs that count invocations, so every test runs offline and
//! without pdfium. Scenarios that depend on time use `ManualClock`.

use async_trait::async_trait;
use filecache::{
    hash_content, Backends, CacheEntry, CacheError, CacheStats, CacheStore, CacheTtl,
    ExtractionBackend, FileFingerprint, FileInput, FileKind, FileProcessor, ManualClock,
    MemoryCacheStore, NewEntry, ProcessingCallback, ProcessingResult, ProcessorConfig,
    SqliteCacheStore,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

const PDF_BYTES: &[u8] = b"%PDF-1.4\n%";
const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3, 4];

/// Backend returning a fixed result and counting calls.
struct StubBackend {
    name: &'static str,
    result: ProcessingResult,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StubBackend {
    fn returning(name: &'static str, result: ProcessingResult) -> Arc<Self> {
        Arc::new(Self {
            name,
            result,
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn slow(name: &'static str, result: ProcessingResult, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            result,
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionBackend for StubBackend {
    fn name(&self) -> &str {
        self.name
    }

    async fn process(&self, _bytes: &[u8], _content_type: &str) -> ProcessingResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone()
    }
}

struct PanickingBackend;

#[async_trait]
impl ExtractionBackend for PanickingBackend {
    fn name(&self) -> &str {
        "pdf"
    }

    async fn process(&self, _bytes: &[u8], _content_type: &str) -> ProcessingResult {
        panic!("parser exploded")
    }
}

/// Store wrapper counting reads and writes.
struct CountingStore {
    inner: Arc<dyn CacheStore>,
    lookups: AtomicUsize,
    stores: AtomicUsize,
}

impl CountingStore {
    fn wrap(inner: Arc<dyn CacheStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            lookups: AtomicUsize::new(0),
            stores: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CacheStore for CountingStore {
    async fn lookup(&self, fingerprint: &FileFingerprint) -> Result<Option<CacheEntry>, CacheError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.lookup(fingerprint).await
    }

    async fn store(&self, entry: NewEntry) -> Result<(), CacheError> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.inner.store(entry).await
    }

    async fn sweep_expired(&self) -> Result<u64, CacheError> {
        self.inner.sweep_expired().await
    }

    async fn invalidate(&self, fingerprint: &FileFingerprint) -> Result<bool, CacheError> {
        self.inner.invalidate(fingerprint).await
    }

    async fn clear(&self) -> Result<u64, CacheError> {
        self.inner.clear().await
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        self.inner.stats().await
    }
}

/// Store whose every operation fails.
struct BrokenStore;

#[async_trait]
impl CacheStore for BrokenStore {
    async fn lookup(&self, _fingerprint: &FileFingerprint) -> Result<Option<CacheEntry>, CacheError> {
        Err(CacheError::Database("disk I/O error".into()))
    }

    async fn store(&self, _entry: NewEntry) -> Result<(), CacheError> {
        Err(CacheError::Database("database is locked".into()))
    }

    async fn sweep_expired(&self) -> Result<u64, CacheError> {
        Err(CacheError::Database("database is locked".into()))
    }

    async fn invalidate(&self, _fingerprint: &FileFingerprint) -> Result<bool, CacheError> {
        Err(CacheError::Database("database is locked".into()))
    }

    async fn clear(&self) -> Result<u64, CacheError> {
        Err(CacheError::Database("database is locked".into()))
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        Err(CacheError::Database("database is locked".into()))
    }
}

fn hello_pdf_result() -> ProcessingResult {
    let mut metadata = filecache::Metadata::new();
    metadata.insert("pageCount".into(), serde_json::json!(1));
    ProcessingResult::success("Hello", Some(metadata))
}

/// Both store implementations, sharing one manual clock.
fn stores(ttl: Duration) -> (Vec<(&'static str, Arc<dyn CacheStore>)>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let ttl = CacheTtl::uniform(ttl);
    let sqlite = SqliteCacheStore::in_memory_with_clock(ttl, clock.clone()).expect("open sqlite");
    let memory = MemoryCacheStore::with_clock(ttl, clock.clone());
    (
        vec![
            ("sqlite", Arc::new(sqlite) as Arc<dyn CacheStore>),
            ("memory", Arc::new(memory) as Arc<dyn CacheStore>),
        ],
        clock,
    )
}

fn processor(
    store: Arc<dyn CacheStore>,
    pdf: Arc<dyn ExtractionBackend>,
    image: Arc<dyn ExtractionBackend>,
) -> FileProcessor {
    FileProcessor::new(store, Backends::new(pdf, image), ProcessorConfig::default())
}

fn unused_image() -> Arc<StubBackend> {
    StubBackend::returning("image", ProcessingResult::success("unused", None))
}

// ── Properties ───────────────────────────────────────────────────────────────

#[test]
fn fingerprint_is_deterministic() {
    let a = hash_content(PDF_BYTES);
    let b = hash_content(&PDF_BYTES.to_vec());
    assert_eq!(a, b);
    // Stable across processes: pinned to the SHA-256 digest of the bytes.
    assert_eq!(
        hash_content(b"abc").to_hex(),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[tokio::test]
async fn cache_hit_skips_backend() {
    let (stores, _clock) = stores(Duration::from_secs(3600));
    for (label, store) in stores {
        store
            .store(NewEntry {
                fingerprint: hash_content(PDF_BYTES),
                file_name: "seed.pdf".into(),
                file_kind: FileKind::Pdf,
                content_type: "application/pdf".into(),
                result: hello_pdf_result(),
            })
            .await
            .unwrap();

        let pdf = StubBackend::returning("pdf", ProcessingResult::success("fresh", None));
        let p = processor(store, pdf.clone(), unused_image());

        let result = p.process_file(PDF_BYTES, "doc.pdf", "application/pdf").await;
        assert_eq!(result, hello_pdf_result(), "[{label}]");
        assert_eq!(pdf.calls(), 0, "[{label}] backend must not run on a hit");
    }
}

#[tokio::test]
async fn expired_entry_is_never_served() {
    let (stores, clock) = stores(Duration::from_secs(60));
    for (label, store) in stores {
        let pdf = StubBackend::returning("pdf", hello_pdf_result());
        let p = processor(store.clone(), pdf.clone(), unused_image());

        p.process_file(PDF_BYTES, "doc.pdf", "application/pdf").await;
        assert_eq!(pdf.calls(), 1, "[{label}]");

        clock.advance(Duration::from_secs(60));
        assert!(
            store.lookup(&hash_content(PDF_BYTES)).await.unwrap().is_none(),
            "[{label}] expired entry returned by lookup"
        );

        p.process_file(PDF_BYTES, "doc.pdf", "application/pdf").await;
        assert_eq!(pdf.calls(), 2, "[{label}] backend must run again after expiry");
    }
}

#[tokio::test]
async fn failures_are_cached_and_replayed() {
    let (stores, _clock) = stores(Duration::from_secs(3600));
    for (label, store) in stores {
        let pdf = StubBackend::returning(
            "pdf",
            ProcessingResult::failure("PDF is corrupt or unreadable: bad xref"),
        );
        let p = processor(store, pdf.clone(), unused_image());

        let first = p.process_file(b"%PDF-broken", "bad.pdf", "application/pdf").await;
        let second = p.process_file(b"%PDF-broken", "bad.pdf", "application/pdf").await;

        assert_eq!(pdf.calls(), 1, "[{label}]");
        assert!(!first.succeeded);
        assert_eq!(first, second, "[{label}] replayed failure differs from the original");
        assert_eq!(
            first.metadata_value("error"),
            Some(&serde_json::json!("PDF is corrupt or unreadable: bad xref"))
        );
        assert!(first.extracted_content.is_none());
    }
}

#[tokio::test]
async fn unsupported_type_touches_neither_cache_nor_backend() {
    let (stores, _clock) = stores(Duration::from_secs(3600));
    for (label, store) in stores {
        let counting = CountingStore::wrap(store);
        let pdf = StubBackend::returning("pdf", hello_pdf_result());
        let image = unused_image();
        let p = processor(counting.clone(), pdf.clone(), image.clone());

        let result = p.process_file(b"just text", "notes.txt", "text/plain").await;

        assert!(!result.succeeded, "[{label}]");
        assert_eq!(
            result.failure_reason.as_deref(),
            Some("Unsupported file type: text/plain")
        );
        assert_eq!(counting.lookups.load(Ordering::SeqCst), 0, "[{label}]");
        assert_eq!(counting.stores.load(Ordering::SeqCst), 0, "[{label}]");
        assert_eq!(pdf.calls() + image.calls(), 0, "[{label}]");
    }
}

#[tokio::test]
async fn store_failure_still_returns_result() {
    let pdf = StubBackend::returning("pdf", hello_pdf_result());
    let p = processor(Arc::new(BrokenStore), pdf.clone(), unused_image());

    let first = p.process_file(PDF_BYTES, "doc.pdf", "application/pdf").await;
    let second = p.process_file(PDF_BYTES, "doc.pdf", "application/pdf").await;

    assert_eq!(first, hello_pdf_result());
    assert_eq!(second, hello_pdf_result());
    // Lookup faults are misses, so nothing was ever served from cache.
    assert_eq!(pdf.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn backend_timeout_becomes_cached_failure() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::default());
    let image = StubBackend::slow(
        "image",
        ProcessingResult::success("too late", None),
        Duration::from_secs(3600),
    );
    let config = ProcessorConfig::builder().backend_timeout_secs(5).build().unwrap();
    let p = FileProcessor::new(
        store.clone(),
        Backends::new(unused_image(), image.clone()),
        config,
    );

    let result = p.process_file(PNG_BYTES, "slow.png", "image/png").await;
    assert!(!result.succeeded);
    assert_eq!(
        result.failure_reason.as_deref(),
        Some("image processing timed out after 5s")
    );

    let cached = store.lookup(&hash_content(PNG_BYTES)).await.unwrap().unwrap();
    assert_eq!(cached.result, result);
    assert_eq!(image.calls(), 1);
}

#[tokio::test]
async fn backend_panic_becomes_failure() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::default());
    let p = processor(store, Arc::new(PanickingBackend), unused_image());

    let result = p.process_file(PDF_BYTES, "boom.pdf", "application/pdf").await;
    assert!(!result.succeeded);
    let reason = result.failure_reason.unwrap();
    assert!(reason.contains("panicked"), "got: {reason}");
    assert!(reason.contains("parser exploded"), "got: {reason}");
}

#[tokio::test]
async fn batch_preserves_input_order() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::default());
    let pdf = StubBackend::slow("pdf", hello_pdf_result(), Duration::from_millis(30));
    let image = StubBackend::returning("image", ProcessingResult::success("a red square", None));
    let p = processor(store, pdf.clone(), image.clone());

    let results = p
        .process_batch(vec![
            FileInput::new(PDF_BYTES, "doc.pdf", "application/pdf"),
            FileInput::new(PNG_BYTES, "pic.png", "image/png"),
            FileInput::new(b"x".to_vec(), "a.docx", "application/msword"),
        ])
        .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0], hello_pdf_result());
    assert_eq!(results[1].extracted_content.as_deref(), Some("a red square"));
    assert!(!results[2].succeeded);
    assert_eq!(pdf.calls(), 1);
    assert_eq!(image.calls(), 1);
}

#[tokio::test]
async fn concurrent_cold_misses_leave_one_entry() {
    let (stores, _clock) = stores(Duration::from_secs(3600));
    for (label, store) in stores {
        let pdf = StubBackend::slow("pdf", hello_pdf_result(), Duration::from_millis(50));
        let p = processor(store.clone(), pdf.clone(), unused_image());

        let (first, second) = tokio::join!(
            p.process_file(PDF_BYTES, "a.pdf", "application/pdf"),
            p.process_file(PDF_BYTES, "b.pdf", "application/pdf"),
        );

        assert_eq!(first, second, "{label}");
        assert_eq!(first, hello_pdf_result(), "{label}");
        assert!(pdf.calls() <= 2, "{label}: {} calls", pdf.calls());
        assert_eq!(store.stats().await.unwrap().live, 1, "{label}");

        let entry = store.lookup(&hash_content(PDF_BYTES)).await.unwrap().unwrap();
        assert_eq!(entry.result, hello_pdf_result(), "{label}");
    }
}

#[derive(Default)]
struct EventLog {
    batch_starts: AtomicUsize,
    hits: AtomicUsize,
    backend_starts: AtomicUsize,
    completes: AtomicUsize,
    rejected: AtomicUsize,
    batch_completes: AtomicUsize,
}

impl ProcessingCallback for EventLog {
    fn on_batch_start(&self, _total_files: usize) {
        self.batch_starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_cache_hit(&self, _file_name: &str, _fingerprint: &FileFingerprint) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }

    fn on_backend_start(&self, _file_name: &str, _kind: FileKind) {
        self.backend_starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_file_complete(
        &self,
        _file_name: &str,
        _result: &ProcessingResult,
        _from_cache: bool,
        _elapsed: Duration,
    ) {
        self.completes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_file_rejected(&self, _file_name: &str, _content_type: &str) {
        self.rejected.fetch_add(1, Ordering::SeqCst);
    }

    fn on_batch_complete(&self, _total_files: usize, _succeeded: usize) {
        self.batch_completes.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn progress_callback_sees_hits_and_misses() {
    let log = Arc::new(EventLog::default());
    let config = ProcessorConfig::builder()
        .progress_callback(log.clone() as Arc<dyn ProcessingCallback>)
        .build()
        .unwrap();
    let p = FileProcessor::new(
        Arc::new(MemoryCacheStore::default()),
        Backends::new(
            StubBackend::returning("pdf", hello_pdf_result()),
            unused_image(),
        ),
        config,
    );

    p.process_batch(vec![
        FileInput::new(PDF_BYTES, "a.pdf", "application/pdf"),
        FileInput::new(b"plain".to_vec(), "a.txt", "text/plain"),
    ])
    .await;
    p.process_file(PDF_BYTES, "again.pdf", "application/pdf").await;

    assert_eq!(log.batch_starts.load(Ordering::SeqCst), 1);
    assert_eq!(log.backend_starts.load(Ordering::SeqCst), 1);
    assert_eq!(log.hits.load(Ordering::SeqCst), 1);
    assert_eq!(log.completes.load(Ordering::SeqCst), 2);
    assert_eq!(log.rejected.load(Ordering::SeqCst), 1);
    assert_eq!(log.batch_completes.load(Ordering::SeqCst), 1);
}

// ── End-to-end scenarios ─────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_pdf_result_cached_and_replayed() {
    let (stores, _clock) = stores(Duration::from_secs(3600));
    for (label, store) in stores {
        assert_eq!(PDF_BYTES.len(), 10);
        let pdf = StubBackend::returning("pdf", hello_pdf_result());
        let p = processor(store.clone(), pdf.clone(), unused_image());

        let first = p.process_file(PDF_BYTES, "doc.pdf", "application/pdf").await;
        assert_eq!(first, hello_pdf_result(), "[{label}]");

        let cached = store.lookup(&hash_content(PDF_BYTES)).await.unwrap().unwrap();
        assert_eq!(cached.result, hello_pdf_result(), "[{label}]");
        assert_eq!(cached.file_kind, FileKind::Pdf);

        let second = p.process_file(PDF_BYTES, "doc.pdf", "application/pdf").await;
        assert_eq!(second, first, "[{label}]");
        assert_eq!(pdf.calls(), 1, "[{label}]");
    }
}

#[tokio::test]
async fn scenario_filename_does_not_affect_key() {
    let (stores, _clock) = stores(Duration::from_secs(3600));
    for (label, store) in stores {
        let pdf = StubBackend::returning("pdf", hello_pdf_result());
        let p = processor(store.clone(), pdf.clone(), unused_image());

        p.process_file(PDF_BYTES, "original.pdf", "application/pdf").await;
        let renamed = p.process_file(PDF_BYTES, "renamed copy.pdf", "application/pdf").await;

        assert_eq!(renamed, hello_pdf_result(), "[{label}]");
        assert_eq!(pdf.calls(), 1, "[{label}] rename caused a miss");
        let entry = store.lookup(&hash_content(PDF_BYTES)).await.unwrap().unwrap();
        assert_eq!(entry.file_name, "original.pdf", "[{label}] first name is kept");
    }
}

#[tokio::test]
async fn scenario_image_description_cached() {
    let (stores, _clock) = stores(Duration::from_secs(3600));
    for (label, store) in stores {
        let image = StubBackend::returning(
            "image",
            ProcessingResult::success("A red square on a white background.", None),
        );
        let p = processor(
            store,
            StubBackend::returning("pdf", hello_pdf_result()),
            image.clone(),
        );

        let first = p.process_file(PNG_BYTES, "shot.png", "image/png").await;
        let second = p.process_file(PNG_BYTES, "shot.png", "image/png").await;

        assert_eq!(
            first.extracted_content.as_deref(),
            Some("A red square on a white background."),
            "[{label}]"
        );
        assert_eq!(first, second, "[{label}]");
        assert_eq!(image.calls(), 1, "[{label}]");
    }
}

#[tokio::test]
async fn scenario_word_document_not_cached() {
    let (stores, _clock) = stores(Duration::from_secs(3600));
    for (label, store) in stores {
        let p = processor(
            store.clone(),
            StubBackend::returning("pdf", hello_pdf_result()),
            unused_image(),
        );
        let bytes = b"\xD0\xCF\x11\xE0 legacy word";

        let result = p.process_file(bytes, "letter.doc", "application/msword").await;

        assert!(!result.succeeded, "[{label}]");
        assert!(
            result.failure_reason.as_deref().unwrap().contains("Unsupported file type"),
            "[{label}]"
        );
        assert!(
            store.lookup(&hash_content(bytes)).await.unwrap().is_none(),
            "[{label}] unsupported file was cached"
        );
    }
}

#[tokio::test]
async fn scenario_aged_sqlite_entry_reprocessed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let store: Arc<dyn CacheStore> =
        Arc::new(SqliteCacheStore::open(&path, CacheTtl::default()).unwrap());
    let pdf = StubBackend::returning("pdf", hello_pdf_result());
    let p = processor(store, pdf.clone(), unused_image());

    p.process_file(PDF_BYTES, "doc.pdf", "application/pdf").await;
    p.process_file(PDF_BYTES, "doc.pdf", "application/pdf").await;
    assert_eq!(pdf.calls(), 1);

    // Age the row from outside, through a second connection.
    let conn = rusqlite::Connection::open(&path).unwrap();
    let aged = conn
        .execute(
            "UPDATE processed_file SET expires_at = ?1 WHERE fingerprint = ?2",
            rusqlite::params![
                chrono::Utc::now().timestamp_millis() - 1_000,
                hash_content(PDF_BYTES).to_hex()
            ],
        )
        .unwrap();
    assert_eq!(aged, 1);
    drop(conn);

    let result = p.process_file(PDF_BYTES, "doc.pdf", "application/pdf").await;
    assert_eq!(result, hello_pdf_result());
    assert_eq!(pdf.calls(), 2);
}

#[tokio::test]
async fn scenario_aged_memory_entry_reprocessed() {
    let clock = Arc::new(ManualClock::starting_now());
    let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::with_clock(
        CacheTtl::default(),
        clock.clone(),
    ));
    let pdf = StubBackend::returning("pdf", hello_pdf_result());
    let p = processor(store, pdf.clone(), unused_image());

    p.process_file(PDF_BYTES, "doc.pdf", "application/pdf").await;
    clock.advance(Duration::from_secs(filecache::config::DEFAULT_CACHE_TTL_SECS + 1));
    p.process_file(PDF_BYTES, "doc.pdf", "application/pdf").await;

    assert_eq!(pdf.calls(), 2);
}
