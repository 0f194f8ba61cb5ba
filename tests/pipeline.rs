//! Integration tests for the document pipeline.
//!
//! The PDF engine and the LLM are replaced with scripted implementations of
//! [`DocumentReader`] and [`Transformer`], so these run offline and without
//! a pdfium library.

use async_trait::async_trait;
use edgequake_pdfchunk::{
    manifest_name, process_stream, ArtifactStore, BatchReport, ChunkStatus, Document,
    DocumentReader, DocumentReport, DocumentSource, DocumentStatus, ExtractedDocument,
    ExtractionError, FsArtifactStore, ImageDecodeError, MemoryArtifactStore, Page,
    PipelineConfig, PipelineDriver, PipelineObserver, RawImage, RawPayload, RunManifest,
    StorageError, TransformError, Transformed, Transformer,
};
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ── Scripted reader ──────────────────────────────────────────────────────────

#[derive(Clone)]
enum ReadScript {
    Pages(Vec<&'static str>, Vec<RawImage>),
    Empty,
    Corrupt,
}

#[derive(Default)]
struct ScriptedReader {
    docs: HashMap<String, ReadScript>,
}

impl ScriptedReader {
    fn with(mut self, name: &str, script: ReadScript) -> Self {
        self.docs.insert(name.to_string(), script);
        self
    }
}

#[async_trait]
impl DocumentReader for ScriptedReader {
    async fn read(&self, name: &str, _bytes: Vec<u8>) -> Result<ExtractedDocument, ExtractionError> {
        match self.docs.get(name).cloned() {
            Some(ReadScript::Pages(texts, images)) => {
                let pages = texts
                    .iter()
                    .enumerate()
                    .map(|(i, t)| Page::new(i + 1, *t))
                    .collect();
                Ok(ExtractedDocument {
                    document: Document::new(name, pages),
                    images,
                })
            }
            Some(ReadScript::Empty) => Err(ExtractionError::EmptyDocument { name: name.into() }),
            Some(ReadScript::Corrupt) | None => Err(ExtractionError::CorruptPdf {
                name: name.into(),
                detail: "xref table not found".into(),
            }),
        }
    }
}

// ── Scripted transformer ─────────────────────────────────────────────────────

/// Replays queued outcomes first, then answers with a heading naming the
/// page range found in the prompt.
#[derive(Default)]
struct ScriptedTransformer {
    queue: Mutex<VecDeque<Result<Transformed, TransformError>>>,
    calls: AtomicUsize,
}

impl ScriptedTransformer {
    fn then(self, outcome: Result<Transformed, TransformError>) -> Self {
        self.queue.lock().unwrap().push_back(outcome);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transformer for ScriptedTransformer {
    async fn transform(&self, _system: Option<&str>, prompt: &str) -> Result<Transformed, TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(outcome) = self.queue.lock().unwrap().pop_front() {
            return outcome;
        }
        let pages = prompt
            .lines()
            .find_map(|l| l.strip_prefix("Pages: "))
            .unwrap_or("?");
        Ok(Transformed {
            text: format!("# Pages {pages}\n\nConverted."),
            input_tokens: 100,
            output_tokens: 10,
        })
    }
}

fn rate_limited() -> Result<Transformed, TransformError> {
    Err(TransformError::RateLimited {
        retry_after_secs: None,
        detail: "429 Too Many Requests".into(),
    })
}

// ── Recording observer ───────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    rate_limited: AtomicUsize,
    images_skipped: AtomicUsize,
    chunks_done: AtomicUsize,
    chunk_errors: AtomicUsize,
    documents: AtomicUsize,
    batches: AtomicUsize,
}

impl PipelineObserver for Recorder {
    fn on_image_skipped(&self, _document: &str, _error: &ImageDecodeError) {
        self.images_skipped.fetch_add(1, Ordering::SeqCst);
    }
    fn on_rate_limited(&self, _document: &str, _chunk: usize, _retry: u32, _wait: Duration) {
        self.rate_limited.fetch_add(1, Ordering::SeqCst);
    }
    fn on_chunk_complete(&self, _document: &str, _chunk: usize, _total: usize, _len: usize) {
        self.chunks_done.fetch_add(1, Ordering::SeqCst);
    }
    fn on_chunk_error(&self, _document: &str, _chunk: usize, _total: usize, _error: &str) {
        self.chunk_errors.fetch_add(1, Ordering::SeqCst);
    }
    fn on_document_complete(&self, _report: &DocumentReport) {
        self.documents.fetch_add(1, Ordering::SeqCst);
    }
    fn on_batch_complete(&self, _report: &BatchReport) {
        self.batches.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Store that refuses some uploads ──────────────────────────────────────────

/// In-memory store whose `put` fails with HTTP 503 for names matching `refuses`.
struct RefusingStore {
    inner: MemoryArtifactStore,
    refuses: fn(&str) -> bool,
}

impl RefusingStore {
    fn new(refuses: fn(&str) -> bool) -> Self {
        Self {
            inner: MemoryArtifactStore::new(),
            refuses,
        }
    }
}

#[async_trait]
impl ArtifactStore for RefusingStore {
    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
        if (self.refuses)(name) {
            return Err(StorageError::Status {
                name: name.into(),
                status: 503,
                body: "ServerBusy".into(),
            });
        }
        self.inner.put(name, bytes, content_type).await
    }
    async fn get(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        self.inner.get(name).await
    }
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.inner.list(prefix).await
    }
    fn location(&self) -> String {
        self.inner.location()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn fast_config(chunk_size: usize) -> PipelineConfig {
    PipelineConfig::builder()
        .chunk_size(chunk_size)
        .rate_limit_backoff_ms(1)
        .pacing_delay_ms(0)
        .build()
        .unwrap()
}

fn pdf_source(name: &str) -> DocumentSource {
    DocumentSource::Bytes {
        name: format!("{name}.pdf"),
        bytes: b"%PDF-1.7\n%placeholder".to_vec(),
    }
}

fn png_bytes(shade: u8) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(2, 2, image::Rgb([shade, shade, shade]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn raw_image(page_num: usize, index: usize, bytes: Vec<u8>) -> RawImage {
    RawImage {
        page_num,
        index,
        payload: RawPayload::Bytes(bytes),
    }
}

fn driver(
    config: PipelineConfig,
    store: Arc<dyn ArtifactStore>,
    reader: ScriptedReader,
    transformer: Arc<ScriptedTransformer>,
) -> PipelineDriver {
    PipelineDriver::builder()
        .config(config)
        .store(store)
        .reader(Arc::new(reader))
        .transformer(transformer)
        .build()
        .unwrap()
}

async fn load_manifest(store: &dyn ArtifactStore, document: &str) -> RunManifest {
    let bytes = store.get(&manifest_name(document)).await.unwrap();
    RunManifest::from_json_bytes(&bytes).unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_pages_in_chunks_of_two() {
    let store = Arc::new(MemoryArtifactStore::new());
    let transformer = Arc::new(ScriptedTransformer::default());
    let reader = ScriptedReader::default().with(
        "orders_api",
        ReadScript::Pages(vec!["Intro", "Endpoints", "Errors"], vec![]),
    );
    let driver = driver(fast_config(2), store.clone(), reader, transformer.clone());

    let report = driver.process_document(&pdf_source("orders_api")).await;

    assert_eq!(report.status, DocumentStatus::Completed);
    assert_eq!(report.total_pages, 3);
    assert_eq!(report.total_chunks, 2);
    assert_eq!(report.chunks_succeeded, 2);
    assert_eq!(report.input_tokens, 200);
    assert_eq!(transformer.calls(), 2);

    let first = store.get("orders_api_part1_pages1-2.md").await.unwrap();
    let second = store.get("orders_api_part2_pages3-3.md").await.unwrap();
    assert_eq!(String::from_utf8(first).unwrap(), "# Pages 1-2\n\nConverted.\n");
    assert_eq!(String::from_utf8(second).unwrap(), "# Pages 3-3\n\nConverted.\n");
    assert_eq!(
        store.content_type("orders_api_metadata.json").as_deref(),
        Some("application/json")
    );

    let manifest = load_manifest(store.as_ref(), "orders_api").await;
    assert_eq!(manifest.pdf_name, "orders_api");
    assert_eq!(manifest.total_pages, 3);
    assert_eq!(manifest.chunks.len(), 2);
    assert_eq!(manifest.chunks[0].chunk_index, 0);
    assert_eq!((manifest.chunks[1].start_page, manifest.chunks[1].end_page), (3, 3));
    assert!(manifest.chunks.iter().all(|c| c.status == ChunkStatus::Success));
    assert_eq!(
        manifest.chunks[1].reference.as_deref(),
        Some("memory://orders_api_part2_pages3-3.md")
    );
}

#[tokio::test]
async fn zero_page_document_writes_empty_manifest() {
    let store = Arc::new(MemoryArtifactStore::new());
    let transformer = Arc::new(ScriptedTransformer::default());
    let reader = ScriptedReader::default().with("blank", ReadScript::Empty);
    let driver = driver(fast_config(40), store.clone(), reader, transformer.clone());

    let report = driver.process_document(&pdf_source("blank")).await;

    assert_eq!(report.status, DocumentStatus::Empty);
    assert!(report.is_success());
    assert_eq!(transformer.calls(), 0);
    let manifest = load_manifest(store.as_ref(), "blank").await;
    assert_eq!(manifest.total_chunks, 0);
    assert!(manifest.chunks.is_empty());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn rate_limit_backs_off_once_then_succeeds() {
    let store = Arc::new(MemoryArtifactStore::new());
    let transformer = Arc::new(ScriptedTransformer::default().then(rate_limited()));
    let recorder = Arc::new(Recorder::default());
    let config = PipelineConfig::builder()
        .chunk_size(40)
        .rate_limit_backoff_ms(1)
        .pacing_delay_ms(0)
        .observer(recorder.clone())
        .build()
        .unwrap();
    let reader = ScriptedReader::default().with("spec", ReadScript::Pages(vec!["Only page"], vec![]));
    let driver = driver(config, store.clone(), reader, transformer.clone());

    let report = driver.process_document(&pdf_source("spec")).await;

    assert_eq!(report.chunks_succeeded, 1);
    assert_eq!(transformer.calls(), 2);
    assert_eq!(recorder.rate_limited.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.chunks_done.load(Ordering::SeqCst), 1);
    let manifest = load_manifest(store.as_ref(), "spec").await;
    assert_eq!(manifest.chunks[0].rate_limit_retries, 1);
    assert_eq!(manifest.chunks[0].status, ChunkStatus::Success);
}

#[tokio::test]
async fn non_rate_limit_error_fails_chunk_without_retry() {
    let store = Arc::new(MemoryArtifactStore::new());
    let transformer = Arc::new(ScriptedTransformer::default().then(Err(TransformError::Failed {
        detail: "401 invalid api key".into(),
    })));
    let reader = ScriptedReader::default().with(
        "spec",
        ReadScript::Pages(vec!["p1", "p2", "p3", "p4"], vec![]),
    );
    let driver = driver(fast_config(2), store.clone(), reader, transformer.clone());

    let report = driver.process_document(&pdf_source("spec")).await;

    // The failure is local to chunk 0; chunk 1 still runs.
    assert_eq!(report.status, DocumentStatus::Completed);
    assert_eq!(report.chunks_failed, 1);
    assert_eq!(report.chunks_succeeded, 1);
    assert_eq!(transformer.calls(), 2);

    let manifest = load_manifest(store.as_ref(), "spec").await;
    let failed = &manifest.chunks[0];
    assert_eq!(failed.status, ChunkStatus::Failed);
    assert_eq!(failed.filename, None);
    assert_eq!(failed.rate_limit_retries, 0);
    assert!(failed.error.as_deref().unwrap().contains("401"));
    assert!(store.get("spec_part1_pages1-2.md").await.is_err());
}

#[tokio::test]
async fn corrupt_image_is_skipped_and_others_stored() {
    let store = Arc::new(MemoryArtifactStore::new());
    let transformer = Arc::new(ScriptedTransformer::default());
    let recorder = Arc::new(Recorder::default());
    let config = PipelineConfig::builder()
        .chunk_size(1)
        .rate_limit_backoff_ms(1)
        .pacing_delay_ms(0)
        .observer(recorder.clone())
        .build()
        .unwrap();
    let images = vec![
        raw_image(1, 1, png_bytes(10)),
        raw_image(1, 2, b"\x89PNG\r\n\x1a\ntruncated".to_vec()),
        raw_image(2, 1, png_bytes(200)),
    ];
    let reader = ScriptedReader::default().with("diagrams", ReadScript::Pages(vec!["a", "b"], images));
    let driver = driver(config, store.clone(), reader, transformer);

    let report = driver.process_document(&pdf_source("diagrams")).await;

    assert_eq!(report.status, DocumentStatus::Completed);
    assert_eq!(report.images_stored, 2);
    assert_eq!(report.images_failed, 1);
    assert_eq!(recorder.images_skipped.load(Ordering::SeqCst), 1);

    let manifest = load_manifest(store.as_ref(), "diagrams").await;
    assert_eq!(manifest.images.len(), 2);
    for image in &manifest.images {
        assert!(image.filename.starts_with(&format!("diagrams_page{}_img", image.page_num)));
        assert!(image.reference.is_some());
        assert!(store.get(&image.blob_path).await.is_ok());
    }
    assert_eq!(manifest.chunks[0].images.len(), 1);
    assert_eq!(manifest.chunks[1].images.len(), 1);
    assert_eq!(manifest.chunks[1].images[0], manifest.images[1].filename);
}

#[tokio::test]
async fn batch_continues_past_unreadable_document() {
    let store = Arc::new(MemoryArtifactStore::new());
    let transformer = Arc::new(ScriptedTransformer::default());
    let recorder = Arc::new(Recorder::default());
    let config = PipelineConfig::builder()
        .chunk_size(40)
        .pacing_delay_ms(0)
        .observer(recorder.clone())
        .build()
        .unwrap();
    let reader = ScriptedReader::default()
        .with("first", ReadScript::Pages(vec!["one"], vec![]))
        .with("second", ReadScript::Corrupt)
        .with("third", ReadScript::Pages(vec!["three"], vec![]));
    let driver = driver(config, store.clone(), reader, transformer);

    let batch = driver
        .process_batch(vec![pdf_source("first"), pdf_source("second"), pdf_source("third")])
        .await;

    assert_eq!(batch.total(), 3);
    assert_eq!(batch.succeeded, 2);
    assert_eq!(batch.failed, 1);
    let names: Vec<_> = batch.documents.iter().map(|d| d.document.as_str()).collect();
    assert_eq!(names, ["first", "second", "third"]);
    assert_eq!(batch.documents[1].status, DocumentStatus::Failed);
    assert!(batch.documents[1].error.as_deref().unwrap().contains("xref"));

    assert!(store.get("first_metadata.json").await.is_ok());
    assert!(store.get("second_metadata.json").await.is_err());
    assert!(store.get("third_metadata.json").await.is_ok());
    assert_eq!(recorder.documents.load(Ordering::SeqCst), 3);
    assert_eq!(recorder.batches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn non_pdf_source_fails_before_reading() {
    let store = Arc::new(MemoryArtifactStore::new());
    let transformer = Arc::new(ScriptedTransformer::default());
    let reader = ScriptedReader::default().with("notes", ReadScript::Pages(vec!["x"], vec![]));
    let driver = driver(fast_config(40), store.clone(), reader, transformer.clone());

    let source = DocumentSource::Bytes {
        name: "notes.pdf".into(),
        bytes: b"PK\x03\x04 zip archive".to_vec(),
    };
    let report = driver.process_document(&source).await;

    assert_eq!(report.status, DocumentStatus::Failed);
    assert_eq!(transformer.calls(), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn markdown_storage_failure_marks_chunk() {
    let store = Arc::new(RefusingStore::new(|name| name.ends_with(".md")));
    let transformer = Arc::new(ScriptedTransformer::default());
    let recorder = Arc::new(Recorder::default());
    let config = PipelineConfig::builder()
        .chunk_size(40)
        .pacing_delay_ms(0)
        .observer(recorder.clone())
        .build()
        .unwrap();
    let reader = ScriptedReader::default().with("spec", ReadScript::Pages(vec!["text"], vec![]));
    let driver = driver(config, store.clone(), reader, transformer);

    let report = driver.process_document(&pdf_source("spec")).await;

    assert_eq!(report.status, DocumentStatus::Completed);
    assert_eq!(report.chunks_failed, 1);
    assert_eq!(recorder.chunk_errors.load(Ordering::SeqCst), 1);
    let manifest = load_manifest(store.as_ref(), "spec").await;
    let entry = &manifest.chunks[0];
    assert_eq!(entry.status, ChunkStatus::StorageFailed);
    assert_eq!(entry.filename.as_deref(), Some("spec_part1_pages1-1.md"));
    assert_eq!(entry.reference, None);
    assert!(entry.error.as_deref().unwrap().contains("503"));
}

#[tokio::test]
async fn blank_chunks_are_skipped_without_a_call() {
    let store = Arc::new(MemoryArtifactStore::new());
    let transformer = Arc::new(ScriptedTransformer::default());
    let reader = ScriptedReader::default().with(
        "scanned",
        ReadScript::Pages(vec!["  ", "\n", "Appendix A"], vec![]),
    );
    let driver = driver(fast_config(2), store.clone(), reader, transformer.clone());

    let report = driver.process_document(&pdf_source("scanned")).await;

    assert_eq!(report.chunks_skipped, 1);
    assert_eq!(report.chunks_succeeded, 1);
    assert_eq!(transformer.calls(), 1);
    let manifest = load_manifest(store.as_ref(), "scanned").await;
    assert_eq!(manifest.chunks[0].status, ChunkStatus::Skipped);
    assert!(store.get("scanned_part1_pages1-2.md").await.is_err());
}

#[tokio::test]
async fn rerun_overwrites_same_artifact_names() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsArtifactStore::new(dir.path()));
    let pages = vec!["a", "b", "c", "d", "e"];
    let png = png_bytes(42);

    let mut listings = Vec::new();
    for _ in 0..2 {
        let reader = ScriptedReader::default().with(
            "guide",
            ReadScript::Pages(pages.clone(), vec![raw_image(3, 1, png.clone())]),
        );
        let transformer = Arc::new(ScriptedTransformer::default());
        let driver = driver(fast_config(2), store.clone(), reader, transformer);
        let report = driver.process_document(&pdf_source("guide")).await;
        assert_eq!(report.chunks_succeeded, 3);
        listings.push(store.list("").await.unwrap());
    }

    assert_eq!(listings[0], listings[1]);
    assert_eq!(listings[0].len(), 5);
    assert!(dir.path().join("guide_part3_pages5-5.md").is_file());
    assert!(listings[0].iter().any(|n| n.starts_with("images/guide_page3_img1_")));
}

#[tokio::test]
async fn process_named_reads_from_store() {
    let store = Arc::new(MemoryArtifactStore::new());
    store
        .put("incoming/billing.pdf", b"%PDF-1.4 stored".to_vec(), "application/pdf")
        .await
        .unwrap();
    store
        .put("incoming/readme.txt", b"not a pdf".to_vec(), "text/plain")
        .await
        .unwrap();
    let transformer = Arc::new(ScriptedTransformer::default());
    let recorder = Arc::new(Recorder::default());
    let config = PipelineConfig::builder()
        .pacing_delay_ms(0)
        .observer(recorder.clone())
        .build()
        .unwrap();
    let reader = ScriptedReader::default().with("billing", ReadScript::Pages(vec!["Invoices"], vec![]));
    let driver = driver(config, store.clone(), reader, transformer);

    assert_eq!(
        driver.list_store_documents("incoming/").await.unwrap(),
        vec!["incoming/billing.pdf".to_string()]
    );

    let report = driver.process_named("incoming/billing").await.unwrap();
    assert_eq!(report.document, "billing");
    // A single named document still completes its batch for observers.
    assert_eq!(recorder.documents.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.batches.load(Ordering::SeqCst), 1);
    assert_eq!(report.status, DocumentStatus::Completed);
    assert!(store.get("billing_part1_pages1-1.md").await.is_ok());
}

#[tokio::test]
async fn stream_yields_one_report_per_document() {
    let store = Arc::new(MemoryArtifactStore::new());
    let transformer = Arc::new(ScriptedTransformer::default());
    let reader = ScriptedReader::default()
        .with("a", ReadScript::Pages(vec!["x"], vec![]))
        .with("b", ReadScript::Corrupt);
    let config = PipelineConfig::builder()
        .pacing_delay_ms(0)
        .document_concurrency(2)
        .build()
        .unwrap();
    let driver = driver(config, store, reader, transformer);

    let mut reports: Vec<DocumentReport> = process_stream(driver, vec![pdf_source("a"), pdf_source("b")])
        .collect()
        .await;
    reports.sort_by(|x, y| x.document.cmp(&y.document));

    assert_eq!(reports.len(), 2);
    assert!(reports[0].is_success());
    assert_eq!(reports[1].status, DocumentStatus::Failed);
}

#[tokio::test]
async fn cancelled_run_marks_chunks_failed() {
    let store = Arc::new(MemoryArtifactStore::new());
    let transformer = Arc::new(ScriptedTransformer::default());
    let config = PipelineConfig::builder().pacing_delay_ms(0).build().unwrap();
    config.cancel.cancel();
    let reader = ScriptedReader::default().with("spec", ReadScript::Pages(vec!["x"], vec![]));
    let driver = driver(config, store.clone(), reader, transformer.clone());

    let report = driver.process_document(&pdf_source("spec")).await;

    assert_eq!(transformer.calls(), 0);
    assert_eq!(report.chunks_failed, 1);
    let manifest = load_manifest(store.as_ref(), "spec").await;
    assert_eq!(manifest.chunks[0].status, ChunkStatus::Failed);
}

#[test]
fn put_is_idempotent_on_every_local_store() {
    let dir = tempfile::tempdir().unwrap();
    let stores: Vec<Arc<dyn ArtifactStore>> = vec![
        Arc::new(MemoryArtifactStore::new()),
        Arc::new(FsArtifactStore::new(dir.path())),
    ];
    for store in stores {
        let first = tokio_test::block_on(store.put("images/a.png", png_bytes(1), "image/png")).unwrap();
        let second = tokio_test::block_on(store.put("images/a.png", png_bytes(1), "image/png")).unwrap();
        assert_eq!(first, second, "{}", store.location());
        assert_eq!(tokio_test::block_on(store.list("images/")).unwrap().len(), 1);
    }
}

#[tokio::test]
async fn image_upload_failure_leaves_reference_empty() {
    let store = Arc::new(RefusingStore::new(|name| name.starts_with("images/")));
    let transformer = Arc::new(ScriptedTransformer::default());
    let images = vec![raw_image(1, 1, png_bytes(7)), raw_image(1, 2, png_bytes(9))];
    let reader = ScriptedReader::default().with("figures", ReadScript::Pages(vec!["Figure 1"], images));
    let driver = driver(fast_config(40), store.clone(), reader, transformer);

    let report = driver.process_document(&pdf_source("figures")).await;

    assert_eq!(report.status, DocumentStatus::Completed);
    assert_eq!(report.images_stored, 0);
    assert_eq!(report.images_failed, 2);
    assert_eq!(report.chunks_succeeded, 1);

    let manifest = load_manifest(store.as_ref(), "figures").await;
    assert_eq!(manifest.images.len(), 2);
    assert!(manifest.images.iter().all(|i| i.reference.is_none()));
    assert_eq!(manifest.chunks[0].images.len(), 2);
}

#[tokio::test]
async fn manifest_upload_failure_fails_document_in_batch() {
    let store = Arc::new(RefusingStore::new(|name| name.ends_with("_metadata.json")));
    let transformer = Arc::new(ScriptedTransformer::default());
    let reader = ScriptedReader::default()
        .with("first", ReadScript::Pages(vec!["one"], vec![]))
        .with("second", ReadScript::Pages(vec!["two"], vec![]));
    let driver = driver(fast_config(40), store.clone(), reader, transformer);

    let batch = driver
        .process_batch(vec![pdf_source("first"), pdf_source("second")])
        .await;

    assert_eq!(batch.succeeded, 0);
    assert_eq!(batch.failed, 2);
    for report in &batch.documents {
        assert_eq!(report.status, DocumentStatus::Failed);
        assert_eq!(report.manifest_reference, None);
        assert!(report.error.as_deref().unwrap().contains("503"));
        // Chunk outputs were still written before the manifest failed.
        assert_eq!(report.chunks_succeeded, 1);
    }
    assert!(store.get("first_part1_pages1-1.md").await.is_ok());
    assert!(store.get("first_metadata.json").await.is_err());
}

#[tokio::test]
async fn pacing_only_separates_chunks() {
    let pacing = Duration::from_millis(300);
    let config = |size| {
        PipelineConfig::builder()
            .chunk_size(size)
            .pacing_delay_ms(pacing.as_millis() as u64)
            .build()
            .unwrap()
    };

    // One chunk: no wait after the last call.
    let reader = ScriptedReader::default().with("single", ReadScript::Pages(vec!["a", "b"], vec![]));
    let single = driver(
        config(2),
        Arc::new(MemoryArtifactStore::new()),
        reader,
        Arc::new(ScriptedTransformer::default()),
    );
    let started = Instant::now();
    single.process_document(&pdf_source("single")).await;
    assert!(started.elapsed() < pacing);

    // Two chunks: exactly one wait between them.
    let reader = ScriptedReader::default().with("pair", ReadScript::Pages(vec!["a", "b"], vec![]));
    let pair = driver(
        config(1),
        Arc::new(MemoryArtifactStore::new()),
        reader,
        Arc::new(ScriptedTransformer::default()),
    );
    let started = Instant::now();
    let report = pair.process_document(&pdf_source("pair")).await;
    let elapsed = started.elapsed();
    assert_eq!(report.chunks_succeeded, 2);
    assert!(elapsed >= pacing && elapsed < pacing * 2, "{elapsed:?}");
}
