//! Document and batch orchestration.
//!
//! [`PipelineDriver`] owns everything a run needs (configuration, artifact
//! store, transformer, reader), all passed in explicitly through
//! [`PipelineDriver::builder`]. Per document it runs
//! read → extract images → plan chunks → transform each chunk → store outputs
//! → write the manifest, and it never lets one document's failure stop a
//! batch.

use crate::config::PipelineConfig;
use crate::error::{ExtractionError, PipelineError};
use crate::manifest::{ChunkEntry, RunManifest};
use crate::output::{BatchReport, ChunkStatus, DocumentReport, DocumentStatus};
use crate::pipeline::chunk::plan_chunks;
use crate::pipeline::images::extract_images;
use crate::pipeline::input::{self, DocumentSource};
use crate::pipeline::read::{DocumentReader, ExtractedDocument, PdfiumReader};
use crate::pipeline::transform::{pace, transform_chunk, LlmTransformer, Transformer};
use crate::progress::PipelineObserver;
use crate::store::ArtifactStore;
use crate::document::Document;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

const MARKDOWN_CONTENT_TYPE: &str = "text/markdown; charset=utf-8";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Runs the pipeline over one or many documents against one artifact store.
///
/// Cheap to clone; all components are shared.
#[derive(Clone)]
pub struct PipelineDriver {
    config: Arc<PipelineConfig>,
    store: Arc<dyn ArtifactStore>,
    transformer: Arc<dyn Transformer>,
    reader: Arc<dyn DocumentReader>,
}

/// Builder for [`PipelineDriver`].
#[derive(Default)]
pub struct PipelineDriverBuilder {
    config: Option<PipelineConfig>,
    store: Option<Arc<dyn ArtifactStore>>,
    transformer: Option<Arc<dyn Transformer>>,
    reader: Option<Arc<dyn DocumentReader>>,
}

impl PipelineDriverBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Where chunk outputs, images and manifests are written. Required.
    pub fn store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to an [`LlmTransformer`] resolved from the config.
    pub fn transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Defaults to a [`PdfiumReader`] using the config's password.
    pub fn reader(mut self, reader: Arc<dyn DocumentReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn build(self) -> Result<PipelineDriver, PipelineError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let store = self.store.ok_or(PipelineError::MissingComponent("artifact store"))?;
        let transformer = match self.transformer {
            Some(t) => t,
            None => Arc::new(LlmTransformer::from_config(&config)?),
        };
        let reader = self.reader.unwrap_or_else(|| {
            Arc::new(PdfiumReader::new().with_password(config.password.clone()))
        });
        Ok(PipelineDriver {
            config: Arc::new(config),
            store,
            transformer,
            reader,
        })
    }
}

impl PipelineDriver {
    pub fn builder() -> PipelineDriverBuilder {
        PipelineDriverBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    fn observe(&self, f: impl FnOnce(&dyn PipelineObserver)) {
        if let Some(ref observer) = self.config.observer {
            f(observer.as_ref());
        }
    }

    /// Process one document end to end.
    ///
    /// Never fails: an unreadable source yields a report with
    /// [`DocumentStatus::Failed`]; a document with zero pages yields an empty
    /// manifest and [`DocumentStatus::Empty`].
    pub async fn process_document(&self, source: &DocumentSource) -> DocumentReport {
        let start = Instant::now();
        let name = source.document_name();
        info!(document = %name, "Processing {}", source);
        self.observe(|o| o.on_document_start(&name));

        let extracted = match self.read_source(source, &name).await {
            Ok(extracted) => extracted,
            Err(e) => {
                error!(document = %name, "Cannot read document: {}", e);
                let report =
                    DocumentReport::failed(&name, e.to_string(), start.elapsed().as_millis() as u64);
                self.observe(|o| o.on_document_complete(&report));
                return report;
            }
        };

        let report = self.process_extracted(extracted, start).await;
        self.observe(|o| o.on_document_complete(&report));
        report
    }

    async fn read_source(
        &self,
        source: &DocumentSource,
        name: &str,
    ) -> Result<ExtractedDocument, ExtractionError> {
        let bytes =
            input::resolve(source, self.store.as_ref(), self.config.download_timeout_secs).await?;
        match self.reader.read(name, bytes).await {
            Err(ExtractionError::EmptyDocument { .. }) => {
                warn!(document = name, "Document has no pages");
                Ok(ExtractedDocument {
                    document: Document::empty(name),
                    images: Vec::new(),
                })
            }
            other => other,
        }
    }

    async fn process_extracted(&self, extracted: ExtractedDocument, start: Instant) -> DocumentReport {
        let ExtractedDocument { document, images } = extracted;
        let name = document.name.clone();
        let config = &self.config;

        // ── Images ───────────────────────────────────────────────────────
        let (mut assets, skipped) = extract_images(&name, images);
        for e in &skipped {
            self.observe(|o| o.on_image_skipped(&name, e));
        }

        let mut images_stored = 0;
        let mut images_failed = skipped.len();
        for asset in assets.iter_mut() {
            let object = asset.storage_name();
            let bytes = std::mem::take(&mut asset.bytes);
            match self.store.put(&object, bytes, &asset.content_type()).await {
                Ok(reference) => {
                    asset.attach_reference(reference);
                    images_stored += 1;
                }
                Err(e) => {
                    warn!(document = %name, image = %asset.filename, "Image upload failed: {}", e);
                    images_failed += 1;
                }
            }
        }

        // ── Chunks ───────────────────────────────────────────────────────
        let chunks = plan_chunks(&document.pages, &assets, config.chunk_size);
        let total_chunks = chunks.len();
        info!(
            document = %name,
            pages = document.page_count(),
            chunks = total_chunks,
            images = assets.len(),
            "Planned chunks"
        );
        self.observe(|o| o.on_chunks_planned(&name, document.page_count(), total_chunks));

        let mut manifest = RunManifest::new(&name, document.page_count(), total_chunks);
        manifest.set_images(&assets);

        let (mut input_tokens, mut output_tokens) = (0u64, 0u64);
        let mut called_service = false;
        for chunk in &chunks {
            // Space out calls within a document; nothing waits after the last chunk.
            if called_service && !pace(config).await {
                debug!(document = %name, "Pacing wait cancelled");
            }
            self.observe(|o| o.on_chunk_start(&name, chunk.index, total_chunks));
            let result = transform_chunk(self.transformer.as_ref(), &name, chunk, config).await;
            called_service = result.status != ChunkStatus::Skipped;
            input_tokens += result.input_tokens as u64;
            output_tokens += result.output_tokens as u64;

            let (filename, stored) = match result.markdown.as_deref() {
                Some(markdown) if result.is_success() => {
                    let filename = chunk.output_name(&name);
                    let stored = self
                        .store
                        .put(&filename, markdown.as_bytes().to_vec(), MARKDOWN_CONTENT_TYPE)
                        .await
                        .map_err(|e| e.to_string());
                    (Some(filename), stored)
                }
                _ => (None, Err(String::new())),
            };

            let entry = ChunkEntry::new(chunk, &result, filename, stored);
            match entry.status {
                ChunkStatus::Success => {
                    let len = result.markdown.as_ref().map_or(0, String::len);
                    self.observe(|o| o.on_chunk_complete(&name, chunk.index, total_chunks, len));
                }
                ChunkStatus::Skipped => {
                    self.observe(|o| o.on_chunk_complete(&name, chunk.index, total_chunks, 0));
                }
                ChunkStatus::Failed | ChunkStatus::StorageFailed => {
                    let msg = entry.error.clone().unwrap_or_default();
                    warn!(document = %name, chunk = chunk.index, status = ?entry.status, "{}", msg);
                    self.observe(|o| o.on_chunk_error(&name, chunk.index, total_chunks, &msg));
                }
            }
            manifest.push_chunk(entry);
        }

        // ── Manifest ─────────────────────────────────────────────────────
        let manifest_name = manifest.storage_name();
        let manifest_result = match manifest.to_json_bytes() {
            Ok(bytes) => self
                .store
                .put(&manifest_name, bytes, JSON_CONTENT_TYPE)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(format!("Failed to serialise '{manifest_name}': {e}")),
        };

        let (status, manifest_reference, error) = match manifest_result {
            Ok(reference) if document.is_empty() => (DocumentStatus::Empty, Some(reference), None),
            Ok(reference) => (DocumentStatus::Completed, Some(reference), None),
            Err(e) => {
                error!(document = %name, "Manifest could not be written: {}", e);
                (DocumentStatus::Failed, None, Some(e))
            }
        };

        let report = DocumentReport {
            document: name.clone(),
            status,
            total_pages: document.page_count(),
            total_chunks,
            chunks_succeeded: manifest.count_status(ChunkStatus::Success),
            chunks_failed: manifest.count_status(ChunkStatus::Failed)
                + manifest.count_status(ChunkStatus::StorageFailed),
            chunks_skipped: manifest.count_status(ChunkStatus::Skipped),
            images_stored,
            images_failed,
            input_tokens,
            output_tokens,
            manifest_reference,
            error,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            document = %name,
            "Document done: {}/{} chunks ok, {} images stored, {}ms",
            report.chunks_succeeded,
            report.total_chunks,
            report.images_stored,
            report.duration_ms
        );
        report
    }

    /// Process `sources` with up to `document_concurrency` documents in
    /// flight. Reports keep input order.
    pub async fn process_batch(&self, sources: Vec<DocumentSource>) -> BatchReport {
        let start = Instant::now();
        let total = sources.len();
        self.observe(|o| o.on_batch_start(total));
        info!("Processing {} documents", total);

        let reports: Vec<DocumentReport> = stream::iter(sources.iter().map(|s| self.process_document(s)))
            .buffered(self.config.document_concurrency)
            .collect()
            .await;

        let batch = BatchReport::from_reports(reports, start.elapsed().as_millis() as u64);
        info!(
            "Batch complete: {}/{} documents succeeded",
            batch.succeeded,
            batch.total()
        );
        self.observe(|o| o.on_batch_complete(&batch));
        batch
    }

    /// Process every `.pdf` directly inside `dir`.
    pub async fn process_directory(&self, dir: &Path) -> Result<BatchReport, PipelineError> {
        let files = input::list_directory(dir)?;
        debug!("Found {} PDFs in {}", files.len(), dir.display());
        Ok(self
            .process_batch(files.into_iter().map(DocumentSource::Path).collect())
            .await)
    }

    /// `.pdf` objects in the artifact store under `prefix`.
    pub async fn list_store_documents(&self, prefix: &str) -> Result<Vec<String>, PipelineError> {
        input::list_store(self.store.as_ref(), prefix).await
    }

    /// Process every `.pdf` object in the artifact store under `prefix`.
    pub async fn process_store_documents(&self, prefix: &str) -> Result<BatchReport, PipelineError> {
        let names = self.list_store_documents(prefix).await?;
        Ok(self
            .process_batch(names.into_iter().map(DocumentSource::Stored).collect())
            .await)
    }

    /// Process one named object from the artifact store.
    ///
    /// `.pdf` is appended when missing; the object must exist. Observers see
    /// a batch of one, so batch-level events fire as for any other run.
    pub async fn process_named(&self, name: &str) -> Result<DocumentReport, PipelineError> {
        let object = if input::is_pdf_name(name) {
            name.to_string()
        } else {
            format!("{name}.pdf")
        };

        let exists = self
            .store
            .exists(&object)
            .await
            .map_err(|e| PipelineError::SourceListing {
                location: self.store.location(),
                detail: e.to_string(),
            })?;
        if !exists {
            return Err(PipelineError::SourceNotFound { name: object });
        }

        self.observe(|o| o.on_batch_start(1));
        let report = self.process_document(&DocumentSource::Stored(object)).await;
        if let Some(ref observer) = self.config.observer {
            let batch = BatchReport::from_reports(vec![report.clone()], report.duration_ms);
            observer.on_batch_complete(&batch);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryArtifactStore;

    #[test]
    fn store_is_required() {
        let err = PipelineDriver::builder().build().err().unwrap();
        assert!(matches!(err, PipelineError::MissingComponent("artifact store")));
    }

    #[test]
    fn hand_built_config_is_validated() {
        let config = PipelineConfig {
            document_concurrency: 0,
            ..Default::default()
        };
        let err = PipelineDriver::builder()
            .config(config)
            .store(Arc::new(MemoryArtifactStore::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));

        let config = PipelineConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn process_named_rejects_missing_object() {
        use crate::error::TransformError;
        use crate::pipeline::transform::Transformed;
        use async_trait::async_trait;

        struct Never;
        #[async_trait]
        impl Transformer for Never {
            async fn transform(&self, _s: Option<&str>, _p: &str) -> Result<Transformed, TransformError> {
                Err(TransformError::Failed { detail: "unused".into() })
            }
        }

        let driver = PipelineDriver::builder()
            .store(Arc::new(MemoryArtifactStore::new()))
            .transformer(Arc::new(Never))
            .build()
            .unwrap();
        match driver.process_named("missing").await {
            Err(PipelineError::SourceNotFound { name }) => assert_eq!(name, "missing.pdf"),
            other => panic!("unexpected: {:?}", other.map(|r| r.document)),
        }
    }
}
