//! Observer trait for per-document and per-chunk pipeline events.
//!
//! Inject an [`Arc<dyn PipelineObserver>`] via
//! [`crate::config::PipelineConfigBuilder::observer`] to receive events as
//! the pipeline works. All methods default to no-ops so implementations only
//! override what they need.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfchunk::{PipelineConfig, PipelineObserver};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//! use std::time::Duration;
//!
//! struct BackoffCounter(AtomicUsize);
//!
//! impl PipelineObserver for BackoffCounter {
//!     fn on_rate_limited(&self, _doc: &str, _chunk: usize, _retry: u32, _wait: Duration) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .observer(Arc::new(BackoffCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::ImageDecodeError;
use crate::output::{BatchReport, DocumentReport};
use std::sync::Arc;
use std::time::Duration;

/// Called by the pipeline as it processes documents and chunks.
///
/// # Thread safety
///
/// With `document_concurrency > 1` events for different documents arrive
/// interleaved from different tasks. Events for one document are always
/// delivered in order.
pub trait PipelineObserver: Send + Sync {
    /// Called once before the first document of a batch.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called when a document's source is about to be read.
    fn on_document_start(&self, document: &str) {
        let _ = document;
    }

    /// Called after chunk planning, before the first transformation call.
    fn on_chunks_planned(&self, document: &str, total_pages: usize, total_chunks: usize) {
        let _ = (document, total_pages, total_chunks);
    }

    /// Called for every embedded image that was skipped.
    fn on_image_skipped(&self, document: &str, error: &ImageDecodeError) {
        let _ = (document, error);
    }

    /// Called just before the first transformation attempt for a chunk.
    fn on_chunk_start(&self, document: &str, chunk_index: usize, total_chunks: usize) {
        let _ = (document, chunk_index, total_chunks);
    }

    /// Called each time a chunk enters the backoff state.
    ///
    /// `retry` is 1 for the first retry.
    fn on_rate_limited(&self, document: &str, chunk_index: usize, retry: u32, wait: Duration) {
        let _ = (document, chunk_index, retry, wait);
    }

    /// Called when a chunk's output has been produced and stored, or when a
    /// blank chunk was skipped (`output_len == 0`).
    fn on_chunk_complete(
        &self,
        document: &str,
        chunk_index: usize,
        total_chunks: usize,
        output_len: usize,
    ) {
        let _ = (document, chunk_index, total_chunks, output_len);
    }

    /// Called when a chunk ends in any non-success state.
    fn on_chunk_error(&self, document: &str, chunk_index: usize, total_chunks: usize, error: &str) {
        let _ = (document, chunk_index, total_chunks, error);
    }

    /// Called once per document after its manifest was written (or attempted).
    fn on_document_complete(&self, report: &DocumentReport) {
        let _ = report;
    }

    /// Called once after every document of a batch has been attempted.
    fn on_batch_complete(&self, report: &BatchReport) {
        let _ = report;
    }
}

/// A no-op implementation; the default when no observer is configured.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressObserver = Arc<dyn PipelineObserver>;
