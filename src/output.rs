//! Result types returned by the pipeline: per-chunk, per-document, per-batch.

use crate::error::TransformError;
use serde::{Deserialize, Serialize};

/// Outcome of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    /// Transformed and (in the manifest) stored.
    Success,
    /// The transformation call failed terminally.
    Failed,
    /// Every page in the chunk was blank; no call was made.
    Skipped,
    /// Transformed, but persisting the output failed.
    StorageFailed,
}

/// What the orchestrator produced for one chunk.
///
/// Never carries `Success` unless `markdown` is `Some`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkResult {
    pub index: usize,
    pub start_page: usize,
    pub end_page: usize,
    /// Transformed Markdown; `None` unless `status == Success`.
    pub markdown: Option<String>,
    pub status: ChunkStatus,
    /// Terminal error for a failed chunk.
    pub error: Option<TransformError>,
    /// Number of backoff rounds before the terminal state.
    pub rate_limit_retries: u32,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

impl ChunkResult {
    pub fn is_success(&self) -> bool {
        self.status == ChunkStatus::Success
    }
}

/// Final state of one document in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Manifest written; individual chunks may still have failed.
    Completed,
    /// No pages; an empty manifest was written.
    Empty,
    /// Unreadable source, or the manifest could not be written.
    Failed,
}

/// Per-document summary reported by the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    pub document: String,
    pub status: DocumentStatus,
    pub total_pages: usize,
    pub total_chunks: usize,
    pub chunks_succeeded: usize,
    pub chunks_failed: usize,
    pub chunks_skipped: usize,
    pub images_stored: usize,
    /// Images skipped at decode time plus images whose upload failed.
    pub images_failed: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub manifest_reference: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl DocumentReport {
    /// Report for a document that never got past reading.
    pub fn failed(document: impl Into<String>, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            document: document.into(),
            status: DocumentStatus::Failed,
            total_pages: 0,
            total_chunks: 0,
            chunks_succeeded: 0,
            chunks_failed: 0,
            chunks_skipped: 0,
            images_stored: 0,
            images_failed: 0,
            input_tokens: 0,
            output_tokens: 0,
            manifest_reference: None,
            error: Some(error.into()),
            duration_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status != DocumentStatus::Failed
    }
}

/// Aggregate over a batch of documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    /// One report per source, in input order.
    pub documents: Vec<DocumentReport>,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn from_reports(documents: Vec<DocumentReport>, duration_ms: u64) -> Self {
        let succeeded = documents.iter().filter(|d| d.is_success()).count();
        let failed = documents.len() - succeeded;
        Self {
            documents,
            succeeded,
            failed,
            duration_ms,
        }
    }

    pub fn total(&self) -> usize {
        self.documents.len()
    }
}
