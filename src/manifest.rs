//! The run manifest: the one on-disk format downstream indexers parse.
//!
//! Field names are part of the contract (`pdf_name`, `chunk_index`,
//! `page_num`, `img_index`, `hash`, `created_at`, …) and must stay stable.

use crate::document::{Chunk, ImageAsset};
use crate::output::{ChunkResult, ChunkStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything produced while processing one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub pdf_name: String,
    pub total_pages: usize,
    pub total_chunks: usize,
    /// Ordered by `chunk_index`.
    pub chunks: Vec<ChunkEntry>,
    pub images: Vec<ImageEntry>,
    pub created_at: DateTime<Utc>,
}

/// Manifest entry for one chunk, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub chunk_index: usize,
    pub start_page: usize,
    pub end_page: usize,
    pub status: ChunkStatus,
    /// Output artifact name; set whenever an output was produced.
    pub filename: Option<String>,
    /// Storage reference of the output; `None` unless stored.
    pub reference: Option<String>,
    /// Filenames of the images associated with this chunk.
    pub images: Vec<String>,
    pub rate_limit_retries: u32,
    pub error: Option<String>,
}

/// Manifest entry for one extracted image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub page_num: usize,
    pub img_index: usize,
    pub filename: String,
    pub blob_path: String,
    /// `None` when the upload failed.
    pub reference: Option<String>,
    pub hash: String,
}

impl From<&ImageAsset> for ImageEntry {
    fn from(img: &ImageAsset) -> Self {
        Self {
            page_num: img.page_num,
            img_index: img.index,
            filename: img.filename.clone(),
            blob_path: img.storage_name(),
            reference: img.reference.clone(),
            hash: img.fingerprint.clone(),
        }
    }
}

impl ChunkEntry {
    /// Build the entry from the chunk, its transformation result and the
    /// outcome of storing the output.
    pub fn new(
        chunk: &Chunk,
        result: &ChunkResult,
        filename: Option<String>,
        stored: Result<String, String>,
    ) -> Self {
        let mut status = result.status;
        let mut error = result.error.as_ref().map(|e| e.to_string());
        let mut reference = None;

        if result.is_success() {
            match stored {
                Ok(r) => reference = Some(r),
                Err(e) => {
                    status = ChunkStatus::StorageFailed;
                    error = Some(e);
                }
            }
        }

        Self {
            chunk_index: chunk.index,
            start_page: chunk.start_page,
            end_page: chunk.end_page,
            status,
            filename,
            reference,
            images: chunk.images.iter().map(|i| i.filename.clone()).collect(),
            rate_limit_retries: result.rate_limit_retries,
            error,
        }
    }
}

impl RunManifest {
    pub fn new(pdf_name: impl Into<String>, total_pages: usize, total_chunks: usize) -> Self {
        Self {
            pdf_name: pdf_name.into(),
            total_pages,
            total_chunks,
            chunks: Vec::with_capacity(total_chunks),
            images: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Artifact name of the manifest itself.
    pub fn storage_name(&self) -> String {
        manifest_name(&self.pdf_name)
    }

    /// Record the document's images (with whatever references they got).
    pub fn set_images(&mut self, images: &[ImageAsset]) {
        self.images = images.iter().map(ImageEntry::from).collect();
    }

    /// Insert a chunk entry, keeping entries ordered by `chunk_index` even if
    /// results arrive out of order.
    pub fn push_chunk(&mut self, entry: ChunkEntry) {
        let pos = self
            .chunks
            .partition_point(|c| c.chunk_index < entry.chunk_index);
        self.chunks.insert(pos, entry);
    }

    pub fn count_status(&self, status: ChunkStatus) -> usize {
        self.chunks.iter().filter(|c| c.status == status).count()
    }

    /// Pretty-printed UTF-8 JSON.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// `{document}_metadata.json`
pub fn manifest_name(document: &str) -> String {
    format!("{document}_metadata.json")
}
