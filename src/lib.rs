//! # edgequake-pdfchunk
//!
//! Turn large technical PDFs (interface specifications, API references) into
//! retrieval-ready Markdown: one Markdown artifact per page range, every
//! embedded image stored under a deterministic name, and a JSON manifest
//! tying them together.
//!
//! ## Why chunks?
//!
//! A 300-page specification does not fit in one LLM call, and page-by-page
//! calls lose tables and examples that straddle page breaks. The pipeline
//! groups pages into fixed-size chunks (40 by default), asks the model to
//! rewrite each chunk as Markdown *without summarising*, and records exactly
//! what was produced so a later indexer (or a re-run) knows where everything is.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      path / URL / bytes / stored object → PDF bytes
//!  ├─ 2. Read       per-page text + embedded images (pdfium, spawn_blocking)
//!  ├─ 3. Images     validate, SHA-256 fingerprint, deterministic names, store
//!  ├─ 4. Chunk      pages [1..C], [C+1..2C], … with their images
//!  ├─ 5. Transform  one LLM call per chunk; 429 → back off and retry
//!  ├─ 6. Store      {doc}_part{i}_pages{s}-{e}.md
//!  └─ 7. Manifest   {doc}_metadata.json
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfchunk::{FsArtifactStore, PipelineConfig, PipelineDriver};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = PipelineConfig::builder().chunk_size(40).build()?;
//!     let driver = PipelineDriver::builder()
//!         .config(config)
//!         .store(Arc::new(FsArtifactStore::new("out")))
//!         .build()?;
//!     let batch = driver.process_directory(Path::new("specs")).await?;
//!     eprintln!("{}/{} documents succeeded", batch.succeeded, batch.total());
//!     Ok(())
//! }
//! ```
//!
//! ## Storage backends
//!
//! | Store | Reference returned by `put` |
//! |-------|-----------------------------|
//! | [`FsArtifactStore`]     | absolute file path |
//! | [`AzureBlobStore`]      | blob URL (without SAS token) |
//! | [`MemoryArtifactStore`] | `memory://{name}` |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfchunk` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod driver;
pub mod error;
pub mod manifest;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod store;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder, DEFAULT_CHUNK_SIZE};
pub use document::{Chunk, Document, ImageAsset, ImageRef, Page};
pub use driver::{PipelineDriver, PipelineDriverBuilder};
pub use error::{ExtractionError, ImageDecodeError, PipelineError, StorageError, TransformError};
pub use manifest::{manifest_name, ChunkEntry, ImageEntry, RunManifest};
pub use output::{BatchReport, ChunkResult, ChunkStatus, DocumentReport, DocumentStatus};
pub use pipeline::input::DocumentSource;
pub use pipeline::read::{DocumentReader, ExtractedDocument, PdfiumReader, RawImage, RawPayload};
pub use pipeline::transform::{LlmTransformer, Transformed, Transformer};
pub use progress::{NoopObserver, PipelineObserver, ProgressObserver};
pub use store::{ArtifactStore, AzureBlobConfig, AzureBlobStore, FsArtifactStore, MemoryArtifactStore};
pub use stream::{process_stream, ReportStream};
