//! Error types for the edgequake-pdfchunk library.
//!
//! Errors are split by the scope they are fatal to, so each stage can handle
//! them at the narrowest level that still lets sibling work continue:
//!
//! | Type | Fatal to | Handled by |
//! |------|----------|------------|
//! | [`PipelineError`]   | the whole run (bad config, no provider) | caller |
//! | [`ExtractionError`] | one document | driver: counts it, moves on |
//! | [`ImageDecodeError`]| one embedded image | image extractor: logs, skips |
//! | [`TransformError`]  | one chunk (except `RateLimited`, which is retried) | orchestrator |
//! | [`StorageError`]    | one artifact | driver: records status, moves on |

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors: the pipeline cannot start or cannot enumerate its input.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured LLM provider could not be created (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Listing the source location failed.
    #[error("Failed to list source documents in '{location}': {detail}")]
    SourceListing { location: String, detail: String },

    /// A named source document does not exist in the store.
    #[error("Source document '{name}' not found")]
    SourceNotFound { name: String },

    /// A required builder component was not supplied.
    #[error("Pipeline is missing its {0}")]
    MissingComponent(&'static str),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A document could not be opened or parsed. Fatal to that document only.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP download of a URL source failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The source was fetched from an artifact store and the fetch failed.
    #[error("Failed to fetch '{name}' from storage: {source}")]
    Fetch {
        name: String,
        #[source]
        source: StorageError,
    },

    /// The bytes were read but do not start with the `%PDF` header.
    #[error("'{name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: Vec<u8> },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{name}' is corrupt: {detail}")]
    CorruptPdf { name: String, detail: String },

    /// PDF requires a password but none was configured.
    #[error("PDF '{name}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { name: String },

    /// A password was configured but it is wrong.
    #[error("Wrong password for PDF '{name}'")]
    WrongPassword { name: String },

    /// The document parsed but has no pages.
    ///
    /// The driver treats this as an empty (not failed) document.
    #[error("PDF '{name}' has no pages")]
    EmptyDocument { name: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install libpdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    /// Unexpected internal error (e.g. the blocking reader task panicked).
    #[error("Internal extraction error: {0}")]
    Internal(String),
}

/// One embedded image could not be used. Fatal to that image only.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ImageDecodeError {
    /// pdfium could not hand out the image stream.
    #[error("Page {page}, image {index}: image stream unreadable: {detail}")]
    Unreadable {
        page: usize,
        index: usize,
        detail: String,
    },

    /// The bytes do not match any known image signature.
    #[error("Page {page}, image {index}: unrecognised image format")]
    UnknownFormat { page: usize, index: usize },

    /// The signature was recognised but the payload failed to decode.
    #[error("Page {page}, image {index}: corrupt image data: {detail}")]
    Corrupt {
        page: usize,
        index: usize,
        detail: String,
    },
}

/// A transformation call failed.
///
/// Only [`TransformError::RateLimited`] is recoverable; the orchestrator
/// backs off and retries it. Every other variant ends the chunk as failed.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum TransformError {
    /// The provider signalled throttling (HTTP 429 or equivalent).
    #[error("Rate limited by the transformation service: {detail}")]
    RateLimited {
        retry_after_secs: Option<u64>,
        detail: String,
    },

    /// Malformed response, transport error, auth error, content filter…
    #[error("Transformation failed: {detail}")]
    Failed { detail: String },

    /// The call did not complete within the configured timeout.
    #[error("Transformation call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The rate-limit retry ceiling was reached.
    #[error("Still rate limited after {retries} retries: {detail}")]
    RetriesExhausted { retries: u32, detail: String },

    /// The run was cancelled while this chunk was waiting or in flight.
    #[error("Transformation cancelled")]
    Cancelled,
}

impl TransformError {
    /// `true` for the one variant the orchestrator retries.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TransformError::RateLimited { .. })
    }
}

/// Persisting or fetching one artifact failed. Fatal to that artifact only.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Artifact names must be relative, `/`-separated and free of `..`.
    #[error("Invalid artifact name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// No artifact exists under that name.
    #[error("Artifact '{name}' not found")]
    NotFound { name: String },

    /// Local filesystem failure.
    #[error("I/O error on '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Transport-level HTTP failure (DNS, TLS, connection reset…).
    #[error("HTTP request for '{name}' failed: {reason}")]
    Http { name: String, reason: String },

    /// The remote store answered with a non-success status.
    #[error("Remote store returned HTTP {status} for '{name}': {body}")]
    Status {
        name: String,
        status: u16,
        body: String,
    },

    /// Serialising an artifact (the manifest) failed before upload.
    #[error("Failed to serialise '{name}': {detail}")]
    Serialize { name: String, detail: String },
}
