//! Source resolution: turn a document handle into the bytes of a PDF.
//!
//! A source is a local path, an `http(s)://` URL, an in-memory buffer or a
//! named object in an [`ArtifactStore`]. Whatever the origin, the `%PDF`
//! header is checked here so the reader only ever sees plausible input and
//! callers get a meaningful error instead of a pdfium failure.

use crate::error::{ExtractionError, PipelineError};
use crate::store::ArtifactStore;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Where a document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// A file on the local filesystem.
    Path(PathBuf),
    /// A document downloaded over HTTP(S).
    Url(String),
    /// A buffer already in memory; `name` becomes the document name.
    Bytes { name: String, bytes: Vec<u8> },
    /// An object in the pipeline's artifact store, by name.
    Stored(String),
}

impl DocumentSource {
    /// Interpret a user-supplied string as a URL or a local path.
    pub fn parse(input: &str) -> Self {
        if is_url(input) {
            DocumentSource::Url(input.to_string())
        } else {
            DocumentSource::Path(PathBuf::from(input))
        }
    }

    /// Base name (no directory, no `.pdf`) used to prefix every artifact.
    pub fn document_name(&self) -> String {
        match self {
            DocumentSource::Path(p) => p
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document".to_string()),
            DocumentSource::Url(url) => url_file_name(url)
                .map(|n| strip_pdf_extension(&n).to_string())
                .unwrap_or_else(|| "downloaded".to_string()),
            DocumentSource::Bytes { name, .. } => strip_pdf_extension(name).to_string(),
            DocumentSource::Stored(name) => {
                let base = name.rsplit('/').next().unwrap_or(name);
                strip_pdf_extension(base).to_string()
            }
        }
    }
}

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentSource::Path(p) => write!(f, "{}", p.display()),
            DocumentSource::Url(u) => f.write_str(u),
            DocumentSource::Bytes { name, bytes } => write!(f, "{name} ({} bytes)", bytes.len()),
            DocumentSource::Stored(name) => write!(f, "store:{name}"),
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Case-insensitive `.pdf` suffix check used by every listing.
pub fn is_pdf_name(name: &str) -> bool {
    name.len() > 4
        && name
            .get(name.len() - 4..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(".pdf"))
}

fn strip_pdf_extension(name: &str) -> &str {
    if is_pdf_name(name) {
        // The last four bytes are ASCII, so this is a char boundary.
        name.get(..name.len() - 4).unwrap_or(name)
    } else {
        name
    }
}

fn url_file_name(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    (!last.is_empty()).then(|| last.to_string())
}

/// Fetch the bytes of `source` and verify the PDF header.
pub async fn resolve(
    source: &DocumentSource,
    store: &dyn ArtifactStore,
    download_timeout_secs: u64,
) -> Result<Vec<u8>, ExtractionError> {
    let name = source.document_name();
    let bytes = match source {
        DocumentSource::Path(path) => read_local(path).await?,
        DocumentSource::Url(url) => download_url(url, download_timeout_secs).await?,
        DocumentSource::Bytes { bytes, .. } => bytes.clone(),
        DocumentSource::Stored(object) => {
            store
                .get(object)
                .await
                .map_err(|source| ExtractionError::Fetch {
                    name: object.clone(),
                    source,
                })?
        }
    };
    check_pdf_magic(&name, &bytes)?;
    debug!(document = %name, bytes = bytes.len(), "Resolved source");
    Ok(bytes)
}

/// Reject input that does not start with `%PDF`.
pub fn check_pdf_magic(name: &str, bytes: &[u8]) -> Result<(), ExtractionError> {
    if bytes.starts_with(b"%PDF") {
        Ok(())
    } else {
        Err(ExtractionError::NotAPdf {
            name: name.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        })
    }
}

async fn read_local(path: &Path) -> Result<Vec<u8>, ExtractionError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(ExtractionError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => Err(ExtractionError::FileNotFound {
            path: path.to_path_buf(),
        }),
    }
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, ExtractionError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ExtractionError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send = |e: reqwest::Error| {
        if e.is_timeout() {
            ExtractionError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ExtractionError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send)?;
    if !response.status().is_success() {
        return Err(ExtractionError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_send)?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}

/// List `.pdf` files directly inside `dir`, sorted by name.
pub fn list_directory(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let listing_err = |detail: String| PipelineError::SourceListing {
        location: dir.display().to_string(),
        detail,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| listing_err(e.to_string()))? {
        let entry = entry.map_err(|e| listing_err(e.to_string()))?;
        let path = entry.path();
        let is_pdf = path
            .file_name()
            .map(|n| is_pdf_name(&n.to_string_lossy()))
            .unwrap_or(false);
        if is_pdf && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// List `.pdf` objects in `store` under `prefix`, sorted by name.
pub async fn list_store(store: &dyn ArtifactStore, prefix: &str) -> Result<Vec<String>, PipelineError> {
    let mut names: Vec<String> = store
        .list(prefix)
        .await
        .map_err(|e| PipelineError::SourceListing {
            location: store.location(),
            detail: e.to_string(),
        })?
        .into_iter()
        .filter(|n| is_pdf_name(n))
        .collect();
    names.sort();
    Ok(names)
}
