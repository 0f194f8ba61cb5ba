//! Document reading: PDF bytes → per-page text plus raw embedded images.
//!
//! [`DocumentReader`] is the seam between the pipeline and the PDF engine.
//! The production implementation, [`PdfiumReader`], wraps `pdfium-render`,
//! which is blocking and keeps thread-local state, so every read runs inside
//! `tokio::task::spawn_blocking`.
//!
//! Image payloads are *not* validated here. A per-image failure becomes a
//! [`RawPayload::Unreadable`] entry so the image extractor can log and skip it
//! without losing the rest of the document.

use crate::document::{Document, Page};
use crate::error::ExtractionError;
use crate::pipeline::encode::encode_png;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Bytes of an embedded image, or why they could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawPayload {
    Bytes(Vec<u8>),
    Unreadable(String),
}

/// One embedded image as found on a page, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    /// 1-indexed page number.
    pub page_num: usize,
    /// 1-indexed position among the page's images.
    pub index: usize,
    pub payload: RawPayload,
}

/// What a reader produces for one document.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub document: Document,
    pub images: Vec<RawImage>,
}

/// Opens a document and yields its pages and raw images.
///
/// Implementations must fail with [`ExtractionError::EmptyDocument`] when the
/// document parses but has no pages.
#[async_trait]
pub trait DocumentReader: Send + Sync {
    async fn read(&self, name: &str, bytes: Vec<u8>) -> Result<ExtractedDocument, ExtractionError>;
}

/// [`DocumentReader`] backed by the pdfium library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumReader {
    password: Option<String>,
    library_path: Option<PathBuf>,
}

impl PdfiumReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// User password for encrypted documents.
    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    /// Explicit pdfium library (file or directory). Overrides `PDFIUM_LIB_PATH`.
    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }
}

#[async_trait]
impl DocumentReader for PdfiumReader {
    async fn read(&self, name: &str, bytes: Vec<u8>) -> Result<ExtractedDocument, ExtractionError> {
        let name = name.to_string();
        let password = self.password.clone();
        let library = self.library_path.clone();

        tokio::task::spawn_blocking(move || {
            read_blocking(&name, &bytes, password.as_deref(), library.as_deref())
        })
        .await
        .map_err(|e| ExtractionError::Internal(format!("Reader task panicked: {}", e)))?
    }
}

/// Bind pdfium: explicit path, then `PDFIUM_LIB_PATH`, then the system library.
fn bind_pdfium(explicit: Option<&Path>) -> Result<Pdfium, ExtractionError> {
    let configured = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

    let bindings = match configured {
        Some(path) => {
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib)
        }
        None => Pdfium::bind_to_system_library(),
    };

    bindings
        .map(Pdfium::new)
        .map_err(|e| ExtractionError::PdfiumBindingFailed(format!("{:?}", e)))
}

fn load_error(name: &str, err: PdfiumError, has_password: bool) -> ExtractionError {
    let err_str = format!("{:?}", err);
    if err_str.contains("Password") || err_str.contains("password") {
        if has_password {
            ExtractionError::WrongPassword {
                name: name.to_string(),
            }
        } else {
            ExtractionError::PasswordRequired {
                name: name.to_string(),
            }
        }
    } else {
        ExtractionError::CorruptPdf {
            name: name.to_string(),
            detail: err_str,
        }
    }
}

fn read_blocking(
    name: &str,
    bytes: &[u8],
    password: Option<&str>,
    library: Option<&Path>,
) -> Result<ExtractedDocument, ExtractionError> {
    let pdfium = bind_pdfium(library)?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, password)
        .map_err(|e| load_error(name, e, password.is_some()))?;

    let pages = document.pages();
    let page_count = pages.len() as usize;
    if page_count == 0 {
        return Err(ExtractionError::EmptyDocument {
            name: name.to_string(),
        });
    }
    info!(document = name, pages = page_count, "PDF loaded");

    let mut out_pages = Vec::with_capacity(page_count);
    let mut images = Vec::new();

    for (i, page) in pages.iter().enumerate() {
        let number = i + 1;
        let text = match page.text() {
            Ok(t) => t.all(),
            Err(e) => {
                warn!(document = name, page = number, "Text extraction failed: {:?}", e);
                String::new()
            }
        };

        let mut index = 0;
        for object in page.objects().iter() {
            let Some(image_object) = object.as_image_object() else {
                continue;
            };
            index += 1;
            let payload = match image_object.get_raw_image() {
                Ok(img) => match encode_png(&img) {
                    Ok(png) => RawPayload::Bytes(png),
                    Err(e) => RawPayload::Unreadable(e.to_string()),
                },
                Err(e) => RawPayload::Unreadable(format!("{:?}", e)),
            };
            images.push(RawImage {
                page_num: number,
                index,
                payload,
            });
        }

        debug!(
            document = name,
            page = number,
            chars = text.len(),
            images = index,
            "Read page"
        );
        out_pages.push(Page::new(number, text));
    }

    Ok(ExtractedDocument {
        document: Document::new(name, out_pages),
        images,
    })
}
