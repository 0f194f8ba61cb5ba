//! Core data model: documents, pages, image assets and chunks.
//!
//! Everything here is created by one pipeline stage and read by the next.
//! Only [`ImageAsset`] is ever mutated after creation, and only once, when
//! the artifact store attaches its storage reference.

use serde::{Deserialize, Serialize};

/// A single page of extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-indexed page number.
    pub number: usize,
    /// Extracted plain text; empty for scanned or image-only pages.
    pub text: String,
}

impl Page {
    pub fn new(number: usize, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }
}

/// A document as produced by the reader: a name and its pages in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Base name without extension, used as the prefix of every artifact.
    pub name: String,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn new(name: impl Into<String>, pages: Vec<Page>) -> Self {
        Self {
            name: name.into(),
            pages,
        }
    }

    /// A document with no pages, recorded as empty rather than failed.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// An embedded image, fingerprinted and deterministically named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    /// 1-indexed page the image was found on.
    pub page_num: usize,
    /// 1-indexed position of the image on its page.
    pub index: usize,
    /// Content fingerprint (hex) over `bytes`.
    pub fingerprint: String,
    /// Encoded image payload.
    pub bytes: Vec<u8>,
    /// File extension without the dot, e.g. `png`.
    pub ext: String,
    /// `{document}_page{N}_img{K}_{fingerprint}.{ext}`
    pub filename: String,
    /// Storage reference, set once the bytes are persisted.
    pub reference: Option<String>,
}

impl ImageAsset {
    /// Object name inside the artifact store.
    pub fn storage_name(&self) -> String {
        format!("images/{}", self.filename)
    }

    pub fn content_type(&self) -> String {
        match self.ext.as_str() {
            "jpg" => "image/jpeg".to_string(),
            ext => format!("image/{ext}"),
        }
    }

    /// Attach the reference returned by the store. Later calls are ignored.
    pub fn attach_reference(&mut self, reference: String) {
        if self.reference.is_none() {
            self.reference = Some(reference);
        }
    }

    /// Lightweight handle carried by chunks (no payload bytes).
    pub fn as_ref_info(&self) -> ImageRef {
        ImageRef {
            page_num: self.page_num,
            index: self.index,
            filename: self.filename.clone(),
            reference: self.reference.clone(),
        }
    }
}

/// A reference to an [`ImageAsset`] held by a [`Chunk`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub page_num: usize,
    pub index: usize,
    pub filename: String,
    pub reference: Option<String>,
}

/// A contiguous group of pages transformed as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 0-indexed, sequential.
    pub index: usize,
    /// First page (1-indexed, inclusive).
    pub start_page: usize,
    /// Last page (1-indexed, inclusive).
    pub end_page: usize,
    /// Page texts joined with page-boundary markers.
    pub text: String,
    /// Images whose source page lies in `start_page..=end_page`.
    pub images: Vec<ImageRef>,
    /// `false` when every page in the range extracted as whitespace only.
    pub has_text: bool,
}

impl Chunk {
    pub fn page_count(&self) -> usize {
        self.end_page + 1 - self.start_page
    }

    /// Deterministic name of this chunk's Markdown artifact.
    pub fn output_name(&self, document: &str) -> String {
        format!(
            "{}_part{}_pages{}-{}.md",
            document,
            self.index + 1,
            self.start_page,
            self.end_page
        )
    }
}
