//! Pipeline stages for chunked PDF-to-Markdown transformation.
//!
//! Each submodule implements one step and is testable on its own; the
//! [`crate::driver`] wires them together per document.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ read ──▶ images ──▶ chunk ──▶ transform ──▶ postprocess
//! (bytes)  (pdfium)  (sha256)  (plan)    (LLM loop)     (cleanup)
//! ```
//!
//! 1. [`input`]     : resolve a path, URL, buffer or stored object to PDF bytes
//! 2. [`read`]      : per-page text and raw images; pdfium runs in `spawn_blocking`
//! 3. [`images`]    : validate, fingerprint and name embedded images
//! 4. [`chunk`]     : partition pages into fixed-size chunks with their images
//! 5. [`transform`] : one LLM call per chunk with rate-limit backoff and pacing
//! 6. [`postprocess`] : deterministic Markdown cleanup of each output
//!
//! [`encode`] re-encodes decoded pdfium bitmaps as PNG for [`read`].

pub mod chunk;
pub mod encode;
pub mod images;
pub mod input;
pub mod postprocess;
pub mod read;
pub mod transform;
