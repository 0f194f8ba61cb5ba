//! Streaming batch API: emit document reports as documents finish.
//!
//! [`crate::driver::PipelineDriver::process_batch`] returns only after every
//! document is done and keeps input order. [`process_stream`] instead yields
//! each [`DocumentReport`] as soon as its document completes, which suits
//! long batches where callers want to react (index, notify, log) per document.
//! With `document_concurrency > 1` reports arrive in completion order.

use crate::driver::PipelineDriver;
use crate::output::DocumentReport;
use crate::pipeline::input::DocumentSource;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-document reports.
pub type ReportStream = Pin<Box<dyn Stream<Item = DocumentReport> + Send>>;

/// Process `sources`, yielding one report per document as it completes.
///
/// Batch-level observer events are not fired; per-document and per-chunk
/// events are.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdfchunk::{process_stream, DocumentSource, FsArtifactStore, PipelineDriver};
/// use futures::StreamExt;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let driver = PipelineDriver::builder()
///     .store(Arc::new(FsArtifactStore::new("out")))
///     .build()?;
/// let sources = vec![DocumentSource::parse("a.pdf"), DocumentSource::parse("b.pdf")];
/// let mut reports = process_stream(driver, sources);
/// while let Some(report) = reports.next().await {
///     println!("{}: {:?}", report.document, report.status);
/// }
/// # Ok(())
/// # }
/// ```
pub fn process_stream(driver: PipelineDriver, sources: Vec<DocumentSource>) -> ReportStream {
    let concurrency = driver.config().document_concurrency;
    info!("Streaming {} documents", sources.len());

    let s = stream::iter(sources.into_iter().map(move |source| {
        let driver = driver.clone();
        async move { driver.process_document(&source).await }
    }))
    .buffer_unordered(concurrency);

    Box::pin(s)
}
