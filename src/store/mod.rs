//! Durable artifact storage.
//!
//! The pipeline core is written once against [`ArtifactStore`]; the backend
//! (local directory, Azure Blob container, memory) is the only thing that
//! varies between deployments.
//!
//! Names are relative, `/`-separated paths such as `spec_part1_pages1-40.md`
//! or `images/spec_page3_img1_<fp>.png`. `put` overwrites, so re-running a
//! document with identical output is harmless.

mod azure;
mod fs;
mod memory;

pub use azure::{AzureBlobConfig, AzureBlobStore};
pub use fs::FsArtifactStore;
pub use memory::MemoryArtifactStore;

use crate::error::StorageError;
use async_trait::async_trait;

/// A place artifacts are written to and read from.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `name`, replacing any previous object, and return
    /// an access reference (path or URL).
    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<String, StorageError>;

    /// Read the object stored under `name`.
    async fn get(&self, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Names of all objects starting with `prefix` (empty prefix lists all).
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Whether an object exists under exactly `name`.
    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.list(name).await?.iter().any(|n| n == name))
    }

    /// Human-readable location for logs and errors.
    fn location(&self) -> String;
}

/// Reject names that could escape the store root or are not plain relative
/// paths.
pub fn validate_name(name: &str) -> Result<(), StorageError> {
    let invalid = |reason: &str| {
        Err(StorageError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.is_empty() {
        return invalid("empty name");
    }
    if name.starts_with('/') || name.contains('\\') {
        return invalid("must be a relative '/'-separated path");
    }
    if name.contains('\0') {
        return invalid("contains a NUL byte");
    }
    for segment in name.split('/') {
        match segment {
            "" => return invalid("empty path segment"),
            "." | ".." => return invalid("'.' and '..' segments are not allowed"),
            _ => {}
        }
    }
    Ok(())
}
