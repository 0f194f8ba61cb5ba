//! Local-directory artifact store.

use super::{validate_name, ArtifactStore};
use crate::error::StorageError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stores artifacts as files under a root directory.
///
/// Writes go to `<name>.tmp` first and are renamed into place, so a reader
/// never observes a half-written artifact. The reference returned by `put`
/// is the absolute file path.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

fn io_err(name: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        name: name.to_string(),
        source,
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(
        &self,
        name: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        let path = self.path_for(name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err(name))?;
        }

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &bytes).await.map_err(io_err(name))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(name)(e));
        }

        debug!(artifact = name, bytes = bytes.len(), "Wrote {}", path.display());
        Ok(path.to_string_lossy().into_owned())
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(io_err(name)(e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(io_err(prefix)(e)),
            };
            while let Some(entry) = entries.next_entry().await.map_err(io_err(prefix))? {
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(io_err(prefix))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(rel) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let rel: Vec<_> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                let rel = rel.join("/");
                if rel.ends_with(".tmp") {
                    continue;
                }
                if rel.starts_with(prefix) {
                    names.push(rel);
                }
            }
        }

        names.sort();
        Ok(names)
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        let path = self.path_for(name)?;
        Ok(tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false))
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }
}
