//! In-process artifact store, used by tests and dry runs.

use super::{validate_name, ArtifactStore};
use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// Keeps every artifact in a sorted map; references are `memory://{name}`.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Content type recorded by the last `put` of `name`.
    pub fn content_type(&self, name: &str) -> Option<String> {
        self.objects
            .read()
            .ok()?
            .get(name)
            .map(|o| o.content_type.clone())
    }
}

fn poisoned(name: &str) -> StorageError {
    StorageError::Io {
        name: name.to_string(),
        source: std::io::Error::other("memory store lock poisoned"),
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
        validate_name(name)?;
        let mut objects = self.objects.write().map_err(|_| poisoned(name))?;
        objects.insert(
            name.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(format!("memory://{name}"))
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        validate_name(name)?;
        let objects = self.objects.read().map_err(|_| poisoned(name))?;
        objects
            .get(name)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StorageError::NotFound {
                name: name.to_string(),
            })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let objects = self.objects.read().map_err(|_| poisoned(prefix))?;
        Ok(objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        let objects = self.objects.read().map_err(|_| poisoned(name))?;
        Ok(objects.contains_key(name))
    }

    fn location(&self) -> String {
        "memory://".to_string()
    }
}
