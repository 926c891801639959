//! Storage for accepted diagram images.
//!
//! The object store itself is an external collaborator; this module defines
//! the uploader contract the pipeline invokes on accepted images, plus a
//! filesystem implementation for local runs and tests.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::StorageError;

/// Handle to a stored image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredObject {
    /// Key under which the object was stored.
    pub object_key: String,
    /// URL the object can be fetched from.
    pub url: String,
}

/// Uploads accepted diagram images. Invoked only on ACCEPT.
#[async_trait]
pub trait StorageUploader: Send + Sync {
    /// Persists image bytes and returns the stored object's handle.
    async fn put(&self, bytes: &[u8]) -> Result<StoredObject, StorageError>;
}

/// Filesystem-backed uploader for local runs and tests.
#[derive(Debug, Clone)]
pub struct LocalStorageUploader {
    root: PathBuf,
}

impl LocalStorageUploader {
    /// Creates an uploader rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory images land in.
    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

#[async_trait]
impl StorageUploader for LocalStorageUploader {
    async fn put(&self, bytes: &[u8]) -> Result<StoredObject, StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let object_key = format!("{}.png", Uuid::new_v4());
        let path = self.root.join(&object_key);
        tokio::fs::write(&path, bytes).await?;

        debug!(key = %object_key, bytes = bytes.len(), "Stored accepted diagram");
        Ok(StoredObject {
            object_key,
            url: format!("file://{}", path.display()),
        })
    }
}
