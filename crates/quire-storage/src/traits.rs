//! Storage abstraction trait
//!
//! This module defines the upload capability every storage backend implements.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<StorageError> for quire_core::AppError {
    fn from(err: StorageError) -> Self {
        quire_core::AppError::Storage(err.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Location of an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Internal key, `{folder}/{filename}`
    pub key: String,
    /// Permanent, publicly resolvable URL
    pub url: String,
}

/// Upload capability
///
/// Accepts raw bytes plus a destination folder hint and returns a permanent URL.
/// There is no partial or streaming contract: an upload either yields a
/// [`StoredObject`] or fails.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Upload `data` as `{folder}/{filename}`
    async fn upload(
        &self,
        folder: &str,
        filename: &str,
        content_type: &str,
        data: Bytes,
    ) -> StorageResult<StoredObject>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
