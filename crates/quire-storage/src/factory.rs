#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{Storage, StorageBackend, StorageError, StorageResult};
use quire_core::QuireConfig;
use std::sync::Arc;

#[allow(dead_code)]
fn required(value: Option<&str>, name: &str) -> StorageResult<String> {
    value
        .map(String::from)
        .ok_or_else(|| StorageError::ConfigError(format!("{} is not set", name)))
}

/// Upload capability for the backend selected by `STORAGE_BACKEND`.
pub async fn create_storage(config: &QuireConfig) -> StorageResult<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.storage_backend() {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => Arc::new(
            S3Storage::new(
                required(config.s3_bucket(), "S3_BUCKET")?,
                required(config.s3_region(), "S3_REGION")?,
                config.s3_endpoint().map(String::from),
            )
            .await?,
        ),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => Arc::new(
            LocalStorage::new(
                required(config.local_storage_path(), "LOCAL_STORAGE_PATH")?,
                required(config.local_storage_base_url(), "LOCAL_STORAGE_BASE_URL")?,
            )
            .await?,
        ),

        #[allow(unreachable_patterns)]
        other => {
            return Err(StorageError::ConfigError(format!(
                "{} backend is not compiled into this build",
                other
            )))
        }
    };

    tracing::debug!(backend = %storage.backend_type(), "Upload storage created");
    Ok(storage)
}
