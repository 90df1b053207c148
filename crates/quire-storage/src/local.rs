use crate::keys::{generate_storage_key, validate_key};
use crate::traits::{Storage, StorageError, StorageResult, StoredObject};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const PARTIAL_SUFFIX: &str = "part";

/// Publishes media into a directory that a web server exposes at `base_url`.
///
/// Each object is written to a sibling `.part` file and renamed into place, so a
/// reader never sees a truncated upload. Uploading an existing key replaces it.
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// * `root` - directory objects are written under (e.g. "/var/lib/quire/media")
    /// * `base_url` - public URL of that directory (e.g. "http://localhost:8080/media")
    pub async fn new(root: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Cannot create media directory {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self {
            root,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Filesystem location of `key`, refusing anything that escapes the root.
    fn locate(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        let path = self.root.join(key);

        // Symlinks inside the root may still point elsewhere
        if let (Ok(root), Ok(resolved)) = (self.root.canonicalize(), path.canonicalize()) {
            if !resolved.starts_with(&root) {
                return Err(StorageError::InvalidKey(format!(
                    "{} resolves outside the media directory",
                    key
                )));
            }
        }

        Ok(path)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    async fn write_object(path: &Path, data: &[u8]) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let partial = path.with_extension(match path.extension() {
            Some(ext) => format!("{}.{}", ext.to_string_lossy(), PARTIAL_SUFFIX),
            None => PARTIAL_SUFFIX.to_string(),
        });

        let mut file = fs::File::create(&partial).await?;
        let written = async {
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        match written {
            Ok(()) => fs::rename(&partial, path).await,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(
        &self,
        folder: &str,
        filename: &str,
        _content_type: &str,
        data: Bytes,
    ) -> StorageResult<StoredObject> {
        let key = generate_storage_key(folder, filename)?;
        let path = self.locate(&key)?;
        let start = std::time::Instant::now();

        Self::write_object(&path, &data).await.map_err(|e| {
            StorageError::UploadFailed(format!("{}: {}", path.display(), e))
        })?;

        tracing::info!(
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object published to local media directory"
        );

        Ok(StoredObject {
            url: self.public_url(&key),
            key,
        })
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn media_dir(dir: &Path) -> LocalStorage {
        LocalStorage::new(dir, "http://localhost:8080/media/".to_string())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_returns_public_url() {
        let dir = tempdir().unwrap();
        let storage = media_dir(dir.path()).await;
        let data = Bytes::from_static(b"\xFF\xD8\xFFjpeg");

        let stored = storage
            .upload("posts", "a1.jpg", "image/jpeg", data.clone())
            .await
            .unwrap();

        assert_eq!(stored.key, "posts/a1.jpg");
        assert_eq!(stored.url, "http://localhost:8080/media/posts/a1.jpg");
        assert_eq!(std::fs::read(dir.path().join("posts/a1.jpg")).unwrap(), &data[..]);
        assert!(!dir.path().join("posts/a1.jpg.part").exists());
    }

    #[tokio::test]
    async fn test_upload_same_key_replaces_object() {
        let dir = tempdir().unwrap();
        let storage = media_dir(dir.path()).await;

        storage
            .upload("posts", "b.png", "image/png", Bytes::from_static(b"first"))
            .await
            .unwrap();
        let stored = storage
            .upload("posts", "b.png", "image/png", Bytes::from_static(b"second"))
            .await
            .unwrap();

        assert_eq!(std::fs::read(dir.path().join(&stored.key)).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_keys_outside_root_rejected() {
        let dir = tempdir().unwrap();
        let storage = media_dir(dir.path()).await;

        assert!(matches!(
            storage
                .upload("media", "../../etc/passwd", "image/jpeg", Bytes::new())
                .await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage
                .upload("..", "passwd", "image/jpeg", Bytes::new())
                .await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage
                .upload("../outside", "x.jpg", "image/jpeg", Bytes::new())
                .await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
