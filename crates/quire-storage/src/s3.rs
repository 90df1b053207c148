use crate::keys::generate_storage_key;
use crate::traits::{Storage, StorageError, StorageResult, StoredObject};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::{ObjectStoreExt, PutPayload};

/// Where published objects live and how their public URLs are formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub bucket: String,
    pub region: String,
    /// S3-compatible endpoint (MinIO, R2, ...). `None` means AWS.
    pub endpoint: Option<String>,
}

impl S3Location {
    /// AWS objects use virtual-hosted URLs; custom endpoints use path style.
    pub fn object_url(&self, key: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                self.bucket,
                key
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            ),
        }
    }
}

/// Publishes media to an S3 bucket through `object_store`.
///
/// Credentials come from the standard `AWS_*` environment variables.
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    location: S3Location,
}

impl S3Storage {
    pub async fn new(
        bucket: String,
        region: String,
        endpoint: Option<String>,
    ) -> StorageResult<Self> {
        let location = S3Location {
            bucket,
            region,
            endpoint,
        };

        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&location.bucket)
            .with_region(&location.region);
        if let Some(endpoint) = &location.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(format!("S3 client: {}", e)))?;

        Ok(Self { store, location })
    }

    pub fn location(&self) -> &S3Location {
        &self.location
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload(
        &self,
        folder: &str,
        filename: &str,
        _content_type: &str,
        data: Bytes,
    ) -> StorageResult<StoredObject> {
        let key = generate_storage_key(folder, filename)?;
        let size = data.len();
        let start = std::time::Instant::now();

        if let Err(e) = self
            .store
            .put(&Path::from(key.as_str()), PutPayload::from(data))
            .await
        {
            tracing::error!(
                bucket = %self.location.bucket,
                key = %key,
                size_bytes = size,
                error = %e,
                "S3 put failed"
            );
            return Err(StorageError::UploadFailed(format!("{}: {}", key, e)));
        }

        tracing::info!(
            bucket = %self.location.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object published to S3"
        );

        Ok(StoredObject {
            url: self.location.object_url(&key),
            key,
        })
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(endpoint: Option<&str>) -> S3Location {
        S3Location {
            bucket: "quire-media".to_string(),
            region: "eu-west-1".to_string(),
            endpoint: endpoint.map(String::from),
        }
    }

    #[test]
    fn test_aws_urls_are_virtual_hosted() {
        assert_eq!(
            location(None).object_url("media/a.jpg"),
            "https://quire-media.s3.eu-west-1.amazonaws.com/media/a.jpg"
        );
    }

    #[test]
    fn test_custom_endpoint_urls_are_path_style() {
        assert_eq!(
            location(Some("http://localhost:9000/")).object_url("media/a.jpg"),
            "http://localhost:9000/quire-media/media/a.jpg"
        );
    }

    #[tokio::test]
    async fn test_new_keeps_location() {
        let storage = S3Storage::new(
            "quire-media".to_string(),
            "eu-west-1".to_string(),
            Some("http://localhost:9000".to_string()),
        )
        .await
        .unwrap();

        assert_eq!(storage.location().bucket, "quire-media");
        assert_eq!(storage.backend_type(), StorageBackend::S3);
    }
}
