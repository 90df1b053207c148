use bytes::Bytes;
use quire_core::{CropRegion, MediaKind, ProcessedAsset, ProcessingOptions, Rotation};
use quire_processing::{decode_source, MediaPipeline, MediaValidator, PipelineError, ValidationError};
use tokio_util::sync::CancellationToken;

use crate::coordinator::{UploadCoordinator, UploadError};
use crate::document::ContentDocument;
use crate::registry::{PendingId, PendingMediaRegistry, RegistryError, StagedMedia};
use crate::resolver::{resolve, UnresolvedReference};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Expected {expected} media, got {content_type}")]
    WrongKind {
        expected: &'static str,
        content_type: String,
    },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl From<SessionError> for quire_core::AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Validation(e) => e.into(),
            e @ SessionError::WrongKind { .. } => quire_core::AppError::InvalidInput(e.to_string()),
            SessionError::Pipeline(e) => e.into(),
            SessionError::Registry(e) => e.into(),
            SessionError::Upload(e) => e.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StagedImage {
    pub media: StagedMedia,
    pub asset: ProcessedAsset,
}

/// Result of a successful save.
#[derive(Debug, Clone)]
pub struct SaveReport {
    pub document: ContentDocument,
    pub uploaded: usize,
    pub warnings: Vec<UnresolvedReference>,
}

/// One editing session: staged media plus the services that process and publish it.
///
/// Dropping the session releases every preview that is still staged.
pub struct EditingSession {
    registry: PendingMediaRegistry,
    pipeline: MediaPipeline,
    validator: MediaValidator,
    options: ProcessingOptions,
    coordinator: UploadCoordinator,
}

impl EditingSession {
    pub fn new(
        registry: PendingMediaRegistry,
        pipeline: MediaPipeline,
        validator: MediaValidator,
        options: ProcessingOptions,
        coordinator: UploadCoordinator,
    ) -> Self {
        Self {
            registry,
            pipeline,
            validator,
            options,
            coordinator,
        }
    }

    pub fn registry(&self) -> &PendingMediaRegistry {
        &self.registry
    }

    pub fn options(&self) -> &ProcessingOptions {
        &self.options
    }

    /// Validate, crop, rotate, watermark and compress an image, then stage it.
    pub async fn stage_image(
        &mut self,
        data: &[u8],
        content_type: &str,
        crop: &CropRegion,
        rotation: Rotation,
        cancel: &CancellationToken,
    ) -> Result<StagedImage, SessionError> {
        let kind = self.validator.validate(content_type, data)?;
        if kind != MediaKind::Image {
            return Err(SessionError::WrongKind {
                expected: MediaKind::Image.as_str(),
                content_type: content_type.to_string(),
            });
        }

        let source = decode_source(data)?;
        let asset = self
            .pipeline
            .process(&source, crop, rotation, &self.options, cancel)
            .await?;

        let media = self
            .registry
            .add(asset.bytes.clone(), MediaKind::Image, asset.content_type())?;

        tracing::info!(
            pending_id = %media.id,
            input_bytes = data.len(),
            output_bytes = asset.compressed_byte_size,
            degraded = asset.degraded,
            "Image staged"
        );

        Ok(StagedImage { media, asset })
    }

    /// Stage a video as-is. Videos skip the image pipeline.
    pub fn stage_video(&mut self, data: Bytes, content_type: &str) -> Result<StagedMedia, SessionError> {
        let kind = self.validator.validate(content_type, &data)?;
        if kind != MediaKind::Video {
            return Err(SessionError::WrongKind {
                expected: MediaKind::Video.as_str(),
                content_type: content_type.to_string(),
            });
        }

        let media = self.registry.add(data, MediaKind::Video, content_type)?;
        tracing::info!(pending_id = %media.id, "Video staged");
        Ok(media)
    }

    /// Upload every staged entry, rewrite the document and release what was published.
    ///
    /// An upload failure leaves the registry untouched so the save can be retried.
    pub async fn save(
        &mut self,
        document: &ContentDocument,
        cancel: &CancellationToken,
    ) -> Result<SaveReport, SessionError> {
        let results = self.coordinator.upload_all(&mut self.registry, cancel).await?;
        let resolution = resolve(document, &results);

        let released = self.registry.release_resolved(results.uploaded_ids());

        tracing::info!(
            uploaded = results.len(),
            resolved = resolution.resolved.len(),
            unresolved = resolution.unresolved.len(),
            released = released,
            "Document saved"
        );

        Ok(SaveReport {
            document: resolution.document,
            uploaded: results.len(),
            warnings: resolution.unresolved,
        })
    }

    /// Drop one staged asset. Returns `false` for unknown ids.
    pub fn discard(&mut self, id: &PendingId) -> bool {
        self.registry.remove(id)
    }

    /// Release everything staged in this session.
    pub fn abandon(&mut self) -> usize {
        let released = self.registry.clear();
        if released > 0 {
            tracing::info!(released = released, "Editing session abandoned");
        }
        released
    }
}
