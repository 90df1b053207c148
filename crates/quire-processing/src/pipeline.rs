use image::{ImageReader, RgbaImage};
use quire_core::{CropRegion, GeometryError, ProcessedAsset, ProcessingOptions, Rotation};
use std::io::Cursor;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::compression::{AdaptiveCompressor, CompressionError, ImageCodec};
use crate::image::{TransformEngine, TransformError, WatermarkEngine, WatermarkError, WatermarkStyle};

/// Quality used by the crop-only fallback encode.
pub const FALLBACK_QUALITY: f32 = 0.8;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to decode source image: {0}")]
    Decode(String),

    #[error(transparent)]
    InvalidGeometry(#[from] GeometryError),

    #[error("Crop-only fallback failed: {0}")]
    FallbackFailed(#[source] CompressionError),

    #[error("Processing cancelled")]
    Cancelled,
}

impl From<PipelineError> for quire_core::AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Decode(msg) => quire_core::AppError::ImageProcessing(msg),
            PipelineError::InvalidGeometry(e) => quire_core::AppError::InvalidGeometry(e),
            PipelineError::FallbackFailed(e) => quire_core::AppError::Encode(e.to_string()),
            PipelineError::Cancelled => {
                quire_core::AppError::Cancelled("image processing".to_string())
            }
        }
    }
}

/// A recoverable failure in one of the composed stages.
#[derive(Debug, thiserror::Error)]
enum StageError {
    #[error("transform: {0}")]
    Transform(#[from] TransformError),

    #[error("watermark: {0}")]
    Watermark(#[from] WatermarkError),

    #[error("compression: {0}")]
    Compression(#[from] CompressionError),

    #[error("stage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("cancelled")]
    Cancelled,
}

/// Decode selected bytes into an RGBA source bitmap.
pub fn decode_source(data: &[u8]) -> Result<RgbaImage, PipelineError> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| PipelineError::Decode(e.to_string()))?;
    let image = reader
        .decode()
        .map_err(|e| PipelineError::Decode(e.to_string()))?;
    Ok(image.to_rgba8())
}

/// Transform, watermark and compress in that order.
///
/// Any stage failure other than invalid geometry or cancellation falls back to a
/// plain crop (no rotation, no watermark) encoded with the built-in codec, and
/// the asset is flagged `degraded`.
#[derive(Clone)]
pub struct MediaPipeline {
    compressor: AdaptiveCompressor,
    watermark: Option<WatermarkEngine>,
    style: WatermarkStyle,
}

impl MediaPipeline {
    pub fn new(
        compressor: AdaptiveCompressor,
        watermark: Option<WatermarkEngine>,
        style: WatermarkStyle,
    ) -> Self {
        Self {
            compressor,
            watermark,
            style,
        }
    }

    pub fn watermark_style(&self) -> &WatermarkStyle {
        &self.style
    }

    pub async fn process(
        &self,
        source: &RgbaImage,
        crop: &CropRegion,
        rotation: Rotation,
        options: &ProcessingOptions,
        cancel: &CancellationToken,
    ) -> Result<ProcessedAsset, PipelineError> {
        crop.validate_within(source.width(), source.height())?;

        let start = std::time::Instant::now();

        match self.run_stages(source, crop, rotation, options, cancel).await {
            Ok(asset) => {
                tracing::info!(
                    width = asset.final_width,
                    height = asset.final_height,
                    original_bytes = asset.original_byte_size,
                    compressed_bytes = asset.compressed_byte_size,
                    compression_ratio = asset.compression_ratio,
                    budget_exceeded = asset.budget_exceeded,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Image processed"
                );
                Ok(asset)
            }
            Err(StageError::Transform(TransformError::InvalidCrop(e))) => {
                Err(PipelineError::InvalidGeometry(e))
            }
            Err(StageError::Cancelled | StageError::Compression(CompressionError::Cancelled)) => {
                Err(PipelineError::Cancelled)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    crop = %crop,
                    "Processing stage failed, falling back to crop-only output"
                );
                self.crop_only(source, crop, options, cancel).await
            }
        }
    }

    async fn run_stages(
        &self,
        source: &RgbaImage,
        crop: &CropRegion,
        rotation: Rotation,
        options: &ProcessingOptions,
        cancel: &CancellationToken,
    ) -> Result<ProcessedAsset, StageError> {
        let watermark = match (options.apply_watermark, &self.watermark) {
            (false, _) => None,
            (true, Some(engine)) => Some((
                engine.clone(),
                options.watermark_text.clone(),
                self.style.clone(),
            )),
            (true, None) => return Err(WatermarkError::RasterizerUnavailable.into()),
        };

        let owned = source.clone();
        let crop_region = *crop;
        let drawn = tokio::task::spawn_blocking(move || -> Result<RgbaImage, StageError> {
            let mut canvas = TransformEngine::transform(&owned, &crop_region, rotation)?;
            if let Some((engine, text, style)) = watermark {
                engine.apply(&mut canvas, &text, &style)?;
            }
            Ok(canvas.into_buffer().into_image())
        });

        let buffer = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StageError::Cancelled),
            joined = drawn => joined??,
        };

        let outcome = self
            .compressor
            .compress(Arc::new(buffer), source.dimensions(), options, cancel)
            .await?;

        let compressed = outcome.bytes.len() as u64;
        Ok(ProcessedAsset {
            bytes: outcome.bytes,
            format: options.output_format,
            final_width: outcome.width,
            final_height: outcome.height,
            original_byte_size: outcome.primary_size,
            compressed_byte_size: compressed,
            compression_ratio: ratio(compressed, outcome.primary_size),
            budget_exceeded: outcome.budget_exceeded,
            degraded: false,
        })
    }

    async fn crop_only(
        &self,
        source: &RgbaImage,
        crop: &CropRegion,
        options: &ProcessingOptions,
        cancel: &CancellationToken,
    ) -> Result<ProcessedAsset, PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let cropped =
            image::imageops::crop_imm(source, crop.x, crop.y, crop.width, crop.height).to_image();
        let format = options.output_format;
        let encode = tokio::task::spawn_blocking(move || {
            ImageCodec::encode_blocking(&cropped, format, FALLBACK_QUALITY)
        });

        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            joined = encode => joined
                .map_err(CompressionError::from)
                .and_then(|encoded| encoded)
                .map_err(PipelineError::FallbackFailed)?,
        };

        let size = bytes.len() as u64;
        Ok(ProcessedAsset {
            bytes,
            format: options.output_format,
            final_width: crop.width,
            final_height: crop.height,
            original_byte_size: size,
            compressed_byte_size: size,
            compression_ratio: 1.0,
            budget_exceeded: size > options.max_output_bytes,
            degraded: true,
        })
    }
}

fn ratio(compressed: u64, original: u64) -> f64 {
    if original == 0 {
        1.0
    } else {
        compressed as f64 / original as f64
    }
}
