use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};
use quire_core::{OutputFormat, ProcessingOptions};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::image::ImageResize;

/// Pixel counts above which the lower-quality tiers apply.
const LARGE_TIER_PIXELS: u64 = 2_000_000;
const MEDIUM_TIER_PIXELS: u64 = 1_000_000;

/// Quality multiplier between reduction passes.
const QUALITY_STEP: f32 = 0.9;
const QUALITY_FLOOR: f32 = 0.3;
const MAX_REDUCTION_PASSES: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("Encode failed: {0}")]
    Encode(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Compression cancelled")]
    Cancelled,

    #[error("Compression task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for CompressionError {
    fn from(err: tokio::task::JoinError) -> Self {
        CompressionError::Task(err.to_string())
    }
}

/// Quality and byte budget chosen from the output pixel count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionTier {
    pub quality: f32,
    pub budget_bytes: u64,
}

impl CompressionTier {
    pub fn for_pixel_count(pixels: u64) -> Self {
        if pixels > LARGE_TIER_PIXELS {
            Self {
                quality: 0.80,
                budget_bytes: megabytes(0.5),
            }
        } else if pixels > MEDIUM_TIER_PIXELS {
            Self {
                quality: 0.85,
                budget_bytes: megabytes(0.55),
            }
        } else {
            Self {
                quality: 0.90,
                budget_bytes: megabytes(0.6),
            }
        }
    }
}

fn megabytes(mb: f64) -> u64 {
    (mb * 1024.0 * 1024.0) as u64
}

/// Encodes a pixel buffer. Quality is in (0, 1]; lossless formats ignore it.
#[async_trait]
pub trait Codec: Send + Sync {
    async fn encode(
        &self,
        buffer: Arc<RgbaImage>,
        format: OutputFormat,
        quality: f32,
    ) -> Result<Bytes, CompressionError>;
}

/// Built-in codec on top of the `image` crate encoders.
///
/// JPEG honours quality; PNG and WebP are lossless. Encoding runs on the
/// blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCodec;

impl ImageCodec {
    pub fn encode_blocking(
        buffer: &RgbaImage,
        format: OutputFormat,
        quality: f32,
    ) -> Result<Bytes, CompressionError> {
        let (width, height) = buffer.dimensions();
        let mut out = Vec::new();

        match format {
            OutputFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgba8(buffer.clone()).to_rgb8();
                JpegEncoder::new_with_quality(&mut out, Self::jpeg_quality(quality))
                    .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                    .map_err(|e| CompressionError::Encode(e.to_string()))?;
            }
            OutputFormat::Png => {
                PngEncoder::new(&mut out)
                    .write_image(buffer.as_raw(), width, height, ExtendedColorType::Rgba8)
                    .map_err(|e| CompressionError::Encode(e.to_string()))?;
            }
            OutputFormat::WebP => {
                WebPEncoder::new_lossless(&mut out)
                    .write_image(buffer.as_raw(), width, height, ExtendedColorType::Rgba8)
                    .map_err(|e| CompressionError::Encode(e.to_string()))?;
            }
        }

        Ok(Bytes::from(out))
    }

    /// Map (0, 1] onto the encoder's 1-100 scale.
    pub fn jpeg_quality(quality: f32) -> u8 {
        (quality * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

#[async_trait]
impl Codec for ImageCodec {
    async fn encode(
        &self,
        buffer: Arc<RgbaImage>,
        format: OutputFormat,
        quality: f32,
    ) -> Result<Bytes, CompressionError> {
        tokio::task::spawn_blocking(move || Self::encode_blocking(&buffer, format, quality))
            .await?
    }
}

/// Parameters for the secondary size-reduction pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReduceRequest {
    pub format: OutputFormat,
    pub quality: f32,
    pub max_dimension_px: u32,
    pub target_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct Reduced {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
}

/// Shrinks already-encoded bytes towards a target size.
#[async_trait]
pub trait SizeReducer: Send + Sync {
    async fn reduce(
        &self,
        encoded: Bytes,
        request: &ReduceRequest,
    ) -> Result<Reduced, CompressionError>;
}

/// Decode, clamp the longer side, then re-encode at decreasing quality until
/// the target is met or the pass limit is reached.
pub struct DownscaleReducer {
    codec: Arc<dyn Codec>,
}

impl DownscaleReducer {
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self { codec }
    }
}

#[async_trait]
impl SizeReducer for DownscaleReducer {
    async fn reduce(
        &self,
        encoded: Bytes,
        request: &ReduceRequest,
    ) -> Result<Reduced, CompressionError> {
        let max_dimension_px = request.max_dimension_px;
        let resized = Arc::new(
            tokio::task::spawn_blocking(move || decode_and_clamp(&encoded, max_dimension_px))
                .await??,
        );

        let mut quality = request.quality.clamp(QUALITY_FLOOR, 1.0);
        let mut best: Option<Bytes> = None;

        for pass in 0..MAX_REDUCTION_PASSES {
            let candidate = self
                .codec
                .encode(resized.clone(), request.format, quality)
                .await?;

            tracing::debug!(
                pass = pass,
                quality = quality,
                size_bytes = candidate.len(),
                target_bytes = request.target_bytes,
                "Size reduction pass"
            );

            let smallest = match best.take() {
                Some(current) if current.len() <= candidate.len() => current,
                _ => candidate,
            };
            let done = smallest.len() as u64 <= request.target_bytes;
            best = Some(smallest);

            if done || !request.format.is_lossy() || quality <= QUALITY_FLOOR {
                break;
            }
            quality = (quality * QUALITY_STEP).max(QUALITY_FLOOR);
        }

        let bytes = best.ok_or_else(|| {
            CompressionError::Encode("Size reduction produced no output".to_string())
        })?;

        Ok(Reduced {
            bytes,
            width: resized.width(),
            height: resized.height(),
        })
    }
}

fn decode_and_clamp(encoded: &[u8], max_dimension_px: u32) -> Result<RgbaImage, CompressionError> {
    let decoded = image::load_from_memory(encoded)
        .map_err(|e| CompressionError::Decode(e.to_string()))?
        .to_rgba8();

    let (width, height) = decoded.dimensions();
    let (target_w, target_h) = ImageResize::clamp_dimensions(width, height, max_dimension_px);
    if (target_w, target_h) == (width, height) {
        return Ok(decoded);
    }

    let filter = ImageResize::select_filter(width, height, target_w, target_h);
    Ok(image::imageops::resize(&decoded, target_w, target_h, filter))
}

/// Result of adaptive compression.
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
    /// Size of the primary encode, before any reduction.
    pub primary_size: u64,
    pub tier: CompressionTier,
    pub quality: f32,
    /// Still over `max_output_bytes` after the secondary pass.
    pub budget_exceeded: bool,
}

/// Encodes a buffer under a byte budget with the injected codec and reducer.
#[derive(Clone)]
pub struct AdaptiveCompressor {
    codec: Arc<dyn Codec>,
    reducer: Arc<dyn SizeReducer>,
}

impl AdaptiveCompressor {
    pub fn new(codec: Arc<dyn Codec>, reducer: Arc<dyn SizeReducer>) -> Self {
        Self { codec, reducer }
    }

    /// Built-in codec with the downscaling reducer.
    pub fn with_defaults() -> Self {
        let codec: Arc<dyn Codec> = Arc::new(ImageCodec);
        let reducer = Arc::new(DownscaleReducer::new(codec.clone()));
        Self::new(codec, reducer)
    }

    /// Encode `buffer` once at the tier quality and, when that overshoots
    /// `max_output_bytes`, run one reduction pass. The smaller candidate wins.
    ///
    /// `source_dims` are the pre-crop source dimensions; they pick the
    /// dimension clamp for the reduction pass.
    pub async fn compress(
        &self,
        buffer: Arc<RgbaImage>,
        source_dims: (u32, u32),
        options: &ProcessingOptions,
        cancel: &CancellationToken,
    ) -> Result<CompressionOutcome, CompressionError> {
        let (width, height) = buffer.dimensions();
        let tier = CompressionTier::for_pixel_count(u64::from(width) * u64::from(height));
        let quality = tier.quality.min(options.initial_quality);

        tracing::debug!(
            width = width,
            height = height,
            tier_quality = tier.quality,
            tier_budget_bytes = tier.budget_bytes,
            quality = quality,
            "Compression tier selected"
        );

        let primary = cancellable(
            cancel,
            self.codec.encode(buffer, options.output_format, quality),
        )
        .await?;
        let primary_size = primary.len() as u64;

        if primary_size <= options.max_output_bytes {
            return Ok(CompressionOutcome {
                bytes: primary,
                width,
                height,
                primary_size,
                tier,
                quality,
                budget_exceeded: false,
            });
        }

        let request = ReduceRequest {
            format: options.output_format,
            quality: quality * QUALITY_STEP,
            max_dimension_px: options.dimension_clamp_for(source_dims.0, source_dims.1),
            target_bytes: tier.budget_bytes.min(options.max_output_bytes),
        };

        let secondary = match cancellable(cancel, self.reducer.reduce(primary.clone(), &request))
            .await
        {
            Ok(reduced) => Some(reduced),
            Err(CompressionError::Cancelled) => return Err(CompressionError::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "Secondary compression pass failed, keeping primary encode");
                None
            }
        };

        let (bytes, final_w, final_h) = match secondary {
            Some(reduced) if reduced.bytes.len() < primary.len() => {
                (reduced.bytes, reduced.width, reduced.height)
            }
            _ => (primary, width, height),
        };

        let budget_exceeded = bytes.len() as u64 > options.max_output_bytes;
        if budget_exceeded {
            tracing::warn!(
                size_bytes = bytes.len(),
                max_output_bytes = options.max_output_bytes,
                "Compressed asset still exceeds the byte budget"
            );
        }

        Ok(CompressionOutcome {
            bytes,
            width: final_w,
            height: final_h,
            primary_size,
            tier,
            quality: request.quality,
            budget_exceeded,
        })
    }
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T, CompressionError>>,
) -> Result<T, CompressionError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CompressionError::Cancelled),
        result = work => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// Returns a fixed number of bytes regardless of input.
    struct FixedCodec(usize);

    #[async_trait]
    impl Codec for FixedCodec {
        async fn encode(
            &self,
            _buffer: Arc<RgbaImage>,
            _format: OutputFormat,
            _quality: f32,
        ) -> Result<Bytes, CompressionError> {
            Ok(Bytes::from(vec![0u8; self.0]))
        }
    }

    struct FailingCodec;

    #[async_trait]
    impl Codec for FailingCodec {
        async fn encode(
            &self,
            _buffer: Arc<RgbaImage>,
            _format: OutputFormat,
            _quality: f32,
        ) -> Result<Bytes, CompressionError> {
            Err(CompressionError::Encode("encoder crashed".to_string()))
        }
    }

    /// Returns a fixed-size result and records the requests it saw.
    struct StubReducer {
        size: usize,
        dims: (u32, u32),
        seen: Mutex<Vec<ReduceRequest>>,
    }

    impl StubReducer {
        fn new(size: usize, dims: (u32, u32)) -> Self {
            Self {
                size,
                dims,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SizeReducer for StubReducer {
        async fn reduce(
            &self,
            _encoded: Bytes,
            request: &ReduceRequest,
        ) -> Result<Reduced, CompressionError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(Reduced {
                bytes: Bytes::from(vec![1u8; self.size]),
                width: self.dims.0,
                height: self.dims.1,
            })
        }
    }

    struct FailingReducer;

    #[async_trait]
    impl SizeReducer for FailingReducer {
        async fn reduce(
            &self,
            _encoded: Bytes,
            _request: &ReduceRequest,
        ) -> Result<Reduced, CompressionError> {
            Err(CompressionError::Decode("truncated".to_string()))
        }
    }

    fn noisy(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            let v = x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503);
            Rgba([v as u8, (v >> 8) as u8, (v >> 16) as u8, 255])
        })
    }

    #[test]
    fn test_tier_selection() {
        let large = CompressionTier::for_pixel_count(2_000_001);
        assert_eq!(large.quality, 0.80);
        assert_eq!(large.budget_bytes, 524_288);

        let medium = CompressionTier::for_pixel_count(2_000_000);
        assert_eq!(medium.quality, 0.85);
        assert_eq!(medium.budget_bytes, 576_716);

        let small = CompressionTier::for_pixel_count(1_000_000);
        assert_eq!(small.quality, 0.90);
        assert_eq!(small.budget_bytes, 629_145);
    }

    #[test]
    fn test_jpeg_quality_mapping() {
        assert_eq!(ImageCodec::jpeg_quality(0.9), 90);
        assert_eq!(ImageCodec::jpeg_quality(0.001), 1);
        assert_eq!(ImageCodec::jpeg_quality(1.0), 100);
    }

    #[test]
    fn test_image_codec_formats() {
        let buffer = noisy(16, 16);
        let jpeg = ImageCodec::encode_blocking(&buffer, OutputFormat::Jpeg, 0.8).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let png = ImageCodec::encode_blocking(&buffer, OutputFormat::Png, 0.8).unwrap();
        assert_eq!(&png[1..4], b"PNG");

        let webp = ImageCodec::encode_blocking(&buffer, OutputFormat::WebP, 0.8).unwrap();
        assert_eq!(&webp[..4], b"RIFF");
    }

    #[tokio::test]
    async fn test_under_budget_skips_reduction() {
        let reducer = Arc::new(StubReducer::new(10, (1, 1)));
        let compressor = AdaptiveCompressor::new(Arc::new(FixedCodec(1_000)), reducer.clone());

        let outcome = compressor
            .compress(
                Arc::new(noisy(40, 30)),
                (400, 300),
                &ProcessingOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.bytes.len(), 1_000);
        assert_eq!((outcome.width, outcome.height), (40, 30));
        assert!(!outcome.budget_exceeded);
        assert!(reducer.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_compression_monotonic_when_reducer_grows() {
        let reducer = Arc::new(StubReducer::new(900_000, (10, 10)));
        let compressor = AdaptiveCompressor::new(Arc::new(FixedCodec(800_000)), reducer);

        let outcome = compressor
            .compress(
                Arc::new(noisy(40, 30)),
                (40, 30),
                &ProcessingOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.bytes.len(), 800_000);
        assert_eq!(outcome.primary_size, 800_000);
        assert_eq!((outcome.width, outcome.height), (40, 30));
        assert!(outcome.budget_exceeded);
    }

    #[tokio::test]
    async fn test_compression_keeps_smaller_reduced_candidate() {
        let reducer = Arc::new(StubReducer::new(100_000, (20, 15)));
        let compressor = AdaptiveCompressor::new(Arc::new(FixedCodec(800_000)), reducer);

        let outcome = compressor
            .compress(
                Arc::new(noisy(40, 30)),
                (40, 30),
                &ProcessingOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.bytes.len(), 100_000);
        assert_eq!((outcome.width, outcome.height), (20, 15));
        assert_eq!(outcome.primary_size, 800_000);
        assert!(outcome.bytes.len() as u64 <= outcome.primary_size);
        assert!(!outcome.budget_exceeded);
    }

    #[tokio::test]
    async fn test_reduce_request_parameters() {
        let reducer = Arc::new(StubReducer::new(100, (1, 1)));
        let compressor = AdaptiveCompressor::new(Arc::new(FixedCodec(700_000)), reducer.clone());
        let options = ProcessingOptions {
            max_output_bytes: 600_000,
            initial_quality: 0.82,
            ..ProcessingOptions::default()
        };

        // Large source: clamp switches to 1200
        compressor
            .compress(Arc::new(noisy(40, 30)), (3000, 2000), &options, &CancellationToken::new())
            .await
            .unwrap();
        // Small source: default clamp
        compressor
            .compress(Arc::new(noisy(40, 30)), (1600, 900), &options, &CancellationToken::new())
            .await
            .unwrap();

        let seen = reducer.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].max_dimension_px, 1200);
        assert_eq!(seen[1].max_dimension_px, 1024);
        // Tier quality 0.90 capped by initial quality 0.82, then lowered by 10%
        assert!((seen[0].quality - 0.82 * 0.9).abs() < 1e-6);
        // min(tier budget 629145, max_output_bytes 600000)
        assert_eq!(seen[0].target_bytes, 600_000);
    }

    #[tokio::test]
    async fn test_failing_reducer_keeps_primary() {
        let compressor =
            AdaptiveCompressor::new(Arc::new(FixedCodec(700_000)), Arc::new(FailingReducer));

        let outcome = compressor
            .compress(
                Arc::new(noisy(40, 30)),
                (40, 30),
                &ProcessingOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.bytes.len(), 700_000);
        assert!(outcome.budget_exceeded);
    }

    #[tokio::test]
    async fn test_primary_encode_failure_is_reported() {
        let compressor = AdaptiveCompressor::new(
            Arc::new(FailingCodec),
            Arc::new(StubReducer::new(1, (1, 1))),
        );

        let result = compressor
            .compress(
                Arc::new(noisy(4, 4)),
                (4, 4),
                &ProcessingOptions::default(),
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(CompressionError::Encode(_))));
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_compression() {
        let compressor = AdaptiveCompressor::with_defaults();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = compressor
            .compress(Arc::new(noisy(8, 8)), (8, 8), &ProcessingOptions::default(), &cancel)
            .await;

        assert!(matches!(result, Err(CompressionError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_while_encoding_returns_promptly() {
        let compressor = AdaptiveCompressor::with_defaults();
        let options = ProcessingOptions {
            output_format: OutputFormat::Png,
            ..ProcessingOptions::default()
        };
        let buffer = Arc::new(noisy(2000, 1500));
        let cancel = CancellationToken::new();

        // Runs on the same single-threaded runtime as the encode
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result = compressor
            .compress(buffer, (2000, 1500), &options, &cancel)
            .await;

        assert!(cancel.is_cancelled());
        assert!(matches!(result, Err(CompressionError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_downscale_reducer_clamps_longer_side() {
        let codec: Arc<dyn Codec> = Arc::new(ImageCodec);
        let source = noisy(1600, 800);
        let encoded = ImageCodec::encode_blocking(&source, OutputFormat::Jpeg, 0.9).unwrap();

        let reducer = DownscaleReducer::new(codec);
        let reduced = reducer
            .reduce(
                encoded.clone(),
                &ReduceRequest {
                    format: OutputFormat::Jpeg,
                    quality: 0.81,
                    max_dimension_px: 1024,
                    target_bytes: 50_000,
                },
            )
            .await
            .unwrap();

        assert_eq!((reduced.width, reduced.height), (1024, 512));
        assert!(reduced.bytes.len() < encoded.len());
    }
}
