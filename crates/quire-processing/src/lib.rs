//! Quire Media Processing Library
//!
//! This crate turns a selected image and crop into a compressed, watermarked
//! asset: crop and rotate onto a canvas, tile the watermark text, then encode
//! under a byte budget.

pub mod canvas;
pub mod compression;
pub mod image;
pub mod pipeline;
pub mod validator;

// Re-export commonly used types
pub use crate::image::{
    brick_anchors, FontRasterizer, ImageResize, TextRasterizer, TransformEngine, TransformError,
    WatermarkEngine, WatermarkError, WatermarkStyle,
};
pub use canvas::{Affine, Canvas, CanvasError, PixelBuffer, RasterCanvas, Rect};
pub use compression::{
    AdaptiveCompressor, Codec, CompressionError, CompressionOutcome, CompressionTier,
    DownscaleReducer, ImageCodec, ReduceRequest, Reduced, SizeReducer,
};
pub use pipeline::{decode_source, MediaPipeline, PipelineError};
pub use validator::{MediaValidator, ValidationError};
