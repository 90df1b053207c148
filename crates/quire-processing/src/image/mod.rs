//! Image processing module
//!
//! This module provides the pixel stages of the pipeline:
//! - Crop and rotation into a crop-sized buffer (transform)
//! - Repeating diagonal text overlay (watermark, text)
//! - Dimension clamping and filter selection (resize)

pub mod resize;
pub mod text;
pub mod transform;
pub mod watermark;

pub use resize::ImageResize;
pub use text::{FontRasterizer, TextRasterizer};
pub use transform::{TransformEngine, TransformError};
pub use watermark::{
    brick_anchors, parse_hex_color, WatermarkEngine, WatermarkError, WatermarkStyle,
};
