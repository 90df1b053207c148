//! Defaults shared by configuration and the processing stages.

/// Maximum accepted input size at the boundary.
pub const MAX_INPUT_SIZE_MB: u64 = 10;

/// Default byte budget for a processed asset (0.6 MB).
pub const MAX_OUTPUT_BYTES: u64 = 600 * 1024;

pub const MAX_DIMENSION_PX: u32 = 1024;
pub const LARGE_SOURCE_DIMENSION_PX: u32 = 1200;
pub const LARGE_SOURCE_THRESHOLD_PX: u32 = 2048;
pub const INITIAL_QUALITY: f32 = 0.9;

pub const WATERMARK_FONT_SIZE: f32 = 17.0;
/// Smallest accepted watermark font size; anchor count grows with 1/size².
pub const MIN_WATERMARK_FONT_SIZE: f32 = 1.0;
pub const WATERMARK_OPACITY: f32 = 0.3;
pub const WATERMARK_COLOR: &str = "#FFFFFF";

/// Folder hint passed to the upload capability.
pub const DEFAULT_UPLOAD_FOLDER: &str = "media";
