use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Kind of staged media. Only images go through the processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify a mime type by its top-level prefix.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let normalized = content_type.trim().to_lowercase();
        if normalized.starts_with("image/") {
            Some(MediaKind::Image)
        } else if normalized.starts_with("video/") {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// Encoded output format for processed images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    WebP,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self, anyhow::Error> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::WebP),
            _ => Err(anyhow::anyhow!("Invalid format: {}", s)),
        }
    }

    pub fn to_mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
        }
    }

    /// Whether the encoder honours a quality setting.
    pub fn is_lossy(self) -> bool {
        matches!(self, OutputFormat::Jpeg)
    }
}

/// Per-call processing options. Built from configuration, never read from globals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingOptions {
    pub max_output_bytes: u64,
    pub max_dimension_px: u32,
    /// Clamp used instead of `max_dimension_px` when the source's longer side
    /// exceeds `large_source_threshold_px`.
    pub large_source_dimension_px: u32,
    pub large_source_threshold_px: u32,
    /// Upper bound for the tier quality, in (0, 1].
    pub initial_quality: f32,
    pub apply_watermark: bool,
    pub watermark_text: String,
    pub output_format: OutputFormat,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            max_output_bytes: 600 * 1024,
            max_dimension_px: 1024,
            large_source_dimension_px: 1200,
            large_source_threshold_px: 2048,
            initial_quality: 0.9,
            apply_watermark: false,
            watermark_text: String::new(),
            output_format: OutputFormat::Jpeg,
        }
    }
}

impl ProcessingOptions {
    /// Dimension clamp for the secondary compression pass.
    pub fn dimension_clamp_for(&self, source_width: u32, source_height: u32) -> u32 {
        if source_width.max(source_height) > self.large_source_threshold_px {
            self.large_source_dimension_px
        } else {
            self.max_dimension_px
        }
    }
}

/// Result of running an image through the processing pipeline.
#[derive(Debug, Clone)]
pub struct ProcessedAsset {
    pub bytes: Bytes,
    pub format: OutputFormat,
    pub final_width: u32,
    pub final_height: u32,
    /// Size of the primary encode.
    pub original_byte_size: u64,
    pub compressed_byte_size: u64,
    pub compression_ratio: f64,
    /// Still larger than `max_output_bytes` after the secondary pass.
    pub budget_exceeded: bool,
    /// Produced by the crop-only fallback path; rotation and watermark were skipped.
    pub degraded: bool,
}

impl ProcessedAsset {
    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_from_content_type() {
        assert_eq!(
            MediaKind::from_content_type("image/png"),
            Some(MediaKind::Image)
        );
        assert_eq!(
            MediaKind::from_content_type(" Video/MP4"),
            Some(MediaKind::Video)
        );
        assert_eq!(MediaKind::from_content_type("application/pdf"), None);
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("jpg").unwrap(), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::parse("PNG").unwrap(), OutputFormat::Png);
        assert_eq!(OutputFormat::parse("webp").unwrap(), OutputFormat::WebP);
        assert!(OutputFormat::parse("avif").is_err());
    }

    #[test]
    fn test_output_format_mime_and_extension() {
        assert_eq!(OutputFormat::Jpeg.to_mime_type(), "image/jpeg");
        assert_eq!(OutputFormat::WebP.extension(), "webp");
        assert!(OutputFormat::Jpeg.is_lossy());
        assert!(!OutputFormat::Png.is_lossy());
    }

    #[test]
    fn test_dimension_clamp_for_large_sources() {
        let options = ProcessingOptions::default();
        assert_eq!(options.dimension_clamp_for(2048, 1000), 1024);
        assert_eq!(options.dimension_clamp_for(1000, 3000), 1200);
    }
}
