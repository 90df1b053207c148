//! Text rasterization for watermark tiles.

use ab_glyph::{FontVec, PxScale};
use image::{GrayImage, Luma};
use imageproc::drawing::{draw_text_mut, text_size};
use std::path::Path;

use super::watermark::WatermarkError;

/// Renders a line of text into a coverage mask (0 = empty, 255 = fully inked).
pub trait TextRasterizer: Send + Sync {
    fn rasterize(&self, text: &str, font_size: f32) -> Result<GrayImage, WatermarkError>;
}

/// TrueType/OpenType rasterizer, loaded once when the pipeline is assembled.
pub struct FontRasterizer {
    font: FontVec,
}

impl FontRasterizer {
    pub fn from_file(path: &Path) -> Result<Self, WatermarkError> {
        let data = std::fs::read(path).map_err(|e| {
            WatermarkError::FontLoad(format!("Failed to read font {}: {}", path.display(), e))
        })?;
        let rasterizer = Self::from_bytes(data)?;
        tracing::debug!(path = %path.display(), "Watermark font loaded");
        Ok(rasterizer)
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self, WatermarkError> {
        let font = FontVec::try_from_vec(data)
            .map_err(|e| WatermarkError::FontLoad(format!("Invalid font data: {}", e)))?;
        Ok(Self { font })
    }
}

impl TextRasterizer for FontRasterizer {
    fn rasterize(&self, text: &str, font_size: f32) -> Result<GrayImage, WatermarkError> {
        if text.is_empty() {
            return Err(WatermarkError::Render(
                "Cannot render empty text".to_string(),
            ));
        }

        let scale = PxScale::from(font_size);
        let (width, height) = text_size(scale, &self.font, text);

        // Small padding keeps antialiased edges inside the mask
        let padding = 2;
        let mut mask = GrayImage::new(width + padding * 2, height + padding * 2);
        draw_text_mut(
            &mut mask,
            Luma([255u8]),
            padding as i32,
            padding as i32,
            scale,
            &self.font,
            text,
        );

        Ok(mask)
    }
}
