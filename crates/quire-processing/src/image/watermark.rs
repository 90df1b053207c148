use image::{Rgba, RgbaImage};
use quire_core::constants::MIN_WATERMARK_FONT_SIZE;
use quire_core::WatermarkSettings;
use std::sync::Arc;

use super::text::TextRasterizer;
use crate::canvas::{Canvas, Rect};

#[derive(Debug, thiserror::Error)]
pub enum WatermarkError {
    #[error("Font load failed: {0}")]
    FontLoad(String),

    #[error("Text rendering failed: {0}")]
    Render(String),

    #[error("Invalid watermark color: {0}")]
    InvalidColor(String),

    #[error("Invalid watermark font size: {0}")]
    InvalidFontSize(f32),

    #[error("Watermark requested but no text rasterizer is configured")]
    RasterizerUnavailable,
}

/// How the repeating watermark text is drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkStyle {
    pub font_size: f32,
    pub color: Rgba<u8>,
    /// Multiplied into the color's alpha, in [0, 1].
    pub opacity: f32,
    /// Pattern rotation about the buffer center.
    pub angle_degrees: f32,
}

impl Default for WatermarkStyle {
    fn default() -> Self {
        Self {
            font_size: quire_core::constants::WATERMARK_FONT_SIZE,
            color: Rgba([255, 255, 255, 255]),
            opacity: quire_core::constants::WATERMARK_OPACITY,
            angle_degrees: -45.0,
        }
    }
}

impl WatermarkStyle {
    pub fn from_settings(settings: &WatermarkSettings) -> Result<Self, WatermarkError> {
        if !settings.font_size.is_finite() || settings.font_size < MIN_WATERMARK_FONT_SIZE {
            return Err(WatermarkError::InvalidFontSize(settings.font_size));
        }

        Ok(Self {
            font_size: settings.font_size,
            color: parse_hex_color(&settings.color)?,
            opacity: settings.opacity.clamp(0.0, 1.0),
            ..Self::default()
        })
    }

    pub fn row_spacing(&self) -> f64 {
        f64::from(self.font_size) * 4.0
    }

    pub fn column_spacing(&self) -> f64 {
        f64::from(self.font_size) * 8.0
    }
}

/// Parse `#RGB`, `#RRGGBB` or `#RRGGBBAA`.
pub fn parse_hex_color(hex: &str) -> Result<Rgba<u8>, WatermarkError> {
    let digits = hex
        .trim()
        .strip_prefix('#')
        .ok_or_else(|| WatermarkError::InvalidColor(format!("{} (must start with '#')", hex)))?;

    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(WatermarkError::InvalidColor(hex.to_string()));
    }

    let channel = |s: &str| {
        u8::from_str_radix(s, 16).map_err(|_| WatermarkError::InvalidColor(hex.to_string()))
    };

    match digits.len() {
        3 => {
            // #RGB: each digit doubled, 0xF -> 0xFF
            let r = channel(&digits[0..1])?;
            let g = channel(&digits[1..2])?;
            let b = channel(&digits[2..3])?;
            Ok(Rgba([r * 17, g * 17, b * 17, 255]))
        }
        6 => Ok(Rgba([
            channel(&digits[0..2])?,
            channel(&digits[2..4])?,
            channel(&digits[4..6])?,
            255,
        ])),
        8 => Ok(Rgba([
            channel(&digits[0..2])?,
            channel(&digits[2..4])?,
            channel(&digits[4..6])?,
            channel(&digits[6..8])?,
        ])),
        _ => Err(WatermarkError::InvalidColor(hex.to_string())),
    }
}

/// Anchor points of the brick pattern, relative to the buffer center in the
/// rotated frame.
///
/// Rows run every `font_size * 4`, columns every `font_size * 8`, and odd rows
/// shift by half a column. Both axes span `-diagonal..=diagonal`, so the
/// pattern covers the buffer at any rotation.
pub fn brick_anchors(width: u32, height: u32, font_size: f32) -> Vec<(f64, f64)> {
    if !font_size.is_finite() || font_size < MIN_WATERMARK_FONT_SIZE {
        return Vec::new();
    }

    let w = f64::from(width);
    let h = f64::from(height);
    let diagonal = (w * w + h * h).sqrt();
    let row_spacing = f64::from(font_size) * 4.0;
    let column_spacing = f64::from(font_size) * 8.0;

    let mut anchors = Vec::new();
    let mut row = 0usize;
    loop {
        let y = -diagonal + row as f64 * row_spacing;
        if y > diagonal {
            break;
        }
        let offset = if row % 2 == 1 {
            column_spacing / 2.0
        } else {
            0.0
        };
        let mut column = 0usize;
        loop {
            let x = -diagonal + offset + column as f64 * column_spacing;
            if x > diagonal {
                break;
            }
            anchors.push((x, y));
            column += 1;
        }
        row += 1;
    }

    anchors
}

/// Composites a repeating diagonal text pattern onto a canvas.
#[derive(Clone)]
pub struct WatermarkEngine {
    rasterizer: Arc<dyn TextRasterizer>,
}

impl WatermarkEngine {
    pub fn new(rasterizer: Arc<dyn TextRasterizer>) -> Self {
        Self { rasterizer }
    }

    /// Draw `text` over the whole canvas.
    ///
    /// Runs under an identity transform and restores whatever transform the
    /// canvas had on entry.
    pub fn apply<C: Canvas + ?Sized>(
        &self,
        canvas: &mut C,
        text: &str,
        style: &WatermarkStyle,
    ) -> Result<(), WatermarkError> {
        if text.trim().is_empty() {
            tracing::debug!("Empty watermark text, skipping");
            return Ok(());
        }

        let tile = self.render_tile(text, style)?;
        let (width, height) = (canvas.width(), canvas.height());
        let anchors = brick_anchors(width, height, style.font_size);
        let tile_w = f64::from(tile.width());
        let tile_h = f64::from(tile.height());
        let src = Rect::of_image(&tile);

        canvas.save();
        canvas.reset_transform();
        canvas.translate(f64::from(width) / 2.0, f64::from(height) / 2.0);
        canvas.rotate(f64::from(style.angle_degrees).to_radians());

        for &(x, y) in &anchors {
            let dst = Rect::new(x - tile_w / 2.0, y - tile_h / 2.0, tile_w, tile_h);
            canvas.draw_image(&tile, src, dst);
        }

        canvas.restore();

        tracing::debug!(
            width = width,
            height = height,
            tiles = anchors.len(),
            font_size = style.font_size,
            "Watermark applied"
        );

        Ok(())
    }

    /// Rasterize the text once and tint it with the style color and opacity.
    fn render_tile(&self, text: &str, style: &WatermarkStyle) -> Result<RgbaImage, WatermarkError> {
        let mask = self.rasterizer.rasterize(text, style.font_size)?;
        let alpha_scale = f32::from(style.color[3]) / 255.0 * style.opacity.clamp(0.0, 1.0);

        let tile = RgbaImage::from_fn(mask.width(), mask.height(), |x, y| {
            let coverage = f32::from(mask.get_pixel(x, y)[0]);
            Rgba([
                style.color[0],
                style.color[1],
                style.color[2],
                (coverage * alpha_scale).round() as u8,
            ])
        });

        Ok(tile)
    }
}
