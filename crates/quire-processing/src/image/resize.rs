use image::imageops::FilterType;

pub struct ImageResize;

impl ImageResize {
    /// Fit `(width, height)` inside a `max_dimension` square, keeping the aspect ratio.
    ///
    /// Images already within the limit are returned unchanged; nothing is upscaled.
    pub fn clamp_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
        let longer = width.max(height);
        if longer <= max_dimension || max_dimension == 0 {
            return (width, height);
        }

        let scale = max_dimension as f32 / longer as f32;
        if width >= height {
            let h = (height as f32 * scale).round() as u32;
            (max_dimension, h.max(1))
        } else {
            let w = (width as f32 * scale).round() as u32;
            (w.max(1), max_dimension)
        }
    }

    /// Select appropriate filter type based on resize ratio
    pub fn select_filter(
        orig_width: u32,
        orig_height: u32,
        new_width: u32,
        new_height: u32,
    ) -> FilterType {
        let width_ratio = orig_width as f32 / new_width as f32;
        let height_ratio = orig_height as f32 / new_height as f32;
        let max_ratio = width_ratio.max(height_ratio);

        if max_ratio > 2.0 {
            FilterType::Triangle
        } else if max_ratio > 1.5 {
            FilterType::CatmullRom
        } else {
            FilterType::Lanczos3
        }
    }
}
